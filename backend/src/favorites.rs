use axum::{Extension, Json};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db;
use crate::error::ApiError;
use crate::models::{Favorite, NewFavorite, Product};
use crate::schema::{favorites, products};

#[derive(Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FavoriteAction {
    Add,
    Remove,
}

#[derive(Deserialize)]
pub struct FavoriteMutation {
    pub product_id: Uuid,
    pub action: FavoriteAction,
}

fn load_favorites(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<Vec<Product>, ApiError> {
    let rows = favorites::table
        .inner_join(products::table)
        .filter(favorites::user_id.eq(user_id))
        .order_by(favorites::created_at.asc())
        .load::<(Favorite, Product)>(conn)?;
    Ok(rows.into_iter().map(|(_, product)| product).collect())
}

pub async fn get_favorites(
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let mut conn = db::establish_connection()?;
    Ok(Json(load_favorites(&mut conn, current.id)?))
}

pub async fn mutate_favorites(
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<FavoriteMutation>,
) -> Result<Json<Vec<Product>>, ApiError> {
    if !current.role.can_shop() {
        return Err(ApiError::Forbidden(
            "Farmer accounts cannot shop".to_string(),
        ));
    }

    let mut conn = db::establish_connection()?;

    let existing = favorites::table
        .filter(favorites::user_id.eq(current.id))
        .filter(favorites::product_id.eq(req.product_id))
        .first::<Favorite>(&mut conn)
        .optional()?;

    match req.action {
        FavoriteAction::Add => {
            products::table
                .filter(products::id.eq(req.product_id))
                .filter(products::is_active.eq(true))
                .first::<Product>(&mut conn)
                .optional()?
                .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;

            if existing.is_none() {
                diesel::insert_into(favorites::table)
                    .values(&NewFavorite {
                        id: Uuid::new_v4(),
                        user_id: current.id,
                        product_id: req.product_id,
                        created_at: Utc::now().naive_utc(),
                    })
                    .execute(&mut conn)?;
            }
        }
        FavoriteAction::Remove => {
            if let Some(favorite) = existing {
                diesel::delete(favorites::table.find(favorite.id)).execute(&mut conn)?;
            }
        }
    }

    Ok(Json(load_favorites(&mut conn, current.id)?))
}
