use axum::{Extension, Json};
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db;
use crate::error::ApiError;
use crate::models::{CartItem, NewCartItem, Product};
use crate::schema::{cart_items, products};

#[derive(Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CartAction {
    Add,
    Remove,
    Update,
}

#[derive(Deserialize)]
pub struct CartMutation {
    pub product_id: Uuid,
    pub quantity: Option<i32>,
    pub action: CartAction,
}

#[derive(Serialize)]
pub struct CartLineResponse {
    pub product_id: Uuid,
    pub farmer_id: Uuid,
    pub name: String,
    pub unit: String,
    pub unit_price: i64,
    pub stock: i32,
    pub quantity: i32,
    pub line_total: i64,
}

#[derive(Serialize)]
pub struct CartResponse {
    pub items: Vec<CartLineResponse>,
    pub subtotal: i64,
}

/// Full cart state joined with live product data. Every mutation responds
/// with this so the client overwrites rather than merges.
fn load_cart(conn: &mut PgConnection, user_id: Uuid) -> Result<CartResponse, ApiError> {
    let rows = cart_items::table
        .inner_join(products::table)
        .filter(cart_items::user_id.eq(user_id))
        .order_by(cart_items::created_at.asc())
        .load::<(CartItem, Product)>(conn)?;

    let items: Vec<CartLineResponse> = rows
        .into_iter()
        .map(|(line, product)| CartLineResponse {
            product_id: product.id,
            farmer_id: product.farmer_id,
            name: product.name,
            unit: product.unit,
            unit_price: product.price,
            stock: product.stock,
            quantity: line.quantity,
            line_total: product.price * i64::from(line.quantity),
        })
        .collect();
    let subtotal = items.iter().map(|i| i.line_total).sum();

    Ok(CartResponse { items, subtotal })
}

pub async fn get_cart(
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<CartResponse>, ApiError> {
    let mut conn = db::establish_connection()?;
    Ok(Json(load_cart(&mut conn, current.id)?))
}

pub async fn mutate_cart(
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CartMutation>,
) -> Result<Json<CartResponse>, ApiError> {
    if !current.role.can_shop() {
        return Err(ApiError::Forbidden(
            "Farmer accounts cannot shop".to_string(),
        ));
    }

    let mut conn = db::establish_connection()?;

    let existing = cart_items::table
        .filter(cart_items::user_id.eq(current.id))
        .filter(cart_items::product_id.eq(req.product_id))
        .first::<CartItem>(&mut conn)
        .optional()?;

    match req.action {
        CartAction::Add => {
            let quantity = req.quantity.unwrap_or(1);
            if quantity <= 0 {
                return Err(ApiError::Validation(
                    "Quantity must be positive".to_string(),
                ));
            }
            products::table
                .filter(products::id.eq(req.product_id))
                .filter(products::is_active.eq(true))
                .first::<Product>(&mut conn)
                .optional()?
                .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;

            match existing {
                Some(line) => {
                    diesel::update(cart_items::table.find(line.id))
                        .set(cart_items::quantity.eq(line.quantity + quantity))
                        .execute(&mut conn)?;
                }
                None => {
                    diesel::insert_into(cart_items::table)
                        .values(&NewCartItem {
                            id: Uuid::new_v4(),
                            user_id: current.id,
                            product_id: req.product_id,
                            quantity,
                            created_at: Utc::now().naive_utc(),
                        })
                        .execute(&mut conn)?;
                }
            }
        }
        CartAction::Remove => {
            if let Some(line) = existing {
                diesel::delete(cart_items::table.find(line.id)).execute(&mut conn)?;
            }
        }
        CartAction::Update => {
            let line = existing
                .ok_or_else(|| ApiError::NotFound("Cart line not found".to_string()))?;
            let quantity = req
                .quantity
                .ok_or_else(|| ApiError::Validation("Quantity is required".to_string()))?;
            if quantity <= 0 {
                // Zero and below mean removal.
                diesel::delete(cart_items::table.find(line.id)).execute(&mut conn)?;
            } else {
                diesel::update(cart_items::table.find(line.id))
                    .set(cart_items::quantity.eq(quantity))
                    .execute(&mut conn)?;
            }
        }
    }

    info!("Cart updated for user {}", current.id);
    Ok(Json(load_cart(&mut conn, current.id)?))
}
