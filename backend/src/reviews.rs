use axum::{extract::Path, Extension, Json};
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db;
use crate::error::ApiError;
use crate::models::{NewReview, OrderStatus, Review};
use crate::schema::{order_items, orders, products, reviews};

#[derive(Deserialize)]
pub struct CreateReviewRequest {
    pub product_id: Uuid,
    pub rating: i32,
    pub comment: String,
}

#[derive(Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: i32,
    pub comment: String,
}

fn validate_review(rating: i32, comment: &str) -> Result<(), ApiError> {
    if !(1..=5).contains(&rating) {
        return Err(ApiError::Validation(
            "Rating must be between 1 and 5".to_string(),
        ));
    }
    if comment.trim().is_empty() {
        return Err(ApiError::Validation("Comment is required".to_string()));
    }
    Ok(())
}

/// Arithmetic mean rounded to one decimal. Zero for an unreviewed product.
fn average_rating(ratings: &[i32]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let mean = ratings.iter().map(|r| f64::from(*r)).sum::<f64>() / ratings.len() as f64;
    (mean * 10.0).round() / 10.0
}

/// Reviewing requires a delivered order containing the product.
fn has_delivered_order(
    conn: &mut PgConnection,
    user_id: Uuid,
    product_id: Uuid,
) -> Result<bool, ApiError> {
    let count: i64 = orders::table
        .inner_join(order_items::table)
        .filter(orders::user_id.eq(user_id))
        .filter(orders::status.eq(OrderStatus::Delivered.as_str()))
        .filter(order_items::product_id.eq(product_id))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

/// Recomputes the stored aggregate from all reviews of the product.
fn recompute_product_rating(conn: &mut PgConnection, product_id: Uuid) -> Result<(), ApiError> {
    let ratings: Vec<i32> = reviews::table
        .filter(reviews::product_id.eq(product_id))
        .select(reviews::rating)
        .load(conn)?;

    diesel::update(products::table.find(product_id))
        .set((
            products::rating.eq(average_rating(&ratings)),
            products::review_count.eq(ratings.len() as i32),
            products::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
    Ok(())
}

pub async fn create_review(
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreateReviewRequest>,
) -> Result<Json<Review>, ApiError> {
    validate_review(req.rating, &req.comment)?;

    let mut conn = db::establish_connection()?;

    if !has_delivered_order(&mut conn, current.id, req.product_id)? {
        return Err(ApiError::Forbidden(
            "Reviews are limited to delivered purchases".to_string(),
        ));
    }

    let existing = reviews::table
        .filter(reviews::product_id.eq(req.product_id))
        .filter(reviews::user_id.eq(current.id))
        .first::<Review>(&mut conn)
        .optional()?;
    if existing.is_some() {
        return Err(ApiError::Conflict(
            "You have already reviewed this product".to_string(),
        ));
    }

    let now = Utc::now().naive_utc();
    let new_review = NewReview {
        id: Uuid::new_v4(),
        product_id: req.product_id,
        user_id: current.id,
        rating: req.rating,
        comment: req.comment,
        created_at: now,
        updated_at: now,
    };

    let review = conn.transaction::<_, ApiError, _>(|conn| {
        diesel::insert_into(reviews::table)
            .values(&new_review)
            .execute(conn)?;
        recompute_product_rating(conn, new_review.product_id)?;
        Ok(reviews::table.find(new_review.id).first::<Review>(conn)?)
    })?;

    info!(
        "User {} reviewed product {} ({} stars)",
        current.id, review.product_id, review.rating
    );
    Ok(Json(review))
}

fn load_own_review(
    conn: &mut PgConnection,
    review_id: Uuid,
    user_id: Uuid,
) -> Result<Review, ApiError> {
    let review = reviews::table
        .find(review_id)
        .first::<Review>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Review not found".to_string()))?;
    if review.user_id != user_id {
        return Err(ApiError::Forbidden(
            "You can only edit your own reviews".to_string(),
        ));
    }
    Ok(review)
}

pub async fn update_review(
    Extension(current): Extension<CurrentUser>,
    Path(review_id): Path<Uuid>,
    Json(req): Json<UpdateReviewRequest>,
) -> Result<Json<Review>, ApiError> {
    validate_review(req.rating, &req.comment)?;

    let mut conn = db::establish_connection()?;
    let review = load_own_review(&mut conn, review_id, current.id)?;

    let updated = conn.transaction::<_, ApiError, _>(|conn| {
        diesel::update(reviews::table.find(review.id))
            .set((
                reviews::rating.eq(req.rating),
                reviews::comment.eq(&req.comment),
                reviews::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        recompute_product_rating(conn, review.product_id)?;
        Ok(reviews::table.find(review.id).first::<Review>(conn)?)
    })?;

    Ok(Json(updated))
}

pub async fn delete_review(
    Extension(current): Extension<CurrentUser>,
    Path(review_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut conn = db::establish_connection()?;
    let review = load_own_review(&mut conn, review_id, current.id)?;

    conn.transaction::<_, ApiError, _>(|conn| {
        diesel::delete(reviews::table.find(review.id)).execute(conn)?;
        recompute_product_rating(conn, review.product_id)?;
        Ok(())
    })?;

    Ok(Json(serde_json::json!({ "status": "Review deleted" })))
}

pub async fn list_product_reviews(
    Path(product_id): Path<Uuid>,
) -> Result<Json<Vec<Review>>, ApiError> {
    let mut conn = db::establish_connection()?;
    let found = reviews::table
        .filter(reviews::product_id.eq(product_id))
        .order_by(reviews::created_at.desc())
        .load::<Review>(&mut conn)?;
    Ok(Json(found))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_rounds_to_one_decimal() {
        assert_eq!(average_rating(&[5, 5, 5, 2]), 4.3);
        assert_eq!(average_rating(&[1, 2]), 1.5);
        assert_eq!(average_rating(&[5]), 5.0);
        assert_eq!(average_rating(&[]), 0.0);
        assert_eq!(average_rating(&[4, 4, 5]), 4.3);
    }

    #[test]
    fn test_validate_review_bounds() {
        assert!(validate_review(1, "fresh").is_ok());
        assert!(validate_review(5, "fresh").is_ok());
        assert!(validate_review(0, "fresh").is_err());
        assert!(validate_review(6, "fresh").is_err());
        assert!(validate_review(3, "   ").is_err());
    }
}
