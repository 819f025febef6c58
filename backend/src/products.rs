use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth;
use crate::db;
use crate::error::ApiError;
use crate::models::{NewProduct, Product};
use crate::schema::products;
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub category: String,
    pub description: String,
    pub price: i64,
    pub unit: String,
    pub stock: i32,
    pub tags: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub unit: Option<String>,
    pub stock: Option<i32>,
    pub tags: Option<String>,
}

#[derive(Deserialize)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub search: Option<String>,
}

fn validate_listing(name: &str, price: i64, stock: i32) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::Validation("Product name is required".to_string()));
    }
    if price <= 0 {
        return Err(ApiError::Validation("Price must be positive".to_string()));
    }
    if stock < 0 {
        return Err(ApiError::Validation("Stock cannot be negative".to_string()));
    }
    Ok(())
}

pub async fn create_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateProductRequest>,
) -> Result<Json<Product>, ApiError> {
    // The listing paths mix public reads with farmer-only writes, so the
    // token is checked here rather than by the router middleware.
    let current = auth::authenticate_request(&headers, &state.config.jwt_secret)?;
    if !current.role.can_manage_products() {
        return Err(ApiError::Forbidden(
            "Only farmers can list products".to_string(),
        ));
    }
    validate_listing(&req.name, req.price, req.stock)?;

    let mut conn = db::establish_connection()?;
    let now = Utc::now().naive_utc();
    let new_product = NewProduct {
        id: Uuid::new_v4(),
        farmer_id: current.id,
        name: req.name,
        category: req.category,
        description: req.description,
        price: req.price,
        unit: req.unit,
        stock: req.stock,
        tags: req.tags.unwrap_or_default(),
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(products::table)
        .values(&new_product)
        .execute(&mut conn)?;

    let product = products::table
        .find(new_product.id)
        .first::<Product>(&mut conn)?;
    info!("Farmer {} listed product {}", current.id, product.id);
    Ok(Json(product))
}

/// Public catalog listing, newest first. Optional category and name filters.
pub async fn list_products(
    Query(filter): Query<ProductFilter>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let mut conn = db::establish_connection()?;

    let mut query = products::table
        .filter(products::is_active.eq(true))
        .into_boxed();
    if let Some(category) = filter.category {
        query = query.filter(products::category.eq(category));
    }
    if let Some(search) = filter.search {
        query = query.filter(products::name.ilike(format!("%{}%", search)));
    }

    let items = query
        .order_by(products::created_at.desc())
        .load::<Product>(&mut conn)?;
    Ok(Json(items))
}

pub async fn get_product(Path(product_id): Path<Uuid>) -> Result<Json<Product>, ApiError> {
    let mut conn = db::establish_connection()?;
    let product = products::table
        .filter(products::id.eq(product_id))
        .filter(products::is_active.eq(true))
        .first::<Product>(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;
    Ok(Json(product))
}

fn load_owned_product(
    conn: &mut PgConnection,
    product_id: Uuid,
    farmer_id: Uuid,
) -> Result<Product, ApiError> {
    let product = products::table
        .find(product_id)
        .first::<Product>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;
    if product.farmer_id != farmer_id {
        return Err(ApiError::Forbidden(
            "You do not own this listing".to_string(),
        ));
    }
    Ok(product)
}

pub async fn update_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(product_id): Path<Uuid>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<Product>, ApiError> {
    let current = auth::authenticate_request(&headers, &state.config.jwt_secret)?;
    let mut conn = db::establish_connection()?;
    let product = load_owned_product(&mut conn, product_id, current.id)?;

    let name = req.name.unwrap_or(product.name);
    let price = req.price.unwrap_or(product.price);
    let stock = req.stock.unwrap_or(product.stock);
    validate_listing(&name, price, stock)?;

    diesel::update(products::table.find(product_id))
        .set((
            products::name.eq(name),
            products::category.eq(req.category.unwrap_or(product.category)),
            products::description.eq(req.description.unwrap_or(product.description)),
            products::price.eq(price),
            products::unit.eq(req.unit.unwrap_or(product.unit)),
            products::stock.eq(stock),
            products::tags.eq(req.tags.unwrap_or(product.tags)),
            products::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    let updated = products::table.find(product_id).first::<Product>(&mut conn)?;
    Ok(Json(updated))
}

/// Deactivates a listing. Order history keeps its product references, so
/// rows are never physically deleted.
pub async fn delete_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(product_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let current = auth::authenticate_request(&headers, &state.config.jwt_secret)?;
    let mut conn = db::establish_connection()?;
    load_owned_product(&mut conn, product_id, current.id)?;

    diesel::update(products::table.find(product_id))
        .set((
            products::is_active.eq(false),
            products::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    info!("Farmer {} removed listing {}", current.id, product_id);
    Ok(Json(serde_json::json!({ "status": "Product removed" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_listing() {
        assert!(validate_listing("Tomatoes", 100, 10).is_ok());
        assert!(validate_listing("", 100, 10).is_err());
        assert!(validate_listing("Tomatoes", 0, 10).is_err());
        assert!(validate_listing("Tomatoes", 100, -1).is_err());
    }
}
