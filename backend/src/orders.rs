use axum::{extract::Path, extract::State, Extension, Json};
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db;
use crate::error::ApiError;
use crate::models::{
    NewOrder, NewOrderItem, Order, OrderItem, OrderStatus, Product, Role,
};
use crate::notify::{self, Receipt, ReceiptLine};
use crate::schema::{cart_items, order_items, orders, products};
use crate::AppState;

#[derive(Deserialize)]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderLineRequest>,
    pub delivery_address: String,
    pub delivery_date: String,
    pub delivery_time: String,
    pub payment_method: String,
    #[serde(default)]
    pub delivery_fee: i64,
    #[serde(default)]
    pub service_fee: i64,
}

#[derive(Serialize)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

fn order_subtotal(lines: &[(Product, i32)]) -> i64 {
    lines
        .iter()
        .map(|(product, quantity)| product.price * i64::from(*quantity))
        .sum()
}

fn validate_checkout(req: &CreateOrderRequest) -> Result<(), ApiError> {
    if req.items.is_empty() {
        return Err(ApiError::Validation("Order has no items".to_string()));
    }
    if req.items.iter().any(|line| line.quantity <= 0) {
        return Err(ApiError::Validation(
            "Quantities must be positive".to_string(),
        ));
    }
    if req.delivery_address.trim().is_empty()
        || req.delivery_date.trim().is_empty()
        || req.delivery_time.trim().is_empty()
    {
        return Err(ApiError::Validation(
            "Delivery address, date and time are required".to_string(),
        ));
    }
    if req.payment_method.trim().is_empty() {
        return Err(ApiError::Validation(
            "Payment method is required".to_string(),
        ));
    }
    if req.delivery_fee < 0 || req.service_fee < 0 {
        return Err(ApiError::Validation("Fees cannot be negative".to_string()));
    }
    Ok(())
}

/// Checkout. All stock decrements and the order insert run in one database
/// transaction: a line with insufficient stock aborts the whole request and
/// rolls back every earlier decrement. The decrement itself is conditional
/// (`stock >= quantity` in the UPDATE filter) so two concurrent checkouts
/// cannot both take the last units.
pub async fn create_order(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, ApiError> {
    if !current.role.can_shop() {
        return Err(ApiError::Forbidden(
            "Farmer accounts cannot place orders".to_string(),
        ));
    }
    validate_checkout(&req)?;

    let mut conn = db::establish_connection()?;
    let now = Utc::now().naive_utc();

    let (order, lines) = conn.transaction::<_, ApiError, _>(|conn| {
        let mut lines: Vec<(Product, i32)> = Vec::with_capacity(req.items.len());

        for line in &req.items {
            let product = products::table
                .filter(products::id.eq(line.product_id))
                .filter(products::is_active.eq(true))
                .first::<Product>(conn)
                .optional()?
                .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;

            let updated = diesel::update(
                products::table
                    .filter(products::id.eq(line.product_id))
                    .filter(products::stock.ge(line.quantity)),
            )
            .set((
                products::stock.eq(products::stock - line.quantity),
                products::sales_count.eq(products::sales_count + line.quantity),
                products::updated_at.eq(now),
            ))
            .execute(conn)?;
            if updated == 0 {
                return Err(ApiError::Conflict(format!(
                    "Insufficient stock for {}",
                    product.name
                )));
            }

            lines.push((product, line.quantity));
        }

        let subtotal = order_subtotal(&lines);
        let new_order = NewOrder {
            id: Uuid::new_v4(),
            user_id: current.id,
            status: OrderStatus::Pending.as_str().to_string(),
            subtotal,
            delivery_fee: req.delivery_fee,
            service_fee: req.service_fee,
            total: subtotal + req.delivery_fee + req.service_fee,
            delivery_address: req.delivery_address.clone(),
            delivery_date: req.delivery_date.clone(),
            delivery_time: req.delivery_time.clone(),
            payment_method: req.payment_method.clone(),
            transaction_id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
        };
        diesel::insert_into(orders::table)
            .values(&new_order)
            .execute(conn)?;

        let new_items: Vec<NewOrderItem> = lines
            .iter()
            .map(|(product, quantity)| NewOrderItem {
                id: Uuid::new_v4(),
                order_id: new_order.id,
                product_id: product.id,
                farmer_id: product.farmer_id,
                product_name: product.name.clone(),
                quantity: *quantity,
                unit_price: product.price,
            })
            .collect();
        diesel::insert_into(order_items::table)
            .values(&new_items)
            .execute(conn)?;

        // Purchased lines leave the cart with the same commit.
        let ordered_ids: Vec<Uuid> = lines.iter().map(|(p, _)| p.id).collect();
        diesel::delete(
            cart_items::table
                .filter(cart_items::user_id.eq(current.id))
                .filter(cart_items::product_id.eq_any(&ordered_ids)),
        )
        .execute(conn)?;

        let order = orders::table.find(new_order.id).first::<Order>(conn)?;
        Ok((order, lines))
    })?;

    info!(
        "Order {} placed by user {} ({} lines, total {})",
        order.id,
        current.id,
        lines.len(),
        order.total
    );

    // Receipt generation runs off the request path. A mail failure never
    // affects the committed order.
    let receipt = Receipt {
        order_id: order.id,
        customer_name: current.name.clone(),
        customer_email: current.email.clone(),
        lines: lines
            .iter()
            .map(|(product, quantity)| ReceiptLine {
                name: product.name.clone(),
                quantity: *quantity,
                unit_price: product.price,
            })
            .collect(),
        subtotal: order.subtotal,
        delivery_fee: order.delivery_fee,
        service_fee: order.service_fee,
        total: order.total,
        app_url: state.config.app_url.clone(),
    };
    notify::send_receipt(state.mailer.clone(), state.config.mail_from.clone(), receipt);

    Ok(Json(CreateOrderResponse { order_id: order.id }))
}

fn items_for(conn: &mut PgConnection, order_ids: &[Uuid]) -> Result<Vec<OrderItem>, ApiError> {
    Ok(order_items::table
        .filter(order_items::order_id.eq_any(order_ids))
        .load::<OrderItem>(conn)?)
}

fn with_items(orders: Vec<Order>, mut items: Vec<OrderItem>) -> Vec<OrderResponse> {
    orders
        .into_iter()
        .map(|order| {
            let (mine, rest): (Vec<OrderItem>, Vec<OrderItem>) =
                items.drain(..).partition(|i| i.order_id == order.id);
            items = rest;
            OrderResponse { order, items: mine }
        })
        .collect()
}

/// Customers see their own orders, farmers the orders containing their
/// products.
pub async fn list_orders(
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let mut conn = db::establish_connection()?;

    let found: Vec<Order> = match current.role {
        Role::Customer => orders::table
            .filter(orders::user_id.eq(current.id))
            .order_by(orders::created_at.desc())
            .load::<Order>(&mut conn)?,
        Role::Farmer => orders::table
            .inner_join(order_items::table)
            .filter(order_items::farmer_id.eq(current.id))
            .select(orders::all_columns)
            .distinct()
            .order_by(orders::created_at.desc())
            .load::<Order>(&mut conn)?,
    };

    let ids: Vec<Uuid> = found.iter().map(|o| o.id).collect();
    let items = items_for(&mut conn, &ids)?;
    Ok(Json(with_items(found, items)))
}

pub(crate) fn load_order_authorized(
    conn: &mut PgConnection,
    order_id: Uuid,
    current: &CurrentUser,
) -> Result<(Order, Vec<OrderItem>), ApiError> {
    let order = orders::table
        .find(order_id)
        .first::<Order>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Order not found".to_string()))?;
    let items = items_for(conn, &[order.id])?;

    let is_owner = order.user_id == current.id;
    let is_item_farmer = current.role == Role::Farmer
        && items.iter().any(|i| i.farmer_id == current.id);
    if !is_owner && !is_item_farmer {
        return Err(ApiError::Forbidden(
            "You do not have access to this order".to_string(),
        ));
    }
    Ok((order, items))
}

pub async fn get_order(
    Extension(current): Extension<CurrentUser>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let mut conn = db::establish_connection()?;
    let (order, items) = load_order_authorized(&mut conn, order_id, &current)?;
    Ok(Json(OrderResponse { order, items }))
}

/// Status transitions are validated against the lifecycle; re-submitting the
/// current status is a no-op, which makes cancellation idempotent.
/// Cancellation restores every line's stock in the same transaction as the
/// status write.
pub async fn update_order_status(
    Extension(current): Extension<CurrentUser>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let next = OrderStatus::parse(&req.status)
        .ok_or_else(|| ApiError::Validation(format!("Unknown status: {}", req.status)))?;

    let mut conn = db::establish_connection()?;
    let (order, items) = load_order_authorized(&mut conn, order_id, &current)?;

    // Mutation needs more than read access: the owner, or the farmer of
    // every item.
    let is_owner = order.user_id == current.id;
    let farms_all_items = current.role == Role::Farmer
        && items.iter().all(|i| i.farmer_id == current.id);
    if !is_owner && !farms_all_items {
        return Err(ApiError::Forbidden(
            "You cannot update this order".to_string(),
        ));
    }

    let status = OrderStatus::parse(&order.status)
        .ok_or_else(|| ApiError::Internal(format!("Corrupt status on order {}", order.id)))?;

    if next == status {
        return Ok(Json(OrderResponse { order, items }));
    }
    if !status.can_transition_to(next) {
        return Err(ApiError::Conflict(format!(
            "Order cannot move from {} to {}",
            status.as_str(),
            next.as_str()
        )));
    }

    let now = Utc::now().naive_utc();
    let updated = conn.transaction::<_, ApiError, _>(|conn| {
        // Conditional on the status we validated against, so a concurrent
        // writer cannot sneak in between the check and the write (and a
        // cancellation can never restore stock twice).
        let guarded = diesel::update(
            orders::table
                .filter(orders::id.eq(order.id))
                .filter(orders::status.eq(status.as_str())),
        )
        .set((
            orders::status.eq(next.as_str()),
            orders::updated_at.eq(now),
        ))
        .execute(conn)?;
        if guarded == 0 {
            return Err(ApiError::Conflict(
                "Order was updated concurrently".to_string(),
            ));
        }

        if next == OrderStatus::Cancelled {
            for item in &items {
                diesel::update(products::table.find(item.product_id))
                    .set((
                        products::stock.eq(products::stock + item.quantity),
                        products::sales_count.eq(products::sales_count - item.quantity),
                        products::updated_at.eq(now),
                    ))
                    .execute(conn)?;
            }
        }

        Ok(orders::table.find(order.id).first::<Order>(conn)?)
    })?;

    info!(
        "Order {} moved {} -> {} by user {}",
        updated.id,
        status.as_str(),
        next.as_str(),
        current.id
    );
    Ok(Json(OrderResponse {
        order: updated,
        items,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn product(price: i64, stock: i32) -> Product {
        Product {
            id: Uuid::new_v4(),
            farmer_id: Uuid::new_v4(),
            name: "Potatoes".to_string(),
            category: "vegetables".to_string(),
            description: String::new(),
            price,
            unit: "kg".to_string(),
            stock,
            sales_count: 0,
            tags: String::new(),
            rating: 0.0,
            review_count: 0,
            is_active: true,
            created_at: NaiveDateTime::default(),
            updated_at: NaiveDateTime::default(),
        }
    }

    fn checkout_request(items: Vec<OrderLineRequest>) -> CreateOrderRequest {
        CreateOrderRequest {
            items,
            delivery_address: "1 Main St".to_string(),
            delivery_date: "2026-09-01".to_string(),
            delivery_time: "10:00".to_string(),
            payment_method: "card".to_string(),
            delivery_fee: 50,
            service_fee: 25,
        }
    }

    #[test]
    fn test_subtotal_and_total_arithmetic() {
        let lines = vec![(product(100, 10), 3)];
        let subtotal = order_subtotal(&lines);
        assert_eq!(subtotal, 300);
        assert_eq!(subtotal + 50 + 25, 375);
    }

    #[test]
    fn test_subtotal_spans_lines() {
        let lines = vec![(product(100, 10), 2), (product(40, 5), 3)];
        assert_eq!(order_subtotal(&lines), 320);
    }

    #[test]
    fn test_validate_checkout_rejects_empty_and_bad_input() {
        let req = checkout_request(vec![]);
        assert!(validate_checkout(&req).is_err());

        let req = checkout_request(vec![OrderLineRequest {
            product_id: Uuid::new_v4(),
            quantity: 0,
        }]);
        assert!(validate_checkout(&req).is_err());

        let mut req = checkout_request(vec![OrderLineRequest {
            product_id: Uuid::new_v4(),
            quantity: 1,
        }]);
        req.delivery_address = "  ".to_string();
        assert!(validate_checkout(&req).is_err());

        let req = checkout_request(vec![OrderLineRequest {
            product_id: Uuid::new_v4(),
            quantity: 1,
        }]);
        assert!(validate_checkout(&req).is_ok());
    }

    #[test]
    fn test_with_items_groups_by_order() {
        let now = NaiveDateTime::default();
        let make_order = |id: Uuid| Order {
            id,
            user_id: Uuid::new_v4(),
            status: "pending".to_string(),
            subtotal: 0,
            delivery_fee: 0,
            service_fee: 0,
            total: 0,
            delivery_address: String::new(),
            delivery_date: String::new(),
            delivery_time: String::new(),
            payment_method: String::new(),
            transaction_id: String::new(),
            created_at: now,
            updated_at: now,
        };
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let item = |order_id: Uuid| OrderItem {
            id: Uuid::new_v4(),
            order_id,
            product_id: Uuid::new_v4(),
            farmer_id: Uuid::new_v4(),
            product_name: String::new(),
            quantity: 1,
            unit_price: 1,
        };

        let grouped = with_items(
            vec![make_order(a), make_order(b)],
            vec![item(a), item(b), item(a)],
        );
        assert_eq!(grouped[0].items.len(), 2);
        assert_eq!(grouped[1].items.len(), 1);
    }
}
