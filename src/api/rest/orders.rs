use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::engine::lifecycle::{self, ArriveTrigger, AssignOutcome, OrderSeed};
use crate::error::AppError;
use crate::models::order::{Order, OrderLocation, OrderStatus};
use crate::sessions::{self, RoutePreview};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/archive_stale", post(archive_stale))
        .route("/orders/:id", get(get_order).patch(edit_order).delete(delete_order))
        .route("/orders/:id/assign", post(assign_order))
        .route("/orders/:id/pickup", post(pickup_order))
        .route("/orders/:id/arrive", post(arrive_order))
        .route("/orders/:id/complete", post(complete_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/archive", post(archive_order))
        .route("/orders/:id/paid", post(mark_paid))
        .route("/orders/:id/feedback", post(record_feedback))
        .route("/orders/:id/route", get(route_preview))
}

#[derive(Deserialize, Default)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub customer_id: Option<i64>,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub items: String,
    #[serde(default)]
    pub location: Option<OrderLocation>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Json<Order> {
    let order = lifecycle::create_order(
        &state,
        OrderSeed {
            customer_id: payload.customer_id,
            customer_name: payload.customer_name,
            items: payload.items,
            location: payload.location,
        },
    )
    .await;
    Json(order)
}

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub section: Option<String>,
}

fn section_statuses(section: &str) -> &'static [OrderStatus] {
    match section {
        "orders" => &[OrderStatus::New],
        "active" => &[
            OrderStatus::Assigned,
            OrderStatus::PickedUp,
            OrderStatus::Arrived,
        ],
        "completed" => &[
            OrderStatus::Completed,
            OrderStatus::Cancelled,
            OrderStatus::Archived,
        ],
        _ => &[],
    }
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Order>>, AppError> {
    let mut orders: Vec<Order> = match params.section.as_deref() {
        None => state.orders.iter().map(|e| e.value().clone()).collect(),
        Some(section) => {
            let statuses = section_statuses(section);
            if statuses.is_empty() {
                return Err(AppError::BadRequest(format!("unknown section {section}")));
            }
            state
                .orders
                .iter()
                .filter(|e| statuses.contains(&e.value().status))
                .map(|e| e.value().clone())
                .collect()
        }
    };
    orders.sort_by_key(|o| o.id);
    Ok(Json(orders))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
    Ok(Json(order.value().clone()))
}

#[derive(Serialize)]
struct AssignResponse {
    assigned: bool,
    driver_id: Option<i64>,
    driver_name: Option<String>,
}

async fn assign_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<AssignResponse>, AppError> {
    match lifecycle::assign_order(&state, id).await? {
        AssignOutcome::Assigned(driver) => Ok(Json(AssignResponse {
            assigned: true,
            driver_id: Some(driver.id),
            driver_name: Some(driver.name),
        })),
        AssignOutcome::Queued => Ok(Json(AssignResponse {
            assigned: false,
            driver_id: None,
            driver_name: None,
        })),
    }
}

#[derive(Deserialize)]
pub struct PickupRequest {
    pub driver_id: i64,
}

async fn pickup_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(payload): Json<PickupRequest>,
) -> Result<Json<Order>, AppError> {
    lifecycle::pickup_order(&state, id, payload.driver_id).await?;
    fetch(&state, id)
}

async fn arrive_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Order>, AppError> {
    lifecycle::arrive_order(&state, id, ArriveTrigger::Manual).await?;
    fetch(&state, id)
}

async fn complete_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Order>, AppError> {
    lifecycle::complete_order(&state, id).await?;
    fetch(&state, id)
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Order>, AppError> {
    lifecycle::cancel_order(&state, id).await?;
    fetch(&state, id)
}

async fn archive_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Order>, AppError> {
    lifecycle::archive_order(&state, id).await?;
    fetch(&state, id)
}

#[derive(Serialize)]
struct ArchiveStaleResponse {
    archived: usize,
}

async fn archive_stale(State(state): State<Arc<AppState>>) -> Json<ArchiveStaleResponse> {
    let archived = lifecycle::archive_stale(&state).await;
    Json(ArchiveStaleResponse { archived })
}

async fn mark_paid(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Order>, AppError> {
    lifecycle::mark_paid(&state, id).await?;
    fetch(&state, id)
}

#[derive(Deserialize)]
pub struct FeedbackRequest {
    pub rating: u8,
}

async fn record_feedback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<Json<Order>, AppError> {
    lifecycle::record_feedback(&state, id, payload.rating).await?;
    fetch(&state, id)
}

async fn delete_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Order>, AppError> {
    let order = lifecycle::delete_order(&state, id).await?;
    Ok(Json(order))
}

/// Direct field edits over REST; the chat flow uses the pending-edit slot
/// instead, but both paths share the same arithmetic.
#[derive(Deserialize, Default)]
pub struct EditOrderRequest {
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub given_cash: Option<f64>,
    #[serde(default)]
    pub items: Option<String>,
    #[serde(default)]
    pub location: Option<OrderLocation>,
}

async fn edit_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(payload): Json<EditOrderRequest>,
) -> Result<Json<Order>, AppError> {
    {
        let mut order = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
        if let Some(name) = payload.customer_name {
            order.customer_name = name;
        }
        if let Some(total) = payload.total_amount {
            order.set_total_amount(total);
        }
        if let Some(given) = payload.given_cash {
            order.set_given_cash(given);
        }
        if let Some(items) = payload.items {
            order.items = items;
        }
        if let Some(location) = payload.location {
            order.location = Some(location);
        }
    }
    state.save().await;
    fetch(&state, id)
}

#[derive(Serialize)]
struct RouteResponse {
    available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview: Option<RoutePreview>,
}

async fn route_preview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<RouteResponse>, AppError> {
    let driver_id = state
        .orders
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?
        .driver_id
        .ok_or_else(|| AppError::BadRequest(format!("order {id} has no driver")))?;
    let preview = sessions::route_preview(&state, driver_id, id)?;
    Ok(Json(RouteResponse {
        available: preview.is_some(),
        preview,
    }))
}

fn fetch(state: &AppState, id: u64) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
    Ok(Json(order.value().clone()))
}
