pub mod admin;
pub mod drivers;
pub mod orders;
pub mod sessions;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::engine;
use crate::gateway::InboundEvent;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(orders::router())
        .merge(drivers::router())
        .merge(sessions::router())
        .merge(admin::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/gateway/events", post(gateway_event))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    orders: usize,
    drivers: usize,
    active_sessions: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let now = Utc::now();
    let active_sessions = state
        .sessions
        .iter()
        .filter(|entry| entry.value().is_active(now))
        .count();
    Json(HealthResponse {
        status: "ok",
        orders: state.orders.len(),
        drivers: state.drivers.len(),
        active_sessions,
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}

#[derive(Serialize)]
struct GatewayResponse {
    result: String,
}

/// Inbound traffic from the messaging transport. Always 200: failures are
/// degraded to a user-visible notice by the dispatcher.
async fn gateway_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<InboundEvent>,
) -> Json<GatewayResponse> {
    let result = engine::handle_event(&state, event).await;
    Json(GatewayResponse { result })
}
