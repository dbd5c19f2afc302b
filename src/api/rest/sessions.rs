use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::session::LiveSession;
use crate::sessions;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/sessions",
        post(start_session).delete(stop_session).get(list_sessions),
    )
}

#[derive(Deserialize)]
pub struct SessionRequest {
    pub driver_id: i64,
    pub order_id: u64,
}

async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SessionRequest>,
) -> Result<Json<LiveSession>, AppError> {
    let session = sessions::start(&state, payload.driver_id, payload.order_id).await?;
    Ok(Json(session))
}

#[derive(Serialize)]
struct StopResponse {
    stopped: bool,
}

async fn stop_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SessionRequest>,
) -> Json<StopResponse> {
    let stopped = sessions::stop(&state, payload.driver_id, payload.order_id)
        .await
        .is_some();
    Json(StopResponse { stopped })
}

#[derive(Deserialize)]
pub struct ListSessionsParams {
    #[serde(default)]
    pub active: bool,
}

async fn list_sessions(
    State(state): State<Arc<AppState>>,
    axum::extract::Query(params): axum::extract::Query<ListSessionsParams>,
) -> Json<Vec<LiveSession>> {
    let now = Utc::now();
    let mut sessions: Vec<LiveSession> = state
        .sessions
        .iter()
        .filter(|entry| !params.active || entry.value().is_active(now))
        .map(|entry| entry.value().clone())
        .collect();
    sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
    Json(sessions)
}
