use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::engine;
use crate::error::AppError;
use crate::gateway::notify;
use crate::models::driver::{Driver, DriverStatus, GeoPoint};
use crate::sessions::{self, LocationOutcome};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(register_driver).get(list_drivers))
        .route("/drivers/:id/approve", post(approve_driver))
        .route("/drivers/:id/status", patch(update_driver_status))
        .route("/drivers/:id/location", patch(report_location))
}

#[derive(Deserialize)]
pub struct RegisterDriverRequest {
    pub id: i64,
    pub name: String,
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if state.drivers.contains_key(&payload.id) {
        return Err(AppError::BadRequest(format!(
            "driver {} already registered",
            payload.id
        )));
    }

    let driver = Driver::new(payload.id, payload.name);
    state.drivers.insert(driver.id, driver.clone());
    state.save().await;

    if let Some(admin_id) = state.admin_id {
        notify(
            state.gateway.as_ref(),
            admin_id,
            format!("Driver {} ({}) requests approval", driver.name, driver.id),
        )
        .await;
    }
    Ok(Json(driver))
}

#[derive(Deserialize)]
pub struct ListDriversParams {
    /// Only drivers that are online, assigned, or busy.
    #[serde(default)]
    pub connected: bool,
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    axum::extract::Query(params): axum::extract::Query<ListDriversParams>,
) -> Json<Vec<Driver>> {
    let mut drivers: Vec<Driver> = state
        .drivers
        .iter()
        .filter(|e| !params.connected || e.value().is_connected())
        .map(|e| e.value().clone())
        .collect();
    drivers.sort_by_key(|d| d.id);
    Json(drivers)
}

async fn approve_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Driver>, AppError> {
    let driver = engine::approve_driver(&state, id).await?;
    Ok(Json(driver))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

/// Connect/disconnect. Order-progress statuses (`Assigned`, `Busy`) are set
/// by the lifecycle engine, not over this endpoint.
async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Driver>, AppError> {
    if !matches!(payload.status, DriverStatus::Online | DriverStatus::Offline) {
        return Err(AppError::BadRequest(
            "status must be Online or Offline".to_string(),
        ));
    }
    let driver = {
        let mut driver = state
            .drivers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;
        if driver.status == DriverStatus::Pending {
            return Err(AppError::BadRequest(format!(
                "driver {id} is pending approval"
            )));
        }
        driver.status = payload.status;
        driver.clone()
    };
    state.save().await;

    if let Some(admin_id) = state.admin_id {
        let what = if driver.status == DriverStatus::Online {
            "connected"
        } else {
            "disconnected"
        };
        notify(
            state.gateway.as_ref(),
            admin_id,
            format!("Driver {} {what}", driver.name),
        )
        .await;
    }
    Ok(Json(driver))
}

#[derive(Deserialize)]
pub struct ReportLocationRequest {
    pub lat: f64,
    pub lng: f64,
}

/// A driver position report; feeds the live-session scheduler.
async fn report_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<ReportLocationRequest>,
) -> Result<Json<LocationOutcome>, AppError> {
    let outcome = sessions::update_location(
        &state,
        id,
        GeoPoint {
            lat: payload.lat,
            lng: payload.lng,
        },
    )
    .await?;
    Ok(Json(outcome))
}
