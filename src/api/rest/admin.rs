use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::profile::ShiftProfile;
use crate::models::qr::{QrCode, QrMedia};
use crate::models::settings::Settings;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/settings", get(get_settings).patch(update_settings))
        .route("/qr_codes", post(create_qr).get(list_qr))
        .route("/profiles", post(create_profile).get(list_profiles))
}

async fn get_settings(State(state): State<Arc<AppState>>) -> Json<Settings> {
    Json(state.settings.read().expect("settings lock poisoned").clone())
}

#[derive(Deserialize, Default)]
pub struct UpdateSettingsRequest {
    #[serde(default)]
    pub archive_days: Option<i64>,
    #[serde(default)]
    pub display_emojis: Option<bool>,
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdateSettingsRequest>,
) -> Result<Json<Settings>, AppError> {
    if let Some(days) = payload.archive_days {
        if days < 1 {
            return Err(AppError::BadRequest("archive_days must be >= 1".to_string()));
        }
    }
    let updated = {
        let mut settings = state.settings.write().expect("settings lock poisoned");
        if let Some(days) = payload.archive_days {
            settings.archive_days = days;
        }
        if let Some(display_emojis) = payload.display_emojis {
            settings.display_emojis = display_emojis;
        }
        settings.clone()
    };
    state.save().await;
    Ok(Json(updated))
}

#[derive(Deserialize)]
pub struct CreateQrRequest {
    pub code: String,
    #[serde(default)]
    pub media: Option<QrMedia>,
}

async fn create_qr(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateQrRequest>,
) -> Result<Json<QrCode>, AppError> {
    if payload.code.trim().is_empty() {
        return Err(AppError::BadRequest("code cannot be empty".to_string()));
    }
    let id = state.qr_codes.len() as u64 + 1;
    let mut qr = QrCode::new(id, payload.code);
    qr.media = payload.media;
    state.qr_codes.insert(qr.id, qr.clone());
    state.save().await;
    Ok(Json(qr))
}

async fn list_qr(State(state): State<Arc<AppState>>) -> Json<Vec<QrCode>> {
    let mut codes: Vec<QrCode> = state.qr_codes.iter().map(|e| e.value().clone()).collect();
    codes.sort_by_key(|q| q.id);
    Json(codes)
}

#[derive(Deserialize)]
pub struct CreateProfileRequest {
    pub name: String,
    pub pin: String,
}

async fn create_profile(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateProfileRequest>,
) -> Result<Json<ShiftProfile>, AppError> {
    if payload.pin.len() != 4 || !payload.pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::BadRequest("pin must be 4 digits".to_string()));
    }
    let profile = ShiftProfile::new(state.next_profile_id(), payload.name, payload.pin);
    state.shift_profiles.insert(profile.id, profile.clone());
    state.save().await;
    Ok(Json(profile))
}

async fn list_profiles(State(state): State<Arc<AppState>>) -> Json<Vec<ShiftProfile>> {
    let mut profiles: Vec<ShiftProfile> = state
        .shift_profiles
        .iter()
        .map(|e| e.value().clone())
        .collect();
    profiles.sort_by_key(|p| p.id);
    Json(profiles)
}
