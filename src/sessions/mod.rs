use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine::lifecycle::{self, ArriveTrigger};
use crate::error::AppError;
use crate::gateway::{forward_location, notify};
use crate::geo;
use crate::models::driver::GeoPoint;
use crate::models::order::OrderStatus;
use crate::models::session::LiveSession;
use crate::state::{AppState, DispatchEvent};

/// Cadence for re-sending the last known location to the customer.
pub const FORWARD_INTERVAL: Duration = Duration::from_secs(15);

/// Geofence radius for proximity-detected arrival.
pub const ARRIVAL_RADIUS_M: f64 = 40.0;

/// Timer pair for one armed session. A session is either fully armed (both
/// tasks running) or fully inert.
pub struct SessionTasks {
    expiry: JoinHandle<()>,
    forward: JoinHandle<()>,
}

impl SessionTasks {
    fn abort_all(&self) {
        self.expiry.abort();
        self.forward.abort();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationOutcome {
    NoActiveSession,
    Updated { forwarded: bool, auto_arrived: bool },
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RoutePreview {
    pub distance_m: f64,
    pub eta_secs: u64,
}

fn install_tasks(state: &AppState, session_id: &str, tasks: SessionTasks) {
    match state.session_tasks.insert(session_id.to_string(), tasks) {
        Some(old) => old.abort_all(),
        None => state.metrics.sessions_active.inc(),
    }
}

fn disarm(state: &AppState, session_id: &str, abort_expiry: bool) {
    if let Some((_, tasks)) = state.session_tasks.remove(session_id) {
        if abort_expiry {
            tasks.expiry.abort();
        }
        tasks.forward.abort();
        state.metrics.sessions_active.dec();
    }
}

/// Arm both timers for a session, replacing any previous pair.
fn arm(state: &Arc<AppState>, session: &LiveSession) {
    let delay = (session.expires_at - Utc::now())
        .to_std()
        .unwrap_or(Duration::ZERO);

    let expiry = {
        let state = state.clone();
        let session_id = session.id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            expire(state, session_id).await;
        })
    };

    let forward = {
        let state = state.clone();
        let session_id = session.id.clone();
        tokio::spawn(async move {
            run_forwarder(state, session_id).await;
        })
    };

    install_tasks(state, &session.id, SessionTasks { expiry, forward });
}

async fn expire(state: Arc<AppState>, session_id: String) {
    let ended = {
        let Some(mut session) = state.sessions.get_mut(&session_id) else {
            return;
        };
        if session.ended {
            None
        } else {
            session.end();
            Some((session.driver_id, session.order_id))
        }
    };
    let Some((driver_id, order_id)) = ended else {
        disarm(&state, &session_id, false);
        return;
    };

    state.metrics.session_expiries_total.inc();
    disarm(&state, &session_id, false);
    state.save().await;

    notify(
        state.gateway.as_ref(),
        driver_id,
        "Live location session expired.",
    )
    .await;
    let customer_id = state.orders.get(&order_id).and_then(|o| o.customer_id);
    if let Some(customer_id) = customer_id {
        notify(
            state.gateway.as_ref(),
            customer_id,
            "Driver live location sharing has ended.",
        )
        .await;
    }
    state.publish(DispatchEvent::SessionEnded {
        session_id,
        reason: "expired",
    });
    info!(driver_id, order_id, "live session expired");
}

async fn run_forwarder(state: Arc<AppState>, session_id: String) {
    let mut interval = tokio::time::interval(FORWARD_INTERVAL);
    interval.tick().await; // the first tick completes immediately
    loop {
        interval.tick().await;
        let Some((last_location, order_id, ended)) = state
            .sessions
            .get(&session_id)
            .map(|s| (s.last_location, s.order_id, s.ended))
        else {
            break;
        };
        if ended {
            break;
        }
        let Some(point) = last_location else {
            continue;
        };
        let customer_id = state.orders.get(&order_id).and_then(|o| o.customer_id);
        if let Some(customer_id) = customer_id {
            forward_location(state.gateway.as_ref(), customer_id, point).await;
        }
    }
}

/// Start live sharing for a driver/order pair. Any prior active session for
/// the driver is ended first, so at most one exists per driver.
pub async fn start(
    state: &Arc<AppState>,
    driver_id: i64,
    order_id: u64,
) -> Result<LiveSession, AppError> {
    let driver_name = state
        .drivers
        .get(&driver_id)
        .map(|d| d.name.clone())
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;
    if !state.orders.contains_key(&order_id) {
        return Err(AppError::NotFound(format!("order {order_id} not found")));
    }

    end_sessions_for_driver(state, driver_id, "replaced").await;

    let session = LiveSession::start(driver_id, order_id);
    state.sessions.insert(session.id.clone(), session.clone());
    arm(state, &session);
    state.save().await;

    let customer_id = state.orders.get(&order_id).and_then(|o| o.customer_id);
    if let Some(customer_id) = customer_id {
        notify(
            state.gateway.as_ref(),
            customer_id,
            format!(
                "{driver_name} started sharing live location (valid until {}).",
                session.expires_at.format("%H:%M")
            ),
        )
        .await;
    }
    state.publish(DispatchEvent::SessionStarted {
        session_id: session.id.clone(),
        driver_id,
        order_id,
    });
    info!(driver_id, order_id, session_id = %session.id, "live session started");
    Ok(session)
}

/// A driver location report: slide the expiry window, forward to the
/// customer, and check the arrival geofence.
pub async fn update_location(
    state: &Arc<AppState>,
    driver_id: i64,
    point: GeoPoint,
) -> Result<LocationOutcome, AppError> {
    {
        let Some(mut driver) = state.drivers.get_mut(&driver_id) else {
            return Err(AppError::NotFound(format!("driver {driver_id} not found")));
        };
        driver.last_known = Some(point);
    }

    let Some(active) = state.active_session_for_driver(driver_id) else {
        state.save().await;
        return Ok(LocationOutcome::NoActiveSession);
    };

    let (session, driver_name) = {
        let mut session = state
            .sessions
            .get_mut(&active.id)
            .ok_or_else(|| AppError::Internal("active session vanished".to_string()))?;
        session.last_location = Some(point);
        session.touch(Utc::now());
        let snapshot = session.clone();
        drop(session);
        let name = state
            .drivers
            .get(&driver_id)
            .map(|d| d.name.clone())
            .unwrap_or_default();
        (snapshot, name)
    };

    // sliding window: replace both timers with a fresh pair
    arm(state, &session);
    state.save().await;

    let order = state.orders.get(&session.order_id).map(|o| o.clone());
    let Some(order) = order else {
        warn!(order_id = session.order_id, "session references missing order");
        return Ok(LocationOutcome::Updated {
            forwarded: false,
            auto_arrived: false,
        });
    };

    let forwarded = if let Some(customer_id) = order.customer_id {
        forward_location(state.gateway.as_ref(), customer_id, point).await;
        notify(
            state.gateway.as_ref(),
            customer_id,
            format!(
                "{driver_name} shared live location (valid until {}).",
                session.expires_at.format("%H:%M")
            ),
        )
        .await;
        true
    } else {
        false
    };

    let mut auto_arrived = false;
    if let Some(destination) = order.destination() {
        let distance_m = geo::haversine_m(point, destination);
        let eligible = matches!(
            order.status,
            OrderStatus::New | OrderStatus::Assigned | OrderStatus::PickedUp
        );
        if distance_m <= ARRIVAL_RADIUS_M && eligible {
            lifecycle::arrive_order(state, order.id, ArriveTrigger::Auto { distance_m }).await?;
            auto_arrived = true;
        }
    }

    Ok(LocationOutcome::Updated {
        forwarded,
        auto_arrived,
    })
}

/// Explicit stop for a driver/order pair.
pub async fn stop(state: &AppState, driver_id: i64, order_id: u64) -> Option<LiveSession> {
    let session_id = state.sessions.iter().find_map(|entry| {
        let s = entry.value();
        (s.driver_id == driver_id && s.order_id == order_id && !s.ended).then(|| s.id.clone())
    })?;

    let session = {
        let mut session = state.sessions.get_mut(&session_id)?;
        session.end();
        session.clone()
    };
    disarm(state, &session_id, true);
    state.save().await;

    let customer_id = state.orders.get(&order_id).and_then(|o| o.customer_id);
    if let Some(customer_id) = customer_id {
        notify(
            state.gateway.as_ref(),
            customer_id,
            "Driver stopped sharing live location.",
        )
        .await;
    }
    state.publish(DispatchEvent::SessionEnded {
        session_id,
        reason: "stopped",
    });
    Some(session)
}

/// End every non-ended session a driver owns, without customer notices.
/// Used on arrival and when a new session replaces the old one.
pub async fn stop_for_driver(state: &AppState, driver_id: i64, reason: &'static str) -> bool {
    end_sessions_for_driver(state, driver_id, reason).await
}

async fn end_sessions_for_driver(state: &AppState, driver_id: i64, reason: &'static str) -> bool {
    let ids: Vec<String> = state
        .sessions
        .iter()
        .filter(|entry| entry.value().driver_id == driver_id && !entry.value().ended)
        .map(|entry| entry.value().id.clone())
        .collect();
    if ids.is_empty() {
        return false;
    }
    for session_id in &ids {
        if let Some(mut session) = state.sessions.get_mut(session_id) {
            session.end();
        }
        disarm(state, session_id, true);
        state.publish(DispatchEvent::SessionEnded {
            session_id: session_id.clone(),
            reason,
        });
    }
    state.save().await;
    true
}

/// Startup pass: drop ended, expired, or dangling sessions and re-arm the
/// rest from their persisted expiry. Returns how many were dropped.
pub async fn rehydrate(state: &Arc<AppState>) -> usize {
    let now = Utc::now();
    let mut keep: Vec<LiveSession> = Vec::new();
    let mut drop_ids: Vec<String> = Vec::new();

    for entry in state.sessions.iter() {
        let session = entry.value();
        let refs_ok = state.drivers.contains_key(&session.driver_id)
            && match state.orders.get(&session.order_id) {
                Some(order) => order
                    .customer_id
                    .is_none_or(|customer_id| state.customers.contains_key(&customer_id)),
                None => false,
            };
        if session.is_active(now) && refs_ok {
            keep.push(session.clone());
        } else {
            drop_ids.push(session.id.clone());
        }
    }

    for session_id in &drop_ids {
        state.sessions.remove(session_id);
    }
    for session in &keep {
        arm(state, session);
    }
    if !drop_ids.is_empty() {
        state.save().await;
    }
    info!(
        rearmed = keep.len(),
        dropped = drop_ids.len(),
        "session rehydration"
    );
    drop_ids.len()
}

/// Stateless distance/ETA read from the driver's best-known position to the
/// order's structured destination. `None` when either endpoint is missing.
pub fn route_preview(
    state: &AppState,
    driver_id: i64,
    order_id: u64,
) -> Result<Option<RoutePreview>, AppError> {
    let Some(order) = state.orders.get(&order_id).map(|o| o.clone()) else {
        return Err(AppError::NotFound(format!("order {order_id} not found")));
    };
    let Some(destination) = order.destination() else {
        return Ok(None);
    };

    let origin = state
        .active_session_for_driver(driver_id)
        .and_then(|s| s.last_location)
        .or_else(|| state.drivers.get(&driver_id).and_then(|d| d.last_known));
    let Some(origin) = origin else {
        return Ok(None);
    };

    let distance_m = geo::haversine_m(origin, destination);
    let eta_secs = geo::estimate_eta(distance_m, geo::DEFAULT_SPEED_KMPH)
        .map(|eta| eta.as_secs())
        .unwrap_or(0);
    Ok(Some(RoutePreview {
        distance_m,
        eta_secs,
    }))
}
