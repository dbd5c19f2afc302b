use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::driver::GeoPoint;

/// How long a session stays alive without a location report.
pub const SESSION_TTL_MINUTES: i64 = 30;

/// Time-boxed grant for forwarding a driver's location to a customer.
/// Identity is the composite driver + order + start instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveSession {
    pub id: String,
    pub driver_id: i64,
    pub order_id: u64,
    pub started_at: DateTime<Utc>,
    /// Sliding window: every location report pushes this forward.
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub ended: bool,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_location: Option<GeoPoint>,
}

impl LiveSession {
    pub fn start(driver_id: i64, order_id: u64) -> Self {
        let now = Utc::now();
        Self {
            id: session_id(driver_id, order_id, now),
            driver_id,
            order_id,
            started_at: now,
            expires_at: now + Duration::minutes(SESSION_TTL_MINUTES),
            ended: false,
            ended_at: None,
            last_location: None,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.ended && self.expires_at > now
    }

    pub fn end(&mut self) {
        self.ended = true;
        self.ended_at = Some(Utc::now());
    }

    /// Slide the expiry window forward from `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.expires_at = now + Duration::minutes(SESSION_TTL_MINUTES);
    }
}

fn session_id(driver_id: i64, order_id: u64, started_at: DateTime<Utc>) -> String {
    format!("{driver_id}:{order_id}:{}", started_at.timestamp_millis())
}
