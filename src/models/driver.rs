use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DriverStatus {
    Pending,
    Offline,
    Online,
    Assigned,
    Busy,
}

/// Driver language preference for customer-facing notices.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Lang {
    #[default]
    En,
    Kh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: i64,
    pub name: String,
    pub status: DriverStatus,
    #[serde(default)]
    pub lang: Lang,
    /// Most recent location report, kept across sessions for route previews.
    #[serde(default)]
    pub last_known: Option<GeoPoint>,
    pub registered_at: DateTime<Utc>,
}

impl Driver {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: DriverStatus::Pending,
            lang: Lang::En,
            last_known: None,
            registered_at: Utc::now(),
        }
    }

    /// Connected in any form: online, assigned to an order, or mid-delivery.
    pub fn is_connected(&self) -> bool {
        matches!(
            self.status,
            DriverStatus::Online | DriverStatus::Assigned | DriverStatus::Busy
        )
    }
}
