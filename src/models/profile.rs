use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operator-defined shift profile used for per-shift stats. The id comes from
/// the persisted profile counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftProfile {
    pub id: u64,
    pub name: String,
    /// 4-digit numeric PIN chosen at creation.
    pub pin: String,
    #[serde(default)]
    pub total_stars: u32,
    pub created_at: DateTime<Utc>,
}

impl ShiftProfile {
    pub fn new(id: u64, name: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            pin: pin.into(),
            total_stars: 0,
            created_at: Utc::now(),
        }
    }
}
