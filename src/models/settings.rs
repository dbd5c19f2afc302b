use serde::{Deserialize, Serialize};

/// Process-wide persisted configuration, mutated only by operator commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Orders older than this many days are eligible for bulk archival.
    pub archive_days: i64,
    /// Operator UI display mode.
    pub display_emojis: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            archive_days: 7,
            display_emojis: false,
        }
    }
}
