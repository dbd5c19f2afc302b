use serde::{Deserialize, Serialize};

/// Payment-QR payload attached by the operator: either a text code or a
/// media file reference on the messaging platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QrMedia {
    Text(String),
    File { file_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrCode {
    pub id: u64,
    pub code: String,
    pub enabled: bool,
    #[serde(default)]
    pub media: Option<QrMedia>,
}

impl QrCode {
    pub fn new(id: u64, code: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            enabled: true,
            media: None,
        }
    }
}
