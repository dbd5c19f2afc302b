use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::driver::GeoPoint;

#[derive(Debug, Error)]
#[error("gateway send failed: {0}")]
pub struct GatewayError(pub String);

/// Narrow interface to the messaging platform. Everything the core sends out
/// goes through these four operations; delivery failures are logged by the
/// call site and never abort the transition that triggered them.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn send_text(&self, user_id: i64, text: &str) -> Result<(), GatewayError>;
    async fn send_location(&self, user_id: i64, point: GeoPoint) -> Result<(), GatewayError>;
    async fn edit_keyboard(&self, chat_id: i64, message_id: i64) -> Result<(), GatewayError>;
    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), GatewayError>;
}

/// Fire-and-forget text send.
pub async fn notify(gateway: &dyn Gateway, user_id: i64, text: impl AsRef<str>) {
    if let Err(err) = gateway.send_text(user_id, text.as_ref()).await {
        warn!(user_id, error = %err, "notification dropped");
    }
}

/// Fire-and-forget location send.
pub async fn forward_location(gateway: &dyn Gateway, user_id: i64, point: GeoPoint) {
    if let Err(err) = gateway.send_location(user_id, point).await {
        warn!(user_id, error = %err, "location forward dropped");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Document,
}

/// Structured inbound traffic from the messaging platform, already stripped
/// of chat-UI concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundPayload {
    Text { text: String },
    Location { lat: f64, lng: f64 },
    Contact { user_id: Option<i64>, name: String },
    Media { media: MediaKind, file_id: String },
    /// Button press carrying a `verb:arg1:arg2` action string.
    Callback { action: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub from: i64,
    pub chat: i64,
    #[serde(default)]
    pub sender_name: Option<String>,
    /// Message the event originated from, when the platform provides it;
    /// lets the core clear or remove stale keyboards.
    #[serde(default)]
    pub message_id: Option<i64>,
    #[serde(flatten)]
    pub payload: InboundPayload,
}

/// Gateway for headless runs: every send is a debug log line.
pub struct NoopGateway;

#[async_trait]
impl Gateway for NoopGateway {
    async fn send_text(&self, user_id: i64, text: &str) -> Result<(), GatewayError> {
        debug!(user_id, text, "send_text");
        Ok(())
    }

    async fn send_location(&self, user_id: i64, point: GeoPoint) -> Result<(), GatewayError> {
        debug!(user_id, lat = point.lat, lng = point.lng, "send_location");
        Ok(())
    }

    async fn edit_keyboard(&self, chat_id: i64, message_id: i64) -> Result<(), GatewayError> {
        debug!(chat_id, message_id, "edit_keyboard");
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), GatewayError> {
        debug!(chat_id, message_id, "delete_message");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text { user_id: i64, text: String },
    Location { user_id: i64, point: GeoPoint },
    EditKeyboard { chat_id: i64, message_id: i64 },
    DeleteMessage { chat_id: i64, message_id: i64 },
}

/// Test double that records everything the core tries to deliver.
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<Outbound>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Outbound> {
        std::mem::take(&mut self.sent.lock().expect("gateway log poisoned"))
    }

    pub fn texts_for(&self, user_id: i64) -> Vec<String> {
        self.sent
            .lock()
            .expect("gateway log poisoned")
            .iter()
            .filter_map(|out| match out {
                Outbound::Text { user_id: to, text } if *to == user_id => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn locations_for(&self, user_id: i64) -> Vec<GeoPoint> {
        self.sent
            .lock()
            .expect("gateway log poisoned")
            .iter()
            .filter_map(|out| match out {
                Outbound::Location { user_id: to, point } if *to == user_id => Some(*point),
                _ => None,
            })
            .collect()
    }

    fn record(&self, out: Outbound) {
        self.sent.lock().expect("gateway log poisoned").push(out);
    }
}

#[async_trait]
impl Gateway for RecordingGateway {
    async fn send_text(&self, user_id: i64, text: &str) -> Result<(), GatewayError> {
        self.record(Outbound::Text {
            user_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_location(&self, user_id: i64, point: GeoPoint) -> Result<(), GatewayError> {
        self.record(Outbound::Location { user_id, point });
        Ok(())
    }

    async fn edit_keyboard(&self, chat_id: i64, message_id: i64) -> Result<(), GatewayError> {
        self.record(Outbound::EditKeyboard {
            chat_id,
            message_id,
        });
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), GatewayError> {
        self.record(Outbound::DeleteMessage {
            chat_id,
            message_id,
        });
        Ok(())
    }
}
