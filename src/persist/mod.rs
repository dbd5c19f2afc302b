use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::models::customer::Customer;
use crate::models::driver::Driver;
use crate::models::order::Order;
use crate::models::profile::ShiftProfile;
use crate::models::qr::QrCode;
use crate::models::session::LiveSession;
use crate::models::settings::Settings;
use crate::observability::metrics::Metrics;

/// The one durable document: the whole entity registry plus counters and
/// settings. Key names match the legacy snapshot layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    pub orders: Vec<Order>,
    pub drivers: Vec<Driver>,
    pub customers: Vec<Customer>,
    pub sessions: Vec<LiveSession>,
    pub qr_codes: Vec<QrCode>,
    pub shift_profiles: Vec<ShiftProfile>,
    pub order_counter: u64,
    pub profile_counter: u64,
    pub settings: Settings,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            orders: Vec::new(),
            drivers: Vec::new(),
            customers: Vec::new(),
            sessions: Vec::new(),
            qr_codes: Vec::new(),
            shift_profiles: Vec::new(),
            order_counter: 1,
            profile_counter: 1,
            settings: Settings::default(),
        }
    }
}

struct SaveRequest {
    payload: String,
    ack: Option<oneshot::Sender<()>>,
}

/// Handle to the single-writer persistence task. Every `save` is queued on
/// one channel, so writes to disk never interleave no matter how many
/// handlers trigger them concurrently.
#[derive(Clone)]
pub struct Store {
    path: PathBuf,
    tx: mpsc::Sender<SaveRequest>,
}

impl Store {
    pub fn spawn(path: PathBuf, metrics: Metrics) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(run_writer(path.clone(), rx, metrics));
        Self { path, tx }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue a snapshot write. Serialization happens here so the writer task
    /// persists the state as it was at call time.
    pub async fn save(&self, doc: &Document) {
        let payload = match serde_json::to_string_pretty(doc) {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "failed to serialize snapshot");
                return;
            }
        };
        if self
            .tx
            .send(SaveRequest { payload, ack: None })
            .await
            .is_err()
        {
            error!("persistence writer is gone; snapshot dropped");
        }
    }

    /// Save and wait until the write queue has drained past it. Used at
    /// shutdown and by tests that re-read the durable document.
    pub async fn flush(&self, doc: &Document) {
        let payload = match serde_json::to_string_pretty(doc) {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "failed to serialize snapshot");
                return;
            }
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .tx
            .send(SaveRequest {
                payload,
                ack: Some(ack_tx),
            })
            .await
            .is_err()
        {
            error!("persistence writer is gone; flush dropped");
            return;
        }
        let _ = ack_rx.await;
    }
}

async fn run_writer(path: PathBuf, mut rx: mpsc::Receiver<SaveRequest>, metrics: Metrics) {
    while let Some(req) = rx.recv().await {
        let outcome = match write_snapshot(&path, &req.payload).await {
            Ok(()) => "success",
            Err(err) => {
                error!(path = %path.display(), error = %err, "failed to save snapshot");
                "error"
            }
        };
        metrics
            .persistence_writes_total
            .with_label_values(&[outcome])
            .inc();
        if let Some(ack) = req.ack {
            let _ = ack.send(());
        }
    }
}

/// Write protocol: temp file first, previous good file copied to `.bak`
/// (best effort), then an atomic rename over the primary.
async fn write_snapshot(path: &Path, payload: &str) -> std::io::Result<()> {
    let tmp = sibling(path, ".tmp");
    let bak = sibling(path, ".bak");

    if let Err(err) = tokio::fs::write(&tmp, payload).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err);
    }
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        if let Err(err) = tokio::fs::copy(path, &bak).await {
            warn!(error = %err, "backup copy failed");
        }
    }
    if let Err(err) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err);
    }
    Ok(())
}

/// Load the durable document. Parse failure falls back to the `.bak`
/// sibling; total failure dumps a diagnostic copy and starts empty. Never
/// returns an error.
pub async fn load(path: &Path) -> Document {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Document::default();
    }

    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) => {
            error!(path = %path.display(), error = %err, "failed to read snapshot");
            return Document::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(doc) => {
            info!(path = %path.display(), "loaded snapshot");
            doc
        }
        Err(primary_err) => {
            let bak = sibling(path, ".bak");
            if let Ok(bak_raw) = tokio::fs::read_to_string(&bak).await {
                if let Ok(doc) = serde_json::from_str(&bak_raw) {
                    warn!(path = %bak.display(), "primary snapshot corrupted; loaded backup");
                    return doc;
                }
            }
            let dump = sibling(path, &format!(".corrupt-{}.json", Utc::now().timestamp_millis()));
            if tokio::fs::write(&dump, &raw).await.is_ok() {
                error!(dump = %dump.display(), "snapshot unreadable; diagnostic copy written");
            }
            error!(error = %primary_err, "failed to load snapshot; starting empty");
            Document::default()
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::Order;

    #[tokio::test]
    async fn load_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let doc = load(&dir.path().join("data.json")).await;
        assert!(doc.orders.is_empty());
        assert_eq!(doc.order_counter, 1);
    }

    #[tokio::test]
    async fn corrupt_primary_falls_back_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");

        let mut good = Document::default();
        good.orders.push(Order::new(7));
        good.order_counter = 8;
        tokio::fs::write(sibling(&path, ".bak"), serde_json::to_string(&good).unwrap())
            .await
            .unwrap();
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let doc = load(&path).await;
        assert_eq!(doc.orders.len(), 1);
        assert_eq!(doc.orders[0].id, 7);
        assert_eq!(doc.order_counter, 8);
    }

    #[tokio::test]
    async fn corrupt_primary_and_backup_dumps_diagnostic_and_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        tokio::fs::write(&path, "garbage").await.unwrap();
        tokio::fs::write(sibling(&path, ".bak"), "more garbage")
            .await
            .unwrap();

        let doc = load(&path).await;
        assert!(doc.orders.is_empty());

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut dumped = false;
        while let Some(entry) = entries.next_entry().await.unwrap() {
            if entry.file_name().to_string_lossy().contains(".corrupt-") {
                dumped = true;
            }
        }
        assert!(dumped, "expected a diagnostic dump");
    }

    #[tokio::test]
    async fn queued_writes_land_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let store = Store::spawn(path.clone(), Metrics::new());

        let mut doc = Document::default();
        for i in 1..=20 {
            doc.orders.push(Order::new(i));
            doc.order_counter = i + 1;
            store.save(&doc).await;
        }
        store.flush(&doc).await;

        let reread = load(&path).await;
        assert_eq!(reread.orders.len(), 20);
        assert_eq!(reread.order_counter, 21);
        // previous good version is kept as backup, and it parses
        let bak = tokio::fs::read_to_string(sibling(&path, ".bak")).await.unwrap();
        let bak_doc: Document = serde_json::from_str(&bak).unwrap();
        assert!(bak_doc.orders.len() <= 20);
    }

    #[test]
    fn document_uses_legacy_key_names() {
        let doc = Document::default();
        let json = serde_json::to_value(&doc).unwrap();
        for key in [
            "orders",
            "drivers",
            "customers",
            "sessions",
            "qrCodes",
            "shiftProfiles",
            "orderCounter",
            "profileCounter",
            "settings",
        ] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
    }
}
