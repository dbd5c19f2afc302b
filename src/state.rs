use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::engine::edits::PendingEdit;
use crate::gateway::Gateway;
use crate::models::customer::Customer;
use crate::models::driver::{Driver, DriverStatus};
use crate::models::order::{Order, OrderStatus};
use crate::models::profile::ShiftProfile;
use crate::models::qr::QrCode;
use crate::models::session::LiveSession;
use crate::models::settings::Settings;
use crate::observability::metrics::Metrics;
use crate::persist::{Document, Store};
use crate::sessions::SessionTasks;

/// Broadcast to `/ws` observers whenever the registry changes shape.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    OrderCreated { order_id: u64 },
    OrderStatus { order_id: u64, status: OrderStatus },
    SessionStarted { session_id: String, driver_id: i64, order_id: u64 },
    SessionEnded { session_id: String, reason: &'static str },
}

/// The entity registry plus every process-wide handle the handlers and timer
/// tasks need. One instance per process, shared behind `Arc`.
pub struct AppState {
    pub orders: DashMap<u64, Order>,
    pub drivers: DashMap<i64, Driver>,
    pub customers: DashMap<i64, Customer>,
    pub sessions: DashMap<String, LiveSession>,
    pub qr_codes: DashMap<u64, QrCode>,
    pub shift_profiles: DashMap<u64, ShiftProfile>,
    /// Per-operator pending field edit; the next matching inbound payload is
    /// consumed as the field value.
    pub pending_edits: DashMap<i64, PendingEdit>,
    /// Timer handles for armed sessions, keyed by session id.
    pub session_tasks: DashMap<String, SessionTasks>,
    order_counter: AtomicU64,
    profile_counter: AtomicU64,
    pub settings: RwLock<Settings>,
    pub store: Store,
    pub gateway: Arc<dyn Gateway>,
    pub admin_id: Option<i64>,
    pub locks_dir: PathBuf,
    pub events_tx: broadcast::Sender<DispatchEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        store: Store,
        gateway: Arc<dyn Gateway>,
        admin_id: Option<i64>,
        locks_dir: PathBuf,
        metrics: Metrics,
    ) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(256);

        Self {
            orders: DashMap::new(),
            drivers: DashMap::new(),
            customers: DashMap::new(),
            sessions: DashMap::new(),
            qr_codes: DashMap::new(),
            shift_profiles: DashMap::new(),
            pending_edits: DashMap::new(),
            session_tasks: DashMap::new(),
            order_counter: AtomicU64::new(1),
            profile_counter: AtomicU64::new(1),
            settings: RwLock::new(Settings::default()),
            store,
            gateway,
            admin_id,
            locks_dir,
            events_tx,
            metrics,
        }
    }

    /// Rebuild the registry from a loaded document.
    pub fn hydrate(&self, doc: Document) {
        for order in doc.orders {
            self.orders.insert(order.id, order);
        }
        for driver in doc.drivers {
            self.drivers.insert(driver.id, driver);
        }
        for customer in doc.customers {
            self.customers.insert(customer.id, customer);
        }
        for session in doc.sessions {
            self.sessions.insert(session.id.clone(), session);
        }
        for qr in doc.qr_codes {
            self.qr_codes.insert(qr.id, qr);
        }
        for profile in doc.shift_profiles {
            self.shift_profiles.insert(profile.id, profile);
        }
        self.order_counter.store(doc.order_counter, Ordering::SeqCst);
        self.profile_counter
            .store(doc.profile_counter, Ordering::SeqCst);
        *self.settings.write().expect("settings lock poisoned") = doc.settings;
    }

    /// Snapshot the whole registry for the persistence store. Collections
    /// are sorted by id so successive snapshots diff cleanly.
    pub fn snapshot(&self) -> Document {
        let mut orders: Vec<Order> = self.orders.iter().map(|e| e.value().clone()).collect();
        orders.sort_by_key(|o| o.id);
        let mut drivers: Vec<Driver> = self.drivers.iter().map(|e| e.value().clone()).collect();
        drivers.sort_by_key(|d| d.id);
        let mut customers: Vec<Customer> =
            self.customers.iter().map(|e| e.value().clone()).collect();
        customers.sort_by_key(|c| c.id);
        let mut sessions: Vec<LiveSession> =
            self.sessions.iter().map(|e| e.value().clone()).collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        let mut qr_codes: Vec<QrCode> = self.qr_codes.iter().map(|e| e.value().clone()).collect();
        qr_codes.sort_by_key(|q| q.id);
        let mut shift_profiles: Vec<ShiftProfile> =
            self.shift_profiles.iter().map(|e| e.value().clone()).collect();
        shift_profiles.sort_by_key(|p| p.id);

        Document {
            orders,
            drivers,
            customers,
            sessions,
            qr_codes,
            shift_profiles,
            order_counter: self.order_counter.load(Ordering::SeqCst),
            profile_counter: self.profile_counter.load(Ordering::SeqCst),
            settings: self
                .settings
                .read()
                .expect("settings lock poisoned")
                .clone(),
        }
    }

    /// Queue a snapshot write; in-memory state is already visible to readers.
    pub async fn save(&self) {
        let doc = self.snapshot();
        self.store.save(&doc).await;
    }

    /// Snapshot write that completes only after the bytes hit disk.
    pub async fn flush(&self) {
        let doc = self.snapshot();
        self.store.flush(&doc).await;
    }

    pub fn next_order_id(&self) -> u64 {
        self.order_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn next_profile_id(&self) -> u64 {
        self.profile_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn publish(&self, event: DispatchEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn first_online_driver(&self) -> Option<Driver> {
        self.drivers
            .iter()
            .find(|entry| entry.value().status == DriverStatus::Online)
            .map(|entry| entry.value().clone())
    }

    /// The order currently in this driver's hands, if any.
    pub fn active_order_for_driver(&self, driver_id: i64) -> Option<Order> {
        self.orders
            .iter()
            .find(|entry| {
                let order = entry.value();
                order.driver_id == Some(driver_id) && order.status.is_active()
            })
            .map(|entry| entry.value().clone())
    }

    /// Most recently created order still in `New` for this customer.
    pub fn latest_new_order_for_customer(&self, customer_id: i64) -> Option<Order> {
        self.orders
            .iter()
            .filter(|entry| {
                let order = entry.value();
                order.customer_id == Some(customer_id) && order.status == OrderStatus::New
            })
            .max_by_key(|entry| entry.value().id)
            .map(|entry| entry.value().clone())
    }

    pub fn active_session_for_driver(&self, driver_id: i64) -> Option<LiveSession> {
        let now = Utc::now();
        self.sessions
            .iter()
            .find(|entry| {
                let session = entry.value();
                session.driver_id == driver_id && session.is_active(now)
            })
            .map(|entry| entry.value().clone())
    }

    /// Register the customer on first contact.
    pub fn ensure_customer(&self, id: i64, name: Option<&str>) {
        self.customers
            .entry(id)
            .or_insert_with(|| Customer::new(id, name.unwrap_or_default()));
    }
}
