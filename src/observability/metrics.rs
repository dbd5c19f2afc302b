use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub orders_created_total: IntCounter,
    pub transitions_total: IntCounterVec,
    pub sessions_active: IntGauge,
    pub session_expiries_total: IntCounter,
    pub auto_arrivals_total: IntCounter,
    pub persistence_writes_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let orders_created_total =
            IntCounter::new("orders_created_total", "Total orders created")
                .expect("valid orders_created_total metric");

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Order transitions by action and outcome"),
            &["action", "outcome"],
        )
        .expect("valid transitions_total metric");

        let sessions_active = IntGauge::new(
            "sessions_active",
            "Currently armed live-location sessions",
        )
        .expect("valid sessions_active metric");

        let session_expiries_total = IntCounter::new(
            "session_expiries_total",
            "Live sessions ended by expiry",
        )
        .expect("valid session_expiries_total metric");

        let auto_arrivals_total = IntCounter::new(
            "auto_arrivals_total",
            "Orders auto-marked arrived by proximity",
        )
        .expect("valid auto_arrivals_total metric");

        let persistence_writes_total = IntCounterVec::new(
            Opts::new("persistence_writes_total", "Snapshot writes by outcome"),
            &["outcome"],
        )
        .expect("valid persistence_writes_total metric");

        registry
            .register(Box::new(orders_created_total.clone()))
            .expect("register orders_created_total");
        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(sessions_active.clone()))
            .expect("register sessions_active");
        registry
            .register(Box::new(session_expiries_total.clone()))
            .expect("register session_expiries_total");
        registry
            .register(Box::new(auto_arrivals_total.clone()))
            .expect("register auto_arrivals_total");
        registry
            .register(Box::new(persistence_writes_total.clone()))
            .expect("register persistence_writes_total");

        Self {
            registry,
            orders_created_total,
            transitions_total,
            sessions_active,
            session_expiries_total,
            auto_arrivals_total,
            persistence_writes_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
