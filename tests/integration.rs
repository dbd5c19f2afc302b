use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Duration as ChronoDuration;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use courier_dispatch::api::rest::router;
use courier_dispatch::engine::lifecycle::{self, OrderSeed};
use courier_dispatch::gateway::{Gateway, RecordingGateway};
use courier_dispatch::models::driver::{Driver, DriverStatus, GeoPoint};
use courier_dispatch::models::order::OrderStatus;
use courier_dispatch::models::session::LiveSession;
use courier_dispatch::observability::metrics::Metrics;
use courier_dispatch::persist::{self, Document, Store};
use courier_dispatch::sessions;
use courier_dispatch::state::AppState;

const ADMIN: i64 = 999;
const DRIVER: i64 = 10;
const CUSTOMER: i64 = 77;

struct TestApp {
    state: Arc<AppState>,
    gateway: Arc<RecordingGateway>,
    dir: TempDir,
}

impl TestApp {
    fn router(&self) -> axum::Router {
        router(self.state.clone())
    }

    fn data_file(&self) -> PathBuf {
        self.dir.path().join("data.json")
    }
}

fn setup() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let metrics = Metrics::new();
    let store = Store::spawn(dir.path().join("data.json"), metrics.clone());
    let gateway = Arc::new(RecordingGateway::new());
    let gw: Arc<dyn Gateway> = gateway.clone();
    let state = Arc::new(AppState::new(
        store,
        gw,
        Some(ADMIN),
        dir.path().join("locks"),
        metrics,
    ));
    TestApp {
        state,
        gateway,
        dir,
    }
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Register a driver, approve it, and bring it online.
async fn online_driver(app: &TestApp, id: i64, name: &str) {
    let r = app.router();
    let res = r
        .clone()
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({ "id": id, "name": name }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = r
        .clone()
        .oneshot(json_request("POST", &format!("/drivers/{id}/approve"), json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = r
        .oneshot(json_request(
            "PATCH",
            &format!("/drivers/{id}/status"),
            json!({ "status": "Online" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

async fn create_order(app: &TestApp, body: Value) -> Value {
    let res = app
        .router()
        .oneshot(json_request("POST", "/orders", body))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await
}

/// Let spawned timer tasks run after a paused-clock advance.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn health_returns_ok() {
    let app = setup();
    let response = app.router().oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["orders"], 0);
    assert_eq!(body["drivers"], 0);
    assert_eq!(body["active_sessions"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let app = setup();
    let response = app.router().oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("sessions_active"));
    assert!(body.contains("orders_created_total"));
}

#[tokio::test]
async fn order_ids_are_monotonic_and_counter_persists() {
    let app = setup();

    for expected in 1..=3u64 {
        let body = create_order(&app, json!({ "customer_name": "Sok" })).await;
        assert_eq!(body["id"], expected);
        assert_eq!(body["status"], "New");
    }

    app.state.flush().await;
    let raw = std::fs::read_to_string(app.data_file()).unwrap();
    let doc: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc["orderCounter"], 4);
    assert_eq!(doc["orders"].as_array().unwrap().len(), 3);
    assert_eq!(doc["orders"][2]["id"], 3);
}

#[tokio::test]
async fn cash_arithmetic_survives_durable_round_trip() {
    let app = setup();
    create_order(&app, json!({ "customer_name": "Sok" })).await;

    let r = app.router();
    let res = r
        .clone()
        .oneshot(json_request("PATCH", "/orders/1", json!({ "total_amount": 12.5 })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = r
        .clone()
        .oneshot(json_request("PATCH", "/orders/1", json!({ "given_cash": 20.0 })))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["change_cash"], 7.5);

    // given cash before any numeric total leaves change unset
    create_order(&app, json!({})).await;
    let res = r
        .oneshot(json_request("PATCH", "/orders/2", json!({ "given_cash": 10.0 })))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert!(body["change_cash"].is_null());

    app.state.flush().await;
    let raw = std::fs::read_to_string(app.data_file()).unwrap();
    let doc: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc["orders"][0]["total_amount"], 12.5);
    assert_eq!(doc["orders"][0]["given_cash"], 20.0);
    assert_eq!(doc["orders"][0]["change_cash"], 7.5);
    assert!(doc["orders"][1]["change_cash"].is_null());
}

#[tokio::test]
async fn corrupt_primary_recovers_from_backup() {
    let app = setup();
    create_order(&app, json!({ "customer_name": "Sok" })).await;
    app.state.flush().await;

    let path = app.data_file();
    let good = std::fs::read_to_string(&path).unwrap();
    let mut bak = path.clone().into_os_string();
    bak.push(".bak");
    std::fs::write(bak, &good).unwrap();
    std::fs::write(&path, "{ definitely not json").unwrap();

    let doc = persist::load(&path).await;
    assert_eq!(doc.orders.len(), 1);
    assert_eq!(doc.orders[0].id, 1);
    assert_eq!(doc.order_counter, 2);
}

#[tokio::test]
async fn registration_and_assignment_flow() {
    let app = setup();
    online_driver(&app, DRIVER, "Dara").await;
    create_order(&app, json!({ "customer_id": CUSTOMER, "customer_name": "Sok", "items": "noodles" })).await;

    let res = app
        .router()
        .oneshot(json_request("POST", "/orders/1/assign", json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["assigned"], true);
    assert_eq!(body["driver_id"], DRIVER);

    let res = app.router().oneshot(get_request("/orders/1")).await.unwrap();
    let order = body_json(res).await;
    assert_eq!(order["status"], "Assigned");
    assert_eq!(order["driver_id"], DRIVER);

    let driver_texts = app.gateway.texts_for(DRIVER);
    assert!(driver_texts.iter().any(|t| t.contains("New assignment #0001")));
    let admin_texts = app.gateway.texts_for(ADMIN);
    assert!(admin_texts.iter().any(|t| t.contains("assigned to Dara")));
}

#[tokio::test]
async fn assign_without_driver_keeps_order_queued() {
    let app = setup();
    create_order(&app, json!({})).await;

    let res = app
        .router()
        .oneshot(json_request("POST", "/orders/1/assign", json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["assigned"], false);

    let res = app.router().oneshot(get_request("/orders/1")).await.unwrap();
    assert_eq!(body_json(res).await["status"], "New");
}

#[tokio::test]
async fn assignment_lock_contention_is_conflict() {
    let app = setup();
    online_driver(&app, DRIVER, "Dara").await;
    create_order(&app, json!({})).await;

    let lock_path = app.dir.path().join("locks").join("assign-1");
    std::fs::create_dir_all(&lock_path).unwrap();

    let res = app
        .router()
        .oneshot(json_request("POST", "/orders/1/assign", json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // releasing the foreign lock lets the assignment proceed
    std::fs::remove_dir(&lock_path).unwrap();
    let res = app
        .router()
        .oneshot(json_request("POST", "/orders/1/assign", json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn invalid_transitions_are_conflicts_not_crashes() {
    let app = setup();
    create_order(&app, json!({})).await;

    let res = app
        .router()
        .oneshot(json_request("POST", "/orders/1/pickup", json!({ "driver_id": DRIVER })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = app
        .router()
        .oneshot(json_request("POST", "/orders/1/complete", json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // the order is untouched and the next request still works
    let res = app.router().oneshot(get_request("/orders/1")).await.unwrap();
    assert_eq!(body_json(res).await["status"], "New");
}

#[tokio::test]
async fn full_lifecycle_to_feedback() {
    let app = setup();
    online_driver(&app, DRIVER, "Dara").await;
    create_order(&app, json!({ "customer_id": CUSTOMER, "customer_name": "Sok" })).await;

    let r = app.router();
    let res = r
        .clone()
        .oneshot(json_request("POST", "/orders/1/assign", json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = r
        .clone()
        .oneshot(json_request("POST", "/orders/1/pickup", json!({ "driver_id": DRIVER })))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["status"], "PickedUp");

    let res = r.clone().oneshot(get_request("/drivers")).await.unwrap();
    let drivers = body_json(res).await;
    assert_eq!(drivers[0]["status"], "Busy");

    let res = r
        .clone()
        .oneshot(json_request("POST", "/orders/1/arrive", json!({})))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["status"], "Arrived");

    let res = r
        .clone()
        .oneshot(json_request("POST", "/orders/1/complete", json!({})))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["status"], "Completed");

    // completing frees the driver and prompts the customer for a rating
    let res = r.clone().oneshot(get_request("/drivers")).await.unwrap();
    let drivers = body_json(res).await;
    assert_eq!(drivers[0]["status"], "Online");
    assert!(app
        .gateway
        .texts_for(CUSTOMER)
        .iter()
        .any(|t| t.contains("rate your delivery")));

    let res = r
        .oneshot(json_request("POST", "/orders/1/feedback", json!({ "rating": 5 })))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["feedback"], 5);
    assert!(app
        .gateway
        .texts_for(DRIVER)
        .iter()
        .any(|t| t.contains("5 stars")));
}

#[tokio::test]
async fn one_active_session_per_driver() {
    let app = setup();
    online_driver(&app, DRIVER, "Dara").await;
    create_order(&app, json!({ "customer_id": CUSTOMER })).await;
    create_order(&app, json!({ "customer_id": CUSTOMER })).await;

    let r = app.router();
    let res = r
        .clone()
        .oneshot(json_request(
            "POST",
            "/sessions",
            json!({ "driver_id": DRIVER, "order_id": 1 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = r
        .clone()
        .oneshot(json_request(
            "POST",
            "/sessions",
            json!({ "driver_id": DRIVER, "order_id": 2 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = r
        .oneshot(get_request("/sessions?active=true"))
        .await
        .unwrap();
    let active = body_json(res).await;
    let list = active.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["order_id"], 2);
}

#[tokio::test(start_paused = true)]
async fn sliding_expiry_fires_exactly_once() {
    let app = setup();
    {
        let mut driver = Driver::new(DRIVER, "Dara");
        driver.status = DriverStatus::Online;
        app.state.drivers.insert(DRIVER, driver);
    }
    lifecycle::create_order(&app.state, OrderSeed::default()).await;

    sessions::start(&app.state, DRIVER, 1).await.unwrap();
    settle().await;

    // a report at +10min slides the window to +40min
    tokio::time::advance(Duration::from_secs(10 * 60)).await;
    settle().await;
    let outcome = sessions::update_location(
        &app.state,
        DRIVER,
        GeoPoint {
            lat: 11.55,
            lng: 104.92,
        },
    )
    .await
    .unwrap();
    assert_ne!(outcome, sessions::LocationOutcome::NoActiveSession);
    settle().await;

    tokio::time::advance(Duration::from_secs(25 * 60)).await;
    settle().await;
    assert!(
        app.state.sessions.iter().all(|s| !s.value().ended),
        "session expired before the slid deadline"
    );

    tokio::time::advance(Duration::from_secs(10 * 60)).await;
    settle().await;
    assert!(app.state.sessions.iter().all(|s| s.value().ended));
    assert_eq!(app.state.metrics.session_expiries_total.get(), 1);
    assert!(app
        .gateway
        .texts_for(DRIVER)
        .iter()
        .any(|t| t.contains("session expired")));

    // no second firing, ever
    tokio::time::advance(Duration::from_secs(60 * 60)).await;
    settle().await;
    assert_eq!(app.state.metrics.session_expiries_total.get(), 1);
}

#[tokio::test]
async fn auto_arrival_inside_the_geofence() {
    let app = setup();
    online_driver(&app, DRIVER, "Dara").await;
    create_order(
        &app,
        json!({
            "customer_id": CUSTOMER,
            "customer_name": "Sok",
            "location": { "point": { "lat": 11.5500, "lng": 104.9200 } }
        }),
    )
    .await;

    let r = app.router();
    r.clone()
        .oneshot(json_request("POST", "/orders/1/assign", json!({})))
        .await
        .unwrap();
    r.clone()
        .oneshot(json_request("POST", "/orders/1/pickup", json!({ "driver_id": DRIVER })))
        .await
        .unwrap();
    r.clone()
        .oneshot(json_request(
            "POST",
            "/sessions",
            json!({ "driver_id": DRIVER, "order_id": 1 }),
        ))
        .await
        .unwrap();

    // ~55 m out: forwarded, but no arrival
    let res = r
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/drivers/{DRIVER}/location"),
            json!({ "lat": 11.5504, "lng": 104.9204 }),
        ))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["updated"]["auto_arrived"], false);
    assert_eq!(body["updated"]["forwarded"], true);

    let res = r.clone().oneshot(get_request("/orders/1")).await.unwrap();
    assert_eq!(body_json(res).await["status"], "PickedUp");

    // ~11 m out: arrival fires and ends the session
    let res = r
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/drivers/{DRIVER}/location"),
            json!({ "lat": 11.5501, "lng": 104.9201 }),
        ))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["updated"]["auto_arrived"], true);

    let res = r.clone().oneshot(get_request("/orders/1")).await.unwrap();
    assert_eq!(body_json(res).await["status"], "Arrived");
    assert_eq!(app.state.metrics.auto_arrivals_total.get(), 1);
    assert!(app
        .gateway
        .texts_for(ADMIN)
        .iter()
        .any(|t| t.contains("auto-arrived")));

    // the session ended with the arrival, so the next report has no session
    let res = r
        .oneshot(json_request(
            "PATCH",
            &format!("/drivers/{DRIVER}/location"),
            json!({ "lat": 11.5501, "lng": 104.9201 }),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(res).await, json!("no_active_session"));
    assert_eq!(app.state.metrics.auto_arrivals_total.get(), 1);

    // the customer saw the driver's position while the session ran
    assert!(!app.gateway.locations_for(CUSTOMER).is_empty());
}

#[tokio::test]
async fn rehydration_drops_dangling_sessions() {
    let app = setup();

    let mut doc = Document::default();
    let mut driver = Driver::new(DRIVER, "Dara");
    driver.status = DriverStatus::Online;
    doc.drivers.push(driver);
    let mut order = courier_dispatch::models::order::Order::new(1);
    order.status = OrderStatus::Assigned;
    order.driver_id = Some(DRIVER);
    doc.orders.push(order);
    doc.order_counter = 2;

    let valid = LiveSession::start(DRIVER, 1);
    let dangling = LiveSession::start(55, 1); // no such driver
    let mut expired = LiveSession::start(DRIVER, 1);
    expired.id = format!("{DRIVER}:1:0"); // distinct key from `valid`
    expired.expires_at = expired.started_at - ChronoDuration::minutes(1);
    doc.sessions.push(valid.clone());
    doc.sessions.push(dangling);
    doc.sessions.push(expired);

    app.state.hydrate(doc);
    let dropped = sessions::rehydrate(&app.state).await;

    assert_eq!(dropped, 2);
    assert_eq!(app.state.sessions.len(), 1);
    assert!(app.state.sessions.contains_key(&valid.id));
    assert!(app.state.session_tasks.contains_key(&valid.id));

    // the cleanup is durable
    app.state.flush().await;
    let raw = std::fs::read_to_string(app.data_file()).unwrap();
    let reread: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(reread["sessions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn operator_edit_flow_over_the_gateway() {
    let app = setup();
    create_order(&app, json!({ "customer_name": "Sok" })).await;

    let r = app.router();
    let send = |payload: Value| {
        let r = r.clone();
        async move {
            let res = r
                .oneshot(json_request("POST", "/gateway/events", payload))
                .await
                .unwrap();
            body_json(res).await["result"].as_str().unwrap().to_string()
        }
    };

    let result = send(json!({
        "from": ADMIN, "chat": ADMIN, "kind": "callback", "action": "settotal:1"
    }))
    .await;
    assert!(result.contains("Send the new total"));

    let result = send(json!({
        "from": ADMIN, "chat": ADMIN, "kind": "text", "text": "$12.50"
    }))
    .await;
    assert!(result.contains("Total updated"));

    let result = send(json!({
        "from": ADMIN, "chat": ADMIN, "kind": "callback", "action": "setpay:CASH:1"
    }))
    .await;
    assert!(result.contains("given cash"));

    let result = send(json!({
        "from": ADMIN, "chat": ADMIN, "kind": "text", "text": "$20"
    }))
    .await;
    assert!(result.contains("change: 7.50"), "got: {result}");

    let res = r.oneshot(get_request("/orders/1")).await.unwrap();
    let order = body_json(res).await;
    assert_eq!(order["total_amount"], 12.5);
    assert_eq!(order["given_cash"], 20.0);
    assert_eq!(order["change_cash"], 7.5);
    assert_eq!(order["payment_method"], "Cash");
}

#[tokio::test]
async fn customer_intake_attaches_to_latest_new_order() {
    let app = setup();
    create_order(&app, json!({ "customer_id": CUSTOMER, "customer_name": "Sok", "items": "rice" })).await;

    let r = app.router();
    let res = r
        .clone()
        .oneshot(json_request(
            "POST",
            "/gateway/events",
            json!({ "from": CUSTOMER, "chat": CUSTOMER, "kind": "text", "text": "extra sauce" }),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["result"], "Added to order items.");

    let res = r
        .clone()
        .oneshot(json_request(
            "POST",
            "/gateway/events",
            json!({ "from": CUSTOMER, "chat": CUSTOMER, "kind": "location", "lat": 11.55, "lng": 104.92 }),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["result"], "Location saved to your order.");

    let res = r.oneshot(get_request("/orders/1")).await.unwrap();
    let order = body_json(res).await;
    assert_eq!(order["items"], "rice\nextra sauce");
    assert_eq!(order["location"]["point"]["lat"], 11.55);

    // a message from someone with no open order is ignored, not an error
    let res = app
        .router()
        .oneshot(json_request(
            "POST",
            "/gateway/events",
            json!({ "from": 12345, "chat": 12345, "kind": "text", "text": "hello" }),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["result"], "Ignored");
}

#[tokio::test]
async fn archive_window_is_configurable() {
    let app = setup();
    create_order(&app, json!({})).await;
    create_order(&app, json!({})).await;
    if let Some(mut order) = app.state.orders.get_mut(&1) {
        order.created_at -= ChronoDuration::days(10);
    }

    let r = app.router();
    // widen the window: nothing is stale
    let res = r
        .clone()
        .oneshot(json_request("PATCH", "/settings", json!({ "archive_days": 30 })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = r
        .clone()
        .oneshot(json_request("POST", "/orders/archive_stale", json!({})))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["archived"], 0);

    // back to the default window: the backdated order goes
    r.clone()
        .oneshot(json_request("PATCH", "/settings", json!({ "archive_days": 7 })))
        .await
        .unwrap();
    let res = r
        .clone()
        .oneshot(json_request("POST", "/orders/archive_stale", json!({})))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["archived"], 1);

    let res = r.oneshot(get_request("/orders/1")).await.unwrap();
    assert_eq!(body_json(res).await["status"], "Archived");
}

#[tokio::test]
async fn qr_payment_proof_marks_order_paid() {
    let app = setup();
    online_driver(&app, DRIVER, "Dara").await;
    create_order(&app, json!({ "customer_id": CUSTOMER, "customer_name": "Sok" })).await;

    let r = app.router();
    r.clone()
        .oneshot(json_request("POST", "/qr_codes", json!({ "code": "KHQR-001" })))
        .await
        .unwrap();
    r.clone()
        .oneshot(json_request(
            "POST",
            "/gateway/events",
            json!({ "from": ADMIN, "chat": ADMIN, "kind": "callback", "action": "setpay:QR:1" }),
        ))
        .await
        .unwrap();
    // move the order out of New so customer text is read as payment proof
    r.clone()
        .oneshot(json_request("POST", "/orders/1/assign", json!({})))
        .await
        .unwrap();
    r.clone()
        .oneshot(json_request("POST", "/orders/1/pickup", json!({ "driver_id": DRIVER })))
        .await
        .unwrap();

    let res = r
        .clone()
        .oneshot(json_request(
            "POST",
            "/gateway/events",
            json!({ "from": CUSTOMER, "chat": CUSTOMER, "kind": "text", "text": "paying with KHQR-001 now" }),
        ))
        .await
        .unwrap();
    let result = body_json(res).await["result"].as_str().unwrap().to_string();
    assert!(result.contains("payment received"), "got: {result}");

    let res = r.oneshot(get_request("/orders/1")).await.unwrap();
    let order = body_json(res).await;
    assert_eq!(order["paid"], true);
    assert!(app
        .gateway
        .texts_for(DRIVER)
        .iter()
        .any(|t| t.contains("marked PAID")));
}

#[tokio::test]
async fn driver_approval_over_the_gateway() {
    let app = setup();
    let r = app.router();
    r.clone()
        .oneshot(json_request("POST", "/drivers", json!({ "id": DRIVER, "name": "Dara" })))
        .await
        .unwrap();

    let res = r
        .clone()
        .oneshot(json_request(
            "POST",
            "/gateway/events",
            json!({ "from": ADMIN, "chat": ADMIN, "kind": "callback", "action": format!("drv_approve:{DRIVER}") }),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["result"], "Driver Dara approved");

    let res = r.oneshot(get_request("/drivers")).await.unwrap();
    assert_eq!(body_json(res).await[0]["status"], "Offline");
    assert!(app
        .gateway
        .texts_for(DRIVER)
        .iter()
        .any(|t| t.contains("approved")));
}

#[tokio::test]
async fn unknown_actions_degrade_to_a_notice() {
    let app = setup();
    let res = app
        .router()
        .oneshot(json_request(
            "POST",
            "/gateway/events",
            json!({ "from": ADMIN, "chat": ADMIN, "kind": "callback", "action": "frobnicate:1" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["result"], "Unsupported action");
}
