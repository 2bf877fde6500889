use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use parcel_dispatch::api::rest::router;
use parcel_dispatch::auth::StaticIdentityProvider;
use parcel_dispatch::engine::users::{NewUser, Registration};
use parcel_dispatch::gateway::InMemoryGateway;
use parcel_dispatch::models::user::Role;
use parcel_dispatch::state::{AppState, Settings};
use serde_json::{json, Value};
use tower::ServiceExt;

const ADMIN: &str = "admin-token";
const SENDER: &str = "sender-token";
const RIDER: &str = "rider-token";
const STRANGER: &str = "stranger-token";

struct TestApp {
    app: axum::Router,
    state: Arc<AppState>,
    gateway: InMemoryGateway,
}

fn setup() -> TestApp {
    let gateway = InMemoryGateway::new();
    let identity = StaticIdentityProvider::new()
        .with_token(ADMIN, "admin@x.com")
        .with_token(SENDER, "alice@x.com")
        .with_token(RIDER, "bob@x.com")
        .with_token(STRANGER, "carol@x.com");

    let state = Arc::new(AppState::new(
        Settings::default(),
        Arc::new(gateway.clone()),
        Arc::new(identity),
    ));

    let admin = match state
        .users
        .register(NewUser {
            email: "admin@x.com".to_string(),
            ..Default::default()
        })
        .unwrap()
    {
        Registration::Created(user) | Registration::Existing(user) => user,
    };
    state.users.set_role(admin.id, Role::Admin).unwrap();

    TestApp {
        app: router(state.clone()),
        state,
        gateway,
    }
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    request("GET", uri, token, None)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    request(method, uri, token, Some(body))
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

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

async fn create_parcel(app: &axum::Router, amount: f64) -> Value {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/parcels",
            None,
            json!({
                "parcelName": "Books",
                "parcelType": "document",
                "senderEmail": "alice@x.com",
                "senderDistrict": "Dhaka",
                "receiverDistrict": "Dhaka",
                "amount": amount
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

/// Registers bob as a user, files his rider application and approves it.
async fn approved_rider(app: &axum::Router) -> Value {
    let (status, _) = send(
        app,
        json_request("POST", "/users", None, json!({ "email": "bob@x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, rider) = send(
        app,
        json_request(
            "POST",
            "/riders",
            None,
            json!({ "name": "Bob", "email": "bob@x.com", "riderDistrict": "Dhaka" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let id = rider["id"].as_str().unwrap();
    let (status, change) = send(
        app,
        json_request(
            "PATCH",
            &format!("/riders/{id}"),
            Some(ADMIN),
            json!({ "status": "approved" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    change["rider"].clone()
}

#[tokio::test]
async fn health_returns_ok() {
    let test = setup();
    let (status, body) = send(&test.app, get_request("/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["parcels"], 0);
    assert_eq!(body["users"], 1);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let test = setup();
    create_parcel(&test.app, 100.0).await;

    let response = test
        .app
        .clone()
        .oneshot(get_request("/metrics", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("parcels_created_total 1"));
}

#[tokio::test]
async fn protected_routes_reject_missing_and_unknown_tokens() {
    let test = setup();

    let (status, body) = send(&test.app, get_request("/users", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = send(&test.app, get_request("/users", Some("forged"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_admin_is_forbidden_from_admin_routes() {
    let test = setup();

    let (status, _) = send(&test.app, get_request("/users", Some(SENDER))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &test.app,
        get_request("/admin/dashboard-stats", Some(SENDER)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&test.app, get_request("/users", Some(ADMIN))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn registering_an_existing_user_is_not_an_error() {
    let test = setup();
    let payload = json!({ "email": "Alice@x.com", "displayName": "Alice" });

    let (status, created) = send(
        &test.app,
        json_request("POST", "/users", None, payload.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["email"], "alice@x.com");
    assert_eq!(created["role"], "user");

    let (status, again) = send(&test.app, json_request("POST", "/users", None, payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["message"], "user already exists");

    let (status, role) = send(
        &test.app,
        get_request("/users/alice@x.com/role", Some(SENDER)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(role["role"], "user");
}

#[tokio::test]
async fn parcel_creation_issues_tracking_id_and_first_event() {
    let test = setup();
    let parcel = create_parcel(&test.app, 100.0).await;

    assert_eq!(parcel["deliveryStatus"], "pending");
    assert_eq!(parcel["paymentStatus"], "unpaid");
    let tracking_id = parcel["trackingId"].as_str().unwrap();
    assert!(tracking_id.starts_with("TRK-"));

    let (status, events) = send(
        &test.app,
        get_request(&format!("/trackings/{tracking_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(events.as_array().unwrap().len(), 1);
    assert_eq!(events[0]["status"], "parcel-created");
}

#[tokio::test]
async fn parcel_without_sender_email_is_rejected() {
    let test = setup();
    let (status, body) = send(
        &test.app,
        json_request(
            "POST",
            "/parcels",
            None,
            json!({ "parcelName": "Books", "amount": 10.0 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("senderEmail"));
}

#[tokio::test]
async fn sender_lists_own_parcels_only() {
    let test = setup();
    create_parcel(&test.app, 50.0).await;

    let (status, parcels) = send(
        &test.app,
        get_request("/parcels?email=alice@x.com", Some(SENDER)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parcels.as_array().unwrap().len(), 1);

    let (status, _) = send(
        &test.app,
        get_request("/parcels?email=alice@x.com", Some(STRANGER)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&test.app, get_request("/parcels", Some(SENDER))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn settlement_marks_parcel_paid_exactly_once() {
    let test = setup();
    let parcel = create_parcel(&test.app, 100.0).await;
    let parcel_id = parcel["id"].as_str().unwrap();
    let tracking_id = parcel["trackingId"].as_str().unwrap();

    let (status, checkout) = send(
        &test.app,
        json_request(
            "POST",
            "/create-checkout-session",
            None,
            json!({ "parcelId": parcel_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(checkout["url"].as_str().unwrap().starts_with("https://"));
    let session_id = checkout["sessionId"].as_str().unwrap();

    test.gateway.complete_payment(session_id, "pi_123").unwrap();

    let uri = format!("/payment-success?session_id={session_id}");
    let (status, first) = send(&test.app, request("PATCH", &uri, None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);
    assert_eq!(first["trackingId"], tracking_id);
    assert_eq!(first["transactionId"], "pi_123");
    assert_eq!(first["amount"], 100.0);

    let (status, second) = send(&test.app, request("PATCH", &uri, None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["message"], "payment already exists");
    assert_eq!(second["trackingId"], tracking_id);
    assert_eq!(second["amount"], 100.0);

    let (_, stored) = send(
        &test.app,
        get_request(&format!("/parcels/{parcel_id}"), Some(SENDER)),
    )
    .await;
    assert_eq!(stored["paymentStatus"], "paid");
    assert_eq!(stored["deliveryStatus"], "parcel-paid");
    assert_eq!(stored["trackingId"], tracking_id);

    let (_, history) = send(
        &test.app,
        get_request("/payment-history?email=alice@x.com", Some(SENDER)),
    )
    .await;
    assert_eq!(history.as_array().unwrap().len(), 1);

    let (_, events) = send(
        &test.app,
        get_request(&format!("/trackings/{tracking_id}"), None),
    )
    .await;
    let paid_events = events
        .as_array()
        .unwrap()
        .iter()
        .filter(|event| event["status"] == "parcel-paid")
        .count();
    assert_eq!(paid_events, 1);
}

#[tokio::test]
async fn unpaid_session_reports_failure_without_writes() {
    let test = setup();
    let parcel = create_parcel(&test.app, 20.0).await;

    let (_, checkout) = send(
        &test.app,
        json_request(
            "POST",
            "/create-checkout-session",
            None,
            json!({ "parcelId": parcel["id"] }),
        ),
    )
    .await;
    let uri = format!(
        "/payment-success?session_id={}",
        checkout["sessionId"].as_str().unwrap()
    );

    let (status, body) = send(&test.app, request("PATCH", &uri, None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(test.state.store.payments.is_empty());
}

#[tokio::test]
async fn rider_approval_promotes_the_user() {
    let test = setup();
    let rider = approved_rider(&test.app).await;

    assert_eq!(rider["status"], "approved");
    assert_eq!(rider["workStatus"], "available");

    let (_, role) = send(
        &test.app,
        get_request("/users/bob@x.com/role", Some(RIDER)),
    )
    .await;
    assert_eq!(role["role"], "rider");
}

#[tokio::test]
async fn duplicate_rider_application_conflicts() {
    let test = setup();
    let payload = json!({ "name": "Bob", "email": "bob@x.com", "riderDistrict": "Dhaka" });

    let (status, _) = send(
        &test.app,
        json_request("POST", "/riders", None, payload.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&test.app, json_request("POST", "/riders", None, payload)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn assign_and_deliver_flow_frees_the_rider() {
    let test = setup();
    let rider = approved_rider(&test.app).await;
    let parcel = create_parcel(&test.app, 80.0).await;
    let parcel_id = parcel["id"].as_str().unwrap();

    let (status, assignment) = send(
        &test.app,
        json_request(
            "PATCH",
            &format!("/parcels/{parcel_id}/assign"),
            Some(ADMIN),
            json!({ "riderId": rider["id"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assignment["parcelInfo"]["deliveryStatus"], "rider-assigned");
    assert_eq!(assignment["riderInfo"]["workStatus"], "in-delivery");

    let (status, active) = send(&test.app, get_request("/parcels/rider", Some(RIDER))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active.as_array().unwrap().len(), 1);

    let other = create_parcel(&test.app, 10.0).await;
    let (status, _) = send(
        &test.app,
        json_request(
            "PATCH",
            &format!("/parcels/{}/assign", other["id"].as_str().unwrap()),
            Some(ADMIN),
            json!({ "riderId": rider["id"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, update) = send(
        &test.app,
        json_request(
            "PATCH",
            &format!("/parcels/{parcel_id}/deliveryStatus"),
            Some(RIDER),
            json!({
                "deliveryStatus": "delivered",
                "trackingId": parcel["trackingId"]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(update["parcel"]["deliveryStatus"], "delivered");
    assert_eq!(update["riderReleased"], true);

    let (_, active) = send(&test.app, get_request("/parcels/rider", Some(RIDER))).await;
    assert!(active.as_array().unwrap().is_empty());

    let (_, delivered) = send(
        &test.app,
        get_request("/parcels/rider?deliveryStatus=delivered", Some(RIDER)),
    )
    .await;
    assert_eq!(delivered.as_array().unwrap().len(), 1);

    let (_, riders) = send(
        &test.app,
        get_request("/riders?workStatus=available", Some(ADMIN)),
    )
    .await;
    assert_eq!(riders.as_array().unwrap().len(), 1);

    let (_, per_day) = send(
        &test.app,
        get_request("/rider/delivery-per-day?email=bob@x.com", Some(RIDER)),
    )
    .await;
    assert_eq!(per_day[0]["deliveredCount"], 1);
}

#[tokio::test]
async fn only_riders_update_delivery_status() {
    let test = setup();
    let parcel = create_parcel(&test.app, 30.0).await;

    let (status, _) = send(
        &test.app,
        json_request(
            "PATCH",
            &format!("/parcels/{}/deliveryStatus", parcel["id"].as_str().unwrap()),
            Some(SENDER),
            json!({ "deliveryStatus": "delivered" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn assigned_parcel_cannot_be_deleted() {
    let test = setup();
    let rider = approved_rider(&test.app).await;
    let parcel = create_parcel(&test.app, 30.0).await;
    let parcel_id = parcel["id"].as_str().unwrap();

    send(
        &test.app,
        json_request(
            "PATCH",
            &format!("/parcels/{parcel_id}/assign"),
            Some(ADMIN),
            json!({ "riderId": rider["id"] }),
        ),
    )
    .await;

    let (status, _) = send(
        &test.app,
        request("DELETE", &format!("/parcels/{parcel_id}"), Some(SENDER), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn admin_reports_and_notifications() {
    let test = setup();
    create_parcel(&test.app, 40.0).await;
    create_parcel(&test.app, 60.0).await;

    let (status, stats) = send(
        &test.app,
        get_request("/admin/dashboard-stats", Some(ADMIN)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalParcels"], 2);

    let (status, counts) = send(
        &test.app,
        get_request("/parcels/delivery-stats", Some(ADMIN)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(counts[0]["status"], "pending");
    assert_eq!(counts[0]["count"], 2);

    let (status, average) = send(
        &test.app,
        get_request("/admin/average-delivery-time", Some(ADMIN)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(average["sampleSize"], 0);
    assert!(average["averageMinutes"].is_null());

    let (_, unread) = send(
        &test.app,
        get_request("/notifications?unread=true", Some(ADMIN)),
    )
    .await;
    assert_eq!(unread.as_array().unwrap().len(), 2);
    assert_eq!(unread[0]["type"], "new-order");

    let (status, marked) = send(
        &test.app,
        request("PATCH", "/notifications/read-all", Some(ADMIN), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(marked["updatedCount"], 2);

    let (_, unread) = send(
        &test.app,
        get_request("/notifications?unread=true", Some(ADMIN)),
    )
    .await;
    assert!(unread.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn reapproving_a_busy_rider_keeps_the_claim() {
    let test = setup();
    let rider = approved_rider(&test.app).await;
    let rider_id = rider["id"].as_str().unwrap();
    let first = create_parcel(&test.app, 20.0).await;
    let second = create_parcel(&test.app, 30.0).await;

    let (status, _) = send(
        &test.app,
        json_request(
            "PATCH",
            &format!("/parcels/{}/assign", first["id"].as_str().unwrap()),
            Some(ADMIN),
            json!({ "riderId": rider_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, change) = send(
        &test.app,
        json_request(
            "PATCH",
            &format!("/riders/{rider_id}"),
            Some(ADMIN),
            json!({ "status": "approved" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change["rider"]["workStatus"], "in-delivery");

    let (status, _) = send(
        &test.app,
        json_request(
            "PATCH",
            &format!("/parcels/{}/assign", second["id"].as_str().unwrap()),
            Some(ADMIN),
            json!({ "riderId": rider_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &test.app,
        json_request(
            "PATCH",
            &format!("/riders/{rider_id}"),
            Some(ADMIN),
            json!({ "status": "rejected" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, active) = send(&test.app, get_request("/parcels/rider", Some(RIDER))).await;
    assert_eq!(active.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_rider_filter_falls_back_to_active_work() {
    let test = setup();
    let rider = approved_rider(&test.app).await;
    let parcel = create_parcel(&test.app, 20.0).await;

    send(
        &test.app,
        json_request(
            "PATCH",
            &format!("/parcels/{}/assign", parcel["id"].as_str().unwrap()),
            Some(ADMIN),
            json!({ "riderId": rider["id"] }),
        ),
    )
    .await;

    for uri in [
        "/parcels/rider?deliveryStatus=all",
        "/parcels/rider?deliveryStatus=",
        "/parcels/rider?deliveryStatus=pending",
    ] {
        let (status, parcels) = send(&test.app, get_request(uri, Some(RIDER))).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(parcels.as_array().unwrap().len(), 1, "{uri}");
    }

    let (status, delivered) = send(
        &test.app,
        get_request("/parcels/rider?deliveryStatus=delivered", Some(RIDER)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(delivered.as_array().unwrap().is_empty());
}
