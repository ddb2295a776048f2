use std::str::FromStr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use pharmacy_dispatch::api::rest::router;
use pharmacy_dispatch::config::Config;
use pharmacy_dispatch::state::AppState;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

fn setup() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(Config::default()));
    (router(state.clone()), state)
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

fn decimal(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().unwrap()).unwrap()
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

async fn create_user(app: &axum::Router) -> String {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/users",
            json!({
                "name": "Asha",
                "phone": "9800000000",
                "location": { "lat": 12.98, "lng": 77.6 }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["id"].as_str().unwrap().to_string()
}

async fn create_active_pharmacy(app: &axum::Router) -> String {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/pharmacies",
            json!({
                "name": "City Meds",
                "vendor_name": "R. Iyer",
                "location": { "lat": 12.9716, "lng": 77.5946 },
                "status": "Active"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["id"].as_str().unwrap().to_string()
}

async fn create_online_rider(app: &axum::Router) -> String {
    let (_, rider) = send(
        app,
        json_request(
            "POST",
            "/riders",
            json!({
                "name": "Ravi",
                "phone": "9822222222",
                "location": { "lat": 12.9717, "lng": 77.5946 }
            }),
        ),
    )
    .await;
    let id = rider["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        app,
        json_request("PATCH", &format!("/riders/{id}/license"), json!({ "status": "Approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        app,
        json_request(
            "PATCH",
            &format!("/riders/{id}/availability"),
            json!({ "availability": "Online" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["availability"], "Online");
    id
}

fn order_body(user_id: &str) -> Value {
    json!({
        "user_id": user_id,
        "items": [
            {
                "medicine_id": "6f1c2a0e-1d2b-4c3d-8e4f-5a6b7c8d9e0f",
                "name": "Cetirizine",
                "quantity": 3,
                "unit_price": "40.50"
            }
        ],
        "delivery_address": { "city": "Bengaluru" },
        "delivery_location": { "lat": 12.98, "lng": 77.6 },
        "payment_method": "Online"
    })
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["riders"], 0);
    assert_eq!(body["orders"], 0);
    assert_eq!(body["pending_retries"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

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
    assert!(body.contains("pending_retries"));
}

#[tokio::test]
async fn new_rider_starts_pending_and_offline() {
    let (app, _) = setup();
    let (status, body) = send(
        &app,
        json_request("POST", "/riders", json!({ "name": "Ravi", "phone": "9822222222" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["license_status"], "Pending");
    assert_eq!(body["availability"], "Offline");
    assert_eq!(body["capacity"], 3);
    assert_eq!(decimal(&body["wallet"]["balance"]), Decimal::ZERO);
}

#[tokio::test]
async fn unlicensed_rider_cannot_go_online() {
    let (app, _) = setup();
    let (_, rider) = send(
        &app,
        json_request("POST", "/riders", json!({ "name": "Ravi", "phone": "9822222222" })),
    )
    .await;
    let id = rider["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        json_request(
            "PATCH",
            &format!("/riders/{id}/availability"),
            json!({ "availability": "Online" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden");
}

#[tokio::test]
async fn invalid_rider_location_returns_400() {
    let (app, _) = setup();
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/riders",
            json!({ "name": "Ravi", "phone": "1", "location": { "lat": 91.0, "lng": 0.0 } }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_coordinate");
}

#[tokio::test]
async fn get_unknown_order_returns_404() {
    let (app, _) = setup();
    let response = app
        .oneshot(get_request("/orders/00000000-0000-0000-0000-000000000000"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn order_with_empty_items_returns_400() {
    let (app, _) = setup();
    let user_id = create_user(&app).await;
    create_active_pharmacy(&app).await;

    let mut body = order_body(&user_id);
    body["items"] = json!([]);
    let (status, _) = send(&app, json_request("POST", "/orders", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn placing_and_accepting_an_order_assigns_a_rider() {
    let (app, _) = setup();
    let user_id = create_user(&app).await;
    let pharmacy_id = create_active_pharmacy(&app).await;
    let rider_id = create_online_rider(&app).await;

    let (status, order) = send(&app, json_request("POST", "/orders", order_body(&user_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "PendingVendorResponse");
    assert_eq!(order["display_status"], "Pending");
    assert_eq!(order["assigned_pharmacy"], pharmacy_id.as_str());
    assert_eq!(decimal(&order["charges"]["subtotal"]), Decimal::from_str("121.50").unwrap());
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, outcome) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/vendor-response"),
            json!({ "pharmacy_id": pharmacy_id, "decision": "accept" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["status"], "RiderAssigned");
    assert_eq!(outcome["timeline"].as_array().unwrap().len(), 3);

    let (_, order) = send(&app, get_request(&format!("/orders/{order_id}"))).await;
    assert_eq!(order["assigned_rider"], rider_id.as_str());
    assert_eq!(order["display_status"], "Assigned");
    assert_eq!(order["rider_status"], "Assigned");

    let (_, assignments) = send(&app, get_request("/assignments")).await;
    assert_eq!(assignments.as_array().unwrap().len(), 2);

    let (_, inbox) = send(&app, get_request(&format!("/riders/{rider_id}/notifications"))).await;
    assert_eq!(inbox.as_array().unwrap().len(), 1);

    let (_, filtered) = send(&app, get_request("/orders?status=RiderAssigned")).await;
    assert_eq!(filtered.as_array().unwrap().len(), 1);
    let (_, none) = send(&app, get_request("/orders?status=Delivered")).await;
    assert!(none.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn wrong_vendor_response_is_forbidden() {
    let (app, _) = setup();
    let user_id = create_user(&app).await;
    create_active_pharmacy(&app).await;

    let (_, order) = send(&app, json_request("POST", "/orders", order_body(&user_id))).await;
    let order_id = order["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/vendor-response"),
            json!({ "pharmacy_id": "00000000-0000-0000-0000-000000000001", "decision": "accept" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden");
}

#[tokio::test]
async fn duplicate_coupon_code_conflicts() {
    let (app, _) = setup();
    let coupon = json!({ "code": "FLAT20", "discount_percentage": "20" });

    let (status, _) = send(&app, json_request("POST", "/coupons", coupon.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, json_request("POST", "/coupons", coupon)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_state");
}

#[tokio::test]
async fn coupon_over_one_hundred_percent_returns_400() {
    let (app, _) = setup();
    let (status, _) = send(
        &app,
        json_request("POST", "/coupons", json!({ "code": "ALL", "discount_percentage": "120" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn withdrawal_is_debited_once_on_approval() {
    let (app, state) = setup();
    let rider_id = create_online_rider(&app).await;

    let (status, account) = send(
        &app,
        json_request(
            "POST",
            &format!("/riders/{rider_id}/bank-accounts"),
            json!({
                "account_holder_name": "Ravi",
                "account_number": "000123456789",
                "ifsc_code": "hdfc0000001",
                "bank_name": "HDFC"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(account["ifsc_code"], "HDFC0000001");
    let account_id = account["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/riders/{rider_id}/withdrawals"),
            json!({ "amount": "10", "bank_account_id": account_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "insufficient_funds");

    {
        let rider_uuid: uuid::Uuid = rider_id.parse().unwrap();
        let mut rider = state.riders.get_mut(&rider_uuid).unwrap();
        rider
            .wallet
            .credit(Decimal::from(100), None, "delivery earnings")
            .unwrap();
    }

    let (status, request) = send(
        &app,
        json_request(
            "POST",
            &format!("/riders/{rider_id}/withdrawals"),
            json!({ "amount": "70", "bank_account_id": account_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(request["status"], "Requested");
    let withdrawal_id = request["id"].as_str().unwrap();

    let (status, decision) = send(
        &app,
        json_request("POST", &format!("/withdrawals/{withdrawal_id}/approve"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&decision["remaining_balance"]), Decimal::from(30));

    let (status, _) = send(
        &app,
        json_request("POST", &format!("/withdrawals/{withdrawal_id}/approve"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, wallet) = send(&app, get_request(&format!("/riders/{rider_id}/wallet"))).await;
    assert_eq!(decimal(&wallet["balance"]), Decimal::from(30));
    assert_eq!(wallet["transactions"].as_array().unwrap().len(), 2);

    let (_, listed) = send(&app, get_request(&format!("/withdrawals?rider_id={rider_id}"))).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["status"], "Approved");
}

#[tokio::test]
async fn admin_base_fare_applies_to_every_rider() {
    let (app, _) = setup();
    create_online_rider(&app).await;
    create_online_rider(&app).await;

    let (_, before) = send(&app, get_request("/base-fare")).await;
    assert_eq!(decimal(&before["base_fare"]), Decimal::from(30));

    let (status, body) = send(
        &app,
        json_request("PATCH", "/admin/base-fare", json!({ "base_fare": "45" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["riders_updated"], 2);

    let (_, riders) = send(&app, get_request("/riders")).await;
    for rider in riders.as_array().unwrap() {
        assert_eq!(decimal(&rider["base_fare"]), Decimal::from(45));
    }

    let (_, current) = send(&app, get_request("/base-fare")).await;
    assert_eq!(decimal(&current["base_fare"]), Decimal::from(45));
}
