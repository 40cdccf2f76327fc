//! HTTP surface exercised through the router without binding a socket.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use ticket_core::config::Config;
use ticket_core::routes::create_routes;
use ticket_core::services::{LogDelivery, ManualClock};
use ticket_core::state::AppState;
use ticket_core::store::MemoryTicketStore;
use tower::ServiceExt;

fn app() -> (Router, Arc<ManualClock>) {
    let config = Config::from_lookup(|_| None).unwrap();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 8, 1, 10, 0, 0).unwrap()));
    let state = AppState::new(
        &config,
        Arc::new(MemoryTicketStore::new()),
        clock.clone(),
        Arc::new(LogDelivery),
    );
    (create_routes(state, &config), clock)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn register(app: &Router, total: i32) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/ticket-types",
        Some(json!({
            "eventId": "0b0e9a4c-5f7c-4a51-9d7e-1f6c2d3b4a50",
            "name": "General Admission",
            "price": "25.00",
            "eventDate": "2025-08-15T19:00:00Z",
            "totalQuantity": total
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["available"], total);
    body["data"]["id"].as_str().unwrap().to_string()
}

async fn reserve(app: &Router, session: &str, ticket_type_id: &str, quantity: i32) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/reservations",
        Some(json!({
            "sessionId": session,
            "items": [{ "ticketTypeId": ticket_type_id, "quantity": quantity }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"].clone()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app();
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_purchase_and_check_in_flow() {
    let (app, _) = app();
    let ticket_type_id = register(&app, 4).await;

    let batch = reserve(&app, "browser-1", &ticket_type_id, 2).await;
    assert_eq!(batch["successful"].as_array().unwrap().len(), 1);
    let reservation_id = batch["successful"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::GET, "/api/reservations?sessionId=browser-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/reservations/{reservation_id}/convert"),
        Some(json!({
            "sessionId": "browser-1",
            "buyerInfo": { "name": "Ada Lovelace", "email": "ada@example.com" },
            "ticketHolders": [{ "name": "Ada Lovelace" }, { "name": "Charles Babbage" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["order"]["status"], "PENDING_PAYMENT");
    assert_eq!(body["data"]["order"]["totalAmount"], "50.00");
    let order_id = body["data"]["order"]["id"].as_str().unwrap().to_string();
    let ticket_id = body["data"]["tickets"][0]["id"].as_str().unwrap().to_string();
    assert!(body["data"]["tickets"][0].get("credential").is_none());

    let (_, body) = send(&app, Method::GET, &format!("/api/ticket-types/{ticket_type_id}"), None).await;
    assert_eq!(body["data"]["soldQuantity"], 2);
    assert_eq!(body["data"]["reservedQuantity"], 0);
    assert_eq!(body["data"]["available"], 2);

    let (status, body) = send(&app, Method::POST, &format!("/api/orders/{order_id}/paid"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["order"]["status"], "PAID");
    assert_eq!(body["data"]["documents"], 2);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/tickets/{ticket_id}/qr?print=true"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let png = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(png.starts_with(b"\x89PNG"));

    let (status, body) = send(&app, Method::POST, &format!("/api/orders/{order_id}/paid"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_scan_reports_verdicts_with_ok_status() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/tickets/scan",
        Some(json!({ "credential": "v2:not:hex" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid"], false);
    assert_eq!(body["data"]["reason"], "invalid");
}

#[tokio::test]
async fn test_cleanup_accepts_beacon_body() {
    let (app, _) = app();
    let ticket_type_id = register(&app, 3).await;
    let batch = reserve(&app, "browser-2", &ticket_type_id, 3).await;
    let reservation_id = batch["successful"][0]["id"].as_str().unwrap().to_string();

    let payload = json!({ "sessionId": "browser-2", "reservationIds": [reservation_id] });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/reservations/cleanup")
                .header(header::CONTENT_TYPE, "text/plain;charset=UTF-8")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value =
        serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["data"]["cancelled"], 1);

    let (_, body) = send(&app, Method::GET, &format!("/api/ticket-types/{ticket_type_id}"), None).await;
    assert_eq!(body["data"]["available"], 3);
}

#[tokio::test]
async fn test_conversion_errors_use_error_envelope() {
    let (app, clock) = app();
    let ticket_type_id = register(&app, 5).await;
    let batch = reserve(&app, "browser-3", &ticket_type_id, 2).await;
    let reservation_id = batch["successful"][0]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/reservations/{reservation_id}/convert");
    let buyer = json!({ "name": "Ada", "email": "ada@example.com" });

    let (status, body) = send(
        &app,
        Method::POST,
        &uri,
        Some(json!({ "sessionId": "browser-3", "buyerInfo": buyer, "ticketHolders": [{ "name": "Solo" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "HOLDER_DATA_MISMATCH");
    assert_eq!(body["error"]["details"], json!({ "expected": 2, "actual": 1 }));

    let (status, _) = send(
        &app,
        Method::POST,
        &uri,
        Some(json!({ "sessionId": "intruder", "buyerInfo": buyer, "ticketHolders": [{ "name": "A" }, { "name": "B" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    clock.advance(chrono::Duration::minutes(10));
    let (status, body) = send(
        &app,
        Method::POST,
        &uri,
        Some(json!({ "sessionId": "browser-3", "buyerInfo": buyer, "ticketHolders": [{ "name": "A" }, { "name": "B" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"]["code"], "RESERVATION_EXPIRED");

    let (_, body) = send(&app, Method::GET, &format!("/api/ticket-types/{ticket_type_id}"), None).await;
    assert_eq!(body["data"]["available"], 5);
}

#[tokio::test]
async fn test_oversized_request_reports_per_item_failure() {
    let (app, _) = app();
    let ticket_type_id = register(&app, 1).await;

    let batch = reserve(&app, "browser-4", &ticket_type_id, 2).await;
    assert!(batch["successful"].as_array().unwrap().is_empty());
    assert_eq!(batch["failed"][0]["reason"]["code"], "INSUFFICIENT_AVAILABILITY");
    assert_eq!(batch["failed"][0]["reason"]["available"], 1);
}
