mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use common::test_config;
use dormitory_backend::middleware::AppState;
use dormitory_backend::models::UserRole;
use dormitory_backend::services::{AuthService, WebhookNotifier};
use dormitory_backend::storage::InMemoryStore;

fn router() -> Router {
    let config = test_config();
    dormitory_backend::app(AppState {
        store: Arc::new(InMemoryStore::new()),
        notifier: Arc::new(WebhookNotifier::new(config.clone())),
        config,
    })
}

fn token(role: UserRole) -> String {
    AuthService::new(test_config())
        .generate_access_token(Uuid::new_v4(), role)
        .unwrap()
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn room_payload(number: &str) -> Value {
    json!({
        "number": number,
        "rent": "3000",
        "deposit": "5000",
        "booking_fee": "500"
    })
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let response = router()
        .oneshot(request(Method::GET, "/api/v1/rooms", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router()
        .oneshot(request(Method::GET, "/api/v1/rooms", Some("garbage"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_creates_room_and_tenant_is_forbidden() {
    let app = router();
    let admin = token(UserRole::Admin);
    let tenant = token(UserRole::Tenant);

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/v1/rooms",
            Some(&tenant),
            Some(room_payload("201")),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/v1/rooms",
            Some(&admin),
            Some(room_payload("201")),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let room = json_body(response).await;
    assert_eq!(room["number"], "201");
    assert_eq!(room["status"], "vacant");

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/v1/rooms",
            Some(&admin),
            Some(room_payload("201")),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let response = app
        .oneshot(request(Method::GET, "/api/v1/rooms", Some(&tenant), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_bill_is_not_found() {
    let uri = format!("/api/v1/bills/{}", Uuid::new_v4());
    let response = router()
        .oneshot(request(
            Method::GET,
            &uri,
            Some(&token(UserRole::Admin)),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_booking_without_checkin_date_is_unprocessable() {
    let app = router();
    let admin = token(UserRole::Admin);
    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/v1/rooms",
            Some(&admin),
            Some(room_payload("202")),
        ))
        .await
        .unwrap();
    let room = json_body(response).await;

    let response = app
        .oneshot(request(
            Method::POST,
            "/api/v1/bookings",
            Some(&token(UserRole::Tenant)),
            Some(json!({
                "room_id": room["id"],
                "full_name": "Somchai",
                "phone": "0812345678"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        json_body(response).await["error"]["code"],
        "VALIDATION_ERROR"
    );
}

#[tokio::test]
async fn test_eligibility_query_needs_room_and_readable_month() {
    let app = router();
    let admin = token(UserRole::Admin);
    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/v1/rooms",
            Some(&admin),
            Some(room_payload("203")),
        ))
        .await
        .unwrap();
    let room = json_body(response).await;
    let room_id = room["id"].as_str().unwrap().to_string();

    for uri in [
        "/api/v1/bills/eligibility?month=2025-03".to_string(),
        format!("/api/v1/bills/eligibility?room_id={}", room_id),
        format!("/api/v1/bills/eligibility?room_id={}&month=2025-13", room_id),
    ] {
        let response = app
            .clone()
            .oneshot(request(Method::GET, &uri, Some(&admin), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(json_body(response).await["error"]["code"], "BAD_REQUEST");
    }

    let uri = format!("/api/v1/bills/eligibility?room_id={}&month=2025-03", room_id);
    let response = app
        .oneshot(request(Method::GET, &uri, Some(&admin), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["month"], "2025-03-01");
    assert_eq!(body["eligible"], false);
}
