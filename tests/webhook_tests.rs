mod common;

use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

use movigoo_bookings_rs::models::{BookingStatus, PaymentStatus};

const ORDER_ID: &str = "MVG-1756500000000-123456";

fn webhook_payload(order_id: &str, status: &str) -> String {
    json!({
        "type": "PAYMENT_SUCCESS_WEBHOOK",
        "data": {
            "order": { "order_id": order_id },
            "payment": { "payment_status": status, "cf_payment_id": 885210 }
        }
    })
    .to_string()
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Reserve 2 VIP tickets over HTTP and wire up the gateway order id.
async fn reserve_with_order(
    app: &axum::Router,
    store: &movigoo_bookings_rs::store::MemoryStore,
    user_id: &str,
    order_id: &str,
) -> Uuid {
    use movigoo_bookings_rs::store::BookingStore;

    let token = common::identity_token(user_id);
    let response = app
        .clone()
        .oneshot(common::post_json(
            "/api/bookings/reserve",
            Some(&token),
            &json!({"eventId": common::EVENT_ID, "items": [{"ticketTypeId": "vip", "quantity": 2}]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = common::body_json(response).await;
    assert_eq!(body["totalAmount"], 10007);
    let booking_id: Uuid = body["bookingId"].as_str().unwrap().parse().unwrap();

    store.attach_order(booking_id, order_id).await.unwrap();
    booking_id
}

#[tokio::test]
async fn success_webhook_confirms_booking_and_issues_qr_token() {
    let (state, store) = common::setup_state();
    common::seed_event(&store).await;
    let app = common::app(state);

    let booking_id = reserve_with_order(&app, &store, "user-a", ORDER_ID).await;

    let payload = webhook_payload(ORDER_ID, "SUCCESS");
    let response = app
        .clone()
        .oneshot(common::signed_webhook(
            "/api/payments/webhook",
            &payload,
            now(),
            common::WEBHOOK_SECRET,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = common::body_json(response).await;
    assert_eq!(body["bookingStatus"], "CONFIRMED");
    assert!(!body["qrToken"].as_str().unwrap().is_empty());

    use movigoo_bookings_rs::store::BookingStore;
    let booking = store.get_booking(booking_id).await.unwrap().unwrap();
    assert_eq!(booking.booking_status, BookingStatus::Confirmed);
    assert_eq!(booking.payment_status, PaymentStatus::Success);
    assert!(booking.qr_token.is_some());

    // Confirmation does not touch inventory; the hold was taken at
    // reservation time.
    let event = store.get_event(common::EVENT_ID).await.unwrap().unwrap();
    assert_eq!(event.ticket_type("vip").unwrap().tickets_sold, 2);
}

#[tokio::test]
async fn duplicate_delivery_replays_stored_result_without_second_transition() {
    let (state, store) = common::setup_state();
    common::seed_event(&store).await;
    let app = common::app(state);

    reserve_with_order(&app, &store, "user-a", ORDER_ID).await;

    let payload = webhook_payload(ORDER_ID, "SUCCESS");
    let first = app
        .clone()
        .oneshot(common::signed_webhook(
            "/api/payments/webhook",
            &payload,
            now(),
            common::WEBHOOK_SECRET,
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first_body = common::body_json(first).await;

    let second = app
        .clone()
        .oneshot(common::signed_webhook(
            "/api/payments/webhook",
            &payload,
            now(),
            common::WEBHOOK_SECRET,
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second_body = common::body_json(second).await;

    // Same stored result, including the QR token: the second delivery did
    // not re-run confirmation.
    assert_eq!(first_body["qrToken"], second_body["qrToken"]);
    assert_eq!(first_body, second_body);
}

#[tokio::test]
async fn failed_webhook_releases_held_inventory() {
    let (state, store) = common::setup_state();
    common::seed_event(&store).await;
    let app = common::app(state);

    let booking_id = reserve_with_order(&app, &store, "user-a", ORDER_ID).await;

    use movigoo_bookings_rs::store::BookingStore;
    let event = store.get_event(common::EVENT_ID).await.unwrap().unwrap();
    assert_eq!(event.ticket_type("vip").unwrap().tickets_sold, 2);

    let payload = webhook_payload(ORDER_ID, "FAILED");
    let response = app
        .clone()
        .oneshot(common::signed_webhook(
            "/api/payments/webhook",
            &payload,
            now(),
            common::WEBHOOK_SECRET,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let booking = store.get_booking(booking_id).await.unwrap().unwrap();
    assert_eq!(booking.booking_status, BookingStatus::Failed);
    assert_eq!(booking.payment_status, PaymentStatus::Failed);
    assert!(booking.qr_token.is_none());

    let event = store.get_event(common::EVENT_ID).await.unwrap().unwrap();
    assert_eq!(event.ticket_type("vip").unwrap().tickets_sold, 0);
}

#[tokio::test]
async fn invalid_signature_never_mutates_state() {
    let (state, store) = common::setup_state();
    common::seed_event(&store).await;
    let app = common::app(state);

    let booking_id = reserve_with_order(&app, &store, "user-a", ORDER_ID).await;

    let payload = webhook_payload(ORDER_ID, "SUCCESS");
    let response = app
        .clone()
        .oneshot(common::signed_webhook(
            "/api/payments/webhook",
            &payload,
            now(),
            "not-the-real-secret",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    use movigoo_bookings_rs::store::BookingStore;
    let booking = store.get_booking(booking_id).await.unwrap().unwrap();
    assert_eq!(booking.booking_status, BookingStatus::Pending);
    let event = store.get_event(common::EVENT_ID).await.unwrap().unwrap();
    assert_eq!(event.ticket_type("vip").unwrap().tickets_sold, 2);
}

#[tokio::test]
async fn missing_signature_headers_are_rejected() {
    let (state, store) = common::setup_state();
    common::seed_event(&store).await;
    let app = common::app(state);

    let payload = webhook_payload(ORDER_ID, "SUCCESS");
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/payments/webhook")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(payload))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn stale_timestamp_is_rejected_as_replay() {
    let (state, store) = common::setup_state();
    common::seed_event(&store).await;
    let app = common::app(state);

    let payload = webhook_payload(ORDER_ID, "SUCCESS");
    let old = now() - 3600;
    let response = app
        .clone()
        .oneshot(common::signed_webhook(
            "/api/payments/webhook",
            &payload,
            old,
            common::WEBHOOK_SECRET,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unrecognized_status_is_acknowledged_without_mutation() {
    let (state, store) = common::setup_state();
    common::seed_event(&store).await;
    let app = common::app(state);

    let booking_id = reserve_with_order(&app, &store, "user-a", ORDER_ID).await;

    let payload = webhook_payload(ORDER_ID, "PENDING_AUTHORIZATION");
    let response = app
        .clone()
        .oneshot(common::signed_webhook(
            "/api/payments/webhook",
            &payload,
            now(),
            common::WEBHOOK_SECRET,
        ))
        .await
        .unwrap();
    // 200 so the gateway stops retrying a webhook we cannot act on yet.
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["ignored"], true);

    use movigoo_bookings_rs::store::BookingStore;
    let booking = store.get_booking(booking_id).await.unwrap().unwrap();
    assert_eq!(booking.booking_status, BookingStatus::Pending);
}

#[tokio::test]
async fn unknown_order_id_is_acknowledged_and_logged() {
    let (state, store) = common::setup_state();
    common::seed_event(&store).await;
    let app = common::app(state);

    let payload = webhook_payload("MVG-0-000000", "SUCCESS");
    let response = app
        .clone()
        .oneshot(common::signed_webhook(
            "/api/payments/webhook",
            &payload,
            now(),
            common::WEBHOOK_SECRET,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["reason"], "unknown_order");
}

#[tokio::test]
async fn malformed_payload_with_valid_signature_returns_400() {
    let (state, store) = common::setup_state();
    common::seed_event(&store).await;
    let app = common::app(state);

    let payload = r#"{"data": {"order": 42}}"#;
    let response = app
        .clone()
        .oneshot(common::signed_webhook(
            "/api/payments/webhook",
            payload,
            now(),
            common::WEBHOOK_SECRET,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn idempotency_save_refuses_a_living_duplicate_but_not_an_expired_one() {
    use movigoo_bookings_rs::models::IDEMPOTENCY_TTL_SECONDS;
    use movigoo_bookings_rs::store::{BookingStore, MemoryStore, StoreError};

    let store = MemoryStore::new();
    let key = "confirm:MVG-1-1";
    let result = json!({"bookingStatus": "CONFIRMED"});

    store.idempotency_save(key, &result).await.unwrap();
    assert!(matches!(
        store.idempotency_save(key, &result).await,
        Err(StoreError::DuplicateKey)
    ));

    // Past the TTL the record is treated as absent and the key is reusable.
    store
        .backdate_idempotency(
            key,
            chrono::Utc::now() - chrono::Duration::seconds(IDEMPOTENCY_TTL_SECONDS + 1),
        )
        .await;
    assert!(store
        .idempotency_check(key, IDEMPOTENCY_TTL_SECONDS)
        .await
        .unwrap()
        .is_none());
    store.idempotency_save(key, &result).await.unwrap();
}

#[tokio::test]
async fn redelivery_after_idempotency_expiry_reruns_instead_of_replaying() {
    use movigoo_bookings_rs::models::IDEMPOTENCY_TTL_SECONDS;
    use movigoo_bookings_rs::store::BookingStore;

    let (state, store) = common::setup_state();
    common::seed_event(&store).await;
    let app = common::app(state);

    let booking_id = reserve_with_order(&app, &store, "user-a", ORDER_ID).await;

    let payload = webhook_payload(ORDER_ID, "SUCCESS");
    let first = app
        .clone()
        .oneshot(common::signed_webhook(
            "/api/payments/webhook",
            &payload,
            now(),
            common::WEBHOOK_SECRET,
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let key = format!("confirm:{ORDER_ID}");
    store
        .backdate_idempotency(
            &key,
            chrono::Utc::now() - chrono::Duration::seconds(IDEMPOTENCY_TTL_SECONDS + 1),
        )
        .await;
    assert!(store
        .idempotency_check(&key, IDEMPOTENCY_TTL_SECONDS)
        .await
        .unwrap()
        .is_none());

    let second = app
        .clone()
        .oneshot(common::signed_webhook(
            "/api/payments/webhook",
            &payload,
            now(),
            common::WEBHOOK_SECRET,
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let body = common::body_json(second).await;
    assert_eq!(body["bookingStatus"], "CONFIRMED");

    // The handler re-ran (already-settled no-op) and saved a fresh record,
    // so the key is live again.
    assert!(store
        .idempotency_check(&key, IDEMPOTENCY_TTL_SECONDS)
        .await
        .unwrap()
        .is_some());

    let booking = store.get_booking(booking_id).await.unwrap().unwrap();
    assert_eq!(booking.booking_status, BookingStatus::Confirmed);
    let event = store.get_event(common::EVENT_ID).await.unwrap().unwrap();
    assert_eq!(event.ticket_type("vip").unwrap().tickets_sold, 2);
}

#[tokio::test]
async fn webhook_after_expiry_is_a_noop() {
    let (state, store) = common::setup_state();
    common::seed_event(&store).await;
    let app = common::app(state.clone());

    let booking_id = reserve_with_order(&app, &store, "user-a", ORDER_ID).await;

    // Reaper wins the race: booking expires before the webhook lands.
    store
        .backdate_booking(booking_id, chrono::Utc::now() - chrono::Duration::minutes(20))
        .await;
    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/api/cron/expire-bookings")
        .header("authorization", format!("Bearer {}", common::CRON_SECRET))
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let payload = webhook_payload(ORDER_ID, "SUCCESS");
    let response = app
        .clone()
        .oneshot(common::signed_webhook(
            "/api/payments/webhook",
            &payload,
            now(),
            common::WEBHOOK_SECRET,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    use movigoo_bookings_rs::store::BookingStore;
    let booking = store.get_booking(booking_id).await.unwrap().unwrap();
    // The still-PENDING guard keeps the late success from resurrecting an
    // expired booking.
    assert_eq!(booking.booking_status, BookingStatus::Expired);

    let event = store.get_event(common::EVENT_ID).await.unwrap().unwrap();
    assert_eq!(event.ticket_type("vip").unwrap().tickets_sold, 0);
}
