//! Integration tests for the HTTP surface
//!
//! Drives the axum router end to end with the gateway identity headers:
//! instruction, invoice validation, confirmation, monitoring and cleanup.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use errandbit_core::{JobRecord, JobStatus, ManualClock, PaymentHash};
use errandbit_crypto::generate_preimage;
use errandbit_daemon::{router, PaymentService, ServiceConfig, USER_ID_HEADER, USER_ROLE_HEADER};
use errandbit_ledger::PaymentLedger;
use errandbit_lightning::{sign_invoice, FixedRateOracle, InvoiceParams, MockProvider};
use errandbit_monitor::LogAlertSink;

// =============================================================================
// HELPERS
// =============================================================================

const NOW: u64 = 1_750_000_000;

fn app(clock: Arc<ManualClock>) -> Router {
    let service = PaymentService::with_parts(
        PaymentLedger::open_in_memory().unwrap(),
        Arc::new(MockProvider::with_clock(clock.clone())),
        Arc::new(FixedRateOracle::with_clock(1500, clock.clone())),
        ServiceConfig::default(),
        clock,
        Arc::new(LogAlertSink),
    );
    service
        .sync_job(&JobRecord {
            id: 7,
            price_cents: 5000,
            status: JobStatus::AwaitingPayment,
            client_id: 100,
            runner_id: Some(200),
            runner_lightning_address: Some("runner@ln.example".to_string()),
        })
        .unwrap();
    router(Arc::new(service))
}

fn request(method: &str, uri: &str, user: Option<(&str, &str)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((id, role)) = user {
        builder = builder
            .header(USER_ID_HEADER, id)
            .header(USER_ROLE_HEADER, role);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

const CLIENT: Option<(&str, &str)> = Some(("100", "client"));
const ADMIN: Option<(&str, &str)> = Some(("1", "admin"));

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn invoice(hash: PaymentHash, sats: u64) -> String {
    sign_invoice(&InvoiceParams {
        payment_hash: hash,
        amount_msats: Some(sats * 1000),
        description: "Errand #7".to_string(),
        created_at: NOW,
        expiry_secs: 3600,
    })
    .unwrap()
}

// =============================================================================
// 1. Full flow over HTTP
// =============================================================================

#[tokio::test]
async fn test_pay_and_confirm_over_http() {
    let app = app(Arc::new(ManualClock::new(NOW)));

    let (status, body) = call(&app, request("GET", "/payments/instruction?job_id=7", CLIENT, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amount_sats"], 75_000);

    let (preimage, hash) = generate_preimage();
    let (status, body) = call(
        &app,
        request(
            "POST",
            "/payments/validate-invoice",
            CLIENT,
            Some(json!({ "job_id": 7, "bolt11": invoice(hash, 75_000) })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_valid"], true);
    assert_eq!(body["payment_hash"], hash.to_hex());
    assert_eq!(body["expires_at"], NOW + 3600);

    let confirm = json!({
        "job_id": 7,
        "preimage": preimage.to_hex(),
        "payment_hash": hash.to_hex(),
    });
    let (status, body) = call(&app, request("POST", "/payments/confirm", CLIENT, Some(confirm.clone()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "payment_confirmed");

    let (status, body) = call(&app, request("POST", "/payments/confirm", CLIENT, Some(confirm))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["kind"], "conflict");
    assert_eq!(body["error"]["code"], "already_confirmed");

    let (status, body) = call(&app, request("GET", "/monitoring/payments", ADMIN, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metrics"]["successful_payments_24h"], 1);
    assert_eq!(body["metrics"]["total_revenue_sats"], 75_000);
}

#[tokio::test]
async fn test_cleanup_over_http() {
    let clock = Arc::new(ManualClock::new(NOW));
    let app = app(clock.clone());

    let (_, hash) = generate_preimage();
    let (status, _) = call(
        &app,
        request(
            "POST",
            "/payments/validate-invoice",
            CLIENT,
            Some(json!({ "job_id": 7, "bolt11": invoice(hash, 75_000) })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    clock.advance(2 * 3600);
    let (status, body) = call(&app, request("POST", "/monitoring/cleanup/expired-invoices", ADMIN, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expired"], 1);

    let (_, body) = call(&app, request("POST", "/monitoring/cleanup/expired-invoices", ADMIN, None)).await;
    assert_eq!(body["expired"], 0);
}

// =============================================================================
// NEGATIVE TESTS
// =============================================================================

#[tokio::test]
async fn test_wrong_amount_is_invalid() {
    let app = app(Arc::new(ManualClock::new(NOW)));
    let (_, hash) = generate_preimage();

    let (status, body) = call(
        &app,
        request(
            "POST",
            "/payments/validate-invoice",
            CLIENT,
            Some(json!({ "job_id": 7, "bolt11": invoice(hash, 74_999) })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["is_valid"], false);
    assert_eq!(body["error"]["code"], "amount_mismatch");
}

#[tokio::test]
async fn test_wrong_preimage_is_bad_request() {
    let app = app(Arc::new(ManualClock::new(NOW)));
    let (_, hash) = generate_preimage();
    let (other, _) = generate_preimage();

    let (status, body) = call(
        &app,
        request(
            "POST",
            "/payments/confirm",
            CLIENT,
            Some(json!({ "job_id": 7, "preimage": other.to_hex(), "payment_hash": hash.to_hex() })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "preimage_mismatch");
}

#[tokio::test]
async fn test_runner_cannot_confirm() {
    let app = app(Arc::new(ManualClock::new(NOW)));
    let (preimage, hash) = generate_preimage();

    let (status, _) = call(
        &app,
        request(
            "POST",
            "/payments/confirm",
            Some(("200", "runner")),
            Some(json!({ "job_id": 7, "preimage": preimage.to_hex(), "payment_hash": hash.to_hex() })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_anonymous_requests_rejected() {
    let app = app(Arc::new(ManualClock::new(NOW)));

    for (method, uri) in [
        ("GET", "/payments/instruction?job_id=7"),
        ("GET", "/monitoring/payments"),
        ("POST", "/monitoring/cleanup/expired-invoices"),
    ] {
        let (status, body) = call(&app, request(method, uri, None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        assert_eq!(body["error"]["kind"], "unauthorized");
    }
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = app(Arc::new(ManualClock::new(NOW)));
    let (status, body) = call(&app, request("GET", "/payments/instruction?job_id=8", CLIENT, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "job_not_found");
}
