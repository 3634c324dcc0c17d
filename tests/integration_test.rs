//! Integration tests for the API.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde_json::json;
use tower::ServiceExt;

use escrow_disbursement_engine::api::{
    GATEWAY_SIGNATURE_HEADER, ListFailedDisbursementsResponse, MONNIFY_SIGNATURE_HEADER,
    RateLimitConfig, create_router, create_router_with_rate_limit,
};
use escrow_disbursement_engine::app::{AppService, AppState, Collaborators, EngineConfig};
use escrow_disbursement_engine::domain::{
    DatabaseClient, Disbursement, DisbursementStatus, FailedDisbursement, Gateway,
    HealthResponse, HealthStatus, RateLimitResponse,
};
use escrow_disbursement_engine::infra::{GatewayRegistry, WalletGateway, signature};
use escrow_disbursement_engine::test_utils::{
    MockDatabaseClient, MockGatewayClient, MockIdentityClient, MockNotifier,
    MockTransactionClient, MockWebhookSender, bank_business, pending_disbursement,
    verified_individual,
};

const GATEWAY_SECRET: &str = "gateway-secret";
const MONNIFY_SECRET: &str = "monnify-secret";

struct TestApp {
    db: Arc<MockDatabaseClient>,
    state: Arc<AppState>,
}

fn create_test_app() -> TestApp {
    let db = Arc::new(MockDatabaseClient::new());
    let identity = Arc::new(MockIdentityClient::new());
    identity.add_recipient(verified_individual("acct-1"));
    identity.add_business(bank_business("biz-1"));

    let service = Arc::new(AppService::new(
        Collaborators {
            db_client: Arc::clone(&db) as _,
            gateways: GatewayRegistry::new()
                .with(Arc::new(WalletGateway::new()))
                .with(Arc::new(MockGatewayClient::new(Gateway::Rave)))
                .with(Arc::new(MockGatewayClient::new(Gateway::Monnify))),
            identity_client: identity,
            transaction_client: Arc::new(MockTransactionClient::new()),
            notifier: Arc::new(MockNotifier::new()),
            webhook_sender: Arc::new(MockWebhookSender::responding(200)),
        },
        EngineConfig::default(),
    ));
    let state = Arc::new(AppState::with_webhook_secrets(
        service,
        Some(SecretString::from(GATEWAY_SECRET)),
        Some(SecretString::from(MONNIFY_SECRET)),
    ));
    TestApp { db, state }
}

fn signed_post(uri: &str, header: &str, secret: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .header(header, signature::sign(secret.as_bytes(), body.as_bytes()))
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check_healthy() {
    let app = create_test_app();
    let router = create_router(app.state);

    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health: HealthResponse = body_json(response).await;
    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.database, HealthStatus::Healthy);
    assert_eq!(health.gateways, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_readiness_fails_when_database_down() {
    let app = create_test_app();
    app.db.set_healthy(false);
    let router = create_router(app.state);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/health/ready")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_get_disbursement() {
    let app = create_test_app();
    app.db
        .put_disbursement(pending_disbursement("d-1", Some("pay-1"), dec!(1000.00)));
    let router = create_router(app.state);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/disbursements/d-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disbursement: Disbursement = body_json(response).await;
    assert_eq!(disbursement.reference, "DSB-d-1");
    assert_eq!(disbursement.status, DisbursementStatus::Pending);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/disbursements/missing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_gateway_webhook_rejects_bad_signature() {
    let app = create_test_app();
    let router = create_router(app.state);
    let body = json!({ "event": "transfer.completed", "data": { "reference": "DSB-d-1" } })
        .to_string();

    let response = router
        .clone()
        .oneshot(signed_post(
            "/webhooks/gateway/rave",
            GATEWAY_SIGNATURE_HEADER,
            "wrong-secret",
            &body,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let unsigned = Request::builder()
        .method("POST")
        .uri("/webhooks/gateway/rave")
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = router.oneshot(unsigned).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert!(app.db.gateway_logs().is_empty());
}

#[tokio::test]
async fn test_gateway_webhook_records_payload() {
    let app = create_test_app();
    app.db
        .put_disbursement(pending_disbursement("d-1", Some("pay-1"), dec!(1000.00)));
    let router = create_router(app.state);
    let body = json!({ "event": "transfer.completed", "data": { "reference": "DSB-d-1" } })
        .to_string();

    let response = router
        .oneshot(signed_post(
            "/webhooks/gateway/rave",
            GATEWAY_SIGNATURE_HEADER,
            GATEWAY_SECRET,
            &body,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let logs = app.db.gateway_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].source, "rave");
    assert_eq!(logs[0].reference.as_deref(), Some("DSB-d-1"));
    assert_eq!(logs[0].payload, body);
}

#[tokio::test]
async fn test_gateway_webhook_rejects_malformed_body() {
    let app = create_test_app();
    let router = create_router(app.state);

    let response = router
        .oneshot(signed_post(
            "/webhooks/gateway/rave",
            GATEWAY_SIGNATURE_HEADER,
            GATEWAY_SECRET,
            "{\"data\": 1}",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.db.gateway_logs().is_empty());
}

#[tokio::test]
async fn test_monnify_failed_callback_refunds_once() {
    let app = create_test_app();
    let mut disbursement = pending_disbursement("d-1", Some("pay-1"), dec!(1000.00));
    disbursement.gateway = Gateway::Monnify;
    app.db.put_disbursement(disbursement);
    let router = create_router(app.state);

    let body = json!({
        "eventType": "FAILED_DISBURSEMENT",
        "eventData": {
            "reference": "DSB-d-1",
            "amount": "1000.00",
            "status": "FAILED",
            "transactionDescription": "Beneficiary bank unavailable"
        }
    })
    .to_string();

    for _ in 0..2 {
        let response = router
            .clone()
            .oneshot(signed_post(
                "/webhooks/monnify/disbursement",
                MONNIFY_SIGNATURE_HEADER,
                MONNIFY_SECRET,
                &body,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(app.db.balance("biz-1", "NGN"), dec!(1000.00));
    let stored = app.db.get_disbursement("d-1").await.unwrap().unwrap();
    assert_eq!(stored.status, DisbursementStatus::Failed);
    assert_eq!(
        stored.last_error.as_deref(),
        Some("Beneficiary bank unavailable")
    );
    assert_eq!(app.db.gateway_logs().len(), 2);
}

#[tokio::test]
async fn test_monnify_callback_unknown_reference() {
    let app = create_test_app();
    let router = create_router(app.state);
    let body = json!({
        "eventType": "SUCCESSFUL_DISBURSEMENT",
        "eventData": { "reference": "DSB-unknown", "amount": "10.00" }
    })
    .to_string();

    let response = router
        .oneshot(signed_post(
            "/webhooks/monnify/disbursement",
            MONNIFY_SIGNATURE_HEADER,
            MONNIFY_SECRET,
            &body,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_withdrawal_insufficient_funds() {
    let app = create_test_app();
    app.db.set_balance("acct-1", "NGN", dec!(100.00));
    let router = create_router(app.state);

    let request = Request::builder()
        .method("POST")
        .uri("/wallets/acct-1/withdrawals")
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({ "business_id": "biz-1", "amount": "100.00", "currency": "ngn" }).to_string(),
        ))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    // Amount plus the business charge exceeds the balance
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body: serde_json::Value = body_json(response).await;
    assert_eq!(body["error"]["type"], "insufficient_funds");
    assert_eq!(app.db.balance("acct-1", "NGN"), dec!(100.00));
    assert!(app.db.disbursements().is_empty());
}

#[tokio::test]
async fn test_withdrawal_success() {
    let app = create_test_app();
    app.db.set_balance("acct-1", "NGN", dec!(1000.00));
    let router = create_router(app.state);

    let request = Request::builder()
        .method("POST")
        .uri("/wallets/acct-1/withdrawals")
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({ "business_id": "biz-1", "amount": "500.00", "currency": "NGN" }).to_string(),
        ))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let disbursement: Disbursement = body_json(response).await;
    assert!(disbursement.payment_id.is_none());
    assert_eq!(disbursement.amount, dec!(500.00));
    assert_eq!(disbursement.gateway, Gateway::Rave);
    assert_eq!(app.db.balance("acct-1", "NGN"), dec!(450.00));
}

#[tokio::test]
async fn test_admin_failed_disbursements() {
    let app = create_test_app();
    app.db
        .insert_failed_disbursement(&FailedDisbursement {
            payment_id: "pay-1".to_string(),
            transaction_id: "tx-1".to_string(),
            business_id: "biz-1".to_string(),
            restricted: vec!["bvn_unverified".to_string()],
            issues: vec![],
            created_at: chrono::Utc::now(),
        })
        .await
        .unwrap();
    let router = create_router(app.state);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/failed-disbursements")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed: ListFailedDisbursementsResponse = body_json(response).await;
    assert_eq!(listed.count, 1);
    assert_eq!(listed.entries[0].payment_id, "pay-1");

    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri("/admin/failed-disbursements/pay-1")
            .body(Body::empty())
            .unwrap()
    };
    let response = router.clone().oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router.oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app.db.get_failed_disbursement("pay-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_rate_limit_rejects_burst_but_not_health() {
    let app = create_test_app();
    let router = create_router_with_rate_limit(
        app.state,
        RateLimitConfig {
            requests_per_second: 1,
            burst_size: 1,
        },
    );
    let get = |uri: &str| Request::builder().uri(uri).body(Body::empty()).unwrap();

    let response = router.clone().oneshot(get("/disbursements/d-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router.clone().oneshot(get("/disbursements/d-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    let body: RateLimitResponse = body_json(response).await;
    assert_eq!(body.error.r#type, "rate_limited");
    assert!(body.retry_after >= 1);

    let response = router.oneshot(get("/health/live")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
