//! HTTP request handlers with OpenAPI documentation.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::{error, info, warn};
use utoipa::OpenApi;

use crate::app::{AppState, ReconcileOutcome};
use crate::domain::{
    AppError, BankTransfer, DatabaseError, Disbursement, ErrorDetail, ErrorResponse,
    ExternalServiceError, GatewayError, GatewayWebhookPayload, HealthResponse, HealthStatus,
    MonnifyDisbursementCallback, RegisterBankTransferRequest, ValidationError, WithdrawalRequest,
};
use crate::infra::signature;

/// Signature header on generic gateway webhooks
pub const GATEWAY_SIGNATURE_HEADER: &str = "x-webhook-signature";
/// Signature header on Monnify disbursement callbacks
pub const MONNIFY_SIGNATURE_HEADER: &str = "monnify-signature";

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Escrow Disbursement Engine API",
        version = "0.1.0",
        description = "Escrow payouts, wallet withdrawals and gateway callbacks",
        license(
            name = "MIT"
        )
    ),
    paths(
        get_disbursement_handler,
        withdraw_handler,
        register_bank_transfer_handler,
        gateway_webhook_handler,
        monnify_webhook_handler,
        health_check_handler,
        liveness_handler,
        readiness_handler,
        crate::api::admin::list_failed_disbursements_handler,
        crate::api::admin::clear_failed_disbursement_handler,
    ),
    components(
        schemas(
            Disbursement,
            crate::domain::DisbursementStatus,
            crate::domain::Gateway,
            crate::domain::FailedDisbursement,
            WithdrawalRequest,
            RegisterBankTransferRequest,
            BankTransfer,
            crate::domain::BankTransferStatus,
            GatewayWebhookPayload,
            crate::domain::GatewayWebhookData,
            MonnifyDisbursementCallback,
            crate::domain::MonnifyDisbursementEventData,
            HealthResponse,
            HealthStatus,
            ErrorResponse,
            ErrorDetail,
            crate::domain::RateLimitResponse,
            crate::api::admin::ListFailedDisbursementsResponse,
            crate::api::admin::AdminActionResponse,
        )
    ),
    tags(
        (name = "disbursements", description = "Disbursement and withdrawal endpoints"),
        (name = "webhooks", description = "Inbound gateway callbacks"),
        (name = "health", description = "Health check endpoints"),
        (name = "admin", description = "Operator endpoints")
    )
)]
pub struct ApiDoc;

/// Reject the request unless `header` carries a valid HMAC-SHA512 of `body`.
///
/// An unset secret rejects everything.
fn verify_signature(
    secret: Option<&SecretString>,
    headers: &HeaderMap,
    header: &str,
    body: &[u8],
) -> Result<(), AppError> {
    let secret = secret.ok_or_else(|| {
        AppError::Authentication("Webhook secret not configured".to_string())
    })?;
    let provided = headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Authentication(format!("Missing {} header", header)))?;

    if !signature::verify(secret.expose_secret().as_bytes(), body, provided) {
        warn!(header = header, "Webhook signature mismatch");
        return Err(AppError::Authentication("Invalid webhook signature".to_string()));
    }
    Ok(())
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(ValidationError::Multiple(e.to_string())))
}

/// Get a single disbursement by ID
#[utoipa::path(
    get,
    path = "/disbursements/{id}",
    tag = "disbursements",
    params(
        ("id" = String, Path, description = "Disbursement ID")
    ),
    responses(
        (status = 200, description = "Disbursement found", body = Disbursement),
        (status = 404, description = "Disbursement not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_disbursement_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Disbursement>, AppError> {
    let disbursement = state
        .service
        .disbursements
        .get_disbursement(&id)
        .await?
        .ok_or(AppError::Database(DatabaseError::NotFound(id)))?;
    Ok(Json(disbursement))
}

/// Withdraw from a wallet to the owner's bank account
///
/// Debits `amount` plus the business's disbursement charge from the wallet
/// and initiates a bank transfer. The returned row reconciles in the background.
#[utoipa::path(
    post,
    path = "/wallets/{account_id}/withdrawals",
    tag = "disbursements",
    params(
        ("account_id" = String, Path, description = "Wallet owner account ID")
    ),
    request_body = WithdrawalRequest,
    responses(
        (status = 201, description = "Withdrawal initiated", body = Disbursement),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 402, description = "Insufficient funds", body = ErrorResponse),
        (status = 502, description = "Gateway error", body = ErrorResponse)
    )
)]
pub async fn withdraw_handler(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
    Json(payload): Json<WithdrawalRequest>,
) -> Result<(StatusCode, Json<Disbursement>), AppError> {
    let disbursement = state
        .service
        .disbursements
        .withdraw(&account_id, &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(disbursement)))
}

/// Register an inbound bank transfer awaiting confirmation
#[utoipa::path(
    post,
    path = "/bank-transfers",
    tag = "disbursements",
    request_body = RegisterBankTransferRequest,
    responses(
        (status = 201, description = "Bank transfer registered", body = BankTransfer),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 409, description = "Reference already registered", body = ErrorResponse)
    )
)]
pub async fn register_bank_transfer_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterBankTransferRequest>,
) -> Result<(StatusCode, Json<BankTransfer>), AppError> {
    let transfer = state
        .service
        .disbursements
        .register_bank_transfer(&payload)
        .await?;
    Ok((StatusCode::CREATED, Json(transfer)))
}

/// Receive a transfer status webhook from a payment gateway
///
/// The body must be signed with HMAC-SHA512 (hex) in `x-webhook-signature`.
/// A verified callback is logged and the referenced disbursement is
/// reconciled in the background.
#[utoipa::path(
    post,
    path = "/webhooks/gateway/{gateway}",
    tag = "webhooks",
    params(
        ("gateway" = String, Path, description = "Gateway that sent the callback")
    ),
    request_body = GatewayWebhookPayload,
    responses(
        (status = 200, description = "Callback accepted"),
        (status = 400, description = "Malformed body", body = ErrorResponse),
        (status = 401, description = "Signature missing or invalid", body = ErrorResponse)
    )
)]
pub async fn gateway_webhook_handler(
    State(state): State<Arc<AppState>>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    verify_signature(
        state.gateway_webhook_secret.as_ref(),
        &headers,
        GATEWAY_SIGNATURE_HEADER,
        &body,
    )?;
    let payload: GatewayWebhookPayload = parse_body(&body)?;
    let reference = payload.data.reference;

    let disbursements = Arc::clone(&state.service.disbursements);
    disbursements
        .record_gateway_webhook(&gateway, Some(&reference), &String::from_utf8_lossy(&body))
        .await?;

    info!(gateway = %gateway, reference = %reference, "Gateway webhook accepted");
    tokio::spawn(async move {
        match disbursements.reconcile_reference(&reference).await {
            Ok(Some(outcome)) => info!(reference = %reference, outcome = ?outcome, "Webhook reconciled"),
            Ok(None) => warn!(reference = %reference, "Webhook references unknown disbursement"),
            Err(e) => error!(reference = %reference, error = ?e, "Webhook reconciliation failed"),
        }
    });

    Ok(StatusCode::OK)
}

/// Receive a Monnify disbursement callback
///
/// `FAILED_DISBURSEMENT` returns the amount to the business wallet once;
/// `SUCCESSFUL_DISBURSEMENT` completes the disbursement.
#[utoipa::path(
    post,
    path = "/webhooks/monnify/disbursement",
    tag = "webhooks",
    request_body = MonnifyDisbursementCallback,
    responses(
        (status = 200, description = "Callback processed"),
        (status = 400, description = "Malformed body", body = ErrorResponse),
        (status = 401, description = "Signature missing or invalid", body = ErrorResponse),
        (status = 404, description = "Unknown disbursement reference", body = ErrorResponse)
    )
)]
pub async fn monnify_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    verify_signature(
        state.monnify_webhook_secret.as_ref(),
        &headers,
        MONNIFY_SIGNATURE_HEADER,
        &body,
    )?;
    let callback: MonnifyDisbursementCallback = parse_body(&body)?;

    let disbursements = &state.service.disbursements;
    disbursements
        .record_gateway_webhook(
            "monnify",
            Some(&callback.event_data.reference),
            &String::from_utf8_lossy(&body),
        )
        .await?;

    let outcome = disbursements.handle_monnify_callback(&callback).await?;
    if outcome == ReconcileOutcome::Superseded {
        info!(reference = %callback.event_data.reference, "Monnify callback already applied");
    }
    Ok(StatusCode::OK)
}

/// Detailed health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Health status", body = HealthResponse)
    )
)]
pub async fn health_check_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.service.health_check().await;
    Json(health)
}

/// Kubernetes liveness probe
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Application is alive")
    )
)]
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness probe
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Application is ready to serve traffic"),
        (status = 503, description = "Application is not ready")
    )
)]
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.service.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_type) = match &self {
            AppError::Database(db_err) => match db_err {
                DatabaseError::Connection(_) => (StatusCode::SERVICE_UNAVAILABLE, "database_error"),
                DatabaseError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                DatabaseError::Duplicate(_) => (StatusCode::CONFLICT, "duplicate"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            },
            AppError::Gateway(gw_err) => match gw_err {
                GatewayError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
                GatewayError::NotConfigured(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "gateway_not_configured")
                }
                _ => (StatusCode::BAD_GATEWAY, "gateway_error"),
            },
            AppError::ExternalService(ext_err) => match ext_err {
                ExternalServiceError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
                ExternalServiceError::ApiError {
                    status_code: 404, ..
                } => (StatusCode::NOT_FOUND, "not_found"),
                _ => (StatusCode::BAD_GATEWAY, "external_service_error"),
            },
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, "authentication_error"),
            AppError::InsufficientFunds { .. } => {
                (StatusCode::PAYMENT_REQUIRED, "insufficient_funds")
            }
            AppError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "serialization_error")
            }
            AppError::NotSupported(_) => (StatusCode::NOT_IMPLEMENTED, "not_supported"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        let message = self.to_string();

        if status.is_server_error() {
            error!(error_type = %error_type, message = %message, "Server error");
        }

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                r#type: error_type.to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}
