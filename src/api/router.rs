//! HTTP router assembly.

use std::env;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use governor::{
    DefaultDirectRateLimiter, Quota, RateLimiter,
    clock::{Clock, DefaultClock},
};
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::app::AppState;
use crate::domain::{ErrorDetail, RateLimitResponse};

use super::admin::{clear_failed_disbursement_handler, list_failed_disbursements_handler};
use super::handlers::{
    ApiDoc, gateway_webhook_handler, get_disbursement_handler, health_check_handler,
    liveness_handler, monnify_webhook_handler, readiness_handler, register_bank_transfer_handler,
    withdraw_handler,
};

/// Global request quota; health probes are exempt
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 20,
            burst_size: 50,
        }
    }
}

impl RateLimitConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            requests_per_second: env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.requests_per_second),
            burst_size: env::var("RATE_LIMIT_BURST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.burst_size),
        }
    }

    fn limiter(&self) -> DefaultDirectRateLimiter {
        let rps = NonZeroU32::new(self.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(self.burst_size).unwrap_or(rps);
        RateLimiter::direct(Quota::per_second(rps).allow_burst(burst))
    }
}

/// Limits applied to every request
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub request_timeout: Duration,
    pub body_limit_bytes: usize,
    /// `None` disables rate limiting
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            body_limit_bytes: 1024 * 1024,
            rate_limit: None,
        }
    }
}

impl RouterConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let enable_rate_limiting = env::var("ENABLE_RATE_LIMITING")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        Self {
            request_timeout: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            body_limit_bytes: env::var("BODY_LIMIT_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.body_limit_bytes),
            rate_limit: enable_rate_limiting.then(RateLimitConfig::from_env),
        }
    }
}

/// Create the router with default limits
pub fn create_router(state: Arc<AppState>) -> Router {
    create_router_with_config(state, RouterConfig::default())
}

/// Create the router with rate limiting enabled
pub fn create_router_with_rate_limit(state: Arc<AppState>, config: RateLimitConfig) -> Router {
    create_router_with_config(
        state,
        RouterConfig {
            rate_limit: Some(config),
            ..RouterConfig::default()
        },
    )
}

pub fn create_router_with_config(state: Arc<AppState>, config: RouterConfig) -> Router {
    let mut api = Router::new()
        .route("/disbursements/{id}", get(get_disbursement_handler))
        .route("/wallets/{account_id}/withdrawals", post(withdraw_handler))
        .route("/bank-transfers", post(register_bank_transfer_handler))
        .route("/webhooks/gateway/{gateway}", post(gateway_webhook_handler))
        .route("/webhooks/monnify/disbursement", post(monnify_webhook_handler))
        .route(
            "/admin/failed-disbursements",
            get(list_failed_disbursements_handler),
        )
        .route(
            "/admin/failed-disbursements/{payment_id}",
            delete(clear_failed_disbursement_handler),
        );

    if let Some(rate_limit) = &config.rate_limit {
        let limiter = Arc::new(rate_limit.limiter());
        api = api.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
    }

    let health = Router::new()
        .route("/health", get(health_check_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler));

    api.merge(health)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(RequestBodyLimitLayer::new(config.body_limit_bytes))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn rate_limit_middleware(
    State(limiter): State<Arc<DefaultDirectRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check() {
        Ok(()) => next.run(request).await,
        Err(not_until) => {
            let retry_after = not_until
                .wait_time_from(DefaultClock::default().now())
                .as_secs()
                .max(1);
            warn!(retry_after_secs = retry_after, "Rate limit exceeded");
            let body = RateLimitResponse {
                error: ErrorDetail {
                    r#type: "rate_limited".to_string(),
                    message: "Rate limit exceeded".to_string(),
                },
                retry_after,
            };
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(body),
            )
                .into_response()
        }
    }
}
