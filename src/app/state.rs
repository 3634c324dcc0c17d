//! Application state management.

use secrecy::SecretString;
use std::sync::Arc;

use super::service::AppService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AppService>,
    /// HMAC key for `x-webhook-signature`; unset rejects every gateway webhook
    pub gateway_webhook_secret: Option<SecretString>,
    /// HMAC key for `monnify-signature`; unset rejects every Monnify callback
    pub monnify_webhook_secret: Option<SecretString>,
}

impl AppState {
    #[must_use]
    pub fn new(service: Arc<AppService>) -> Self {
        Self {
            service,
            gateway_webhook_secret: None,
            monnify_webhook_secret: None,
        }
    }

    /// Create a new application state with webhook secrets
    #[must_use]
    pub fn with_webhook_secrets(
        service: Arc<AppService>,
        gateway_webhook_secret: Option<SecretString>,
        monnify_webhook_secret: Option<SecretString>,
    ) -> Self {
        Self {
            service,
            gateway_webhook_secret,
            monnify_webhook_secret,
        }
    }
}
