//! Outbound merchant webhook transport.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::domain::{AppError, DeliveryResponse, ExternalServiceError, WebhookSender};

use super::signature;

/// Header carrying the payload signature on merchant webhooks
pub const MERCHANT_SIGNATURE_HEADER: &str = "x-escrow-signature";

/// Bodies longer than this are truncated before being stored
const MAX_STORED_BODY: usize = 2048;

pub struct HttpWebhookSender {
    http_client: Client,
    signing_secret: Option<SecretString>,
}

impl HttpWebhookSender {
    pub fn new(timeout: Duration, signing_secret: Option<SecretString>) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ExternalService(ExternalServiceError::Configuration(e.to_string())))?;
        Ok(Self {
            http_client,
            signing_secret,
        })
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    #[instrument(skip(self, payload))]
    async fn send(&self, uri: &str, payload: &str) -> Result<DeliveryResponse, AppError> {
        let mut request = self
            .http_client
            .post(uri)
            .header("Content-Type", "application/json")
            .body(payload.to_string());
        if let Some(secret) = &self.signing_secret {
            request = request.header(
                MERCHANT_SIGNATURE_HEADER,
                signature::sign(secret.expose_secret().as_bytes(), payload.as_bytes()),
            );
        }

        let response = request.send().await.map_err(ExternalServiceError::from)?;
        let status = response.status().as_u16();
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_STORED_BODY {
            let mut cut = MAX_STORED_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }

        debug!(status = status, "Merchant webhook delivered");
        Ok(DeliveryResponse { status, body })
    }
}
