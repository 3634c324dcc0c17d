//! Rave (Flutterwave) transfer gateway.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::env;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

use crate::domain::{
    AppError, Destination, Gateway, GatewayClient, GatewayError, TransferInstruction,
    TransferReceipt, TransferState, TransferStatus,
};

use super::{DEFAULT_GATEWAY_TIMEOUT, build_http_client};

pub const DEFAULT_RAVE_BASE_URL: &str = "https://api.flutterwave.com";

#[derive(Debug, Clone)]
pub struct RaveConfig {
    pub base_url: String,
    pub secret_key: SecretString,
    /// Where Rave posts transfer callbacks
    pub callback_url: Option<String>,
    pub timeout: Duration,
}

impl RaveConfig {
    #[must_use]
    pub fn new(secret_key: SecretString) -> Self {
        Self {
            base_url: DEFAULT_RAVE_BASE_URL.to_string(),
            secret_key,
            callback_url: None,
            timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// `None` when `RAVE_SECRET_KEY` is unset
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let secret_key = env::var("RAVE_SECRET_KEY").ok().filter(|v| !v.is_empty())?;
        let timeout = env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_GATEWAY_TIMEOUT);
        Some(Self {
            base_url: env::var("RAVE_BASE_URL").unwrap_or_else(|_| DEFAULT_RAVE_BASE_URL.to_string()),
            secret_key: SecretString::from(secret_key),
            callback_url: env::var("RAVE_CALLBACK_URL").ok(),
            timeout,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RaveEnvelope<T> {
    status: String,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RaveTransfer {
    id: Option<i64>,
    reference: Option<String>,
    #[serde(default)]
    status: String,
    fee: Option<Decimal>,
    amount: Option<Decimal>,
}

/// Normalise a Rave transfer status string
#[must_use]
pub fn map_rave_status(raw: &str) -> TransferState {
    match raw.trim().to_ascii_uppercase().as_str() {
        "NEW" => TransferState::New,
        "PENDING" => TransferState::Pending,
        "ONGOING" | "PROCESSING" => TransferState::Ongoing,
        "SUCCESSFUL" | "SUCCESS" => TransferState::Completed,
        "FAILED" => TransferState::Failed,
        "CANCELLED" => TransferState::Cancelled,
        _ => TransferState::Unknown,
    }
}

pub struct RaveGateway {
    http_client: Client,
    config: RaveConfig,
}

impl RaveGateway {
    pub fn new(config: RaveConfig) -> Result<Self, AppError> {
        let http_client = build_http_client(config.timeout)?;
        info!(base_url = %config.base_url, "Rave gateway configured");
        Ok(Self {
            http_client,
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn transfer_body(&self, instruction: &TransferInstruction) -> Result<JsonValue, AppError> {
        let (account_bank, account_number, beneficiary_name) = match &instruction.destination {
            Destination::Bank {
                bank_code,
                account_number,
                account_name,
            } => (bank_code, account_number, account_name),
            Destination::MobileMoney {
                operator,
                phone_number,
            } => (operator, phone_number, phone_number),
            Destination::Wallet { .. } => {
                return Err(AppError::NotSupported(
                    "Rave cannot settle to a local wallet".to_string(),
                ));
            }
        };

        let mut body = json!({
            "account_bank": account_bank,
            "account_number": account_number,
            "beneficiary_name": beneficiary_name,
            "amount": instruction.amount.to_f64(),
            "currency": instruction.currency,
            "debit_currency": instruction.debit_currency,
            "narration": instruction.narration,
            "reference": instruction.reference,
        });
        if let Some(callback_url) = &self.config.callback_url {
            body["callback_url"] = json!(callback_url);
        }
        Ok(body)
    }

    async fn read_envelope<T: for<'de> Deserialize<'de>>(
        response: Response,
    ) -> Result<(RaveEnvelope<T>, JsonValue), AppError> {
        let status = response.status();
        let body = response.text().await.map_err(GatewayError::from)?;

        if status == StatusCode::NOT_FOUND {
            return Err(AppError::Gateway(GatewayError::TransferNotFound(body)));
        }
        if !status.is_success() {
            error!(status = %status, body = %body, "Rave returned error");
            return Err(AppError::Gateway(GatewayError::Rejected {
                status_code: status.as_u16(),
                message: body,
            }));
        }

        let raw: JsonValue = serde_json::from_str(&body)
            .map_err(|e| AppError::Gateway(GatewayError::InvalidResponse(e.to_string())))?;
        let envelope: RaveEnvelope<T> = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::Gateway(GatewayError::InvalidResponse(e.to_string())))?;
        Ok((envelope, raw))
    }
}

#[async_trait]
impl GatewayClient for RaveGateway {
    fn gateway(&self) -> Gateway {
        Gateway::Rave
    }

    #[instrument(skip(self, instruction), fields(reference = %instruction.reference))]
    async fn initiate_transfer(
        &self,
        instruction: &TransferInstruction,
    ) -> Result<TransferReceipt, AppError> {
        let body = self.transfer_body(instruction)?;
        let response = self
            .http_client
            .post(self.url("/v3/transfers"))
            .bearer_auth(self.config.secret_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(GatewayError::from)?;

        let (envelope, raw) = Self::read_envelope::<RaveTransfer>(response).await?;
        if !envelope.status.eq_ignore_ascii_case("success") {
            return Err(AppError::Gateway(GatewayError::Rejected {
                status_code: 200,
                message: envelope.message,
            }));
        }
        let data = envelope.data.ok_or_else(|| {
            AppError::Gateway(GatewayError::InvalidResponse(
                "transfer response has no data".to_string(),
            ))
        })?;

        debug!(gateway_id = ?data.id, status = %data.status, "Rave transfer queued");
        Ok(TransferReceipt {
            reference: data
                .reference
                .unwrap_or_else(|| instruction.reference.clone()),
            gateway_reference: data.id.map(|id| id.to_string()),
            fee: data.fee,
            request: body,
            response: raw,
        })
    }

    #[instrument(skip(self))]
    async fn query_status(&self, reference: &str) -> Result<TransferStatus, AppError> {
        let response = self
            .http_client
            .get(self.url("/v3/transfers"))
            .bearer_auth(self.config.secret_key.expose_secret())
            .query(&[("reference", reference)])
            .send()
            .await
            .map_err(GatewayError::from)?;

        let (envelope, _) = Self::read_envelope::<Vec<RaveTransfer>>(response).await?;
        let transfer = envelope
            .data
            .unwrap_or_default()
            .into_iter()
            .find(|t| t.reference.as_deref().is_none_or(|r| r == reference))
            .ok_or_else(|| AppError::Gateway(GatewayError::TransferNotFound(reference.to_string())))?;

        let status = TransferStatus::new(map_rave_status(&transfer.status), transfer.status);
        Ok(match transfer.amount {
            Some(amount) => status.with_amount(amount),
            None => status,
        })
    }

    async fn health_check(&self) -> Result<(), AppError> {
        let response = self
            .http_client
            .get(self.url("/v3/balances"))
            .bearer_auth(self.config.secret_key.expose_secret())
            .send()
            .await
            .map_err(GatewayError::from)?;
        if response.status().is_server_error() {
            return Err(AppError::Gateway(GatewayError::Connection(format!(
                "Rave health check returned {}",
                response.status()
            ))));
        }
        Ok(())
    }
}
