//! Monnify single-disbursement gateway.
//!
//! Monnify issues short-lived bearer tokens from a basic-auth login; the
//! token is cached until shortly before it expires.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::env;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument};

use crate::domain::{
    AppError, Destination, Gateway, GatewayClient, GatewayError, TransferInstruction,
    TransferReceipt, TransferState, TransferStatus,
};

use super::{DEFAULT_GATEWAY_TIMEOUT, build_http_client};

pub const DEFAULT_MONNIFY_BASE_URL: &str = "https://api.monnify.com";

/// Refresh the token this long before Monnify says it expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct MonnifyConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub secret_key: SecretString,
    pub contract_code: String,
    /// Wallet account debited for disbursements
    pub source_account: String,
    pub timeout: Duration,
}

impl MonnifyConfig {
    /// `None` unless both `MONNIFY_API_KEY` and `MONNIFY_SECRET_KEY` are set
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("MONNIFY_API_KEY").ok().filter(|v| !v.is_empty())?;
        let secret_key = env::var("MONNIFY_SECRET_KEY").ok().filter(|v| !v.is_empty())?;
        let timeout = env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_GATEWAY_TIMEOUT);
        Some(Self {
            base_url: env::var("MONNIFY_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_MONNIFY_BASE_URL.to_string()),
            api_key: SecretString::from(api_key),
            secret_key: SecretString::from(secret_key),
            contract_code: env::var("MONNIFY_CONTRACT_CODE").unwrap_or_default(),
            source_account: env::var("MONNIFY_SOURCE_ACCOUNT").unwrap_or_default(),
            timeout,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonnifyEnvelope<T> {
    request_successful: bool,
    #[serde(default)]
    response_message: String,
    response_body: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginBody {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisbursementBody {
    reference: Option<String>,
    #[serde(default)]
    status: String,
    total_fee: Option<Decimal>,
    amount: Option<Decimal>,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Normalise a Monnify disbursement status string
#[must_use]
pub fn map_monnify_status(raw: &str) -> TransferState {
    match raw.trim().to_ascii_uppercase().as_str() {
        "SUCCESS" | "SUCCESSFUL" => TransferState::Completed,
        "FAILED" | "REVERSED" => TransferState::Failed,
        "PENDING" | "AWAITING_PROCESSING" | "PENDING_AUTHORIZATION" => TransferState::Pending,
        "IN_PROGRESS" => TransferState::Ongoing,
        "CANCELLED" | "EXPIRED" => TransferState::Cancelled,
        _ => TransferState::Unknown,
    }
}

pub struct MonnifyGateway {
    http_client: Client,
    config: MonnifyConfig,
    token: RwLock<Option<CachedToken>>,
}

impl MonnifyGateway {
    pub fn new(config: MonnifyConfig) -> Result<Self, AppError> {
        let http_client = build_http_client(config.timeout)?;
        info!(base_url = %config.base_url, "Monnify gateway configured");
        Ok(Self {
            http_client,
            config,
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn basic_credentials(&self) -> String {
        STANDARD.encode(format!(
            "{}:{}",
            self.config.api_key.expose_secret(),
            self.config.secret_key.expose_secret()
        ))
    }

    async fn access_token(&self) -> Result<String, AppError> {
        if let Some(cached) = self.token.read().await.as_ref()
            && cached.expires_at > Instant::now()
        {
            return Ok(cached.token.clone());
        }

        let mut guard = self.token.write().await;
        if let Some(cached) = guard.as_ref()
            && cached.expires_at > Instant::now()
        {
            return Ok(cached.token.clone());
        }

        let response = self
            .http_client
            .post(self.url("/api/v1/auth/login"))
            .header("Authorization", format!("Basic {}", self.basic_credentials()))
            .send()
            .await
            .map_err(GatewayError::from)?;
        let (envelope, _) = Self::read_envelope::<LoginBody>(response).await?;
        let body = envelope.response_body.ok_or_else(|| {
            AppError::Gateway(GatewayError::InvalidResponse(
                "login response has no body".to_string(),
            ))
        })?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        debug!(lifetime_secs = lifetime.as_secs(), "Monnify token refreshed");
        let token = body.access_token.clone();
        *guard = Some(CachedToken {
            token: body.access_token,
            expires_at: Instant::now() + lifetime,
        });
        Ok(token)
    }

    async fn read_envelope<T: for<'de> Deserialize<'de>>(
        response: Response,
    ) -> Result<(MonnifyEnvelope<T>, JsonValue), AppError> {
        let status = response.status();
        let body = response.text().await.map_err(GatewayError::from)?;

        if !status.is_success() {
            error!(status = %status, body = %body, "Monnify returned error");
            return Err(AppError::Gateway(GatewayError::Rejected {
                status_code: status.as_u16(),
                message: body,
            }));
        }

        let raw: JsonValue = serde_json::from_str(&body)
            .map_err(|e| AppError::Gateway(GatewayError::InvalidResponse(e.to_string())))?;
        let envelope: MonnifyEnvelope<T> = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::Gateway(GatewayError::InvalidResponse(e.to_string())))?;
        if !envelope.request_successful {
            return Err(AppError::Gateway(GatewayError::Rejected {
                status_code: status.as_u16(),
                message: envelope.response_message,
            }));
        }
        Ok((envelope, raw))
    }
}

#[async_trait]
impl GatewayClient for MonnifyGateway {
    fn gateway(&self) -> Gateway {
        Gateway::Monnify
    }

    #[instrument(skip(self, instruction), fields(reference = %instruction.reference))]
    async fn initiate_transfer(
        &self,
        instruction: &TransferInstruction,
    ) -> Result<TransferReceipt, AppError> {
        let Destination::Bank {
            bank_code,
            account_number,
            ..
        } = &instruction.destination
        else {
            return Err(AppError::NotSupported(
                "Monnify only disburses to bank accounts".to_string(),
            ));
        };

        let body = json!({
            "amount": instruction.amount.to_f64(),
            "reference": instruction.reference,
            "narration": instruction.narration,
            "destinationBankCode": bank_code,
            "destinationAccountNumber": account_number,
            "currency": instruction.currency,
            "sourceAccountNumber": self.config.source_account,
        });

        let token = self.access_token().await?;
        let response = self
            .http_client
            .post(self.url("/api/v2/disbursements/single"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(GatewayError::from)?;

        let (envelope, raw) = Self::read_envelope::<DisbursementBody>(response).await?;
        let data = envelope.response_body.ok_or_else(|| {
            AppError::Gateway(GatewayError::InvalidResponse(
                "disbursement response has no body".to_string(),
            ))
        })?;

        debug!(status = %data.status, "Monnify disbursement accepted");
        Ok(TransferReceipt {
            reference: data
                .reference
                .unwrap_or_else(|| instruction.reference.clone()),
            gateway_reference: None,
            fee: data.total_fee,
            request: body,
            response: raw,
        })
    }

    #[instrument(skip(self))]
    async fn query_status(&self, reference: &str) -> Result<TransferStatus, AppError> {
        let token = self.access_token().await?;
        let response = self
            .http_client
            .get(self.url("/api/v2/disbursements/single/summary"))
            .bearer_auth(token)
            .query(&[("reference", reference)])
            .send()
            .await
            .map_err(GatewayError::from)?;

        let (envelope, _) = Self::read_envelope::<DisbursementBody>(response).await?;
        let data = envelope
            .response_body
            .ok_or_else(|| AppError::Gateway(GatewayError::TransferNotFound(reference.to_string())))?;

        let status = TransferStatus::new(map_monnify_status(&data.status), data.status);
        Ok(match data.amount {
            Some(amount) => status.with_amount(amount),
            None => status,
        })
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.access_token().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_monnify_status() {
        assert_eq!(map_monnify_status("SUCCESS"), TransferState::Completed);
        assert_eq!(map_monnify_status("REVERSED"), TransferState::Failed);
        assert_eq!(
            map_monnify_status("PENDING_AUTHORIZATION"),
            TransferState::Pending
        );
        assert_eq!(map_monnify_status("IN_PROGRESS"), TransferState::Ongoing);
        assert_eq!(map_monnify_status("whatever"), TransferState::Unknown);
    }

    #[test]
    fn test_basic_credentials_encoding() {
        let gateway = MonnifyGateway::new(MonnifyConfig {
            base_url: DEFAULT_MONNIFY_BASE_URL.to_string(),
            api_key: SecretString::from("key"),
            secret_key: SecretString::from("secret"),
            contract_code: "123".to_string(),
            source_account: "999".to_string(),
            timeout: DEFAULT_GATEWAY_TIMEOUT,
        })
        .unwrap();
        assert_eq!(gateway.basic_credentials(), STANDARD.encode("key:secret"));
    }
}
