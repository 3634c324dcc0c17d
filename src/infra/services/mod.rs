//! HTTP clients for sibling platform services.

pub mod identity;
pub mod transactions;

use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::env;
use std::time::Duration;
use tracing::error;

use crate::domain::{AppError, ExternalServiceError};

pub use identity::HttpIdentityClient;
pub use transactions::HttpTransactionClient;

/// Header carrying the shared service-to-service key
pub const SERVICE_API_KEY_HEADER: &str = "x-api-key";

/// Connection settings shared by the sibling-service clients
#[derive(Debug, Clone)]
pub struct ServiceClientConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub timeout: Duration,
}

impl ServiceClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(15),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Read `{url_var}` plus the shared `SERVICE_API_KEY` and `HTTP_TIMEOUT_SECS`
    #[must_use]
    pub fn from_env(url_var: &str) -> Option<Self> {
        let base_url = env::var(url_var).ok().filter(|v| !v.is_empty())?;
        let mut config = Self::new(base_url);
        config.api_key = env::var("SERVICE_API_KEY").ok().map(SecretString::from);
        if let Some(timeout) = env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.timeout = Duration::from_secs(timeout);
        }
        Some(config)
    }
}

/// Thin JSON client with the service key applied to every request
#[derive(Debug, Clone)]
pub(crate) struct ServiceHttp {
    http_client: Client,
    config: ServiceClientConfig,
    service: &'static str,
}

impl ServiceHttp {
    pub(crate) fn new(config: ServiceClientConfig, service: &'static str) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::ExternalService(ExternalServiceError::Configuration(e.to_string())))?;
        Ok(Self {
            http_client,
            config,
            service,
        })
    }

    pub(crate) fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http_client.get(self.url(path)))
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http_client.post(self.url(path)))
    }

    pub(crate) fn put(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http_client.put(self.url(path)))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header(SERVICE_API_KEY_HEADER, key.expose_secret()),
            None => request,
        }
    }

    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response, AppError> {
        let response = request
            .send()
            .await
            .map_err(ExternalServiceError::from)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!(service = self.service, status = %status, body = %body, "Service returned error");
        if status.is_server_error() {
            return Err(AppError::ExternalService(ExternalServiceError::Unavailable(
                format!("{} returned {}", self.service, status),
            )));
        }
        Err(AppError::ExternalService(ExternalServiceError::ApiError {
            status_code: status.as_u16(),
            message: body,
        }))
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, AppError> {
        let response = self.send(request).await?;
        response.json::<T>().await.map_err(|e| {
            AppError::ExternalService(ExternalServiceError::ParseError(e.to_string()))
        })
    }
}
