//! Identity service client: recipient KYC and business profiles.

use async_trait::async_trait;
use tracing::instrument;

use crate::domain::{AppError, BusinessProfile, IdentityClient, Recipient};

use super::{ServiceClientConfig, ServiceHttp};

pub struct HttpIdentityClient {
    http: ServiceHttp,
}

impl HttpIdentityClient {
    pub fn new(config: ServiceClientConfig) -> Result<Self, AppError> {
        Ok(Self {
            http: ServiceHttp::new(config, "identity")?,
        })
    }
}

#[async_trait]
impl IdentityClient for HttpIdentityClient {
    #[instrument(skip(self))]
    async fn get_recipient(&self, account_id: &str) -> Result<Recipient, AppError> {
        self.http
            .send_json(self.http.get(&format!("/accounts/{}", account_id)))
            .await
    }

    #[instrument(skip(self))]
    async fn get_business(&self, business_id: &str) -> Result<BusinessProfile, AppError> {
        self.http
            .send_json(self.http.get(&format!("/businesses/{}", business_id)))
            .await
    }
}
