//! Transaction service client for escrow bookkeeping.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::domain::{AppError, PayableTransaction, TransactionClient, TransactionStatus};

use super::{ServiceClientConfig, ServiceHttp};

#[derive(Debug, Deserialize)]
struct PayableList {
    #[serde(default)]
    data: Vec<PayableTransaction>,
}

pub struct HttpTransactionClient {
    http: ServiceHttp,
}

impl HttpTransactionClient {
    pub fn new(config: ServiceClientConfig) -> Result<Self, AppError> {
        Ok(Self {
            http: ServiceHttp::new(config, "transactions")?,
        })
    }
}

#[async_trait]
impl TransactionClient for HttpTransactionClient {
    #[instrument(skip(self))]
    async fn list_payable_transactions(
        &self,
        limit: i64,
    ) -> Result<Vec<PayableTransaction>, AppError> {
        let list: PayableList = self
            .http
            .send_json(
                self.http
                    .get("/transactions/payable")
                    .query(&[("limit", limit)]),
            )
            .await?;
        Ok(list.data)
    }

    #[instrument(skip(self))]
    async fn add_amount_paid(&self, transaction_id: &str, delta: Decimal) -> Result<(), AppError> {
        self.http
            .send(
                self.http
                    .post(&format!("/transactions/{}/amount-paid", transaction_id))
                    .json(&json!({ "delta": delta })),
            )
            .await
            .map(|_| ())
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        transaction_id: &str,
        status: TransactionStatus,
    ) -> Result<(), AppError> {
        self.http
            .send(
                self.http
                    .put(&format!("/transactions/{}/status", transaction_id))
                    .json(&json!({ "status": status.as_str() })),
            )
            .await
            .map(|_| ())
    }

    #[instrument(skip(self))]
    async fn close_milestone(
        &self,
        transaction_id: &str,
        milestone_id: Option<&str>,
    ) -> Result<(), AppError> {
        self.http
            .send(
                self.http
                    .post(&format!("/transactions/{}/milestones/close", transaction_id))
                    .json(&json!({ "milestone_id": milestone_id })),
            )
            .await
            .map(|_| ())
    }

    #[instrument(skip(self, message))]
    async fn log_activity(&self, transaction_id: &str, message: &str) -> Result<(), AppError> {
        self.http
            .send(
                self.http
                    .post(&format!("/transactions/{}/activity", transaction_id))
                    .json(&json!({ "message": message })),
            )
            .await
            .map(|_| ())
    }
}
