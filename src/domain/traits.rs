//! Domain traits defining contracts for external systems.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::error::AppError;
use super::types::{
    Alert, BankTransfer, BankTransferStatus, BusinessProfile, DeliveryResponse, Disbursement,
    DisbursementRequestLog, DisbursementStatus, FailedDisbursement, Gateway, GatewayWebhookLog,
    LedgerEntry, NewDisbursement, NewWebhook, OpenCursor, PayableTransaction, Recipient,
    RegisterBankTransferRequest, TransactionStatus, TransferInstruction, TransferReceipt,
    TransferStatus, WalletBalance, Webhook, WebhookAttempt,
};

/// Database client trait for persistence operations.
///
/// Every mutation is scoped to a single row. Status changes are
/// compare-and-set so concurrent callers cannot both win a transition.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Check database connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    // -- disbursements ------------------------------------------------------

    /// Insert a disbursement. Fails with `DatabaseError::Duplicate` when a row
    /// already exists for the same payment id or reference.
    async fn insert_disbursement(&self, data: &NewDisbursement) -> Result<Disbursement, AppError>;

    async fn get_disbursement(&self, id: &str) -> Result<Option<Disbursement>, AppError>;

    async fn get_disbursement_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Disbursement>, AppError>;

    async fn get_disbursement_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<Disbursement>, AppError>;

    /// Rows in `new` or `pending` ordered by `(created_at, id)`, starting
    /// strictly after `after` when given
    async fn list_open_disbursements(
        &self,
        after: Option<&OpenCursor>,
        limit: i64,
    ) -> Result<Vec<Disbursement>, AppError>;

    /// Move a row to `to` only if its current status is one of `from`.
    /// Returns `false` when another caller already moved it.
    async fn transition_disbursement(
        &self,
        id: &str,
        from: &[DisbursementStatus],
        to: DisbursementStatus,
        released_at: Option<DateTime<Utc>>,
        error: Option<&str>,
    ) -> Result<bool, AppError>;

    /// Persist retry gate bookkeeping
    async fn record_disbursement_retry(
        &self,
        id: &str,
        tries: i32,
        try_again_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Increment the poll counter; returns the new value
    async fn increment_disbursement_tries(&self, id: &str) -> Result<i32, AppError>;

    async fn insert_request_log(&self, log: &DisbursementRequestLog) -> Result<(), AppError>;

    async fn list_request_logs(
        &self,
        disbursement_id: &str,
    ) -> Result<Vec<DisbursementRequestLog>, AppError>;

    // -- failed disbursements -------------------------------------------------

    async fn get_failed_disbursement(
        &self,
        payment_id: &str,
    ) -> Result<Option<FailedDisbursement>, AppError>;

    /// Insert unless a row already exists; returns `true` when inserted
    async fn insert_failed_disbursement(&self, row: &FailedDisbursement) -> Result<bool, AppError>;

    async fn list_failed_disbursements(&self) -> Result<Vec<FailedDisbursement>, AppError>;

    /// Returns `true` when a row was removed
    async fn delete_failed_disbursement(&self, payment_id: &str) -> Result<bool, AppError>;

    // -- wallet ledger --------------------------------------------------------

    async fn get_wallet_balance(
        &self,
        account_id: &str,
        bucket: &str,
    ) -> Result<Option<WalletBalance>, AppError>;

    /// Create the (account, bucket) row at zero if missing
    async fn ensure_wallet_balance(
        &self,
        account_id: &str,
        bucket: &str,
    ) -> Result<WalletBalance, AppError>;

    /// Atomically add `amount`, creating the row if missing
    async fn credit_wallet_balance(
        &self,
        account_id: &str,
        bucket: &str,
        amount: Decimal,
    ) -> Result<WalletBalance, AppError>;

    /// Atomically subtract `amount` only when `available >= amount`.
    /// Returns `None` without mutating anything when funds are insufficient.
    async fn debit_wallet_balance(
        &self,
        account_id: &str,
        bucket: &str,
        amount: Decimal,
    ) -> Result<Option<WalletBalance>, AppError>;

    async fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), AppError>;

    // -- merchant webhooks ----------------------------------------------------

    async fn insert_webhook(&self, data: &NewWebhook) -> Result<Webhook, AppError>;

    async fn get_webhook(&self, id: &str) -> Result<Option<Webhook>, AppError>;

    /// Undelivered, unabandoned rows whose `retry_at` is unset or not after `now`
    async fn list_due_webhooks(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Webhook>, AppError>;

    async fn record_webhook_attempt(
        &self,
        id: &str,
        attempt: &WebhookAttempt,
    ) -> Result<(), AppError>;

    // -- inbound gateway traffic ---------------------------------------------

    async fn insert_gateway_webhook_log(&self, log: &GatewayWebhookLog) -> Result<(), AppError>;

    async fn insert_bank_transfer(
        &self,
        data: &RegisterBankTransferRequest,
    ) -> Result<BankTransfer, AppError>;

    async fn list_pending_bank_transfers(&self, limit: i64)
    -> Result<Vec<BankTransfer>, AppError>;

    /// Compare-and-set from `pending`; returns `false` if already moved
    async fn transition_bank_transfer(
        &self,
        id: &str,
        to: BankTransferStatus,
    ) -> Result<bool, AppError>;

    async fn increment_bank_transfer_tries(&self, id: &str) -> Result<i32, AppError>;
}

/// Payment gateway capable of initiating transfers and reporting their status
#[async_trait]
pub trait GatewayClient: Send + Sync {
    fn gateway(&self) -> Gateway;

    async fn initiate_transfer(
        &self,
        instruction: &TransferInstruction,
    ) -> Result<TransferReceipt, AppError>;

    async fn query_status(&self, reference: &str) -> Result<TransferStatus, AppError>;

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Identity, KYC and business profile data
#[async_trait]
pub trait IdentityClient: Send + Sync {
    async fn get_recipient(&self, account_id: &str) -> Result<Recipient, AppError>;

    async fn get_business(&self, business_id: &str) -> Result<BusinessProfile, AppError>;
}

/// Escrow transaction bookkeeping owned by the transaction service
#[async_trait]
pub trait TransactionClient: Send + Sync {
    /// Paid transactions whose milestone is due for payout
    async fn list_payable_transactions(
        &self,
        limit: i64,
    ) -> Result<Vec<PayableTransaction>, AppError>;

    /// Forward a delta to the transaction's amount-paid field
    async fn add_amount_paid(&self, transaction_id: &str, delta: Decimal) -> Result<(), AppError>;

    async fn update_status(
        &self,
        transaction_id: &str,
        status: TransactionStatus,
    ) -> Result<(), AppError>;

    async fn close_milestone(
        &self,
        transaction_id: &str,
        milestone_id: Option<&str>,
    ) -> Result<(), AppError>;

    async fn log_activity(&self, transaction_id: &str, message: &str) -> Result<(), AppError> {
        let _ = (transaction_id, message);
        Ok(())
    }
}

/// Fire-and-forget operator alerts.
///
/// Implementations swallow delivery failures; an alert must never fail the
/// operation that raised it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: Alert);
}

/// Transport used to POST merchant webhooks
#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// Any HTTP response is `Ok`; only transport failures are `Err`
    async fn send(&self, uri: &str, payload: &str) -> Result<DeliveryResponse, AppError>;
}
