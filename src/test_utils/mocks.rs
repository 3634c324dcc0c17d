//! Mock implementations for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::domain::{
    Alert, AppError, BankTransfer, BankTransferStatus, BusinessProfile, DatabaseClient,
    DatabaseError, DeliveryResponse, Disbursement, DisbursementRequestLog, DisbursementStatus,
    ExternalServiceError, FailedDisbursement, Gateway, GatewayClient, GatewayError,
    GatewayWebhookLog, IdentityClient, LedgerEntry, NewDisbursement, NewWebhook, Notifier,
    OpenCursor, PayableTransaction, Recipient, RegisterBankTransferRequest, TransactionClient,
    TransactionStatus, TransferInstruction, TransferReceipt, TransferState, TransferStatus,
    WalletBalance, Webhook, WebhookAttempt, WebhookSender, normalize_currency,
};

/// Configuration for mock behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub should_fail: bool,
    pub error_message: Option<String>,
}

impl MockConfig {
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
        }
    }

    fn message(&self) -> String {
        self.error_message
            .clone()
            .unwrap_or_else(|| "Mock error".to_string())
    }
}

#[derive(Default)]
struct Tables {
    disbursements: HashMap<String, Disbursement>,
    request_logs: Vec<DisbursementRequestLog>,
    failed: HashMap<String, FailedDisbursement>,
    balances: HashMap<(String, String), WalletBalance>,
    ledger: Vec<LedgerEntry>,
    webhooks: HashMap<String, Webhook>,
    gateway_logs: Vec<GatewayWebhookLog>,
    bank_transfers: HashMap<String, BankTransfer>,
}

/// Mock database client for testing
pub struct MockDatabaseClient {
    tables: Arc<Mutex<Tables>>,
    config: MockConfig,
    is_healthy: AtomicBool,
    fail_request_logs: AtomicBool,
}

impl MockDatabaseClient {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            config,
            is_healthy: AtomicBool::new(true),
            fail_request_logs: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Make `insert_request_log` fail while every other call succeeds
    pub fn set_fail_request_logs(&self, fail: bool) {
        self.fail_request_logs.store(fail, Ordering::Relaxed);
    }

    /// All disbursement rows (for testing)
    pub fn disbursements(&self) -> Vec<Disbursement> {
        self.tables
            .lock()
            .unwrap()
            .disbursements
            .values()
            .cloned()
            .collect()
    }

    /// Overwrite a stored disbursement (for arranging test state)
    pub fn put_disbursement(&self, disbursement: Disbursement) {
        self.tables
            .lock()
            .unwrap()
            .disbursements
            .insert(disbursement.id.clone(), disbursement);
    }

    pub fn request_logs(&self) -> Vec<DisbursementRequestLog> {
        self.tables.lock().unwrap().request_logs.clone()
    }

    pub fn ledger_entries(&self) -> Vec<LedgerEntry> {
        self.tables.lock().unwrap().ledger.clone()
    }

    pub fn webhooks(&self) -> Vec<Webhook> {
        self.tables
            .lock()
            .unwrap()
            .webhooks
            .values()
            .cloned()
            .collect()
    }

    pub fn gateway_logs(&self) -> Vec<GatewayWebhookLog> {
        self.tables.lock().unwrap().gateway_logs.clone()
    }

    pub fn bank_transfers(&self) -> Vec<BankTransfer> {
        self.tables
            .lock()
            .unwrap()
            .bank_transfers
            .values()
            .cloned()
            .collect()
    }

    /// Available balance, zero when the row does not exist
    pub fn balance(&self, account_id: &str, bucket: &str) -> Decimal {
        self.tables
            .lock()
            .unwrap()
            .balances
            .get(&(account_id.to_string(), bucket.to_string()))
            .map(|b| b.available)
            .unwrap_or(Decimal::ZERO)
    }

    /// Seed a balance row (for arranging test state)
    pub fn set_balance(&self, account_id: &str, bucket: &str, available: Decimal) {
        let now = Utc::now();
        self.tables.lock().unwrap().balances.insert(
            (account_id.to_string(), bucket.to_string()),
            WalletBalance {
                account_id: account_id.to_string(),
                currency: bucket.to_string(),
                available,
                created_at: now,
                updated_at: now,
            },
        );
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.config.should_fail {
            return Err(AppError::Database(DatabaseError::Query(
                self.config.message(),
            )));
        }
        Ok(())
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn health_check(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Connection(
                "Unhealthy".to_string(),
            )));
        }
        self.check_should_fail()
    }

    async fn insert_disbursement(&self, data: &NewDisbursement) -> Result<Disbursement, AppError> {
        self.check_should_fail()?;
        let mut tables = self.tables.lock().unwrap();
        let duplicate = tables.disbursements.values().any(|d| {
            d.reference == data.reference
                || (data.payment_id.is_some() && d.payment_id == data.payment_id)
        });
        if duplicate {
            return Err(AppError::Database(DatabaseError::Duplicate(format!(
                "disbursement for payment {:?}",
                data.payment_id
            ))));
        }
        let record = data
            .clone()
            .into_record(Uuid::now_v7().to_string(), Utc::now());
        tables
            .disbursements
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_disbursement(&self, id: &str) -> Result<Option<Disbursement>, AppError> {
        self.check_should_fail()?;
        Ok(self.tables.lock().unwrap().disbursements.get(id).cloned())
    }

    async fn get_disbursement_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Disbursement>, AppError> {
        self.check_should_fail()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .disbursements
            .values()
            .find(|d| d.reference == reference)
            .cloned())
    }

    async fn get_disbursement_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<Disbursement>, AppError> {
        self.check_should_fail()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .disbursements
            .values()
            .find(|d| d.payment_id.as_deref() == Some(payment_id))
            .cloned())
    }

    async fn list_open_disbursements(
        &self,
        after: Option<&OpenCursor>,
        limit: i64,
    ) -> Result<Vec<Disbursement>, AppError> {
        self.check_should_fail()?;
        let tables = self.tables.lock().unwrap();
        let position = |d: &Disbursement| (d.created_at, d.id.clone());
        let mut items: Vec<Disbursement> = tables
            .disbursements
            .values()
            .filter(|d| d.status.is_open())
            .filter(|d| after.is_none_or(|c| position(d) > (c.created_at, c.id.clone())))
            .cloned()
            .collect();
        items.sort_by_key(position);
        Ok(items.into_iter().take(limit as usize).collect())
    }

    async fn transition_disbursement(
        &self,
        id: &str,
        from: &[DisbursementStatus],
        to: DisbursementStatus,
        released_at: Option<DateTime<Utc>>,
        error: Option<&str>,
    ) -> Result<bool, AppError> {
        self.check_should_fail()?;
        let mut tables = self.tables.lock().unwrap();
        let Some(item) = tables.disbursements.get_mut(id) else {
            return Err(AppError::Database(DatabaseError::NotFound(id.to_string())));
        };
        if !from.contains(&item.status) {
            return Ok(false);
        }
        item.status = to;
        if released_at.is_some() {
            item.payment_released_at = released_at;
        }
        if let Some(err) = error {
            item.last_error = Some(err.to_string());
        }
        item.updated_at = Utc::now();
        Ok(true)
    }

    async fn record_disbursement_retry(
        &self,
        id: &str,
        tries: i32,
        try_again_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.check_should_fail()?;
        let mut tables = self.tables.lock().unwrap();
        if let Some(item) = tables.disbursements.get_mut(id) {
            item.tries = tries;
            item.try_again_at = Some(try_again_at);
            item.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn increment_disbursement_tries(&self, id: &str) -> Result<i32, AppError> {
        self.check_should_fail()?;
        let mut tables = self.tables.lock().unwrap();
        match tables.disbursements.get_mut(id) {
            Some(item) => {
                item.tries += 1;
                item.updated_at = Utc::now();
                Ok(item.tries)
            }
            None => Err(AppError::Database(DatabaseError::NotFound(id.to_string()))),
        }
    }

    async fn insert_request_log(&self, log: &DisbursementRequestLog) -> Result<(), AppError> {
        self.check_should_fail()?;
        if self.fail_request_logs.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Query(
                "request log insert failed".to_string(),
            )));
        }
        self.tables.lock().unwrap().request_logs.push(log.clone());
        Ok(())
    }

    async fn list_request_logs(
        &self,
        disbursement_id: &str,
    ) -> Result<Vec<DisbursementRequestLog>, AppError> {
        self.check_should_fail()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .request_logs
            .iter()
            .filter(|l| l.disbursement_id == disbursement_id)
            .cloned()
            .collect())
    }

    async fn get_failed_disbursement(
        &self,
        payment_id: &str,
    ) -> Result<Option<FailedDisbursement>, AppError> {
        self.check_should_fail()?;
        Ok(self.tables.lock().unwrap().failed.get(payment_id).cloned())
    }

    async fn insert_failed_disbursement(&self, row: &FailedDisbursement) -> Result<bool, AppError> {
        self.check_should_fail()?;
        let mut tables = self.tables.lock().unwrap();
        if tables.failed.contains_key(&row.payment_id) {
            return Ok(false);
        }
        tables.failed.insert(row.payment_id.clone(), row.clone());
        Ok(true)
    }

    async fn list_failed_disbursements(&self) -> Result<Vec<FailedDisbursement>, AppError> {
        self.check_should_fail()?;
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<FailedDisbursement> = tables.failed.values().cloned().collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn delete_failed_disbursement(&self, payment_id: &str) -> Result<bool, AppError> {
        self.check_should_fail()?;
        Ok(self.tables.lock().unwrap().failed.remove(payment_id).is_some())
    }

    async fn get_wallet_balance(
        &self,
        account_id: &str,
        bucket: &str,
    ) -> Result<Option<WalletBalance>, AppError> {
        self.check_should_fail()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .balances
            .get(&(account_id.to_string(), bucket.to_string()))
            .cloned())
    }

    async fn ensure_wallet_balance(
        &self,
        account_id: &str,
        bucket: &str,
    ) -> Result<WalletBalance, AppError> {
        self.check_should_fail()?;
        let mut tables = self.tables.lock().unwrap();
        let now = Utc::now();
        let row = tables
            .balances
            .entry((account_id.to_string(), bucket.to_string()))
            .or_insert_with(|| WalletBalance {
                account_id: account_id.to_string(),
                currency: bucket.to_string(),
                available: Decimal::ZERO,
                created_at: now,
                updated_at: now,
            });
        Ok(row.clone())
    }

    async fn credit_wallet_balance(
        &self,
        account_id: &str,
        bucket: &str,
        amount: Decimal,
    ) -> Result<WalletBalance, AppError> {
        self.check_should_fail()?;
        let mut tables = self.tables.lock().unwrap();
        let now = Utc::now();
        let row = tables
            .balances
            .entry((account_id.to_string(), bucket.to_string()))
            .or_insert_with(|| WalletBalance {
                account_id: account_id.to_string(),
                currency: bucket.to_string(),
                available: Decimal::ZERO,
                created_at: now,
                updated_at: now,
            });
        row.available += amount;
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn debit_wallet_balance(
        &self,
        account_id: &str,
        bucket: &str,
        amount: Decimal,
    ) -> Result<Option<WalletBalance>, AppError> {
        self.check_should_fail()?;
        let mut tables = self.tables.lock().unwrap();
        match tables
            .balances
            .get_mut(&(account_id.to_string(), bucket.to_string()))
        {
            Some(row) if row.available >= amount => {
                row.available -= amount;
                row.updated_at = Utc::now();
                Ok(Some(row.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), AppError> {
        self.check_should_fail()?;
        self.tables.lock().unwrap().ledger.push(entry.clone());
        Ok(())
    }

    async fn insert_webhook(&self, data: &NewWebhook) -> Result<Webhook, AppError> {
        self.check_should_fail()?;
        let now = Utc::now();
        let webhook = Webhook {
            id: Uuid::now_v7().to_string(),
            event: data.event.clone(),
            business_id: data.business_id.clone(),
            uri: data.uri.clone(),
            payload: serde_json::to_string(&data.payload)?,
            tries: 0,
            is_received: false,
            is_abandoned: false,
            retry_at: None,
            last_response_status: None,
            last_response_body: None,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .lock()
            .unwrap()
            .webhooks
            .insert(webhook.id.clone(), webhook.clone());
        Ok(webhook)
    }

    async fn get_webhook(&self, id: &str) -> Result<Option<Webhook>, AppError> {
        self.check_should_fail()?;
        Ok(self.tables.lock().unwrap().webhooks.get(id).cloned())
    }

    async fn list_due_webhooks(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Webhook>, AppError> {
        self.check_should_fail()?;
        let tables = self.tables.lock().unwrap();
        let mut items: Vec<Webhook> = tables
            .webhooks
            .values()
            .filter(|w| {
                !w.is_abandoned && !w.is_received && w.retry_at.is_none_or(|t| t <= now)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(items.into_iter().take(limit as usize).collect())
    }

    async fn record_webhook_attempt(
        &self,
        id: &str,
        attempt: &WebhookAttempt,
    ) -> Result<(), AppError> {
        self.check_should_fail()?;
        let mut tables = self.tables.lock().unwrap();
        let Some(item) = tables.webhooks.get_mut(id) else {
            return Err(AppError::Database(DatabaseError::NotFound(id.to_string())));
        };
        item.tries = attempt.tries;
        item.is_received = attempt.is_received;
        item.is_abandoned = attempt.is_abandoned;
        item.retry_at = Some(attempt.retry_at);
        item.last_response_status = attempt.response_status;
        item.last_response_body = attempt.response_body.clone();
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_gateway_webhook_log(&self, log: &GatewayWebhookLog) -> Result<(), AppError> {
        self.check_should_fail()?;
        self.tables.lock().unwrap().gateway_logs.push(log.clone());
        Ok(())
    }

    async fn insert_bank_transfer(
        &self,
        data: &RegisterBankTransferRequest,
    ) -> Result<BankTransfer, AppError> {
        self.check_should_fail()?;
        let mut tables = self.tables.lock().unwrap();
        if tables
            .bank_transfers
            .values()
            .any(|t| t.reference == data.reference)
        {
            return Err(AppError::Database(DatabaseError::Duplicate(
                data.reference.clone(),
            )));
        }
        let now = Utc::now();
        let transfer = BankTransfer {
            id: Uuid::now_v7().to_string(),
            reference: data.reference.clone(),
            account_id: data.account_id.clone(),
            transaction_id: data.transaction_id.clone(),
            amount: data.amount,
            currency: normalize_currency(&data.currency),
            gateway: data.gateway,
            status: BankTransferStatus::Pending,
            tries: 0,
            created_at: now,
            updated_at: now,
        };
        tables
            .bank_transfers
            .insert(transfer.id.clone(), transfer.clone());
        Ok(transfer)
    }

    async fn list_pending_bank_transfers(
        &self,
        limit: i64,
    ) -> Result<Vec<BankTransfer>, AppError> {
        self.check_should_fail()?;
        let tables = self.tables.lock().unwrap();
        let mut items: Vec<BankTransfer> = tables
            .bank_transfers
            .values()
            .filter(|t| t.status == BankTransferStatus::Pending)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(items.into_iter().take(limit as usize).collect())
    }

    async fn transition_bank_transfer(
        &self,
        id: &str,
        to: BankTransferStatus,
    ) -> Result<bool, AppError> {
        self.check_should_fail()?;
        let mut tables = self.tables.lock().unwrap();
        match tables.bank_transfers.get_mut(id) {
            Some(item) if item.status == BankTransferStatus::Pending => {
                item.status = to;
                item.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(AppError::Database(DatabaseError::NotFound(id.to_string()))),
        }
    }

    async fn increment_bank_transfer_tries(&self, id: &str) -> Result<i32, AppError> {
        self.check_should_fail()?;
        let mut tables = self.tables.lock().unwrap();
        match tables.bank_transfers.get_mut(id) {
            Some(item) => {
                item.tries += 1;
                Ok(item.tries)
            }
            None => Err(AppError::Database(DatabaseError::NotFound(id.to_string()))),
        }
    }
}

/// Mock gateway client for testing
pub struct MockGatewayClient {
    gateway: Gateway,
    statuses: Mutex<HashMap<String, TransferStatus>>,
    initiated: Mutex<Vec<TransferInstruction>>,
    queried: Mutex<Vec<String>>,
    config: MockConfig,
    query_fails: AtomicBool,
}

impl MockGatewayClient {
    #[must_use]
    pub fn new(gateway: Gateway) -> Self {
        Self::with_config(gateway, MockConfig::success())
    }

    #[must_use]
    pub fn with_config(gateway: Gateway, config: MockConfig) -> Self {
        Self {
            gateway,
            statuses: Mutex::new(HashMap::new()),
            initiated: Mutex::new(Vec::new()),
            queried: Mutex::new(Vec::new()),
            config,
            query_fails: AtomicBool::new(false),
        }
    }

    /// Gateway whose initiation calls fail
    #[must_use]
    pub fn failing(gateway: Gateway, message: impl Into<String>) -> Self {
        Self::with_config(gateway, MockConfig::failure(message))
    }

    /// Script the status reported for a reference
    pub fn set_status(&self, reference: &str, state: TransferState, raw: &str) {
        self.statuses
            .lock()
            .unwrap()
            .insert(reference.to_string(), TransferStatus::new(state, raw));
    }

    /// Make status queries fail with a connection error
    pub fn set_query_fails(&self, fails: bool) {
        self.query_fails.store(fails, Ordering::Relaxed);
    }

    pub fn initiated(&self) -> Vec<TransferInstruction> {
        self.initiated.lock().unwrap().clone()
    }

    pub fn queried(&self) -> Vec<String> {
        self.queried.lock().unwrap().clone()
    }
}

#[async_trait]
impl GatewayClient for MockGatewayClient {
    fn gateway(&self) -> Gateway {
        self.gateway
    }

    async fn initiate_transfer(
        &self,
        instruction: &TransferInstruction,
    ) -> Result<TransferReceipt, AppError> {
        self.initiated.lock().unwrap().push(instruction.clone());
        if self.config.should_fail {
            return Err(AppError::Gateway(GatewayError::Connection(
                self.config.message(),
            )));
        }
        Ok(TransferReceipt {
            reference: instruction.reference.clone(),
            gateway_reference: Some(format!("gw_{}", instruction.reference)),
            fee: None,
            request: serde_json::to_value(instruction)?,
            response: serde_json::json!({ "status": "success" }),
        })
    }

    async fn query_status(&self, reference: &str) -> Result<TransferStatus, AppError> {
        self.queried.lock().unwrap().push(reference.to_string());
        if self.query_fails.load(Ordering::Relaxed) {
            return Err(AppError::Gateway(GatewayError::Connection(
                "gateway unreachable".to_string(),
            )));
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .unwrap_or_else(|| TransferStatus::new(TransferState::Ongoing, "PENDING")))
    }
}

/// Mock identity client backed by in-memory profiles
#[derive(Default)]
pub struct MockIdentityClient {
    recipients: Mutex<HashMap<String, Recipient>>,
    businesses: Mutex<HashMap<String, BusinessProfile>>,
}

impl MockIdentityClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_recipient(&self, recipient: Recipient) {
        self.recipients
            .lock()
            .unwrap()
            .insert(recipient.account_id.clone(), recipient);
    }

    pub fn add_business(&self, business: BusinessProfile) {
        self.businesses
            .lock()
            .unwrap()
            .insert(business.business_id.clone(), business);
    }
}

#[async_trait]
impl IdentityClient for MockIdentityClient {
    async fn get_recipient(&self, account_id: &str) -> Result<Recipient, AppError> {
        self.recipients
            .lock()
            .unwrap()
            .get(account_id)
            .cloned()
            .ok_or_else(|| {
                AppError::ExternalService(ExternalServiceError::ApiError {
                    status_code: 404,
                    message: format!("account {} not found", account_id),
                })
            })
    }

    async fn get_business(&self, business_id: &str) -> Result<BusinessProfile, AppError> {
        self.businesses
            .lock()
            .unwrap()
            .get(business_id)
            .cloned()
            .ok_or_else(|| {
                AppError::ExternalService(ExternalServiceError::ApiError {
                    status_code: 404,
                    message: format!("business {} not found", business_id),
                })
            })
    }
}

/// Mock transaction service recording every call
#[derive(Default)]
pub struct MockTransactionClient {
    payable: Mutex<Vec<PayableTransaction>>,
    amount_paid: Mutex<Vec<(String, Decimal)>>,
    status_updates: Mutex<Vec<(String, TransactionStatus)>>,
    closed_milestones: Mutex<Vec<(String, Option<String>)>>,
    fail_amount_paid: AtomicBool,
}

impl MockTransactionClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_payable(&self, transaction: PayableTransaction) {
        self.payable.lock().unwrap().push(transaction);
    }

    pub fn set_amount_paid_fails(&self, fails: bool) {
        self.fail_amount_paid.store(fails, Ordering::Relaxed);
    }

    pub fn amount_paid_updates(&self) -> Vec<(String, Decimal)> {
        self.amount_paid.lock().unwrap().clone()
    }

    pub fn status_updates(&self) -> Vec<(String, TransactionStatus)> {
        self.status_updates.lock().unwrap().clone()
    }

    pub fn closed_milestones(&self) -> Vec<(String, Option<String>)> {
        self.closed_milestones.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionClient for MockTransactionClient {
    async fn list_payable_transactions(
        &self,
        limit: i64,
    ) -> Result<Vec<PayableTransaction>, AppError> {
        let payable = self.payable.lock().unwrap();
        Ok(payable.iter().take(limit as usize).cloned().collect())
    }

    async fn add_amount_paid(&self, transaction_id: &str, delta: Decimal) -> Result<(), AppError> {
        if self.fail_amount_paid.load(Ordering::Relaxed) {
            return Err(AppError::ExternalService(ExternalServiceError::Unavailable(
                "transaction service down".to_string(),
            )));
        }
        self.amount_paid
            .lock()
            .unwrap()
            .push((transaction_id.to_string(), delta));
        Ok(())
    }

    async fn update_status(
        &self,
        transaction_id: &str,
        status: TransactionStatus,
    ) -> Result<(), AppError> {
        self.status_updates
            .lock()
            .unwrap()
            .push((transaction_id.to_string(), status));
        Ok(())
    }

    async fn close_milestone(
        &self,
        transaction_id: &str,
        milestone_id: Option<&str>,
    ) -> Result<(), AppError> {
        self.closed_milestones.lock().unwrap().push((
            transaction_id.to_string(),
            milestone_id.map(str::to_string),
        ));
        Ok(())
    }
}

/// Mock notifier capturing alerts
#[derive(Default)]
pub struct MockNotifier {
    alerts: Mutex<Vec<Alert>>,
}

impl MockNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.alerts().into_iter().map(|a| a.title).collect()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

/// Mock webhook transport with scripted responses
pub struct MockWebhookSender {
    scripted: Mutex<VecDeque<Result<u16, String>>>,
    default_status: u16,
    sent: Mutex<Vec<(String, String)>>,
}

impl MockWebhookSender {
    /// Responds with `status` to every request
    #[must_use]
    pub fn responding(status: u16) -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            default_status: status,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Queue a one-off status before falling back to the default
    pub fn push_status(&self, status: u16) {
        self.scripted.lock().unwrap().push_back(Ok(status));
    }

    /// Queue a one-off transport failure
    pub fn push_network_error(&self, message: impl Into<String>) {
        self.scripted.lock().unwrap().push_back(Err(message.into()));
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookSender for MockWebhookSender {
    async fn send(&self, uri: &str, payload: &str) -> Result<DeliveryResponse, AppError> {
        self.sent
            .lock()
            .unwrap()
            .push((uri.to_string(), payload.to_string()));
        let next = self.scripted.lock().unwrap().pop_front();
        match next.unwrap_or(Ok(self.default_status)) {
            Ok(status) => Ok(DeliveryResponse {
                status,
                body: format!("mock {}", status),
            }),
            Err(message) => Err(AppError::ExternalService(ExternalServiceError::Network(
                message,
            ))),
        }
    }
}
