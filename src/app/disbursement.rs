//! Disbursement initiation and reconciliation.
//!
//! Initiation turns payable transactions into disbursement rows and hands them
//! to a gateway. Reconciliation polls open rows and applies the gateway's
//! answer. Every status change is a compare-and-set on the stored row, and
//! side effects (ledger movement, merchant webhooks, upstream bookkeeping) run
//! only for the caller whose transition won.

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde_json::json;
use std::env;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::{
    Alert, AppError, BankTransfer, BankTransferStatus, BusinessProfile, DEFAULT_CURRENCY,
    DatabaseClient, DatabaseError, Destination, Disbursement, DisbursementGateway,
    DisbursementRequestLog, DisbursementStatus, EscrowFlag, FailedDisbursement, Gateway,
    GatewayClient, GatewayWebhookLog, IdentityClient, MonnifyDisbursementCallback,
    NewDisbursement, Notifier, OpenCursor, PayableTransaction, Recipient,
    RegisterBankTransferRequest, SettlementMode, TransactionClient, TransactionStatus,
    TransferInstruction, TransferState, ValidationError, WithdrawalRequest, normalize_currency,
};
use crate::infra::GatewayRegistry;

use super::eligibility::{EligibilityEvaluator, EligibilityReport};
use super::gate::{GateDecision, RetryGate};
use super::wallet::{CreditRequest, WalletService};
use super::webhook::WebhookService;

pub const EVENT_DISBURSEMENT_SUCCESS: &str = "disbursement.success";
pub const EVENT_DISBURSEMENT_FAILED: &str = "disbursement.failed";

/// Monnify callback event types
const MONNIFY_FAILED: &str = "FAILED_DISBURSEMENT";
const MONNIFY_SUCCESSFUL: &str = "SUCCESSFUL_DISBURSEMENT";

const OPEN: &[DisbursementStatus] = &[DisbursementStatus::New, DisbursementStatus::Pending];

#[derive(Debug, Clone)]
pub struct DisbursementConfig {
    /// Rows loaded per scheduler tick
    pub batch_size: i64,
    /// Inconclusive wallet-confirm polls before a row is exhausted
    pub wallet_max_polls: i32,
    /// Inconclusive bank-transfer polls before a transfer is failed
    pub bank_transfer_max_polls: i32,
}

impl Default for DisbursementConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            wallet_max_polls: 100,
            bank_transfer_max_polls: 100,
        }
    }
}

impl DisbursementConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env::var("DISBURSEMENT_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.batch_size),
            wallet_max_polls: env::var("WALLET_MAX_POLLS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.wallet_max_polls),
            bank_transfer_max_polls: env::var("BANK_TRANSFER_MAX_POLLS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bank_transfer_max_polls),
        }
    }
}

/// What happened to one payable transaction during initiation
#[derive(Debug, Clone, PartialEq)]
pub enum InitiationOutcome {
    Created(Disbursement),
    AlreadyExists,
    /// A FailedDisbursement row is on file for the payment
    Blocked,
    Ineligible(EligibilityReport),
    /// Another task holds the payment lock
    Busy,
}

/// What happened to one disbursement during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Transitioned(DisbursementStatus),
    Unchanged,
    /// Retry gate closed
    Deferred,
    /// Another caller already moved the row
    Superseded,
}

/// Per-payment in-process locks
#[derive(Default)]
struct PaymentLocks {
    inner: DashMap<String, Arc<Mutex<()>>>,
}

impl PaymentLocks {
    fn try_acquire(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
        let lock = Arc::clone(&self.inner.entry(key.to_string()).or_default());
        lock.try_lock_owned().ok()
    }

    fn release(&self, key: &str) {
        self.inner.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

pub struct DisbursementService {
    db_client: Arc<dyn DatabaseClient>,
    gateways: GatewayRegistry,
    identity_client: Arc<dyn IdentityClient>,
    transaction_client: Arc<dyn TransactionClient>,
    notifier: Arc<dyn Notifier>,
    wallet: Arc<WalletService>,
    webhooks: Arc<WebhookService>,
    gate: RetryGate,
    evaluator: EligibilityEvaluator,
    locks: PaymentLocks,
    config: DisbursementConfig,
}

impl DisbursementService {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db_client: Arc<dyn DatabaseClient>,
        gateways: GatewayRegistry,
        identity_client: Arc<dyn IdentityClient>,
        transaction_client: Arc<dyn TransactionClient>,
        notifier: Arc<dyn Notifier>,
        wallet: Arc<WalletService>,
        webhooks: Arc<WebhookService>,
        gate: RetryGate,
        config: DisbursementConfig,
    ) -> Self {
        Self {
            db_client,
            gateways,
            identity_client,
            transaction_client,
            notifier,
            wallet,
            webhooks,
            gate,
            evaluator: EligibilityEvaluator,
            locks: PaymentLocks::default(),
            config,
        }
    }

    // -- initiation -----------------------------------------------------------

    /// Initiate payouts for every payable transaction. Returns rows created.
    #[instrument(skip(self))]
    pub async fn run_initiation_cycle(&self) -> Result<usize, AppError> {
        let candidates = self
            .transaction_client
            .list_payable_transactions(self.config.batch_size)
            .await?;
        if candidates.is_empty() {
            return Ok(0);
        }

        info!(count = candidates.len(), "Processing payable transactions");
        let mut created = 0;
        for transaction in candidates {
            match self.initiate_for_transaction(&transaction).await {
                Ok(InitiationOutcome::Created(_)) => created += 1,
                Ok(outcome) => {
                    debug!(payment_id = %transaction.payment_id, ?outcome, "No disbursement created");
                }
                Err(e) => {
                    error!(payment_id = %transaction.payment_id, error = ?e, "Failed to initiate disbursement");
                }
            }
        }
        Ok(created)
    }

    #[instrument(skip(self, transaction), fields(payment_id = %transaction.payment_id))]
    pub async fn initiate_for_transaction(
        &self,
        transaction: &PayableTransaction,
    ) -> Result<InitiationOutcome, AppError> {
        let Some(guard) = self.locks.try_acquire(&transaction.payment_id) else {
            return Ok(InitiationOutcome::Busy);
        };
        let result = self.initiate_locked(transaction).await;
        drop(guard);
        self.locks.release(&transaction.payment_id);
        result
    }

    async fn initiate_locked(
        &self,
        transaction: &PayableTransaction,
    ) -> Result<InitiationOutcome, AppError> {
        if self
            .db_client
            .get_disbursement_by_payment_id(&transaction.payment_id)
            .await?
            .is_some()
        {
            return Ok(InitiationOutcome::AlreadyExists);
        }
        if self
            .db_client
            .get_failed_disbursement(&transaction.payment_id)
            .await?
            .is_some()
        {
            return Ok(InitiationOutcome::Blocked);
        }

        let recipient = self
            .identity_client
            .get_recipient(&transaction.recipient_account_id)
            .await?;
        let business = self
            .identity_client
            .get_business(&transaction.business_id)
            .await?;

        let report = self.evaluator.evaluate(transaction, &recipient, &business);
        if !report.is_eligible() {
            let row = report.to_failed_disbursement(transaction);
            if self.db_client.insert_failed_disbursement(&row).await? {
                warn!(summary = %report.summary(), "Disbursement blocked by eligibility");
                self.notifier
                    .notify(Alert::warning(
                        "Disbursement blocked",
                        format!(
                            "Payment {} for transaction {}: {}",
                            transaction.payment_id,
                            transaction.transaction_id,
                            report.summary()
                        ),
                    ))
                    .await;
            }
            return Ok(InitiationOutcome::Ineligible(report));
        }

        let currency = normalize_currency(&transaction.currency);
        let result = if business.settlement_mode == SettlementMode::Wallet {
            self.settle_to_wallet(transaction, &business, &currency).await
        } else if currency != DEFAULT_CURRENCY {
            self.hold_for_manual_check(transaction, &business, &currency)
                .await
        } else {
            self.initiate_via_gateway(transaction, &recipient, &business, &currency)
                .await
        };

        match result {
            Ok(disbursement) => Ok(InitiationOutcome::Created(disbursement)),
            Err(AppError::Database(DatabaseError::Duplicate(_))) => {
                Ok(InitiationOutcome::AlreadyExists)
            }
            Err(e) => Err(e),
        }
    }

    fn new_record(
        transaction: &PayableTransaction,
        currency: &str,
        gateway: Gateway,
        status: DisbursementStatus,
        fee: Decimal,
    ) -> NewDisbursement {
        NewDisbursement {
            reference: new_reference(),
            recipient_account_id: transaction.recipient_account_id.clone(),
            business_id: transaction.business_id.clone(),
            payment_id: Some(transaction.payment_id.clone()),
            transaction_id: Some(transaction.transaction_id.clone()),
            milestone_id: transaction.milestone_id.clone(),
            amount: transaction.amount,
            currency: currency.to_string(),
            debit_currency: currency.to_string(),
            gateway,
            status,
            fee,
            payment_released_at: None,
        }
    }

    async fn settle_to_wallet(
        &self,
        transaction: &PayableTransaction,
        business: &BusinessProfile,
        currency: &str,
    ) -> Result<Disbursement, AppError> {
        let client = self.gateways.get(Gateway::Wallet)?;
        let mut record = Self::new_record(
            transaction,
            currency,
            client.gateway(),
            DisbursementStatus::Completed,
            Decimal::ZERO,
        );
        let instruction = TransferInstruction {
            reference: record.reference.clone(),
            amount: record.amount,
            currency: record.currency.clone(),
            debit_currency: record.debit_currency.clone(),
            destination: Destination::Wallet {
                account_id: record.recipient_account_id.clone(),
            },
            narration: format!("Escrow payout for transaction {}", transaction.transaction_id),
        };
        let receipt = client.initiate_transfer(&instruction).await?;

        record.payment_released_at = Some(Utc::now());
        let disbursement = self.db_client.insert_disbursement(&record).await?;
        info!(id = %disbursement.id, "Disbursement settled to wallet");

        let log = DisbursementRequestLog {
            id: Uuid::now_v7().to_string(),
            disbursement_id: disbursement.id.clone(),
            gateway: client.gateway(),
            request: receipt.request,
            response: Some(receipt.response),
            error: None,
            created_at: Utc::now(),
        };
        if let Err(e) = self.db_client.insert_request_log(&log).await {
            warn!(id = %disbursement.id, error = ?e, "Failed to log wallet settlement");
        }

        self.wallet
            .credit(
                &CreditRequest::new(&disbursement.recipient_account_id, disbursement.amount)
                    .currency(currency)
                    .transaction(&transaction.transaction_id),
            )
            .await?;

        self.close_upstream(&disbursement).await;
        self.notify_merchant(&disbursement, Some(business), EVENT_DISBURSEMENT_SUCCESS)
            .await;
        self.notifier
            .notify(Alert::info(
                "Disbursement completed",
                format!(
                    "{} {} settled to wallet {}",
                    disbursement.amount, currency, disbursement.recipient_account_id
                ),
            ))
            .await;
        Ok(disbursement)
    }

    async fn hold_for_manual_check(
        &self,
        transaction: &PayableTransaction,
        business: &BusinessProfile,
        currency: &str,
    ) -> Result<Disbursement, AppError> {
        let record = Self::new_record(
            transaction,
            currency,
            business.disbursement_gateway.transfer_gateway(),
            DisbursementStatus::Manual,
            business.disbursement_charge,
        );
        let disbursement = self.db_client.insert_disbursement(&record).await?;
        warn!(id = %disbursement.id, currency = %currency, "Disbursement requires manual check");
        self.notifier
            .notify(Alert::warning(
                "Disbursement requires manual check",
                format!(
                    "{} {} for transaction {} cannot be sent automatically",
                    disbursement.amount, currency, transaction.transaction_id
                ),
            ))
            .await;
        Ok(disbursement)
    }

    async fn initiate_via_gateway(
        &self,
        transaction: &PayableTransaction,
        recipient: &Recipient,
        business: &BusinessProfile,
        currency: &str,
    ) -> Result<Disbursement, AppError> {
        let client = self
            .gateways
            .get(business.disbursement_gateway.transfer_gateway())?;
        let destination = destination_for(recipient, business, currency)?;
        let record = Self::new_record(
            transaction,
            currency,
            client.gateway(),
            DisbursementStatus::New,
            business.disbursement_charge,
        );
        let narration = format!("Escrow payout for transaction {}", transaction.transaction_id);
        self.dispatch(client.as_ref(), &record, destination, narration)
            .await
    }

    /// Commit the row as `new`, then send it
    async fn dispatch(
        &self,
        client: &dyn GatewayClient,
        record: &NewDisbursement,
        destination: Destination,
        narration: String,
    ) -> Result<Disbursement, AppError> {
        let disbursement = self.db_client.insert_disbursement(record).await?;
        self.send(client, disbursement, destination, narration).await
    }

    /// Call the gateway for a committed row, log the attempt, mark `pending`
    async fn send(
        &self,
        client: &dyn GatewayClient,
        mut disbursement: Disbursement,
        destination: Destination,
        narration: String,
    ) -> Result<Disbursement, AppError> {
        let instruction = TransferInstruction {
            reference: disbursement.reference.clone(),
            amount: disbursement.amount,
            currency: disbursement.currency.clone(),
            debit_currency: disbursement.debit_currency.clone(),
            destination,
            narration,
        };

        let (log, failure) = match client.initiate_transfer(&instruction).await {
            Ok(receipt) => {
                info!(id = %disbursement.id, reference = %receipt.reference, "Transfer initiated");
                (
                    DisbursementRequestLog {
                        id: Uuid::now_v7().to_string(),
                        disbursement_id: disbursement.id.clone(),
                        gateway: client.gateway(),
                        request: receipt.request,
                        response: Some(receipt.response),
                        error: None,
                        created_at: Utc::now(),
                    },
                    None,
                )
            }
            Err(e) => {
                warn!(id = %disbursement.id, error = ?e, "Transfer initiation failed");
                (
                    DisbursementRequestLog {
                        id: Uuid::now_v7().to_string(),
                        disbursement_id: disbursement.id.clone(),
                        gateway: client.gateway(),
                        request: serde_json::to_value(&instruction)?,
                        response: None,
                        error: Some(e.to_string()),
                        created_at: Utc::now(),
                    },
                    Some(e.to_string()),
                )
            }
        };

        self.db_client.insert_request_log(&log).await?;
        self.db_client
            .transition_disbursement(
                &disbursement.id,
                &[DisbursementStatus::New],
                DisbursementStatus::Pending,
                None,
                failure.as_deref(),
            )
            .await?;
        disbursement.status = DisbursementStatus::Pending;
        disbursement.last_error = failure;
        Ok(disbursement)
    }

    /// Withdraw from a wallet to the owner's bank account
    #[instrument(skip(self, request), fields(business_id = %request.business_id, amount = %request.amount))]
    pub async fn withdraw(
        &self,
        account_id: &str,
        request: &WithdrawalRequest,
    ) -> Result<Disbursement, AppError> {
        request.validate().map_err(|e| {
            warn!(error = %e, "Validation failed");
            AppError::Validation(ValidationError::Multiple(e.to_string()))
        })?;
        if request.amount <= Decimal::ZERO {
            return Err(AppError::Validation(ValidationError::InvalidField {
                field: "amount".to_string(),
                message: "must be positive".to_string(),
            }));
        }

        let currency = normalize_currency(&request.currency);
        let recipient = self.identity_client.get_recipient(account_id).await?;
        let business = self
            .identity_client
            .get_business(&request.business_id)
            .await?;
        let bank = recipient.bank_details_for(&currency).ok_or_else(|| {
            AppError::Validation(ValidationError::MissingField(format!(
                "bank details for {}",
                currency
            )))
        })?;
        let destination = Destination::Bank {
            bank_code: bank.bank_code.clone(),
            account_number: bank.account_number.clone(),
            account_name: bank.account_name.clone(),
        };
        let client = self
            .gateways
            .get(business.disbursement_gateway.transfer_gateway())?;

        let fee = business.disbursement_charge;
        let total = request.amount + fee;
        if !self
            .wallet
            .debit(total, &currency, account_id, EscrowFlag::No, None)
            .await?
        {
            return Err(AppError::InsufficientFunds {
                account_id: account_id.to_string(),
                bucket: currency,
            });
        }

        let record = NewDisbursement {
            reference: new_reference(),
            recipient_account_id: account_id.to_string(),
            business_id: request.business_id.clone(),
            payment_id: None,
            transaction_id: None,
            milestone_id: None,
            amount: request.amount,
            currency: currency.clone(),
            debit_currency: currency.clone(),
            gateway: client.gateway(),
            status: DisbursementStatus::New,
            fee,
            payment_released_at: None,
        };

        let disbursement = match self.db_client.insert_disbursement(&record).await {
            Ok(disbursement) => disbursement,
            Err(e) => {
                // Debited but no row on file; put the funds back
                error!(error = ?e, "Withdrawal row insert failed after debit, refunding");
                self.wallet
                    .credit(
                        &CreditRequest::new(account_id, request.amount)
                            .currency(&currency)
                            .refund(fee),
                    )
                    .await?;
                return Err(e);
            }
        };

        // Once the row exists wallet-confirm owns compensation
        let id = disbursement.id.clone();
        self.send(client.as_ref(), disbursement, destination, "Wallet withdrawal".to_string())
            .await
            .inspect_err(|e| {
                error!(id = %id, error = ?e, "Withdrawal left open for wallet-confirm");
            })
    }

    // -- reconciliation -------------------------------------------------------

    /// Poll every open disbursement once, a page at a time. Returns rows examined.
    #[instrument(skip(self))]
    pub async fn run_reconciliation_cycle(&self) -> Result<usize, AppError> {
        let mut cursor: Option<OpenCursor> = None;
        let mut count = 0;
        loop {
            let page = self
                .db_client
                .list_open_disbursements(cursor.as_ref(), self.config.batch_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(OpenCursor::after(last));
            let full = page.len() as i64 >= self.config.batch_size;

            debug!(count = page.len(), "Reconciling page of open disbursements");
            for disbursement in &page {
                if let Err(e) = self.reconcile(disbursement, true).await {
                    error!(id = %disbursement.id, error = ?e, "Failed to reconcile disbursement");
                }
            }
            count += page.len();
            if !full {
                break;
            }
        }

        if count > 0 {
            info!(count = count, "Reconciled open disbursements");
        }
        Ok(count)
    }

    /// Reconcile the row behind a gateway webhook, bypassing the retry gate
    #[instrument(skip(self))]
    pub async fn reconcile_reference(
        &self,
        reference: &str,
    ) -> Result<Option<ReconcileOutcome>, AppError> {
        let Some(disbursement) = self
            .db_client
            .get_disbursement_by_reference(reference)
            .await?
        else {
            debug!(reference = %reference, "No disbursement for webhook reference");
            return Ok(None);
        };
        self.reconcile(&disbursement, false).await.map(Some)
    }

    pub async fn reconcile(
        &self,
        disbursement: &Disbursement,
        gated: bool,
    ) -> Result<ReconcileOutcome, AppError> {
        if !disbursement.status.is_open() {
            return Ok(ReconcileOutcome::Unchanged);
        }
        if disbursement.funds_wallet() {
            self.wallet_confirm(disbursement).await
        } else {
            self.transaction_confirm(disbursement, gated).await
        }
    }

    #[instrument(skip(self, disbursement), fields(id = %disbursement.id, reference = %disbursement.reference))]
    async fn wallet_confirm(
        &self,
        disbursement: &Disbursement,
    ) -> Result<ReconcileOutcome, AppError> {
        let client = self.gateways.get(disbursement.gateway)?;
        let status = match client.query_status(&disbursement.reference).await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = ?e, "Wallet-confirm poll failed");
                return self.count_wallet_poll(disbursement).await;
            }
        };

        match status.state {
            TransferState::Completed => self.complete_wallet(disbursement).await,
            TransferState::Failed => self.fail_wallet(disbursement).await,
            TransferState::Cancelled => {
                self.transition(disbursement, DisbursementStatus::Cancelled, None)
                    .await
            }
            TransferState::Unknown => {
                let outcome = self
                    .transition(
                        disbursement,
                        DisbursementStatus::Review,
                        Some(&format!("unrecognised gateway status '{}'", status.raw_status)),
                    )
                    .await?;
                if outcome != ReconcileOutcome::Superseded {
                    self.notifier
                        .notify(Alert::warning(
                            "Disbursement needs review",
                            format!(
                                "{} returned status '{}' for {}",
                                disbursement.gateway, status.raw_status, disbursement.reference
                            ),
                        ))
                        .await;
                }
                Ok(outcome)
            }
            TransferState::Ongoing | TransferState::New | TransferState::Pending => {
                self.count_wallet_poll(disbursement).await
            }
        }
    }

    async fn count_wallet_poll(
        &self,
        disbursement: &Disbursement,
    ) -> Result<ReconcileOutcome, AppError> {
        let polls = self
            .db_client
            .increment_disbursement_tries(&disbursement.id)
            .await?;
        if polls <= self.config.wallet_max_polls {
            return Ok(ReconcileOutcome::Unchanged);
        }
        self.exhaust(disbursement, polls).await
    }

    async fn complete_wallet(
        &self,
        disbursement: &Disbursement,
    ) -> Result<ReconcileOutcome, AppError> {
        let outcome = self
            .transition(disbursement, DisbursementStatus::Completed, None)
            .await?;
        if outcome == ReconcileOutcome::Superseded {
            return Ok(outcome);
        }
        info!(id = %disbursement.id, "Wallet withdrawal completed");
        self.notify_merchant(
            &with_status(disbursement, DisbursementStatus::Completed),
            None,
            EVENT_DISBURSEMENT_SUCCESS,
        )
        .await;
        Ok(outcome)
    }

    async fn fail_wallet(&self, disbursement: &Disbursement) -> Result<ReconcileOutcome, AppError> {
        let outcome = self
            .transition(
                disbursement,
                DisbursementStatus::Failed,
                Some("gateway reported failure"),
            )
            .await?;
        if outcome == ReconcileOutcome::Superseded {
            return Ok(outcome);
        }

        self.wallet
            .credit(
                &CreditRequest::new(&disbursement.recipient_account_id, disbursement.amount)
                    .currency(&disbursement.currency)
                    .refund(disbursement.fee),
            )
            .await?;
        warn!(id = %disbursement.id, "Wallet withdrawal failed, refunded");
        self.notify_merchant(
            &with_status(disbursement, DisbursementStatus::Failed),
            None,
            EVENT_DISBURSEMENT_FAILED,
        )
        .await;
        self.notifier
            .notify(Alert::warning(
                "Withdrawal failed",
                format!(
                    "{} {} refunded to {} after gateway failure",
                    disbursement.amount + disbursement.fee,
                    disbursement.currency,
                    disbursement.recipient_account_id
                ),
            ))
            .await;
        Ok(outcome)
    }

    #[instrument(skip(self, disbursement), fields(id = %disbursement.id, reference = %disbursement.reference))]
    async fn transaction_confirm(
        &self,
        disbursement: &Disbursement,
        gated: bool,
    ) -> Result<ReconcileOutcome, AppError> {
        let tries = if gated {
            match self.gate.decide_tries(disbursement, Utc::now()).await? {
                GateDecision::Wait { .. } => return Ok(ReconcileOutcome::Deferred),
                GateDecision::Exhausted { tries } => {
                    return self.exhaust(disbursement, tries).await;
                }
                GateDecision::Proceed { tries, .. } => tries,
            }
        } else {
            disbursement.tries
        };

        let client = self.gateways.get(disbursement.gateway)?;
        let status = match client.query_status(&disbursement.reference).await {
            Ok(status) => status,
            Err(e) if e.is_transient() => {
                warn!(error = ?e, "Transaction-confirm poll failed");
                return Ok(ReconcileOutcome::Unchanged);
            }
            Err(e) => return Err(e),
        };

        match status.state {
            TransferState::Completed => self.complete_transaction(disbursement).await,
            TransferState::Failed if self.gate.beyond_budget(tries) => {
                self.escalate_failure(disbursement).await
            }
            TransferState::Failed | TransferState::Ongoing => Ok(ReconcileOutcome::Unchanged),
            TransferState::Cancelled => {
                self.transition(disbursement, DisbursementStatus::Cancelled, None)
                    .await
            }
            TransferState::New => self.reassert(disbursement, DisbursementStatus::New).await,
            TransferState::Pending | TransferState::Unknown => {
                self.reassert(disbursement, DisbursementStatus::Pending)
                    .await
            }
        }
    }

    async fn complete_transaction(
        &self,
        disbursement: &Disbursement,
    ) -> Result<ReconcileOutcome, AppError> {
        let outcome = self
            .transition(disbursement, DisbursementStatus::Completed, None)
            .await?;
        if outcome == ReconcileOutcome::Superseded {
            return Ok(outcome);
        }
        info!(id = %disbursement.id, "Disbursement completed");

        self.close_upstream(disbursement).await;
        match self
            .wallet
            .debit(
                disbursement.amount,
                &disbursement.currency,
                &disbursement.recipient_account_id,
                EscrowFlag::Yes,
                disbursement.transaction_id.as_deref(),
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                self.notifier
                    .notify(Alert::critical(
                        "Escrow debit short",
                        format!(
                            "Escrow balance of {} could not cover {} {} for disbursement {}",
                            disbursement.recipient_account_id,
                            disbursement.amount,
                            disbursement.currency,
                            disbursement.id
                        ),
                    ))
                    .await;
            }
            Err(e) => error!(id = %disbursement.id, error = ?e, "Escrow debit failed"),
        }

        self.notify_merchant(
            &with_status(disbursement, DisbursementStatus::Completed),
            None,
            EVENT_DISBURSEMENT_SUCCESS,
        )
        .await;
        self.notifier
            .notify(Alert::info(
                "Disbursement completed",
                format!(
                    "{} {} released to {}",
                    disbursement.amount, disbursement.currency, disbursement.recipient_account_id
                ),
            ))
            .await;
        Ok(outcome)
    }

    /// Hand the owning transaction back to `disbursement_pending`
    async fn escalate_upstream(&self, disbursement: &Disbursement) {
        if disbursement.funds_wallet() {
            return;
        }
        if let Some(tx_id) = disbursement.transaction_id.as_deref()
            && let Err(e) = self
                .transaction_client
                .update_status(tx_id, TransactionStatus::DisbursementPending)
                .await
        {
            error!(transaction_id = %tx_id, error = ?e, "Failed to escalate transaction");
        }
    }

    async fn escalate_failure(
        &self,
        disbursement: &Disbursement,
    ) -> Result<ReconcileOutcome, AppError> {
        self.escalate_upstream(disbursement).await;
        let outcome = self
            .transition(
                disbursement,
                DisbursementStatus::Failed,
                Some("gateway reported failure after retry budget"),
            )
            .await?;
        if outcome != ReconcileOutcome::Superseded {
            self.notifier
                .notify(Alert::critical(
                    "Disbursement failed",
                    format!(
                        "Disbursement {} failed on {}; transaction returned to disbursement_pending",
                        disbursement.id, disbursement.gateway
                    ),
                ))
                .await;
        }
        Ok(outcome)
    }

    /// Bookkeeping write that keeps the row open
    async fn reassert(
        &self,
        disbursement: &Disbursement,
        status: DisbursementStatus,
    ) -> Result<ReconcileOutcome, AppError> {
        self.db_client
            .transition_disbursement(&disbursement.id, OPEN, status, Some(Utc::now()), None)
            .await?;
        Ok(ReconcileOutcome::Unchanged)
    }

    async fn exhaust(
        &self,
        disbursement: &Disbursement,
        tries: i32,
    ) -> Result<ReconcileOutcome, AppError> {
        let outcome = self
            .transition(
                disbursement,
                DisbursementStatus::Exhausted,
                Some(&format!("no conclusive gateway answer after {} tries", tries)),
            )
            .await?;
        if outcome != ReconcileOutcome::Superseded {
            warn!(id = %disbursement.id, tries = tries, "Disbursement exhausted");
            self.escalate_upstream(disbursement).await;
            self.notifier
                .notify(Alert::critical(
                    "Disbursement exhausted",
                    format!(
                        "Disbursement {} ({}) gave up after {} tries",
                        disbursement.id, disbursement.reference, tries
                    ),
                ))
                .await;
        }
        Ok(outcome)
    }

    async fn transition(
        &self,
        disbursement: &Disbursement,
        to: DisbursementStatus,
        error: Option<&str>,
    ) -> Result<ReconcileOutcome, AppError> {
        let released_at = matches!(
            to,
            DisbursementStatus::Completed | DisbursementStatus::Failed
        )
        .then(Utc::now);
        let won = self
            .db_client
            .transition_disbursement(&disbursement.id, OPEN, to, released_at, error)
            .await?;
        if won {
            info!(id = %disbursement.id, from = %disbursement.status, to = %to, "Disbursement transitioned");
            Ok(ReconcileOutcome::Transitioned(to))
        } else {
            debug!(id = %disbursement.id, to = %to, "Transition lost to another caller");
            Ok(ReconcileOutcome::Superseded)
        }
    }

    // -- gateway callbacks ----------------------------------------------------

    /// Persist a verified inbound callback body before acting on it
    #[instrument(skip(self, payload))]
    pub async fn record_gateway_webhook(
        &self,
        source: &str,
        reference: Option<&str>,
        payload: &str,
    ) -> Result<(), AppError> {
        self.db_client
            .insert_gateway_webhook_log(&GatewayWebhookLog {
                id: Uuid::now_v7().to_string(),
                source: source.to_string(),
                reference: reference.map(str::to_string),
                payload: payload.to_string(),
                created_at: Utc::now(),
            })
            .await
    }

    #[instrument(skip(self, callback), fields(event = %callback.event_type, reference = %callback.event_data.reference))]
    pub async fn handle_monnify_callback(
        &self,
        callback: &MonnifyDisbursementCallback,
    ) -> Result<ReconcileOutcome, AppError> {
        let disbursement = self
            .db_client
            .get_disbursement_by_reference(&callback.event_data.reference)
            .await?
            .ok_or_else(|| {
                AppError::Database(DatabaseError::NotFound(format!(
                    "disbursement {}",
                    callback.event_data.reference
                )))
            })?;

        match callback.event_type.as_str() {
            MONNIFY_FAILED => {
                let reason = callback
                    .event_data
                    .transaction_description
                    .clone()
                    .unwrap_or_else(|| "Monnify reported failure".to_string());
                let outcome = self
                    .transition(&disbursement, DisbursementStatus::Failed, Some(&reason))
                    .await?;
                if outcome == ReconcileOutcome::Superseded {
                    return Ok(outcome);
                }
                if callback.event_data.amount != disbursement.amount {
                    warn!(
                        stored = %disbursement.amount,
                        reported = %callback.event_data.amount,
                        "Monnify callback amount differs from disbursement"
                    );
                    self.notifier
                        .notify(Alert::warning(
                            "Monnify amount mismatch",
                            format!(
                                "Callback for {} reported {} but {} was disbursed",
                                disbursement.reference, callback.event_data.amount, disbursement.amount
                            ),
                        ))
                        .await;
                }
                self.wallet
                    .credit(
                        &CreditRequest::new(&disbursement.business_id, disbursement.amount)
                            .currency(&disbursement.currency)
                            .refund(Decimal::ZERO),
                    )
                    .await?;
                self.notify_merchant(
                    &with_status(&disbursement, DisbursementStatus::Failed),
                    None,
                    EVENT_DISBURSEMENT_FAILED,
                )
                .await;
                self.notifier
                    .notify(Alert::warning(
                        "Disbursement failed",
                        format!(
                            "Monnify failed {}; {} {} returned to {}",
                            disbursement.reference,
                            disbursement.amount,
                            disbursement.currency,
                            disbursement.business_id
                        ),
                    ))
                    .await;
                Ok(outcome)
            }
            MONNIFY_SUCCESSFUL => {
                if disbursement.funds_wallet() {
                    self.complete_wallet(&disbursement).await
                } else {
                    self.complete_transaction(&disbursement).await
                }
            }
            other => {
                info!(event = %other, "Ignoring Monnify event");
                Ok(ReconcileOutcome::Unchanged)
            }
        }
    }

    // -- bank transfers -------------------------------------------------------

    #[instrument(skip(self, request), fields(reference = %request.reference))]
    pub async fn register_bank_transfer(
        &self,
        request: &RegisterBankTransferRequest,
    ) -> Result<BankTransfer, AppError> {
        request.validate().map_err(|e| {
            warn!(error = %e, "Validation failed");
            AppError::Validation(ValidationError::Multiple(e.to_string()))
        })?;
        if request.amount <= Decimal::ZERO {
            return Err(AppError::Validation(ValidationError::InvalidField {
                field: "amount".to_string(),
                message: "must be positive".to_string(),
            }));
        }
        self.db_client.insert_bank_transfer(request).await
    }

    /// Poll pending inbound bank transfers. Returns transfers examined.
    #[instrument(skip(self))]
    pub async fn run_bank_transfer_cycle(&self) -> Result<usize, AppError> {
        let pending = self
            .db_client
            .list_pending_bank_transfers(self.config.batch_size)
            .await?;
        let count = pending.len();
        for transfer in pending {
            if let Err(e) = self.confirm_bank_transfer(&transfer).await {
                error!(id = %transfer.id, error = ?e, "Failed to confirm bank transfer");
            }
        }
        Ok(count)
    }

    async fn confirm_bank_transfer(
        &self,
        transfer: &BankTransfer,
    ) -> Result<BankTransferStatus, AppError> {
        let client = self.gateways.get(transfer.gateway)?;
        let state = match client.query_status(&transfer.reference).await {
            Ok(status) => status.state,
            Err(e) => {
                warn!(id = %transfer.id, error = ?e, "Bank transfer poll failed");
                TransferState::Pending
            }
        };

        match state {
            TransferState::Completed => {
                if !self
                    .db_client
                    .transition_bank_transfer(&transfer.id, BankTransferStatus::Confirmed)
                    .await?
                {
                    return Ok(BankTransferStatus::Confirmed);
                }
                let mut credit = CreditRequest::new(&transfer.account_id, transfer.amount)
                    .currency(&transfer.currency)
                    .escrow(EscrowFlag::Yes);
                if let Some(tx_id) = transfer.transaction_id.as_deref() {
                    credit = credit.transaction(tx_id);
                }
                self.wallet.credit(&credit).await?;
                info!(id = %transfer.id, "Bank transfer confirmed");
                Ok(BankTransferStatus::Confirmed)
            }
            TransferState::Failed | TransferState::Cancelled => {
                self.fail_bank_transfer(transfer, "gateway reported failure")
                    .await
            }
            _ => {
                let tries = self
                    .db_client
                    .increment_bank_transfer_tries(&transfer.id)
                    .await?;
                if tries > self.config.bank_transfer_max_polls {
                    return self
                        .fail_bank_transfer(transfer, "no confirmation within poll budget")
                        .await;
                }
                Ok(BankTransferStatus::Pending)
            }
        }
    }

    async fn fail_bank_transfer(
        &self,
        transfer: &BankTransfer,
        reason: &str,
    ) -> Result<BankTransferStatus, AppError> {
        if self
            .db_client
            .transition_bank_transfer(&transfer.id, BankTransferStatus::Failed)
            .await?
        {
            self.notifier
                .notify(Alert::warning(
                    "Bank transfer failed",
                    format!("Transfer {} for {}: {}", transfer.reference, transfer.account_id, reason),
                ))
                .await;
        }
        Ok(BankTransferStatus::Failed)
    }

    // -- queries --------------------------------------------------------------

    pub async fn get_disbursement(&self, id: &str) -> Result<Option<Disbursement>, AppError> {
        self.db_client.get_disbursement(id).await
    }

    pub async fn list_failed_disbursements(&self) -> Result<Vec<FailedDisbursement>, AppError> {
        self.db_client.list_failed_disbursements().await
    }

    /// Lift an eligibility block so the next initiation tick retries the payment
    #[instrument(skip(self))]
    pub async fn clear_failed_disbursement(&self, payment_id: &str) -> Result<bool, AppError> {
        let removed = self.db_client.delete_failed_disbursement(payment_id).await?;
        if removed {
            info!(payment_id = %payment_id, "Eligibility block lifted");
        }
        Ok(removed)
    }

    // -- notifications --------------------------------------------------------

    /// Close the milestone and mark the transaction disbursed; failures are logged
    async fn close_upstream(&self, disbursement: &Disbursement) {
        let Some(tx_id) = disbursement.transaction_id.as_deref() else {
            return;
        };
        if let Err(e) = self
            .transaction_client
            .close_milestone(tx_id, disbursement.milestone_id.as_deref())
            .await
        {
            error!(transaction_id = %tx_id, error = ?e, "Failed to close milestone");
        }
        if let Err(e) = self
            .transaction_client
            .update_status(tx_id, TransactionStatus::Disbursed)
            .await
        {
            error!(transaction_id = %tx_id, error = ?e, "Failed to mark transaction disbursed");
        }
        let message = format!("Disbursement {} released", disbursement.reference);
        if let Err(e) = self.transaction_client.log_activity(tx_id, &message).await {
            debug!(transaction_id = %tx_id, error = ?e, "Failed to log activity");
        }
    }

    async fn notify_merchant(
        &self,
        disbursement: &Disbursement,
        business: Option<&BusinessProfile>,
        event: &str,
    ) {
        let fetched;
        let business = match business {
            Some(b) => b,
            None => match self
                .identity_client
                .get_business(&disbursement.business_id)
                .await
            {
                Ok(b) => {
                    fetched = b;
                    &fetched
                }
                Err(e) => {
                    error!(business_id = %disbursement.business_id, error = ?e, "Failed to load business for webhook");
                    return;
                }
            },
        };
        let payload = json!({ "event": event, "data": disbursement });
        let queued = self.webhooks.notify_business(business, event, &payload).await;
        debug!(id = %disbursement.id, event = %event, queued = queued, "Merchant webhooks queued");
    }
}

fn new_reference() -> String {
    format!("DSB-{}", Uuid::now_v7().simple())
}

fn with_status(disbursement: &Disbursement, status: DisbursementStatus) -> Disbursement {
    let mut updated = disbursement.clone();
    updated.status = status;
    updated.payment_released_at = Some(Utc::now());
    updated
}

fn destination_for(
    recipient: &Recipient,
    business: &BusinessProfile,
    currency: &str,
) -> Result<Destination, AppError> {
    if business.disbursement_gateway == DisbursementGateway::MobileMoney {
        return match (&recipient.mobile_money_operator, &recipient.phone_number) {
            (Some(operator), Some(phone_number)) => Ok(Destination::MobileMoney {
                operator: operator.to_uppercase(),
                phone_number: phone_number.clone(),
            }),
            _ => Err(AppError::Validation(ValidationError::MissingField(
                "mobile money operator".to_string(),
            ))),
        };
    }
    let bank = recipient.bank_details_for(currency).ok_or_else(|| {
        AppError::Validation(ValidationError::MissingField(format!(
            "bank details for {}",
            currency
        )))
    })?;
    Ok(Destination::Bank {
        bank_code: bank.bank_code.clone(),
        account_number: bank.account_number.clone(),
        account_name: bank.account_name.clone(),
    })
}
