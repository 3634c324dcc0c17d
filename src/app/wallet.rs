//! Wallet ledger with escrow sub-accounting.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
    Alert, AppError, DatabaseClient, EscrowFlag, LedgerEntry, LedgerKind, Notifier,
    TransactionClient, ValidationError, WalletBalance, normalize_currency,
};

/// Credit to one wallet bucket
#[derive(Debug, Clone, PartialEq)]
pub struct CreditRequest {
    pub amount: Decimal,
    pub currency: String,
    pub account_id: String,
    pub is_refund: bool,
    /// Added on top of `amount` for refunds
    pub refund_charge: Decimal,
    pub escrow: EscrowFlag,
    pub transaction_id: Option<String>,
}

impl CreditRequest {
    #[must_use]
    pub fn new(account_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            amount,
            currency: String::new(),
            account_id: account_id.into(),
            is_refund: false,
            refund_charge: Decimal::ZERO,
            escrow: EscrowFlag::No,
            transaction_id: None,
        }
    }

    #[must_use]
    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    #[must_use]
    pub fn escrow(mut self, escrow: EscrowFlag) -> Self {
        self.escrow = escrow;
        self
    }

    #[must_use]
    pub fn transaction(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    /// Mark as a refund returning `charge` alongside the principal
    #[must_use]
    pub fn refund(mut self, charge: Decimal) -> Self {
        self.is_refund = true;
        self.refund_charge = charge;
        self
    }

    /// Total added to the bucket
    #[must_use]
    pub fn total(&self) -> Decimal {
        if self.is_refund {
            self.amount + self.refund_charge
        } else {
            self.amount
        }
    }
}

pub struct WalletService {
    db_client: Arc<dyn DatabaseClient>,
    transaction_client: Arc<dyn TransactionClient>,
    notifier: Arc<dyn Notifier>,
}

impl WalletService {
    #[must_use]
    pub fn new(
        db_client: Arc<dyn DatabaseClient>,
        transaction_client: Arc<dyn TransactionClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db_client,
            transaction_client,
            notifier,
        }
    }

    #[instrument(
        skip(self, request),
        fields(account_id = %request.account_id, amount = %request.amount, escrow = ?request.escrow)
    )]
    pub async fn credit(&self, request: &CreditRequest) -> Result<WalletBalance, AppError> {
        ensure_positive("amount", request.amount)?;
        if request.refund_charge.is_sign_negative() {
            return Err(AppError::Validation(ValidationError::InvalidField {
                field: "refund_charge".to_string(),
                message: "must not be negative".to_string(),
            }));
        }

        let currency = normalize_currency(&request.currency);
        let bucket = request.escrow.bucket(&currency);
        let balance = self
            .db_client
            .credit_wallet_balance(&request.account_id, &bucket, request.total())
            .await?;
        info!(bucket = %bucket, available = %balance.available, "Wallet credited");

        if request.escrow == EscrowFlag::Yes
            && let Some(tx_id) = request.transaction_id.as_deref()
        {
            // Ledger credit stands even if the upstream bookkeeping fails
            if let Err(e) = self
                .transaction_client
                .add_amount_paid(tx_id, request.amount)
                .await
            {
                error!(transaction_id = %tx_id, error = ?e, "Failed to forward amount paid");
                self.notifier
                    .notify(Alert::critical(
                        "Amount paid update failed",
                        format!(
                            "Escrow credit of {} {} for {} landed but transaction {} was not updated: {}",
                            request.amount, currency, request.account_id, tx_id, e
                        ),
                    ))
                    .await;
            }
        }

        if !request.is_refund {
            self.db_client
                .insert_ledger_entry(&LedgerEntry {
                    id: Uuid::now_v7().to_string(),
                    kind: LedgerKind::Earning,
                    account_id: request.account_id.clone(),
                    bucket: bucket.clone(),
                    amount: request.amount,
                    transaction_id: request.transaction_id.clone(),
                    description: format!("Credit to {}", bucket),
                    created_at: Utc::now(),
                })
                .await?;
            self.notifier
                .notify(Alert::info(
                    "Wallet funded",
                    format!(
                        "{} credited with {} in {}",
                        request.account_id, request.amount, bucket
                    ),
                ))
                .await;
        }

        Ok(balance)
    }

    /// Returns `false` without mutating anything when funds are insufficient
    #[instrument(skip(self))]
    pub async fn debit(
        &self,
        amount: Decimal,
        currency: &str,
        account_id: &str,
        escrow: EscrowFlag,
        transaction_id: Option<&str>,
    ) -> Result<bool, AppError> {
        ensure_positive("amount", amount)?;

        let bucket = escrow.bucket(&normalize_currency(currency));
        self.db_client
            .ensure_wallet_balance(account_id, &bucket)
            .await?;

        let Some(balance) = self
            .db_client
            .debit_wallet_balance(account_id, &bucket, amount)
            .await?
        else {
            warn!(bucket = %bucket, "Insufficient funds for debit");
            return Ok(false);
        };

        self.db_client
            .insert_ledger_entry(&LedgerEntry {
                id: Uuid::now_v7().to_string(),
                kind: LedgerKind::Debit,
                account_id: account_id.to_string(),
                bucket: bucket.clone(),
                amount,
                transaction_id: transaction_id.map(str::to_string),
                description: format!("Debit from {}", bucket),
                created_at: Utc::now(),
            })
            .await?;
        info!(bucket = %bucket, available = %balance.available, "Wallet debited");
        self.notifier
            .notify(Alert::info(
                "Wallet debited",
                format!("{} debited {} from {}", account_id, amount, bucket),
            ))
            .await;

        Ok(true)
    }

    /// Available balance, zero for an untouched bucket
    pub async fn balance(
        &self,
        account_id: &str,
        currency: &str,
        escrow: EscrowFlag,
    ) -> Result<Decimal, AppError> {
        let bucket = escrow.bucket(&normalize_currency(currency));
        Ok(self
            .db_client
            .get_wallet_balance(account_id, &bucket)
            .await?
            .map(|b| b.available)
            .unwrap_or(Decimal::ZERO))
    }
}

fn ensure_positive(field: &str, amount: Decimal) -> Result<(), AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation(ValidationError::InvalidField {
            field: field.to_string(),
            message: "must be positive".to_string(),
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockDatabaseClient, MockNotifier, MockTransactionClient};
    use rust_decimal_macros::dec;

    struct Harness {
        db: Arc<MockDatabaseClient>,
        tx: Arc<MockTransactionClient>,
        notifier: Arc<MockNotifier>,
        wallet: WalletService,
    }

    fn harness() -> Harness {
        let db = Arc::new(MockDatabaseClient::new());
        let tx = Arc::new(MockTransactionClient::new());
        let notifier = Arc::new(MockNotifier::new());
        let wallet = WalletService::new(db.clone(), tx.clone(), notifier.clone());
        Harness {
            db,
            tx,
            notifier,
            wallet,
        }
    }

    #[tokio::test]
    async fn test_credit_creates_row_and_logs_earning() {
        let h = harness();
        let balance = h
            .wallet
            .credit(&CreditRequest::new("acct-1", dec!(250)).currency("ngn"))
            .await
            .unwrap();

        assert_eq!(balance.currency, "NGN");
        assert_eq!(balance.available, dec!(250));
        assert_eq!(h.db.ledger_entries().len(), 1);
        assert_eq!(h.db.ledger_entries()[0].kind, LedgerKind::Earning);
        assert_eq!(h.notifier.titles(), vec!["Wallet funded"]);
    }

    #[tokio::test]
    async fn test_escrow_and_bare_buckets_are_separate() {
        let h = harness();
        h.wallet
            .credit(&CreditRequest::new("acct-1", dec!(100)).escrow(EscrowFlag::Yes))
            .await
            .unwrap();
        h.wallet
            .credit(&CreditRequest::new("acct-1", dec!(40)))
            .await
            .unwrap();

        assert_eq!(h.db.balance("acct-1", "ESCROW_NGN"), dec!(100));
        assert_eq!(h.db.balance("acct-1", "NGN"), dec!(40));

        assert!(
            h.wallet
                .debit(dec!(30), "NGN", "acct-1", EscrowFlag::Yes, None)
                .await
                .unwrap()
        );
        assert_eq!(h.db.balance("acct-1", "ESCROW_NGN"), dec!(70));
        assert_eq!(h.db.balance("acct-1", "NGN"), dec!(40));
    }

    #[tokio::test]
    async fn test_escrow_credit_forwards_amount_paid() {
        let h = harness();
        h.wallet
            .credit(
                &CreditRequest::new("acct-1", dec!(500))
                    .escrow(EscrowFlag::Yes)
                    .transaction("tx-9"),
            )
            .await
            .unwrap();
        assert_eq!(h.tx.amount_paid_updates(), vec![("tx-9".to_string(), dec!(500))]);
    }

    #[tokio::test]
    async fn test_amount_paid_failure_keeps_credit_and_alerts() {
        let h = harness();
        h.tx.set_amount_paid_fails(true);
        let balance = h
            .wallet
            .credit(
                &CreditRequest::new("acct-1", dec!(500))
                    .escrow(EscrowFlag::Yes)
                    .transaction("tx-9"),
            )
            .await
            .unwrap();
        assert_eq!(balance.available, dec!(500));
        assert!(h.notifier.titles().contains(&"Amount paid update failed".to_string()));
    }

    #[tokio::test]
    async fn test_refund_adds_charge_and_skips_earnings() {
        let h = harness();
        h.wallet
            .credit(&CreditRequest::new("acct-1", dec!(1000)).refund(dec!(50)))
            .await
            .unwrap();
        assert_eq!(h.db.balance("acct-1", "NGN"), dec!(1050));
        assert!(h.db.ledger_entries().is_empty());
        assert!(h.notifier.alerts().is_empty());
    }

    #[tokio::test]
    async fn test_debit_insufficient_funds_is_false_and_untouched() {
        let h = harness();
        h.db.set_balance("acct-1", "NGN", dec!(10));
        let ok = h
            .wallet
            .debit(dec!(10.01), "NGN", "acct-1", EscrowFlag::No, None)
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(h.db.balance("acct-1", "NGN"), dec!(10));
        assert!(h.db.ledger_entries().is_empty());
    }

    #[tokio::test]
    async fn test_debit_on_untouched_bucket_creates_zero_row() {
        let h = harness();
        let ok = h
            .wallet
            .debit(dec!(1), "usd", "acct-2", EscrowFlag::No, None)
            .await
            .unwrap();
        assert!(!ok);
        let row = h.db.get_wallet_balance("acct-2", "USD").await.unwrap();
        assert_eq!(row.map(|r| r.available), Some(Decimal::ZERO));
    }

    #[tokio::test]
    async fn test_non_positive_amounts_are_rejected() {
        let h = harness();
        let err = h
            .wallet
            .credit(&CreditRequest::new("acct-1", Decimal::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = h
            .wallet
            .debit(dec!(-5), "NGN", "acct-1", EscrowFlag::No, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
