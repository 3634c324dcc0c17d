//! PostgreSQL database client implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgPoolOptions, postgres::PgRow};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{
    AppError, BankTransfer, BankTransferStatus, DatabaseClient, DatabaseError, Disbursement,
    DisbursementRequestLog, DisbursementStatus, FailedDisbursement, GatewayWebhookLog,
    LedgerEntry, LedgerKind, NewDisbursement, NewWebhook, OpenCursor,
    RegisterBankTransferRequest, WalletBalance, Webhook, WebhookAttempt, normalize_currency,
};

const DISBURSEMENT_COLUMNS: &str = r#"
    id, reference, recipient_account_id, business_id, payment_id, transaction_id,
    milestone_id, amount, currency, debit_currency, gateway, status, fee, tries,
    try_again_at, payment_released_at, last_error, created_at, updated_at
"#;

const WEBHOOK_COLUMNS: &str = r#"
    id, event, business_id, uri, payload, tries, is_received, is_abandoned, retry_at,
    last_response_status, last_response_body, created_at, updated_at
"#;

const BANK_TRANSFER_COLUMNS: &str = r#"
    id, reference, account_id, transaction_id, amount, currency, gateway, status, tries,
    created_at, updated_at
"#;

/// PostgreSQL connection pool configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// PostgreSQL database client with connection pooling
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client with custom configuration
    pub async fn new(database_url: &str, config: PostgresConfig) -> Result<Self, AppError> {
        info!("Connecting to PostgreSQL...");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client with default configuration
    pub async fn with_defaults(database_url: &str) -> Result<Self, AppError> {
        Self::new(database_url, PostgresConfig::default()).await
    }

    /// Run database migrations using sqlx migrate
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Migration(e.to_string())))?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying connection pool (for testing)
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_disbursement(row: &PgRow) -> Result<Disbursement, AppError> {
        let gateway: String = row.get("gateway");
        let status: String = row.get("status");
        Ok(Disbursement {
            id: row.get("id"),
            reference: row.get("reference"),
            recipient_account_id: row.get("recipient_account_id"),
            business_id: row.get("business_id"),
            payment_id: row.get("payment_id"),
            transaction_id: row.get("transaction_id"),
            milestone_id: row.get("milestone_id"),
            amount: row.get("amount"),
            currency: row.get("currency"),
            debit_currency: row.get("debit_currency"),
            gateway: gateway.parse().map_err(AppError::Serialization)?,
            status: status.parse().map_err(AppError::Serialization)?,
            fee: row.get("fee"),
            tries: row.get("tries"),
            try_again_at: row.get("try_again_at"),
            payment_released_at: row.get("payment_released_at"),
            last_error: row.get("last_error"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn row_to_webhook(row: &PgRow) -> Webhook {
        Webhook {
            id: row.get("id"),
            event: row.get("event"),
            business_id: row.get("business_id"),
            uri: row.get("uri"),
            payload: row.get("payload"),
            tries: row.get("tries"),
            is_received: row.get("is_received"),
            is_abandoned: row.get("is_abandoned"),
            retry_at: row.get("retry_at"),
            last_response_status: row.get("last_response_status"),
            last_response_body: row.get("last_response_body"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    fn row_to_balance(row: &PgRow) -> WalletBalance {
        WalletBalance {
            account_id: row.get("account_id"),
            currency: row.get("currency"),
            available: row.get("available"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    fn row_to_failed(row: &PgRow) -> FailedDisbursement {
        FailedDisbursement {
            payment_id: row.get("payment_id"),
            transaction_id: row.get("transaction_id"),
            business_id: row.get("business_id"),
            restricted: row.get("restricted"),
            issues: row.get("issues"),
            created_at: row.get("created_at"),
        }
    }

    fn row_to_bank_transfer(row: &PgRow) -> Result<BankTransfer, AppError> {
        let gateway: String = row.get("gateway");
        let status: String = row.get("status");
        Ok(BankTransfer {
            id: row.get("id"),
            reference: row.get("reference"),
            account_id: row.get("account_id"),
            transaction_id: row.get("transaction_id"),
            amount: row.get("amount"),
            currency: row.get("currency"),
            gateway: gateway.parse().map_err(AppError::Serialization)?,
            status: status.parse().map_err(AppError::Serialization)?,
            tries: row.get("tries"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    async fn fetch_disbursement_by(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<Disbursement>, AppError> {
        let sql = format!(
            "SELECT {} FROM disbursements WHERE {} = $1",
            DISBURSEMENT_COLUMNS, column
        );
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        row.as_ref().map(Self::row_to_disbursement).transpose()
    }

    async fn disbursement_exists(&self, id: &str) -> Result<bool, AppError> {
        let row = sqlx::query("SELECT 1 FROM disbursements WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        Ok(())
    }

    #[instrument(skip(self, data), fields(reference = %data.reference, payment_id = ?data.payment_id))]
    async fn insert_disbursement(&self, data: &NewDisbursement) -> Result<Disbursement, AppError> {
        let id = Uuid::now_v7().to_string();
        let sql = format!(
            r#"
            INSERT INTO disbursements (
                id, reference, recipient_account_id, business_id, payment_id, transaction_id,
                milestone_id, amount, currency, debit_currency, gateway, status, fee,
                payment_released_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {}
            "#,
            DISBURSEMENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&id)
            .bind(&data.reference)
            .bind(&data.recipient_account_id)
            .bind(&data.business_id)
            .bind(&data.payment_id)
            .bind(&data.transaction_id)
            .bind(&data.milestone_id)
            .bind(data.amount)
            .bind(&data.currency)
            .bind(&data.debit_currency)
            .bind(data.gateway.as_str())
            .bind(data.status.as_str())
            .bind(data.fee)
            .bind(data.payment_released_at)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Self::row_to_disbursement(&row)
    }

    #[instrument(skip(self))]
    async fn get_disbursement(&self, id: &str) -> Result<Option<Disbursement>, AppError> {
        self.fetch_disbursement_by("id", id).await
    }

    #[instrument(skip(self))]
    async fn get_disbursement_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Disbursement>, AppError> {
        self.fetch_disbursement_by("reference", reference).await
    }

    #[instrument(skip(self))]
    async fn get_disbursement_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<Disbursement>, AppError> {
        self.fetch_disbursement_by("payment_id", payment_id).await
    }

    #[instrument(skip(self))]
    async fn list_open_disbursements(
        &self,
        after: Option<&OpenCursor>,
        limit: i64,
    ) -> Result<Vec<Disbursement>, AppError> {
        let sql = format!(
            r#"
            SELECT {} FROM disbursements
            WHERE status IN ('new', 'pending')
              AND ($1::timestamptz IS NULL OR (created_at, id) > ($1, $2::text))
            ORDER BY created_at ASC, id ASC
            LIMIT $3
            "#,
            DISBURSEMENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(after.map(|c| c.created_at))
            .bind(after.map(|c| c.id.as_str()))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        rows.iter().map(Self::row_to_disbursement).collect()
    }

    #[instrument(skip(self))]
    async fn transition_disbursement(
        &self,
        id: &str,
        from: &[DisbursementStatus],
        to: DisbursementStatus,
        released_at: Option<DateTime<Utc>>,
        error: Option<&str>,
    ) -> Result<bool, AppError> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        let result = sqlx::query(
            r#"
            UPDATE disbursements
            SET status = $2,
                payment_released_at = COALESCE($3, payment_released_at),
                last_error = COALESCE($4, last_error),
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($5)
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .bind(released_at)
        .bind(error)
        .bind(&from)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        if !self.disbursement_exists(id).await? {
            return Err(AppError::Database(DatabaseError::NotFound(id.to_string())));
        }
        Ok(false)
    }

    #[instrument(skip(self))]
    async fn record_disbursement_retry(
        &self,
        id: &str,
        tries: i32,
        try_again_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE disbursements SET tries = $2, try_again_at = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(tries)
        .bind(try_again_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn increment_disbursement_tries(&self, id: &str) -> Result<i32, AppError> {
        let row = sqlx::query(
            r#"
            UPDATE disbursements
            SET tries = tries + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING tries
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        row.map(|r| r.get("tries"))
            .ok_or_else(|| AppError::Database(DatabaseError::NotFound(id.to_string())))
    }

    #[instrument(skip(self, log), fields(disbursement_id = %log.disbursement_id))]
    async fn insert_request_log(&self, log: &DisbursementRequestLog) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO disbursement_request_logs
                (id, disbursement_id, gateway, request, response, error, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&log.id)
        .bind(&log.disbursement_id)
        .bind(log.gateway.as_str())
        .bind(&log.request)
        .bind(&log.response)
        .bind(&log.error)
        .bind(log.created_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_request_logs(
        &self,
        disbursement_id: &str,
    ) -> Result<Vec<DisbursementRequestLog>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT id, disbursement_id, gateway, request, response, error, created_at
            FROM disbursement_request_logs
            WHERE disbursement_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(disbursement_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        rows.iter()
            .map(|row| {
                let gateway: String = row.get("gateway");
                Ok(DisbursementRequestLog {
                    id: row.get("id"),
                    disbursement_id: row.get("disbursement_id"),
                    gateway: gateway.parse().map_err(AppError::Serialization)?,
                    request: row.get("request"),
                    response: row.get("response"),
                    error: row.get("error"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn get_failed_disbursement(
        &self,
        payment_id: &str,
    ) -> Result<Option<FailedDisbursement>, AppError> {
        let row = sqlx::query(
            r#"
            SELECT payment_id, transaction_id, business_id, restricted, issues, created_at
            FROM failed_disbursements
            WHERE payment_id = $1
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(row.as_ref().map(Self::row_to_failed))
    }

    #[instrument(skip(self, row), fields(payment_id = %row.payment_id))]
    async fn insert_failed_disbursement(&self, row: &FailedDisbursement) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO failed_disbursements
                (payment_id, transaction_id, business_id, restricted, issues, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (payment_id) DO NOTHING
            "#,
        )
        .bind(&row.payment_id)
        .bind(&row.transaction_id)
        .bind(&row.business_id)
        .bind(&row.restricted)
        .bind(&row.issues)
        .bind(row.created_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn list_failed_disbursements(&self) -> Result<Vec<FailedDisbursement>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT payment_id, transaction_id, business_id, restricted, issues, created_at
            FROM failed_disbursements
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(rows.iter().map(Self::row_to_failed).collect())
    }

    #[instrument(skip(self))]
    async fn delete_failed_disbursement(&self, payment_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM failed_disbursements WHERE payment_id = $1")
            .bind(payment_id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn get_wallet_balance(
        &self,
        account_id: &str,
        bucket: &str,
    ) -> Result<Option<WalletBalance>, AppError> {
        let row = sqlx::query(
            r#"
            SELECT account_id, currency, available, created_at, updated_at
            FROM wallet_balances
            WHERE account_id = $1 AND currency = $2
            "#,
        )
        .bind(account_id)
        .bind(bucket)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(row.as_ref().map(Self::row_to_balance))
    }

    #[instrument(skip(self))]
    async fn ensure_wallet_balance(
        &self,
        account_id: &str,
        bucket: &str,
    ) -> Result<WalletBalance, AppError> {
        sqlx::query(
            r#"
            INSERT INTO wallet_balances (account_id, currency, available)
            VALUES ($1, $2, 0)
            ON CONFLICT (account_id, currency) DO NOTHING
            "#,
        )
        .bind(account_id)
        .bind(bucket)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        self.get_wallet_balance(account_id, bucket)
            .await?
            .ok_or_else(|| {
                AppError::Database(DatabaseError::NotFound(format!(
                    "wallet {}/{}",
                    account_id, bucket
                )))
            })
    }

    #[instrument(skip(self))]
    async fn credit_wallet_balance(
        &self,
        account_id: &str,
        bucket: &str,
        amount: Decimal,
    ) -> Result<WalletBalance, AppError> {
        let row = sqlx::query(
            r#"
            INSERT INTO wallet_balances (account_id, currency, available)
            VALUES ($1, $2, $3)
            ON CONFLICT (account_id, currency)
            DO UPDATE SET available = wallet_balances.available + EXCLUDED.available,
                          updated_at = NOW()
            RETURNING account_id, currency, available, created_at, updated_at
            "#,
        )
        .bind(account_id)
        .bind(bucket)
        .bind(amount)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(Self::row_to_balance(&row))
    }

    #[instrument(skip(self))]
    async fn debit_wallet_balance(
        &self,
        account_id: &str,
        bucket: &str,
        amount: Decimal,
    ) -> Result<Option<WalletBalance>, AppError> {
        let row = sqlx::query(
            r#"
            UPDATE wallet_balances
            SET available = available - $3, updated_at = NOW()
            WHERE account_id = $1 AND currency = $2 AND available >= $3
            RETURNING account_id, currency, available, created_at, updated_at
            "#,
        )
        .bind(account_id)
        .bind(bucket)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(row.as_ref().map(Self::row_to_balance))
    }

    #[instrument(skip(self, entry), fields(account_id = %entry.account_id, bucket = %entry.bucket))]
    async fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), AppError> {
        let kind = match entry.kind {
            LedgerKind::Earning => "earning",
            LedgerKind::Debit => "debit",
        };
        sqlx::query(
            r#"
            INSERT INTO wallet_ledger_entries
                (id, kind, account_id, bucket, amount, transaction_id, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&entry.id)
        .bind(kind)
        .bind(&entry.account_id)
        .bind(&entry.bucket)
        .bind(entry.amount)
        .bind(&entry.transaction_id)
        .bind(&entry.description)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    #[instrument(skip(self, data), fields(event = %data.event, uri = %data.uri))]
    async fn insert_webhook(&self, data: &NewWebhook) -> Result<Webhook, AppError> {
        let id = Uuid::now_v7().to_string();
        let payload = serde_json::to_string(&data.payload)?;
        let sql = format!(
            r#"
            INSERT INTO webhooks (id, event, business_id, uri, payload)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            WEBHOOK_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&id)
            .bind(&data.event)
            .bind(&data.business_id)
            .bind(&data.uri)
            .bind(&payload)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(Self::row_to_webhook(&row))
    }

    #[instrument(skip(self))]
    async fn get_webhook(&self, id: &str) -> Result<Option<Webhook>, AppError> {
        let sql = format!("SELECT {} FROM webhooks WHERE id = $1", WEBHOOK_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(row.as_ref().map(Self::row_to_webhook))
    }

    #[instrument(skip(self))]
    async fn list_due_webhooks(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Webhook>, AppError> {
        let sql = format!(
            r#"
            SELECT {} FROM webhooks
            WHERE is_received = FALSE
              AND is_abandoned = FALSE
              AND (retry_at IS NULL OR retry_at <= $1)
            ORDER BY created_at ASC
            LIMIT $2
            "#,
            WEBHOOK_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(rows.iter().map(Self::row_to_webhook).collect())
    }

    #[instrument(skip(self, attempt), fields(tries = attempt.tries))]
    async fn record_webhook_attempt(
        &self,
        id: &str,
        attempt: &WebhookAttempt,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE webhooks
            SET tries = $2, is_received = $3, is_abandoned = $4, retry_at = $5,
                last_response_status = $6, last_response_body = $7, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempt.tries)
        .bind(attempt.is_received)
        .bind(attempt.is_abandoned)
        .bind(attempt.retry_at)
        .bind(attempt.response_status)
        .bind(&attempt.response_body)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        if result.rows_affected() == 0 {
            return Err(AppError::Database(DatabaseError::NotFound(id.to_string())));
        }
        Ok(())
    }

    #[instrument(skip(self, log), fields(source = %log.source))]
    async fn insert_gateway_webhook_log(&self, log: &GatewayWebhookLog) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO gateway_webhook_logs (id, source, reference, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&log.id)
        .bind(&log.source)
        .bind(&log.reference)
        .bind(&log.payload)
        .bind(log.created_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    #[instrument(skip(self, data), fields(reference = %data.reference))]
    async fn insert_bank_transfer(
        &self,
        data: &RegisterBankTransferRequest,
    ) -> Result<BankTransfer, AppError> {
        let id = Uuid::now_v7().to_string();
        let sql = format!(
            r#"
            INSERT INTO bank_transfers
                (id, reference, account_id, transaction_id, amount, currency, gateway, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            BANK_TRANSFER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&id)
            .bind(&data.reference)
            .bind(&data.account_id)
            .bind(&data.transaction_id)
            .bind(data.amount)
            .bind(normalize_currency(&data.currency))
            .bind(data.gateway.as_str())
            .bind(BankTransferStatus::Pending.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Self::row_to_bank_transfer(&row)
    }

    #[instrument(skip(self))]
    async fn list_pending_bank_transfers(
        &self,
        limit: i64,
    ) -> Result<Vec<BankTransfer>, AppError> {
        let sql = format!(
            r#"
            SELECT {} FROM bank_transfers
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
            BANK_TRANSFER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        rows.iter().map(Self::row_to_bank_transfer).collect()
    }

    #[instrument(skip(self))]
    async fn transition_bank_transfer(
        &self,
        id: &str,
        to: BankTransferStatus,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE bank_transfers
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn increment_bank_transfer_tries(&self, id: &str) -> Result<i32, AppError> {
        let row = sqlx::query(
            r#"
            UPDATE bank_transfers
            SET tries = tries + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING tries
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        row.map(|r| r.get("tries"))
            .ok_or_else(|| AppError::Database(DatabaseError::NotFound(id.to_string())))
    }
}
