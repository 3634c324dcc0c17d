//! Domain types with validation support.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use validator::Validate;

/// Default currency applied when none is supplied
pub const DEFAULT_CURRENCY: &str = "NGN";

/// Prefix namespacing the escrow sub-ledger of a wallet
pub const ESCROW_PREFIX: &str = "ESCROW_";

/// Upper-cases a currency code, defaulting to NGN when empty
#[must_use]
pub fn normalize_currency(currency: &str) -> String {
    let trimmed = currency.trim();
    if trimmed.is_empty() {
        DEFAULT_CURRENCY.to_string()
    } else {
        trimmed.to_uppercase()
    }
}

/// Payment gateway a disbursement was routed through
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Gateway {
    #[default]
    Rave,
    Monnify,
    /// Local wallet settlement, no network call
    Wallet,
}

impl Gateway {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rave => "rave",
            Self::Monnify => "monnify",
            Self::Wallet => "wallet",
        }
    }
}

impl std::str::FromStr for Gateway {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rave" | "flutterwave" => Ok(Self::Rave),
            "monnify" => Ok(Self::Monnify),
            "wallet" => Ok(Self::Wallet),
            _ => Err(format!("Invalid gateway: {}", s)),
        }
    }
}

impl std::fmt::Display for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a disbursement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DisbursementStatus {
    /// Row committed, transfer not yet acknowledged by a gateway
    #[default]
    New,
    /// Transfer initiated, awaiting confirmation
    Pending,
    /// Funds released to the recipient
    Completed,
    /// Gateway reported failure
    Failed,
    /// Gateway cancelled the transfer
    Cancelled,
    /// Gateway returned an unrecognised status; needs a human
    Review,
    /// Unsupported currency; settled out-of-band by an operator
    Manual,
    /// Retry budget spent without a conclusive gateway answer
    Exhausted,
}

impl DisbursementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Review => "review",
            Self::Manual => "manual",
            Self::Exhausted => "exhausted",
        }
    }

    /// Never revisited once reached
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Still polled by the reconciliation job
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::New | Self::Pending)
    }
}

impl std::str::FromStr for DisbursementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "review" => Ok(Self::Review),
            "manual" => Ok(Self::Manual),
            "exhausted" => Ok(Self::Exhausted),
            _ => Err(format!("Invalid disbursement status: {}", s)),
        }
    }
}

impl std::fmt::Display for DisbursementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Gateway-reported transfer state, normalised across gateways
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    New,
    Pending,
    Ongoing,
    Completed,
    Failed,
    Cancelled,
    /// Empty or unrecognised status string
    Unknown,
}

impl TransferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Pending => "pending",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a transfer delivers funds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Destination {
    Bank {
        bank_code: String,
        account_number: String,
        account_name: String,
    },
    MobileMoney {
        operator: String,
        phone_number: String,
    },
    Wallet {
        account_id: String,
    },
}

/// Gateway-agnostic transfer request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferInstruction {
    pub reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub debit_currency: String,
    pub destination: Destination,
    pub narration: String,
}

/// Result of a successful transfer initiation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferReceipt {
    pub reference: String,
    /// Gateway-side identifier, when the gateway issues one
    pub gateway_reference: Option<String>,
    pub fee: Option<Decimal>,
    /// Raw request body sent to the gateway, for the audit log
    pub request: JsonValue,
    /// Raw response body returned by the gateway
    pub response: JsonValue,
}

/// Result of a transfer status query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferStatus {
    pub paid: bool,
    pub state: TransferState,
    /// Status string exactly as the gateway reported it
    pub raw_status: String,
    pub amount: Option<Decimal>,
}

impl TransferStatus {
    #[must_use]
    pub fn new(state: TransferState, raw_status: impl Into<String>) -> Self {
        Self {
            paid: state == TransferState::Completed,
            state,
            raw_status: raw_status.into(),
            amount: None,
        }
    }

    #[must_use]
    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// Single outbound payout from escrow or wallet to a recipient
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Disbursement {
    #[schema(example = "0190f1a4-7e7c-7d3e-8f1a-2b3c4d5e6f01")]
    pub id: String,
    /// Reference sent to the gateway; unique
    #[schema(example = "DSB-0190f1a47e7c")]
    pub reference: String,
    pub recipient_account_id: String,
    pub business_id: String,
    /// Originating payment; empty for wallet withdrawals
    pub payment_id: Option<String>,
    pub transaction_id: Option<String>,
    pub milestone_id: Option<String>,
    #[schema(value_type = String, example = "15000.00")]
    pub amount: Decimal,
    #[schema(example = "NGN")]
    pub currency: String,
    pub debit_currency: String,
    pub gateway: Gateway,
    pub status: DisbursementStatus,
    #[schema(value_type = String, example = "50.00")]
    pub fee: Decimal,
    pub tries: i32,
    pub try_again_at: Option<DateTime<Utc>>,
    pub payment_released_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Disbursement {
    /// Reconciled through the wallet-confirm path
    #[must_use]
    pub fn funds_wallet(&self) -> bool {
        self.payment_id.as_deref().is_none_or(str::is_empty)
    }
}

/// Keyset position in the `(created_at, id)` scan over open disbursements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenCursor {
    pub created_at: DateTime<Utc>,
    pub id: String,
}

impl OpenCursor {
    /// Position just past `disbursement`
    #[must_use]
    pub fn after(disbursement: &Disbursement) -> Self {
        Self {
            created_at: disbursement.created_at,
            id: disbursement.id.clone(),
        }
    }
}

/// Data required to create a disbursement row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewDisbursement {
    pub reference: String,
    pub recipient_account_id: String,
    pub business_id: String,
    pub payment_id: Option<String>,
    pub transaction_id: Option<String>,
    pub milestone_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub debit_currency: String,
    pub gateway: Gateway,
    pub status: DisbursementStatus,
    pub fee: Decimal,
    pub payment_released_at: Option<DateTime<Utc>>,
}

impl NewDisbursement {
    #[must_use]
    pub fn into_record(self, id: String, now: DateTime<Utc>) -> Disbursement {
        Disbursement {
            id,
            reference: self.reference,
            recipient_account_id: self.recipient_account_id,
            business_id: self.business_id,
            payment_id: self.payment_id,
            transaction_id: self.transaction_id,
            milestone_id: self.milestone_id,
            amount: self.amount,
            currency: self.currency,
            debit_currency: self.debit_currency,
            gateway: self.gateway,
            status: self.status,
            fee: self.fee,
            tries: 0,
            try_again_at: None,
            payment_released_at: self.payment_released_at,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Ineligibility record; blocks further attempts for the payment while present
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct FailedDisbursement {
    pub payment_id: String,
    pub transaction_id: String,
    pub business_id: String,
    pub restricted: Vec<String>,
    pub issues: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Whether a ledger operation targets the escrow sub-ledger
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EscrowFlag {
    Yes,
    #[default]
    No,
}

impl EscrowFlag {
    /// Balance bucket for an already-normalised currency
    #[must_use]
    pub fn bucket(&self, currency: &str) -> String {
        match self {
            Self::Yes => format!("{}{}", ESCROW_PREFIX, currency),
            Self::No => currency.to_string(),
        }
    }
}

impl std::str::FromStr for EscrowFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yes" => Ok(Self::Yes),
            "no" | "" => Ok(Self::No),
            _ => Err(format!("Invalid escrow flag: {}", s)),
        }
    }
}

/// Available balance for one (account, bucket)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct WalletBalance {
    pub account_id: String,
    /// Currency code or `ESCROW_`-prefixed escrow bucket
    #[schema(example = "ESCROW_NGN")]
    pub currency: String,
    #[schema(value_type = String, example = "2500.00")]
    pub available: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ledger a wallet movement is journaled to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Earning,
    Debit,
}

/// Append-only wallet ledger row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: String,
    pub kind: LedgerKind,
    pub account_id: String,
    pub bucket: String,
    pub amount: Decimal,
    pub transaction_id: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Outbound merchant notification awaiting delivery
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Webhook {
    pub id: String,
    #[schema(example = "disbursement.success")]
    pub event: String,
    pub business_id: String,
    pub uri: String,
    /// Serialized JSON payload
    pub payload: String,
    pub tries: i32,
    pub is_received: bool,
    pub is_abandoned: bool,
    pub retry_at: Option<DateTime<Utc>>,
    pub last_response_status: Option<i32>,
    pub last_response_body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to enqueue a merchant webhook
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewWebhook {
    #[validate(url(message = "Webhook uri must be a valid URL"))]
    pub uri: String,
    #[validate(length(min = 1, message = "Event name is required"))]
    pub event: String,
    pub payload: JsonValue,
    #[validate(length(min = 1, message = "Business id is required"))]
    pub business_id: String,
}

/// Outcome of one delivery attempt, applied to the row by the store
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookAttempt {
    pub tries: i32,
    pub is_received: bool,
    pub is_abandoned: bool,
    /// Next earliest attempt while pending, the attempt time once terminal
    pub retry_at: DateTime<Utc>,
    pub response_status: Option<i32>,
    pub response_body: Option<String>,
}

/// HTTP response captured from a merchant endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResponse {
    pub status: u16,
    pub body: String,
}

impl DeliveryResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Audit row for one gateway initiation attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisbursementRequestLog {
    pub id: String,
    pub disbursement_id: String,
    pub gateway: Gateway,
    pub request: JsonValue,
    pub response: Option<JsonValue>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Raw inbound gateway webhook, persisted after signature verification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayWebhookLog {
    pub id: String,
    pub source: String,
    pub reference: Option<String>,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

/// Confirmation status of an inbound bank transfer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BankTransferStatus {
    #[default]
    Pending,
    Confirmed,
    Failed,
}

impl BankTransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for BankTransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid bank transfer status: {}", s)),
        }
    }
}

/// Inbound escrow funding by bank transfer, awaiting gateway confirmation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct BankTransfer {
    pub id: String,
    pub reference: String,
    pub account_id: String,
    pub transaction_id: Option<String>,
    #[schema(value_type = String, example = "15000.00")]
    pub amount: Decimal,
    pub currency: String,
    pub gateway: Gateway,
    pub status: BankTransferStatus,
    pub tries: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to track an inbound bank transfer
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterBankTransferRequest {
    #[validate(length(min = 1, message = "Reference is required"))]
    pub reference: String,
    #[validate(length(min = 1, message = "Account id is required"))]
    pub account_id: String,
    pub transaction_id: Option<String>,
    #[schema(value_type = String, example = "15000.00")]
    pub amount: Decimal,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub gateway: Gateway,
}

/// Wallet withdrawal to the owner's bank account
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct WithdrawalRequest {
    #[validate(length(min = 1, message = "Business id is required"))]
    pub business_id: String,
    #[schema(value_type = String, example = "5000.00")]
    pub amount: Decimal,
    #[serde(default)]
    #[schema(example = "NGN")]
    pub currency: String,
}

// ---------------------------------------------------------------------------
// External collaborator data
// ---------------------------------------------------------------------------

/// Transaction ready for payout, as reported by the transaction service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayableTransaction {
    pub transaction_id: String,
    pub payment_id: String,
    pub business_id: String,
    pub recipient_account_id: String,
    pub milestone_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub is_paid: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Individual,
    Business,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BusinessType {
    SocialCommerce,
    #[default]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BankDetails {
    pub currency: String,
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
}

/// KYC checks recorded by the identity service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VerificationFlags {
    #[serde(default)]
    pub bvn: bool,
    #[serde(default)]
    pub id_document: bool,
    #[serde(default)]
    pub cac: bool,
    #[serde(default)]
    pub utility_bill: bool,
}

/// Payout recipient profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recipient {
    pub account_id: String,
    pub account_type: Option<AccountType>,
    #[serde(default)]
    pub business_type: BusinessType,
    /// ISO country code of domicile
    pub country: String,
    #[serde(default)]
    pub bank_details: Vec<BankDetails>,
    #[serde(default)]
    pub verification: VerificationFlags,
    pub mobile_money_operator: Option<String>,
    pub phone_number: Option<String>,
}

impl Recipient {
    #[must_use]
    pub fn bank_details_for(&self, currency: &str) -> Option<&BankDetails> {
        self.bank_details
            .iter()
            .find(|b| b.currency.eq_ignore_ascii_case(currency))
    }

    #[must_use]
    pub fn is_nigerian(&self) -> bool {
        matches!(self.country.to_ascii_uppercase().as_str(), "NG" | "NGA" | "NIGERIA")
    }
}

/// Payout channel a business disburses through
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisbursementGateway {
    #[default]
    Rave,
    Monnify,
    MobileMoney,
}

impl DisbursementGateway {
    /// Transfer gateway that carries this channel
    #[must_use]
    pub fn transfer_gateway(&self) -> Gateway {
        match self {
            Self::Monnify => Gateway::Monnify,
            Self::Rave | Self::MobileMoney => Gateway::Rave,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SettlementMode {
    #[default]
    Bank,
    Wallet,
}

/// Merchant callback registration for one event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookEndpoint {
    pub event: String,
    pub uri: String,
}

/// Merchant configuration relevant to disbursement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessProfile {
    pub business_id: String,
    #[serde(default)]
    pub disbursement_gateway: DisbursementGateway,
    #[serde(default)]
    pub settlement_mode: SettlementMode,
    #[serde(default)]
    pub verification_waived: bool,
    /// Flat charge applied per disbursement
    #[serde(default)]
    pub disbursement_charge: Decimal,
    #[serde(default)]
    pub webhooks: Vec<WebhookEndpoint>,
}

impl BusinessProfile {
    pub fn endpoints_for<'a>(&'a self, event: &'a str) -> impl Iterator<Item = &'a WebhookEndpoint> {
        self.webhooks.iter().filter(move |w| w.event == event)
    }
}

/// Upstream transaction status transitions requested by the engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    DisbursementPending,
    Disbursed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DisbursementPending => "disbursement_pending",
            Self::Disbursed => "disbursed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

/// Fire-and-forget operator alert
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Info, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Warning, title, message)
    }

    pub fn critical(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Critical, title, message)
    }

    fn new(level: AlertLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound gateway callbacks
// ---------------------------------------------------------------------------

/// Generic gateway transfer webhook body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GatewayWebhookPayload {
    #[serde(default)]
    pub event: Option<String>,
    pub data: GatewayWebhookData,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GatewayWebhookData {
    pub reference: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Monnify disbursement callback
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonnifyDisbursementCallback {
    #[schema(example = "FAILED_DISBURSEMENT")]
    pub event_type: String,
    pub event_data: MonnifyDisbursementEventData,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonnifyDisbursementEventData {
    pub reference: String,
    #[schema(value_type = String, example = "15000.00")]
    pub amount: Decimal,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub transaction_description: Option<String>,
}

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// Health status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub database: HealthStatus,
    /// Worst status across configured gateways
    pub gateways: HealthStatus,
    pub timestamp: DateTime<Utc>,
    #[schema(example = "0.1.0")]
    pub version: String,
}

impl HealthResponse {
    #[must_use]
    pub fn new(database: HealthStatus, gateways: HealthStatus) -> Self {
        let status = match (&database, &gateways) {
            (HealthStatus::Healthy, HealthStatus::Healthy) => HealthStatus::Healthy,
            (HealthStatus::Unhealthy, _) => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        };
        Self {
            status,
            database,
            gateways,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Error response structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    #[schema(example = "validation_error")]
    pub r#type: String,
    pub message: String,
}

/// Rate limit exceeded response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RateLimitResponse {
    pub error: ErrorDetail,
    /// Seconds until a request would be admitted
    #[schema(example = 1)]
    pub retry_after: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn test_disbursement_status_display_and_parsing() {
        let statuses = vec![
            (DisbursementStatus::New, "new"),
            (DisbursementStatus::Pending, "pending"),
            (DisbursementStatus::Completed, "completed"),
            (DisbursementStatus::Failed, "failed"),
            (DisbursementStatus::Cancelled, "cancelled"),
            (DisbursementStatus::Review, "review"),
            (DisbursementStatus::Manual, "manual"),
            (DisbursementStatus::Exhausted, "exhausted"),
        ];

        for (status, string) in statuses {
            assert_eq!(status.as_str(), string);
            assert_eq!(status.to_string(), string);
            assert_eq!(DisbursementStatus::from_str(string).unwrap(), status);
        }

        assert!(DisbursementStatus::from_str("settled").is_err());
    }

    #[test]
    fn test_terminal_and_open_statuses() {
        assert!(DisbursementStatus::Completed.is_terminal());
        assert!(DisbursementStatus::Cancelled.is_terminal());
        assert!(!DisbursementStatus::Failed.is_terminal());
        assert!(!DisbursementStatus::Manual.is_terminal());

        assert!(DisbursementStatus::New.is_open());
        assert!(DisbursementStatus::Pending.is_open());
        assert!(!DisbursementStatus::Review.is_open());
        assert!(!DisbursementStatus::Exhausted.is_open());
    }

    #[test]
    fn test_normalize_currency() {
        assert_eq!(normalize_currency("ngn"), "NGN");
        assert_eq!(normalize_currency(" usd "), "USD");
        assert_eq!(normalize_currency(""), "NGN");
    }

    #[test]
    fn test_escrow_bucket_resolution() {
        assert_eq!(EscrowFlag::Yes.bucket("NGN"), "ESCROW_NGN");
        assert_eq!(EscrowFlag::No.bucket("NGN"), "NGN");
        assert_eq!(EscrowFlag::from_str("YES").unwrap(), EscrowFlag::Yes);
        assert_eq!(EscrowFlag::from_str("").unwrap(), EscrowFlag::No);
        assert!(EscrowFlag::from_str("maybe").is_err());
    }

    #[test]
    fn test_gateway_parsing_accepts_flutterwave_alias() {
        assert_eq!(Gateway::from_str("Flutterwave").unwrap(), Gateway::Rave);
        assert_eq!(Gateway::from_str("monnify").unwrap(), Gateway::Monnify);
        assert!(Gateway::from_str("paystack").is_err());
    }

    #[test]
    fn test_funds_wallet_when_payment_id_empty() {
        let mut d = NewDisbursement {
            reference: "ref".into(),
            recipient_account_id: "acct".into(),
            business_id: "biz".into(),
            payment_id: None,
            transaction_id: None,
            milestone_id: None,
            amount: dec!(100),
            currency: "NGN".into(),
            debit_currency: "NGN".into(),
            gateway: Gateway::Rave,
            status: DisbursementStatus::New,
            fee: dec!(0),
            payment_released_at: None,
        }
        .into_record("d-1".into(), Utc::now());
        assert!(d.funds_wallet());

        d.payment_id = Some(String::new());
        assert!(d.funds_wallet());

        d.payment_id = Some("pay-1".into());
        assert!(!d.funds_wallet());
    }

    #[test]
    fn test_recipient_bank_details_lookup_is_case_insensitive() {
        let recipient = Recipient {
            account_id: "acct".into(),
            account_type: Some(AccountType::Individual),
            business_type: BusinessType::Other,
            country: "ng".into(),
            bank_details: vec![BankDetails {
                currency: "ngn".into(),
                bank_code: "058".into(),
                account_number: "0123456789".into(),
                account_name: "Ada Obi".into(),
            }],
            verification: VerificationFlags::default(),
            mobile_money_operator: None,
            phone_number: None,
        };
        assert!(recipient.bank_details_for("NGN").is_some());
        assert!(recipient.bank_details_for("USD").is_none());
        assert!(recipient.is_nigerian());
    }

    #[test]
    fn test_new_webhook_validation() {
        let ok = NewWebhook {
            uri: "https://merchant.example.com/hooks".into(),
            event: "disbursement.success".into(),
            payload: serde_json::json!({}),
            business_id: "biz".into(),
        };
        assert!(ok.validate().is_ok());

        let bad = NewWebhook {
            uri: "not a url".into(),
            ..ok
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_monnify_callback_deserializes_camel_case() {
        let body = serde_json::json!({
            "eventType": "FAILED_DISBURSEMENT",
            "eventData": {
                "reference": "DSB-1",
                "amount": 1500.5,
                "status": "FAILED"
            }
        });
        let callback: MonnifyDisbursementCallback = serde_json::from_value(body).unwrap();
        assert_eq!(callback.event_type, "FAILED_DISBURSEMENT");
        assert_eq!(callback.event_data.reference, "DSB-1");
        assert_eq!(callback.event_data.amount, dec!(1500.5));
    }
}
