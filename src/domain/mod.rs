//! Domain layer containing core business types, traits, and error definitions.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{
    AppError, ConfigError, DatabaseError, ExternalServiceError, GatewayError, ValidationError,
};
pub use traits::{
    DatabaseClient, GatewayClient, IdentityClient, Notifier, TransactionClient, WebhookSender,
};
pub use types::{
    AccountType, Alert, AlertLevel, BankDetails, BankTransfer, BankTransferStatus, BusinessProfile,
    BusinessType, DeliveryResponse, Destination, Disbursement, DisbursementGateway,
    DisbursementRequestLog, DisbursementStatus, ErrorDetail, ErrorResponse, EscrowFlag,
    FailedDisbursement, Gateway, GatewayWebhookData, GatewayWebhookLog, GatewayWebhookPayload,
    HealthResponse, HealthStatus, LedgerEntry, LedgerKind, MonnifyDisbursementCallback,
    MonnifyDisbursementEventData, NewDisbursement, NewWebhook, OpenCursor, PayableTransaction,
    RateLimitResponse, Recipient, RegisterBankTransferRequest, SettlementMode, TransactionStatus,
    TransferInstruction, TransferReceipt, TransferState, TransferStatus, VerificationFlags,
    WalletBalance, Webhook, WebhookAttempt, WebhookEndpoint, WithdrawalRequest,
    normalize_currency,
};
pub use types::{DEFAULT_CURRENCY, ESCROW_PREFIX};
