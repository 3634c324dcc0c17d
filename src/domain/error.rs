//! Error types for the disbursement engine.

use thiserror::Error;

/// Top-level application error
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("External service error: {0}")]
    ExternalService(#[from] ExternalServiceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Insufficient funds in {bucket} for account {account_id}")]
    InsufficientFunds { account_id: String, bucket: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Persistence errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound(err.to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::Duplicate(db_err.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Connection(err.to_string())
            }
            _ => Self::Query(err.to_string()),
        }
    }
}

/// Payment gateway errors
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway connection failed: {0}")]
    Connection(String),

    #[error("Gateway request timed out: {0}")]
    Timeout(String),

    #[error("Gateway rejected request ({status_code}): {message}")]
    Rejected { status_code: u16, message: String },

    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),

    #[error("Gateway not configured: {0}")]
    NotConfigured(String),

    #[error("Transfer not found: {0}")]
    TransferNotFound(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Connection(err.to_string())
        }
    }
}

/// Errors from sibling services (identity, transaction, alerting)
#[derive(Debug, Error)]
pub enum ExternalServiceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error ({status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Service misconfigured: {0}")]
    Configuration(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for ExternalServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::ParseError(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
}

/// Input validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("{0}")]
    Multiple(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl AppError {
    /// Whether a retry on a later tick may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Gateway(GatewayError::Connection(_) | GatewayError::Timeout(_))
                | AppError::ExternalService(
                    ExternalServiceError::Network(_)
                        | ExternalServiceError::Timeout(_)
                        | ExternalServiceError::Unavailable(_)
                )
                | AppError::Database(DatabaseError::Connection(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AppError::Gateway(GatewayError::Timeout("slow".into())).is_transient());
        assert!(AppError::Database(DatabaseError::Connection("down".into())).is_transient());
        assert!(
            !AppError::Gateway(GatewayError::Rejected {
                status_code: 400,
                message: "bad account".into()
            })
            .is_transient()
        );
        assert!(!AppError::Authentication("bad signature".into()).is_transient());
    }

    #[test]
    fn test_error_display_nests_inner_message() {
        let err = AppError::from(DatabaseError::NotFound("disbursement d-1".into()));
        assert_eq!(
            err.to_string(),
            "Database error: Record not found: disbursement d-1"
        );
    }
}
