//! # Engine Error Types
//!
//! Failures of the orchestration layer, grouped by how the cashier is
//! affected.
//!
//! ## Error Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      What the cashier sees                              │
//! │                                                                         │
//! │  BLOCKING (shown in the modal)        BACKGROUND (data, never Err)      │
//! │  ─────────────────────────────        ────────────────────────────      │
//! │  ValidationError    fix input         ReconciliationWarning             │
//! │  AuthorizationError retry the PIN       sale kept, stock journaled      │
//! │  TransactionError   retry checkout    PersistenceWarning                │
//! │                                         shown only once it persists     │
//! │                                       AuditWarning                      │
//! │                                         void done, log write failed     │
//! │                                                                         │
//! │  ServiceError: the transport-level cause inside the blocking ones       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use till_core::{CoreError, StockDelta, ValidationError};
use till_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type alias for calls through a service port.
pub type ServiceResult<T> = Result<T, ServiceError>;

// =============================================================================
// Service Errors
// =============================================================================

/// A call to an external collaborator (or the local cache) failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Request never got a response (DNS, refused, reset).
    #[error("Service unreachable: {0}")]
    Unreachable(String),

    /// Client-side timeout elapsed.
    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Service answered with a non-success status.
    #[error("Service returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Service answered 2xx but reported failure in the body.
    #[error("Service reported failure: {0}")]
    Rejected(String),

    /// Response body could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Local SQLite cache failed.
    #[error("Local cache error: {0}")]
    Local(String),
}

impl ServiceError {
    /// Returns true if repeating the same call may succeed.
    ///
    /// ## Retryable
    /// - Unreachable, timeouts
    /// - 5xx, 408 and 429 responses
    ///
    /// ## Non-Retryable
    /// - Other 4xx, rejected bodies, undecodable responses
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Unreachable(_) | ServiceError::Timeout { .. } => true,
            ServiceError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            ServiceError::Local(_) => true,
            ServiceError::Rejected(_) | ServiceError::InvalidResponse(_) => false,
        }
    }

    /// Returns true if the client-side timeout fired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ServiceError::Timeout { .. })
    }
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        ServiceError::Local(err.to_string())
    }
}

// =============================================================================
// Authorization Errors
// =============================================================================

/// A void could not be authorized or carried out.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthorizationError {
    /// PIN malformed (not 6 digits).
    #[error(transparent)]
    InvalidPin(#[from] ValidationError),

    /// The verifier answered and said no.
    #[error("PIN not accepted")]
    PinRejected,

    /// The verifier could not be asked (network, timeout).
    #[error("PIN verification unavailable: {0}")]
    Service(#[from] ServiceError),

    /// The adjustment is not in a state that can be authorized.
    #[error(transparent)]
    State(#[from] CoreError),

    /// Cart read-back after the mutation showed no change.
    #[error("Void of {item} did not take effect; nothing was logged")]
    MutationNotApplied { item: String },
}

impl AuthorizationError {
    /// Returns true if the PIN field should be emptied.
    ///
    /// Transport failures keep the PIN so a network hiccup does not make
    /// the manager type it again.
    pub fn clears_pin(&self) -> bool {
        matches!(
            self,
            AuthorizationError::InvalidPin(_) | AuthorizationError::PinRejected
        )
    }

    /// Returns true if the same void can be attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            AuthorizationError::InvalidPin(_) | AuthorizationError::PinRejected => true,
            AuthorizationError::Service(err) => err.is_retryable(),
            AuthorizationError::State(CoreError::AuthorizationInFlight(_)) => true,
            AuthorizationError::State(_) | AuthorizationError::MutationNotApplied { .. } => false,
        }
    }
}

// =============================================================================
// Transaction Errors
// =============================================================================

/// The sale was not recorded. The cart is exactly as it was.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransactionError {
    #[error("Cannot check out an empty cart")]
    EmptyCart,

    #[error("A checkout is already in progress on terminal {0}")]
    InFlight(String),

    #[error("Sale was not recorded: {0}")]
    NotRecorded(#[source] ServiceError),
}

impl TransactionError {
    /// Returns true if the cashier can simply press "Pay" again.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransactionError::NotRecorded(err) => err.is_retryable(),
            TransactionError::EmptyCart | TransactionError::InFlight(_) => false,
        }
    }
}

// =============================================================================
// Non-fatal Warnings
// =============================================================================

/// The sale was recorded but its stock decrement failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationWarning {
    pub transaction_id: String,
    pub receipt_id: Option<String>,
    pub deltas: Vec<StockDelta>,
    pub cause: String,
    /// Local journal row, if journaling itself worked.
    pub journal_id: Option<String>,
}

impl fmt::Display for ReconciliationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stock not updated for sale {} ({} lines): {}",
            self.receipt_id.as_deref().unwrap_or(&self.transaction_id),
            self.deltas.len(),
            self.cause
        )
    }
}

/// The remote cart store has been failing for a while.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceWarning {
    pub terminal: String,
    pub consecutive_failures: u32,
    pub last_error: String,
    pub since: DateTime<Utc>,
}

impl fmt::Display for PersistenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cart for {} saved on this terminal only ({} failed remote saves): {}",
            self.terminal, self.consecutive_failures, self.last_error
        )
    }
}

/// An audit write failed after a void was carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditWarning {
    pub record_id: Uuid,
    pub target: &'static str,
    pub cause: String,
}

impl fmt::Display for AuditWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Void {} not written to {}: {}",
            self.record_id, self.target, self.cause
        )
    }
}

// =============================================================================
// Engine Error
// =============================================================================

/// Top-level engine error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Invalid engine configuration.
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// Invalid service URL.
    #[error("Invalid service URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

impl From<url::ParseError> for EngineError {
    fn from(err: url::ParseError) -> Self {
        EngineError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::ConfigSaveFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_service_errors() {
        assert!(ServiceError::Unreachable("refused".into()).is_retryable());
        assert!(ServiceError::Timeout {
            operation: "Stock update",
            after: Duration::from_secs(5)
        }
        .is_retryable());
        assert!(ServiceError::Status {
            status: 503,
            message: String::new()
        }
        .is_retryable());

        assert!(!ServiceError::Status {
            status: 422,
            message: "bad body".into()
        }
        .is_retryable());
        assert!(!ServiceError::Rejected("duplicate".into()).is_retryable());
    }

    #[test]
    fn test_timeout_display() {
        let err = ServiceError::Timeout {
            operation: "PIN verification",
            after: Duration::from_millis(8000),
        };
        assert_eq!(err.to_string(), "PIN verification timed out after 8000ms");
    }

    #[test]
    fn test_pin_cleared_only_on_rejection() {
        assert!(AuthorizationError::PinRejected.clears_pin());
        assert!(AuthorizationError::InvalidPin(ValidationError::Required {
            field: "PIN".into()
        })
        .clears_pin());

        let hiccup = AuthorizationError::Service(ServiceError::Unreachable("reset".into()));
        assert!(!hiccup.clears_pin());
        assert!(hiccup.is_retryable());
    }

    #[test]
    fn test_transaction_error_retry() {
        let err = TransactionError::NotRecorded(ServiceError::Status {
            status: 500,
            message: "db down".into(),
        });
        assert!(err.is_retryable());
        assert!(err.to_string().contains("500"));
        assert!(!TransactionError::EmptyCart.is_retryable());
    }

    #[test]
    fn test_reconciliation_warning_prefers_receipt() {
        let warning = ReconciliationWarning {
            transaction_id: "tx-9".into(),
            receipt_id: Some("R-1042".into()),
            deltas: vec![],
            cause: "timed out".into(),
            journal_id: None,
        };
        assert!(warning.to_string().contains("R-1042"));
    }
}
