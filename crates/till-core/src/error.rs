//! # Error Types
//!
//! Domain-specific error types for till-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  till-core errors (this file)                                          │
//! │  ├── CoreError        - Cart / adjustment rule violations              │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  till-db errors (separate crate)                                       │
//! │  └── DbError          - Local cache failures                           │
//! │                                                                         │
//! │  till-engine errors                                                    │
//! │  └── EngineError      - Authorization, transaction, service failures   │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant here is a ValidationError in the terminal's taxonomy:
//! surfaced immediately, not retryable without the cashier correcting input.

use thiserror::Error;

use crate::discount::Inapplicable;
use crate::types::LineKey;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Requested quantity exceeds the size-specific (or product-level) stock.
    ///
    /// ## User Workflow
    /// ```text
    /// Cart: Tee (M) x3, stock for M = 5
    ///      │
    ///      ▼
    /// set_quantity(Tee (M), 6)
    ///      │
    ///      ▼
    /// InsufficientStock { in_cart: 3, available: 5, requested: 6 }
    ///      │
    ///      ▼
    /// UI shows: "Insufficient stock for Tee (M): 3 already in cart, 5 available"
    /// ```
    #[error("Insufficient stock for {item}: {in_cart} already in cart, {available} available")]
    InsufficientStock {
        item: String,
        available: i64,
        in_cart: i64,
        requested: i64,
    },

    /// The same (product, size) is already in the cart.
    ///
    /// Callers prompt the cashier and then call the explicit merge operation.
    #[error("{0} is already in the cart")]
    DuplicateLineItem(LineKey),

    /// No line item with this key exists.
    #[error("Line item not found: {0}")]
    LineItemNotFound(LineKey),

    /// Cart has exceeded maximum allowed line items.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Item quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// A quantity adjustment was confirmed or authorized without being started.
    #[error("No pending quantity change for {0}")]
    NoPendingChange(LineKey),

    /// An adjustment action does not apply in its current state.
    #[error("Cannot {action} while {key} is {state}")]
    InvalidTransition {
        key: String,
        state: &'static str,
        action: &'static str,
    },

    /// The discount does not fit the current cart.
    #[error(transparent)]
    DiscountNotApplicable(#[from] Inapplicable),

    /// No active discount has this code.
    #[error("No active discount with code {0}")]
    DiscountNotFound(String),

    /// A second authorization was triggered while one is still running.
    #[error("Authorization already in progress for {0}")]
    AuthorizationInFlight(String),

    /// The adjustment was cancelled while its PIN was being verified.
    #[error("Void of {0} was cancelled before authorization completed")]
    AdjustmentCancelled(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Used for early validation before business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., a PIN with letters in it).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Product has sizes but none was selected.
    #[error("Select a size for {product}")]
    SizeRequired { product: String },

    /// Selected size does not exist for the product.
    #[error("{product} is not available in size {size}")]
    UnknownSize { product: String, size: String },

    /// A size was selected for a product that has no sizes.
    #[error("{product} does not come in sizes (got {size})")]
    SizeNotApplicable { product: String, size: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_message_reports_cart_quantity() {
        let err = CoreError::InsufficientStock {
            item: "Tee (M)".to_string(),
            available: 5,
            in_cart: 3,
            requested: 6,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Tee (M): 3 already in cart, 5 available"
        );
    }

    #[test]
    fn test_duplicate_message_uses_line_key() {
        let err = CoreError::DuplicateLineItem(LineKey::new("p-1", Some("M")));
        assert_eq!(err.to_string(), "p-1 [M] is already in the cart");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::SizeRequired {
            product: "Tee".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
