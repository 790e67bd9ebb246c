//! # Validation Module
//!
//! Input validation for everything the cashier types.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Terminal UI                                                   │
//! │  ├── Numeric keypad for PIN and quantity                               │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  ├── Quantity bounds, PIN format, discount code shape                  │
//! │  └── Rejected before any service is called                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Cart rules (cart.rs)                                          │
//! │  └── Stock ceilings, duplicate lines, cart size                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use till_core::validation::{validate_pin, validate_quantity};
//!
//! validate_quantity(5).unwrap();
//! validate_pin("482913").unwrap();
//! assert!(validate_pin("48291").is_err());
//! ```

use crate::error::ValidationError;
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY, PIN_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest discount code accepted at the code prompt.
pub const MAX_DISCOUNT_CODE_LENGTH: usize = 32;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity value.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates cart size (number of distinct lines) before adding one more.
pub fn validate_cart_size(current_items: usize) -> ValidationResult<()> {
    if current_items >= MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart items".to_string(),
            min: 0,
            max: MAX_CART_ITEMS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates an authorization PIN.
///
/// ## Rules
/// - Exactly 6 characters
/// - ASCII digits only
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Void Authorization Modal                                               │
/// │                                                                         │
/// │  Manager enters PIN: ••••••                                             │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_pin() ← THIS FUNCTION                                        │
/// │       │                                                                 │
/// │       ├── wrong length / not digits → modal stays, no network call     │
/// │       │                                                                 │
/// │       └── OK → PinVerifier service                                     │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_pin(pin: &str) -> ValidationResult<()> {
    if pin.is_empty() {
        return Err(ValidationError::Required {
            field: "PIN".to_string(),
        });
    }

    if pin.len() != PIN_LENGTH || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "PIN".to_string(),
            reason: format!("must be exactly {} digits", PIN_LENGTH),
        });
    }

    Ok(())
}

/// Validates a discount code typed at the code prompt.
///
/// ## Returns
/// The trimmed code.
pub fn validate_discount_code(code: &str) -> ValidationResult<String> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "discount code".to_string(),
        });
    }

    if code.chars().count() > MAX_DISCOUNT_CODE_LENGTH {
        return Err(ValidationError::TooLong {
            field: "discount code".to_string(),
            max: MAX_DISCOUNT_CODE_LENGTH,
        });
    }

    if code.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "discount code".to_string(),
            reason: "must not contain spaces".to_string(),
        });
    }

    Ok(code.to_string())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_cart_size() {
        assert!(validate_cart_size(0).is_ok());
        assert!(validate_cart_size(99).is_ok());
        assert!(validate_cart_size(100).is_err());
    }

    #[test]
    fn test_validate_pin() {
        assert!(validate_pin("000000").is_ok());
        assert!(validate_pin("482913").is_ok());

        assert!(matches!(
            validate_pin(""),
            Err(ValidationError::Required { .. })
        ));
        assert!(validate_pin("12345").is_err());
        assert!(validate_pin("1234567").is_err());
        assert!(validate_pin("12a456").is_err());
        // Non-ASCII digits are not PIN digits.
        assert!(validate_pin("١٢٣٤٥٦").is_err());
    }

    #[test]
    fn test_validate_discount_code() {
        assert_eq!(validate_discount_code("  SUMMER15 ").unwrap(), "SUMMER15");
        assert!(validate_discount_code("   ").is_err());
        assert!(validate_discount_code("TWO WORDS").is_err());
        assert!(validate_discount_code(&"X".repeat(40)).is_err());
    }
}
