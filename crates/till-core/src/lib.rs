//! # till-core: Pure Business Logic for the Till POS terminal
//!
//! Everything a terminal needs to decide about a sale, with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Till POS Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              till-engine (async orchestration)                  │   │
//! │  │   CartStore ──► VoidAuthorizer ──► CheckoutFinalizer           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ till-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌────────────┐          │   │
//! │  │   │  money  │ │  cart   │ │ discount │ │ adjustment │          │   │
//! │  │   │  Money  │ │  Cart   │ │ grammar  │ │  Pending → │          │   │
//! │  │   │  cents  │ │LineItem │ │ scopes   │ │ AwaitAuth  │          │   │
//! │  │   └─────────┘ └─────────┘ └──────────┘ └────────────┘          │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Catalog products, line items, transaction and void records
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`cart`] - The terminal cart and its stock ceilings
//! - [`discount`] - Discount value grammar, applicability and stacking
//! - [`adjustment`] - PIN-gated quantity-change state machine
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use till_core::discount::DiscountValue;
//! use till_core::money::Money;
//!
//! let value: DiscountValue = "15% OFF".parse().unwrap();
//! let off = value.amount_for(Money::from_cents(10_000));
//! assert_eq!(off.cents(), 1_500);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod adjustment;
pub mod cart;
pub mod discount;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartTotals};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct line items allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line item.
///
/// Also the ceiling for products that carry no stock information at all.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Number of digits in a manager/employee authorization PIN.
pub const PIN_LENGTH: usize = 6;
