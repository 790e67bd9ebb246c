//! # till-engine: Cart, Void and Checkout Orchestration for Till POS
//!
//! The async layer of a terminal. It owns the in-memory cart, keeps it
//! persisted, and runs the two flows that talk to the outside world.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           TillEngine                                    │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    CartStore (one per terminal)                  │  │
//! │  │  Cart + AppliedDiscounts + QuantityAdjustments behind one lock   │  │
//! │  └──────────┬──────────────────────┬───────────────────┬────────────┘  │
//! │             │ schedule             │                   │               │
//! │             ▼                      ▼                   ▼               │
//! │  ┌────────────────────┐  ┌──────────────────┐  ┌────────────────────┐  │
//! │  │  CartPersister     │  │  VoidAuthorizer  │  │ CheckoutFinalizer  │  │
//! │  │                    │  │                  │  │                    │  │
//! │  │ debounce, local    │  │ PIN ──► mutate   │  │ record sale ──►    │  │
//! │  │ then remote with   │  │ ──► read back    │  │ clear cart ──►     │  │
//! │  │ backoff            │  │ ──► void log     │  │ decrement stock    │  │
//! │  └─────────┬──────────┘  └────────┬─────────┘  └─────────┬──────────┘  │
//! │            │                      │                      │             │
//! │  ┌─────────▼──────────────────────▼──────────────────────▼──────────┐  │
//! │  │      Service ports (services.rs): HttpBackend | till_db          │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - `TillEngine`, wiring for one terminal
//! - [`cart_store`] - The authoritative cart and its mutation pipeline
//! - [`void_flow`] - PIN-authorized reductions, removals and bulk voids
//! - [`checkout`] - Sale recording and stock decrement
//! - [`persistence`] - Debounced dual-backend cart persistence
//! - [`catalog`] - Cached product and discount catalogs
//! - [`services`] - Ports to every external system
//! - [`http`] - reqwest implementation of the remote ports
//! - [`config`] - Engine configuration (TOML + environment)
//! - [`error`] - Error taxonomy and non-fatal warnings
//! - [`telemetry`] - Tracing subscriber setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use till_engine::{EngineConfig, TillEngine, VoidRequest};
//!
//! till_engine::telemetry::init_tracing();
//! let engine = TillEngine::start(EngineConfig::load_or_default(None)).await?;
//!
//! let store = engine.store();
//! store.add_product(&product, Some("M"), 2)?;
//!
//! let receipt = engine.finalizer().finalize(payment).await?;
//! if let Some(warning) = receipt.reconciliation {
//!     tracing::warn!(%warning, "Inventory needs a manual fix");
//! }
//! engine.shutdown().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart_store;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod persistence;
pub mod services;
pub mod telemetry;
pub mod void_flow;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use cart_store::{CartChange, CartSnapshot, CartSource, CartStore};
pub use catalog::CatalogCache;
pub use checkout::{CheckoutFinalizer, CheckoutReceipt};
pub use config::{EngineConfig, ServiceSettings};
pub use engine::TillEngine;
pub use error::{
    AuditWarning, AuthorizationError, EngineError, EngineResult, PersistenceWarning,
    ReconciliationWarning, ServiceError, ServiceResult, TransactionError,
};
pub use http::HttpBackend;
pub use persistence::{CartPersister, PersistenceStatus, PersisterHandle};
pub use services::Services;
pub use void_flow::{VoidAuthorizer, VoidOutcome, VoidRequest};
