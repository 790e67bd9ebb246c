//! # Service Ports
//!
//! The engine's view of its collaborators. Every external system is an
//! object-safe async trait so the flows can run against HTTP in production
//! and in-memory fakes in tests.
//!
//! ## Ports
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Port                    Production impl      Used by                   │
//! │  ──────────────────────  ───────────────────  ───────────────────────   │
//! │  ProductCatalog          HttpBackend          CatalogCache              │
//! │  DiscountCatalog         HttpBackend          CatalogCache              │
//! │  CartRemoteStore         HttpBackend          CartStore, CartPersister  │
//! │  LocalCartCache          till_db::Database    CartStore, CartPersister  │
//! │  TransactionService      HttpBackend          Checkout, bulk voids      │
//! │  StockService            HttpBackend          CheckoutFinalizer         │
//! │  PinVerifier             HttpBackend          VoidAuthorizer            │
//! │  VoidLog                 HttpBackend          VoidAuthorizer            │
//! │  ReconciliationJournal   till_db::Database    CheckoutFinalizer         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use till_core::discount::DiscountDefinition;
use till_core::{
    Approver, LineItem, Product, StockDelta, TransactionRecord, TransactionRequest, VoidRecord,
};
use till_db::{Database, NewDiscrepancy};

use crate::error::{ServiceError, ServiceResult};
use crate::http::HttpBackend;

// =============================================================================
// Catalog
// =============================================================================

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn fetch_products(&self) -> ServiceResult<Vec<Product>>;
}

/// Returns every discount; callers filter to active ones.
#[async_trait]
pub trait DiscountCatalog: Send + Sync {
    async fn fetch_discounts(&self) -> ServiceResult<Vec<DiscountDefinition>>;
}

// =============================================================================
// Cart Persistence
// =============================================================================

/// The shared cart store, keyed by terminal. `save_cart` replaces the list.
#[async_trait]
pub trait CartRemoteStore: Send + Sync {
    async fn load_cart(&self, terminal: &str) -> ServiceResult<Vec<LineItem>>;

    async fn save_cart(&self, terminal: &str, items: &[LineItem]) -> ServiceResult<()>;
}

/// The terminal's own mirror of its cart.
#[async_trait]
pub trait LocalCartCache: Send + Sync {
    async fn load_local(&self, terminal: &str) -> ServiceResult<Option<Vec<LineItem>>>;

    async fn save_local(&self, terminal: &str, items: &[LineItem]) -> ServiceResult<()>;
}

// =============================================================================
// Sale & Stock
// =============================================================================

#[async_trait]
pub trait TransactionService: Send + Sync {
    async fn submit_transaction(
        &self,
        request: &TransactionRequest,
    ) -> ServiceResult<TransactionRecord>;
}

#[async_trait]
pub trait StockService: Send + Sync {
    async fn decrement_stock(&self, deltas: &[StockDelta]) -> ServiceResult<()>;
}

/// Where failed stock decrements are written down for manual correction.
#[async_trait]
pub trait ReconciliationJournal: Send + Sync {
    /// Returns the journal entry id.
    async fn record_discrepancy(
        &self,
        terminal: &str,
        record: &TransactionRecord,
        deltas: &[StockDelta],
        error: &str,
    ) -> ServiceResult<String>;
}

// =============================================================================
// Authorization & Audit
// =============================================================================

/// What the PIN service decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinVerdict {
    Approved(Approver),
    Rejected,
}

#[async_trait]
pub trait PinVerifier: Send + Sync {
    /// `hint` optionally names who is expected to authorize.
    async fn verify_pin(&self, pin: &str, hint: Option<&str>) -> ServiceResult<PinVerdict>;
}

#[async_trait]
pub trait VoidLog: Send + Sync {
    async fn submit_void(&self, record: &VoidRecord) -> ServiceResult<()>;
}

// =============================================================================
// Timeouts
// =============================================================================

/// Runs `call`, failing with [`ServiceError::Timeout`] once `limit` passes.
pub(crate) async fn with_timeout<T, F>(
    operation: &'static str,
    limit: Duration,
    call: F,
) -> ServiceResult<T>
where
    F: Future<Output = ServiceResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout {
            operation,
            after: limit,
        }),
    }
}

// =============================================================================
// Local Implementations
// =============================================================================

#[async_trait]
impl LocalCartCache for Database {
    async fn load_local(&self, terminal: &str) -> ServiceResult<Option<Vec<LineItem>>> {
        let cached = self.carts().load(terminal).await?;
        Ok(cached.map(|cart| cart.items))
    }

    async fn save_local(&self, terminal: &str, items: &[LineItem]) -> ServiceResult<()> {
        self.carts().save(terminal, items).await?;
        Ok(())
    }
}

#[async_trait]
impl ReconciliationJournal for Database {
    async fn record_discrepancy(
        &self,
        terminal: &str,
        record: &TransactionRecord,
        deltas: &[StockDelta],
        error: &str,
    ) -> ServiceResult<String> {
        let entry = self
            .reconciliation()
            .record(NewDiscrepancy {
                terminal,
                transaction_id: &record.id,
                receipt_id: record.receipt_id.as_deref(),
                deltas,
                error,
            })
            .await?;
        Ok(entry.id)
    }
}

// =============================================================================
// Service Bundle
// =============================================================================

/// The remote collaborators, as shared trait objects.
#[derive(Clone)]
pub struct Services {
    pub products: Arc<dyn ProductCatalog>,
    pub discounts: Arc<dyn DiscountCatalog>,
    pub carts: Arc<dyn CartRemoteStore>,
    pub transactions: Arc<dyn TransactionService>,
    pub stock: Arc<dyn StockService>,
    pub pins: Arc<dyn PinVerifier>,
    pub voids: Arc<dyn VoidLog>,
}

impl Services {
    /// Every port served by one HTTP backend.
    pub fn http(backend: HttpBackend) -> Self {
        let backend = Arc::new(backend);
        Services {
            products: backend.clone(),
            discounts: backend.clone(),
            carts: backend.clone(),
            transactions: backend.clone(),
            stock: backend.clone(),
            pins: backend.clone(),
            voids: backend,
        }
    }
}
