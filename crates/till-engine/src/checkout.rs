//! # Checkout Finalizer
//!
//! Records the sale, then decrements stock. The order is fixed.
//!
//! ## Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  freeze cart (snapshot) ──► submit transaction                          │
//! │                                  │                                      │
//! │                 ┌────────────────┴────────────────┐                     │
//! │                 ▼ failed / timed out              ▼ recorded            │
//! │        restore snapshot, unfreeze        clear cart, invalidate catalog │
//! │        Err(TransactionError)             decrement stock                │
//! │        (stock never touched)                      │                     │
//! │                                         ┌────────┴────────┐             │
//! │                                         ▼ ok              ▼ failed      │
//! │                                      receipt      journal + warning     │
//! │                                                   (sale stands)         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use till_core::{
    PaymentMeta, StockDelta, TransactionLine, TransactionRecord, TransactionRequest,
    TransactionStatus,
};

use crate::cart_store::{CartStore, CheckoutDraft};
use crate::catalog::CatalogCache;
use crate::error::{ReconciliationWarning, TransactionError};
use crate::services::{with_timeout, ReconciliationJournal, StockService, TransactionService};

/// A recorded sale.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutReceipt {
    pub record: TransactionRecord,
    /// Set when the stock decrement failed; inventory needs a manual fix.
    pub reconciliation: Option<ReconciliationWarning>,
}

pub struct CheckoutFinalizer {
    store: Arc<CartStore>,
    catalog: Arc<CatalogCache>,
    transactions: Arc<dyn TransactionService>,
    stock: Arc<dyn StockService>,
    journal: Arc<dyn ReconciliationJournal>,
    transaction_timeout: Duration,
    stock_timeout: Duration,
}

impl CheckoutFinalizer {
    pub fn new(
        store: Arc<CartStore>,
        catalog: Arc<CatalogCache>,
        transactions: Arc<dyn TransactionService>,
        stock: Arc<dyn StockService>,
        journal: Arc<dyn ReconciliationJournal>,
        transaction_timeout: Duration,
        stock_timeout: Duration,
    ) -> Self {
        CheckoutFinalizer {
            store,
            catalog,
            transactions,
            stock,
            journal,
            transaction_timeout,
            stock_timeout,
        }
    }

    /// Sells the current cart.
    ///
    /// ## Errors
    /// - `EmptyCart`, or `InFlight` while another checkout runs
    /// - `NotRecorded` if the transaction service failed; the cart is
    ///   exactly as it was and the call can be repeated
    pub async fn finalize(&self, payment: PaymentMeta) -> Result<CheckoutReceipt, TransactionError> {
        let terminal = self.store.terminal().to_string();
        let draft = self.store.begin_checkout()?;
        let request = build_request(&terminal, &draft, payment);
        info!(
            terminal = %terminal,
            lines = request.items.len(),
            total = %request.total,
            method = ?request.payment_method,
            "Submitting sale"
        );

        let record = match with_timeout(
            "Transaction submission",
            self.transaction_timeout,
            self.transactions.submit_transaction(&request),
        )
        .await
        {
            Ok(record) => record,
            Err(err) => {
                warn!(terminal = %terminal, error = %err, "Sale not recorded, cart restored");
                self.store.abort_checkout(draft.snapshot);
                return Err(TransactionError::NotRecorded(err));
            }
        };

        // The transaction is now the source of truth for this sale
        self.store.complete_checkout();
        self.catalog.invalidate();
        info!(
            terminal = %terminal,
            transaction_id = %record.id,
            receipt_id = record.receipt_id.as_deref().unwrap_or("-"),
            "Sale recorded"
        );

        let deltas: Vec<StockDelta> = draft.snapshot.items.iter().map(StockDelta::from).collect();
        let reconciliation = self.decrement_stock(&terminal, &record, deltas).await;

        Ok(CheckoutReceipt {
            record,
            reconciliation,
        })
    }

    async fn decrement_stock(
        &self,
        terminal: &str,
        record: &TransactionRecord,
        deltas: Vec<StockDelta>,
    ) -> Option<ReconciliationWarning> {
        let cause = match with_timeout(
            "Stock update",
            self.stock_timeout,
            self.stock.decrement_stock(&deltas),
        )
        .await
        {
            Ok(()) => return None,
            Err(err) => err.to_string(),
        };

        warn!(
            terminal = %terminal,
            transaction_id = %record.id,
            lines = deltas.len(),
            error = %cause,
            "Stock not decremented for recorded sale, needs reconciliation"
        );

        let journal_id = match self
            .journal
            .record_discrepancy(terminal, record, &deltas, &cause)
            .await
        {
            Ok(id) => Some(id),
            Err(err) => {
                error!(
                    transaction_id = %record.id,
                    error = %err,
                    "Reconciliation journal write failed"
                );
                None
            }
        };

        Some(ReconciliationWarning {
            transaction_id: record.id.clone(),
            receipt_id: record.receipt_id.clone(),
            deltas,
            cause,
            journal_id,
        })
    }
}

fn build_request(terminal: &str, draft: &CheckoutDraft, payment: PaymentMeta) -> TransactionRequest {
    TransactionRequest {
        terminal: terminal.to_string(),
        items: draft.snapshot.items.iter().map(TransactionLine::from).collect(),
        payment_method: payment.method,
        subtotal: draft.totals.subtotal,
        discount: draft.totals.discount,
        total: draft.totals.total,
        discount_ids: draft.snapshot.discounts.ids(),
        performed_by: payment.performed_by,
        status: TransactionStatus::Completed,
        payment_reference: payment.reference,
    }
}
