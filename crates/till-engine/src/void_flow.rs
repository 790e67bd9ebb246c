//! # Void Authorization
//!
//! Carries a confirmed decrease (or a bulk selection) through PIN
//! verification, the cart mutation and the audit log.
//!
//! ## Ordering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  validate PIN format ──► verify PIN ──► mutate cart ──► read back       │
//! │        │                    │               │               │           │
//! │        ▼                    ▼               ▼               ▼           │
//! │   InvalidPin          PinRejected /     line changed     unchanged:     │
//! │   (no call)           Service error     underneath:      abort, NO log  │
//! │                       → AwaitingAuth    abort, NO log                   │
//! │                                                             │           │
//! │                                                   changed:  ▼           │
//! │                                              VoidRecord ──► void log    │
//! │                                         bulk: + Voided transaction      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A VoidRecord is built only from a read-back that shows the line reduced
//! or gone, taken under the same lock as the mutation. Bulk records list
//! the lines as they were when removed. Audit submission failures after
//! that point are warnings: the void happened and is not undone.
//!
//! Cancelling while the PIN is being verified retires the ticket; the
//! verified authorization then changes nothing.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use till_core::validation::validate_pin;
use till_core::{
    Approver, CoreError, LineKey, Money, PaymentMethod, TransactionLine, TransactionRecord,
    TransactionRequest, TransactionStatus, VoidReason, VoidRecord, VoidSource, VoidedLine,
};

use crate::cart_store::CartStore;
use crate::error::{AuditWarning, AuthorizationError};
use crate::services::{with_timeout, PinVerdict, PinVerifier, TransactionService, VoidLog};

const VOID_LOG: &str = "void log";
const TRANSACTION_LOG: &str = "transaction log";

/// What the cashier entered in the authorization modal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoidRequest {
    pub reason: VoidReason,
    pub note: Option<String>,
    pub pin: String,
    /// Who is expected to authorize, if the cashier picked someone.
    pub approver_hint: Option<String>,
}

impl VoidRequest {
    pub fn new(reason: VoidReason, pin: impl Into<String>) -> Self {
        VoidRequest {
            reason,
            note: None,
            pin: pin.into(),
            approver_hint: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// A carried-out void.
#[derive(Debug, Clone, PartialEq)]
pub struct VoidOutcome {
    pub record: VoidRecord,
    /// The aggregate `Voided` transaction (bulk voids only).
    pub transaction: Option<TransactionRecord>,
    /// Audit writes that failed after the cart was changed.
    pub warnings: Vec<AuditWarning>,
}

pub struct VoidAuthorizer {
    store: Arc<CartStore>,
    pins: Arc<dyn PinVerifier>,
    voids: Arc<dyn VoidLog>,
    transactions: Arc<dyn TransactionService>,
    pin_timeout: Duration,
    request_timeout: Duration,
}

impl VoidAuthorizer {
    pub fn new(
        store: Arc<CartStore>,
        pins: Arc<dyn PinVerifier>,
        voids: Arc<dyn VoidLog>,
        transactions: Arc<dyn TransactionService>,
        pin_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        VoidAuthorizer {
            store,
            pins,
            voids,
            transactions,
            pin_timeout,
            request_timeout,
        }
    }

    // =========================================================================
    // Single Line
    // =========================================================================

    /// Authorizes the line's confirmed decrease and carries it out.
    ///
    /// The line must be awaiting authorization (see
    /// [`CartStore::confirm_adjustment`]). A second call while one is
    /// running fails with `AuthorizationInFlight`.
    pub async fn authorize(
        &self,
        key: &LineKey,
        request: VoidRequest,
    ) -> Result<VoidOutcome, AuthorizationError> {
        validate_pin(&request.pin)?;
        let ticket = self.store.begin_authorization(key)?;
        debug!(
            terminal = %self.store.terminal(),
            line = %key,
            void_quantity = ticket.void_quantity,
            "Authorizing void"
        );

        let approver = match self.verify(&request).await {
            Ok(approver) => approver,
            Err(err) => {
                self.store.authorization_failed(key);
                info!(line = %key, error = %err, "Void authorization failed");
                return Err(err);
            }
        };

        let applied = match self.store.apply_void(&ticket) {
            Ok(applied) => applied,
            Err(CoreError::AdjustmentCancelled(line)) => {
                info!(line = %line, "Void cancelled during authorization, cart untouched");
                return Err(CoreError::AdjustmentCancelled(line).into());
            }
            Err(err) => {
                warn!(line = %key, error = %err, "Void could not be applied to the cart");
                if self.store.is_checking_out() {
                    self.store.authorization_failed(key);
                } else {
                    self.store.discard_adjustment(key);
                }
                return Err(err.into());
            }
        };
        if !applied {
            warn!(line = %key, "Cart read-back shows the void did not take effect");
            self.store.discard_adjustment(key);
            return Err(AuthorizationError::MutationNotApplied { item: ticket.name });
        }

        if let Err(err) = self.store.complete_authorization(key) {
            debug!(line = %key, error = %err, "Adjustment already gone after void");
        }

        let record = VoidRecord::new(
            self.store.terminal(),
            VoidSource::SingleItem,
            vec![ticket.voided_line()],
            request.reason,
            request.note,
            approver,
        );
        info!(
            terminal = %record.terminal,
            void_id = %record.id,
            line = %key,
            quantity = record.quantity,
            value = %record.value,
            approver = %record.approver.id,
            "Void authorized"
        );

        let mut warnings = Vec::new();
        if let Some(warning) = self.submit_void(&record).await {
            warnings.push(warning);
        }

        Ok(VoidOutcome {
            record,
            transaction: None,
            warnings,
        })
    }

    // =========================================================================
    // Bulk
    // =========================================================================

    /// Authorizes the bulk picker's selection and removes those lines.
    ///
    /// Writes one VoidRecord listing every removed line and one `Voided`
    /// transaction for their combined value.
    pub async fn authorize_bulk(
        &self,
        request: VoidRequest,
    ) -> Result<VoidOutcome, AuthorizationError> {
        validate_pin(&request.pin)?;
        let ticket = self.store.begin_bulk_authorization()?;
        debug!(
            terminal = %self.store.terminal(),
            lines = ticket.lines.len(),
            value = %ticket.total_value,
            "Authorizing bulk void"
        );

        let approver = match self.verify(&request).await {
            Ok(approver) => approver,
            Err(err) => {
                self.store.bulk_authorization_failed();
                info!(error = %err, "Bulk void authorization failed");
                return Err(err);
            }
        };

        let removed = match self.store.remove_lines(&ticket) {
            Ok(removed) => removed,
            Err(CoreError::AdjustmentCancelled(label)) => {
                info!(ticket = %label, "Bulk void cancelled during authorization, cart untouched");
                return Err(CoreError::AdjustmentCancelled(label).into());
            }
            Err(err) => {
                self.store.bulk_authorization_failed();
                warn!(error = %err, "Bulk void could not be applied to the cart");
                return Err(err.into());
            }
        };

        if removed.is_empty() {
            warn!("Cart read-back shows no bulk line was removed");
            self.store.bulk_authorization_failed();
            self.store.cancel_bulk().ok();
            return Err(AuthorizationError::MutationNotApplied {
                item: format!("{} selected lines", ticket.lines.len()),
            });
        }

        // Recorded at the quantities actually removed, not as selected
        let voided: Vec<VoidedLine> = removed
            .iter()
            .map(|item| VoidedLine::of(item, item.quantity))
            .collect();

        if let Err(err) = self.store.complete_bulk() {
            debug!(error = %err, "Bulk ticket already gone after void");
        }

        let record = VoidRecord::new(
            self.store.terminal(),
            VoidSource::Bulk,
            voided,
            request.reason,
            request.note,
            approver,
        );
        info!(
            terminal = %record.terminal,
            void_id = %record.id,
            lines = record.items.len(),
            value = %record.value,
            approver = %record.approver.id,
            "Bulk void authorized"
        );

        let mut warnings = Vec::new();
        if let Some(warning) = self.submit_void(&record).await {
            warnings.push(warning);
        }

        let transaction = match self.submit_voided_transaction(&record).await {
            Ok(transaction) => Some(transaction),
            Err(warning) => {
                warnings.push(warning);
                None
            }
        };

        Ok(VoidOutcome {
            record,
            transaction,
            warnings,
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn verify(&self, request: &VoidRequest) -> Result<Approver, AuthorizationError> {
        let verdict = with_timeout(
            "PIN verification",
            self.pin_timeout,
            self.pins
                .verify_pin(&request.pin, request.approver_hint.as_deref()),
        )
        .await?;

        match verdict {
            PinVerdict::Approved(approver) => Ok(approver),
            PinVerdict::Rejected => Err(AuthorizationError::PinRejected),
        }
    }

    async fn submit_void(&self, record: &VoidRecord) -> Option<AuditWarning> {
        let result = with_timeout(
            "Void log submission",
            self.request_timeout,
            self.voids.submit_void(record),
        )
        .await;

        match result {
            Ok(()) => None,
            Err(err) => {
                warn!(void_id = %record.id, error = %err, "Void not written to the void log");
                Some(AuditWarning {
                    record_id: record.id,
                    target: VOID_LOG,
                    cause: err.to_string(),
                })
            }
        }
    }

    async fn submit_voided_transaction(
        &self,
        record: &VoidRecord,
    ) -> Result<TransactionRecord, AuditWarning> {
        let request = TransactionRequest {
            terminal: record.terminal.clone(),
            items: record.items.iter().map(TransactionLine::from).collect(),
            payment_method: PaymentMethod::Void,
            subtotal: record.value,
            discount: Money::zero(),
            total: record.value,
            discount_ids: Vec::new(),
            performed_by: record.approver.clone(),
            status: TransactionStatus::Voided,
            payment_reference: None,
        };

        with_timeout(
            "Voided transaction submission",
            self.request_timeout,
            self.transactions.submit_transaction(&request),
        )
        .await
        .map_err(|err| {
            warn!(void_id = %record.id, error = %err, "Voided transaction not recorded");
            AuditWarning {
                record_id: record.id,
                target: TRANSACTION_LOG,
                cause: err.to_string(),
            }
        })
    }
}
