//! # Quantity Adjustments
//!
//! The PIN-gated state machine between "cashier taps −/+" and a committed
//! cart change.
//!
//! ## States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Committed ──propose/step──► Pending(q)                                │
//! │       ▲                          │                                      │
//! │       │ cancel                   │ confirm                              │
//! │       ├──────────────────────────┤                                      │
//! │       │                          ├── q > committed → CommitIncrease     │
//! │       │                          ├── q = committed → NoChange           │
//! │       │                          └── q < committed ─┐                   │
//! │       │                                             ▼                   │
//! │       │                               AwaitingAuth(void = committed-q)  │
//! │       │                                  │  begin_authorization          │
//! │       │                                  ▼  (in flight, re-entry refused)│
//! │       │          authorization_failed ◄──┤                               │
//! │       │          (back to AwaitingAuth)  │  complete                     │
//! │       └──────────────────────────────────┴──► Voided → Committed        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `cancel` is accepted in every state short of `Voided`.
//!
//! The committed cart is never touched here. This module only decides
//! *what* should happen; the engine verifies the PIN, mutates the cart and
//! writes the void log.
//!
//! The bulk picker has its own single ticket that skips `Pending`: the
//! selected lines go straight to `AwaitingAuth` for their combined value.

use std::collections::HashMap;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{LineItem, LineKey, VoidedLine};

const BULK_LABEL: &str = "bulk void";

// =============================================================================
// Tickets
// =============================================================================

/// A confirmed decrease waiting for (or undergoing) authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoidTicket {
    pub key: LineKey,
    pub name: String,
    /// Quantity in the cart when the decrease was confirmed.
    pub committed: i64,
    /// Quantity the line should end at. Zero means remove.
    pub target: i64,
    pub void_quantity: i64,
    pub unit_price: Money,
    pub void_value: Money,
}

impl VoidTicket {
    pub fn is_removal(&self) -> bool {
        self.target == 0
    }

    /// The voided line as it goes into the audit record.
    pub fn voided_line(&self) -> VoidedLine {
        VoidedLine {
            product_id: self.key.product_id.clone(),
            name: self.name.clone(),
            size: self.key.size.clone(),
            quantity: self.void_quantity,
            unit_price: self.unit_price,
            value: self.void_value,
        }
    }
}

/// What confirming a pending change means for the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Increase: commit `quantity` directly, no authorization.
    CommitIncrease { key: LineKey, quantity: i64 },
    /// Proposed equals committed; nothing to do.
    NoChange { key: LineKey },
    /// Decrease: needs a reason and a PIN first.
    RequiresAuthorization(VoidTicket),
}

/// The bulk picker's selection, awaiting one authorization for all lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkTicket {
    pub lines: Vec<VoidedLine>,
    pub total_quantity: i64,
    pub total_value: Money,
    in_flight: bool,
}

impl BulkTicket {
    pub fn keys(&self) -> Vec<LineKey> {
        self.lines
            .iter()
            .map(|line| LineKey::new(line.product_id.clone(), line.size.as_deref()))
            .collect()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

// =============================================================================
// Per-line State
// =============================================================================

/// Where one line's adjustment stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentPhase {
    Committed,
    Pending,
    AwaitingAuth,
    Authorizing,
}

impl AdjustmentPhase {
    fn label(self) -> &'static str {
        match self {
            AdjustmentPhase::Committed => "committed",
            AdjustmentPhase::Pending => "pending",
            AdjustmentPhase::AwaitingAuth => "awaiting authorization",
            AdjustmentPhase::Authorizing => "being authorized",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Adjustment {
    Pending { proposed: i64 },
    AwaitingAuth { ticket: VoidTicket, in_flight: bool },
}

impl Adjustment {
    fn phase(&self) -> AdjustmentPhase {
        match self {
            Adjustment::Pending { .. } => AdjustmentPhase::Pending,
            Adjustment::AwaitingAuth { in_flight: false, .. } => AdjustmentPhase::AwaitingAuth,
            Adjustment::AwaitingAuth { in_flight: true, .. } => AdjustmentPhase::Authorizing,
        }
    }
}

// =============================================================================
// Quantity Adjustments
// =============================================================================

/// All in-progress adjustments of one cart. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct QuantityAdjustments {
    lines: HashMap<LineKey, Adjustment>,
    bulk: Option<BulkTicket>,
}

impl QuantityAdjustments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase of a line.
    pub fn phase(&self, key: &LineKey) -> AdjustmentPhase {
        self.lines
            .get(key)
            .map(Adjustment::phase)
            .unwrap_or(AdjustmentPhase::Committed)
    }

    /// Proposed quantity of a line, if one is pending or awaiting auth.
    pub fn proposed(&self, key: &LineKey) -> Option<i64> {
        match self.lines.get(key)? {
            Adjustment::Pending { proposed } => Some(*proposed),
            Adjustment::AwaitingAuth { ticket, .. } => Some(ticket.target),
        }
    }

    /// The ticket of a line awaiting authorization.
    pub fn ticket(&self, key: &LineKey) -> Option<&VoidTicket> {
        match self.lines.get(key)? {
            Adjustment::AwaitingAuth { ticket, .. } => Some(ticket),
            Adjustment::Pending { .. } => None,
        }
    }

    /// Proposes a new quantity, clamped to `[1, available stock]`.
    ///
    /// Returns the clamped value held as pending.
    pub fn propose(&mut self, item: &LineItem, quantity: i64) -> CoreResult<i64> {
        let key = item.key();
        self.ensure_editable(&key, "change quantity")?;

        let ceiling = item.stock_ceiling().max(1);
        let proposed = quantity.clamp(1, ceiling);
        self.lines.insert(key, Adjustment::Pending { proposed });
        Ok(proposed)
    }

    /// Moves the proposal by `delta` from where it currently stands.
    pub fn step(&mut self, item: &LineItem, delta: i64) -> CoreResult<i64> {
        let current = match self.lines.get(&item.key()) {
            Some(Adjustment::Pending { proposed }) if *proposed > 0 => *proposed,
            _ => item.quantity,
        };
        self.propose(item, current + delta)
    }

    /// Proposes removing the line entirely.
    pub fn request_removal(&mut self, item: &LineItem) -> CoreResult<()> {
        let key = item.key();
        self.ensure_editable(&key, "remove")?;
        self.lines.insert(key, Adjustment::Pending { proposed: 0 });
        Ok(())
    }

    /// Drops a line's adjustment, reverting to the committed quantity.
    ///
    /// Allowed until the void is carried out, including while the PIN is
    /// being verified; that authorization then finds its ticket gone and
    /// changes nothing. Returns `false` if there was nothing to cancel.
    pub fn cancel(&mut self, key: &LineKey) -> CoreResult<bool> {
        Ok(self.lines.remove(key).is_some())
    }

    /// True while `ticket` is the line's adjustment and its authorization runs.
    pub fn is_authorizing(&self, ticket: &VoidTicket) -> bool {
        match self.lines.get(&ticket.key) {
            Some(Adjustment::AwaitingAuth {
                ticket: current,
                in_flight,
            }) => *in_flight && current == ticket,
            _ => false,
        }
    }

    /// Confirms a pending change against the line as committed now.
    ///
    /// Confirming a line already awaiting authorization returns the same
    /// ticket again, so a double-submitted confirm is harmless.
    pub fn confirm(&mut self, item: &LineItem) -> CoreResult<ConfirmOutcome> {
        let key = item.key();
        let proposed = match self.lines.get(&key) {
            None => return Err(CoreError::NoPendingChange(key)),
            Some(Adjustment::AwaitingAuth { ticket, .. }) => {
                return Ok(ConfirmOutcome::RequiresAuthorization(ticket.clone()))
            }
            Some(Adjustment::Pending { proposed }) => *proposed,
        };

        let committed = item.quantity;
        if proposed > committed {
            self.lines.remove(&key);
            return Ok(ConfirmOutcome::CommitIncrease {
                key,
                quantity: proposed,
            });
        }
        if proposed == committed {
            self.lines.remove(&key);
            return Ok(ConfirmOutcome::NoChange { key });
        }

        let void_quantity = committed - proposed;
        let ticket = VoidTicket {
            key: key.clone(),
            name: item.display_name(),
            committed,
            target: proposed,
            void_quantity,
            unit_price: item.unit_price,
            void_value: item.unit_price.multiply_quantity(void_quantity),
        };
        self.lines.insert(
            key,
            Adjustment::AwaitingAuth {
                ticket: ticket.clone(),
                in_flight: false,
            },
        );
        Ok(ConfirmOutcome::RequiresAuthorization(ticket))
    }

    /// Marks a line's authorization as in flight.
    ///
    /// ## Errors
    /// `AuthorizationInFlight` if one is already running for this line.
    pub fn begin_authorization(&mut self, key: &LineKey) -> CoreResult<VoidTicket> {
        match self.lines.get_mut(key) {
            None => Err(CoreError::NoPendingChange(key.clone())),
            Some(Adjustment::Pending { .. }) => Err(CoreError::InvalidTransition {
                key: key.to_string(),
                state: AdjustmentPhase::Pending.label(),
                action: "authorize",
            }),
            Some(Adjustment::AwaitingAuth { in_flight: true, .. }) => {
                Err(CoreError::AuthorizationInFlight(key.to_string()))
            }
            Some(Adjustment::AwaitingAuth { ticket, in_flight }) => {
                *in_flight = true;
                Ok(ticket.clone())
            }
        }
    }

    /// Authorization did not succeed; the line stays awaiting auth for retry.
    pub fn authorization_failed(&mut self, key: &LineKey) {
        if let Some(Adjustment::AwaitingAuth { in_flight, .. }) = self.lines.get_mut(key) {
            *in_flight = false;
        }
    }

    /// Authorization succeeded and the void was carried out.
    pub fn complete(&mut self, key: &LineKey) -> CoreResult<VoidTicket> {
        match self.phase(key) {
            AdjustmentPhase::Committed => Err(CoreError::NoPendingChange(key.clone())),
            AdjustmentPhase::Authorizing => match self.lines.remove(key) {
                Some(Adjustment::AwaitingAuth { ticket, .. }) => Ok(ticket),
                _ => Err(CoreError::NoPendingChange(key.clone())),
            },
            phase => Err(CoreError::InvalidTransition {
                key: key.to_string(),
                state: phase.label(),
                action: "complete a void",
            }),
        }
    }

    /// Drops a line's adjustment whatever its state.
    ///
    /// Used when the line vanished from the cart underneath the flow.
    pub fn discard(&mut self, key: &LineKey) {
        self.lines.remove(key);
    }

    /// Drops every adjustment and the bulk ticket (cart cleared).
    pub fn clear(&mut self) {
        self.lines.clear();
        self.bulk = None;
    }

    // -------------------------------------------------------------------------
    // Bulk
    // -------------------------------------------------------------------------

    /// Current bulk ticket, if any.
    pub fn bulk(&self) -> Option<&BulkTicket> {
        self.bulk.as_ref()
    }

    /// Collapses the picked lines into one ticket awaiting authorization.
    pub fn select_bulk<'a, I>(&mut self, items: I) -> CoreResult<BulkTicket>
    where
        I: IntoIterator<Item = &'a LineItem>,
    {
        if self.bulk.as_ref().is_some_and(|bulk| bulk.in_flight) {
            return Err(CoreError::AuthorizationInFlight(BULK_LABEL.to_string()));
        }

        let mut lines: Vec<VoidedLine> = Vec::new();
        for item in items {
            let key = item.key();
            if self.phase(&key) == AdjustmentPhase::Authorizing {
                return Err(CoreError::AuthorizationInFlight(key.to_string()));
            }
            if !lines
                .iter()
                .any(|line| line.product_id == key.product_id && line.size == key.size)
            {
                lines.push(VoidedLine::of(item, item.quantity));
            }
        }

        if lines.is_empty() {
            return Err(ValidationError::Required {
                field: "items to void".to_string(),
            }
            .into());
        }

        let ticket = BulkTicket {
            total_quantity: lines.iter().map(|line| line.quantity).sum(),
            total_value: lines.iter().map(|line| line.value).sum(),
            lines,
            in_flight: false,
        };
        self.bulk = Some(ticket.clone());
        Ok(ticket)
    }

    pub fn begin_bulk_authorization(&mut self) -> CoreResult<BulkTicket> {
        match self.bulk.as_mut() {
            None => Err(CoreError::InvalidTransition {
                key: BULK_LABEL.to_string(),
                state: AdjustmentPhase::Committed.label(),
                action: "authorize",
            }),
            Some(bulk) if bulk.in_flight => {
                Err(CoreError::AuthorizationInFlight(BULK_LABEL.to_string()))
            }
            Some(bulk) => {
                bulk.in_flight = true;
                Ok(bulk.clone())
            }
        }
    }

    pub fn bulk_authorization_failed(&mut self) {
        if let Some(bulk) = self.bulk.as_mut() {
            bulk.in_flight = false;
        }
    }

    /// Finishes the bulk void; per-line adjustments of its lines are dropped.
    pub fn complete_bulk(&mut self) -> CoreResult<BulkTicket> {
        match self.bulk.take() {
            Some(bulk) if bulk.in_flight => {
                for key in bulk.keys() {
                    self.lines.remove(&key);
                }
                Ok(bulk)
            }
            other => {
                self.bulk = other;
                Err(CoreError::InvalidTransition {
                    key: BULK_LABEL.to_string(),
                    state: AdjustmentPhase::AwaitingAuth.label(),
                    action: "complete a void",
                })
            }
        }
    }

    /// Drops the bulk ticket, even while its PIN is being verified.
    pub fn cancel_bulk(&mut self) -> CoreResult<bool> {
        Ok(self.bulk.take().is_some())
    }

    /// True while `ticket` is the bulk ticket and its authorization runs.
    pub fn is_bulk_authorizing(&self, ticket: &BulkTicket) -> bool {
        self.bulk
            .as_ref()
            .is_some_and(|bulk| bulk.in_flight && bulk.lines == ticket.lines)
    }

    /// Guards against editing a line whose decrease is already confirmed.
    fn ensure_editable(&self, key: &LineKey, action: &'static str) -> CoreResult<()> {
        match self.phase(key) {
            AdjustmentPhase::Committed | AdjustmentPhase::Pending => Ok(()),
            AdjustmentPhase::Authorizing => Err(CoreError::AuthorizationInFlight(key.to_string())),
            phase => Err(CoreError::InvalidTransition {
                key: key.to_string(),
                state: phase.label(),
                action,
            }),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Product, SizeStock};
    use std::collections::BTreeMap;

    fn line(quantity: i64, stock: i64) -> LineItem {
        let mut sizes = BTreeMap::new();
        sizes.insert("M".to_string(), SizeStock::new(stock, None));
        let product = Product {
            id: "p-tee".to_string(),
            name: "Tee".to_string(),
            sku: None,
            image: None,
            category: None,
            sizes,
            current_stock: None,
            item_price: Money::from_cents(20000),
        };
        LineItem::from_product(&product, Some("M"), quantity).unwrap()
    }

    #[test]
    fn test_decrease_requires_authorization() {
        let item = line(5, 10);
        let key = item.key();
        let mut adj = QuantityAdjustments::new();

        assert_eq!(adj.propose(&item, 2).unwrap(), 2);
        assert_eq!(adj.phase(&key), AdjustmentPhase::Pending);

        let ConfirmOutcome::RequiresAuthorization(ticket) = adj.confirm(&item).unwrap() else {
            panic!("expected authorization");
        };
        assert_eq!(ticket.void_quantity, 3);
        assert_eq!(ticket.void_value, Money::from_cents(60000));
        assert_eq!(ticket.target, 2);
        assert_eq!(adj.phase(&key), AdjustmentPhase::AwaitingAuth);

        adj.begin_authorization(&key).unwrap();
        let done = adj.complete(&key).unwrap();
        assert_eq!(done, ticket);
        assert_eq!(adj.phase(&key), AdjustmentPhase::Committed);
    }

    #[test]
    fn test_increase_commits_without_authorization() {
        let item = line(2, 10);
        let mut adj = QuantityAdjustments::new();
        adj.step(&item, 1).unwrap();
        adj.step(&item, 1).unwrap();

        assert_eq!(
            adj.confirm(&item).unwrap(),
            ConfirmOutcome::CommitIncrease {
                key: item.key(),
                quantity: 4
            }
        );
        assert_eq!(adj.phase(&item.key()), AdjustmentPhase::Committed);
    }

    #[test]
    fn test_proposal_clamped_to_stock() {
        let item = line(2, 5);
        let mut adj = QuantityAdjustments::new();
        assert_eq!(adj.propose(&item, 9).unwrap(), 5);
        assert_eq!(adj.propose(&item, 0).unwrap(), 1);
        assert_eq!(adj.propose(&item, -4).unwrap(), 1);
    }

    #[test]
    fn test_cancel_reverts_without_side_effects() {
        let item = line(5, 10);
        let key = item.key();
        let mut adj = QuantityAdjustments::new();
        adj.propose(&item, 1).unwrap();
        adj.confirm(&item).unwrap();

        assert!(adj.cancel(&key).unwrap());
        assert_eq!(adj.phase(&key), AdjustmentPhase::Committed);
        assert_eq!(adj.proposed(&key), None);
        assert!(!adj.cancel(&key).unwrap());
    }

    #[test]
    fn test_double_confirm_and_reentrant_authorization() {
        let item = line(5, 10);
        let key = item.key();
        let mut adj = QuantityAdjustments::new();
        adj.propose(&item, 3).unwrap();

        let first = adj.confirm(&item).unwrap();
        let second = adj.confirm(&item).unwrap();
        assert_eq!(first, second);

        adj.begin_authorization(&key).unwrap();
        assert!(matches!(
            adj.begin_authorization(&key),
            Err(CoreError::AuthorizationInFlight(_))
        ));
    }

    #[test]
    fn test_cancel_while_authorizing_retires_ticket() {
        let item = line(5, 10);
        let key = item.key();
        let mut adj = QuantityAdjustments::new();
        adj.propose(&item, 2).unwrap();
        adj.confirm(&item).unwrap();
        let ticket = adj.begin_authorization(&key).unwrap();
        assert!(adj.is_authorizing(&ticket));

        assert!(adj.cancel(&key).unwrap());
        assert_eq!(adj.phase(&key), AdjustmentPhase::Committed);
        assert!(!adj.is_authorizing(&ticket));

        // A fresh adjustment for the same line is not the cancelled one
        adj.propose(&item, 4).unwrap();
        adj.confirm(&item).unwrap();
        adj.begin_authorization(&key).unwrap();
        assert!(!adj.is_authorizing(&ticket));
    }

    #[test]
    fn test_failed_authorization_allows_retry() {
        let item = line(5, 10);
        let key = item.key();
        let mut adj = QuantityAdjustments::new();
        adj.propose(&item, 2).unwrap();
        adj.confirm(&item).unwrap();

        adj.begin_authorization(&key).unwrap();
        adj.authorization_failed(&key);
        assert_eq!(adj.phase(&key), AdjustmentPhase::AwaitingAuth);
        assert!(adj.begin_authorization(&key).is_ok());
    }

    #[test]
    fn test_removal_request() {
        let item = line(3, 10);
        let mut adj = QuantityAdjustments::new();
        adj.request_removal(&item).unwrap();

        let ConfirmOutcome::RequiresAuthorization(ticket) = adj.confirm(&item).unwrap() else {
            panic!("expected authorization");
        };
        assert!(ticket.is_removal());
        assert_eq!(ticket.void_quantity, 3);
    }

    #[test]
    fn test_confirm_without_pending_change() {
        let item = line(3, 10);
        let mut adj = QuantityAdjustments::new();
        assert!(matches!(
            adj.confirm(&item),
            Err(CoreError::NoPendingChange(_))
        ));
        assert!(matches!(
            adj.complete(&item.key()),
            Err(CoreError::NoPendingChange(_))
        ));
    }

    #[test]
    fn test_bulk_ticket_lifecycle() {
        let a = line(2, 10);
        let mut b = line(1, 10);
        b.product_id = "p-other".to_string();
        let mut adj = QuantityAdjustments::new();
        adj.propose(&a, 1).unwrap();

        let ticket = adj.select_bulk([&a, &b]).unwrap();
        assert_eq!(ticket.total_quantity, 3);
        assert_eq!(ticket.total_value, Money::from_cents(60000));

        adj.begin_bulk_authorization().unwrap();
        assert!(adj.begin_bulk_authorization().is_err());
        adj.bulk_authorization_failed();
        adj.begin_bulk_authorization().unwrap();

        let in_flight = adj.bulk().cloned().unwrap();
        assert!(adj.is_bulk_authorizing(&in_flight));

        let done = adj.complete_bulk().unwrap();
        assert_eq!(done.keys().len(), 2);
        assert!(adj.bulk().is_none());
        assert_eq!(adj.phase(&a.key()), AdjustmentPhase::Committed);
    }

    #[test]
    fn test_bulk_requires_items() {
        let mut adj = QuantityAdjustments::new();
        let none: Vec<LineItem> = Vec::new();
        assert!(matches!(
            adj.select_bulk(&none),
            Err(CoreError::Validation(_))
        ));
    }
}
