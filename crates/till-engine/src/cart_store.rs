//! # Cart Store
//!
//! The terminal's authoritative in-memory cart, together with its applied
//! discounts and in-progress quantity adjustments.
//!
//! ## Mutation Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  add_item / merge_item / set_quantity / remove_item / clear             │
//! │       │                                                                 │
//! │       ▼  (one lock, synchronous)                                        │
//! │  ┌─────────────┐   ┌─────────────────────┐   ┌────────────────────┐    │
//! │  │ Cart rules  │──►│ revalidate applied  │──►│ schedule persist   │    │
//! │  │ (till-core) │   │ discounts, evict    │   │ (fire and forget)  │    │
//! │  └─────────────┘   └─────────────────────┘   └────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  CartChange { totals, evicted }                                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! While a checkout is in flight the cart is frozen: every mutation fails
//! until the finalizer either clears it or restores it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use till_core::adjustment::{AdjustmentPhase, BulkTicket, ConfirmOutcome, QuantityAdjustments, VoidTicket};
use till_core::discount::{AppliedDiscounts, DiscountDefinition, Evicted, StackingPolicy};
use till_core::validation::validate_discount_code;
use till_core::{Cart, CartTotals, CoreError, CoreResult, LineItem, LineKey, Product};

use crate::catalog::CatalogCache;
use crate::error::{EngineResult, PersistenceWarning, TransactionError};
use crate::persistence::{PersistenceStatus, PersisterHandle};
use crate::services::{CartRemoteStore, LocalCartCache};

// =============================================================================
// Public Types
// =============================================================================

/// Result of a successful cart mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct CartChange {
    pub totals: CartTotals,
    /// Discounts that stopped applying and were dropped.
    pub evicted: Vec<Evicted>,
}

/// Where `load` found the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartSource {
    Remote,
    Local,
    Empty,
}

/// Items and discounts at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct CartSnapshot {
    pub items: Vec<LineItem>,
    pub discounts: AppliedDiscounts,
}

/// What the finalizer needs from a frozen cart.
#[derive(Debug, Clone)]
pub(crate) struct CheckoutDraft {
    pub snapshot: CartSnapshot,
    pub totals: CartTotals,
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug)]
struct CartState {
    cart: Cart,
    discounts: AppliedDiscounts,
    adjustments: QuantityAdjustments,
    checkout_in_flight: bool,
}

// =============================================================================
// Cart Store
// =============================================================================

pub struct CartStore {
    terminal: String,
    state: Mutex<CartState>,
    catalog: Arc<CatalogCache>,
    policy: StackingPolicy,
    persister: Option<PersisterHandle>,
}

impl CartStore {
    /// Creates an empty, unpersisted store for `terminal`.
    pub fn new(terminal: impl Into<String>, catalog: Arc<CatalogCache>) -> Self {
        let terminal = terminal.into();
        CartStore {
            state: Mutex::new(CartState {
                cart: Cart::new(terminal.clone()),
                discounts: AppliedDiscounts::new(),
                adjustments: QuantityAdjustments::new(),
                checkout_in_flight: false,
            }),
            terminal,
            catalog,
            policy: StackingPolicy::default(),
            persister: None,
        }
    }

    pub fn with_stacking(mut self, policy: StackingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Every mutation from now on is handed to `persister`.
    pub fn with_persister(mut self, persister: PersisterHandle) -> Self {
        self.persister = Some(persister);
        self
    }

    pub fn terminal(&self) -> &str {
        &self.terminal
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Rehydrates the cart: remote store first, local cache if the remote
    /// cart is empty or unreachable.
    ///
    /// Does not persist; the loaded list is already stored somewhere.
    pub async fn load(
        &self,
        remote: &dyn CartRemoteStore,
        local: &dyn LocalCartCache,
    ) -> CartSource {
        let (items, source) = match remote.load_cart(&self.terminal).await {
            Ok(items) if !items.is_empty() => (items, CartSource::Remote),
            Ok(_) => {
                debug!(terminal = %self.terminal, "Remote cart empty, trying local cache");
                self.load_local(local).await
            }
            Err(err) => {
                warn!(
                    terminal = %self.terminal,
                    error = %err,
                    "Remote cart unreachable, trying local cache"
                );
                self.load_local(local).await
            }
        };

        let mut guard = self.lock();
        let state = &mut *guard;
        state.cart.replace_items(items);
        state.adjustments.clear();
        let evicted = state.discounts.revalidate(&state.cart, self.catalog.as_ref());
        log_evictions(&self.terminal, &evicted);

        info!(
            terminal = %self.terminal,
            items = state.cart.item_count(),
            ?source,
            "Cart loaded"
        );
        source
    }

    async fn load_local(&self, local: &dyn LocalCartCache) -> (Vec<LineItem>, CartSource) {
        match local.load_local(&self.terminal).await {
            Ok(Some(items)) if !items.is_empty() => (items, CartSource::Local),
            Ok(_) => (Vec::new(), CartSource::Empty),
            Err(err) => {
                warn!(terminal = %self.terminal, error = %err, "Local cart cache unreadable");
                (Vec::new(), CartSource::Empty)
            }
        }
    }

    // =========================================================================
    // Read Access
    // =========================================================================

    /// Executes a function with read access to the cart.
    pub fn with_cart<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Cart) -> R,
    {
        f(&self.lock().cart)
    }

    pub fn items(&self) -> Vec<LineItem> {
        self.lock().cart.items.clone()
    }

    /// Committed quantity of a line, `None` if absent.
    pub fn quantity_of(&self, key: &LineKey) -> Option<i64> {
        self.lock().cart.quantity_of(key)
    }

    pub fn totals(&self) -> CartTotals {
        let state = self.lock();
        self.totals_of(&state)
    }

    pub fn is_checking_out(&self) -> bool {
        self.lock().checkout_in_flight
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Adds a new line. Fails with `DuplicateLineItem` if the key exists;
    /// the caller asks the cashier and then calls [`merge_item`](Self::merge_item).
    pub fn add_item(&self, item: LineItem) -> CoreResult<CartChange> {
        debug!(terminal = %self.terminal, line = %item.key(), quantity = item.quantity, "Adding line");
        self.mutate(|state| state.cart.add_item(item))
            .map(|((), change)| change)
    }

    /// Builds a line from a catalog product and adds it.
    pub fn add_product(
        &self,
        product: &Product,
        size: Option<&str>,
        quantity: i64,
    ) -> CoreResult<CartChange> {
        let item = LineItem::from_product(product, size, quantity)?;
        self.add_item(item)
    }

    /// Adds `item`'s quantity onto an existing line (confirmed duplicate).
    pub fn merge_item(&self, item: LineItem) -> CoreResult<CartChange> {
        debug!(terminal = %self.terminal, line = %item.key(), quantity = item.quantity, "Merging line");
        self.mutate(|state| state.cart.merge_item(item))
            .map(|((), change)| change)
    }

    /// Sets a line's quantity; zero or less removes it.
    pub fn set_quantity(&self, key: &LineKey, quantity: i64) -> CoreResult<CartChange> {
        debug!(terminal = %self.terminal, line = %key, quantity, "Setting quantity");
        self.mutate(|state| {
            state.cart.set_quantity(key, quantity)?;
            if quantity <= 0 {
                drop_idle_adjustment(state, key);
            }
            Ok(())
        })
        .map(|((), change)| change)
    }

    pub fn remove_item(&self, key: &LineKey) -> CoreResult<CartChange> {
        debug!(terminal = %self.terminal, line = %key, "Removing line");
        self.mutate(|state| {
            state.cart.remove_item(key)?;
            drop_idle_adjustment(state, key);
            Ok(())
        })
        .map(|((), change)| change)
    }

    /// Empties the cart and drops discounts and adjustments.
    pub fn clear(&self) -> CoreResult<CartChange> {
        info!(terminal = %self.terminal, "Clearing cart");
        self.mutate(|state| {
            state.cart.clear();
            state.discounts.clear();
            state.adjustments.clear();
            Ok(())
        })
        .map(|((), change)| change)
    }

    /// Puts items and discounts back as they were in `snapshot`.
    pub fn restore(&self, snapshot: CartSnapshot) -> CartChange {
        let mut state = self.lock();
        state.cart.replace_items(snapshot.items);
        state.discounts = snapshot.discounts;
        state.adjustments.clear();
        self.after_change(&mut state)
    }

    pub fn snapshot(&self) -> CartSnapshot {
        let state = self.lock();
        CartSnapshot {
            items: state.cart.items.clone(),
            discounts: state.discounts.clone(),
        }
    }

    // =========================================================================
    // Discounts
    // =========================================================================

    /// Attaches a discount if it applies to the cart as it is now.
    ///
    /// Returns `false` if it was already attached.
    pub fn attach_discount(&self, discount: DiscountDefinition) -> CoreResult<bool> {
        let mut state = self.lock();
        let state = &mut *state;
        let attached = state
            .discounts
            .attach(discount, &state.cart, self.catalog.as_ref())?;
        Ok(attached)
    }

    /// Looks an active discount up by its code (case-insensitive) and
    /// attaches it.
    pub async fn attach_discount_code(&self, code: &str) -> EngineResult<DiscountDefinition> {
        let code = validate_discount_code(code)?;
        let catalog = self.catalog.active_discounts().await?;
        // Categories may be needed for the applicability check
        self.warm_categories().await;

        let mut state = self.lock();
        let state = &mut *state;
        let discount =
            state
                .discounts
                .attach_code(&catalog, &code, &state.cart, self.catalog.as_ref())?;
        info!(terminal = %self.terminal, discount = %discount.id, "Discount code applied");
        Ok(discount)
    }

    /// Attaches an active discount by id.
    pub async fn attach_discount_id(&self, id: &str) -> EngineResult<DiscountDefinition> {
        let catalog = self.catalog.active_discounts().await?;
        let discount = catalog
            .iter()
            .find(|discount| discount.id == id)
            .cloned()
            .ok_or_else(|| CoreError::DiscountNotFound(id.to_string()))?;
        self.warm_categories().await;

        self.attach_discount(discount.clone())?;
        Ok(discount)
    }

    pub fn detach_discount(&self, id: &str) -> Option<DiscountDefinition> {
        self.lock().discounts.detach(id)
    }

    pub fn applied_discounts(&self) -> Vec<DiscountDefinition> {
        self.lock().discounts.iter().cloned().collect()
    }

    /// Product categories are only consulted from cache; fetch them once
    /// if nothing is cached yet.
    async fn warm_categories(&self) {
        if self.catalog.cached_products().is_none() {
            if let Err(err) = self.catalog.products().await {
                debug!(error = %err, "Product catalog unavailable for category lookup");
            }
        }
    }

    // =========================================================================
    // Quantity Adjustments
    // =========================================================================

    pub fn adjustment_phase(&self, key: &LineKey) -> AdjustmentPhase {
        self.lock().adjustments.phase(key)
    }

    pub fn pending_quantity(&self, key: &LineKey) -> Option<i64> {
        self.lock().adjustments.proposed(key)
    }

    pub fn void_ticket(&self, key: &LineKey) -> Option<VoidTicket> {
        self.lock().adjustments.ticket(key).cloned()
    }

    /// Starts (or moves) a pending change; returns the clamped proposal.
    pub fn propose_quantity(&self, key: &LineKey, quantity: i64) -> CoreResult<i64> {
        self.with_line(key, |adjustments, item| adjustments.propose(item, quantity))
    }

    /// Nudges the pending quantity by `delta` (the +/- buttons).
    pub fn step_quantity(&self, key: &LineKey, delta: i64) -> CoreResult<i64> {
        self.with_line(key, |adjustments, item| adjustments.step(item, delta))
    }

    /// Proposes removing the whole line (needs authorization on confirm).
    pub fn request_removal(&self, key: &LineKey) -> CoreResult<()> {
        self.with_line(key, |adjustments, item| adjustments.request_removal(item))
    }

    /// Reverts to the committed quantity. No side effects.
    ///
    /// Also valid while the PIN is being verified; that authorization then
    /// ends with `AdjustmentCancelled` and leaves the cart as it is.
    pub fn cancel_adjustment(&self, key: &LineKey) -> CoreResult<bool> {
        self.lock().adjustments.cancel(key)
    }

    /// Confirms a pending change.
    ///
    /// Increases are committed right here; decreases come back as
    /// `RequiresAuthorization` for the [`VoidAuthorizer`](crate::VoidAuthorizer).
    pub fn confirm_adjustment(&self, key: &LineKey) -> CoreResult<ConfirmOutcome> {
        let mut state = self.lock();
        ensure_not_checking_out(&state, &self.terminal)?;

        let item = state
            .cart
            .find(key)
            .cloned()
            .ok_or_else(|| CoreError::LineItemNotFound(key.clone()))?;
        let outcome = state.adjustments.confirm(&item)?;

        if let ConfirmOutcome::CommitIncrease { quantity, .. } = &outcome {
            state.cart.set_quantity(key, *quantity)?;
            debug!(terminal = %self.terminal, line = %key, quantity, "Increase committed");
            self.after_change(&mut state);
        }
        Ok(outcome)
    }

    /// Collapses the selected lines into one bulk void awaiting a PIN.
    pub fn select_bulk(&self, keys: &[LineKey]) -> CoreResult<BulkTicket> {
        let mut state = self.lock();
        ensure_not_checking_out(&state, &self.terminal)?;
        let state = &mut *state;

        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            let item = state
                .cart
                .find(key)
                .ok_or_else(|| CoreError::LineItemNotFound(key.clone()))?;
            items.push(item);
        }
        state.adjustments.select_bulk(items)
    }

    pub fn bulk_ticket(&self) -> Option<BulkTicket> {
        self.lock().adjustments.bulk().cloned()
    }

    pub fn cancel_bulk(&self) -> CoreResult<bool> {
        self.lock().adjustments.cancel_bulk()
    }

    // =========================================================================
    // Void Steps (VoidAuthorizer only)
    // =========================================================================

    pub(crate) fn begin_authorization(&self, key: &LineKey) -> CoreResult<VoidTicket> {
        self.lock().adjustments.begin_authorization(key)
    }

    pub(crate) fn authorization_failed(&self, key: &LineKey) {
        self.lock().adjustments.authorization_failed(key);
    }

    pub(crate) fn complete_authorization(&self, key: &LineKey) -> CoreResult<VoidTicket> {
        self.lock().adjustments.complete(key)
    }

    pub(crate) fn discard_adjustment(&self, key: &LineKey) {
        self.lock().adjustments.discard(key);
    }

    /// Reduces or removes the ticket's line and reads it back.
    ///
    /// Check, mutation and read-back share one lock. Returns `false` without
    /// touching the cart if the line no longer holds the quantity the ticket
    /// was confirmed against, or if the read-back shows no decrease.
    ///
    /// ## Errors
    /// `AdjustmentCancelled` if the ticket is no longer the one being
    /// authorized (cancelled or replaced during PIN verification).
    pub(crate) fn apply_void(&self, ticket: &VoidTicket) -> CoreResult<bool> {
        let mut state = self.lock();
        ensure_not_checking_out(&state, &self.terminal)?;
        if !state.adjustments.is_authorizing(ticket) {
            return Err(CoreError::AdjustmentCancelled(ticket.key.to_string()));
        }
        if state.cart.quantity_of(&ticket.key) != Some(ticket.committed) {
            return Ok(false);
        }

        if ticket.is_removal() {
            state.cart.remove_item(&ticket.key)?;
        } else {
            state.cart.set_quantity(&ticket.key, ticket.target)?;
        }
        let applied = state
            .cart
            .quantity_of(&ticket.key)
            .map_or(true, |quantity| quantity < ticket.committed);

        self.after_change(&mut state);
        Ok(applied)
    }

    pub(crate) fn begin_bulk_authorization(&self) -> CoreResult<BulkTicket> {
        self.lock().adjustments.begin_bulk_authorization()
    }

    pub(crate) fn bulk_authorization_failed(&self) {
        self.lock().adjustments.bulk_authorization_failed();
    }

    pub(crate) fn complete_bulk(&self) -> CoreResult<BulkTicket> {
        self.lock().adjustments.complete_bulk()
    }

    /// Removes the bulk ticket's lines that are still present.
    ///
    /// Returns the removed lines as they stood at removal, keeping only those
    /// that read back as absent. Removal and read-back share one lock.
    ///
    /// ## Errors
    /// `AdjustmentCancelled` if the ticket was cancelled during PIN
    /// verification.
    pub(crate) fn remove_lines(&self, ticket: &BulkTicket) -> CoreResult<Vec<LineItem>> {
        let mut state = self.lock();
        ensure_not_checking_out(&state, &self.terminal)?;
        if !state.adjustments.is_bulk_authorizing(ticket) {
            return Err(CoreError::AdjustmentCancelled("bulk void".to_string()));
        }

        let removed: Vec<LineItem> = ticket
            .keys()
            .iter()
            .filter_map(|key| state.cart.remove_item(key).ok())
            .collect();
        if removed.is_empty() {
            return Ok(removed);
        }

        let removed = removed
            .into_iter()
            .filter(|item| state.cart.find(&item.key()).is_none())
            .collect();
        self.after_change(&mut state);
        Ok(removed)
    }

    // =========================================================================
    // Checkout Steps (CheckoutFinalizer only)
    // =========================================================================

    /// Freezes the cart and hands out what is being sold.
    pub(crate) fn begin_checkout(&self) -> Result<CheckoutDraft, TransactionError> {
        let mut state = self.lock();
        if state.checkout_in_flight {
            return Err(TransactionError::InFlight(self.terminal.clone()));
        }
        if state.cart.is_empty() {
            return Err(TransactionError::EmptyCart);
        }

        state.checkout_in_flight = true;
        Ok(CheckoutDraft {
            snapshot: CartSnapshot {
                items: state.cart.items.clone(),
                discounts: state.discounts.clone(),
            },
            totals: self.totals_of(&state),
        })
    }

    /// The sale was not recorded: put the cart back and unfreeze it.
    pub(crate) fn abort_checkout(&self, snapshot: CartSnapshot) {
        let mut state = self.lock();
        state.checkout_in_flight = false;
        state.cart.replace_items(snapshot.items);
        state.discounts = snapshot.discounts;
        self.after_change(&mut state);
    }

    /// The sale is recorded: the cart is done.
    pub(crate) fn complete_checkout(&self) {
        let mut state = self.lock();
        state.checkout_in_flight = false;
        state.cart.clear();
        state.discounts.clear();
        state.adjustments.clear();
        self.after_change(&mut state);
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub fn persistence_status(&self) -> Option<PersistenceStatus> {
        self.persister.as_ref().map(PersisterHandle::status)
    }

    /// Set once remote saves have failed past the configured threshold.
    pub fn persistence_warning(&self) -> Option<PersistenceWarning> {
        self.persister.as_ref().and_then(PersisterHandle::warning)
    }

    /// Flushes the pending cart and stops the persister.
    pub fn shutdown_persistence(&self) {
        if let Some(persister) = &self.persister {
            persister.shutdown();
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn lock(&self) -> MutexGuard<'_, CartState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn totals_of(&self, state: &CartState) -> CartTotals {
        let discount = state
            .discounts
            .amount(state.cart.subtotal(), &self.policy);
        CartTotals::with_discount(&state.cart, discount)
    }

    /// Runs a cart mutation, then revalidates discounts and persists.
    fn mutate<R, F>(&self, f: F) -> CoreResult<(R, CartChange)>
    where
        F: FnOnce(&mut CartState) -> CoreResult<R>,
    {
        let mut state = self.lock();
        ensure_not_checking_out(&state, &self.terminal)?;

        let result = f(&mut state)?;
        let change = self.after_change(&mut state);
        Ok((result, change))
    }

    fn after_change(&self, state: &mut CartState) -> CartChange {
        let evicted = state.discounts.revalidate(&state.cart, self.catalog.as_ref());
        log_evictions(&self.terminal, &evicted);

        if let Some(persister) = &self.persister {
            persister.schedule(state.cart.items.clone());
        }

        CartChange {
            totals: self.totals_of(state),
            evicted,
        }
    }

    fn with_line<R, F>(&self, key: &LineKey, f: F) -> CoreResult<R>
    where
        F: FnOnce(&mut QuantityAdjustments, &LineItem) -> CoreResult<R>,
    {
        let mut state = self.lock();
        ensure_not_checking_out(&state, &self.terminal)?;
        let state = &mut *state;

        let item = state
            .cart
            .find(key)
            .ok_or_else(|| CoreError::LineItemNotFound(key.clone()))?;
        f(&mut state.adjustments, item)
    }
}

fn ensure_not_checking_out(state: &CartState, terminal: &str) -> CoreResult<()> {
    if state.checkout_in_flight {
        return Err(CoreError::InvalidTransition {
            key: terminal.to_string(),
            state: "checking out",
            action: "edit the cart",
        });
    }
    Ok(())
}

/// A line removed outside the void flow takes its idle adjustment with it.
fn drop_idle_adjustment(state: &mut CartState, key: &LineKey) {
    if state.adjustments.phase(key) != AdjustmentPhase::Authorizing {
        state.adjustments.discard(key);
    }
}

fn log_evictions(terminal: &str, evicted: &[Evicted]) {
    for eviction in evicted {
        info!(
            terminal = %terminal,
            discount = %eviction.discount.id,
            reason = %eviction.reason,
            "Discount no longer applies, removed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        discount, jeans, line, tee, FakeCartRemote, FakeCatalog, FakeLocalCache,
    };
    use till_core::discount::DiscountScope;
    use till_core::Money;

    fn store_with(catalog: FakeCatalog) -> CartStore {
        let catalog = Arc::new(catalog);
        CartStore::new(
            "till-1",
            Arc::new(CatalogCache::new(catalog.clone(), catalog)),
        )
    }

    fn store() -> CartStore {
        store_with(FakeCatalog::new(vec![tee(), jeans()], vec![]))
    }

    fn tee_m() -> LineKey {
        LineKey::new("p-tee", Some("M"))
    }

    #[test]
    fn test_stock_ceiling_reports_cart_quantity() {
        let store = store();
        store.add_item(line("M", 3)).unwrap();

        store.set_quantity(&tee_m(), 4).unwrap();
        assert_eq!(store.quantity_of(&tee_m()), Some(4));

        store.set_quantity(&tee_m(), 3).unwrap();
        let err = store.set_quantity(&tee_m(), 6).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Tee (M): 3 already in cart, 5 available"
        );
        assert_eq!(store.quantity_of(&tee_m()), Some(3));
    }

    #[test]
    fn test_duplicate_needs_explicit_merge() {
        let store = store();
        store.add_item(line("M", 1)).unwrap();

        let err = store.add_item(line("M", 2)).unwrap_err();
        assert_eq!(err, CoreError::DuplicateLineItem(tee_m()));
        assert_eq!(store.quantity_of(&tee_m()), Some(1));

        store.merge_item(line("M", 2)).unwrap();
        assert_eq!(store.quantity_of(&tee_m()), Some(3));
    }

    #[test]
    fn test_zero_quantity_removes() {
        let store = store();
        store.add_item(line("M", 2)).unwrap();
        store.set_quantity(&tee_m(), 0).unwrap();
        assert!(store.with_cart(Cart::is_empty));
    }

    #[tokio::test]
    async fn test_category_discount_evicted_by_other_category() {
        let store = store_with(FakeCatalog::new(
            vec![tee(), jeans()],
            vec![discount("d-tops", "10%", DiscountScope::Category, Some("Tops"))],
        ));
        store.add_item(line("M", 2)).unwrap();

        let applied = store.attach_discount_id("d-tops").await.unwrap();
        assert_eq!(applied.id, "d-tops");
        assert_eq!(store.totals().discount, Money::from_cents(5_510));

        let change = store.add_product(&jeans(), None, 1).unwrap();
        assert_eq!(change.evicted.len(), 1);
        assert_eq!(change.evicted[0].discount.id, "d-tops");
        assert!(store.applied_discounts().is_empty());
        assert_eq!(change.totals.discount, Money::zero());
    }

    #[tokio::test]
    async fn test_discount_code_lookup() {
        let mut summer = discount("d-1", "₱50 OFF", DiscountScope::All, None);
        summer.code = Some("SUMMER50".into());
        let store = store_with(FakeCatalog::new(vec![tee()], vec![summer]));
        store.add_item(line("L", 1)).unwrap();

        let applied = store.attach_discount_code("  summer50 ").await.unwrap();
        assert_eq!(applied.id, "d-1");
        assert_eq!(store.totals().total, Money::from_cents(20_000));

        assert!(store.attach_discount_code("nope").await.is_err());
    }

    #[test]
    fn test_increase_commits_without_authorization() {
        let store = store();
        store.add_item(line("M", 2)).unwrap();

        assert_eq!(store.propose_quantity(&tee_m(), 9).unwrap(), 5);
        assert_eq!(store.quantity_of(&tee_m()), Some(2));

        let outcome = store.confirm_adjustment(&tee_m()).unwrap();
        assert!(matches!(outcome, ConfirmOutcome::CommitIncrease { quantity: 5, .. }));
        assert_eq!(store.quantity_of(&tee_m()), Some(5));
        assert_eq!(store.adjustment_phase(&tee_m()), AdjustmentPhase::Committed);
    }

    #[test]
    fn test_decrease_waits_for_authorization() {
        let store = store();
        store.add_item(line("M", 5)).unwrap();

        store.propose_quantity(&tee_m(), 2).unwrap();
        let outcome = store.confirm_adjustment(&tee_m()).unwrap();
        match outcome {
            ConfirmOutcome::RequiresAuthorization(ticket) => assert_eq!(ticket.void_quantity, 3),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(store.quantity_of(&tee_m()), Some(5));
        assert_eq!(store.adjustment_phase(&tee_m()), AdjustmentPhase::AwaitingAuth);

        assert!(store.cancel_adjustment(&tee_m()).unwrap());
        assert_eq!(store.adjustment_phase(&tee_m()), AdjustmentPhase::Committed);
        assert_eq!(store.quantity_of(&tee_m()), Some(5));
    }

    #[test]
    fn test_checkout_freezes_cart() {
        let store = store();
        store.add_item(line("M", 1)).unwrap();

        let draft = store.begin_checkout().unwrap();
        assert!(store.is_checking_out());
        assert!(store.add_item(line("L", 1)).is_err());
        assert_eq!(
            store.begin_checkout().unwrap_err(),
            TransactionError::InFlight("till-1".into())
        );

        store.abort_checkout(draft.snapshot.clone());
        assert!(!store.is_checking_out());
        assert_eq!(store.items(), draft.snapshot.items);
    }

    #[test]
    fn test_empty_cart_cannot_check_out() {
        assert_eq!(
            store().begin_checkout().unwrap_err(),
            TransactionError::EmptyCart
        );
    }

    #[tokio::test]
    async fn test_load_prefers_remote() {
        let remote = FakeCartRemote::new();
        remote.put("till-1", vec![line("M", 2)]);
        let local = FakeLocalCache::new();
        local.put("till-1", vec![line("L", 1)]);

        let store = store();
        assert_eq!(store.load(&remote, &local).await, CartSource::Remote);
        assert_eq!(store.quantity_of(&tee_m()), Some(2));
    }

    #[tokio::test]
    async fn test_load_falls_back_to_local() {
        let local = FakeLocalCache::new();
        local.put("till-1", vec![line("L", 1)]);

        // Remote empty
        let store = store();
        assert_eq!(
            store.load(&FakeCartRemote::new(), &local).await,
            CartSource::Local
        );

        // Remote unreachable
        let remote = FakeCartRemote::new();
        remote.put("till-1", vec![line("M", 2)]);
        remote.fail_next(1);
        let store = self::store();
        assert_eq!(store.load(&remote, &local).await, CartSource::Local);
        assert_eq!(store.quantity_of(&LineKey::new("p-tee", Some("L"))), Some(1));

        // Nothing anywhere
        let store = self::store();
        assert_eq!(
            store
                .load(&FakeCartRemote::new(), &FakeLocalCache::new())
                .await,
            CartSource::Empty
        );
        assert!(store.with_cart(Cart::is_empty));
    }
}
