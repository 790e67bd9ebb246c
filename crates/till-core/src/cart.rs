//! # Cart
//!
//! The in-progress sale of one terminal.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Cart Operations                                 │
//! │                                                                         │
//! │  Cashier Action           Operation               Cart Change           │
//! │  ──────────────           ─────────               ───────────           │
//! │                                                                         │
//! │  Tap product ───────────► add_item() ───────────► push, or Duplicate   │
//! │                                                    │                    │
//! │  "Add 1 more?" → Yes ───► merge_item() ◄──────────┘ (explicit only)    │
//! │                                                                         │
//! │  Change quantity ───────► set_quantity() ───────► qty = n (≤ stock)    │
//! │                            n ≤ 0 ─────────────────► remove_item()       │
//! │                                                                         │
//! │  Sale recorded ─────────► clear()                                      │
//! │                                                                         │
//! │  Rehydrate / restore ───► replace_items()                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - At most one line per (productId, selectedSize)
//! - Every line has 1 ≤ quantity ≤ min(stock, 999)
//! - At most 100 distinct lines
//!
//! A failed operation leaves the cart exactly as it was.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{LineItem, LineKey};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

// =============================================================================
// Cart
// =============================================================================

/// The cart of one terminal, shared by everyone working that till.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    /// Terminal key this cart belongs to.
    pub terminal: String,

    /// Line items in the order they were added.
    pub items: Vec<LineItem>,

    /// When the cart last changed.
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty cart for a terminal.
    pub fn new(terminal: impl Into<String>) -> Self {
        Cart {
            terminal: terminal.into(),
            items: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Adds a new line.
    ///
    /// ## Errors
    /// - `DuplicateLineItem` if the key is already present. Quantities are
    ///   never summed here; the caller confirms with the cashier and then
    ///   calls [`Cart::merge_item`].
    /// - `InsufficientStock` if the quantity exceeds available stock
    /// - `CartTooLarge` / `QuantityTooLarge` on global limits
    pub fn add_item(&mut self, item: LineItem) -> CoreResult<()> {
        let key = item.key();
        if self.find(&key).is_some() {
            return Err(CoreError::DuplicateLineItem(key));
        }

        if self.items.len() >= MAX_CART_ITEMS {
            return Err(CoreError::CartTooLarge {
                max: MAX_CART_ITEMS,
            });
        }

        check_quantity(&item, 0, item.quantity)?;

        self.items.push(item);
        self.touch();
        Ok(())
    }

    /// Adds `item.quantity` units to an existing line, or adds the line.
    ///
    /// This is the confirmed-duplicate path. The existing line keeps its
    /// frozen price; the stock figures are refreshed from `item`.
    pub fn merge_item(&mut self, item: LineItem) -> CoreResult<()> {
        let key = item.key();
        let Some(index) = self.position(&key) else {
            return self.add_item(item);
        };

        let existing = &self.items[index];
        let merged = existing.quantity + item.quantity;
        check_quantity(&item, existing.quantity, merged)?;

        let line = &mut self.items[index];
        line.quantity = merged;
        line.sizes = item.sizes;
        line.current_stock = item.current_stock;

        self.touch();
        Ok(())
    }

    /// Sets the quantity of a line.
    ///
    /// ## Behavior
    /// - `quantity <= 0` removes the line
    /// - `quantity` above available stock fails and leaves the line unchanged
    pub fn set_quantity(&mut self, key: &LineKey, quantity: i64) -> CoreResult<()> {
        if quantity <= 0 {
            return self.remove_item(key).map(|_| ());
        }

        let index = self
            .position(key)
            .ok_or_else(|| CoreError::LineItemNotFound(key.clone()))?;

        let line = &self.items[index];
        check_quantity(line, line.quantity, quantity)?;

        self.items[index].quantity = quantity;
        self.touch();
        Ok(())
    }

    /// Removes a line, returning it.
    pub fn remove_item(&mut self, key: &LineKey) -> CoreResult<LineItem> {
        let index = self
            .position(key)
            .ok_or_else(|| CoreError::LineItemNotFound(key.clone()))?;

        let removed = self.items.remove(index);
        self.touch();
        Ok(removed)
    }

    /// Clears all lines.
    pub fn clear(&mut self) {
        self.items.clear();
        self.touch();
    }

    /// Replaces the whole item list (rehydration and checkout restore).
    ///
    /// Persisted lists are trusted as-is; they were valid when written.
    pub fn replace_items(&mut self, items: Vec<LineItem>) {
        self.items = items;
        self.touch();
    }

    /// Looks up a line by key.
    pub fn find(&self, key: &LineKey) -> Option<&LineItem> {
        self.items.iter().find(|item| item.matches(key))
    }

    /// Committed quantity of a line, `None` if absent.
    pub fn quantity_of(&self, key: &LineKey) -> Option<i64> {
        self.find(key).map(|item| item.quantity)
    }

    /// Returns the number of distinct lines.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Returns the total quantity of all lines.
    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// Sum of line totals, before discounts.
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(LineItem::line_total).sum()
    }

    /// Checks if the cart is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn position(&self, key: &LineKey) -> Option<usize> {
        self.items.iter().position(|item| item.matches(key))
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Checks a target quantity against the global limit and the line's stock.
///
/// `in_cart` is what is already committed, reported back on failure.
fn check_quantity(item: &LineItem, in_cart: i64, requested: i64) -> CoreResult<()> {
    if requested <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }

    if requested > MAX_ITEM_QUANTITY {
        return Err(CoreError::QuantityTooLarge {
            requested,
            max: MAX_ITEM_QUANTITY,
        });
    }

    if let Some(available) = item.available_stock() {
        if requested > available {
            return Err(CoreError::InsufficientStock {
                item: item.display_name(),
                available,
                in_cart,
                requested,
            });
        }
    }

    Ok(())
}

// =============================================================================
// Cart Totals
// =============================================================================

/// Cart totals summary for display and checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub item_count: usize,
    pub total_quantity: i64,
    pub subtotal: Money,
    pub discount: Money,
    /// `subtotal - discount`, never below zero.
    pub total: Money,
}

impl CartTotals {
    /// Builds totals for a cart with an already computed discount amount.
    pub fn with_discount(cart: &Cart, discount: Money) -> Self {
        let subtotal = cart.subtotal();
        let discount = discount.non_negative().min(subtotal);
        CartTotals {
            item_count: cart.item_count(),
            total_quantity: cart.total_quantity(),
            subtotal,
            discount,
            total: (subtotal - discount).non_negative(),
        }
    }
}

impl From<&Cart> for CartTotals {
    fn from(cart: &Cart) -> Self {
        CartTotals::with_discount(cart, Money::zero())
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

    fn tee(stock_m: i64) -> Product {
        let mut sizes = BTreeMap::new();
        sizes.insert("M".to_string(), SizeStock::new(stock_m, None));
        sizes.insert("L".to_string(), SizeStock::new(2, None));
        Product {
            id: "p-tee".to_string(),
            name: "Tee".to_string(),
            sku: Some("TEE-01".to_string()),
            image: None,
            category: Some("Tops".to_string()),
            sizes,
            current_stock: None,
            item_price: Money::from_cents(25000),
        }
    }

    fn mug() -> Product {
        Product {
            id: "p-mug".to_string(),
            name: "Mug".to_string(),
            sku: None,
            image: None,
            category: Some("Home".to_string()),
            sizes: BTreeMap::new(),
            current_stock: None,
            item_price: Money::from_cents(9950),
        }
    }

    fn line(product: &Product, size: Option<&str>, qty: i64) -> LineItem {
        LineItem::from_product(product, size, qty).unwrap()
    }

    #[test]
    fn test_set_quantity_respects_size_stock() {
        let mut cart = Cart::new("till-1");
        cart.add_item(line(&tee(5), Some("M"), 3)).unwrap();
        let key = LineKey::new("p-tee", Some("M"));

        cart.set_quantity(&key, 4).unwrap();
        assert_eq!(cart.quantity_of(&key), Some(4));

        cart.set_quantity(&key, 3).unwrap();
        let err = cart.set_quantity(&key, 6).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Tee (M): 3 already in cart, 5 available"
        );
        assert_eq!(cart.quantity_of(&key), Some(3));
    }

    #[test]
    fn test_add_same_key_twice_signals_duplicate() {
        let mut cart = Cart::new("till-1");
        cart.add_item(line(&tee(5), Some("M"), 1)).unwrap();

        let err = cart.add_item(line(&tee(5), Some("M"), 1)).unwrap_err();
        assert_eq!(
            err,
            CoreError::DuplicateLineItem(LineKey::new("p-tee", Some("M")))
        );
        assert_eq!(cart.total_quantity(), 1);

        // Same product, different size is a different line.
        cart.add_item(line(&tee(5), Some("L"), 1)).unwrap();
        assert_eq!(cart.item_count(), 2);
    }

    #[test]
    fn test_merge_sums_after_confirmation() {
        let mut cart = Cart::new("till-1");
        cart.add_item(line(&tee(5), Some("M"), 2)).unwrap();
        cart.merge_item(line(&tee(5), Some("M"), 2)).unwrap();
        assert_eq!(cart.quantity_of(&LineKey::new("p-tee", Some("M"))), Some(4));

        let err = cart.merge_item(line(&tee(5), Some("M"), 2)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock {
                in_cart: 4,
                available: 5,
                requested: 6,
                ..
            }
        ));
    }

    #[test]
    fn test_zero_or_negative_quantity_removes() {
        let mut cart = Cart::new("till-1");
        cart.add_item(line(&mug(), None, 2)).unwrap();
        let key = LineKey::new("p-mug", None);

        cart.set_quantity(&key, 0).unwrap();
        assert!(cart.is_empty());

        cart.add_item(line(&mug(), None, 2)).unwrap();
        cart.set_quantity(&key, -3).unwrap();
        assert!(cart.is_empty());

        assert!(matches!(
            cart.set_quantity(&key, 0),
            Err(CoreError::LineItemNotFound(_))
        ));
    }

    #[test]
    fn test_untracked_product_capped_at_global_limit() {
        let mut cart = Cart::new("till-1");
        cart.add_item(line(&mug(), None, 1)).unwrap();
        let key = LineKey::new("p-mug", None);

        cart.set_quantity(&key, 999).unwrap();
        assert!(matches!(
            cart.set_quantity(&key, 1000),
            Err(CoreError::QuantityTooLarge { .. })
        ));
    }

    #[test]
    fn test_cart_size_limit() {
        let mut cart = Cart::new("till-1");
        for i in 0..MAX_CART_ITEMS {
            let mut product = mug();
            product.id = format!("p-{}", i);
            cart.add_item(line(&product, None, 1)).unwrap();
        }
        let mut extra = mug();
        extra.id = "p-extra".to_string();
        assert!(matches!(
            cart.add_item(line(&extra, None, 1)),
            Err(CoreError::CartTooLarge { .. })
        ));
    }

    #[test]
    fn test_totals_never_negative() {
        let mut cart = Cart::new("till-1");
        cart.add_item(line(&mug(), None, 2)).unwrap();

        let totals = CartTotals::from(&cart);
        assert_eq!(totals.subtotal, Money::from_cents(19900));
        assert_eq!(totals.total, Money::from_cents(19900));

        let totals = CartTotals::with_discount(&cart, Money::from_cents(50000));
        assert_eq!(totals.discount, Money::from_cents(19900));
        assert_eq!(totals.total, Money::zero());
    }
}
