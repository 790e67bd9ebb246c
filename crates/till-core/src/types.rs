//! # Domain Types
//!
//! Core domain types used throughout Till POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │    LineItem     │   │ TransactionReq  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │──►│  productId      │──►│  items          │       │
//! │  │  sizes{S,M,L}   │   │  selectedSize   │   │  paymentMethod  │       │
//! │  │  currentStock   │   │  quantity       │   │  total          │       │
//! │  │  itemPrice      │   │  unitPrice      │   │  status         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   SizeStock     │   │   VoidRecord    │   │   StockDelta    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  quantity       │   │  lines          │   │  productId      │       │
//! │  │  price?         │   │  reason         │   │  size?          │       │
//! │  │  (normalized)   │   │  approver       │   │  quantity       │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Size Data at the Boundary
//! The catalog sends a size entry either as a bare number (legacy,
//! quantity only) or as `{quantity, price}`. Both shapes are folded into
//! [`SizeStock`] during deserialization; nothing past this module ever
//! looks at the raw shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::money::Money;
use crate::MAX_ITEM_QUANTITY;

// =============================================================================
// Line Key
// =============================================================================

/// Identity of a line in the cart: product plus optional size.
///
/// At most one LineItem per key exists in a cart.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineKey {
    pub product_id: String,
    pub size: Option<String>,
}

impl LineKey {
    pub fn new(product_id: impl Into<String>, size: Option<&str>) -> Self {
        LineKey {
            product_id: product_id.into(),
            size: size.map(str::to_string),
        }
    }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.size {
            Some(size) => write!(f, "{} [{}]", self.product_id, size),
            None => write!(f, "{}", self.product_id),
        }
    }
}

// =============================================================================
// Size Stock
// =============================================================================

/// Stock and optional price override for one size of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawSizeEntry")]
pub struct SizeStock {
    /// Units on hand for this size. `None` defers to the product level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,

    /// Size-specific price. `None` falls back to `itemPrice`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
}

impl SizeStock {
    pub fn new(quantity: i64, price: Option<Money>) -> Self {
        SizeStock {
            quantity: Some(quantity),
            price,
        }
    }
}

/// Both wire shapes of a size entry.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSizeEntry {
    Quantity(i64),
    Detailed {
        #[serde(default)]
        quantity: Option<i64>,
        #[serde(default)]
        price: Option<Money>,
    },
}

impl From<RawSizeEntry> for SizeStock {
    fn from(raw: RawSizeEntry) -> Self {
        match raw {
            RawSizeEntry::Quantity(quantity) => SizeStock {
                quantity: Some(quantity),
                price: None,
            },
            RawSizeEntry::Detailed { quantity, price } => SizeStock { quantity, price },
        }
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product as returned by the catalog service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,

    /// Display name shown to cashier and on receipt.
    pub name: String,

    #[serde(default)]
    pub sku: Option<String>,

    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub category: Option<String>,

    /// Size label → stock/price. Empty for sizeless products.
    #[serde(default)]
    pub sizes: BTreeMap<String, SizeStock>,

    /// Product-level stock, used when the product has no sizes.
    #[serde(default)]
    pub current_stock: Option<i64>,

    /// Product-level price, the fallback for sizes without their own.
    #[serde(default)]
    pub item_price: Money,
}

/// Stock and price for one concrete (product, size) selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSize {
    pub size: Option<String>,
    /// `None` means the catalog carries no stock figure (untracked).
    pub stock: Option<i64>,
    pub price: Money,
}

impl Product {
    /// Returns true if this product is sold by size.
    #[inline]
    pub fn has_sizes(&self) -> bool {
        !self.sizes.is_empty()
    }

    /// Resolves a size selection against this product's size map.
    ///
    /// ## Rules
    /// - Sized product: a size must be given and must exist in the map
    /// - Sizeless product: no size may be given
    /// - Stock comes from the size entry, else `currentStock`
    /// - Price comes from the size entry, else `itemPrice`
    pub fn resolve_size(&self, size: Option<&str>) -> Result<ResolvedSize, ValidationError> {
        match (self.has_sizes(), size) {
            (true, None) => Err(ValidationError::SizeRequired {
                product: self.name.clone(),
            }),
            (true, Some(label)) => {
                let entry = self
                    .sizes
                    .get(label)
                    .ok_or_else(|| ValidationError::UnknownSize {
                        product: self.name.clone(),
                        size: label.to_string(),
                    })?;
                Ok(ResolvedSize {
                    size: Some(label.to_string()),
                    stock: entry.quantity.or(self.current_stock),
                    price: entry.price.unwrap_or(self.item_price),
                })
            }
            (false, Some(label)) => Err(ValidationError::SizeNotApplicable {
                product: self.name.clone(),
                size: label.to_string(),
            }),
            (false, None) => Ok(ResolvedSize {
                size: None,
                stock: self.current_stock,
                price: self.item_price,
            }),
        }
    }
}

// =============================================================================
// Line Item
// =============================================================================

/// One product+size+quantity entry in a cart.
///
/// ## Price Freezing
/// `unit_price` and the stock map are copied from the catalog when the item
/// is added. A catalog update mid-sale does not change what the customer
/// was quoted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: String,

    #[serde(default)]
    pub selected_size: Option<String>,

    pub quantity: i64,

    pub unit_price: Money,

    pub name: String,

    #[serde(default)]
    pub sku: Option<String>,

    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sizes: BTreeMap<String, SizeStock>,

    #[serde(default)]
    pub current_stock: Option<i64>,
}

impl LineItem {
    /// Builds a line item from a catalog product, freezing price and display data.
    pub fn from_product(
        product: &Product,
        size: Option<&str>,
        quantity: i64,
    ) -> Result<Self, ValidationError> {
        if quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            });
        }
        let resolved = product.resolve_size(size)?;

        Ok(LineItem {
            product_id: product.id.clone(),
            selected_size: resolved.size,
            quantity,
            unit_price: resolved.price,
            name: product.name.clone(),
            sku: product.sku.clone(),
            image: product.image.clone(),
            category: product.category.clone(),
            sizes: product.sizes.clone(),
            current_stock: product.current_stock,
        })
    }

    /// Returns this line's cart key.
    pub fn key(&self) -> LineKey {
        LineKey {
            product_id: self.product_id.clone(),
            size: self.selected_size.clone(),
        }
    }

    /// Returns true if this line has the given key.
    pub fn matches(&self, key: &LineKey) -> bool {
        self.product_id == key.product_id && self.selected_size == key.size
    }

    /// Size-specific stock, else product-level stock, else `None` (untracked).
    pub fn available_stock(&self) -> Option<i64> {
        self.selected_size
            .as_ref()
            .and_then(|size| self.sizes.get(size))
            .and_then(|entry| entry.quantity)
            .or(self.current_stock)
    }

    /// Highest quantity this line may hold.
    ///
    /// Untracked products are capped only by the global per-line limit.
    pub fn stock_ceiling(&self) -> i64 {
        self.available_stock()
            .map(|stock| stock.max(0).min(MAX_ITEM_QUANTITY))
            .unwrap_or(MAX_ITEM_QUANTITY)
    }

    /// Returns `unit_price × quantity`.
    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }

    /// Name shown to the cashier, e.g. "Tee (M)".
    pub fn display_name(&self) -> String {
        match &self.selected_size {
            Some(size) => format!("{} ({})", self.name, size),
            None => self.name.clone(),
        }
    }
}

// =============================================================================
// Payment & Transaction
// =============================================================================

/// Abstract payment method tag recorded with a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Qr,
    /// Used for the aggregate entry written by a bulk void.
    Void,
}

/// Status of a transaction entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Completed,
    Voided,
}

/// Who performed or authorized an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operator {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// The identity returned by a successful PIN verification.
pub type Approver = Operator;

/// What the cashier chose at the payment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMeta {
    pub method: PaymentMethod,
    pub performed_by: Operator,
    /// External reference, e.g. a QR payment id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// One line of a transaction submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLine {
    pub product_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

impl From<&LineItem> for TransactionLine {
    fn from(item: &LineItem) -> Self {
        TransactionLine {
            product_id: item.product_id.clone(),
            name: item.name.clone(),
            sku: item.sku.clone(),
            size: item.selected_size.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            line_total: item.line_total(),
        }
    }
}

/// A voided line as it appears in the aggregate bulk-void transaction.
impl From<&VoidedLine> for TransactionLine {
    fn from(line: &VoidedLine) -> Self {
        TransactionLine {
            product_id: line.product_id.clone(),
            name: line.name.clone(),
            sku: None,
            size: line.size.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.value,
        }
    }
}

/// Body of a transaction submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub terminal: String,
    pub items: Vec<TransactionLine>,
    pub payment_method: PaymentMethod,
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discount_ids: Vec<String>,
    pub performed_by: Operator,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
}

/// The record created by the transaction service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: String,
    #[serde(default)]
    pub receipt_id: Option<String>,
    pub status: TransactionStatus,
    pub total: Money,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Stock
// =============================================================================

/// One inventory decrement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockDelta {
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    pub quantity: i64,
}

impl From<&LineItem> for StockDelta {
    fn from(item: &LineItem) -> Self {
        StockDelta {
            product_id: item.product_id.clone(),
            size: item.selected_size.clone(),
            quantity: item.quantity,
        }
    }
}

// =============================================================================
// Voids
// =============================================================================

/// Why an item was voided. A fixed set chosen by the cashier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoidReason {
    #[serde(rename = "Customer changed mind")]
    CustomerChangedMind,
    #[serde(rename = "Wrong item")]
    WrongItem,
    #[serde(rename = "Damaged item")]
    DamagedItem,
    #[serde(rename = "Pricing error")]
    PricingError,
    #[serde(rename = "Duplicate scan")]
    DuplicateScan,
    #[serde(rename = "Other")]
    Other,
}

impl VoidReason {
    /// Every reason, in picker order.
    pub const ALL: [VoidReason; 6] = [
        VoidReason::CustomerChangedMind,
        VoidReason::WrongItem,
        VoidReason::DamagedItem,
        VoidReason::PricingError,
        VoidReason::DuplicateScan,
        VoidReason::Other,
    ];

    pub const fn label(&self) -> &'static str {
        match self {
            VoidReason::CustomerChangedMind => "Customer changed mind",
            VoidReason::WrongItem => "Wrong item",
            VoidReason::DamagedItem => "Damaged item",
            VoidReason::PricingError => "Pricing error",
            VoidReason::DuplicateScan => "Duplicate scan",
            VoidReason::Other => "Other",
        }
    }
}

impl fmt::Display for VoidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether a void came from the per-item flow or the bulk picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoidSource {
    SingleItem,
    Bulk,
}

/// One voided line inside a VoidRecord.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoidedLine {
    pub product_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub value: Money,
}

impl VoidedLine {
    /// Describes voiding `quantity` units of `item`.
    pub fn of(item: &LineItem, quantity: i64) -> Self {
        VoidedLine {
            product_id: item.product_id.clone(),
            name: item.name.clone(),
            size: item.selected_size.clone(),
            quantity,
            unit_price: item.unit_price,
            value: item.unit_price.multiply_quantity(quantity),
        }
    }
}

/// Immutable audit entry for an authorized reduction or removal.
///
/// Only built after the PIN was verified and the cart mutation was
/// confirmed by a read-back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoidRecord {
    pub id: Uuid,
    pub terminal: String,
    pub source: VoidSource,
    pub items: Vec<VoidedLine>,
    pub quantity: i64,
    pub value: Money,
    pub reason: VoidReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub approver: Approver,
    pub created_at: DateTime<Utc>,
}

impl VoidRecord {
    pub fn new(
        terminal: impl Into<String>,
        source: VoidSource,
        items: Vec<VoidedLine>,
        reason: VoidReason,
        note: Option<String>,
        approver: Approver,
    ) -> Self {
        let quantity = items.iter().map(|line| line.quantity).sum();
        let value = items.iter().map(|line| line.value).sum();
        VoidRecord {
            id: Uuid::new_v4(),
            terminal: terminal.into(),
            source,
            items,
            quantity,
            value,
            reason,
            note,
            approver,
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
