//! # Discounts
//!
//! Discount value grammar, applicability rules and stacking.
//!
//! ## Value Grammar
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  discountValue  :=  [prefix] magnitude ['%'] ['OFF']                    │
//! │                                                                         │
//! │  prefix     any run of currency symbols or letters   ₱  $  PHP          │
//! │  magnitude  decimal number, thousands commas allowed 15  12.5  1,000    │
//! │  '%'        marks a percentage of the subtotal                          │
//! │  'OFF'      optional, case-insensitive                                  │
//! │                                                                         │
//! │  "15% OFF"   → Percent(1500 bps)                                        │
//! │  "₱50 OFF"   → Fixed(50.00)                                             │
//! │  50          → Fixed(50.00)   (JSON numbers are fixed amounts)          │
//! │  "half off"  → unparseable, contributes 0.00                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Applicability
//! ```text
//! scope              valid iff                          empty cart
//! ─────              ─────────                          ──────────
//! all                always                             valid
//! category           every line resolves to category    invalid
//! specific-products  every line's product is listed     invalid
//! ```
//!
//! Applied discounts are re-checked after every cart change and any that
//! no longer fit are evicted ([`AppliedDiscounts::revalidate`]).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::cart::Cart;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{LineItem, Product};

/// 100% in basis points.
const FULL_BPS: u32 = 10_000;

/// Category label used for lines whose category cannot be resolved.
pub const UNCATEGORIZED: &str = "Uncategorized";

// =============================================================================
// Discount Value
// =============================================================================

/// The monetary effect of a parsed discount value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscountAmount {
    /// Share of the subtotal in basis points, at most 100%.
    Percent(u32),
    /// Literal amount off.
    Fixed(Money),
}

/// A discount value as written in the catalog, plus its parsed amount.
///
/// Parsing never fails: text outside the grammar keeps `amount == None`
/// and contributes zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountValue {
    raw: String,
    amount: Option<DiscountAmount>,
}

impl DiscountValue {
    pub fn percent(bps: u32) -> Self {
        let bps = bps.min(FULL_BPS);
        DiscountValue {
            raw: format!("{}% OFF", Decimal::new(bps as i64, 2).normalize()),
            amount: Some(DiscountAmount::Percent(bps)),
        }
    }

    pub fn fixed(amount: Money) -> Self {
        DiscountValue {
            raw: amount.to_string(),
            amount: Some(DiscountAmount::Fixed(amount)),
        }
    }

    /// The text as received.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The parsed amount, `None` if unparseable.
    pub fn amount(&self) -> Option<DiscountAmount> {
        self.amount
    }

    pub fn is_parseable(&self) -> bool {
        self.amount.is_some()
    }

    /// Money off for a given subtotal.
    pub fn amount_for(&self, subtotal: Money) -> Money {
        match self.amount {
            Some(DiscountAmount::Percent(bps)) => subtotal.percentage(bps),
            Some(DiscountAmount::Fixed(amount)) => amount,
            None => Money::zero(),
        }
    }
}

impl FromStr for DiscountValue {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DiscountValue {
            raw: s.to_string(),
            amount: parse_amount(s),
        })
    }
}

impl fmt::Display for DiscountValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_amount(input: &str) -> Option<DiscountAmount> {
    let mut text = input.trim();

    let suffix_at = text.len().saturating_sub(3);
    if text.get(suffix_at..).is_some_and(|tail| tail.eq_ignore_ascii_case("off")) {
        text = text[..suffix_at].trim_end();
    }

    let (text, is_percent) = match text.strip_suffix('%') {
        Some(rest) => (rest.trim_end(), true),
        None => (text, false),
    };

    let start = text.find(|c: char| c.is_ascii_digit() || c == '.')?;
    let (prefix, magnitude) = text.split_at(start);
    if prefix.chars().any(|c| c == '-' || c == '+' || c.is_ascii_digit()) {
        return None;
    }

    let magnitude: String = magnitude.chars().filter(|c| *c != ',').collect();
    let magnitude = Decimal::from_str(&magnitude).ok()?;
    if magnitude.is_sign_negative() {
        return None;
    }

    if is_percent {
        let bps = (magnitude * Decimal::ONE_HUNDRED).round().to_u32()?;
        Some(DiscountAmount::Percent(bps.min(FULL_BPS)))
    } else {
        Money::from_decimal(magnitude).map(DiscountAmount::Fixed)
    }
}

/// Wire shapes of `discountValue`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDiscountValue {
    Number(serde_json::Number),
    Text(String),
}

impl<'de> Deserialize<'de> for DiscountValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawDiscountValue::deserialize(deserializer)? {
            RawDiscountValue::Number(number) => {
                let raw = number.to_string();
                let amount = Decimal::from_str(&raw)
                    .or_else(|_| Decimal::from_scientific(&raw))
                    .ok()
                    .filter(|d| !d.is_sign_negative())
                    .and_then(Money::from_decimal)
                    .map(DiscountAmount::Fixed);
                DiscountValue { raw, amount }
            }
            RawDiscountValue::Text(text) => {
                let amount = parse_amount(&text);
                DiscountValue { raw: text, amount }
            }
        })
    }
}

impl Serialize for DiscountValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

// =============================================================================
// Discount Definition
// =============================================================================

/// Which lines a discount may cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscountScope {
    #[serde(alias = "All")]
    All,
    #[serde(alias = "Category")]
    Category,
    #[serde(alias = "specific_products", alias = "specificProducts")]
    SpecificProducts,
    /// Any scope this terminal does not understand. Never applicable.
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountStatus {
    #[serde(alias = "Active")]
    Active,
    #[serde(alias = "Inactive")]
    Inactive,
}

/// A discount from the discount catalog. Read-only to the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountDefinition {
    pub id: String,

    pub title: String,

    /// Code typed at the prompt. Discounts without one are looked up by title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    pub discount_value: DiscountValue,

    #[serde(rename = "appliesToScope", alias = "appliesTo")]
    pub scope: DiscountScope,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub product_ids: Vec<String>,

    pub status: DiscountStatus,
}

impl DiscountDefinition {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == DiscountStatus::Active
    }

    /// The string matched by a code lookup.
    pub fn lookup_code(&self) -> &str {
        self.code.as_deref().unwrap_or(&self.title)
    }
}

// =============================================================================
// Category Resolution
// =============================================================================

/// Resolves a product's category when the line item does not carry one.
pub trait CategorySource {
    fn category_of(&self, product_id: &str) -> Option<String>;
}

/// No catalog available: only categories stored on lines count.
impl CategorySource for () {
    fn category_of(&self, _product_id: &str) -> Option<String> {
        None
    }
}

impl CategorySource for [Product] {
    fn category_of(&self, product_id: &str) -> Option<String> {
        self.iter()
            .find(|product| product.id == product_id)
            .and_then(|product| product.category.clone())
    }
}

impl CategorySource for Vec<Product> {
    fn category_of(&self, product_id: &str) -> Option<String> {
        self.as_slice().category_of(product_id)
    }
}

/// Category of a line: its own, else the catalog's, else `None`.
pub fn resolve_category<C>(item: &LineItem, categories: &C) -> Option<String>
where
    C: CategorySource + ?Sized,
{
    item.category
        .clone()
        .filter(|category| !category.trim().is_empty())
        .or_else(|| categories.category_of(&item.product_id))
}

// =============================================================================
// Applicability
// =============================================================================

/// Why a discount cannot be applied to the current cart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Inapplicable {
    #[error("{title} is not active")]
    Inactive { title: String },

    #[error("{title} needs items in the cart; only store-wide discounts apply to an empty cart")]
    EmptyCart { title: String },

    #[error("{title} applies to {required} only; cart also has {}", .found.join(", "))]
    CategoryMismatch {
        title: String,
        required: String,
        /// Mismatched categories present in the cart.
        found: Vec<String>,
    },

    #[error("{title} applies to selected products only; not eligible: {}", .products.join(", "))]
    ProductsNotCovered { title: String, products: Vec<String> },

    #[error("{title} has a scope this terminal does not support")]
    UnsupportedScope { title: String },
}

/// Decides whether `discount` may be applied to `cart`.
pub fn is_applicable<C>(
    discount: &DiscountDefinition,
    cart: &Cart,
    categories: &C,
) -> Result<(), Inapplicable>
where
    C: CategorySource + ?Sized,
{
    let title = || discount.title.clone();

    if !discount.is_active() {
        return Err(Inapplicable::Inactive { title: title() });
    }

    match discount.scope {
        DiscountScope::All => Ok(()),
        _ if cart.is_empty() => Err(Inapplicable::EmptyCart { title: title() }),
        DiscountScope::Category => {
            let required = discount.category.clone().unwrap_or_default();
            let wanted = required.trim();
            let found: BTreeSet<String> = cart
                .items
                .iter()
                .map(|item| {
                    resolve_category(item, categories)
                        .unwrap_or_else(|| UNCATEGORIZED.to_string())
                })
                .filter(|category| wanted.is_empty() || category.trim() != wanted)
                .collect();

            if found.is_empty() {
                Ok(())
            } else {
                Err(Inapplicable::CategoryMismatch {
                    title: title(),
                    required,
                    found: found.into_iter().collect(),
                })
            }
        }
        DiscountScope::SpecificProducts => {
            let products: Vec<String> = cart
                .items
                .iter()
                .filter(|item| !discount.product_ids.contains(&item.product_id))
                .map(|item| item.name.clone())
                .collect();

            if products.is_empty() {
                Ok(())
            } else {
                Err(Inapplicable::ProductsNotCovered {
                    title: title(),
                    products,
                })
            }
        }
        DiscountScope::Unsupported => Err(Inapplicable::UnsupportedScope { title: title() }),
    }
}

/// Finds an active discount by code, case-insensitively.
pub fn find_by_code<'a>(
    catalog: &'a [DiscountDefinition],
    code: &str,
) -> Option<&'a DiscountDefinition> {
    let code = code.trim();
    catalog
        .iter()
        .filter(|discount| discount.is_active())
        .find(|discount| discount.lookup_code().trim().eq_ignore_ascii_case(code))
}

// =============================================================================
// Stacking
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackingMode {
    /// Every applied discount counts.
    #[default]
    Additive,
    /// Only the single largest discount counts.
    LargestOnly,
}

/// How several applied discounts combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StackingPolicy {
    #[serde(default)]
    pub mode: StackingMode,

    /// Ceiling on the combined discount, as a share of the subtotal.
    #[serde(default)]
    pub cap_bps: Option<u32>,
}

/// Combined money off for `applied` against `subtotal`.
///
/// Never exceeds the subtotal.
pub fn compute_discount_amount<'a, I>(applied: I, subtotal: Money, policy: &StackingPolicy) -> Money
where
    I: IntoIterator<Item = &'a DiscountDefinition>,
{
    let amounts = applied
        .into_iter()
        .map(|discount| discount.discount_value.amount_for(subtotal).non_negative());

    let combined = match policy.mode {
        StackingMode::Additive => amounts.sum(),
        StackingMode::LargestOnly => amounts.max().unwrap_or_default(),
    };

    let capped = match policy.cap_bps {
        Some(cap) => combined.min(subtotal.percentage(cap.min(FULL_BPS))),
        None => combined,
    };

    capped.min(subtotal.non_negative())
}

// =============================================================================
// Applied Discounts
// =============================================================================

/// A discount dropped by [`AppliedDiscounts::revalidate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evicted {
    pub discount: DiscountDefinition,
    pub reason: Inapplicable,
}

/// The discounts attached to a cart, unique by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedDiscounts {
    discounts: Vec<DiscountDefinition>,
}

impl AppliedDiscounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a discount after checking it against the cart.
    ///
    /// Returns `false` if a discount with the same id is already attached.
    pub fn attach<C>(
        &mut self,
        discount: DiscountDefinition,
        cart: &Cart,
        categories: &C,
    ) -> CoreResult<bool>
    where
        C: CategorySource + ?Sized,
    {
        if self.contains(&discount.id) {
            return Ok(false);
        }
        is_applicable(&discount, cart, categories)?;
        self.discounts.push(discount);
        Ok(true)
    }

    /// Looks a code up in `catalog` and attaches the match.
    pub fn attach_code<C>(
        &mut self,
        catalog: &[DiscountDefinition],
        code: &str,
        cart: &Cart,
        categories: &C,
    ) -> CoreResult<DiscountDefinition>
    where
        C: CategorySource + ?Sized,
    {
        let discount = find_by_code(catalog, code)
            .cloned()
            .ok_or_else(|| CoreError::DiscountNotFound(code.trim().to_string()))?;
        self.attach(discount.clone(), cart, categories)?;
        Ok(discount)
    }

    pub fn detach(&mut self, id: &str) -> Option<DiscountDefinition> {
        let index = self.discounts.iter().position(|d| d.id == id)?;
        Some(self.discounts.remove(index))
    }

    /// Re-checks every attached discount against `cart`, dropping failures.
    pub fn revalidate<C>(&mut self, cart: &Cart, categories: &C) -> Vec<Evicted>
    where
        C: CategorySource + ?Sized,
    {
        let mut evicted = Vec::new();
        self.discounts.retain(|discount| match is_applicable(discount, cart, categories) {
            Ok(()) => true,
            Err(reason) => {
                evicted.push(Evicted {
                    discount: discount.clone(),
                    reason,
                });
                false
            }
        });
        evicted
    }

    /// Money off for `subtotal` under `policy`.
    pub fn amount(&self, subtotal: Money, policy: &StackingPolicy) -> Money {
        compute_discount_amount(&self.discounts, subtotal, policy)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.discounts.iter().any(|d| d.id == id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.discounts.iter().map(|d| d.id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiscountDefinition> {
        self.discounts.iter()
    }

    pub fn len(&self) -> usize {
        self.discounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.discounts.is_empty()
    }

    pub fn clear(&mut self) {
        self.discounts.clear();
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LineItem, Product};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn value(text: &str) -> DiscountValue {
        text.parse().unwrap()
    }

    fn product(id: &str, category: Option<&str>) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Item {}", id),
            sku: None,
            image: None,
            category: category.map(str::to_string),
            sizes: BTreeMap::new(),
            current_stock: Some(10),
            item_price: Money::from_cents(10000),
        }
    }

    fn cart_of(products: &[Product]) -> Cart {
        let mut cart = Cart::new("till-1");
        for p in products {
            cart.add_item(LineItem::from_product(p, None, 1).unwrap())
                .unwrap();
        }
        cart
    }

    fn discount(id: &str, scope: DiscountScope, value_text: &str) -> DiscountDefinition {
        DiscountDefinition {
            id: id.to_string(),
            title: format!("Promo {}", id),
            code: None,
            discount_value: value(value_text),
            scope,
            category: None,
            product_ids: Vec::new(),
            status: DiscountStatus::Active,
        }
    }

    fn tops_promo() -> DiscountDefinition {
        let mut d = discount("d-tops", DiscountScope::Category, "10% OFF");
        d.category = Some("Tops".to_string());
        d
    }

    #[test]
    fn test_grammar() {
        assert_eq!(value("15% OFF").amount(), Some(DiscountAmount::Percent(1500)));
        assert_eq!(value("12.5%").amount(), Some(DiscountAmount::Percent(1250)));
        assert_eq!(value("15 % off").amount(), Some(DiscountAmount::Percent(1500)));
        assert_eq!(
            value("₱50 OFF").amount(),
            Some(DiscountAmount::Fixed(Money::from_cents(5000)))
        );
        assert_eq!(
            value("PHP 1,000").amount(),
            Some(DiscountAmount::Fixed(Money::from_cents(100000)))
        );
        assert_eq!(value("250% OFF").amount(), Some(DiscountAmount::Percent(10000)));
    }

    #[test]
    fn test_unparseable_contributes_zero() {
        for text in ["half off", "", "OFF", "-5%", "5 5%", "%"] {
            let v = value(text);
            assert!(!v.is_parseable(), "{:?} should not parse", text);
            assert_eq!(v.amount_for(Money::from_cents(10000)), Money::zero());
        }
    }

    #[test]
    fn test_json_number_is_fixed_amount() {
        let v: DiscountValue = serde_json::from_value(json!(50)).unwrap();
        assert_eq!(v.amount(), Some(DiscountAmount::Fixed(Money::from_cents(5000))));

        let v: DiscountValue = serde_json::from_value(json!("20% OFF")).unwrap();
        assert_eq!(v.amount(), Some(DiscountAmount::Percent(2000)));
    }

    #[test]
    fn test_definition_wire_format() {
        let d: DiscountDefinition = serde_json::from_value(json!({
            "id": "d-1",
            "title": "Summer",
            "discountValue": "15% OFF",
            "appliesToScope": "specific-products",
            "productIds": ["p-1"],
            "status": "active"
        }))
        .unwrap();
        assert_eq!(d.scope, DiscountScope::SpecificProducts);
        assert!(d.is_active());

        let d: DiscountDefinition = serde_json::from_value(json!({
            "id": "d-2", "title": "Odd", "discountValue": 5,
            "appliesToScope": "brand", "status": "inactive"
        }))
        .unwrap();
        assert_eq!(d.scope, DiscountScope::Unsupported);
    }

    #[test]
    fn test_category_scope_requires_every_line() {
        let promo = tops_promo();
        let tee = product("tee", Some("Tops"));
        let jeans = product("jeans", Some("Bottoms"));

        assert!(is_applicable(&promo, &cart_of(&[tee.clone()]), &()).is_ok());

        let err = is_applicable(&promo, &cart_of(&[tee, jeans]), &()).unwrap_err();
        assert_eq!(
            err,
            Inapplicable::CategoryMismatch {
                title: "Promo d-tops".to_string(),
                required: "Tops".to_string(),
                found: vec!["Bottoms".to_string()],
            }
        );
    }

    #[test]
    fn test_category_must_match_exactly() {
        let promo = tops_promo();
        let shouting = product("tee", Some("TOPS"));
        let padded = product("tank", Some(" Tops "));

        assert!(is_applicable(&promo, &cart_of(&[padded]), &()).is_ok());
        assert!(matches!(
            is_applicable(&promo, &cart_of(&[shouting]), &()),
            Err(Inapplicable::CategoryMismatch { .. })
        ));
    }

    #[test]
    fn test_category_falls_back_to_catalog() {
        let promo = tops_promo();
        let catalog = vec![product("tee", Some("Tops"))];
        let cart = cart_of(&[product("tee", None)]);

        assert!(is_applicable(&promo, &cart, &catalog).is_ok());
        assert!(matches!(
            is_applicable(&promo, &cart, &()),
            Err(Inapplicable::CategoryMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_cart_only_accepts_all_scope() {
        let cart = Cart::new("till-1");
        assert!(is_applicable(&discount("d", DiscountScope::All, "5%"), &cart, &()).is_ok());
        assert!(matches!(
            is_applicable(&tops_promo(), &cart, &()),
            Err(Inapplicable::EmptyCart { .. })
        ));
    }

    #[test]
    fn test_specific_products_scope() {
        let mut promo = discount("d-p", DiscountScope::SpecificProducts, "5%");
        promo.product_ids = vec!["a".to_string()];

        assert!(is_applicable(&promo, &cart_of(&[product("a", None)]), &()).is_ok());
        assert!(matches!(
            is_applicable(&promo, &cart_of(&[product("a", None), product("b", None)]), &()),
            Err(Inapplicable::ProductsNotCovered { .. })
        ));
    }

    #[test]
    fn test_inactive_rejected() {
        let mut d = discount("d", DiscountScope::All, "5%");
        d.status = DiscountStatus::Inactive;
        assert!(matches!(
            is_applicable(&d, &Cart::new("till-1"), &()),
            Err(Inapplicable::Inactive { .. })
        ));
    }

    #[test]
    fn test_revalidate_evicts_after_mutation() {
        let mut cart = cart_of(&[product("tee", Some("Tops"))]);
        let mut applied = AppliedDiscounts::new();
        assert!(applied.attach(tops_promo(), &cart, &()).unwrap());
        assert!(applied.revalidate(&cart, &()).is_empty());

        cart.add_item(LineItem::from_product(&product("jeans", Some("Bottoms")), None, 1).unwrap())
            .unwrap();
        let evicted = applied.revalidate(&cart, &());
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].discount.id, "d-tops");
        assert!(applied.is_empty());
    }

    #[test]
    fn test_attach_is_unique_by_id() {
        let cart = cart_of(&[product("tee", Some("Tops"))]);
        let mut applied = AppliedDiscounts::new();
        assert!(applied.attach(tops_promo(), &cart, &()).unwrap());
        assert!(!applied.attach(tops_promo(), &cart, &()).unwrap());
        assert_eq!(applied.len(), 1);
    }

    #[test]
    fn test_attach_code_is_case_insensitive() {
        let mut promo = discount("d-s", DiscountScope::All, "15% OFF");
        promo.code = Some("SUMMER15".to_string());
        let mut retired = discount("d-old", DiscountScope::All, "50% OFF");
        retired.code = Some("OLD".to_string());
        retired.status = DiscountStatus::Inactive;
        let catalog = vec![promo, retired];

        let cart = cart_of(&[product("tee", None)]);
        let mut applied = AppliedDiscounts::new();
        let found = applied.attach_code(&catalog, " summer15 ", &cart, &()).unwrap();
        assert_eq!(found.id, "d-s");

        assert!(matches!(
            applied.attach_code(&catalog, "old", &cart, &()),
            Err(CoreError::DiscountNotFound(_))
        ));
    }

    #[test]
    fn test_stacking_policies() {
        let subtotal = Money::from_cents(10000);
        let applied = vec![
            discount("a", DiscountScope::All, "10%"),
            discount("b", DiscountScope::All, "₱30"),
            discount("c", DiscountScope::All, "garbage"),
        ];

        let additive = StackingPolicy::default();
        assert_eq!(
            compute_discount_amount(&applied, subtotal, &additive),
            Money::from_cents(4000)
        );

        let largest = StackingPolicy {
            mode: StackingMode::LargestOnly,
            cap_bps: None,
        };
        assert_eq!(
            compute_discount_amount(&applied, subtotal, &largest),
            Money::from_cents(3000)
        );

        let capped = StackingPolicy {
            mode: StackingMode::Additive,
            cap_bps: Some(2500),
        };
        assert_eq!(
            compute_discount_amount(&applied, subtotal, &capped),
            Money::from_cents(2500)
        );
    }

    #[test]
    fn test_fixed_discount_never_exceeds_subtotal() {
        let applied = vec![discount("a", DiscountScope::All, "₱500")];
        assert_eq!(
            compute_discount_amount(&applied, Money::from_cents(20000), &StackingPolicy::default()),
            Money::from_cents(20000)
        );
    }
}
