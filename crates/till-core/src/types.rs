//! # Domain Types
//!
//! Core domain types used throughout Till POS.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Item       │   │      Sale       │   │    Identity     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  uid            │       │
//! │  │  name           │   │  lines (frozen) │   │  email?         │       │
//! │  │  price (Money)  │   │  totals(frozen) │   │  is_admin       │       │
//! │  │  stock          │   │  payment_method │   └─────────────────┘       │
//! │  │  updated_at     │   │  synced         │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    ItemForm     │   │    ItemPatch    │   │  PaymentMethod  │       │
//! │  │  create input   │   │  update input   │   │  Cash | Card    │       │
//! │  │                 │   │  field-by-field │   │  DigitalWallet  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Timestamps
//! Every timestamp is truncated to whole milliseconds and serialized as
//! milliseconds since the Unix epoch. Last-writer-wins compares these values,
//! so a timestamp must survive a JSON round trip unchanged.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::merge::Versioned;
use crate::money::Money;
use crate::validation::{
    normalize_optional_text, validate_item_name, validate_optional_text, validate_price,
    validate_stock, ValidationResult,
};

// =============================================================================
// Time Helpers
// =============================================================================

/// Current time truncated to millisecond precision.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Next `updated_at` for a record last stamped at `previous`.
///
/// Strictly greater than `previous` even when the wall clock stalls or
/// steps backwards.
pub fn next_timestamp(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = now.trunc_subsecs(3);
    let floor = previous + Duration::milliseconds(1);
    if now > floor {
        now
    } else {
        floor
    }
}

/// Generates a new record identifier (UUID v4).
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%, so 1900 bps = 19%.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as an exact fraction (`0.19` for 1900 bps).
    pub fn as_decimal(&self) -> Decimal {
        Decimal::new(self.0 as i64, 4)
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

// =============================================================================
// Item
// =============================================================================

/// A sellable catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Item {
    /// Unique identifier (UUID v4), immutable.
    pub id: String,

    /// Display name shown to the cashier and on receipts.
    pub name: String,

    /// Unit price, at most two decimal places.
    pub price: Money,

    /// Units on hand. Never negative.
    pub stock: i64,

    /// Grouping used by catalog filters.
    #[serde(default)]
    pub category: Option<String>,

    /// Opaque glyph key resolved by the presentation layer.
    #[serde(default)]
    pub icon: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub created_at: DateTime<Utc>,

    /// Refreshed on every mutation; drives last-writer-wins.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Builds a new item from form input, assigning id and timestamps.
    ///
    /// ## Example
    /// ```rust
    /// use till_core::money::Money;
    /// use till_core::types::{now_millis, Item, ItemForm};
    ///
    /// let item = Item::create(ItemForm::new("Coffee", Money::from_cents(250), 10), now_millis())
    ///     .unwrap();
    /// assert_eq!(item.created_at, item.updated_at);
    /// ```
    pub fn create(form: ItemForm, now: DateTime<Utc>) -> ValidationResult<Item> {
        Self::create_with_id(generate_id(), form, now)
    }

    /// Same as [`Item::create`] with a caller-chosen id.
    pub fn create_with_id(
        id: impl Into<String>,
        form: ItemForm,
        now: DateTime<Utc>,
    ) -> ValidationResult<Item> {
        form.validate()?;
        let now = now.trunc_subsecs(3);

        Ok(Item {
            id: id.into(),
            name: form.name.trim().to_string(),
            price: form.price,
            stock: form.stock,
            category: normalize_optional_text(form.category),
            icon: normalize_optional_text(form.icon),
            description: normalize_optional_text(form.description),
            created_at: now,
            updated_at: now,
        })
    }

    /// Merges `patch` into this item field by field.
    ///
    /// The whole patch is validated before anything changes, so a rejected
    /// patch leaves the item exactly as it was.
    pub fn apply(&mut self, patch: ItemPatch, now: DateTime<Utc>) -> ValidationResult<()> {
        patch.validate()?;

        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(stock) = patch.stock {
            self.stock = stock;
        }
        if let Some(category) = patch.category {
            self.category = normalize_optional_text(Some(category));
        }
        if let Some(icon) = patch.icon {
            self.icon = normalize_optional_text(Some(icon));
        }
        if let Some(description) = patch.description {
            self.description = normalize_optional_text(Some(description));
        }

        self.touch(now);
        Ok(())
    }

    /// Refreshes `updated_at` monotonically.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = next_timestamp(self.updated_at, now);
    }

    /// Checks a complete item, e.g. one received from another terminal.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "id".to_string(),
            });
        }
        validate_item_name(&self.name)?;
        validate_price(self.price)?;
        validate_stock(self.stock)?;
        validate_optional_text("category", self.category.as_deref(), 100)?;
        validate_optional_text("icon", self.icon.as_deref(), 32)?;
        validate_optional_text("description", self.description.as_deref(), 1000)?;
        Ok(())
    }

    /// Checks whether `quantity` units can be taken from stock.
    #[inline]
    pub fn has_stock(&self, quantity: i64) -> bool {
        quantity <= self.stock
    }
}

impl Versioned for Item {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

// =============================================================================
// Item Form / Patch
// =============================================================================

/// Input for creating an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ItemForm {
    pub name: String,
    pub price: Money,
    pub stock: i64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ItemForm {
    /// Creates a form with the required fields only.
    pub fn new(name: impl Into<String>, price: Money, stock: i64) -> Self {
        ItemForm {
            name: name.into(),
            price,
            stock,
            category: None,
            icon: None,
            description: None,
        }
    }

    /// Sets the category.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the icon key.
    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Validates every field.
    pub fn validate(&self) -> ValidationResult<()> {
        validate_item_name(&self.name)?;
        validate_price(self.price)?;
        validate_stock(self.stock)?;
        validate_optional_text("category", self.category.as_deref(), 100)?;
        validate_optional_text("icon", self.icon.as_deref(), 32)?;
        validate_optional_text("description", self.description.as_deref(), 1000)?;
        Ok(())
    }
}

/// Partial update for an item.
///
/// ## Merge Rules
/// ```text
/// ┌───────────────────────┬──────────────┬───────────────┬────────────────┐
/// │ field                 │ None         │ Some("")      │ Some(v)        │
/// ├───────────────────────┼──────────────┼───────────────┼────────────────┤
/// │ name / price / stock  │ keep         │ (invalid name)│ replace        │
/// │ category / icon /     │ keep         │ clear         │ replace        │
/// │ description           │              │               │                │
/// │ id / created_at       │ never change                                  │
/// │ updated_at            │ always refreshed                              │
/// └───────────────────────┴───────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ItemPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<Money>,
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ItemPatch {
    /// Empty patch (only refreshes `updated_at`).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn price(mut self, price: Money) -> Self {
        self.price = Some(price);
        self
    }

    pub fn stock(mut self, stock: i64) -> Self {
        self.stock = Some(stock);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Validates the fields that are present.
    pub fn validate(&self) -> ValidationResult<()> {
        if let Some(ref name) = self.name {
            validate_item_name(name)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        if let Some(stock) = self.stock {
            validate_stock(stock)?;
        }
        validate_optional_text("category", self.category.as_deref(), 100)?;
        validate_optional_text("icon", self.icon.as_deref(), 32)?;
        validate_optional_text("description", self.description.as_deref(), 1000)?;
        Ok(())
    }
}

/// A submitted form is authoritative: absent optional fields clear.
impl From<ItemForm> for ItemPatch {
    fn from(form: ItemForm) -> Self {
        ItemPatch {
            name: Some(form.name),
            price: Some(form.price),
            stock: Some(form.stock),
            category: Some(form.category.unwrap_or_default()),
            icon: Some(form.icon.unwrap_or_default()),
            description: Some(form.description.unwrap_or_default()),
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How the customer paid. Recorded as metadata only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash.
    Cash,
    /// Card on an external terminal.
    Card,
    /// Mobile digital wallet.
    DigitalWallet,
}

impl PaymentMethod {
    /// Wire name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::DigitalWallet => "digital_wallet",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "digital_wallet" | "wallet" => Ok(PaymentMethod::DigitalWallet),
            other => Err(ValidationError::InvalidFormat {
                field: "payment_method".to_string(),
                reason: format!("unknown payment method '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A line frozen into a sale at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SaleLine {
    pub item_id: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
    pub total_price: Money,
}

/// An immutable record of a completed checkout.
///
/// Only `synced` ever changes after creation, and only through the sync
/// coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub lines: Vec<SaleLine>,
    pub subtotal: Money,
    pub tax_rate: TaxRate,
    pub tax_amount: Money,
    pub total: Money,
    pub payment_method: PaymentMethod,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub synced: bool,
}

impl Sale {
    /// Total units across all lines.
    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

impl Versioned for Sale {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

// =============================================================================
// Identity
// =============================================================================

/// The authenticated user behind a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub is_admin: bool,
}

impl Identity {
    /// Creates a non-admin identity.
    pub fn new(uid: impl Into<String>, email: Option<String>) -> Self {
        Identity {
            uid: uid.into(),
            email,
            is_admin: false,
        }
    }

    /// Marks the identity as administrator.
    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
