//! # Cart Aggregate
//!
//! The single live cart of a terminal and its state machine.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Cart State Machine                                 │
//! │                                                                         │
//! │              add(item, qty)                                             │
//! │   ┌───────┐ ─────────────────────────► ┌──────────┐                     │
//! │   │ Empty │                            │ HasItems │ ◄── add / set_qty   │
//! │   └───────┘ ◄───────────────────────── └──────────┘                     │
//! │              remove(last) / set_qty(0)      │                           │
//! │              clear()                        │ to_sale(method)           │
//! │                                             ▼                           │
//! │                                        Sale snapshot                    │
//! │                                                                         │
//! │  Every mutation ends with recompute():                                  │
//! │    line.total_price = line.unit_price × line.quantity                   │
//! │    subtotal         = Σ line.total_price                                │
//! │    tax_amount       = subtotal × tax_rate                               │
//! │    total            = subtotal + tax_amount                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - Lines are unique by `item_id` and keep insertion order
//! - `1 <= quantity <= MAX_LINE_QUANTITY`, and never above the stock seen
//!   when the line was last changed
//! - At most `MAX_CART_LINES` lines
//! - `unit_price` is frozen when the line is created

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{generate_id, Item, PaymentMethod, Sale, SaleLine, TaxRate};
use crate::{DEFAULT_TAX_RATE_BPS, MAX_CART_LINES, MAX_LINE_QUANTITY};

/// Which side of the state machine the cart is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub enum CartState {
    Empty,
    HasItems,
}

/// A line in the cart.
///
/// `name` and `unit_price` are snapshots taken when the line was created.
/// Later catalog edits do not reach an existing line.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartLine {
    pub item_id: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
    pub total_price: Money,
}

impl CartLine {
    fn from_item(item: &Item, quantity: i64) -> Self {
        CartLine {
            item_id: item.id.clone(),
            name: item.name.clone(),
            unit_price: item.price,
            quantity,
            total_price: item.price.multiply_quantity(quantity),
        }
    }
}

impl From<&CartLine> for SaleLine {
    fn from(line: &CartLine) -> Self {
        SaleLine {
            item_id: line.item_id.clone(),
            name: line.name.clone(),
            unit_price: line.unit_price,
            quantity: line.quantity,
            total_price: line.total_price,
        }
    }
}

/// The cart aggregate.
///
/// Derived fields are private so they can only change through `recompute`.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Cart {
    lines: Vec<CartLine>,
    subtotal: Money,
    tax_rate: TaxRate,
    tax_amount: Money,
    total: Money,
}

impl Default for Cart {
    fn default() -> Self {
        Cart::new(TaxRate::from_bps(DEFAULT_TAX_RATE_BPS))
    }
}

impl Cart {
    /// Creates an empty cart taxed at `tax_rate`.
    pub fn new(tax_rate: TaxRate) -> Self {
        Cart {
            lines: Vec::new(),
            subtotal: Money::zero(),
            tax_rate,
            tax_amount: Money::zero(),
            total: Money::zero(),
        }
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Adds `quantity` units of `item`, merging into an existing line.
    ///
    /// The cumulative quantity is checked against `item.stock`. On error the
    /// cart is unchanged.
    pub fn add(&mut self, item: &Item, quantity: i64) -> CoreResult<()> {
        if quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }
        // Lines never exceed the cap, so the sum below cannot overflow.
        if quantity > MAX_LINE_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: quantity,
                max: MAX_LINE_QUANTITY,
            });
        }

        let existing = self.position(&item.id);
        let current = existing.map(|i| self.lines[i].quantity).unwrap_or(0);
        let requested = current + quantity;

        check_line_quantity(item, requested)?;

        match existing {
            Some(i) => self.lines[i].quantity = requested,
            None => {
                if self.lines.len() >= MAX_CART_LINES {
                    return Err(CoreError::CartTooLarge {
                        max: MAX_CART_LINES,
                    });
                }
                self.lines.push(CartLine::from_item(item, quantity));
            }
        }

        self.recompute();
        Ok(())
    }

    /// Sets the quantity of the line for `item`.
    ///
    /// `quantity <= 0` removes the line. The unit price snapshot is kept.
    pub fn set_quantity(&mut self, item: &Item, quantity: i64) -> CoreResult<()> {
        if quantity <= 0 {
            return self.remove(&item.id);
        }

        let index = self
            .position(&item.id)
            .ok_or_else(|| CoreError::NotInCart(item.id.clone()))?;

        check_line_quantity(item, quantity)?;

        self.lines[index].quantity = quantity;
        self.recompute();
        Ok(())
    }

    /// Drops the line for `item_id`.
    pub fn remove(&mut self, item_id: &str) -> CoreResult<()> {
        let index = self
            .position(item_id)
            .ok_or_else(|| CoreError::NotInCart(item_id.to_string()))?;

        self.lines.remove(index);
        self.recompute();
        Ok(())
    }

    /// Drops every line; totals go back to zero.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.recompute();
    }

    /// Changes the tax rate applied to the whole cart.
    pub fn set_tax_rate(&mut self, tax_rate: TaxRate) {
        self.tax_rate = tax_rate;
        self.recompute();
    }

    /// Builds the sale snapshot for a checkout. The cart itself is untouched.
    pub fn to_sale(&self, payment_method: PaymentMethod, now: DateTime<Utc>) -> CoreResult<Sale> {
        if self.lines.is_empty() {
            return Err(CoreError::EmptyCart);
        }

        Ok(Sale {
            id: generate_id(),
            lines: self.lines.iter().map(SaleLine::from).collect(),
            subtotal: self.subtotal,
            tax_rate: self.tax_rate,
            tax_amount: self.tax_amount,
            total: self.total,
            payment_method,
            timestamp: now.trunc_subsecs(3),
            synced: false,
        })
    }

    fn recompute(&mut self) {
        for line in &mut self.lines {
            line.total_price = line.unit_price.multiply_quantity(line.quantity);
        }
        self.subtotal = self.lines.iter().map(|l| l.total_price).sum();
        self.tax_amount = self.subtotal.calculate_tax(self.tax_rate);
        self.total = self.subtotal + self.tax_amount;
    }

    fn position(&self, item_id: &str) -> Option<usize> {
        self.lines.iter().position(|l| l.item_id == item_id)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn state(&self) -> CartState {
        if self.lines.is_empty() {
            CartState::Empty
        } else {
            CartState::HasItems
        }
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn line(&self, item_id: &str) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.item_id == item_id)
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn tax_rate(&self) -> TaxRate {
        self.tax_rate
    }

    pub fn tax_amount(&self) -> Money {
        self.tax_amount
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of distinct lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Units across all lines.
    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

fn check_line_quantity(item: &Item, requested: i64) -> CoreResult<()> {
    if requested > MAX_LINE_QUANTITY {
        return Err(CoreError::QuantityTooLarge {
            requested,
            max: MAX_LINE_QUANTITY,
        });
    }

    if !item.has_stock(requested) {
        return Err(CoreError::InsufficientStock {
            item_id: item.id.clone(),
            name: item.name.clone(),
            available: item.stock,
            requested,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{now_millis, ItemForm, ItemPatch};
    use rust_decimal_macros::dec;

    fn item(id: &str, name: &str, cents: i64, stock: i64) -> Item {
        Item::create_with_id(id, ItemForm::new(name, Money::from_cents(cents), stock), now_millis())
            .unwrap()
    }

    fn assert_consistent(cart: &Cart) {
        let subtotal: Money = cart
            .lines()
            .iter()
            .map(|l| l.unit_price.multiply_quantity(l.quantity))
            .sum();
        assert_eq!(cart.subtotal(), subtotal);
        assert_eq!(
            cart.total().amount(),
            subtotal.amount() + subtotal.amount() * cart.tax_rate().as_decimal()
        );
    }

    #[test]
    fn test_add_update_to_empty() {
        let coffee = item("p1", "Coffee", 250, 10);
        let mut cart = Cart::new(TaxRate::from_bps(1900));
        assert_eq!(cart.state(), CartState::Empty);

        cart.add(&coffee, 3).unwrap();
        assert_eq!(cart.state(), CartState::HasItems);
        assert_eq!(cart.subtotal().amount(), dec!(7.50));
        assert_eq!(cart.tax_amount().amount(), dec!(1.425));
        assert_eq!(cart.total().amount(), dec!(8.925));

        cart.set_quantity(&coffee, 0).unwrap();
        assert_eq!(cart.state(), CartState::Empty);
        assert!(cart.subtotal().is_zero());
        assert!(cart.tax_amount().is_zero());
        assert!(cart.total().is_zero());
    }

    #[test]
    fn test_insufficient_stock_leaves_cart_unchanged() {
        let tea = item("p2", "Tea", 150, 2);
        let mut cart = Cart::default();

        let err = cart.add(&tea, 3).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { available: 2, requested: 3, .. }
        ));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_cumulative_quantity_checked() {
        let tea = item("p2", "Tea", 150, 4);
        let mut cart = Cart::default();

        cart.add(&tea, 3).unwrap();
        let err = cart.add(&tea, 2).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientStock { requested: 5, .. }));
        assert_eq!(cart.line("p2").unwrap().quantity, 3);
    }

    #[test]
    fn test_huge_quantity_on_existing_line() {
        let coffee = item("p1", "Coffee", 250, 10);
        let mut cart = Cart::default();
        cart.add(&coffee, 1).unwrap();

        assert_eq!(
            cart.add(&coffee, i64::MAX),
            Err(CoreError::QuantityTooLarge {
                requested: i64::MAX,
                max: MAX_LINE_QUANTITY,
            })
        );
        assert_eq!(cart.line("p1").unwrap().quantity, 1);
        assert_eq!(cart.total_quantity(), 1);
        assert_eq!(cart.subtotal(), Money::from_cents(250));
    }

    #[test]
    fn test_set_quantity_revalidates_stock() {
        let tea = item("p2", "Tea", 150, 4);
        let mut cart = Cart::default();
        cart.add(&tea, 1).unwrap();

        assert!(cart.set_quantity(&tea, 5).is_err());
        assert_eq!(cart.line("p2").unwrap().quantity, 1);

        cart.set_quantity(&tea, 4).unwrap();
        assert_eq!(cart.total_quantity(), 4);
    }

    #[test]
    fn test_set_quantity_missing_line() {
        let tea = item("p2", "Tea", 150, 4);
        let mut cart = Cart::default();
        assert_eq!(
            cart.set_quantity(&tea, 2),
            Err(CoreError::NotInCart("p2".to_string()))
        );
    }

    #[test]
    fn test_price_snapshot_isolation() {
        let mut coffee = item("p1", "Coffee", 250, 10);
        let mut cart = Cart::default();
        cart.add(&coffee, 1).unwrap();

        coffee
            .apply(ItemPatch::new().price(Money::from_cents(400)), now_millis())
            .unwrap();
        cart.add(&coffee, 1).unwrap();
        cart.set_quantity(&coffee, 3).unwrap();

        let line = cart.line("p1").unwrap();
        assert_eq!(line.unit_price, Money::from_cents(250));
        assert_eq!(line.total_price, Money::from_cents(750));
    }

    #[test]
    fn test_totals_consistent_after_every_mutation() {
        let a = item("a", "A", 199, 50);
        let b = item("b", "B", 1, 50);
        let c = item("c", "C", 33_333, 50);
        let mut cart = Cart::new(TaxRate::from_bps(825));

        cart.add(&a, 3).unwrap();
        assert_consistent(&cart);
        cart.add(&b, 7).unwrap();
        assert_consistent(&cart);
        cart.add(&c, 1).unwrap();
        assert_consistent(&cart);
        cart.set_quantity(&a, 11).unwrap();
        assert_consistent(&cart);
        cart.remove("b").unwrap();
        assert_consistent(&cart);
        cart.set_tax_rate(TaxRate::from_bps(1900));
        assert_consistent(&cart);
        cart.clear();
        assert_consistent(&cart);
        assert_eq!(cart.state(), CartState::Empty);
    }

    #[test]
    fn test_lines_keep_insertion_order() {
        let a = item("a", "A", 100, 5);
        let b = item("b", "B", 100, 5);
        let mut cart = Cart::default();
        cart.add(&b, 1).unwrap();
        cart.add(&a, 1).unwrap();
        cart.add(&b, 1).unwrap();

        let ids: Vec<_> = cart.lines().iter().map(|l| l.item_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_guards() {
        let bulk = item("x", "Bulk", 1, 5_000);
        let mut cart = Cart::default();
        assert!(matches!(
            cart.add(&bulk, 1_000),
            Err(CoreError::QuantityTooLarge { .. })
        ));
        assert!(cart.add(&bulk, 0).is_err());

        for i in 0..MAX_CART_LINES {
            cart.add(&item(&format!("i{}", i), "Thing", 100, 1), 1).unwrap();
        }
        assert_eq!(
            cart.add(&item("overflow", "Thing", 100, 1), 1),
            Err(CoreError::CartTooLarge { max: MAX_CART_LINES })
        );
    }

    #[test]
    fn test_to_sale_snapshots_totals() {
        let coffee = item("p1", "Coffee", 250, 10);
        let mut cart = Cart::default();
        assert_eq!(
            cart.to_sale(PaymentMethod::Cash, now_millis()),
            Err(CoreError::EmptyCart)
        );

        cart.add(&coffee, 2).unwrap();
        let sale = cart.to_sale(PaymentMethod::Card, now_millis()).unwrap();

        assert_eq!(sale.total, cart.total());
        assert_eq!(sale.lines.len(), 1);
        assert_eq!(sale.lines[0].quantity, 2);
        assert!(!sale.synced);
        // Cart is not cleared by building the snapshot
        assert_eq!(cart.state(), CartState::HasItems);
    }
}
