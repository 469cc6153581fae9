//! # till-core: Pure Business Logic for Till POS
//!
//! Everything the terminal decides without touching a disk or a socket:
//! what an item is, how a cart adds up, which of two record versions wins,
//! and what last month's sales looked like.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Till POS Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/terminal (service wiring)                  │   │
//! │  │     CartEngine ──► CatalogService ──► SalesService              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                ★ till-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │  types  │ │  money  │ │  cart   │ │ catalog │ │  stats  │  │   │
//! │  │   │  Item   │ │  Money  │ │  Cart   │ │ filter  │ │ top 5   │  │   │
//! │  │   │  Sale   │ │ TaxRate │ │CartLine │ │  sort   │ │ windows │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │           till-db (local store) / till-sync (remote)            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Item, Sale, Identity, ...)
//! - [`money`] - Exact decimal money, rounded only for display
//! - [`cart`] - The cart aggregate and its state machine
//! - [`catalog`] - Catalog filtering and sorting
//! - [`stats`] - Sales filters and period statistics
//! - [`merge`] - Last-writer-wins resolution
//! - [`validation`] - Business rule validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use till_core::money::Money;
//! use till_core::types::TaxRate;
//!
//! let subtotal = Money::from_cents(750); // 7.50
//! let tax = subtotal.calculate_tax(TaxRate::from_bps(1900));
//!
//! // No rounding until display
//! assert_eq!(tax.amount().normalize().to_string(), "1.425");
//! assert_eq!(tax.to_string(), "1.43");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod catalog;
pub mod error;
pub mod merge;
pub mod money;
pub mod stats;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartLine, CartState};
pub use catalog::{filter_items, ItemFilter, SortDirection, SortField};
pub use error::{CoreError, CoreResult, ValidationError};
pub use merge::{resolve, Resolution, Versioned};
pub use money::Money;
pub use stats::{compute_stats, SaleFilter, SalesStats, StatsPeriod, TopItem};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default sales tax rate in basis points (19%).
pub const DEFAULT_TAX_RATE_BPS: u32 = 1900;

/// Maximum distinct lines allowed in a single cart.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single line.
///
/// Catches fat-finger entries (1000 instead of 10) before they reach stock.
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Number of entries kept in the "top items" ranking.
pub const TOP_ITEMS_LIMIT: usize = 5;
