//! # Error Types
//!
//! Domain-specific error types for till-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  till-core errors (this file)                                          │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  till-db errors                                                        │
//! │  └── DbError          - Local store failures (wraps CoreError)         │
//! │                                                                         │
//! │  till-sync errors                                                      │
//! │  └── SyncError        - Remote store / backup failures                 │
//! │                                                                         │
//! │  terminal app                                                          │
//! │  └── ApiError         - What callers see (code + message)              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ApiError                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// Every variant is recoverable: the caller informs the user and the prior
/// state stays untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Item cannot be found in the catalog.
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Not enough stock on hand for the requested quantity.
    ///
    /// ## When This Occurs
    /// ```text
    /// addItem("p2", 3)          stock = 2
    ///      │
    ///      ▼
    /// InsufficientStock { name: "Tea", available: 2, requested: 3 }
    ///      │
    ///      ▼
    /// Cart unchanged, stock unchanged
    /// ```
    /// Also raised at checkout when a sync from another terminal lowered the
    /// stock below a quantity that was valid when it entered the cart.
    #[error("Insufficient stock for {name}: available {available}, requested {requested}")]
    InsufficientStock {
        item_id: String,
        name: String,
        available: i64,
        requested: i64,
    },

    /// Checkout attempted with no lines in the cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// The cart has no line for this item.
    #[error("Item {0} is not in the cart")]
    NotInCart(String),

    /// Missing or insufficient identity for the action.
    #[error("Not authorized to {action}")]
    Unauthorized { action: String },

    /// Cart has reached its maximum number of lines.
    #[error("Cart cannot have more than {max} lines")]
    CartTooLarge { max: usize },

    /// Line quantity exceeds the per-line maximum.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an Unauthorized error for the given action.
    pub fn unauthorized(action: impl Into<String>) -> Self {
        CoreError::Unauthorized {
            action: action.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} cannot be negative")]
    Negative { field: String },

    /// Amount carries more decimal places than the currency allows.
    #[error("{field} must have at most {max} decimal places")]
    TooManyDecimals { field: String, max: u32 },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            item_id: "p2".to_string(),
            name: "Tea".to_string(),
            available: 2,
            requested: 3,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Tea: available 2, requested 3"
        );

        assert_eq!(
            CoreError::unauthorized("create item").to_string(),
            "Not authorized to create item"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "name".to_string(),
        };
        assert_eq!(err.to_string(), "name is required");

        let err = ValidationError::TooManyDecimals {
            field: "price".to_string(),
            max: 2,
        };
        assert_eq!(err.to_string(), "price must have at most 2 decimal places");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Negative {
            field: "stock".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
