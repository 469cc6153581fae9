//! # API Error Type
//!
//! Uniform error returned by the terminal services.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Till POS                               │
//! │                                                                         │
//! │  CoreError  (rules: stock, cart, validation, auth) ──┐                 │
//! │  DbError    (local store)                          ──┤                 │
//! │  SyncError  (remote, backups)                      ──┼──► ApiError     │
//! │  CacheError (resource cache)                       ──┘   { code,       │
//! │                                                            message }   │
//! │                                                                         │
//! │  Callers branch on `code`; `message` is for display.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ```json
//! { "code": "INSUFFICIENT_STOCK", "message": "Insufficient stock for Tea: available 2, requested 3" }
//! ```

use serde::Serialize;
use till_cache::CacheError;
use till_core::CoreError;
use till_db::DbError;
use till_sync::SyncError;

/// Error returned by every service operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Referenced id is absent.
    NotFound,

    /// Input validation failed.
    ValidationError,

    /// Local store failure.
    DatabaseError,

    /// Not enough units on hand.
    InsufficientStock,

    /// Checkout of an empty cart.
    EmptyCart,

    /// Cart operation failed.
    CartError,

    /// No identity, or not an administrator.
    Unauthorized,

    /// Remote sync or backup failed.
    SyncError,

    /// Resource cache failure.
    CacheError,

    /// Configuration could not be loaded.
    ConfigError,

    Internal,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    pub fn config(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ConfigError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::ItemNotFound(id) => ApiError::not_found("Item", &id),
            CoreError::InsufficientStock { .. } => {
                ApiError::new(ErrorCode::InsufficientStock, message)
            }
            CoreError::EmptyCart => ApiError::new(ErrorCode::EmptyCart, message),
            CoreError::NotInCart(_) | CoreError::CartTooLarge { .. } => {
                ApiError::new(ErrorCode::CartError, message)
            }
            CoreError::Unauthorized { .. } => ApiError::new(ErrorCode::Unauthorized, message),
            CoreError::QuantityTooLarge { .. } | CoreError::Validation(_) => {
                ApiError::new(ErrorCode::ValidationError, message)
            }
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => ApiError::new(
                ErrorCode::ValidationError,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::Rule(e) => e.into(),
            DbError::ConnectionFailed(_) => {
                ApiError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::MigrationFailed(_) | DbError::VersionConflict { .. } => {
                tracing::error!(error = %err, "Store schema problem");
                ApiError::new(ErrorCode::DatabaseError, err.to_string())
            }
            DbError::PoolExhausted => {
                ApiError::new(ErrorCode::DatabaseError, "Database pool exhausted")
            }
            DbError::QueryFailed(_)
            | DbError::TransactionFailed(_)
            | DbError::Serialization(_)
            | DbError::Internal(_) => {
                // Log the actual error but return a generic message
                tracing::error!(error = %err, "Store operation failed");
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Unauthorized { .. } => ApiError::new(ErrorCode::Unauthorized, err.to_string()),
            SyncError::Rule(e) => e.into(),
            e if e.is_config_error() => ApiError::config(e.to_string()),
            e => ApiError::new(ErrorCode::SyncError, e.to_string()),
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        ApiError::new(ErrorCode::CacheError, err.to_string())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use till_core::ValidationError;

    #[test]
    fn test_core_error_codes() {
        let stock: ApiError = CoreError::InsufficientStock {
            item_id: "p2".into(),
            name: "Tea".into(),
            available: 2,
            requested: 3,
        }
        .into();
        assert_eq!(stock.code, ErrorCode::InsufficientStock);
        assert!(stock.message.contains("Tea"));

        let empty: ApiError = CoreError::EmptyCart.into();
        assert_eq!(empty.code, ErrorCode::EmptyCart);

        let auth: ApiError = CoreError::unauthorized("create item").into();
        assert_eq!(auth.code, ErrorCode::Unauthorized);
        assert_eq!(auth.message, "Not authorized to create item");

        let invalid: ApiError = CoreError::Validation(ValidationError::Required {
            field: "name".into(),
        })
        .into();
        assert_eq!(invalid.code, ErrorCode::ValidationError);
    }

    #[test]
    fn test_db_error_codes() {
        let missing: ApiError = DbError::NotFound {
            entity: "Item".into(),
            id: "p9".into(),
        }
        .into();
        assert_eq!(missing.code, ErrorCode::NotFound);
        assert_eq!(missing.message, "Item not found: p9");

        let rule: ApiError = DbError::Rule(CoreError::EmptyCart).into();
        assert_eq!(rule.code, ErrorCode::EmptyCart);

        let query: ApiError = DbError::QueryFailed("syntax error near SELECT".into()).into();
        assert_eq!(query.message, "Database operation failed");
    }

    #[test]
    fn test_sync_and_cache_codes() {
        let auth: ApiError = SyncError::Unauthorized { action: "sync".into() }.into();
        assert_eq!(auth.code, ErrorCode::Unauthorized);

        let offline: ApiError = SyncError::ConnectionFailed("refused".into()).into();
        assert_eq!(offline.code, ErrorCode::SyncError);

        let config: ApiError = SyncError::MissingDeviceId.into();
        assert_eq!(config.code, ErrorCode::ConfigError);

        let cache: ApiError = CacheError::Network("offline".into()).into();
        assert_eq!(cache.code, ErrorCode::CacheError);
    }

    #[test]
    fn test_serialized_shape() {
        let err = ApiError::not_found("Sale", "s1");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
        assert_eq!(json["message"], "Sale not found: s1");
    }
}
