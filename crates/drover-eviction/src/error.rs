//! Error types for the eviction dispatcher.

use thiserror::Error;

/// Result type for eviction operations.
pub type Result<T> = std::result::Result<T, EvictionError>;

/// Opaque error returned by reconcile callbacks.
///
/// The worker never interprets a reconcile failure beyond success or error;
/// classification stays with the reconciler.
pub type ReconcileError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in the eviction dispatcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvictionError {
    /// An option set failed validation.
    #[error("invalid eviction options: {reason}")]
    InvalidOptions {
        /// Description of the invalid option.
        reason: String,
    },

    /// A key could not be derived from an enqueued object.
    #[error("key derivation failed: {reason}")]
    KeyDerivation {
        /// Description of the derivation failure.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_invalid_options() {
        let err = EvictionError::InvalidOptions {
            reason: "rate must be positive".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid eviction options: rate must be positive"
        );
    }

    #[test]
    fn error_display_key_derivation() {
        let err = EvictionError::KeyDerivation {
            reason: "object has no name".into(),
        };
        assert_eq!(err.to_string(), "key derivation failed: object has no name");
    }

    #[test]
    fn error_clone_and_eq() {
        let err1 = EvictionError::KeyDerivation {
            reason: "missing namespace".into(),
        };
        let err2 = err1.clone();
        assert_eq!(err1, err2);
    }
}
