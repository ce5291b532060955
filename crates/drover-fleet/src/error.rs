//! Error types for fleet queries.

use thiserror::Error;

/// Result type for fleet operations.
pub type Result<T> = std::result::Result<T, FleetError>;

/// Errors that can occur when querying the fleet cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FleetError {
    /// The local snapshot could not be read.
    #[error("failed to list clusters: {reason}")]
    ListFailed {
        /// Description of the failure.
        reason: String,
    },
}
