//! Reconciliation errors.

use thiserror::Error;

use crate::application::ports::StoreError;
use crate::application::services::GatewayError;

/// Why a reconciliation run compared nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconciliationError {
    /// Broker truth could not be fetched, retries included.
    #[error("failed to fetch broker {what}: {source}")]
    BrokerFetch {
        /// What was being fetched (`orders`, `positions`).
        what: &'static str,
        /// Final gateway failure.
        source: GatewayError,
    },

    /// The local snapshot could not be read.
    #[error("failed to snapshot local {what}: {source}")]
    LocalSnapshot {
        /// What was being read.
        what: &'static str,
        /// Store failure.
        source: StoreError,
    },
}
