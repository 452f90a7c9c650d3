use async_trait::async_trait;
use musicdex_core::MusicdexError;
use thiserror::Error;

use super::logger::SyncLogger;
use super::store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Api(#[from] MusicdexError),
    #[error("invalid remote timestamp: {0}")]
    Timestamp(#[from] time::error::Parse),
    #[error("remote {entity} is missing {field}")]
    MissingField {
        entity: &'static str,
        field: &'static str,
    },
}

impl SyncError {
    /// False when retrying with the same session cannot succeed: the server rejected
    /// the credentials or the request itself, or sent data this client cannot read.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Store(_) => true,
            SyncError::Api(err) => err.is_retryable(),
            SyncError::Timestamp(_) | SyncError::MissingField { .. } => false,
        }
    }
}

/// One entity family's reconciliation protocol.
///
/// `synchronize` never fails past its own boundary: `true` means the family is fully
/// reconciled for this run, `false` that some step failed and the run may be retried.
#[async_trait]
pub trait Synchronizer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn synchronize(&self) -> bool;
}

/// Closes a synchronizer's log section, turning an error into a logged failure.
pub(crate) fn finish(logger: &SyncLogger, name: &str, outcome: Result<(), SyncError>) -> bool {
    let success = match outcome {
        Ok(()) => true,
        Err(err) if !err.is_retryable() => {
            logger.terminal_error(format!("{name} sync failed: {err}"));
            false
        }
        Err(err) => {
            logger.error(format!("{name} sync failed: {err}"));
            false
        }
    };
    logger.end_section(name, success);
    success
}
