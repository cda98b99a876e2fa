//! Engine error type.

use crate::dispatch::{ProvisionError, RepositoryError};
use crate::validate::ValidationError;

/// Errors local to one deployment's evaluation pipeline. None of these
/// abort a batch pass; the coordinator isolates them per deployment.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A crontab expression could not be parsed.
    #[error("invalid schedule format '{expression}': {message}")]
    InvalidScheduleFormat { expression: String, message: String },

    /// A trigger failed structural validation; the whole batch for its
    /// parent deployment is rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Provisioning(#[from] ProvisionError),
}
