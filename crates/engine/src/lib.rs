//! Trigger-evaluation core for scheduled deployments.
//!
//! This crate provides:
//! - Cron dispatch-window evaluation with missed-occurrence recovery
//! - Structural trigger validation shared by intake and dispatch
//! - Active-trigger selection with a deterministic priority order
//! - The per-deployment dispatch pipeline behind `Repository` and
//!   `Provisioner` trait seams

pub mod dispatch;
pub mod error;
pub mod select;
pub mod validate;
pub mod window;

pub use dispatch::{
    BatchSummary, DispatchCoordinator, DispatchOutcome, ProvisionError, ProvisionOutcome,
    Provisioner, Repository, RepositoryError,
};
pub use error::EngineError;
pub use select::{select_active, select_winner, ActiveTrigger};
pub use validate::{validate_trigger, ValidationError};
pub use window::evaluate_window;
