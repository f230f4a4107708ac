//! Top-level bootstrap error

use thiserror::Error;

use crate::config::ConfigError;
use crate::mount::MountError;
use crate::provision::ProvisionError;
use crate::sync::SyncError;
use emboot_hal::HalError;

/// Errors surfaced by [`crate::Session`]
#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Mount(#[from] MountError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Hal(#[from] HalError),
    /// A lifecycle step was invoked before its precondition
    #[error("{step} called before {requires}")]
    OutOfOrder {
        step: &'static str,
        requires: &'static str,
    },
    /// The session already failed fatally; nothing else may run
    #[error("bootstrap already failed")]
    Failed,
}
