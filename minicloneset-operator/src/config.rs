//! Reconciler timing configuration.

use crate::error::{OperatorError, OperatorResult};
use std::time::Duration;

/// Requeue intervals and the pass deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Requeue after creating missing pods.
    pub scale_up_requeue: Duration,
    /// Requeue while an update or scale-down is in progress.
    pub rollout_requeue: Duration,
    /// Requeue after a retryable error.
    pub error_requeue: Duration,
    /// Upper bound on one reconciliation pass.
    pub pass_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            scale_up_requeue: Duration::from_secs(10),
            rollout_requeue: Duration::from_secs(5),
            error_requeue: Duration::from_secs(30),
            pass_timeout: Duration::from_secs(30),
        }
    }
}

/// Command-line flags for [`ReconcilerConfig`].
#[derive(Debug, Clone, clap::Args)]
pub struct ReconcilerArgs {
    /// Seconds before re-checking after creating pods
    #[arg(long, env = "MCS_SCALE_UP_REQUEUE_SECS", default_value_t = 10)]
    pub scale_up_requeue_secs: u64,

    /// Seconds between passes while a rollout or scale-down is in progress
    #[arg(long, env = "MCS_ROLLOUT_REQUEUE_SECS", default_value_t = 5)]
    pub rollout_requeue_secs: u64,

    /// Seconds before retrying a failed pass
    #[arg(long, env = "MCS_ERROR_REQUEUE_SECS", default_value_t = 30)]
    pub error_requeue_secs: u64,

    /// Deadline of one reconciliation pass in seconds
    #[arg(long, env = "MCS_PASS_TIMEOUT_SECS", default_value_t = 30)]
    pub pass_timeout_secs: u64,
}

impl TryFrom<ReconcilerArgs> for ReconcilerConfig {
    type Error = OperatorError;

    fn try_from(args: ReconcilerArgs) -> OperatorResult<Self> {
        if args.pass_timeout_secs == 0 {
            return Err(OperatorError::InvalidConfig(
                "pass timeout must be at least one second".into(),
            ));
        }
        if args.rollout_requeue_secs == 0 || args.scale_up_requeue_secs == 0 {
            return Err(OperatorError::InvalidConfig(
                "requeue intervals must be at least one second".into(),
            ));
        }

        Ok(Self {
            scale_up_requeue: Duration::from_secs(args.scale_up_requeue_secs),
            rollout_requeue: Duration::from_secs(args.rollout_requeue_secs),
            error_requeue: Duration::from_secs(args.error_requeue_secs),
            pass_timeout: Duration::from_secs(args.pass_timeout_secs),
        })
    }
}
