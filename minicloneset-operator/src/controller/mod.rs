//! Kubernetes controller for MiniCloneSet resources.
//!
//! [`MiniCloneSetController`] runs one reconciliation pass per resource
//! identity. Wiring into kube-runtime takes the [`reconcile`] and
//! [`error_policy`] functions:
//!
//! ```ignore
//! use minicloneset_operator::controller::{error_policy, reconcile, ControllerContext};
//!
//! Controller::new(clone_sets, watcher_config)
//!     .owns(pods, watcher_config)
//!     .run(reconcile, error_policy, Arc::new(context))
//!     .for_each(|_| futures::future::ready(()))
//!     .await;
//! ```

mod minicloneset;

pub use minicloneset::{error_policy, reconcile, MiniCloneSetController};

use crate::config::ReconcilerConfig;
use crate::store::{ClusterStore, KubeStore};
use kube::runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;

/// Shared context for controllers.
pub struct ControllerContext {
    /// Where MiniCloneSets and pods are read and written.
    pub store: Arc<dyn ClusterStore>,
    /// Timing configuration.
    pub config: ReconcilerConfig,
}

impl ControllerContext {
    /// Create a new controller context.
    pub fn new(store: Arc<dyn ClusterStore>, config: ReconcilerConfig) -> Self {
        Self { store, config }
    }

    /// Context backed by the Kubernetes API.
    pub fn from_client(client: kube::Client, config: ReconcilerConfig) -> Self {
        Self::new(Arc::new(KubeStore::new(client)), config)
    }
}

/// Result type for reconciliation actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Requeue after the specified duration.
    Requeue(Duration),
    /// Don't requeue (reconciliation complete).
    Done,
}

impl From<ReconcileAction> for Action {
    fn from(action: ReconcileAction) -> Self {
        match action {
            ReconcileAction::Requeue(duration) => Action::requeue(duration),
            ReconcileAction::Done => Action::await_change(),
        }
    }
}
