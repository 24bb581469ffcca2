//! MiniCloneSet controller.
//!
//! Each pass reads the MiniCloneSet and its pods, asks the strategy engine
//! for the next batch of operations, applies them in order and records the
//! number of ready pods in the status.

use super::{ControllerContext, ReconcileAction};
use crate::crd::{MiniCloneSet, MiniCloneSetStatus, KIND};
use crate::error::{OperatorError, OperatorResult};
use crate::key::ResourceKey;
use crate::pod;
use crate::strategy::{self, DesiredState, Plan, PodOperation, RequeueHint};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use std::sync::Arc;

/// Controller for MiniCloneSet resources.
#[derive(Clone)]
pub struct MiniCloneSetController {
    ctx: Arc<ControllerContext>,
}

impl MiniCloneSetController {
    /// Create a new MiniCloneSet controller.
    pub fn new(ctx: Arc<ControllerContext>) -> Self {
        Self { ctx }
    }

    /// Run one reconciliation pass for `key`, bounded by the pass deadline.
    ///
    /// A MiniCloneSet that no longer exists is a successful no-op. When the
    /// deadline expires the in-flight call is dropped and
    /// [`OperatorError::Timeout`] is returned.
    #[tracing::instrument(skip_all, fields(namespace = %key.namespace, name = %key.name))]
    pub async fn reconcile(&self, key: &ResourceKey) -> OperatorResult<ReconcileAction> {
        let deadline = self.ctx.config.pass_timeout;
        match tokio::time::timeout(deadline, self.reconcile_pass(key)).await {
            Ok(result) => result,
            Err(_) => Err(OperatorError::Timeout {
                seconds: deadline.as_secs(),
            }),
        }
    }

    async fn reconcile_pass(&self, key: &ResourceKey) -> OperatorResult<ReconcileAction> {
        let store = &self.ctx.store;

        let clone_set = match store.get_clone_set(key).await {
            Ok(clone_set) => clone_set,
            Err(OperatorError::NotFound { .. }) => {
                tracing::debug!("MiniCloneSet not found, nothing to do");
                return Ok(ReconcileAction::Done);
            }
            Err(e) => return Err(e),
        };

        let uid = clone_set
            .metadata
            .uid
            .clone()
            .ok_or_else(|| invalid(key, "MiniCloneSet has no uid"))?;
        let listing = store.list_pods(key, &uid).await?;
        if !listing.foreign.is_empty() {
            tracing::debug!(foreign = ?listing.foreign, "Skipping names of pods owned elsewhere");
        }

        let desired = DesiredState::from_spec(&clone_set.spec);
        let plan = strategy::plan(&desired, &key.name, &listing.owned, &listing.foreign);

        if plan.operations.is_empty() {
            tracing::debug!(
                step = %plan.step,
                current = plan.counts.current,
                ready = plan.counts.ready,
                "No pod changes needed"
            );
        } else {
            tracing::info!(
                step = %plan.step,
                current = plan.counts.current,
                desired = desired.replicas,
                outdated = plan.counts.outdated,
                operations = plan.operations.len(),
                "Applying pod changes"
            );
            self.apply(key, &clone_set, &plan).await?;
        }

        self.sync_status(&clone_set, plan.counts.ready).await?;

        let config = &self.ctx.config;
        Ok(match plan.requeue {
            RequeueHint::ScaleUp => ReconcileAction::Requeue(config.scale_up_requeue),
            RequeueHint::Rollout => ReconcileAction::Requeue(config.rollout_requeue),
            RequeueHint::AwaitChange => ReconcileAction::Done,
        })
    }

    /// Execute the plan's operations in order, stopping at the first failure.
    async fn apply(
        &self,
        key: &ResourceKey,
        clone_set: &MiniCloneSet,
        plan: &Plan,
    ) -> OperatorResult<()> {
        let owner = owner_reference(key, clone_set)?;

        for op in &plan.operations {
            match op {
                PodOperation::Create { ordinal } => {
                    let mut new_pod = pod::build_pod(key, &clone_set.spec, *ordinal);
                    new_pod.metadata.owner_references = Some(vec![owner.clone()]);
                    let created = self.ctx.store.create_pod(&new_pod).await?;
                    tracing::info!(
                        pod = %created.name_any(),
                        image = %clone_set.spec.container.image,
                        "Created pod"
                    );
                }
                PodOperation::Delete { name } => {
                    self.ctx.store.delete_pod(&key.namespace, name).await?;
                    tracing::info!(pod = %name, "Deleted pod");
                }
            }
        }
        Ok(())
    }

    /// Persist `availableReplicas` if it differs from the observed status.
    async fn sync_status(&self, clone_set: &MiniCloneSet, ready: u32) -> OperatorResult<()> {
        let available_replicas = i32::try_from(ready).unwrap_or(i32::MAX);
        let observed = clone_set.status.as_ref().map(|s| s.available_replicas);
        if observed == Some(available_replicas) {
            return Ok(());
        }

        self.ctx
            .store
            .update_status(clone_set, MiniCloneSetStatus { available_replicas })
            .await?;
        tracing::info!(available_replicas, "Updated status");
        Ok(())
    }
}

fn invalid(key: &ResourceKey, reason: &str) -> OperatorError {
    OperatorError::InvalidResource {
        name: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Controller reference that also blocks foreground deletion of the owner.
fn owner_reference(key: &ResourceKey, clone_set: &MiniCloneSet) -> OperatorResult<OwnerReference> {
    let mut owner = clone_set
        .controller_owner_ref(&())
        .ok_or_else(|| invalid(key, "cannot build owner reference without name and uid"))?;
    owner.block_owner_deletion = Some(true);
    Ok(owner)
}

/// Reconcile entry point for [`kube::runtime::Controller::run`].
pub async fn reconcile(
    clone_set: Arc<MiniCloneSet>,
    ctx: Arc<ControllerContext>,
) -> OperatorResult<Action> {
    let key = ResourceKey::of(clone_set.as_ref()).ok_or_else(|| OperatorError::InvalidResource {
        name: clone_set.name_any(),
        reason: format!("{KIND} must be namespaced"),
    })?;
    let action = MiniCloneSetController::new(ctx).reconcile(&key).await?;
    Ok(action.into())
}

/// Error policy for the MiniCloneSet controller.
///
/// Retryable errors requeue after the configured error interval; the rest
/// wait for the resource to change.
pub fn error_policy(
    clone_set: Arc<MiniCloneSet>,
    error: &OperatorError,
    ctx: Arc<ControllerContext>,
) -> Action {
    let name = clone_set.name_any();
    let namespace = clone_set.namespace().unwrap_or_default();

    if error.is_retryable() {
        tracing::error!(name = %name, namespace = %namespace, error = %error, "Reconciliation error, retrying");
        Action::requeue(ctx.config.error_requeue)
    } else {
        tracing::error!(name = %name, namespace = %namespace, error = %error, "Reconciliation failed permanently");
        Action::await_change()
    }
}
