//! Remote state the reconciler reads and writes.
//!
//! The reconciler only sees [`ClusterStore`]. [`KubeStore`] backs it with the
//! Kubernetes API; [`InMemoryStore`] is a single-process stand-in for tests.

mod kubernetes;
pub mod memory;

pub use self::kubernetes::KubeStore;
pub use self::memory::InMemoryStore;

use crate::crd::{MiniCloneSet, MiniCloneSetStatus};
use crate::error::OperatorResult;
use crate::key::ResourceKey;
use crate::pod;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;

/// Kind name used in pod errors.
pub const POD_KIND: &str = "Pod";

/// Pods found under a MiniCloneSet's owner label.
#[derive(Debug, Clone, Default)]
pub struct PodListing {
    /// Pods whose controller reference carries the owner's UID, in list order.
    pub owned: Vec<Pod>,
    /// Names of labelled pods controlled by something else, or by nothing.
    pub foreign: Vec<String>,
}

impl PodListing {
    /// Split labelled pods by controller UID.
    pub fn split(pods: impl IntoIterator<Item = Pod>, owner_uid: &str) -> Self {
        let mut listing = Self::default();
        for p in pods {
            if pod::is_controlled_by(&p, owner_uid) {
                listing.owned.push(p);
            } else if let Some(name) = p.metadata.name {
                listing.foreign.push(name);
            }
        }
        listing
    }
}

/// Reads and writes MiniCloneSets and their pods.
///
/// Every method may fail with a transport error, or with
/// [`NotFound`](crate::OperatorError::NotFound),
/// [`AlreadyExists`](crate::OperatorError::AlreadyExists) or
/// [`Conflict`](crate::OperatorError::Conflict).
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fetch a MiniCloneSet in its hub version.
    async fn get_clone_set(&self, key: &ResourceKey) -> OperatorResult<MiniCloneSet>;

    /// Pods labelled for `key`, split by whether their controller reference
    /// carries `owner_uid`.
    async fn list_pods(&self, key: &ResourceKey, owner_uid: &str) -> OperatorResult<PodListing>;

    /// Create a pod. The pod's namespace is taken from its metadata.
    async fn create_pod(&self, pod: &Pod) -> OperatorResult<Pod>;

    /// Request deletion of a pod.
    async fn delete_pod(&self, namespace: &str, name: &str) -> OperatorResult<()>;

    /// Replace the status of `clone_set`, guarded by its resourceVersion.
    async fn update_status(
        &self,
        clone_set: &MiniCloneSet,
        status: MiniCloneSetStatus,
    ) -> OperatorResult<MiniCloneSet>;
}
