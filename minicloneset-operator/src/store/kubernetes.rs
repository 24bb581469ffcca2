//! Kubernetes API backed store.

use super::{ClusterStore, PodListing, POD_KIND};
use crate::crd::{MiniCloneSet, MiniCloneSetStatus, KIND};
use crate::error::{OperatorError, OperatorResult};
use crate::key::ResourceKey;
use crate::pod;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};

/// Store talking to the API server through a [`kube::Client`].
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Store using `client`.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn clone_sets(&self, namespace: &str) -> Api<MiniCloneSet> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_clone_set(&self, key: &ResourceKey) -> OperatorResult<MiniCloneSet> {
        self.clone_sets(&key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| OperatorError::from_kube(e, KIND, &key.name, &key.namespace))
    }

    async fn list_pods(&self, key: &ResourceKey, owner_uid: &str) -> OperatorResult<PodListing> {
        let selector = pod::owner_selector(&key.name);
        let pod_list = self
            .pods(&key.namespace)
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| OperatorError::from_kube(e, POD_KIND, &selector, &key.namespace))?;

        Ok(PodListing::split(pod_list.items, owner_uid))
    }

    async fn create_pod(&self, pod: &Pod) -> OperatorResult<Pod> {
        let name = pod.name_any();
        let namespace = pod
            .namespace()
            .ok_or_else(|| OperatorError::InvalidResource {
                name: name.clone(),
                reason: "pod has no namespace".to_string(),
            })?;

        self.pods(&namespace)
            .create(&PostParams::default(), pod)
            .await
            .map_err(|e| OperatorError::from_kube(e, POD_KIND, &name, &namespace))
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> OperatorResult<()> {
        self.pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| OperatorError::from_kube(e, POD_KIND, name, namespace))?;
        Ok(())
    }

    async fn update_status(
        &self,
        clone_set: &MiniCloneSet,
        status: MiniCloneSetStatus,
    ) -> OperatorResult<MiniCloneSet> {
        let name = clone_set.name_any();
        let namespace = clone_set
            .namespace()
            .ok_or_else(|| OperatorError::InvalidResource {
                name: name.clone(),
                reason: "MiniCloneSet has no namespace".to_string(),
            })?;

        // Full object so the resourceVersion guards the write.
        let mut updated = clone_set.clone();
        updated.status = Some(status);
        let body = serde_json::to_vec(&updated)?;

        self.clone_sets(&namespace)
            .replace_status(&name, &PostParams::default(), body)
            .await
            .map_err(|e| OperatorError::from_kube(e, KIND, &name, &namespace))
    }
}
