//! In-memory store implementation for testing.
//!
//! [`InMemoryStore`] keeps MiniCloneSets and pods in process memory and
//! mimics the API server closely enough to drive the reconciler:
//!
//! - pods are listed in creation order
//! - creates assign a UID and reject duplicate names
//! - status writes are checked against the stored resourceVersion
//! - deletion is immediate, or graceful when enabled, in which case pods stay
//!   listed with a deletion timestamp until [`InMemoryStore::finish_terminations`]
//!
//! Faults and per-call latency can be injected to exercise error paths and
//! the pass deadline. Not suitable for production.

use super::{ClusterStore, PodListing, POD_KIND};
use crate::crd::{MiniCloneSet, MiniCloneSetStatus, KIND};
use crate::error::{OperatorError, OperatorResult};
use crate::key::ResourceKey;
use crate::pod;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, PodCondition, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Store call, as targeted by fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum StoreOp {
    /// [`ClusterStore::get_clone_set`]
    GetCloneSet,
    /// [`ClusterStore::list_pods`]
    ListPods,
    /// [`ClusterStore::create_pod`]
    CreatePod,
    /// [`ClusterStore::delete_pod`]
    DeletePod,
    /// [`ClusterStore::update_status`]
    UpdateStatus,
}

/// Error an injected fault produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Transient backend failure.
    Unavailable,
    /// Optimistic-concurrency rejection.
    Conflict,
}

/// A successful mutating call, as recorded in the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Pod created.
    CreatePod(String),
    /// Pod deletion requested.
    DeletePod(String),
    /// Status written.
    UpdateStatus {
        /// MiniCloneSet name.
        name: String,
        /// Written availableReplicas.
        available_replicas: i32,
    },
}

#[derive(Debug)]
struct FaultRule {
    op: StoreOp,
    skip: usize,
    fault: Fault,
}

#[derive(Debug, Default)]
struct State {
    clone_sets: HashMap<ResourceKey, MiniCloneSet>,
    pods: Vec<Pod>,
    faults: Vec<FaultRule>,
    journal: Vec<Mutation>,
    next_uid: u64,
    next_version: u64,
}

impl State {
    fn uid(&mut self, prefix: &str) -> String {
        self.next_uid += 1;
        format!("{prefix}-{:04}", self.next_uid)
    }

    fn version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn pod_index(&self, namespace: &str, name: &str) -> Option<usize> {
        self.pods.iter().position(|p| {
            p.metadata.namespace.as_deref() == Some(namespace)
                && p.metadata.name.as_deref() == Some(name)
        })
    }

    /// Consume a matching fault rule, if one is due.
    fn take_fault(&mut self, op: StoreOp) -> Option<Fault> {
        let idx = self.faults.iter().position(|r| r.op == op)?;
        let rule = &mut self.faults[idx];
        if rule.skip > 0 {
            rule.skip -= 1;
            return None;
        }
        Some(self.faults.remove(idx).fault)
    }
}

/// In-memory [`ClusterStore`] for tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    latency: Option<Duration>,
    graceful_deletion: bool,
    ready_on_create: bool,
}

fn poison_err<T>(_: PoisonError<T>) -> OperatorError {
    OperatorError::StoreError("lock poisoned".to_string())
}

impl InMemoryStore {
    /// Empty store with immediate deletion and unready new pods.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Keep deleted pods listed, with a deletion timestamp, until
    /// [`finish_terminations`](Self::finish_terminations).
    #[must_use]
    pub fn with_graceful_deletion(mut self) -> Self {
        self.graceful_deletion = true;
        self
    }

    /// Report created pods as ready straight away.
    #[must_use]
    pub fn with_ready_pods(mut self) -> Self {
        self.ready_on_create = true;
        self
    }

    fn lock(&self) -> OperatorResult<MutexGuard<'_, State>> {
        self.state.lock().map_err(poison_err)
    }

    async fn enter(&self, op: StoreOp) -> OperatorResult<MutexGuard<'_, State>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.lock()?;
        match state.take_fault(op) {
            None => Ok(state),
            Some(Fault::Unavailable) => Err(OperatorError::StoreError(format!(
                "injected failure in {op}"
            ))),
            Some(Fault::Conflict) => Err(OperatorError::Conflict {
                kind: KIND.to_string(),
                name: format!("injected by {op}"),
                namespace: String::new(),
            }),
        }
    }

    /// Insert or replace a MiniCloneSet, as a user would with `kubectl apply`.
    ///
    /// Assigns a UID on first insert and a fresh resourceVersion every time.
    /// The stored status is kept when `obj` carries none.
    pub fn apply(&self, mut obj: MiniCloneSet) -> OperatorResult<MiniCloneSet> {
        let key = ResourceKey::of(&obj).ok_or_else(|| OperatorError::InvalidResource {
            name: obj.name_any(),
            reason: "MiniCloneSet has no namespace".to_string(),
        })?;

        let mut state = self.lock()?;
        let existing = state
            .clone_sets
            .get(&key)
            .map(|e| (e.metadata.uid.clone(), e.status.clone()));
        match existing {
            Some((uid, status)) => {
                obj.metadata.uid = uid;
                if obj.status.is_none() {
                    obj.status = status;
                }
            }
            None => obj.metadata.uid = Some(state.uid("mcs")),
        }
        obj.metadata.resource_version = Some(state.version());
        state.clone_sets.insert(key, obj.clone());
        Ok(obj)
    }

    /// Remove a MiniCloneSet. Its pods are left behind.
    pub fn remove(&self, key: &ResourceKey) -> OperatorResult<Option<MiniCloneSet>> {
        Ok(self.lock()?.clone_sets.remove(key))
    }

    /// Stored copy of a MiniCloneSet.
    pub fn clone_set(&self, key: &ResourceKey) -> OperatorResult<Option<MiniCloneSet>> {
        Ok(self.lock()?.clone_sets.get(key).cloned())
    }

    /// Insert a pod as-is, bypassing fault injection and the journal.
    pub fn insert_pod(&self, mut pod: Pod) -> OperatorResult<()> {
        let mut state = self.lock()?;
        if pod.metadata.uid.is_none() {
            pod.metadata.uid = Some(state.uid("pod"));
        }
        pod.metadata.resource_version = Some(state.version());
        state.pods.push(pod);
        Ok(())
    }

    /// Snapshot of every stored pod, in creation order.
    pub fn pods(&self) -> OperatorResult<Vec<Pod>> {
        Ok(self.lock()?.pods.clone())
    }

    /// Set the `Ready` condition of a pod. Returns false if no such pod.
    pub fn set_ready(&self, namespace: &str, name: &str, ready: bool) -> OperatorResult<bool> {
        let mut state = self.lock()?;
        let Some(idx) = state.pod_index(namespace, name) else {
            return Ok(false);
        };
        state.pods[idx].status = Some(ready_status(ready));
        Ok(true)
    }

    /// Mark every pod ready.
    pub fn mark_all_ready(&self) -> OperatorResult<()> {
        let mut state = self.lock()?;
        for p in state.pods.iter_mut() {
            p.status = Some(ready_status(true));
        }
        Ok(())
    }

    /// Drop every pod that has a deletion timestamp. Returns how many.
    pub fn finish_terminations(&self) -> OperatorResult<usize> {
        let mut state = self.lock()?;
        let before = state.pods.len();
        state.pods.retain(|p| !pod::is_terminating(p));
        Ok(before - state.pods.len())
    }

    /// Fail the call to `op` after `skip` successful ones. One-shot.
    pub fn inject_fault(&self, op: StoreOp, skip: usize, fault: Fault) -> OperatorResult<()> {
        self.lock()?.faults.push(FaultRule { op, skip, fault });
        Ok(())
    }

    /// Successful mutating calls so far.
    pub fn journal(&self) -> OperatorResult<Vec<Mutation>> {
        Ok(self.lock()?.journal.clone())
    }

    /// Forget the journal.
    pub fn clear_journal(&self) -> OperatorResult<()> {
        self.lock()?.journal.clear();
        Ok(())
    }
}

fn ready_status(ready: bool) -> PodStatus {
    PodStatus {
        conditions: Some(vec![PodCondition {
            type_: "Ready".to_string(),
            status: if ready { "True" } else { "False" }.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

#[async_trait]
impl ClusterStore for InMemoryStore {
    async fn get_clone_set(&self, key: &ResourceKey) -> OperatorResult<MiniCloneSet> {
        let state = self.enter(StoreOp::GetCloneSet).await?;
        state
            .clone_sets
            .get(key)
            .cloned()
            .ok_or_else(|| OperatorError::NotFound {
                kind: KIND.to_string(),
                name: key.name.clone(),
                namespace: key.namespace.clone(),
            })
    }

    async fn list_pods(&self, key: &ResourceKey, owner_uid: &str) -> OperatorResult<PodListing> {
        let state = self.enter(StoreOp::ListPods).await?;
        let labels = pod::owner_labels(&key.name);

        let labelled = state
            .pods
            .iter()
            .filter(|p| p.metadata.namespace.as_deref() == Some(key.namespace.as_str()))
            .filter(|p| {
                let own = p.labels();
                labels.iter().all(|(k, v)| own.get(k) == Some(v))
            })
            .cloned();
        Ok(PodListing::split(labelled, owner_uid))
    }

    async fn create_pod(&self, pod: &Pod) -> OperatorResult<Pod> {
        let mut state = self.enter(StoreOp::CreatePod).await?;
        let name = pod.name_any();
        let namespace = pod
            .namespace()
            .ok_or_else(|| OperatorError::InvalidResource {
                name: name.clone(),
                reason: "pod has no namespace".to_string(),
            })?;

        if state.pod_index(&namespace, &name).is_some() {
            return Err(OperatorError::AlreadyExists {
                kind: POD_KIND.to_string(),
                name,
                namespace,
            });
        }

        let mut created = pod.clone();
        created.metadata.uid = Some(state.uid("pod"));
        created.metadata.resource_version = Some(state.version());
        created.status = Some(ready_status(self.ready_on_create));
        state.pods.push(created.clone());
        state.journal.push(Mutation::CreatePod(name));
        Ok(created)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> OperatorResult<()> {
        let mut state = self.enter(StoreOp::DeletePod).await?;
        let idx = state
            .pod_index(namespace, name)
            .ok_or_else(|| OperatorError::NotFound {
                kind: POD_KIND.to_string(),
                name: name.to_string(),
                namespace: namespace.to_string(),
            })?;

        if self.graceful_deletion {
            let version = state.version();
            let p = &mut state.pods[idx];
            if p.metadata.deletion_timestamp.is_none() {
                p.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
                p.metadata.resource_version = Some(version);
            }
        } else {
            state.pods.remove(idx);
        }
        state.journal.push(Mutation::DeletePod(name.to_string()));
        Ok(())
    }

    async fn update_status(
        &self,
        clone_set: &MiniCloneSet,
        status: MiniCloneSetStatus,
    ) -> OperatorResult<MiniCloneSet> {
        let mut state = self.enter(StoreOp::UpdateStatus).await?;
        let key = ResourceKey::of(clone_set).ok_or_else(|| OperatorError::InvalidResource {
            name: clone_set.name_any(),
            reason: "MiniCloneSet has no namespace".to_string(),
        })?;
        let not_found = || OperatorError::NotFound {
            kind: KIND.to_string(),
            name: key.name.clone(),
            namespace: key.namespace.clone(),
        };

        let stored_version = state
            .clone_sets
            .get(&key)
            .ok_or_else(not_found)?
            .metadata
            .resource_version
            .clone();
        if stored_version != clone_set.metadata.resource_version {
            return Err(OperatorError::Conflict {
                kind: KIND.to_string(),
                name: key.name.clone(),
                namespace: key.namespace.clone(),
            });
        }

        let version = state.version();
        let available_replicas = status.available_replicas;
        let stored = state.clone_sets.get_mut(&key).ok_or_else(not_found)?;
        stored.status = Some(status);
        stored.metadata.resource_version = Some(version);
        let updated = stored.clone();

        state.journal.push(Mutation::UpdateStatus {
            name: key.name.clone(),
            available_replicas,
        });
        Ok(updated)
    }
}
