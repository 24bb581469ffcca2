//! Common test utilities for integration tests.

#![allow(dead_code)]

use kube::Resource;
use minicloneset_operator::crd::{
    ContainerSpec, MiniCloneSet, MiniCloneSetSpec, UpdateStrategy, UpdateStrategyType,
};
use minicloneset_operator::pod;
use minicloneset_operator::store::memory::Mutation;
use minicloneset_operator::{
    ControllerContext, InMemoryStore, MiniCloneSetController, OperatorResult, ReconcileAction,
    ReconcilerConfig, ResourceKey,
};
use std::sync::Arc;

/// Namespace every test object lives in.
pub const NAMESPACE: &str = "default";

/// Hub spec with the given replicas, image and strategy.
pub fn spec(replicas: i32, image: &str, strategy: UpdateStrategyType) -> MiniCloneSetSpec {
    MiniCloneSetSpec {
        replicas,
        container: ContainerSpec {
            image: image.to_string(),
        },
        update_strategy: UpdateStrategy {
            strategy_type: strategy,
            ..UpdateStrategy::default()
        },
    }
}

/// Namespaced MiniCloneSet named `name`.
pub fn clone_set(name: &str, spec: MiniCloneSetSpec) -> MiniCloneSet {
    let mut obj = MiniCloneSet::new(name, spec);
    obj.metadata.namespace = Some(NAMESPACE.to_string());
    obj
}

/// A controller wired to an in-memory store holding one MiniCloneSet.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub controller: MiniCloneSetController,
    pub key: ResourceKey,
}

impl Harness {
    /// Harness with default timing.
    pub fn new(store: InMemoryStore, obj: MiniCloneSet) -> Self {
        Self::with_config(store, obj, ReconcilerConfig::default())
    }

    /// Harness with custom timing.
    pub fn with_config(store: InMemoryStore, obj: MiniCloneSet, config: ReconcilerConfig) -> Self {
        let store = Arc::new(store);
        let key = ResourceKey::of(&obj).expect("test objects are namespaced");
        store.apply(obj).expect("apply MiniCloneSet");

        let ctx = Arc::new(ControllerContext::new(store.clone(), config));
        Self {
            store,
            controller: MiniCloneSetController::new(ctx),
            key,
        }
    }

    /// Run one reconciliation pass.
    pub async fn pass(&self) -> OperatorResult<ReconcileAction> {
        self.controller.reconcile(&self.key).await
    }

    /// Change the desired spec, as a user edit would.
    pub fn edit(&self, spec: MiniCloneSetSpec) {
        let mut obj = self.current();
        obj.spec = spec;
        self.store.apply(obj).expect("apply edit");
    }

    /// Stored MiniCloneSet.
    pub fn current(&self) -> MiniCloneSet {
        self.store
            .clone_set(&self.key)
            .expect("store lock")
            .expect("MiniCloneSet stored")
    }

    /// Recorded availableReplicas.
    pub fn available(&self) -> Option<i32> {
        self.current().status.map(|s| s.available_replicas)
    }

    /// Add an owned pod with `ordinal` running `image`.
    pub fn seed(&self, ordinal: u32, image: &str, ready: bool) {
        let owner = self.current();
        let mut desired = owner.spec.clone();
        desired.container.image = image.to_string();

        let mut p = pod::build_pod(&self.key, &desired, ordinal);
        p.metadata.owner_references =
            Some(vec![owner.controller_owner_ref(&()).expect("owner has uid")]);
        self.store.insert_pod(p).expect("insert pod");
        self.store
            .set_ready(NAMESPACE, &pod::pod_name(&self.key.name, ordinal), ready)
            .expect("store lock");
    }

    /// Names of pods not being deleted, in creation order.
    pub fn live_pods(&self) -> Vec<String> {
        self.store
            .pods()
            .expect("store lock")
            .iter()
            .filter(|p| !pod::is_terminating(p))
            .filter_map(|p| p.metadata.name.clone())
            .collect()
    }

    /// Images of pods not being deleted, in creation order.
    pub fn live_images(&self) -> Vec<String> {
        self.store
            .pods()
            .expect("store lock")
            .iter()
            .filter(|p| !pod::is_terminating(p))
            .filter_map(|p| pod::image(p).map(str::to_string))
            .collect()
    }

    /// Pod creations and deletions since the journal was last cleared.
    pub fn pod_mutations(&self) -> Vec<Mutation> {
        self.store
            .journal()
            .expect("store lock")
            .into_iter()
            .filter(|m| !matches!(m, Mutation::UpdateStatus { .. }))
            .collect()
    }

    /// Forget recorded mutations.
    pub fn clear(&self) {
        self.store.clear_journal().expect("store lock");
    }
}

/// Creation of the pod named `name`.
pub fn created(name: &str) -> Mutation {
    Mutation::CreatePod(name.to_string())
}

/// Deletion of the pod named `name`.
pub fn deleted(name: &str) -> Mutation {
    Mutation::DeletePod(name.to_string())
}
