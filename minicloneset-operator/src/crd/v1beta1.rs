//! MiniCloneSet `v1beta1`, the intermediate nested layout.
//!
//! Field-for-field identical to the hub, so conversion is lossless.

use super::{default_replicas, v1, HubConvertible, MiniCloneSetStatus};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// MiniCloneSet is the Schema for the miniclonesets API.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apps.example.com",
    version = "v1beta1",
    kind = "MiniCloneSet",
    plural = "miniclonesets",
    shortname = "mcs",
    namespaced,
    status = "MiniCloneSetStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Desired", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Available", "type":"integer", "jsonPath":".status.availableReplicas"}"#,
    printcolumn = r#"{"name":"Image", "type":"string", "jsonPath":".spec.container.image"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MiniCloneSetSpec {
    /// Number of desired pods.
    #[serde(default = "default_replicas")]
    #[schemars(range(min = 0))]
    pub replicas: i32,

    /// Container configuration.
    pub container: v1::ContainerSpec,

    /// Strategy used to replace outdated pods.
    #[serde(default)]
    pub update_strategy: v1::UpdateStrategy,
}

impl HubConvertible for MiniCloneSet {
    const VERSION: &'static str = "v1beta1";

    fn to_hub(&self) -> v1::MiniCloneSet {
        let mut update_strategy = self.spec.update_strategy.clone();
        if update_strategy.max_unavailable.is_none() {
            update_strategy.max_unavailable = Some(v1::DEFAULT_MAX_UNAVAILABLE.to_string());
        }

        v1::MiniCloneSet {
            metadata: self.metadata.clone(),
            spec: v1::MiniCloneSetSpec {
                replicas: self.spec.replicas,
                container: self.spec.container.clone(),
                update_strategy,
            },
            status: self.status.clone(),
        }
    }

    fn from_hub(hub: &v1::MiniCloneSet) -> Self {
        MiniCloneSet {
            metadata: hub.metadata.clone(),
            spec: MiniCloneSetSpec {
                replicas: hub.spec.replicas,
                container: hub.spec.container.clone(),
                update_strategy: hub.spec.update_strategy.clone(),
            },
            status: hub.status.clone(),
        }
    }
}
