//! MiniCloneSet `v1alpha1`, the flat legacy layout.
//!
//! `image` sits directly on the spec and `updateStrategy` is a bare string.
//! There is no maxUnavailable, so converting the hub down to this version
//! drops it and converting back up yields the default.

use super::{default_replicas, v1, HubConvertible, MiniCloneSetStatus};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// MiniCloneSet is the Schema for the miniclonesets API.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apps.example.com",
    version = "v1alpha1",
    kind = "MiniCloneSet",
    plural = "miniclonesets",
    shortname = "mcs",
    namespaced,
    status = "MiniCloneSetStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Desired", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Available", "type":"integer", "jsonPath":".status.availableReplicas"}"#,
    printcolumn = r#"{"name":"Image", "type":"string", "jsonPath":".spec.image"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MiniCloneSetSpec {
    /// Number of desired pods.
    #[serde(default = "default_replicas")]
    #[schemars(range(min = 0))]
    pub replicas: i32,

    /// Container image to run.
    #[schemars(length(min = 1))]
    pub image: String,

    /// Update strategy name (`RollingUpdate` or `Recreate`).
    #[serde(default = "default_update_strategy")]
    pub update_strategy: String,
}

fn default_update_strategy() -> String {
    v1::UpdateStrategyType::default().to_string()
}

impl HubConvertible for MiniCloneSet {
    const VERSION: &'static str = "v1alpha1";

    fn to_hub(&self) -> v1::MiniCloneSet {
        // Admission validates the strategy string; anything unrecognised lands
        // on the schema default.
        let strategy_type = self.spec.update_strategy.parse().unwrap_or_default();

        v1::MiniCloneSet {
            metadata: self.metadata.clone(),
            spec: v1::MiniCloneSetSpec {
                replicas: self.spec.replicas,
                container: v1::ContainerSpec {
                    image: self.spec.image.clone(),
                },
                update_strategy: v1::UpdateStrategy {
                    strategy_type,
                    max_unavailable: Some(v1::DEFAULT_MAX_UNAVAILABLE.to_string()),
                },
            },
            status: self.status.clone(),
        }
    }

    fn from_hub(hub: &v1::MiniCloneSet) -> Self {
        MiniCloneSet {
            metadata: hub.metadata.clone(),
            spec: MiniCloneSetSpec {
                replicas: hub.spec.replicas,
                image: hub.spec.container.image.clone(),
                update_strategy: hub.spec.update_strategy.strategy_type.to_string(),
            },
            status: hub.status.clone(),
        }
    }
}
