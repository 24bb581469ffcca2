//! MiniCloneSet `v1`, the hub version.
//!
//! This is the storage version and the only representation the controller
//! reconciles. The other versions convert through it.

use super::{default_replicas, HubConvertible, MiniCloneSetStatus};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// maxUnavailable applied when a spec leaves it unset.
pub const DEFAULT_MAX_UNAVAILABLE: &str = "25%";

/// MiniCloneSet is the Schema for the miniclonesets API.
///
/// A MiniCloneSet keeps `replicas` identical pods running `container.image`,
/// replacing outdated pods according to `updateStrategy`.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apps.example.com",
    version = "v1",
    kind = "MiniCloneSet",
    plural = "miniclonesets",
    shortname = "mcs",
    namespaced,
    status = "MiniCloneSetStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Desired", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Available", "type":"integer", "jsonPath":".status.availableReplicas"}"#,
    printcolumn = r#"{"name":"Image", "type":"string", "jsonPath":".spec.container.image"}"#,
    printcolumn = r#"{"name":"Strategy", "type":"string", "jsonPath":".spec.updateStrategy.type"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MiniCloneSetSpec {
    /// Number of desired pods.
    #[serde(default = "default_replicas")]
    #[schemars(range(min = 0))]
    pub replicas: i32,

    /// Container configuration shared by every pod.
    pub container: ContainerSpec,

    /// Strategy used to replace outdated pods.
    #[serde(default)]
    pub update_strategy: UpdateStrategy,
}

/// Container configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    /// Container image to run.
    #[schemars(length(min = 1))]
    pub image: String,
}

/// Update strategy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStrategy {
    /// Strategy type.
    #[serde(rename = "type", default)]
    pub strategy_type: UpdateStrategyType,

    /// Maximum number of unavailable pods during an update, as a count
    /// (`"1"`) or a percentage of desired replicas (`"25%"`).
    #[serde(
        default = "default_max_unavailable",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_unavailable: Option<String>,
}

impl Default for UpdateStrategy {
    fn default() -> Self {
        Self {
            strategy_type: UpdateStrategyType::default(),
            max_unavailable: default_max_unavailable(),
        }
    }
}

fn default_max_unavailable() -> Option<String> {
    Some(DEFAULT_MAX_UNAVAILABLE.to_string())
}

/// How outdated pods are replaced.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
)]
pub enum UpdateStrategyType {
    /// Pods are replaced one by one; a replacement is created before the
    /// outdated pod is removed.
    #[default]
    RollingUpdate,
    /// Every pod is deleted first, then new ones are created.
    Recreate,
}

impl HubConvertible for MiniCloneSet {
    const VERSION: &'static str = "v1";

    fn to_hub(&self) -> MiniCloneSet {
        self.clone()
    }

    fn from_hub(hub: &MiniCloneSet) -> Self {
        hub.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn defaults_applied_on_deserialize() {
        let spec: MiniCloneSetSpec = serde_json::from_value(serde_json::json!({
            "container": { "image": "nginx:1.27" }
        }))
        .expect("minimal v1 spec should deserialize");

        assert_eq!(spec.replicas, 1);
        assert_eq!(
            spec.update_strategy.strategy_type,
            UpdateStrategyType::RollingUpdate
        );
        assert_eq!(
            spec.update_strategy.max_unavailable.as_deref(),
            Some(DEFAULT_MAX_UNAVAILABLE)
        );
    }

    #[test]
    fn strategy_type_uses_wire_names() {
        let strategy: UpdateStrategy = serde_json::from_value(serde_json::json!({
            "type": "Recreate",
            "maxUnavailable": "1"
        }))
        .expect("strategy should deserialize");

        assert_eq!(strategy.strategy_type, UpdateStrategyType::Recreate);
        assert_eq!(strategy.strategy_type.to_string(), "Recreate");
        assert_eq!(strategy.max_unavailable.as_deref(), Some("1"));
    }

    #[test]
    fn serializes_type_meta() {
        let set = MiniCloneSet::new(
            "web",
            MiniCloneSetSpec {
                replicas: 2,
                container: ContainerSpec {
                    image: "nginx:1.27".into(),
                },
                update_strategy: UpdateStrategy::default(),
            },
        );

        let json = serde_json::to_value(&set).expect("Failed to serialize MiniCloneSet");
        assert_eq!(json["apiVersion"], "apps.example.com/v1");
        assert_eq!(json["kind"], "MiniCloneSet");
        assert_eq!(json["spec"]["updateStrategy"]["type"], "RollingUpdate");
        assert_eq!(MiniCloneSet::api_version(&()), "apps.example.com/v1");
    }
}
