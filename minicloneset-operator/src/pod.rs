//! Pod classification and construction.
//!
//! Pure functions over `k8s_openapi` pods; nothing here talks to the API.

use crate::crd::MiniCloneSetSpec;
use crate::key::ResourceKey;
use k8s_openapi::api::core::v1::{Container, ContainerPort, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Name of the primary container.
pub const MAIN_CONTAINER: &str = "main";

/// Port exposed by the primary container.
pub const CONTAINER_PORT: i32 = 80;

/// Label carrying the owning MiniCloneSet's name.
pub const OWNER_LABEL: &str = "app";

/// True iff the pod has a `Ready` condition with status `True`.
pub fn is_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

/// True iff the primary container runs `desired_image`.
///
/// A pod without a primary container is treated as up to date.
pub fn is_up_to_date(pod: &Pod, desired_image: &str) -> bool {
    main_container(pod)
        .map(|c| c.image.as_deref() == Some(desired_image))
        .unwrap_or(true)
}

/// True once deletion of the pod has been requested.
pub fn is_terminating(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_some()
}

/// True iff the pod's controller owner reference points at `owner_uid`.
pub fn is_controlled_by(pod: &Pod, owner_uid: &str) -> bool {
    pod.metadata
        .owner_references
        .as_ref()
        .map(|refs| {
            refs.iter()
                .any(|r| r.controller == Some(true) && r.uid == owner_uid)
        })
        .unwrap_or(false)
}

/// Image of the primary container, if any.
pub fn image(pod: &Pod) -> Option<&str> {
    main_container(pod).and_then(|c| c.image.as_deref())
}

fn main_container(pod: &Pod) -> Option<&Container> {
    pod.spec
        .as_ref()?
        .containers
        .iter()
        .find(|c| c.name == MAIN_CONTAINER)
}

/// Pod name for the given ordinal.
pub fn pod_name(owner_name: &str, ordinal: u32) -> String {
    format!("{owner_name}-{ordinal}")
}

/// Ordinal encoded in a pod name of the form `<owner>-<n>`.
pub fn ordinal(pod: &Pod, owner_name: &str) -> Option<u32> {
    name_ordinal(pod.metadata.name.as_deref()?, owner_name)
}

/// Ordinal encoded in `name` if it has the form `<owner>-<n>`.
pub fn name_ordinal(name: &str, owner_name: &str) -> Option<u32> {
    name.strip_prefix(owner_name)?.strip_prefix('-')?.parse().ok()
}

/// Labels every pod of `owner_name` carries.
pub fn owner_labels(owner_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(OWNER_LABEL.to_string(), owner_name.to_string())])
}

/// Label selector matching every pod of `owner_name`.
pub fn owner_selector(owner_name: &str) -> String {
    format!("{OWNER_LABEL}={owner_name}")
}

/// Build the pod with `ordinal` for a MiniCloneSet.
///
/// The returned pod has no owner reference; the caller sets it before
/// creating the pod.
pub fn build_pod(owner: &ResourceKey, spec: &MiniCloneSetSpec, ordinal: u32) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(pod_name(&owner.name, ordinal)),
            namespace: Some(owner.namespace.clone()),
            labels: Some(owner_labels(&owner.name)),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: MAIN_CONTAINER.to_string(),
                image: Some(spec.container.image.clone()),
                ports: Some(vec![ContainerPort {
                    container_port: CONTAINER_PORT,
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }],
            ..Default::default()
        }),
        status: None,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use k8s_openapi::api::core::v1::{PodCondition, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    /// Pod `name` running `image` in its primary container.
    pub fn pod(name: &str, image: &str, ready: bool) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: MAIN_CONTAINER.to_string(),
                    image: Some(image.to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: Some(PodStatus {
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: if ready { "True" } else { "False" }.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        }
    }

    /// Same as [`pod`] with a deletion timestamp set.
    pub fn terminating(name: &str, image: &str) -> Pod {
        let mut p = pod(name, image, true);
        p.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        p
    }
}

#[cfg(test)]
mod tests {
    use super::testing::pod;
    use super::*;
    use crate::crd::{ContainerSpec, UpdateStrategy};

    #[test]
    fn readiness_requires_true_ready_condition() {
        assert!(is_ready(&pod("web-0", "app:v1", true)));
        assert!(!is_ready(&pod("web-0", "app:v1", false)));

        let mut no_status = pod("web-0", "app:v1", true);
        no_status.status = None;
        assert!(!is_ready(&no_status));
    }

    #[test]
    fn up_to_date_compares_primary_container_image() {
        let p = pod("web-0", "app:v1", true);
        assert!(is_up_to_date(&p, "app:v1"));
        assert!(!is_up_to_date(&p, "app:v2"));
    }

    #[test]
    fn pod_without_primary_container_is_up_to_date() {
        let mut p = pod("web-0", "app:v1", true);
        if let Some(spec) = p.spec.as_mut() {
            spec.containers[0].name = "sidecar".into();
        }
        assert!(is_up_to_date(&p, "app:v2"));

        p.spec = None;
        assert!(is_up_to_date(&p, "app:v2"));
    }

    #[test]
    fn controller_reference_must_match_uid() {
        use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

        let mut p = pod("web-0", "app:v1", true);
        assert!(!is_controlled_by(&p, "uid-1"));

        let owner = OwnerReference {
            api_version: "apps.example.com/v1".into(),
            kind: "MiniCloneSet".into(),
            name: "web".into(),
            uid: "uid-1".into(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        };
        p.metadata.owner_references = Some(vec![owner.clone()]);
        assert!(is_controlled_by(&p, "uid-1"));
        assert!(!is_controlled_by(&p, "uid-2"));

        p.metadata.owner_references = Some(vec![OwnerReference {
            controller: None,
            ..owner
        }]);
        assert!(!is_controlled_by(&p, "uid-1"));
    }

    #[test]
    fn parses_ordinals_of_own_pods_only() {
        assert_eq!(ordinal(&pod("web-12", "x", true), "web"), Some(12));
        assert_eq!(ordinal(&pod("webapp-1", "x", true), "web"), None);
        assert_eq!(ordinal(&pod("web-abc", "x", true), "web"), None);
        assert_eq!(name_ordinal("web-3", "web"), Some(3));
        assert_eq!(name_ordinal("web-", "web"), None);
    }

    #[test]
    fn builds_owner_labelled_pod() {
        let spec = MiniCloneSetSpec {
            replicas: 3,
            container: ContainerSpec {
                image: "app:v2".into(),
            },
            update_strategy: UpdateStrategy::default(),
        };
        let p = build_pod(&ResourceKey::new("prod", "web"), &spec, 2);

        assert_eq!(p.metadata.name.as_deref(), Some("web-2"));
        assert_eq!(p.metadata.namespace.as_deref(), Some("prod"));
        assert_eq!(
            p.metadata.labels.as_ref().and_then(|l| l.get(OWNER_LABEL)),
            Some(&"web".to_string())
        );
        assert_eq!(image(&p), Some("app:v2"));

        let containers = &p.spec.as_ref().expect("pod spec").containers;
        assert_eq!(containers.len(), 1);
        let ports = containers[0].ports.as_ref().expect("ports");
        assert_eq!(ports[0].container_port, CONTAINER_PORT);
        assert_eq!(ports[0].protocol.as_deref(), Some("TCP"));
        assert!(p.metadata.owner_references.is_none());
    }
}
