//! Custom Resource Definitions for the MiniCloneSet operator.
//!
//! One resource kind, `MiniCloneSet`, is served in three API versions:
//!
//! - [`v1alpha1`]: flat layout with a free-string update strategy
//! - [`v1beta1`]: nested layout, same shape as the hub
//! - [`v1`]: the hub and storage version; the controller only ever sees this one
//!
//! Every non-hub version converts to and from the hub through
//! [`HubConvertible`]. Untyped objects are decoded into [`AnyMiniCloneSet`] by
//! the [`SchemeRegistry`].

mod conversion;
mod registry;
pub mod v1;
pub mod v1alpha1;
pub mod v1beta1;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use conversion::{AnyMiniCloneSet, ConversionError, HubConvertible};
pub use registry::{SchemeRegistry, WebhookService, CONVERT_PATH};
pub use v1::{
    ContainerSpec, MiniCloneSet, MiniCloneSetSpec, UpdateStrategy, UpdateStrategyType,
    DEFAULT_MAX_UNAVAILABLE,
};

/// API group of every MiniCloneSet version.
pub const GROUP: &str = "apps.example.com";

/// Resource kind.
pub const KIND: &str = "MiniCloneSet";

/// Version every other version converts through.
///
/// The hub is the stable `v1` name so storage never moves to a pre-release
/// version; `v1beta1` shares its shape and converts without loss.
pub const HUB_VERSION: &str = "v1";

/// Observed state of a MiniCloneSet.
///
/// Identical on the wire in every version, so conversions copy it unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MiniCloneSetStatus {
    /// Number of owned pods that are ready.
    #[serde(default)]
    pub available_replicas: i32,
}

fn default_replicas() -> i32 {
    1
}
