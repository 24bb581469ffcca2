//! MiniCloneSet Kubernetes Operator
//!
//! Keeps a set of identical pods running for each `MiniCloneSet` resource,
//! scaling them to the desired count and replacing pods whose image is
//! outdated with either a rolling or a recreate strategy.
//!
//! # Custom Resource Definitions
//!
//! - **MiniCloneSet** (`apps.example.com`): served as `v1alpha1`, `v1beta1`
//!   and `v1`, stored as `v1`. Conversions run in the `minicloneset-webhook`
//!   binary.
//!
//! # Example
//!
//! ```yaml
//! apiVersion: apps.example.com/v1
//! kind: MiniCloneSet
//! metadata:
//!   name: web
//! spec:
//!   replicas: 3
//!   container:
//!     image: nginx:1.27
//!   updateStrategy:
//!     type: RollingUpdate
//!     maxUnavailable: "25%"
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod key;
pub mod pod;
pub mod store;
pub mod strategy;
pub mod webhook;

pub use config::ReconcilerConfig;
pub use controller::{ControllerContext, MiniCloneSetController, ReconcileAction};
pub use crd::{MiniCloneSet, MiniCloneSetSpec, MiniCloneSetStatus, SchemeRegistry};
pub use error::{OperatorError, OperatorResult};
pub use key::ResourceKey;
pub use store::{ClusterStore, InMemoryStore, KubeStore};
