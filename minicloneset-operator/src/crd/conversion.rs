//! Typed conversion between MiniCloneSet versions.

use super::{v1, v1alpha1, v1beta1};
use thiserror::Error;

/// A version that converts to and from the hub ([`v1::MiniCloneSet`]).
///
/// Every served version implements this, the hub included (as identity), so
/// conversion between any two versions is `from_hub(to_hub(x))`.
pub trait HubConvertible: Sized {
    /// Version name, e.g. `v1alpha1`.
    const VERSION: &'static str;

    /// Convert this object up to the hub.
    fn to_hub(&self) -> v1::MiniCloneSet;

    /// Convert a hub object down to this version.
    fn from_hub(hub: &v1::MiniCloneSet) -> Self;
}

/// Errors raised by schema conversion.
///
/// All of them are contract violations: retrying the same request cannot
/// succeed.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// apiVersion is not one of the served MiniCloneSet versions.
    #[error("unsupported apiVersion {api_version:?}")]
    UnsupportedVersion {
        /// The offending apiVersion.
        api_version: String,
    },

    /// The object is not a MiniCloneSet.
    #[error("unexpected kind {kind:?}, expected MiniCloneSet")]
    UnexpectedKind {
        /// The offending kind.
        kind: String,
    },

    /// A required type field is absent.
    #[error("object is missing {0}")]
    MissingField(&'static str),

    /// The object does not match the schema of its declared version.
    #[error("malformed {api_version} object: {reason}")]
    Malformed {
        /// Declared apiVersion.
        api_version: String,
        /// Deserialization failure.
        reason: String,
    },
}

/// A MiniCloneSet in any served version.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyMiniCloneSet {
    /// Flat legacy layout.
    V1Alpha1(v1alpha1::MiniCloneSet),
    /// Intermediate nested layout.
    V1Beta1(v1beta1::MiniCloneSet),
    /// Hub.
    V1(v1::MiniCloneSet),
}

impl AnyMiniCloneSet {
    /// Served versions, hub last.
    pub const VERSIONS: [&'static str; 3] = [
        <v1alpha1::MiniCloneSet as HubConvertible>::VERSION,
        <v1beta1::MiniCloneSet as HubConvertible>::VERSION,
        <v1::MiniCloneSet as HubConvertible>::VERSION,
    ];

    /// Decode an untyped object whose apiVersion has already been resolved to
    /// `version`.
    pub fn decode(version: &str, value: serde_json::Value) -> Result<Self, ConversionError> {
        let malformed = |e: serde_json::Error| ConversionError::Malformed {
            api_version: version.to_string(),
            reason: e.to_string(),
        };

        match version {
            "v1alpha1" => Ok(Self::V1Alpha1(
                serde_json::from_value(value).map_err(malformed)?,
            )),
            "v1beta1" => Ok(Self::V1Beta1(
                serde_json::from_value(value).map_err(malformed)?,
            )),
            "v1" => Ok(Self::V1(serde_json::from_value(value).map_err(malformed)?)),
            other => Err(ConversionError::UnsupportedVersion {
                api_version: other.to_string(),
            }),
        }
    }

    /// Version this object is encoded in.
    pub fn version(&self) -> &'static str {
        match self {
            Self::V1Alpha1(_) => <v1alpha1::MiniCloneSet as HubConvertible>::VERSION,
            Self::V1Beta1(_) => <v1beta1::MiniCloneSet as HubConvertible>::VERSION,
            Self::V1(_) => <v1::MiniCloneSet as HubConvertible>::VERSION,
        }
    }

    /// Convert up to the hub.
    pub fn to_hub(&self) -> v1::MiniCloneSet {
        match self {
            Self::V1Alpha1(obj) => obj.to_hub(),
            Self::V1Beta1(obj) => obj.to_hub(),
            Self::V1(obj) => obj.to_hub(),
        }
    }

    /// Convert a hub object down to `version`.
    pub fn from_hub(hub: &v1::MiniCloneSet, version: &str) -> Result<Self, ConversionError> {
        match version {
            "v1alpha1" => Ok(Self::V1Alpha1(v1alpha1::MiniCloneSet::from_hub(hub))),
            "v1beta1" => Ok(Self::V1Beta1(v1beta1::MiniCloneSet::from_hub(hub))),
            "v1" => Ok(Self::V1(hub.clone())),
            other => Err(ConversionError::UnsupportedVersion {
                api_version: other.to_string(),
            }),
        }
    }

    /// Convert to another served version through the hub.
    pub fn convert_to(&self, version: &str) -> Result<Self, ConversionError> {
        if self.version() == version {
            return Ok(self.clone());
        }
        Self::from_hub(&self.to_hub(), version)
    }

    /// Encode as JSON, including `apiVersion` and `kind`.
    pub fn to_value(&self) -> Result<serde_json::Value, ConversionError> {
        let encoded = match self {
            Self::V1Alpha1(obj) => serde_json::to_value(obj),
            Self::V1Beta1(obj) => serde_json::to_value(obj),
            Self::V1(obj) => serde_json::to_value(obj),
        };
        encoded.map_err(|e| ConversionError::Malformed {
            api_version: self.version().to_string(),
            reason: e.to_string(),
        })
    }
}
