//! Scheme registry for the MiniCloneSet kind.
//!
//! Built once by each binary and passed by reference to whatever needs to
//! decode, convert or publish the schema.

use super::{v1, v1alpha1, v1beta1, AnyMiniCloneSet, ConversionError, GROUP, HUB_VERSION, KIND};
use crate::error::{OperatorError, OperatorResult};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceConversion, CustomResourceDefinition, ServiceReference, WebhookClientConfig,
    WebhookConversion,
};
use kube::core::crd::merge_crds;
use kube::CustomResourceExt;

/// Service fronting the conversion webhook.
#[derive(Debug, Clone)]
pub struct WebhookService {
    /// Service name.
    pub name: String,
    /// Service namespace.
    pub namespace: String,
    /// Service port.
    pub port: i32,
    /// PEM bundle of the CA that signed the webhook certificate.
    pub ca_bundle: Option<Vec<u8>>,
}

/// Path the conversion webhook serves.
pub const CONVERT_PATH: &str = "/convert";

/// Known versions of the MiniCloneSet kind.
#[derive(Debug, Clone)]
pub struct SchemeRegistry {
    group: &'static str,
    kind: &'static str,
    hub: &'static str,
    versions: Vec<&'static str>,
}

impl Default for SchemeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemeRegistry {
    /// Registry with every served MiniCloneSet version.
    pub fn new() -> Self {
        Self {
            group: GROUP,
            kind: KIND,
            hub: HUB_VERSION,
            versions: AnyMiniCloneSet::VERSIONS.to_vec(),
        }
    }

    /// Served version names.
    pub fn versions(&self) -> &[&'static str] {
        &self.versions
    }

    /// Hub version name.
    pub fn hub_version(&self) -> &'static str {
        self.hub
    }

    /// Full apiVersion (`group/version`) for a version name.
    pub fn api_version(&self, version: &str) -> String {
        format!("{}/{}", self.group, version)
    }

    /// Resolve a full apiVersion to a served version name.
    pub fn resolve(&self, api_version: &str) -> Result<&'static str, ConversionError> {
        let unsupported = || ConversionError::UnsupportedVersion {
            api_version: api_version.to_string(),
        };

        let (group, version) = api_version.split_once('/').ok_or_else(unsupported)?;
        if group != self.group {
            return Err(unsupported());
        }
        self.versions
            .iter()
            .copied()
            .find(|v| *v == version)
            .ok_or_else(unsupported)
    }

    /// Decode an untyped object into its concrete version.
    pub fn decode(&self, value: serde_json::Value) -> Result<AnyMiniCloneSet, ConversionError> {
        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .ok_or(ConversionError::MissingField("kind"))?;
        if kind != self.kind {
            return Err(ConversionError::UnexpectedKind {
                kind: kind.to_string(),
            });
        }

        let api_version = value
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .ok_or(ConversionError::MissingField("apiVersion"))?;
        let version = self.resolve(api_version)?;

        AnyMiniCloneSet::decode(version, value)
    }

    /// Decode an untyped object and lift it to the hub.
    pub fn decode_hub(&self, value: serde_json::Value) -> Result<v1::MiniCloneSet, ConversionError> {
        Ok(self.decode(value)?.to_hub())
    }

    /// Convert an untyped object to `desired_api_version`, through the hub.
    pub fn convert(
        &self,
        value: serde_json::Value,
        desired_api_version: &str,
    ) -> Result<serde_json::Value, ConversionError> {
        let target = self.resolve(desired_api_version)?;
        self.decode(value)?.convert_to(target)?.to_value()
    }

    /// Multi-version CRD with the hub as storage version.
    pub fn crd(&self) -> OperatorResult<CustomResourceDefinition> {
        merge_crds(
            vec![
                v1alpha1::MiniCloneSet::crd(),
                v1beta1::MiniCloneSet::crd(),
                v1::MiniCloneSet::crd(),
            ],
            self.hub,
        )
        .map_err(|e| OperatorError::InvalidConfig(format!("cannot merge CRD versions: {e}")))
    }

    /// Multi-version CRD whose conversions are served by the webhook.
    pub fn crd_with_webhook(
        &self,
        service: &WebhookService,
    ) -> OperatorResult<CustomResourceDefinition> {
        let mut crd = self.crd()?;
        crd.spec.conversion = Some(CustomResourceConversion {
            strategy: "Webhook".to_string(),
            webhook: Some(WebhookConversion {
                client_config: Some(WebhookClientConfig {
                    ca_bundle: service
                        .ca_bundle
                        .clone()
                        .map(k8s_openapi::ByteString),
                    service: Some(ServiceReference {
                        name: service.name.clone(),
                        namespace: service.namespace.clone(),
                        path: Some(CONVERT_PATH.to_string()),
                        port: Some(service.port),
                    }),
                    url: None,
                }),
                conversion_review_versions: vec!["v1".to_string()],
            }),
        });
        Ok(crd)
    }
}
