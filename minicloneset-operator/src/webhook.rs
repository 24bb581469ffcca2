//! CRD conversion webhook payloads.
//!
//! The API server posts an `apiextensions.k8s.io/v1` `ConversionReview`
//! carrying objects in any served version plus the desired apiVersion.
//! [`review`] converts every object through the hub and answers with a
//! review holding the converted objects, or a failure result if any object
//! could not be converted.

use crate::crd::{ConversionError, SchemeRegistry};
use serde::{Deserialize, Serialize};

/// apiVersion of the review envelope.
pub const REVIEW_API_VERSION: &str = "apiextensions.k8s.io/v1";

/// Kind of the review envelope.
pub const REVIEW_KIND: &str = "ConversionReview";

/// Conversion review envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionReview {
    /// Always [`REVIEW_API_VERSION`].
    pub api_version: String,
    /// Always [`REVIEW_KIND`].
    pub kind: String,
    /// Set by the API server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ConversionRequest>,
    /// Set by the webhook.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ConversionResponse>,
}

/// Objects to convert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    /// Request identifier, echoed in the response.
    pub uid: String,
    /// Target apiVersion, e.g. `apps.example.com/v1alpha1`.
    #[serde(rename = "desiredAPIVersion")]
    pub desired_api_version: String,
    /// Objects in their current versions.
    #[serde(default)]
    pub objects: Vec<serde_json::Value>,
}

/// Converted objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResponse {
    /// Identifier of the request answered.
    pub uid: String,
    /// Objects in the desired version, in request order.
    #[serde(default)]
    pub converted_objects: Vec<serde_json::Value>,
    /// Outcome.
    pub result: ConversionStatus,
}

/// Conversion outcome, shaped like a `metav1.Status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionStatus {
    /// `Success` or `Failure`.
    pub status: String,
    /// Failure detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConversionStatus {
    fn success() -> Self {
        Self {
            status: "Success".to_string(),
            message: None,
        }
    }

    fn failure(message: String) -> Self {
        Self {
            status: "Failure".to_string(),
            message: Some(message),
        }
    }

    /// Whether the conversion succeeded.
    pub fn is_success(&self) -> bool {
        self.status == "Success"
    }
}

/// Answer a conversion review.
///
/// Fails only if the review carries no request; per-object conversion
/// errors are reported inside the returned review.
pub fn review(
    registry: &SchemeRegistry,
    review: ConversionReview,
) -> Result<ConversionReview, ConversionError> {
    let request = review.request.ok_or(ConversionError::MissingField("request"))?;

    let converted: Result<Vec<_>, _> = request
        .objects
        .into_iter()
        .map(|obj| registry.convert(obj, &request.desired_api_version))
        .collect();

    let response = match converted {
        Ok(converted_objects) => {
            tracing::debug!(
                uid = %request.uid,
                desired_api_version = %request.desired_api_version,
                count = converted_objects.len(),
                "Converted objects"
            );
            ConversionResponse {
                uid: request.uid,
                converted_objects,
                result: ConversionStatus::success(),
            }
        }
        Err(e) => {
            tracing::warn!(
                uid = %request.uid,
                desired_api_version = %request.desired_api_version,
                error = %e,
                "Conversion failed"
            );
            ConversionResponse {
                uid: request.uid,
                converted_objects: Vec::new(),
                result: ConversionStatus::failure(e.to_string()),
            }
        }
    };

    Ok(ConversionReview {
        api_version: REVIEW_API_VERSION.to_string(),
        kind: REVIEW_KIND.to_string(),
        request: None,
        response: Some(response),
    })
}
