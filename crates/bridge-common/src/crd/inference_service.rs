use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the CRD that must exist before the controller starts
pub const INFERENCE_SERVICE_CRD_NAME: &str = "inferenceservices.serving.kserve.io";

/// Condition type: the external ingress is routable
pub const INGRESS_READY: &str = "IngressReady";

/// Condition type: the predictor component is ready
pub const PREDICTOR_READY: &str = "PredictorReady";

/// Condition type: the whole service is ready
pub const READY: &str = "Ready";

/// Model status transition value once the served model matches the spec
pub const TRANSITION_UP_TO_DATE: &str = "UpToDate";

/// A KServe InferenceService, the live model-serving deployment
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "serving.kserve.io",
    version = "v1beta1",
    kind = "InferenceService",
    plural = "inferenceservices",
    shortname = "isvc",
    namespaced,
    status = "InferenceServiceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct InferenceServiceSpec {
    /// Predictor component
    #[serde(default)]
    pub predictor: PredictorSpec,
}

/// Predictor component of an InferenceService
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictorSpec {
    /// Model served by the predictor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelSpec>,
    /// Service account the predictor runs as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

/// Model reference inside a predictor
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelSpec {
    /// Model framework
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_format: Option<ModelFormat>,
    /// Serving runtime name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    /// Location of the model files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_uri: Option<String>,
    /// Storage reference used instead of a URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<ModelStorage>,
}

/// Model framework name and version
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ModelFormat {
    /// Framework name (onnx, pytorch, ...)
    pub name: String,
    /// Framework version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Storage reference for model files
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ModelStorage {
    /// Storage secret key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Bucket path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Observed state of an InferenceService
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceServiceStatus {
    /// External URL once routable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Cluster-internal address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<ServingAddress>,
    /// Readiness conditions
    #[serde(default)]
    pub conditions: Vec<ServingCondition>,
    /// Served model state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_status: Option<ModelStatus>,
    /// Per-component status keyed by component name (predictor, transformer, ...)
    #[serde(default)]
    pub components: BTreeMap<String, ComponentStatus>,
}

/// Addressable endpoint
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ServingAddress {
    /// URL of the endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One readiness condition
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServingCondition {
    /// Condition type (Ready, PredictorReady, ...)
    #[serde(rename = "type")]
    pub type_: String,
    /// "True", "False" or "Unknown"
    pub status: String,
    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the condition last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Served model state
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    /// Transition state, `UpToDate` when settled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_status: Option<String>,
}

/// Status of one InferenceService component
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Component URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Component cluster-internal address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<ServingAddress>,
    /// Latest ready revision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_ready_revision: Option<String>,
}

impl InferenceServiceStatus {
    /// Whether the condition of the given type is present with status "True"
    pub fn condition_is_true(&self, condition_type: &str) -> bool {
        self.conditions
            .iter()
            .any(|c| c.type_ == condition_type && c.status == "True")
    }

    /// Cluster-internal URL of the predictor, if reported
    pub fn predictor_internal_url(&self) -> Option<&str> {
        let predictor = self.components.get("predictor")?;
        predictor
            .address
            .as_ref()
            .and_then(|a| a.url.as_deref())
            .or(predictor.url.as_deref())
    }
}

impl ModelSpec {
    /// Artifact location: the storage URI, or an `s3://` URL built from a storage path
    pub fn artifact_location(&self) -> Option<String> {
        if let Some(uri) = self.storage_uri.as_ref().filter(|u| !u.is_empty()) {
            return Some(uri.clone());
        }
        self.storage
            .as_ref()
            .and_then(|s| s.path.as_ref())
            .filter(|p| !p.is_empty())
            .map(|p| format!("s3://{p}"))
    }
}
