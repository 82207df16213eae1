//! Registry entities
//!
//! Field names follow the registry's JSON. Entities are read-only snapshots
//! fetched for one reconciliation pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A typed custom property value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "metadataType")]
pub enum MetadataValue {
    /// String value
    #[serde(rename = "MetadataStringValue")]
    String {
        /// The value
        string_value: String,
    },
    /// Integer value, transported as a string
    #[serde(rename = "MetadataIntValue")]
    Int {
        /// The value
        int_value: String,
    },
    /// Floating point value
    #[serde(rename = "MetadataDoubleValue")]
    Double {
        /// The value
        double_value: f64,
    },
    /// Boolean value
    #[serde(rename = "MetadataBoolValue")]
    Bool {
        /// The value
        bool_value: bool,
    },
    /// Any other metadata type (struct, proto); not used for catalog fields
    #[serde(other)]
    Unsupported,
}

impl MetadataValue {
    /// Render a scalar value as text; `None` for unsupported types
    pub fn as_text(&self) -> Option<String> {
        match self {
            MetadataValue::String { string_value } => Some(string_value.clone()),
            MetadataValue::Int { int_value } => Some(int_value.clone()),
            MetadataValue::Double { double_value } => Some(double_value.to_string()),
            MetadataValue::Bool { bool_value } => Some(bool_value.to_string()),
            MetadataValue::Unsupported => None,
        }
    }

    /// Convenience constructor for string values
    pub fn string(value: impl Into<String>) -> Self {
        MetadataValue::String {
            string_value: value.into(),
        }
    }
}

/// The open-ended property bag attached to every registry entity
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomProperties(pub BTreeMap<String, MetadataValue>);

impl CustomProperties {
    /// Non-empty text value of a property
    pub fn text(&self, key: &str) -> Option<String> {
        self.0
            .get(key)
            .and_then(MetadataValue::as_text)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Properties used as labels: string properties with an empty value.
    ///
    /// Registry UIs store free-form labels this way.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(|(k, v)| match v {
            MetadataValue::String { string_value } if string_value.is_empty() => Some(k.as_str()),
            _ => None,
        })
    }

    /// Insert a string property, returning self for chaining in fixtures
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), MetadataValue::string(value));
        self
    }
}

/// Lifecycle state of a registered model or version
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistryState {
    /// Active
    #[default]
    Live,
    /// Archived; skipped by the bridge
    Archived,
    /// Anything newer than this client knows about
    #[serde(other)]
    Unknown,
}

/// Lifecycle state of an artifact
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactState {
    /// Unknown or unset
    #[default]
    Unknown,
    /// Upload pending
    Pending,
    /// Available
    Live,
    /// Scheduled for deletion
    MarkedForDeletion,
    /// Deleted
    Deleted,
    /// Abandoned upload
    Abandoned,
    /// Reference only
    Reference,
}

fn parse_epoch_millis(raw: Option<&str>) -> u64 {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// A registered model
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredModel {
    /// Registry-scoped id
    pub id: String,
    /// Model name
    pub name: String,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Owner recorded by the registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Archival state
    #[serde(default)]
    pub state: RegistryState,
    /// Custom properties
    #[serde(default)]
    pub custom_properties: CustomProperties,
    /// Last update, epoch milliseconds as a string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time_since_epoch: Option<String>,
}

impl RegisteredModel {
    /// Whether the model is archived
    pub fn is_archived(&self) -> bool {
        self.state == RegistryState::Archived
    }

    /// Last update in epoch milliseconds, 0 when absent
    pub fn last_update_millis(&self) -> u64 {
        parse_epoch_millis(self.last_update_time_since_epoch.as_deref())
    }
}

/// A version of a registered model
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelVersion {
    /// Registry-scoped id
    pub id: String,
    /// Version name
    pub name: String,
    /// Id of the parent registered model
    #[serde(default)]
    pub registered_model_id: String,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Archival state
    #[serde(default)]
    pub state: RegistryState,
    /// Custom properties
    #[serde(default)]
    pub custom_properties: CustomProperties,
    /// Last update, epoch milliseconds as a string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time_since_epoch: Option<String>,
}

impl ModelVersion {
    /// Whether the version is archived
    pub fn is_archived(&self) -> bool {
        self.state == RegistryState::Archived
    }

    /// Last update in epoch milliseconds, 0 when absent
    pub fn last_update_millis(&self) -> u64 {
        parse_epoch_millis(self.last_update_time_since_epoch.as_deref())
    }
}

/// A file or location attached to a model version
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelArtifact {
    /// Registry-scoped id
    #[serde(default)]
    pub id: String,
    /// Artifact name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Location of the artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Framework of the model files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_format_name: Option<String>,
    /// Framework version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_format_version: Option<String>,
    /// Artifact state
    #[serde(default)]
    pub state: ArtifactState,
    /// Custom properties
    #[serde(default)]
    pub custom_properties: CustomProperties,
    /// Last update, epoch milliseconds as a string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time_since_epoch: Option<String>,
}

impl ModelArtifact {
    /// Last update in epoch milliseconds, 0 when absent
    pub fn last_update_millis(&self) -> u64 {
        parse_epoch_millis(self.last_update_time_since_epoch.as_deref())
    }
}

/// Desired state of a registry inference-service record
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InferenceServiceState {
    /// Should be serving
    #[default]
    Deployed,
    /// Should not be serving
    Undeployed,
    /// Anything newer than this client knows about
    #[serde(other)]
    Unknown,
}

/// The registry's record of a deployment of one of its models
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceServiceRecord {
    /// Registry-scoped id
    pub id: String,
    /// Record name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Registered model being served
    pub registered_model_id: String,
    /// Specific version being served, if pinned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version_id: Option<String>,
    /// Serving environment the record belongs to
    pub serving_environment_id: String,
    /// Runtime (deployment) name declared by the record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    /// Desired state
    #[serde(default)]
    pub desired_state: InferenceServiceState,
    /// Custom properties
    #[serde(default)]
    pub custom_properties: CustomProperties,
}

impl InferenceServiceRecord {
    /// Whether the record declares the model as deployed
    pub fn is_deployed(&self) -> bool {
        self.desired_state == InferenceServiceState::Deployed
    }
}

/// A serving environment; its name is the cluster namespace it maps to
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServingEnvironment {
    /// Registry-scoped id
    pub id: String,
    /// Environment name
    pub name: String,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A model in the catalog served next to the registry
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogModel {
    /// Model name
    #[serde(default)]
    pub name: String,
    /// Markdown readme, used as the model card
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
}

/// A page of entities
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    /// Entities on this page
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    /// Token for the next page; empty on the last page
    #[serde(default)]
    pub next_page_token: String,
}
