//! The normalized entity graph
//!
//! Source-agnostic and rebuilt from scratch on every reconcile. The encoders
//! render it; nothing mutates it after [`crate::merge::build_entity`]
//! returns.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bridge_common::ImportKey;
use bridge_storage::Provenance;

/// A link shown on a catalog entity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityLink {
    /// Target URL
    pub url: String,
    /// Display title
    pub title: String,
}

/// Kind of API a model server exposes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ApiType {
    /// OpenAPI (also the fallback for unknown values)
    #[default]
    OpenApi,
    /// AsyncAPI
    AsyncApi,
    /// GraphQL
    GraphQl,
    /// gRPC
    Grpc,
}

impl ApiType {
    /// Catalog name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiType::OpenApi => "openapi",
            ApiType::AsyncApi => "asyncapi",
            ApiType::GraphQl => "graphql",
            ApiType::Grpc => "grpc",
        }
    }

    /// Parse a property value; anything unrecognized is OpenAPI
    pub fn from_property(value: &str) -> Self {
        match value.trim() {
            "asyncapi" => ApiType::AsyncApi,
            "graphql" => ApiType::GraphQl,
            "grpc" => ApiType::Grpc,
            _ => ApiType::OpenApi,
        }
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The model half of a catalog entry
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelEntity {
    /// Sanitized entity name
    pub name: String,
    /// Sanitized owner
    pub owner: String,
    /// Sanitized lifecycle stage
    pub lifecycle: String,
    /// Free-form description
    pub description: String,
    /// Validated tags
    pub tags: BTreeSet<String>,
    /// Where the model files live
    pub artifact_location_url: Option<String>,
    /// Ethical considerations
    pub ethics: Option<String>,
    /// How-to-use documentation link
    pub how_to_use_url: Option<String>,
    /// License
    pub license: Option<String>,
    /// Support contact
    pub support: Option<String>,
    /// Training details
    pub training: Option<String>,
    /// Usage notes
    pub usage: Option<String>,
    /// Links to artifacts and serving endpoints
    pub links: Vec<EntityLink>,
    /// Extra annotations
    pub annotations: BTreeMap<String, String>,
}

/// The API a model server exposes
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApiEntity {
    /// URL clients call
    pub url: String,
    /// Definition location, `TBD` when unknown
    pub spec: String,
    /// API kind
    pub api_type: ApiType,
    /// Validated tags
    pub tags: BTreeSet<String>,
    /// Internal and external URL annotations
    pub annotations: BTreeMap<String, String>,
}

/// A live model server; only present for a served, URL-bearing deployment
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServerEntity {
    /// Sanitized `{namespace}-{name}` of the deployment
    pub name: String,
    /// Sanitized owner
    pub owner: String,
    /// Sanitized lifecycle stage
    pub lifecycle: String,
    /// Free-form description
    pub description: String,
    /// Validated tags
    pub tags: BTreeSet<String>,
    /// Homepage link
    pub homepage_url: Option<String>,
    /// Usage notes
    pub usage: Option<String>,
    /// Whether calls need credentials
    pub authentication: bool,
    /// Extra annotations
    pub annotations: BTreeMap<String, String>,
    /// The exposed API
    pub api: ApiEntity,
    /// Serving endpoint links
    pub links: Vec<EntityLink>,
}

/// Model card attached to a record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelCardSource {
    /// Catalog source name
    pub source: String,
    /// Catalog repository name
    pub repository: String,
    /// Catalog model name
    pub model: String,
}

/// Everything pushed to storage for one import key
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedEntity {
    /// Storage key
    pub key: ImportKey,
    /// Registry-correlated or cluster-only
    pub provenance: Provenance,
    /// Last-modified marker, epoch milliseconds
    pub last_update: u64,
    /// The model
    pub model: ModelEntity,
    /// The server, absent when the model is not served
    pub server: Option<ServerEntity>,
    /// Where to fetch a model card from, when the version was imported
    /// from a catalog
    pub model_card_source: Option<ModelCardSource>,
}
