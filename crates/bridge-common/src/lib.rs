//! Common types for the model catalog bridge: errors, names, keys, configuration
//! and the KServe resource types the normalizer watches.

#![deny(missing_docs)]

pub mod config;
pub mod crd;
pub mod error;
pub mod key;
pub mod polling;
pub mod retry;
pub mod sanitize;
pub mod telemetry;

pub use error::Error;
pub use key::ImportKey;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Owner used when neither the registry nor the deployment names one
pub const DEFAULT_OWNER: &str = "rhdh-rhoai-bridge";

/// Lifecycle stage used when neither the registry nor the deployment names one
pub const DEFAULT_LIFECYCLE: &str = "development";

/// Default port for the storage tier HTTP server
pub const DEFAULT_STORAGE_PORT: u16 = 7070;

/// Label carrying the registry's registered-model id on a deployment
pub const REGISTERED_MODEL_ID_LABEL: &str = "modelregistry.opendatahub.io/registered-model-id";

/// Label carrying the registry's model-version id on a deployment
pub const MODEL_VERSION_ID_LABEL: &str = "modelregistry.opendatahub.io/model-version-id";

/// Prefix for deployment annotations that carry catalog properties
pub const ANNOTATION_PREFIX: &str = "rhdh.modelcatalog.io/";

/// Storage tier query parameter naming the import key(s)
pub const KEY_QUERY_PARAM: &str = "key";

/// Storage tier query parameter naming the record provenance
pub const TYPE_QUERY_PARAM: &str = "type";

/// Storage tier route for writing one record
pub const UPSERT_URI: &str = "/upsert";

/// Storage tier route for submitting the authoritative key set
pub const CURRENT_KEY_SET_URI: &str = "/currentkeyset";

/// Storage tier route for removing one record
pub const REMOVE_URI: &str = "/remove";

/// Storage tier route for listing stored keys
pub const LIST_URI: &str = "/list";

/// Storage tier route for reading one stored record
pub const FETCH_URI: &str = "/fetch";

/// Well-known custom property names read from registry entities and
/// (lowercased, spaces removed, prefixed) from deployment annotations.
pub mod properties {
    /// Owner of the catalog entry
    pub const OWNER: &str = "Owner";
    /// Lifecycle stage of the catalog entry
    pub const LIFECYCLE: &str = "Lifecycle";
    /// Free-form description
    pub const DESCRIPTION: &str = "Description";
    /// Ethical considerations
    pub const ETHICS: &str = "Ethics";
    /// Link describing how to use the model
    pub const HOW_TO_USE: &str = "How to use";
    /// Support contact
    pub const SUPPORT: &str = "Support";
    /// Training details
    pub const TRAINING: &str = "Training";
    /// Usage notes
    pub const USAGE: &str = "Usage";
    /// License identifier or link
    pub const LICENSE: &str = "License";
    /// Homepage of the model server
    pub const HOMEPAGE_URL: &str = "Homepage URL";
    /// API definition for the served endpoint
    pub const API_SPEC: &str = "API Spec";
    /// API kind for the served endpoint
    pub const API_TYPE: &str = "API Type";
    /// TechDocs location
    pub const TECHDOCS: &str = "TechDocs";
    /// Catalog source a version was registered from
    pub const CATALOG_SOURCE_NAME: &str = "_registeredFromCatalogSourceName";
    /// Catalog repository a version was registered from
    pub const CATALOG_REPOSITORY_NAME: &str = "_registeredFromCatalogRepositoryName";
    /// Catalog model a version was registered from
    pub const CATALOG_MODEL_NAME: &str = "_registeredFromCatalogModelName";
}
