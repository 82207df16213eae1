//! Model registry access
//!
//! - [`types`]: registry entities as returned by the REST API
//! - [`client`]: the [`ModelRegistry`] trait and its HTTP implementation
//! - [`client_set`]: one client per configured registry endpoint
//! - [`discovery`]: resolving registry endpoints from cluster routes

#![deny(missing_docs)]

pub mod client;
pub mod client_set;
pub mod discovery;
pub mod types;

pub use client::{ModelRegistry, RegistryRestClient};
pub use client_set::RegistryClientSet;
pub use types::{
    ArtifactState, CustomProperties, InferenceServiceRecord, InferenceServiceState, MetadataValue,
    ModelArtifact, ModelVersion, RegisteredModel, RegistryState, ServingEnvironment,
};

/// Base path of the model registry REST API
pub const REGISTRY_BASE_PATH: &str = "/api/model_registry/v1alpha3";

/// Base path of the model catalog REST API served next to the registry
pub const CATALOG_BASE_PATH: &str = "/api/model_catalog/v1alpha1";
