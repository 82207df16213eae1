//! Storage tier for normalized catalog records
//!
//! The normalizer pushes records here through [`client::StorageClient`];
//! the catalog importer reads them back through the same HTTP surface.
//! Records live behind the [`backend::BridgeStorage`] key/value trait.

#![deny(missing_docs)]

pub mod backend;
pub mod client;
pub mod configmap;
pub mod notifier;
pub mod server;
pub mod wire;

pub use backend::{BridgeStorage, MemoryStorage};
pub use client::{StorageClient, StorageRestClient, UpsertOutcome};
pub use notifier::{CatalogNotifier, LocationNotifier, NoopNotifier};
pub use server::{storage_router, StorageState};
pub use wire::{DiscoverResponse, PostBody, Provenance, StoredRecord, UpsertResponse};

/// Name of the ConfigMap holding records for the ConfigMap backend
pub const STORAGE_CONFIGMAP_NAME: &str = "bac-import-model";
