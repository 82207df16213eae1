//! In-memory fakes for the normalizer's collaborators

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use bridge_common::{Error, ImportKey};
use bridge_registry::types::CustomProperties;
use bridge_registry::{
    InferenceServiceRecord, ModelArtifact, ModelRegistry, ModelVersion, RegisteredModel,
    RegistryState, ServingEnvironment,
};
use bridge_storage::{PostBody, Provenance, StorageClient, UpsertOutcome};

use crate::deployment::{DeploymentRef, ServingDetails};
use crate::source::DeploymentSource;

/// Registry contents served from memory
#[derive(Default)]
pub struct FakeRegistry {
    pub endpoint: String,
    pub models: Vec<RegisteredModel>,
    pub versions: Vec<ModelVersion>,
    pub artifacts: BTreeMap<String, Vec<ModelArtifact>>,
    pub records: Vec<InferenceServiceRecord>,
    pub environments: Vec<ServingEnvironment>,
    pub model_cards: BTreeMap<String, String>,
    pub fail_listing: bool,
    /// Registered model ids whose version listing fails
    pub fail_versions_for: BTreeSet<String>,
    /// Model version ids whose artifact listing fails
    pub fail_artifacts_for: BTreeSet<String>,
}

impl FakeRegistry {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, id: &str, name: &str) -> Self {
        self.models.push(RegisteredModel {
            id: id.to_string(),
            name: name.to_string(),
            last_update_time_since_epoch: Some("1000".to_string()),
            ..Default::default()
        });
        self
    }

    pub fn with_version(mut self, id: &str, model_id: &str, name: &str) -> Self {
        self.versions.push(ModelVersion {
            id: id.to_string(),
            name: name.to_string(),
            registered_model_id: model_id.to_string(),
            last_update_time_since_epoch: Some("2000".to_string()),
            ..Default::default()
        });
        self
    }

    pub fn with_artifact(mut self, version_id: &str, uri: &str) -> Self {
        let artifacts = self.artifacts.entry(version_id.to_string()).or_default();
        artifacts.push(ModelArtifact {
            id: format!("a{}", artifacts.len() + 1),
            name: Some(format!("artifact-{version_id}")),
            uri: Some(uri.to_string()),
            ..Default::default()
        });
        self
    }

    pub fn with_record(
        mut self,
        model_id: &str,
        version_id: &str,
        environment_id: &str,
        runtime: &str,
    ) -> Self {
        self.records.push(InferenceServiceRecord {
            id: format!("is{}", self.records.len() + 1),
            name: Some(format!("{runtime}/record")),
            registered_model_id: model_id.to_string(),
            model_version_id: Some(version_id.to_string()),
            serving_environment_id: environment_id.to_string(),
            runtime: Some(runtime.to_string()),
            ..Default::default()
        });
        self
    }

    pub fn with_environment(mut self, id: &str, name: &str) -> Self {
        self.environments.push(ServingEnvironment {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
        });
        self
    }

    pub fn archive_version(mut self, id: &str) -> Self {
        for v in self.versions.iter_mut().filter(|v| v.id == id) {
            v.state = RegistryState::Archived;
        }
        self
    }

    pub fn version_properties(mut self, id: &str, properties: CustomProperties) -> Self {
        for v in self.versions.iter_mut().filter(|v| v.id == id) {
            v.custom_properties = properties.clone();
        }
        self
    }

    pub fn model_properties(mut self, id: &str, properties: CustomProperties) -> Self {
        for m in self.models.iter_mut().filter(|m| m.id == id) {
            m.custom_properties = properties.clone();
        }
        self
    }

    pub fn failing_versions(mut self, model_id: &str) -> Self {
        self.fail_versions_for.insert(model_id.to_string());
        self
    }

    pub fn failing_artifacts(mut self, version_id: &str) -> Self {
        self.fail_artifacts_for.insert(version_id.to_string());
        self
    }

    fn not_found(&self, what: &str) -> Error {
        Error::registry_status(&self.endpoint, 404, format!("{what} not found"))
    }

    fn check_listing(&self) -> Result<(), Error> {
        if self.fail_listing {
            return Err(Error::registry(&self.endpoint, "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl ModelRegistry for FakeRegistry {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    async fn list_registered_models(&self) -> Result<Vec<RegisteredModel>, Error> {
        self.check_listing()?;
        Ok(self.models.clone())
    }

    async fn get_registered_model(&self, id: &str) -> Result<RegisteredModel, Error> {
        self.models
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| self.not_found("registered model"))
    }

    async fn list_model_versions(
        &self,
        registered_model_id: &str,
    ) -> Result<Vec<ModelVersion>, Error> {
        self.check_listing()?;
        if self.fail_versions_for.contains(registered_model_id) {
            return Err(Error::registry_status(&self.endpoint, 500, "version listing failed"));
        }
        Ok(self
            .versions
            .iter()
            .filter(|v| v.registered_model_id == registered_model_id)
            .cloned()
            .collect())
    }

    async fn get_model_version(&self, id: &str) -> Result<ModelVersion, Error> {
        self.versions
            .iter()
            .find(|v| v.id == id)
            .cloned()
            .ok_or_else(|| self.not_found("model version"))
    }

    async fn list_model_artifacts(
        &self,
        model_version_id: &str,
    ) -> Result<Vec<ModelArtifact>, Error> {
        if self.fail_artifacts_for.contains(model_version_id) {
            return Err(Error::registry_status(&self.endpoint, 500, "artifact listing failed"));
        }
        Ok(self.artifacts.get(model_version_id).cloned().unwrap_or_default())
    }

    async fn list_inference_services(&self) -> Result<Vec<InferenceServiceRecord>, Error> {
        self.check_listing()?;
        Ok(self.records.clone())
    }

    async fn get_serving_environment(&self, id: &str) -> Result<ServingEnvironment, Error> {
        self.environments
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| self.not_found("serving environment"))
    }

    async fn get_model_card(
        &self,
        _source: &str,
        _repository: &str,
        model: &str,
    ) -> Result<Option<String>, Error> {
        Ok(self.model_cards.get(model).cloned())
    }
}

/// One upsert as seen by [`RecordingStorage`]
#[derive(Clone, Debug)]
pub struct RecordedUpsert {
    pub key: ImportKey,
    pub provenance: Provenance,
    pub body: PostBody,
}

/// Storage client that records every call
#[derive(Default)]
pub struct RecordingStorage {
    pub upserts: Mutex<Vec<RecordedUpsert>>,
    pub key_sets: Mutex<Vec<Vec<ImportKey>>>,
    pub fail_upserts: bool,
}

impl RecordingStorage {
    pub fn upserts(&self) -> Vec<RecordedUpsert> {
        self.upserts.lock().unwrap().clone()
    }

    pub fn key_sets(&self) -> Vec<Vec<ImportKey>> {
        self.key_sets.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageClient for RecordingStorage {
    async fn upsert(
        &self,
        key: &ImportKey,
        provenance: Provenance,
        body: &PostBody,
    ) -> Result<UpsertOutcome, Error> {
        if self.fail_upserts {
            return Err(Error::storage_status(key.as_str(), 503, "unavailable"));
        }
        self.upserts.lock().unwrap().push(RecordedUpsert {
            key: key.clone(),
            provenance,
            body: body.clone(),
        });
        Ok(UpsertOutcome::Created)
    }

    async fn post_current_key_set(&self, keys: &[ImportKey]) -> Result<Vec<ImportKey>, Error> {
        self.key_sets.lock().unwrap().push(keys.to_vec());
        Ok(Vec::new())
    }

    async fn list_keys(&self) -> Result<Vec<ImportKey>, Error> {
        Ok(self
            .upserts
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.key.clone())
            .collect())
    }
}

/// Deployments served from memory
#[derive(Default)]
pub struct FakeDeployments {
    pub deployments: Vec<DeploymentRef>,
    pub details: ServingDetails,
    pub fail_listing: bool,
}

impl FakeDeployments {
    pub fn new(deployments: Vec<DeploymentRef>) -> Self {
        Self {
            deployments,
            ..Default::default()
        }
    }
}

#[async_trait]
impl DeploymentSource for FakeDeployments {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<DeploymentRef>, Error> {
        Ok(self
            .deployments
            .iter()
            .find(|d| d.namespace == namespace && d.name == name)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<DeploymentRef>, Error> {
        if self.fail_listing {
            return Err(Error::internal("list failed"));
        }
        Ok(self.deployments.clone())
    }

    async fn serving_details(&self, _deployment: &DeploymentRef) -> Result<ServingDetails, Error> {
        Ok(self.details.clone())
    }
}
