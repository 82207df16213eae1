//! Correlation context
//!
//! Everything the merge functions may draw from for one catalog entry,
//! borrowed for the duration of a single build.

use bridge_common::properties;
use bridge_registry::{ModelArtifact, ModelVersion, RegisteredModel};
use bridge_storage::Provenance;

use crate::correlator::RegistryMatch;
use crate::deployment::{DeploymentRef, ServingDetails};

/// Caller-supplied fallbacks, already sanitized
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Defaults {
    /// Owner when no source names one
    pub owner: String,
    /// Lifecycle when no source names one
    pub lifecycle: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            owner: bridge_common::DEFAULT_OWNER.to_string(),
            lifecycle: bridge_common::DEFAULT_LIFECYCLE.to_string(),
        }
    }
}

/// Sources for one catalog entry
#[derive(Clone, Copy, Debug)]
pub struct CorrelationContext<'a> {
    /// The deployment serving the model, if any
    pub deployment: Option<&'a DeploymentRef>,
    /// Predictor service and authentication details of `deployment`
    pub serving: Option<&'a ServingDetails>,
    /// Registered model, for registry-correlated entries
    pub registered_model: Option<&'a RegisteredModel>,
    /// Model version, for registry-correlated entries
    pub model_version: Option<&'a ModelVersion>,
    /// Artifacts of the version
    pub artifacts: &'a [ModelArtifact],
    /// Fallback values
    pub defaults: &'a Defaults,
}

impl<'a> CorrelationContext<'a> {
    /// Context for a registry version, optionally served by `deployment`
    pub fn registry(
        registered_model: &'a RegisteredModel,
        model_version: &'a ModelVersion,
        artifacts: &'a [ModelArtifact],
        deployment: Option<&'a DeploymentRef>,
        serving: Option<&'a ServingDetails>,
        defaults: &'a Defaults,
    ) -> Self {
        Self {
            deployment,
            serving,
            registered_model: Some(registered_model),
            model_version: Some(model_version),
            artifacts,
            defaults,
        }
    }

    /// Context for a correlation found by the correlator
    pub fn matched(
        found: &'a RegistryMatch,
        deployment: &'a DeploymentRef,
        serving: Option<&'a ServingDetails>,
        defaults: &'a Defaults,
    ) -> Self {
        Self::registry(
            &found.registered_model,
            &found.model_version,
            &found.artifacts,
            Some(deployment),
            serving,
            defaults,
        )
    }

    /// Context for a deployment with no registry provenance
    pub fn cluster_only(
        deployment: &'a DeploymentRef,
        serving: Option<&'a ServingDetails>,
        defaults: &'a Defaults,
    ) -> Self {
        Self {
            deployment: Some(deployment),
            serving,
            registered_model: None,
            model_version: None,
            artifacts: &[],
            defaults,
        }
    }

    /// The registry pair, when this entry has registry provenance
    pub fn registry_pair(&self) -> Option<(&'a RegisteredModel, &'a ModelVersion)> {
        self.registered_model.zip(self.model_version)
    }

    /// Which correlation path this entry comes from
    pub fn provenance(&self) -> Provenance {
        if self.registry_pair().is_some() {
            Provenance::Registry
        } else {
            Provenance::ClusterOnly
        }
    }

    /// The deployment, when it exposes a status URL
    pub fn served_deployment(&self) -> Option<(&'a DeploymentRef, &'a str)> {
        let deployment = self.deployment?;
        let url = deployment.status_url.as_deref().filter(|u| !u.is_empty())?;
        Some((deployment, url))
    }

    /// A well-known property: version, then registered model, then
    /// deployment annotation
    pub fn property(&self, name: &str) -> Option<String> {
        self.model_version
            .and_then(|mv| mv.custom_properties.text(name))
            .or_else(|| self.registered_model.and_then(|rm| rm.custom_properties.text(name)))
            .or_else(|| self.deployment.and_then(|d| d.annotation_property(name)))
    }

    /// Catalog coordinates a version was imported from, all three required
    pub fn catalog_origin(&self) -> Option<(String, String, String)> {
        let props = &self.model_version?.custom_properties;
        Some((
            props.text(properties::CATALOG_SOURCE_NAME)?,
            props.text(properties::CATALOG_REPOSITORY_NAME)?,
            props.text(properties::CATALOG_MODEL_NAME)?,
        ))
    }
}
