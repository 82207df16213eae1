//! Correlator
//!
//! Finds the registry model version a deployment serves. Strategies are
//! tried in a fixed order and the first hit wins:
//!
//! 1. Labels: both registry id labels name an existing, live version.
//! 2. Serving environment: a deployed registry record whose environment is
//!    the deployment's namespace and whose runtime prefixes its name.
//! 3. Name heuristic: `{model}-{version}` equals the deployment name. Only
//!    tried when the registry has no inference-service records at all.
//!
//! Endpoints are visited in [`RegistryClientSet`] order. A failing endpoint
//! is logged and skipped.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use bridge_common::sanitize::sanitize_name;
use bridge_common::Error;
use bridge_registry::{
    InferenceServiceRecord, ModelArtifact, ModelRegistry, ModelVersion, RegisteredModel,
    RegistryClientSet,
};

use crate::deployment::{DeploymentRef, RegistryHints};

/// How a correlation was found, strongest first
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchStrategy {
    /// Registry id labels on the deployment
    Labels,
    /// A deployed registry record in the deployment's namespace
    ServingEnvironment,
    /// `{model}-{version}` equals the deployment name
    NameHeuristic,
}

/// A deployment matched to one registry model version
#[derive(Clone, Debug)]
pub struct RegistryMatch {
    /// Endpoint the match came from
    pub endpoint: String,
    /// Strategy that produced the match
    pub strategy: MatchStrategy,
    /// Parent registered model
    pub registered_model: RegisteredModel,
    /// The matched version
    pub model_version: ModelVersion,
    /// Artifacts of the version; empty when they could not be fetched
    pub artifacts: Vec<ModelArtifact>,
}

/// Result of correlating one deployment
#[derive(Clone, Debug)]
pub enum Correlation {
    /// Registry provenance found
    Matched(Box<RegistryMatch>),
    /// Cluster-only deployment
    NoMatch,
}

impl Correlation {
    /// The match, if any
    pub fn as_match(&self) -> Option<&RegistryMatch> {
        match self {
            Correlation::Matched(m) => Some(m),
            Correlation::NoMatch => None,
        }
    }
}

/// Name the heuristic strategy expects a deployment of `rm`/`mv` to have
pub fn heuristic_deployment_name(rm: &RegisteredModel, mv: &ModelVersion) -> String {
    format!("{}-{}", sanitize_name(&rm.name), sanitize_name(&mv.name))
}

/// Correlate `deployment` against every configured registry
pub async fn correlate(clients: &RegistryClientSet, deployment: &DeploymentRef) -> Correlation {
    for (endpoint, registry) in clients.iter() {
        match correlate_endpoint(registry.as_ref(), deployment).await {
            Ok(Some(found)) => {
                debug!(
                    deployment = %deployment.display_name(),
                    endpoint = %endpoint,
                    strategy = ?found.strategy,
                    registered_model = %found.registered_model.name,
                    model_version = %found.model_version.name,
                    "Correlated deployment with registry"
                );
                return Correlation::Matched(Box::new(found));
            }
            Ok(None) => {}
            Err(e) => {
                warn!(
                    deployment = %deployment.display_name(),
                    endpoint = %endpoint,
                    error = %e,
                    "Registry endpoint failed during correlation, skipping it"
                );
            }
        }
    }
    Correlation::NoMatch
}

async fn correlate_endpoint(
    registry: &dyn ModelRegistry,
    deployment: &DeploymentRef,
) -> Result<Option<RegistryMatch>, Error> {
    if let Some(hints) = deployment.registry_hints() {
        if let Some((rm, mv)) = match_by_labels(registry, &hints).await? {
            return Ok(Some(complete(registry, MatchStrategy::Labels, rm, mv).await));
        }
    }

    let records = registry.list_inference_services().await?;
    if let Some((rm, mv)) = match_by_serving_environment(registry, deployment, &records).await? {
        return Ok(Some(
            complete(registry, MatchStrategy::ServingEnvironment, rm, mv).await,
        ));
    }

    if records.is_empty() {
        if let Some((rm, mv)) = match_by_name(registry, deployment).await? {
            return Ok(Some(
                complete(registry, MatchStrategy::NameHeuristic, rm, mv).await,
            ));
        }
    }
    Ok(None)
}

/// Treat a registry 404 as absence
fn found<T>(result: Result<T, Error>) -> Result<Option<T>, Error> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.status() == Some(404) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Fetch a live (model, version) pair by id
async fn live_pair(
    registry: &dyn ModelRegistry,
    registered_model_id: &str,
    model_version_id: &str,
) -> Result<Option<(RegisteredModel, ModelVersion)>, Error> {
    let Some(mv) = found(registry.get_model_version(model_version_id).await)? else {
        return Ok(None);
    };
    if mv.is_archived()
        || (!mv.registered_model_id.is_empty() && mv.registered_model_id != registered_model_id)
    {
        return Ok(None);
    }
    let Some(rm) = found(registry.get_registered_model(registered_model_id).await)? else {
        return Ok(None);
    };
    if rm.is_archived() {
        return Ok(None);
    }
    Ok(Some((rm, mv)))
}

async fn match_by_labels(
    registry: &dyn ModelRegistry,
    hints: &RegistryHints,
) -> Result<Option<(RegisteredModel, ModelVersion)>, Error> {
    live_pair(registry, &hints.registered_model_id, &hints.model_version_id).await
}

/// Whether a registry record describes `deployment` once its environment is known
pub fn record_serves(
    record: &InferenceServiceRecord,
    deployment: &DeploymentRef,
    environment_name: &str,
) -> bool {
    let Some(runtime) = record.runtime.as_deref().filter(|r| !r.is_empty()) else {
        return false;
    };
    record.is_deployed()
        && environment_name == deployment.namespace
        && deployment.name.starts_with(runtime)
}

async fn match_by_serving_environment(
    registry: &dyn ModelRegistry,
    deployment: &DeploymentRef,
    records: &[InferenceServiceRecord],
) -> Result<Option<(RegisteredModel, ModelVersion)>, Error> {
    let mut environments: BTreeMap<&str, Option<String>> = BTreeMap::new();

    for record in records {
        let Some(version_id) = record.model_version_id.as_deref() else {
            continue;
        };
        let env_id = record.serving_environment_id.as_str();
        if !environments.contains_key(env_id) {
            let name = found(registry.get_serving_environment(env_id).await)?.map(|e| e.name);
            environments.insert(env_id, name);
        }
        let Some(Some(env_name)) = environments.get(env_id) else {
            continue;
        };
        if !record_serves(record, deployment, env_name) {
            continue;
        }
        if let Some(pair) = live_pair(registry, &record.registered_model_id, version_id).await? {
            return Ok(Some(pair));
        }
    }
    Ok(None)
}

async fn match_by_name(
    registry: &dyn ModelRegistry,
    deployment: &DeploymentRef,
) -> Result<Option<(RegisteredModel, ModelVersion)>, Error> {
    for rm in registry.list_registered_models().await? {
        if rm.is_archived() {
            continue;
        }
        for mv in registry.list_model_versions(&rm.id).await? {
            if !mv.is_archived() && heuristic_deployment_name(&rm, &mv) == deployment.name {
                return Ok(Some((rm, mv)));
            }
        }
    }
    Ok(None)
}

async fn complete(
    registry: &dyn ModelRegistry,
    strategy: MatchStrategy,
    registered_model: RegisteredModel,
    model_version: ModelVersion,
) -> RegistryMatch {
    let artifacts = artifacts_for(registry, &model_version).await;
    RegistryMatch {
        endpoint: registry.endpoint(),
        strategy,
        registered_model,
        model_version,
        artifacts,
    }
}

/// Artifacts of a version; a failed fetch is logged and yields none
pub async fn artifacts_for(registry: &dyn ModelRegistry, mv: &ModelVersion) -> Vec<ModelArtifact> {
    match registry.list_model_artifacts(&mv.id).await {
        Ok(artifacts) => artifacts,
        Err(e) => {
            warn!(
                endpoint = %registry.endpoint(),
                model_version = %mv.id,
                error = %e,
                "Failed to fetch model artifacts, continuing without them"
            );
            Vec::new()
        }
    }
}

/// Resolve the environment name of every record, keyed by environment id.
///
/// Environments the registry no longer knows are left out.
pub async fn serving_environment_names(
    registry: &dyn ModelRegistry,
    records: &[InferenceServiceRecord],
) -> Result<BTreeMap<String, String>, Error> {
    let mut names = BTreeMap::new();
    for record in records {
        let id = &record.serving_environment_id;
        if names.contains_key(id) {
            continue;
        }
        if let Some(env) = found(registry.get_serving_environment(id).await)? {
            names.insert(id.clone(), env.name);
        }
    }
    Ok(names)
}

/// How `deployment` would correlate with `rm`/`mv`, using the same
/// precedence as [`correlate`] but against data already in memory.
pub fn version_match(
    deployment: &DeploymentRef,
    rm: &RegisteredModel,
    mv: &ModelVersion,
    records: &[InferenceServiceRecord],
    environment_names: &BTreeMap<String, String>,
) -> Option<MatchStrategy> {
    if deployment
        .registry_hints()
        .is_some_and(|h| h.registered_model_id == rm.id && h.model_version_id == mv.id)
    {
        return Some(MatchStrategy::Labels);
    }
    let by_environment = records.iter().any(|r| {
        r.model_version_id.as_deref() == Some(mv.id.as_str())
            && environment_names
                .get(&r.serving_environment_id)
                .is_some_and(|env| record_serves(r, deployment, env))
    });
    if by_environment {
        return Some(MatchStrategy::ServingEnvironment);
    }
    if records.is_empty() && deployment.name == heuristic_deployment_name(rm, mv) {
        return Some(MatchStrategy::NameHeuristic);
    }
    None
}

/// The deployment serving `rm`/`mv` among `deployments`.
///
/// Used by the full pass, which walks the registry rather than the
/// cluster. The strongest strategy wins; ties go to the first deployment
/// by namespace and name.
pub fn deployment_for_version<'a>(
    deployments: &'a [DeploymentRef],
    rm: &RegisteredModel,
    mv: &ModelVersion,
    records: &[InferenceServiceRecord],
    environment_names: &BTreeMap<String, String>,
) -> Option<&'a DeploymentRef> {
    deployments
        .iter()
        .filter_map(|d| version_match(d, rm, mv, records, environment_names).map(|s| (s, d)))
        .min_by(|(sa, a), (sb, b)| {
            sa.cmp(sb)
                .then_with(|| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)))
        })
        .map(|(_, d)| d)
}
