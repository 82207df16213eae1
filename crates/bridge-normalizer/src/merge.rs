//! Field merger
//!
//! One stateless function per output field, each reading a
//! [`CorrelationContext`]. Precedence for property-backed fields is the
//! version's custom property, then the registered model's, then the
//! deployment's annotation, then the caller default.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use bridge_common::sanitize::{normalize_tag, sanitize_name};
use bridge_common::{properties, Error, ImportKey};

use crate::context::CorrelationContext;
use crate::deployment::{api_urls, DeploymentRef};
use crate::entity::{
    ApiEntity, ApiType, EntityLink, ModelCardSource, ModelEntity, NormalizedEntity, ServerEntity,
};

/// Annotation naming the deployment a model is served by
pub const MODEL_NAME_ANNOTATION: &str = "rhdh.modelcatalog.io/model-name";

/// Annotation carrying the external route URL of an API
pub const EXTERNAL_ROUTE_URL_ANNOTATION: &str = "rhdh.modelcatalog.io/external-route-url";

/// Annotation carrying the cluster-internal service URL of an API
pub const INTERNAL_SERVICE_URL_ANNOTATION: &str = "rhdh.modelcatalog.io/internal-service-url";

/// Annotation carrying a TechDocs location
pub const TECHDOCS_ANNOTATION: &str = "TechDocs";

/// Title of the link to a deployment's status URL
pub const API_URL_LINK_TITLE: &str = "API URL";

/// API spec placeholder when no definition is known
pub const UNKNOWN_API_SPEC: &str = "TBD";

/// Build the full entity graph for one catalog entry
pub fn build_entity(ctx: &CorrelationContext<'_>) -> Result<NormalizedEntity, Error> {
    Ok(NormalizedEntity {
        key: import_key(ctx)?,
        provenance: ctx.provenance(),
        last_update: last_update(ctx),
        model: model(ctx),
        server: server(ctx),
        model_card_source: model_card_source(ctx),
    })
}

/// `{model}_{version}` for registry entries, `{namespace}_{name}` otherwise
pub fn import_key(ctx: &CorrelationContext<'_>) -> Result<ImportKey, Error> {
    if let Some((rm, mv)) = ctx.registry_pair() {
        return ImportKey::for_model_version(&rm.name, &mv.name);
    }
    match ctx.deployment {
        Some(d) => ImportKey::for_deployment(&d.namespace, &d.name),
        None => Err(Error::internal_with_context(
            "merge",
            "catalog entry has neither a registry version nor a deployment",
        )),
    }
}

fn join_sanitized(a: &str, b: &str) -> String {
    sanitize_name(&format!("{}-{}", sanitize_name(a), sanitize_name(b)))
}

/// Model entity name
pub fn model_name(ctx: &CorrelationContext<'_>) -> String {
    match (ctx.registry_pair(), ctx.deployment) {
        (Some((rm, mv)), _) => join_sanitized(&rm.name, &mv.name),
        (None, Some(d)) => server_name(d),
        (None, None) => String::new(),
    }
}

/// Server entity name, always derived from the deployment
pub fn server_name(deployment: &DeploymentRef) -> String {
    join_sanitized(&deployment.namespace, &deployment.name)
}

fn sanitized_nonempty(value: Option<String>) -> Option<String> {
    value.map(|v| sanitize_name(&v)).filter(|v| !v.is_empty())
}

/// Owner: property, then the registry's owner field, then the default
pub fn owner(ctx: &CorrelationContext<'_>) -> String {
    sanitized_nonempty(ctx.property(properties::OWNER))
        .or_else(|| sanitized_nonempty(ctx.registered_model.and_then(|rm| rm.owner.clone())))
        .unwrap_or_else(|| ctx.defaults.owner.clone())
}

/// Lifecycle: property, then the default
pub fn lifecycle(ctx: &CorrelationContext<'_>) -> String {
    sanitized_nonempty(ctx.property(properties::LIFECYCLE))
        .unwrap_or_else(|| ctx.defaults.lifecycle.clone())
}

/// Description: property, then the version's and the model's own text
pub fn description(ctx: &CorrelationContext<'_>) -> String {
    let own = |text: Option<&String>| text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
    ctx.property(properties::DESCRIPTION)
        .or_else(|| own(ctx.model_version.and_then(|mv| mv.description.as_ref())))
        .or_else(|| own(ctx.registered_model.and_then(|rm| rm.description.as_ref())))
        .unwrap_or_default()
}

/// Tags built from deployment labels: `{key}-{value}`, sanitized then validated
pub fn label_tags(deployment: &DeploymentRef) -> BTreeSet<String> {
    deployment
        .labels
        .iter()
        .filter_map(|(k, v)| normalize_tag(&join_sanitized(k, v)))
        .collect()
}

/// Model tags.
///
/// Registry entries take the label-style properties of the registered
/// model, the version and every artifact. Cluster-only entries take the
/// deployment's labels. The deployment's model format is added to both.
/// Invalid candidates are dropped.
pub fn model_tags(ctx: &CorrelationContext<'_>) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    if let Some((rm, mv)) = ctx.registry_pair() {
        let labels = rm
            .custom_properties
            .labels()
            .chain(mv.custom_properties.labels())
            .chain(ctx.artifacts.iter().flat_map(|a| a.custom_properties.labels()));
        tags.extend(labels.filter_map(normalize_tag));
    } else if let Some(d) = ctx.deployment {
        tags.extend(label_tags(d));
    }
    if let Some(format) = ctx.deployment.and_then(|d| d.model_format.as_deref()) {
        tags.extend(normalize_tag(format));
    }
    tags
}

/// Location of the model files: first artifact URI, then the deployment's storage
pub fn artifact_location(ctx: &CorrelationContext<'_>) -> Option<String> {
    ctx.artifacts
        .iter()
        .filter_map(|a| a.uri.as_deref())
        .find(|uri| !uri.is_empty())
        .map(str::to_string)
        .or_else(|| ctx.deployment.and_then(|d| d.artifact_location.clone()))
}

/// Links to a served deployment's status URL and component endpoints
pub fn serving_links(ctx: &CorrelationContext<'_>) -> Vec<EntityLink> {
    let Some((deployment, url)) = ctx.served_deployment() else {
        return Vec::new();
    };
    let mut links = vec![EntityLink {
        url: url.to_string(),
        title: API_URL_LINK_TITLE.to_string(),
    }];
    for (component, status) in &deployment.status.components {
        let Some(component_url) = status.url.as_deref().filter(|u| !u.is_empty()) else {
            continue;
        };
        let component = sanitize_name(component);
        links.push(EntityLink {
            url: format!("{}/docs", component_url.trim_end_matches('/')),
            title: format!("{component} FastAPI URL"),
        });
        links.push(EntityLink {
            url: component_url.to_string(),
            title: format!("{component} model serving URL"),
        });
    }
    links
}

/// Model links: artifact locations plus serving links
pub fn model_links(ctx: &CorrelationContext<'_>) -> Vec<EntityLink> {
    let mut links: Vec<EntityLink> = ctx
        .artifacts
        .iter()
        .filter_map(|a| {
            let uri = a.uri.as_deref().filter(|u| !u.is_empty())?;
            let title = a
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .or_else(|| a.name.as_deref().map(sanitize_name).filter(|n| !n.is_empty()))
                .unwrap_or_else(|| "Model artifact".to_string());
            Some(EntityLink {
                url: uri.to_string(),
                title,
            })
        })
        .collect();
    links.extend(serving_links(ctx));
    links
}

/// TechDocs location, when it is an http(s) URL
pub fn techdocs(ctx: &CorrelationContext<'_>) -> Option<String> {
    let url = ctx.property(properties::TECHDOCS)?;
    if url.starts_with("http://") || url.starts_with("https://") {
        Some(url)
    } else {
        warn!(url = %url, "Ignoring TechDocs location without an http(s) scheme");
        None
    }
}

/// Model annotations
pub fn model_annotations(ctx: &CorrelationContext<'_>) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    if let Some(d) = ctx.deployment {
        annotations.insert(MODEL_NAME_ANNOTATION.to_string(), d.name.clone());
    }
    if let Some(url) = techdocs(ctx) {
        annotations.insert(TECHDOCS_ANNOTATION.to_string(), url);
    }
    annotations
}

/// The model entity
pub fn model(ctx: &CorrelationContext<'_>) -> ModelEntity {
    ModelEntity {
        name: model_name(ctx),
        owner: owner(ctx),
        lifecycle: lifecycle(ctx),
        description: description(ctx),
        tags: model_tags(ctx),
        artifact_location_url: artifact_location(ctx),
        ethics: ctx.property(properties::ETHICS),
        how_to_use_url: ctx.property(properties::HOW_TO_USE),
        license: ctx.property(properties::LICENSE),
        support: ctx.property(properties::SUPPORT),
        training: ctx.property(properties::TRAINING),
        usage: ctx.property(properties::USAGE),
        links: model_links(ctx),
        annotations: model_annotations(ctx),
    }
}

/// The API of a served deployment
pub fn api(ctx: &CorrelationContext<'_>) -> Option<ApiEntity> {
    let (deployment, status_url) = ctx.served_deployment()?;
    let internal = ctx
        .serving
        .and_then(|s| s.internal_url.as_deref())
        .or_else(|| deployment.status.predictor_internal_url());
    let (url, internal) = api_urls(status_url, internal);

    let mut annotations = BTreeMap::new();
    if let Some(internal) = &internal {
        annotations.insert(INTERNAL_SERVICE_URL_ANNOTATION.to_string(), internal.clone());
    }
    if !url.is_empty() && internal.as_deref() != Some(url.as_str()) {
        annotations.insert(EXTERNAL_ROUTE_URL_ANNOTATION.to_string(), url.clone());
    }

    Some(ApiEntity {
        url,
        spec: ctx
            .property(properties::API_SPEC)
            .unwrap_or_else(|| UNKNOWN_API_SPEC.to_string()),
        api_type: ctx
            .property(properties::API_TYPE)
            .map(|t| ApiType::from_property(&t))
            .unwrap_or_default(),
        tags: label_tags(deployment),
        annotations,
    })
}

/// The server sub-entity; `None` unless a URL-bearing deployment serves the model
pub fn server(ctx: &CorrelationContext<'_>) -> Option<ServerEntity> {
    let (deployment, _) = ctx.served_deployment()?;
    let api = api(ctx)?;
    Some(ServerEntity {
        name: server_name(deployment),
        owner: owner(ctx),
        lifecycle: lifecycle(ctx),
        description: description(ctx),
        tags: label_tags(deployment),
        homepage_url: ctx.property(properties::HOMEPAGE_URL),
        usage: ctx.property(properties::USAGE),
        authentication: ctx.serving.is_some_and(|s| s.authentication),
        annotations: BTreeMap::new(),
        api,
        links: serving_links(ctx),
    })
}

/// Last-modified marker.
///
/// Registry entries use the newest registry timestamp so that every path
/// building the same version computes the same marker. Cluster-only
/// entries use the newest condition transition.
pub fn last_update(ctx: &CorrelationContext<'_>) -> u64 {
    match ctx.registry_pair() {
        Some((rm, mv)) => ctx
            .artifacts
            .iter()
            .map(|a| a.last_update_millis())
            .chain([rm.last_update_millis(), mv.last_update_millis()])
            .max()
            .unwrap_or(0),
        None => ctx.deployment.map_or(0, DeploymentRef::last_update_millis),
    }
}

/// Where to fetch the model card from
pub fn model_card_source(ctx: &CorrelationContext<'_>) -> Option<ModelCardSource> {
    let (source, repository, model) = ctx.catalog_origin()?;
    Some(ModelCardSource {
        source,
        repository,
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Defaults;
    use crate::deployment::fixtures::ready_deployment;
    use crate::deployment::ServingDetails;
    use crate::testing::FakeRegistry;
    use bridge_common::crd::ComponentStatus;
    use bridge_registry::{CustomProperties, ModelArtifact, ModelVersion, RegisteredModel};
    use bridge_storage::Provenance;

    fn mnist() -> (RegisteredModel, ModelVersion, Vec<ModelArtifact>) {
        let rm = RegisteredModel {
            id: "1".to_string(),
            name: "mnist".to_string(),
            description: Some("digits".to_string()),
            owner: Some("data science".to_string()),
            custom_properties: CustomProperties::default().with("vision", ""),
            last_update_time_since_epoch: Some("1000".to_string()),
            ..Default::default()
        };
        let mv = ModelVersion {
            id: "2".to_string(),
            name: "v1".to_string(),
            registered_model_id: "1".to_string(),
            custom_properties: CustomProperties::default()
                .with("onnx", "")
                .with("Foo_Bar!", "")
                .with("License", "apache-2.0"),
            last_update_time_since_epoch: Some("3000".to_string()),
            ..Default::default()
        };
        let artifacts = vec![ModelArtifact {
            id: "3".to_string(),
            name: Some("mnist onnx".to_string()),
            uri: Some("https://host/mnist.onnx".to_string()),
            last_update_time_since_epoch: Some("2000".to_string()),
            ..Default::default()
        }];
        (rm, mv, artifacts)
    }

    /// Story: a registry version nobody serves has no server at all
    ///
    /// Consumers decide whether a model is served by the presence of the
    /// server sub-entity, so an unserved version must not carry an empty one.
    #[test]
    fn story_unserved_version_has_no_server() {
        let (rm, mv, artifacts) = mnist();
        let defaults = Defaults::default();
        let ctx = CorrelationContext::registry(&rm, &mv, &artifacts, None, None, &defaults);

        let entity = build_entity(&ctx).unwrap();
        assert!(entity.server.is_none());
        assert_eq!(entity.key.as_str(), "mnist_v1");
        assert_eq!(entity.provenance, Provenance::Registry);

        let mut unready = ready_deployment("ns", "mnist-v1", "https://x");
        unready.status_url = None;
        let ctx =
            CorrelationContext::registry(&rm, &mv, &artifacts, Some(&unready), None, &defaults);
        assert!(build_entity(&ctx).unwrap().server.is_none());
    }

    #[test]
    fn registry_entry_merges_all_sources() {
        let (rm, mv, artifacts) = mnist();
        let defaults = Defaults::default();
        let deployment = ready_deployment("ns", "mnist-v1", "https://kserve.example");
        let serving = ServingDetails {
            internal_url: Some("http://mnist-v1-predictor.ns.svc.cluster.local:8080".to_string()),
            authentication: true,
        };
        let ctx = CorrelationContext::registry(
            &rm,
            &mv,
            &artifacts,
            Some(&deployment),
            Some(&serving),
            &defaults,
        );

        let entity = build_entity(&ctx).unwrap();
        assert_eq!(entity.last_update, 3000);

        let model = &entity.model;
        assert_eq!(model.name, "mnist-v1");
        assert_eq!(model.owner, "datascience");
        assert_eq!(model.lifecycle, "development");
        assert_eq!(model.description, "digits");
        assert_eq!(model.license.as_deref(), Some("apache-2.0"));
        assert_eq!(model.artifact_location_url.as_deref(), Some("https://host/mnist.onnx"));
        assert_eq!(
            model.annotations.get(MODEL_NAME_ANNOTATION).map(String::as_str),
            Some("mnist-v1")
        );
        assert_eq!(model.links[0].title, "mnistonnx");
        assert_eq!(model.links[1].title, API_URL_LINK_TITLE);

        let server = entity.server.expect("served deployment has a server");
        assert_eq!(server.name, "ns-mnist-v1");
        assert!(server.authentication);
        assert_eq!(server.api.url, "https://kserve.example");
        assert_eq!(server.api.spec, UNKNOWN_API_SPEC);
        assert_eq!(server.api.api_type, ApiType::OpenApi);
        assert_eq!(
            server.api.annotations.get(EXTERNAL_ROUTE_URL_ANNOTATION).map(String::as_str),
            Some("https://kserve.example")
        );
        assert!(server.api.annotations.contains_key(INTERNAL_SERVICE_URL_ANNOTATION));
    }

    /// Story: tags that break the contract never reach the catalog
    #[test]
    fn story_invalid_tags_are_dropped() {
        let (rm, mut mv, artifacts) = mnist();
        let long = "a".repeat(70);
        mv.custom_properties = mv
            .custom_properties
            .with(long.clone(), "")
            .with("Uppercase", "")
            .with("pytorch#2", "");
        let defaults = Defaults::default();
        let ctx = CorrelationContext::registry(&rm, &mv, &artifacts, None, None, &defaults);

        let tags = model_tags(&ctx);
        assert!(tags.contains("onnx"));
        assert!(tags.contains("vision"));
        assert!(tags.contains("uppercase"));
        assert!(tags.contains("pytorch#2"));
        assert!(!tags.contains(&long));
        assert!(!tags.iter().any(|t| t.contains("Foo_Bar!") || t.contains("foo_bar")));
        // License has a value, so it is a property, not a label
        assert!(!tags.contains("license"));
    }

    #[test]
    fn cluster_only_entry_uses_annotations_and_labels() {
        let mut deployment =
            ready_deployment("ns", "mnist-v1", "http://mnist-v1.ns.svc.cluster.local");
        deployment.model_format = Some("onnx-1".to_string());
        deployment.artifact_location = Some("s3://models/mnist".to_string());
        deployment.labels.insert("team".to_string(), "vision".to_string());
        deployment.labels.insert("Bad Label".to_string(), "x".to_string());
        deployment.annotations.insert(
            "rhdh.modelcatalog.io/owner".to_string(),
            "Vision Team".to_string(),
        );
        deployment.annotations.insert(
            "rhdh.modelcatalog.io/apitype".to_string(),
            "grpc".to_string(),
        );
        deployment.annotations.insert(
            "rhdh.modelcatalog.io/techdocs".to_string(),
            "ftp://docs".to_string(),
        );
        let serving = ServingDetails {
            internal_url: Some("http://mnist-v1-predictor.ns.svc.cluster.local:8080".to_string()),
            authentication: false,
        };
        let defaults = Defaults::default();
        let ctx = CorrelationContext::cluster_only(&deployment, Some(&serving), &defaults);

        let entity = build_entity(&ctx).unwrap();
        assert_eq!(entity.key.as_str(), "ns_mnist-v1");
        assert_eq!(entity.provenance, Provenance::ClusterOnly);
        assert_eq!(entity.last_update, deployment.last_update_millis());

        let model = &entity.model;
        assert_eq!(model.name, "ns-mnist-v1");
        assert_eq!(model.owner, "VisionTeam");
        assert_eq!(model.artifact_location_url.as_deref(), Some("s3://models/mnist"));
        assert!(model.tags.contains("team-vision"));
        assert!(model.tags.contains("onnx-1"));
        assert!(model.tags.contains("badlabel-x"));
        assert!(!model.annotations.contains_key(TECHDOCS_ANNOTATION));

        let server = entity.server.unwrap();
        assert_eq!(server.api.api_type, ApiType::Grpc);
        assert_eq!(server.api.url, "http://mnist-v1-predictor.ns.svc.cluster.local:8080");
        assert!(!server.api.annotations.contains_key(EXTERNAL_ROUTE_URL_ANNOTATION));
        assert!(server.tags.contains("team-vision"));
        assert!(!server.tags.contains("onnx-1"));
    }

    #[test]
    fn component_urls_become_links() {
        let mut deployment = ready_deployment("ns", "m", "https://kserve.example");
        deployment.status.components.insert(
            "predictor".to_string(),
            ComponentStatus {
                url: Some("https://predictor.example".to_string()),
                ..Default::default()
            },
        );
        let defaults = Defaults::default();
        let ctx = CorrelationContext::cluster_only(&deployment, None, &defaults);

        let links = serving_links(&ctx);
        let titles: Vec<_> = links.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["API URL", "predictor FastAPI URL", "predictor model serving URL"]
        );
        assert_eq!(links[1].url, "https://predictor.example/docs");
    }

    #[test]
    fn owner_falls_back_to_registry_field_then_default() {
        let (mut rm, mv, _) = mnist();
        let defaults = Defaults {
            owner: "platform".to_string(),
            lifecycle: "production".to_string(),
        };
        assert_eq!(
            owner(&CorrelationContext::registry(&rm, &mv, &[], None, None, &defaults)),
            "datascience"
        );

        rm.owner = Some("!!!".to_string());
        let ctx = CorrelationContext::registry(&rm, &mv, &[], None, None, &defaults);
        assert_eq!(owner(&ctx), "platform");
        assert_eq!(lifecycle(&ctx), "production");
    }

    #[test]
    fn registered_model_properties_fill_in_for_the_version() {
        let registry = FakeRegistry::new("https://registry")
            .with_model("1", "mnist")
            .with_version("2", "1", "v1")
            .model_properties(
                "1",
                CustomProperties::default()
                    .with("Owner", "vision-team")
                    .with("License", "mit"),
            )
            .version_properties("2", CustomProperties::default().with("License", "apache-2.0"));
        let (rm, mv) = (&registry.models[0], &registry.versions[0]);
        let defaults = Defaults::default();
        let ctx = CorrelationContext::registry(rm, mv, &[], None, None, &defaults);

        assert_eq!(owner(&ctx), "vision-team");
        assert_eq!(model(&ctx).license.as_deref(), Some("apache-2.0"));

        let bare = ModelVersion {
            custom_properties: CustomProperties::default(),
            ..mv.clone()
        };
        let ctx = CorrelationContext::registry(rm, &bare, &[], None, None, &defaults);
        assert_eq!(model(&ctx).license.as_deref(), Some("mit"));
    }

    #[test]
    fn description_prefers_property_over_entity_text() {
        let (rm, mut mv, _) = mnist();
        let defaults = Defaults::default();
        mv.description = Some("version text".to_string());
        assert_eq!(
            description(&CorrelationContext::registry(&rm, &mv, &[], None, None, &defaults)),
            "version text"
        );

        mv.custom_properties = mv.custom_properties.with("Description", "curated");
        assert_eq!(
            description(&CorrelationContext::registry(&rm, &mv, &[], None, None, &defaults)),
            "curated"
        );
    }
}
