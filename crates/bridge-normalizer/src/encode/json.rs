//! `ModelCatalog` JSON encoding

use std::collections::BTreeMap;

use serde::Serialize;

use crate::entity::{ApiEntity, ModelEntity, NormalizedEntity, ServerEntity};

fn no_annotations(annotations: &&BTreeMap<String, String>) -> bool {
    annotations.is_empty()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelCatalogDoc<'a> {
    models: Vec<ModelDoc<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_server: Option<ModelServerDoc<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelDoc<'a> {
    #[serde(skip_serializing_if = "no_annotations")]
    annotations: &'a BTreeMap<String, String>,
    #[serde(rename = "artifactLocationURL", skip_serializing_if = "Option::is_none")]
    artifact_location_url: Option<&'a str>,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ethics: Option<&'a str>,
    #[serde(rename = "howToUseURL", skip_serializing_if = "Option::is_none")]
    how_to_use_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    license: Option<&'a str>,
    lifecycle: &'a str,
    name: &'a str,
    owner: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    support: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    training: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelServerDoc<'a> {
    #[serde(skip_serializing_if = "no_annotations")]
    annotations: &'a BTreeMap<String, String>,
    #[serde(rename = "API")]
    api: ApiDoc<'a>,
    authentication: bool,
    description: &'a str,
    #[serde(rename = "homepageURL", skip_serializing_if = "Option::is_none")]
    homepage_url: Option<&'a str>,
    lifecycle: &'a str,
    name: &'a str,
    owner: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<&'a str>,
}

#[derive(Serialize)]
struct ApiDoc<'a> {
    #[serde(skip_serializing_if = "no_annotations")]
    annotations: &'a BTreeMap<String, String>,
    spec: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<&'a str>,
    #[serde(rename = "type")]
    api_type: &'static str,
    url: &'a str,
}

fn model_doc(model: &ModelEntity) -> ModelDoc<'_> {
    ModelDoc {
        annotations: &model.annotations,
        artifact_location_url: model.artifact_location_url.as_deref(),
        description: &model.description,
        ethics: model.ethics.as_deref(),
        how_to_use_url: model.how_to_use_url.as_deref(),
        license: model.license.as_deref(),
        lifecycle: &model.lifecycle,
        name: &model.name,
        owner: &model.owner,
        support: model.support.as_deref(),
        tags: model.tags.iter().map(String::as_str).collect(),
        training: model.training.as_deref(),
        usage: model.usage.as_deref(),
    }
}

fn api_doc(api: &ApiEntity) -> ApiDoc<'_> {
    ApiDoc {
        annotations: &api.annotations,
        spec: &api.spec,
        tags: api.tags.iter().map(String::as_str).collect(),
        api_type: api.api_type.as_str(),
        url: &api.url,
    }
}

fn server_doc(server: &ServerEntity) -> ModelServerDoc<'_> {
    ModelServerDoc {
        annotations: &server.annotations,
        api: api_doc(&server.api),
        authentication: server.authentication,
        description: &server.description,
        homepage_url: server.homepage_url.as_deref(),
        lifecycle: &server.lifecycle,
        name: &server.name,
        owner: &server.owner,
        tags: server.tags.iter().map(String::as_str).collect(),
        usage: server.usage.as_deref(),
    }
}

/// Encode as a `ModelCatalog` document
pub fn encode(entity: &NormalizedEntity) -> Result<Vec<u8>, serde_json::Error> {
    let doc = ModelCatalogDoc {
        models: vec![model_doc(&entity.model)],
        model_server: entity.server.as_ref().map(server_doc),
    };
    serde_json::to_vec_pretty(&doc)
}
