//! Backstage catalog-info YAML encoding
//!
//! One `Component` for the model server, one `Resource` for the model and,
//! when the model is served, one `API`. Documents are separated by `---`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::entity::{EntityLink, NormalizedEntity};
use crate::merge::UNKNOWN_API_SPEC;

const API_VERSION: &str = "backstage.io/v1alpha1";
const TECHDOCS_REF: &str = "backstage.io/techdocs-ref";
const COMPONENT_TYPE: &str = "model-server";
const RESOURCE_TYPE: &str = "ai-model";
const LINK_ICON: &str = "WebAsset";
const LINK_TYPE: &str = "website";
// definition must be non-empty to pass catalog validation
const NO_DEFINITION: &str = "no-definition-yet";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Entity<'a, S> {
    api_version: &'static str,
    kind: &'static str,
    metadata: Metadata<'a>,
    spec: S,
}

#[derive(Serialize)]
struct Metadata<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: &'a str,
    annotations: BTreeMap<&'a str, &'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    links: Vec<Link<'a>>,
}

#[derive(Serialize)]
struct Link<'a> {
    url: &'a str,
    title: &'a str,
    icon: &'static str,
    #[serde(rename = "type")]
    link_type: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Profile<'a> {
    display_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ComponentSpec<'a> {
    #[serde(rename = "type")]
    component_type: &'static str,
    lifecycle: &'a str,
    owner: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    provides_apis: Vec<&'a str>,
    profile: Profile<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceSpec<'a> {
    #[serde(rename = "type")]
    resource_type: &'static str,
    lifecycle: &'a str,
    owner: String,
    dependency_of: Vec<String>,
    profile: Profile<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiSpec<'a> {
    #[serde(rename = "type")]
    api_type: &'static str,
    lifecycle: &'a str,
    owner: String,
    definition: &'a str,
    dependency_of: Vec<String>,
    profile: Profile<'a>,
}

fn links(links: &[EntityLink]) -> Vec<Link<'_>> {
    links
        .iter()
        .map(|l| Link {
            url: &l.url,
            title: &l.title,
            icon: LINK_ICON,
            link_type: LINK_TYPE,
        })
        .collect()
}

fn user(owner: &str) -> String {
    format!("user:{owner}")
}

fn annotations<'a>(
    techdocs_ref: &'static str,
    extra: &'a BTreeMap<String, String>,
) -> BTreeMap<&'a str, &'a str> {
    let mut annotations: BTreeMap<&str, &str> = extra
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    annotations.insert(TECHDOCS_REF, techdocs_ref);
    annotations
}

/// Encode as catalog-info YAML documents
pub fn encode(entity: &NormalizedEntity) -> Result<Vec<u8>, serde_yaml::Error> {
    let model = &entity.model;
    let server = entity.server.as_ref();
    let component_name = server.map_or(model.name.as_str(), |s| s.name.as_str());

    let mut depends_on = vec![format!("resource:{}", model.name)];
    depends_on.extend(server.map(|s| format!("api:{}", s.name)));
    let (description, lifecycle, owner, tags, component_links) = match server {
        Some(s) => (&s.description, &s.lifecycle, &s.owner, &s.tags, &s.links),
        None => (
            &model.description,
            &model.lifecycle,
            &model.owner,
            &model.tags,
            &model.links,
        ),
    };
    let no_annotations = BTreeMap::new();

    let component = Entity {
        api_version: API_VERSION,
        kind: "Component",
        metadata: Metadata {
            name: component_name,
            description,
            annotations: annotations("./", server.map_or(&no_annotations, |s| &s.annotations)),
            tags: tags.iter().map(String::as_str).collect(),
            links: links(component_links),
        },
        spec: ComponentSpec {
            component_type: COMPONENT_TYPE,
            lifecycle,
            owner: user(owner),
            depends_on,
            provides_apis: server.map(|s| s.name.as_str()).into_iter().collect(),
            profile: Profile {
                display_name: component_name,
            },
        },
    };

    let resource = Entity {
        api_version: API_VERSION,
        kind: "Resource",
        metadata: Metadata {
            name: &model.name,
            description: &model.description,
            annotations: annotations("resource/", &model.annotations),
            tags: model.tags.iter().map(String::as_str).collect(),
            links: links(&model.links),
        },
        spec: ResourceSpec {
            resource_type: RESOURCE_TYPE,
            lifecycle: &model.lifecycle,
            owner: user(&model.owner),
            dependency_of: vec![format!("component:{component_name}")],
            profile: Profile {
                display_name: &model.name,
            },
        },
    };

    let mut documents = vec![
        serde_yaml::to_string(&component)?,
        serde_yaml::to_string(&resource)?,
    ];

    if let Some(server) = server {
        let definition = if server.api.spec.is_empty() || server.api.spec == UNKNOWN_API_SPEC {
            NO_DEFINITION
        } else {
            server.api.spec.as_str()
        };
        let api = Entity {
            api_version: API_VERSION,
            kind: "API",
            metadata: Metadata {
                name: &server.name,
                description: &server.description,
                annotations: annotations("api/", &server.api.annotations),
                tags: server.api.tags.iter().map(String::as_str).collect(),
                links: links(&server.links),
            },
            spec: ApiSpec {
                api_type: server.api.api_type.as_str(),
                lifecycle: &server.lifecycle,
                owner: user(&server.owner),
                definition,
                dependency_of: vec![format!("component:{component_name}")],
                profile: Profile {
                    display_name: &server.name,
                },
            },
        };
        documents.push(serde_yaml::to_string(&api)?);
    }

    Ok(documents.join("---\n").into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::fixtures::entity;
    use serde::Deserialize;
    use serde_yaml::Value;

    fn documents(bytes: &[u8]) -> Vec<Value> {
        serde_yaml::Deserializer::from_slice(bytes)
            .map(|doc| Value::deserialize(doc).unwrap())
            .collect()
    }

    #[test]
    fn served_entity_renders_component_resource_and_api() {
        let docs = documents(&encode(&entity(true)).unwrap());
        let kinds: Vec<_> = docs.iter().map(|d| d["kind"].as_str().unwrap()).collect();
        assert_eq!(kinds, vec!["Component", "Resource", "API"]);

        let component = &docs[0];
        assert_eq!(component["apiVersion"], "backstage.io/v1alpha1");
        assert_eq!(component["metadata"]["name"], "ns-mnist-v1");
        assert_eq!(component["spec"]["type"], "model-server");
        assert_eq!(component["spec"]["owner"], "user:team");
        assert_eq!(component["spec"]["profile"]["displayName"], "ns-mnist-v1");
        assert_eq!(
            component["spec"]["dependsOn"],
            serde_yaml::to_value(["resource:mnist-v1", "api:ns-mnist-v1"]).unwrap()
        );
        assert_eq!(component["metadata"]["annotations"][TECHDOCS_REF], "./");

        let resource = &docs[1];
        assert_eq!(resource["spec"]["type"], "ai-model");
        assert_eq!(resource["spec"]["dependencyOf"][0], "component:ns-mnist-v1");

        let api = &docs[2];
        assert_eq!(api["spec"]["type"], "grpc");
        assert_eq!(api["spec"]["definition"], NO_DEFINITION);
        assert_eq!(api["metadata"]["annotations"][TECHDOCS_REF], "api/");
    }

    #[test]
    fn unserved_entity_has_no_api_document() {
        let docs = documents(&encode(&entity(false)).unwrap());
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["metadata"]["name"], "mnist-v1");
        assert_eq!(
            docs[0]["spec"]["dependsOn"],
            serde_yaml::to_value(["resource:mnist-v1"]).unwrap()
        );
        assert!(docs[0]["spec"].get("providesApis").is_none());
    }

    #[test]
    fn model_links_carry_icon_and_type() {
        let mut e = entity(false);
        e.model.links.push(EntityLink {
            url: "https://host/mnist.onnx".to_string(),
            title: "weights".to_string(),
        });
        let docs = documents(&encode(&e).unwrap());
        let link = &docs[1]["metadata"]["links"][0];
        assert_eq!(link["url"], "https://host/mnist.onnx");
        assert_eq!(link["icon"], "WebAsset");
        assert_eq!(link["type"], "website");
    }
}
