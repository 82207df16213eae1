//! Encoders for the normalized entity graph
//!
//! - [`json`]: a single `ModelCatalog` JSON document
//! - [`catalog_info`]: Backstage catalog-info YAML documents

pub mod catalog_info;
pub mod json;

use bridge_common::config::NormalizerFormat;
use bridge_common::Error;

use crate::entity::NormalizedEntity;

/// Render `entity` in the configured format
pub fn encode(entity: &NormalizedEntity, format: NormalizerFormat) -> Result<Vec<u8>, Error> {
    let encoded = match format {
        NormalizerFormat::JsonArray => json::encode(entity).map_err(|e| e.to_string()),
        NormalizerFormat::CatalogInfoYaml => {
            catalog_info::encode(entity).map_err(|e| e.to_string())
        }
    };
    encoded.map_err(|e| Error::serialization_for_format(format.as_str(), e))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use bridge_common::ImportKey;
    use bridge_storage::Provenance;

    use crate::entity::{ApiEntity, ApiType, ModelEntity, NormalizedEntity, ServerEntity};

    /// The mnist entity, with or without a server
    pub fn entity(served: bool) -> NormalizedEntity {
        let model = ModelEntity {
            name: "mnist-v1".to_string(),
            owner: "team".to_string(),
            lifecycle: "development".to_string(),
            description: "digits".to_string(),
            tags: ["onnx".to_string()].into(),
            artifact_location_url: Some("https://host/mnist.onnx".to_string()),
            how_to_use_url: Some("https://docs".to_string()),
            ..Default::default()
        };
        let server = served.then(|| ServerEntity {
            name: "ns-mnist-v1".to_string(),
            owner: "team".to_string(),
            lifecycle: "development".to_string(),
            authentication: true,
            api: ApiEntity {
                url: "https://kserve.example".to_string(),
                spec: "TBD".to_string(),
                api_type: ApiType::Grpc,
                ..Default::default()
            },
            ..Default::default()
        });
        NormalizedEntity {
            key: ImportKey::parse("mnist_v1").unwrap(),
            provenance: Provenance::Registry,
            last_update: 1,
            model,
            server,
            model_card_source: None,
        }
    }
}
