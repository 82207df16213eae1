//! ConfigMap-backed storage
//!
//! All records live in one ConfigMap, one `binaryData` entry per import key,
//! each entry a JSON-encoded [`StoredRecord`]. Writes replace the whole
//! ConfigMap with its observed resourceVersion and retry on conflict.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::PostParams;
use kube::{Api, Client};
use tracing::{debug, warn};

use bridge_common::{Error, ImportKey};

use crate::backend::BridgeStorage;
use crate::wire::StoredRecord;
use crate::STORAGE_CONFIGMAP_NAME;

/// Attempts for one write when the ConfigMap changes underneath us
const CONFLICT_RETRIES: u32 = 3;

/// Storage in a single ConfigMap
pub struct ConfigMapStorage {
    api: Api<ConfigMap>,
    name: String,
}

impl ConfigMapStorage {
    /// Use the default ConfigMap name in `namespace`
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: STORAGE_CONFIGMAP_NAME.to_string(),
        }
    }

    async fn load(&self) -> Result<ConfigMap, Error> {
        if let Some(cm) = self.api.get_opt(&self.name).await? {
            return Ok(cm);
        }
        debug!(configmap = %self.name, "Creating storage ConfigMap");
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                ..Default::default()
            },
            ..Default::default()
        };
        match self.api.create(&PostParams::default(), &cm).await {
            Ok(created) => Ok(created),
            // created concurrently
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(self.api.get(&self.name).await?),
            Err(e) => Err(e.into()),
        }
    }

    async fn modify<F>(&self, mut change: F) -> Result<bool, Error>
    where
        F: FnMut(&mut BTreeMap<String, ByteString>) -> Result<bool, Error>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut cm = self.load().await?;
            let data = cm.binary_data.get_or_insert_with(BTreeMap::new);
            if !change(data)? {
                return Ok(false);
            }
            match self.api.replace(&self.name, &PostParams::default(), &cm).await {
                Ok(_) => return Ok(true),
                Err(kube::Error::Api(ae)) if ae.code == 409 && attempt < CONFLICT_RETRIES => {
                    warn!(
                        configmap = %self.name,
                        attempt,
                        "Storage ConfigMap changed concurrently, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Encode a record as a ConfigMap entry
pub fn encode_entry(record: &StoredRecord) -> Result<ByteString, Error> {
    serde_json::to_vec(record)
        .map(ByteString)
        .map_err(|e| Error::serialization(format!("stored record: {e}")))
}

/// Decode a ConfigMap entry
pub fn decode_entry(key: &str, entry: &ByteString) -> Result<StoredRecord, Error> {
    serde_json::from_slice(&entry.0)
        .map_err(|e| Error::serialization(format!("stored record {key}: {e}")))
}

/// Valid import keys stored in a ConfigMap, sorted; foreign entries are skipped
pub fn entry_keys(cm: &ConfigMap) -> Vec<ImportKey> {
    cm.binary_data
        .iter()
        .flat_map(|d| d.keys())
        .filter_map(|k| ImportKey::parse(k).ok())
        .collect()
}

#[async_trait]
impl BridgeStorage for ConfigMapStorage {
    async fn get(&self, key: &ImportKey) -> Result<Option<StoredRecord>, Error> {
        let cm = self.load().await?;
        cm.binary_data
            .as_ref()
            .and_then(|d| d.get(key.as_str()))
            .map(|entry| decode_entry(key.as_str(), entry))
            .transpose()
    }

    async fn put(&self, key: &ImportKey, record: StoredRecord) -> Result<(), Error> {
        let entry = encode_entry(&record)?;
        self.modify(|data| {
            data.insert(key.to_string(), entry.clone());
            Ok(true)
        })
        .await
        .map(|_| ())
    }

    async fn remove(&self, key: &ImportKey) -> Result<bool, Error> {
        self.modify(|data| Ok(data.remove(key.as_str()).is_some()))
            .await
    }

    async fn list_keys(&self) -> Result<Vec<ImportKey>, Error> {
        Ok(entry_keys(&self.load().await?))
    }
}
