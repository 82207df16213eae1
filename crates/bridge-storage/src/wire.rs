//! Wire and persistence types shared by the server, the backends and the client

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use bridge_common::{Error, ImportKey};

/// Byte payloads travel as base64 strings
mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(d)?;
        STANDARD.decode(raw.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// Which correlation path produced a record
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    /// Built from registry entities (optionally enriched by a deployment)
    #[serde(rename = "kubeflow")]
    Registry,
    /// Built from a deployment alone
    #[serde(rename = "kserve")]
    ClusterOnly,
    /// Provenance was not supplied
    #[default]
    #[serde(other, rename = "unknown")]
    Unknown,
}

impl Provenance {
    /// Query-string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Registry => "kubeflow",
            Provenance::ClusterOnly => "kserve",
            Provenance::Unknown => "unknown",
        }
    }

    /// Parse the `type` query parameter; anything unrecognized is `Unknown`
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("kubeflow") => Provenance::Registry,
            Some("kserve") => Provenance::ClusterOnly,
            _ => Provenance::Unknown,
        }
    }
}

/// Body of `POST /upsert`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostBody {
    /// Encoded catalog document
    #[serde(with = "base64_bytes")]
    pub body: Vec<u8>,
    /// Last-modified marker, epoch milliseconds as a string; empty means 0
    #[serde(default)]
    pub last_update_time_since_epoch: String,
    /// Key the model card is filed under (the import key when a card is sent)
    #[serde(default)]
    pub model_card_key: String,
    /// Markdown model card
    #[serde(default)]
    pub model_card: String,
}

impl PostBody {
    /// Parse the last-modified marker
    pub fn last_update_marker(&self) -> Result<u64, Error> {
        let raw = self.last_update_time_since_epoch.trim();
        if raw.is_empty() {
            return Ok(0);
        }
        raw.parse().map_err(|_| {
            Error::validation_for(raw, "lastUpdateTimeSinceEpoch must be epoch milliseconds")
        })
    }
}

/// A stored catalog record
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    /// Encoded catalog document
    #[serde(with = "base64_bytes")]
    pub body: Vec<u8>,
    /// Monotonic last-modified marker
    pub last_update: u64,
    /// Correlation path that produced the record
    #[serde(default)]
    pub provenance: Provenance,
    /// Markdown model card, if one was supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_card: Option<String>,
    /// Whether the downstream importer has been told about this key
    #[serde(default)]
    pub imported: bool,
}

impl StoredRecord {
    /// Content type of the stored document
    pub fn content_type(&self) -> &'static str {
        match self.body.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') | Some(b'[') => "application/json",
            _ => "application/yaml",
        }
    }
}

/// Result of one upsert as seen by the storage tier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOutcome {
    /// No record existed
    Created,
    /// An older or equal record was replaced
    Updated,
    /// A newer record exists; nothing was written
    Ignored,
}

/// Response body of `POST /upsert`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpsertResponse {
    /// Key written
    pub key: ImportKey,
    /// What happened
    pub outcome: WriteOutcome,
}

/// Response body of `POST /currentkeyset`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KeySetResponse {
    /// Keys deleted because they were absent from the submitted set
    pub removed: Vec<ImportKey>,
}

/// Response body of `GET /list`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoverResponse {
    /// Every stored key
    pub keys: Vec<String>,
}
