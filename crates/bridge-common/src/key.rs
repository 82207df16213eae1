//! Import keys
//!
//! An import key names one catalog record in the storage tier. It is always
//! `<segment>_<segment>`: either (registered model, version) for registry
//! records or (namespace, deployment) for cluster-only records. Both
//! segments are sanitized, so the same logical object yields the same key
//! on every pass.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sanitize::sanitize_name;
use crate::Error;

/// Separator between the two key segments
pub const KEY_SEPARATOR: char = '_';

/// A validated storage key
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImportKey(String);

impl ImportKey {
    /// Key for a registry-correlated record: `{model}_{version}`
    pub fn for_model_version(registered_model: &str, model_version: &str) -> Result<Self, Error> {
        Self::from_segments(registered_model, model_version)
    }

    /// Key for a cluster-only record: `{namespace}_{name}`
    pub fn for_deployment(namespace: &str, name: &str) -> Result<Self, Error> {
        Self::from_segments(namespace, name)
    }

    fn from_segments(first: &str, second: &str) -> Result<Self, Error> {
        let a = sanitize_name(first);
        let b = sanitize_name(second);
        if a.is_empty() || b.is_empty() {
            return Err(Error::validation_for(
                format!("{first}/{second}"),
                "import key segment is empty after sanitization",
            ));
        }
        Ok(Self(format!("{a}{KEY_SEPARATOR}{b}")))
    }

    /// Parse a key received from the wire.
    ///
    /// Requires at least one underscore with content on both sides and only
    /// the characters a sanitized name can contain.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        if raw.is_empty() {
            return Err(Error::validation_for(raw, "import key is empty"));
        }
        let Some((head, tail)) = raw.split_once(KEY_SEPARATOR) else {
            return Err(Error::validation_for(raw, "bad key format: missing '_'"));
        };
        if head.is_empty() || tail.is_empty() {
            return Err(Error::validation_for(raw, "bad key format: empty segment"));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(Error::validation_for(raw, "bad key format: illegal character"));
        }
        Ok(Self(raw.to_string()))
    }

    /// Borrow the key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ImportKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ImportKey> for String {
    fn from(key: ImportKey) -> Self {
        key.0
    }
}

impl AsRef<str> for ImportKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Parse a comma-joined key list, skipping empty entries.
///
/// The first malformed entry fails the whole list.
pub fn parse_key_set(raw: &str) -> Result<Vec<ImportKey>, Error> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(ImportKey::parse)
        .collect()
}

/// Join keys into the comma-separated wire form
pub fn join_key_set<'a>(keys: impl IntoIterator<Item = &'a ImportKey>) -> String {
    keys.into_iter()
        .map(ImportKey::as_str)
        .collect::<Vec<_>>()
        .join(",")
}
