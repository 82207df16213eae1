//! Runtime configuration
//!
//! Raw values arrive as environment-style strings (through clap `env`
//! arguments in the binary). [`NormalizerConfig::from_settings`] turns them
//! into a validated config with defaults applied, so nothing downstream
//! has to re-check an empty owner or an unparseable interval.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::sanitize::{sanitize_name, strip_line_breaks};
use crate::{Error, DEFAULT_LIFECYCLE, DEFAULT_OWNER, DEFAULT_STORAGE_PORT};

/// Default interval between periodic full passes
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(120);

/// Default bound on concurrently running reconcile cycles
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 32;

/// Default timeout for registry and storage HTTP calls
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Namespace assumed for a registry route hint without one
pub const DEFAULT_ROUTE_NAMESPACE: &str = "istio-system";

/// Output encoding pushed to the storage tier
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NormalizerFormat {
    /// Catalog-info YAML entity documents
    #[default]
    CatalogInfoYaml,
    /// A single JSON model catalog document
    JsonArray,
}

impl NormalizerFormat {
    /// Wire/config name of the format
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizerFormat::CatalogInfoYaml => "CatalogInfoYamlFormat",
            NormalizerFormat::JsonArray => "JsonArrayFormat",
        }
    }

    /// Parse a config value, falling back to [`NormalizerFormat::CatalogInfoYaml`]
    pub fn from_config_value(value: &str) -> Self {
        match value.parse() {
            Ok(format) => format,
            Err(_) => {
                if !value.is_empty() {
                    warn!(value = %value, "Unknown normalizer format, using CatalogInfoYamlFormat");
                }
                NormalizerFormat::CatalogInfoYaml
            }
        }
    }
}

impl FromStr for NormalizerFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "CatalogInfoYamlFormat" => Ok(NormalizerFormat::CatalogInfoYaml),
            "JsonArrayFormat" => Ok(NormalizerFormat::JsonArray),
            other => Err(Error::validation_for(other, "unknown normalizer format")),
        }
    }
}

impl fmt::Display for NormalizerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a duration written as number/unit pairs, e.g. `2m`, `1h30m`, `500ms`.
///
/// Supported units are `ms`, `s`, `m` and `h`.
pub fn parse_duration(raw: &str) -> Result<Duration, Error> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(Error::validation_for(raw, "empty duration"));
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return Err(Error::validation_for(raw, "expected a number"));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|_| Error::validation_for(raw, "number out of range"))?;
        rest = &rest[digits..];

        let unit_len = rest.chars().take_while(|c| c.is_ascii_alphabetic()).count();
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.saturating_mul(60)),
            "h" => Duration::from_secs(value.saturating_mul(3600)),
            "" => return Err(Error::validation_for(raw, "missing unit")),
            other => {
                return Err(Error::validation_for(
                    raw,
                    format!("unknown duration unit '{other}'"),
                ))
            }
        };
        total = total.saturating_add(part);
    }
    Ok(total)
}

/// A registry route to resolve, given as `name` or `namespace:name`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RouteHint {
    /// Namespace of the route object
    pub namespace: String,
    /// Name of the route object
    pub name: String,
}

impl RouteHint {
    /// Parse a single hint; a missing namespace means [`DEFAULT_ROUTE_NAMESPACE`]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.split_once(':') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() => Some(Self {
                namespace: ns.to_string(),
                name: name.to_string(),
            }),
            Some(_) => None,
            None => Some(Self {
                namespace: DEFAULT_ROUTE_NAMESPACE.to_string(),
                name: raw.to_string(),
            }),
        }
    }
}

/// Parse a comma-separated list of route hints, skipping blank or malformed entries
pub fn parse_route_hints(raw: &str) -> Vec<RouteHint> {
    raw.split(',')
        .filter_map(|entry| {
            let hint = RouteHint::parse(entry);
            if hint.is_none() && !entry.trim().is_empty() {
                warn!(entry = %entry, "Ignoring malformed registry route hint");
            }
            hint
        })
        .collect()
}

/// Raw, unvalidated normalizer settings as read from the environment
#[derive(Clone, Debug, Default)]
pub struct NormalizerSettings {
    /// `NORMALIZER_FORMAT`
    pub format: Option<String>,
    /// `POLLING_INTERVAL`
    pub polling_interval: Option<String>,
    /// `DEFAULT_OWNER`
    pub default_owner: Option<String>,
    /// `DEFAULT_LIFECYCLE`
    pub default_lifecycle: Option<String>,
    /// `MODEL_REGISTRY_ROUTE`
    pub registry_routes: Option<String>,
    /// `MODEL_REGISTRY_URL`
    pub registry_url: Option<String>,
    /// `MODEL_REGISTRY_TOKEN`
    pub registry_token: Option<String>,
    /// `STORAGE_URL`
    pub storage_url: Option<String>,
    /// `POD_IP`, used when no storage URL is set
    pub pod_ip: Option<String>,
    /// `MAX_CONCURRENT_RECONCILES`
    pub max_concurrent_reconciles: Option<u16>,
    /// `HTTP_TIMEOUT_SECS`
    pub http_timeout_secs: Option<u64>,
}

/// Validated normalizer configuration
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizerConfig {
    /// Encoding of pushed records
    pub format: NormalizerFormat,
    /// Interval between full passes
    pub polling_interval: Duration,
    /// Owner used when no source names one
    pub default_owner: String,
    /// Lifecycle used when no source names one
    pub default_lifecycle: String,
    /// Registry routes to discover
    pub route_hints: Vec<RouteHint>,
    /// Registry base URLs used directly, bypassing route discovery
    pub registry_urls: Vec<String>,
    /// Bearer token for registry calls
    pub registry_token: Option<String>,
    /// Storage tier base URL
    pub storage_url: String,
    /// Bound on concurrent reconcile cycles
    pub max_concurrent_reconciles: u16,
    /// Timeout for registry and storage HTTP calls
    pub http_timeout: Duration,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            format: NormalizerFormat::default(),
            polling_interval: DEFAULT_POLLING_INTERVAL,
            default_owner: DEFAULT_OWNER.to_string(),
            default_lifecycle: DEFAULT_LIFECYCLE.to_string(),
            route_hints: Vec::new(),
            registry_urls: Vec::new(),
            registry_token: None,
            storage_url: format!("http://localhost:{DEFAULT_STORAGE_PORT}"),
            max_concurrent_reconciles: DEFAULT_MAX_CONCURRENT_RECONCILES,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

fn clean(value: Option<&String>) -> Option<String> {
    value
        .map(|v| strip_line_breaks(v).trim().to_string())
        .filter(|v| !v.is_empty())
}

impl NormalizerConfig {
    /// Apply defaults and validation to raw settings.
    ///
    /// Bad optional values fall back to defaults with a warning; only a
    /// missing storage address (no URL and no pod IP) is an error.
    pub fn from_settings(settings: &NormalizerSettings) -> Result<Self, Error> {
        let defaults = Self::default();

        let format = clean(settings.format.as_ref())
            .map(|f| NormalizerFormat::from_config_value(&f))
            .unwrap_or_default();

        let polling_interval = match clean(settings.polling_interval.as_ref()) {
            Some(raw) => match parse_duration(&raw) {
                Ok(d) if !d.is_zero() => d,
                Ok(_) | Err(_) => {
                    warn!(value = %raw, "Invalid polling interval, using default");
                    defaults.polling_interval
                }
            },
            None => defaults.polling_interval,
        };

        let default_owner = clean(settings.default_owner.as_ref())
            .map(|o| sanitize_name(&o))
            .filter(|o| !o.is_empty())
            .unwrap_or(defaults.default_owner);

        let default_lifecycle = clean(settings.default_lifecycle.as_ref())
            .map(|l| sanitize_name(&l))
            .filter(|l| !l.is_empty())
            .unwrap_or(defaults.default_lifecycle);

        let route_hints = clean(settings.registry_routes.as_ref())
            .map(|r| parse_route_hints(&r))
            .unwrap_or_default();

        let registry_urls = clean(settings.registry_url.as_ref())
            .map(|u| {
                u.split(',')
                    .map(|s| s.trim().trim_end_matches('/').to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let storage_url = match clean(settings.storage_url.as_ref()) {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => match clean(settings.pod_ip.as_ref()) {
                Some(ip) => format!("http://{ip}:{DEFAULT_STORAGE_PORT}"),
                None => {
                    return Err(Error::configuration(
                        "neither STORAGE_URL nor POD_IP is set; cannot locate the storage tier",
                    ))
                }
            },
        };

        Ok(Self {
            format,
            polling_interval,
            default_owner,
            default_lifecycle,
            route_hints,
            registry_urls,
            registry_token: clean(settings.registry_token.as_ref()),
            storage_url,
            max_concurrent_reconciles: settings
                .max_concurrent_reconciles
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_reconciles),
            http_timeout: settings
                .http_timeout_secs
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
        })
    }
}

/// Storage backend selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StorageBackendKind {
    /// Process-local map, lost on restart
    #[default]
    Memory,
    /// One ConfigMap holding every record
    ConfigMap,
}

impl FromStr for StorageBackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "" => Ok(StorageBackendKind::Memory),
            "configmap" => Ok(StorageBackendKind::ConfigMap),
            other => Err(Error::validation_for(other, "unknown storage type")),
        }
    }
}

/// Storage tier server configuration
#[derive(Clone, Debug, PartialEq)]
pub struct StorageServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Where records are kept
    pub backend: StorageBackendKind,
    /// Namespace of the ConfigMap backend
    pub namespace: String,
    /// Downstream import service notified of creations and removals
    pub location_url: Option<String>,
    /// Address the downstream importer uses to reach this server
    pub public_url: String,
    /// Timeout for downstream notifications
    pub http_timeout: Duration,
}

impl Default for StorageServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_STORAGE_PORT,
            backend: StorageBackendKind::default(),
            namespace: "default".to_string(),
            location_url: None,
            public_url: format!("http://localhost:{DEFAULT_STORAGE_PORT}"),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}
