//! Model catalog bridge - keeps a developer-portal catalog in sync with
//! model deployments and model registries

use clap::{Args, Parser, Subcommand};

use bridge_common::config::{
    NormalizerSettings, StorageBackendKind, StorageServerConfig, DEFAULT_HTTP_TIMEOUT,
};
use bridge_common::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use bridge_common::DEFAULT_STORAGE_PORT;

mod controller_runner;
mod startup;
mod storage;

/// Model catalog bridge
#[derive(Parser, Debug)]
#[command(name = "model-catalog-bridge", version, about, long_about = None)]
struct Cli {
    /// Log line encoding (json or text)
    #[arg(long, env = "LOG_FORMAT", default_value = "json", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the normalizer controller
    ///
    /// Watches InferenceServices, correlates them with the configured model
    /// registries and pushes catalog records to the storage tier. A periodic
    /// full pass submits the current key set so stale records are removed.
    Controller(ControllerArgs),

    /// Run the storage tier HTTP server
    Storage(StorageArgs),
}

#[derive(Args, Debug)]
struct ControllerArgs {
    /// Output encoding: JsonArrayFormat or CatalogInfoYamlFormat
    #[arg(long, env = "NORMALIZER_FORMAT")]
    normalizer_format: Option<String>,

    /// Interval between full passes, e.g. 2m or 30s
    #[arg(long, env = "POLLING_INTERVAL")]
    polling_interval: Option<String>,

    /// Owner used when no source names one
    #[arg(long, env = "DEFAULT_OWNER")]
    default_owner: Option<String>,

    /// Lifecycle used when no source names one
    #[arg(long, env = "DEFAULT_LIFECYCLE")]
    default_lifecycle: Option<String>,

    /// Comma-separated registry routes, `name` or `namespace:name`
    #[arg(long, env = "MODEL_REGISTRY_ROUTE")]
    model_registry_route: Option<String>,

    /// Comma-separated registry base URLs, bypassing route discovery
    #[arg(long, env = "MODEL_REGISTRY_URL")]
    model_registry_url: Option<String>,

    /// Bearer token for registry calls
    #[arg(long, env = "MODEL_REGISTRY_TOKEN", hide_env_values = true)]
    model_registry_token: Option<String>,

    /// Storage tier base URL
    #[arg(long, env = "STORAGE_URL")]
    storage_url: Option<String>,

    /// Pod IP; the storage tier is assumed at port 7070 on it when no URL is set
    #[arg(long, env = "POD_IP")]
    pod_ip: Option<String>,

    /// Upper bound on concurrent reconcile cycles
    #[arg(long, env = "MAX_CONCURRENT_RECONCILES")]
    max_concurrent_reconciles: Option<u16>,

    /// Timeout for registry and storage calls, in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS")]
    http_timeout_secs: Option<u64>,
}

impl ControllerArgs {
    fn settings(&self) -> NormalizerSettings {
        NormalizerSettings {
            format: self.normalizer_format.clone(),
            polling_interval: self.polling_interval.clone(),
            default_owner: self.default_owner.clone(),
            default_lifecycle: self.default_lifecycle.clone(),
            registry_routes: self.model_registry_route.clone(),
            registry_url: self.model_registry_url.clone(),
            registry_token: self.model_registry_token.clone(),
            storage_url: self.storage_url.clone(),
            pod_ip: self.pod_ip.clone(),
            max_concurrent_reconciles: self.max_concurrent_reconciles,
            http_timeout_secs: self.http_timeout_secs,
        }
    }
}

#[derive(Args, Debug)]
struct StorageArgs {
    /// Port to listen on
    #[arg(long, env = "STORAGE_PORT", default_value_t = DEFAULT_STORAGE_PORT)]
    port: u16,

    /// Record backend: memory or configmap
    #[arg(long, env = "STORAGE_TYPE", default_value = "memory")]
    storage_type: StorageBackendKind,

    /// Namespace of the ConfigMap backend
    #[arg(long, env = "STORAGE_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Downstream location service notified of new and removed records
    #[arg(long, env = "LOCATION_URL")]
    location_url: Option<String>,

    /// Address the catalog importer uses to reach this server
    #[arg(long, env = "STORAGE_PUBLIC_URL")]
    public_url: Option<String>,

    /// Timeout for downstream notifications, in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS")]
    http_timeout_secs: Option<u64>,
}

impl StorageArgs {
    fn config(&self) -> StorageServerConfig {
        let clean = |v: &Option<String>| {
            v.as_deref()
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty())
        };
        StorageServerConfig {
            port: self.port,
            backend: self.storage_type,
            namespace: self.namespace.trim().to_string(),
            location_url: clean(&self.location_url),
            public_url: clean(&self.public_url)
                .unwrap_or_else(|| format!("http://localhost:{}", self.port)),
            http_timeout: self
                .http_timeout_secs
                .filter(|s| *s > 0)
                .map(std::time::Duration::from_secs)
                .unwrap_or(DEFAULT_HTTP_TIMEOUT),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let service_name = match cli.command {
        Commands::Controller(_) => "bridge-normalizer",
        Commands::Storage(_) => "bridge-storage",
    };
    init_telemetry(TelemetryConfig {
        service_name: service_name.to_string(),
        format: cli.log_format,
    })?;

    match cli.command {
        Commands::Controller(args) => controller_runner::run(&args.settings()).await,
        Commands::Storage(args) => storage::run(&args.config()).await,
    }
}
