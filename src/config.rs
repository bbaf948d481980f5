//! Configuration loading and types for the registry.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: networking, registry behaviour, the backing bucket, logging and
//! metrics.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Registry protocol settings.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Object storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Registry behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Public host name embedded in download URLs (`https://{hostname}/proxy/...`).
    #[serde(default)]
    pub hostname: String,

    /// Serve version listings from the in-memory index rather than
    /// listing the bucket on every request.
    #[serde(default = "default_true")]
    pub use_index: bool,

    /// Seconds between background index refreshes (0 = only on demand).
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,

    /// Where signing keys come from.
    #[serde(default)]
    pub signing_keys: SigningKeysConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            use_index: true,
            refresh_interval_seconds: default_refresh_interval(),
            signing_keys: SigningKeysConfig::default(),
        }
    }
}

/// Signing key strategy.
#[derive(Debug, Clone, Deserialize)]
pub struct SigningKeysConfig {
    /// `global` (one key for every provider) or `per_artifact` (`key_id`
    /// and `keyfile` objects stored next to each version).
    #[serde(default = "default_key_strategy")]
    pub strategy: String,

    /// Key id served with the global key.
    #[serde(default)]
    pub key_id: String,

    /// Path to the ASCII-armored global public key.
    #[serde(default)]
    pub keyfile: String,
}

impl Default for SigningKeysConfig {
    fn default() -> Self {
        Self {
            strategy: default_key_strategy(),
            key_id: String::new(),
            keyfile: String::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

/// Object storage backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `aws` or `local`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Upper bound in seconds on each list/get call.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Local directory configuration.
    #[serde(default)]
    pub local: LocalStorageConfig,

    /// AWS S3 configuration.
    #[serde(default)]
    pub aws: Option<AwsStorageConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            request_timeout_seconds: default_request_timeout(),
            local: LocalStorageConfig::default(),
            aws: None,
        }
    }
}

/// Local directory bucket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageConfig {
    /// Directory whose tree is served as the bucket.
    #[serde(default = "default_storage_root")]
    pub root_dir: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
        }
    }
}

/// AWS S3 bucket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AwsStorageConfig {
    /// Bucket holding the providers.
    pub bucket: String,
    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Key prefix under which the registry tree lives.
    #[serde(default)]
    pub prefix: String,
    /// Custom S3-compatible endpoint (e.g. MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: String,
    /// Force path-style URL addressing.
    #[serde(default)]
    pub use_path_style: bool,
    /// Explicit AWS access key (falls back to env/credential chain).
    #[serde(default)]
    pub access_key_id: String,
    /// Explicit AWS secret key (falls back to env/credential chain).
    #[serde(default)]
    pub secret_access_key: String,
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_refresh_interval() -> u64 {
    300
}

fn default_key_strategy() -> String {
    "global".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_storage_backend() -> String {
    "aws".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_storage_root() -> String {
    "./data/registry".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Validation --------------------------------------------------------------

impl Config {
    /// Reject configurations that cannot serve requests.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.registry.hostname.trim().is_empty() {
            anyhow::bail!("registry.hostname must be set");
        }

        let keys = &self.registry.signing_keys;
        match keys.strategy.as_str() {
            "global" => {
                if keys.key_id.is_empty() || keys.keyfile.is_empty() {
                    anyhow::bail!(
                        "registry.signing_keys.strategy is 'global' but key_id or keyfile is missing"
                    );
                }
            }
            "per_artifact" => {}
            other => anyhow::bail!("unknown registry.signing_keys.strategy '{other}'"),
        }

        match self.storage.backend.as_str() {
            "aws" => {
                if self.storage.aws.is_none() {
                    anyhow::bail!("storage.backend is 'aws' but storage.aws config section is missing");
                }
            }
            "local" => {}
            other => anyhow::bail!("unknown storage.backend '{other}'"),
        }

        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => anyhow::bail!("unknown logging.format '{other}'"),
        }
    }
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
