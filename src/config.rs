//! Configuration system.
//!
//! Hierarchical loading:
//! - `taxinomia.toml` (base configuration)
//! - `taxinomia.local.toml` (git-ignored local overrides)
//! - Environment variables (`TAXINOMIA_*` prefix, `__` section separator)
//!
//! ## Example
//!
//! ```toml
//! [server]
//! addr = "0.0.0.0:8080"
//! path_prefix = "/taxinomia"
//!
//! [[dataset]]
//! name = "orders"
//! csv = "data/orders.csv"
//! schema = "data/orders.schema.toml"
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Datasets to ingest at startup.
    #[serde(default)]
    pub dataset: Vec<DatasetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Path prefix all routes live under, e.g. `/taxinomia`.
    #[serde(default)]
    pub path_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-request cooperative timeout in milliseconds (0 = none).
    #[serde(default)]
    pub query_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// One CSV dataset plus its optional column-annotation schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub csv: PathBuf,
    /// TOML column annotations (types, display names, entity types).
    #[serde(default)]
    pub schema: Option<PathBuf>,
    /// Domains allowed to see this table; empty means public.
    #[serde(default)]
    pub domains: Vec<String>,
}

fn default_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig { addr: default_addr(), path_prefix: String::new() }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig { query_timeout_ms: 0 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: default_log_level(), format: default_log_format() }
    }
}

impl Config {
    /// Load configuration from the default locations.
    ///
    /// Merges in order: `taxinomia.toml`, `taxinomia.local.toml`, then
    /// `TAXINOMIA_*` environment variables.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("taxinomia.toml"))
            .merge(Toml::file("taxinomia.local.toml"))
            .merge(Env::prefixed("TAXINOMIA_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &std::path::Path) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("TAXINOMIA_").split("__"))
            .extract()
    }
}
