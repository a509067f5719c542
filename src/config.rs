//! Configuration management
//!
//! Manages server, store, object storage and ingestion settings. Secrets are
//! never written to disk; they come from the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::aliases::AliasTable;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Record store settings
    #[serde(default)]
    pub store: StoreConfig,
    /// Object storage (chart images)
    #[serde(default)]
    pub storage: StorageConfig,
    /// Bulk ingestion settings
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Field alias paths used when reading source documents
    #[serde(default)]
    pub aliases: AliasTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum accepted request body
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5174
}

fn default_body_limit() -> usize {
    10 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

/// Which record store backs the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Task documents under `data_dir`
    #[default]
    Json,
    /// The `examples` table in `database_path`
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Directory of `<task>.json` source documents
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// SQLite file; defaults to the project data directory
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// JSON backend only: persist `<task>.working.json` after every write
    #[serde(default)]
    pub snapshot_on_submit: bool,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("server/data")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            data_dir: default_data_dir(),
            database_path: None,
            snapshot_on_submit: false,
        }
    }
}

impl StoreConfig {
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("annotations.db")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Object storage base URL; `None` serves images from the local image root
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Key prefix for uploaded charts
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Whether the bucket serves public links
    #[serde(default = "default_true")]
    pub public: bool,
    /// Lifetime of signed links
    #[serde(default = "default_signed_ttl")]
    pub signed_url_ttl_secs: i64,
    /// Upload credential (env: STORAGE_SERVICE_KEY / SUPABASE_SERVICE_ROLE_KEY)
    #[serde(skip)]
    pub service_key: Option<String>,
    /// HS256 secret for signed links (env: STORAGE_SIGNING_SECRET / SUPABASE_JWT_SECRET)
    #[serde(skip)]
    pub signing_secret: Option<String>,
}

fn default_bucket() -> String {
    "charts".to_string()
}

fn default_prefix() -> String {
    "chart-only".to_string()
}

fn default_true() -> bool {
    true
}

fn default_signed_ttl() -> i64 {
    60 * 60 * 24 * 7
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            bucket: default_bucket(),
            prefix: default_prefix(),
            public: true,
            signed_url_ttl_secs: default_signed_ttl(),
            service_key: None,
            signing_secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Root of local chart images, `<task>/<example_id>.<ext>`
    #[serde(default = "default_image_root")]
    pub image_root: PathBuf,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First retry delay; doubles per attempt
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    /// Pause after each upload
    #[serde(default = "default_throttle")]
    pub throttle_ms: u64,
    /// Take a longer pause every N records
    #[serde(default = "default_pause_every")]
    pub pause_every: usize,
    #[serde(default = "default_pause")]
    pub pause_ms: u64,
    /// Copy the uploaded URL into the payload (`pdf_image_url`, `chart_image_url`)
    #[serde(default = "default_true")]
    pub embed_image_urls: bool,
    /// Side log of records that failed to ingest
    #[serde(default = "default_failures_file")]
    pub failures_file: PathBuf,
}

fn default_image_root() -> PathBuf {
    PathBuf::from("images/chart-only")
}

fn default_extensions() -> Vec<String> {
    [".png", ".jpg", ".jpeg", ".webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_delay() -> u64 {
    300
}

fn default_throttle() -> u64 {
    60
}

fn default_pause_every() -> usize {
    300
}

fn default_pause() -> u64 {
    1500
}

fn default_failures_file() -> PathBuf {
    PathBuf::from("upload_failures.json")
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            image_root: default_image_root(),
            extensions: default_extensions(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay(),
            throttle_ms: default_throttle(),
            pause_every: default_pause_every(),
            pause_ms: default_pause(),
            embed_image_urls: true,
            failures_file: default_failures_file(),
        }
    }
}

fn env_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load configuration from `path`, writing defaults there when absent
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&contents).context("Failed to parse config file")?
        } else {
            let config = Config::default();
            config.save_to(path)?;
            config
        };
        config.apply_env();
        Ok(config)
    }

    /// Pull secrets and endpoint overrides from the environment
    pub fn apply_env(&mut self) {
        if let Some(endpoint) = env_var(&["STORAGE_ENDPOINT", "SUPABASE_URL"]) {
            self.storage.endpoint = Some(endpoint);
        }
        if let Some(key) = env_var(&["STORAGE_SERVICE_KEY", "SUPABASE_SERVICE_ROLE_KEY"]) {
            self.storage.service_key = Some(key);
        }
        if let Some(secret) = env_var(&["STORAGE_SIGNING_SECRET", "SUPABASE_JWT_SECRET"]) {
            self.storage.signing_secret = Some(secret);
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "chartqa", "chartqa-annotate")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "chartqa", "chartqa-annotate")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}

/// Show current configuration
pub fn show_config(config: &Config, path: &Path) -> Result<()> {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("     ChartQA Annotate Configuration");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📁 Config file:   {}", path.display());
    println!("🌐 Server:        {}:{}", config.server.host, config.server.port);
    println!("🗄  Store:         {:?}", config.store.backend);
    println!("   data_dir:      {}", config.store.data_dir.display());
    println!("   database:      {}", config.store.database_path()?.display());
    println!("   snapshots:     {}", if config.store.snapshot_on_submit { "on" } else { "off" });
    println!(
        "🖼  Storage:       {} (bucket {}, {})",
        config.storage.endpoint.as_deref().unwrap_or("local images"),
        config.storage.bucket,
        if config.storage.public { "public" } else { "signed" }
    );
    println!(
        "   service key:   {}",
        config.storage.service_key.as_ref().map(|_| "set").unwrap_or("not set")
    );
    println!("📥 Image root:    {}", config.ingest.image_root.display());
    println!(
        "   retries:       {} (base delay {} ms)",
        config.ingest.max_retries, config.ingest.base_delay_ms
    );
    Ok(())
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[store]\nbackend = \"sqlite\"\n\n[server]\nport = 9000\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.ingest.max_retries, 5);
        assert_eq!(config.aliases.question[0], "question");
    }

    #[test]
    fn test_missing_file_is_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.storage.bucket, "charts");
    }

    #[test]
    fn test_default_toml_round_trips() {
        let parsed: Config = toml::from_str(&default_config_toml()).unwrap();
        assert_eq!(parsed.ingest.pause_every, 300);
        assert!(parsed.storage.service_key.is_none());
    }
}
