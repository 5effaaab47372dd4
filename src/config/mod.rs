//! Daemon configuration.
//!
//! Precedence, lowest to highest: built-in defaults, `config.toml` in the
//! data directory, CLI flags / environment variables. All handles (store,
//! queue, artifact paths) are constructed once at startup from this config
//! and passed down explicitly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::dispatch::DispatchConfig;

const DEFAULT_PORT: u16 = 8058;
const DEFAULT_WORKERS: usize = 5;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_STALE_AGE_SECS: u64 = 600;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_API_KEY: &str = "default-key-change-me";

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Which queue backend to run (`[queue]` in config.toml).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// Durable filesystem queue — survives crashes and restarts.
    Fs,
    /// In-memory queue — single-process, lost on restart.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    /// Queue directory for the fs backend. Defaults to `<data_dir>/queue`.
    pub dir: Option<PathBuf>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Fs,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub workers: usize,
    pub poll_interval_ms: u64,
    pub stale_age_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            stale_age_secs: DEFAULT_STALE_AGE_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl DispatchSettings {
    pub fn to_dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            workers: self.workers.max(1),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            stale_age: Duration::from_secs(self.stale_age_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }
}

/// `config.toml` shape. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TomlConfig {
    port: Option<u16>,
    bind_address: Option<String>,
    app_url: Option<String>,
    storage_path: Option<PathBuf>,
    api_keys: Option<Vec<String>>,
    queue: QueueConfig,
    dispatch: DispatchSettings,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub port: u16,
    pub bind_address: String,
    /// Public base URL used in artifact retrieval links.
    pub app_url: String,
    pub data_dir: PathBuf,
    /// Root directory for artifacts; each job writes into a subdirectory.
    pub storage_path: PathBuf,
    /// Static API key allow-list.
    pub api_keys: Vec<String>,
    pub queue: QueueConfig,
    pub dispatch: DispatchSettings,
}

impl DaemonConfig {
    /// Build the effective config. CLI-provided values win over config.toml,
    /// which wins over defaults.
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        bind_address: Option<String>,
        api_keys: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let bind_address = bind_address
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);
        let app_url = toml
            .app_url
            .unwrap_or_else(|| format!("http://localhost:{port}"));
        let storage_path = toml
            .storage_path
            .unwrap_or_else(|| data_dir.join("artifacts"));

        let api_keys: Vec<String> = api_keys
            .map(|keys| keys.split(',').map(|k| k.trim().to_string()).collect())
            .or(toml.api_keys)
            .unwrap_or_else(|| vec![DEFAULT_API_KEY.to_string()]);
        if api_keys.iter().any(|k| k == DEFAULT_API_KEY) {
            warn!("using the default API key — set ORBITAL_API_KEYS before exposing this daemon");
        }

        Self {
            port,
            bind_address,
            app_url,
            data_dir,
            storage_path,
            api_keys,
            queue: toml.queue,
            dispatch: toml.dispatch,
        }
    }

    /// Effective queue directory for the fs backend.
    pub fn queue_dir(&self) -> PathBuf {
        self.queue
            .dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("queue"))
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".orbital")
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let text = std::fs::read_to_string(&path).ok()?;
    match toml::from_str(&text) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            warn!(path = %path.display(), err = %e, "ignoring unparseable config.toml");
            None
        }
    }
}
