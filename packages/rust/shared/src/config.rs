//! Application configuration for macroharvest.
//!
//! User config lives at `~/.macroharvest/macroharvest.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "macroharvest.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".macroharvest";

/// Largest response body a fetch will buffer, unless configured otherwise.
pub const DEFAULT_MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Config structs (matching macroharvest.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Harvest defaults.
    #[serde(default)]
    pub harvest: HarvestSection,
}

/// `[harvest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestSection {
    /// Root directory of the content-addressed sample store.
    #[serde(default = "default_storage_root")]
    pub storage_root: String,

    /// Number of candidates per batch handed to a worker.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Workers spawned per available CPU.
    #[serde(default = "default_workers_per_cpu")]
    pub workers_per_cpu: usize,

    /// Fixed worker count, overriding `workers_per_cpu` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Responses larger than this many bytes are dropped as fetch errors.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,

    /// Accept invalid TLS certificates (many hosting sites serve broken chains).
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// User-Agent header sent with every fetch.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HarvestSection {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            batch_size: default_batch_size(),
            workers_per_cpu: default_workers_per_cpu(),
            workers: None,
            fetch_timeout_secs: default_fetch_timeout(),
            max_body_bytes: default_max_body_bytes(),
            accept_invalid_certs: false,
            user_agent: default_user_agent(),
        }
    }
}

fn default_storage_root() -> String {
    "./samples".into()
}
fn default_batch_size() -> usize {
    15
}
fn default_workers_per_cpu() -> usize {
    1
}
fn default_fetch_timeout() -> u64 {
    30
}
fn default_max_body_bytes() -> u64 {
    DEFAULT_MAX_BODY_BYTES
}
fn default_user_agent() -> String {
    concat!("macroharvest/", env!("CARGO_PKG_VERSION")).into()
}

// ---------------------------------------------------------------------------
// Harvest config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime harvest configuration: merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Root of the content-addressed store.
    pub storage_root: PathBuf,
    /// Candidates per batch.
    pub batch_size: usize,
    /// Workers per available CPU.
    pub workers_per_cpu: usize,
    /// Fixed worker count; wins over `workers_per_cpu`.
    pub workers: Option<usize>,
    /// Per-request timeout.
    pub fetch_timeout: Duration,
    /// Upper bound on a fetched body.
    pub max_body_bytes: u64,
    /// Skip TLS certificate verification.
    pub accept_invalid_certs: bool,
    /// User-Agent header for fetches.
    pub user_agent: String,
}

impl From<&AppConfig> for HarvestConfig {
    fn from(config: &AppConfig) -> Self {
        let section = &config.harvest;
        Self {
            storage_root: expand_home(&section.storage_root),
            batch_size: section.batch_size,
            workers_per_cpu: section.workers_per_cpu,
            workers: section.workers,
            fetch_timeout: Duration::from_secs(section.fetch_timeout_secs),
            max_body_bytes: section.max_body_bytes,
            accept_invalid_certs: section.accept_invalid_certs,
            user_agent: section.user_agent.clone(),
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl HarvestConfig {
    /// Number of workers to spawn: the fixed count if configured, otherwise
    /// host parallelism times `workers_per_cpu`. Fails if that product overflows.
    pub fn worker_count(&self) -> Result<usize> {
        match self.workers {
            Some(fixed) => Ok(fixed),
            None => num_cpus::get()
                .checked_mul(self.workers_per_cpu)
                .ok_or_else(|| {
                    HarvestError::config(format!(
                        "workers_per_cpu = {} overflows the worker count",
                        self.workers_per_cpu
                    ))
                }),
        }
    }

    /// Reject settings that would make the run meaningless.
    ///
    /// Store root reachability is checked when the store is opened.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(HarvestError::validation(
                "batch size must be greater than zero",
            ));
        }
        if self.worker_count()? == 0 {
            return Err(HarvestError::config(
                "worker count must be greater than zero (check workers / workers_per_cpu)",
            ));
        }
        if self.fetch_timeout.is_zero() {
            return Err(HarvestError::config(
                "fetch timeout must be greater than zero",
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(HarvestError::config(
                "max body size must be greater than zero",
            ));
        }
        if self.storage_root.as_os_str().is_empty() {
            return Err(HarvestError::config("storage root must not be empty"));
        }
        Ok(())
    }
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.macroharvest/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| HarvestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.macroharvest/macroharvest.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HarvestError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        HarvestError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HarvestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| HarvestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HarvestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("storage_root"));
        assert!(toml_str.contains("batch_size = 15"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.harvest.batch_size, 15);
        assert_eq!(parsed.harvest.workers_per_cpu, 1);
        assert!(parsed.harvest.workers.is_none());
    }

    #[test]
    fn partial_section_uses_defaults() {
        let toml_str = r#"
[harvest]
storage_root = "/srv/samples"
workers = 8
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.harvest.storage_root, "/srv/samples");
        assert_eq!(config.harvest.workers, Some(8));
        assert_eq!(config.harvest.batch_size, 15);
        assert_eq!(config.harvest.fetch_timeout_secs, 30);
    }

    #[test]
    fn harvest_config_from_app_config() {
        let app = AppConfig::default();
        let harvest = HarvestConfig::from(&app);
        assert_eq!(harvest.batch_size, 15);
        assert_eq!(harvest.fetch_timeout, Duration::from_secs(30));
        assert_eq!(harvest.storage_root, PathBuf::from("./samples"));
        assert_eq!(harvest.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert!(harvest.worker_count().unwrap() >= 1);
    }

    #[test]
    fn fixed_worker_count_wins() {
        let harvest = HarvestConfig {
            workers: Some(3),
            workers_per_cpu: 64,
            ..HarvestConfig::default()
        };
        assert_eq!(harvest.worker_count().unwrap(), 3);
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let harvest = HarvestConfig {
            batch_size: 0,
            ..HarvestConfig::default()
        };
        let err = harvest.validate().unwrap_err();
        assert!(err.to_string().contains("batch size"));
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let harvest = HarvestConfig {
            workers: Some(0),
            ..HarvestConfig::default()
        };
        assert!(matches!(
            harvest.validate(),
            Err(HarvestError::Config { .. })
        ));
    }

    #[test]
    fn validate_rejects_worker_overflow() {
        let harvest = HarvestConfig {
            workers_per_cpu: usize::MAX,
            ..HarvestConfig::default()
        };
        assert!(matches!(
            harvest.worker_count(),
            Err(HarvestError::Config { .. })
        ));
        let err = harvest.validate().unwrap_err();
        assert!(err.to_string().contains("overflows"), "{err}");
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let toml_str = r#"
[harvest]
fetch_timeout_secs = 0
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        let err = HarvestConfig::from(&config).validate().unwrap_err();
        assert!(matches!(err, HarvestError::Config { .. }));
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn validate_rejects_zero_body_limit() {
        let harvest = HarvestConfig {
            max_body_bytes: 0,
            ..HarvestConfig::default()
        };
        assert!(matches!(
            harvest.validate(),
            Err(HarvestError::Config { .. })
        ));
    }

    #[test]
    fn default_config_is_valid() {
        assert!(HarvestConfig::default().validate().is_ok());
    }

    #[test]
    fn home_prefix_is_expanded() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/samples"), home.join("samples"));
        }
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
    }
}
