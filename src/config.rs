//! Configuration for the dispatch engine.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (HEALYRI_HOME, HEALYRI_STORE)
//! 2. Config file (.healyri/config.yaml)
//! 3. Defaults (~/.healyri, ~/.healyri/store.json)
//!
//! Config file discovery:
//! - Searches current directory and parents for .healyri/config.yaml
//! - Paths in config file are relative to the .healyri/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const DEFAULT_DRIVER_RADIUS_KM: f64 = 50.0;
const DEFAULT_DRIVER_CANDIDATE_LIMIT: usize = 10;
const DEFAULT_FALLBACK_FACILITY_LIMIT: usize = 5;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub dispatch: Option<DispatchConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory
    pub home: Option<String>,
    /// Document store snapshot file
    pub store: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    pub driver_radius_km: Option<f64>,
    pub driver_candidate_limit: Option<usize>,
    pub fallback_facility_limit: Option<usize>,
}

/// Tunables for the dispatch algorithm
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    /// Drivers farther than this are never assigned
    pub driver_radius_km: f64,
    /// How many available drivers are fetched and ranked
    pub driver_candidate_limit: usize,
    /// How many facilities the degraded fallback fetches
    pub fallback_facility_limit: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            driver_radius_km: DEFAULT_DRIVER_RADIUS_KM,
            driver_candidate_limit: DEFAULT_DRIVER_CANDIDATE_LIMIT,
            fallback_facility_limit: DEFAULT_FALLBACK_FACILITY_LIMIT,
        }
    }
}

impl DispatchSettings {
    /// Overlay values from the config file onto the defaults
    pub fn from_config(config: Option<&DispatchConfig>) -> Result<Self> {
        let defaults = Self::default();
        let settings = match config {
            Some(c) => Self {
                driver_radius_km: c.driver_radius_km.unwrap_or(defaults.driver_radius_km),
                driver_candidate_limit: c
                    .driver_candidate_limit
                    .unwrap_or(defaults.driver_candidate_limit),
                fallback_facility_limit: c
                    .fallback_facility_limit
                    .unwrap_or(defaults.fallback_facility_limit),
            },
            None => defaults,
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.driver_radius_km.is_finite() || self.driver_radius_km < 0.0 {
            anyhow::bail!(
                "dispatch.driver_radius_km must be a non-negative number, got {}",
                self.driver_radius_km
            );
        }
        if self.driver_candidate_limit == 0 {
            anyhow::bail!("dispatch.driver_candidate_limit must be at least 1");
        }
        if self.fallback_facility_limit == 0 {
            anyhow::bail!("dispatch.fallback_facility_limit must be at least 1");
        }
        Ok(())
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Engine state directory
    pub home: PathBuf,
    /// Document store snapshot file
    pub store_path: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Dispatch tunables
    pub dispatch: DispatchSettings,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".healyri").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Combine env overrides, an optional config file and defaults
fn resolve(
    config_path: Option<&Path>,
    config: Option<ConfigFile>,
    env_home: Option<String>,
    env_store: Option<String>,
    default_home: PathBuf,
) -> Result<ResolvedConfig> {
    // Paths in the file are relative to the .healyri/ directory holding it
    let config_dir = config_path.and_then(Path::parent).unwrap_or(Path::new("."));
    let paths = config.as_ref().map(|c| c.paths.clone()).unwrap_or_default();

    let home = match (env_home, paths.home) {
        (Some(env), _) => PathBuf::from(env),
        (None, Some(home)) => resolve_path(config_dir, &home),
        (None, None) => default_home,
    };

    let store_path = match (env_store, paths.store) {
        (Some(env), _) => PathBuf::from(env),
        (None, Some(store)) => resolve_path(config_dir, &store),
        (None, None) => home.join("store.json"),
    };

    let dispatch = DispatchSettings::from_config(config.as_ref().and_then(|c| c.dispatch.as_ref()))?;

    Ok(ResolvedConfig {
        home,
        store_path,
        config_file: config_path.map(Path::to_path_buf),
        dispatch,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".healyri");

    let config_file = find_config_file();
    let config = match config_file.as_deref() {
        Some(path) => Some(load_config_file(path)?),
        None => None,
    };

    resolve(
        config_file.as_deref(),
        config,
        std::env::var("HEALYRI_HOME").ok(),
        std::env::var("HEALYRI_STORE").ok(),
        default_home,
    )
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the document store path
pub fn store_path() -> Result<PathBuf> {
    Ok(config()?.store_path.clone())
}
