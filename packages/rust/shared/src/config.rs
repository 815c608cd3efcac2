//! Application configuration for Marginalia.
//!
//! User config lives at `~/.marginalia/marginalia.toml`.
//! CLI flags and environment variables override config file values, which
//! override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{MarginaliaError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "marginalia.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".marginalia";

// ---------------------------------------------------------------------------
// Config structs (matching marginalia.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// File locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Hardcover API settings.
    #[serde(default)]
    pub hardcover: HardcoverConfig,

    /// Extraction settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// E-reader SQLite database. Detected from mounted devices when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kobo_db: Option<String>,

    /// Local annotation store (flat JSON array).
    #[serde(default = "default_annotations_file")]
    pub annotations_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            kobo_db: None,
            annotations_file: default_annotations_file(),
        }
    }
}

fn default_annotations_file() -> String {
    "annotations.json".into()
}

/// `[hardcover]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardcoverConfig {
    /// GraphQL endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Name of the env var holding the API token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HardcoverConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.hardcover.app/v1/graphql".into()
}
fn default_token_env() -> String {
    "HARDCOVER_API_TOKEN".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[extraction]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Only bookmarks created at or after this timestamp are read.
    #[serde(default = "default_since")]
    pub since: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            since: default_since(),
        }
    }
}

fn default_since() -> String {
    "1970-01-01".into()
}

// ---------------------------------------------------------------------------
// Catalog settings (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Validated connection settings for the catalog service.
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    /// GraphQL endpoint.
    pub api_url: Url,
    /// Bearer token.
    pub token: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl CatalogSettings {
    /// Build settings from explicit overrides, falling back to `config`.
    ///
    /// A missing or empty token and an unparseable URL are configuration
    /// errors, reported before any network call is made.
    pub fn resolve(
        config: &AppConfig,
        token: Option<&str>,
        api_url: Option<&str>,
    ) -> Result<Self> {
        let token = match token.filter(|t| !t.trim().is_empty()) {
            Some(t) => t.trim().to_string(),
            None => token_from_env(config)?,
        };

        let raw_url = api_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(config.hardcover.api_url.as_str());
        let api_url = Url::parse(raw_url.trim())
            .map_err(|e| MarginaliaError::config(format!("invalid Hardcover API URL '{raw_url}': {e}")))?;

        Ok(Self {
            api_url,
            token,
            timeout: Duration::from_secs(config.hardcover.timeout_secs),
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.marginalia/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MarginaliaError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.marginalia/marginalia.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| MarginaliaError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        MarginaliaError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MarginaliaError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MarginaliaError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MarginaliaError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the API token from the env var named in the config.
pub fn token_from_env(config: &AppConfig) -> Result<String> {
    let var_name = &config.hardcover.token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(MarginaliaError::config(format!(
            "Hardcover API token not found. Pass --token or set the {var_name} environment variable.\n\
             Get a token at https://hardcover.app/account/api"
        ))),
    }
}
