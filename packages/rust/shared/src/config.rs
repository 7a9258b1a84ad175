//! Application configuration for SiteForge.
//!
//! User config lives at `~/.siteforge/siteforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteForgeError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "siteforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".siteforge";

// ---------------------------------------------------------------------------
// Config structs (matching siteforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Completion-service settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Capability catalog settings.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// CMS (publish target) settings.
    #[serde(default)]
    pub cms: CmsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Database path for the checkpoint store.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Number of generation workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Backlog capacity of the generation queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Estimated generation time reported by the trigger, in seconds.
    #[serde(default = "default_estimated_seconds")]
    pub estimated_time_seconds: u64,

    /// Heartbeat age in minutes after which a non-terminal run counts as
    /// stalled.
    #[serde(default = "default_stall_minutes")]
    pub stall_threshold_minutes: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            estimated_time_seconds: default_estimated_seconds(),
            stall_threshold_minutes: default_stall_minutes(),
        }
    }
}

fn default_db_path() -> String {
    "~/.siteforge/siteforge.db".into()
}
fn default_workers() -> usize {
    2
}
fn default_queue_capacity() -> usize {
    16
}
fn default_estimated_seconds() -> u64 {
    180
}
fn default_stall_minutes() -> u64 {
    15
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model to use for planning and content generation.
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the OpenAI-compatible completion endpoint.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Per-call timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_llm_base_url(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4.5".into()
}
fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_llm_timeout() -> u64 {
    120
}

/// `[catalog]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Base URL of the CMS capability-catalog endpoint.
    #[serde(default = "default_catalog_base_url")]
    pub base_url: String,

    /// Cache time-to-live in hours.
    #[serde(default = "default_catalog_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_catalog_base_url(),
            ttl_hours: default_catalog_ttl_hours(),
        }
    }
}

fn default_catalog_base_url() -> String {
    "https://cms.example.com/api".into()
}
fn default_catalog_ttl_hours() -> u64 {
    24
}

/// `[cms]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmsConfig {
    /// Base URL of the publish/deploy endpoint.
    #[serde(default = "default_cms_base_url")]
    pub base_url: String,
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            base_url: default_cms_base_url(),
        }
    }
}

fn default_cms_base_url() -> String {
    "https://cms.example.com/api".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.siteforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SiteForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.siteforge/siteforge.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| SiteForgeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SiteForgeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SiteForgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SiteForgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SiteForgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the completion-service API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.llm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(SiteForgeError::config(format!(
            "completion-service API key not found. Set the {var_name} environment variable."
        ))),
    }
}
