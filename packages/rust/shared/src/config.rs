//! Application configuration for contentmirror.
//!
//! User config lives at `~/.contentmirror/contentmirror.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ContentMirrorError, Result};
use crate::types::{Query, ReleaseId};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "contentmirror.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".contentmirror";

/// File whose presence marks an active preview session.
const PREVIEW_COOKIE_FILE_NAME: &str = "preview-cookie";

// ---------------------------------------------------------------------------
// Config structs (matching contentmirror.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Registered remote repositories.
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root directory for materialized document databases.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Endpoint template applied when a repository has no explicit
    /// endpoint. `{repository}` is substituted with the repository name.
    #[serde(default = "default_endpoint_template")]
    pub endpoint_template: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            endpoint_template: default_endpoint_template(),
        }
    }
}

fn default_data_dir() -> String {
    "~/.contentmirror/data".into()
}
fn default_endpoint_template() -> String {
    "https://{repository}.cdn.contentmirror.dev/api/v2".into()
}

/// `[[repositories]]` entry — one remote content repository to mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Repository name (also the default endpoint subdomain).
    pub name: String,

    /// Explicit API endpoint, overriding the endpoint template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Name of the env var holding the access token (never store the
    /// token itself).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_env: Option<String>,

    /// Staged release to target instead of the published master.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_id: Option<ReleaseId>,

    /// Link fields to resolve server-side on fetch.
    #[serde(default)]
    pub fetch_links: Vec<String>,

    /// Language filter; absent means all languages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,

    /// Predicate expressions selecting the documents to mirror.
    #[serde(default)]
    pub predicates: Vec<Query>,

    /// Directory of custom type schema JSON files for this repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schemas_dir: Option<String>,
}

impl RepositoryConfig {
    /// Resolve the API endpoint URL for this repository.
    pub fn endpoint_url(&self, template: &str) -> Result<Url> {
        let raw = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => template.replace("{repository}", &self.name),
        };
        Url::parse(&raw).map_err(|e| {
            ContentMirrorError::config(format!("invalid endpoint '{raw}': {e}"))
        })
    }

    /// Read the access token from the configured env var, if any.
    /// A configured env var that is unset or empty is a config error,
    /// never a silent fallback to anonymous access.
    pub fn access_token(&self) -> Result<Option<String>> {
        match &self.access_token_env {
            None => Ok(None),
            Some(var_name) => match std::env::var(var_name) {
                Ok(val) if !val.is_empty() => Ok(Some(val)),
                _ => Err(ContentMirrorError::config(format!(
                    "access token not found. Set the {var_name} environment variable."
                ))),
            },
        }
    }
}

/// Look up a registered repository by name.
pub fn find_repository<'a>(
    config: &'a AppConfig,
    name: &str,
) -> Result<&'a RepositoryConfig> {
    config
        .repositories
        .iter()
        .find(|r| r.name == name)
        .ok_or_else(|| {
            ContentMirrorError::config(format!(
                "repository '{name}' is not registered in {CONFIG_FILE_NAME}"
            ))
        })
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.contentmirror/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ContentMirrorError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.contentmirror/contentmirror.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Path of the preview session cookie file. Only its presence matters.
pub fn preview_cookie_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(PREVIEW_COOKIE_FILE_NAME))
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
    let content = std::fs::read_to_string(path).map_err(|e| ContentMirrorError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ContentMirrorError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ContentMirrorError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ContentMirrorError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ContentMirrorError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| {
            ContentMirrorError::config("could not determine home directory")
        })?;
        Ok(home.join(rest))
    } else {
        Ok(PathBuf::from(path))
    }
}
