//! Startup configuration.
//!
//! Sources, highest precedence first: CLI flags, the `BANTER_API_URL`
//! environment variable, `~/.banter/config.toml`. The file is read if
//! present and never created. A conversation cannot start without an
//! endpoint, so resolution fails before any UI comes up.

use crate::error::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the assistant base URL.
pub const ENDPOINT_ENV: &str = "BANTER_API_URL";

/// System prompt seeded into every fresh conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Resolved, validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Assistant base URL, normalized without a trailing slash.
    pub endpoint: String,
    /// Whole-exchange timeout applied to both request modes.
    pub request_timeout_secs: u64,
    /// Insert a blank line after each streamed fragment so paragraph
    /// boundaries survive concatenation.
    pub paragraph_breaks: bool,
    /// First turn of every conversation.
    pub system_prompt: String,
}

impl Config {
    /// Resolve configuration from file, environment, and CLI overrides.
    pub fn load(overrides: Overrides) -> Result<Self, ConfigError> {
        let path = config_path();
        let file = match path.as_deref() {
            Some(p) if p.exists() => read_file(p)?,
            _ => FileConfig::default(),
        };
        let env_endpoint = std::env::var(ENDPOINT_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty());
        Self::resolve(file, env_endpoint, overrides, &path_label(path.as_deref()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn resolve(
        file: FileConfig,
        env_endpoint: Option<String>,
        overrides: Overrides,
        path_label: &str,
    ) -> Result<Self, ConfigError> {
        let endpoint = overrides
            .endpoint
            .or(env_endpoint)
            .or(file.endpoint)
            .ok_or_else(|| ConfigError::MissingEndpoint {
                path: path_label.to_string(),
            })?;
        let endpoint = endpoint.trim().trim_end_matches('/').to_string();

        reqwest::Url::parse(&endpoint).map_err(|e| ConfigError::BadEndpoint {
            url: endpoint.clone(),
            detail: e.to_string(),
        })?;

        Ok(Self {
            endpoint,
            request_timeout_secs: overrides.timeout_secs.unwrap_or(file.request_timeout_secs),
            paragraph_breaks: file.paragraph_breaks,
            system_prompt: file.system_prompt,
        })
    }
}

/// CLI-supplied values that beat every other source.
#[derive(Debug, Default)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// On-disk schema. Every field is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    endpoint: Option<String>,
    request_timeout_secs: u64,
    paragraph_breaks: bool,
    system_prompt: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            paragraph_breaks: false,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".banter").join("config.toml"))
}

fn path_label(path: Option<&Path>) -> String {
    path.map_or_else(
        || "~/.banter/config.toml".to_string(),
        |p| p.display().to_string(),
    )
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Invalid {
        path: path.display().to_string(),
        source,
    })
}
