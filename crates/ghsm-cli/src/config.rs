use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use ghsm_github::GitHubConfig;
use serde::{Deserialize, Serialize};

/// User-level configuration loaded from `~/.config/ghsm/config.toml` (platform-specific).
#[derive(Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// API base URL override (GitHub Enterprise Server).
    pub api_base: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Fallback access token when none is found in the environment.
    pub token: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Config {
    /// Connection settings for one run; a CLI `api_base` wins over the file.
    pub fn github_config(&self, token: String, api_base: Option<String>) -> GitHubConfig {
        GitHubConfig {
            token,
            api_base: api_base.or_else(|| self.api_base.clone()),
            timeout_secs: self.timeout_secs,
        }
    }
}

/// Resolve the access token: the named variable, then `GITHUB_TOKEN`, then the config file.
pub fn resolve_token(
    config: &Config,
    env_var: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    let non_empty = |value: String| (!value.trim().is_empty()).then_some(value);
    lookup(env_var)
        .and_then(non_empty)
        .or_else(|| lookup("GITHUB_TOKEN").and_then(non_empty))
        .or_else(|| config.token.clone().and_then(non_empty))
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("ghsm").join("config.toml"))
}

/// Write the given config to the default path unless a file already exists there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_to_path_if_missing(config, &default_path()?)
}

fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}
