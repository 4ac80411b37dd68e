//! Config module - manages `settings.yaml`.
//!
//! The config file holds:
//! - Google Drive OAuth client credentials and credential caching settings
//! - GitHub username, repo and access token used to collect traffic stats

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file name, resolved against the store directory.
pub const CONFIG_FILE_NAME: &str = "settings.yaml";

/// Default credential cache file written by the auth flow.
pub const DEFAULT_CREDENTIALS_FILE: &str = "creds.json";

/// Full Google Drive access, needed to overwrite files in the root folder.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("config file has no github section: {}", .0.display())]
    MissingGithub(PathBuf),

    #[error("cannot read config file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("cannot write config file {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize config to YAML")]
    Serialize(#[source] serde_yaml::Error),
}

/// Which part of the configuration is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingConfig {
    File,
    GithubSection,
}

impl ConfigError {
    /// Returns the missing-config kind, or `None` for real failures.
    pub fn missing(&self) -> Option<MissingConfig> {
        match self {
            ConfigError::Missing(_) => Some(MissingConfig::File),
            ConfigError::MissingGithub(_) => Some(MissingConfig::GithubSection),
            _ => None,
        }
    }
}

/// OAuth client registered in the Google Cloud console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Repository whose traffic is collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubConfig {
    pub username: String,
    pub repo: String,
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Where the OAuth client comes from; only `settings` is supported
    #[serde(default = "default_client_config_backend")]
    pub client_config_backend: String,

    pub client_config: ClientConfig,

    #[serde(default = "default_save_credentials")]
    pub save_credentials: bool,

    #[serde(default = "default_save_credentials_backend")]
    pub save_credentials_backend: String,

    #[serde(default = "default_save_credentials_file")]
    pub save_credentials_file: String,

    #[serde(default = "default_oauth_scope")]
    pub oauth_scope: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GithubConfig>,
}

fn default_client_config_backend() -> String {
    "settings".to_string()
}

fn default_save_credentials() -> bool {
    true
}

fn default_save_credentials_backend() -> String {
    "file".to_string()
}

fn default_save_credentials_file() -> String {
    DEFAULT_CREDENTIALS_FILE.to_string()
}

fn default_oauth_scope() -> Vec<String> {
    vec![DRIVE_SCOPE.to_string()]
}

impl Config {
    /// Builds a config with default auth settings around the given credentials.
    pub fn new(client_config: ClientConfig, github: GithubConfig) -> Self {
        Self {
            client_config_backend: default_client_config_backend(),
            client_config,
            save_credentials: default_save_credentials(),
            save_credentials_backend: default_save_credentials_backend(),
            save_credentials_file: default_save_credentials_file(),
            oauth_scope: default_oauth_scope(),
            github: Some(github),
        }
    }

    /// Whether the auth flow should cache credentials in a file.
    pub fn caches_credentials_in_file(&self) -> bool {
        self.save_credentials && self.save_credentials_backend == "file"
    }
}

/// Loads and saves [`Config`] under a fixed root directory.
///
/// The same directory hosts the credential cache and the local database
/// file, so every path the tool touches is resolved through the store.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: PathBuf,
}

impl ConfigStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at the current working directory.
    pub fn current_dir() -> Self {
        Self::new(".")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    /// Resolves the credential cache file named in `config`.
    pub fn credentials_path(&self, config: &Config) -> PathBuf {
        self.root.join(&config.save_credentials_file)
    }

    pub fn load(&self) -> Result<Config, ConfigError> {
        let path = self.config_path();
        if !path.exists() {
            return Err(ConfigError::Missing(path));
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Loads the config and requires its GitHub section.
    pub fn load_github(&self) -> Result<(Config, GithubConfig), ConfigError> {
        let config = self.load()?;
        match config.github.clone() {
            Some(github) => Ok((config, github)),
            None => Err(ConfigError::MissingGithub(self.config_path())),
        }
    }

    /// Overwrites the config file with `config`.
    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let path = self.config_path();
        let content = serde_yaml::to_string(config).map_err(ConfigError::Serialize)?;
        std::fs::write(&path, content).map_err(|source| ConfigError::Write { path, source })
    }
}
