//! Session bootstrap - turns the stored configuration into an authenticated
//! Drive session paired with the GitHub settings.

use crate::config::{ClientConfig, Config, ConfigStore, GithubConfig, MissingConfig};
use crate::sync::{Authenticator, DriveClient};
use crate::traffic::database_file_name;
use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

/// Authenticated handle valid for one invocation.
pub struct Session {
    pub drive: Box<dyn DriveClient>,
    pub github: GithubConfig,
    workdir: PathBuf,
}

impl Session {
    pub fn new(drive: Box<dyn DriveClient>, github: GithubConfig, workdir: PathBuf) -> Self {
        Self {
            drive,
            github,
            workdir,
        }
    }

    /// `{repo}_views.db`
    pub fn database_name(&self) -> String {
        database_file_name(&self.github.repo)
    }

    pub fn database_path(&self) -> PathBuf {
        self.workdir.join(self.database_name())
    }
}

/// Result of trying to start a session from the stored configuration.
pub enum Bootstrap {
    Ready(Session),
    Unconfigured(MissingConfig),
}

/// Inputs collected by the configuration walkthrough.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureParams {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub repo: String,
    pub access_token: String,
}

/// Writes a fresh configuration and authenticates with it.
pub fn configure(
    store: &ConfigStore,
    auth: &dyn Authenticator,
    params: ConfigureParams,
) -> Result<Session> {
    let config = Config::new(
        ClientConfig {
            client_id: params.client_id,
            client_secret: params.client_secret,
        },
        GithubConfig {
            username: params.username,
            repo: params.repo,
            access_token: params.access_token,
        },
    );
    store.save(&config)?;
    info!("Saved configuration to {}", store.config_path().display());

    match load_and_authenticate(store, auth)? {
        Bootstrap::Ready(session) => Ok(session),
        Bootstrap::Unconfigured(missing) => {
            anyhow::bail!("Configuration vanished right after saving ({:?})", missing)
        }
    }
}

/// Loads the configuration and authenticates.
///
/// A missing file or GitHub section is reported as
/// [`Bootstrap::Unconfigured`]; every other failure is an error.
pub fn load_and_authenticate(store: &ConfigStore, auth: &dyn Authenticator) -> Result<Bootstrap> {
    let (config, github) = match store.load_github() {
        Ok(loaded) => loaded,
        Err(err) => match err.missing() {
            Some(missing) => return Ok(Bootstrap::Unconfigured(missing)),
            None => return Err(err.into()),
        },
    };

    let drive = auth.authenticate(&config, &store.credentials_path(&config))?;
    Ok(Bootstrap::Ready(Session::new(
        drive,
        github,
        store.root().to_path_buf(),
    )))
}

/// Points the configuration at another repository, keeping the token.
pub fn update_github_section(store: &ConfigStore, username: &str, repo: &str) -> Result<()> {
    let (mut config, mut github) = store.load_github()?;
    github.username = username.to_string();
    github.repo = repo.to_string();
    config.github = Some(github);

    store.save(&config)?;
    info!("Now collecting stats for {}/{}", username, repo);
    Ok(())
}
