//! Command implementations for the gts-gdrive CLI.
//!
//! - config: configuration walkthrough (Google Drive + GitHub)
//! - config-repo: point the configuration at another repository
//! - collect: download database, collect traffic, upload database
//! - view: download database, print recorded traffic

use super::prompt::Prompter;
use super::Action;
use crate::config::ConfigStore;
use crate::session::{self, Bootstrap, ConfigureParams, Session};
use crate::sync::{self, Authenticator};
use crate::traffic::TrafficStats;
use anyhow::Result;
use colored::Colorize;
use tracing::debug;

/// Collaborators shared by every command.
pub struct App<'a> {
    pub store: ConfigStore,
    pub auth: &'a dyn Authenticator,
    pub stats: &'a dyn TrafficStats,
    pub prompter: &'a dyn Prompter,
}

/// Runs one action.
///
/// Every action but `config` needs a session; when the configuration is
/// missing the walkthrough runs instead and the requested action is not.
pub fn run(action: Action, app: &App) -> Result<()> {
    if action == Action::Config {
        config_walkthrough(app)?;
        return Ok(());
    }

    let session = match session::load_and_authenticate(&app.store, app.auth)? {
        Bootstrap::Ready(session) => session,
        Bootstrap::Unconfigured(missing) => {
            debug!("Configuration missing ({:?}), skipping {:?}", missing, action);
            config_walkthrough(app)?;
            return Ok(());
        }
    };

    match action {
        Action::ConfigRepo => config_repo_walkthrough(app),
        Action::View => sync::view(&session, app.stats),
        Action::Collect => sync::collect(&session, app.stats),
        Action::Config => Ok(()),
    }
}

/// Collects credentials and repo details, saves them and authenticates.
pub fn config_walkthrough(app: &App) -> Result<Session> {
    println!("{}", "Welcome!".cyan().bold());
    println!("\nThis guide walks you through gts-gdrive configuration.");
    println!("You will be asked for the GitHub repo to fetch traffic data from,");
    println!("and for the Google Drive OAuth client used to store the stats database.");

    println!("\n{}", "Google Drive authentication".cyan().bold());
    println!("Create an OAuth client (type \"Desktop app\") in the Google Cloud console:");
    println!("  {}", "https://console.cloud.google.com/apis/credentials".blue());
    println!();
    let client_id = app.prompter.input("Google Drive client ID")?;
    let client_secret = app.prompter.secret("Google Drive client secret")?;

    println!("\n{}", "GitHub repository".cyan().bold());
    println!("Provide the repo and its owner (e.g. seladb/pcapplusplus),");
    println!("plus an access token with push access, required to read traffic data.");
    println!("Tokens can be created at:");
    println!("  {}", "https://github.com/settings/tokens".blue());
    println!();
    let repo = app.prompter.input("GitHub repo to collect stats from")?;
    let username = app.prompter.input("GitHub username of this repo")?;
    let access_token = app.prompter.secret("GitHub access token")?;

    let session = session::configure(
        &app.store,
        app.auth,
        ConfigureParams {
            client_id,
            client_secret,
            username,
            repo,
            access_token,
        },
    )?;

    println!(
        "\n  {} Configuration saved to {}",
        "✓".green(),
        app.store.config_path().display()
    );
    println!(
        "{}",
        "settings.yaml and creds.json hold your Google Drive and GitHub credentials.".yellow()
    );
    println!(
        "{}",
        "Do not delete or edit them, and be careful who you share them with.".yellow()
    );
    Ok(session)
}

/// Switches the configuration to another repository.
pub fn config_repo_walkthrough(app: &App) -> Result<()> {
    let repo = app.prompter.input("GitHub repo to collect stats from")?;
    let username = app.prompter.input("GitHub username of this repo")?;
    session::update_github_section(&app.store, &username, &repo)?;

    println!(
        "  {} Collecting stats for {}/{}",
        "✓".green(),
        username.cyan(),
        repo.cyan()
    );
    Ok(())
}
