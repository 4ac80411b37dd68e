//! gts-gdrive CLI - GitHub traffic stats synced through Google Drive.

use anyhow::Result;
use clap::Parser;
use gts_gdrive::cli::{self, App, Cli, TerminalPrompter};
use gts_gdrive::sync::LocalWebserverAuth;
use gts_gdrive::traffic::GithubTrafficStats;
use gts_gdrive::ConfigStore;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gts_gdrive=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let store = ConfigStore::current_dir();
    let auth = LocalWebserverAuth::new()?;
    let stats = GithubTrafficStats::new(store.root());
    let prompter = TerminalPrompter;

    cli::run(
        cli.action,
        &App {
            store,
            auth: &auth,
            stats: &stats,
            prompter: &prompter,
        },
    )
}
