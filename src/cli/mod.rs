//! CLI definitions and command implementations for gts-gdrive.

pub mod commands;
pub mod prompt;

pub use commands::{run, App};
pub use prompt::{Prompter, TerminalPrompter};

use clap::{Parser, ValueEnum};

/// Collect GitHub traffic stats into a database kept on Google Drive
#[derive(Parser)]
#[command(name = "gts-gdrive")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// What to do
    #[arg(value_enum)]
    pub action: Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Walk through Google Drive and GitHub configuration
    Config,
    /// Switch to another GitHub repository
    ConfigRepo,
    /// Fetch new traffic data and sync the database to Google Drive
    Collect,
    /// Show recorded traffic data
    View,
}
