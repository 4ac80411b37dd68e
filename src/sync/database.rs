//! Download / work / upload wrapper around the views database.

use super::google_drive::DriveFile;
use crate::session::Session;
use crate::traffic::TrafficStats;
use crate::utils::spinner;
use anyhow::Result;
use colored::Colorize;
use tracing::{info, warn};

/// First file in listing order named `name`; later duplicates are ignored.
pub fn find_database<'a>(files: &'a [DriveFile], name: &str) -> Option<&'a DriveFile> {
    files.iter().find(|file| file.name == name)
}

fn locate(session: &Session) -> Result<Option<DriveFile>> {
    let name = session.database_name();
    let files = session.drive.list_root_files()?;
    let found = find_database(&files, &name).cloned();

    if found.is_none() {
        warn!("{} not found in Drive root", name);
    }
    Ok(found)
}

/// Downloads the remote database next to the config file.
///
/// Returns the remote file, or `None` when Drive has no such file; the local
/// file is left untouched in that case.
pub fn download_database(session: &Session) -> Result<Option<DriveFile>> {
    let Some(file) = locate(session)? else {
        return Ok(None);
    };

    let progress = spinner(&format!("Downloading {}...", file.name))?;
    let result = session.drive.download(&file, &session.database_path());
    progress.finish_and_clear();
    result?;

    info!("Downloaded {} ({})", file.name, file.id);
    Ok(Some(file))
}

/// Overwrites the remote database with the local one.
///
/// Nothing is created on Drive when the remote file does not exist, so local
/// changes stay local.
pub fn upload_database(session: &Session) -> Result<Option<DriveFile>> {
    let Some(file) = locate(session)? else {
        return Ok(None);
    };

    let progress = spinner(&format!("Uploading {}...", file.name))?;
    let result = session.drive.update_content(&file, &session.database_path());
    progress.finish_and_clear();
    let updated = result?;

    info!("Uploaded {} ({})", updated.name, updated.id);
    Ok(Some(updated))
}

pub fn view(session: &Session, stats: &dyn TrafficStats) -> Result<()> {
    download_database(session)?;
    stats.view(&session.github.repo)
}

/// Downloads, collects new traffic, uploads.
///
/// The upload runs whether or not collection added data; it does not run
/// when collection fails.
pub fn collect(session: &Session, stats: &dyn TrafficStats) -> Result<()> {
    download_database(session)?;

    let github = &session.github;
    println!(
        "{}",
        format!("Collecting traffic for {}/{}...", github.username, github.repo).cyan()
    );
    stats.collect(&github.username, &github.repo, &github.access_token, None)?;

    if upload_database(session)?.is_some() {
        println!("  {} Synced {} to Google Drive", "✓".green(), session.database_name());
    }
    Ok(())
}
