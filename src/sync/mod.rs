//! Sync module - keeps `{repo}_views.db` in step with Google Drive.
//!
//! This module contains:
//! - the Drive REST client
//! - Google OAuth with a loopback redirect and cached credentials
//! - the download / work / upload wrapper around traffic collection

pub mod database;
pub mod google_drive;
pub mod oauth;

pub use database::{collect, download_database, find_database, upload_database, view};
pub use google_drive::{DriveClient, DriveFile, GoogleDrive};
pub use oauth::{Authenticator, DriveCredentials, LocalWebserverAuth};
