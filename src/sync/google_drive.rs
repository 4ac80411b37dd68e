//! Google Drive client - file listing and content transfer through REST API v3.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Google Drive API endpoints
const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";

/// Non-trashed files directly under "My Drive".
pub const ROOT_FILES_QUERY: &str = "'root' in parents and trashed=false";

/// Google Drive file metadata
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
}

/// Response from files.list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    pub next_page_token: Option<String>,
}

/// The three Drive capabilities the database sync needs.
pub trait DriveClient {
    /// All non-trashed files in the root folder, in listing order.
    fn list_root_files(&self) -> Result<Vec<DriveFile>>;

    /// Writes the content of `file` to `dest`.
    fn download(&self, file: &DriveFile, dest: &Path) -> Result<()>;

    /// Replaces the content of `file` with the bytes at `src`, keeping its id.
    fn update_content(&self, file: &DriveFile, src: &Path) -> Result<DriveFile>;
}

/// Drive client authenticated with an OAuth access token.
pub struct GoogleDrive {
    client: reqwest::blocking::Client,
    access_token: String,
}

impl GoogleDrive {
    pub fn new(client: reqwest::blocking::Client, access_token: String) -> Self {
        Self {
            client,
            access_token,
        }
    }

    fn list_page(&self, page_token: Option<&str>) -> Result<DriveFileList> {
        let mut query = vec![
            ("q", ROOT_FILES_QUERY),
            ("fields", "nextPageToken, files(id, name, mimeType)"),
            ("pageSize", "1000"),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let response = self
            .client
            .get(DRIVE_FILES_URL)
            .query(&query)
            .bearer_auth(&self.access_token)
            .send()
            .context("Failed to list files")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            bail!("Drive API error {}: {}", status, body);
        }

        response.json().context("Cannot parse file list response")
    }
}

impl DriveClient for GoogleDrive {
    fn list_root_files(&self) -> Result<Vec<DriveFile>> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_page(page_token.as_deref())?;
            debug!("Listed {} files from Drive root", page.files.len());
            files.extend(page.files);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(files)
    }

    fn download(&self, file: &DriveFile, dest: &Path) -> Result<()> {
        let url = format!("{}/{}", DRIVE_FILES_URL, file.id);
        let response = self
            .client
            .get(&url)
            .query(&[("alt", "media")])
            .bearer_auth(&self.access_token)
            .send()
            .with_context(|| format!("Failed to download {}", file.name))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            bail!("Failed to download {}: {} - {}", file.name, status, body);
        }

        let bytes = response.bytes()?;
        fs::write(dest, &bytes)
            .with_context(|| format!("Cannot write {}", dest.display()))?;
        Ok(())
    }

    fn update_content(&self, file: &DriveFile, src: &Path) -> Result<DriveFile> {
        let content =
            fs::read(src).with_context(|| format!("Cannot read {}", src.display()))?;

        let url = format!("{}/{}", DRIVE_UPLOAD_URL, file.id);
        let content_type = if file.mime_type.is_empty() {
            "application/octet-stream"
        } else {
            file.mime_type.as_str()
        };
        let response = self
            .client
            .patch(&url)
            .query(&[("uploadType", "media")])
            .bearer_auth(&self.access_token)
            .header("Content-Type", content_type)
            .body(content)
            .send()
            .with_context(|| format!("Failed to update {}", file.name))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            bail!("Failed to update {}: {} - {}", file.name, status, body);
        }

        response.json().context("Cannot parse update response")
    }
}
