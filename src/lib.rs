//! gts-gdrive library
//!
//! Keeps a GitHub traffic-stats database on Google Drive:
//! - `settings.yaml` with Google OAuth client and GitHub repo settings
//! - Google Drive session bootstrap (OAuth with loopback redirect)
//! - download / collect / upload of `{repo}_views.db`

pub mod cli;
pub mod config;
pub mod session;
pub mod sync;
pub mod traffic;
pub mod utils;

// Re-export main types
pub use config::{Config, ConfigError, ConfigStore, GithubConfig};
pub use session::{Bootstrap, Session};
pub use sync::{Authenticator, DriveClient, DriveFile};
pub use traffic::TrafficStats;
