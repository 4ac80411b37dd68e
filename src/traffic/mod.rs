//! Traffic module - collects GitHub repository views into `{repo}_views.db`
//! and prints what has been recorded.

pub mod github;
pub mod store;

pub use github::GithubTrafficClient;
pub use store::{DailyViews, RecordSummary, ViewsDb};

use anyhow::Result;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::info;

const BAR_WIDTH: usize = 30;

/// Local (and remote) file name of the views database for `repo`.
pub fn database_file_name(repo: &str) -> String {
    format!("{}_views.db", repo)
}

/// Traffic collector and viewer working on the database of a repo.
pub trait TrafficStats {
    /// Fetches current traffic for `org/repo` (or `user/repo` when `org` is
    /// `None`) and merges it into the database.
    fn collect(&self, user: &str, repo: &str, token: &str, org: Option<&str>) -> Result<()>;

    /// Prints the recorded traffic of `repo`.
    fn view(&self, repo: &str) -> Result<()>;
}

/// [`TrafficStats`] backed by the GitHub API and a SQLite file in `dir`.
pub struct GithubTrafficStats {
    dir: PathBuf,
    client: GithubTrafficClient,
}

impl GithubTrafficStats {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            client: GithubTrafficClient::new(),
        }
    }

    fn database_path(&self, repo: &str) -> PathBuf {
        self.dir.join(database_file_name(repo))
    }
}

impl TrafficStats for GithubTrafficStats {
    fn collect(&self, user: &str, repo: &str, token: &str, org: Option<&str>) -> Result<()> {
        let owner = org.unwrap_or(user);
        info!("Fetching traffic for {}/{}", owner, repo);

        let response = self.client.fetch_views(owner, repo, token)?;
        let mut db = ViewsDb::open(&self.database_path(repo))?;
        let summary = db.record(&response.views)?;

        info!(
            "Recorded {} new and {} updated days ({} unchanged)",
            summary.inserted, summary.updated, summary.unchanged
        );
        println!(
            "  {} {} new day(s), {} updated",
            "✓".green(),
            summary.inserted.to_string().cyan(),
            summary.updated.to_string().cyan()
        );
        Ok(())
    }

    fn view(&self, repo: &str) -> Result<()> {
        let path = self.database_path(repo);
        print!("{}", render_views(repo, &load_views(&path)?));
        Ok(())
    }
}

/// Reads recorded days without creating the database when it is absent.
fn load_views(path: &Path) -> Result<Vec<DailyViews>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    ViewsDb::open(path)?.all()
}

/// Formats recorded days as a table with a bar per day and a totals line.
pub fn render_views(repo: &str, days: &[DailyViews]) -> String {
    if days.is_empty() {
        return format!("{}\n", format!("No traffic recorded for {} yet.", repo).yellow());
    }

    let max = days.iter().map(|d| d.count).max().unwrap_or(0).max(1);
    let mut out = format!("\n{}\n\n", format!("Views of {}", repo).cyan().bold());
    out.push_str(&format!(
        "  {:<10}  {:>7}  {:>7}\n",
        "date".dimmed(),
        "views".dimmed(),
        "unique".dimmed()
    ));

    for day in days {
        let width = (day.count.max(0) as usize * BAR_WIDTH) / max as usize;
        out.push_str(&format!(
            "  {:<10}  {:>7}  {:>7}  {}\n",
            day.timestamp.format("%Y-%m-%d"),
            day.count,
            day.uniques,
            "█".repeat(width).green()
        ));
    }

    let total: i64 = days.iter().map(|d| d.count).sum();
    let uniques: i64 = days.iter().map(|d| d.uniques).sum();
    out.push_str(&format!(
        "\n  {:<10}  {:>7}  {:>7}\n",
        "total".bold(),
        total.to_string().bold(),
        uniques.to_string().bold()
    ));
    out
}
