//! GitHub traffic API client.

use super::store::DailyViews;
use anyhow::{bail, Context, Result};
use serde::Deserialize;

const GITHUB_API_URL: &str = "https://api.github.com";

/// Response from `GET /repos/{owner}/{repo}/traffic/views`
#[derive(Debug, Deserialize)]
pub struct ViewsResponse {
    pub count: i64,
    pub uniques: i64,
    #[serde(default)]
    pub views: Vec<DailyViews>,
}

pub struct GithubTrafficClient {
    client: reqwest::blocking::Client,
}

impl Default for GithubTrafficClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GithubTrafficClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }

    /// Daily views for the last 14 days
    pub fn fetch_views(&self, owner: &str, repo: &str, token: &str) -> Result<ViewsResponse> {
        let url = format!("{}/repos/{}/{}/traffic/views", GITHUB_API_URL, owner, repo);

        let response = self
            .client
            .get(&url)
            .query(&[("per", "day")])
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", token))
            .header("User-Agent", "gts-gdrive")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .context("Cannot connect to GitHub API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            bail!("GitHub API error {} for {}/{}: {}", status, owner, repo, body);
        }

        response
            .json()
            .context("Cannot parse GitHub traffic response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_views_response() {
        let json = r#"{
            "count": 14,
            "uniques": 4,
            "views": [
                {"timestamp": "2016-10-10T00:00:00Z", "count": 4, "uniques": 1},
                {"timestamp": "2016-10-11T00:00:00Z", "count": 10, "uniques": 3}
            ]
        }"#;

        let response: ViewsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.count, 14);
        assert_eq!(response.views.len(), 2);
        assert_eq!(response.views[1].count, 10);
        assert_eq!(
            response.views[0].timestamp.to_rfc3339(),
            "2016-10-10T00:00:00+00:00"
        );
    }

    #[test]
    fn test_parse_empty_views() {
        let response: ViewsResponse =
            serde_json::from_str(r#"{"count": 0, "uniques": 0}"#).unwrap();
        assert!(response.views.is_empty());
    }
}
