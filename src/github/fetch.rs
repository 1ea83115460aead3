use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use reqwest::header::ACCEPT;
use serde::Deserialize;

use crate::config::GithubConfig;
use crate::models::RepoFile;

/// File name suffixes worth downloading.
pub const ALLOWED_EXTENSIONS: [&str; 6] = [".py", ".js", ".html", ".css", ".md", ".txt"];

/// Everything one fetch produced, including what went missing on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub files: Vec<RepoFile>,
    /// Directory listings that failed and were treated as empty
    pub failed_listings: usize,
    /// Matching files whose download failed
    pub failed_downloads: usize,
    /// Set when `max_depth` or `max_files` cut the walk short
    pub truncated: bool,
}

impl FetchReport {
    pub fn has_partial_failures(&self) -> bool {
        self.failed_listings > 0 || self.failed_downloads > 0
    }
}

/// One entry of a contents API directory listing.
#[derive(Debug, Deserialize)]
struct ContentEntry {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    path: String,
    download_url: Option<String>,
    url: String,
}

/// Walks a public repository through the contents API, one request at a time.
#[derive(Clone)]
pub struct RepoFetcher {
    client: reqwest::Client,
    config: GithubConfig,
}

impl RepoFetcher {
    pub fn new(client: reqwest::Client, config: GithubConfig) -> Self {
        Self { client, config }
    }

    /// Fetch every allow-listed file of `repo_url`.
    ///
    /// Never fails: an unusable link yields an empty report, and failed
    /// listings or downloads are counted instead of aborting the walk.
    pub async fn fetch(&self, repo_url: &str) -> FetchReport {
        let mut report = FetchReport::default();

        let api_url = match contents_api_url(&self.config.api_base, repo_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Error fetching repo {repo_url}: {e:#}");
                return report;
            }
        };

        tracing::info!("Fetching repository contents from {api_url}");
        self.walk(api_url, 0, &mut report).await;

        tracing::info!(
            "Fetched {} files from {repo_url} \
             ({} failed listings, {} failed downloads, truncated: {})",
            report.files.len(),
            report.failed_listings,
            report.failed_downloads,
            report.truncated
        );
        report
    }

    fn walk<'a>(
        &'a self,
        api_url: String,
        depth: usize,
        report: &'a mut FetchReport,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let entries = match self.list(&api_url).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Failed to fetch: {api_url}: {e:#}");
                    report.failed_listings += 1;
                    return;
                }
            };

            for entry in entries {
                match entry.kind.as_str() {
                    "file" if has_allowed_extension(&entry.name) => {
                        if report.files.len() >= self.config.max_files {
                            report.truncated = true;
                            return;
                        }
                        let Some(download_url) = entry.download_url.as_deref() else {
                            continue;
                        };
                        match self.download(download_url).await {
                            Ok(content) => report.files.push(RepoFile {
                                path: entry.path,
                                content,
                            }),
                            Err(e) => {
                                tracing::warn!("Skipping {}: {e:#}", entry.path);
                                report.failed_downloads += 1;
                            }
                        }
                    }
                    "dir" => {
                        if report.files.len() >= self.config.max_files {
                            report.truncated = true;
                            return;
                        }
                        if depth >= self.config.max_depth {
                            tracing::warn!(
                                "Not descending into {}: depth limit {} reached",
                                entry.path,
                                self.config.max_depth
                            );
                            report.truncated = true;
                            continue;
                        }
                        self.walk(entry.url, depth + 1, report).await;
                    }
                    _ => {}
                }
            }
        })
    }

    async fn list(&self, api_url: &str) -> Result<Vec<ContentEntry>> {
        let resp = self
            .client
            .get(api_url)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .context("Failed to call contents API")?;

        if !resp.status().is_success() {
            anyhow::bail!("contents API returned {}", resp.status());
        }

        resp.json()
            .await
            .context("Failed to parse directory listing")
    }

    async fn download(&self, download_url: &str) -> Result<String> {
        let resp = self
            .client
            .get(download_url)
            .send()
            .await
            .context("Failed to download file")?;

        if !resp.status().is_success() {
            anyhow::bail!("download returned {}", resp.status());
        }

        resp.text().await.context("Failed to read file body")
    }
}

/// Rewrite a repository link into its contents API endpoint.
///
/// One trailing `/` and a trailing `.git` are ignored, as is anything after
/// `{owner}/{repo}` in the path.
pub fn contents_api_url(api_base: &str, repo_url: &str) -> Result<String> {
    let trimmed = repo_url.trim();
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    let parsed = url::Url::parse(trimmed)
        .with_context(|| format!("Invalid repository URL: {repo_url}"))?;
    let mut segments = parsed
        .path_segments()
        .context("Repository URL has no path")?
        .filter(|s| !s.is_empty());
    let owner = segments
        .next()
        .context("Repository URL is missing the owner")?;
    let repo = segments
        .next()
        .context("Repository URL is missing the repository name")?;

    Ok(format!(
        "{}/repos/{owner}/{repo}/contents",
        api_base.trim_end_matches('/')
    ))
}

pub fn has_allowed_extension(name: &str) -> bool {
    ALLOWED_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}
