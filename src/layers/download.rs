use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{create_dir_all, remove_file, rename, File};
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::layers::resolution::Resolver;
use crate::layers::{DownloadServiceError, FetchError, ResearchPaper};

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_STEM_LEN: usize = 120;

/// Fetches the bytes behind a resolved artifact URL.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        tracing::info!("Downloading PDF from: {}", url);
        let mut response = self.client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            tracing::error!("Failed to download PDF: {}", response.status());
            return Err(FetchError::Status(response.status()));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            bytes.extend_from_slice(&chunk);
        }
        if bytes.is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(bytes)
    }
}

/// Shared stop signal, checked before each paper of a batch.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DownloadedFile {
    pub title: String,
    pub path: PathBuf,
    pub url: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedPaper {
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadReport {
    pub downloaded: Vec<DownloadedFile>,
    pub skipped: Vec<SkippedPaper>,
    pub cancelled: bool,
}

/// Sequentially downloads papers into `<base_dir>/<strategy>/`.
pub struct PaperDownloadService {
    fetcher: Box<dyn ArtifactFetcher>,
    base_dir: PathBuf,
    cancel: CancellationFlag,
}

impl PaperDownloadService {
    pub fn new(base_dir: impl Into<PathBuf>, fetcher: Box<dyn ArtifactFetcher>) -> Self {
        Self {
            fetcher,
            base_dir: base_dir.into(),
            cancel: CancellationFlag::default(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn strategy_dir(&self, strategy_name: &str) -> PathBuf {
        self.base_dir.join(sanitize_component(strategy_name, "strategy"))
    }

    /// Attempts every paper in order and calls `progress(index, total, title)`
    /// after each attempt, with `index` counting from 1.
    ///
    /// Per-paper fetch failures land in [`DownloadReport::skipped`]; only an
    /// unusable output location aborts the batch.
    pub async fn download_papers<F>(
        &self,
        papers: &[ResearchPaper],
        strategy_name: &str,
        mut progress: F,
    ) -> Result<DownloadReport, DownloadServiceError>
    where
        F: FnMut(usize, usize, &str),
    {
        let mut report = DownloadReport::default();
        if papers.is_empty() {
            return Ok(report);
        }

        let target_dir = self.strategy_dir(strategy_name);
        create_dir_all(&target_dir)
            .await
            .map_err(|source| DownloadServiceError::OutputDirectory {
                path: target_dir.clone(),
                source,
            })?;

        let total = papers.len();
        let mut written = HashSet::new();
        for (i, paper) in papers.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!("Download batch cancelled after {} of {} papers", i, total);
                report.cancelled = true;
                break;
            }

            match self.download_one(paper, &target_dir, &written).await? {
                Ok(file) => {
                    written.insert(file.path.clone());
                    tracing::info!("Saved {:?} ({} bytes)", file.path, file.bytes);
                    report.downloaded.push(file);
                }
                Err(reason) => {
                    tracing::warn!("Skipping '{}': {}", paper.title(), reason);
                    report.skipped.push(SkippedPaper {
                        title: paper.title().to_string(),
                        reason,
                    });
                }
            }
            progress(i + 1, total, paper.title());
        }

        Ok(report)
    }

    // Outer error is fatal for the batch, inner error skips just this paper.
    async fn download_one(
        &self,
        paper: &ResearchPaper,
        target_dir: &Path,
        written: &HashSet<PathBuf>,
    ) -> Result<Result<DownloadedFile, String>, DownloadServiceError> {
        let Some(url) = Resolver::resolve(paper) else {
            return Ok(Err("no open-access artifact".to_string()));
        };

        let bytes = match self.fetcher.fetch(&url).await {
            Ok(bytes) => bytes,
            Err(e) => return Ok(Err(e.to_string())),
        };

        let path = unused_path(target_dir, &file_name_for(paper), written);
        let partial = path.with_extension("pdf.part");
        if let Err(source) = write_atomically(&partial, &path, &bytes).await {
            if let Err(e) = remove_file(&partial).await {
                tracing::debug!("Could not remove partial file {:?}: {}", partial, e);
            }
            return Err(DownloadServiceError::Write { path, source });
        }

        Ok(Ok(DownloadedFile {
            title: paper.title().to_string(),
            path,
            url: url.to_string(),
            bytes: bytes.len() as u64,
        }))
    }
}

async fn write_atomically(partial: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(partial).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);
    rename(partial, path).await
}

/// First of `name`, `name-2`, `name-3`, ... not yet written in this batch.
fn unused_path(dir: &Path, file_name: &str, written: &HashSet<PathBuf>) -> PathBuf {
    let first = dir.join(file_name);
    if !written.contains(&first) {
        return first;
    }
    let stem = file_name.strip_suffix(".pdf").unwrap_or(file_name);
    (2usize..)
        .map(|n| dir.join(format!("{}-{}.pdf", stem, n)))
        .find(|candidate| !written.contains(candidate))
        .unwrap_or(first)
}

/// Deterministic, filesystem-safe PDF name from the DOI, else the title.
pub fn file_name_for(paper: &ResearchPaper) -> String {
    let raw = paper.doi().unwrap_or(paper.title());
    format!("{}.pdf", sanitize_component(raw, "paper"))
}

fn sanitize_component(raw: &str, fallback: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        let ch = match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => ch,
            _ => '_',
        };
        if ch == '_' && out.ends_with('_') {
            continue;
        }
        out.push(ch);
    }
    let trimmed: String = out
        .trim_matches(|c: char| c == '_' || c == '.')
        .chars()
        .take(MAX_STEM_LEN)
        .collect();
    let trimmed = trimmed.trim_end_matches(|c: char| c == '_' || c == '.');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
