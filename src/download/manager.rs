// WikiVoice - Wiki Voice Line Downloader for Desktop
// Copyright (C) 2025 WikiVoice Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Concurrent download engine
//!
//! Takes a resolved `(name, url)` list and a target directory and fetches
//! everything with a bounded worker pool:
//!
//! - concurrency is a counting semaphore, `max_concurrency` wide;
//! - every file is written to `<name>.tmp` and renamed into place only
//!   after the body streamed completely, so a partial download never sits
//!   at the final path;
//! - a destination that already exists with content is skipped without a
//!   network call, which makes re-running a batch resumable at file
//!   granularity;
//! - one file's failure is logged and counted but never cancels siblings;
//! - cancellation deletes the task's partial `.tmp` and leaves finished
//!   files untouched.
//!
//! URLs are deduplicated before any task is spawned. Distinct URLs that
//! sanitize to the same filename get a numeric ` (n)` suffix before the
//! extension.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use url::Url;

use crate::api::client::WikiClient;
use crate::cancel::CancelToken;
use crate::catalog::files::FileEntry;
use crate::download::progress::{BatchProgress, EventSink, FileOutcome};
use crate::error::{Result, WikiVoiceError};

/// Default worker pool width
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Filesystem-hostile characters replaced during sanitization
const INVALID_FILENAME_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Download configuration
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Where finished files land; created recursively if missing
    pub target_dir: PathBuf,
    /// Worker pool width
    pub max_concurrency: usize,
}

impl DownloadConfig {
    pub fn new<P: Into<PathBuf>>(target_dir: P) -> Self {
        Self {
            target_dir: target_dir.into(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }
}

/// Aggregate outcome of one download batch
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Tasks after URL deduplication
    pub attempted: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// One message per failed file
    pub failures: Vec<String>,
    /// Whether the batch was cut short by cancellation
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    /// One-line summary for the log pane
    pub fn summary(&self) -> String {
        if self.cancelled {
            format!(
                "cancelled after {} of {} files ({} skipped, {} failed)",
                self.completed, self.attempted, self.skipped, self.failed
            )
        } else if self.failed == 0 {
            format!(
                "completed {} files ({} downloaded, {} already present)",
                self.attempted, self.completed, self.skipped
            )
        } else {
            format!(
                "completed with {} failures ({} downloaded, {} already present, {} total)",
                self.failed, self.completed, self.skipped, self.attempted
            )
        }
    }
}

/// One unit of work, owned by exactly one worker for its lifetime
#[derive(Debug, Clone)]
struct DownloadTask {
    /// Final file name inside the target directory
    name: String,
    url: String,
    dest: PathBuf,
    tmp: PathBuf,
}

/// Download engine bound to one client and one target directory
pub struct DownloadManager {
    client: WikiClient,
    config: DownloadConfig,
}

impl DownloadManager {
    pub fn new(client: WikiClient, config: DownloadConfig) -> Self {
        Self { client, config }
    }

    /// Download every entry, streaming progress through `events`
    ///
    /// Always drives all tasks to a terminal state (unless cancelled) and
    /// returns the aggregate report; per-file failures do not surface as an
    /// `Err` here.
    pub async fn download_all(
        &self,
        files: &[FileEntry],
        events: Arc<dyn EventSink>,
        cancel: &CancelToken,
    ) -> Result<BatchReport> {
        let started_at = Utc::now();

        tokio::fs::create_dir_all(&self.config.target_dir)
            .await
            .map_err(|e| {
                WikiVoiceError::SaveDirUnavailable(format!(
                    "{}: {}",
                    self.config.target_dir.display(),
                    e
                ))
            })?;

        let tasks = self.plan_tasks(files);
        let total = tasks.len();
        // Counter and callback are advanced under one lock so progress
        // reaches the sink in increasing completed-count order.
        let counter = Arc::new(Mutex::new(0usize));
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));

        let mut join_set: JoinSet<(String, FileOutcome, Option<String>)> = JoinSet::new();
        for task in tasks {
            let client = self.client.clone();
            let events = Arc::clone(&events);
            let counter = Arc::clone(&counter);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();

            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (task.name, FileOutcome::Cancelled, None),
                };
                if cancel.is_cancelled() {
                    return (task.name, FileOutcome::Cancelled, None);
                }

                let (outcome, error) = match fetch_one(&client, &task, &cancel).await {
                    Ok(outcome) => (outcome, None),
                    Err(WikiVoiceError::Cancelled) => (FileOutcome::Cancelled, None),
                    Err(e) => (FileOutcome::Failed, Some(e.to_string())),
                };

                if outcome != FileOutcome::Cancelled {
                    if let Ok(mut completed) = counter.lock() {
                        *completed += 1;
                        events.progress(&BatchProgress {
                            completed: *completed,
                            total,
                            current_name: task.name.clone(),
                        });
                    }
                }

                (task.name, outcome, error)
            });
        }

        let mut report = BatchReport {
            attempted: total,
            completed: 0,
            skipped: 0,
            failed: 0,
            failures: Vec::new(),
            cancelled: false,
            started_at,
            finished_at: started_at,
        };

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, outcome, error)) => match outcome {
                    FileOutcome::Completed => report.completed += 1,
                    FileOutcome::Skipped => {
                        debug!(name = %name, "already downloaded, skipped");
                        report.skipped += 1;
                    }
                    FileOutcome::Failed => {
                        let message = error.unwrap_or_else(|| "unknown error".to_string());
                        warn!(name = %name, message = %message, "download failed");
                        events.log(&format!("[error] download failed: {}: {}", name, message));
                        report.failed += 1;
                        report.failures.push(format!("{}: {}", name, message));
                    }
                    FileOutcome::Cancelled => {}
                },
                Err(e) => {
                    warn!("download worker panicked: {}", e);
                    report.failed += 1;
                    report.failures.push(format!("worker error: {}", e));
                }
            }
        }

        report.cancelled = cancel.is_cancelled();
        report.finished_at = Utc::now();
        Ok(report)
    }

    /// Deduplicate, sanitize and disambiguate the raw entries into tasks
    fn plan_tasks(&self, files: &[FileEntry]) -> Vec<DownloadTask> {
        let mut seen_urls: HashSet<&str> = HashSet::new();
        let mut used_names: HashSet<String> = HashSet::new();
        let mut tasks = Vec::new();

        for entry in files {
            if !seen_urls.insert(entry.url.as_str()) {
                continue;
            }

            let sanitized = sanitize_file_name(&entry.name);
            if sanitized.is_empty() {
                warn!(url = %entry.url, "entry name sanitized to nothing, skipped");
                continue;
            }
            let named = infer_extension(&sanitized, &entry.url);
            let name = disambiguate(named, &mut used_names);

            let dest = self.config.target_dir.join(&name);
            let tmp = self.config.target_dir.join(format!("{}.tmp", name));
            tasks.push(DownloadTask {
                name,
                url: entry.url.clone(),
                dest,
                tmp,
            });
        }

        tasks
    }
}

/// Download one task to its destination
async fn fetch_one(
    client: &WikiClient,
    task: &DownloadTask,
    cancel: &CancelToken,
) -> Result<FileOutcome> {
    if let Ok(metadata) = tokio::fs::metadata(&task.dest).await {
        if metadata.len() > 0 {
            return Ok(FileOutcome::Skipped);
        }
    }

    cancel.check()?;

    match write_via_tmp(client, task, cancel).await {
        Ok(()) => Ok(FileOutcome::Completed),
        Err(e) => {
            // Whatever went wrong, a stale partial must not survive.
            let _ = tokio::fs::remove_file(&task.tmp).await;
            Err(e)
        }
    }
}

async fn write_via_tmp(client: &WikiClient, task: &DownloadTask, cancel: &CancelToken) -> Result<()> {
    let response = client.get_response(&task.url).await?;

    let mut file = tokio::fs::File::create(&task.tmp).await?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        cancel.check()?;
        let chunk = chunk?;
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    drop(file);

    // The exchange to the final name happens only after a fully successful
    // write, replacing any pre-existing file of the same name.
    if let Err(e) = tokio::fs::rename(&task.tmp, &task.dest).await {
        if tokio::fs::metadata(&task.dest).await.is_ok() {
            tokio::fs::remove_file(&task.dest).await?;
            tokio::fs::rename(&task.tmp, &task.dest).await?;
        } else {
            return Err(e.into());
        }
    }

    Ok(())
}

/// Replace characters illegal on common filesystems, then trim whitespace
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if INVALID_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Append `.ogg`/`.mp3` from the source URL when the name has no extension
fn infer_extension(name: &str, source_url: &str) -> String {
    if Path::new(name).extension().is_some() {
        return name.to_string();
    }

    let url_ext = Url::parse(source_url)
        .ok()
        .and_then(|u| {
            Path::new(u.path())
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
        })
        .unwrap_or_default();

    match url_ext.as_str() {
        "ogg" => format!("{}.ogg", name),
        "mp3" => format!("{}.mp3", name),
        _ => name.to_string(),
    }
}

/// Resolve in-batch filename collisions with a numeric suffix
fn disambiguate(name: String, used: &mut HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }

    let path = Path::new(&name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.clone());
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();

    for i in 1.. {
        let candidate = if extension.is_empty() {
            format!("{} ({})", stem, i)
        } else {
            format!("{} ({}).{}", stem, i, extension)
        };
        if used.insert(candidate.clone()) {
            return candidate;
        }
    }
    unreachable!("collision counter exhausted");
}
