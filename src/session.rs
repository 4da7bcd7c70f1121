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


//! Session composition root
//!
//! `WikiSession` is what the GUI holds: one client, the session caches and
//! the event sink, wired together. Its methods are the job entry points
//! (search, tree scan, file resolution, download). Each job kind owns one
//! cancellation slot; starting a job cancels the previous one of the same
//! kind, so a slow stale request can never overwrite the results of a newer
//! one.
//!
//! All outcomes reach the UI twice: through the returned `Result`/report
//! and through the log sink, with `[error]` prefixes for failures.
//! Cancellation is logged as a plain line, never as an error.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::api::client::{ClientConfig, WikiClient};
use crate::api::query::{MemberKind, DEFAULT_RESULT_CAP, NS_CATEGORY};
use crate::cache::{ImageCache, NameCache, TreeCache, DEFAULT_IMAGE_CAPACITY};
use crate::cancel::CancelToken;
use crate::catalog::files::FileEntry;
use crate::catalog::grouping::{group_categories, CharacterGroup};
use crate::download::manager::{BatchReport, DownloadConfig, DownloadManager};
use crate::download::progress::EventSink;
use crate::error::{Result, WikiVoiceError};

/// Default retries of a blocked search
const DEFAULT_BLOCKED_RETRIES: u32 = 3;

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub client: ClientConfig,
    /// Cap on accumulated search results
    pub search_result_cap: usize,
    /// Image cache capacity in entries
    pub image_cache_capacity: usize,
    /// Retries after a WAF-blocked search response
    pub blocked_retries: u32,
    /// Randomized delay window between blocked-search retries
    pub blocked_retry_min_delay: Duration,
    pub blocked_retry_max_delay: Duration,
}

impl SessionConfig {
    pub fn new<S: Into<String>>(endpoint: S) -> Self {
        Self {
            client: ClientConfig::new(endpoint),
            search_result_cap: DEFAULT_RESULT_CAP,
            image_cache_capacity: DEFAULT_IMAGE_CAPACITY,
            blocked_retries: DEFAULT_BLOCKED_RETRIES,
            blocked_retry_min_delay: Duration::from_secs(1),
            blocked_retry_max_delay: Duration::from_secs(3),
        }
    }

    pub fn client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }

    pub fn search_result_cap(mut self, cap: usize) -> Self {
        self.search_result_cap = cap.max(1);
        self
    }

    pub fn image_cache_capacity(mut self, capacity: usize) -> Self {
        self.image_cache_capacity = capacity;
        self
    }

    pub fn blocked_retries(mut self, retries: u32) -> Self {
        self.blocked_retries = retries;
        self
    }

    pub fn blocked_retry_delays(mut self, min: Duration, max: Duration) -> Self {
        self.blocked_retry_min_delay = min;
        self.blocked_retry_max_delay = max.max(min);
        self
    }
}

/// The job kinds that own a cancellation slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    Search,
    Scan,
    Resolve,
    Download,
}

#[derive(Default)]
struct JobSlots {
    search: Mutex<Option<CancelToken>>,
    scan: Mutex<Option<CancelToken>>,
    resolve: Mutex<Option<CancelToken>>,
    download: Mutex<Option<CancelToken>>,
}

impl JobSlots {
    fn slot(&self, kind: JobKind) -> &Mutex<Option<CancelToken>> {
        match kind {
            JobKind::Search => &self.search,
            JobKind::Scan => &self.scan,
            JobKind::Resolve => &self.resolve,
            JobKind::Download => &self.download,
        }
    }
}

/// Composition root owned by the GUI
pub struct WikiSession {
    client: WikiClient,
    config: SessionConfig,
    trees: TreeCache,
    names: NameCache,
    images: ImageCache,
    events: Arc<dyn EventSink>,
    jobs: JobSlots,
}

impl WikiSession {
    pub fn new(config: SessionConfig, events: Arc<dyn EventSink>) -> Result<Self> {
        let client = WikiClient::new(config.client.clone())?;
        let images = ImageCache::new(client.clone(), config.image_cache_capacity);

        Ok(Self {
            client,
            config,
            trees: TreeCache::new(),
            names: NameCache::new(),
            images,
            events,
            jobs: JobSlots::default(),
        })
    }

    /// The underlying HTTP client
    pub fn client(&self) -> &WikiClient {
        &self.client
    }

    /// The avatar/image cache
    pub fn images(&self) -> &ImageCache {
        &self.images
    }

    /// Replace the authoritative entity-name list
    pub fn set_known_names(&self, names: Vec<String>) {
        self.names.set(names);
    }

    /// Seed the entity-name list from a category's page members
    pub async fn load_known_names_from_category(&self, category: &str) -> Result<usize> {
        let token = CancelToken::new();
        let members = self
            .client
            .category_members(category, MemberKind::Page, &token)
            .await?;
        let names: Vec<String> = members.into_iter().map(|m| m.title).collect();
        let count = names.len();
        self.names.set(names);
        Ok(count)
    }

    /// Cancel every in-flight job
    pub fn cancel_all(&self) {
        for kind in [JobKind::Search, JobKind::Scan, JobKind::Resolve, JobKind::Download] {
            if let Ok(slot) = self.jobs.slot(kind).lock() {
                if let Some(token) = slot.as_ref() {
                    token.cancel();
                }
            }
        }
    }

    /// Install a fresh token for `kind`, cancelling its predecessor
    fn begin_job(&self, kind: JobKind) -> CancelToken {
        let token = CancelToken::new();
        if let Ok(mut slot) = self.jobs.slot(kind).lock() {
            if let Some(previous) = slot.replace(token.clone()) {
                previous.cancel();
            }
        }
        token
    }

    fn report_failure(&self, what: &str, error: &WikiVoiceError) {
        if error.is_cancelled() {
            self.events.log(&format!("{} cancelled", what));
        } else {
            warn!(what, %error, "job failed");
            self.events
                .log(&format!("[error] {} failed: {}", what, error.user_message()));
        }
    }

    /// Search category titles for a keyword and group them into entities
    ///
    /// A blocked (WAF) response is retried a few times with a randomized
    /// one-to-three-second delay before giving up.
    pub async fn search_and_group(
        &self,
        keyword: &str,
        voice_only: bool,
    ) -> Result<Vec<CharacterGroup>> {
        let token = self.begin_job(JobKind::Search);
        self.events
            .log(&format!("searching categories for '{}'", keyword));

        let mut retries = 0;
        let titles = loop {
            match self
                .client
                .search_titles(keyword, NS_CATEGORY, self.config.search_result_cap, &token)
                .await
            {
                Ok(titles) => break titles,
                Err(e) if e.is_blocked() && retries < self.config.blocked_retries => {
                    retries += 1;
                    self.events
                        .log(&format!("search blocked by the wiki, retry {}", retries));
                    tokio::time::sleep(self.blocked_retry_delay()).await;
                    if let Err(e) = token.check() {
                        self.report_failure("search", &e);
                        return Err(e);
                    }
                }
                Err(e) => {
                    self.report_failure("search", &e);
                    return Err(e);
                }
            }
        };

        let groups = group_categories(&titles, voice_only, &self.names.snapshot());
        self.events.log(&format!(
            "found {} categories across {} groups",
            titles.len(),
            groups.len()
        ));
        Ok(groups)
    }

    /// Expand the subcategory tree under `root`, using the session cache
    pub async fn scan_category_tree(&self, root: &str) -> Result<Arc<Vec<String>>> {
        if let Some(tree) = self.trees.get(root) {
            return Ok(tree);
        }

        let token = self.begin_job(JobKind::Scan);
        self.events.log(&format!("scanning subcategories of {}", root));

        match self.client.scan_category_tree(root, &token).await {
            Ok(tree) => {
                self.events
                    .log(&format!("{} categories under {}", tree.len(), root));
                Ok(self.trees.store(root, tree))
            }
            Err(e) => {
                self.report_failure("category scan", &e);
                Err(e)
            }
        }
    }

    /// Record the expanded subcategory list back onto a selected group
    pub async fn expand_group(&self, group: &mut CharacterGroup) -> Result<()> {
        let tree = self.scan_category_tree(&group.root_category).await?;
        group.member_categories = (*tree).clone();
        Ok(())
    }

    /// List the downloadable files of one category
    pub async fn resolve_category_files(
        &self,
        category: &str,
        audio_only: bool,
    ) -> Result<Vec<FileEntry>> {
        let token = self.begin_job(JobKind::Resolve);

        match self
            .client
            .resolve_category_files(category, audio_only, &token)
            .await
        {
            Ok(files) => {
                self.events
                    .log(&format!("{} files in {}", files.len(), category));
                Ok(files)
            }
            Err(e) => {
                self.report_failure("file listing", &e);
                Err(e)
            }
        }
    }

    /// List files matching a keyword across the whole wiki
    pub async fn search_files(&self, keyword: &str, audio_only: bool) -> Result<Vec<FileEntry>> {
        let token = self.begin_job(JobKind::Resolve);

        match self
            .client
            .search_files(keyword, audio_only, self.config.search_result_cap, &token)
            .await
        {
            Ok(files) => {
                self.events
                    .log(&format!("{} files match '{}'", files.len(), keyword));
                Ok(files)
            }
            Err(e) => {
                self.report_failure("file search", &e);
                Err(e)
            }
        }
    }

    /// Download a file list into `target_dir`
    pub async fn download_all<P: Into<PathBuf>>(
        &self,
        files: &[FileEntry],
        target_dir: P,
        max_concurrency: Option<usize>,
    ) -> Result<BatchReport> {
        let token = self.begin_job(JobKind::Download);

        let mut config = DownloadConfig::new(target_dir);
        if let Some(width) = max_concurrency {
            config = config.max_concurrency(width);
        }
        let manager = DownloadManager::new(self.client.clone(), config);

        self.events.log(&format!("downloading {} files", files.len()));
        match manager
            .download_all(files, Arc::clone(&self.events), &token)
            .await
        {
            Ok(report) => {
                self.events.log(&report.summary());
                Ok(report)
            }
            Err(e) => {
                self.report_failure("download", &e);
                Err(e)
            }
        }
    }

    fn blocked_retry_delay(&self) -> Duration {
        let min = self.config.blocked_retry_min_delay.as_millis() as u64;
        let max = self.config.blocked_retry_max_delay.as_millis() as u64;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}
