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


//! Session caches
//!
//! All caches are explicitly constructed and handed to the components that
//! need them; nothing here is a process-wide singleton.
//!
//! - [`TreeCache`] and [`NameCache`] are unbounded: their key spaces
//!   (category titles, entity names) are small and stable for a session.
//! - [`ImageCache`] is LRU-bounded and keeps an in-flight request table so
//!   concurrent lookups of the same URL coalesce into a single fetch.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;

use crate::api::client::WikiClient;
use crate::error::{Result, WikiVoiceError};

/// Default image cache capacity in entries
pub const DEFAULT_IMAGE_CAPACITY: usize = 256;

/// Cached category-tree scans, keyed by root category
#[derive(Debug, Default)]
pub struct TreeCache {
    inner: RwLock<HashMap<String, Arc<Vec<String>>>>,
}

impl TreeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, root: &str) -> Option<Arc<Vec<String>>> {
        self.inner.read().ok()?.get(root).cloned()
    }

    pub fn store(&self, root: &str, tree: Vec<String>) -> Arc<Vec<String>> {
        let tree = Arc::new(tree);
        if let Ok(mut map) = self.inner.write() {
            map.insert(root.to_string(), Arc::clone(&tree));
        }
        tree
    }

    pub fn clear(&self) {
        if let Ok(mut map) = self.inner.write() {
            map.clear();
        }
    }
}

/// Authoritative entity names used to resolve group display names
#[derive(Debug, Default)]
pub struct NameCache {
    inner: RwLock<Vec<String>>,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored name list
    pub fn set(&self, names: Vec<String>) {
        if let Ok(mut list) = self.inner.write() {
            *list = names;
        }
    }

    /// Snapshot of the stored names
    pub fn snapshot(&self) -> Vec<String> {
        self.inner.read().map(|list| list.clone()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().map(|list| list.is_empty()).unwrap_or(true)
    }
}

struct LruInner {
    max_entries: usize,
    order: VecDeque<String>,
    values: HashMap<String, Arc<Vec<u8>>>,
}

impl LruInner {
    fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            order: VecDeque::new(),
            values: HashMap::new(),
        }
    }

    fn get(&mut self, key: &str) -> Option<Arc<Vec<u8>>> {
        let value = self.values.get(key).cloned()?;
        self.touch(key);
        Some(value)
    }

    fn insert(&mut self, key: String, value: Arc<Vec<u8>>) {
        self.values.insert(key.clone(), value);
        self.touch(&key);
        while self.values.len() > self.max_entries {
            let Some(oldest) = self.order.pop_back() else {
                break;
            };
            self.values.remove(&oldest);
        }
    }

    fn touch(&mut self, key: &str) {
        self.order.retain(|entry| entry != key);
        self.order.push_front(key.to_string());
    }
}

type FetchResult = std::result::Result<Arc<Vec<u8>>, Arc<WikiVoiceError>>;
type FetchFuture = Shared<BoxFuture<'static, FetchResult>>;

/// LRU-bounded avatar/image byte cache with request coalescing
///
/// A lookup that misses the cache registers a shared fetch future under its
/// URL; concurrent lookups for the same URL await that future instead of
/// issuing their own request.
pub struct ImageCache {
    client: WikiClient,
    lru: Mutex<LruInner>,
    pending: Mutex<HashMap<String, FetchFuture>>,
}

impl ImageCache {
    pub fn new(client: WikiClient, capacity: usize) -> Self {
        Self {
            client,
            lru: Mutex::new(LruInner::new(capacity)),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a URL through the cache
    pub async fn get(&self, url: &str) -> Result<Arc<Vec<u8>>> {
        if let Some(bytes) = self.lru.lock().ok().and_then(|mut lru| lru.get(url)) {
            return Ok(bytes);
        }

        let fetch = {
            let mut pending = self
                .pending
                .lock()
                .map_err(|_| WikiVoiceError::internal("image cache lock poisoned"))?;

            match pending.get(url) {
                Some(fetch) => fetch.clone(),
                None => {
                    let client = self.client.clone();
                    let target = url.to_string();
                    let fetch: FetchFuture = async move {
                        client
                            .get_bytes(&target)
                            .await
                            .map(Arc::new)
                            .map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    pending.insert(url.to_string(), fetch.clone());
                    fetch
                }
            }
        };

        let result = fetch.await;

        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(url);
        }

        match result {
            Ok(bytes) => {
                if let Ok(mut lru) = self.lru.lock() {
                    lru.insert(url.to_string(), Arc::clone(&bytes));
                }
                Ok(bytes)
            }
            Err(e) => Err(WikiVoiceError::DownloadFailed(format!(
                "image fetch failed for {}: {}",
                url, e
            ))),
        }
    }

    /// Number of cached entries (test/diagnostic aid)
    pub fn len(&self) -> usize {
        self.lru.lock().map(|lru| lru.values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
