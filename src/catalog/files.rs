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


//! File resolution
//!
//! Turns a category or a keyword into `(display name, download URL)` pairs.
//!
//! Two strategies:
//! - category-scoped: one generator query over the category's file members,
//!   taking the first imageinfo entry per page;
//! - keyword-scoped: an `allimages` prefix search merged with a full-text
//!   search of the file namespace (titles resolved to URLs in chunks),
//!   deduplicated by filename across the two.
//!
//! The URL is the identity key in both cases; output keeps insertion order.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

use crate::api::client::WikiClient;
use crate::api::query::{ImagePage, DEFAULT_RESULT_CAP, NS_FILE};
use crate::cancel::CancelToken;
use crate::error::Result;

/// Extensions treated as audio when the MIME type is absent or unhelpful
pub const AUDIO_EXTENSIONS: [&str; 3] = [".ogg", ".mp3", ".wav"];

lazy_static! {
    /// File namespace prefixes, canonical and localized
    static ref FILE_PREFIX_RE: Regex =
        Regex::new(r"^(?:File|Image|文件|檔案):").expect("file prefix regex");
}

/// One downloadable resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Display name, file namespace prefix stripped, not yet sanitized
    pub name: String,
    /// Download URL; dedup key
    pub url: String,
}

/// Strip the file namespace prefix from a title
pub fn strip_file_prefix(title: &str) -> &str {
    match FILE_PREFIX_RE.find(title) {
        Some(m) => &title[m.end()..],
        None => title,
    }
}

/// Classify a file as audio by MIME type, falling back to the URL extension
pub fn is_audio(mime: Option<&str>, url: &str) -> bool {
    if let Some(mime) = mime {
        if mime.starts_with("audio/") {
            return true;
        }
    }
    let lower = url.to_ascii_lowercase();
    AUDIO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn push_unique(
    entry: FileEntry,
    audio_only: bool,
    mime: Option<&str>,
    seen_urls: &mut HashSet<String>,
    seen_names: &mut HashSet<String>,
    out: &mut Vec<FileEntry>,
) {
    if audio_only && !is_audio(mime, &entry.url) {
        return;
    }
    if seen_names.contains(&entry.name) || !seen_urls.insert(entry.url.clone()) {
        return;
    }
    seen_names.insert(entry.name.clone());
    out.push(entry);
}

fn collect_image_pages(
    pages: Vec<ImagePage>,
    audio_only: bool,
    seen_urls: &mut HashSet<String>,
    seen_names: &mut HashSet<String>,
    out: &mut Vec<FileEntry>,
) {
    for page in pages {
        // Only the first imageinfo entry is meaningful here.
        let Some(info) = page.imageinfo.first() else {
            continue;
        };
        let entry = FileEntry {
            name: strip_file_prefix(&page.title).to_string(),
            url: info.url.clone(),
        };
        push_unique(entry, audio_only, info.mime.as_deref(), seen_urls, seen_names, out);
    }
}

impl WikiClient {
    /// Resolve the downloadable files of one category
    pub async fn resolve_category_files(
        &self,
        category: &str,
        audio_only: bool,
        cancel: &CancelToken,
    ) -> Result<Vec<FileEntry>> {
        let pages = self.category_file_pages(category, cancel).await?;

        let mut seen_urls = HashSet::new();
        let mut seen_names = HashSet::new();
        let mut out = Vec::new();
        collect_image_pages(pages, audio_only, &mut seen_urls, &mut seen_names, &mut out);
        Ok(out)
    }

    /// Resolve files matching a keyword, independent of any category
    ///
    /// Prefix hits come first, then full-text hits that were not already
    /// found by name. Accumulation stops at `cap` even if the server still
    /// advertises continuations.
    pub async fn search_files(
        &self,
        keyword: &str,
        audio_only: bool,
        cap: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<FileEntry>> {
        let cap = if cap == 0 { DEFAULT_RESULT_CAP } else { cap };

        let mut seen_urls = HashSet::new();
        let mut seen_names = HashSet::new();
        let mut out = Vec::new();

        let prefixed = self.all_images_with_prefix(keyword, cap, cancel).await?;
        for image in prefixed {
            let entry = FileEntry {
                name: image.name.clone(),
                url: image.url.clone(),
            };
            push_unique(
                entry,
                audio_only,
                image.mime.as_deref(),
                &mut seen_urls,
                &mut seen_names,
                &mut out,
            );
            if out.len() >= cap {
                out.truncate(cap);
                return Ok(out);
            }
        }

        let titles = self.search_titles(keyword, NS_FILE, cap, cancel).await?;
        let unresolved: Vec<String> = titles
            .into_iter()
            .filter(|t| !seen_names.contains(strip_file_prefix(t)))
            .collect();
        let pages = self.image_info_for_titles(&unresolved, cancel).await?;
        collect_image_pages(pages, audio_only, &mut seen_urls, &mut seen_names, &mut out);

        out.truncate(cap);
        Ok(out)
    }
}
