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


//! MediaWiki `action=query` protocol layer
//!
//! Builds paginated query requests, decodes the JSON shapes this crate
//! consumes and follows `continue` tokens until the server stops returning
//! them or a caller-supplied cap is reached.
//!
//! Every list type names its continuation parameter differently
//! (`sroffset`, `cmcontinue`, `gcmcontinue`, `aicontinue`) and may carry a
//! string or a number as its value. [`QueryKind`] models that explicitly so
//! no call site does ad hoc key lookups.
//!
//! # Failure semantics
//! - An HTML body on the first page surfaces as [`WikiVoiceError::Blocked`]
//!   so the session layer can run its own retry loop.
//! - A decode failure aborts only the current page; accumulated items are
//!   returned.
//! - Transport failures on later pages stop pagination and return what was
//!   accumulated; pagination failures are never retried here beyond the
//!   adapter's throttle backoff.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::api::client::WikiClient;
use crate::cancel::CancelToken;
use crate::error::{Result, WikiVoiceError};

/// Page size for most list queries
pub const DEFAULT_PAGE_LIMIT: usize = 500;

/// Page size for plain full-text search
pub const SEARCH_PAGE_LIMIT: usize = 100;

/// Default cap on accumulated results per logical query
pub const DEFAULT_RESULT_CAP: usize = 1000;

/// Maximum titles per batched imageinfo lookup (wiki API limit)
pub const TITLE_CHUNK: usize = 50;

/// MediaWiki namespace for content pages
pub const NS_MAIN: i64 = 0;

/// MediaWiki namespace for files
pub const NS_FILE: i64 = 6;

/// MediaWiki namespace for categories
pub const NS_CATEGORY: i64 = 14;

/// The query kinds this crate issues, each owning its pagination strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// `list=search`
    Search,
    /// `list=categorymembers`
    CategoryMembers,
    /// `generator=categorymembers` + `prop=imageinfo`
    CategoryFileGenerator,
    /// `list=allimages`
    AllImages,
}

impl QueryKind {
    /// Name of the continuation parameter for this query kind
    pub fn continue_param(self) -> &'static str {
        match self {
            QueryKind::Search => "sroffset",
            QueryKind::CategoryMembers => "cmcontinue",
            QueryKind::CategoryFileGenerator => "gcmcontinue",
            QueryKind::AllImages => "aicontinue",
        }
    }
}

/// Extract this kind's continuation token from a response
///
/// The `continue` map carries string values for opaque tokens and numbers
/// for offsets; both are normalized to a string for re-submission.
pub(crate) fn continuation_token(value: &Value, kind: QueryKind) -> Option<String> {
    let token = value.get("continue")?.get(kind.continue_param())?;
    match token {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// One `query.search` hit
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub title: String,
}

/// One `query.categorymembers` entry
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryMember {
    #[serde(default)]
    pub ns: i64,
    pub title: String,
}

/// One `imageinfo` entry of a file page
#[derive(Debug, Clone, Deserialize)]
pub struct ImageInfoEntry {
    pub url: String,
    #[serde(default)]
    pub mime: Option<String>,
}

/// One `query.pages` value from a generator + imageinfo query
#[derive(Debug, Clone, Deserialize)]
pub struct ImagePage {
    pub title: String,
    #[serde(default)]
    pub imageinfo: Vec<ImageInfoEntry>,
}

/// One `query.allimages` entry
#[derive(Debug, Clone, Deserialize)]
pub struct AllImage {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub mime: Option<String>,
}

/// Which member type a `list=categorymembers` query asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Subcategory,
    File,
    Page,
}

impl MemberKind {
    fn cmtype(self) -> &'static str {
        match self {
            MemberKind::Subcategory => "subcat",
            MemberKind::File => "file",
            MemberKind::Page => "page",
        }
    }

    fn namespace(self) -> i64 {
        match self {
            MemberKind::Subcategory => NS_CATEGORY,
            MemberKind::File => NS_FILE,
            MemberKind::Page => NS_MAIN,
        }
    }
}

impl WikiClient {
    /// Full-text search returning page titles in the given namespace
    ///
    /// Searches categories with `namespace = 14` (entity discovery) and
    /// files with `namespace = 6` (keyword-scoped file search).
    pub async fn search_titles(
        &self,
        keyword: &str,
        namespace: i64,
        cap: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<String>> {
        let base = vec![
            ("list", "search".to_string()),
            ("srsearch", keyword.to_string()),
            ("srnamespace", namespace.to_string()),
            ("srlimit", SEARCH_PAGE_LIMIT.to_string()),
        ];

        self.paginate(base, QueryKind::Search, cap, cancel, |value, acc: &mut Vec<String>| {
            let hits = value.get("query").and_then(|q| q.get("search")).cloned();
            if let Some(hits) = hits {
                match serde_json::from_value::<Vec<SearchHit>>(hits) {
                    Ok(hits) => acc.extend(hits.into_iter().map(|h| h.title)),
                    Err(e) => warn!("search page decode failed: {}", e),
                }
            }
        })
        .await
    }

    /// Members of one category, by member type
    pub async fn category_members(
        &self,
        category: &str,
        kind: MemberKind,
        cancel: &CancelToken,
    ) -> Result<Vec<CategoryMember>> {
        let base = vec![
            ("list", "categorymembers".to_string()),
            ("cmtitle", category.to_string()),
            ("cmtype", kind.cmtype().to_string()),
            ("cmnamespace", kind.namespace().to_string()),
            ("cmlimit", DEFAULT_PAGE_LIMIT.to_string()),
        ];

        self.paginate(
            base,
            QueryKind::CategoryMembers,
            DEFAULT_RESULT_CAP,
            cancel,
            |value, acc: &mut Vec<CategoryMember>| {
                let members = value
                    .get("query")
                    .and_then(|q| q.get("categorymembers"))
                    .cloned();
                if let Some(members) = members {
                    match serde_json::from_value::<Vec<CategoryMember>>(members) {
                        Ok(members) => acc.extend(members),
                        Err(e) => warn!("categorymembers page decode failed: {}", e),
                    }
                }
            },
        )
        .await
    }

    /// File pages of one category with their first imageinfo entry
    ///
    /// `query.pages` is keyed by opaque page IDs and its values may appear
    /// in any order; order within one result page is not meaningful.
    pub async fn category_file_pages(
        &self,
        category: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<ImagePage>> {
        let base = vec![
            ("generator", "categorymembers".to_string()),
            ("gcmtitle", category.to_string()),
            ("gcmnamespace", NS_FILE.to_string()),
            ("gcmlimit", DEFAULT_PAGE_LIMIT.to_string()),
            ("prop", "imageinfo".to_string()),
            ("iiprop", "url|mime".to_string()),
        ];

        self.paginate(
            base,
            QueryKind::CategoryFileGenerator,
            DEFAULT_RESULT_CAP,
            cancel,
            |value, acc: &mut Vec<ImagePage>| extract_pages(value, acc),
        )
        .await
    }

    /// All images whose name starts with `prefix`
    pub async fn all_images_with_prefix(
        &self,
        prefix: &str,
        cap: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<AllImage>> {
        let base = vec![
            ("list", "allimages".to_string()),
            ("aiprefix", prefix.to_string()),
            ("ailimit", DEFAULT_PAGE_LIMIT.to_string()),
        ];

        self.paginate(base, QueryKind::AllImages, cap, cancel, |value, acc: &mut Vec<AllImage>| {
            let images = value.get("query").and_then(|q| q.get("allimages")).cloned();
            if let Some(images) = images {
                match serde_json::from_value::<Vec<AllImage>>(images) {
                    Ok(images) => acc.extend(images),
                    Err(e) => warn!("allimages page decode failed: {}", e),
                }
            }
        })
        .await
    }

    /// Resolve imageinfo for a batch of file-page titles
    ///
    /// Titles are chunked because the wiki API limits batched title lookups.
    /// A failed chunk is skipped; the remaining chunks still resolve.
    pub async fn image_info_for_titles(
        &self,
        titles: &[String],
        cancel: &CancelToken,
    ) -> Result<Vec<ImagePage>> {
        let mut pages = Vec::new();

        for chunk in titles.chunks(TITLE_CHUNK) {
            cancel.check()?;

            let params = vec![
                ("action", "query".to_string()),
                ("format", "json".to_string()),
                ("titles", chunk.join("|")),
                ("prop", "imageinfo".to_string()),
                ("iiprop", "url|mime".to_string()),
            ];

            match self.get_api_json(&params).await {
                Ok(value) => extract_pages(&value, &mut pages),
                Err(WikiVoiceError::Cancelled) => return Err(WikiVoiceError::Cancelled),
                Err(e) => warn!("imageinfo chunk failed, skipping {} titles: {}", chunk.len(), e),
            }
        }

        Ok(pages)
    }

    /// Shared pagination loop
    ///
    /// `extract` pulls this page's items out of the decoded response and
    /// appends them to the accumulator.
    async fn paginate<T, F>(
        &self,
        base_params: Vec<(&'static str, String)>,
        kind: QueryKind,
        cap: usize,
        cancel: &CancelToken,
        mut extract: F,
    ) -> Result<Vec<T>>
    where
        F: FnMut(&Value, &mut Vec<T>),
    {
        let mut acc: Vec<T> = Vec::new();
        let mut token: Option<String> = None;
        let mut first_page = true;

        loop {
            cancel.check()?;

            let mut params: Vec<(&str, String)> = vec![
                ("action", "query".to_string()),
                ("format", "json".to_string()),
            ];
            params.extend(base_params.iter().cloned());
            if let Some(ref token) = token {
                params.push((kind.continue_param(), token.clone()));
            }

            let value = match self.get_api_json(&params).await {
                Ok(value) => value,
                Err(WikiVoiceError::Cancelled) => return Err(WikiVoiceError::Cancelled),
                Err(e @ WikiVoiceError::InvalidApiResponse { .. }) => {
                    // Decode failure loses only this page.
                    warn!("query page decode failed, keeping {} items: {}", acc.len(), e);
                    return Ok(acc);
                }
                Err(e) if first_page => return Err(e),
                Err(e) => {
                    warn!("pagination stopped after {} items: {}", acc.len(), e);
                    return Ok(acc);
                }
            };

            first_page = false;
            extract(&value, &mut acc);

            if acc.len() >= cap {
                acc.truncate(cap);
                return Ok(acc);
            }

            token = continuation_token(&value, kind);
            if token.is_none() {
                return Ok(acc);
            }
        }
    }
}

/// Pull `query.pages` values (any order) into the accumulator
fn extract_pages(value: &Value, acc: &mut Vec<ImagePage>) {
    let Some(pages) = value.get("query").and_then(|q| q.get("pages")).and_then(|p| p.as_object())
    else {
        return;
    };

    for page in pages.values() {
        match serde_json::from_value::<ImagePage>(page.clone()) {
            Ok(page) => acc.push(page),
            Err(e) => warn!("imageinfo page entry decode failed: {}", e),
        }
    }
}
