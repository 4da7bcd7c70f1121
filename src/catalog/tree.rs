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


//! Category tree scanner
//!
//! Breadth-first traversal over subcategory membership edges. A node enters
//! the visited set at enqueue time, before its children are fetched, which
//! makes the traversal safe against wikis where a category lists itself or
//! an ancestor as a subcategory. Each dequeued node costs one paginated
//! members query, so callers cache the result per root for the session.
//!
//! Output order is deterministic: root first, the remaining titles sorted
//! lexicographically.

use std::collections::{HashSet, VecDeque};
use std::future::Future;

use crate::api::client::WikiClient;
use crate::api::query::MemberKind;
use crate::cancel::CancelToken;
use crate::error::Result;

/// BFS over an arbitrary child-lookup function
///
/// `children_of` resolves the direct subcategories of one title. Kept
/// generic so the traversal can be exercised against an in-memory graph.
pub async fn scan_tree_with<F, Fut>(
    root: &str,
    mut children_of: F,
    cancel: &CancelToken,
) -> Result<Vec<String>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Vec<String>>>,
{
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    visited.insert(root.to_string());
    queue.push_back(root.to_string());

    while let Some(current) = queue.pop_front() {
        cancel.check()?;

        let children = children_of(current).await?;
        for child in children {
            if visited.insert(child.clone()) {
                queue.push_back(child);
            }
        }
    }

    let mut rest: Vec<String> = visited.into_iter().filter(|t| t != root).collect();
    rest.sort();

    let mut ordered = Vec::with_capacity(rest.len() + 1);
    ordered.push(root.to_string());
    ordered.extend(rest);
    Ok(ordered)
}

impl WikiClient {
    /// Transitive subcategory closure of `root`, root first then sorted
    pub async fn scan_category_tree(
        &self,
        root: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<String>> {
        scan_tree_with(
            root,
            |category| async move {
                let members = self
                    .category_members(&category, MemberKind::Subcategory, cancel)
                    .await?;
                Ok(members.into_iter().map(|m| m.title).collect())
            },
            cancel,
        )
        .await
    }
}
