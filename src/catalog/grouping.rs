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


//! Category grouping engine
//!
//! Partitions the flat category titles returned by a search into one group
//! per real-world entity, using a longest-common-prefix heuristic: titles
//! are processed shortest clean name first, so the most general category of
//! an entity always claims the group before its longer variant siblings are
//! considered. Every input title lands in at most one group.
//!
//! Display names are resolved against an optional authoritative name list
//! (exact match, then a name the core is an extension of, then a name
//! extending the core, then the core itself).

use lazy_static::lazy_static;
use regex::Regex;

/// Voice category suffixes, checked in order
pub const VOICE_SUFFIXES: [&str; 2] = ["语音", "Voice"];

lazy_static! {
    /// Category namespace prefixes, canonical and localized
    static ref CATEGORY_PREFIX_RE: Regex =
        Regex::new(r"^(?:Category|分类|分類):").expect("category prefix regex");
}

/// One logical entity discovered by a search
///
/// Replaced wholesale on the next search. `member_categories` holds the
/// titles claimed at grouping time; it is overwritten once when the tree
/// scanner records the fully expanded subcategory list for the selected
/// group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterGroup {
    /// Resolved display name
    pub entity_name: String,
    /// Canonical (shortest, prefix-matching) category title
    pub root_category: String,
    /// Category titles assigned to this group
    pub member_categories: Vec<String>,
}

/// Strip the category namespace prefix from a title
pub fn strip_category_prefix(title: &str) -> &str {
    match CATEGORY_PREFIX_RE.find(title) {
        Some(m) => &title[m.end()..],
        None => title,
    }
}

/// Strip a voice suffix if present
fn strip_voice_suffix(name: &str) -> Option<&str> {
    VOICE_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
}

fn has_voice_suffix(name: &str) -> bool {
    VOICE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Resolve a group's display name against the authoritative name list
///
/// Preference order: exact match, the longest name the core extends, the
/// shortest name extending the core, the core itself. Ties are broken
/// lexicographically so resolution is deterministic.
fn resolve_entity_name(core: &str, known_names: &[String]) -> String {
    if known_names.is_empty() {
        return core.to_string();
    }

    if known_names.iter().any(|n| n == core) {
        return core.to_string();
    }

    let mut prefixes: Vec<&String> = known_names
        .iter()
        .filter(|n| !n.is_empty() && core.starts_with(n.as_str()))
        .collect();
    if !prefixes.is_empty() {
        prefixes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        return prefixes[0].clone();
    }

    let mut extensions: Vec<&String> = known_names
        .iter()
        .filter(|n| n.starts_with(core))
        .collect();
    if !extensions.is_empty() {
        extensions.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        return extensions[0].clone();
    }

    core.to_string()
}

/// Partition raw category titles into per-entity groups
///
/// In voice-only mode the group core is the clean name with the voice
/// suffix stripped, and claimed members must themselves carry the suffix
/// (the seed always claims itself, so no title is dropped). Groups come
/// back sorted by display name.
pub fn group_categories(
    titles: &[String],
    voice_only: bool,
    known_names: &[String],
) -> Vec<CharacterGroup> {
    // Shortest clean name first. The sort is stable, so equally short names
    // keep their input order and the tie-break is deterministic.
    let mut order: Vec<usize> = (0..titles.len()).collect();
    order.sort_by_key(|&i| strip_category_prefix(&titles[i]).chars().count());

    let mut assigned = vec![false; titles.len()];
    let mut groups = Vec::new();

    for &seed in &order {
        if assigned[seed] {
            continue;
        }

        let seed_clean = strip_category_prefix(&titles[seed]);
        let core = if voice_only {
            strip_voice_suffix(seed_clean).unwrap_or(seed_clean)
        } else {
            seed_clean
        };
        if core.is_empty() {
            continue;
        }

        let mut members = Vec::new();
        for &candidate in &order {
            if assigned[candidate] {
                continue;
            }
            let clean = strip_category_prefix(&titles[candidate]);
            let claimed = if candidate == seed {
                true
            } else if voice_only {
                clean.starts_with(core) && has_voice_suffix(clean)
            } else {
                clean.starts_with(core)
            };
            if claimed {
                assigned[candidate] = true;
                members.push(titles[candidate].clone());
            }
        }

        groups.push(CharacterGroup {
            entity_name: resolve_entity_name(core, known_names),
            root_category: titles[seed].clone(),
            member_categories: members,
        });
    }

    groups.sort_by(|a, b| a.entity_name.cmp(&b.entity_name));
    groups
}
