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


//! Wiki HTTP access
//!
//! `client` is the raw HTTP adapter (headers, cookies, throttle retries);
//! `query` is the MediaWiki `action=query` protocol on top of it
//! (request building, typed decode, continuation handling).

pub mod client;
pub mod query;

// Re-export commonly used types
pub use client::{ClientConfig, WikiClient};
pub use query::{AllImage, CategoryMember, ImagePage, MemberKind, QueryKind, SearchHit};
