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


//! Core library of the WikiVoice desktop app
//!
//! Everything the GUI needs to turn a search keyword into voice files on
//! disk: the wiki API client and query protocol (`api`), category grouping,
//! tree scanning and file resolution (`catalog`), the bounded-concurrency
//! download engine (`download`), session caches (`cache`) and the
//! [`session::WikiSession`] composition root that wires it all together.
//!
//! The GUI itself lives elsewhere; it observes this crate through
//! [`download::progress::EventSink`] and drives it through `WikiSession`.

pub mod api;
pub mod cache;
pub mod cancel;
pub mod catalog;
pub mod download;
pub mod error;
pub mod session;

// Re-export the surface the GUI works with
pub use api::{ClientConfig, WikiClient};
pub use cancel::CancelToken;
pub use catalog::{CharacterGroup, FileEntry};
pub use download::{BatchProgress, BatchReport, ChannelSink, DownloadConfig, EventSink, NullSink};
pub use error::{Result, WikiVoiceError};
pub use session::{SessionConfig, WikiSession};
