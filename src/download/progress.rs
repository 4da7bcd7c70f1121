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


//! Progress reporting and the observer boundary
//!
//! The GUI is out of scope; it only sees this surface. Events are
//! fire-and-forget: a sink must never block and gets no ordering promise
//! beyond the monotonic `completed` counter inside one batch (tasks finish
//! out of submission order under concurrency).
//!
//! Two ready-made sinks: [`NullSink`] discards everything,
//! [`ChannelSink`] forwards events into an unbounded channel the caller
//! drains on its own schedule.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Progress snapshot for one download batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Tasks finished so far, monotonically increasing within the batch
    pub completed: usize,
    /// Total tasks in the batch
    pub total: usize,
    /// Name of the most recently finished file
    pub current_name: String,
}

impl BatchProgress {
    /// Format progress as a display string
    pub fn display_string(&self) -> String {
        format!("[{}/{}] {}", self.completed, self.total, self.current_name)
    }
}

/// Terminal state of a single download task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileOutcome {
    /// Downloaded and renamed into place
    Completed,
    /// Destination already existed with content; no network call made
    Skipped,
    /// Failed; siblings unaffected
    Failed,
    /// Cancelled mid-flight; partial data cleaned up
    Cancelled,
}

/// Observer interface exposed to the excluded UI layer
pub trait EventSink: Send + Sync {
    /// Append-only log line
    fn log(&self, _message: &str) {}

    /// Batch progress update
    fn progress(&self, _progress: &BatchProgress) {}
}

/// Sink that discards all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {}

/// Event carried by a [`ChannelSink`]
#[derive(Debug, Clone)]
pub enum Event {
    Log(String),
    Progress(BatchProgress),
}

/// Sink that forwards events into a channel for the caller to drain
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
    /// Create a sink and the receiving end the caller drains
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl EventSink for ChannelSink {
    fn log(&self, message: &str) {
        // A dropped receiver means the UI has gone away; nothing to do.
        let _ = self.tx.send(Event::Log(message.to_string()));
    }

    fn progress(&self, progress: &BatchProgress) {
        let _ = self.tx.send(Event::Progress(progress.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_string() {
        let progress = BatchProgress {
            completed: 3,
            total: 12,
            current_name: "信-战斗-01.ogg".to_string(),
        };
        assert_eq!(progress.display_string(), "[3/12] 信-战斗-01.ogg");
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_events() {
        let (sink, mut rx) = ChannelSink::new();

        sink.log("hello");
        sink.progress(&BatchProgress {
            completed: 1,
            total: 2,
            current_name: "a.ogg".to_string(),
        });

        match rx.recv().await.unwrap() {
            Event::Log(line) => assert_eq!(line, "hello"),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            Event::Progress(p) => assert_eq!(p.completed, 1),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.log("into the void");
    }
}
