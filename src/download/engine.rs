// OfflineKit - Offline download lifecycle core for mobile video players
// Copyright (C) 2025 Henning Berge
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


//! Download engine capability
//!
//! The streaming engine that fetches segments, stores them and acquires
//! licenses lives outside this crate. It is consumed only through the two
//! traits below. Engine callbacks are delivered as [`EngineEvent`]s over an
//! unbounded channel handed to the engine when a session is created, so the
//! engine never blocks on the coordinator and event order is preserved.

use crate::content::{ContentIdentifier, SourceDescriptor};
use crate::download::tracks::{DownloadConfig, Track, TrackSelection};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Callback from the engine about one content item
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Download percentage changed
    ProgressChanged { percent: f64 },
    /// All data is on disk
    Finished {
        /// Resolvable location reference for offline playback
        bookmark: Vec<u8>,
        /// Persistable license, for protected content
        license: Option<Vec<u8>>,
    },
    /// Engine confirmed a suspend
    Suspended,
    /// Engine confirmed a resume at the given percentage
    Resumed { percent: f64 },
    /// Engine confirmed a cancel, or canceled on its own
    Canceled,
    /// Unrecoverable download error
    Error { message: String },
}

impl EngineEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::ProgressChanged { .. } => "progress_changed",
            EngineEvent::Finished { .. } => "finished",
            EngineEvent::Suspended => "suspended",
            EngineEvent::Resumed { .. } => "resumed",
            EngineEvent::Canceled => "canceled",
            EngineEvent::Error { .. } => "error",
        }
    }
}

pub type EngineEventSender = mpsc::UnboundedSender<EngineEvent>;
pub type EngineEventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Create the channel an engine session reports through
pub fn event_channel() -> (EngineEventSender, EngineEventReceiver) {
    mpsc::unbounded_channel()
}

/// Factory for per-content engine sessions
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    /// Open (or reattach to) the engine's session for `content_id`
    ///
    /// The session reports every callback through `events`.
    async fn create_session(
        &self,
        content_id: &ContentIdentifier,
        source: &SourceDescriptor,
        events: EngineEventSender,
    ) -> Result<Arc<dyn EngineSession>>;
}

/// Engine-side handle for one content item
///
/// Command methods only request a change. Confirmations arrive later as
/// [`EngineEvent`]s.
#[async_trait]
pub trait EngineSession: Send + Sync {
    /// Raw state as reported by the engine; decoded with a safe default
    fn reported_state(&self) -> String;

    /// Percentage already downloaded when the session was opened
    fn reported_progress(&self) -> f64;

    async fn fetch_available_tracks(&self) -> Result<Vec<Track>>;

    async fn start(&self, tracks: &TrackSelection, config: &DownloadConfig) -> Result<()>;

    async fn suspend(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    async fn cancel(&self) -> Result<()>;

    /// Remove the downloaded data from disk
    async fn delete_offline_data(&self) -> Result<()>;

    /// Bookmark of the finished download, when the engine can produce one
    async fn offline_bookmark(&self) -> Result<Vec<u8>>;
}
