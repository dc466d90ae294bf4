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


//! In-process download engine
//!
//! `SimulatedEngine` implements the engine capability without any network
//! access. Progress, completion, cancel confirmations and errors are driven
//! by hand through [`SimulatedSession`], which makes it the engine behind the
//! integration tests and the `offline-cli simulate` command.
//!
//! Suspend and resume are confirmed immediately with the matching event
//! unless `with_auto_confirm_pause(false)` is set. Cancel is confirmed
//! immediately only with `with_auto_confirm_cancel(true)`.

use crate::content::{ContentIdentifier, SourceDescriptor};
use crate::download::engine::{DownloadEngine, EngineEvent, EngineEventSender, EngineSession};
use crate::download::playback::Bookmark;
use crate::download::tracks::{DownloadConfig, Track, TrackSelection};
use crate::error::{OfflineError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Extension of the placeholder media file
const OFFLINE_EXTENSION: &str = "offline";

#[derive(Debug, Clone)]
struct ReportedState {
    raw: String,
    progress: f64,
}

/// Engine double that keeps everything in process
#[derive(Clone)]
pub struct SimulatedEngine {
    storage_dir: PathBuf,
    tracks: Vec<Track>,
    auto_confirm_pause: bool,
    auto_confirm_cancel: bool,
    reported: HashMap<ContentIdentifier, ReportedState>,
    sessions: Arc<Mutex<HashMap<ContentIdentifier, Arc<SimulatedSession>>>>,
}

impl SimulatedEngine {
    /// Placeholder media files are written below `storage_dir`
    pub fn new<P: Into<PathBuf>>(storage_dir: P) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            tracks: Vec::new(),
            auto_confirm_pause: true,
            auto_confirm_cancel: false,
            reported: HashMap::new(),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Tracks offered for every content item
    pub fn with_tracks(mut self, tracks: Vec<Track>) -> Self {
        self.tracks = tracks;
        self
    }

    /// Confirm suspends and resumes as soon as they are requested
    pub fn with_auto_confirm_pause(mut self, enabled: bool) -> Self {
        self.auto_confirm_pause = enabled;
        self
    }

    /// Confirm cancels with `Canceled` as soon as they are requested
    pub fn with_auto_confirm_cancel(mut self, enabled: bool) -> Self {
        self.auto_confirm_cancel = enabled;
        self
    }

    /// State the engine reports when a session for `content_id` is opened
    pub fn with_reported_state<S: Into<String>>(
        mut self,
        content_id: &ContentIdentifier,
        raw_state: S,
        progress: f64,
    ) -> Self {
        self.reported.insert(
            content_id.clone(),
            ReportedState {
                raw: raw_state.into(),
                progress,
            },
        );
        self
    }

    /// Latest session opened for `content_id`
    pub fn session(&self, content_id: &ContentIdentifier) -> Option<Arc<SimulatedSession>> {
        self.sessions.lock().get(content_id).cloned()
    }
}

#[async_trait]
impl DownloadEngine for SimulatedEngine {
    async fn create_session(
        &self,
        content_id: &ContentIdentifier,
        source: &SourceDescriptor,
        events: EngineEventSender,
    ) -> Result<Arc<dyn EngineSession>> {
        let reported = self.reported.get(content_id).cloned().unwrap_or(ReportedState {
            raw: "not_downloaded".to_string(),
            progress: 0.0,
        });

        let session = Arc::new(SimulatedSession {
            content_id: content_id.clone(),
            source: source.clone(),
            file_path: self
                .storage_dir
                .join(format!("{}.{}", content_id, OFFLINE_EXTENSION)),
            events,
            reported,
            tracks: self.tracks.clone(),
            auto_confirm_pause: self.auto_confirm_pause,
            auto_confirm_cancel: self.auto_confirm_cancel,
            state: Mutex::new(SessionState::default()),
        });

        self.sessions
            .lock()
            .insert(content_id.clone(), session.clone());
        debug!(content_id = %content_id, "Simulated engine session created");

        Ok(session)
    }
}

#[derive(Debug, Default)]
struct SessionState {
    calls: HashMap<&'static str, usize>,
    last_progress: f64,
    track_fetch_failure: Option<String>,
    deletion_failure: Option<String>,
    started_with: Option<DownloadConfig>,
    finished: bool,
}

/// Engine session driven by hand
pub struct SimulatedSession {
    content_id: ContentIdentifier,
    source: SourceDescriptor,
    file_path: PathBuf,
    events: EngineEventSender,
    reported: ReportedState,
    tracks: Vec<Track>,
    auto_confirm_pause: bool,
    auto_confirm_cancel: bool,
    state: Mutex<SessionState>,
}

impl SimulatedSession {
    /// Number of times `command` was invoked
    ///
    /// Commands: `fetch_available_tracks`, `start`, `suspend`, `resume`,
    /// `cancel`, `delete_offline_data`, `offline_bookmark`.
    pub fn calls(&self, command: &str) -> usize {
        self.state.lock().calls.get(command).copied().unwrap_or(0)
    }

    /// Config passed to the most recent `start`
    pub fn last_config(&self) -> Option<DownloadConfig> {
        self.state.lock().started_with.clone()
    }

    /// Make track fetches fail, or succeed again with `None`
    pub fn fail_track_fetch(&self, message: Option<&str>) {
        self.state.lock().track_fetch_failure = message.map(str::to_string);
    }

    /// Make deletions fail, or succeed again with `None`
    pub fn fail_deletion(&self, message: Option<&str>) {
        self.state.lock().deletion_failure = message.map(str::to_string);
    }

    /// Report download progress
    pub fn emit_progress(&self, percent: f64) {
        self.state.lock().last_progress = percent;
        self.emit(EngineEvent::ProgressChanged { percent });
    }

    /// Write the placeholder file and report completion
    ///
    /// Protected sources also hand over a license produced by the source's
    /// license strategy. Returns the location of the placeholder file.
    pub async fn finish(&self) -> Result<PathBuf> {
        if let Some(parent) = self.file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.file_path, self.source.title.as_bytes()).await?;

        let bookmark = Bookmark::new(&self.file_path).to_blob()?;
        let license = self.source.drm.as_ref().map(|drm| {
            let raw = format!("license:{}", self.content_id).into_bytes();
            drm.strategy.prepare_license(raw)
        });

        {
            let mut state = self.state.lock();
            state.finished = true;
            state.last_progress = 100.0;
        }
        self.emit(EngineEvent::Finished { bookmark, license });
        Ok(self.file_path.clone())
    }

    /// Report completion with caller-supplied credential blobs
    pub fn finish_with(&self, bookmark: Vec<u8>, license: Option<Vec<u8>>) {
        {
            let mut state = self.state.lock();
            state.finished = true;
            state.last_progress = 100.0;
        }
        self.emit(EngineEvent::Finished { bookmark, license });
    }

    /// Confirm a pending suspend
    pub fn confirm_suspend(&self) {
        self.emit(EngineEvent::Suspended);
    }

    /// Confirm a pending resume
    pub fn confirm_resume(&self) {
        let percent = self.state.lock().last_progress;
        self.emit(EngineEvent::Resumed { percent });
    }

    /// Confirm a pending cancel
    pub fn confirm_cancel(&self) {
        self.emit(EngineEvent::Canceled);
    }

    /// Report an unrecoverable error
    pub fn fail<S: Into<String>>(&self, message: S) {
        self.emit(EngineEvent::Error {
            message: message.into(),
        });
    }

    fn record(&self, command: &'static str) {
        *self.state.lock().calls.entry(command).or_insert(0) += 1;
    }

    fn emit(&self, event: EngineEvent) {
        // Receiver gone means the coordinator has shut down
        if self.events.send(event).is_err() {
            debug!(content_id = %self.content_id, "Dropping simulated event, no receiver");
        }
    }
}

#[async_trait]
impl EngineSession for SimulatedSession {
    fn reported_state(&self) -> String {
        self.reported.raw.clone()
    }

    fn reported_progress(&self) -> f64 {
        self.reported.progress
    }

    async fn fetch_available_tracks(&self) -> Result<Vec<Track>> {
        self.record("fetch_available_tracks");
        let failure = self.state.lock().track_fetch_failure.clone();
        if let Some(message) = failure {
            return Err(OfflineError::TrackFetch(message));
        }
        Ok(self.tracks.clone())
    }

    async fn start(&self, _tracks: &TrackSelection, config: &DownloadConfig) -> Result<()> {
        self.record("start");
        let mut state = self.state.lock();
        state.started_with = Some(config.clone());
        state.finished = false;
        state.last_progress = 0.0;
        Ok(())
    }

    async fn suspend(&self) -> Result<()> {
        self.record("suspend");
        if self.auto_confirm_pause {
            self.confirm_suspend();
        }
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.record("resume");
        if self.auto_confirm_pause {
            self.confirm_resume();
        }
        Ok(())
    }

    async fn cancel(&self) -> Result<()> {
        self.record("cancel");
        if self.auto_confirm_cancel {
            self.emit(EngineEvent::Canceled);
        }
        Ok(())
    }

    async fn delete_offline_data(&self) -> Result<()> {
        self.record("delete_offline_data");
        let failure = self.state.lock().deletion_failure.clone();
        if let Some(message) = failure {
            return Err(OfflineError::Deletion(message));
        }

        match tokio::fs::remove_file(&self.file_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(OfflineError::Deletion(e.to_string())),
        }
        self.state.lock().finished = false;
        Ok(())
    }

    async fn offline_bookmark(&self) -> Result<Vec<u8>> {
        self.record("offline_bookmark");
        let finished = self.state.lock().finished;
        if !finished {
            return Err(OfflineError::NotDownloaded(self.content_id.to_string()));
        }
        Bookmark::new(&self.file_path).to_blob()
    }
}
