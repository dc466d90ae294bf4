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


//! Per-content download state machine
//!
//! A [`DownloadSession`] wraps the engine's session for one content item and
//! owns its [`DownloadState`] and [`DownloadProgress`]. Commands validate the
//! current state before anything is sent to the engine, so a rejected command
//! never mutates state. Engine callbacks are folded in through
//! [`DownloadSession::apply_event`].
//!
//! Suspend and resume are requests: the state only moves once the engine
//! confirms with [`EngineEvent::Suspended`] or [`EngineEvent::Resumed`].
//! Until then the request is pending and repeating it is a no-op.
//!
//! The session is owned by exactly one coordinator task and is never shared.

use crate::content::{ContentIdentifier, SourceDescriptor};
use crate::download::engine::{DownloadEngine, EngineEvent, EngineEventSender, EngineSession};
use crate::download::playback::{Bookmark, LicenseProvider, OfflinePlaybackHandle};
use crate::download::progress::{DownloadProgress, DownloadSnapshot, DownloadState};
use crate::download::tracks::{DownloadConfig, TrackSelection};
use crate::error::{OfflineError, Result};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Transitions kept in the session history
pub const HISTORY_CAPACITY: usize = 32;

/// One recorded state change
#[derive(Debug, Clone, PartialEq)]
pub struct StateTransition {
    pub from: DownloadState,
    pub to: DownloadState,
    /// Command or event that caused the change
    pub cause: &'static str,
    pub at: DateTime<Utc>,
}

/// What applying an engine event changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventOutcome {
    pub state_changed: bool,
    pub progress_changed: bool,
    /// Event was not valid in the current state and had no effect
    pub ignored: bool,
}

impl EventOutcome {
    fn ignored() -> Self {
        Self {
            ignored: true,
            ..Self::default()
        }
    }
}

/// Engine request sent but not yet confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Suspend,
    Resume,
}

pub struct DownloadSession {
    content_id: ContentIdentifier,
    source: SourceDescriptor,
    engine: Arc<dyn EngineSession>,
    state: DownloadState,
    progress: DownloadProgress,
    tracks: Option<TrackSelection>,
    config: Option<DownloadConfig>,
    pending: Option<Pending>,
    history: VecDeque<StateTransition>,
}

impl DownloadSession {
    /// Wrap an engine session, adopting the state it reports
    pub fn new(
        content_id: ContentIdentifier,
        source: SourceDescriptor,
        engine: Arc<dyn EngineSession>,
    ) -> Self {
        let state = DownloadState::from_raw(&engine.reported_state());
        let mut progress = DownloadProgress::new();
        match state {
            DownloadState::NotDownloaded => {}
            DownloadState::Downloaded => progress.complete(),
            _ => {
                progress.advance(engine.reported_progress());
            }
        }

        debug!(content_id = %content_id, state = %state, "Opened download session");

        Self {
            content_id,
            source,
            engine,
            state,
            progress,
            tracks: None,
            config: None,
            pending: None,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    /// Ask the engine for a session and wrap it
    pub async fn open(
        engine: &dyn DownloadEngine,
        content_id: ContentIdentifier,
        source: SourceDescriptor,
        events: EngineEventSender,
    ) -> Result<Self> {
        let session = engine.create_session(&content_id, &source, events).await?;
        Ok(Self::new(content_id, source, session))
    }

    pub fn content_id(&self) -> &ContentIdentifier {
        &self.content_id
    }

    pub fn source(&self) -> &SourceDescriptor {
        &self.source
    }

    pub fn state(&self) -> DownloadState {
        self.state
    }

    pub fn progress(&self) -> f64 {
        self.progress.percent()
    }

    pub fn snapshot(&self) -> DownloadSnapshot {
        DownloadSnapshot::new(self.content_id.clone(), self.state, self.progress)
    }

    /// Most recently fetched tracks
    pub fn tracks(&self) -> Option<&TrackSelection> {
        self.tracks.as_ref()
    }

    /// Config the current download was started with
    pub fn config(&self) -> Option<&DownloadConfig> {
        self.config.as_ref()
    }

    /// Whether a suspend or resume is waiting for the engine
    pub fn is_awaiting_confirmation(&self) -> bool {
        self.pending.is_some()
    }

    /// Recent transitions, oldest first
    pub fn history(&self) -> impl Iterator<Item = &StateTransition> {
        self.history.iter()
    }

    /// Fetch the tracks offered for this content
    ///
    /// Every call re-fetches and replaces the cached selection.
    pub async fn fetch_available_tracks(&mut self) -> Result<TrackSelection> {
        let tracks = self.engine.fetch_available_tracks().await.map_err(|e| match e {
            OfflineError::TrackFetch(_) => e,
            other => OfflineError::TrackFetch(other.to_string()),
        })?;

        if tracks.is_empty() {
            return Err(OfflineError::TrackFetch(format!(
                "No tracks offered for {}",
                self.content_id
            )));
        }

        let selection = TrackSelection::new(self.content_id.clone(), tracks);
        debug!(content_id = %self.content_id, tracks = selection.len(), "Fetched available tracks");
        self.tracks = Some(selection.clone());
        Ok(selection)
    }

    /// Begin downloading the selected tracks
    pub async fn start(&mut self, tracks: TrackSelection, config: DownloadConfig) -> Result<()> {
        if self.state != DownloadState::NotDownloaded {
            return Err(OfflineError::invalid_transition("start", self.state));
        }
        if tracks.content_id() != &self.content_id {
            return Err(OfflineError::invalid_input(format!(
                "Tracks belong to {}, not {}",
                tracks.content_id(),
                self.content_id
            )));
        }
        config.validate(&tracks)?;

        self.engine.start(&tracks, &config).await?;

        self.progress.reset();
        self.tracks = Some(tracks);
        self.config = Some(config);
        self.transition(DownloadState::Downloading, "start");
        Ok(())
    }

    /// Ask the engine to suspend a running download
    ///
    /// The session stays `Downloading` until [`EngineEvent::Suspended`]
    /// arrives. Returns `false` when already suspended or when a suspend is
    /// already pending.
    pub async fn suspend(&mut self) -> Result<bool> {
        match self.state {
            DownloadState::Suspended => Ok(false),
            DownloadState::Downloading if self.pending == Some(Pending::Suspend) => Ok(false),
            DownloadState::Downloading => {
                self.engine.suspend().await?;
                self.pending = Some(Pending::Suspend);
                debug!(content_id = %self.content_id, "Suspend requested");
                Ok(true)
            }
            state => Err(OfflineError::invalid_transition("suspend", state)),
        }
    }

    /// Ask the engine to resume a suspended download
    ///
    /// The session stays `Suspended` until [`EngineEvent::Resumed`] arrives.
    /// Returns `false` when a resume is already pending.
    pub async fn resume(&mut self) -> Result<bool> {
        if self.state != DownloadState::Suspended {
            return Err(OfflineError::invalid_transition("resume", self.state));
        }
        if self.pending == Some(Pending::Resume) {
            return Ok(false);
        }

        self.engine.resume().await?;
        self.pending = Some(Pending::Resume);
        debug!(content_id = %self.content_id, "Resume requested");
        Ok(true)
    }

    /// Request cancellation
    ///
    /// The session stays `Canceling` until the engine confirms with
    /// [`EngineEvent::Canceled`]. Returns `false` when already canceling.
    pub async fn cancel(&mut self) -> Result<bool> {
        match self.state {
            DownloadState::Canceling => Ok(false),
            DownloadState::Downloading | DownloadState::Suspended => {
                self.engine.cancel().await?;
                self.transition(DownloadState::Canceling, "cancel");
                Ok(true)
            }
            state => Err(OfflineError::invalid_transition("cancel", state)),
        }
    }

    /// Remove downloaded data from disk
    ///
    /// On failure the session stays `Downloaded`.
    pub async fn delete(&mut self) -> Result<()> {
        if self.state != DownloadState::Downloaded {
            return Err(OfflineError::invalid_transition("delete", self.state));
        }

        self.engine.delete_offline_data().await.map_err(|e| match e {
            OfflineError::Deletion(_) => e,
            other => OfflineError::Deletion(other.to_string()),
        })?;

        self.tracks = None;
        self.config = None;
        self.progress.reset();
        self.transition(DownloadState::NotDownloaded, "delete");
        Ok(())
    }

    /// Build a handle for local playback of the finished download
    pub async fn create_offline_playback_handle(
        &self,
        license_provider: Option<Arc<dyn LicenseProvider>>,
    ) -> Result<OfflinePlaybackHandle> {
        if self.state != DownloadState::Downloaded {
            return Err(OfflineError::NotDownloaded(format!(
                "{} is {}",
                self.content_id, self.state
            )));
        }

        let blob = self.engine.offline_bookmark().await?;
        let bookmark = Bookmark::from_blob(&blob)
            .map_err(|e| OfflineError::asset_missing(self.content_id.as_str(), e.to_string()))?;
        let location = bookmark.resolve(&self.content_id).await?;

        Ok(OfflinePlaybackHandle::new(
            self.content_id.clone(),
            location,
            license_provider,
        ))
    }

    /// Fold an engine callback into the session
    pub fn apply_event(&mut self, event: &EngineEvent) -> EventOutcome {
        let outcome = match (event, self.state) {
            (EngineEvent::ProgressChanged { percent }, DownloadState::Downloading) => EventOutcome {
                progress_changed: self.progress.advance(*percent),
                ..EventOutcome::default()
            },

            (EngineEvent::Suspended, DownloadState::Downloading) => {
                self.transition(DownloadState::Suspended, "engine_suspended");
                EventOutcome {
                    state_changed: true,
                    ..EventOutcome::default()
                }
            }
            // Repeated confirmation
            (EngineEvent::Suspended, DownloadState::Suspended) => EventOutcome::default(),

            (EngineEvent::Resumed { percent }, DownloadState::Suspended) => {
                self.transition(DownloadState::Downloading, "engine_resumed");
                EventOutcome {
                    state_changed: true,
                    progress_changed: self.progress.advance(*percent),
                    ignored: false,
                }
            }
            (EngineEvent::Resumed { percent }, DownloadState::Downloading) => EventOutcome {
                progress_changed: self.progress.advance(*percent),
                ..EventOutcome::default()
            },

            (EngineEvent::Canceled, DownloadState::Canceling) => {
                self.finish_cancel();
                EventOutcome {
                    state_changed: true,
                    progress_changed: true,
                    ignored: false,
                }
            }
            (EngineEvent::Canceled, DownloadState::Downloading | DownloadState::Suspended) => {
                // Engine canceled on its own
                self.transition(DownloadState::Canceling, "engine_canceled");
                self.finish_cancel();
                EventOutcome {
                    state_changed: true,
                    progress_changed: true,
                    ignored: false,
                }
            }

            (EngineEvent::Finished { .. }, DownloadState::Downloading | DownloadState::Suspended) => {
                if self.state == DownloadState::Suspended {
                    self.transition(DownloadState::Downloading, "engine_finished");
                }
                self.progress.complete();
                self.transition(DownloadState::Downloaded, "engine_finished");
                EventOutcome {
                    state_changed: true,
                    progress_changed: true,
                    ignored: false,
                }
            }

            // Errors are handled by the coordinator
            (EngineEvent::Error { .. }, _) => EventOutcome::default(),

            _ => EventOutcome::ignored(),
        };

        if outcome.ignored {
            warn!(
                content_id = %self.content_id,
                event = event.name(),
                state = %self.state,
                "Ignoring engine event not valid in current state"
            );
        }
        outcome
    }

    fn finish_cancel(&mut self) {
        self.tracks = None;
        self.config = None;
        self.progress.reset();
        self.transition(DownloadState::NotDownloaded, "engine_canceled");
    }

    fn transition(&mut self, to: DownloadState, cause: &'static str) {
        let from = self.state;
        debug_assert!(from.can_transition_to(to), "{} -> {}", from, to);

        self.state = to;
        self.pending = None;
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(StateTransition {
            from,
            to,
            cause,
            at: Utc::now(),
        });

        debug!(content_id = %self.content_id, from = %from, to = %to, cause, "Download state changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::engine::event_channel;
    use crate::download::simulated::SimulatedEngine;
    use crate::download::tracks::Track;

    fn source() -> SourceDescriptor {
        SourceDescriptor::parse_hls("https://cdn.example.com/x/master.m3u8", "X").unwrap()
    }

    fn tracks() -> Vec<Track> {
        vec![
            Track::video("v1", "1080p", 4_500_000),
            Track::audio("a1", "English", "en"),
        ]
    }

    async fn open(engine: &SimulatedEngine) -> DownloadSession {
        let (tx, _rx) = event_channel();
        let id = ContentIdentifier::new("X").unwrap();
        DownloadSession::open(engine, id, source(), tx).await.unwrap()
    }

    async fn downloading(engine: &SimulatedEngine) -> DownloadSession {
        let mut session = open(engine).await;
        let selection = session.fetch_available_tracks().await.unwrap();
        session
            .start(selection, DownloadConfig::default().with_minimum_bitrate(825_000))
            .await
            .unwrap();
        session
    }

    #[tokio::test]
    async fn test_unknown_reported_state_defaults_to_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let id = ContentIdentifier::new("X").unwrap();
        let engine = SimulatedEngine::new(dir.path()).with_reported_state(&id, "exporting", 12.0);

        let session = open(&engine).await;
        assert_eq!(session.state(), DownloadState::NotDownloaded);
        assert_eq!(session.progress(), 0.0);
    }

    #[tokio::test]
    async fn test_adopts_reported_suspended_state() {
        let dir = tempfile::tempdir().unwrap();
        let id = ContentIdentifier::new("X").unwrap();
        let engine = SimulatedEngine::new(dir.path()).with_reported_state(&id, "suspended", 40.0);

        let mut session = open(&engine).await;
        assert_eq!(session.state(), DownloadState::Suspended);
        assert_eq!(session.progress(), 40.0);

        assert!(session.resume().await.unwrap());
        assert_eq!(session.state(), DownloadState::Suspended);
        session.apply_event(&EngineEvent::Resumed { percent: 40.0 });
        assert_eq!(session.state(), DownloadState::Downloading);
    }

    #[tokio::test]
    async fn test_track_fetch_failures() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SimulatedEngine::new(dir.path());
        let mut session = open(&engine).await;

        // No tracks configured
        let err = session.fetch_available_tracks().await.unwrap_err();
        assert!(matches!(err, OfflineError::TrackFetch(_)));

        let engine = SimulatedEngine::new(dir.path()).with_tracks(tracks());
        let mut session = open(&engine).await;
        engine.session(session.content_id()).unwrap().fail_track_fetch(Some("unreachable"));
        let err = session.fetch_available_tracks().await.unwrap_err();
        assert!(matches!(err, OfflineError::TrackFetch(_)));
        assert!(session.tracks().is_none());
    }

    #[tokio::test]
    async fn test_start_only_from_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SimulatedEngine::new(dir.path()).with_tracks(tracks());
        let mut session = downloading(&engine).await;
        assert_eq!(session.state(), DownloadState::Downloading);

        let selection = session.tracks().cloned().unwrap();
        let err = session.start(selection, DownloadConfig::default()).await.unwrap_err();
        assert!(matches!(
            err,
            OfflineError::InvalidTransition { command: "start", state: DownloadState::Downloading }
        ));
        assert_eq!(session.state(), DownloadState::Downloading);
    }

    #[tokio::test]
    async fn test_start_rejects_foreign_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SimulatedEngine::new(dir.path()).with_tracks(tracks());
        let mut session = open(&engine).await;

        let other = TrackSelection::new(ContentIdentifier::new("Y").unwrap(), tracks());
        assert!(session.start(other, DownloadConfig::default()).await.is_err());
        assert_eq!(session.state(), DownloadState::NotDownloaded);
    }

    #[tokio::test]
    async fn test_suspend_resume_cancel_edges() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SimulatedEngine::new(dir.path()).with_tracks(tracks());
        let mut session = downloading(&engine).await;

        assert!(session.suspend().await.unwrap());
        assert!(!session.suspend().await.unwrap());
        assert_eq!(session.state(), DownloadState::Downloading);
        assert!(session.apply_event(&EngineEvent::Suspended).state_changed);
        assert_eq!(session.state(), DownloadState::Suspended);
        assert!(!session.suspend().await.unwrap());

        assert!(session.resume().await.unwrap());
        assert!(!session.resume().await.unwrap());
        session.apply_event(&EngineEvent::Resumed { percent: 0.0 });
        assert!(session.resume().await.is_err());

        assert!(session.cancel().await.unwrap());
        assert!(!session.cancel().await.unwrap());
        assert_eq!(session.state(), DownloadState::Canceling);

        // Only the engine's confirmation finishes the cancel
        let outcome = session.apply_event(&EngineEvent::Canceled);
        assert!(outcome.state_changed);
        assert_eq!(session.state(), DownloadState::NotDownloaded);
        assert_eq!(session.progress(), 0.0);

        let sim = engine.session(session.content_id()).unwrap();
        assert_eq!(sim.calls("suspend"), 1);
        assert_eq!(sim.calls("resume"), 1);
        assert_eq!(sim.calls("cancel"), 1);
    }

    #[tokio::test]
    async fn test_unconfirmed_suspend_keeps_progress_flowing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SimulatedEngine::new(dir.path())
            .with_tracks(tracks())
            .with_auto_confirm_pause(false);
        let mut session = downloading(&engine).await;
        session.apply_event(&EngineEvent::ProgressChanged { percent: 40.0 });

        assert!(session.suspend().await.unwrap());
        assert!(session.is_awaiting_confirmation());
        assert_eq!(session.state(), DownloadState::Downloading);

        // The engine keeps downloading until it confirms
        assert!(session.apply_event(&EngineEvent::ProgressChanged { percent: 70.0 }).progress_changed);
        assert_eq!(session.progress(), 70.0);

        session.apply_event(&EngineEvent::Suspended);
        assert_eq!(session.state(), DownloadState::Suspended);
        assert!(!session.is_awaiting_confirmation());
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SimulatedEngine::new(dir.path()).with_tracks(tracks());
        let mut session = downloading(&engine).await;

        assert!(session.apply_event(&EngineEvent::ProgressChanged { percent: 45.0 }).progress_changed);
        assert!(!session.apply_event(&EngineEvent::ProgressChanged { percent: 30.0 }).progress_changed);
        assert!(!session.apply_event(&EngineEvent::ProgressChanged { percent: f64::NAN }).progress_changed);
        assert_eq!(session.progress(), 45.0);

        session.suspend().await.unwrap();
        session.apply_event(&EngineEvent::Suspended);
        session.apply_event(&EngineEvent::Resumed { percent: 20.0 });
        assert_eq!(session.state(), DownloadState::Downloading);
        assert_eq!(session.progress(), 45.0);
    }

    #[tokio::test]
    async fn test_engine_initiated_cancel_walks_through_canceling() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SimulatedEngine::new(dir.path()).with_tracks(tracks());
        let mut session = downloading(&engine).await;

        session.apply_event(&EngineEvent::Canceled);
        let states: Vec<_> = session.history().map(|t| t.to).collect();
        assert_eq!(
            states,
            vec![
                DownloadState::Downloading,
                DownloadState::Canceling,
                DownloadState::NotDownloaded
            ]
        );
    }

    #[tokio::test]
    async fn test_events_invalid_for_state_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SimulatedEngine::new(dir.path()).with_tracks(tracks());
        let mut session = open(&engine).await;

        assert!(session.apply_event(&EngineEvent::ProgressChanged { percent: 10.0 }).ignored);
        assert!(session.apply_event(&EngineEvent::Canceled).ignored);
        let finished = EngineEvent::Finished { bookmark: vec![1], license: None };
        assert!(session.apply_event(&finished).ignored);
        assert_eq!(session.state(), DownloadState::NotDownloaded);
    }

    #[tokio::test]
    async fn test_delete_and_playback_handle() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SimulatedEngine::new(dir.path()).with_tracks(tracks());
        let mut session = downloading(&engine).await;

        let err = session.create_offline_playback_handle(None).await.unwrap_err();
        assert!(matches!(err, OfflineError::NotDownloaded(_)));

        let sim = engine.session(session.content_id()).unwrap();
        let location = sim.finish().await.unwrap();
        let finished = EngineEvent::Finished { bookmark: Vec::new(), license: None };
        session.apply_event(&finished);
        assert_eq!(session.state(), DownloadState::Downloaded);
        assert_eq!(session.progress(), 100.0);

        let handle = session.create_offline_playback_handle(None).await.unwrap();
        assert_eq!(handle.location(), location.as_path());
        assert!(!handle.is_protected());

        sim.fail_deletion(Some("disk busy"));
        let err = session.delete().await.unwrap_err();
        assert!(matches!(err, OfflineError::Deletion(_)));
        assert_eq!(session.state(), DownloadState::Downloaded);

        sim.fail_deletion(None);
        session.delete().await.unwrap();
        assert_eq!(session.state(), DownloadState::NotDownloaded);
        assert!(!location.exists());
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SimulatedEngine::new(dir.path()).with_tracks(tracks());
        let mut session = downloading(&engine).await;

        for _ in 0..HISTORY_CAPACITY {
            session.suspend().await.unwrap();
            session.apply_event(&EngineEvent::Suspended);
            session.resume().await.unwrap();
            session.apply_event(&EngineEvent::Resumed { percent: 0.0 });
        }
        assert_eq!(session.history().count(), HISTORY_CAPACITY);
    }
}
