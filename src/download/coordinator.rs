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


//! Download coordinator
//!
//! One coordinator task runs per content identifier. It is the single point
//! where the download state is mutated and where UI events are produced.
//!
//! # Inputs (consumed in this priority order)
//! 1. Engine events from the session's channel
//! 2. Network status changes from the [`NetworkMonitor`]
//! 3. Commands from [`DownloadCoordinator`] handles, each answered over a oneshot
//!
//! # Outputs
//! - A `watch` channel holding the latest [`DownloadSnapshot`]
//! - A `broadcast` channel of [`CoordinatorEvent`]s, delivered in the order
//!   the task produced them
//!
//! # Policy
//! - Downloads and resumes are refused while the network is unavailable
//! - Losing the network requests one suspend; the notice is posted once the
//!   engine confirms it
//! - Regaining the network only prompts; it never resumes on its own
//! - Credentials from a finished download are stored before `Downloaded` is published
//! - An engine error cancels the in-flight download, then is reported

use crate::config::{CoordinatorConfig, DeletionOrder};
use crate::content::{ContentIdentifier, SourceDescriptor};
use crate::download::engine::{event_channel, DownloadEngine, EngineEvent, EngineEventReceiver};
use crate::download::playback::{Bookmark, LicenseProvider, OfflinePlaybackHandle, StoredLicenseProvider};
use crate::download::progress::{DownloadSnapshot, DownloadState};
use crate::download::session::DownloadSession;
use crate::download::tracks::{DownloadConfig, TrackSelection};
use crate::error::{OfflineError, Result};
use crate::network::{ConnectionType, NetworkChange, NetworkMonitor, NetworkPath, NetworkStatus};
use crate::storage::credentials::{CredentialRecord, CredentialStore};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// User-facing prompt raised by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The download was suspended because the network dropped
    SuspendedForNetworkLoss,
    /// The network is back; ask whether to resume
    ResumePrompt {
        connection: ConnectionType,
        expensive: bool,
    },
}

/// Event delivered to UI subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    StateChanged {
        content_id: ContentIdentifier,
        previous: DownloadState,
        current: DownloadState,
    },
    ProgressChanged {
        content_id: ContentIdentifier,
        percent: f64,
    },
    Notice {
        content_id: ContentIdentifier,
        notice: Notice,
    },
    /// Bookmark (and license, if any) persisted after completion
    CredentialsSaved {
        content_id: ContentIdentifier,
        license: bool,
    },
    /// Engine reported an unrecoverable error; the download was canceled
    EngineError {
        content_id: ContentIdentifier,
        message: String,
    },
    /// Writing or clearing stored credentials failed
    PersistenceFailed {
        content_id: ContentIdentifier,
        message: String,
    },
}

impl CoordinatorEvent {
    pub fn content_id(&self) -> &ContentIdentifier {
        match self {
            CoordinatorEvent::StateChanged { content_id, .. }
            | CoordinatorEvent::ProgressChanged { content_id, .. }
            | CoordinatorEvent::Notice { content_id, .. }
            | CoordinatorEvent::CredentialsSaved { content_id, .. }
            | CoordinatorEvent::EngineError { content_id, .. }
            | CoordinatorEvent::PersistenceFailed { content_id, .. } => content_id,
        }
    }
}

enum Command {
    FetchTracks {
        reply: oneshot::Sender<Result<TrackSelection>>,
    },
    Download {
        tracks: TrackSelection,
        config: DownloadConfig,
        reply: oneshot::Sender<Result<()>>,
    },
    Pause {
        reply: oneshot::Sender<Result<()>>,
    },
    Resume {
        reply: oneshot::Sender<Result<()>>,
    },
    Cancel {
        reply: oneshot::Sender<Result<()>>,
    },
    Delete {
        reply: oneshot::Sender<Result<()>>,
    },
    Play {
        reply: oneshot::Sender<Result<OfflinePlaybackHandle>>,
    },
    Snapshot {
        reply: oneshot::Sender<DownloadSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the coordinator task of one content item
///
/// Cheap to clone. Commands from all clones are queued and validated in
/// arrival order.
#[derive(Clone)]
pub struct DownloadCoordinator {
    content_id: ContentIdentifier,
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<DownloadSnapshot>,
    events: broadcast::Sender<CoordinatorEvent>,
}

impl DownloadCoordinator {
    /// Open the engine session and start the coordinator task
    pub async fn spawn(
        content_id: ContentIdentifier,
        source: SourceDescriptor,
        engine: Arc<dyn DownloadEngine>,
        store: Arc<dyn CredentialStore>,
        network: NetworkMonitor,
        config: CoordinatorConfig,
    ) -> Result<Self> {
        let (engine_tx, engine_rx) = event_channel();
        let session = DownloadSession::open(engine.as_ref(), content_id.clone(), source, engine_tx).await?;

        // Subscribe before reading the status so no change falls in between
        let network_rx = network.subscribe();
        let last_network = network.current_status();

        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());
        let (events_tx, _) = broadcast::channel(config.event_buffer.max(1));

        let actor = CoordinatorActor {
            session,
            store,
            network,
            config,
            engine_events: engine_rx,
            network_changes: network_rx,
            network_open: true,
            commands: command_rx,
            snapshot: snapshot_tx,
            events: events_tx.clone(),
            last_network,
            suspend_for_network_loss: false,
        };
        tokio::spawn(actor.run());

        Ok(Self {
            content_id,
            commands: command_tx,
            snapshot: snapshot_rx,
            events: events_tx,
        })
    }

    pub fn content_id(&self) -> &ContentIdentifier {
        &self.content_id
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> DownloadSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that always holds the latest snapshot
    pub fn watch(&self) -> watch::Receiver<DownloadSnapshot> {
        self.snapshot.clone()
    }

    /// Receive every subsequent event, in order
    ///
    /// The channel holds `event_buffer` events per receiver. A receiver that
    /// falls further behind gets `RecvError::Lagged` and has missed events;
    /// it should re-read the state from [`watch`](Self::watch) before
    /// consuming again.
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    /// Whether the coordinator task has stopped
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Fetch the tracks offered for this content
    pub async fn request_tracks(&self) -> Result<TrackSelection> {
        self.call(|reply| Command::FetchTracks { reply }).await?
    }

    /// Start downloading; fails fast when the network is unavailable
    pub async fn request_download(&self, tracks: TrackSelection, config: DownloadConfig) -> Result<()> {
        self.call(|reply| Command::Download { tracks, config, reply }).await?
    }

    pub async fn request_pause(&self) -> Result<()> {
        self.call(|reply| Command::Pause { reply }).await?
    }

    /// Resume a suspended download; fails fast when the network is unavailable
    pub async fn request_resume(&self) -> Result<()> {
        self.call(|reply| Command::Resume { reply }).await?
    }

    pub async fn request_cancel(&self) -> Result<()> {
        self.call(|reply| Command::Cancel { reply }).await?
    }

    /// Delete downloaded data and stored credentials
    pub async fn request_delete(&self) -> Result<()> {
        self.call(|reply| Command::Delete { reply }).await?
    }

    /// Build a playback handle for the downloaded content
    ///
    /// Without network the handle is built from the stored bookmark and
    /// license alone.
    pub async fn request_play(&self) -> Result<OfflinePlaybackHandle> {
        self.call(|reply| Command::Play { reply }).await?
    }

    /// Snapshot after every previously queued input has been processed
    pub async fn current(&self) -> Result<DownloadSnapshot> {
        self.call(|reply| Command::Snapshot { reply }).await
    }

    /// Stop the coordinator task
    pub async fn shutdown(&self) -> Result<()> {
        self.call(|reply| Command::Shutdown { reply }).await
    }

    async fn call<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .await
            .map_err(|_| OfflineError::CoordinatorClosed(self.content_id.to_string()))?;
        reply_rx
            .await
            .map_err(|_| OfflineError::CoordinatorClosed(self.content_id.to_string()))
    }
}

impl std::fmt::Debug for DownloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCoordinator")
            .field("content_id", &self.content_id)
            .field("snapshot", &*self.snapshot.borrow())
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct CoordinatorActor {
    session: DownloadSession,
    store: Arc<dyn CredentialStore>,
    network: NetworkMonitor,
    config: CoordinatorConfig,
    engine_events: EngineEventReceiver,
    network_changes: broadcast::Receiver<NetworkChange>,
    network_open: bool,
    commands: mpsc::Receiver<Command>,
    snapshot: watch::Sender<DownloadSnapshot>,
    events: broadcast::Sender<CoordinatorEvent>,
    last_network: NetworkStatus,
    /// A suspend was requested because the network dropped
    suspend_for_network_loss: bool,
}

impl CoordinatorActor {
    async fn run(mut self) {
        let content_id = self.session.content_id().clone();
        info!(content_id = %content_id, state = %self.session.state(), "Download coordinator started");

        loop {
            tokio::select! {
                biased;

                Some(event) = self.engine_events.recv() => {
                    self.handle_engine_event(event).await;
                }

                change = self.network_changes.recv(), if self.network_open => match change {
                    Ok(change) => self.handle_network(change.current, change.path).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(content_id = %content_id, skipped, "Missed network changes, re-reading status");
                        let path = self.network.current_path();
                        self.handle_network(path.status, path).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        self.network_open = false;
                    }
                },

                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
            }
        }

        info!(content_id = %content_id, "Download coordinator stopped");
    }

    fn content_id(&self) -> &ContentIdentifier {
        self.session.content_id()
    }

    // ----- Commands -----

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::FetchTracks { reply } => {
                let result = self.session.fetch_available_tracks().await;
                let _ = reply.send(result);
            }
            Command::Download { tracks, config, reply } => {
                let result = self.start_download(tracks, config).await;
                let _ = reply.send(result);
            }
            Command::Pause { reply } => {
                let before = self.session.snapshot();
                let result = self.session.suspend().await.map(|_| ());
                self.finish_command("pause", &before, &result);
                let _ = reply.send(result);
            }
            Command::Resume { reply } => {
                let before = self.session.snapshot();
                let result = match self.require_network("resume") {
                    Ok(()) => self.session.resume().await.map(|_| ()),
                    Err(e) => Err(e),
                };
                self.finish_command("resume", &before, &result);
                let _ = reply.send(result);
            }
            Command::Cancel { reply } => {
                let before = self.session.snapshot();
                let result = self.session.cancel().await.map(|_| ());
                self.finish_command("cancel", &before, &result);
                let _ = reply.send(result);
            }
            Command::Delete { reply } => {
                let result = self.delete().await;
                let _ = reply.send(result);
            }
            Command::Play { reply } => {
                let result = self.playback_handle().await;
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot());
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn require_network(&self, command: &str) -> Result<()> {
        if self.network.is_available() {
            Ok(())
        } else {
            Err(OfflineError::NetworkUnavailable(format!(
                "cannot {} {} while {}",
                command,
                self.content_id(),
                self.network.current_status()
            )))
        }
    }

    async fn start_download(&mut self, tracks: TrackSelection, mut config: DownloadConfig) -> Result<()> {
        self.require_network("download")?;

        if config.minimum_bitrate.is_none() {
            config.minimum_bitrate = self.config.default_minimum_bitrate;
        }

        info!(
            content_id = %self.content_id(),
            minimum_bitrate = ?config.minimum_bitrate,
            tracks = tracks.len(),
            "Starting download"
        );

        let before = self.session.snapshot();
        let result = self.session.start(tracks, config).await;
        self.finish_command("download", &before, &result);
        result
    }

    /// Log the outcome of a session command and publish what it changed
    fn finish_command<T>(&mut self, command: &'static str, before: &DownloadSnapshot, result: &Result<T>) {
        match result {
            Ok(_) => info!(
                content_id = %self.content_id(),
                command,
                state = %self.session.state(),
                "Command applied"
            ),
            Err(e) => debug!(content_id = %self.content_id(), command, error = %e, "Command rejected"),
        }
        self.publish(before);
    }

    async fn delete(&mut self) -> Result<()> {
        let before = self.session.snapshot();
        let content_id = self.content_id().clone();

        let result = match self.config.deletion_order {
            DeletionOrder::DataThenCredentials => {
                self.session.delete().await?;
                self.publish(&before);
                CredentialRecord::remove_all(self.store.as_ref(), &content_id).await
            }
            DeletionOrder::CredentialsThenData => {
                if self.session.state() != DownloadState::Downloaded {
                    return Err(OfflineError::invalid_transition("delete", self.session.state()));
                }

                let saved = CredentialRecord::load(self.store.as_ref(), &content_id).await?;
                if let Err(e) = CredentialRecord::remove_all(self.store.as_ref(), &content_id).await {
                    warn!(content_id = %content_id, error = %e, "Failed to clear credentials, restoring");
                    self.restore_credentials(&saved).await;
                    return Err(e);
                }

                if let Err(e) = self.session.delete().await {
                    self.restore_credentials(&saved).await;
                    return Err(e);
                }
                self.publish(&before);
                Ok(())
            }
        };

        match &result {
            Ok(()) => info!(content_id = %content_id, "Deleted offline content"),
            Err(e) => {
                error!(content_id = %content_id, error = %e, "Failed to clear credentials");
                self.emit(CoordinatorEvent::PersistenceFailed {
                    content_id,
                    message: e.to_string(),
                });
            }
        }
        result
    }

    async fn restore_credentials(&mut self, saved: &CredentialRecord) {
        let content_id = self.content_id().clone();
        if let Err(e) = saved.save(self.store.as_ref(), &content_id).await {
            error!(content_id = %content_id, error = %e, "Failed to restore credentials");
            self.emit(CoordinatorEvent::PersistenceFailed {
                content_id,
                message: e.to_string(),
            });
        }
    }

    async fn playback_handle(&self) -> Result<OfflinePlaybackHandle> {
        let content_id = self.content_id();
        let license: Option<Arc<dyn LicenseProvider>> = if self.session.source().is_protected() {
            Some(Arc::new(StoredLicenseProvider::new(self.store.clone(), content_id)))
        } else {
            None
        };

        if self.network.is_available() {
            return self.session.create_offline_playback_handle(license).await;
        }

        debug!(content_id = %content_id, "Network unavailable, resolving stored bookmark");
        let blob = self
            .store
            .get(&content_id.content_key())
            .await?
            .ok_or_else(|| OfflineError::asset_missing(content_id.as_str(), "no bookmark stored"))?;
        let bookmark = Bookmark::from_blob(&blob).map_err(|e| {
            OfflineError::asset_missing(content_id.as_str(), format!("unreadable bookmark: {}", e))
        })?;
        let location = bookmark.resolve(content_id).await?;

        Ok(OfflinePlaybackHandle::new(content_id.clone(), location, license))
    }

    // ----- Engine events -----

    async fn handle_engine_event(&mut self, event: EngineEvent) {
        let before = self.session.snapshot();

        match &event {
            EngineEvent::Finished { bookmark, license } if self.accepts_finish() => {
                self.save_credentials(bookmark, license.as_deref()).await;
                self.session.apply_event(&event);
            }
            EngineEvent::Error { message } => {
                error!(content_id = %self.content_id(), message = %message, "Download engine error");
                // Cancel is a no-op when already canceling
                if self.session.state().is_in_flight() {
                    if let Err(e) = self.session.cancel().await {
                        warn!(content_id = %self.content_id(), error = %e, "Cancel after engine error failed");
                    }
                }
                self.publish(&before);
                self.settle_network_suspend();
                self.emit(CoordinatorEvent::EngineError {
                    content_id: self.content_id().clone(),
                    message: message.clone(),
                });
                return;
            }
            _ => {
                self.session.apply_event(&event);
            }
        }

        self.publish(&before);
        self.settle_network_suspend();
    }

    /// Post the network-loss notice once the engine has confirmed the suspend
    fn settle_network_suspend(&mut self) {
        if !self.suspend_for_network_loss || self.session.state() == DownloadState::Downloading {
            return;
        }
        self.suspend_for_network_loss = false;
        if self.session.state() != DownloadState::Suspended {
            return;
        }

        info!(content_id = %self.content_id(), "Suspended download after network loss");
        self.emit(CoordinatorEvent::Notice {
            content_id: self.content_id().clone(),
            notice: Notice::SuspendedForNetworkLoss,
        });

        // Network came back before the engine confirmed
        if self.last_network == NetworkStatus::Connected && self.config.prompt_resume_on_reconnect {
            let path = self.network.current_path();
            self.prompt_resume(&path);
        }
    }

    fn accepts_finish(&self) -> bool {
        matches!(
            self.session.state(),
            DownloadState::Downloading | DownloadState::Suspended
        )
    }

    async fn save_credentials(&mut self, bookmark: &[u8], license: Option<&[u8]>) {
        let content_id = self.content_id().clone();

        let mut result = self.store.set(&content_id.content_key(), bookmark).await;
        if let (Ok(()), Some(license)) = (&result, license) {
            result = self.store.set(&content_id.license_key(), license).await;
        }

        match result {
            Ok(()) => {
                info!(content_id = %content_id, license = license.is_some(), "Saved offline credentials");
                self.emit(CoordinatorEvent::CredentialsSaved {
                    content_id,
                    license: license.is_some(),
                });
            }
            Err(e) => {
                error!(content_id = %content_id, error = %e, "Failed to save offline credentials");
                self.emit(CoordinatorEvent::PersistenceFailed {
                    content_id,
                    message: e.to_string(),
                });
            }
        }
    }

    // ----- Network -----

    async fn handle_network(&mut self, status: NetworkStatus, path: NetworkPath) {
        if status == self.last_network {
            return;
        }
        self.last_network = status;

        match (status, self.session.state()) {
            (NetworkStatus::Disconnected, DownloadState::Downloading)
                if self.config.auto_suspend_on_disconnect =>
            {
                match self.session.suspend().await {
                    // A suspend already pending is adopted, not repeated
                    Ok(_) => {
                        debug!(content_id = %self.content_id(), "Network lost, suspend requested");
                        self.suspend_for_network_loss = true;
                    }
                    Err(e) => {
                        warn!(content_id = %self.content_id(), error = %e, "Suspend after network loss failed");
                    }
                }
            }
            (NetworkStatus::Connected, DownloadState::Suspended)
                if self.config.prompt_resume_on_reconnect =>
            {
                self.prompt_resume(&path);
            }
            _ => {}
        }
    }

    fn prompt_resume(&self, path: &NetworkPath) {
        info!(
            content_id = %self.content_id(),
            connection = path.connection.description(),
            "Network restored, prompting to resume"
        );
        self.emit(CoordinatorEvent::Notice {
            content_id: self.content_id().clone(),
            notice: Notice::ResumePrompt {
                connection: path.connection,
                expensive: path.expensive,
            },
        });
    }

    // ----- Publishing -----

    /// Publish state and progress changes relative to `before`
    fn publish(&mut self, before: &DownloadSnapshot) {
        let after = self.session.snapshot();
        let state_changed = after.state != before.state;
        let progress_changed = after.progress != before.progress;

        if !state_changed && !progress_changed {
            return;
        }

        self.snapshot.send_replace(after.clone());

        if state_changed {
            self.emit(CoordinatorEvent::StateChanged {
                content_id: after.content_id.clone(),
                previous: before.state,
                current: after.state,
            });
        }
        if progress_changed {
            self.emit(CoordinatorEvent::ProgressChanged {
                content_id: after.content_id,
                percent: after.progress,
            });
        }
    }

    fn emit(&self, event: CoordinatorEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}
