//! Offline download lifecycle core
//!
//! Coordinates downloading media for offline playback on top of an external
//! download engine: network-aware start, pause, resume, cancel, delete and
//! play, a per-content state machine, persisted bookmarks and licenses, and
//! an ordered event stream for the UI.
//!
//! # Modules
//! - `network` - connectivity monitor
//! - `storage` - SQLite database and credential store
//! - `download` - session state machine, coordinator, registry and the engine capability
//! - `content` - content identifiers and source descriptors
//! - `config`, `logging`, `error` - ambient setup

pub mod config;
pub mod content;
pub mod download;
pub mod error;
pub mod logging;
pub mod network;
pub mod storage;

pub use config::{CoordinatorConfig, DeletionOrder, OfflineConfig};
pub use content::{ContentIdentifier, DrmConfig, LicenseStrategy, SourceDescriptor, SourceKind};
pub use download::{
    CoordinatorEvent, DownloadConfig, DownloadCoordinator, DownloadEngine, DownloadSession,
    DownloadSnapshot, DownloadState, EngineEvent, EngineSession, Notice, OfflineManager,
    OfflinePlaybackHandle, SimulatedEngine, Track, TrackSelection,
};
pub use error::{OfflineError, Result};
pub use network::{ConnectionType, NetworkMonitor, NetworkPath, NetworkStatus};
pub use storage::{CredentialStore, Database, MemoryCredentialStore, SqliteCredentialStore};

/// Crate version, for host apps that log it at startup
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
