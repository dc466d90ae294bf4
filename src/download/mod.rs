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


//! Offline download lifecycle
//!
//! # Modules
//! - `progress` - download state and progress values
//! - `tracks` - track metadata and download configuration
//! - `engine` - capability traits implemented by the external engine
//! - `session` - per-content state machine over an engine session
//! - `playback` - bookmarks and offline playback handles
//! - `coordinator` - actor tying session, network and credential store together
//! - `registry` - one coordinator per content identifier
//! - `simulated` - in-process engine for tests and the CLI

pub mod coordinator;
pub mod engine;
pub mod playback;
pub mod progress;
pub mod registry;
pub mod session;
pub mod simulated;
pub mod tracks;

// Re-export commonly used types
pub use coordinator::{CoordinatorEvent, DownloadCoordinator, Notice};
pub use engine::{DownloadEngine, EngineEvent, EngineSession};
pub use playback::{Bookmark, LicenseProvider, OfflinePlaybackHandle, StoredLicenseProvider};
pub use progress::{DownloadProgress, DownloadSnapshot, DownloadState};
pub use registry::OfflineManager;
pub use session::{DownloadSession, EventOutcome};
pub use simulated::{SimulatedEngine, SimulatedSession};
pub use tracks::{DownloadConfig, Track, TrackKind, TrackSelection};
