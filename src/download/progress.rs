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


//! Download state and progress tracking
//!
//! # States
//! ```text
//! NotDownloaded -> Downloading <-> Suspended
//! Downloading   -> Canceling -> NotDownloaded
//! Suspended     -> Canceling
//! Downloading   -> Downloaded -> NotDownloaded (delete)
//! ```
//!
//! Raw state strings coming from the engine or from storage are decoded with
//! [`DownloadState::from_raw`], which maps anything it does not recognise to
//! `NotDownloaded` so a newer engine can never wedge the UI.

use crate::content::ContentIdentifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Download state enum representing the lifecycle of one piece of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DownloadState {
    /// Nothing on disk
    #[default]
    NotDownloaded,
    /// Engine is fetching segments
    Downloading,
    /// Download paused by the user or by network policy
    Suspended,
    /// Cancel requested, waiting for the engine to confirm teardown
    Canceling,
    /// All data available for offline playback
    Downloaded,
}

impl DownloadState {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadState::NotDownloaded => "not_downloaded",
            DownloadState::Downloading => "downloading",
            DownloadState::Suspended => "suspended",
            DownloadState::Canceling => "canceling",
            DownloadState::Downloaded => "downloaded",
        }
    }

    /// Decode a raw state string, defaulting to `NotDownloaded` for unknown values
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "downloading" => DownloadState::Downloading,
            "suspended" => DownloadState::Suspended,
            "canceling" | "cancelling" => DownloadState::Canceling,
            "downloaded" => DownloadState::Downloaded,
            _ => DownloadState::NotDownloaded,
        }
    }

    /// Label shown next to the content title
    pub fn label(&self) -> &'static str {
        match self {
            DownloadState::NotDownloaded => "Not downloaded",
            DownloadState::Downloading => "Downloading",
            DownloadState::Suspended => "Suspended",
            DownloadState::Canceling => "Canceling",
            DownloadState::Downloaded => "Downloaded",
        }
    }

    /// Whether the state machine has an edge from `self` to `next`
    pub fn can_transition_to(&self, next: DownloadState) -> bool {
        use DownloadState::*;

        matches!(
            (self, next),
            (NotDownloaded, Downloading)
                | (Downloading, Suspended)
                | (Suspended, Downloading)
                | (Downloading, Canceling)
                | (Suspended, Canceling)
                | (Canceling, NotDownloaded)
                | (Downloading, Downloaded)
                | (Downloaded, NotDownloaded)
        )
    }

    /// Check if the engine is holding resources for this content
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            DownloadState::Downloading | DownloadState::Suspended | DownloadState::Canceling
        )
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label().to_lowercase())
    }
}

impl Serialize for DownloadState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DownloadState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(DownloadState::from_raw(&raw))
    }
}

/// Download percentage (0.0 - 100.0)
///
/// Only moves forward while a download is running; `reset` is the single way
/// back to zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DownloadProgress {
    percent: f64,
}

impl DownloadProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current percentage
    pub fn percent(&self) -> f64 {
        self.percent
    }

    /// Move progress forward
    ///
    /// Returns true if the stored value changed. NaN and negative values are
    /// ignored, values above 100 are clamped, and lower values never replace
    /// a higher one.
    pub fn advance(&mut self, percent: f64) -> bool {
        if !percent.is_finite() || percent < 0.0 {
            return false;
        }

        let clamped = percent.min(100.0);
        if clamped > self.percent {
            self.percent = clamped;
            true
        } else {
            false
        }
    }

    /// Mark as complete
    pub fn complete(&mut self) {
        self.percent = 100.0;
    }

    /// Back to zero (entry into `NotDownloaded`)
    pub fn reset(&mut self) {
        self.percent = 0.0;
    }

    /// Format as display string (e.g., "45%")
    pub fn display_string(&self) -> String {
        format!("{:.0}%", self.percent)
    }
}

/// Point-in-time view of one content's download, for rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadSnapshot {
    pub content_id: ContentIdentifier,
    pub state: DownloadState,
    pub progress: f64,
    pub updated_at: DateTime<Utc>,
}

impl DownloadSnapshot {
    pub fn new(content_id: ContentIdentifier, state: DownloadState, progress: DownloadProgress) -> Self {
        Self {
            content_id,
            state,
            progress: progress.percent(),
            updated_at: Utc::now(),
        }
    }

    /// Format as status line
    pub fn display_string(&self) -> String {
        match self.state {
            DownloadState::Downloading => {
                format!("{}: {:.0}%", self.state.label(), self.progress)
            }
            DownloadState::Suspended => {
                format!("{} at {:.0}%", self.state.label(), self.progress)
            }
            _ => self.state.label().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_edges() {
        use DownloadState::*;

        assert!(NotDownloaded.can_transition_to(Downloading));
        assert!(Downloading.can_transition_to(Suspended));
        assert!(Suspended.can_transition_to(Downloading));
        assert!(Suspended.can_transition_to(Canceling));
        assert!(Canceling.can_transition_to(NotDownloaded));
        assert!(Downloaded.can_transition_to(NotDownloaded));

        assert!(!NotDownloaded.can_transition_to(Downloaded));
        assert!(!Downloading.can_transition_to(NotDownloaded));
        assert!(!Suspended.can_transition_to(Downloaded));
        assert!(!Canceling.can_transition_to(Downloading));
        assert!(!Downloaded.can_transition_to(Downloading));
    }

    #[test]
    fn test_in_flight_states() {
        assert!(DownloadState::Downloading.is_in_flight());
        assert!(DownloadState::Suspended.is_in_flight());
        assert!(DownloadState::Canceling.is_in_flight());
        assert!(!DownloadState::NotDownloaded.is_in_flight());
        assert!(!DownloadState::Downloaded.is_in_flight());
    }

    #[test]
    fn test_unknown_state_defaults_to_not_downloaded() {
        assert_eq!(DownloadState::from_raw("downloading"), DownloadState::Downloading);
        assert_eq!(DownloadState::from_raw(" Downloaded "), DownloadState::Downloaded);
        assert_eq!(DownloadState::from_raw("pendingLicenseRenewal"), DownloadState::NotDownloaded);
        assert_eq!(DownloadState::from_raw(""), DownloadState::NotDownloaded);

        let decoded: DownloadState = serde_json::from_str("\"archived\"").unwrap();
        assert_eq!(decoded, DownloadState::NotDownloaded);

        let encoded = serde_json::to_string(&DownloadState::Suspended).unwrap();
        assert_eq!(encoded, "\"suspended\"");
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut progress = DownloadProgress::new();

        assert!(progress.advance(10.0));
        assert!(progress.advance(45.0));
        assert!(!progress.advance(30.0));
        assert_eq!(progress.percent(), 45.0);

        assert!(!progress.advance(f64::NAN));
        assert!(!progress.advance(-5.0));
        assert!(progress.advance(250.0));
        assert_eq!(progress.percent(), 100.0);

        progress.reset();
        assert_eq!(progress.percent(), 0.0);
    }

    #[test]
    fn test_display_strings() {
        let mut progress = DownloadProgress::new();
        progress.advance(44.6);
        assert_eq!(progress.display_string(), "45%");

        let id = ContentIdentifier::new("undercurrent").unwrap();
        let snapshot = DownloadSnapshot::new(id, DownloadState::Suspended, progress);
        assert_eq!(snapshot.display_string(), "Suspended at 45%");
        assert_eq!(DownloadState::NotDownloaded.to_string(), "not downloaded");
    }
}
