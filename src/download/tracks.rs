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


//! Track selection and download configuration

use crate::content::ContentIdentifier;
use crate::error::{OfflineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Video,
    Audio,
    Subtitle,
}

/// One downloadable track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Engine-specific track identifier
    pub id: String,
    pub kind: TrackKind,
    /// Display label (e.g., "1080p", "English")
    pub label: String,
    /// BCP-47 language tag for audio/subtitle tracks
    pub language: Option<String>,
    /// Peak bitrate in bits per second, when known
    pub bitrate: Option<u64>,
}

impl Track {
    pub fn video<S: Into<String>>(id: S, label: S, bitrate: u64) -> Self {
        Self {
            id: id.into(),
            kind: TrackKind::Video,
            label: label.into(),
            language: None,
            bitrate: Some(bitrate),
        }
    }

    pub fn audio<S: Into<String>>(id: S, label: S, language: S) -> Self {
        Self {
            id: id.into(),
            kind: TrackKind::Audio,
            label: label.into(),
            language: Some(language.into()),
            bitrate: None,
        }
    }

    pub fn subtitle<S: Into<String>>(id: S, label: S, language: S) -> Self {
        Self {
            id: id.into(),
            kind: TrackKind::Subtitle,
            label: label.into(),
            language: Some(language.into()),
            bitrate: None,
        }
    }
}

/// Tracks available for one piece of content
///
/// Built once per fetch and never modified afterward; a new fetch produces a
/// new selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSelection {
    content_id: ContentIdentifier,
    tracks: Vec<Track>,
    fetched_at: DateTime<Utc>,
}

impl TrackSelection {
    pub fn new(content_id: ContentIdentifier, tracks: Vec<Track>) -> Self {
        Self {
            content_id,
            tracks,
            fetched_at: Utc::now(),
        }
    }

    pub fn content_id(&self) -> &ContentIdentifier {
        &self.content_id
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Tracks of a single kind
    pub fn of_kind(&self, kind: TrackKind) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(move |t| t.kind == kind)
    }

    /// Distinct languages offered for a track kind, in fetch order
    pub fn languages(&self, kind: TrackKind) -> Vec<&str> {
        let mut languages: Vec<&str> = Vec::new();
        for language in self.of_kind(kind).filter_map(|t| t.language.as_deref()) {
            if !languages.contains(&language) {
                languages.push(language);
            }
        }
        languages
    }

    /// Video tracks at or above a minimum bitrate
    ///
    /// Tracks without a known bitrate are kept.
    pub fn video_at_least(&self, minimum_bitrate: u64) -> Vec<&Track> {
        self.of_kind(TrackKind::Video)
            .filter(|t| t.bitrate.map_or(true, |b| b >= minimum_bitrate))
            .collect()
    }
}

/// Acquisition policy supplied when a download starts
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Lowest acceptable video bitrate in bits per second
    pub minimum_bitrate: Option<u64>,

    /// Audio languages to download, empty for the engine default
    pub audio_languages: Vec<String>,

    /// Subtitle languages to download
    pub subtitle_languages: Vec<String>,
}

impl DownloadConfig {
    pub fn with_minimum_bitrate(mut self, bitrate: u64) -> Self {
        self.minimum_bitrate = Some(bitrate);
        self
    }

    pub fn with_audio_language<S: Into<String>>(mut self, language: S) -> Self {
        self.audio_languages.push(language.into());
        self
    }

    pub fn with_subtitle_language<S: Into<String>>(mut self, language: S) -> Self {
        self.subtitle_languages.push(language.into());
        self
    }

    /// Check the config against the tracks it will be applied to
    pub fn validate(&self, tracks: &TrackSelection) -> Result<()> {
        if self.minimum_bitrate == Some(0) {
            return Err(OfflineError::invalid_input("minimum_bitrate must be greater than zero"));
        }

        let audio = tracks.languages(TrackKind::Audio);
        for language in &self.audio_languages {
            if !audio.contains(&language.as_str()) {
                return Err(OfflineError::invalid_input(format!(
                    "Audio language '{}' is not offered for {}",
                    language,
                    tracks.content_id()
                )));
            }
        }

        let subtitles = tracks.languages(TrackKind::Subtitle);
        for language in &self.subtitle_languages {
            if !subtitles.contains(&language.as_str()) {
                return Err(OfflineError::invalid_input(format!(
                    "Subtitle language '{}' is not offered for {}",
                    language,
                    tracks.content_id()
                )));
            }
        }

        Ok(())
    }
}
