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


//! Content identity and source description
//!
//! A [`ContentIdentifier`] keys everything this crate persists for one piece
//! of media. Two different contents must never share an identifier, so the
//! preferred derivation hashes the source URL; the title-based derivation
//! appends a short hash of the original title so that titles which slug to
//! the same text still produce different keys.
//!
//! # Persisted key layout
//! - `"<identifier>.license"` - opaque license blob
//! - `"<identifier>.content"` - bookmark blob for the downloaded files

use crate::error::{OfflineError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

lazy_static! {
    static ref IDENTIFIER_PATTERN: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:-]{0,127}$").expect("identifier pattern is valid");
    static ref SLUG_SEPARATORS: Regex = Regex::new(r"[^a-z0-9]+").expect("slug pattern is valid");
}

const LICENSE_SUFFIX: &str = "license";
const CONTENT_SUFFIX: &str = "content";

/// Stable key for one piece of media
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentIdentifier(String);

impl ContentIdentifier {
    /// Validate and wrap an identifier supplied by the caller (e.g., a catalog content ID)
    pub fn new<S: Into<String>>(raw: S) -> Result<Self> {
        let raw = raw.into();
        if !IDENTIFIER_PATTERN.is_match(&raw) {
            return Err(OfflineError::invalid_input(format!(
                "Invalid content identifier '{}': expected 1-128 characters of [A-Za-z0-9._:-]",
                raw
            )));
        }
        Ok(Self(raw))
    }

    /// Derive an identifier from the source URL
    pub fn from_source_url(url: &Url) -> Self {
        let digest = Sha256::digest(url.as_str().as_bytes());
        Self(format!("src-{}", hex::encode(digest)))
    }

    /// Derive an identifier from a display title
    ///
    /// "Biri-Biri" becomes `biri-biri-<8 hex chars>`.
    pub fn from_title(title: &str) -> Result<Self> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(OfflineError::invalid_input("Cannot derive identifier from empty title"));
        }

        let lowered = trimmed.to_lowercase();
        let slug = SLUG_SEPARATORS.replace_all(&lowered, "-");
        let slug: String = slug.trim_matches('-').chars().take(96).collect();

        let digest = Sha256::digest(trimmed.as_bytes());
        let suffix = hex::encode(&digest[..4]);

        if slug.is_empty() {
            Self::new(format!("title-{}", suffix))
        } else {
            Self::new(format!("{}-{}", slug, suffix))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the stored license blob
    pub fn license_key(&self) -> String {
        format!("{}.{}", self.0, LICENSE_SUFFIX)
    }

    /// Key of the stored bookmark blob
    pub fn content_key(&self) -> String {
        format!("{}.{}", self.0, CONTENT_SUFFIX)
    }
}

impl fmt::Display for ContentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentIdentifier {
    type Error = OfflineError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ContentIdentifier> for String {
    fn from(id: ContentIdentifier) -> Self {
        id.0
    }
}

/// Streaming format of the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Hls,
    Dash,
    Progressive,
}

/// Hooks for adjusting DRM payloads before they are used
///
/// Every method defaults to passing the data through unchanged.
pub trait LicenseStrategy: Send + Sync {
    /// Adjust the loaded certificate
    fn prepare_certificate(&self, certificate: Vec<u8>) -> Vec<u8> {
        certificate
    }

    /// Adjust the license request message for an asset
    fn prepare_message(&self, message: Vec<u8>, _asset_id: &str) -> Vec<u8> {
        message
    }

    /// Adjust the license returned by the license server
    fn prepare_license(&self, license: Vec<u8>) -> Vec<u8> {
        license
    }
}

/// Pass-through strategy
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLicenseStrategy;

impl LicenseStrategy for NoopLicenseStrategy {}

/// DRM configuration for a protected source
#[derive(Clone)]
pub struct DrmConfig {
    pub license_url: Url,
    pub certificate_url: Url,
    pub license_headers: HashMap<String, String>,
    pub certificate_headers: HashMap<String, String>,
    pub strategy: Arc<dyn LicenseStrategy>,
}

impl DrmConfig {
    pub fn new(license_url: Url, certificate_url: Url) -> Self {
        Self {
            license_url,
            certificate_url,
            license_headers: HashMap::new(),
            certificate_headers: HashMap::new(),
            strategy: Arc::new(NoopLicenseStrategy),
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn LicenseStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_license_header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.license_headers.insert(key.into(), value.into());
        self
    }

    pub fn with_certificate_header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.certificate_headers.insert(key.into(), value.into());
        self
    }
}

impl fmt::Debug for DrmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Header values may carry tokens
        f.debug_struct("DrmConfig")
            .field("license_url", &self.license_url.as_str())
            .field("certificate_url", &self.certificate_url.as_str())
            .field("license_headers", &self.license_headers.keys().collect::<Vec<_>>())
            .field("certificate_headers", &self.certificate_headers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Everything the engine needs to locate a piece of content
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub url: Url,
    pub kind: SourceKind,
    pub title: String,
    pub description: Option<String>,
    pub poster: Option<Url>,
    pub drm: Option<DrmConfig>,
}

impl SourceDescriptor {
    /// HLS source without DRM
    pub fn hls<S: Into<String>>(url: Url, title: S) -> Self {
        Self {
            url,
            kind: SourceKind::Hls,
            title: title.into(),
            description: None,
            poster: None,
            drm: None,
        }
    }

    /// Parse the URL and build an HLS source
    pub fn parse_hls<S: Into<String>>(url: &str, title: S) -> Result<Self> {
        Ok(Self::hls(Url::parse(url)?, title))
    }

    pub fn with_kind(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_poster(mut self, poster: Url) -> Self {
        self.poster = Some(poster);
        self
    }

    pub fn with_drm(mut self, drm: DrmConfig) -> Self {
        self.drm = Some(drm);
        self
    }

    /// Whether playback needs a license
    pub fn is_protected(&self) -> bool {
        self.drm.is_some()
    }

    /// Identifier derived from the source URL
    pub fn content_identifier(&self) -> ContentIdentifier {
        ContentIdentifier::from_source_url(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(ContentIdentifier::new("X").is_ok());
        assert!(ContentIdentifier::new("catalog:1234.v2").is_ok());
        assert!(ContentIdentifier::new("").is_err());
        assert!(ContentIdentifier::new("has space").is_err());
        assert!(ContentIdentifier::new("../escape").is_err());
        assert!(ContentIdentifier::new("a".repeat(129)).is_err());
    }

    #[test]
    fn test_key_layout() {
        let id = ContentIdentifier::new("X").unwrap();
        assert_eq!(id.license_key(), "X.license");
        assert_eq!(id.content_key(), "X.content");
    }

    #[test]
    fn test_source_url_identifiers_do_not_collide() {
        let a = Url::parse("https://cdn.example.com/vod/a/hls.m3u8").unwrap();
        let b = Url::parse("https://cdn.example.com/vod/b/hls.m3u8").unwrap();

        let id_a = ContentIdentifier::from_source_url(&a);
        assert_eq!(id_a, ContentIdentifier::from_source_url(&a));
        assert_ne!(id_a, ContentIdentifier::from_source_url(&b));
        assert!(ContentIdentifier::new(id_a.as_str()).is_ok());
    }

    #[test]
    fn test_title_identifiers() {
        let id = ContentIdentifier::from_title("Biri-Biri").unwrap();
        assert!(id.as_str().starts_with("biri-biri-"));

        // Same slug, different titles
        let upper = ContentIdentifier::from_title("Undercurrent!").unwrap();
        let plain = ContentIdentifier::from_title("Undercurrent?").unwrap();
        assert_ne!(upper, plain);

        let symbols = ContentIdentifier::from_title("???").unwrap();
        assert!(symbols.as_str().starts_with("title-"));

        assert!(ContentIdentifier::from_title("   ").is_err());
    }

    #[test]
    fn test_identifier_serde() {
        let id: ContentIdentifier = serde_json::from_str("\"X\"").unwrap();
        assert_eq!(id.as_str(), "X");
        assert!(serde_json::from_str::<ContentIdentifier>("\"bad id\"").is_err());
    }

    #[test]
    fn test_source_descriptor() {
        let drm = DrmConfig::new(
            Url::parse("https://drm.example.com/license").unwrap(),
            Url::parse("https://drm.example.com/cert").unwrap(),
        )
        .with_license_header("Authorization", "Bearer secret")
        .with_certificate_header("X-Client", "player-7");
        assert_eq!(drm.certificate_headers.get("X-Client").map(String::as_str), Some("player-7"));

        let source = SourceDescriptor::parse_hls("https://cdn.example.com/hls.m3u8", "Undercurrent")
            .unwrap()
            .with_description("Non DRM")
            .with_drm(drm);

        assert!(source.is_protected());
        assert_eq!(source.kind, SourceKind::Hls);
        assert_eq!(source.content_identifier(), ContentIdentifier::from_source_url(&source.url));
        assert!(!format!("{:?}", source).contains("secret"));
    }

    #[test]
    fn test_progressive_source_with_poster() {
        let poster = Url::parse("https://cdn.example.com/posters/biri.jpg").unwrap();
        let source = SourceDescriptor::parse_hls("https://cdn.example.com/biri.mp4", "Biri-Biri")
            .unwrap()
            .with_kind(SourceKind::Progressive)
            .with_poster(poster.clone());

        assert_eq!(source.kind, SourceKind::Progressive);
        assert_eq!(source.poster, Some(poster));
        assert!(!source.is_protected());
    }
}
