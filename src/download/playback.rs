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


//! Offline playback handles and bookmarks
//!
//! A [`Bookmark`] is the resolvable reference to downloaded files that the
//! engine hands over when a download finishes. It is persisted verbatim as
//! the `"<identifier>.content"` blob and decoded again when content has to be
//! played without network access.

use crate::content::ContentIdentifier;
use crate::error::{OfflineError, Result};
use crate::storage::credentials::CredentialStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Persisted reference to downloaded files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Location of the downloaded asset (file or package directory)
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            created_at: Utc::now(),
        }
    }

    /// Encode for storage
    pub fn to_blob(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a stored blob
    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(blob)?)
    }

    /// Resolve to a path that still exists on disk
    pub async fn resolve(&self, content_id: &ContentIdentifier) -> Result<PathBuf> {
        match tokio::fs::try_exists(&self.path).await {
            Ok(true) => Ok(self.path.clone()),
            Ok(false) => Err(OfflineError::asset_missing(
                content_id.as_str(),
                format!("bookmarked location {} no longer exists", self.path.display()),
            )),
            Err(e) => Err(OfflineError::asset_missing(
                content_id.as_str(),
                format!("cannot access {}: {}", self.path.display(), e),
            )),
        }
    }
}

/// Supplies the license for protected offline playback
#[async_trait]
pub trait LicenseProvider: Send + Sync {
    /// Return the license blob, or `None` when no license is stored
    async fn license(&self) -> Result<Option<Vec<u8>>>;
}

/// Reads the license persisted when the download finished
pub struct StoredLicenseProvider {
    store: Arc<dyn CredentialStore>,
    key: String,
}

impl StoredLicenseProvider {
    pub fn new(store: Arc<dyn CredentialStore>, content_id: &ContentIdentifier) -> Self {
        Self {
            store,
            key: content_id.license_key(),
        }
    }
}

#[async_trait]
impl LicenseProvider for StoredLicenseProvider {
    async fn license(&self) -> Result<Option<Vec<u8>>> {
        self.store.get(&self.key).await
    }
}

/// Reference usable for local playback of downloaded content
#[derive(Clone)]
pub struct OfflinePlaybackHandle {
    content_id: ContentIdentifier,
    location: PathBuf,
    license_provider: Option<Arc<dyn LicenseProvider>>,
}

impl OfflinePlaybackHandle {
    pub fn new(
        content_id: ContentIdentifier,
        location: PathBuf,
        license_provider: Option<Arc<dyn LicenseProvider>>,
    ) -> Self {
        Self {
            content_id,
            location,
            license_provider,
        }
    }

    pub fn content_id(&self) -> &ContentIdentifier {
        &self.content_id
    }

    /// Local asset location to hand to the player
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Whether the player needs a license to play this asset
    pub fn is_protected(&self) -> bool {
        self.license_provider.is_some()
    }

    /// Fetch the license through the configured provider
    pub async fn license(&self) -> Result<Option<Vec<u8>>> {
        match &self.license_provider {
            Some(provider) => provider.license().await,
            None => Ok(None),
        }
    }
}

impl fmt::Debug for OfflinePlaybackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflinePlaybackHandle")
            .field("content_id", &self.content_id)
            .field("location", &self.location)
            .field("protected", &self.is_protected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::credentials::MemoryCredentialStore;

    #[test]
    fn test_bookmark_blob() {
        let bookmark = Bookmark::new("/var/mobile/Downloads/X.movpkg");
        let blob = bookmark.to_blob().unwrap();
        assert_eq!(Bookmark::from_blob(&blob).unwrap(), bookmark);

        assert!(Bookmark::from_blob(b"not json").is_err());
    }

    #[tokio::test]
    async fn test_bookmark_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let id = ContentIdentifier::new("X").unwrap();

        let file = dir.path().join("X.offline");
        std::fs::write(&file, b"media").unwrap();
        let bookmark = Bookmark::new(&file);
        assert_eq!(bookmark.resolve(&id).await.unwrap(), file);

        let missing = Bookmark::new(dir.path().join("gone.offline"));
        let err = missing.resolve(&id).await.unwrap_err();
        assert!(matches!(err, OfflineError::OfflineAssetMissing { .. }));
    }

    #[tokio::test]
    async fn test_stored_license_provider() {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let id = ContentIdentifier::new("X").unwrap();

        let provider = Arc::new(StoredLicenseProvider::new(store.clone(), &id));
        let handle = OfflinePlaybackHandle::new(id.clone(), PathBuf::from("/tmp/X"), Some(provider));
        assert!(handle.is_protected());
        assert_eq!(handle.license().await.unwrap(), None);

        store.set("X.license", b"ckc").await.unwrap();
        assert_eq!(handle.license().await.unwrap(), Some(b"ckc".to_vec()));

        let plain = OfflinePlaybackHandle::new(id, PathBuf::from("/tmp/X"), None);
        assert!(!plain.is_protected());
        assert_eq!(plain.license().await.unwrap(), None);
    }
}
