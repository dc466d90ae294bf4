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


//! Configuration
//!
//! `OfflineConfig` is read from a JSON file. Missing fields take their
//! defaults, so an empty object is a valid configuration.
//!
//! ```json
//! {
//!   "database_path": "/data/offline.db",
//!   "network_event_buffer": 16,
//!   "coordinator": {
//!     "default_minimum_bitrate": 825000,
//!     "deletion_order": "data_then_credentials"
//!   }
//! }
//! ```

use crate::error::{OfflineError, Result};
use crate::storage::Database;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Minimum video bitrate requested when a download config leaves it unset
pub const DEFAULT_MINIMUM_BITRATE: u64 = 825_000;

/// Order of the two deletion steps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionOrder {
    /// Delete on-disk data, then clear the stored credentials.
    /// A failed data deletion leaves the credentials untouched.
    #[default]
    DataThenCredentials,
    /// Clear the stored credentials, then delete on-disk data.
    /// The credentials are restored if the data deletion fails.
    CredentialsThenData,
}

/// Per-coordinator behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Filled into download configs that do not set a minimum bitrate
    pub default_minimum_bitrate: Option<u64>,
    /// Suspend a running download when the network drops
    pub auto_suspend_on_disconnect: bool,
    /// Offer to resume a suspended download when the network returns
    pub prompt_resume_on_reconnect: bool,
    pub deletion_order: DeletionOrder,
    /// Queued commands per coordinator
    pub command_buffer: usize,
    /// Buffered UI events per subscriber
    pub event_buffer: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_minimum_bitrate: Some(DEFAULT_MINIMUM_BITRATE),
            auto_suspend_on_disconnect: true,
            prompt_resume_on_reconnect: true,
            deletion_order: DeletionOrder::default(),
            command_buffer: 32,
            event_buffer: 64,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// SQLite file for credentials, platform default when unset
    pub database_path: Option<PathBuf>,
    /// Buffered network changes per subscriber
    pub network_event_buffer: usize,
    pub coordinator: CoordinatorConfig,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            network_event_buffer: 16,
            coordinator: CoordinatorConfig::default(),
        }
    }
}

impl OfflineConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: OfflineConfig = serde_json::from_str(json)
            .map_err(|e| OfflineError::ConfigurationError(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let config = Self::from_json_str(&content)?;
                info!(path = %path.display(), "Loaded configuration");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(OfflineError::ConfigurationError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Write as pretty JSON, creating the parent directory if needed
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.validate()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;

        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.network_event_buffer == 0 {
            return Err(OfflineError::ConfigurationError(
                "network_event_buffer must be greater than 0".to_string(),
            ));
        }
        if self.coordinator.command_buffer == 0 {
            return Err(OfflineError::ConfigurationError(
                "coordinator.command_buffer must be greater than 0".to_string(),
            ));
        }
        if self.coordinator.event_buffer == 0 {
            return Err(OfflineError::ConfigurationError(
                "coordinator.event_buffer must be greater than 0".to_string(),
            ));
        }
        if self.coordinator.default_minimum_bitrate == Some(0) {
            return Err(OfflineError::ConfigurationError(
                "coordinator.default_minimum_bitrate must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Configured database path, or the platform default
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(Database::get_default_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = OfflineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, OfflineConfig::default());
        assert_eq!(config.coordinator.default_minimum_bitrate, Some(825_000));
        assert_eq!(config.coordinator.deletion_order, DeletionOrder::DataThenCredentials);
    }

    #[test]
    fn test_partial_override() {
        let config = OfflineConfig::from_json_str(
            r#"{ "coordinator": { "deletion_order": "credentials_then_data", "auto_suspend_on_disconnect": false } }"#,
        )
        .unwrap();
        assert_eq!(config.coordinator.deletion_order, DeletionOrder::CredentialsThenData);
        assert!(!config.coordinator.auto_suspend_on_disconnect);
        assert!(config.coordinator.prompt_resume_on_reconnect);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(OfflineConfig::from_json_str(r#"{ "network_event_buffer": 0 }"#).is_err());
        assert!(OfflineConfig::from_json_str(r#"{ "coordinator": { "command_buffer": 0 } }"#).is_err());
        assert!(OfflineConfig::from_json_str("not json").is_err());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("offline.json");

        // Missing file falls back to defaults
        assert_eq!(OfflineConfig::load(&path).await.unwrap(), OfflineConfig::default());

        let mut config = OfflineConfig::default();
        config.database_path = Some(dir.path().join("offline.db"));
        config.save(&path).await.unwrap();

        let loaded = OfflineConfig::load(&path).await.unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.resolved_database_path(), dir.path().join("offline.db"));
    }
}
