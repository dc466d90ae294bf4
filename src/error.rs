//! Error types for the offline download core
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are grouped by where they originate (command preconditions, the
//! external download engine, credential storage, configuration) so the UI
//! layer can decide whether to offer a retry.
//!
//! ## Categories
//!
//! ### Command preconditions (reported synchronously to the caller)
//! - `NetworkUnavailable` - command needs connectivity; retry once online
//! - `InvalidTransition` - command not valid from the current download state
//! - `NotDownloaded` / `OfflineAssetMissing` - playback requested without local data
//!
//! ### Engine
//! - `TrackFetch` - track metadata could not be fetched
//! - `Deletion` - on-disk cleanup failed, state left unchanged
//! - `EngineReported` - message forwarded verbatim from the engine's error event
//!
//! ### Storage / configuration
//! - `CredentialStore`, `MigrationFailed`, `ConfigurationError`
//! - `SqlxError`, `SerdeJsonError`, `IoError`, `UrlError` via `#[from]`

use crate::download::progress::DownloadState;
use thiserror::Error;

/// Result type alias using our OfflineError type
pub type Result<T> = std::result::Result<T, OfflineError>;

/// Main error type for the offline download core
///
/// No variant is fatal to the process: every error is recoverable at the UI
/// boundary, either by retrying or by re-downloading the content.
#[derive(Error, Debug)]
pub enum OfflineError {
    // ===== Command Preconditions =====

    /// A command that needs connectivity was issued while the monitor reports no network
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// Command issued from a state that has no edge for it
    #[error("Cannot {command} while download is {state}")]
    InvalidTransition {
        /// Command that was rejected (e.g., "start", "resume")
        command: &'static str,
        /// State the session was in when the command arrived
        state: DownloadState,
    },

    /// Offline playback requested for content that has not finished downloading
    #[error("Content is not downloaded: {0}")]
    NotDownloaded(String),

    /// No usable bookmark is stored for the content
    #[error("Offline asset missing for '{content_id}': {reason}")]
    OfflineAssetMissing {
        content_id: String,
        reason: String,
    },

    /// The coordinator task for this content has stopped
    #[error("Download coordinator for '{0}' is closed")]
    CoordinatorClosed(String),

    // ===== Engine Errors =====

    /// Track metadata could not be fetched (invalid content or unreachable engine)
    #[error("Track fetch failed: {0}")]
    TrackFetch(String),

    /// Removing downloaded data from disk failed
    #[error("Offline data deletion failed: {0}")]
    Deletion(String),

    /// Error reported by the download engine through its error event or a failed command
    #[error("Download engine error: {0}")]
    EngineReported(String),

    // ===== Storage Errors =====

    /// Credential store read or write failed
    #[error("Credential store error: {0}")]
    CredentialStore(String),

    /// Database migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    // ===== Configuration / Input =====

    /// Invalid configuration file or value
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Invalid input (malformed identifier, empty key, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    InternalError(String),

    // ===== External Library Errors =====

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),
}

// Helper methods for creating common errors
impl OfflineError {
    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        OfflineError::InvalidInput(message.into())
    }

    /// Create an InternalError with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        OfflineError::InternalError(message.into())
    }

    /// Create an InvalidTransition error
    pub fn invalid_transition(command: &'static str, state: DownloadState) -> Self {
        OfflineError::InvalidTransition { command, state }
    }

    /// Create an OfflineAssetMissing error
    pub fn asset_missing<S: Into<String>, R: Into<String>>(content_id: S, reason: R) -> Self {
        OfflineError::OfflineAssetMissing {
            content_id: content_id.into(),
            reason: reason.into(),
        }
    }

    /// Check if the user can simply retry the same command later
    ///
    /// Returns `true` for:
    /// - Commands rejected for lack of connectivity
    /// - Track fetch failures
    /// - Failed deletions (state was left unchanged)
    /// - Errors forwarded from the engine
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OfflineError::NetworkUnavailable(_)
                | OfflineError::TrackFetch(_)
                | OfflineError::Deletion(_)
                | OfflineError::EngineReported(_)
        )
    }

    /// Check if the error is a violated precondition
    ///
    /// These are reported to the caller and never ignored; retrying without
    /// changing the download state will fail the same way.
    pub fn is_precondition_error(&self) -> bool {
        matches!(
            self,
            OfflineError::InvalidTransition { .. }
                | OfflineError::NotDownloaded(_)
                | OfflineError::OfflineAssetMissing { .. }
        )
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            OfflineError::NetworkUnavailable(_) => {
                "No network connection. Connect to the internet and try again.".to_string()
            }
            OfflineError::TrackFetch(_) => {
                "Could not load the available tracks for this title. Please try again.".to_string()
            }
            OfflineError::Deletion(_) => {
                "The downloaded files could not be removed. Please try again.".to_string()
            }
            OfflineError::NotDownloaded(_) => {
                "This title has not been downloaded yet.".to_string()
            }
            OfflineError::OfflineAssetMissing { .. } => {
                "The downloaded files for this title are missing. Please download it again.".to_string()
            }
            OfflineError::EngineReported(message) => {
                format!("The download failed: {}", message)
            }
            OfflineError::InvalidTransition { command, state } => {
                format!("Cannot {} while the download is {}.", command, state.label().to_lowercase())
            }
            _ => self.to_string(),
        }
    }
}
