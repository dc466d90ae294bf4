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


//! Local persistence
//!
//! SQLite database plus the credential store built on top of it.
//!
//! # Schema
//! - Credentials: `key -> blob` rows for bookmarks and licenses
//! - _migrations: applied migration ids
//!
//! # Usage Example
//! ```no_run
//! use offline_core::storage::{CredentialStore, Database, SqliteCredentialStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new("./offline.db").await?;
//! let store = SqliteCredentialStore::new(&db);
//!
//! store.set("movie-1.content", b"bookmark").await?;
//! let bookmark = store.get("movie-1.content").await?;
//! # Ok(())
//! # }
//! ```

pub mod credentials;
pub mod database;
pub mod migrations;

// Re-export commonly used types
pub use credentials::{CredentialRecord, CredentialStore, MemoryCredentialStore, SqliteCredentialStore};
pub use database::Database;
