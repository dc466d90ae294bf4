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


//! Network reachability
//!
//! # Modules
//! - `status` - Status, connection type and path types
//! - `monitor` - Monitor handle with change subscription

pub mod monitor;
pub mod status;

pub use monitor::{ManualPathSource, NetworkMonitor, PathSource};
pub use status::{ConnectionType, NetworkChange, NetworkPath, NetworkStatus};
