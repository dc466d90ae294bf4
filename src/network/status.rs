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


//! Network status types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reachability as reported by the platform path monitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    Connected,
    Disconnected,
    /// No reading yet, or the platform query failed
    #[default]
    Unknown,
}

impl NetworkStatus {
    /// Only `Connected` counts as available
    pub fn is_connected(&self) -> bool {
        matches!(self, NetworkStatus::Connected)
    }
}

impl fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkStatus::Connected => write!(f, "connected"),
            NetworkStatus::Disconnected => write!(f, "disconnected"),
            NetworkStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Interface carrying the current path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Wifi,
    Cellular,
    Ethernet,
    #[default]
    Unknown,
}

impl ConnectionType {
    /// Human-readable name shown in resume prompts
    pub fn description(&self) -> &'static str {
        match self {
            ConnectionType::Wifi => "Wi-Fi",
            ConnectionType::Cellular => "Cellular",
            ConnectionType::Ethernet => "Ethernet",
            ConnectionType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Snapshot of the network path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPath {
    pub status: NetworkStatus,
    pub connection: ConnectionType,
    /// Metered connection (cellular, personal hotspot)
    pub expensive: bool,
    /// Low Data Mode or equivalent
    pub constrained: bool,
}

impl NetworkPath {
    pub fn satisfied(connection: ConnectionType) -> Self {
        Self {
            status: NetworkStatus::Connected,
            connection,
            expensive: matches!(connection, ConnectionType::Cellular),
            constrained: false,
        }
    }

    pub fn unsatisfied() -> Self {
        Self {
            status: NetworkStatus::Disconnected,
            ..Self::default()
        }
    }

    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn with_expensive(mut self, expensive: bool) -> Self {
        self.expensive = expensive;
        self
    }

    pub fn with_constrained(mut self, constrained: bool) -> Self {
        self.constrained = constrained;
        self
    }
}

/// Status transition delivered to subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkChange {
    pub previous: NetworkStatus,
    pub current: NetworkStatus,
    /// Path that produced `current`
    pub path: NetworkPath,
    pub at: DateTime<Utc>,
}
