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


//! Network status monitor
//!
//! Tracks the current [`NetworkPath`] and notifies subscribers when the
//! reachability status changes. The monitor is an explicit, cloneable handle
//! that is injected into every coordinator.
//!
//! # Update sources
//! - [`PathSource::current_path`] is queried on `start()` and `refresh()`
//! - The platform pushes path updates through [`NetworkMonitor::report_path`]
//!
//! Duplicate statuses are swallowed. Notifications are sent while the state
//! lock is held, so every subscriber observes changes in the same order.

use crate::error::{OfflineError, Result};
use crate::network::status::{NetworkChange, NetworkPath, NetworkStatus};
use chrono::Utc;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Default subscriber buffer
pub const DEFAULT_CHANGE_BUFFER: usize = 16;

/// Platform query for the current network path
pub trait PathSource: Send + Sync {
    fn current_path(&self) -> Result<NetworkPath>;
}

/// Path source whose reading is set by hand
///
/// Used by tests and the CLI, and by platforms that only push updates.
#[derive(Debug)]
pub struct ManualPathSource {
    reading: Mutex<std::result::Result<NetworkPath, String>>,
}

impl ManualPathSource {
    pub fn new(path: NetworkPath) -> Self {
        Self {
            reading: Mutex::new(Ok(path)),
        }
    }

    pub fn set_path(&self, path: NetworkPath) {
        *self.reading.lock() = Ok(path);
    }

    /// Make subsequent queries fail with `message`
    pub fn set_failure(&self, message: impl Into<String>) {
        *self.reading.lock() = Err(message.into());
    }
}

impl Default for ManualPathSource {
    fn default() -> Self {
        Self::new(NetworkPath::unknown())
    }
}

impl PathSource for ManualPathSource {
    fn current_path(&self) -> Result<NetworkPath> {
        self.reading
            .lock()
            .clone()
            .map_err(OfflineError::NetworkUnavailable)
    }
}

struct MonitorState {
    running: bool,
    path: NetworkPath,
}

struct Inner {
    source: Arc<dyn PathSource>,
    state: Mutex<MonitorState>,
    changes: broadcast::Sender<NetworkChange>,
}

/// Connectivity monitor handle
#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<Inner>,
}

impl NetworkMonitor {
    pub fn new(source: Arc<dyn PathSource>) -> Self {
        Self::with_capacity(source, DEFAULT_CHANGE_BUFFER)
    }

    /// Create a monitor whose subscribers buffer up to `capacity` changes
    pub fn with_capacity(source: Arc<dyn PathSource>, capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                source,
                state: Mutex::new(MonitorState {
                    running: false,
                    path: NetworkPath::unknown(),
                }),
                changes,
            }),
        }
    }

    /// Start monitoring and take an initial reading
    ///
    /// Returns `false` when already running.
    pub fn start(&self) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.running {
                return false;
            }
            state.running = true;
        }

        info!("Network monitoring started");
        self.refresh();
        true
    }

    /// Stop monitoring; path updates are ignored until the next `start()`
    ///
    /// Returns `false` when not running.
    pub fn stop(&self) -> bool {
        let mut state = self.inner.state.lock();
        if !state.running {
            return false;
        }
        state.running = false;
        info!("Network monitoring stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Re-query the path source
    ///
    /// A failing query is treated as an `Unknown` reading.
    pub fn refresh(&self) {
        let path = match self.inner.source.current_path() {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "Network path query failed, treating status as unknown");
                NetworkPath::unknown()
            }
        };
        self.report_path(path);
    }

    /// Apply a path update pushed by the platform
    ///
    /// Returns `true` when the status changed and subscribers were notified.
    pub fn report_path(&self, path: NetworkPath) -> bool {
        let mut state = self.inner.state.lock();
        if !state.running {
            debug!("Ignoring network path update while monitor is stopped");
            return false;
        }

        let previous = state.path.status;
        state.path = path;
        if previous == path.status {
            return false;
        }

        info!(
            previous = %previous,
            current = %path.status,
            connection = path.connection.description(),
            "Network status changed"
        );

        // No receivers is fine: nobody is listening yet
        let _ = self.inner.changes.send(NetworkChange {
            previous,
            current: path.status,
            path,
            at: Utc::now(),
        });
        true
    }

    pub fn current_status(&self) -> NetworkStatus {
        self.inner.state.lock().path.status
    }

    pub fn current_path(&self) -> NetworkPath {
        self.inner.state.lock().path
    }

    /// `true` only while the status is `Connected`
    pub fn is_available(&self) -> bool {
        self.current_status().is_connected()
    }

    pub fn connection_type_description(&self) -> &'static str {
        self.current_path().connection.description()
    }

    pub fn is_expensive(&self) -> bool {
        self.current_path().expensive
    }

    pub fn is_constrained(&self) -> bool {
        self.current_path().constrained
    }

    /// Receive every subsequent status change, in order
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkChange> {
        self.inner.changes.subscribe()
    }
}

impl fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("NetworkMonitor")
            .field("running", &state.running)
            .field("path", &state.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::status::ConnectionType;

    fn monitor_with(path: NetworkPath) -> (Arc<ManualPathSource>, NetworkMonitor) {
        let source = Arc::new(ManualPathSource::new(path));
        let monitor = NetworkMonitor::new(source.clone());
        (source, monitor)
    }

    #[test]
    fn test_start_stop_idempotent() {
        let (_, monitor) = monitor_with(NetworkPath::satisfied(ConnectionType::Wifi));

        assert!(monitor.start());
        assert!(!monitor.start());
        assert!(monitor.is_running());
        assert!(monitor.is_available());

        assert!(monitor.stop());
        assert!(!monitor.stop());
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_initial_status_is_unknown() {
        let (_, monitor) = monitor_with(NetworkPath::satisfied(ConnectionType::Wifi));

        assert_eq!(monitor.current_status(), NetworkStatus::Unknown);
        assert!(!monitor.is_available());
        assert_eq!(monitor.connection_type_description(), "Unknown");
    }

    #[test]
    fn test_duplicate_status_does_not_notify() {
        let (_, monitor) = monitor_with(NetworkPath::satisfied(ConnectionType::Wifi));
        let mut rx = monitor.subscribe();
        monitor.start();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.previous, NetworkStatus::Unknown);
        assert_eq!(first.current, NetworkStatus::Connected);

        // Same status on another interface: path updates, no notification
        assert!(!monitor.report_path(NetworkPath::satisfied(ConnectionType::Cellular)));
        assert!(rx.try_recv().is_err());
        assert!(monitor.is_expensive());
        assert_eq!(monitor.connection_type_description(), "Cellular");

        assert!(monitor.report_path(NetworkPath::unsatisfied()));
        assert_eq!(rx.try_recv().unwrap().current, NetworkStatus::Disconnected);
    }

    #[test]
    fn test_updates_ignored_while_stopped() {
        let (_, monitor) = monitor_with(NetworkPath::unsatisfied());
        let mut rx = monitor.subscribe();

        assert!(!monitor.report_path(NetworkPath::satisfied(ConnectionType::Wifi)));
        assert!(rx.try_recv().is_err());
        assert_eq!(monitor.current_status(), NetworkStatus::Unknown);
    }

    #[test]
    fn test_query_failure_falls_back_to_unknown() {
        let (source, monitor) = monitor_with(NetworkPath::satisfied(ConnectionType::Ethernet));
        monitor.start();
        assert_eq!(monitor.current_status(), NetworkStatus::Connected);

        source.set_failure("path monitor unavailable");
        monitor.refresh();
        assert_eq!(monitor.current_status(), NetworkStatus::Unknown);
        assert!(!monitor.is_available());

        source.set_path(NetworkPath::satisfied(ConnectionType::Ethernet).with_constrained(true));
        monitor.refresh();
        assert!(monitor.is_available());
        assert!(monitor.is_constrained());
    }

    #[test]
    fn test_subscribers_see_same_order() {
        let (_, monitor) = monitor_with(NetworkPath::unsatisfied());
        let mut a = monitor.subscribe();
        let mut b = monitor.subscribe();
        monitor.start();
        monitor.report_path(NetworkPath::satisfied(ConnectionType::Wifi));
        monitor.report_path(NetworkPath::unsatisfied());

        for rx in [&mut a, &mut b] {
            let seen: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
                .map(|c| c.current)
                .collect();
            assert_eq!(
                seen,
                vec![
                    NetworkStatus::Disconnected,
                    NetworkStatus::Connected,
                    NetworkStatus::Disconnected
                ]
            );
        }
    }
}
