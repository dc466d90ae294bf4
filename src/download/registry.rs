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


//! Coordinator registry
//!
//! `OfflineManager` hands out exactly one live [`DownloadCoordinator`] per
//! content identifier and shares the engine, credential store and network
//! monitor between them.

use crate::config::{CoordinatorConfig, OfflineConfig};
use crate::content::{ContentIdentifier, SourceDescriptor};
use crate::download::coordinator::DownloadCoordinator;
use crate::download::engine::DownloadEngine;
use crate::download::progress::DownloadSnapshot;
use crate::error::Result;
use crate::network::{NetworkMonitor, PathSource};
use crate::storage::{CredentialStore, Database, SqliteCredentialStore};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub struct OfflineManager {
    engine: Arc<dyn DownloadEngine>,
    store: Arc<dyn CredentialStore>,
    network: NetworkMonitor,
    config: CoordinatorConfig,
    coordinators: RwLock<HashMap<ContentIdentifier, DownloadCoordinator>>,
}

impl OfflineManager {
    pub fn new(
        engine: Arc<dyn DownloadEngine>,
        store: Arc<dyn CredentialStore>,
        network: NetworkMonitor,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            engine,
            store,
            network,
            config,
            coordinators: RwLock::new(HashMap::new()),
        }
    }

    /// Build a manager from configuration
    ///
    /// Opens the SQLite credential store at the configured path and starts a
    /// network monitor over `path_source`.
    pub async fn from_config(
        config: &OfflineConfig,
        engine: Arc<dyn DownloadEngine>,
        path_source: Arc<dyn PathSource>,
    ) -> Result<Self> {
        config.validate()?;

        let db = Database::new(config.resolved_database_path()).await?;
        let store: Arc<dyn CredentialStore> = Arc::new(SqliteCredentialStore::new(&db));

        let network = NetworkMonitor::with_capacity(path_source, config.network_event_buffer);
        network.start();

        Ok(Self::new(engine, store, network, config.coordinator.clone()))
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    pub fn store(&self) -> Arc<dyn CredentialStore> {
        self.store.clone()
    }

    /// Coordinator for the identifier derived from the source URL
    pub async fn coordinator_for(&self, source: &SourceDescriptor) -> Result<DownloadCoordinator> {
        self.coordinator_with_id(source.content_identifier(), source).await
    }

    /// Coordinator for an explicit identifier
    ///
    /// Returns the live coordinator if one exists; a closed one is replaced.
    pub async fn coordinator_with_id(
        &self,
        content_id: ContentIdentifier,
        source: &SourceDescriptor,
    ) -> Result<DownloadCoordinator> {
        let mut coordinators = self.coordinators.write().await;

        if let Some(existing) = coordinators.get(&content_id) {
            if !existing.is_closed() {
                return Ok(existing.clone());
            }
            warn!(content_id = %content_id, "Replacing closed download coordinator");
        }

        let coordinator = DownloadCoordinator::spawn(
            content_id.clone(),
            source.clone(),
            self.engine.clone(),
            self.store.clone(),
            self.network.clone(),
            self.config.clone(),
        )
        .await?;

        coordinators.insert(content_id, coordinator.clone());
        Ok(coordinator)
    }

    pub async fn get(&self, content_id: &ContentIdentifier) -> Option<DownloadCoordinator> {
        self.coordinators
            .read()
            .await
            .get(content_id)
            .filter(|c| !c.is_closed())
            .cloned()
    }

    /// Latest snapshot of every live coordinator, ordered by identifier
    pub async fn snapshots(&self) -> Vec<DownloadSnapshot> {
        let coordinators = self.coordinators.read().await;
        let mut snapshots: Vec<DownloadSnapshot> = coordinators
            .values()
            .filter(|c| !c.is_closed())
            .map(|c| c.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.content_id.cmp(&b.content_id));
        snapshots
    }

    /// Stop and forget the coordinator for `content_id`
    ///
    /// Returns `false` when there was none.
    pub async fn release(&self, content_id: &ContentIdentifier) -> Result<bool> {
        let removed = self.coordinators.write().await.remove(content_id);
        match removed {
            Some(coordinator) => {
                if !coordinator.is_closed() {
                    coordinator.shutdown().await?;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stop every coordinator
    pub async fn shutdown_all(&self) {
        let coordinators: Vec<DownloadCoordinator> = {
            let mut map = self.coordinators.write().await;
            map.drain().map(|(_, c)| c).collect()
        };

        let count = coordinators.len();
        let results = join_all(coordinators.iter().map(|c| c.shutdown())).await;
        for (coordinator, result) in coordinators.iter().zip(results) {
            if let Err(e) = result {
                warn!(content_id = %coordinator.content_id(), error = %e, "Coordinator already stopped");
            }
        }

        info!(count, "Shut down download coordinators");
    }
}
