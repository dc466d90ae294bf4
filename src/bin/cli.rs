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


use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use offline_core::download::{Bookmark, CoordinatorEvent, DownloadConfig, Notice, SimulatedEngine, Track};
use offline_core::network::{ConnectionType, ManualPathSource, NetworkMonitor, NetworkPath};
use offline_core::storage::{CredentialStore, Database, MemoryCredentialStore, SqliteCredentialStore};
use offline_core::{ContentIdentifier, CoordinatorConfig, OfflineManager, SourceDescriptor};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

#[derive(Parser)]
#[command(name = "offline-cli")]
#[command(about = "OfflineKit CLI - Desktop testing tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive content identifiers
    Identify {
        /// Source URL
        #[arg(short, long)]
        url: Option<String>,
        /// Display title
        #[arg(short, long)]
        title: Option<String>,
    },
    /// Run a scripted download against the simulated engine
    Simulate {
        /// Source URL
        #[arg(short, long, default_value = "https://cdn.example.com/sample/master.m3u8")]
        url: String,
        /// Display title
        #[arg(short, long, default_value = "Sample")]
        title: String,
        /// Explicit content identifier (derived from the title otherwise)
        #[arg(long)]
        id: Option<String>,
        /// Progress percentages to report, comma separated
        #[arg(long, value_delimiter = ',', default_value = "10,45,100")]
        steps: Vec<f64>,
        /// Drop the network once progress passes this percentage
        #[arg(long)]
        disconnect_at: Option<f64>,
        /// Credential database (in-memory when omitted)
        #[arg(long)]
        database: Option<PathBuf>,
        /// Directory for the placeholder media file
        #[arg(long, default_value = ".")]
        storage_dir: PathBuf,
    },
    /// Inspect stored credentials
    Credentials {
        /// Credential database
        #[arg(long)]
        database: PathBuf,
        #[command(subcommand)]
        action: CredentialAction,
    },
}

#[derive(Subcommand)]
enum CredentialAction {
    /// List stored keys
    List,
    /// Show one entry
    Show { key: String },
    /// Remove one entry
    Remove { key: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    offline_core::logging::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Identify { url, title } => identify(url, title)?,
        Commands::Simulate {
            url,
            title,
            id,
            steps,
            disconnect_at,
            database,
            storage_dir,
        } => simulate(url, title, id, steps, disconnect_at, database, storage_dir).await?,
        Commands::Credentials { database, action } => credentials(database, action).await?,
    }

    Ok(())
}

fn identify(url: Option<String>, title: Option<String>) -> Result<()> {
    if url.is_none() && title.is_none() {
        anyhow::bail!("Pass --url and/or --title");
    }

    if let Some(url) = url {
        let parsed = Url::parse(&url).with_context(|| format!("Invalid URL: {}", url))?;
        println!("From URL:   {}", ContentIdentifier::from_source_url(&parsed));
    }
    if let Some(title) = title {
        println!("From title: {}", ContentIdentifier::from_title(&title)?);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn simulate(
    url: String,
    title: String,
    id: Option<String>,
    steps: Vec<f64>,
    disconnect_at: Option<f64>,
    database: Option<PathBuf>,
    storage_dir: PathBuf,
) -> Result<()> {
    let source = SourceDescriptor::parse_hls(&url, title.as_str())?;
    let content_id = match id {
        Some(raw) => ContentIdentifier::new(raw)?,
        None => ContentIdentifier::from_title(&title)?,
    };

    let engine = Arc::new(SimulatedEngine::new(storage_dir).with_tracks(vec![
        Track::video("video-1080", "1080p", 4_500_000),
        Track::video("video-540", "540p", 825_000),
        Track::audio("audio-en", "English", "en"),
        Track::subtitle("subs-en", "English", "en"),
    ]));

    let path_source = Arc::new(ManualPathSource::new(NetworkPath::satisfied(ConnectionType::Wifi)));
    let network = NetworkMonitor::new(path_source.clone());
    network.start();

    let store: Arc<dyn CredentialStore> = match database {
        Some(path) => Arc::new(SqliteCredentialStore::new(&Database::new(path).await?)),
        None => Arc::new(MemoryCredentialStore::new()),
    };

    let manager = OfflineManager::new(engine.clone(), store, network.clone(), CoordinatorConfig::default());
    let coordinator = manager.coordinator_with_id(content_id.clone(), &source).await?;

    let mut events = coordinator.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("  {}", describe(&event));
        }
    });

    println!("Downloading {} ({})", title, content_id);
    let tracks = coordinator.request_tracks().await?;
    println!("  {} tracks offered", tracks.len());
    coordinator
        .request_download(tracks, DownloadConfig::default())
        .await?;

    let session = engine
        .session(&content_id)
        .context("Simulated engine has no session")?;

    let mut disconnected = false;
    for step in steps {
        if let Some(threshold) = disconnect_at {
            if !disconnected && step > threshold {
                disconnected = true;
                path_source.set_path(NetworkPath::unsatisfied());
                network.refresh();
                coordinator.current().await?;

                path_source.set_path(NetworkPath::satisfied(ConnectionType::Cellular));
                network.refresh();
                coordinator.current().await?;
                coordinator.request_resume().await?;
            }
        }

        session.emit_progress(step);
        coordinator.current().await?;
    }

    session.finish().await?;
    let snapshot = coordinator.current().await?;
    println!("Final state: {}", snapshot.display_string());

    let handle = coordinator.request_play().await?;
    println!("Playback location: {}", handle.location().display());

    manager.shutdown_all().await;
    drop(coordinator);
    printer.await?;
    Ok(())
}

fn describe(event: &CoordinatorEvent) -> String {
    match event {
        CoordinatorEvent::StateChanged { previous, current, .. } => {
            format!("state: {} -> {}", previous, current)
        }
        CoordinatorEvent::ProgressChanged { percent, .. } => format!("progress: {:.0}%", percent),
        CoordinatorEvent::Notice { notice, .. } => match notice {
            Notice::SuspendedForNetworkLoss => "notice: suspended, network lost".to_string(),
            Notice::ResumePrompt { connection, expensive } => format!(
                "notice: network back on {}{}, resume?",
                connection,
                if *expensive { " (metered)" } else { "" }
            ),
        },
        CoordinatorEvent::CredentialsSaved { license, .. } => {
            format!("credentials saved (license: {})", license)
        }
        CoordinatorEvent::EngineError { message, .. } => format!("engine error: {}", message),
        CoordinatorEvent::PersistenceFailed { message, .. } => {
            format!("persistence failed: {}", message)
        }
    }
}

async fn credentials(database: PathBuf, action: CredentialAction) -> Result<()> {
    let db = Database::new(&database)
        .await
        .with_context(|| format!("Failed to open {}", database.display()))?;
    let store = SqliteCredentialStore::new(&db);

    match action {
        CredentialAction::List => {
            let keys = store.keys().await?;
            if keys.is_empty() {
                println!("No credentials stored");
            }
            for key in keys {
                let size = store.get(&key).await?.map(|blob| blob.len()).unwrap_or(0);
                println!("{}  ({} bytes)", key, size);
            }
        }
        CredentialAction::Show { key } => match store.get(&key).await? {
            Some(blob) => match Bookmark::from_blob(&blob) {
                Ok(bookmark) => {
                    println!("Bookmark: {}", bookmark.path.display());
                    println!("Created:  {}", bookmark.created_at.to_rfc3339());
                }
                Err(_) => {
                    let preview = &blob[..blob.len().min(32)];
                    println!("{} bytes: {}", blob.len(), hex::encode(preview));
                }
            },
            None => println!("No entry for {}", key),
        },
        CredentialAction::Remove { key } => {
            store.remove(&key).await?;
            println!("Removed {}", key);
        }
    }

    db.close().await?;
    Ok(())
}
