use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use media_library_client::models::LibraryId;
use media_library_client::services::core::projections;
use media_library_client::{Config, LibraryClient};

/// Fetch one library, then feed live channel messages (one JSON object per
/// line on stdin) through the client until EOF.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("media_library_client=debug")),
        )
        .init();

    info!("Starting media library client");

    let config = Config::load().context("Failed to load configuration")?;
    let mut client = LibraryClient::from_config(config)?;
    client.start();

    let library_id = std::env::args().nth(1).map(LibraryId::from);
    match &library_id {
        Some(library_id) => {
            client.media.fetch(Some(library_id)).await;
            client.scans.load_snapshot(Some(library_id)).await;
        }
        None => {
            let libraries = client.libraries.list_libraries().await?;
            for library in &libraries {
                info!("Library {}: {}", library.id, library.name);
            }
            client.scans.load_snapshot(None).await;
        }
    }
    report(&client, library_id.as_ref()).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match client.event_bus.publish_raw(&line).await {
            Ok(true) => {}
            Ok(false) => warn!("Ignoring unrecognised message"),
            Err(e) => warn!("Failed to publish message: {:#}", e),
        }
    }

    client.shutdown().await;
    report(&client, library_id.as_ref()).await;
    Ok(())
}

async fn report(client: &LibraryClient, library_id: Option<&LibraryId>) {
    {
        let cache = client.media.state().await;
        if let Some(error) = cache.error() {
            warn!("Item list error: {}", error);
        }
        info!("{} items cached", cache.total_count());
        for (letter, items) in projections::group_by_letter(cache.items()) {
            info!("  {}: {} items", letter, items.len());
        }
    }

    for job in client.scans.jobs(library_id).await {
        info!(
            "Scan {} {:?}: {}/{}",
            job.id,
            job.status,
            job.processed(),
            job.total()
        );
    }
}
