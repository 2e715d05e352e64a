use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::events::{EventBus, EventSubscriber, EventType, LibraryEvent};
use crate::services::{MediaService, ScanService};

/// Routes live channel events into the scan registry and the item cache
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    scans: Arc<ScanService>,
    media: Arc<MediaService>,
}

impl EventDispatcher {
    pub fn new(scans: Arc<ScanService>, media: Arc<MediaService>) -> Self {
        Self { scans, media }
    }

    /// Handle a single event
    pub async fn dispatch(&self, event: LibraryEvent) {
        match event {
            LibraryEvent::MediaScan(scan) => {
                trace!(
                    "Scan event {:?} status={:?}",
                    scan.scan_id, scan.status
                );
                self.scans.apply_event(&scan).await;
            }
            LibraryEvent::MediaItemUpdate(update) => {
                let item = update.into_item();
                trace!("Item update for {}", item.id);
                self.media.upsert(vec![item]).await;
            }
        }
    }

    /// Subscribe to `bus` and dispatch until `cancel` fires or the bus closes
    pub fn spawn(self, bus: &EventBus, cancel: CancellationToken) -> JoinHandle<()> {
        let subscriber =
            bus.subscribe_to_types(vec![EventType::MediaScan, EventType::MediaItemUpdate]);
        tokio::spawn(async move { self.run(subscriber, cancel).await })
    }

    async fn run(self, mut subscriber: EventSubscriber, cancel: CancellationToken) {
        info!("Event dispatcher started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Event dispatcher cancelled");
                    break;
                }
                received = subscriber.recv() => match received {
                    Ok(event) => self.dispatch(event.event).await,
                    Err(e) => match e.downcast_ref::<RecvError>() {
                        Some(RecvError::Lagged(skipped)) => {
                            warn!("Event dispatcher lagged, {} events skipped", skipped);
                        }
                        _ => {
                            debug!("Event bus closed");
                            break;
                        }
                    },
                },
            }
        }
        info!("Event dispatcher stopped");
    }
}
