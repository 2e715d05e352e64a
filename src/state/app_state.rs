use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::backends::{HttpBackend, LibraryBackend};
use crate::config::Config;
use crate::events::EventBus;
use crate::services::{LibraryService, MediaService, ScanService};
use crate::workers::EventDispatcher;

/// Everything one client session needs, wired together
pub struct LibraryClient {
    pub config: Config,
    pub event_bus: Arc<EventBus>,
    pub media: Arc<MediaService>,
    pub scans: Arc<ScanService>,
    pub libraries: Arc<LibraryService>,
    dispatcher_cancel: CancellationToken,
    dispatcher: Option<JoinHandle<()>>,
}

impl LibraryClient {
    pub fn new(config: Config, backend: Arc<dyn LibraryBackend>) -> Self {
        let event_bus = Arc::new(EventBus::new(
            config.events.channel_capacity,
            config.events.history_size,
        ));

        let media = Arc::new(MediaService::new(backend.clone(), &config));
        let scans = Arc::new(ScanService::new(backend.clone(), media.clone()));
        let libraries = Arc::new(LibraryService::new(backend, scans.clone()));

        Self {
            config,
            event_bus,
            media,
            scans,
            libraries,
            dispatcher_cancel: CancellationToken::new(),
            dispatcher: None,
        }
    }

    /// Client talking to the HTTP API named in `config`
    pub fn from_config(config: Config) -> Result<Self> {
        let backend = Arc::new(HttpBackend::from_config(&config.api)?);
        Ok(Self::new(config, backend))
    }

    /// Start routing bus events into the services. Calling it twice is a no-op.
    pub fn start(&mut self) {
        if self.dispatcher.is_some() {
            return;
        }
        let dispatcher = EventDispatcher::new(self.scans.clone(), self.media.clone());
        self.dispatcher = Some(dispatcher.spawn(&self.event_bus, self.dispatcher_cancel.clone()));
        info!("Library client started");
    }

    /// Stop the dispatcher and wait for pending metadata refreshes
    pub async fn shutdown(&mut self) {
        self.dispatcher_cancel.cancel();
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.await;
        }
        self.media.drain_refreshes().await;
        info!("Library client stopped");
    }
}
