use super::types::{ChannelEvent, EventType, LibraryEvent};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, trace};

/// Event subscriber handle
pub struct EventSubscriber {
    receiver: broadcast::Receiver<ChannelEvent>,
    filter: Option<Vec<EventType>>,
}

impl EventSubscriber {
    pub fn new(receiver: broadcast::Receiver<ChannelEvent>, filter: Option<Vec<EventType>>) -> Self {
        Self { receiver, filter }
    }

    fn matches(&self, event: &ChannelEvent) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|types| types.contains(&event.event_type()))
    }

    /// Receive the next event matching the filter
    pub async fn recv(&mut self) -> Result<ChannelEvent> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Try to receive without blocking
    pub fn try_recv(&mut self) -> Result<Option<ChannelEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.matches(&event) => return Ok(Some(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Fans live-channel messages out to subscribers
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<ChannelEvent>,
    stats: Arc<RwLock<EventBusStats>>,
    event_history: Arc<RwLock<Vec<ChannelEvent>>>,
    max_history_size: usize,
}

#[derive(Debug, Default, Clone)]
pub struct EventBusStats {
    pub total_events: u64,
    pub events_by_type: HashMap<String, u64>,
    pub malformed_events: u64,
    pub subscriber_count: usize,
    pub dropped_events: u64,
}

impl EventBus {
    /// Create a new event bus with specified buffer capacity
    pub fn new(capacity: usize, max_history_size: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);

        Self {
            sender,
            stats: Arc::new(RwLock::new(EventBusStats::default())),
            event_history: Arc::new(RwLock::new(Vec::new())),
            max_history_size,
        }
    }

    /// Decode a raw channel message and publish it. Undecodable messages are
    /// counted and dropped; they are never an error.
    pub async fn publish_raw(&self, raw: &str) -> Result<bool> {
        let decoded = serde_json::from_str(raw)
            .ok()
            .and_then(LibraryEvent::decode);

        match decoded {
            Some(event) => {
                self.publish(event).await?;
                Ok(true)
            }
            None => {
                debug!("Dropping undecodable channel message ({} bytes)", raw.len());
                self.stats.write().await.malformed_events += 1;
                Ok(false)
            }
        }
    }

    /// Publish an event to all subscribers
    pub async fn publish(&self, event: LibraryEvent) -> Result<()> {
        let event = ChannelEvent::new(event);
        trace!("Publishing event {} ({})", event.id, event.event_type().as_str());

        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type().as_str().to_string())
                .or_insert(0) += 1;
        }

        {
            let mut history = self.event_history.write().await;
            history.push(event.clone());
            if history.len() > self.max_history_size {
                let excess = history.len() - self.max_history_size;
                history.drain(0..excess);
            }
        }

        if self.sender.send(event).is_err() {
            // No subscribers is normal, don't log
            self.stats.write().await.dropped_events += 1;
        }
        Ok(())
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber::new(self.sender.subscribe(), None)
    }

    /// Subscribe to specific event types
    pub fn subscribe_to_types(&self, types: Vec<EventType>) -> EventSubscriber {
        EventSubscriber::new(self.sender.subscribe(), Some(types))
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub async fn get_stats(&self) -> EventBusStats {
        let mut stats = self.stats.read().await.clone();
        stats.subscriber_count = self.subscriber_count();
        stats
    }

    /// Get event history for debugging
    pub async fn get_history(&self) -> Vec<ChannelEvent> {
        self.event_history.read().await.clone()
    }

    pub async fn clear_history(&self) {
        self.event_history.write().await.clear();
    }
}
