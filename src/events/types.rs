use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{LibraryId, MediaItem, ScanCounters, ScanJobId, ScanStatus};

/// Message as received from the live channel, stamped on arrival
#[derive(Debug, Clone)]
pub struct ChannelEvent {
    pub id: String,
    pub event: LibraryEvent,
    pub received_at: chrono::DateTime<chrono::Utc>,
}

impl ChannelEvent {
    pub fn new(event: LibraryEvent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event,
            received_at: chrono::Utc::now(),
        }
    }

    pub fn event_type(&self) -> EventType {
        self.event.event_type()
    }
}

/// Push messages the client understands, tagged by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LibraryEvent {
    MediaScan(ScanEvent),
    MediaItemUpdate(MediaItemUpdate),
}

impl LibraryEvent {
    /// Decode one channel message. Messages may arrive bare or wrapped as
    /// `{"type": "update", "data": {...}}`. Anything unrecognised yields `None`.
    pub fn decode(value: Value) -> Option<Self> {
        let payload = match value {
            Value::Object(mut map)
                if map.get("type").and_then(Value::as_str) == Some("update") =>
            {
                map.remove("data")?
            }
            other => other,
        };
        serde_json::from_value(payload).ok()
    }

    pub fn event_type(&self) -> EventType {
        match self {
            LibraryEvent::MediaScan(_) => EventType::MediaScan,
            LibraryEvent::MediaItemUpdate(_) => EventType::MediaItemUpdate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    MediaScan,
    MediaItemUpdate,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MediaScan => "media_scan",
            EventType::MediaItemUpdate => "media_item_update",
        }
    }
}

/// Scan progress pushed by a background worker. Every field is optional;
/// counters are absolute values, never deltas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanEvent {
    #[serde(default)]
    pub scan_id: Option<ScanJobId>,
    #[serde(default)]
    pub library_id: Option<LibraryId>,
    #[serde(default)]
    pub library_name: Option<String>,
    #[serde(default)]
    pub status: Option<ScanStatus>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub total: Option<i64>,
    #[serde(default)]
    pub files: Option<i64>,
    #[serde(default)]
    pub processed_files: Option<i64>,
    #[serde(default)]
    pub processed: Option<i64>,
    #[serde(default)]
    pub new_files: Option<i64>,
    #[serde(default)]
    pub updated_files: Option<i64>,
    #[serde(default)]
    pub removed_files: Option<i64>,
    #[serde(default)]
    pub matched: Option<i64>,
    #[serde(default)]
    pub unmatched: Option<i64>,
    #[serde(default)]
    pub media_item: Option<MediaItem>,
}

impl ScanEvent {
    pub fn new(scan_id: impl Into<ScanJobId>) -> Self {
        Self {
            scan_id: Some(scan_id.into()),
            ..Self::default()
        }
    }

    /// Counters carried by this event; alternative field names collapse here
    pub fn counters(&self) -> ScanCounters {
        ScanCounters {
            total: self.total.or(self.files),
            processed: self.processed_files.or(self.processed),
            new_files: self.new_files,
            updated_files: self.updated_files,
            removed_files: self.removed_files,
            matched: self.matched,
            unmatched: self.unmatched,
        }
    }
}

/// An item created or changed by a scan, pushed outside of a scan event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItemUpdate {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub library_id: Option<LibraryId>,
    pub media_item: MediaItem,
}

impl MediaItemUpdate {
    /// The embedded item, with the envelope's library id filled in when the
    /// item itself does not name one
    pub fn into_item(self) -> MediaItem {
        let mut item = self.media_item;
        if item.library_id.is_none() {
            item.library_id = self.library_id;
        }
        item
    }
}
