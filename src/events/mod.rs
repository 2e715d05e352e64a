pub mod event_bus;
pub mod types;

pub use event_bus::{EventBus, EventBusStats, EventSubscriber};
pub use types::{ChannelEvent, EventType, LibraryEvent, MediaItemUpdate, ScanEvent};
