pub mod app_state;
pub mod media_cache;
pub mod scan_registry;

pub use app_state::LibraryClient;
pub use media_cache::{DetailState, MediaItemCache};
pub use scan_registry::{ScanBucket, ScanRegistry};
