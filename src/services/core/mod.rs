//! Pure helpers (normalizer, planner, throttle, projections) and the async
//! services that drive the state repositories through the backend

pub mod libraries;
pub mod media;
pub mod metadata_refresh;
pub mod playback;
pub mod progress;
pub mod projections;
pub mod scans;

pub use libraries::LibraryService;
pub use media::MediaService;
pub use metadata_refresh::RefreshThrottle;
pub use playback::PlaybackPlanner;
pub use scans::{MediaItemSink, ScanService};
