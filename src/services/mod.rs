pub mod core;

pub use self::core::{LibraryService, MediaService, ScanService};
