// Client-side sync core for a media library server: item cache, scan job
// registry, and playback continuation, fed by REST calls and a live channel.

pub mod backends;
pub mod config;
pub mod events;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;
pub mod workers;

pub use config::Config;
pub use state::LibraryClient;
pub use utils::AppError;
