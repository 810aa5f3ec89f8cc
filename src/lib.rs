// Catalog synchronization engine: resource registry, source adapters,
// chunked content store and the staged-commit sync orchestrator.
// Rendering, playback and input handling live in the embedding application.

pub mod adapters;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::SyncError;
