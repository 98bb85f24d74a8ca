pub mod error;
pub mod models;
pub mod media;
pub mod media_api;

/// Results kept per feature
pub const COLLECTION_CAPACITY: usize = 5;
/// Ceiling for the timeline of a structured video plan
pub const MAX_TIMELINE_SECS: u32 = 8;

pub mod bulk;
pub mod collection;
pub mod context;
pub mod feature;
pub mod filename;
pub mod key_store;
pub mod prompt;

pub use key_store::{ApiKey, KeyStore};
