//! Local persistent state
//!
//! Two independent documents in the data directory: the registry of uploaded
//! files and the cache of download passwords. Both are hydrated once at start
//! and written through on every change.

pub mod backend;
pub mod credentials;
pub mod registry;

pub use backend::{FileStore, KeyValueStore};
pub use credentials::CredentialCache;
pub use registry::{FileRecord, RegistryCache};
