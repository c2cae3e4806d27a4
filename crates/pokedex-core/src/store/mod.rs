//! Durable storage for the user's Pokédex.
//!
//! `FileStore` saves and loads one JSON document at a fixed path. Writers
//! take an exclusive advisory lock on a sidecar `<path>.lock` file, readers a
//! shared one, both with a bounded wait. Writes go to a temporary file in the
//! same directory and are renamed over the target, so the save file is always
//! either the previous complete document or the new one.

pub mod error;
pub mod file;
pub mod lock;

pub use error::StoreError;
pub use file::FileStore;
pub use lock::{FileLock, LockMode};
