//! In-memory caching of raw API responses.
//!
//! This module provides the `ResponseCache` used by the API client to avoid
//! re-fetching the same URL. Entries are opaque byte blobs keyed by request
//! URL and are reaped by a background sweep once they outlive the TTL.
//!
//! Nothing here touches disk; the cache is empty at every process start.

pub mod response;

pub use response::ResponseCache;
