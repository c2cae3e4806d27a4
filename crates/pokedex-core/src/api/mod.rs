//! REST client module for PokeAPI.
//!
//! This module provides the `ApiClient` for fetching catalog records. Every
//! request goes through the shared `ResponseCache` first; the network is
//! only hit on a miss, and successful response bodies are cached as-is.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
