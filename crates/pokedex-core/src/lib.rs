//! Core library for pokedexcli.
//!
//! This crate holds everything the REPL builds on:
//!
//! - `cache`: in-memory response cache with a periodic TTL sweep
//! - `store`: crash-safe, multi-process-safe save file for the Pokédex
//! - `state`: the lock-guarded collection plus the auto-save policy
//! - `api`: cache-first PokeAPI client
//! - `models`: typed views over PokeAPI records
//! - `config`: on-disk configuration and path resolution
//! - `utils`: name canonicalization and display helpers

pub mod api;
pub mod cache;
pub mod config;
pub mod models;
pub mod state;
pub mod store;
pub mod utils;

pub use api::{ApiClient, ApiError};
pub use cache::ResponseCache;
pub use config::Config;
pub use state::{AutoSaveSettings, Collection, PokedexDocument, SharedState, SyncOutcome};
pub use store::{FileStore, StoreError};
