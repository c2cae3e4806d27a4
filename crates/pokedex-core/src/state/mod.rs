//! The user's in-memory Pokédex and when it gets written to disk.
//!
//! This module provides:
//! - `Collection`: caught Pokémon keyed by canonical name
//! - `PokedexDocument`: the on-disk shape of the save file
//! - `SharedState`: collection plus map cursors behind one RwLock, with the
//!   change counter that drives auto-save

pub mod collection;
pub mod shared;

pub use collection::{Collection, KeyCollision, PokedexDocument};
pub use shared::{AutoSaveSettings, PokedexState, SharedState, SyncCounter, SyncOutcome};
