//! Typed views over PokeAPI records.
//!
//! The Pokédex stores the raw JSON record of every caught Pokémon so nothing
//! is lost on round-trip; these structs pick out the fields the REPL shows.
//!
//! - `NamedApiResource`, `PaginatedResponse`: shared reference/list shapes
//! - `Pokemon`, `PokemonSpecies`: per-Pokémon data and catch rate
//! - `LocationArea`: encounters for an explorable area
//! - `EvolutionChain`: what each species evolves into

pub mod common;
pub mod evolution;
pub mod location;
pub mod pokemon;

pub use common::{ApiResource, NamedApiResource, PaginatedResponse};
pub use evolution::{ChainLink, EvolutionChain};
pub use location::{LocationArea, PokemonEncounter};
pub use pokemon::{
    FlavorText, Genus, Pokemon, PokemonMove, PokemonSpecies, PokemonStat, PokemonType,
};
