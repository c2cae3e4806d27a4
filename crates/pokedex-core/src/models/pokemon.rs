use serde::{Deserialize, Serialize};

use crate::utils::collapse_whitespace;

use super::{ApiResource, NamedApiResource};

/// Language code of the text shown to the user.
const LANGUAGE: &str = "en";

/// The fields of a `/pokemon/{name}` record that the REPL displays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pokemon {
    pub name: String,
    /// Decimeters.
    #[serde(default)]
    pub height: u32,
    /// Hectograms.
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub base_experience: Option<u32>,
    #[serde(default)]
    pub stats: Vec<PokemonStat>,
    #[serde(default)]
    pub types: Vec<PokemonType>,
    #[serde(default)]
    pub moves: Vec<PokemonMove>,
    #[serde(default)]
    pub species: NamedApiResource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PokemonStat {
    pub base_stat: u32,
    #[serde(default)]
    pub effort: u32,
    pub stat: NamedApiResource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PokemonType {
    pub slot: u8,
    #[serde(rename = "type")]
    pub kind: NamedApiResource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PokemonMove {
    #[serde(rename = "move")]
    pub kind: NamedApiResource,
}

impl Pokemon {
    /// Parse a stored raw record. Unknown fields are ignored.
    pub fn from_record(record: &serde_json::Value) -> serde_json::Result<Self> {
        Self::deserialize(record)
    }

    pub fn type_names(&self) -> Vec<&str> {
        let mut types: Vec<&PokemonType> = self.types.iter().collect();
        types.sort_by_key(|t| t.slot);
        types.into_iter().map(|t| t.kind.name.as_str()).collect()
    }

    pub fn move_names(&self) -> Vec<&str> {
        self.moves.iter().map(|m| m.kind.name.as_str()).collect()
    }
}

/// The fields of a `/pokemon-species/{name}` record used for catching.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PokemonSpecies {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub name: String,
    /// 0-255; higher is easier to catch.
    pub capture_rate: u8,
    #[serde(default)]
    pub evolves_from_species: Option<NamedApiResource>,
    #[serde(default)]
    pub evolution_chain: Option<ApiResource>,
    #[serde(default)]
    pub genera: Vec<Genus>,
    #[serde(default)]
    pub flavor_text_entries: Vec<FlavorText>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genus {
    pub genus: String,
    pub language: NamedApiResource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlavorText {
    pub flavor_text: String,
    pub language: NamedApiResource,
    #[serde(default)]
    pub version: Option<NamedApiResource>,
}

impl PokemonSpecies {
    /// English genus, e.g. "Mouse Pokémon".
    pub fn genus(&self) -> Option<&str> {
        self.genera
            .iter()
            .find(|g| g.language.name == LANGUAGE)
            .map(|g| g.genus.as_str())
    }

    /// English flavor texts with line breaks flattened, paired with the game
    /// they come from. Empty entries are skipped.
    pub fn flavor_texts(&self) -> Vec<(String, Option<&str>)> {
        self.flavor_text_entries
            .iter()
            .filter(|entry| entry.language.name == LANGUAGE)
            .map(|entry| {
                (
                    collapse_whitespace(&entry.flavor_text),
                    entry.version.as_ref().map(|v| v.name.as_str()),
                )
            })
            .filter(|(text, _)| !text.is_empty())
            .collect()
    }
}
