use serde::{Deserialize, Serialize};

use super::NamedApiResource;

/// An `/evolution-chain/{id}` record: a tree of species rooted at the base form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionChain {
    #[serde(default)]
    pub id: u32,
    pub chain: ChainLink,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainLink {
    pub species: NamedApiResource,
    #[serde(default)]
    pub evolves_to: Vec<ChainLink>,
}

impl EvolutionChain {
    /// Species names `species` can evolve into directly, or `None` if the
    /// species is not part of this chain.
    pub fn next_stages(&self, species: &str) -> Option<Vec<&str>> {
        self.chain.find(species).map(|link| {
            link.evolves_to
                .iter()
                .map(|next| next.species.name.as_str())
                .collect()
        })
    }
}

impl ChainLink {
    fn find(&self, species: &str) -> Option<&ChainLink> {
        if self.species.name.eq_ignore_ascii_case(species) {
            return Some(self);
        }
        self.evolves_to.iter().find_map(|next| next.find(species))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn link(name: &str, evolves_to: serde_json::Value) -> serde_json::Value {
        json!({"species": {"name": name, "url": "u"}, "evolves_to": evolves_to, "is_baby": false})
    }

    #[test]
    fn test_next_stages_walks_the_tree() {
        let chain: EvolutionChain = serde_json::from_value(json!({
            "id": 67,
            "chain": link("eevee", json!([
                link("vaporeon", json!([])),
                link("jolteon", json!([])),
                link("flareon", json!([]))
            ]))
        }))
        .unwrap();

        assert_eq!(
            chain.next_stages("eevee"),
            Some(vec!["vaporeon", "jolteon", "flareon"])
        );
        assert_eq!(chain.next_stages("Jolteon"), Some(vec![]));
        assert_eq!(chain.next_stages("pikachu"), None);
    }

    #[test]
    fn test_middle_of_a_linear_chain() {
        let chain: EvolutionChain = serde_json::from_value(json!({
            "chain": link("bulbasaur", json!([link("ivysaur", json!([link("venusaur", json!([]))]))]))
        }))
        .unwrap();

        assert_eq!(chain.next_stages("ivysaur"), Some(vec!["venusaur"]));
    }
}
