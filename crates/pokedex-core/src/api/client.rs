//! API client for PokeAPI.
//!
//! This module provides the `ApiClient` struct, the only code that talks to
//! the network. It knows nothing about the Pokédex; it turns names into URLs
//! and URLs into cached bytes.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::cache::ResponseCache;
use crate::models::{EvolutionChain, LocationArea, PaginatedResponse, Pokemon, PokemonSpecies};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Root of the PokeAPI v2 service.
pub const DEFAULT_BASE_URL: &str = "https://pokeapi.co/api/v2";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Location areas per page of `map`.
const LOCATION_PAGE_SIZE: u32 = 20;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// PokeAPI client.
/// Clone is cheap - reqwest::Client and ResponseCache are both shared handles.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    cache: ResponseCache,
    base_url: String,
}

impl ApiClient {
    pub fn new(cache: ResponseCache) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            cache,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn pokemon_url(&self, name: &str) -> String {
        format!("{}/pokemon/{}", self.base_url, name)
    }

    pub fn location_areas_url(&self) -> String {
        format!(
            "{}/location-area?offset=0&limit={}",
            self.base_url, LOCATION_PAGE_SIZE
        )
    }

    pub fn location_area_url(&self, area: &str) -> String {
        format!("{}/location-area/{}", self.base_url, area)
    }

    /// Return the body at `url`, from the cache if present.
    ///
    /// Only successful responses are cached.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        if let Some(body) = self.cache.get(url) {
            debug!(url = url, "Cache hit");
            return Ok(body);
        }
        debug!(url = url, "Cache miss, fetching");

        let body = self.fetch_with_retry(url).await?;
        self.cache.add(url, body.clone());
        Ok(body)
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self.client.get(url).send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response.bytes().await?.to_vec());
            }

            if status.as_u16() == 429 {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2; // Exponential backoff
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, url, &body));
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let body = self.fetch_bytes(url).await?;
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))
    }

    // ===== Data Fetching Methods =====

    /// Fetch the full `/pokemon/{name}` record, unparsed, for storing in the Pokédex.
    pub async fn fetch_pokemon_record(&self, name: &str) -> Result<serde_json::Value, ApiError> {
        self.get(&self.pokemon_url(name)).await
    }

    pub async fn fetch_pokemon(&self, name: &str) -> Result<Pokemon, ApiError> {
        self.get(&self.pokemon_url(name)).await
    }

    /// Fetch the species record linked from the Pokémon record.
    ///
    /// Forms like `giratina-altered` have a species named differently from the
    /// Pokémon, so the link is followed instead of guessing the URL.
    pub async fn fetch_species(&self, name: &str) -> Result<PokemonSpecies, ApiError> {
        let pokemon = self.fetch_pokemon(name).await?;
        if pokemon.species.url.is_empty() {
            return Err(ApiError::InvalidResponse(format!(
                "{} has no species link",
                name
            )));
        }
        self.get(&pokemon.species.url).await
    }

    /// Fetch the evolution chain linked from a species record.
    pub async fn fetch_evolution_chain(
        &self,
        species: &PokemonSpecies,
    ) -> Result<EvolutionChain, ApiError> {
        match species.evolution_chain.as_ref().filter(|link| !link.url.is_empty()) {
            Some(link) => self.get(&link.url).await,
            None => Err(ApiError::InvalidResponse(format!(
                "{} has no evolution chain link",
                species.name
            ))),
        }
    }

    /// Fetch one page of location areas; `None` means the first page.
    pub async fn fetch_location_areas(
        &self,
        page_url: Option<&str>,
    ) -> Result<PaginatedResponse, ApiError> {
        match page_url {
            Some(url) => self.get(url).await,
            None => self.get(&self.location_areas_url()).await,
        }
    }

    pub async fn fetch_location_area(&self, area: &str) -> Result<LocationArea, ApiError> {
        self.get(&self.location_area_url(area)).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Nothing listens here, so any request that reaches the network fails fast.
    const UNREACHABLE: &str = "http://127.0.0.1:1/api/v2";

    fn offline_client() -> ApiClient {
        ApiClient::new(ResponseCache::new(Duration::from_secs(60)))
            .unwrap()
            .with_base_url(UNREACHABLE)
    }

    #[tokio::test]
    async fn test_cached_pokemon_served_without_network() {
        let client = offline_client();
        let record = json!({"name": "pikachu", "height": 4, "weight": 60});
        client
            .cache()
            .add(client.pokemon_url("pikachu"), record.to_string().into_bytes());

        let pokemon = client.fetch_pokemon("pikachu").await.unwrap();
        assert_eq!(pokemon.name, "pikachu");
        assert_eq!(pokemon.weight, 60);

        let raw = client.fetch_pokemon_record("pikachu").await.unwrap();
        assert_eq!(raw, record);
    }

    #[tokio::test]
    async fn test_species_follows_link_from_pokemon() {
        let client = offline_client();
        let species_url = format!("{}/pokemon-species/487/", UNREACHABLE);
        client.cache().add(
            client.pokemon_url("giratina-altered"),
            json!({"name": "giratina-altered", "species": {"name": "giratina", "url": species_url}})
                .to_string()
                .into_bytes(),
        );
        client.cache().add(
            species_url.as_str(),
            json!({"id": 487, "name": "giratina", "capture_rate": 3})
                .to_string()
                .into_bytes(),
        );

        let species = client.fetch_species("giratina-altered").await.unwrap();
        assert_eq!(species.capture_rate, 3);
    }

    #[tokio::test]
    async fn test_evolution_chain_follows_link_from_species() {
        let client = offline_client();
        let chain_url = format!("{}/evolution-chain/10/", UNREACHABLE);
        client.cache().add(
            chain_url.as_str(),
            json!({
                "id": 10,
                "chain": {
                    "species": {"name": "pichu", "url": "u"},
                    "evolves_to": [{"species": {"name": "pikachu", "url": "u"}, "evolves_to": []}]
                }
            })
            .to_string()
            .into_bytes(),
        );
        let species: PokemonSpecies = serde_json::from_value(json!({
            "name": "pichu",
            "capture_rate": 190,
            "evolution_chain": {"url": chain_url}
        }))
        .unwrap();

        let chain = client.fetch_evolution_chain(&species).await.unwrap();
        assert_eq!(chain.next_stages("pichu"), Some(vec!["pikachu"]));

        let orphan = PokemonSpecies {
            name: "mew".to_string(),
            ..PokemonSpecies::default()
        };
        let err = client.fetch_evolution_chain(&orphan).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_first_location_page_uses_default_url() {
        let client = offline_client();
        client.cache().add(
            client.location_areas_url(),
            json!({
                "count": 2,
                "next": format!("{}/location-area?offset=20&limit=20", UNREACHABLE),
                "previous": null,
                "results": [{"name": "canalave-city-area", "url": "u"}]
            })
            .to_string()
            .into_bytes(),
        );

        let page = client.fetch_location_areas(None).await.unwrap();
        assert_eq!(page.results[0].name, "canalave-city-area");
        assert!(page.next.is_some());
        assert!(page.previous.is_none());
    }

    #[tokio::test]
    async fn test_cached_garbage_is_invalid_response() {
        let client = offline_client();
        client
            .cache()
            .add(client.location_area_url("nowhere"), b"<html>".to_vec());

        let err = client.fetch_location_area("nowhere").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_miss_goes_to_network_and_is_not_cached_on_failure() {
        let client = offline_client();

        let err = client.fetch_pokemon("mew").await.unwrap_err();

        assert!(matches!(err, ApiError::NetworkError(_)), "got {err:?}");
        assert!(client.cache().is_empty());
    }

    #[tokio::test]
    async fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new(ResponseCache::new(Duration::from_secs(60)))
            .unwrap()
            .with_base_url("https://example.test/api/v2/");
        assert_eq!(
            client.pokemon_url("eevee"),
            "https://example.test/api/v2/pokemon/eevee"
        );
    }
}
