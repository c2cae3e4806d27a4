use serde::{Deserialize, Serialize};

/// A reference to another catalog resource by name and URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedApiResource {
    pub name: String,
    pub url: String,
}

/// A reference to an unnamed resource, such as an evolution chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResource {
    pub url: String,
}

/// One page of a list endpoint such as `/location-area`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaginatedResponse {
    #[serde(default)]
    pub count: u32,
    pub next: Option<String>,
    pub previous: Option<String>,
    #[serde(default)]
    pub results: Vec<NamedApiResource>,
}
