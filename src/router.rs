//! Deterministic keyword routing of free-text queries.
//!
//! The query is lower-cased and checked for substring hits against each intent's
//! trigger phrases in [`ROUTE_TABLE`]. One matching intent routes there, several
//! route to [`Route::Hybrid`], none falls back to [`Route::Text`]. Nothing is
//! learned, so every decision can be explained by the phrases that fired.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Retrieval pipeline a query is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Text,
    Face,
    Ocr,
    Hybrid,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Face => "face",
            Self::Ocr => "ocr",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intent → trigger phrases. Phrases are lower-case and matched as substrings.
pub const ROUTE_TABLE: &[(Route, &[&str])] = &[
    (
        Route::Text,
        &["notes", "explain", "what is", "define", "cnn", "dbms", "os", "theory"],
    ),
    (
        Route::Face,
        &["photo", "photos", "picture", "pictures", "image of", "person", "who is"],
    ),
    (
        Route::Ocr,
        &["from image", "from pdf", "from document", "scanned", "ocr"],
    ),
];

/// A routing decision together with the evidence behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDecision {
    pub route: Route,
    /// Intents with at least one hit, in table order.
    pub matched: Vec<Route>,
    /// Every trigger phrase that hit.
    pub keywords: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryRouter {
    table: &'static [(Route, &'static [&'static str])],
}

impl Default for QueryRouter {
    fn default() -> Self {
        Self { table: ROUTE_TABLE }
    }
}

impl QueryRouter {
    /// Route using a different intent table.
    pub fn with_table(table: &'static [(Route, &'static [&'static str])]) -> Self {
        Self { table }
    }

    pub fn route(&self, query: &str) -> Route {
        self.classify(query).route
    }

    pub fn classify(&self, query: &str) -> RouteDecision {
        let q = query.to_lowercase();
        let mut matched = Vec::new();
        let mut keywords = Vec::new();

        for (route, phrases) in self.table {
            let hits: Vec<&'static str> = phrases.iter().copied().filter(|p| q.contains(p)).collect();
            if !hits.is_empty() {
                matched.push(*route);
                keywords.extend(hits);
            }
        }

        let route = match matched.as_slice() {
            [] => Route::Text,
            [only] => *only,
            _ => Route::Hybrid,
        };

        debug!(route = %route, ?keywords, "query routed");
        RouteDecision {
            route,
            matched,
            keywords,
        }
    }
}
