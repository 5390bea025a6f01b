use crate::client::Paper;
use crate::error::Error;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Default cap on papers fetched per source
pub const DEFAULT_MAX_RESULTS: u32 = 20;

/// Year restriction applied to every source
///
/// A range always carries both bounds. Interactive front-ends that only
/// collected one side must decide the other bound themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearFilter {
    Single(i32),
    Range { start: i32, end: i32 },
}

impl YearFilter {
    /// Build an inclusive range, ordering the bounds
    #[must_use]
    pub fn range(a: i32, b: i32) -> Self {
        Self::Range {
            start: a.min(b),
            end: a.max(b),
        }
    }

    /// Inclusive `(low, high)` bounds
    #[must_use]
    pub const fn bounds(&self) -> (i32, i32) {
        match *self {
            Self::Single(year) => (year, year),
            Self::Range { start, end } => (start, end),
        }
    }

    #[must_use]
    pub const fn contains(&self, year: i32) -> bool {
        let (low, high) = self.bounds();
        low <= year && year <= high
    }
}

/// Unified search criteria shared by every source
///
/// Keyword groups are AND-sets of terms; the groups themselves are OR'd.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub keyword_groups: Vec<Vec<String>>,
    #[serde(default)]
    pub exclusion_keywords: Vec<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub venues: Vec<String>,
    #[serde(default)]
    pub macro_areas: Vec<String>,
    #[serde(default)]
    pub years: Option<YearFilter>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Restrict the search to these source names; empty means all
    #[serde(default)]
    pub sources: Vec<String>,
}

const fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            keyword_groups: Vec::new(),
            exclusion_keywords: Vec::new(),
            authors: Vec::new(),
            venues: Vec::new(),
            macro_areas: Vec::new(),
            years: None,
            max_results: DEFAULT_MAX_RESULTS,
            sources: Vec::new(),
        }
    }
}

impl SearchQuery {
    /// Trim every term and drop empty terms and empty groups
    #[must_use]
    pub fn normalized(self) -> Self {
        fn clean(terms: Vec<String>) -> Vec<String> {
            terms
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        }

        Self {
            keyword_groups: self
                .keyword_groups
                .into_iter()
                .map(clean)
                .filter(|g| !g.is_empty())
                .collect(),
            exclusion_keywords: clean(self.exclusion_keywords),
            authors: clean(self.authors),
            venues: clean(self.venues),
            macro_areas: clean(self.macro_areas),
            sources: clean(self.sources),
            ..self
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.max_results == 0 {
            return Err(Error::invalid_input(
                "max_results",
                "must be greater than zero",
            ));
        }
        if let Some(YearFilter::Range { start, end }) = self.years {
            if start > end {
                return Err(Error::invalid_input(
                    "years",
                    format!("range start {start} is after end {end}"),
                ));
            }
        }
        Ok(())
    }

    /// Whether any inclusion criterion is present
    #[must_use]
    pub fn has_criteria(&self) -> bool {
        !(self.keyword_groups.is_empty()
            && self.authors.is_empty()
            && self.venues.is_empty()
            && self.macro_areas.is_empty())
    }

    /// Whether the query selects the named source
    #[must_use]
    pub fn selects(&self, source: &str) -> bool {
        self.sources.is_empty() || self.sources.iter().any(|s| s.eq_ignore_ascii_case(source))
    }

    /// All inclusion terms across every group, in order
    pub fn keyword_terms(&self) -> impl Iterator<Item = &str> {
        self.keyword_groups.iter().flatten().map(String::as_str)
    }
}

/// Per-source record of the final query each provider issued
///
/// Cloning shares the underlying map so a provider can record its query
/// even when the fetch later fails.
#[derive(Debug, Clone, Default)]
pub struct QueryLog {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl QueryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, source: &str, query: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source.to_string(), query.into());
    }

    #[must_use]
    pub fn get(&self, source: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .cloned()
    }

    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Errors that can occur during provider operations
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("{0} is not configured")]
    Configuration(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Configuration, credential and query errors are never retried
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Configuration(_) | Self::Auth(_) | Self::InvalidQuery(_)
        )
    }

    /// Map a transport failure from reqwest
    #[must_use]
    pub fn from_reqwest(source: &str, e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Network(format!("{source}: connection failed: {e}"))
        } else if e.is_decode() {
            Self::Parse(format!("{source}: {e}"))
        } else {
            Self::Network(format!("{source}: request failed: {e}"))
        }
    }

    /// Map a non-success HTTP status
    #[must_use]
    pub fn from_status(source: &str, status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 | 403 => Self::Auth(format!("{source} rejected the credentials (HTTP {status})")),
            429 => Self::RateLimit,
            502..=504 => Self::ServiceUnavailable(format!("{source} returned HTTP {status}")),
            _ => Self::Network(format!("{source} returned HTTP {status}: {body}")),
        }
    }
}

/// Trait for academic source adapters
///
/// An adapter translates a [`SearchQuery`] into its source's native syntax,
/// records the resolved query in the [`QueryLog`], executes it and parses
/// the response into [`Paper`] records. Failures are returned whole, never as
/// partial result sets.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Unique name of this source, also used as the paper source tag
    fn name(&self) -> &str;

    /// Human-readable description of the source
    fn description(&self) -> &str;

    /// Hard per-request ceiling imposed by the source, if any
    fn max_per_request(&self) -> Option<u32> {
        None
    }

    async fn fetch(
        &self,
        query: &SearchQuery,
        query_log: &QueryLog,
    ) -> Result<Vec<Paper>, ProviderError>;
}

impl fmt::Debug for dyn SourceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceProvider")
            .field("name", &self.name())
            .finish()
    }
}
