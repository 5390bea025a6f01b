pub mod meta_search;
pub mod providers;
pub mod translation;

pub use meta_search::{MetaSearchClient, MetaSearchConfig, MetaSearchResult, SourceFailure};
pub use translation::{Creator, Tag, TranslatedItem, TranslationClient};

use providers::ProviderError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP client configuration shared by every source adapter
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout duration
    pub timeout: Duration,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!(
                "litrev/{} (Academic Literature Search)",
                env!("CARGO_PKG_VERSION")
            ),
        }
    }
}

impl HttpClientConfig {
    pub fn build_client(&self) -> Result<reqwest::Client, ProviderError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| ProviderError::Other(format!("Failed to create HTTP client: {e}")))
    }
}

/// Canonical paper record produced by a source adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    pub title: String,
    /// Author names in source order
    #[serde(default)]
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub url: Option<String>,
    /// Abstract or snippet text
    pub summary: Option<String>,
    /// Name of the source that produced this record
    pub source: String,
}

impl Paper {
    /// Minimal record with only a title and a source tag
    #[must_use]
    pub fn new(title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            authors: Vec::new(),
            year: None,
            venue: None,
            url: None,
            summary: None,
            source: source.into(),
        }
    }
}

/// Collapse internal whitespace runs, as found in XML text nodes
pub(crate) fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Convert an empty string into `None`
pub(crate) fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}
