use crate::client::providers::{
    AclAnthologyProvider, ArxivProvider, DblpProvider, ProviderError, QueryLog, ScholarProvider,
    ScopusProvider, SearchQuery, SourceProvider,
};
use crate::client::Paper;
use crate::config::{Config, Credentials};
use crate::progress::{self, ProgressSink};
use crate::resilience::{retry_with_config, RetryConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Configuration for meta-search behavior
#[derive(Debug, Clone, Default)]
pub struct MetaSearchConfig {
    /// Retry policy applied to every provider call
    pub retry: RetryConfig,
}

/// A source that produced no results because its fetch failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub message: String,
}

/// Result from meta-search across multiple providers
#[derive(Debug, Clone, Default)]
pub struct MetaSearchResult {
    /// Every paper returned, in source order; cross-source duplicates are kept
    pub papers: Vec<Paper>,
    /// Errors from failed providers, reported alongside the papers
    pub errors: Vec<SourceFailure>,
    /// Final query string each provider issued
    pub query_log: BTreeMap<String, String>,
    /// Total search time
    pub total_search_time: Duration,
    /// Number of providers that succeeded
    pub successful_providers: usize,
}

/// Client that federates a search across academic sources, one at a time
pub struct MetaSearchClient {
    providers: Vec<Arc<dyn SourceProvider>>,
    config: MetaSearchConfig,
}

impl MetaSearchClient {
    /// Create a meta-search client over an explicit provider list
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn SourceProvider>>, config: MetaSearchConfig) -> Self {
        Self { providers, config }
    }

    /// Build the standard source set from application configuration
    ///
    /// Gated sources are always registered; a missing credential surfaces as
    /// a per-source error when that source is searched.
    pub fn from_config(config: &Config, credentials: &Credentials) -> Result<Self, ProviderError> {
        let http = config.http.client_config();
        let sources = &config.sources;

        let providers: Vec<Arc<dyn SourceProvider>> = vec![
            Arc::new(AclAnthologyProvider::new(sources.acl_corpus_dir.clone())),
            Arc::new(ArxivProvider::with_base_url(&http, &sources.arxiv_url)?),
            Arc::new(DblpProvider::with_base_url(&http, &sources.dblp_url)?),
            Arc::new(ScopusProvider::with_base_url(
                &http,
                &sources.scopus_url,
                credentials.scopus_api_key.clone(),
            )?),
            Arc::new(ScholarProvider::with_base_url(
                &http,
                &sources.serpapi_url,
                credentials.serpapi_api_key.clone(),
            )?),
        ];

        info!(
            "Initialized meta-search client with {} providers",
            providers.len()
        );

        Ok(Self::new(
            providers,
            MetaSearchConfig {
                retry: config.retry.to_retry_config(),
            },
        ))
    }

    /// Get list of available providers
    #[must_use]
    pub fn providers(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Name, description and per-request ceiling of every provider
    #[must_use]
    pub fn describe_providers(&self) -> Vec<(String, String, Option<u32>)> {
        self.providers
            .iter()
            .map(|p| (p.name().to_string(), p.description().to_string(), p.max_per_request()))
            .collect()
    }

    /// Providers selected by the query, plus failures for names nobody answers to
    fn select_providers(
        &self,
        query: &SearchQuery,
    ) -> (Vec<Arc<dyn SourceProvider>>, Vec<SourceFailure>) {
        let selected = self
            .providers
            .iter()
            .filter(|p| query.selects(p.name()))
            .cloned()
            .collect();

        let unknown = query
            .sources
            .iter()
            .filter(|name| {
                !self
                    .providers
                    .iter()
                    .any(|p| p.name().eq_ignore_ascii_case(name))
            })
            .map(|name| {
                warn!("Unknown source requested: {}", name);
                SourceFailure {
                    source: name.clone(),
                    message: format!(
                        "Unknown source; available sources are {}",
                        self.providers().join(", ")
                    ),
                }
            })
            .collect();

        (selected, unknown)
    }

    /// Search the selected providers sequentially
    ///
    /// Progress is reported as `index / total` before each source and as `1.0`
    /// once the loop finishes. A failing source never aborts the others.
    pub async fn search(&self, query: &SearchQuery, progress: &dyn ProgressSink) -> MetaSearchResult {
        let start_time = Instant::now();
        match serde_json::to_string(query) {
            Ok(json) => info!("Starting meta-search: {}", json),
            Err(e) => debug!("Could not serialize query for logging: {}", e),
        }

        let (providers, mut errors) = self.select_providers(query);
        info!(
            "Using {} providers for search: {:?}",
            providers.len(),
            providers.iter().map(|p| p.name()).collect::<Vec<_>>()
        );

        let query_log = QueryLog::new();
        let mut papers = Vec::new();
        let mut successful_providers = 0;
        let total = providers.len();

        for (index, provider) in providers.iter().enumerate() {
            let name = provider.name();
            progress.report(progress::fraction(index, total), &format!("Searching {name}..."));

            let result = retry_with_config(
                || provider.fetch(query, &query_log),
                &self.config.retry,
                name,
            )
            .await;

            match result {
                Ok(found) => {
                    info!("Provider {} returned {} results", name, found.len());
                    successful_providers += 1;
                    papers.extend(found);
                }
                Err(ProviderError::Configuration(what)) => {
                    error!("{} is not configured. Skipping {} search.", what, name);
                    errors.push(SourceFailure {
                        source: name.to_string(),
                        message: format!("{what} is not configured"),
                    });
                }
                Err(e) => {
                    error!("Provider {} failed: {}", name, e);
                    errors.push(SourceFailure {
                        source: name.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        progress.report(1.0, "Processing final results...");

        let total_search_time = start_time.elapsed();
        info!(
            "Meta-search completed: {} papers from {} of {} providers in {:?}",
            papers.len(),
            successful_providers,
            total,
            total_search_time
        );

        MetaSearchResult {
            papers,
            errors,
            query_log: query_log.snapshot(),
            total_search_time,
            successful_providers,
        }
    }
}
