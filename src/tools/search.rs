use crate::client::providers::SearchQuery;
use crate::client::{MetaSearchClient, SourceFailure};
use crate::progress::ProgressSink;
use crate::tools::dedup::group_by_title;
use crate::tools::resolve::{ConflictResolver, Resolution};
use crate::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Everything one search run produced, before manual conflict choices
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchOutcome {
    pub resolution: Resolution,
    pub errors: Vec<SourceFailure>,
    /// Final query string per source
    pub query_log: BTreeMap<String, String>,
    /// Papers fetched across all sources, duplicates included
    pub total_found: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Federated search followed by title deduplication and automatic conflict resolution
#[derive(Clone)]
pub struct SearchTool {
    client: Arc<MetaSearchClient>,
    resolver: ConflictResolver,
}

impl std::fmt::Debug for SearchTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchTool")
            .field("providers", &self.client.providers())
            .field("preferences", &self.resolver.preferences())
            .finish()
    }
}

impl SearchTool {
    #[must_use]
    pub fn new(client: Arc<MetaSearchClient>, preferences: Vec<String>) -> Self {
        info!("Initializing search tool with preference order {:?}", preferences);
        Self {
            client,
            resolver: ConflictResolver::new(preferences),
        }
    }

    /// Run the pipeline up to, but not including, manual conflict selection
    #[instrument(skip(self, query, progress), fields(groups = query.keyword_groups.len()))]
    pub async fn search(&self, query: SearchQuery, progress: &dyn ProgressSink) -> Result<SearchOutcome> {
        let query = query.normalized();
        query.validate()?;

        let result = self.client.search(&query, progress).await;
        let total_found = result.papers.len();

        let groups = group_by_title(result.papers);
        info!(
            "{} papers fetched, {} distinct titles",
            total_found,
            groups.len()
        );
        let resolution = self.resolver.resolve(groups);

        Ok(SearchOutcome {
            resolution,
            errors: result.errors,
            query_log: result.query_log,
            total_found,
            elapsed: result.total_search_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::providers::{ProviderError, QueryLog, SourceProvider};
    use crate::client::{MetaSearchConfig, Paper};
    use crate::progress::NoProgress;
    use crate::resilience::RetryConfig;
    use async_trait::async_trait;

    struct Fixed {
        name: &'static str,
        titles: Vec<&'static str>,
    }

    #[async_trait]
    impl SourceProvider for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "fixed results"
        }

        async fn fetch(
            &self,
            _query: &SearchQuery,
            log: &QueryLog,
        ) -> std::result::Result<Vec<Paper>, ProviderError> {
            log.record(self.name, "fixed");
            Ok(self
                .titles
                .iter()
                .map(|t| Paper::new(*t, self.name))
                .collect())
        }
    }

    fn tool(preferences: &[&str]) -> SearchTool {
        let providers: Vec<Arc<dyn SourceProvider>> = vec![
            Arc::new(Fixed {
                name: "A",
                titles: vec!["Shared Work", "Only In A", "Preferred Work"],
            }),
            Arc::new(Fixed {
                name: "B",
                titles: vec!["shared work.", "Preferred work"],
            }),
        ];
        let client = MetaSearchClient::new(
            providers,
            MetaSearchConfig {
                retry: RetryConfig::immediate(1),
            },
        );
        SearchTool::new(
            Arc::new(client),
            preferences.iter().map(|s| (*s).to_string()).collect(),
        )
    }

    fn query() -> SearchQuery {
        SearchQuery {
            keyword_groups: vec![vec!["work".to_string()]],
            ..SearchQuery::default()
        }
    }

    #[tokio::test]
    async fn test_pipeline_groups_and_resolves() {
        let outcome = tool(&["b"]).search(query(), &NoProgress).await.unwrap();

        assert_eq!(outcome.total_found, 5);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.query_log.len(), 2);
        assert!(outcome.resolution.conflicts().is_empty());
        assert_eq!(outcome.resolution.resolved.len(), 3);
        assert!(outcome
            .resolution
            .resolved
            .iter()
            .filter(|p| p.title.to_lowercase().starts_with("shared") || p.title.starts_with("Preferred"))
            .all(|p| p.source == "B"));
    }

    #[tokio::test]
    async fn test_pipeline_leaves_conflicts_without_preferences() {
        let outcome = tool(&[]).search(query(), &NoProgress).await.unwrap();
        assert_eq!(outcome.resolution.conflicts().len(), 2);

        let papers = outcome
            .resolution
            .clone()
            .finalize(&outcome.resolution.first_choices())
            .unwrap();
        assert_eq!(papers.len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_query_is_rejected() {
        let query = SearchQuery {
            max_results: 0,
            ..query()
        };
        let err = tool(&[]).search(query, &NoProgress).await.unwrap_err();
        assert!(matches!(err, crate::Error::InvalidInput { .. }));
    }
}
