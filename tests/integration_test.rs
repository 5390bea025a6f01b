use litrev::client::providers::{ProviderError, QueryLog, SourceProvider};
use litrev::client::MetaSearchConfig;
use litrev::{Config, Credentials, Error, MetaSearchClient, NoProgress, RetryConfig, SearchQuery};
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.http.timeout_secs, 30);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.delay_secs, 3);
    assert_eq!(config.enrichment.endpoint, "http://localhost:1969/web");
    assert_eq!(config.enrichment.timeout_secs, 60);
    assert_eq!(config.sources.arxiv_url, "http://export.arxiv.org/api/query");
    assert!(config.sources.acl_corpus_dir.is_none());
}

#[test]
fn test_config_validation() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    config.retry.max_attempts = 0;
    assert!(matches!(config.validate(), Err(Error::InvalidInput { .. })));
    config.retry.max_attempts = 1;

    config.http.timeout_secs = 0;
    assert!(matches!(config.validate(), Err(Error::InvalidInput { .. })));
    config.http.timeout_secs = 30;

    config.enrichment.endpoint = "localhost without scheme".to_string();
    assert!(matches!(config.validate(), Err(Error::InvalidInput { .. })));
}

#[test]
fn test_config_file_overrides_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        r#"
[http]
timeout_secs = 45
user_agent = "review-bot/1.0"

[enrichment]
endpoint = "http://translator.internal:1969/web"
max_concurrent = 2

[sources]
acl_corpus_dir = "/srv/acl-anthology/data/xml"
"#
    )
    .unwrap();

    let config = Config::load(Some(path.as_path())).unwrap();
    assert_eq!(config.http.timeout_secs, 45);
    assert_eq!(config.http.client_config().user_agent, "review-bot/1.0");
    assert_eq!(config.http.connect_timeout_secs, 10);
    assert_eq!(config.enrichment.to_enrichment_config().max_concurrent, 2);
    assert_eq!(config.enrichment.timeout_secs, 60);
    assert_eq!(
        config.sources.acl_corpus_dir.as_deref(),
        Some(std::path::Path::new("/srv/acl-anthology/data/xml"))
    );
    assert_eq!(config.sources.dblp_url, "https://dblp.org");
}

#[test]
fn test_explicit_missing_config_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");
    assert!(matches!(Config::load(Some(missing.as_path())), Err(Error::Config(_))));
}

#[test]
fn test_invalid_file_values_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "[enrichment]\nmax_concurrent = 0\n").unwrap();
    assert!(matches!(Config::load(Some(path.as_path())), Err(Error::InvalidInput { .. })));
}

// The only test in this binary that touches LITREV__ variables
#[test]
fn test_environment_overrides_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "[search]\nmax_results = 10\n").unwrap();

    std::env::set_var("LITREV__SEARCH__MAX_RESULTS", "50");
    std::env::set_var("LITREV__SEARCH__PREFERRED_SOURCES", "DBLP,arXiv");
    let config = Config::load(Some(path.as_path()));
    std::env::remove_var("LITREV__SEARCH__MAX_RESULTS");
    std::env::remove_var("LITREV__SEARCH__PREFERRED_SOURCES");

    let config = config.unwrap();
    assert_eq!(config.search.max_results, 50);
    assert_eq!(config.search.preferred_sources, vec!["DBLP", "arXiv"]);
}

#[test]
fn test_credentials_from_vars() {
    let credentials = Credentials::from_vars(vec![
        ("SCOPUS_API_KEY".to_string(), "scopus-key".to_string()),
        ("PATH".to_string(), "/usr/bin".to_string()),
    ])
    .unwrap();
    assert_eq!(credentials.scopus_api_key.as_deref(), Some("scopus-key"));
    assert!(credentials.serpapi_api_key.is_none());
}

#[test]
fn test_standard_sources_and_ceilings() {
    let client = MetaSearchClient::from_config(&Config::default(), &Credentials::default()).unwrap();
    let sources: Vec<(String, Option<u32>)> = client
        .describe_providers()
        .into_iter()
        .map(|(name, _, ceiling)| (name, ceiling))
        .collect();
    assert_eq!(
        sources,
        vec![
            ("ACL Anthology".to_string(), None),
            ("arXiv".to_string(), Some(2000)),
            ("DBLP".to_string(), Some(1000)),
            ("Scopus".to_string(), Some(25)),
            ("Google Scholar".to_string(), Some(20)),
        ]
    );
}

#[test]
fn test_error_display() {
    let err = Error::InvalidInput {
        field: "years".to_string(),
        reason: "range start 2022 is after end 2020".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Invalid input: years - range start 2022 is after end 2020"
    );

    let err: Error = ProviderError::Configuration("SCOPUS_API_KEY".to_string()).into();
    assert!(matches!(err, Error::MissingCredential { ref variable } if variable == "SCOPUS_API_KEY"));
    assert!(!err.is_retryable());
}

struct Flaky {
    failures_left: std::sync::atomic::AtomicU32,
}

#[async_trait::async_trait]
impl SourceProvider for Flaky {
    fn name(&self) -> &str {
        "Flaky"
    }

    fn description(&self) -> &str {
        "fails a fixed number of times"
    }

    async fn fetch(
        &self,
        _query: &SearchQuery,
        query_log: &QueryLog,
    ) -> Result<Vec<litrev::Paper>, ProviderError> {
        query_log.record("Flaky", "flaky query");
        let remaining = self.failures_left.load(std::sync::atomic::Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left
                .store(remaining - 1, std::sync::atomic::Ordering::SeqCst);
            return Err(ProviderError::ServiceUnavailable("try later".to_string()));
        }
        Ok(vec![litrev::Paper::new("Recovered", "Flaky")])
    }
}

#[tokio::test(start_paused = true)]
async fn test_orchestrator_retries_transient_failures() {
    let provider: Arc<dyn SourceProvider> = Arc::new(Flaky {
        failures_left: std::sync::atomic::AtomicU32::new(2),
    });
    let client = MetaSearchClient::new(
        vec![provider],
        MetaSearchConfig {
            retry: RetryConfig::default(),
        },
    );

    let started = tokio::time::Instant::now();
    let result = client.search(&SearchQuery::default(), &NoProgress).await;

    assert!(result.errors.is_empty());
    assert_eq!(result.papers.len(), 1);
    assert_eq!(result.successful_providers, 1);
    assert!(started.elapsed() >= std::time::Duration::from_secs(6));
}
