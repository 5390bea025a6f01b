//! Application configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `LITREV__SECTION__KEY` environment variables. API keys are not part of
//! the file; they come from [`Credentials`].

use crate::client::providers::{arxiv, dblp, scholar, scopus, DEFAULT_MAX_RESULTS};
use crate::client::HttpClientConfig;
use crate::resilience::RetryConfig;
use crate::tools::enrich::{EnrichmentConfig, DEFAULT_ENDPOINT};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const ENV_PREFIX: &str = "LITREV";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub http: HttpSettings,
    pub retry: RetrySettings,
    pub sources: SourcesConfig,
    pub enrichment: EnrichmentSettings,
    pub search: SearchSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: None,
        }
    }
}

impl HttpSettings {
    #[must_use]
    pub fn client_config(&self) -> HttpClientConfig {
        let defaults = HttpClientConfig::default();
        HttpClientConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            delay_secs: defaults.delay.as_secs(),
        }
    }
}

impl RetrySettings {
    #[must_use]
    pub const fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            delay: Duration::from_secs(self.delay_secs),
        }
    }
}

/// Endpoints for each academic source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub arxiv_url: String,
    pub dblp_url: String,
    pub scopus_url: String,
    pub serpapi_url: String,
    /// Checkout of the ACL Anthology `data/xml` directory
    pub acl_corpus_dir: Option<PathBuf>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            arxiv_url: arxiv::DEFAULT_BASE_URL.to_string(),
            dblp_url: dblp::DEFAULT_BASE_URL.to_string(),
            scopus_url: scopus::DEFAULT_BASE_URL.to_string(),
            serpapi_url: scholar::DEFAULT_BASE_URL.to_string(),
            acl_corpus_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentSettings {
    /// Translation server `/web` endpoint
    pub endpoint: String,
    pub timeout_secs: u64,
    pub max_concurrent: usize,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 60,
            max_concurrent: 8,
        }
    }
}

impl EnrichmentSettings {
    #[must_use]
    pub fn to_enrichment_config(&self) -> EnrichmentConfig {
        EnrichmentConfig {
            endpoint: self.endpoint.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            max_concurrent: self.max_concurrent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub max_results: u32,
    /// Source preference order for automatic duplicate resolution
    pub preferred_sources: Vec<String>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            preferred_sources: Vec::new(),
        }
    }
}

impl Config {
    /// `<config dir>/litrev/config.toml`
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("litrev").join("config.toml"))
    }

    /// Load configuration; an explicit path must exist, the default path may not
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (file, required) = match path {
            Some(path) => (Some(path.to_path_buf()), true),
            None => (Self::default_path(), false),
        };

        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);
        if let Some(file) = &file {
            debug!("Reading configuration file {}", file.display());
            builder = builder.add_source(config::File::from(file.as_path()).required(required));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("search.preferred_sources"),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        info!("Configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.http.timeout_secs == 0 {
            return Err(Error::invalid_input("http.timeout_secs", "must be greater than zero"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::invalid_input("retry.max_attempts", "must be at least 1"));
        }
        if self.enrichment.max_concurrent == 0 {
            return Err(Error::invalid_input(
                "enrichment.max_concurrent",
                "must be at least 1",
            ));
        }
        if self.enrichment.timeout_secs == 0 {
            return Err(Error::invalid_input(
                "enrichment.timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.search.max_results == 0 {
            return Err(Error::invalid_input("search.max_results", "must be greater than zero"));
        }

        for (field, value) in [
            ("sources.arxiv_url", &self.sources.arxiv_url),
            ("sources.dblp_url", &self.sources.dblp_url),
            ("sources.scopus_url", &self.sources.scopus_url),
            ("sources.serpapi_url", &self.sources.serpapi_url),
            ("enrichment.endpoint", &self.enrichment.endpoint),
        ] {
            Url::parse(value)
                .map_err(|e| Error::invalid_input(field, format!("invalid URL '{value}': {e}")))?;
        }
        Ok(())
    }

    /// Every endpoint pointed at one mock server, without retry delays
    #[must_use]
    pub fn for_testing(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            retry: RetrySettings {
                max_attempts: 1,
                delay_secs: 0,
            },
            sources: SourcesConfig {
                arxiv_url: format!("{base}/api/query"),
                dblp_url: base.to_string(),
                scopus_url: format!("{base}/content/search/scopus"),
                serpapi_url: format!("{base}/search.json"),
                acl_corpus_dir: None,
            },
            enrichment: EnrichmentSettings {
                endpoint: format!("{base}/web"),
                timeout_secs: 5,
                max_concurrent: 4,
            },
            ..Self::default()
        }
    }
}

/// API keys for the gated sources, read from the environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub scopus_api_key: Option<String>,
    pub serpapi_api_key: Option<String>,
}

impl Credentials {
    /// Read `SCOPUS_API_KEY` and `SERPAPI_API_KEY`; blank values count as unset
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let credentials: Self = envy::from_iter(vars).map_err(|e| Error::InvalidInput {
            field: "credentials".to_string(),
            reason: e.to_string(),
        })?;
        Ok(credentials.without_blanks())
    }

    fn without_blanks(self) -> Self {
        let keep = |key: Option<String>| key.filter(|k| !k.trim().is_empty());
        Self {
            scopus_api_key: keep(self.scopus_api_key),
            serpapi_api_key: keep(self.serpapi_api_key),
        }
    }
}
