use super::query::{self, quoted, BooleanSyntax};
use super::traits::{ProviderError, QueryLog, SearchQuery, SourceProvider, YearFilter};
use crate::client::{non_empty, HttpClientConfig, Paper};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const NAME: &str = "Scopus";
pub const DEFAULT_BASE_URL: &str = "https://api.elsevier.com/content/search/scopus";
pub const API_KEY_VAR: &str = "SCOPUS_API_KEY";

/// Ceiling for the COMPLETE view, which is needed for abstracts
const MAX_PER_REQUEST: u32 = 25;

/// Scopus subject area codes, see dev.elsevier.com/subject_areas
const SUBJECT_AREAS: &[(&str, &str)] = &[
    ("computer science", "COMP"),
    ("physics", "PHYS"),
    ("mathematics", "MATH"),
    ("engineering", "ENGI"),
    ("medicine", "MEDI"),
    ("neuroscience", "NEUR"),
    ("social sciences", "SOCI"),
];

#[derive(Debug, Deserialize)]
struct ScopusResponse {
    #[serde(rename = "search-results")]
    search_results: SearchResults,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    entry: Vec<ScopusEntry>,
}

/// One search result; an empty result set comes back as a single error entry
#[derive(Debug, Deserialize)]
struct ScopusEntry {
    #[serde(rename = "dc:title")]
    title: Option<String>,
    #[serde(rename = "dc:description")]
    description: Option<String>,
    #[serde(rename = "prism:coverDate")]
    cover_date: Option<String>,
    #[serde(rename = "prism:publicationName")]
    publication_name: Option<String>,
    #[serde(default)]
    author: Vec<ScopusAuthor>,
    #[serde(default)]
    link: Vec<ScopusLink>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScopusAuthor {
    authname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScopusLink {
    #[serde(rename = "@ref")]
    rel: Option<String>,
    #[serde(rename = "@href")]
    href: Option<String>,
}

/// Elsevier Scopus search provider, gated by an API key
pub struct ScopusProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ScopusProvider {
    pub fn new(http: &HttpClientConfig, api_key: Option<String>) -> Result<Self, ProviderError> {
        Self::with_base_url(http, DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(
        http: &HttpClientConfig,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http.build_client()?,
            base_url: base_url.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    pub(crate) fn build_query(query: &SearchQuery) -> Option<String> {
        let syntax = BooleanSyntax::WORDS;
        let mut clauses = Vec::new();

        if let Some(keywords) = syntax.keyword_groups(&query.keyword_groups, quoted) {
            clauses.push(format!("TITLE-ABS-KEY({keywords})"));
        }
        if let Some(authors) = syntax.any_of(query.authors.iter().map(|a| quoted(a))) {
            clauses.push(format!("AUTH{authors}"));
        }
        if let Some(venues) = syntax.any_of(query.venues.iter().map(|v| quoted(v))) {
            clauses.push(format!("SRCTITLE{venues}"));
        }
        if let Some(areas) = syntax.any_of(
            query
                .macro_areas
                .iter()
                .map(|area| query::lookup_area(SUBJECT_AREAS, area)),
        ) {
            clauses.push(format!("SUBJAREA{areas}"));
        }

        if clauses.is_empty() {
            return None;
        }

        match query.years {
            Some(YearFilter::Single(year)) => clauses.push(format!("PUBYEAR IS {year}")),
            Some(YearFilter::Range { start, end }) => clauses.push(format!(
                "PUBYEAR > {} AND PUBYEAR < {}",
                start - 1,
                end + 1
            )),
            None => {}
        }

        let mut expression = syntax.all_of(&clauses);
        if let Some(excluded) = syntax.any_of(query.exclusion_keywords.iter().map(|t| quoted(t))) {
            expression.push_str(" AND NOT TITLE-ABS-KEY");
            expression.push_str(&excluded);
        }
        Some(expression)
    }

    fn to_paper(entry: ScopusEntry) -> Option<Paper> {
        if let Some(message) = &entry.error {
            debug!("Scopus returned an error entry: {}", message);
            return None;
        }
        let title = non_empty(entry.title)?;
        let year = entry
            .cover_date
            .as_deref()
            .and_then(|date| date.get(..4))
            .and_then(|year| year.parse::<i32>().ok())?;

        let mut paper = Paper::new(title, NAME);
        paper.year = Some(year);
        paper.summary = non_empty(entry.description);
        paper.venue = non_empty(entry.publication_name);
        paper.authors = entry
            .author
            .into_iter()
            .filter_map(|a| non_empty(a.authname))
            .collect();
        paper.url = entry
            .link
            .into_iter()
            .find(|link| link.rel.as_deref() == Some("scopus"))
            .and_then(|link| link.href);
        Some(paper)
    }

    pub(crate) fn parse_response(body: &str) -> Result<Vec<Paper>, ProviderError> {
        let response: ScopusResponse = serde_json::from_str(body)
            .map_err(|e| ProviderError::Parse(format!("Failed to parse Scopus response: {e}")))?;
        Ok(response
            .search_results
            .entry
            .into_iter()
            .filter_map(Self::to_paper)
            .collect())
    }
}

#[async_trait]
impl SourceProvider for ScopusProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Scopus - Elsevier abstract and citation database (API key required)"
    }

    fn max_per_request(&self) -> Option<u32> {
        Some(MAX_PER_REQUEST)
    }

    async fn fetch(
        &self,
        query: &SearchQuery,
        query_log: &QueryLog,
    ) -> Result<Vec<Paper>, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            query_log.record(NAME, "");
            return Err(ProviderError::Configuration(API_KEY_VAR.to_string()));
        };
        let start_time = Instant::now();

        let Some(search_query) = Self::build_query(query) else {
            warn!("Scopus search requires keywords, authors, venues, or macro areas");
            query_log.record(NAME, "");
            return Ok(Vec::new());
        };
        info!("Constructed Scopus query: {}", search_query);
        query_log.record(NAME, search_query.clone());

        let count = query::clamp_max_results(NAME, query.max_results, self.max_per_request());
        let count_param = count.to_string();

        let response = self
            .client
            .get(&self.base_url)
            .header("X-ELS-APIKey", api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[
                ("query", search_query.as_str()),
                ("count", count_param.as_str()),
                ("view", "COMPLETE"),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(NAME, &e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(NAME, status, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(format!("Failed to read response: {e}")))?;

        let papers = Self::parse_response(&body)?;
        let papers = query::apply_client_filters(papers, query, count as usize);

        info!(
            "Scopus search completed: {} papers found in {:?}",
            papers.len(),
            start_time.elapsed()
        );
        Ok(papers)
    }
}
