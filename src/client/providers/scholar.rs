use super::query::{self, quoted, BooleanSyntax};
use super::traits::{ProviderError, QueryLog, SearchQuery, SourceProvider};
use crate::client::{non_empty, HttpClientConfig, Paper};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const NAME: &str = "Google Scholar";
pub const DEFAULT_BASE_URL: &str = "https://serpapi.com/search.json";
pub const API_KEY_VAR: &str = "SERPAPI_API_KEY";

const MAX_PER_REQUEST: u32 = 20;

/// Google Scholar treats adjacency as AND
const SYNTAX: BooleanSyntax = BooleanSyntax {
    and: " ",
    or: " OR ",
};

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(1[89]\d{2}|20\d{2})\b").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
    publication_info: Option<PublicationInfo>,
    #[serde(default)]
    resources: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct PublicationInfo {
    /// `A Author, B Author - Venue, 2021 - host.org`
    summary: Option<String>,
    #[serde(default)]
    authors: Vec<ScholarAuthor>,
}

#[derive(Debug, Deserialize)]
struct ScholarAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Resource {
    link: Option<String>,
}

/// Google Scholar via the SerpAPI proxy, gated by an API key
pub struct ScholarProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ScholarProvider {
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
        let mut clauses = Vec::new();

        if let Some(keywords) = SYNTAX.keyword_groups(&query.keyword_groups, quoted) {
            clauses.push(format!("({keywords})"));
        }
        if let Some(authors) =
            SYNTAX.any_of(query.authors.iter().map(|a| format!("author:{}", quoted(a))))
        {
            clauses.push(authors);
        }
        if let Some(venues) =
            SYNTAX.any_of(query.venues.iter().map(|v| format!("source:{}", quoted(v))))
        {
            clauses.push(venues);
        }
        if let Some(areas) = SYNTAX.any_of(query.macro_areas.iter().map(|a| quoted(a))) {
            clauses.push(areas);
        }

        if clauses.is_empty() {
            return None;
        }

        let mut expression = SYNTAX.all_of(&clauses);
        for term in &query.exclusion_keywords {
            expression.push_str(" -");
            expression.push_str(&quoted(term));
        }
        Some(expression)
    }

    fn to_paper(result: OrganicResult) -> Option<Paper> {
        let title = non_empty(result.title)?;
        let info = result.publication_info;
        let summary_line = info.as_ref().and_then(|i| i.summary.clone()).unwrap_or_default();
        let mut segments = summary_line.split(" - ").map(str::trim);
        let author_segment = segments.next().unwrap_or_default();
        let venue_segment = segments.next().unwrap_or_default();

        let year = YEAR_RE
            .find(venue_segment)
            .or_else(|| YEAR_RE.find(&summary_line))
            .and_then(|m| m.as_str().parse::<i32>().ok());

        let mut paper = Paper::new(title, NAME);
        paper.year = year;
        paper.summary = non_empty(result.snippet);
        paper.venue = non_empty(Some(
            YEAR_RE
                .replace(venue_segment, "")
                .trim_end_matches([',', ' '])
                .to_string(),
        ));
        paper.authors = match info {
            Some(info) if !info.authors.is_empty() => {
                info.authors.into_iter().map(|a| a.name).collect()
            }
            _ => author_segment
                .split(',')
                .map(|name| name.trim().trim_end_matches('…').trim())
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        };
        paper.url = result
            .link
            .or_else(|| result.resources.into_iter().find_map(|r| r.link));
        Some(paper)
    }

    pub(crate) fn parse_response(body: &str) -> Result<Vec<Paper>, ProviderError> {
        let response: SerpApiResponse = serde_json::from_str(body)
            .map_err(|e| ProviderError::Parse(format!("Failed to parse SerpAPI response: {e}")))?;

        if let Some(message) = response.error {
            if message.contains("hasn't returned any results") {
                debug!("Google Scholar returned no results");
                return Ok(Vec::new());
            }
            return Err(ProviderError::Other(format!("SerpAPI error: {message}")));
        }

        Ok(response
            .organic_results
            .into_iter()
            .filter_map(Self::to_paper)
            .collect())
    }
}

#[async_trait]
impl SourceProvider for ScholarProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Google Scholar through the SerpAPI proxy (API key required)"
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
            warn!("Google Scholar search requires keywords, authors, venues, or macro areas");
            query_log.record(NAME, "");
            return Ok(Vec::new());
        };
        info!("Constructed Google Scholar query: {}", search_query);
        query_log.record(NAME, search_query.clone());

        let num = query::clamp_max_results(NAME, query.max_results, self.max_per_request());
        let mut params = vec![
            ("engine", "google_scholar".to_string()),
            ("q", search_query),
            ("num", num.to_string()),
            ("api_key", api_key.to_string()),
        ];
        if let Some(years) = &query.years {
            let (low, high) = years.bounds();
            params.push(("as_ylo", low.to_string()));
            params.push(("as_yhi", high.to_string()));
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
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
        let papers = query::apply_client_filters(papers, query, num as usize);

        info!(
            "Google Scholar search completed: {} papers found in {:?}",
            papers.len(),
            start_time.elapsed()
        );
        Ok(papers)
    }
}
