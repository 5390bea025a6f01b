use super::query::{self, quoted, BooleanSyntax};
use super::traits::{ProviderError, QueryLog, SearchQuery, SourceProvider};
use crate::client::{non_empty, squash_whitespace, HttpClientConfig, Paper};
use async_trait::async_trait;
use chrono::{DateTime, Datelike};
use reqwest::Client;
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

pub const NAME: &str = "arXiv";
pub const DEFAULT_BASE_URL: &str = "http://export.arxiv.org/api/query";

/// arXiv refuses larger pages in a single request
const MAX_PER_REQUEST: u32 = 2000;

/// Subject areas mapped to arXiv category wildcards
const MACRO_AREAS: &[(&str, &str)] = &[
    ("computer science", "cs.*"),
    ("physics", "physics.*"),
    ("mathematics", "math.*"),
    ("quantitative biology", "q-bio.*"),
    ("quantitative finance", "q-fin.*"),
    ("statistics", "stat.*"),
    ("electrical engineering", "eess.*"),
    ("economics", "econ.*"),
];

/// arXiv API provider for preprints
pub struct ArxivProvider {
    client: Client,
    base_url: String,
}

impl ArxivProvider {
    /// Create a new arXiv provider
    pub fn new(http: &HttpClientConfig) -> Result<Self, ProviderError> {
        Self::with_base_url(http, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        http: &HttpClientConfig,
        base_url: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http.build_client()?,
            base_url: base_url.into(),
        })
    }

    /// Build the `search_query` expression, or `None` when nothing can be asked
    pub(crate) fn build_query(query: &SearchQuery) -> Option<String> {
        let syntax = BooleanSyntax::WORDS;
        let mut clauses = Vec::new();

        if let Some(keywords) =
            syntax.keyword_groups(&query.keyword_groups, |t| format!("all:{}", quoted(t)))
        {
            clauses.push(format!("({keywords})"));
        }
        if let Some(authors) = syntax.any_of(query.authors.iter().map(|a| format!("au:{}", quoted(a))))
        {
            clauses.push(authors);
        }
        if let Some(categories) = syntax.any_of(
            query
                .macro_areas
                .iter()
                .map(|area| format!("cat:{}", query::lookup_area(MACRO_AREAS, area))),
        ) {
            clauses.push(categories);
        }
        if !query.venues.is_empty() {
            debug!("arXiv has no venue field; ignoring {} venue(s)", query.venues.len());
        }

        if clauses.is_empty() {
            return None;
        }

        if let Some(years) = &query.years {
            let (low, high) = years.bounds();
            clauses.push(format!(
                "submittedDate:[{low}01010000 TO {high}12312359]"
            ));
        }

        let mut expression = syntax.all_of(&clauses);
        if let Some(excluded) =
            syntax.any_of(query.exclusion_keywords.iter().map(|t| format!("all:{}", quoted(t))))
        {
            expression.push_str(" ANDNOT ");
            expression.push_str(&excluded);
        }
        Some(expression)
    }

    /// Build arXiv API URL for search
    fn build_search_url(&self, search_query: &str, max_results: u32) -> Result<String, ProviderError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ProviderError::Other(format!("Invalid base URL: {e}")))?;

        url.query_pairs_mut()
            .append_pair("search_query", search_query)
            .append_pair("start", "0")
            .append_pair("max_results", &max_results.to_string())
            .append_pair("sortBy", "relevance")
            .append_pair("sortOrder", "descending");

        Ok(url.to_string())
    }

    /// Parse arXiv Atom feed response
    pub(crate) fn parse_response(response_text: &str) -> Result<Vec<Paper>, ProviderError> {
        use roxmltree::Document;

        let doc = Document::parse(response_text)
            .map_err(|e| ProviderError::Parse(format!("Failed to parse XML: {e}")))?;

        let mut papers = Vec::new();

        for entry in doc.descendants().filter(|n| n.has_tag_name("entry")) {
            let mut paper = Paper::new(String::new(), NAME);
            let mut abs_url = None;

            for child in entry.children().filter(roxmltree::Node::is_element) {
                match child.tag_name().name() {
                    "id" => abs_url = child.text().map(|id| id.trim().to_string()),
                    "title" => {
                        if let Some(title) = child.text() {
                            paper.title = squash_whitespace(title);
                        }
                    }
                    "summary" => {
                        paper.summary = non_empty(child.text().map(squash_whitespace));
                    }
                    "published" => {
                        paper.year = child
                            .text()
                            .and_then(|ts| DateTime::parse_from_rfc3339(ts.trim()).ok())
                            .map(|ts| ts.year());
                    }
                    "author" => {
                        for name in child.descendants().filter(|n| n.has_tag_name("name")) {
                            if let Some(author) = name.text() {
                                paper.authors.push(author.trim().to_string());
                            }
                        }
                    }
                    "link" => {
                        if child.attribute("title") == Some("pdf")
                            || child.attribute("type") == Some("application/pdf")
                        {
                            paper.url = child.attribute("href").map(str::to_string);
                        }
                    }
                    "journal_ref" => {
                        paper.venue = non_empty(child.text().map(squash_whitespace));
                    }
                    _ => {}
                }
            }

            if paper.url.is_none() {
                paper.url = abs_url;
            }

            // The API reports query errors as a single entry titled "Error"
            if paper.title.is_empty() || paper.title == "Error" {
                continue;
            }
            if paper.year.is_none() {
                debug!("Skipping arXiv entry without a publication date: {}", paper.title);
                continue;
            }
            papers.push(paper);
        }

        debug!("Parsed {} papers from arXiv response", papers.len());
        Ok(papers)
    }
}

#[async_trait]
impl SourceProvider for ArxivProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "arXiv.org - Open access e-prints in physics, mathematics, computer science, and more"
    }

    fn max_per_request(&self) -> Option<u32> {
        Some(MAX_PER_REQUEST)
    }

    async fn fetch(
        &self,
        query: &SearchQuery,
        query_log: &QueryLog,
    ) -> Result<Vec<Paper>, ProviderError> {
        let start_time = Instant::now();

        let Some(search_query) = Self::build_query(query) else {
            warn!("arXiv search requires keywords, authors, or macro areas");
            query_log.record(NAME, "");
            return Ok(Vec::new());
        };
        info!("Constructed arXiv query: {}", search_query);
        query_log.record(NAME, search_query.clone());

        let max_results = query::clamp_max_results(NAME, query.max_results, self.max_per_request());
        let url = self.build_search_url(&search_query, max_results)?;
        debug!("arXiv search URL: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(NAME, &e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(NAME, status, &error_text));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(format!("Failed to read response: {e}")))?;

        let papers = Self::parse_response(&response_text)?;
        let papers = query::apply_client_filters(papers, query, max_results as usize);

        info!(
            "arXiv search completed: {} papers found in {:?}",
            papers.len(),
            start_time.elapsed()
        );
        Ok(papers)
    }
}
