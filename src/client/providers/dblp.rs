use super::query;
use super::traits::{ProviderError, QueryLog, SearchQuery, SourceProvider};
use crate::client::{non_empty, HttpClientConfig, Paper};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub const NAME: &str = "DBLP";
pub const DEFAULT_BASE_URL: &str = "https://dblp.org";

const MAX_PER_REQUEST: u32 = 1000;

/// DBLP's AND operator
const AND: &str = " ";
/// DBLP's OR operator
const OR: &str = "|";

/// DBLP search API envelope, shared by the publication, author and venue endpoints
#[derive(Debug, Deserialize)]
struct DblpResponse<T> {
    result: DblpResult<T>,
}

#[derive(Debug, Deserialize)]
struct DblpResult<T> {
    hits: Option<DblpHits<T>>,
}

#[derive(Debug, Deserialize)]
struct DblpHits<T> {
    hit: Option<Vec<DblpHit<T>>>,
}

#[derive(Debug, Deserialize)]
struct DblpHit<T> {
    info: T,
}

impl<T> DblpResponse<T> {
    fn into_infos(self) -> Vec<T> {
        self.result
            .hits
            .and_then(|hits| hits.hit)
            .unwrap_or_default()
            .into_iter()
            .map(|hit| hit.info)
            .collect()
    }
}

/// DBLP emits a bare value where a list has one element
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PublicationInfo {
    key: Option<String>,
    title: Option<String>,
    authors: Option<AuthorList>,
    venue: Option<OneOrMany<String>>,
    year: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    ee: Option<OneOrMany<String>>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthorList {
    author: OneOrMany<AuthorEntry>,
}

#[derive(Debug, Deserialize)]
struct AuthorEntry {
    text: String,
}

#[derive(Debug, Deserialize)]
struct AuthorInfo {
    author: String,
}

#[derive(Debug, Deserialize)]
struct VenueInfo {
    acronym: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Lookup {
    Author,
    Venue,
}

impl std::fmt::Display for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Author => f.write_str("author"),
            Self::Venue => f.write_str("venue"),
        }
    }
}

/// DBLP computer science bibliography provider
pub struct DblpProvider {
    client: Client,
    base_url: String,
}

impl DblpProvider {
    pub fn new(http: &HttpClientConfig) -> Result<Self, ProviderError> {
        Self::with_base_url(http, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        http: &HttpClientConfig,
        base_url: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http.build_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}/search/{}/api", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(NAME, &e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(NAME, status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Parse(format!("{NAME} {endpoint} response: {e}")))
    }

    /// Resolve a free-form author name to DBLP's `author:First_Last:` filter
    async fn lookup_author(&self, name: &str) -> Result<Option<String>, ProviderError> {
        let response: DblpResponse<AuthorInfo> = self
            .get_json("author", &lookup_params(name))
            .await?;

        Ok(response
            .into_infos()
            .into_iter()
            .next()
            .map(|info| format!("author:{}:", info.author.trim().replace(' ', "_"))))
    }

    /// Resolve a venue name to DBLP's `streamid:<path>:` filter
    async fn lookup_venue(&self, name: &str) -> Result<Option<String>, ProviderError> {
        let response: DblpResponse<VenueInfo> = self
            .get_json("venue", &lookup_params(name))
            .await?;

        Ok(response
            .into_infos()
            .into_iter()
            .next()
            .and_then(|info| stream_path(&info))
            .map(|path| format!("streamid:{path}:")))
    }

    /// Run every lookup, dropping names DBLP cannot resolve
    async fn resolve_all(&self, names: &[String], kind: Lookup) -> Vec<String> {
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            let lookup = match kind {
                Lookup::Author => self.lookup_author(name).await,
                Lookup::Venue => self.lookup_venue(name).await,
            };
            match lookup {
                Ok(Some(filter)) => {
                    debug!("Resolved DBLP {} '{}' to {}", kind, name, filter);
                    resolved.push(filter);
                }
                Ok(None) => warn!("Could not find a DBLP {} match for '{}'. Skipping.", kind, name),
                Err(e) => error!("Failed to look up DBLP {} '{}': {}. Skipping.", kind, name, e),
            }
        }
        resolved
    }

    /// Build one sub-query per keyword variant, sharing the author and venue clauses
    ///
    /// One-word single-term groups collapse into a single `a|b|c` clause;
    /// every other group becomes its own sub-query because DBLP has no
    /// grouping parentheses.
    pub(crate) fn build_queries(
        keyword_groups: &[Vec<String>],
        author_filters: &[String],
        venue_filters: &[String],
    ) -> Vec<String> {
        let shared: Vec<String> = [author_filters, venue_filters]
            .iter()
            .filter(|filters| !filters.is_empty())
            .map(|filters| filters.join(OR))
            .collect();

        let mut singles = Vec::new();
        let mut variants = Vec::new();
        for group in keyword_groups.iter().filter(|g| !g.is_empty()) {
            match group.as_slice() {
                [term] if !term.contains(char::is_whitespace) => singles.push(term.clone()),
                terms => variants.push(terms.join(AND)),
            }
        }
        if !singles.is_empty() {
            variants.insert(0, singles.join(OR));
        }

        if variants.is_empty() {
            return if shared.is_empty() {
                Vec::new()
            } else {
                vec![shared.join(AND)]
            };
        }

        variants
            .into_iter()
            .map(|keywords| {
                std::iter::once(keywords)
                    .chain(shared.iter().cloned())
                    .collect::<Vec<_>>()
                    .join(AND)
            })
            .collect()
    }

    fn to_paper(info: PublicationInfo) -> Option<Paper> {
        if info.kind.as_deref() == Some("Editorship") {
            return None;
        }
        let year = info.year.as_deref().and_then(|y| y.trim().parse::<i32>().ok())?;
        let title = non_empty(info.title)?;

        let mut paper = Paper::new(title, NAME);
        paper.year = Some(year);
        paper.authors = info
            .authors
            .map(|list| list.author.into_vec().into_iter().map(|a| a.text).collect())
            .unwrap_or_default();
        paper.venue = info
            .venue
            .map(|v| v.into_vec().join(", "))
            .filter(|v| !v.is_empty());
        paper.url = info
            .ee
            .and_then(|ee| ee.into_vec().into_iter().next())
            .or(info.url);
        Some(paper)
    }
}

fn lookup_params(name: &str) -> [(&'static str, String); 3] {
    [
        ("q", name.to_string()),
        ("format", "json".to_string()),
        ("h", "1".to_string()),
    ]
}

/// `https://dblp.org/db/conf/nips/` becomes `conf/nips`; falls back to the acronym
fn stream_path(info: &VenueInfo) -> Option<String> {
    info.url
        .as_deref()
        .and_then(|url| url.split_once("/db/"))
        .map(|(_, path)| path.trim_matches('/').to_string())
        .filter(|path| !path.is_empty())
        .or_else(|| {
            info.acronym
                .as_deref()
                .map(|acronym| format!("conf/{}", acronym.trim().to_lowercase()))
        })
}

#[async_trait]
impl SourceProvider for DblpProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "DBLP - Computer science bibliography"
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

        let author_filters = if query.authors.is_empty() {
            Vec::new()
        } else {
            info!("Looking up {} DBLP author name(s)", query.authors.len());
            self.resolve_all(&query.authors, Lookup::Author).await
        };
        let venue_filters = if query.venues.is_empty() {
            Vec::new()
        } else {
            info!("Looking up {} DBLP venue(s)", query.venues.len());
            self.resolve_all(&query.venues, Lookup::Venue).await
        };
        if !query.macro_areas.is_empty() {
            debug!("DBLP has no subject areas; ignoring {} macro area(s)", query.macro_areas.len());
        }

        let sub_queries = Self::build_queries(&query.keyword_groups, &author_filters, &venue_filters);
        let logged = sub_queries.join(" || ");
        query_log.record(NAME, logged.clone());

        if sub_queries.is_empty() {
            warn!("DBLP search requires keywords, authors, or venues, and at least one must be valid");
            return Ok(Vec::new());
        }
        info!("Constructed DBLP query: {}", logged);

        let max_results = query::clamp_max_results(NAME, query.max_results, self.max_per_request());
        let mut seen = HashSet::new();
        let mut papers = Vec::new();

        for sub_query in &sub_queries {
            let response: DblpResponse<PublicationInfo> = self
                .get_json(
                    "publ",
                    &[
                        ("q", sub_query.clone()),
                        ("format", "json".to_string()),
                        ("h", max_results.to_string()),
                    ],
                )
                .await?;

            let infos = response.into_infos();
            debug!("DBLP sub-query '{}' returned {} hits", sub_query, infos.len());

            for info in infos {
                if let Some(key) = &info.key {
                    if !seen.insert(key.clone()) {
                        continue;
                    }
                }
                if let Some(paper) = Self::to_paper(info) {
                    papers.push(paper);
                }
            }
        }

        let papers = query::apply_client_filters(papers, query, max_results as usize);
        info!(
            "DBLP search completed: {} papers found in {:?}",
            papers.len(),
            start_time.elapsed()
        );
        Ok(papers)
    }
}
