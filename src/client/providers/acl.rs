//! ACL Anthology provider backed by a local checkout of the anthology's XML
//! corpus (`data/xml/*.xml`).
//!
//! The anthology has no query API, so every search scans the full corpus.
//! The corpus is parsed once per provider and kept in memory.

use super::query::{self, BooleanSyntax};
use super::traits::{ProviderError, QueryLog, SearchQuery, SourceProvider};
use crate::client::{non_empty, squash_whitespace, Paper};
use async_trait::async_trait;
use roxmltree::{Document, Node};
use std::cmp::Reverse;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub const NAME: &str = "ACL Anthology";
pub const WEB_BASE_URL: &str = "https://aclanthology.org";

/// A corpus paper with its lower-cased match fields precomputed
#[derive(Debug, Clone)]
struct AclRecord {
    paper: Paper,
    text: String,
    authors: String,
    venues: String,
}

impl AclRecord {
    fn new(paper: Paper, venue_ids: &[String]) -> Self {
        let text = query::searchable_text(&paper.title, paper.summary.as_deref());
        let authors = paper.authors.join(" ").to_lowercase();
        let venues = venue_ids.join(" ").to_lowercase();
        Self {
            paper,
            text,
            authors,
            venues,
        }
    }

    /// Relevance score, or `None` when a requested criterion does not match
    fn score(&self, query: &SearchQuery) -> Option<usize> {
        let mut score = 0;

        if !query.keyword_groups.is_empty() {
            let contains = |term: &String| self.text.contains(&term.to_lowercase());
            if !query.keyword_groups.iter().any(|group| group.iter().all(contains)) {
                return None;
            }
            score += query
                .keyword_terms()
                .filter(|term| self.text.contains(&term.to_lowercase()))
                .count();
        }
        if !query.authors.is_empty() {
            let matched = count_matches(&self.authors, &query.authors);
            if matched == 0 {
                return None;
            }
            score += matched;
        }
        if !query.venues.is_empty() {
            let matched = count_matches(&self.venues, &query.venues);
            if matched == 0 {
                return None;
            }
            score += matched;
        }
        Some(score)
    }
}

fn count_matches(haystack: &str, needles: &[String]) -> usize {
    needles
        .iter()
        .filter(|needle| haystack.contains(&needle.to_lowercase()))
        .count()
}

/// ACL Anthology corpus-scan provider
pub struct AclAnthologyProvider {
    corpus_dir: Option<PathBuf>,
    corpus: OnceCell<Arc<Vec<AclRecord>>>,
}

impl AclAnthologyProvider {
    #[must_use]
    pub fn new(corpus_dir: Option<PathBuf>) -> Self {
        Self {
            corpus_dir,
            corpus: OnceCell::new(),
        }
    }

    async fn corpus(&self) -> Result<Arc<Vec<AclRecord>>, ProviderError> {
        let Some(dir) = self.corpus_dir.clone() else {
            return Err(ProviderError::Configuration(
                "ACL Anthology corpus directory (sources.acl_corpus_dir)".to_string(),
            ));
        };

        self.corpus
            .get_or_try_init(|| async move {
                info!("Loading ACL Anthology corpus from {}", dir.display());
                let start_time = Instant::now();
                let records = tokio::task::spawn_blocking(move || load_corpus(&dir))
                    .await
                    .map_err(|e| ProviderError::Other(format!("Corpus loader failed: {e}")))??;
                info!(
                    "Loaded {} ACL Anthology papers in {:?}",
                    records.len(),
                    start_time.elapsed()
                );
                Ok::<_, ProviderError>(Arc::new(records))
            })
            .await
            .cloned()
    }

    /// Human-readable rendering of the client-side filter
    pub(crate) fn describe_filter(query: &SearchQuery) -> String {
        let syntax = BooleanSyntax::WORDS;
        let mut parts = Vec::new();

        if let Some(keywords) = syntax.keyword_groups(&query.keyword_groups, str::to_string) {
            parts.push(format!("keywords: {keywords}"));
        }
        if let Some(authors) = syntax.any_of(&query.authors) {
            parts.push(format!("authors: {authors}"));
        }
        if let Some(venues) = syntax.any_of(&query.venues) {
            parts.push(format!("venues: {venues}"));
        }
        if let Some(years) = &query.years {
            let (low, high) = years.bounds();
            parts.push(format!("years: {low}-{high}"));
        }
        if let Some(excluded) = syntax.any_of(&query.exclusion_keywords) {
            parts.push(format!("exclude: {excluded}"));
        }
        parts.join("; ")
    }

    fn select(corpus: &[AclRecord], query: &SearchQuery, cap: usize) -> Vec<Paper> {
        let candidates = corpus.iter().filter(|record| {
            query::year_matches(record.paper.year, query.years.as_ref())
                && !query::is_excluded(&record.text, &query.exclusion_keywords)
        });

        if !query.has_criteria() {
            return candidates.take(cap).map(|r| r.paper.clone()).collect();
        }

        let mut scored: Vec<(usize, &AclRecord)> = candidates
            .filter_map(|record| record.score(query).map(|score| (score, record)))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by_key(|(score, _)| Reverse(*score));
        scored
            .into_iter()
            .take(cap)
            .map(|(_, record)| record.paper.clone())
            .collect()
    }
}

#[async_trait]
impl SourceProvider for AclAnthologyProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "ACL Anthology - Computational linguistics papers from a local corpus checkout"
    }

    async fn fetch(
        &self,
        query: &SearchQuery,
        query_log: &QueryLog,
    ) -> Result<Vec<Paper>, ProviderError> {
        let filter = Self::describe_filter(query);
        info!("ACL Anthology filter: {}", filter);
        query_log.record(NAME, filter);

        if !query.macro_areas.is_empty() {
            debug!("ACL Anthology is single-domain; macro areas never add to the score");
        }

        let corpus = self.corpus().await?;
        let papers = Self::select(&corpus, query, query.max_results as usize);
        info!("ACL Anthology search completed: {} papers", papers.len());
        Ok(papers)
    }
}

fn load_corpus(dir: &Path) -> Result<Vec<AclRecord>, ProviderError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProviderError::Configuration(format!("ACL Anthology corpus directory {}", dir.display()))
        } else {
            ProviderError::Other(format!("Cannot read {}: {e}", dir.display()))
        }
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "xml"))
        .collect();
    files.sort();

    let mut records = Vec::new();
    for file in &files {
        let xml = match std::fs::read_to_string(file) {
            Ok(xml) => xml,
            Err(e) => {
                warn!("Skipping unreadable corpus file {}: {}", file.display(), e);
                continue;
            }
        };
        match parse_collection(&xml) {
            Ok(mut parsed) => records.append(&mut parsed),
            Err(e) => warn!("Skipping malformed corpus file {}: {}", file.display(), e),
        }
    }
    Ok(records)
}

/// Concatenated text of a node, flattening markup such as `<fixed-case>`
fn full_text(node: Node<'_, '_>) -> String {
    let raw: String = node
        .descendants()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect();
    squash_whitespace(&raw)
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    non_empty(child(node, name).map(full_text))
}

fn author_name(node: Node<'_, '_>) -> Option<String> {
    let name = [child_text(node, "first"), child_text(node, "last")]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    non_empty(Some(name))
}

fn paper_url(raw: &str) -> String {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("{WEB_BASE_URL}/{raw}/")
    }
}

fn parse_collection(xml: &str) -> Result<Vec<AclRecord>, ProviderError> {
    let doc = Document::parse(xml)
        .map_err(|e| ProviderError::Parse(format!("Failed to parse XML: {e}")))?;
    let root = doc.root_element();
    let collection_id = root.attribute("id").unwrap_or_default().to_string();

    let mut records = Vec::new();
    for volume in root.children().filter(|n| n.has_tag_name("volume")) {
        let meta = child(volume, "meta");
        let booktitle = meta.and_then(|m| child_text(m, "booktitle"));
        let volume_year = meta
            .and_then(|m| child_text(m, "year"))
            .and_then(|y| y.parse::<i32>().ok());

        let mut venue_ids = vec![collection_id.clone()];
        venue_ids.extend(booktitle.clone());
        if let Some(meta) = meta {
            venue_ids.extend(
                meta.children()
                    .filter(|n| n.has_tag_name("venue"))
                    .map(full_text),
            );
        }

        // Front matter lives in <frontmatter>, never in <paper>
        for node in volume.children().filter(|n| n.has_tag_name("paper")) {
            if node.attribute("id") == Some("0") {
                continue;
            }
            let Some(title) = child_text(node, "title") else {
                continue;
            };
            let year = child_text(node, "year")
                .and_then(|y| y.parse::<i32>().ok())
                .or(volume_year);
            if year.is_none() {
                continue;
            }

            let mut paper = Paper::new(title, NAME);
            paper.year = year;
            paper.authors = node
                .children()
                .filter(|n| n.has_tag_name("author"))
                .filter_map(author_name)
                .collect();
            paper.summary = child_text(node, "abstract");
            paper.venue = booktitle.clone().or_else(|| non_empty(Some(collection_id.clone())));
            paper.url = child_text(node, "url").map(|url| paper_url(&url));

            records.push(AclRecord::new(paper, &venue_ids));
        }
    }
    Ok(records)
}
