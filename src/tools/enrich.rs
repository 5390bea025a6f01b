//! Best-effort metadata enrichment through a Zotero translation server.
//!
//! Every input paper yields exactly one [`EnrichedPaper`], in input order.
//! Per-paper failures are logged and leave that paper without an overlay.

use crate::client::providers::ProviderError;
use crate::client::{Paper, TranslatedItem, TranslationClient};
use crate::progress::{self, ProgressSink};
use futures::stream::{self, StreamExt};
use regex::Regex;
use serde::Serialize;
use std::cmp::Reverse;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:1969/web";

/// Extensions of raw documents the translation server cannot handle
const DIRECT_FILE_EXTENSIONS: &[&str] = &[".pdf", ".ps", ".djvu", ".doc", ".docx", ".zip"];

static ARXIV_PDF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://(?:www\.|export\.)?arxiv\.org)/pdf/([^?#]+?)(?:\.pdf)?$")
        .expect("valid regex")
});
static OPENREVIEW_PDF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://(?:www\.)?openreview\.net)/pdf\?id=(.+)$").expect("valid regex")
});
static ACL_PDF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://(?:www\.)?aclanthology\.org)/([^/?#]+)\.pdf$").expect("valid regex")
});
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{4})\b").expect("valid regex"));

/// Rewrite repository document links to their landing pages
#[must_use]
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if ARXIV_PDF_RE.is_match(url) {
        return ARXIV_PDF_RE.replace(url, "${1}/abs/${2}").into_owned();
    }
    if OPENREVIEW_PDF_RE.is_match(url) {
        return OPENREVIEW_PDF_RE.replace(url, "${1}/forum?id=${2}").into_owned();
    }
    if ACL_PDF_RE.is_match(url) {
        return ACL_PDF_RE.replace(url, "${1}/${2}/").into_owned();
    }
    url.to_string()
}

/// Whether the URL points at a raw document rather than a landing page
#[must_use]
pub fn is_direct_file(url: &str) -> bool {
    let path = Url::parse(url).map_or_else(|_| url.to_lowercase(), |u| u.path().to_lowercase());
    DIRECT_FILE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn is_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// A source paper with optional translation-server metadata laid over it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedPaper {
    paper: Paper,
    overlay: Option<TranslatedItem>,
}

impl EnrichedPaper {
    #[must_use]
    pub fn new(paper: Paper, overlay: Option<TranslatedItem>) -> Self {
        Self { paper, overlay }
    }

    #[must_use]
    pub fn unenriched(paper: Paper) -> Self {
        Self::new(paper, None)
    }

    #[must_use]
    pub fn paper(&self) -> &Paper {
        &self.paper
    }

    #[must_use]
    pub fn overlay(&self) -> Option<&TranslatedItem> {
        self.overlay.as_ref()
    }

    #[must_use]
    pub fn is_enriched(&self) -> bool {
        self.overlay.is_some()
    }

    #[must_use]
    pub fn into_paper(self) -> Paper {
        self.paper
    }

    fn overlay_field(&self, field: impl Fn(&TranslatedItem) -> Option<&String>) -> Option<&str> {
        self.overlay.as_ref().and_then(|item| present(field(item)))
    }

    #[must_use]
    pub fn title(&self) -> &str {
        self.overlay_field(|o| o.title.as_ref())
            .unwrap_or(&self.paper.title)
    }

    #[must_use]
    pub fn authors(&self) -> Vec<String> {
        let creators: Vec<String> = self
            .overlay
            .iter()
            .flat_map(|o| o.creators.iter())
            .filter_map(crate::client::Creator::display_name)
            .collect();
        if creators.is_empty() {
            self.paper.authors.clone()
        } else {
            creators
        }
    }

    /// Year from the overlay date, falling back to the source year
    #[must_use]
    pub fn year(&self) -> Option<i32> {
        self.overlay_field(|o| o.date.as_ref())
            .and_then(|date| YEAR_RE.captures(date))
            .and_then(|caps| caps[1].parse().ok())
            .or(self.paper.year)
    }

    #[must_use]
    pub fn venue(&self) -> Option<&str> {
        self.overlay_field(|o| o.publication_title.as_ref())
            .or_else(|| self.overlay_field(|o| o.proceedings_title.as_ref()))
            .or_else(|| self.overlay_field(|o| o.book_title.as_ref()))
            .or(self.paper.venue.as_deref())
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.overlay_field(|o| o.url.as_ref())
            .or(self.paper.url.as_deref())
    }

    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.overlay_field(|o| o.abstract_note.as_ref())
            .or(self.paper.summary.as_deref())
    }

    #[must_use]
    pub fn doi(&self) -> Option<&str> {
        self.overlay_field(|o| o.doi.as_ref())
    }

    #[must_use]
    pub fn item_type(&self) -> Option<&str> {
        self.overlay_field(|o| o.item_type.as_ref())
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.paper.source
    }
}

/// Year descending with unknown years last, then case-insensitive title
pub fn sort_for_display(papers: &mut [EnrichedPaper]) {
    papers.sort_by_cached_key(|p| (Reverse(p.year()), p.title().to_lowercase()));
}

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// Translation server `/web` endpoint
    pub endpoint: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Requests in flight at once
    pub max_concurrent: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(60),
            max_concurrent: 8,
        }
    }
}

/// Enriches papers concurrently with a bounded number of requests in flight
#[derive(Debug, Clone)]
pub struct EnrichmentCoordinator {
    client: TranslationClient,
    max_concurrent: usize,
}

impl EnrichmentCoordinator {
    pub fn new(config: &EnrichmentConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: TranslationClient::new(config.endpoint.clone(), config.timeout)?,
            max_concurrent: config.max_concurrent.max(1),
        })
    }

    /// Enrich every paper; the result has one entry per input, in input order
    pub async fn enrich(&self, papers: Vec<Paper>, progress: &dyn ProgressSink) -> Vec<EnrichedPaper> {
        self.enrich_until(papers, progress, &CancellationToken::new())
            .await
    }

    /// Like [`Self::enrich`], but papers not yet enriched when `cancel` fires
    /// come back without an overlay
    #[instrument(skip_all, fields(papers = papers.len()))]
    pub async fn enrich_until(
        &self,
        papers: Vec<Paper>,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Vec<EnrichedPaper> {
        let total = papers.len();
        let start_time = Instant::now();
        info!("Starting enrichment for {} papers", total);

        if total == 0 {
            progress.report(1.0, "No papers to enrich");
            return Vec::new();
        }

        let mut slots: Vec<Option<EnrichedPaper>> = (0..total).map(|_| None).collect();
        let mut completed = 0;
        let mut enriched_count = 0;

        let mut results = stream::iter(papers.into_iter().enumerate())
            .map(|(index, paper)| async move { (index, self.enrich_one(paper, cancel).await) })
            .buffer_unordered(self.max_concurrent);

        while let Some((index, enriched)) = results.next().await {
            completed += 1;
            if enriched.is_enriched() {
                enriched_count += 1;
            }
            progress.report(
                progress::fraction(completed, total),
                &format!("Enriching paper {completed} of {total}..."),
            );
            slots[index] = Some(enriched);
        }

        info!(
            "Enrichment complete: {} of {} papers enriched in {:?}",
            enriched_count,
            total,
            start_time.elapsed()
        );
        slots.into_iter().flatten().collect()
    }

    async fn enrich_one(&self, paper: Paper, cancel: &CancellationToken) -> EnrichedPaper {
        let Some(url) = paper.url.as_deref().filter(|u| is_http(u)) else {
            debug!("No HTTP URL for '{}', skipping enrichment", paper.title);
            return EnrichedPaper::unenriched(paper);
        };

        let target = normalize_url(url);
        if is_direct_file(&target) {
            debug!("Direct file URL {}, skipping enrichment", target);
            return EnrichedPaper::unenriched(paper);
        }
        if cancel.is_cancelled() {
            return EnrichedPaper::unenriched(paper);
        }

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("Enrichment cancelled for {}", target);
                return EnrichedPaper::unenriched(paper);
            }
            outcome = self.client.translate(&target) => outcome,
        };

        match outcome {
            Ok(Some(item)) => {
                let enriched = EnrichedPaper::new(paper, Some(item));
                info!("Successfully enriched paper: {}", enriched.title());
                enriched
            }
            Ok(None) => EnrichedPaper::unenriched(paper),
            Err(e) => {
                error!("Could not enrich paper from URL {}: {}", target, e);
                EnrichedPaper::unenriched(paper)
            }
        }
    }
}
