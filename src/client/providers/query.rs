//! Boolean query rendering shared by the source adapters.
//!
//! Every source speaks a slightly different dialect, but they all render the
//! same shape: an AND of OR-clauses, one clause per non-empty criterion.

use super::traits::{SearchQuery, YearFilter};
use crate::client::Paper;
use tracing::{debug, warn};

/// Operator spelling for one source's boolean dialect
#[derive(Debug, Clone, Copy)]
pub struct BooleanSyntax {
    pub and: &'static str,
    pub or: &'static str,
}

impl BooleanSyntax {
    pub const WORDS: Self = Self {
        and: " AND ",
        or: " OR ",
    };

    /// Join terms into a single parenthesized OR-clause
    pub fn any_of<I, S>(&self, terms: I) -> Option<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parts: Vec<String> = terms.into_iter().map(|t| t.as_ref().to_string()).collect();
        if parts.is_empty() {
            return None;
        }
        Some(format!("({})", parts.join(self.or)))
    }

    /// Render keyword groups as `(a AND b) OR (c)`
    pub fn keyword_groups<F>(&self, groups: &[Vec<String>], format_term: F) -> Option<String>
    where
        F: Fn(&str) -> String,
    {
        let rendered: Vec<String> = groups
            .iter()
            .filter(|group| !group.is_empty())
            .map(|group| {
                let terms: Vec<String> = group.iter().map(|t| format_term(t.as_str())).collect();
                format!("({})", terms.join(self.and))
            })
            .collect();

        if rendered.is_empty() {
            None
        } else {
            Some(rendered.join(self.or))
        }
    }

    /// Conjoin the non-empty clauses
    #[must_use]
    pub fn all_of(&self, clauses: &[String]) -> String {
        clauses.join(self.and)
    }
}

/// Wrap a term in double quotes, dropping any quotes it already carries
#[must_use]
pub fn quoted(term: &str) -> String {
    format!("\"{}\"", term.replace('"', ""))
}

/// Lower-cased haystack used for client-side keyword checks
#[must_use]
pub fn searchable_text(title: &str, summary: Option<&str>) -> String {
    let mut text = title.to_lowercase();
    if let Some(summary) = summary {
        text.push(' ');
        text.push_str(&summary.to_lowercase());
    }
    text
}

/// Whether any exclusion term occurs in the lower-cased text
#[must_use]
pub fn is_excluded(text_lower: &str, exclusions: &[String]) -> bool {
    exclusions
        .iter()
        .any(|term| text_lower.contains(&term.to_lowercase()))
}

/// Client-side year check; records without a year never pass
#[must_use]
pub fn year_matches(year: Option<i32>, filter: Option<&YearFilter>) -> bool {
    match (year, filter) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(year), Some(filter)) => filter.contains(year),
    }
}

/// Post-filter shared by all adapters: year, exclusions, result cap
pub fn apply_client_filters(papers: Vec<Paper>, query: &SearchQuery, cap: usize) -> Vec<Paper> {
    let before = papers.len();
    let kept: Vec<Paper> = papers
        .into_iter()
        .filter(|p| year_matches(p.year, query.years.as_ref()))
        .filter(|p| {
            let text = searchable_text(&p.title, p.summary.as_deref());
            !is_excluded(&text, &query.exclusion_keywords)
        })
        .take(cap)
        .collect();

    if kept.len() < before {
        debug!("Client-side filters kept {} of {} records", kept.len(), before);
    }
    kept
}

/// Clamp the requested cap to a source's hard per-request ceiling, if it has one
#[must_use]
pub fn clamp_max_results(source: &str, requested: u32, ceiling: Option<u32>) -> u32 {
    let Some(ceiling) = ceiling else {
        return requested;
    };
    if requested > ceiling {
        warn!(
            "{} allows at most {} results per request; clamping requested {}",
            source, ceiling, requested
        );
        ceiling
    } else {
        requested
    }
}

/// Map a user-facing subject area through a source's code table
#[must_use]
pub fn lookup_area(table: &[(&str, &str)], area: &str) -> String {
    let key = area.to_lowercase();
    table
        .iter()
        .find(|(name, _)| *name == key)
        .map_or_else(|| area.to_string(), |(_, code)| (*code).to_string())
}
