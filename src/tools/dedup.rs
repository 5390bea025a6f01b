use crate::client::Paper;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;

static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Canonical grouping key for a title
///
/// Lower-cases, strips everything that is neither a word character nor
/// whitespace, collapses whitespace runs and trims. Titles that differ only
/// in case, punctuation or spacing map to the same key.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped = NON_WORD_RE.replace_all(&lowered, "");
    WHITESPACE_RE.replace_all(&stripped, " ").trim().to_string()
}

/// Papers from any source that share a normalized title
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub key: String,
    /// Members in first-seen order
    pub papers: Vec<Paper>,
}

impl DuplicateGroup {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.papers.len() > 1
    }
}

/// Group papers by normalized title, keeping first-seen order of groups and members
#[must_use]
pub fn group_by_title(papers: Vec<Paper>) -> Vec<DuplicateGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<DuplicateGroup> = Vec::new();

    for paper in papers {
        let key = normalize_title(&paper.title);
        match index.get(&key) {
            Some(&slot) => groups[slot].papers.push(paper),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(DuplicateGroup {
                    key,
                    papers: vec![paper],
                });
            }
        }
    }
    groups
}
