use crate::client::Paper;
use crate::tools::dedup::DuplicateGroup;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// Picks one paper per duplicate group from an ordered source preference list
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    preferences: Vec<String>,
}

impl ConflictResolver {
    #[must_use]
    pub fn new(preferences: Vec<String>) -> Self {
        Self { preferences }
    }

    #[must_use]
    pub fn preferences(&self) -> &[String] {
        &self.preferences
    }

    /// First member from the most preferred source, if any member's source is listed
    #[must_use]
    pub fn auto_resolve<'a>(&self, group: &'a DuplicateGroup) -> Option<&'a Paper> {
        self.preferences.iter().find_map(|preferred| {
            group
                .papers
                .iter()
                .find(|paper| paper.source.eq_ignore_ascii_case(preferred))
        })
    }

    /// Resolve singletons and preference matches; everything else is left for the caller
    #[must_use]
    pub fn resolve(&self, groups: Vec<DuplicateGroup>) -> Resolution {
        let mut resolved = Vec::with_capacity(groups.len());
        let mut unresolved = Vec::new();

        for group in groups {
            if !group.is_conflict() {
                resolved.extend(group.papers);
                continue;
            }
            match self.auto_resolve(&group) {
                Some(paper) => {
                    debug!("Auto-resolved '{}' to {}", group.key, paper.source);
                    resolved.push(paper.clone());
                }
                None => unresolved.push(group),
            }
        }

        info!(
            "{} papers resolved, {} conflicts need a manual choice",
            resolved.len(),
            unresolved.len()
        );
        Resolution {
            resolved,
            unresolved,
        }
    }
}

/// Outcome of automatic conflict resolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub resolved: Vec<Paper>,
    pub unresolved: Vec<DuplicateGroup>,
}

impl Resolution {
    /// Groups awaiting a manual choice
    #[must_use]
    pub fn conflicts(&self) -> &[DuplicateGroup] {
        &self.unresolved
    }

    /// Choose the first candidate of every remaining conflict
    #[must_use]
    pub fn first_choices(&self) -> HashMap<String, usize> {
        self.unresolved.iter().map(|g| (g.key.clone(), 0)).collect()
    }

    /// Merge one chosen candidate per conflict into the unique paper list
    ///
    /// `choices` must name every unresolved key exactly once, with an index
    /// into that group's candidates.
    pub fn finalize(self, choices: &HashMap<String, usize>) -> Result<Vec<Paper>> {
        if let Some(unknown) = choices
            .keys()
            .find(|key| !self.unresolved.iter().any(|g| &g.key == *key))
        {
            return Err(Error::invalid_input(
                "choices",
                format!("'{unknown}' is not an unresolved conflict"),
            ));
        }

        let mut papers = self.resolved;
        for group in self.unresolved {
            let Some(&choice) = choices.get(&group.key) else {
                return Err(Error::invalid_input(
                    "choices",
                    format!("no choice given for '{}'", group.key),
                ));
            };
            let candidates = group.papers.len();
            let Some(paper) = group.papers.into_iter().nth(choice) else {
                return Err(Error::invalid_input(
                    "choices",
                    format!(
                        "choice {choice} for '{}' is out of range ({candidates} candidates)",
                        group.key
                    ),
                ));
            };
            papers.push(paper);
        }
        Ok(papers)
    }
}
