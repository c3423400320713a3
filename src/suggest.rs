//! Search suggestions from the Groupie dataset

use std::collections::HashSet;

use itertools::Itertools as _;

use crate::{
    geo::humanize_location_key,
    source::{
        groupie::{GroupieArtist, RelationIndex},
        normalize,
    },
};

/// Minimum query length, in chars
const MIN_QUERY_CHARS: usize = 2;

/// Maximum suggestion count
const MAX_SUGGESTIONS: usize = 10;

/// What a suggestion designates, in display order
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    strum::AsRefStr,
    strum::Display,
    serde::Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[expect(missing_docs)]
pub enum SuggestionKind {
    Group,
    Member,
    Location,
}

/// Search field a suggestion fills
#[derive(Debug, Copy, Clone, Eq, PartialEq, strum::Display, serde::Serialize)]
pub enum SuggestionTarget {
    /// Free text query
    #[strum(serialize = "q")]
    #[serde(rename = "q")]
    Query,
    /// Location filter
    #[strum(serialize = "location")]
    #[serde(rename = "location")]
    Location,
}

/// Search suggestion
#[derive(Debug, Clone, Eq, PartialEq, serde::Serialize)]
pub struct Suggestion {
    /// Kind
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    /// Displayed text
    pub label: String,
    /// Value to fill the target with
    pub value: String,
    /// Field to fill
    pub target: SuggestionTarget,
}

#[derive(Debug, Clone)]
struct Item {
    suggestion: Suggestion,
    /// Normalized label
    norm: String,
}

/// Return true if a query is long enough to get suggestions
pub(crate) fn is_searchable(query: &str) -> bool {
    query.trim().chars().count() >= MIN_QUERY_CHARS
}

/// All suggestion candidates of the dataset
#[derive(Debug, Clone, Default)]
pub(crate) struct SuggestionIndex {
    items: Vec<Item>,
}

impl SuggestionIndex {
    /// Build index from groups, members and concert locations
    pub(crate) fn build(artists: &[GroupieArtist], relations: &RelationIndex) -> Self {
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        let mut add = |kind, label: &str, target| {
            let label = label.trim();
            let norm = normalize(label);
            if norm.is_empty() || !seen.insert((kind, norm.clone())) {
                return;
            }
            items.push(Item {
                suggestion: Suggestion {
                    kind,
                    label: label.to_owned(),
                    value: label.to_owned(),
                    target,
                },
                norm,
            });
        };

        for artist in artists {
            add(SuggestionKind::Group, &artist.name, SuggestionTarget::Query);
            for member in &artist.members {
                add(SuggestionKind::Member, member, SuggestionTarget::Query);
            }
        }
        for key in relations.index.iter().flat_map(|r| r.dates_locations.keys()) {
            let label = humanize_location_key(key);
            let label = if label.trim().is_empty() { key } else { &label };
            add(SuggestionKind::Location, label, SuggestionTarget::Location);
        }

        items.sort_by_cached_key(|i| (i.suggestion.kind, i.suggestion.label.to_lowercase()));
        log::debug!("Built suggestion index with {} items", items.len());
        Self { items }
    }

    /// Suggest up to 10 items containing the query, prefix matches first, then word prefix
    /// matches, then the others
    pub(crate) fn suggest(&self, query: &str) -> Vec<Suggestion> {
        if !is_searchable(query) {
            return Vec::new();
        }
        let nquery = normalize(query);
        if nquery.is_empty() {
            return Vec::new();
        }
        let word_prefix = format!(" {nquery}");

        self.items
            .iter()
            .filter(|i| i.norm.contains(&nquery))
            .map(|i| {
                let score = if i.norm.starts_with(&nquery) {
                    0
                } else if i.norm.contains(&word_prefix) {
                    1
                } else {
                    2
                };
                (score, i.suggestion.kind, i.suggestion.label.to_lowercase(), i)
            })
            .sorted_by(|a, b| (a.0, a.1, &a.2).cmp(&(b.0, b.1, &b.2)))
            .unique_by(|(_, kind, label, _)| (*kind, label.clone()))
            .take(MAX_SUGGESTIONS)
            .map(|(_, _, _, i)| i.suggestion.clone())
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}
