//! Artist providers

pub(crate) mod deezer;
pub(crate) mod groupie;
pub(crate) mod itunes;
pub(crate) mod spotify;
pub(crate) mod token;

use crate::{
    cl::ProviderName,
    http::FetchError,
    model::{ArtistRecord, ReleaseRecord, TrackRecord},
};

/// Query sent instead of an empty one, upstream search endpoints reject empty terms
pub(crate) const DEFAULT_QUERY: &str = "a";

/// Default artist count for searches
pub(crate) const DEFAULT_SEARCH_LIMIT: usize = 30;
/// Default track or release count
pub(crate) const DEFAULT_LIST_LIMIT: usize = 10;
/// Upper bound for all limits
pub(crate) const MAX_LIMIT: usize = 50;

/// Artist data source
#[async_trait::async_trait]
pub(crate) trait Provider: Sync + Send {
    /// Search artists, in provider relevance order
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ArtistRecord>, FetchError>;

    /// Get artist by provider identifier
    async fn get_by_id(&self, id: &str) -> Result<ArtistRecord, FetchError>;

    /// Get most popular tracks, newest first when the provider dates them
    async fn top_tracks(&self, id: &str, limit: usize) -> Result<Vec<TrackRecord>, FetchError>;

    /// Get latest releases, newest first
    async fn latest_releases(
        &self,
        id: &str,
        limit: usize,
    ) -> Result<Vec<ReleaseRecord>, FetchError>;

    /// Provider name
    fn name(&self) -> ProviderName;
}

/// Search term to send upstream
pub(crate) fn search_term(query: &str) -> &str {
    let query = query.trim();
    if query.is_empty() {
        DEFAULT_QUERY
    } else {
        query
    }
}

/// Clamp a limit to `1..=MAX_LIMIT`, 0 meaning `default`
pub(crate) fn clamp_limit(limit: usize, default: usize) -> usize {
    if limit == 0 {
        default
    } else {
        limit.min(MAX_LIMIT)
    }
}

/// Parse a numeric identifier, anything else can not exist upstream
pub(crate) fn numeric_id(provider: ProviderName, id: &str) -> Result<u64, FetchError> {
    id.trim()
        .parse::<u64>()
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| FetchError::NotFound(format!("invalid {provider} artist id {id:?}")))
}

/// Normalize string by converting to lowercase, replacing accentuated chars and collapsing
/// whitespace
pub(crate) fn normalize<S>(s: S) -> String
where
    S: AsRef<str>,
{
    let folded: String = s
        .as_ref()
        .chars()
        .flat_map(|oc| {
            let mut nc = None;
            unicode_normalization::char::decompose_canonical(oc, |c| {
                nc.get_or_insert(c);
            });
            nc.unwrap_or(oc).to_lowercase()
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace `http://` scheme with `https://`
pub(crate) fn https(url: &str) -> String {
    let url = url.trim();
    match url.strip_prefix("http://") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_owned(),
    }
}

/// Return first non empty string
pub(crate) fn first_non_empty<'a, I>(candidates: I) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_owned()
}
