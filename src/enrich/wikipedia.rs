//! Wikipedia page summaries

use std::sync::Arc;

use crate::http::{
    FetchError, HttpClient, LOOKUP_TIMEOUT, NO_PARAMS, Transport, api_path_url, api_url,
};

/// Search API endpoint
const SEARCH_URL: &str = "https://en.wikipedia.org/w/api.php";

/// REST summary endpoint, takes page title as last path segment
const SUMMARY_BASE: &str = "https://en.wikipedia.org/api/rest_v1/page/summary";

/// Suffixes appended to the title for the first searches, to avoid people or places with the
/// same name
const QUERY_HINTS: [&str; 3] = ["artist", "band", "music group"];

/// Page title disambiguation hints for musicians
const DISAMBIGUATION_HINTS: [&str; 7] = [
    "band",
    "music group",
    "musical group",
    "singer",
    "musician",
    "rapper",
    "artist",
];

/// Maximum search hits
const SEARCH_LIMIT: &str = "10";

/// Encyclopedia summary of an artist
#[derive(Debug, Clone, Eq, PartialEq, serde::Serialize)]
pub struct Summary {
    /// First paragraph, plain text
    pub extract: String,
    /// Desktop page URL
    pub page_url: String,
}

#[derive(Debug, serde::Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: SearchQuery,
}

#[derive(Debug, Default, serde::Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, serde::Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, serde::Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    extract: String,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, serde::Deserialize)]
struct ContentUrls {
    desktop: Option<PageUrl>,
}

#[derive(Debug, serde::Deserialize)]
struct PageUrl {
    #[serde(default)]
    page: String,
}

/// Pick the page title best matching a search query among search hits.
///
/// An exact (case insensitive) match of the query stripped from its disambiguation hint wins,
/// then a `<base> (<hint>)` title, then the first hit.
pub(crate) fn choose_title<'a, S>(query: &str, titles: &'a [S]) -> Option<&'a str>
where
    S: AsRef<str>,
{
    let lquery = query.trim().to_lowercase();
    let base = DISAMBIGUATION_HINTS
        .iter()
        .find_map(|hint| lquery.strip_suffix(&format!(" {hint}")))
        .unwrap_or(lquery.as_str())
        .trim();
    let hits = || titles.iter().map(S::as_ref);

    hits()
        .find(|t| t.to_lowercase() == base)
        .or_else(|| {
            hits().find(|t| {
                t.to_lowercase()
                    .strip_prefix(base)
                    .and_then(|rest| rest.strip_prefix(" ("))
                    .and_then(|rest| rest.strip_suffix(')'))
                    .is_some_and(|hint| DISAMBIGUATION_HINTS.contains(&hint))
            })
        })
        .or_else(|| hits().next())
}

/// Wikipedia client
pub(crate) struct Wikipedia {
    http: HttpClient,
}

impl Wikipedia {
    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            http: HttpClient::new(transport, "wikipedia", LOOKUP_TIMEOUT, None),
        }
    }

    /// Search page titles
    async fn search(&self, query: &str) -> Result<Vec<String>, FetchError> {
        let url = api_url(
            SEARCH_URL,
            [
                ("srsearch", query),
                ("action", "query"),
                ("list", "search"),
                ("format", "json"),
                ("utf8", "1"),
                ("srlimit", SEARCH_LIMIT),
            ],
        );
        let response: SearchResponse = self.http.get_json(url).await?;
        Ok(response
            .query
            .search
            .into_iter()
            .map(|h| h.title)
            .collect())
    }

    /// Find the page title of an artist, trying music specific searches first
    async fn resolve_title(&self, title: &str) -> Result<Option<String>, FetchError> {
        let queries = QUERY_HINTS
            .iter()
            .map(|hint| format!("{title} {hint}"))
            .chain([title.to_owned()]);
        let mut first_err = None;
        for query in queries {
            match self.search(&query).await {
                Ok(titles) => {
                    if let Some(chosen) = choose_title(&query, &titles) {
                        log::debug!("Wikipedia page for {title:?}: {chosen:?}");
                        return Ok(Some(chosen.to_owned()));
                    }
                }
                Err(err) => {
                    log::debug!("Wikipedia search {query:?} failed: {err}");
                    first_err.get_or_insert(err);
                }
            }
        }
        first_err.map_or(Ok(None), Err)
    }

    /// Get summary of the page best matching an artist name, `None` if there is none usable
    pub(crate) async fn summary(&self, title: &str) -> Result<Option<Summary>, FetchError> {
        let title = title.trim();
        if title.is_empty() {
            return Ok(None);
        }
        let Some(page) = self.resolve_title(title).await? else {
            return Ok(None);
        };

        let url = api_path_url(SUMMARY_BASE, &[&page], NO_PARAMS);
        let response: SummaryResponse = match self.http.get_json(url).await {
            Ok(r) => r,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        let page_url = response
            .content_urls
            .and_then(|u| u.desktop)
            .map(|d| d.page)
            .unwrap_or_default();
        if response.extract.trim().is_empty() || page_url.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(Summary {
            extract: response.extract,
            page_url,
        }))
    }
}
