//! Last.fm listener counts

// See https://www.last.fm/api/show/artist.getInfo

use std::sync::Arc;

use crate::http::{FetchError, HttpClient, LOOKUP_TIMEOUT, Transport, api_url};

/// API endpoint
const API_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// Error code for unknown artists
const ARTIST_NOT_FOUND_CODE: u32 = 6;

#[derive(Debug, serde::Deserialize)]
struct Response {
    #[serde(default)]
    error: Option<u32>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    artist: Option<ResponseArtist>,
}

#[derive(Debug, serde::Deserialize)]
struct ResponseArtist {
    #[serde(default)]
    stats: ResponseStats,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ResponseStats {
    /// Sent as a string
    #[serde(default)]
    listeners: String,
}

/// Last.fm client
pub(crate) struct LastFm {
    http: HttpClient,
    api_key: Option<String>,
}

impl LastFm {
    /// Create client, a blank API key counts as missing
    pub(crate) fn new(transport: Arc<dyn Transport>, api_key: Option<&str>) -> Self {
        Self {
            http: HttpClient::new(transport, "lastfm", LOOKUP_TIMEOUT, None),
            api_key: api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(ToOwned::to_owned),
        }
    }

    /// Get listener count of an artist by name
    pub(crate) async fn listeners(&self, name: &str) -> Result<u64, FetchError> {
        let Some(api_key) = &self.api_key else {
            return Err(FetchError::Config("LASTFM_API_KEY is required"));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(FetchError::NotFound("empty artist name".to_owned()));
        }

        let url = api_url(
            API_URL,
            [
                ("method", "artist.getInfo"),
                ("artist", name),
                ("api_key", api_key.as_str()),
                ("format", "json"),
            ],
        );
        let response: Response = self.http.get_json(url).await?;
        match response.error {
            Some(ARTIST_NOT_FOUND_CODE) => {
                return Err(FetchError::NotFound(format!(
                    "unknown Last.fm artist {name:?}"
                )));
            }
            Some(code) => {
                return Err(FetchError::Upstream(format!(
                    "Last.fm error {code}: {}",
                    response.message
                )));
            }
            None => {}
        }

        let listeners = response
            .artist
            .map(|a| a.stats.listeners)
            .unwrap_or_default();
        let listeners = listeners.trim();
        if listeners.is_empty() {
            return Err(FetchError::Upstream(format!(
                "no listener count for {name:?}"
            )));
        }
        listeners.parse().map_err(|_| {
            FetchError::Upstream(format!("invalid listener count {listeners:?} for {name:?}"))
        })
    }
}
