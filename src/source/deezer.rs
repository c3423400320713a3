//! Deezer artist provider

use std::sync::Arc;

use futures::{StreamExt as _, stream};
use reqwest::Url;

use crate::{
    cl::ProviderName,
    http::{
        self, FetchError, HttpClient, LISTING_TIMEOUT, NO_PARAMS, Transport, api_path_url,
    },
    model::{
        self, ArtistRecord, ReleaseRecord, TrackRecord, format_compact, parse_release_date,
    },
    source::{
        DEFAULT_LIST_LIMIT, DEFAULT_SEARCH_LIMIT, MAX_LIMIT, Provider, clamp_limit,
        first_non_empty, numeric_id, search_term,
    },
};

/// API root
const API_BASE: &str = "https://api.deezer.com";

/// Album listing filters, the unfiltered listing is required, the others are best effort
const RECORD_TYPES: [Option<&str>; 4] = [None, Some("single"), Some("ep"), Some("album")];

/// Maximum concurrent album lookups when completing release dates
const HYDRATION_CONCURRENCY: usize = 6;

/// Error code sent when the requested object does not exist
const NO_DATA_ERROR_CODE: i64 = 800;

#[derive(Debug, serde::Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiError>,
}

#[derive(Debug, serde::Deserialize)]
struct ApiError {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: i64,
}

#[derive(Debug, serde::Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, serde::Deserialize)]
struct Artist {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    name: String,
    picture: Option<String>,
    picture_medium: Option<String>,
    picture_big: Option<String>,
    picture_xl: Option<String>,
    #[serde(default)]
    nb_album: u64,
    #[serde(default)]
    nb_fan: u64,
}

impl Artist {
    fn into_record(self) -> ArtistRecord {
        let meta_line = if self.nb_fan > 0 {
            format!("{} fans", format_compact(self.nb_fan))
        } else if self.nb_album > 0 {
            format!("{} albums", self.nb_album)
        } else {
            "Deezer artist".to_owned()
        };
        ArtistRecord {
            id: self.id.to_string(),
            image_url: first_non_empty([
                self.picture_xl.as_deref(),
                self.picture_big.as_deref(),
                self.picture_medium.as_deref(),
                self.picture.as_deref(),
            ]),
            display_name: self.name,
            meta_line,
            provider: ProviderName::Deezer,
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
struct Covers {
    cover: Option<String>,
    cover_medium: Option<String>,
    cover_big: Option<String>,
    cover_xl: Option<String>,
}

impl Covers {
    fn best(&self) -> String {
        first_non_empty([
            self.cover_xl.as_deref(),
            self.cover_big.as_deref(),
            self.cover_medium.as_deref(),
            self.cover.as_deref(),
        ])
    }
}

#[derive(Debug, serde::Deserialize)]
struct Album {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    record_type: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    release_date: String,
    #[serde(flatten)]
    covers: Covers,
}

impl Album {
    fn into_record(self) -> ReleaseRecord {
        ReleaseRecord {
            id: self.id.to_string(),
            release_date: parse_release_date(&self.release_date),
            raw_release_date: self.release_date,
            kind: Some(self.record_type.to_lowercase()).filter(|k| !k.is_empty()),
            artwork_url: self.covers.best(),
            title: self.title,
            external_url: self.link,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct Track {
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    album: Covers,
}

/// Deezer provider
pub(crate) struct Deezer {
    http: HttpClient,
}

impl Deezer {
    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            http: HttpClient::new(transport, "deezer", LISTING_TIMEOUT, None),
        }
    }

    /// GET URL, and parse response unless it is an error envelope
    async fn get_json<R>(&self, url: Url) -> Result<R, FetchError>
    where
        R: serde::de::DeserializeOwned,
    {
        let data = self.http.fetch(self.http.get(url.clone())).await?;
        check_envelope(&data)?;
        http::decode(&url, &data)
    }

    /// List albums with an optional record type filter
    async fn albums_page(
        &self,
        id: u64,
        record_type: Option<&str>,
    ) -> Result<Vec<ReleaseRecord>, FetchError> {
        let id = id.to_string();
        let limit = MAX_LIMIT.to_string();
        let mut params = vec![("limit", limit.as_str())];
        if let Some(record_type) = record_type {
            params.push(("type", record_type));
        }
        let url = api_path_url(API_BASE, &["artist", &id, "albums"], params);
        let response: ListResponse<Album> = self.get_json(url).await?;
        Ok(response
            .data
            .into_iter()
            .filter(|a| a.id > 0)
            .map(Album::into_record)
            .collect())
    }

    /// Fill release date and missing metadata from the full album
    async fn hydrate(&self, mut release: ReleaseRecord) -> ReleaseRecord {
        let url = api_path_url(API_BASE, &["album", &release.id], NO_PARAMS);
        let album: Album = match self.get_json(url).await {
            Ok(album) => album,
            Err(err) => {
                log::debug!("Failed to get Deezer album {}: {err}", release.id);
                return release;
            }
        };
        if album.id == 0 {
            return release;
        }
        let full = album.into_record();
        if full.release_date.is_some() {
            release.release_date = full.release_date;
            release.raw_release_date = full.raw_release_date;
        }
        if release.kind.is_none() {
            release.kind = full.kind;
        }
        if release.artwork_url.is_empty() {
            release.artwork_url = full.artwork_url;
        }
        if release.external_url.is_empty() {
            release.external_url = full.external_url;
        }
        if release.title.is_empty() {
            release.title = full.title;
        }
        release
    }
}

/// Fail if body is a Deezer error envelope, which is sent with a 200 status
fn check_envelope(data: &[u8]) -> Result<(), FetchError> {
    let Ok(ErrorEnvelope { error: Some(error) }) = serde_json::from_slice::<ErrorEnvelope>(data)
    else {
        return Ok(());
    };
    let message = error.message.trim();
    let message = if message.is_empty() {
        "unknown error"
    } else {
        message
    };
    let description = format!("Deezer error {} ({}): {message}", error.code, error.kind);
    if error.code == NO_DATA_ERROR_CODE
        || message.to_lowercase().contains("no data")
        || http::body_means_not_found(message.as_bytes())
    {
        Err(FetchError::NotFound(description))
    } else {
        Err(FetchError::Upstream(description))
    }
}

/// Count of albums to look up for `want` releases
fn hydration_candidates(want: usize, available: usize) -> usize {
    (want * 6).clamp(30, MAX_LIMIT).max(want).min(available)
}

#[async_trait::async_trait]
impl Provider for Deezer {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ArtistRecord>, FetchError> {
        let limit = clamp_limit(limit, DEFAULT_SEARCH_LIMIT).to_string();
        let url = api_path_url(
            API_BASE,
            &["search", "artist"],
            [("q", search_term(query)), ("limit", limit.as_str())],
        );
        let response: ListResponse<Artist> = self.get_json(url).await?;
        Ok(response
            .data
            .into_iter()
            .filter(|a| a.id > 0)
            .map(Artist::into_record)
            .collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<ArtistRecord, FetchError> {
        let id = numeric_id(ProviderName::Deezer, id)?.to_string();
        let url = api_path_url(API_BASE, &["artist", &id], NO_PARAMS);
        let artist: Artist = self.get_json(url).await?;
        if artist.id == 0 {
            return Err(FetchError::NotFound(format!("no Deezer artist with id {id}")));
        }
        Ok(artist.into_record())
    }

    async fn top_tracks(&self, id: &str, limit: usize) -> Result<Vec<TrackRecord>, FetchError> {
        let id = numeric_id(ProviderName::Deezer, id)?.to_string();
        let limit = clamp_limit(limit, DEFAULT_LIST_LIMIT);
        let url = api_path_url(
            API_BASE,
            &["artist", &id, "top"],
            [("limit", limit.to_string())],
        );
        let response: ListResponse<Track> = self.get_json(url).await?;
        // top track payloads carry no release date, keep the popularity order
        Ok(response
            .data
            .into_iter()
            .take(limit)
            .map(|t| TrackRecord {
                id: t.id.to_string(),
                title: t.title,
                release_date: None,
                artwork_url: t.album.best(),
                external_url: t.link,
            })
            .collect())
    }

    async fn latest_releases(
        &self,
        id: &str,
        limit: usize,
    ) -> Result<Vec<ReleaseRecord>, FetchError> {
        let id = numeric_id(ProviderName::Deezer, id)?;
        let want = clamp_limit(limit, DEFAULT_LIST_LIMIT);

        let mut listed = Vec::new();
        for record_type in RECORD_TYPES {
            match self.albums_page(id, record_type).await {
                Ok(page) => listed.extend(page),
                Err(err) if record_type.is_none() => return Err(err),
                Err(err) => {
                    log::debug!("Ignoring Deezer {record_type:?} album listing failure: {err}");
                }
            }
        }
        let mut merged = model::merge_by_id(listed);
        merged.truncate(hydration_candidates(want, merged.len()));

        let hydrated: Vec<_> = stream::iter(merged)
            .map(|r| self.hydrate(r))
            .buffered(HYDRATION_CONCURRENCY)
            .collect()
            .await;
        Ok(model::sort_newest_first(hydrated, want))
    }

    fn name(&self) -> ProviderName {
        ProviderName::Deezer
    }
}
