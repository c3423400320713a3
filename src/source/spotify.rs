//! Spotify artist provider

use std::sync::Arc;

use reqwest::Url;

use crate::{
    cl::{Credentials, ProviderName},
    http::{FetchError, HttpClient, LISTING_TIMEOUT, NO_PARAMS, Transport, api_path_url},
    model::{
        self, ArtistRecord, ReleaseRecord, TrackRecord, format_compact, parse_release_date,
    },
    source::{
        DEFAULT_LIST_LIMIT, DEFAULT_SEARCH_LIMIT, MAX_LIMIT, Provider, clamp_limit,
        first_non_empty, search_term, token::TokenManager,
    },
};

/// Web API root
const API_BASE: &str = "https://api.spotify.com/v1";

#[derive(Debug, serde::Deserialize)]
struct Image {
    url: String,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ExternalUrls {
    #[serde(default)]
    spotify: String,
}

#[derive(Debug, serde::Deserialize)]
struct Followers {
    #[serde(default)]
    total: u64,
}

#[derive(Debug, serde::Deserialize)]
struct Artist {
    id: String,
    name: String,
    #[serde(default)]
    images: Vec<Image>,
    #[serde(default)]
    genres: Vec<String>,
    followers: Option<Followers>,
}

impl Artist {
    fn into_record(self) -> ArtistRecord {
        let followers = self.followers.map_or(0, |f| f.total);
        let meta_line = if followers > 0 {
            format!("{} followers", format_compact(followers))
        } else {
            self.genres
                .into_iter()
                .find(|g| !g.trim().is_empty())
                .unwrap_or_else(|| "Spotify artist".to_owned())
        };
        ArtistRecord {
            image_url: first_non_empty(self.images.iter().map(|i| Some(i.url.as_str()))),
            id: self.id,
            display_name: self.name,
            meta_line,
            provider: ProviderName::Spotify,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct SearchResponse {
    artists: Page<Artist>,
}

#[derive(Debug, serde::Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, serde::Deserialize)]
struct Album {
    id: String,
    name: String,
    #[serde(default)]
    album_type: String,
    #[serde(default)]
    release_date: String,
    #[serde(default)]
    images: Vec<Image>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

impl Album {
    fn artwork_url(&self) -> String {
        first_non_empty(self.images.iter().map(|i| Some(i.url.as_str())))
    }

    fn into_record(self) -> ReleaseRecord {
        ReleaseRecord {
            artwork_url: self.artwork_url(),
            release_date: parse_release_date(&self.release_date),
            kind: Some(self.album_type.to_lowercase()).filter(|k| !k.is_empty()),
            id: self.id,
            title: self.name,
            raw_release_date: self.release_date,
            external_url: self.external_urls.spotify,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct Track {
    id: String,
    name: String,
    album: Album,
    #[serde(default)]
    external_urls: ExternalUrls,
}

impl Track {
    fn into_record(self) -> TrackRecord {
        TrackRecord {
            release_date: parse_release_date(&self.album.release_date),
            artwork_url: self.album.artwork_url(),
            id: self.id,
            title: self.name,
            external_url: self.external_urls.spotify,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct TopTracksResponse {
    #[serde(default)]
    tracks: Vec<Track>,
}

/// Spotify provider
pub(crate) struct Spotify {
    http: HttpClient,
    tokens: TokenManager,
}

impl Spotify {
    pub(crate) fn new(transport: Arc<dyn Transport>, credentials: &Credentials) -> Self {
        Self {
            tokens: TokenManager::new(
                Arc::clone(&transport),
                credentials.spotify_client_id.as_deref(),
                credentials.spotify_client_secret.as_deref(),
            ),
            http: HttpClient::new(transport, "spotify", LISTING_TIMEOUT, None),
        }
    }

    /// GET URL with bearer token and parse response
    async fn get_json<R>(&self, url: Url) -> Result<R, FetchError>
    where
        R: serde::de::DeserializeOwned,
    {
        let token = self.tokens.token().await?;
        let request = self.http.get(url).bearer(&token);
        self.http.send_json(request).await
    }

    #[cfg(test)]
    pub(crate) fn tokens(&self) -> &TokenManager {
        &self.tokens
    }
}

/// Check artist identifier, Spotify uses base 62 identifiers
fn artist_id(id: &str) -> Result<&str, FetchError> {
    let id = id.trim();
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(id)
    } else {
        Err(FetchError::NotFound(format!("invalid Spotify artist id {id:?}")))
    }
}

#[async_trait::async_trait]
impl Provider for Spotify {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ArtistRecord>, FetchError> {
        let limit = clamp_limit(limit, DEFAULT_SEARCH_LIMIT).to_string();
        let url = api_path_url(
            API_BASE,
            &["search"],
            [
                ("q", search_term(query)),
                ("type", "artist"),
                ("limit", limit.as_str()),
            ],
        );
        let response: SearchResponse = self.get_json(url).await?;
        log::debug!("Spotify search returned {} artists", response.artists.items.len());
        Ok(response
            .artists
            .items
            .into_iter()
            .map(Artist::into_record)
            .collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<ArtistRecord, FetchError> {
        let id = artist_id(id)?;
        let url = api_path_url(API_BASE, &["artists", id], NO_PARAMS);
        let artist: Artist = self.get_json(url).await?;
        Ok(artist.into_record())
    }

    async fn top_tracks(&self, id: &str, limit: usize) -> Result<Vec<TrackRecord>, FetchError> {
        let id = artist_id(id)?;
        let url = api_path_url(API_BASE, &["artists", id, "top-tracks"], [("market", "US")]);
        let response: TopTracksResponse = self.get_json(url).await?;
        let tracks = response
            .tracks
            .into_iter()
            .map(Track::into_record)
            .collect();
        Ok(model::sort_newest_first(
            tracks,
            clamp_limit(limit, DEFAULT_LIST_LIMIT),
        ))
    }

    async fn latest_releases(
        &self,
        id: &str,
        limit: usize,
    ) -> Result<Vec<ReleaseRecord>, FetchError> {
        let id = artist_id(id)?;
        let url = api_path_url(
            API_BASE,
            &["artists", id, "albums"],
            [
                ("include_groups", "album,single"),
                ("limit", MAX_LIMIT.to_string().as_str()),
            ],
        );
        let response: Page<Album> = self.get_json(url).await?;
        let releases = model::merge_by_id(response.items.into_iter().map(Album::into_record));
        Ok(model::sort_newest_first(
            releases,
            clamp_limit(limit, DEFAULT_LIST_LIMIT),
        ))
    }

    fn name(&self) -> ProviderName {
        ProviderName::Spotify
    }
}
