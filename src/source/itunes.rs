//! iTunes artist provider

use std::{sync::Arc, time::Duration};

use futures::{StreamExt as _, stream};
use reqwest::Url;

use crate::{
    cache::KeyedTtlCache,
    cl::ProviderName,
    http::{FetchError, HttpClient, LISTING_TIMEOUT, Transport, api_path_url},
    model::{self, ArtistRecord, ReleaseRecord, TrackRecord, parse_release_date},
    source::{
        DEFAULT_LIST_LIMIT, DEFAULT_SEARCH_LIMIT, Provider, clamp_limit, https, numeric_id,
        search_term,
    },
};

/// API root
const API_BASE: &str = "https://itunes.apple.com";

/// Store front used for all requests, keeps results stable
const COUNTRY: &str = "FR";

/// Maximum concurrent artwork lookups
const ARTWORK_CONCURRENCY: usize = 6;

/// Time during which a resolved artist artwork is reused
const ARTWORK_TTL: Duration = Duration::from_mins(30);

/// Default artwork size in pixels
pub(crate) const DEFAULT_ARTWORK_SIZE: u32 = 300;

/// Search or lookup response, items are decoded one by one because result kinds are mixed
#[derive(Debug, serde::Deserialize)]
struct Response {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

impl Response {
    fn items(self) -> impl Iterator<Item = Item> {
        self.results
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
    }
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Item {
    wrapper_type: String,
    kind: String,
    artist_id: u64,
    artist_name: String,
    primary_genre_name: String,
    collection_id: u64,
    collection_name: String,
    collection_type: String,
    collection_view_url: String,
    track_id: u64,
    track_name: String,
    track_view_url: String,
    artwork_url100: String,
    release_date: String,
}

impl Item {
    fn is_artist(&self) -> bool {
        self.artist_id > 0 && !self.artist_name.trim().is_empty()
    }

    fn is_album(&self) -> bool {
        let collection_type = self.collection_type.trim().to_lowercase();
        self.wrapper_type == "collection"
            && (collection_type.is_empty() || collection_type == "album")
            && self.collection_id > 0
            && !self.collection_name.trim().is_empty()
    }

    fn is_song(&self) -> bool {
        self.wrapper_type == "track"
            && self.kind == "song"
            && self.track_id > 0
            && !self.track_name.trim().is_empty()
    }

    fn into_artist(self) -> ArtistRecord {
        let genre = self.primary_genre_name.trim();
        ArtistRecord {
            id: self.artist_id.to_string(),
            meta_line: if genre.is_empty() {
                "Apple artist".to_owned()
            } else {
                genre.to_owned()
            },
            display_name: self.artist_name,
            image_url: String::new(),
            provider: ProviderName::Itunes,
        }
    }

    fn into_release(self) -> ReleaseRecord {
        let kind = self.collection_type.trim().to_lowercase();
        ReleaseRecord {
            id: self.collection_id.to_string(),
            title: self.collection_name,
            release_date: parse_release_date(&self.release_date),
            raw_release_date: self.release_date,
            kind: Some(kind).filter(|k| !k.is_empty()),
            artwork_url: https(&self.artwork_url100),
            external_url: self.collection_view_url,
        }
    }

    fn into_track(self) -> TrackRecord {
        TrackRecord {
            id: self.track_id.to_string(),
            title: self.track_name,
            release_date: parse_release_date(&self.release_date),
            artwork_url: https(&self.artwork_url100),
            external_url: self.track_view_url,
        }
    }
}

/// Rewrite artwork URL ending in `NxNbb.ext` to request a `size` pixels square
fn upscale_artwork(url: &str, size: u32) -> String {
    let url = url.trim();
    if url.is_empty() || size == 0 {
        return String::new();
    }
    let Some((dir, last)) = url.rsplit_once('/') else {
        return url.to_owned();
    };
    match (last.find('x'), last.find("bb.")) {
        (Some(x), Some(bb)) if x > 0 && bb > x => match last.get(bb + 3..) {
            Some(ext) if !ext.is_empty() => format!("{dir}/{size}x{size}bb.{ext}"),
            _ => url.to_owned(),
        },
        _ => url.to_owned(),
    }
}

/// iTunes provider
pub(crate) struct Itunes {
    http: HttpClient,
    /// Artwork URL by artist and size, empty if the artist has none
    artworks: KeyedTtlCache<(u64, u32), String>,
}

impl Itunes {
    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            http: HttpClient::new(transport, "itunes", LISTING_TIMEOUT, None),
            artworks: KeyedTtlCache::new(ARTWORK_TTL),
        }
    }

    /// Lookup items related to an artist
    async fn lookup(
        &self,
        id: u64,
        entity: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Item>, FetchError> {
        let id = id.to_string();
        let limit = limit.to_string();
        let mut params = vec![("id", id.as_str())];
        if let Some(entity) = entity {
            params.extend([
                ("entity", entity),
                ("limit", limit.as_str()),
                ("sort", "recent"),
                ("country", COUNTRY),
            ]);
        }
        let url: Url = api_path_url(API_BASE, &["lookup"], params);
        let response: Response = self.http.get_json(url).await?;
        Ok(response.items().collect())
    }

    /// Get artist artwork from its latest album, upscaled to `size` pixels
    pub(crate) async fn artwork(&self, id: u64, size: u32) -> Result<String, FetchError> {
        let key = (id, size);
        if let Some(url) = self.artworks.get(&key) {
            return Ok(url);
        }
        let url = self
            .lookup(id, Some("album"), 1)
            .await?
            .into_iter()
            .find(|i| i.wrapper_type == "collection" && !i.artwork_url100.trim().is_empty())
            .map(|i| upscale_artwork(&https(&i.artwork_url100), size))
            .unwrap_or_default();
        self.artworks.insert(key, url.clone());
        Ok(url)
    }

    /// Search artists, and fill their picture with their latest album artwork
    pub(crate) async fn search_with_artwork(
        &self,
        query: &str,
        limit: usize,
        size: u32,
    ) -> Result<Vec<ArtistRecord>, FetchError> {
        let size = if size == 0 { DEFAULT_ARTWORK_SIZE } else { size };
        let mut artists = self.search(query, limit).await?;
        artists.truncate(clamp_limit(limit, DEFAULT_SEARCH_LIMIT));
        let artworks: Vec<String> = stream::iter(&artists)
            .map(|a| async move {
                let Ok(id) = a.id.parse() else {
                    return String::new();
                };
                self.artwork(id, size)
                    .await
                    .inspect_err(|err| log::debug!("No artwork for {}: {err}", a.display_name))
                    .unwrap_or_default()
            })
            .buffered(ARTWORK_CONCURRENCY)
            .collect()
            .await;
        for (artist, artwork) in artists.iter_mut().zip(artworks) {
            artist.image_url = artwork;
        }
        Ok(artists)
    }
}

#[async_trait::async_trait]
impl Provider for Itunes {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ArtistRecord>, FetchError> {
        let limit = clamp_limit(limit, DEFAULT_SEARCH_LIMIT).to_string();
        let url = api_path_url(
            API_BASE,
            &["search"],
            [
                ("term", search_term(query)),
                ("media", "music"),
                ("entity", "musicArtist"),
                ("limit", limit.as_str()),
                ("country", COUNTRY),
                ("lang", "en_us"),
            ],
        );
        let response: Response = self.http.get_json(url).await?;
        Ok(response
            .items()
            .filter(Item::is_artist)
            .map(Item::into_artist)
            .collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<ArtistRecord, FetchError> {
        let id = numeric_id(ProviderName::Itunes, id)?;
        self.lookup(id, None, 1)
            .await?
            .into_iter()
            .find(|i| i.artist_id == id && i.is_artist())
            .map(Item::into_artist)
            .ok_or_else(|| FetchError::NotFound(format!("no iTunes artist with id {id}")))
    }

    async fn top_tracks(&self, id: &str, limit: usize) -> Result<Vec<TrackRecord>, FetchError> {
        let id = numeric_id(ProviderName::Itunes, id)?;
        let limit = clamp_limit(limit, DEFAULT_LIST_LIMIT);
        let tracks = self
            .lookup(id, Some("song"), limit)
            .await?
            .into_iter()
            .filter(Item::is_song)
            .map(Item::into_track)
            .collect();
        Ok(model::sort_newest_first(tracks, limit))
    }

    async fn latest_releases(
        &self,
        id: &str,
        limit: usize,
    ) -> Result<Vec<ReleaseRecord>, FetchError> {
        let id = numeric_id(ProviderName::Itunes, id)?;
        let limit = clamp_limit(limit, DEFAULT_LIST_LIMIT);
        let releases = model::merge_by_id(
            self.lookup(id, Some("album"), limit)
                .await?
                .into_iter()
                .filter(Item::is_album)
                .map(Item::into_release),
        );
        Ok(model::sort_newest_first(releases, limit))
    }

    fn name(&self) -> ProviderName {
        ProviderName::Itunes
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Write as _;

    use chrono::NaiveDate;

    use super::*;
    use crate::{
        http::testing::FakeTransport,
        source::tests::{empty_query_sends_default, fake},
    };

    #[test]
    fn upscale() {
        assert_eq!(
            upscale_artwork(
                "https://is1-ssl.mzstatic.com/image/thumb/Music/v4/ab/cd/100x100bb.jpg",
                600
            ),
            "https://is1-ssl.mzstatic.com/image/thumb/Music/v4/ab/cd/600x600bb.jpg"
        );
        assert_eq!(
            upscale_artwork("https://a/b/60x60bb.png", 300),
            "https://a/b/300x300bb.png"
        );
        assert_eq!(upscale_artwork("https://a/b/cover.jpg", 300), "https://a/b/cover.jpg");
        assert_eq!(upscale_artwork("https://a/b/100x100bb.", 300), "https://a/b/100x100bb.");
        assert_eq!(upscale_artwork(" ", 300), "");
    }

    #[tokio::test]
    async fn search_skips_incomplete_hits() {
        let (fake, transport) = fake();
        fake.route(
            "itunes.apple.com/search",
            200,
            r#"{"resultCount": 4, "results": [
                {"wrapperType": "artist", "artistId": 5468295, "artistName": "Daft Punk",
                 "primaryGenreName": "Electronic"},
                {"wrapperType": "artist", "artistId": 0, "artistName": "Broken"},
                {"wrapperType": "artist", "artistId": "oops", "artistName": "Undecodable"},
                {"wrapperType": "artist", "artistId": 7, "artistName": "No Genre"}
            ]}"#,
        );
        let itunes = Itunes::new(transport);
        let artists = itunes.search("daft punk", 0).await.unwrap();
        let names: Vec<_> = artists.iter().map(|a| a.display_name.as_str()).collect();
        assert_eq!(names, ["Daft Punk", "No Genre"]);
        assert_eq!(artists[0].meta_line, "Electronic");
        assert_eq!(artists[1].meta_line, "Apple artist");
        assert_eq!(artists[0].provider, ProviderName::Itunes);

        let request = &fake.requests()[0];
        assert_eq!(request.query_param("country").as_deref(), Some("FR"));
        assert_eq!(request.query_param("entity").as_deref(), Some("musicArtist"));

        empty_query_sends_default(&itunes, &fake, "term").await;
    }

    #[tokio::test]
    async fn get_by_id() {
        let (fake, transport) = fake();
        fake.route(
            "itunes.apple.com/lookup?id=5468295",
            200,
            r#"{"resultCount": 1, "results": [
                {"wrapperType": "artist", "artistId": 5468295, "artistName": "Daft Punk"}]}"#,
        );
        fake.route(
            "itunes.apple.com/lookup?id=1",
            200,
            r#"{"resultCount": 0, "results": []}"#,
        );
        let itunes = Itunes::new(transport);
        assert_eq!(
            itunes.get_by_id("5468295").await.unwrap().display_name,
            "Daft Punk"
        );
        assert!(itunes.get_by_id("1").await.unwrap_err().is_not_found());
        assert!(itunes.get_by_id("x").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn releases_and_tracks() {
        let (fake, transport) = fake();
        fake.route(
            "entity=album",
            200,
            r#"{"results": [
                {"wrapperType": "artist", "artistId": 9, "artistName": "X"},
                {"wrapperType": "collection", "collectionType": "Album", "collectionId": 1,
                 "collectionName": "Old", "releaseDate": "2010-01-01T08:00:00Z",
                 "artworkUrl100": "http://a/1/100x100bb.jpg"},
                {"wrapperType": "collection", "collectionType": "Single", "collectionId": 2,
                 "collectionName": "Single", "releaseDate": "2024-01-01T08:00:00Z"},
                {"wrapperType": "collection", "collectionType": "", "collectionId": 3,
                 "collectionName": "New", "releaseDate": "2020-05-05T07:00:00Z"}
            ]}"#,
        );
        fake.route(
            "entity=song",
            200,
            r#"{"results": [
                {"wrapperType": "track", "kind": "song", "trackId": 11, "trackName": "b",
                 "releaseDate": "2020-05-05T07:00:00Z"},
                {"wrapperType": "track", "kind": "music-video", "trackId": 12, "trackName": "Video"},
                {"wrapperType": "track", "kind": "song", "trackId": 13, "trackName": "A",
                 "releaseDate": "2020-05-05T07:00:00Z"}
            ]}"#,
        );
        let itunes = Itunes::new(transport);

        let releases = itunes.latest_releases("9", 0).await.unwrap();
        let titles: Vec<_> = releases.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["New", "Old"]);
        assert_eq!(releases[1].artwork_url, "https://a/1/100x100bb.jpg");
        assert_eq!(releases[1].kind.as_deref(), Some("album"));
        assert_eq!(releases[0].release_date, NaiveDate::from_ymd_opt(2020, 5, 5));

        let tracks = itunes.top_tracks("9", 0).await.unwrap();
        let titles: Vec<_> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["A", "b"]);
    }

    #[tokio::test]
    async fn artwork_cached() {
        let (fake, transport) = fake();
        fake.route(
            "lookup?id=1&entity=album",
            200,
            r#"{"results": [{"wrapperType": "collection", "collectionId": 4,
                "collectionName": "Y", "artworkUrl100": "http://a/4/100x100bb.jpg"}]}"#,
        );
        fake.route("lookup?id=2&entity=album", 200, r#"{"results": []}"#);
        fake.route_timeout("lookup?id=3&entity=album");
        let itunes = Itunes::new(transport);

        for _ in 0..2 {
            assert_eq!(
                itunes.artwork(1, 600).await.unwrap(),
                "https://a/4/600x600bb.jpg"
            );
            assert_eq!(itunes.artwork(2, 600).await.unwrap(), "");
        }
        assert_eq!(fake.count("lookup?id=1&"), 1);
        assert_eq!(fake.count("lookup?id=2&"), 1);

        for _ in 0..2 {
            assert!(itunes.artwork(3, 600).await.is_err());
        }
        assert_eq!(fake.count("lookup?id=3&"), 2);
    }

    #[tokio::test]
    async fn search_with_artwork() {
        let _ = simple_logger::init_with_env();
        let fake = Arc::new(FakeTransport::with_delay(Duration::from_millis(10)));
        let mut results = String::new();
        for i in 1..=20 {
            if i > 1 {
                results.push(',');
            }
            write!(
                results,
                r#"{{"wrapperType": "artist", "artistId": {i}, "artistName": "Artist {i}"}}"#
            )
            .unwrap();
        }
        fake.route(
            "itunes.apple.com/search",
            200,
            &format!(r#"{{"results": [{results}]}}"#),
        );
        fake.route(
            "lookup?id=1&entity=album",
            200,
            r#"{"results": [{"wrapperType": "collection", "collectionId": 4,
                "collectionName": "Y", "artworkUrl100": "https://a/4/100x100bb.jpg"}]}"#,
        );
        fake.route("entity=album", 200, r#"{"results": []}"#);
        let itunes = Itunes::new(Arc::clone(&fake) as Arc<dyn Transport>);

        let artists = itunes.search_with_artwork("", 15, 0).await.unwrap();
        assert_eq!(artists.len(), 15);
        assert_eq!(artists[0].image_url, "https://a/4/300x300bb.jpg");
        assert!(artists[1..].iter().all(|a| a.image_url.is_empty()));
        assert_eq!(fake.count("entity=album"), 15);
        assert!(fake.max_in_flight() <= ARTWORK_CONCURRENCY);
    }
}
