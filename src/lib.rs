//! Music artist search and enrichment, aggregated from several providers

use std::{
    process::{ExitCode, Termination},
    sync::Arc,
};

use futures::{StreamExt as _, stream};
use itertools::{Either, Itertools as _};

pub use crate::{
    enrich::wikipedia::Summary,
    geo::{
        ConcertLocation, GeocodeResult, LocationQuery, humanize_location_key,
        resolve_location_key,
    },
    http::{FetchError, Method, ReqwestTransport, Request, Response, Transport},
    model::{ArtistRecord, ReleaseRecord, TrackRecord, format_compact, parse_release_date},
    source::groupie::{GroupieArtist, Relation},
    suggest::{Suggestion, SuggestionKind, SuggestionTarget},
};
use crate::{
    cache::{DATASET_TTL, TtlCache},
    cl::{ArtistFilter, Credentials, ProviderName},
    enrich::{lastfm::LastFm, wikipedia::Wikipedia},
    geo::{GeocodeResolver, keys::known_coordinates},
    source::{
        Provider, deezer::Deezer, groupie::Groupie, itunes::Itunes, spotify::Spotify,
    },
    suggest::SuggestionIndex,
};

mod cache;
pub mod cl;
mod enrich;
mod geo;
mod http;
mod model;
mod source;
mod suggest;

/// Maximum concurrent listener count lookups
const LISTENERS_CONCURRENCY: usize = 8;

/// Maximum concurrent concert location geocodings
const GEOCODE_CONCURRENCY: usize = 4;

/// Maximum concert locations geocoded for an artist
const MAX_CONCERT_LOCATIONS: usize = 25;

/// Artist with all its enrichments
#[derive(Debug, Clone, serde::Serialize)]
pub struct ArtistDetail {
    /// Identity
    pub artist: ArtistRecord,
    /// Most popular tracks, newest first
    pub top_tracks: Vec<TrackRecord>,
    /// Latest releases, newest first
    pub releases: Vec<ReleaseRecord>,
    /// Encyclopedia summary
    pub summary: Option<Summary>,
    /// Listener count, 0 if unknown
    pub listeners: u64,
    /// Concert locations (Groupie artists only)
    pub concerts: Vec<ConcertLocation>,
}

/// Entry point owning all provider clients, caches and resolvers
pub struct Aggregator {
    groupie: Groupie,
    spotify: Spotify,
    deezer: Deezer,
    itunes: Itunes,
    lastfm: LastFm,
    wikipedia: Wikipedia,
    geocoder: GeocodeResolver,
    suggestions: TtlCache<Arc<SuggestionIndex>>,
}

impl Aggregator {
    /// Create aggregator sending requests with `reqwest`
    pub fn new(credentials: &Credentials) -> anyhow::Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new()?);
        Ok(Self::with_transport(&transport, credentials))
    }

    /// Create aggregator sending requests with a custom transport
    #[must_use]
    pub fn with_transport(transport: &Arc<dyn Transport>, credentials: &Credentials) -> Self {
        Self {
            groupie: Groupie::new(Arc::clone(transport)),
            spotify: Spotify::new(Arc::clone(transport), credentials),
            deezer: Deezer::new(Arc::clone(transport)),
            itunes: Itunes::new(Arc::clone(transport)),
            lastfm: LastFm::new(
                Arc::clone(transport),
                credentials.lastfm_api_key.as_deref(),
            ),
            wikipedia: Wikipedia::new(Arc::clone(transport)),
            geocoder: GeocodeResolver::new(transport),
            suggestions: TtlCache::new("suggestions", DATASET_TTL),
        }
    }

    fn provider(&self, name: ProviderName) -> &dyn Provider {
        match name {
            ProviderName::Groupie => &self.groupie,
            ProviderName::Spotify => &self.spotify,
            ProviderName::Deezer => &self.deezer,
            ProviderName::Itunes => &self.itunes,
        }
    }

    /// Search artists of a provider, in provider relevance order
    pub async fn search_artists(
        &self,
        provider: ProviderName,
        query: &str,
    ) -> Result<Vec<ArtistRecord>, FetchError> {
        let provider = self.provider(provider);
        let artists = provider.search(query, 0).await?;
        log::debug!(
            "{} search {query:?}: {} artists",
            provider.name(),
            artists.len()
        );
        Ok(artists)
    }

    /// Search Groupie artists by name or member, filtered by creation year and member count
    pub async fn browse_groupie(
        &self,
        query: &str,
        filter: &ArtistFilter,
    ) -> Result<Vec<ArtistRecord>, FetchError> {
        self.groupie.browse(query, filter).await
    }

    /// Search iTunes artists, with latest album artwork as picture.
    ///
    /// A zero `limit` or `size` use defaults.
    pub async fn search_artists_with_artwork(
        &self,
        query: &str,
        limit: usize,
        size: u32,
    ) -> Result<Vec<ArtistRecord>, FetchError> {
        self.itunes.search_with_artwork(query, limit, size).await
    }

    /// Get artist by provider identifier
    pub async fn get_artist(
        &self,
        provider: ProviderName,
        id: &str,
    ) -> Result<ArtistRecord, FetchError> {
        self.provider(provider).get_by_id(id).await
    }

    /// Get most popular tracks of an artist, newest first
    pub async fn get_top_tracks(
        &self,
        provider: ProviderName,
        id: &str,
        limit: usize,
    ) -> Result<Vec<TrackRecord>, FetchError> {
        self.provider(provider).top_tracks(id, limit).await
    }

    /// Get latest releases of an artist, newest first
    pub async fn get_latest_releases(
        &self,
        provider: ProviderName,
        id: &str,
        limit: usize,
    ) -> Result<Vec<ReleaseRecord>, FetchError> {
        self.provider(provider).latest_releases(id, limit).await
    }

    /// Get listener count of an artist by name
    pub async fn get_listener_count(&self, name: &str) -> Result<u64, FetchError> {
        self.lastfm.listeners(name).await
    }

    /// Get listener count of an artist by name, 0 if unknown
    pub async fn listener_count_or_zero(&self, name: &str) -> u64 {
        self.get_listener_count(name)
            .await
            .inspect_err(|err| log::debug!("No listener count for {name:?}: {err}"))
            .unwrap_or(0)
    }

    /// Get listener counts of several artists, in the same order, 0 for unknown ones
    pub async fn listener_counts<S>(&self, names: &[S]) -> Vec<u64>
    where
        S: AsRef<str>,
    {
        stream::iter(names)
            .map(|name| self.listener_count_or_zero(name.as_ref()))
            .buffered(LISTENERS_CONCURRENCY)
            .collect()
            .await
    }

    /// Get encyclopedia summary of an artist
    pub async fn get_summary(&self, title: &str) -> Result<Option<Summary>, FetchError> {
        self.wikipedia.summary(title).await
    }

    /// Get encyclopedia summary of an artist, `None` on any failure
    pub async fn summary_or_none(&self, title: &str) -> Option<Summary> {
        self.get_summary(title)
            .await
            .inspect_err(|err| log::warn!("Failed to get summary for {title:?}: {err}"))
            .ok()
            .flatten()
    }

    /// Geocode a place, restricted to a country if `country` is an ISO 3166 alpha-2 code
    pub async fn resolve_location(
        &self,
        place: &str,
        country: &str,
    ) -> Result<Option<GeocodeResult>, FetchError> {
        self.geocoder.resolve(place, country).await
    }

    /// Geocode a dataset location key, `None` if it can not be located
    async fn geocode_concert_location(
        &self,
        key: &str,
        dates: &[String],
    ) -> Option<ConcertLocation> {
        let query = resolve_location_key(key);
        match self
            .geocoder
            .resolve(&query.place, &query.country_code)
            .await
        {
            Ok(Some(found)) => Some(concert_location(key, (found.lat, found.lng), dates)),
            Ok(None) => {
                log::debug!("Concert location {key:?} not found");
                None
            }
            Err(err) => {
                log::warn!("Failed to geocode concert location {key:?}: {err}");
                None
            }
        }
    }

    /// Locate concerts of a Groupie artist, sorted by label.
    ///
    /// Well known locations are always placed, at most 25 others are geocoded.
    /// Locations that can not be geocoded are skipped.
    pub async fn concert_locations(&self, id: &str) -> Result<Vec<ConcertLocation>, FetchError> {
        let relation = self.groupie.relation_for(id).await?;
        let (mut locations, to_geocode): (Vec<_>, Vec<_>) = relation
            .dates_locations
            .iter()
            .partition_map(|(key, dates)| match known_coordinates(key) {
                Some(coords) => Either::Left(concert_location(key, coords, dates)),
                None => Either::Right((key, dates)),
            });
        if to_geocode.len() > MAX_CONCERT_LOCATIONS {
            log::debug!(
                "Artist {id} has {} unknown concert locations, geocoding {MAX_CONCERT_LOCATIONS}",
                to_geocode.len()
            );
        }
        let geocoded: Vec<_> = stream::iter(to_geocode.into_iter().take(MAX_CONCERT_LOCATIONS))
            .map(|(key, dates)| self.geocode_concert_location(key, dates))
            .buffered(GEOCODE_CONCURRENCY)
            .collect()
            .await;
        locations.extend(geocoded.into_iter().flatten());
        Ok(locations
            .into_iter()
            .sorted_by(|a, b| a.label.cmp(&b.label).then_with(|| a.key.cmp(&b.key)))
            .collect())
    }

    /// Get artist and all its enrichments.
    ///
    /// Only a failure to get the artist itself is an error.
    pub async fn artist_detail(
        &self,
        provider: ProviderName,
        id: &str,
    ) -> Result<ArtistDetail, FetchError> {
        let artist = self.get_artist(provider, id).await?;

        let top_tracks = async {
            self.get_top_tracks(provider, id, 0)
                .await
                .inspect_err(|err| log::warn!("Failed to get top tracks of {artist}: {err}"))
                .unwrap_or_default()
        };
        let releases = async {
            self.get_latest_releases(provider, id, 0)
                .await
                .inspect_err(|err| log::warn!("Failed to get releases of {artist}: {err}"))
                .unwrap_or_default()
        };
        let concerts = async {
            if provider != ProviderName::Groupie {
                return Vec::new();
            }
            self.concert_locations(id)
                .await
                .inspect_err(|err| log::warn!("Failed to get concerts of {artist}: {err}"))
                .unwrap_or_default()
        };
        let (top_tracks, releases, summary, listeners, concerts) = tokio::join!(
            top_tracks,
            releases,
            self.summary_or_none(&artist.display_name),
            self.listener_count_or_zero(&artist.display_name),
            concerts
        );

        Ok(ArtistDetail {
            artist,
            top_tracks,
            releases,
            summary,
            listeners,
            concerts,
        })
    }

    /// Suggest Groupie groups, members and locations matching a partial query
    pub async fn suggest(&self, query: &str) -> Result<Vec<Suggestion>, FetchError> {
        if !suggest::is_searchable(query) {
            return Ok(Vec::new());
        }
        let index = self
            .suggestions
            .get_or_fetch(|| async {
                let artists = self.groupie.artists().await?;
                let relations = self.groupie.relations().await?;
                Ok::<_, FetchError>(Arc::new(SuggestionIndex::build(&artists, &relations)))
            })
            .await?;
        Ok(index.suggest(query))
    }
}

/// Build concert location of a dataset key
fn concert_location(key: &str, (lat, lng): (f64, f64), dates: &[String]) -> ConcertLocation {
    ConcertLocation {
        key: key.to_owned(),
        label: resolve_location_key(key).display_label,
        lat,
        lng,
        dates: dates.to_vec(),
    }
}

/// Status of successful lookup operation
pub enum LookupStatus {
    /// Something was found
    Found,
    /// Nothing was found for given query
    NotFound,
}

impl LookupStatus {
    /// Status for a result that may be empty
    #[must_use]
    pub fn of(found: bool) -> Self {
        if found { Self::Found } else { Self::NotFound }
    }
}

impl Termination for LookupStatus {
    fn report(self) -> ExitCode {
        match self {
            LookupStatus::Found => ExitCode::SUCCESS,
            LookupStatus::NotFound => ExitCode::FAILURE,
        }
    }
}
