//! Place geocoding

pub(crate) mod fuzzy;
pub(crate) mod keys;
pub(crate) mod provider;

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

pub use self::keys::{LocationQuery, humanize_location_key, resolve_location_key};
use self::{
    fuzzy::normalize_us_state,
    provider::{Geocoder, NOMINATIM_RATE_LIMIT, Nominatim, OpenMeteo},
};
use crate::http::{FetchError, RateLimit, Transport};

/// Coordinates of a place
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct GeocodeResult {
    /// Latitude
    pub lat: f64,
    /// Longitude
    pub lng: f64,
    /// Upstream label of the place
    pub display_label: String,
}

/// Geocoded concert location of an artist
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ConcertLocation {
    /// Dataset location key
    pub key: String,
    /// Human readable label
    pub label: String,
    /// Latitude
    pub lat: f64,
    /// Longitude
    pub lng: f64,
    /// Concert dates, as in the dataset
    pub dates: Vec<String>,
}

/// Resolve places with several geocoders, remembering all outcomes for the process lifetime
pub(crate) struct GeocodeResolver {
    open_meteo: Box<dyn Geocoder>,
    nominatim: Box<dyn Geocoder>,
    /// Outcome by `lower(place)|UPPER(country)`, `None` if the place was not found
    cache: RwLock<HashMap<String, Option<GeocodeResult>>>,
}

/// Geocoding attempt outcome, keeping the first hard failure
#[derive(Default)]
struct Attempts {
    first_err: Option<FetchError>,
}

impl Attempts {
    fn record(
        &mut self,
        result: Result<Option<GeocodeResult>, FetchError>,
    ) -> Option<GeocodeResult> {
        match result {
            Ok(found) => found,
            Err(err) if err.is_not_found() => None,
            Err(err) => {
                log::debug!("Geocoding attempt failed: {err}");
                self.first_err.get_or_insert(err);
                None
            }
        }
    }
}

impl GeocodeResolver {
    pub(crate) fn new(transport: &Arc<dyn Transport>) -> Self {
        Self::with_nominatim_rate_limit(transport, Some(&NOMINATIM_RATE_LIMIT))
    }

    pub(crate) fn with_nominatim_rate_limit(
        transport: &Arc<dyn Transport>,
        rate_limit: Option<&RateLimit>,
    ) -> Self {
        Self {
            open_meteo: Box::new(OpenMeteo::new(Arc::clone(transport))),
            nominatim: Box::new(Nominatim::new(Arc::clone(transport), rate_limit)),
            cache: RwLock::default(),
        }
    }

    /// Geocode a place, restricted to a country if `country` is an ISO 3166 alpha-2 code.
    ///
    /// Outcomes are cached only if every attempted upstream answered.
    pub(crate) async fn resolve(
        &self,
        place: &str,
        country: &str,
    ) -> Result<Option<GeocodeResult>, FetchError> {
        let place = place.trim();
        if place.is_empty() {
            return Ok(None);
        }
        let country = country.trim().to_uppercase();
        let key = format!("{}|{country}", place.to_lowercase());
        if let Some(hit) = self.cache.read().get(&key) {
            log::trace!("Geocoding cache hit for {key:?}");
            return Ok(hit.clone());
        }

        let outcome = self.lookup(place, &country).await?;
        match &outcome {
            Some(found) => log::debug!(
                "Geocoded {place:?} ({country}) to {:.4},{:.4} {:?}",
                found.lat,
                found.lng,
                found.display_label
            ),
            None => log::debug!("No geocoding match for {place:?} ({country})"),
        }
        self.cache.write().insert(key, outcome.clone());
        Ok(outcome)
    }

    async fn lookup(
        &self,
        place: &str,
        country: &str,
    ) -> Result<Option<GeocodeResult>, FetchError> {
        let mut attempts = Attempts::default();

        // city focused geocoders handle states poorly
        let state = if country == "US" {
            normalize_us_state(place)
        } else {
            None
        };
        if let Some(state) = &state
            && let Some(found) = attempts.record(self.nominatim.geocode(state, country).await)
        {
            return Ok(Some(found));
        }

        if let Some(found) = self.lookup_all(place, country, &mut attempts).await {
            return Ok(Some(found));
        }

        if let Some(state) = state.filter(|s| !s.eq_ignore_ascii_case(place))
            && let Some(found) = self.lookup_all(&state, country, &mut attempts).await
        {
            return Ok(Some(found));
        }

        attempts.first_err.map_or(Ok(None), Err)
    }

    /// Try Open-Meteo, then Nominatim
    async fn lookup_all(
        &self,
        name: &str,
        country: &str,
        attempts: &mut Attempts,
    ) -> Option<GeocodeResult> {
        if let Some(found) = attempts.record(self.open_meteo.geocode(name, country).await) {
            return Some(found);
        }
        attempts.record(self.nominatim.geocode(name, country).await)
    }
}
