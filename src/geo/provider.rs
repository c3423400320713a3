//! Geocoding upstreams

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use crate::{
    geo::{GeocodeResult, fuzzy::score_candidate},
    http::{FetchError, GEOCODE_TIMEOUT, HttpClient, RateLimit, Transport, api_url},
};

/// Candidate count requested from upstreams
const CANDIDATE_COUNT: &str = "5";

/// Nominatim usage policy allows one request per second
pub(crate) const NOMINATIM_RATE_LIMIT: RateLimit = RateLimit {
    time: Duration::from_secs(1),
    max_count: NonZeroUsize::MIN,
};

/// Place name to coordinates service
#[async_trait::async_trait]
pub(crate) trait Geocoder: Sync + Send {
    /// Find best candidate for a place, restricted to a country if `country_code` is not empty
    async fn geocode(
        &self,
        name: &str,
        country_code: &str,
    ) -> Result<Option<GeocodeResult>, FetchError>;
}

/// Pick the highest scoring candidate, the first one on ties
fn best<T, F>(candidates: Vec<T>, score: F) -> Option<T>
where
    F: Fn(&T) -> u32,
{
    candidates.into_iter().rev().max_by_key(score)
}

/// Open-Meteo geocoding API
pub(crate) struct OpenMeteo {
    http: HttpClient,
}

#[derive(Debug, serde::Deserialize)]
struct OpenMeteoResponse {
    #[serde(default)]
    results: Vec<OpenMeteoPlace>,
}

#[derive(Debug, serde::Deserialize)]
struct OpenMeteoPlace {
    #[serde(default)]
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    country: String,
    #[serde(default)]
    country_code: String,
    #[serde(default)]
    admin1: String,
}

impl OpenMeteoPlace {
    fn label(&self) -> String {
        let name = self.name.trim();
        let admin1 = self.admin1.trim();
        let country = self.country.trim();
        let mut label = name.to_owned();
        if !admin1.is_empty() && !admin1.eq_ignore_ascii_case(name) {
            label.push_str(", ");
            label.push_str(admin1);
        }
        if !country.is_empty() {
            label.push_str(", ");
            label.push_str(country);
        }
        label
    }
}

impl OpenMeteo {
    /// API endpoint
    const URL: &str = "https://geocoding-api.open-meteo.com/v1/search";

    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            http: HttpClient::new(transport, "open-meteo", GEOCODE_TIMEOUT, None),
        }
    }
}

#[async_trait::async_trait]
impl Geocoder for OpenMeteo {
    async fn geocode(
        &self,
        name: &str,
        country_code: &str,
    ) -> Result<Option<GeocodeResult>, FetchError> {
        let country_code = country_code.trim().to_uppercase();
        let mut params = vec![
            ("name", name),
            ("count", CANDIDATE_COUNT),
            ("language", "en"),
            ("format", "json"),
        ];
        if !country_code.is_empty() {
            params.push(("country", country_code.as_str()));
        }
        let response: OpenMeteoResponse = self.http.get_json(api_url(Self::URL, params)).await?;

        let candidates: Vec<_> = response
            .results
            .into_iter()
            .filter(|p| {
                country_code.is_empty() || p.country_code.trim().to_uppercase() == country_code
            })
            .collect();
        Ok(
            best(candidates, |p| score_candidate(name, &p.name, &p.admin1)).map(|p| {
                GeocodeResult {
                    lat: p.latitude,
                    lng: p.longitude,
                    display_label: p.label(),
                }
            }),
        )
    }
}

/// OpenStreetMap Nominatim search API
pub(crate) struct Nominatim {
    http: HttpClient,
}

#[derive(Debug, serde::Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    address: NominatimAddress,
}

#[derive(Debug, Default, serde::Deserialize)]
struct NominatimAddress {
    #[serde(default)]
    country_code: String,
    #[serde(default)]
    state: String,
}

impl NominatimPlace {
    /// Short name, falling back to the full one
    fn short_name(&self) -> &str {
        let name = self.name.trim();
        if name.is_empty() {
            self.display_name.trim()
        } else {
            name
        }
    }
}

impl Nominatim {
    /// API endpoint
    const URL: &str = "https://nominatim.openstreetmap.org/search";

    pub(crate) fn new(transport: Arc<dyn Transport>, rate_limit: Option<&RateLimit>) -> Self {
        Self {
            http: HttpClient::new(transport, "nominatim", GEOCODE_TIMEOUT, rate_limit),
        }
    }
}

#[async_trait::async_trait]
impl Geocoder for Nominatim {
    async fn geocode(
        &self,
        name: &str,
        country_code: &str,
    ) -> Result<Option<GeocodeResult>, FetchError> {
        let country_code = country_code.trim().to_lowercase();
        let mut params = vec![
            ("q", name),
            ("format", "jsonv2"),
            ("limit", CANDIDATE_COUNT),
            ("addressdetails", "1"),
        ];
        if !country_code.is_empty() {
            params.push(("countrycodes", country_code.as_str()));
        }
        let url = api_url(Self::URL, params);
        let places: Vec<NominatimPlace> = self.http.get_json(url.clone()).await?;

        let candidates: Vec<_> = places
            .into_iter()
            .filter(|p| {
                country_code.is_empty()
                    || p.address.country_code.trim().to_lowercase() == country_code
            })
            .collect();
        let Some(place) = best(candidates, |p| {
            score_candidate(name, p.short_name(), &p.address.state)
        }) else {
            return Ok(None);
        };

        let (Ok(lat), Ok(lng)) = (
            place.lat.trim().parse::<f64>(),
            place.lon.trim().parse::<f64>(),
        ) else {
            return Err(FetchError::Upstream(format!(
                "invalid coordinates {:?}, {:?} from {url}",
                place.lat, place.lon
            )));
        };
        let display_label = match place.display_name.trim() {
            "" => place.short_name().to_owned(),
            d => d.to_owned(),
        };
        Ok(Some(GeocodeResult {
            lat,
            lng,
            display_label,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::tests::fake;

    #[test]
    fn ties_keep_first() {
        assert_eq!(best(vec![(1, 'a'), (3, 'b'), (3, 'c')], |c| c.0), Some((3, 'b')));
        assert_eq!(best(Vec::<(u32, char)>::new(), |c| c.0), None);
    }

    #[tokio::test]
    async fn open_meteo() {
        let (fake, transport) = fake();
        fake.route(
            "open-meteo.com/v1/search",
            200,
            r#"{"results": [
                {"name": "Paris", "latitude": 33.66, "longitude": -95.55,
                 "country": "United States", "country_code": "US", "admin1": "Texas"},
                {"name": "Paris", "latitude": 48.85, "longitude": 2.35,
                 "country": "France", "country_code": "FR", "admin1": "Île-de-France"}
            ]}"#,
        );
        let geocoder = OpenMeteo::new(transport);

        let fr = geocoder.geocode("Paris", "fr").await.unwrap().unwrap();
        assert_eq!(fr.display_label, "Paris, Île-de-France, France");
        assert!((fr.lat - 48.85).abs() < 1e-9);
        assert_eq!(
            fake.requests()[0].query_param("country").as_deref(),
            Some("FR")
        );

        let first = geocoder.geocode("Paris", "").await.unwrap().unwrap();
        assert_eq!(first.display_label, "Paris, Texas, United States");

        // candidate from another country is never returned
        assert_eq!(geocoder.geocode("Paris", "GB").await.unwrap(), None);
    }

    #[tokio::test]
    async fn open_meteo_no_results() {
        let (fake, transport) = fake();
        fake.route("open-meteo.com/v1/search", 200, r#"{"generationtime_ms": 0.5}"#);
        let geocoder = OpenMeteo::new(transport);
        assert_eq!(geocoder.geocode("Nowhere", "").await.unwrap(), None);
    }

    #[tokio::test]
    async fn nominatim() {
        let (fake, transport) = fake();
        fake.route(
            "nominatim.openstreetmap.org/search",
            200,
            r#"[
                {"lat": "35.7", "lon": "-79.0", "name": "Carolina Beach",
                 "display_name": "Carolina Beach, North Carolina, United States",
                 "address": {"country_code": "us", "state": "North Carolina"}},
                {"lat": "35.6729639", "lon": "-79.0392919", "name": "North Carolina",
                 "display_name": "North Carolina, United States",
                 "address": {"country_code": "us"}},
                {"lat": "1", "lon": "2", "name": "North Carolina",
                 "address": {"country_code": "ca"}}
            ]"#,
        );
        let geocoder = Nominatim::new(transport, None);

        let result = geocoder
            .geocode("North Carolina", "US")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.display_label, "North Carolina, United States");
        assert!((result.lng + 79.039_291_9).abs() < 1e-9);

        let request = &fake.requests()[0];
        assert_eq!(request.query_param("countrycodes").as_deref(), Some("us"));
        assert_eq!(request.query_param("format").as_deref(), Some("jsonv2"));
        assert_eq!(request.timeout, GEOCODE_TIMEOUT);
    }

    #[tokio::test]
    async fn nominatim_bad_coordinates() {
        let (fake, transport) = fake();
        fake.route(
            "nominatim.openstreetmap.org/search",
            200,
            r#"[{"lat": "north", "lon": "2", "name": "Somewhere"}]"#,
        );
        let geocoder = Nominatim::new(transport, None);
        assert!(matches!(
            geocoder.geocode("Somewhere", "").await.unwrap_err(),
            FetchError::Upstream(_)
        ));
    }
}
