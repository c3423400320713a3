//! Dataset location keys like `new_south_wales-australia`

use std::{collections::HashMap, sync::LazyLock};

use itertools::Itertools as _;

/// Geocoding query built from a location key
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LocationQuery {
    /// Place name, title cased
    pub place: String,
    /// ISO 3166 alpha-2 country code, empty if unknown
    pub country_code: String,
    /// Human readable label
    pub display_label: String,
}

/// Coordinates of locations appearing in the dataset, used before any geocoding
static KNOWN_COORDINATES: LazyLock<HashMap<&str, (f64, f64)>> = LazyLock::new(|| {
    [
        ("london-uk", (51.5074, -0.1278)),
        ("lausanne-switzerland", (46.5197, 6.6323)),
        ("lyon-france", (45.764, 4.8357)),
        ("los_angeles-usa", (34.0522, -118.2437)),
        ("georgia-usa", (32.1656, -82.9001)),
        ("north_carolina-usa", (35.7596, -79.0193)),
        ("victoria-australia", (-37.8136, 144.9631)),
        ("queensland-australia", (-20.9176, 142.7028)),
        ("new_south_wales-australia", (-31.2532, 146.9211)),
        ("auckland-new_zealand", (-36.8485, 174.7633)),
        ("dunedin-new_zealand", (-45.8788, 170.5028)),
        ("penrose-new_zealand", (-36.9075, 174.8167)),
        ("saitama-japan", (35.8617, 139.6455)),
        ("osaka-japan", (34.6937, 135.5023)),
        ("nagoya-japan", (35.1815, 136.9066)),
        ("yogyakarta-indonesia", (-7.7956, 110.3695)),
        ("budapest-hungary", (47.4979, 19.0402)),
        ("minsk-belarus", (53.9006, 27.559)),
        ("bratislava-slovakia", (48.1486, 17.1077)),
        ("noumea-new_caledonia", (-22.2711, 166.438)),
        ("papeete-french_polynesia", (-17.5516, -149.5585)),
        ("playa_del_carmen-mexico", (20.6296, -87.0739)),
    ]
    .into_iter()
    .collect()
});

/// Split key into place and country, with underscores and inner dashes turned to spaces
fn split(key: &str) -> (String, String) {
    let key = key.trim();
    let (place, country) = key.rsplit_once('-').unwrap_or((key, ""));
    (place.replace(['_', '-'], " "), country.replace('_', " "))
}

/// Capitalize each whitespace separated word, keeping punctuation and country acronyms
fn title_words(s: &str) -> String {
    let words = s
        .split_whitespace()
        .map(|w| {
            let lower = w.to_lowercase();
            let mut chars = lower.chars();
            chars
                .next()
                .map(|c| c.to_uppercase().chain(chars).collect::<String>())
                .unwrap_or_default()
        })
        .join(" ");
    match words.as_str() {
        "Usa" => "USA".to_owned(),
        "Uk" => "UK".to_owned(),
        _ => words,
    }
}

/// Map a country name to its ISO 3166 alpha-2 code, or an empty string if unknown
pub(crate) fn country_code(country: &str) -> &'static str {
    match country
        .trim()
        .to_lowercase()
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .as_str()
    {
        "usa" | "united states" | "united states of america" => "US",
        "uk" | "united kingdom" => "GB",
        "france" => "FR",
        "switzerland" => "CH",
        "australia" => "AU",
        "new zealand" => "NZ",
        "japan" => "JP",
        "indonesia" => "ID",
        "hungary" => "HU",
        "belarus" => "BY",
        "slovakia" => "SK",
        "mexico" => "MX",
        "french polynesia" => "PF",
        "new caledonia" => "NC",
        _ => "",
    }
}

/// Convert a location key into a readable label, ie. `los_angeles-usa` into `Los Angeles, USA`
#[must_use]
pub fn humanize_location_key(key: &str) -> String {
    let (place, country) = split(key);
    let place = title_words(&place);
    let country = title_words(&country);
    match (place.is_empty(), country.is_empty()) {
        (true, _) => country,
        (false, true) => place,
        (false, false) => format!("{place}, {country}"),
    }
}

/// Parse a location key into a geocoding query
#[must_use]
pub fn resolve_location_key(raw: &str) -> LocationQuery {
    let (place, country) = split(raw);
    LocationQuery {
        place: title_words(&place),
        country_code: country_code(&country).to_owned(),
        display_label: humanize_location_key(raw),
    }
}

/// Get built-in coordinates of a location key
pub(crate) fn known_coordinates(key: &str) -> Option<(f64, f64)> {
    KNOWN_COORDINATES.get(key.trim().to_lowercase().as_str()).copied()
}
