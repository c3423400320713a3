//! Fuzzy place name matching

use heck::ToTitleCase as _;

/// US state names, lower case
const US_STATES: [&str; 50] = [
    "alabama",
    "alaska",
    "arizona",
    "arkansas",
    "california",
    "colorado",
    "connecticut",
    "delaware",
    "florida",
    "georgia",
    "hawaii",
    "idaho",
    "illinois",
    "indiana",
    "iowa",
    "kansas",
    "kentucky",
    "louisiana",
    "maine",
    "maryland",
    "massachusetts",
    "michigan",
    "minnesota",
    "mississippi",
    "missouri",
    "montana",
    "nebraska",
    "nevada",
    "new hampshire",
    "new jersey",
    "new mexico",
    "new york",
    "north carolina",
    "north dakota",
    "ohio",
    "oklahoma",
    "oregon",
    "pennsylvania",
    "rhode island",
    "south carolina",
    "south dakota",
    "tennessee",
    "texas",
    "utah",
    "vermont",
    "virginia",
    "washington",
    "west virginia",
    "wisconsin",
    "wyoming",
];

/// Maximum edit distance for a name to be considered a typo of another
const MAX_TYPO_DISTANCE: usize = 2;

/// Edit distance between two strings, counted in chars
pub(crate) fn levenshtein(a: &str, b: &str) -> usize {
    if a == b {
        return 0;
    }
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut cur = Vec::with_capacity(b.len() + 1);
        cur.push(i + 1);
        for ((cb, diagonal), up) in b.iter().zip(&prev).zip(prev.iter().skip(1)) {
            let left = cur.last().copied().unwrap_or_default();
            cur.push((up + 1).min(left + 1).min(diagonal + usize::from(ca != *cb)));
        }
        prev = cur;
    }
    prev.last().copied().unwrap_or_default()
}

/// Score a geocoding candidate against the queried name, higher is better
pub(crate) fn score_candidate(query: &str, name: &str, admin_region: &str) -> u32 {
    let query = query.trim().to_lowercase();
    let name = name.trim().to_lowercase();
    let admin_region = admin_region.trim().to_lowercase();

    let mut score = 0;
    if name == query {
        score += 100;
    }
    if query.is_empty() {
        return score;
    }
    if name.starts_with(&query) {
        score += 40;
    }
    if name.contains(&query) {
        score += 20;
    }
    if !name.is_empty() {
        score += match levenshtein(&query, &name) {
            0 => 30,
            1 => 20,
            2 => 10,
            _ => 0,
        };
    }
    if admin_region.contains(&query) {
        score += 5;
    }
    score
}

/// Get the US state a place name designates, tolerating small typos.
///
/// Returns the title cased state name.
pub(crate) fn normalize_us_state(place: &str) -> Option<String> {
    let query = place
        .to_lowercase()
        .replace(',', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if query.is_empty() {
        return None;
    }
    US_STATES
        .iter()
        .map(|state| (levenshtein(&query, state), state))
        .min_by_key(|(distance, _)| *distance)
        .filter(|(distance, _)| *distance <= MAX_TYPO_DISTANCE)
        .map(|(_, state)| state.to_title_case())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_distance() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("arizone", "arizona"), 1);
        assert_eq!(levenshtein("zürich", "zurich"), 1);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
    }

    #[test]
    fn scores() {
        // exact + prefix + substring + distance 0
        assert_eq!(score_candidate("Lyon", "lyon", ""), 190);
        // prefix + substring
        assert_eq!(score_candidate("Lyon", "Lyon 3e Arrondissement", ""), 60);
        // substring only
        assert_eq!(score_candidate("york", "New York", "New York"), 25);
        // typo
        assert_eq!(score_candidate("Arizone", "Arizona", ""), 20);
        assert_eq!(score_candidate("", "", ""), 100);
        assert!(
            score_candidate("Paris", "Paris", "") > score_candidate("Paris", "Paris Hilton", "")
        );
    }

    #[test]
    fn us_states() {
        assert_eq!(normalize_us_state("Arizone").as_deref(), Some("Arizona"));
        assert_eq!(
            normalize_us_state(" north  carolina, ").as_deref(),
            Some("North Carolina")
        );
        assert_eq!(normalize_us_state("GEORGIA").as_deref(), Some("Georgia"));
        assert_eq!(normalize_us_state("Los Angeles"), None);
        assert_eq!(normalize_us_state(""), None);
    }
}
