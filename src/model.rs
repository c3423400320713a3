//! Normalized artist, track and release records

use std::{cmp::Ordering, collections::HashMap, fmt};

use chrono::{DateTime, NaiveDate};

use crate::cl::ProviderName;

/// Artist, normalized across providers
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
pub struct ArtistRecord {
    /// Provider specific identifier
    pub id: String,
    /// Name to display
    pub display_name: String,
    /// Picture URL, may be empty
    pub image_url: String,
    /// Short secondary line (followers, genre...)
    pub meta_line: String,
    /// Provider this record comes from
    pub provider: ProviderName,
}

impl fmt::Display for ArtistRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}:{}] {}",
            self.display_name, self.provider, self.id, self.meta_line
        )
    }
}

/// Track of an artist
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
pub struct TrackRecord {
    /// Provider specific identifier
    pub id: String,
    /// Title
    pub title: String,
    /// Release date, if known and parsable
    pub release_date: Option<NaiveDate>,
    /// Cover URL, may be empty
    pub artwork_url: String,
    /// Link to the provider page, may be empty
    pub external_url: String,
}

/// Release (album, single, EP...) of an artist
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
pub struct ReleaseRecord {
    /// Provider specific identifier
    pub id: String,
    /// Title
    pub title: String,
    /// Release date, if known and parsable
    pub release_date: Option<NaiveDate>,
    /// Release date as sent by the provider
    pub raw_release_date: String,
    /// Release type, lowercase, if known
    pub kind: Option<String>,
    /// Cover URL, may be empty
    pub artwork_url: String,
    /// Link to the provider page, may be empty
    pub external_url: String,
}

fn fmt_dated(
    f: &mut fmt::Formatter<'_>,
    date: Option<NaiveDate>,
    title: &str,
    id: &str,
) -> fmt::Result {
    match date {
        Some(date) => write!(f, "{date} {title} [{id}]"),
        None => write!(f, "????-??-?? {title} [{id}]"),
    }
}

impl fmt::Display for TrackRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_dated(f, self.release_date, &self.title, &self.id)
    }
}

impl fmt::Display for ReleaseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_dated(f, self.release_date, &self.title, &self.id)?;
        if let Some(kind) = &self.kind {
            write!(f, " ({kind})")?;
        }
        Ok(())
    }
}

/// Parse a release date sent in one of the formats used by providers.
///
/// Accepts full dates, year and month, year only (as sent for low precision Spotify dates),
/// and RFC 3339 timestamps with or without fractional seconds.
#[must_use]
pub fn parse_release_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() || s == "0000-00-00" {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(s) {
        return Some(datetime.date_naive());
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d") {
        return Some(date);
    }
    if s.len() == 4
        && let Ok(year) = s.parse::<i32>()
    {
        return NaiveDate::from_ymd_opt(year, 1, 1);
    }
    s.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Record that can be ordered newest first
pub(crate) trait Dated {
    /// Parsed date
    fn date(&self) -> Option<NaiveDate>;
    /// Title
    fn title(&self) -> &str;
    /// Identifier
    fn id(&self) -> &str;
}

impl Dated for TrackRecord {
    fn date(&self) -> Option<NaiveDate> {
        self.release_date
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn id(&self) -> &str {
        &self.id
    }
}

impl Dated for ReleaseRecord {
    fn date(&self) -> Option<NaiveDate> {
        self.release_date
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn id(&self) -> &str {
        &self.id
    }
}

/// Compare identifiers, numeric ones first and by value
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(na), Ok(nb)) => na.cmp(&nb).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Newest first, undated last, then case insensitive title, then identifier
pub(crate) fn compare<T: Dated>(a: &T, b: &T) -> Ordering {
    match (a.date(), b.date()) {
        (Some(da), Some(db)) => db.cmp(&da),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.title().to_lowercase().cmp(&b.title().to_lowercase()))
    .then_with(|| compare_ids(a.id(), b.id()))
    .then_with(|| a.title().cmp(b.title()))
}

/// Sort records newest first and keep at most `limit`
pub(crate) fn sort_newest_first<T: Dated>(mut records: Vec<T>, limit: usize) -> Vec<T> {
    records.sort_by(compare);
    records.truncate(limit);
    records
}

/// Merge releases with the same identifier, preserving first seen order
pub(crate) fn merge_by_id<I>(releases: I) -> Vec<ReleaseRecord>
where
    I: IntoIterator<Item = ReleaseRecord>,
{
    let mut merged: Vec<ReleaseRecord> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for release in releases {
        match positions.get(&release.id) {
            Some(&i) => {
                if let Some(kept) = merged.get_mut(i) {
                    absorb(kept, release);
                }
            }
            None => {
                positions.insert(release.id.clone(), merged.len());
                merged.push(release);
            }
        }
    }
    merged
}

/// Merge a duplicate into the kept copy
fn absorb(kept: &mut ReleaseRecord, duplicate: ReleaseRecord) {
    let prefer_duplicate = match (kept.release_date, duplicate.release_date) {
        (Some(old), Some(new)) => new > old,
        (None, Some(_)) => true,
        (_, None) => false,
    };
    let other = if prefer_duplicate {
        std::mem::replace(kept, duplicate)
    } else {
        duplicate
    };
    if kept.kind.as_deref().is_none_or(str::is_empty) {
        kept.kind = other.kind;
    }
    if kept.artwork_url.is_empty() {
        kept.artwork_url = other.artwork_url;
    }
    if kept.external_url.is_empty() {
        kept.external_url = other.external_url;
    }
}

/// Format a count like 1.2k, 3.4m
#[must_use]
pub fn format_compact(n: u64) -> String {
    const UNITS: [(u64, &str); 3] = [
        (1_000_000_000, "b"),
        (1_000_000, "m"),
        (1_000, "k"),
    ];
    for (scale, suffix) in UNITS {
        if n >= scale {
            #[expect(clippy::cast_precision_loss)]
            let value = n as f64 / scale as f64;
            let s = format!("{value:.1}");
            let s = s.strip_suffix(".0").unwrap_or(&s);
            return format!("{s}{suffix}");
        }
    }
    n.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(id: &str, title: &str, date: &str) -> ReleaseRecord {
        ReleaseRecord {
            id: id.to_owned(),
            title: title.to_owned(),
            release_date: parse_release_date(date),
            raw_release_date: date.to_owned(),
            kind: None,
            artwork_url: String::new(),
            external_url: String::new(),
        }
    }

    #[test]
    fn parse_date_formats() {
        let d = |y, m, d| NaiveDate::from_ymd_opt(y, m, d);
        for (input, expected) in [
            ("2024", d(2024, 1, 1)),
            ("2024-06", d(2024, 6, 1)),
            ("2024-06-01", d(2024, 6, 1)),
            ("2024-06-01T12:34:56Z", d(2024, 6, 1)),
            ("2024-06-01T12:34:56.123Z", d(2024, 6, 1)),
            ("2024-06-01T23:30:00-07:00", d(2024, 6, 1)),
            (" 2024-06-01 ", d(2024, 6, 1)),
            ("2024-06-01 10:00", d(2024, 6, 1)),
            ("", None),
            ("   ", None),
            ("0000-00-00", None),
            ("soon", None),
            ("2024-13", None),
        ] {
            assert_eq!(parse_release_date(input), expected, "{input:?}");
        }
    }

    #[test]
    fn sort_ties_by_case_insensitive_title() {
        let sorted = sort_newest_first(
            vec![
                release("1", "B", "2024-06-01"),
                release("2", "a", "2024-06-01"),
            ],
            10,
        );
        let titles: Vec<_> = sorted.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["a", "B"]);
    }

    #[test]
    fn sort_dated_before_undated() {
        let sorted = sort_newest_first(
            vec![
                release("1", "Zzz", ""),
                release("2", "Old", "1901"),
                release("3", "New", "2020-02-02"),
                release("4", "Aaa", "not a date"),
            ],
            10,
        );
        let ids: Vec<_> = sorted.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["3", "2", "4", "1"]);
    }

    #[test]
    fn sort_is_deterministic() {
        let input = vec![
            release("10", "Same", "2024"),
            release("9", "Same", "2024"),
            release("abc", "Same", "2024"),
            release("2", "same", "2024"),
        ];
        let mut reversed = input.clone();
        reversed.reverse();
        let a = sort_newest_first(input, 10);
        let b = sort_newest_first(reversed, 10);
        assert_eq!(a, b);
        let ids: Vec<_> = a.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["2", "9", "10", "abc"]);
    }

    #[test]
    fn sort_truncates() {
        let sorted = sort_newest_first(
            vec![
                release("1", "a", "2021"),
                release("2", "b", "2022"),
                release("3", "c", "2023"),
            ],
            2,
        );
        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted[0].id, "3");
    }

    #[test]
    fn merge_keeps_valid_date() {
        let merged = merge_by_id([release("7", "X", ""), release("7", "X", "2023-05-05")]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].release_date, NaiveDate::from_ymd_opt(2023, 5, 5));

        let merged = merge_by_id([release("7", "X", "2023-05-05"), release("7", "X", "")]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].release_date, NaiveDate::from_ymd_opt(2023, 5, 5));
    }

    #[test]
    fn merge_prefers_strictly_newer() {
        let mut first = release("1", "Old copy", "2020-01-01");
        first.kind = Some("album".to_owned());
        let merged = merge_by_id([
            first,
            release("2", "Other", "2019"),
            release("1", "New copy", "2021-01-01"),
            release("1", "Same date", "2021-01-01"),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].title, "New copy");
        assert_eq!(merged[0].kind.as_deref(), Some("album"));
        assert_eq!(merged[1].id, "2");
    }

    #[test]
    fn merge_is_idempotent() {
        let input = vec![
            release("1", "A", ""),
            release("1", "A", "2022"),
            release("2", "B", "2021"),
        ];
        let once = merge_by_id(input);
        let twice = merge_by_id(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn compact_numbers() {
        for (n, expected) in [
            (0, "0"),
            (999, "999"),
            (1000, "1k"),
            (1234, "1.2k"),
            (999_999, "1000k"),
            (2_500_000, "2.5m"),
            (3_000_000_000, "3b"),
        ] {
            assert_eq!(format_compact(n), expected);
        }
    }
}
