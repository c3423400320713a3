//! groupie main binary

use std::fmt;

use anyhow::Context as _;
use clap::Parser as _;
use groupie::{
    Aggregator, FetchError, LookupStatus,
    cl::{self, Command, ProviderName},
    format_compact, resolve_location_key,
};

/// Print items, one per line, or as a JSON array
fn print_all<T>(items: &[T], json: bool) -> anyhow::Result<LookupStatus>
where
    T: serde::Serialize + fmt::Display,
{
    if json {
        println!("{}", serde_json::to_string_pretty(items)?);
    } else {
        for item in items {
            println!("{item}");
        }
    }
    Ok(LookupStatus::of(!items.is_empty()))
}

/// Print a single optional item
fn print_one<T>(item: Option<&T>, json: bool) -> anyhow::Result<LookupStatus>
where
    T: serde::Serialize + fmt::Display,
{
    print_all(item.as_slice(), json)
}

/// Map a not found error to a lookup status, keep other errors
fn not_found_ok(err: FetchError) -> anyhow::Result<LookupStatus> {
    if err.is_not_found() {
        log::info!("{err}");
        Ok(LookupStatus::NotFound)
    } else {
        Err(err.into())
    }
}

/// Value with a display implementation for text output
#[derive(serde::Serialize)]
#[serde(transparent)]
struct Text<T>(T);

impl fmt::Display for Text<(String, u64)> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", format_compact(self.0.1), self.0.0)
    }
}

impl fmt::Display for Text<groupie::Summary> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.0.extract, self.0.page_url)
    }
}

impl fmt::Display for Text<groupie::GeocodeResult> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5},{:.5}\t{}", self.0.lat, self.0.lng, self.0.display_label)
    }
}

impl fmt::Display for Text<groupie::ConcertLocation> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.5},{:.5}\t{}\t{}",
            self.0.lat,
            self.0.lng,
            self.0.label,
            self.0.dates.join(" ")
        )
    }
}

impl fmt::Display for Text<groupie::Suggestion> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.0.kind, self.0.label)
    }
}

impl fmt::Display for Text<groupie::ArtistDetail> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let detail = &self.0;
        writeln!(f, "{}", detail.artist)?;
        if detail.listeners > 0 {
            writeln!(f, "{} listeners", format_compact(detail.listeners))?;
        }
        if let Some(summary) = &detail.summary {
            writeln!(f, "\n{}", Text(summary.clone()))?;
        }
        if !detail.top_tracks.is_empty() {
            writeln!(f, "\nTop tracks:")?;
            for track in &detail.top_tracks {
                writeln!(f, "  {track}")?;
            }
        }
        if !detail.releases.is_empty() {
            writeln!(f, "\nReleases:")?;
            for release in &detail.releases {
                writeln!(f, "  {release}")?;
            }
        }
        if !detail.concerts.is_empty() {
            writeln!(f, "\nConcerts:")?;
            for concert in &detail.concerts {
                writeln!(f, "  {}", Text(concert.clone()))?;
            }
        }
        Ok(())
    }
}

/// Run search command
async fn search(
    aggregator: &Aggregator,
    provider: ProviderName,
    query: &str,
    artwork: bool,
    listeners: bool,
    filter: &cl::ArtistFilter,
    json: bool,
) -> anyhow::Result<LookupStatus> {
    let artists = match provider {
        ProviderName::Groupie => aggregator.browse_groupie(query, filter).await?,
        ProviderName::Itunes if artwork => {
            aggregator
                .search_artists_with_artwork(query, 0, 0)
                .await?
        }
        _ => aggregator.search_artists(provider, query).await?,
    };
    if !listeners {
        return print_all(&artists, json);
    }
    let names: Vec<_> = artists.iter().map(|a| a.display_name.as_str()).collect();
    let counts = aggregator.listener_counts(&names).await;
    let rows: Vec<_> = names
        .into_iter()
        .map(str::to_owned)
        .zip(counts)
        .map(Text)
        .collect();
    print_all(&rows, json)
}

#[tokio::main]
async fn main() -> anyhow::Result<LookupStatus> {
    // Parse CL args
    let cl_args = cl::GroupieArgs::parse();

    // Init logger
    simple_logger::init_with_level(cl_args.verbosity).context("Failed to setup logger")?;

    let aggregator =
        Aggregator::new(&cl_args.credentials).context("Failed to setup HTTP client")?;
    let json = cl_args.json;

    // Run
    match cl_args.command {
        Command::Search {
            provider,
            query,
            artwork,
            listeners,
            filter,
        } => search(&aggregator, provider, &query, artwork, listeners, &filter, json).await,
        Command::Artist { provider, id } => match aggregator.get_artist(provider, &id).await {
            Ok(artist) => print_one(Some(&artist), json),
            Err(err) => not_found_ok(err),
        },
        Command::Tracks {
            provider,
            id,
            limit,
        } => match aggregator.get_top_tracks(provider, &id, limit).await {
            Ok(tracks) => print_all(&tracks, json),
            Err(err) => not_found_ok(err),
        },
        Command::Releases {
            provider,
            id,
            limit,
        } => match aggregator.get_latest_releases(provider, &id, limit).await {
            Ok(releases) => print_all(&releases, json),
            Err(err) => not_found_ok(err),
        },
        Command::Listeners { name } => match aggregator.get_listener_count(&name).await {
            Ok(count) => print_one(Some(&Text((name, count))), json),
            Err(err) => not_found_ok(err),
        },
        Command::Summary { title } => {
            let summary = aggregator.get_summary(&title).await?;
            print_one(summary.map(Text).as_ref(), json)
        }
        Command::Geocode { place, country } => {
            let found = aggregator.resolve_location(&place, &country).await?;
            print_one(found.map(Text).as_ref(), json)
        }
        Command::Location { key } => {
            let query = resolve_location_key(&key);
            log::info!("{key:?} is {:?}", query.display_label);
            let found = aggregator
                .resolve_location(&query.place, &query.country_code)
                .await?;
            print_one(found.map(Text).as_ref(), json)
        }
        Command::Concerts { id } => match aggregator.concert_locations(&id).await {
            Ok(locations) => {
                let rows: Vec<_> = locations.into_iter().map(Text).collect();
                print_all(&rows, json)
            }
            Err(err) => not_found_ok(err),
        },
        Command::Suggest { query } => {
            let rows: Vec<_> = aggregator
                .suggest(&query)
                .await?
                .into_iter()
                .map(Text)
                .collect();
            print_all(&rows, json)
        }
        Command::Detail { provider, id } => match aggregator.artist_detail(provider, &id).await {
            Ok(detail) => print_one(Some(&Text(detail)), json),
            Err(err) => not_found_ok(err),
        },
    }
}
