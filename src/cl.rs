//! Command line interface

use clap::{Args, Parser, Subcommand};

/// Command line arguments for `groupie` binary
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct GroupieArgs {
    /// Provider credentials
    #[clap(flatten)]
    pub credentials: Credentials,
    /// Print results as JSON
    #[clap(short, long)]
    pub json: bool,
    /// Level of logging output
    #[clap(short, long, default_value_t = log::Level::Info)]
    pub verbosity: log::Level,
    /// Operation to run
    #[command(subcommand)]
    pub command: Command,
}

/// Credentials for providers that need them, all optional.
/// Features depending on missing credentials fail with a configuration error.
#[derive(Args, Clone, Debug, Default)]
pub struct Credentials {
    /// Spotify application client ID
    #[clap(long, env = "SPOTIFY_CLIENT_ID", hide_env_values = true)]
    pub spotify_client_id: Option<String>,
    /// Spotify application client secret
    #[clap(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    pub spotify_client_secret: Option<String>,
    /// Last.fm API key, for listener counts
    #[clap(long, env = "LASTFM_API_KEY", hide_env_values = true)]
    pub lastfm_api_key: Option<String>,
}

/// Operations
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search artists
    Search {
        /// Provider to search
        #[clap(short, long, default_value_t = ProviderName::Groupie)]
        provider: ProviderName,
        /// Search query, empty to browse
        #[clap(default_value = "")]
        query: String,
        /// Resolve artist pictures from album artwork (iTunes only)
        #[clap(short, long)]
        artwork: bool,
        /// Also fetch listener counts
        #[clap(short, long)]
        listeners: bool,
        /// Dataset filters (Groupie only)
        #[clap(flatten)]
        filter: ArtistFilter,
    },
    /// Get an artist by identifier
    Artist {
        /// Provider
        #[clap(short, long, default_value_t = ProviderName::Groupie)]
        provider: ProviderName,
        /// Provider specific identifier
        id: String,
    },
    /// Get top tracks of an artist
    Tracks {
        /// Provider
        #[clap(short, long, default_value_t = ProviderName::Groupie)]
        provider: ProviderName,
        /// Provider specific identifier
        id: String,
        /// Maximum track count
        #[clap(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
    /// Get latest releases of an artist
    Releases {
        /// Provider
        #[clap(short, long, default_value_t = ProviderName::Groupie)]
        provider: ProviderName,
        /// Provider specific identifier
        id: String,
        /// Maximum release count
        #[clap(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
    /// Get listener count of an artist
    Listeners {
        /// Artist name
        name: String,
    },
    /// Get encyclopedia summary of an artist
    Summary {
        /// Artist name or page title
        title: String,
    },
    /// Geocode a place
    Geocode {
        /// Place name
        place: String,
        /// ISO 3166 alpha-2 country code
        #[clap(default_value = "")]
        country: String,
    },
    /// Parse and geocode a dataset location key like `los_angeles-usa`
    Location {
        /// Location key
        key: String,
    },
    /// Geocode concert locations of a Groupie artist
    Concerts {
        /// Groupie artist identifier
        id: String,
    },
    /// Suggest artists, members and locations from the Groupie dataset
    Suggest {
        /// Partial query
        query: String,
    },
    /// Get an artist with all its enrichments
    Detail {
        /// Provider
        #[clap(short, long, default_value_t = ProviderName::Groupie)]
        provider: ProviderName,
        /// Provider specific identifier
        id: String,
    },
}

/// Filters applied to the Groupie dataset
#[derive(Args, Clone, Debug, Default)]
pub struct ArtistFilter {
    /// Minimum creation year
    #[clap(long)]
    pub year_min: Option<i32>,
    /// Maximum creation year
    #[clap(long)]
    pub year_max: Option<i32>,
    /// Accepted member counts.
    /// Use multiple times to accept several counts.
    #[clap(short, long)]
    pub members: Vec<usize>,
}

impl ArtistFilter {
    /// Return true if an artist created in `year` with `member_count` members passes the filter
    pub(crate) fn matches(&self, year: i32, member_count: usize) -> bool {
        self.year_min.is_none_or(|min| year >= min)
            && self.year_max.is_none_or(|max| year <= max)
            && (self.members.is_empty() || self.members.contains(&member_count))
    }
}

/// Artist provider name
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Hash,
    strum::EnumString,
    strum::VariantArray,
    strum::AsRefStr,
    strum::Display,
    serde::Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[expect(missing_docs)]
pub enum ProviderName {
    Groupie,
    Spotify,
    Deezer,
    #[strum(to_string = "itunes", serialize = "apple")]
    Itunes,
}
