//! Best effort artist enrichments

pub(crate) mod lastfm;
pub(crate) mod wikipedia;
