pub mod lrclib;
pub mod musicbrainz;

use crate::error::NetworkError;
use crate::lyrics::Lyrics;
use crate::model::Track;
use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use lrclib::LrclibProvider;
pub use musicbrainz::MusicBrainzProvider;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

pub fn user_agent() -> String {
    format!("cadence/{}", env!("CARGO_PKG_VERSION"))
}

pub fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(user_agent())
        .build()
        .context("failed to build HTTP client")
}

pub trait LyricsProvider: Send + Sync {
    fn get_lyrics(&self, track: &Track) -> Result<Lyrics, NetworkError>;
    fn post_lyrics(&self, track: &Track, lyrics: &Lyrics) -> Result<(), NetworkError>;
}

pub trait MetadataProvider: Send + Sync {
    fn search_metadata(
        &self,
        query: &str,
        duration_ms: u64,
    ) -> Result<Vec<MetadataSearchResult>, NetworkError>;
    fn cover_art_bytes(&self, result: &MetadataSearchResult) -> Result<Vec<u8>, NetworkError>;
}

/// One recording on one release, as offered when looking up tags online.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSearchResult {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album_id: String,
    pub album: String,
    pub album_artist: String,
    pub track_number: Option<String>,
    pub description: Option<String>,
    pub album_description: Option<String>,
    pub year: Option<String>,
    pub genres: Option<Vec<String>>,
}

pub(crate) fn send(request: RequestBuilder) -> Result<Response, NetworkError> {
    request.send().map_err(|err| {
        log::info!("request failed: {err}");
        NetworkError::from_transport(&err)
    })
}
