use super::{MetadataProvider, MetadataSearchResult, send};
use crate::error::NetworkError;
use anyhow::Result;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

pub const MUSICBRAINZ_ENDPOINT: &str = "https://musicbrainz.org/ws/2";
pub const COVER_ART_ENDPOINT: &str = "https://coverartarchive.org";

/// MusicBrainz asks clients to stay under one request per second.
pub const MIN_REQUEST_SPACING: Duration = Duration::from_millis(1100);

const DURATION_WINDOW_MS: u64 = 5_000;

#[derive(Debug, Deserialize)]
struct SearchResultDto {
    #[serde(default)]
    recordings: Vec<RecordingDto>,
}

#[derive(Debug, Deserialize)]
struct RecordingDto {
    id: String,
    title: String,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<ArtistCreditDto>,
    #[serde(default)]
    disambiguation: Option<String>,
    #[serde(rename = "first-release-date", default)]
    first_release_date: Option<String>,
    #[serde(default)]
    releases: Option<Vec<ReleaseDto>>,
    #[serde(default)]
    tags: Option<Vec<TagDto>>,
}

#[derive(Debug, Deserialize)]
struct ArtistCreditDto {
    name: String,
    #[serde(default)]
    joinphrase: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReleaseDto {
    id: String,
    title: String,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Option<Vec<ArtistCreditDto>>,
    #[serde(default)]
    media: Option<Vec<MediaDto>>,
    #[serde(default)]
    disambiguation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaDto {
    #[serde(default)]
    track: Vec<MediaTrackDto>,
}

#[derive(Debug, Deserialize)]
struct MediaTrackDto {
    #[serde(default)]
    number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagDto {
    name: String,
}

pub struct MusicBrainzProvider {
    client: Client,
    endpoint: String,
    cover_endpoint: String,
    last_request: Mutex<Option<Instant>>,
}

impl MusicBrainzProvider {
    pub fn new() -> Result<Self> {
        Ok(Self::with_endpoints(
            super::http_client()?,
            MUSICBRAINZ_ENDPOINT,
            COVER_ART_ENDPOINT,
        ))
    }

    pub fn with_endpoints(client: Client, endpoint: &str, cover_endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            cover_endpoint: cover_endpoint.trim_end_matches('/').to_string(),
            last_request: Mutex::new(None),
        }
    }

    fn wait_for_slot(&self) {
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < MIN_REQUEST_SPACING {
                thread::sleep(MIN_REQUEST_SPACING - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

impl MetadataProvider for MusicBrainzProvider {
    fn search_metadata(
        &self,
        query: &str,
        duration_ms: u64,
    ) -> Result<Vec<MetadataSearchResult>, NetworkError> {
        self.wait_for_slot();
        let query = recording_query(query, duration_ms);
        log::debug!("musicbrainz query: {query}");

        let response = send(
            self.client
                .get(format!("{}/recording", self.endpoint))
                .header(reqwest::header::ACCEPT, "application/json")
                .query(&[("fmt", "json"), ("query", query.as_str())]),
        )?;

        match response.status() {
            StatusCode::OK => {
                let dto: SearchResultDto = response.json().map_err(|err| {
                    log::debug!("musicbrainz body did not parse: {err}");
                    NetworkError::ParseError
                })?;
                Ok(flatten(dto))
            }
            status => Err(NetworkError::from_status(status.as_u16())),
        }
    }

    fn cover_art_bytes(&self, result: &MetadataSearchResult) -> Result<Vec<u8>, NetworkError> {
        self.wait_for_slot();
        let response = send(self.client.get(format!(
            "{}/release/{}/front",
            self.cover_endpoint, result.album_id
        )))?;

        match response.status() {
            StatusCode::OK => response
                .bytes()
                .map(|bytes| bytes.to_vec())
                .map_err(|_| NetworkError::ParseError),
            status => Err(NetworkError::from_status(status.as_u16())),
        }
    }
}

pub fn recording_query(query: &str, duration_ms: u64) -> String {
    if duration_ms == 0 {
        return query.to_string();
    }
    format!(
        "{query} AND dur:[{} TO {}]",
        duration_ms.saturating_sub(DURATION_WINDOW_MS),
        duration_ms.saturating_add(DURATION_WINDOW_MS)
    )
}

fn credit_name(credits: &[ArtistCreditDto]) -> String {
    credits
        .iter()
        .map(|credit| format!("{}{}", credit.name, credit.joinphrase.as_deref().unwrap_or("")))
        .collect()
}

// One result per release that carries both an artist credit and media.
fn flatten(dto: SearchResultDto) -> Vec<MetadataSearchResult> {
    let mut results = Vec::new();
    for recording in dto.recordings {
        let artist = credit_name(&recording.artist_credit);
        let genres = recording
            .tags
            .as_ref()
            .map(|tags| tags.iter().map(|tag| tag.name.clone()).collect::<Vec<_>>());

        for release in recording.releases.iter().flatten() {
            let (Some(credits), Some(media)) = (&release.artist_credit, &release.media) else {
                continue;
            };
            let track_number = media
                .first()
                .and_then(|medium| medium.track.first())
                .and_then(|track| track.number.clone());

            results.push(MetadataSearchResult {
                id: recording.id.clone(),
                title: recording.title.clone(),
                artist: artist.clone(),
                album_id: release.id.clone(),
                album: release.title.clone(),
                album_artist: credit_name(credits),
                track_number,
                description: recording.disambiguation.clone(),
                album_description: release.disambiguation.clone(),
                year: recording.first_release_date.clone(),
                genres: genres.clone(),
            });
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "recordings": [
            {
                "id": "rec-1",
                "title": "Song",
                "artist-credit": [
                    {"name": "Alice", "joinphrase": " & "},
                    {"name": "Bob"}
                ],
                "first-release-date": "2001-05-01",
                "tags": [{"name": "rock"}, {"name": "indie"}],
                "releases": [
                    {
                        "id": "rel-1",
                        "title": "Album",
                        "artist-credit": [{"name": "Alice"}],
                        "media": [{"track": [{"number": "3"}]}],
                        "disambiguation": "deluxe"
                    },
                    {
                        "id": "rel-2",
                        "title": "Bootleg",
                        "media": [{"track": [{"number": "1"}]}]
                    }
                ]
            },
            {"id": "rec-2", "title": "Loose", "artist-credit": []}
        ]
    }"#;

    #[test]
    fn flatten_yields_one_result_per_complete_release() {
        let dto: SearchResultDto = serde_json::from_str(SAMPLE).expect("sample");
        let results = flatten(dto);

        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.artist, "Alice & Bob");
        assert_eq!(result.album_artist, "Alice");
        assert_eq!(result.album_id, "rel-1");
        assert_eq!(result.track_number.as_deref(), Some("3"));
        assert_eq!(result.album_description.as_deref(), Some("deluxe"));
        assert_eq!(result.year.as_deref(), Some("2001-05-01"));
        assert_eq!(
            result.genres,
            Some(vec![String::from("rock"), String::from("indie")])
        );
    }

    #[test]
    fn query_carries_duration_window() {
        assert_eq!(recording_query("song", 0), "song");
        assert_eq!(
            recording_query("song", 200_000),
            "song AND dur:[195000 TO 205000]"
        );
        assert_eq!(recording_query("x", 2_000), "x AND dur:[0 TO 7000]");
    }

    #[test]
    fn duration_window_saturates_at_upper_end() {
        let max = u64::MAX;
        assert_eq!(
            recording_query("x", max),
            format!("x AND dur:[{} TO {max}]", max - 5_000)
        );
    }

    #[test]
    fn requests_are_spaced() {
        let provider =
            MusicBrainzProvider::with_endpoints(Client::new(), "http://127.0.0.1:9", "http://127.0.0.1:9");
        let started = Instant::now();
        provider.wait_for_slot();
        provider.wait_for_slot();
        assert!(started.elapsed() >= MIN_REQUEST_SPACING);
    }
}
