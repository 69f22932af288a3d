use super::{LyricsProvider, send};
use crate::error::NetworkError;
use crate::lyrics::{self, Lyrics};
use crate::model::Track;
use anyhow::Result;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const LRCLIB_ENDPOINT: &str = "https://lrclib.net/api";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LyricsDto {
    #[serde(default)]
    plain_lyrics: Option<String>,
    #[serde(default)]
    synced_lyrics: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChallengeDto {
    prefix: String,
    target: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishDto<'a> {
    track_name: &'a str,
    artist_name: &'a str,
    album_name: &'a str,
    duration: u64,
    plain_lyrics: String,
    synced_lyrics: String,
}

pub struct LrclibProvider {
    client: Client,
    endpoint: String,
}

impl LrclibProvider {
    pub fn new() -> Result<Self> {
        Ok(Self::with_endpoint(super::http_client()?, LRCLIB_ENDPOINT))
    }

    pub fn with_endpoint(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.endpoint)
    }
}

impl LyricsProvider for LrclibProvider {
    fn get_lyrics(&self, track: &Track) -> Result<Lyrics, NetworkError> {
        let (Some(title), Some(artist)) = (non_blank(&track.title), track.artist.as_deref()) else {
            return Err(NetworkError::BadRequest);
        };

        let mut query = vec![
            ("track_name", title.to_string()),
            ("artist_name", artist.to_string()),
        ];
        if let Some(album) = track.album.as_deref() {
            query.push(("album_name", album.to_string()));
        }
        query.push(("duration", (track.duration_ms / 1000).to_string()));

        let response = send(
            self.client
                .get(self.url("get"))
                .header(reqwest::header::ACCEPT, "application/json")
                .query(&query),
        )?;

        match response.status() {
            StatusCode::OK => {
                let dto: LyricsDto = response.json().map_err(|err| {
                    log::debug!("lrclib body did not parse: {err}");
                    NetworkError::ParseError
                })?;
                Ok(lyrics_from_dto(&track.uri(), dto))
            }
            StatusCode::NOT_FOUND => Err(NetworkError::NotFound),
            status => Err(NetworkError::from_status(status.as_u16())),
        }
    }

    fn post_lyrics(&self, track: &Track, lyrics: &Lyrics) -> Result<(), NetworkError> {
        let (Some(title), Some(artist), Some(album), Some(plain)) = (
            non_blank(&track.title),
            track.artist.as_deref(),
            track.album.as_deref(),
            lyrics.plain.as_ref(),
        ) else {
            return Err(NetworkError::BadRequest);
        };

        let response = send(
            self.client
                .post(self.url("request-challenge"))
                .header(reqwest::header::ACCEPT, "application/json"),
        )?;
        if response.status() != StatusCode::OK {
            return Err(NetworkError::Unknown);
        }
        let challenge: ChallengeDto = response.json().map_err(|_| NetworkError::ParseError)?;

        log::info!("solving lrclib publish challenge");
        let nonce = solve_challenge(&challenge.prefix, &challenge.target)?;

        let body = PublishDto {
            track_name: title,
            artist_name: artist,
            album_name: album,
            duration: track.duration_ms / 1000,
            plain_lyrics: plain.join("\n"),
            synced_lyrics: lyrics
                .synced
                .as_deref()
                .map(lyrics::format_block)
                .unwrap_or_default(),
        };
        let response = send(
            self.client
                .post(self.url("publish"))
                .header(reqwest::header::ACCEPT, "application/json")
                .header("X-Publish-Token", format!("{}:{nonce}", challenge.prefix))
                .json(&body),
        )?;

        if response.status() == StatusCode::CREATED {
            Ok(())
        } else {
            log::warn!(
                "lrclib publish rejected with {}: {}",
                response.status(),
                response.text().unwrap_or_default()
            );
            Err(NetworkError::Unknown)
        }
    }
}

fn non_blank(value: &str) -> Option<&str> {
    (!value.trim().is_empty()).then_some(value)
}

fn lyrics_from_dto(uri: &str, dto: LyricsDto) -> Lyrics {
    let plain = dto
        .plain_lyrics
        .map(|text| text.split('\n').map(str::to_string).collect());
    let synced = dto
        .synced_lyrics
        .and_then(|text| match lyrics::parse_block(&text) {
            Ok(lines) => Some(lines),
            Err(err) => {
                log::info!("dropping synced lyrics for {uri}: {err}");
                None
            }
        });

    Lyrics {
        uri: uri.to_string(),
        from_remote: true,
        plain,
        synced,
    }
}

/// Smallest nonce whose SHA-256 of `prefix + nonce` does not exceed the target.
pub fn solve_challenge(prefix: &str, target_hex: &str) -> Result<u64, NetworkError> {
    let target = decode_hex(target_hex)
        .filter(|target| target.len() == <Sha256 as Digest>::output_size())
        .ok_or(NetworkError::ParseError)?;

    (0..=u64::MAX)
        .find(|nonce| {
            let hash = Sha256::digest(format!("{prefix}{nonce}").as_bytes());
            verify_nonce(hash.as_slice(), &target)
        })
        .ok_or(NetworkError::Unknown)
}

/// Big-endian `hash <= target`; lengths must match.
pub fn verify_nonce(hash: &[u8], target: &[u8]) -> bool {
    hash.len() == target.len() && hash <= target
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|idx| u8::from_str_radix(hex.get(idx..idx + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_compares_bytewise() {
        assert!(verify_nonce(&[0x00, 0xff], &[0x01, 0x00]));
        assert!(verify_nonce(&[0x01, 0x00], &[0x01, 0x00]));
        assert!(!verify_nonce(&[0x01, 0x01], &[0x01, 0x00]));
        assert!(!verify_nonce(&[0x00], &[0x01, 0x00]));
    }

    #[test]
    fn permissive_target_accepts_first_nonce() {
        let target = "ff".repeat(32);
        assert_eq!(solve_challenge("abc", &target), Ok(0));
    }

    #[test]
    fn solved_nonce_is_minimal() {
        let target = format!("0f{}", "ff".repeat(31));
        let nonce = solve_challenge("prefix", &target).expect("solve");
        let decoded = decode_hex(&target).expect("hex");

        let hash = Sha256::digest(format!("prefix{nonce}").as_bytes());
        assert!(verify_nonce(hash.as_slice(), &decoded));
        for earlier in 0..nonce {
            let hash = Sha256::digest(format!("prefix{earlier}").as_bytes());
            assert!(!verify_nonce(hash.as_slice(), &decoded));
        }
    }

    #[test]
    fn malformed_target_is_a_parse_error() {
        assert_eq!(solve_challenge("p", "abc"), Err(NetworkError::ParseError));
        assert_eq!(solve_challenge("p", "zz"), Err(NetworkError::ParseError));
    }

    #[test]
    fn target_must_match_digest_length() {
        assert_eq!(solve_challenge("p", "ff"), Err(NetworkError::ParseError));
        assert_eq!(
            solve_challenge("p", &"ff".repeat(33)),
            Err(NetworkError::ParseError)
        );
    }

    #[test]
    fn dto_with_synced_lyrics_keeps_both_forms() {
        let dto: LyricsDto = serde_json::from_str(
            r#"{"plainLyrics":"one\ntwo","syncedLyrics":"[00:01.00] one\n[00:02.00] two"}"#,
        )
        .expect("dto");
        let lyrics = lyrics_from_dto("/m/a.mp3", dto);
        assert_eq!(lyrics.plain.as_ref().map(Vec::len), Some(2));
        assert_eq!(lyrics.synced.as_ref().map(|lines| lines[1].timestamp_ms), Some(2_000));
        assert!(lyrics.from_remote);
    }

    #[test]
    fn unparseable_synced_lyrics_are_dropped() {
        let dto: LyricsDto =
            serde_json::from_str(r#"{"plainLyrics":"hi","syncedLyrics":"no stamps here"}"#)
                .expect("dto");
        let lyrics = lyrics_from_dto("/m/a.mp3", dto);
        assert_eq!(lyrics.synced, None);
        assert_eq!(lyrics.plain, Some(vec![String::from("hi")]));
    }

    #[test]
    fn get_lyrics_requires_title_and_artist() {
        let provider = LrclibProvider::with_endpoint(Client::new(), "http://127.0.0.1:9");
        let track = Track {
            title: String::from("Song"),
            ..Track::default()
        };
        assert_eq!(provider.get_lyrics(&track), Err(NetworkError::BadRequest));
    }

    #[test]
    fn post_lyrics_requires_album_and_plain_text() {
        let provider = LrclibProvider::with_endpoint(Client::new(), "http://127.0.0.1:9");
        let track = Track {
            title: String::from("Song"),
            artist: Some(String::from("Band")),
            ..Track::default()
        };
        let lyrics = Lyrics::from_text("x", "words", false);
        assert_eq!(
            provider.post_lyrics(&track, &lyrics),
            Err(NetworkError::BadRequest)
        );
    }
}
