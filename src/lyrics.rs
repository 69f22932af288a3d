use crate::error::LyricsError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static SYNCED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(\d+):(\d+)\.(\d+)\].*$").expect("synced line pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricsLine {
    pub timestamp_ms: u64,
    pub text: String,
}

/// Lyrics stored for one track, keyed by the track uri.
///
/// `plain` is always filled when any lyrics exist; `synced` only when the
/// source carried `[mm:ss.cc]` timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lyrics {
    pub uri: String,
    #[serde(default = "default_from_remote")]
    pub from_remote: bool,
    #[serde(default)]
    pub plain: Option<Vec<String>>,
    #[serde(default)]
    pub synced: Option<Vec<LyricsLine>>,
}

fn default_from_remote() -> bool {
    true
}

impl Lyrics {
    /// Builds lyrics from raw text, falling back to plain lines when no synced line is present.
    pub fn from_text(uri: &str, raw: &str, from_remote: bool) -> Self {
        match parse_block(raw) {
            Ok(synced) => Self {
                uri: uri.to_string(),
                from_remote,
                plain: Some(synced.iter().map(|line| line.text.clone()).collect()),
                synced: Some(synced),
            },
            Err(err) => {
                log::debug!("treating lyrics for {uri} as plain text: {err}");
                Self {
                    uri: uri.to_string(),
                    from_remote,
                    plain: Some(split_plain(raw)),
                    synced: None,
                }
            }
        }
    }

    pub fn is_synced(&self) -> bool {
        self.synced.as_ref().is_some_and(|lines| !lines.is_empty())
    }

    pub fn plain_text(&self) -> Option<String> {
        self.plain.as_ref().map(|lines| lines.join("\n"))
    }
}

pub fn parse_line(raw: &str) -> Result<LyricsLine, LyricsError> {
    let captures = SYNCED_LINE
        .captures(raw)
        .ok_or_else(|| LyricsError::Format(raw.to_string()))?;

    let field = |idx: usize| -> Result<u64, LyricsError> {
        captures[idx]
            .parse::<u64>()
            .map_err(|_| LyricsError::Format(raw.to_string()))
    };
    let minutes = field(1)?;
    let seconds = field(2)?;
    let centiseconds = field(3)?;

    let timestamp_ms = minutes
        .checked_mul(60_000)
        .and_then(|ms| ms.checked_add(seconds.checked_mul(1000)?))
        .and_then(|ms| ms.checked_add(centiseconds.checked_mul(10)?))
        .ok_or_else(|| LyricsError::Format(raw.to_string()))?;

    let text_start = raw.find(']').map_or(raw.len(), |idx| idx + 1);
    Ok(LyricsLine {
        timestamp_ms,
        text: raw[text_start..].trim().to_string(),
    })
}

/// Parses every timestamped line of `raw`, skipping the rest.
///
/// Lines keep their input order; out-of-order sources are not re-sorted.
pub fn parse_block(raw: &str) -> Result<Vec<LyricsLine>, LyricsError> {
    let lines = raw
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| SYNCED_LINE.is_match(line))
        .map(parse_line)
        .collect::<Result<Vec<_>, _>>()?;

    if lines.is_empty() {
        return Err(LyricsError::NoSyncedLines);
    }
    Ok(lines)
}

pub fn format_line(line: &LyricsLine) -> String {
    format!("{} {}", format_timestamp(line.timestamp_ms), line.text)
}

pub fn format_block(lines: &[LyricsLine]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(&format_line(line));
        out.push('\n');
    }
    out
}

// Fields wider than two digits keep only their last two digits.
fn format_timestamp(timestamp_ms: u64) -> String {
    let minutes = (timestamp_ms / 60_000) % 100;
    let seconds = (timestamp_ms % 60_000) / 1000;
    let hundredths = (timestamp_ms % 1000) / 10;
    format!("[{minutes:02}:{seconds:02}.{hundredths:02}]")
}

/// Index of the line being sung at `position_ms`, if any line has started.
pub fn active_line_index(lines: &[LyricsLine], position_ms: u64) -> Option<usize> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.timestamp_ms <= position_ms)
        .map(|(idx, _)| idx)
        .last()
}

fn split_plain(raw: &str) -> Vec<String> {
    raw.split('\n')
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_line_decodes_fields() {
        let line = parse_line("[01:02.50] hello").expect("parse");
        assert_eq!(line.timestamp_ms, 62_500);
        assert_eq!(line.text, "hello");
    }

    #[test]
    fn parse_line_rejects_missing_fraction() {
        let err = parse_line("[01:02] hello").expect_err("error");
        assert!(matches!(err, LyricsError::Format(_)));
    }

    #[test]
    fn parse_line_allows_empty_text() {
        let line = parse_line("[00:10.00]").expect("parse");
        assert_eq!(line.timestamp_ms, 10_000);
        assert_eq!(line.text, "");
    }

    #[test]
    fn parse_block_skips_unsynced_lines() {
        let lines = parse_block("[ar:Someone]\n[00:01.00]one\nnoise\r\n[00:02.50]two\r\n")
            .expect("parse");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].timestamp_ms, 2_500);
        assert_eq!(lines[1].text, "two");
    }

    #[test]
    fn parse_block_keeps_input_order() {
        let lines = parse_block("[00:05.00]late\n[00:01.00]early").expect("parse");
        assert_eq!(lines[0].text, "late");
        assert_eq!(lines[1].text, "early");
    }

    #[test]
    fn parse_block_rejects_prose() {
        let err = parse_block("just some words\nand more words").expect_err("error");
        assert_eq!(err, LyricsError::NoSyncedLines);
    }

    #[test]
    fn format_line_pads_and_truncates() {
        let line = LyricsLine {
            timestamp_ms: 62_500,
            text: String::from("hello"),
        };
        assert_eq!(format_line(&line), "[01:02.50] hello");

        let long = LyricsLine {
            timestamp_ms: 125 * 60_000 + 3_070,
            text: String::from("x"),
        };
        assert_eq!(format_line(&long), "[25:03.07] x");
    }

    #[test]
    fn from_text_falls_back_to_plain() {
        let lyrics = Lyrics::from_text("a.mp3", "line one\nline two", false);
        assert!(!lyrics.is_synced());
        assert_eq!(
            lyrics.plain,
            Some(vec![String::from("line one"), String::from("line two")])
        );
    }

    #[test]
    fn from_text_fills_plain_from_synced() {
        let lyrics = Lyrics::from_text("a.mp3", "[00:01.00]one\n[00:02.00]two", true);
        assert!(lyrics.is_synced());
        assert_eq!(lyrics.plain_text().as_deref(), Some("one\ntwo"));
    }

    #[test]
    fn active_line_tracks_position() {
        let lines = parse_block("[00:01.00]a\n[00:03.00]b\n[00:05.00]c").expect("parse");
        assert_eq!(active_line_index(&lines, 500), None);
        assert_eq!(active_line_index(&lines, 1_000), Some(0));
        assert_eq!(active_line_index(&lines, 4_999), Some(1));
        assert_eq!(active_line_index(&lines, 60_000), Some(2));
    }

    proptest::proptest! {
        #[test]
        fn formatted_lines_parse_back(minutes in 0u64..100, seconds in 0u64..60, hundredths in 0u64..100) {
            let timestamp_ms = minutes * 60_000 + seconds * 1000 + hundredths * 10;
            let line = LyricsLine { timestamp_ms, text: String::from("la la") };
            let parsed = parse_line(&format_line(&line)).expect("parse");
            proptest::prop_assert_eq!(parsed, line);
        }
    }
}
