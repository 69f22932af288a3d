use cadence::error::LyricsError;
use cadence::lyrics::{self, Lyrics, LyricsLine};

const SONG: &str = "[ti:Example]\n[ar:Someone]\n\
[00:12.00] Opening line\r\n\
[00:15.30]Second line\n\
\n\
[01:02.05]   spaced out   \n\
not a timed line\n";

#[test]
fn block_parses_and_formats_back() {
    let lines = lyrics::parse_block(SONG).expect("parse");
    assert_eq!(
        lines,
        vec![
            LyricsLine {
                timestamp_ms: 12_000,
                text: String::from("Opening line")
            },
            LyricsLine {
                timestamp_ms: 15_300,
                text: String::from("Second line")
            },
            LyricsLine {
                timestamp_ms: 62_050,
                text: String::from("spaced out")
            },
        ]
    );

    let formatted = lyrics::format_block(&lines);
    assert_eq!(
        formatted,
        "[00:12.00] Opening line\n[00:15.30] Second line\n[01:02.05] spaced out\n"
    );
    assert_eq!(lyrics::parse_block(&formatted).expect("reparse"), lines);
}

#[test]
fn plain_text_is_not_synced() {
    assert_eq!(
        lyrics::parse_block("verse\nchorus"),
        Err(LyricsError::NoSyncedLines)
    );
    let lyrics = Lyrics::from_text("/m/a.mp3", "verse\nchorus", false);
    assert!(!lyrics.is_synced());
    assert_eq!(lyrics.plain_text().as_deref(), Some("verse\nchorus"));
}

#[test]
fn stored_record_tolerates_missing_fields() {
    let lyrics: Lyrics = serde_json::from_str(r#"{"uri":"/m/a.mp3"}"#).expect("parse");
    assert!(lyrics.from_remote);
    assert_eq!(lyrics.plain, None);
    assert!(!lyrics.is_synced());
}
