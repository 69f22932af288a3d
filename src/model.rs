use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PlaybackMode {
    #[default]
    Repeat,
    RepeatOne,
    Shuffle,
}

impl PlaybackMode {
    pub fn next(self) -> Self {
        match self {
            Self::Repeat => Self::RepeatOne,
            Self::RepeatOne => Self::Shuffle,
            Self::Shuffle => Self::Repeat,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Repeat => "repeat",
            Self::RepeatOne => "repeat one",
            Self::Shuffle => "shuffle",
        }
    }
}

/// A playable file plus the display metadata read from its tags.
///
/// The path is the track's identity in a queue: [`Track::is_same_track`] and
/// [`Playlist::position_of`] match on it even if the tags were re-read in
/// between. `==` compares every field, so re-read tags count as a change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Track {
    pub path: PathBuf,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    #[serde(default)]
    pub album_artist: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub track_number: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub modified_epoch_seconds: u64,
}

impl Track {
    pub fn is_same_track(&self, other: &Track) -> bool {
        self.path == other.path
    }

    pub fn uri(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    pub fn display_artist(&self) -> &str {
        self.artist.as_deref().unwrap_or("Unknown artist")
    }
}

/// Ordered list of tracks loaded for playback, or a saved user playlist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Playlist {
    pub name: Option<String>,
    pub tracks: Vec<Track>,
}

pub type PlaybackQueue = Playlist;

impl Playlist {
    pub fn named(name: &str, tracks: Vec<Track>) -> Self {
        Self {
            name: Some(name.to_string()),
            tracks,
        }
    }

    pub fn unnamed(tracks: Vec<Track>) -> Self {
        Self { name: None, tracks }
    }

    pub fn position_of(&self, track: &Track) -> Option<usize> {
        self.tracks
            .iter()
            .position(|candidate| candidate.is_same_track(track))
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TrackSort {
    #[default]
    Title,
    Artist,
    Album,
    Duration,
    DateModified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub folders: Vec<PathBuf>,
    #[serde(default)]
    pub excluded_folders: Vec<PathBuf>,
    #[serde(default = "default_jump_to_beginning")]
    pub jump_to_beginning: bool,
    #[serde(default)]
    pub ignore_short_tracks: bool,
    #[serde(default)]
    pub track_sort: TrackSort,
    #[serde(default)]
    pub track_sort_order: SortOrder,
    #[serde(default = "default_library_refresh_seconds")]
    pub library_refresh_seconds: u16,
}

fn default_jump_to_beginning() -> bool {
    true
}

fn default_library_refresh_seconds() -> u16 {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            folders: Vec::new(),
            excluded_folders: Vec::new(),
            jump_to_beginning: default_jump_to_beginning(),
            ignore_short_tracks: false,
            track_sort: TrackSort::default(),
            track_sort_order: SortOrder::default(),
            library_refresh_seconds: default_library_refresh_seconds(),
        }
    }
}

/// Snapshot written after queue changes so playback can resume after a restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SavedPlayerState {
    #[serde(default)]
    pub queue: Option<PlaybackQueue>,
    #[serde(default)]
    pub track: Option<Track>,
    #[serde(default)]
    pub playback_mode: PlaybackMode,
}
