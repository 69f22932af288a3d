use crate::error::{DataError, LocalError};
use crate::model::{Playlist, Settings, SortOrder, Track, TrackSort};
use crate::store::StateStore;
use anyhow::{Context, Result};
use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::{Picture, PictureType};
use lofty::prelude::ItemKey;
use lofty::probe::Probe;
use lofty::tag::{Tag, TagType};
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, UNIX_EPOCH};
use symphonia::core::codecs::CodecParameters;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::{MetadataOptions, StandardTagKey};
use symphonia::core::probe::Hint;
use symphonia::default::get_probe;
use walkdir::WalkDir;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "ogg", "m4a", "aac", "opus"];

/// Tracks shorter than this are hidden when `ignore_short_tracks` is on.
pub const SHORT_TRACK_MS: u64 = 30_000;

#[derive(Default)]
struct TagFields {
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    album_artist: Option<String>,
    genre: Option<String>,
    year: Option<String>,
    track_number: Option<String>,
    duration_ms: u64,
}

/// Fields to rewrite in a file's tag. `None` clears the field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataEdit {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub year: Option<String>,
    pub track_number: Option<String>,
    pub lyrics: Option<String>,
}

impl MetadataEdit {
    /// Starts from the values a track currently shows, so unchanged fields survive the write.
    pub fn from_track(track: &Track) -> Self {
        Self {
            title: Some(track.title.clone()),
            artist: track.artist.clone(),
            album: track.album.clone(),
            album_artist: track.album_artist.clone(),
            genre: track.genre.clone(),
            year: track.year.clone(),
            track_number: track.track_number.clone(),
            lyrics: read_tag_lyrics(&track.path),
        }
    }
}

pub fn scan_folder(root: &Path) -> Vec<Track> {
    let mut tracks = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_audio(path) {
            continue;
        }
        tracks.push(read_track(path));
    }

    tracks.sort_by(|a, b| a.path.cmp(&b.path));
    tracks
}

pub fn scan_many(roots: &[PathBuf]) -> Vec<Track> {
    let mut all = Vec::new();
    for root in roots {
        all.extend(scan_folder(root));
    }
    all.sort_by(|a, b| a.path.cmp(&b.path));
    all.dedup_by(|a, b| a.path == b.path);
    all
}

/// Every track under the configured folders, minus excluded folders and,
/// when enabled, tracks shorter than [`SHORT_TRACK_MS`].
pub fn get_tracks(settings: &Settings) -> Vec<Track> {
    scan_many(&settings.folders)
        .into_iter()
        .filter(|track| {
            !settings
                .excluded_folders
                .iter()
                .any(|excluded| track.path.starts_with(excluded))
        })
        .filter(|track| {
            !settings.ignore_short_tracks
                || track.duration_ms == 0
                || track.duration_ms >= SHORT_TRACK_MS
        })
        .collect()
}

pub fn folders_with_audio(tracks: &[Track]) -> BTreeSet<String> {
    tracks
        .iter()
        .filter_map(|track| track.path.parent())
        .map(|parent| parent.to_string_lossy().into_owned())
        .collect()
}

pub fn filter_tracks<'a>(tracks: &'a [Track], query: &str) -> Vec<&'a Track> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return tracks.iter().collect();
    }

    tracks
        .iter()
        .filter(|track| {
            let contains = |value: &str| value.to_lowercase().contains(&query);
            contains(&track.title)
                || [
                    &track.album,
                    &track.artist,
                    &track.album_artist,
                    &track.genre,
                    &track.year,
                ]
                .into_iter()
                .flatten()
                .any(|value| contains(value))
        })
        .collect()
}

pub fn sort_tracks(tracks: &mut [Track], sort: TrackSort, order: SortOrder) {
    match sort {
        TrackSort::Title => tracks.sort_by_key(|track| track.title.to_lowercase()),
        TrackSort::Artist => tracks.sort_by_key(|track| {
            track
                .artist
                .as_deref()
                .unwrap_or_default()
                .to_lowercase()
        }),
        TrackSort::Album => tracks.sort_by_key(|track| {
            track
                .album
                .as_deref()
                .unwrap_or_default()
                .to_lowercase()
        }),
        TrackSort::Duration => tracks.sort_by_key(|track| track.duration_ms),
        TrackSort::DateModified => tracks.sort_by_key(|track| track.modified_epoch_seconds),
    }
    if order == SortOrder::Descending {
        tracks.reverse();
    }
}

/// Builds a playlist from an M3U file, keeping absolute entries that match a library track.
pub fn parse_m3u(name: &str, content: &str, library: &[Track]) -> Playlist {
    let tracks = content
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| line.starts_with('/'))
        .filter_map(|line| {
            library
                .iter()
                .find(|track| track.path == Path::new(line))
                .cloned()
        })
        .collect();
    let name: String = name
        .chars()
        .filter(|ch| ch.is_alphanumeric() || ch.is_whitespace())
        .collect();

    Playlist::named(&name, tracks)
}

pub fn read_track(path: &Path) -> Track {
    let stripped = crate::config::strip_windows_verbatim_prefix(path);
    let fields = symphonia_fields(&stripped);
    let title = fields
        .title
        .filter(|title| !title.trim().is_empty())
        .unwrap_or_else(|| {
            path.file_stem()
                .and_then(OsStr::to_str)
                .unwrap_or("unknown")
                .to_string()
        });

    Track {
        path: PathBuf::from(path),
        title,
        artist: fields.artist,
        album: fields.album,
        album_artist: fields.album_artist,
        genre: fields.genre,
        year: fields.year,
        track_number: fields.track_number,
        duration_ms: fields.duration_ms,
        modified_epoch_seconds: modified_epoch_seconds(&stripped),
    }
}

fn modified_epoch_seconds(path: &Path) -> u64 {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |since| since.as_secs())
}

fn symphonia_fields(path: &Path) -> TagFields {
    let Ok(file) = File::open(path) else {
        return TagFields::default();
    };
    let source = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(OsStr::to_str) {
        hint.with_extension(extension);
    }

    let Ok(mut probed) = get_probe().format(
        &hint,
        source,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    ) else {
        return TagFields::default();
    };

    let duration_ms = probed
        .format
        .default_track()
        .and_then(|track| codec_duration_ms(&track.codec_params))
        .unwrap_or(0);

    let metadata = probed.format.metadata();
    let Some(revision) = metadata.current() else {
        return TagFields {
            duration_ms,
            ..TagFields::default()
        };
    };
    let tags = revision.tags();

    TagFields {
        title: tag_value(tags, StandardTagKey::TrackTitle, &["title"]),
        artist: tag_value(tags, StandardTagKey::Artist, &["artist"]),
        album: tag_value(tags, StandardTagKey::Album, &["album"]),
        album_artist: tag_value(
            tags,
            StandardTagKey::AlbumArtist,
            &["albumartist", "album_artist"],
        ),
        genre: tag_value(tags, StandardTagKey::Genre, &["genre"]),
        year: tag_value(tags, StandardTagKey::Date, &["date", "year"])
            .map(|date| date.chars().take(4).collect()),
        track_number: tag_value(tags, StandardTagKey::TrackNumber, &["tracknumber"]),
        duration_ms,
    }
}

fn codec_duration_ms(codec_params: &CodecParameters) -> Option<u64> {
    if let (Some(time_base), Some(frame_count)) = (codec_params.time_base, codec_params.n_frames) {
        let time = time_base.calc_time(frame_count);
        return Some(time.seconds * 1000 + (time.frac * 1000.0).round() as u64);
    }

    codec_params
        .n_frames
        .zip(codec_params.sample_rate)
        .filter(|(_, sample_rate)| *sample_rate > 0)
        .map(|(frames, sample_rate)| frames.saturating_mul(1000) / u64::from(sample_rate))
}

fn tag_value(
    tags: &[symphonia::core::meta::Tag],
    standard_key: StandardTagKey,
    fallback_keys: &[&str],
) -> Option<String> {
    let from_standard = tags
        .iter()
        .find(|tag| tag.std_key == Some(standard_key))
        .map(|tag| tag.value.to_string());

    let from_fallback = || {
        tags.iter()
            .find(|tag| {
                fallback_keys
                    .iter()
                    .any(|key| tag.key.eq_ignore_ascii_case(key))
            })
            .map(|tag| tag.value.to_string())
    };

    from_standard
        .or_else(from_fallback)
        .and_then(|value| clean_metadata_value(&value))
}

pub fn write_metadata(path: &Path, edit: &MetadataEdit) -> Result<()> {
    edit_primary_tag(path, "metadata", |tag| {
        set_tag_text(tag, ItemKey::TrackTitle, edit.title.as_deref());
        set_tag_text(tag, ItemKey::TrackArtist, edit.artist.as_deref());
        set_tag_text(tag, ItemKey::AlbumTitle, edit.album.as_deref());
        set_tag_text(tag, ItemKey::AlbumArtist, edit.album_artist.as_deref());
        set_tag_text(tag, ItemKey::Genre, edit.genre.as_deref());
        set_tag_text(tag, ItemKey::Year, edit.year.as_deref());
        set_tag_text(tag, ItemKey::TrackNumber, edit.track_number.as_deref());
        set_tag_text(tag, ItemKey::Lyrics, edit.lyrics.as_deref());
        Ok(())
    })
}

pub fn write_cover_art(path: &Path, image_data: &[u8]) -> Result<()> {
    edit_primary_tag(path, "cover art", |tag| {
        let mut cursor = std::io::Cursor::new(image_data);
        let mut picture = Picture::from_reader(&mut cursor)
            .context("cover art bytes are not in a supported image format")?;
        picture.set_pic_type(PictureType::CoverFront);

        while !tag.pictures().is_empty() {
            let _ = tag.remove_picture(0);
        }
        tag.push_picture(picture);
        Ok(())
    })
}

/// Unsynchronized lyrics embedded in the file's tags, if any.
pub fn read_tag_lyrics(path: &Path) -> Option<String> {
    let stripped = crate::config::strip_windows_verbatim_prefix(path);
    let tagged_file = Probe::open(&stripped).ok()?.read().ok()?;
    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())?;
    tag.get_string(ItemKey::Lyrics)
        .and_then(clean_metadata_value)
}

fn edit_primary_tag(
    path: &Path,
    what: &str,
    apply: impl FnOnce(&mut Tag) -> Result<()>,
) -> Result<()> {
    validate_tag_edit_target(path)?;
    let stripped = crate::config::strip_windows_verbatim_prefix(path);
    check_file_access(&stripped, false)?;
    check_file_access(&stripped, true)?;

    let mut tagged_file = Probe::open(&stripped)
        .with_context(|| format!("failed to open {}", stripped.display()))?
        .read()
        .with_context(|| format!("failed to parse tags for {}", stripped.display()))?;

    let tag_type = preferred_tag_type_for_path(&stripped).unwrap_or(tagged_file.primary_tag_type());
    if tagged_file.tag_mut(tag_type).is_none() {
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file
        .tag_mut(tag_type)
        .context("failed to access primary tag")?;
    apply(tag)?;

    tagged_file
        .save_to_path(&stripped, WriteOptions::default())
        .with_context(|| format!("failed to write {what} for {}", stripped.display()))
        .context(DataError::Local(LocalError::FailedToWrite))?;
    log::info!("updated {what} for {}", stripped.display());
    Ok(())
}

fn set_tag_text(tag: &mut Tag, key: ItemKey, value: Option<&str>) {
    let cleaned = value.and_then(clean_metadata_value);
    tag.remove_key(key);
    if let Some(text) = cleaned {
        tag.insert_text(key, text);
    }
}

fn clean_metadata_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Opens the file the way a tag edit will, so io failures surface as a
/// [`DataError`] the caller can downcast and report.
fn check_file_access(path: &Path, writing: bool) -> Result<()> {
    let opened = if writing {
        fs::OpenOptions::new().write(true).open(path)
    } else {
        File::open(path)
    };
    match opened {
        Ok(_) => Ok(()),
        Err(err) => {
            let local = LocalError::from_io(&err, writing);
            Err(anyhow::Error::new(err)
                .context(format!("cannot open {}", path.display()))
                .context(DataError::Local(local)))
        }
    }
}

fn validate_tag_edit_target(path: &Path) -> Result<()> {
    let stripped = crate::config::strip_windows_verbatim_prefix(path);
    if !is_audio(&stripped) {
        anyhow::bail!("unsupported audio format for metadata editing")
    }
    if !stripped.is_file() {
        anyhow::bail!("track file not found")
    }
    Ok(())
}

fn preferred_tag_type_for_path(path: &Path) -> Option<TagType> {
    let ext = path.extension().and_then(OsStr::to_str)?.to_ascii_lowercase();
    match ext.as_str() {
        "mp3" => Some(TagType::Id3v2),
        "flac" | "ogg" | "opus" => Some(TagType::VorbisComments),
        "m4a" => Some(TagType::Mp4Ilst),
        _ => None,
    }
}

fn is_audio(path: &Path) -> bool {
    let ext = path.extension().and_then(OsStr::to_str).unwrap_or_default();
    AUDIO_EXTENSIONS
        .iter()
        .any(|supported| ext.eq_ignore_ascii_case(supported))
}

/// Re-scans the library on an interval and publishes changes to a store.
///
/// The store is only touched when the scanned set differs from what it holds.
pub struct LibraryWatcher {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LibraryWatcher {
    pub fn spawn(settings: Settings, tracks: StateStore<Vec<Track>>) -> Self {
        let interval = Duration::from_secs(u64::from(settings.library_refresh_seconds.max(1)));
        Self::spawn_with(interval, tracks, move || get_tracks(&settings))
    }

    pub fn spawn_with<F>(interval: Duration, tracks: StateStore<Vec<Track>>, scan: F) -> Self
    where
        F: Fn() -> Vec<Track> + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            loop {
                let mut scanned = scan();
                scanned.sort_by(|a, b| a.path.cmp(&b.path));
                if tracks.snapshot() != scanned {
                    log::info!("library changed: {} tracks", scanned.len());
                    tracks.update(|current| *current = scanned);
                }

                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::warn!("library watcher panicked");
        }
    }
}

impl Drop for LibraryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
