use crate::model::{SavedPlayerState, Settings};
use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "cadence";
const SETTINGS_FILE: &str = "settings.json";
const PLAYER_STATE_FILE: &str = "player_state.json";
const EQUALIZER_FILE: &str = "equalizer.json";
const LYRICS_FILE: &str = "lyrics.json";
const PLAYLISTS_FILE: &str = "playlists.json";

pub const CONFIG_DIR_ENV: &str = "CADENCE_CONFIG_DIR";

pub fn config_root() -> Result<PathBuf> {
    if let Ok(override_dir) = env::var(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(override_dir));
    }

    let home = env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .context("neither HOME nor USERPROFILE is set")?;
    Ok(PathBuf::from(home).join(".config").join(APP_DIR))
}

pub fn ensure_config_dir() -> Result<PathBuf> {
    let root = config_root()?;
    fs::create_dir_all(&root).with_context(|| format!("failed to create {}", root.display()))?;
    Ok(root)
}

pub fn settings_path() -> Result<PathBuf> {
    Ok(config_root()?.join(SETTINGS_FILE))
}

pub fn player_state_path() -> Result<PathBuf> {
    Ok(config_root()?.join(PLAYER_STATE_FILE))
}

pub fn equalizer_path() -> Result<PathBuf> {
    Ok(config_root()?.join(EQUALIZER_FILE))
}

pub fn lyrics_store_path() -> Result<PathBuf> {
    Ok(config_root()?.join(LYRICS_FILE))
}

pub fn playlists_store_path() -> Result<PathBuf> {
    Ok(config_root()?.join(PLAYLISTS_FILE))
}

/// Reads a JSON document, returning the type's default when the file does not exist yet.
pub fn load_json_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        return Ok(T::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn load_settings() -> Result<Settings> {
    load_json_or_default(&settings_path()?)
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    ensure_config_dir()?;
    save_json(&settings_path()?, settings)
}

pub fn load_player_state() -> Result<SavedPlayerState> {
    load_json_or_default(&player_state_path()?)
}

pub fn normalize_path(path: &Path) -> PathBuf {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    strip_windows_verbatim_prefix(&canonical)
}

pub fn strip_windows_verbatim_prefix(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();

    if let Some(trimmed) = raw.strip_prefix(r"\\?\UNC\") {
        return PathBuf::from(format!(r"\\{trimmed}"));
    }

    if let Some(trimmed) = raw.strip_prefix(r"\\?\") {
        return PathBuf::from(trimmed);
    }

    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlaybackMode;
    use tempfile::tempdir;

    #[test]
    fn json_documents_round_trip_through_disk() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(PLAYER_STATE_FILE);

        let state = SavedPlayerState {
            playback_mode: PlaybackMode::Shuffle,
            ..SavedPlayerState::default()
        };
        save_json(&path, &state).expect("save");
        let loaded: SavedPlayerState = load_json_or_default(&path).expect("load");
        assert_eq!(loaded.playback_mode, PlaybackMode::Shuffle);
    }

    #[test]
    fn missing_document_loads_default() {
        let dir = tempdir().expect("tempdir");
        let loaded: Settings =
            load_json_or_default(&dir.path().join("absent.json")).expect("load");
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn corrupt_document_reports_path() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "{not json").expect("write");

        let err = load_json_or_default::<Settings>(&path).expect_err("error");
        assert!(err.to_string().contains("failed to parse"), "{err:#}");
    }

    #[test]
    fn strips_windows_verbatim_prefix() {
        let cleaned = strip_windows_verbatim_prefix(Path::new(r"\\?\E:\LOCALMUSIC\a.mp3"));
        assert_eq!(cleaned, PathBuf::from(r"E:\LOCALMUSIC\a.mp3"));
    }
}
