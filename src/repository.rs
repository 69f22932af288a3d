use crate::config;
use crate::lyrics::Lyrics;
use crate::model::{Playlist, Track};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

pub trait LyricsRepository: Send + Sync {
    fn get(&self, uri: &str) -> Option<Lyrics>;
    /// Inserts or replaces the record for `lyrics.uri`.
    fn insert(&self, lyrics: Lyrics) -> Result<()>;
    fn delete(&self, uri: &str) -> Result<()>;
}

pub trait PlaylistRepository: Send + Sync {
    /// Newest first.
    fn all(&self) -> Vec<Playlist>;
    fn insert(&self, playlist: Playlist) -> Result<()>;
    fn rename(&self, name: &str, new_name: &str) -> Result<()>;
    fn delete(&self, name: &str) -> Result<()>;
    fn update_tracks(&self, name: &str, tracks: Vec<Track>) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LyricsFile {
    #[serde(default)]
    lyrics: BTreeMap<String, Lyrics>,
}

/// Lyrics records kept in one JSON file, rewritten after every change.
pub struct JsonLyricsStore {
    path: PathBuf,
    records: Mutex<LyricsFile>,
}

impl JsonLyricsStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        let records = config::load_json_or_default(&path)?;
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(config::lyrics_store_path()?)
    }

    fn lock(&self) -> MutexGuard<'_, LyricsFile> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LyricsRepository for JsonLyricsStore {
    fn get(&self, uri: &str) -> Option<Lyrics> {
        self.lock().lyrics.get(uri).cloned()
    }

    fn insert(&self, lyrics: Lyrics) -> Result<()> {
        let mut records = self.lock();
        records.lyrics.insert(lyrics.uri.clone(), lyrics);
        config::save_json(&self.path, &*records)
    }

    fn delete(&self, uri: &str) -> Result<()> {
        let mut records = self.lock();
        if records.lyrics.remove(uri).is_none() {
            return Ok(());
        }
        config::save_json(&self.path, &*records)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PlaylistFile {
    #[serde(default)]
    playlists: Vec<Playlist>,
}

impl PlaylistFile {
    fn position(&self, name: &str) -> Option<usize> {
        self.playlists
            .iter()
            .position(|playlist| playlist.name.as_deref() == Some(name))
    }
}

/// Named playlists in one JSON file. Names are unique; inserting an existing name replaces it.
pub struct JsonPlaylistStore {
    path: PathBuf,
    records: Mutex<PlaylistFile>,
}

impl JsonPlaylistStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        let records = config::load_json_or_default(&path)?;
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(config::playlists_store_path()?)
    }

    fn lock(&self) -> MutexGuard<'_, PlaylistFile> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PlaylistRepository for JsonPlaylistStore {
    fn all(&self) -> Vec<Playlist> {
        self.lock().playlists.iter().rev().cloned().collect()
    }

    fn insert(&self, playlist: Playlist) -> Result<()> {
        let Some(name) = playlist.name.clone() else {
            bail!("playlists need a name to be saved");
        };
        let mut records = self.lock();
        match records.position(&name) {
            Some(idx) => records.playlists[idx] = playlist,
            None => records.playlists.push(playlist),
        }
        config::save_json(&self.path, &*records)
    }

    fn rename(&self, name: &str, new_name: &str) -> Result<()> {
        let mut records = self.lock();
        let idx = records
            .position(name)
            .with_context(|| format!("no playlist named {name}"))?;
        if name != new_name && records.position(new_name).is_some() {
            bail!("a playlist named {new_name} already exists");
        }
        let mut playlist = records.playlists.remove(idx);
        playlist.name = Some(new_name.to_string());
        records.playlists.push(playlist);
        config::save_json(&self.path, &*records)
    }

    fn delete(&self, name: &str) -> Result<()> {
        let mut records = self.lock();
        let Some(idx) = records.position(name) else {
            return Ok(());
        };
        records.playlists.remove(idx);
        config::save_json(&self.path, &*records)
    }

    fn update_tracks(&self, name: &str, tracks: Vec<Track>) -> Result<()> {
        let mut records = self.lock();
        let idx = records
            .position(name)
            .with_context(|| format!("no playlist named {name}"))?;
        records.playlists[idx].tracks = tracks;
        config::save_json(&self.path, &*records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn track(path: &str) -> Track {
        Track {
            path: PathBuf::from(path),
            title: path.to_string(),
            ..Track::default()
        }
    }

    #[test]
    fn lyrics_upsert_survives_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("lyrics.json");

        let store = JsonLyricsStore::open(path.clone()).expect("open");
        store
            .insert(Lyrics::from_text("/m/a.mp3", "first", false))
            .expect("insert");
        store
            .insert(Lyrics::from_text("/m/a.mp3", "[00:01.00] second", true))
            .expect("replace");

        let reopened = JsonLyricsStore::open(path).expect("reopen");
        let lyrics = reopened.get("/m/a.mp3").expect("stored");
        assert!(lyrics.is_synced());
        assert_eq!(reopened.get("/m/b.mp3"), None);

        reopened.delete("/m/a.mp3").expect("delete");
        assert_eq!(reopened.get("/m/a.mp3"), None);
    }

    #[test]
    fn playlists_list_newest_first() {
        let dir = tempdir().expect("tempdir");
        let store = JsonPlaylistStore::open(dir.path().join("playlists.json")).expect("open");
        store
            .insert(Playlist::named("old", vec![track("/a")]))
            .expect("insert");
        store
            .insert(Playlist::named("new", vec![track("/b")]))
            .expect("insert");

        let names: Vec<_> = store.all().into_iter().filter_map(|p| p.name).collect();
        assert_eq!(names, vec!["new", "old"]);
    }

    #[test]
    fn unnamed_playlists_are_rejected() {
        let dir = tempdir().expect("tempdir");
        let store = JsonPlaylistStore::open(dir.path().join("playlists.json")).expect("open");
        assert!(store.insert(Playlist::unnamed(Vec::new())).is_err());
    }

    #[test]
    fn rename_and_update_tracks() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("playlists.json");
        let store = JsonPlaylistStore::open(path.clone()).expect("open");
        store
            .insert(Playlist::named("mix", vec![track("/a")]))
            .expect("insert");
        store
            .insert(Playlist::named("other", Vec::new()))
            .expect("insert");

        assert!(store.rename("mix", "other").is_err());
        store.rename("mix", "road").expect("rename");
        store
            .update_tracks("road", vec![track("/a"), track("/b")])
            .expect("update");
        assert!(store.update_tracks("mix", Vec::new()).is_err());

        let reopened = JsonPlaylistStore::open(path).expect("reopen");
        let road = reopened
            .all()
            .into_iter()
            .find(|p| p.name.as_deref() == Some("road"))
            .expect("renamed playlist");
        assert_eq!(road.len(), 2);

        reopened.delete("road").expect("delete");
        assert_eq!(reopened.all().len(), 1);
    }
}
