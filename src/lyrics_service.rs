use crate::error::NetworkError;
use crate::library;
use crate::lyrics::Lyrics;
use crate::model::Track;
use crate::notify::Notifier;
use crate::remote::LyricsProvider;
use crate::repository::LyricsRepository;
use anyhow::Result;
use std::sync::Arc;

/// Finds lyrics for a track: the local store first, then the online provider,
/// then the file's own tags. Anything found remotely or in tags is stored.
pub struct LyricsService {
    repository: Arc<dyn LyricsRepository>,
    provider: Option<Arc<dyn LyricsProvider>>,
    notifier: Notifier,
}

impl LyricsService {
    pub fn new(
        repository: Arc<dyn LyricsRepository>,
        provider: Option<Arc<dyn LyricsProvider>>,
        notifier: Notifier,
    ) -> Self {
        Self {
            repository,
            provider,
            notifier,
        }
    }

    pub fn load(&self, track: &Track) -> Option<Lyrics> {
        let uri = track.uri();
        if let Some(stored) = self.repository.get(&uri) {
            return Some(stored);
        }

        let found = self
            .fetch(track)
            .or_else(|| library::read_tag_lyrics(&track.path).map(|raw| Lyrics::from_text(&uri, &raw, false)))?;
        self.store(found.clone());
        Some(found)
    }

    fn fetch(&self, track: &Track) -> Option<Lyrics> {
        let provider = self.provider.as_ref()?;
        match provider.get_lyrics(track) {
            Ok(lyrics) => Some(lyrics),
            Err(err) => {
                self.notifier.data_error(err.into());
                None
            }
        }
    }

    /// Replaces the stored lyrics with a local edit.
    pub fn save_edit(&self, track: &Track, raw: &str) -> Result<Lyrics> {
        let lyrics = Lyrics::from_text(&track.uri(), raw, false);
        self.repository.insert(lyrics.clone())?;
        Ok(lyrics)
    }

    pub fn publish(&self, track: &Track, lyrics: &Lyrics) -> Result<(), NetworkError> {
        let provider = self.provider.as_ref().ok_or(NetworkError::NoInternet)?;
        self.notifier.info("Solving publish challenge");
        let result = provider.post_lyrics(track, lyrics);
        match result {
            Ok(()) => self.notifier.info("Lyrics published"),
            Err(err) => self.notifier.data_error(err.into()),
        }
        result
    }

    fn store(&self, lyrics: Lyrics) {
        if let Err(err) = self.repository.insert(lyrics) {
            log::warn!("failed to store lyrics: {err:#}");
        }
    }
}
