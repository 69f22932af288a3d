use crate::audio::{EngineEvent, EngineHandle};
use crate::config;
use crate::lyrics::Lyrics;
use crate::lyrics_service::LyricsService;
use crate::model::{PlaybackMode, SavedPlayerState};
use crate::notify::Notifier;
use crate::playback::{EngineCommand, PlaybackEvent, PlaybackQueueState, PlaybackState};
use crate::store::StateStore;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;

pub struct ControllerOptions {
    pub mode: PlaybackMode,
    pub jump_to_beginning: bool,
    /// Where the saved player state is written; `None` disables persistence.
    pub state_path: Option<PathBuf>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            mode: PlaybackMode::default(),
            jump_to_beginning: true,
            state_path: None,
        }
    }
}

struct Inner {
    core: Mutex<PlaybackQueueState>,
    store: StateStore<PlaybackState>,
    engine: EngineHandle,
    notifier: Notifier,
    persist_tx: Option<Sender<SavedPlayerState>>,
}

/// Front door for playback: events go in, engine commands and state snapshots come out.
///
/// Cheap to clone; all clones drive the same queue and engine.
#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<Inner>,
}

impl PlaybackController {
    pub fn new(
        engine: EngineHandle,
        engine_events: Receiver<EngineEvent>,
        notifier: Notifier,
        options: ControllerOptions,
    ) -> Self {
        let core = PlaybackQueueState::new(options.mode, options.jump_to_beginning);
        let store = StateStore::new(core.state().clone());
        let persist_tx = options.state_path.map(spawn_state_writer);

        let inner = Arc::new(Inner {
            core: Mutex::new(core),
            store,
            engine,
            notifier,
            persist_tx,
        });
        spawn_position_tracker(Arc::downgrade(&inner), engine_events);

        Self { inner }
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.store.snapshot()
    }

    pub fn subscribe(&self) -> Receiver<PlaybackState> {
        self.inner.store.subscribe()
    }

    pub fn store(&self) -> &StateStore<PlaybackState> {
        &self.inner.store
    }

    pub fn set_jump_to_beginning(&self, enabled: bool) {
        self.core().set_jump_to_beginning(enabled);
    }

    /// Loads the state saved before the last exit, paused on the saved track.
    pub fn restore(&self, saved: &SavedPlayerState) {
        let mut core = self.core();
        core.restore(saved);
        let state = core.state().clone();
        if let Some(track) = state.current_track() {
            self.inner.engine.send(EngineCommand::Start(track.path.clone()));
            self.inner.engine.send(EngineCommand::Pause);
        }
        self.inner.store.update(|current| *current = state);
    }

    /// Applies one event. The core lock is held until the engine commands are
    /// queued and the new state is published, so both stay in event order.
    pub fn dispatch(&self, event: PlaybackEvent) {
        let mut core = self.core();
        self.apply_locked(&mut core, event);
    }

    fn apply_locked(&self, core: &mut PlaybackQueueState, event: PlaybackEvent) {
        log::debug!("playback event: {event:?}");
        let persist = event.changes_snapshot();

        let commands = core.apply(event);
        for command in commands {
            self.inner.engine.send(command);
        }
        let state = core.state().clone();
        self.inner.store.update(|current| *current = state);

        if persist
            && let Some(persist_tx) = &self.inner.persist_tx
            && persist_tx.send(core.snapshot()).is_err()
        {
            log::warn!("player state writer is gone");
        }
    }

    /// Loads lyrics for the current track in the background.
    ///
    /// A result that arrives after the track changed is discarded.
    pub fn load_lyrics(&self, service: Arc<LyricsService>) {
        let Some(track) = self.state().current_track().cloned() else {
            return;
        };
        let uri = track.uri();
        if self
            .state()
            .lyrics
            .as_ref()
            .is_some_and(|lyrics| lyrics.uri == uri)
        {
            return;
        }

        self.set_lyrics(&uri, None, true);
        let controller = self.clone();
        thread::spawn(move || {
            let lyrics = service.load(&track);
            controller.set_lyrics(&uri, lyrics, false);
        });
    }

    fn set_lyrics(&self, uri: &str, lyrics: Option<Lyrics>, loading: bool) {
        let mut core = self.core();
        if core.state().current_track().map(|track| track.uri()).as_deref() != Some(uri) {
            return;
        }
        core.set_lyrics(lyrics, loading);
        let state = core.state().clone();
        self.inner.store.update(|current| *current = state);
    }

    fn core(&self) -> MutexGuard<'_, PlaybackQueueState> {
        self.inner
            .core
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Engine commands are sent under the core lock, so the generation read
    // here is the one the current state was produced with.
    fn is_stale(&self, generation: u64) -> bool {
        let current = self.inner.engine.generation();
        if generation != current {
            log::debug!("dropping engine event from generation {generation}, now {current}");
        }
        generation != current
    }

    fn finish_track(&self, generation: u64) {
        let mut core = self.core();
        if self.is_stale(generation) {
            return;
        }
        self.apply_locked(&mut core, PlaybackEvent::TrackFinished);
    }

    fn apply_position(&self, generation: u64, position_ms: u64) {
        let mut core = self.core();
        if !core.state().is_playing || self.is_stale(generation) {
            return;
        }
        core.set_position(position_ms);
        let position_ms = core.state().position_ms;
        self.inner
            .store
            .update(|current| current.position_ms = position_ms);
    }
}

fn spawn_position_tracker(inner: Weak<Inner>, events: Receiver<EngineEvent>) {
    thread::spawn(move || {
        for event in events {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let controller = PlaybackController { inner };
            match event {
                EngineEvent::Position {
                    generation,
                    position_ms,
                } => controller.apply_position(generation, position_ms),
                EngineEvent::Finished { generation } => controller.finish_track(generation),
                EngineEvent::Failed(message) => controller.inner.notifier.error(message),
            }
        }
        log::debug!("position tracker stopped");
    });
}

fn spawn_state_writer(path: PathBuf) -> Sender<SavedPlayerState> {
    let (tx, rx) = mpsc::channel::<SavedPlayerState>();
    thread::spawn(move || {
        while let Ok(mut saved) = rx.recv() {
            // Only the newest snapshot matters when several are queued.
            while let Ok(newer) = rx.try_recv() {
                saved = newer;
            }
            if let Err(err) = config::save_json(&path, &saved) {
                log::error!("failed to save player state: {err:#}");
            }
        }
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullAudioEngine;
    use crate::model::{PlaybackQueue, Track};
    use std::time::Duration;

    fn track(name: &str) -> Track {
        Track {
            path: PathBuf::from(format!("/music/{name}.mp3")),
            title: name.to_string(),
            ..Track::default()
        }
    }

    // The engine's own events are kept alive but unread; the test feeds the
    // tracker by hand.
    fn hand_fed_controller() -> (PlaybackController, Receiver<EngineEvent>, Sender<EngineEvent>) {
        let (engine, engine_events) = EngineHandle::spawn(|| Box::new(NullAudioEngine::new()));
        let (event_tx, event_rx) = mpsc::channel();
        let (notifier, _notices) = Notifier::channel();
        let controller = PlaybackController::new(
            engine,
            event_rx,
            notifier,
            ControllerOptions {
                mode: PlaybackMode::Repeat,
                ..ControllerOptions::default()
            },
        );
        (controller, engine_events, event_tx)
    }

    #[test]
    fn events_from_a_replaced_track_are_dropped() {
        let (controller, _engine_events, event_tx) = hand_fed_controller();
        let queue = PlaybackQueue::unnamed(vec![track("a"), track("b"), track("c")]);
        controller.dispatch(PlaybackEvent::SelectTrack {
            track: queue.tracks[0].clone(),
            queue,
        });
        let stale = controller.inner.engine.generation();
        let updates = controller.subscribe();

        controller.dispatch(PlaybackEvent::SeekToNext);
        let fresh = controller.inner.engine.generation();
        assert_ne!(stale, fresh);

        let send = |event| event_tx.send(event).expect("tracker is running");
        send(EngineEvent::Finished { generation: stale });
        send(EngineEvent::Position {
            generation: stale,
            position_ms: 90_000,
        });
        send(EngineEvent::Position {
            generation: fresh,
            position_ms: 1_500,
        });

        let mut seen = Vec::new();
        while let Ok(state) = updates.recv_timeout(Duration::from_secs(2)) {
            let done = state.position_ms == 1_500;
            seen.push(state);
            if done {
                break;
            }
        }
        assert_eq!(seen.last().map(|state| state.position_ms), Some(1_500));
        assert!(seen.iter().all(|state| state.position_ms != 90_000));
        assert_eq!(controller.state().current_track(), Some(&track("b")));

        send(EngineEvent::Finished { generation: fresh });
        let advanced = (0..200).any(|_| {
            thread::sleep(Duration::from_millis(10));
            controller.state().current_track() == Some(&track("c"))
        });
        assert!(advanced);
    }
}
