use crate::lyrics::Lyrics;
use crate::model::{PlaybackMode, PlaybackQueue, SavedPlayerState, Track};
use rand::SeedableRng;
use rand::rngs::{SmallRng, SysRng};
use rand::seq::SliceRandom;
use std::path::PathBuf;

/// Seeking back within this window moves to the previous track instead of restarting.
pub const RESTART_THRESHOLD_MS: u64 = 3_000;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackState {
    pub queue: Option<PlaybackQueue>,
    pub current_index: Option<usize>,
    pub is_playing: bool,
    pub mode: PlaybackMode,
    pub position_ms: u64,
    pub lyrics: Option<Lyrics>,
    pub is_loading_lyrics: bool,
}

impl PlaybackState {
    pub fn current_track(&self) -> Option<&Track> {
        let index = self.current_index?;
        self.queue.as_ref()?.tracks.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_none()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.as_ref().map_or(0, PlaybackQueue::len)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    SelectTrack { track: Track, queue: PlaybackQueue },
    TogglePlayPause,
    Play,
    Pause,
    SeekToNext,
    SeekToPrevious,
    SeekTo(u64),
    RemoveFromQueue(usize),
    ReorderQueue { from: usize, to: usize },
    PlayNext(Track),
    AddToQueue(Vec<Track>),
    CyclePlaybackMode,
    ResetPlayback,
    TrackFinished,
}

impl PlaybackEvent {
    /// Whether the saved player state should be rewritten after this event.
    pub fn changes_snapshot(&self) -> bool {
        matches!(
            self,
            Self::SelectTrack { .. }
                | Self::CyclePlaybackMode
                | Self::RemoveFromQueue(_)
                | Self::ReorderQueue { .. }
                | Self::PlayNext(_)
                | Self::AddToQueue(_)
                | Self::ResetPlayback
                | Self::SeekToNext
                | Self::SeekToPrevious
                | Self::TrackFinished
        )
    }
}

/// Work the audio engine has to do to match a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Start(PathBuf),
    Resume,
    Pause,
    Seek(u64),
    Stop,
}

#[derive(Debug)]
struct ShuffleOrder {
    order: Vec<usize>,
    rng: SmallRng,
}

impl ShuffleOrder {
    fn ensure_len(&mut self, len: usize) {
        if self.order.len() != len {
            self.rebuild(len);
        }
    }

    fn rebuild(&mut self, len: usize) {
        self.order = (0..len).collect();
        self.order.shuffle(&mut self.rng);
    }

    fn step(&mut self, len: usize, current: usize, forward: bool) -> Option<usize> {
        self.ensure_len(len);
        if self.order.is_empty() {
            return None;
        }
        let pos = self.order.iter().position(|idx| *idx == current).unwrap_or(0);
        let next = if forward {
            (pos + 1) % self.order.len()
        } else {
            (pos + self.order.len() - 1) % self.order.len()
        };
        self.order.get(next).copied()
    }
}

/// Authoritative "what is queued and what is playing" state machine.
///
/// Transitions only compute the next state and the engine commands that go
/// with it; executing those commands is the caller's job.
#[derive(Debug)]
pub struct PlaybackQueueState {
    state: PlaybackState,
    jump_to_beginning: bool,
    shuffle: ShuffleOrder,
}

impl PlaybackQueueState {
    pub fn new(mode: PlaybackMode, jump_to_beginning: bool) -> Self {
        Self::with_rng(mode, jump_to_beginning, SmallRng::try_from_rng(&mut SysRng).expect("failed to seed rng from OS"))
    }

    pub fn with_seed(mode: PlaybackMode, jump_to_beginning: bool, seed: u64) -> Self {
        Self::with_rng(mode, jump_to_beginning, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(mode: PlaybackMode, jump_to_beginning: bool, rng: SmallRng) -> Self {
        Self {
            state: PlaybackState {
                mode,
                ..PlaybackState::default()
            },
            jump_to_beginning,
            shuffle: ShuffleOrder {
                order: Vec::new(),
                rng,
            },
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn set_jump_to_beginning(&mut self, enabled: bool) {
        self.jump_to_beginning = enabled;
    }

    pub fn set_position(&mut self, position_ms: u64) {
        if self.state.current_index.is_some() {
            self.state.position_ms = position_ms;
        }
    }

    pub fn set_lyrics(&mut self, lyrics: Option<Lyrics>, loading: bool) {
        self.state.lyrics = lyrics;
        self.state.is_loading_lyrics = loading;
    }

    /// Rebuilds a paused state from the snapshot written before the last exit.
    pub fn restore(&mut self, saved: &SavedPlayerState) {
        self.state.mode = saved.playback_mode;
        let Some(queue) = saved.queue.clone().filter(|queue| !queue.is_empty()) else {
            return;
        };
        let index = saved
            .track
            .as_ref()
            .and_then(|track| queue.position_of(track))
            .unwrap_or(0);
        self.shuffle.rebuild(queue.len());
        self.state.queue = Some(queue);
        self.state.current_index = Some(index);
        self.state.is_playing = false;
        self.state.position_ms = 0;
    }

    pub fn snapshot(&self) -> SavedPlayerState {
        SavedPlayerState {
            queue: self.state.queue.clone(),
            track: self.state.current_track().cloned(),
            playback_mode: self.state.mode,
        }
    }

    pub fn apply(&mut self, event: PlaybackEvent) -> Vec<EngineCommand> {
        match event {
            PlaybackEvent::SelectTrack { track, queue } => self.select_track(&track, queue),
            PlaybackEvent::TogglePlayPause => {
                if self.state.is_playing {
                    self.pause()
                } else {
                    self.play()
                }
            }
            PlaybackEvent::Play => self.play(),
            PlaybackEvent::Pause => self.pause(),
            PlaybackEvent::SeekToNext | PlaybackEvent::TrackFinished => self.seek_to_next(),
            PlaybackEvent::SeekToPrevious => self.seek_to_previous(),
            PlaybackEvent::SeekTo(position_ms) => self.seek_to(position_ms),
            PlaybackEvent::RemoveFromQueue(index) => self.remove_from_queue(index),
            PlaybackEvent::ReorderQueue { from, to } => self.reorder_queue(from, to),
            PlaybackEvent::PlayNext(track) => self.play_next(track),
            PlaybackEvent::AddToQueue(tracks) => self.add_to_queue(tracks),
            PlaybackEvent::CyclePlaybackMode => {
                self.state.mode = self.state.mode.next();
                if self.state.mode == PlaybackMode::Shuffle {
                    self.shuffle.rebuild(self.state.queue_len());
                }
                Vec::new()
            }
            PlaybackEvent::ResetPlayback => self.reset(),
        }
    }

    fn select_track(&mut self, track: &Track, queue: PlaybackQueue) -> Vec<EngineCommand> {
        let Some(index) = queue.position_of(track) else {
            log::warn!("selected track {} is not part of its queue", track.uri());
            return Vec::new();
        };

        if self.state.queue.as_ref() != Some(&queue) {
            self.shuffle.rebuild(queue.len());
            self.state.queue = Some(queue);
        }
        self.state.is_playing = true;
        self.move_to(index)
    }

    fn play(&mut self) -> Vec<EngineCommand> {
        if self.state.current_track().is_none() || self.state.is_playing {
            return Vec::new();
        }
        self.state.is_playing = true;
        vec![EngineCommand::Resume]
    }

    fn pause(&mut self) -> Vec<EngineCommand> {
        if self.state.current_track().is_none() || !self.state.is_playing {
            return Vec::new();
        }
        self.state.is_playing = false;
        vec![EngineCommand::Pause]
    }

    fn seek_to(&mut self, position_ms: u64) -> Vec<EngineCommand> {
        if self.state.current_track().is_none() {
            return Vec::new();
        }
        self.state.position_ms = position_ms;
        vec![EngineCommand::Seek(position_ms)]
    }

    fn seek_to_next(&mut self) -> Vec<EngineCommand> {
        let Some(current) = self.state.current_index else {
            return Vec::new();
        };
        let len = self.state.queue_len();
        let next = match self.state.mode {
            PlaybackMode::Repeat => Some((current + 1) % len),
            PlaybackMode::RepeatOne => Some(current),
            PlaybackMode::Shuffle => self.shuffle.step(len, current, true),
        };
        next.map(|index| self.move_to(index)).unwrap_or_default()
    }

    fn seek_to_previous(&mut self) -> Vec<EngineCommand> {
        let Some(current) = self.state.current_index else {
            return Vec::new();
        };

        if self.jump_to_beginning && self.state.position_ms >= RESTART_THRESHOLD_MS {
            self.state.position_ms = 0;
            return vec![EngineCommand::Seek(0)];
        }

        let len = self.state.queue_len();
        let previous = match self.state.mode {
            PlaybackMode::Repeat => Some((current + len - 1) % len),
            PlaybackMode::RepeatOne => Some(current),
            PlaybackMode::Shuffle => self.shuffle.step(len, current, false),
        };
        previous.map(|index| self.move_to(index)).unwrap_or_default()
    }

    fn remove_from_queue(&mut self, index: usize) -> Vec<EngineCommand> {
        if index >= self.state.queue_len() {
            log::warn!("ignoring removal of queue entry {index}: out of range");
            return Vec::new();
        }

        let mut commands = Vec::new();
        if self.state.current_index == Some(index) {
            commands = self.seek_to_next();
        }

        let Some(queue) = self.state.queue.as_mut() else {
            return commands;
        };
        queue.tracks.remove(index);
        let remaining = queue.len();

        if remaining == 0 {
            return self.reset();
        }
        self.shuffle.rebuild(remaining);

        match self.state.current_index {
            Some(current) if current > index => {
                self.state.current_index = Some(current - 1);
                commands
            }
            Some(current) if current == index => {
                // The next track was the removed one itself, so start whatever slid into its slot.
                let replacement = if index < remaining { index } else { 0 };
                self.move_to(replacement)
            }
            _ => commands,
        }
    }

    // The current index stays where it is, so moving the playing entry changes which track is current.
    fn reorder_queue(&mut self, from: usize, to: usize) -> Vec<EngineCommand> {
        let Some(queue) = self.state.queue.as_mut() else {
            return Vec::new();
        };
        if from >= queue.len() || to >= queue.len() {
            log::warn!("ignoring queue move {from} -> {to}: out of range");
            return Vec::new();
        }
        let track = queue.tracks.remove(from);
        queue.tracks.insert(to, track);
        Vec::new()
    }

    fn play_next(&mut self, track: Track) -> Vec<EngineCommand> {
        if self.is_current(&track) {
            return Vec::new();
        }

        let current = self.state.current_index;
        let Some(queue) = self.state.queue.as_mut() else {
            let queue = PlaybackQueue::unnamed(vec![track.clone()]);
            return self.select_track(&track, queue);
        };

        match (queue.position_of(&track), current) {
            (Some(from), Some(current)) => {
                let moved = queue.tracks.remove(from);
                let current = if from < current { current - 1 } else { current };
                queue.tracks.insert(current + 1, moved);
                self.state.current_index = Some(current);
            }
            (Some(_), None) => {}
            (None, Some(current)) => {
                queue.tracks.insert(current + 1, track);
                self.shuffle.rebuild(queue.len());
            }
            (None, None) => {
                queue.tracks.insert(0, track);
                self.shuffle.rebuild(queue.len());
            }
        }
        Vec::new()
    }

    fn add_to_queue(&mut self, tracks: Vec<Track>) -> Vec<EngineCommand> {
        let mut commands = Vec::new();
        for track in tracks {
            if self.is_current(&track) {
                continue;
            }
            match self.state.queue.as_mut() {
                Some(queue) => {
                    if queue.position_of(&track).is_none() {
                        queue.tracks.push(track);
                    }
                }
                None => {
                    let queue = PlaybackQueue::unnamed(vec![track.clone()]);
                    commands.extend(self.select_track(&track, queue));
                }
            }
        }
        self.shuffle.ensure_len(self.state.queue_len());
        commands
    }

    fn is_current(&self, track: &Track) -> bool {
        self.state
            .current_track()
            .is_some_and(|current| current.is_same_track(track))
    }

    fn reset(&mut self) -> Vec<EngineCommand> {
        self.state = PlaybackState {
            mode: self.state.mode,
            ..PlaybackState::default()
        };
        self.shuffle.order.clear();
        vec![EngineCommand::Stop]
    }

    fn move_to(&mut self, index: usize) -> Vec<EngineCommand> {
        let Some(track) = self
            .state
            .queue
            .as_ref()
            .and_then(|queue| queue.tracks.get(index))
        else {
            return Vec::new();
        };
        let path = track.path.clone();

        self.state.current_index = Some(index);
        self.state.position_ms = 0;
        self.state.lyrics = None;
        self.state.is_loading_lyrics = false;

        let mut commands = vec![EngineCommand::Start(path)];
        if !self.state.is_playing {
            commands.push(EngineCommand::Pause);
        }
        commands
    }
}
