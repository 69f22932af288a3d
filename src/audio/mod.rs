use crate::playback::EngineCommand;
use anyhow::{Context, Result};
use rodio::Source;
use rodio::{Decoder, DeviceSinkBuilder as OutputStreamBuilder, MixerDeviceSink as OutputStream, Player as Sink};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

pub const POSITION_TICK: Duration = Duration::from_millis(50);

pub trait AudioEngine {
    fn play(&mut self, path: &Path) -> Result<()>;
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
    fn is_paused(&self) -> bool;
    fn current_track(&self) -> Option<&Path>;
    fn position(&self) -> Option<Duration>;
    fn duration(&self) -> Option<Duration>;
    fn seek_to(&mut self, position: Duration) -> Result<()>;
    fn is_finished(&self) -> bool;
}

pub struct RodioAudioEngine {
    _stream: OutputStream,
    sink: Sink,
    current: Option<PathBuf>,
    track_duration: Option<Duration>,
}

impl RodioAudioEngine {
    pub fn new() -> Result<Self> {
        let mut stream = OutputStreamBuilder::from_default_device()
            .context("failed to open default system output stream")?
            .with_error_callback(|err| log::warn!("audio output error: {err}"))
            .open_sink_or_fallback()
            .context("failed to start default output stream")?;
        stream.log_on_drop(false);
        let sink = Sink::connect_new(stream.mixer());

        Ok(Self {
            _stream: stream,
            sink,
            current: None,
            track_duration: None,
        })
    }
}

impl AudioEngine for RodioAudioEngine {
    fn play(&mut self, path: &Path) -> Result<()> {
        self.sink.stop();
        self.sink = Sink::connect_new(self._stream.mixer());

        let file =
            File::open(path).with_context(|| format!("failed to open track {}", path.display()))?;
        let source = Decoder::try_from(file)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        self.track_duration = source.total_duration();
        self.sink.append(source);
        self.current = Some(path.to_path_buf());
        Ok(())
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn resume(&mut self) {
        self.sink.play();
    }

    fn stop(&mut self) {
        self.sink.stop();
        self.current = None;
        self.track_duration = None;
    }

    fn is_paused(&self) -> bool {
        self.sink.is_paused()
    }

    fn current_track(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    fn position(&self) -> Option<Duration> {
        self.current.as_ref()?;
        Some(self.sink.get_pos())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn seek_to(&mut self, position: Duration) -> Result<()> {
        if self.current.is_none() {
            return Err(anyhow::anyhow!("no active track"));
        }

        self.sink
            .try_seek(position)
            .map_err(|err| anyhow::anyhow!("failed to seek current track: {err:?}"))
    }

    fn is_finished(&self) -> bool {
        self.current.is_some() && !self.sink.is_paused() && self.sink.empty()
    }
}

/// Engine with a logical clock only; used headless and in tests.
pub struct NullAudioEngine {
    paused: bool,
    current: Option<PathBuf>,
    started_at: Option<Instant>,
    position_offset: Duration,
    track_duration: Option<Duration>,
}

impl NullAudioEngine {
    pub fn new() -> Self {
        Self {
            paused: false,
            current: None,
            started_at: None,
            position_offset: Duration::ZERO,
            track_duration: None,
        }
    }

    pub fn with_duration(duration: Duration) -> Self {
        Self {
            track_duration: Some(duration),
            ..Self::new()
        }
    }

    fn estimate_duration(path: &Path) -> Option<Duration> {
        let file = File::open(path).ok()?;
        let source = Decoder::try_from(file).ok()?;
        source
            .total_duration()
            .filter(|duration| !duration.is_zero())
    }

    fn current_position(&self) -> Duration {
        let mut position = self.position_offset;
        if !self.paused
            && self.current.is_some()
            && let Some(started_at) = self.started_at
        {
            position = position.saturating_add(started_at.elapsed());
        }
        if let Some(duration) = self.track_duration {
            return position.min(duration);
        }
        position
    }
}

impl Default for NullAudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine for NullAudioEngine {
    fn play(&mut self, path: &Path) -> Result<()> {
        self.paused = false;
        self.current = Some(path.to_path_buf());
        self.started_at = Some(Instant::now());
        self.position_offset = Duration::ZERO;
        self.track_duration = Self::estimate_duration(path).or(self.track_duration);
        Ok(())
    }

    fn pause(&mut self) {
        self.position_offset = self.current_position();
        self.started_at = None;
        self.paused = true;
    }

    fn resume(&mut self) {
        if self.current.is_some() {
            self.started_at = Some(Instant::now());
        }
        self.paused = false;
    }

    fn stop(&mut self) {
        self.current = None;
        self.paused = false;
        self.started_at = None;
        self.position_offset = Duration::ZERO;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn current_track(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    fn position(&self) -> Option<Duration> {
        self.current.as_ref()?;
        Some(self.current_position())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn seek_to(&mut self, position: Duration) -> Result<()> {
        if self.current.is_none() {
            return Err(anyhow::anyhow!("no active track"));
        }

        self.position_offset = self
            .track_duration
            .map_or(position, |duration| position.min(duration));
        self.started_at = if self.paused {
            None
        } else {
            Some(Instant::now())
        };
        Ok(())
    }

    fn is_finished(&self) -> bool {
        let Some(duration) = self.track_duration else {
            return false;
        };
        self.current.is_some() && !self.paused && self.current_position() >= duration
    }
}

/// Progress reported by the engine thread.
///
/// `generation` names the start, seek or stop the event belongs to; events
/// from an older generation may still be in flight after a newer command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Position { generation: u64, position_ms: u64 },
    Finished { generation: u64 },
    Failed(String),
}

enum EngineRequest {
    Command {
        command: EngineCommand,
        generation: u64,
    },
    Shutdown,
}

/// Owns an engine on its own thread and reports progress back over a channel.
///
/// The engine is built inside the thread, so it does not need to be `Send`.
/// Position events are only emitted while a track is playing.
pub struct EngineHandle {
    cmd_tx: Sender<EngineRequest>,
    generation: Arc<AtomicU64>,
}

impl EngineHandle {
    pub fn spawn<F>(factory: F) -> (Self, Receiver<EngineEvent>)
    where
        F: FnOnce() -> Box<dyn AudioEngine> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        thread::spawn(move || engine_loop(factory(), cmd_rx, event_tx));
        let handle = Self {
            cmd_tx,
            generation: Arc::new(AtomicU64::new(0)),
        };
        (handle, event_rx)
    }

    /// Prefers the system output and falls back to the silent engine.
    pub fn spawn_default() -> (Self, Receiver<EngineEvent>) {
        Self::spawn(|| match RodioAudioEngine::new() {
            Ok(engine) => Box::new(engine),
            Err(err) => {
                log::warn!("no audio output, continuing silently: {err:#}");
                Box::new(NullAudioEngine::new())
            }
        })
    }

    /// Start, seek and stop begin a new generation; pause and resume keep it.
    pub fn send(&self, command: EngineCommand) {
        let generation = if matches!(
            command,
            EngineCommand::Start(_) | EngineCommand::Seek(_) | EngineCommand::Stop
        ) {
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.generation()
        };
        let request = EngineRequest::Command {
            command,
            generation,
        };
        if self.cmd_tx.send(request).is_err() {
            log::warn!("audio engine thread is gone");
        }
    }

    /// Generation of the most recently sent command.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(EngineRequest::Shutdown);
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn engine_loop(
    mut engine: Box<dyn AudioEngine>,
    cmd_rx: Receiver<EngineRequest>,
    event_tx: Sender<EngineEvent>,
) {
    let mut finished_reported = false;
    let mut last_tick = Instant::now();
    let mut current_generation = 0;

    loop {
        match cmd_rx.recv_timeout(POSITION_TICK) {
            Ok(EngineRequest::Command {
                command,
                generation,
            }) => {
                if generation != current_generation {
                    current_generation = generation;
                    finished_reported = false;
                }
                if let Err(err) = execute(&mut *engine, command) {
                    log::error!("audio engine command failed: {err:#}");
                    if event_tx.send(EngineEvent::Failed(format!("{err:#}"))).is_err() {
                        break;
                    }
                }
            }
            Ok(EngineRequest::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        if engine.current_track().is_none() || engine.is_paused() {
            continue;
        }
        if last_tick.elapsed() < POSITION_TICK {
            continue;
        }
        last_tick = Instant::now();

        let event = if engine.is_finished() {
            if finished_reported {
                continue;
            }
            finished_reported = true;
            EngineEvent::Finished {
                generation: current_generation,
            }
        } else {
            let position = engine.position().unwrap_or_default();
            EngineEvent::Position {
                generation: current_generation,
                position_ms: u64::try_from(position.as_millis()).unwrap_or(u64::MAX),
            }
        };
        if event_tx.send(event).is_err() {
            break;
        }
    }

    engine.stop();
    log::debug!("audio engine thread stopped");
}

fn execute(engine: &mut dyn AudioEngine, command: EngineCommand) -> Result<()> {
    match command {
        EngineCommand::Start(path) => engine.play(&path)?,
        EngineCommand::Resume => engine.resume(),
        EngineCommand::Pause => engine.pause(),
        EngineCommand::Seek(position_ms) => {
            engine.seek_to(Duration::from_millis(position_ms))?;
        }
        EngineCommand::Stop => engine.stop(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_test_wav(path: &Path, duration_ms: u32) {
        let sample_rate: u32 = 44_100;
        let channels: u16 = 1;
        let bits_per_sample: u16 = 16;
        let bytes_per_sample = u32::from(bits_per_sample / 8);
        let total_samples = (u64::from(sample_rate) * u64::from(duration_ms) / 1_000) as u32;
        let data_size = total_samples * u32::from(channels) * bytes_per_sample;
        let byte_rate = sample_rate * u32::from(channels) * bytes_per_sample;
        let block_align = channels * (bits_per_sample / 8);
        let riff_chunk_size = 36_u32.saturating_add(data_size);

        let mut bytes = Vec::with_capacity((44_u32 + data_size) as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&riff_chunk_size.to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16_u32.to_le_bytes());
        bytes.extend_from_slice(&1_u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&byte_rate.to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&bits_per_sample.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_size.to_le_bytes());
        bytes.resize((44_u32 + data_size) as usize, 0_u8);

        fs::write(path, bytes).expect("wav fixture should be written");
    }

    #[test]
    fn null_engine_pause_freezes_position() {
        let mut engine = NullAudioEngine::new();
        engine
            .play(Path::new("nonexistent-track.flac"))
            .expect("play should still work in null mode");
        thread::sleep(Duration::from_millis(20));

        engine.pause();
        let paused = engine.position().expect("position should be present");
        thread::sleep(Duration::from_millis(20));
        assert_eq!(engine.position(), Some(paused));

        engine.resume();
        thread::sleep(Duration::from_millis(20));
        assert!(engine.position().expect("position") > paused);
    }

    #[test]
    fn null_engine_finishes_when_known_duration_elapses() {
        let dir = tempdir().expect("tempdir");
        let track = dir.path().join("fixture.wav");
        write_test_wav(&track, 80);

        let mut engine = NullAudioEngine::new();
        engine.play(&track).expect("play wav fixture");
        assert!(engine.duration().expect("duration") >= Duration::from_millis(70));

        thread::sleep(Duration::from_millis(120));
        assert!(engine.is_finished());
    }

    #[test]
    fn engine_thread_reports_positions_then_finish() {
        let (handle, events) =
            EngineHandle::spawn(|| Box::new(NullAudioEngine::with_duration(Duration::from_millis(150))));
        handle.send(EngineCommand::Start(PathBuf::from("missing.flac")));

        let mut saw_position = false;
        let mut saw_finish = false;
        while let Ok(event) = events.recv_timeout(Duration::from_secs(2)) {
            match event {
                EngineEvent::Position { .. } => saw_position = true,
                EngineEvent::Finished { .. } => {
                    saw_finish = true;
                    break;
                }
                EngineEvent::Failed(err) => panic!("unexpected failure: {err}"),
            }
        }
        assert!(saw_position);
        assert!(saw_finish);
    }

    #[test]
    fn events_carry_the_generation_of_the_latest_start() {
        let (handle, events) = EngineHandle::spawn(|| Box::new(NullAudioEngine::new()));
        handle.send(EngineCommand::Start(PathBuf::from("first.flac")));
        let first = handle.generation();
        handle.send(EngineCommand::Pause);
        assert_eq!(handle.generation(), first);
        handle.send(EngineCommand::Start(PathBuf::from("second.flac")));
        let second = handle.generation();
        assert!(second > first);

        let mut last_seen = None;
        while let Ok(event) = events.recv_timeout(Duration::from_millis(300)) {
            if let EngineEvent::Position { generation, .. } = event {
                last_seen = Some(generation);
                if generation == second {
                    break;
                }
            }
        }
        assert_eq!(last_seen, Some(second));
    }

    #[test]
    fn engine_thread_stays_quiet_while_paused() {
        let (handle, events) = EngineHandle::spawn(|| Box::new(NullAudioEngine::new()));
        handle.send(EngineCommand::Start(PathBuf::from("missing.flac")));
        handle.send(EngineCommand::Pause);
        thread::sleep(Duration::from_millis(150));
        while events.try_recv().is_ok() {}

        thread::sleep(Duration::from_millis(150));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn seek_without_track_reports_failure() {
        let (handle, events) = EngineHandle::spawn(|| Box::new(NullAudioEngine::new()));
        handle.send(EngineCommand::Seek(1_000));
        let event = events
            .recv_timeout(Duration::from_secs(1))
            .expect("failure event");
        assert!(matches!(event, EngineEvent::Failed(_)));
    }
}
