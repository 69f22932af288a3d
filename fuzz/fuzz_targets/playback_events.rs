#![no_main]

use cadence::model::{PlaybackMode, PlaybackQueue, Track};
use cadence::playback::{PlaybackEvent, PlaybackQueueState};
use libfuzzer_sys::fuzz_target;
use std::path::PathBuf;

fn track(idx: u8) -> Track {
    Track {
        path: PathBuf::from(format!("track_{idx}.mp3")),
        title: format!("Track {idx}"),
        ..Track::default()
    }
}

fuzz_target!(|data: &[u8]| {
    let Some((&seed, events)) = data.split_first() else {
        return;
    };
    let mut core = PlaybackQueueState::with_seed(PlaybackMode::Repeat, seed % 2 == 0, seed.into());
    let len = (seed % 16).max(1);
    let queue = PlaybackQueue::unnamed((0..len).map(track).collect());
    core.apply(PlaybackEvent::SelectTrack {
        track: queue.tracks[0].clone(),
        queue,
    });

    for pair in events.chunks(2) {
        let arg = pair.get(1).copied().unwrap_or_default();
        let event = match pair[0] % 14 {
            0 => PlaybackEvent::TogglePlayPause,
            1 => PlaybackEvent::Play,
            2 => PlaybackEvent::Pause,
            3 => PlaybackEvent::SeekToNext,
            4 => PlaybackEvent::SeekToPrevious,
            5 => PlaybackEvent::SeekTo(u64::from(arg) * 1000),
            6 => PlaybackEvent::RemoveFromQueue(usize::from(arg % 20)),
            7 => PlaybackEvent::ReorderQueue {
                from: usize::from(arg % 20),
                to: usize::from(arg / 20 % 20),
            },
            8 => PlaybackEvent::PlayNext(track(arg % 24)),
            9 => PlaybackEvent::AddToQueue(vec![track(arg % 24)]),
            10 => PlaybackEvent::CyclePlaybackMode,
            11 => PlaybackEvent::TrackFinished,
            12 => PlaybackEvent::ResetPlayback,
            _ => {
                let queue = PlaybackQueue::unnamed((0..(arg % 8).max(1)).map(track).collect());
                PlaybackEvent::SelectTrack {
                    track: queue.tracks[usize::from(arg) % queue.len()].clone(),
                    queue,
                }
            }
        };
        core.apply(event);

        let state = core.state();
        match state.current_index {
            Some(index) => assert!(index < state.queue_len()),
            None => assert!(!state.is_playing),
        }
    }
});
