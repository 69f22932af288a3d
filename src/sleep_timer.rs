use anyhow::{Result, bail};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(0);

struct Armed {
    id: u64,
    deadline: Instant,
    cancel_tx: Sender<()>,
}

/// Runs one callback after a delay unless cancelled first.
///
/// Starting a new timer cancels the running one.
#[derive(Clone, Default)]
pub struct SleepTimer {
    armed: Arc<Mutex<Option<Armed>>>,
}

impl SleepTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails without touching the running timer when the deadline is out of range.
    pub fn start<F>(&self, duration: Duration, on_fire: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(deadline) = Instant::now().checked_add(duration) else {
            bail!("sleep timer duration is too long");
        };
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
        let id = NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed);
        {
            let mut armed = self.lock();
            if let Some(previous) = armed.take() {
                let _ = previous.cancel_tx.send(());
            }
            *armed = Some(Armed {
                id,
                deadline,
                cancel_tx,
            });
        }

        let armed = Arc::clone(&self.armed);
        thread::spawn(move || {
            if !matches!(
                cancel_rx.recv_timeout(duration),
                Err(RecvTimeoutError::Timeout)
            ) {
                return;
            }
            {
                let mut slot = armed.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if slot.as_ref().map(|current| current.id) != Some(id) {
                    return;
                }
                *slot = None;
            }
            log::info!("sleep timer fired");
            on_fire();
        });
        log::info!("sleep timer set for {}s", duration.as_secs());
        Ok(())
    }

    pub fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(armed) => {
                let _ = armed.cancel_tx.send(());
                log::info!("sleep timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.lock()
            .as_ref()
            .map(|armed| armed.deadline.saturating_duration_since(Instant::now()))
    }

    fn lock(&self) -> MutexGuard<'_, Option<Armed>> {
        self.armed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn fires_once_after_duration() {
        let timer = SleepTimer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        timer.start(Duration::from_millis(30), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("start");
        assert!(timer.remaining().is_some());

        thread::sleep(Duration::from_millis(150));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(timer.remaining(), None);
    }

    #[test]
    fn cancel_prevents_firing() {
        let timer = SleepTimer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        timer.start(Duration::from_millis(50), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("start");
        assert!(timer.cancel());
        assert!(!timer.cancel());

        thread::sleep(Duration::from_millis(120));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn restart_replaces_previous_timer() {
        let timer = SleepTimer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let counter = Arc::clone(&fired);
            timer.start(Duration::from_millis(40), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("start");
        }

        thread::sleep(Duration::from_millis(150));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unrepresentable_deadline_is_rejected() {
        let timer = SleepTimer::new();
        timer.start(Duration::from_secs(60), || {}).expect("start");

        let err = timer.start(Duration::MAX, || {}).expect_err("too long");
        assert!(err.to_string().contains("too long"));
        assert!(timer.remaining().is_some_and(|left| left <= Duration::from_secs(60)));
        assert!(timer.cancel());
    }
}
