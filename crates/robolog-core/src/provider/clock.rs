//! Playback clock
//!
//! Each provider owns one background thread that wakes every period, runs
//! the provider's tick while the state is `Running`, publishes the index to
//! the registered callbacks, and exits once the state becomes `Closed`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{lock, read, write, ProviderError};

/// State of the periodic loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Ticking and notifying
    Running,
    /// Idle until resumed
    #[default]
    Paused,
    /// Terminal: the loop exits and never restarts
    Closed,
}

/// Lock-guarded playback state
#[derive(Debug, Default)]
pub struct StateCell {
    state: Mutex<PlaybackState>,
}

impl StateCell {
    /// Current state
    pub fn get(&self) -> PlaybackState {
        *lock(&self.state)
    }

    /// Change the state. Leaving `Closed` is refused.
    pub fn set(&self, new_state: PlaybackState) -> bool {
        let mut state = lock(&self.state);
        if *state == PlaybackState::Closed && new_state != PlaybackState::Closed {
            return false;
        }
        *state = new_state;
        true
    }
}

type IndexCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// Index-changed notification fan-out
#[derive(Default)]
pub struct Notifier {
    callbacks: RwLock<Vec<IndexCallback>>,
}

impl Notifier {
    /// Add a callback, called with every published index
    pub fn register<F>(&self, callback: F)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        write(&self.callbacks).push(Arc::new(callback));
    }

    /// Drop every callback
    pub fn clear(&self) {
        write(&self.callbacks).clear();
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        read(&self.callbacks).len()
    }

    /// True when no callback is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every callback with `index`. A panicking callback is logged and
    /// does not prevent the others from running. Callbacks run on a snapshot
    /// of the list, so they may register or clear callbacks themselves.
    pub fn notify(&self, index: usize) {
        let callbacks: Vec<IndexCallback> = read(&self.callbacks).clone();
        for callback in &callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(index))).is_err() {
                error!("Index callback panicked at index {}", index);
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").field("callbacks", &self.len()).finish()
    }
}

/// What the periodic loop drives
pub trait Tick: Send + Sync + 'static {
    /// Current loop state
    fn state(&self) -> PlaybackState;

    /// One iteration of playback or ingestion
    fn tick(&self, period: Duration);

    /// Index published after a tick
    fn published_index(&self) -> usize;

    /// Callbacks told about each published index
    fn notifier(&self) -> &Notifier;
}

/// Handle on the provider's background thread
#[derive(Debug, Default)]
pub struct PeriodicThread {
    handle: Mutex<Option<JoinHandle<()>>>,
    started: Mutex<bool>,
}

impl PeriodicThread {
    /// Spawn the loop. A thread can only be started once.
    pub fn start<T: Tick>(&self, name: &str, period: Duration, target: Arc<T>) -> Result<(), ProviderError> {
        let mut started = lock(&self.started);
        if *started {
            return Err(ProviderError::AlreadyStarted);
        }
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(period, target.as_ref()))
            .map_err(ProviderError::SpawnFailed)?;
        debug!("Started '{}' thread with period {:?}", name, period);
        *lock(&self.handle) = Some(handle);
        *started = true;
        Ok(())
    }

    /// True once `start` succeeded
    pub fn is_started(&self) -> bool {
        *lock(&self.started)
    }

    /// Wait for the loop to exit. The state must already be `Closed`.
    pub fn join(&self) {
        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Closed from inside a callback; the loop exits on its own
                return;
            }
            if handle.join().is_err() {
                error!("Playback thread terminated with a panic");
            }
        }
    }
}

fn run<T: Tick>(period: Duration, target: &T) {
    loop {
        let started = Instant::now();
        match target.state() {
            PlaybackState::Closed => break,
            PlaybackState::Paused => {}
            PlaybackState::Running => {
                if catch_unwind(AssertUnwindSafe(|| target.tick(period))).is_err() {
                    error!("Tick panicked, skipping");
                }
                target.notifier().notify(target.published_index());
            }
        }
        if let Some(remaining) = period.checked_sub(started.elapsed()) {
            thread::sleep(remaining);
        }
    }
    debug!("Playback thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[derive(Default)]
    struct Counter {
        state: StateCell,
        ticks: AtomicUsize,
        notifier: Notifier,
    }

    impl Tick for Counter {
        fn state(&self) -> PlaybackState {
            self.state.get()
        }

        fn tick(&self, _period: Duration) {
            let n = self.ticks.fetch_add(1, Ordering::SeqCst);
            if n == 1 {
                panic!("bad sample");
            }
        }

        fn published_index(&self) -> usize {
            self.ticks.load(Ordering::SeqCst)
        }

        fn notifier(&self) -> &Notifier {
            &self.notifier
        }
    }

    #[test]
    fn test_closed_is_terminal() {
        let cell = StateCell::default();
        assert_eq!(cell.get(), PlaybackState::Paused);
        assert!(cell.set(PlaybackState::Running));
        assert!(cell.set(PlaybackState::Closed));
        assert!(!cell.set(PlaybackState::Running));
        assert_eq!(cell.get(), PlaybackState::Closed);
    }

    #[test]
    fn test_loop_survives_panics_and_stops_on_close() {
        let counter = Arc::new(Counter::default());
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        counter.notifier.register(move |index| {
            let _ = lock(&tx).send(index);
        });
        counter.notifier.register(|_| panic!("consumer bug"));

        counter.state.set(PlaybackState::Running);
        let thread = PeriodicThread::default();
        thread
            .start("test-clock", Duration::from_millis(1), Arc::clone(&counter))
            .unwrap();
        assert!(matches!(
            thread.start("test-clock", Duration::from_millis(1), Arc::clone(&counter)),
            Err(ProviderError::AlreadyStarted)
        ));

        // Keeps notifying past the panicking tick and the panicking callback
        let published: Vec<usize> = rx.iter().take(4).collect();
        assert!(published.windows(2).all(|w| w[0] <= w[1]));

        counter.state.set(PlaybackState::Closed);
        thread.join();
        let ticks = counter.ticks.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(counter.ticks.load(Ordering::SeqCst), ticks);
    }

    #[test]
    fn test_callbacks_may_edit_the_list() {
        let notifier = Arc::new(Notifier::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let inner = Arc::clone(&notifier);
        let counted = Arc::clone(&calls);
        notifier.register(move |_| {
            let counted = Arc::clone(&counted);
            inner.register(move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
            });
        });
        notifier.notify(0);
        assert_eq!(notifier.len(), 2);

        // Newly added callbacks run from the next notification on
        notifier.notify(1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let inner = Arc::clone(&notifier);
        notifier.register(move |_| inner.clear());
        notifier.notify(2);
        assert!(notifier.is_empty());
    }

    #[test]
    fn test_paused_loop_does_not_tick() {
        let counter = Arc::new(Counter::default());
        let thread = PeriodicThread::default();
        thread
            .start("test-paused", Duration::from_millis(1), Arc::clone(&counter))
            .unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(counter.ticks.load(Ordering::SeqCst), 0);
        counter.state.set(PlaybackState::Closed);
        thread.join();
    }
}
