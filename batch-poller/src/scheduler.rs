//! Shared poll scheduler and its backoff state machine
//!
//! A [`BatchPoller`] owns the listener registry and a single driver task. The
//! driver sleeps until the shared due time, performs one batch fetch, reconciles
//! the returned events against the registry and re-arms itself, or goes idle
//! once the registry is empty.
//!
//! ```text
//!   Idle --add--> Armed --timer--> Fetching --registry non-empty--> Armed
//!    ^              |                  |
//!    +--- drained --+------ drained ---+
//! ```
//!
//! All registry and timer mutations happen under one lock. Listener callbacks
//! and the fetch itself always run with that lock released, so callbacks may
//! add or remove listeners freely.
//!
//! Callbacks for one listener run under a separate reentrant callback gate.
//! Removal takes the gate before the state lock, so a removal issued from
//! another thread waits for a running `is_pending` or `on_resolved` to return,
//! and once it returns no further callback reaches the removed listener. A
//! callback removing listeners on the driver's own thread re-enters the gate.

use parking_lot::{Mutex, ReentrantMutex};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::backoff::{deadline, jitter, Backoff, CycleOutcome};
use crate::config::PollerConfig;
use crate::error::{PollerError, PollerResult};
use crate::fetch::{fetch_guarded, panic_message, BatchFetch};
use crate::listener::{same_listener, SharedListener};
use crate::registry::ListenerRegistry;
use crate::stats::PollerStats;
use crate::types::{PollEvent, PollKey};

/// Scheduler phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No timer, registry empty
    Idle,
    /// Timer pending, registry non-empty
    Armed,
    /// A batch fetch is in flight
    Fetching,
}

struct SchedulerState<K, M> {
    registry: ListenerRegistry<K, M>,
    phase: Phase,
    backoff: Backoff,

    /// When the armed timer fires; only meaningful while Armed
    due_at: Instant,

    /// Earliest allowed next fire, raised by adds that land mid-fetch
    floor: Option<Instant>,

    /// Fresh arm time for a registry refilled from empty mid-fetch
    fresh_due: Option<Instant>,

    /// Bumped whenever the current driver is retired
    generation: u64,
    driver: Option<JoinHandle<()>>,

    fetch_count: u64,
    fetch_failures: u64,
    resolved_count: u64,
    collision_count: u64,
}

struct Shared<K, M> {
    config: PollerConfig,
    fetcher: Box<dyn BatchFetch<K, M>>,
    state: Mutex<SchedulerState<K, M>>,

    /// Held by the driver around each listener's callbacks; always taken
    /// before `state`
    callbacks: ReentrantMutex<()>,
    wake: Notify,
    runtime: Handle,
}

/// Adaptive batch poller
///
/// Tracks listeners by key and drives one shared fetch cycle for all of them.
/// Dropping the poller cancels its timer.
pub struct BatchPoller<K: PollKey, M: Send + 'static> {
    shared: Arc<Shared<K, M>>,
}

impl<K: PollKey, M: Send + 'static> BatchPoller<K, M> {
    /// Create a poller that fetches through `fetcher`
    ///
    /// Must be called from within a tokio runtime; the driver task is spawned
    /// on that runtime.
    pub fn new<F>(config: PollerConfig, fetcher: F) -> PollerResult<Self>
    where
        F: BatchFetch<K, M> + 'static,
    {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| PollerError::NoRuntime(e.to_string()))?;

        let state = SchedulerState {
            registry: ListenerRegistry::new(),
            phase: Phase::Idle,
            backoff: Backoff::new(config.base_time, config.max_delay),
            due_at: Instant::now(),
            floor: None,
            fresh_due: None,
            generation: 0,
            driver: None,
            fetch_count: 0,
            fetch_failures: 0,
            resolved_count: 0,
            collision_count: 0,
        };

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                fetcher: Box::new(fetcher),
                state: Mutex::new(state),
                callbacks: ReentrantMutex::new(()),
                wake: Notify::new(),
                runtime,
            }),
        })
    }

    /// Track `listener`, replacing any listener already registered for its key
    ///
    /// Arms the scheduler when the registry was empty. Otherwise pushes the next
    /// fire out to at least one base interval from now.
    pub fn add_listener(&self, listener: SharedListener<K, M>) {
        let shared = &self.shared;
        let key = listener.key();
        let now = Instant::now();
        let floor = deadline(now, shared.config.base_time);

        let mut state = shared.state.lock();
        let was_empty = state.registry.is_empty();
        let replaced = state.registry.insert(listener).is_some();

        match state.phase {
            Phase::Idle => {
                let first_jitter = jitter(shared.config.jitter);
                state.backoff.reset();
                state.due_at = deadline(floor, first_jitter);
                state.phase = Phase::Armed;
                state.generation += 1;
                let generation = state.generation;
                state.driver = Some(
                    shared
                        .runtime
                        .spawn(drive(Arc::clone(shared), generation)),
                );
                shared.trace(format_args!(
                    "armed for {key:?} in {:?}",
                    shared.config.base_time.saturating_add(first_jitter)
                ));
            }
            Phase::Armed => {
                if state.due_at < floor {
                    state.due_at = floor;
                    shared.wake.notify_one();
                    shared.trace(format_args!(
                        "{key:?} added, next fire postponed to base interval"
                    ));
                }
            }
            Phase::Fetching => {
                if was_empty {
                    state.backoff.reset();
                    state.fresh_due = Some(deadline(floor, jitter(shared.config.jitter)));
                } else {
                    state.floor = Some(state.floor.map_or(floor, |f| f.max(floor)));
                }
                shared.trace(format_args!("{key:?} added during fetch"));
            }
        }

        if replaced {
            shared.trace(format_args!("replaced existing listener for {key:?}"));
        }
    }

    /// Stop tracking the listener registered under `key`
    ///
    /// Returns whether a listener was removed. Blocks while the driver is
    /// inside a callback on another thread.
    pub fn remove_listener_by_key(&self, key: &K) -> bool {
        let _gate = self.shared.callbacks.lock();
        let mut state = self.shared.state.lock();
        let removed = state.registry.remove_key(key).is_some();
        if removed {
            self.shared.after_removal(&mut state);
        }
        removed
    }

    /// Stop tracking `listener` if it is the instance currently registered
    ///
    /// Returns whether a listener was removed.
    pub fn remove_listener(&self, listener: &SharedListener<K, M>) -> bool {
        let _gate = self.shared.callbacks.lock();
        let mut state = self.shared.state.lock();
        let removed = state.registry.remove_listener(listener).is_some();
        if removed {
            self.shared.after_removal(&mut state);
        }
        removed
    }

    /// Drop every listener and cancel the timer
    ///
    /// A fetch already in flight completes, but its results reach no listener.
    pub fn shutdown(&self) {
        let _gate = self.shared.callbacks.lock();
        let mut state = self.shared.state.lock();
        let count = state.registry.len();
        state.registry.clear();
        self.shared.after_removal(&mut state);
        tracing::info!(name = %self.shared.config.name, "shut down, dropped {count} listener(s)");
    }

    /// Current scheduler phase
    pub fn phase(&self) -> Phase {
        self.shared.state.lock().phase
    }

    /// Whether a cycle is pending or running
    pub fn is_armed(&self) -> bool {
        self.phase() != Phase::Idle
    }

    /// Shared delay between cycles, while armed
    pub fn current_delay(&self) -> Option<Duration> {
        let state = self.shared.state.lock();
        (state.phase != Phase::Idle).then(|| state.backoff.current())
    }

    /// When the armed timer fires next
    pub fn next_fire_at(&self) -> Option<Instant> {
        let state = self.shared.state.lock();
        (state.phase == Phase::Armed).then_some(state.due_at)
    }

    /// Number of tracked listeners
    pub fn listener_count(&self) -> usize {
        self.shared.state.lock().registry.len()
    }

    /// Whether `key` is tracked
    pub fn contains(&self, key: &K) -> bool {
        self.shared.state.lock().registry.contains_key(key)
    }

    /// Tracked keys in ascending order
    pub fn keys(&self) -> Vec<K> {
        self.shared.state.lock().registry.keys()
    }

    /// Snapshot of the poller's counters
    pub fn stats(&self) -> PollerStats {
        let state = self.shared.state.lock();
        PollerStats {
            name: self.shared.config.name.clone(),
            phase: state.phase,
            listeners: state.registry.len(),
            current_delay: state.backoff.current(),
            fetch_count: state.fetch_count,
            fetch_failures: state.fetch_failures,
            resolved_count: state.resolved_count,
            collision_count: state.collision_count,
        }
    }

    /// Configuration this poller was built with
    pub fn config(&self) -> &PollerConfig {
        &self.shared.config
    }
}

impl<K: PollKey, M: Send + 'static> Drop for BatchPoller<K, M> {
    fn drop(&mut self) {
        let _gate = self.shared.callbacks.lock();
        let mut state = self.shared.state.lock();
        state.registry.clear();
        state.generation += 1;
        state.phase = Phase::Idle;
        if let Some(driver) = state.driver.take() {
            driver.abort();
        }
    }
}

impl<K: PollKey, M: Send + 'static> std::fmt::Debug for BatchPoller<K, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("BatchPoller")
            .field("name", &self.shared.config.name)
            .field("phase", &state.phase)
            .field("registry", &state.registry)
            .finish()
    }
}

/// Driver loop for one armed episode
async fn drive<K: PollKey, M: Send + 'static>(shared: Arc<Shared<K, M>>, generation: u64) {
    loop {
        let Some(tracked) = shared.wait_until_due(generation).await else {
            return;
        };

        let outcome = match fetch_guarded(shared.fetcher.as_ref()).await {
            Ok(events) => shared.reconcile(tracked, events),
            Err(e) => {
                tracing::warn!(name = %shared.config.name, "batch fetch failed: {e}");
                CycleOutcome::failed()
            }
        };

        if !shared.rearm(generation, outcome) {
            return;
        }
    }
}

impl<K: PollKey, M: Send + 'static> Shared<K, M> {
    fn trace(&self, message: std::fmt::Arguments<'_>) {
        if self.config.logging {
            tracing::debug!(name = %self.config.name, "{message}");
        }
    }

    /// Sleep until the due time, following extensions
    ///
    /// Returns the listeners tracked when the fetch is issued, or `None` when
    /// this driver has been retired.
    async fn wait_until_due(&self, generation: u64) -> Option<Vec<(K, SharedListener<K, M>)>> {
        loop {
            let due_at = {
                let state = self.state.lock();
                if state.generation != generation || state.phase != Phase::Armed {
                    return None;
                }
                state.due_at
            };

            tokio::select! {
                _ = tokio::time::sleep_until(due_at) => {}
                _ = self.wake.notified() => continue,
            }

            let mut state = self.state.lock();
            if state.generation != generation || state.phase != Phase::Armed {
                return None;
            }
            if Instant::now() < state.due_at {
                continue;
            }
            state.phase = Phase::Fetching;
            state.fetch_count += 1;
            self.trace(format_args!(
                "fetching for {} listener(s)",
                state.registry.len()
            ));
            return Some(state.registry.snapshot());
        }
    }

    /// Match fetched events to the listeners tracked at fetch time
    ///
    /// Listeners removed or replaced since the fetch was issued are skipped.
    fn reconcile(
        &self,
        tracked: Vec<(K, SharedListener<K, M>)>,
        events: Vec<PollEvent<K, M>>,
    ) -> CycleOutcome {
        let mut latest = BTreeMap::new();
        for event in events {
            // Last event for a key wins.
            latest.insert(event.key.clone(), event);
        }

        let mut outcome = CycleOutcome::default();

        for (key, listener) in tracked {
            let Some(event) = latest.remove(&key) else {
                continue;
            };

            let _gate = self.callbacks.lock();
            if !self.is_current(&key, &listener) {
                continue;
            }

            let pending = catch_unwind(AssertUnwindSafe(|| listener.is_pending(&event.model)));
            match pending {
                Ok(true) => {
                    // An upsert may have replaced the listener mid-check.
                    if !self.is_current(&key, &listener) {
                        continue;
                    }
                    outcome.record_collision(event.retry_after);
                    self.trace(format_args!("{key:?} still pending"));
                }
                Ok(false) => {
                    let removed = self
                        .state
                        .lock()
                        .registry
                        .remove_if_same(&key, &listener)
                        .is_some();
                    if !removed {
                        continue;
                    }
                    outcome.record_resolution();
                    self.trace(format_args!("{key:?} resolved"));

                    let model = event.model;
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener.on_resolved(model))) {
                        tracing::error!(
                            name = %self.config.name,
                            "resolution callback for {key:?} panicked: {}",
                            panic_message(panic.as_ref())
                        );
                    }
                }
                Err(panic) => {
                    tracing::error!(
                        name = %self.config.name,
                        "pending check for {key:?} panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
        }

        outcome
    }

    fn is_current(&self, key: &K, listener: &SharedListener<K, M>) -> bool {
        self.state
            .lock()
            .registry
            .get(key)
            .is_some_and(|current| same_listener(current, listener))
    }

    /// Settle the next arm time after a cycle
    ///
    /// Returns `false` when the scheduler went idle.
    fn rearm(&self, generation: u64, outcome: CycleOutcome) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }

        state.collision_count += outcome.collisions as u64;
        state.resolved_count += outcome.resolved as u64;
        if outcome.fetch_failed {
            state.fetch_failures += 1;
        }

        let floor = state.floor.take();
        let fresh_due = state.fresh_due.take();

        if state.registry.is_empty() {
            state.phase = Phase::Idle;
            state.driver = None;
            self.trace(format_args!("registry drained, going idle"));
            return false;
        }

        let now = Instant::now();
        state.due_at = match fresh_due {
            Some(due_at) => due_at,
            None => {
                let delay = state.backoff.next_delay(&outcome);
                let due_at = deadline(now, delay);
                self.trace(format_args!(
                    "cycle done ({} resolved, {} pending), next fetch in {delay:?}",
                    outcome.resolved, outcome.collisions
                ));
                floor.map_or(due_at, |floor| due_at.max(floor))
            }
        };
        state.phase = Phase::Armed;
        true
    }

    /// Regenerate the timer after a listener left the registry
    fn after_removal(&self, state: &mut SchedulerState<K, M>) {
        if !state.registry.is_empty() {
            self.wake.notify_one();
            return;
        }

        state.floor = None;
        state.fresh_due = None;
        if state.phase == Phase::Armed {
            state.generation += 1;
            state.phase = Phase::Idle;
            if let Some(driver) = state.driver.take() {
                driver.abort();
            }
            self.trace(format_args!("registry empty, timer cancelled"));
        }
    }
}
