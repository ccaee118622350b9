//! Drift-corrected timer ticking.
//!
//! A running timer is driven by one Tokio task. The task never accumulates
//! tick deltas; every tick derives the displayed value from the anchor taken
//! when ticking started:
//!
//! ```text
//! stopwatch:  current = base + (now - started)
//! countdown:  current = max(0, base - (now - started))
//! ```
//!
//! Active tickers live in a side table keyed by instance ID. Starting a ticker
//! replaces any previous one under the table lock, and each tick checks its
//! generation under that same lock before touching the model, so once
//! [`TickerEngine::stop`] returns no stale tick can land.
//!
//! ## State transitions
//!
//! ```text
//! Idle -> Running -> Idle            (pause)
//! Running -> Finished -> Idle        (countdown hits zero, then reset)
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::model::StateModel;
use crate::state::{TimerKind, TimerMutation, TimerPhase, TimerState};

/// Default tick period.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Called once when a countdown reaches zero, with the instance ID.
pub type FinishCallback = Arc<dyn Fn(u32) + Send + Sync>;

/// Fixed reference a ticker derives every value from.
#[derive(Debug, Clone, Copy)]
pub struct Anchor {
    pub started: Instant,
    pub base_millis: u64,
    pub kind: TimerKind,
}

impl Anchor {
    pub fn millis_at(&self, now: Instant) -> u64 {
        derive_millis(self.kind, self.base_millis, now.saturating_duration_since(self.started))
    }
}

pub fn derive_millis(kind: TimerKind, base_millis: u64, elapsed: Duration) -> u64 {
    let elapsed = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    match kind {
        TimerKind::Stopwatch => base_millis.saturating_add(elapsed),
        TimerKind::Countdown => base_millis.saturating_sub(elapsed),
    }
}

struct ActiveTicker {
    generation: u64,
    anchor: Anchor,
    handle: JoinHandle<()>,
}

type TickerTable = Arc<Mutex<HashMap<u32, ActiveTicker>>>;

fn lock(table: &TickerTable) -> MutexGuard<'_, HashMap<u32, ActiveTicker>> {
    table.lock().unwrap_or_else(|p| p.into_inner())
}

/// Owner of every running timer task.
pub struct TickerEngine {
    period: Duration,
    tickers: TickerTable,
    next_generation: AtomicU64,
}

impl TickerEngine {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            tickers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start ticking `model` from its current value, replacing any ticker
    /// already running for the instance.
    ///
    /// Returns `false` when the timer is not in the running state or no Tokio
    /// runtime is available.
    pub fn start(&self, model: Arc<StateModel<TimerState>>, on_finish: FinishCallback) -> bool {
        let state = model.current();
        let id = state.instance_id;
        if !state.running {
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(instance_id = id, "no runtime available, timer will not tick");
            return false;
        };

        let anchor = Anchor {
            started: Instant::now(),
            base_millis: state.current_millis,
            kind: state.kind,
        };
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let mut table = lock(&self.tickers);
        if let Some(previous) = table.remove(&id) {
            previous.handle.abort();
        }
        let handle = runtime.spawn(tick_loop(
            Arc::clone(&self.tickers),
            id,
            generation,
            anchor,
            self.period,
            model,
            on_finish,
        ));
        table.insert(
            id,
            ActiveTicker {
                generation,
                anchor,
                handle,
            },
        );
        tracing::debug!(instance_id = id, generation, base_millis = anchor.base_millis, "ticker started");
        true
    }

    /// Cancel the instance's ticker and return the value it measured at the
    /// moment of cancellation.
    pub fn stop(&self, instance_id: u32) -> Option<u64> {
        let ticker = lock(&self.tickers).remove(&instance_id)?;
        ticker.handle.abort();
        tracing::debug!(instance_id, generation = ticker.generation, "ticker stopped");
        Some(ticker.anchor.millis_at(Instant::now()))
    }

    /// Value the running ticker would display right now.
    pub fn peek(&self, instance_id: u32) -> Option<u64> {
        lock(&self.tickers)
            .get(&instance_id)
            .map(|t| t.anchor.millis_at(Instant::now()))
    }

    pub fn is_active(&self, instance_id: u32) -> bool {
        lock(&self.tickers).contains_key(&instance_id)
    }

    pub fn active_count(&self) -> usize {
        lock(&self.tickers).len()
    }

    pub fn stop_all(&self) {
        for (_, ticker) in lock(&self.tickers).drain() {
            ticker.handle.abort();
        }
    }
}

impl Default for TickerEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL)
    }
}

impl Drop for TickerEngine {
    fn drop(&mut self) {
        self.stop_all();
    }
}

async fn tick_loop(
    tickers: TickerTable,
    id: u32,
    generation: u64,
    anchor: Anchor,
    period: Duration,
    model: Arc<StateModel<TimerState>>,
    on_finish: FinishCallback,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        let finished = {
            let mut table = lock(&tickers);
            match table.get(&id) {
                Some(active) if active.generation == generation => {}
                _ => return,
            }
            let millis = anchor.millis_at(Instant::now());
            let state = model.apply(&TimerMutation::Tick {
                current_millis: millis,
            });
            if state.running {
                continue;
            }
            table.remove(&id);
            state.phase() == TimerPhase::Finished
        };

        if finished {
            tracing::debug!(instance_id = id, "countdown finished");
            on_finish(id);
        }
        return;
    }
}
