//! Generic observable state model.
//!
//! One [`StateModel`] owns the live state of one overlay instance. It is the
//! single writer: mutations are applied under the watch channel's lock, in
//! request order, and every change is pushed to subscribers and queued for
//! persistence. The in-memory state is authoritative for the running session;
//! the store is a best-effort copy for restart recovery.
//!
//! Persistence runs on a per-instance worker task. Queued snapshots are
//! coalesced so a burst of changes (timer ticks, drags) costs one write.

use std::any::Any;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::{CoreError, Result};
use crate::feature::FeatureType;
use crate::state::{FeatureState, GeometryChange};
use crate::storage::{Record, StateStore};

enum PersistCommand {
    Write(Record),
    Flush(oneshot::Sender<()>),
}

enum PersistMode {
    /// Snapshots go to the worker task.
    Worker(mpsc::UnboundedSender<PersistCommand>),
    /// No Tokio runtime was available at load time; write inline.
    Direct,
    /// Model has been shut down; further snapshots are dropped.
    Closed,
}

struct Persister {
    feature: FeatureType,
    instance_id: u32,
    store: Arc<dyn StateStore>,
    mode: Mutex<PersistMode>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

fn write_record(store: &dyn StateStore, record: &Record) {
    if let Err(e) = store.upsert(record) {
        tracing::warn!(
            feature = %record.feature,
            instance_id = record.instance_id,
            error = %e,
            "failed to persist instance state, keeping in-memory copy"
        );
    }
}

async fn run_worker(store: Arc<dyn StateStore>, mut rx: mpsc::UnboundedReceiver<PersistCommand>) {
    while let Some(command) = rx.recv().await {
        let (mut record, mut acks) = match command {
            PersistCommand::Write(record) => (record, Vec::new()),
            PersistCommand::Flush(ack) => {
                let _ = ack.send(());
                continue;
            }
        };
        // Last write wins for everything already queued; a flush marks the
        // point after which nothing may be merged.
        while let Ok(next) = rx.try_recv() {
            match next {
                PersistCommand::Write(newer) => record = newer,
                PersistCommand::Flush(ack) => {
                    acks.push(ack);
                    break;
                }
            }
        }
        write_record(store.as_ref(), &record);
        for ack in acks {
            let _ = ack.send(());
        }
    }
}

impl Persister {
    fn new(feature: FeatureType, instance_id: u32, store: Arc<dyn StateStore>) -> Self {
        let (mode, worker) = match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let worker = handle.spawn(run_worker(Arc::clone(&store), rx));
                (PersistMode::Worker(tx), Some(worker))
            }
            Err(_) => {
                tracing::debug!(%feature, instance_id, "no runtime, persisting inline");
                (PersistMode::Direct, None)
            }
        };
        Self {
            feature,
            instance_id,
            store,
            mode: Mutex::new(mode),
            worker: Mutex::new(worker),
        }
    }

    fn submit(&self, record: Record) {
        let mode = self.mode.lock().unwrap_or_else(|p| p.into_inner());
        match &*mode {
            PersistMode::Worker(tx) => {
                if tx.send(PersistCommand::Write(record)).is_err() {
                    tracing::warn!(
                        feature = %self.feature,
                        instance_id = self.instance_id,
                        "persistence worker stopped, dropping snapshot"
                    );
                }
            }
            PersistMode::Direct => write_record(self.store.as_ref(), &record),
            PersistMode::Closed => {
                tracing::debug!(
                    feature = %self.feature,
                    instance_id = self.instance_id,
                    "model closed, snapshot not persisted"
                );
            }
        }
    }

    async fn flush(&self) {
        let ack = {
            let mode = self.mode.lock().unwrap_or_else(|p| p.into_inner());
            match &*mode {
                PersistMode::Worker(tx) => {
                    let (ack_tx, ack_rx) = oneshot::channel();
                    tx.send(PersistCommand::Flush(ack_tx)).ok().map(|_| ack_rx)
                }
                _ => None,
            }
        };
        if let Some(ack) = ack {
            let _ = ack.await;
        }
    }

    /// Stop accepting snapshots. The returned worker drains its queue and exits.
    fn close(&self) -> Option<JoinHandle<()>> {
        *self.mode.lock().unwrap_or_else(|p| p.into_inner()) = PersistMode::Closed;
        self.worker.lock().unwrap_or_else(|p| p.into_inner()).take()
    }
}

/// Live state of one overlay instance.
pub struct StateModel<S: FeatureState> {
    instance_id: u32,
    tx: watch::Sender<S>,
    persister: Persister,
}

impl<S: FeatureState> StateModel<S> {
    /// Load the instance's record, or create and persist a default one.
    ///
    /// Store read failures and malformed fields degrade to defaults. Only a
    /// zero ID is rejected, since such a state could never be saved.
    pub fn load(instance_id: u32, store: Arc<dyn StateStore>) -> Result<Self> {
        if instance_id == 0 {
            return Err(CoreError::InvalidInstance {
                feature: S::FEATURE,
                instance_id,
            });
        }

        let state = match store.get(S::FEATURE, instance_id) {
            Ok(Some(record)) => {
                tracing::debug!(feature = %S::FEATURE, instance_id, "restored instance state");
                S::from_record(&record)
            }
            Ok(None) => {
                let state = S::with_defaults(instance_id);
                write_record(store.as_ref(), &state.to_record());
                state
            }
            Err(e) => {
                // Do not write defaults back; the stored record may be fine.
                tracing::warn!(
                    feature = %S::FEATURE,
                    instance_id,
                    error = %e,
                    "failed to read instance state, using defaults"
                );
                S::with_defaults(instance_id)
            }
        };

        Ok(Self::from_state(state, store))
    }

    fn from_state(state: S, store: Arc<dyn StateStore>) -> Self {
        let instance_id = state.instance_id();
        let (tx, _rx) = watch::channel(state);
        Self {
            instance_id,
            tx,
            persister: Persister::new(S::FEATURE, instance_id, store),
        }
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    pub fn current(&self) -> S {
        self.tx.borrow().clone()
    }

    /// Receive every subsequent state change.
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.tx.subscribe()
    }

    /// Apply `mutation` and return the resulting state.
    pub fn apply(&self, mutation: &S::Mutation) -> S {
        self.apply_changed(mutation)
            .unwrap_or_else(|| self.current())
    }

    /// Apply `mutation`, returning the new state only if something changed.
    ///
    /// Unchanged results notify nobody and persist nothing.
    pub fn apply_changed(&self, mutation: &S::Mutation) -> Option<S> {
        let mut changed = None;
        self.tx.send_if_modified(|state| {
            let next = state.apply(mutation);
            if next == *state {
                return false;
            }
            // Queued under the channel lock so snapshots reach the worker in
            // the order they were produced.
            self.persister.submit(next.to_record());
            *state = next;
            changed = Some(state.clone());
            true
        });
        changed
    }

    /// Wait until every snapshot queued so far has been handed to the store.
    pub async fn flush(&self) {
        self.persister.flush().await;
    }

    /// Remove the instance's record. Pool release is the caller's job.
    pub fn delete_record(&self) -> bool {
        match self.persister.store.delete(S::FEATURE, self.instance_id) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    feature = %S::FEATURE,
                    instance_id = self.instance_id,
                    error = %e,
                    "failed to delete instance record"
                );
                false
            }
        }
    }

    /// Stop persisting and wait for queued snapshots to land.
    pub async fn shutdown(&self) {
        if let Some(worker) = self.persister.close() {
            let _ = worker.await;
        }
    }
}

/// Type-erased view of a model, as held by the coordinator.
pub trait ManagedModel: Send + Sync {
    fn feature(&self) -> FeatureType;

    fn instance_id(&self) -> u32;

    fn apply_geometry(&self, change: GeometryChange) -> bool;

    fn snapshot_json(&self) -> serde_json::Value;

    fn delete_record(&self) -> bool;

    /// See [`Persister::close`].
    fn close_persistence(&self) -> Option<JoinHandle<()>>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<S: FeatureState> ManagedModel for StateModel<S> {
    fn feature(&self) -> FeatureType {
        S::FEATURE
    }

    fn instance_id(&self) -> u32 {
        self.instance_id
    }

    fn apply_geometry(&self, change: GeometryChange) -> bool {
        self.apply_changed(&S::Mutation::from(change)).is_some()
    }

    fn snapshot_json(&self) -> serde_json::Value {
        serde_json::to_value(&*self.tx.borrow()).unwrap_or(serde_json::Value::Null)
    }

    fn delete_record(&self) -> bool {
        StateModel::delete_record(self)
    }

    fn close_persistence(&self) -> Option<JoinHandle<()>> {
        self.persister.close()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::state::{ClockMutation, ClockState, TimerMutation, TimerState};
    use crate::storage::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts writes and can be told to fail them.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        upserts: AtomicUsize,
        fail_writes: std::sync::atomic::AtomicBool,
    }

    impl StateStore for CountingStore {
        fn get(&self, f: FeatureType, id: u32) -> Result<Option<Record>, StoreError> {
            self.inner.get(f, id)
        }

        fn upsert(&self, record: &Record) -> Result<(), StoreError> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("disk full".into()));
            }
            self.inner.upsert(record)
        }

        fn delete(&self, f: FeatureType, id: u32) -> Result<(), StoreError> {
            self.inner.delete(f, id)
        }

        fn list_active(&self, f: FeatureType) -> Result<Vec<Record>, StoreError> {
            self.inner.list_active(f)
        }
    }

    #[tokio::test]
    async fn load_creates_and_persists_defaults() {
        let store = Arc::new(CountingStore::default());
        let model = StateModel::<ClockState>::load(2, store.clone()).unwrap();
        assert_eq!(model.current(), ClockState::with_defaults(2));
        assert_eq!(store.upserts.load(Ordering::SeqCst), 1);
        assert!(store.get(FeatureType::Clock, 2).unwrap().is_some());
    }

    #[tokio::test]
    async fn repeated_load_is_idempotent() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let first = StateModel::<TimerState>::load(1, store.clone()).unwrap().current();
        let second = StateModel::<TimerState>::load(1, store).unwrap().current();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn zero_id_is_rejected() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        assert!(matches!(
            StateModel::<ClockState>::load(0, store),
            Err(CoreError::InvalidInstance { instance_id: 0, .. })
        ));
    }

    #[tokio::test]
    async fn noop_mutation_issues_no_write() {
        let store = Arc::new(CountingStore::default());
        let model = StateModel::<ClockState>::load(1, store.clone()).unwrap();
        let before = store.upserts.load(Ordering::SeqCst);

        assert!(model.apply_changed(&ClockMutation::SetShowSeconds(true)).is_none());
        model.flush().await;
        assert_eq!(store.upserts.load(Ordering::SeqCst), before);

        model.apply(&ClockMutation::SetShowSeconds(false));
        model.flush().await;
        assert_eq!(store.upserts.load(Ordering::SeqCst), before + 1);
    }

    #[tokio::test]
    async fn mutations_are_persisted_and_observed() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let model = StateModel::<ClockState>::load(1, store.clone()).unwrap();
        let mut rx = model.subscribe();

        model.apply(&ClockMutation::SetTimeZone("Asia/Tokyo".into()));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().time_zone, "Asia/Tokyo");

        model.flush().await;
        let reloaded = StateModel::<ClockState>::load(1, store).unwrap();
        assert_eq!(reloaded.current().time_zone, "Asia/Tokyo");
    }

    #[tokio::test]
    async fn burst_of_changes_ends_with_last_snapshot() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let model = StateModel::<TimerState>::load(1, store.clone()).unwrap();
        model.apply(&TimerMutation::Start);
        for ms in (0..=1000).step_by(50) {
            model.apply(&TimerMutation::Tick { current_millis: ms });
        }
        model.flush().await;

        let record = store.get(FeatureType::Timer, 1).unwrap().unwrap();
        assert_eq!(TimerState::from_record(&record), model.current());
    }

    #[tokio::test]
    async fn write_failures_keep_memory_state() {
        let store = Arc::new(CountingStore::default());
        let model = StateModel::<ClockState>::load(1, store.clone()).unwrap();
        store.fail_writes.store(true, Ordering::SeqCst);

        let state = model.apply(&ClockMutation::Set24Hour(true));
        model.flush().await;
        assert!(state.use_24_hour);
        assert!(model.current().use_24_hour);
        assert!(!ClockState::from_record(&store.get(FeatureType::Clock, 1).unwrap().unwrap()).use_24_hour);
    }

    #[tokio::test]
    async fn shutdown_drops_later_snapshots() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let model = StateModel::<ClockState>::load(1, store.clone()).unwrap();
        model.apply(&ClockMutation::SetPaused(true));
        model.shutdown().await;
        assert!(model.delete_record());

        model.apply(&ClockMutation::SetPaused(false));
        tokio::task::yield_now().await;
        assert!(store.get(FeatureType::Clock, 1).unwrap().is_none());
    }

    #[test]
    fn without_runtime_writes_inline() {
        let store = Arc::new(CountingStore::default());
        let model = StateModel::<ClockState>::load(1, store.clone()).unwrap();
        model.apply(&ClockMutation::Set24Hour(true));
        assert_eq!(store.upserts.load(Ordering::SeqCst), 2);
    }
}
