//! Instance lifecycle: spawn, restore, mutate, close.
//!
//! The coordinator owns the `(feature, id) -> model` map, the ID pools and
//! the ticker engine. Hosts talk to instances only through it.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::InstanceIdPool;
use crate::error::{CoreError, Result};
use crate::feature::FeatureType;
use crate::model::{ManagedModel, StateModel};
use crate::probability::{self, CoinFlip, DiceRoll, RandomSource};
use crate::state::{
    ClockState, CoinMutation, CoinState, DiceMutation, DiceState, FeatureState, GeometryChange,
    ScreenMaskState, SpotlightState, TimerKind, TimerMutation, TimerState, TrafficLightState,
};
use crate::storage::{Config, Database, StateStore};
use crate::ticker::{FinishCallback, TickerEngine};

const EVENT_CAPACITY: usize = 64;

type ModelKey = (FeatureType, u32);
type ModelMap = HashMap<ModelKey, Arc<dyn ManagedModel>>;

/// Lifecycle notifications for hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InstanceEvent {
    Spawned {
        feature: FeatureType,
        instance_id: u32,
        restored: bool,
    },
    Closed {
        feature: FeatureType,
        instance_id: u32,
    },
    TimerFinished {
        instance_id: u32,
    },
}

/// Result of [`InstanceCoordinator::spawn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnOutcome {
    pub feature: FeatureType,
    pub instance_id: u32,
    /// State came from an existing record rather than defaults.
    pub restored: bool,
    /// The instance was already live; nothing was created.
    pub already_live: bool,
}

/// Owns every live overlay instance.
///
/// Call [`Self::restore_all`] once after construction, before any
/// [`Self::spawn`]. Fresh spawns skip IDs that still have a stored record, so
/// an instance left open by an earlier run is never handed to a new overlay.
pub struct InstanceCoordinator {
    store: Arc<dyn StateStore>,
    pool: InstanceIdPool,
    models: Mutex<ModelMap>,
    ticker: TickerEngine,
    events: broadcast::Sender<InstanceEvent>,
}

impl InstanceCoordinator {
    pub fn new(store: Arc<dyn StateStore>, config: &Config) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            pool: InstanceIdPool::new(|f| config.pools.capacity(f)),
            models: Mutex::new(HashMap::new()),
            ticker: TickerEngine::new(config.tick_interval()),
            events,
        }
    }

    /// Open the configured SQLite database and build a coordinator over it.
    ///
    /// # Errors
    /// Returns an error if the data directory or the database cannot be opened.
    pub fn open(config: &Config) -> Result<Self> {
        let db = Database::open(&config.database_path()?)?;
        Ok(Self::new(Arc::new(db), config))
    }

    fn lock_models(&self) -> MutexGuard<'_, ModelMap> {
        self.models.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn emit(&self, event: InstanceEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<InstanceEvent> {
        self.events.subscribe()
    }

    pub fn pool(&self) -> &InstanceIdPool {
        &self.pool
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    fn load_model(&self, feature: FeatureType, id: u32) -> Result<Arc<dyn ManagedModel>> {
        let store = Arc::clone(&self.store);
        let model: Arc<dyn ManagedModel> = match feature {
            FeatureType::Clock => Arc::new(StateModel::<ClockState>::load(id, store)?),
            FeatureType::Timer => Arc::new(StateModel::<TimerState>::load(id, store)?),
            FeatureType::ScreenMask => Arc::new(StateModel::<ScreenMaskState>::load(id, store)?),
            FeatureType::Spotlight => Arc::new(StateModel::<SpotlightState>::load(id, store)?),
            FeatureType::TrafficLight => {
                Arc::new(StateModel::<TrafficLightState>::load(id, store)?)
            }
            FeatureType::Dice => Arc::new(StateModel::<DiceState>::load(id, store)?),
            FeatureType::Coin => Arc::new(StateModel::<CoinState>::load(id, store)?),
        };
        Ok(model)
    }

    /// Load the model for an ID already registered in the pool. Releases the
    /// ID again if loading fails.
    fn attach(&self, models: &mut ModelMap, feature: FeatureType, id: u32) -> Result<bool> {
        let restored = matches!(self.store.get(feature, id), Ok(Some(_)));
        match self.load_model(feature, id) {
            Ok(model) => {
                models.insert((feature, id), model);
                Ok(restored)
            }
            Err(e) => {
                self.pool.release(feature, id);
                Err(e)
            }
        }
    }

    fn after_attach(&self, feature: FeatureType, id: u32, restored: bool) {
        if feature == FeatureType::Timer {
            self.resume_ticker(id);
        }
        tracing::info!(%feature, instance_id = id, restored, "instance spawned");
        self.emit(InstanceEvent::Spawned {
            feature,
            instance_id: id,
            restored,
        });
    }

    /// Create an instance, or re-attach one with a known ID.
    ///
    /// Spawning an ID that is already live returns it unchanged. An ID kept
    /// allocated by [`Self::shutdown`] is re-attached from its record.
    ///
    /// # Errors
    /// [`CoreError::AllocationExhausted`] when the pool is full,
    /// [`CoreError::InvalidInstance`] when `requested` is outside the pool.
    pub fn spawn(&self, feature: FeatureType, requested: Option<u32>) -> Result<SpawnOutcome> {
        let mut models = self.lock_models();

        let id = match requested {
            Some(id) if models.contains_key(&(feature, id)) => {
                return Ok(SpawnOutcome {
                    feature,
                    instance_id: id,
                    restored: false,
                    already_live: true,
                });
            }
            Some(id) => {
                let kept = self.pool.is_allocated(feature, id);
                if !kept && !self.pool.register_existing(feature, id) {
                    tracing::warn!(%feature, instance_id = id, "cannot register requested instance id");
                    return Err(CoreError::InvalidInstance {
                        feature,
                        instance_id: id,
                    });
                }
                id
            }
            None => self.allocate_fresh(feature).ok_or(CoreError::AllocationExhausted {
                feature,
                capacity: self.pool.capacity(feature),
            })?,
        };

        let restored = self.attach(&mut models, feature, id)?;
        drop(models);
        self.after_attach(feature, id, restored);

        Ok(SpawnOutcome {
            feature,
            instance_id: id,
            restored,
            already_live: false,
        })
    }

    /// Smallest free ID without a stored record. IDs passed over stay free for
    /// [`Self::restore_all`].
    fn allocate_fresh(&self, feature: FeatureType) -> Option<u32> {
        let mut occupied = Vec::new();
        let fresh = loop {
            let Some(id) = self.pool.allocate(feature) else {
                break None;
            };
            match self.store.get(feature, id) {
                Ok(Some(_)) => {
                    tracing::warn!(%feature, instance_id = id, "skipping id with an unrestored record");
                    occupied.push(id);
                }
                _ => break Some(id),
            }
        };
        for id in occupied {
            self.pool.release(feature, id);
        }
        fresh
    }

    /// Re-attach every stored instance.
    ///
    /// Records with an ID outside the pool move to the smallest free ID, or
    /// are deleted once the pool is full. Running timers resume from their
    /// persisted value. Returns the number of instances attached.
    pub fn restore_all(&self) -> usize {
        let mut attached = Vec::new();
        {
            let mut models = self.lock_models();
            for feature in FeatureType::ALL {
                let records = match self.store.list_active(feature) {
                    Ok(records) => records,
                    Err(e) => {
                        tracing::warn!(%feature, error = %e, "failed to list stored instances");
                        continue;
                    }
                };

                let mut misplaced = Vec::new();
                for record in records {
                    let id = record.instance_id;
                    if models.contains_key(&(feature, id)) {
                        continue;
                    }
                    // IDs kept by an earlier shutdown are still ours.
                    if self.pool.register_existing(feature, id)
                        || self.pool.is_allocated(feature, id)
                    {
                        match self.attach(&mut models, feature, id) {
                            Ok(restored) => attached.push((feature, id, restored)),
                            Err(e) => {
                                tracing::warn!(%feature, instance_id = id, error = %e, "failed to restore instance");
                            }
                        }
                    } else {
                        misplaced.push(record);
                    }
                }

                for mut record in misplaced {
                    let old_id = record.instance_id;
                    if let Err(e) = self.store.delete(feature, old_id) {
                        tracing::warn!(%feature, instance_id = old_id, error = %e, "failed to remove misplaced record");
                        continue;
                    }
                    let Some(new_id) = self.pool.allocate(feature) else {
                        tracing::warn!(%feature, instance_id = old_id, "pool full, dropping stored instance");
                        continue;
                    };
                    record.instance_id = new_id;
                    if let Err(e) = self.store.upsert(&record) {
                        tracing::warn!(%feature, instance_id = new_id, error = %e, "failed to move stored instance");
                        self.pool.release(feature, new_id);
                        continue;
                    }
                    tracing::info!(%feature, from = old_id, to = new_id, "reassigned stored instance id");
                    match self.attach(&mut models, feature, new_id) {
                        Ok(restored) => attached.push((feature, new_id, restored)),
                        Err(e) => {
                            tracing::warn!(%feature, instance_id = new_id, error = %e, "failed to restore instance");
                        }
                    }
                }
            }
        }

        for &(feature, id, restored) in &attached {
            self.after_attach(feature, id, restored);
        }
        attached.len()
    }

    /// Tear an instance down: stop its ticker, drain pending writes, delete
    /// its record and free its ID. Unknown instances are a no-op.
    pub async fn close(&self, feature: FeatureType, id: u32) -> bool {
        let Some(model) = self.lock_models().remove(&(feature, id)) else {
            tracing::debug!(%feature, instance_id = id, "close of unknown instance ignored");
            return false;
        };

        if feature == FeatureType::Timer {
            self.ticker.stop(id);
        }
        if let Some(worker) = model.close_persistence() {
            let _ = worker.await;
        }
        model.delete_record();
        self.pool.release(feature, id);

        tracing::info!(%feature, instance_id = id, "instance closed");
        self.emit(InstanceEvent::Closed {
            feature,
            instance_id: id,
        });
        true
    }

    /// Stop every ticker and drain every model's writes. Records and pool IDs
    /// are kept, so a later [`Self::restore_all`] picks the instances up again.
    pub async fn shutdown(&self) {
        let models: Vec<(ModelKey, Arc<dyn ManagedModel>)> = self.lock_models().drain().collect();

        for ((feature, id), model) in &models {
            if *feature == FeatureType::Timer {
                if let Some(measured) = self.ticker.stop(*id) {
                    if let Ok(timer) = Arc::clone(model).into_any().downcast::<StateModel<TimerState>>() {
                        timer.apply(&TimerMutation::Tick {
                            current_millis: measured,
                        });
                    }
                }
            }
        }
        self.ticker.stop_all();

        for (_, model) in models {
            if let Some(worker) = model.close_persistence() {
                let _ = worker.await;
            }
        }
        tracing::info!("coordinator shut down");
    }

    /// Live instance IDs of `feature`, ascending.
    pub fn active(&self, feature: FeatureType) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .lock_models()
            .keys()
            .filter(|(f, _)| *f == feature)
            .map(|(_, id)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_live(&self, feature: FeatureType, id: u32) -> bool {
        self.lock_models().contains_key(&(feature, id))
    }

    /// Typed handle on a live model.
    ///
    /// Timer start, pause, reset, lap and kind changes belong to the
    /// coordinator; applying them on the handle bypasses the ticker.
    pub fn model<S: FeatureState>(&self, id: u32) -> Option<Arc<StateModel<S>>> {
        let model = self.lock_models().get(&(S::FEATURE, id)).cloned()?;
        model.into_any().downcast::<StateModel<S>>().ok()
    }

    fn require<S: FeatureState>(&self, id: u32) -> Result<Arc<StateModel<S>>> {
        self.model::<S>(id).ok_or_else(|| {
            tracing::warn!(feature = %S::FEATURE, instance_id = id, "no such live instance");
            CoreError::InvalidInstance {
                feature: S::FEATURE,
                instance_id: id,
            }
        })
    }

    /// Apply a feature mutation and return the resulting state.
    ///
    /// Timer mutations go through the timer operations below so the ticker
    /// stays in step with the state.
    pub fn apply<S: FeatureState>(&self, id: u32, mutation: &S::Mutation) -> Result<S> {
        if let Some(timer) = (mutation as &dyn Any).downcast_ref::<TimerMutation>() {
            let state: Box<dyn Any> = Box::new(self.apply_timer(id, timer)?);
            if let Ok(state) = state.downcast::<S>() {
                return Ok(*state);
            }
        }
        Ok(self.require::<S>(id)?.apply(mutation))
    }

    fn apply_timer(&self, id: u32, mutation: &TimerMutation) -> Result<TimerState> {
        match *mutation {
            TimerMutation::Start => self.start_timer(id),
            TimerMutation::Pause { .. } => self.pause_timer(id),
            TimerMutation::Reset => self.reset_timer(id),
            TimerMutation::Lap => self.lap_timer(id),
            TimerMutation::SetKind(kind) => self.set_timer_kind(id, kind),
            TimerMutation::Tick { .. } => {
                // The ticker is the only source of tick values.
                tracing::debug!(instance_id = id, "external timer tick ignored");
                Ok(self.require::<TimerState>(id)?.current())
            }
            _ => Ok(self.require::<TimerState>(id)?.apply(mutation)),
        }
    }

    /// Deliver a drag, resize or lock event. Returns whether anything changed.
    pub fn apply_geometry(
        &self,
        feature: FeatureType,
        id: u32,
        change: GeometryChange,
    ) -> Result<bool> {
        let model = self.lock_models().get(&(feature, id)).cloned();
        match model {
            Some(model) => Ok(model.apply_geometry(change)),
            None => {
                tracing::warn!(%feature, instance_id = id, "geometry change for unknown instance");
                Err(CoreError::InvalidInstance {
                    feature,
                    instance_id: id,
                })
            }
        }
    }

    /// Current state of an instance as JSON.
    pub fn snapshot(&self, feature: FeatureType, id: u32) -> Option<serde_json::Value> {
        let model = self.lock_models().get(&(feature, id)).cloned()?;
        Some(model.snapshot_json())
    }

    fn finish_callback(&self) -> FinishCallback {
        let events = self.events.clone();
        Arc::new(move |instance_id| {
            tracing::info!(instance_id, "timer finished");
            let _ = events.send(InstanceEvent::TimerFinished { instance_id });
        })
    }

    fn resume_ticker(&self, id: u32) {
        if let Some(model) = self.model::<TimerState>(id) {
            if model.current().running && !self.ticker.is_active(id) {
                tracing::debug!(instance_id = id, "resuming running timer");
                self.ticker.start(model, self.finish_callback());
            }
        }
    }

    pub fn start_timer(&self, id: u32) -> Result<TimerState> {
        let model = self.require::<TimerState>(id)?;
        let state = model.apply(&TimerMutation::Start);
        if state.running && !self.ticker.is_active(id) {
            self.ticker.start(model, self.finish_callback());
        }
        Ok(state)
    }

    pub fn pause_timer(&self, id: u32) -> Result<TimerState> {
        let model = self.require::<TimerState>(id)?;
        let measured = self.ticker.stop(id);
        Ok(model.apply(&TimerMutation::Pause {
            current_millis: measured,
        }))
    }

    pub fn reset_timer(&self, id: u32) -> Result<TimerState> {
        let model = self.require::<TimerState>(id)?;
        self.ticker.stop(id);
        Ok(model.apply(&TimerMutation::Reset))
    }

    /// Record a lap at the ticker's exact current value.
    pub fn lap_timer(&self, id: u32) -> Result<TimerState> {
        let model = self.require::<TimerState>(id)?;
        if let Some(current_millis) = self.ticker.peek(id) {
            model.apply(&TimerMutation::Tick { current_millis });
        }
        Ok(model.apply(&TimerMutation::Lap))
    }

    pub fn set_timer_kind(&self, id: u32, kind: TimerKind) -> Result<TimerState> {
        let model = self.require::<TimerState>(id)?;
        if model.current().kind != kind {
            self.ticker.stop(id);
        }
        Ok(model.apply(&TimerMutation::SetKind(kind)))
    }

    pub fn set_timer_duration(&self, id: u32, millis: u64) -> Result<TimerState> {
        Ok(self
            .require::<TimerState>(id)?
            .apply(&TimerMutation::SetDuration(millis)))
    }

    /// Roll the instance's configured dice and record the outcome.
    pub fn roll_dice(&self, id: u32, rng: &mut (impl RandomSource + ?Sized)) -> Result<DiceRoll> {
        let model = self.require::<DiceState>(id)?;
        let roll = probability::roll_dice(&model.current().configs, rng);
        model.apply(&DiceMutation::RecordRoll(roll.clone()));
        Ok(roll)
    }

    /// Flip the instance's configured coins and record the outcome.
    pub fn flip_coins(&self, id: u32, rng: &mut (impl RandomSource + ?Sized)) -> Result<CoinFlip> {
        let model = self.require::<CoinState>(id)?;
        let flip = probability::flip_coins(&model.current().configs, rng);
        model.apply(&CoinMutation::RecordFlip(flip.clone()));
        Ok(flip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probability::DieType;
    use crate::state::{ClockMutation, TimerPhase};
    use crate::storage::{MemoryStore, Record};
    use rand::SeedableRng;
    use rand_pcg::Pcg64;
    use std::time::Duration;

    fn coordinator() -> (Arc<MemoryStore>, InstanceCoordinator) {
        let store = Arc::new(MemoryStore::new());
        let coord = InstanceCoordinator::new(store.clone(), &Config::default());
        (store, coord)
    }

    #[tokio::test]
    async fn spawn_hands_out_smallest_ids_until_exhausted() {
        let (_, coord) = coordinator();
        for expected in 1..=4 {
            let outcome = coord.spawn(FeatureType::Spotlight, None).unwrap();
            assert_eq!(outcome.instance_id, expected);
            assert!(!outcome.restored);
        }
        let err = coord.spawn(FeatureType::Spotlight, None).unwrap_err();
        assert!(matches!(
            err,
            CoreError::AllocationExhausted {
                feature: FeatureType::Spotlight,
                capacity: 4
            }
        ));

        assert!(coord.close(FeatureType::Spotlight, 2).await);
        assert_eq!(coord.spawn(FeatureType::Spotlight, None).unwrap().instance_id, 2);
    }

    #[tokio::test]
    async fn spawning_live_id_is_idempotent() {
        let (_, coord) = coordinator();
        coord.spawn(FeatureType::Clock, Some(3)).unwrap();
        coord
            .apply::<ClockState>(3, &ClockMutation::SetTimeZone("Asia/Tokyo".into()))
            .unwrap();

        let again = coord.spawn(FeatureType::Clock, Some(3)).unwrap();
        assert!(again.already_live);
        assert_eq!(coord.active(FeatureType::Clock), vec![3]);
        assert_eq!(coord.model::<ClockState>(3).unwrap().current().time_zone, "Asia/Tokyo");
    }

    #[tokio::test]
    async fn out_of_range_request_is_rejected() {
        let (_, coord) = coordinator();
        assert!(matches!(
            coord.spawn(FeatureType::Dice, Some(9)),
            Err(CoreError::InvalidInstance { instance_id: 9, .. })
        ));
        assert!(matches!(
            coord.spawn(FeatureType::Dice, Some(0)),
            Err(CoreError::InvalidInstance { instance_id: 0, .. })
        ));
        assert!(coord.pool().allocated(FeatureType::Dice).is_empty());
    }

    #[tokio::test]
    async fn close_deletes_record_and_unknown_close_is_noop() {
        let (store, coord) = coordinator();
        coord.spawn(FeatureType::Coin, None).unwrap();
        assert!(store.get(FeatureType::Coin, 1).unwrap().is_some());

        let mut events = coord.subscribe_events();
        assert!(coord.close(FeatureType::Coin, 1).await);
        assert!(store.get(FeatureType::Coin, 1).unwrap().is_none());
        assert!(!coord.pool().is_allocated(FeatureType::Coin, 1));
        assert_eq!(
            events.try_recv().unwrap(),
            InstanceEvent::Closed {
                feature: FeatureType::Coin,
                instance_id: 1
            }
        );

        assert!(!coord.close(FeatureType::Coin, 1).await);
        assert!(!coord.close(FeatureType::Coin, 42).await);
    }

    #[tokio::test]
    async fn restore_reattaches_and_repairs_ids() {
        let (store, coord) = coordinator();
        coord.spawn(FeatureType::Spotlight, None).unwrap();
        coord.spawn(FeatureType::Spotlight, None).unwrap();
        coord
            .apply_geometry(FeatureType::Spotlight, 2, GeometryChange::Move { x: 7, y: 8 })
            .unwrap();
        coord.shutdown().await;

        let stray = SpotlightState::with_defaults(1).to_record();
        store
            .upsert(&Record {
                instance_id: 17,
                ..stray
            })
            .unwrap();

        let coord = InstanceCoordinator::new(store.clone(), &Config::default());
        assert_eq!(coord.restore_all(), 3);
        assert_eq!(coord.active(FeatureType::Spotlight), vec![1, 2, 3]);
        assert!(store.get(FeatureType::Spotlight, 17).unwrap().is_none());

        let moved = coord.model::<SpotlightState>(2).unwrap().current();
        assert_eq!((moved.geometry.x, moved.geometry.y), (7, 8));
        assert_eq!(coord.model::<SpotlightState>(3).unwrap().current().instance_id, 3);
    }

    #[tokio::test]
    async fn shutdown_keeps_ids_for_restore() {
        let (_, coord) = coordinator();
        coord.spawn(FeatureType::Clock, None).unwrap();
        coord.spawn(FeatureType::Clock, None).unwrap();
        coord.shutdown().await;

        assert!(coord.active(FeatureType::Clock).is_empty());
        assert_eq!(coord.pool().allocated(FeatureType::Clock), vec![1, 2]);
        assert_eq!(coord.restore_all(), 2);
        assert_eq!(coord.active(FeatureType::Clock), vec![1, 2]);
    }

    #[tokio::test]
    async fn kept_id_can_be_respawned_after_shutdown() {
        let (_, coord) = coordinator();
        coord.spawn(FeatureType::Clock, None).unwrap();
        coord
            .apply::<ClockState>(1, &ClockMutation::SetTimeZone("Asia/Tokyo".into()))
            .unwrap();
        coord.shutdown().await;

        let outcome = coord.spawn(FeatureType::Clock, Some(1)).unwrap();
        assert_eq!(outcome.instance_id, 1);
        assert!(outcome.restored);
        assert!(!outcome.already_live);
        assert_eq!(coord.model::<ClockState>(1).unwrap().current().time_zone, "Asia/Tokyo");
        assert_eq!(coord.pool().allocated(FeatureType::Clock), vec![1]);
    }

    #[tokio::test]
    async fn fresh_spawn_skips_ids_with_unrestored_records() {
        let (store, _) = coordinator();
        let mut leftover = ClockState::with_defaults(1);
        leftover.time_zone = "Asia/Tokyo".into();
        store.upsert(&leftover.to_record()).unwrap();

        let coord = InstanceCoordinator::new(store.clone(), &Config::default());
        let outcome = coord.spawn(FeatureType::Clock, None).unwrap();
        assert_eq!(outcome.instance_id, 2);
        assert!(!outcome.restored);
        assert!(!coord.pool().is_allocated(FeatureType::Clock, 1));

        assert_eq!(coord.restore_all(), 1);
        assert_eq!(coord.active(FeatureType::Clock), vec![1, 2]);
        assert_eq!(coord.model::<ClockState>(1).unwrap().current().time_zone, "Asia/Tokyo");
    }

    #[tokio::test]
    async fn dice_roll_is_seeded_and_recorded() {
        let (_, coord) = coordinator();
        let id = coord.spawn(FeatureType::Dice, None).unwrap().instance_id;
        coord
            .apply::<DiceState>(
                id,
                &DiceMutation::SetQuantity {
                    die: DieType::D20,
                    quantity: 3,
                },
            )
            .unwrap();

        let a = coord.roll_dice(id, &mut Pcg64::seed_from_u64(7)).unwrap();
        let b = probability::roll_dice(
            &coord.model::<DiceState>(id).unwrap().current().configs,
            &mut Pcg64::seed_from_u64(7),
        );
        assert_eq!(a, b);
        assert_eq!(a.crit_flags.len(), 3);
        assert_eq!(coord.model::<DiceState>(id).unwrap().current().last_roll, Some(a));
    }

    #[tokio::test]
    async fn coin_flip_against_missing_instance_fails() {
        let (_, coord) = coordinator();
        assert!(coord.flip_coins(1, &mut Pcg64::seed_from_u64(1)).is_err());
        coord.spawn(FeatureType::Coin, None).unwrap();
        let flip = coord.flip_coins(1, &mut Pcg64::seed_from_u64(1)).unwrap();
        assert_eq!(flip.heads() + flip.tails(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_emits_finished_event() {
        let (_, coord) = coordinator();
        let id = coord.spawn(FeatureType::Timer, None).unwrap().instance_id;
        coord.set_timer_kind(id, TimerKind::Countdown).unwrap();
        coord.set_timer_duration(id, 1000).unwrap();
        let mut events = coord.subscribe_events();

        assert!(coord.start_timer(id).unwrap().running);
        tokio::time::sleep(Duration::from_millis(1200)).await;

        assert_eq!(
            events.recv().await.unwrap(),
            InstanceEvent::TimerFinished { instance_id: id }
        );
        let state = coord.model::<TimerState>(id).unwrap().current();
        assert_eq!(state.phase(), TimerPhase::Finished);

        let reset = coord.reset_timer(id).unwrap();
        assert_eq!(reset.current_millis, 1000);
        assert_eq!(reset.phase(), TimerPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_measured_value_and_lap_uses_it() {
        let (_, coord) = coordinator();
        let id = coord.spawn(FeatureType::Timer, None).unwrap().instance_id;
        coord.start_timer(id).unwrap();

        tokio::time::sleep(Duration::from_millis(425)).await;
        let lapped = coord.lap_timer(id).unwrap();
        assert_eq!(lapped.laps.len(), 1);
        assert!((425..=426).contains(&lapped.laps[0]), "lap {:?}", lapped.laps);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let paused = coord.pause_timer(id).unwrap();
        assert!(!paused.running);
        assert!((525..=526).contains(&paused.current_millis));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(coord.model::<TimerState>(id).unwrap().current(), paused);
    }

    #[tokio::test(start_paused = true)]
    async fn generic_timer_mutations_keep_ticker_in_step() {
        let (_, coord) = coordinator();
        let id = coord.spawn(FeatureType::Timer, None).unwrap().instance_id;
        coord.start_timer(id).unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;

        let reset = coord.apply::<TimerState>(id, &TimerMutation::Reset).unwrap();
        assert!(!reset.running);
        assert_eq!(reset.current_millis, 0);
        assert!(!coord.ticker.is_active(id));

        assert!(coord.apply::<TimerState>(id, &TimerMutation::Start).unwrap().running);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let ticked = coord.model::<TimerState>(id).unwrap().current().current_millis;
        assert!(ticked <= 150, "ticked {ticked}");

        let ignored = coord
            .apply::<TimerState>(id, &TimerMutation::Tick { current_millis: 99_999 })
            .unwrap();
        assert!(ignored.current_millis <= 150);

        let paused = coord
            .apply::<TimerState>(id, &TimerMutation::Pause { current_millis: None })
            .unwrap();
        assert!(!paused.running);
        assert!(!coord.ticker.is_active(id));
        assert!((100..=150).contains(&paused.current_millis));
    }

    #[tokio::test(start_paused = true)]
    async fn running_timer_resumes_after_restore() {
        let (store, coord) = coordinator();
        let id = coord.spawn(FeatureType::Timer, None).unwrap().instance_id;
        coord.start_timer(id).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        coord.shutdown().await;

        let saved = TimerState::from_record(&store.get(FeatureType::Timer, id).unwrap().unwrap());
        assert!(saved.running);
        assert!((300..=301).contains(&saved.current_millis));

        let coord = InstanceCoordinator::new(store, &Config::default());
        coord.restore_all();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let now = coord.model::<TimerState>(id).unwrap().current().current_millis;
        assert!(now >= saved.current_millis + 150, "now {now}");
    }
}
