//! Bounded per-feature instance ID allocation.
//!
//! IDs are small positive integers in `1..=capacity`. Allocation always hands
//! out the smallest free ID so that a released ID is the next one reused.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use crate::feature::FeatureType;

#[derive(Debug)]
struct Pool {
    capacity: u32,
    allocated: BTreeSet<u32>,
}

impl Pool {
    fn new(capacity: u32) -> Self {
        Self {
            capacity,
            allocated: BTreeSet::new(),
        }
    }

    fn allocate(&mut self) -> Option<u32> {
        let id = (1..=self.capacity).find(|id| !self.allocated.contains(id))?;
        self.allocated.insert(id);
        Some(id)
    }

    fn in_range(&self, id: u32) -> bool {
        (1..=self.capacity).contains(&id)
    }
}

/// Instance ID pools for every feature type, one mutex per pool.
#[derive(Debug)]
pub struct InstanceIdPool {
    pools: HashMap<FeatureType, Mutex<Pool>>,
}

impl InstanceIdPool {
    /// Build pools using `capacity_for` to size each feature's pool.
    pub fn new(capacity_for: impl Fn(FeatureType) -> u32) -> Self {
        let pools = FeatureType::ALL
            .into_iter()
            .map(|f| (f, Mutex::new(Pool::new(capacity_for(f)))))
            .collect();
        Self { pools }
    }

    /// Same capacity for every feature.
    pub fn uniform(capacity: u32) -> Self {
        Self::new(|_| capacity)
    }

    fn with_pool<T>(&self, feature: FeatureType, f: impl FnOnce(&mut Pool) -> T) -> Option<T> {
        let pool = self.pools.get(&feature)?;
        let mut guard = match pool.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Some(f(&mut guard))
    }

    /// Take the smallest free ID, or `None` when the pool is full.
    pub fn allocate(&self, feature: FeatureType) -> Option<u32> {
        self.with_pool(feature, Pool::allocate).flatten()
    }

    /// Return an ID to the pool. Releasing a free ID does nothing.
    pub fn release(&self, feature: FeatureType, id: u32) {
        let released = self
            .with_pool(feature, |pool| pool.allocated.remove(&id))
            .unwrap_or(false);
        if !released {
            tracing::debug!(%feature, id, "release of unallocated instance id ignored");
        }
    }

    /// Mark a known ID (restored from a record or a host intent) as taken.
    ///
    /// Returns `false` when the ID is already registered or outside the pool.
    pub fn register_existing(&self, feature: FeatureType, id: u32) -> bool {
        self.with_pool(feature, |pool| pool.in_range(id) && pool.allocated.insert(id))
            .unwrap_or(false)
    }

    pub fn is_allocated(&self, feature: FeatureType, id: u32) -> bool {
        self.with_pool(feature, |pool| pool.allocated.contains(&id))
            .unwrap_or(false)
    }

    /// Whether `id` could ever be handed out for `feature`.
    pub fn is_valid_id(&self, feature: FeatureType, id: u32) -> bool {
        self.with_pool(feature, |pool| pool.in_range(id)).unwrap_or(false)
    }

    pub fn capacity(&self, feature: FeatureType) -> u32 {
        self.with_pool(feature, |pool| pool.capacity).unwrap_or(0)
    }

    /// Allocated IDs in ascending order.
    pub fn allocated(&self, feature: FeatureType) -> Vec<u32> {
        self.with_pool(feature, |pool| pool.allocated.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn allocates_smallest_free_id_until_full() {
        let pool = InstanceIdPool::uniform(3);
        assert_eq!(pool.allocate(FeatureType::Spotlight), Some(1));
        assert_eq!(pool.allocate(FeatureType::Spotlight), Some(2));
        assert_eq!(pool.allocate(FeatureType::Spotlight), Some(3));
        assert_eq!(pool.allocate(FeatureType::Spotlight), None);

        pool.release(FeatureType::Spotlight, 2);
        assert_eq!(pool.allocate(FeatureType::Spotlight), Some(2));
    }

    #[test]
    fn pools_are_independent_per_feature() {
        let pool = InstanceIdPool::uniform(1);
        assert_eq!(pool.allocate(FeatureType::Clock), Some(1));
        assert_eq!(pool.allocate(FeatureType::Timer), Some(1));
        assert_eq!(pool.allocate(FeatureType::Clock), None);
    }

    #[test]
    fn register_existing_is_idempotent() {
        let pool = InstanceIdPool::uniform(4);
        assert!(pool.register_existing(FeatureType::Dice, 3));
        assert!(!pool.register_existing(FeatureType::Dice, 3));
        assert_eq!(pool.allocated(FeatureType::Dice), vec![3]);
        assert_eq!(pool.allocate(FeatureType::Dice), Some(1));
    }

    #[test]
    fn register_existing_rejects_out_of_range() {
        let pool = InstanceIdPool::uniform(4);
        assert!(!pool.register_existing(FeatureType::Coin, 0));
        assert!(!pool.register_existing(FeatureType::Coin, 5));
        assert!(pool.allocated(FeatureType::Coin).is_empty());
    }

    #[test]
    fn release_of_free_id_is_noop() {
        let pool = InstanceIdPool::uniform(2);
        pool.release(FeatureType::Clock, 1);
        assert_eq!(pool.allocate(FeatureType::Clock), Some(1));
    }

    #[test]
    fn concurrent_allocation_never_duplicates() {
        let pool = Arc::new(InstanceIdPool::uniform(64));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    (0..16)
                        .filter_map(|_| pool.allocate(FeatureType::Timer))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=64).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn allocated_set_stays_within_capacity(
            capacity in 1u32..8,
            ops in proptest::collection::vec((any::<bool>(), 0u32..10), 0..64),
        ) {
            let pool = InstanceIdPool::uniform(capacity);
            for (allocate, id) in ops {
                if allocate {
                    let before = pool.allocated(FeatureType::Clock);
                    if let Some(new_id) = pool.allocate(FeatureType::Clock) {
                        prop_assert!(!before.contains(&new_id));
                    } else {
                        prop_assert_eq!(before.len() as u32, capacity);
                    }
                } else {
                    pool.release(FeatureType::Clock, id);
                }
                let allocated = pool.allocated(FeatureType::Clock);
                prop_assert!(allocated.len() as u32 <= capacity);
                prop_assert!(allocated.iter().all(|id| (1..=capacity).contains(id)));
            }
        }
    }
}
