//! Multi-instance lifecycle: ID pools and the coordinator that owns live
//! overlay models.

mod coordinator;
mod pool;

pub use coordinator::{InstanceCoordinator, InstanceEvent, SpawnOutcome};
pub use pool::InstanceIdPool;
