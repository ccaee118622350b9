//! # Purramid Core Library
//!
//! This library provides the instance engine behind the Purramid overlay
//! widgets (clocks, timers, screen masks, spotlights, traffic lights, dice and
//! coins). Windowing and rendering live in the host; the core owns lifecycle,
//! persistence and timing, and is driven the same way by the standalone CLI
//! and by any GUI host.
//!
//! ## Architecture
//!
//! - **Instances**: bounded per-feature ID pools and a coordinator that
//!   spawns, restores and closes overlays
//! - **State**: one generic observable model, with a small policy type per
//!   feature
//! - **Ticker**: drift-corrected, cancellable timer tasks
//! - **Probability**: dice and coin outcomes over an injected random source
//! - **Storage**: SQLite record store, schema migrations and TOML configuration
//!
//! ## Key Components
//!
//! - [`InstanceCoordinator`]: entry point for hosts
//! - [`StateModel`]: observable, persisted state of one instance
//! - [`TickerEngine`]: running timers
//! - [`Database`]: durable [`StateStore`]
//! - [`Config`]: application configuration management

pub mod error;
pub mod feature;
pub mod instance;
pub mod model;
pub mod probability;
pub mod state;
pub mod storage;
pub mod ticker;

pub use error::{ConfigError, CoreError, StoreError};
pub use feature::FeatureType;
pub use instance::{InstanceCoordinator, InstanceEvent, InstanceIdPool, SpawnOutcome};
pub use model::{ManagedModel, StateModel};
pub use probability::{
    flip_coins, roll_dice, CoinConfig, CoinFlip, CoinType, DiceConfig, DiceRoll, DieType,
    RandomSource,
};
pub use state::{FeatureState, Geometry, GeometryChange};
pub use storage::{Config, Database, FieldValue, MemoryStore, Record, StateStore};
pub use ticker::TickerEngine;
