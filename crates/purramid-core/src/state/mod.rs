//! Per-feature state policies.
//!
//! Every overlay feature is a plain value type implementing [`FeatureState`]:
//! a default factory, a pure mutation transform and a versioned mapping to and
//! from the flat [`Record`] shape. The generic [`crate::model::StateModel`]
//! does everything else (observation, persistence, no-op detection via
//! `PartialEq`).

mod clock;
mod coin;
mod dice;
mod geometry;
mod screen_mask;
mod spotlight;
mod timer;
mod traffic_light;

pub use clock::{ClockMutation, ClockState};
pub use coin::{CoinMutation, CoinState, MAX_COINS_PER_TYPE};
pub use dice::{DiceMutation, DiceState, MAX_DICE_PER_TYPE};
pub use geometry::{Geometry, GeometryChange, MIN_DIMENSION};
pub use screen_mask::{ScreenMaskMutation, ScreenMaskState};
pub use spotlight::{SpotlightMutation, SpotlightShape, SpotlightState};
pub use timer::{TimerKind, TimerMutation, TimerPhase, TimerState};
pub use traffic_light::{
    LightColor, TrafficLightMode, TrafficLightMutation, TrafficLightOrientation,
    TrafficLightState,
};

use serde::Serialize;
use std::fmt::Debug;

use crate::feature::FeatureType;
use crate::storage::Record;

/// Behaviour one overlay feature plugs into the generic state model.
pub trait FeatureState: Clone + PartialEq + Debug + Serialize + Send + Sync + 'static {
    /// Requests a host can make against this feature.
    type Mutation: Clone + Debug + Send + From<GeometryChange> + 'static;

    const FEATURE: FeatureType;

    /// Bumped whenever the record layout changes; `from_record` must keep
    /// reading every older version.
    const SCHEMA_VERSION: u32;

    /// Fresh state for a newly created instance.
    fn with_defaults(instance_id: u32) -> Self;

    fn instance_id(&self) -> u32;

    /// Pure transform. Returning a value equal to `self` marks a no-op.
    fn apply(&self, mutation: &Self::Mutation) -> Self;

    fn to_record(&self) -> Record;

    /// Never fails: missing or malformed fields fall back to defaults.
    fn from_record(record: &Record) -> Self;
}

/// Start a record for `state` carrying the shared geometry columns.
pub(crate) fn base_record<S: FeatureState>(state: &S, geometry: &Geometry) -> Record {
    let record = Record::new(S::FEATURE, state.instance_id(), S::SCHEMA_VERSION);
    geometry.write(record)
}

/// Log records written by a newer build; they are read best-effort.
pub(crate) fn check_version<S: FeatureState>(record: &Record) {
    if record.schema_version > S::SCHEMA_VERSION {
        tracing::warn!(
            feature = %S::FEATURE,
            instance_id = record.instance_id,
            stored = record.schema_version,
            known = S::SCHEMA_VERSION,
            "record written by a newer schema, reading known fields only"
        );
    }
}
