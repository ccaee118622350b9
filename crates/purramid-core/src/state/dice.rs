//! Dice roller state.
//!
//! ## Record layout (schema 1)
//!
//! Geometry columns, `crit_enabled`, `configs` (JSON array of
//! `{"die","quantity","color","modifier","use_pips"}`) and `last_roll`
//! (JSON [`DiceRoll`] or null).

use serde::{Deserialize, Serialize};

use super::clock::normalize_color;
use super::{base_record, check_version, FeatureState, Geometry, GeometryChange};
use crate::feature::FeatureType;
use crate::probability::{DiceConfig, DiceRoll, DieType};
use crate::storage::Record;

/// Upper bound on dice of a single type in one roll.
pub const MAX_DICE_PER_TYPE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceState {
    pub instance_id: u32,
    pub geometry: Geometry,
    pub configs: Vec<DiceConfig>,
    pub crit_enabled: bool,
    pub last_roll: Option<DiceRoll>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiceMutation {
    Geometry(GeometryChange),
    SetQuantity { die: DieType, quantity: u32 },
    SetColor { die: DieType, color: String },
    SetModifier { die: DieType, modifier: i32 },
    SetUsePips { die: DieType, use_pips: bool },
    SetCritEnabled(bool),
    RecordRoll(DiceRoll),
    ClearRoll,
}

impl From<GeometryChange> for DiceMutation {
    fn from(change: GeometryChange) -> Self {
        DiceMutation::Geometry(change)
    }
}

fn default_configs() -> Vec<DiceConfig> {
    DieType::ALL
        .into_iter()
        .map(|die| DiceConfig::new(die, u32::from(die == DieType::D6)))
        .collect()
}

impl DiceState {
    fn config_mut(&mut self, die: DieType) -> &mut DiceConfig {
        if let Some(i) = self.configs.iter().position(|c| c.die == die) {
            &mut self.configs[i]
        } else {
            self.configs.push(DiceConfig::new(die, 0));
            let last = self.configs.len() - 1;
            &mut self.configs[last]
        }
    }
}

impl FeatureState for DiceState {
    type Mutation = DiceMutation;

    const FEATURE: FeatureType = FeatureType::Dice;
    const SCHEMA_VERSION: u32 = 1;

    fn with_defaults(instance_id: u32) -> Self {
        Self {
            instance_id,
            geometry: Geometry::new(150, 150, 360, 360),
            configs: default_configs(),
            crit_enabled: true,
            last_roll: None,
        }
    }

    fn instance_id(&self) -> u32 {
        self.instance_id
    }

    fn apply(&self, mutation: &DiceMutation) -> Self {
        let mut next = self.clone();
        match mutation {
            DiceMutation::Geometry(change) => next.geometry = self.geometry.apply(*change),
            DiceMutation::SetQuantity { die, quantity } => {
                next.config_mut(*die).quantity = (*quantity).min(MAX_DICE_PER_TYPE);
            }
            DiceMutation::SetColor { die, color } => {
                if let Some(color) = normalize_color(color) {
                    next.config_mut(*die).color = color;
                }
            }
            DiceMutation::SetModifier { die, modifier } => {
                next.config_mut(*die).modifier = *modifier;
            }
            DiceMutation::SetUsePips { die, use_pips } => {
                next.config_mut(*die).use_pips = *use_pips;
            }
            DiceMutation::SetCritEnabled(on) => next.crit_enabled = *on,
            DiceMutation::RecordRoll(roll) => next.last_roll = Some(roll.clone()),
            DiceMutation::ClearRoll => next.last_roll = None,
        }
        next
    }

    fn to_record(&self) -> Record {
        base_record(self, &self.geometry)
            .with("crit_enabled", self.crit_enabled)
            .with_json("configs", &self.configs)
            .with_json("last_roll", &self.last_roll)
    }

    fn from_record(record: &Record) -> Self {
        check_version::<Self>(record);
        let d = Self::with_defaults(record.instance_id);
        let configs: Vec<DiceConfig> = record
            .json("configs")
            .unwrap_or(d.configs);
        Self {
            instance_id: record.instance_id,
            geometry: Geometry::read(record, d.geometry),
            configs: configs
                .into_iter()
                .map(|mut c| {
                    c.quantity = c.quantity.min(MAX_DICE_PER_TYPE);
                    c
                })
                .collect(),
            crit_enabled: record.bool("crit_enabled").unwrap_or(d.crit_enabled),
            last_roll: record.json::<Option<DiceRoll>>("last_roll").flatten(),
        }
    }
}
