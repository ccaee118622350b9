use serde::{Deserialize, Serialize};

use super::clock::normalize_color;
use super::{base_record, check_version, FeatureState, Geometry, GeometryChange};
use crate::feature::FeatureType;
use crate::probability::{CoinConfig, CoinFlip, CoinType};
use crate::storage::Record;

pub const MAX_COINS_PER_TYPE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinState {
    pub instance_id: u32,
    pub geometry: Geometry,
    pub configs: Vec<CoinConfig>,
    pub last_flip: Option<CoinFlip>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoinMutation {
    Geometry(GeometryChange),
    SetQuantity { coin: CoinType, quantity: u32 },
    SetColor { coin: CoinType, color: String },
    RecordFlip(CoinFlip),
    ClearFlip,
}

impl From<GeometryChange> for CoinMutation {
    fn from(change: GeometryChange) -> Self {
        CoinMutation::Geometry(change)
    }
}

impl CoinState {
    fn config_mut(&mut self, coin: CoinType) -> &mut CoinConfig {
        if let Some(i) = self.configs.iter().position(|c| c.coin == coin) {
            &mut self.configs[i]
        } else {
            self.configs.push(CoinConfig::new(coin, 0));
            let last = self.configs.len() - 1;
            &mut self.configs[last]
        }
    }
}

impl FeatureState for CoinState {
    type Mutation = CoinMutation;

    const FEATURE: FeatureType = FeatureType::Coin;
    const SCHEMA_VERSION: u32 = 1;

    fn with_defaults(instance_id: u32) -> Self {
        Self {
            instance_id,
            geometry: Geometry::new(150, 150, 320, 240),
            configs: vec![CoinConfig::new(CoinType::Quarter, 1)],
            last_flip: None,
        }
    }

    fn instance_id(&self) -> u32 {
        self.instance_id
    }

    fn apply(&self, mutation: &CoinMutation) -> Self {
        let mut next = self.clone();
        match mutation {
            CoinMutation::Geometry(change) => next.geometry = self.geometry.apply(*change),
            CoinMutation::SetQuantity { coin, quantity } => {
                next.config_mut(*coin).quantity = (*quantity).min(MAX_COINS_PER_TYPE);
            }
            CoinMutation::SetColor { coin, color } => {
                if let Some(color) = normalize_color(color) {
                    next.config_mut(*coin).color = color;
                }
            }
            CoinMutation::RecordFlip(flip) => next.last_flip = Some(flip.clone()),
            CoinMutation::ClearFlip => next.last_flip = None,
        }
        next
    }

    fn to_record(&self) -> Record {
        base_record(self, &self.geometry)
            .with_json("configs", &self.configs)
            .with_json("last_flip", &self.last_flip)
    }

    fn from_record(record: &Record) -> Self {
        check_version::<Self>(record);
        let d = Self::with_defaults(record.instance_id);
        let configs: Vec<CoinConfig> = record.json("configs").unwrap_or(d.configs);
        Self {
            instance_id: record.instance_id,
            geometry: Geometry::read(record, d.geometry),
            configs: configs
                .into_iter()
                .map(|mut c| {
                    c.quantity = c.quantity.min(MAX_COINS_PER_TYPE);
                    c
                })
                .collect(),
            last_flip: record.json::<Option<CoinFlip>>("last_flip").flatten(),
        }
    }
}
