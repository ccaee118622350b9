use serde::{Deserialize, Serialize};

use super::{base_record, check_version, FeatureState, Geometry, GeometryChange};
use crate::feature::FeatureType;
use crate::storage::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficLightOrientation {
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficLightMode {
    /// The user taps a light to switch it on.
    Manual,
    /// Lights follow an external signal (e.g. sound level).
    Responsive,
    /// Lights cycle on a schedule.
    Timed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightColor {
    Red,
    Yellow,
    Green,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficLightState {
    pub instance_id: u32,
    pub geometry: Geometry,
    pub orientation: TrafficLightOrientation,
    pub mode: TrafficLightMode,
    pub active_light: Option<LightColor>,
    pub blink: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrafficLightMutation {
    Geometry(GeometryChange),
    SetOrientation(TrafficLightOrientation),
    SetMode(TrafficLightMode),
    /// Tapping the lit light turns it off.
    Toggle(LightColor),
    SetActive(Option<LightColor>),
    SetBlink(bool),
}

impl From<GeometryChange> for TrafficLightMutation {
    fn from(change: GeometryChange) -> Self {
        TrafficLightMutation::Geometry(change)
    }
}

fn enum_key<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn enum_from_key<T: serde::de::DeserializeOwned>(key: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(key.to_string())).ok()
}

impl FeatureState for TrafficLightState {
    type Mutation = TrafficLightMutation;

    const FEATURE: FeatureType = FeatureType::TrafficLight;
    const SCHEMA_VERSION: u32 = 1;

    fn with_defaults(instance_id: u32) -> Self {
        Self {
            instance_id,
            geometry: Geometry::new(50, 50, 120, 320),
            orientation: TrafficLightOrientation::Vertical,
            mode: TrafficLightMode::Manual,
            active_light: None,
            blink: false,
        }
    }

    fn instance_id(&self) -> u32 {
        self.instance_id
    }

    fn apply(&self, mutation: &TrafficLightMutation) -> Self {
        let mut next = self.clone();
        match *mutation {
            TrafficLightMutation::Geometry(change) => next.geometry = self.geometry.apply(change),
            TrafficLightMutation::SetOrientation(o) => {
                if o != self.orientation {
                    next.orientation = o;
                    std::mem::swap(&mut next.geometry.width, &mut next.geometry.height);
                }
            }
            TrafficLightMutation::SetMode(mode) => {
                if mode != self.mode {
                    next.mode = mode;
                    next.active_light = None;
                }
            }
            TrafficLightMutation::Toggle(color) => {
                next.active_light = if self.active_light == Some(color) {
                    None
                } else {
                    Some(color)
                };
            }
            TrafficLightMutation::SetActive(color) => next.active_light = color,
            TrafficLightMutation::SetBlink(on) => next.blink = on,
        }
        next
    }

    fn to_record(&self) -> Record {
        base_record(self, &self.geometry)
            .with("orientation", enum_key(&self.orientation))
            .with("mode", enum_key(&self.mode))
            .with("active_light", self.active_light.map(|c| enum_key(&c)))
            .with("blink", self.blink)
    }

    fn from_record(record: &Record) -> Self {
        check_version::<Self>(record);
        let d = Self::with_defaults(record.instance_id);
        Self {
            instance_id: record.instance_id,
            geometry: Geometry::read(record, d.geometry),
            orientation: record
                .text("orientation")
                .and_then(enum_from_key)
                .unwrap_or(d.orientation),
            mode: record
                .text("mode")
                .and_then(enum_from_key)
                .unwrap_or(d.mode),
            active_light: record.text("active_light").and_then(enum_from_key),
            blink: record.bool("blink").unwrap_or(d.blink),
        }
    }
}
