use serde::{Deserialize, Serialize};

use super::{base_record, check_version, FeatureState, Geometry, GeometryChange};
use crate::feature::FeatureType;
use crate::storage::Record;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockState {
    pub instance_id: u32,
    pub geometry: Geometry,
    /// IANA zone name.
    pub time_zone: String,
    pub use_24_hour: bool,
    pub show_seconds: bool,
    pub paused: bool,
    /// `#RRGGBB`
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockMutation {
    Geometry(GeometryChange),
    SetTimeZone(String),
    Set24Hour(bool),
    SetShowSeconds(bool),
    SetPaused(bool),
    SetColor(String),
}

impl From<GeometryChange> for ClockMutation {
    fn from(change: GeometryChange) -> Self {
        ClockMutation::Geometry(change)
    }
}

/// Accepts `#RRGGBB` (any case) and returns it upper-cased.
pub(crate) fn normalize_color(raw: &str) -> Option<String> {
    let hex = raw.trim().strip_prefix('#')?;
    (hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| format!("#{}", hex.to_ascii_uppercase()))
}

impl FeatureState for ClockState {
    type Mutation = ClockMutation;

    const FEATURE: FeatureType = FeatureType::Clock;
    const SCHEMA_VERSION: u32 = 1;

    fn with_defaults(instance_id: u32) -> Self {
        Self {
            instance_id,
            geometry: Geometry::new(100, 100, 300, 300),
            time_zone: "UTC".into(),
            use_24_hour: false,
            show_seconds: true,
            paused: false,
            color: "#FFFFFF".into(),
        }
    }

    fn instance_id(&self) -> u32 {
        self.instance_id
    }

    fn apply(&self, mutation: &ClockMutation) -> Self {
        let mut next = self.clone();
        match mutation {
            ClockMutation::Geometry(change) => next.geometry = self.geometry.apply(*change),
            ClockMutation::SetTimeZone(zone) => {
                let zone = zone.trim();
                if !zone.is_empty() {
                    next.time_zone = zone.to_string();
                }
            }
            ClockMutation::Set24Hour(on) => next.use_24_hour = *on,
            ClockMutation::SetShowSeconds(on) => next.show_seconds = *on,
            ClockMutation::SetPaused(on) => next.paused = *on,
            ClockMutation::SetColor(raw) => {
                if let Some(color) = normalize_color(raw) {
                    next.color = color;
                }
            }
        }
        next
    }

    fn to_record(&self) -> Record {
        base_record(self, &self.geometry)
            .with("time_zone", self.time_zone.as_str())
            .with("use_24_hour", self.use_24_hour)
            .with("show_seconds", self.show_seconds)
            .with("paused", self.paused)
            .with("color", self.color.as_str())
    }

    fn from_record(record: &Record) -> Self {
        check_version::<Self>(record);
        let d = Self::with_defaults(record.instance_id);
        Self {
            instance_id: record.instance_id,
            geometry: Geometry::read(record, d.geometry),
            time_zone: record
                .text("time_zone")
                .filter(|z| !z.trim().is_empty())
                .map(str::to_string)
                .unwrap_or(d.time_zone),
            use_24_hour: record.bool("use_24_hour").unwrap_or(d.use_24_hour),
            show_seconds: record.bool("show_seconds").unwrap_or(d.show_seconds),
            paused: record.bool("paused").unwrap_or(d.paused),
            color: record
                .text("color")
                .and_then(normalize_color)
                .unwrap_or(d.color),
        }
    }
}
