use serde::{Deserialize, Serialize};

use super::{base_record, check_version, FeatureState, Geometry, GeometryChange};
use crate::feature::FeatureType;
use crate::storage::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpotlightShape {
    Circle,
    Oval,
    Square,
    Rectangle,
}

impl SpotlightShape {
    pub fn key(self) -> &'static str {
        match self {
            SpotlightShape::Circle => "circle",
            SpotlightShape::Oval => "oval",
            SpotlightShape::Square => "square",
            SpotlightShape::Rectangle => "rectangle",
        }
    }

    /// Circles and squares keep equal sides.
    fn is_uniform(self) -> bool {
        matches!(self, SpotlightShape::Circle | SpotlightShape::Square)
    }
}

impl std::str::FromStr for SpotlightShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "circle" => Ok(SpotlightShape::Circle),
            "oval" => Ok(SpotlightShape::Oval),
            "square" => Ok(SpotlightShape::Square),
            "rectangle" => Ok(SpotlightShape::Rectangle),
            other => Err(format!("unknown spotlight shape: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotlightState {
    pub instance_id: u32,
    pub geometry: Geometry,
    pub shape: SpotlightShape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpotlightMutation {
    Geometry(GeometryChange),
    SetShape(SpotlightShape),
}

impl From<GeometryChange> for SpotlightMutation {
    fn from(change: GeometryChange) -> Self {
        SpotlightMutation::Geometry(change)
    }
}

impl SpotlightState {
    fn squared(mut geometry: Geometry, shape: SpotlightShape) -> Geometry {
        if shape.is_uniform() {
            let side = geometry.width.min(geometry.height);
            geometry.width = side;
            geometry.height = side;
        }
        geometry
    }
}

impl FeatureState for SpotlightState {
    type Mutation = SpotlightMutation;

    const FEATURE: FeatureType = FeatureType::Spotlight;
    const SCHEMA_VERSION: u32 = 1;

    fn with_defaults(instance_id: u32) -> Self {
        Self {
            instance_id,
            geometry: Geometry::new(200, 200, 250, 250),
            shape: SpotlightShape::Circle,
        }
    }

    fn instance_id(&self) -> u32 {
        self.instance_id
    }

    fn apply(&self, mutation: &SpotlightMutation) -> Self {
        let mut next = self.clone();
        match *mutation {
            SpotlightMutation::Geometry(change) => {
                next.geometry = Self::squared(self.geometry.apply(change), self.shape);
            }
            SpotlightMutation::SetShape(shape) => {
                next.shape = shape;
                next.geometry = Self::squared(self.geometry, shape);
            }
        }
        next
    }

    fn to_record(&self) -> Record {
        base_record(self, &self.geometry).with("shape", self.shape.key())
    }

    fn from_record(record: &Record) -> Self {
        check_version::<Self>(record);
        let d = Self::with_defaults(record.instance_id);
        let shape = record
            .text("shape")
            .and_then(|s| s.parse().ok())
            .unwrap_or(d.shape);
        Self {
            instance_id: record.instance_id,
            geometry: Self::squared(Geometry::read(record, d.geometry), shape),
            shape,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circle_keeps_equal_sides() {
        let s = SpotlightState::with_defaults(1).apply(
            &GeometryChange::Resize {
                width: 400,
                height: 300,
            }
            .into(),
        );
        assert_eq!((s.geometry.width, s.geometry.height), (300, 300));

        let oval = s
            .apply(&SpotlightMutation::SetShape(SpotlightShape::Oval))
            .apply(
                &GeometryChange::Resize {
                    width: 400,
                    height: 300,
                }
                .into(),
            );
        assert_eq!((oval.geometry.width, oval.geometry.height), (400, 300));
        assert_eq!(SpotlightState::from_record(&oval.to_record()), oval);
    }
}
