use serde::{Deserialize, Serialize};

use super::{base_record, check_version, FeatureState, Geometry, GeometryChange};
use crate::feature::FeatureType;
use crate::storage::Record;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenMaskState {
    pub instance_id: u32,
    pub geometry: Geometry,
    pub image_uri: Option<String>,
    pub controls_visible: bool,
    /// Percent, `0..=100`.
    pub opacity: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenMaskMutation {
    Geometry(GeometryChange),
    SetImage(Option<String>),
    SetControlsVisible(bool),
    SetOpacity(u8),
}

impl From<GeometryChange> for ScreenMaskMutation {
    fn from(change: GeometryChange) -> Self {
        ScreenMaskMutation::Geometry(change)
    }
}

impl FeatureState for ScreenMaskState {
    type Mutation = ScreenMaskMutation;

    const FEATURE: FeatureType = FeatureType::ScreenMask;
    const SCHEMA_VERSION: u32 = 1;

    fn with_defaults(instance_id: u32) -> Self {
        Self {
            instance_id,
            geometry: Geometry::new(0, 0, 400, 300),
            image_uri: None,
            controls_visible: true,
            opacity: 100,
        }
    }

    fn instance_id(&self) -> u32 {
        self.instance_id
    }

    fn apply(&self, mutation: &ScreenMaskMutation) -> Self {
        let mut next = self.clone();
        match mutation {
            ScreenMaskMutation::Geometry(change) => next.geometry = self.geometry.apply(*change),
            ScreenMaskMutation::SetImage(uri) => {
                next.image_uri = uri
                    .as_deref()
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(str::to_string);
            }
            ScreenMaskMutation::SetControlsVisible(on) => next.controls_visible = *on,
            ScreenMaskMutation::SetOpacity(pct) => next.opacity = (*pct).min(100),
        }
        next
    }

    fn to_record(&self) -> Record {
        base_record(self, &self.geometry)
            .with("image_uri", self.image_uri.clone())
            .with("controls_visible", self.controls_visible)
            .with("opacity", u32::from(self.opacity))
    }

    fn from_record(record: &Record) -> Self {
        check_version::<Self>(record);
        let d = Self::with_defaults(record.instance_id);
        Self {
            instance_id: record.instance_id,
            geometry: Geometry::read(record, d.geometry),
            image_uri: record.text("image_uri").map(str::to_string),
            controls_visible: record
                .bool("controls_visible")
                .unwrap_or(d.controls_visible),
            opacity: record
                .u32("opacity")
                .map(|v| v.min(100) as u8)
                .unwrap_or(d.opacity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opacity_is_clamped_and_blank_image_clears() {
        let m = ScreenMaskState::with_defaults(1)
            .apply(&ScreenMaskMutation::SetImage(Some("content://mask.png".into())))
            .apply(&ScreenMaskMutation::SetOpacity(250));
        assert_eq!(m.opacity, 100);
        assert_eq!(m.image_uri.as_deref(), Some("content://mask.png"));

        let cleared = m.apply(&ScreenMaskMutation::SetImage(Some("   ".into())));
        assert_eq!(cleared.image_uri, None);
        assert_eq!(ScreenMaskState::from_record(&cleared.to_record()), cleared);
    }
}
