//! Repair of the pre-instance spotlight table.
//!
//! Older builds kept spotlights in a standalone `spotlights` table whose
//! `instance_id` column was never constrained: IDs could be zero, exceed the
//! pool, or repeat. Rows are folded into the current instance layout here.

use crate::state::{FeatureState, SpotlightState};
use crate::storage::Record;

/// One row of the legacy `spotlights` table.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacySpotlightRow {
    /// SQLite rowid; larger means written later.
    pub row_id: i64,
    pub instance_id: i64,
    pub center_x: i64,
    pub center_y: i64,
    pub radius: i64,
    pub width: i64,
    pub height: i64,
    pub shape: Option<String>,
    pub locked: bool,
}

impl LegacySpotlightRow {
    fn is_circle(&self) -> bool {
        self.shape
            .as_deref()
            .map_or(true, |s| s.trim().eq_ignore_ascii_case("circle"))
    }

    /// Legacy rows stored the center; the instance layout stores the
    /// top-left corner.
    fn into_state(self, instance_id: u32) -> SpotlightState {
        let (width, height) = if self.is_circle() {
            let diameter = self.radius.saturating_mul(2);
            (diameter, diameter)
        } else {
            (self.width, self.height)
        };
        let width = clamp_u32(width);
        let height = clamp_u32(height);
        let x = clamp_i32(self.center_x.saturating_sub(i64::from(width / 2)));
        let y = clamp_i32(self.center_y.saturating_sub(i64::from(height / 2)));

        let mut record = Record::new(SpotlightState::FEATURE, instance_id, SpotlightState::SCHEMA_VERSION)
            .with("x", x)
            .with("y", y)
            .with("width", width)
            .with("height", height)
            .with("locked", self.locked);
        if let Some(shape) = self.shape {
            record = record.with("shape", shape.trim().to_ascii_lowercase());
        }
        SpotlightState::from_record(&record)
    }
}

fn clamp_u32(v: i64) -> u32 {
    u32::try_from(v.max(0)).unwrap_or(u32::MAX)
}

fn clamp_i32(v: i64) -> i32 {
    i32::try_from(v.clamp(i64::from(i32::MIN), i64::from(i32::MAX))).unwrap_or_default()
}

/// Map legacy rows onto IDs `1..=limit`.
///
/// The most recent row wins each valid ID. Rows with an invalid or already
/// claimed ID take the smallest free ID, newest first; rows left over once the
/// pool is full are dropped.
pub fn repair_spotlight_rows(mut rows: Vec<LegacySpotlightRow>, limit: u32) -> Vec<SpotlightState> {
    rows.sort_by(|a, b| b.row_id.cmp(&a.row_id));

    let mut slots: Vec<Option<LegacySpotlightRow>> = vec![None; limit as usize];
    let mut homeless = Vec::new();
    for row in rows {
        let slot = usize::try_from(row.instance_id)
            .ok()
            .filter(|id| (1..=limit as usize).contains(id))
            .map(|id| id - 1);
        match slot {
            Some(i) if slots[i].is_none() => slots[i] = Some(row),
            _ => homeless.push(row),
        }
    }

    let mut homeless = homeless.into_iter();
    for slot in slots.iter_mut().filter(|s| s.is_none()) {
        match homeless.next() {
            Some(row) => {
                tracing::debug!(legacy_id = row.instance_id, "reassigning legacy spotlight");
                *slot = Some(row);
            }
            None => break,
        }
    }
    let dropped = homeless.count();
    if dropped > 0 {
        tracing::warn!(dropped, limit, "legacy spotlights exceed the pool, dropping oldest");
    }

    slots
        .into_iter()
        .zip(1u32..)
        .filter_map(|(row, id)| row.map(|row| row.into_state(id)))
        .collect()
}
