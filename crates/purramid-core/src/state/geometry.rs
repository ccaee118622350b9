use serde::{Deserialize, Serialize};

use crate::storage::Record;

/// Smallest width or height an overlay window may be resized to.
pub const MIN_DIMENSION: u32 = 50;

/// Window placement shared by every overlay, plus its lock flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub locked: bool,
}

/// Drag, resize and lock events delivered by the window host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryChange {
    Move { x: i32, y: i32 },
    Resize { width: u32, height: u32 },
    SetLocked(bool),
}

impl Geometry {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width: width.max(MIN_DIMENSION),
            height: height.max(MIN_DIMENSION),
            locked: false,
        }
    }

    /// Locked windows ignore moves and resizes but can always be unlocked.
    pub fn apply(&self, change: GeometryChange) -> Self {
        let mut next = *self;
        match change {
            GeometryChange::Move { x, y } if !self.locked => {
                next.x = x;
                next.y = y;
            }
            GeometryChange::Resize { width, height } if !self.locked => {
                next.width = width.max(MIN_DIMENSION);
                next.height = height.max(MIN_DIMENSION);
            }
            GeometryChange::SetLocked(locked) => next.locked = locked,
            _ => {}
        }
        next
    }

    pub(crate) fn write(&self, record: Record) -> Record {
        record
            .with("x", self.x)
            .with("y", self.y)
            .with("width", self.width)
            .with("height", self.height)
            .with("locked", self.locked)
    }

    /// Read the shared columns, falling back to `default` per field.
    pub(crate) fn read(record: &Record, default: Geometry) -> Self {
        Self {
            x: record.i32("x").unwrap_or(default.x),
            y: record.i32("y").unwrap_or(default.y),
            width: record
                .u32("width")
                .unwrap_or(default.width)
                .max(MIN_DIMENSION),
            height: record
                .u32("height")
                .unwrap_or(default.height)
                .max(MIN_DIMENSION),
            locked: record.bool("locked").unwrap_or(default.locked),
        }
    }
}
