//! Stopwatch / countdown timer state.
//!
//! ## Record layout (schema 1)
//!
//! Geometry columns plus `kind` (`"stopwatch"` | `"countdown"`),
//! `current_millis`, `initial_duration_millis`, `running`,
//! `play_sound_on_end`, `show_centiseconds` and `laps`, a JSON array of lap
//! times in milliseconds (`[1200,3400]`).

use serde::{Deserialize, Serialize};

use super::{base_record, check_version, FeatureState, Geometry, GeometryChange};
use crate::feature::FeatureType;
use crate::storage::Record;

/// Default countdown length for new timers.
const DEFAULT_COUNTDOWN_MILLIS: u64 = 5 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerKind {
    Stopwatch,
    Countdown,
}

impl TimerKind {
    pub fn key(self) -> &'static str {
        match self {
            TimerKind::Stopwatch => "stopwatch",
            TimerKind::Countdown => "countdown",
        }
    }
}

impl std::str::FromStr for TimerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stopwatch" => Ok(TimerKind::Stopwatch),
            "countdown" => Ok(TimerKind::Countdown),
            other => Err(format!("unknown timer kind: {other}")),
        }
    }
}

/// Derived ticking phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    Idle,
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub instance_id: u32,
    pub geometry: Geometry,
    pub kind: TimerKind,
    pub current_millis: u64,
    pub initial_duration_millis: u64,
    pub running: bool,
    pub laps: Vec<u64>,
    pub play_sound_on_end: bool,
    pub show_centiseconds: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerMutation {
    Geometry(GeometryChange),
    Start,
    /// Stop ticking, optionally recording the value measured at stop time.
    Pause { current_millis: Option<u64> },
    Reset,
    Lap,
    /// Value derived by the ticker. Ignored unless running.
    Tick { current_millis: u64 },
    SetKind(TimerKind),
    /// Countdown length; ignored while running.
    SetDuration(u64),
    SetPlaySoundOnEnd(bool),
    SetShowCentiseconds(bool),
}

impl From<GeometryChange> for TimerMutation {
    fn from(change: GeometryChange) -> Self {
        TimerMutation::Geometry(change)
    }
}

impl TimerState {
    pub fn phase(&self) -> TimerPhase {
        if self.running {
            TimerPhase::Running
        } else if self.kind == TimerKind::Countdown
            && self.current_millis == 0
            && self.initial_duration_millis > 0
        {
            TimerPhase::Finished
        } else {
            TimerPhase::Idle
        }
    }

    /// Value shown right after a reset.
    fn reset_millis(&self) -> u64 {
        match self.kind {
            TimerKind::Stopwatch => 0,
            TimerKind::Countdown => self.initial_duration_millis,
        }
    }
}

impl FeatureState for TimerState {
    type Mutation = TimerMutation;

    const FEATURE: FeatureType = FeatureType::Timer;
    const SCHEMA_VERSION: u32 = 1;

    fn with_defaults(instance_id: u32) -> Self {
        Self {
            instance_id,
            geometry: Geometry::new(120, 120, 320, 160),
            kind: TimerKind::Stopwatch,
            current_millis: 0,
            initial_duration_millis: DEFAULT_COUNTDOWN_MILLIS,
            running: false,
            laps: Vec::new(),
            play_sound_on_end: true,
            show_centiseconds: true,
        }
    }

    fn instance_id(&self) -> u32 {
        self.instance_id
    }

    fn apply(&self, mutation: &TimerMutation) -> Self {
        let mut next = self.clone();
        match *mutation {
            TimerMutation::Geometry(change) => next.geometry = self.geometry.apply(change),
            TimerMutation::Start => {
                let exhausted = self.kind == TimerKind::Countdown && self.current_millis == 0;
                if !exhausted {
                    next.running = true;
                }
            }
            TimerMutation::Pause { current_millis } => {
                if self.running {
                    next.running = false;
                    if let Some(ms) = current_millis {
                        next.current_millis = ms;
                    }
                }
            }
            TimerMutation::Reset => {
                next.running = false;
                next.current_millis = self.reset_millis();
                next.laps.clear();
            }
            TimerMutation::Lap => {
                if self.kind == TimerKind::Stopwatch && self.running {
                    next.laps.push(self.current_millis);
                }
            }
            TimerMutation::Tick { current_millis } => {
                if self.running {
                    next.current_millis = current_millis;
                    if self.kind == TimerKind::Countdown && current_millis == 0 {
                        next.running = false;
                    }
                }
            }
            TimerMutation::SetKind(kind) => {
                if kind != self.kind {
                    next.kind = kind;
                    next.running = false;
                    next.laps.clear();
                    next.current_millis = next.reset_millis();
                }
            }
            TimerMutation::SetDuration(ms) => {
                if !self.running {
                    next.initial_duration_millis = ms;
                    if self.kind == TimerKind::Countdown {
                        next.current_millis = ms;
                    }
                }
            }
            TimerMutation::SetPlaySoundOnEnd(on) => next.play_sound_on_end = on,
            TimerMutation::SetShowCentiseconds(on) => next.show_centiseconds = on,
        }
        next
    }

    fn to_record(&self) -> Record {
        base_record(self, &self.geometry)
            .with("kind", self.kind.key())
            .with("current_millis", self.current_millis)
            .with("initial_duration_millis", self.initial_duration_millis)
            .with("running", self.running)
            .with("play_sound_on_end", self.play_sound_on_end)
            .with("show_centiseconds", self.show_centiseconds)
            .with_json("laps", &self.laps)
    }

    fn from_record(record: &Record) -> Self {
        check_version::<Self>(record);
        let d = Self::with_defaults(record.instance_id);
        Self {
            instance_id: record.instance_id,
            geometry: Geometry::read(record, d.geometry),
            kind: record
                .text("kind")
                .and_then(|s| s.parse().ok())
                .unwrap_or(d.kind),
            current_millis: record.u64("current_millis").unwrap_or(d.current_millis),
            initial_duration_millis: record
                .u64("initial_duration_millis")
                .unwrap_or(d.initial_duration_millis),
            running: record.bool("running").unwrap_or(d.running),
            laps: record.json("laps").unwrap_or_default(),
            play_sound_on_end: record
                .bool("play_sound_on_end")
                .unwrap_or(d.play_sound_on_end),
            show_centiseconds: record
                .bool("show_centiseconds")
                .unwrap_or(d.show_centiseconds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn countdown(ms: u64) -> TimerState {
        TimerState::with_defaults(1)
            .apply(&TimerMutation::SetKind(TimerKind::Countdown))
            .apply(&TimerMutation::SetDuration(ms))
    }

    #[test]
    fn laps_only_while_running_stopwatch() {
        let idle = TimerState::with_defaults(1);
        assert_eq!(idle.apply(&TimerMutation::Lap), idle);

        let running = idle
            .apply(&TimerMutation::Start)
            .apply(&TimerMutation::Tick { current_millis: 1500 });
        assert_eq!(running.apply(&TimerMutation::Lap).laps, vec![1500]);

        let cd = countdown(1000).apply(&TimerMutation::Start);
        assert!(cd.apply(&TimerMutation::Lap).laps.is_empty());
    }

    #[test]
    fn countdown_tick_to_zero_finishes() {
        let t = countdown(5000)
            .apply(&TimerMutation::Start)
            .apply(&TimerMutation::Tick { current_millis: 0 });
        assert!(!t.running);
        assert_eq!(t.current_millis, 0);
        assert_eq!(t.phase(), TimerPhase::Finished);

        let reset = t.apply(&TimerMutation::Reset);
        assert_eq!(reset.current_millis, 5000);
        assert_eq!(reset.phase(), TimerPhase::Idle);
    }

    #[test]
    fn exhausted_countdown_does_not_start() {
        let t = countdown(0);
        assert_eq!(t.apply(&TimerMutation::Start), t);
    }

    #[test]
    fn tick_is_ignored_when_not_running() {
        let t = TimerState::with_defaults(1);
        assert_eq!(t.apply(&TimerMutation::Tick { current_millis: 99 }), t);
    }

    #[test]
    fn duration_is_locked_while_running() {
        let t = countdown(3000).apply(&TimerMutation::Start);
        assert_eq!(t.apply(&TimerMutation::SetDuration(10)), t);
    }

    #[test]
    fn changing_kind_stops_and_resets() {
        let t = TimerState::with_defaults(1)
            .apply(&TimerMutation::Start)
            .apply(&TimerMutation::Tick { current_millis: 800 })
            .apply(&TimerMutation::Lap)
            .apply(&TimerMutation::SetKind(TimerKind::Countdown));
        assert!(!t.running);
        assert!(t.laps.is_empty());
        assert_eq!(t.current_millis, DEFAULT_COUNTDOWN_MILLIS);
    }

    #[test]
    fn record_mapping_preserves_state() {
        let t = TimerState::with_defaults(3)
            .apply(&TimerMutation::Start)
            .apply(&TimerMutation::Tick { current_millis: 700 })
            .apply(&TimerMutation::Lap)
            .apply(&TimerMutation::Tick { current_millis: 1900 })
            .apply(&TimerMutation::Lap);
        let record = t.to_record();
        assert_eq!(record.text("laps"), Some("[700,1900]"));
        assert_eq!(TimerState::from_record(&record), t);
    }

    #[test]
    fn malformed_laps_fall_back_to_empty() {
        let record = TimerState::with_defaults(2)
            .to_record()
            .with("laps", "not json")
            .with("current_millis", 42u64);
        let t = TimerState::from_record(&record);
        assert!(t.laps.is_empty());
        assert_eq!(t.current_millis, 42);
    }
}
