//! Overlay feature types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One kind of overlay widget. Instance IDs are unique within a feature type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    Clock,
    Timer,
    ScreenMask,
    Spotlight,
    TrafficLight,
    Dice,
    Coin,
}

impl FeatureType {
    pub const ALL: [FeatureType; 7] = [
        FeatureType::Clock,
        FeatureType::Timer,
        FeatureType::ScreenMask,
        FeatureType::Spotlight,
        FeatureType::TrafficLight,
        FeatureType::Dice,
        FeatureType::Coin,
    ];

    /// Stable key used in store rows and config paths.
    pub fn key(self) -> &'static str {
        match self {
            FeatureType::Clock => "clock",
            FeatureType::Timer => "timer",
            FeatureType::ScreenMask => "screen_mask",
            FeatureType::Spotlight => "spotlight",
            FeatureType::TrafficLight => "traffic_light",
            FeatureType::Dice => "dice",
            FeatureType::Coin => "coin",
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FeatureType::ScreenMask => "screen mask",
            FeatureType::TrafficLight => "traffic light",
            other => other.key(),
        })
    }
}

impl FromStr for FeatureType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        FeatureType::ALL
            .into_iter()
            .find(|f| f.key() == normalized)
            .ok_or_else(|| format!("unknown feature type: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keys_and_loose_spellings() {
        assert_eq!("timer".parse::<FeatureType>(), Ok(FeatureType::Timer));
        assert_eq!("Screen-Mask".parse::<FeatureType>(), Ok(FeatureType::ScreenMask));
        assert_eq!("traffic light".parse::<FeatureType>(), Ok(FeatureType::TrafficLight));
        assert!("laser".parse::<FeatureType>().is_err());
    }

    #[test]
    fn serde_uses_store_keys() {
        for feature in FeatureType::ALL {
            let json = serde_json::to_string(&feature).unwrap();
            assert_eq!(json, format!("\"{}\"", feature.key()));
        }
    }
}
