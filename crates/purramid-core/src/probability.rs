//! Dice and coin outcome engine.
//!
//! Pure functions over an injected [`RandomSource`]. Any `rand::RngCore` is a
//! random source, so production code passes `rand::thread_rng()` and tests
//! pass a seeded `rand_pcg::Pcg64` or a scripted source.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Source of the two kinds of draws the engine needs.
pub trait RandomSource {
    /// Uniform integer in `low..=high`.
    fn uniform(&mut self, low: u32, high: u32) -> u32;

    /// Fair coin.
    fn fair_bool(&mut self) -> bool;
}

impl<R: rand::RngCore> RandomSource for R {
    fn uniform(&mut self, low: u32, high: u32) -> u32 {
        self.gen_range(low..=high)
    }

    fn fair_bool(&mut self) -> bool {
        self.gen_bool(0.5)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    /// d100 rolled as a tens die plus a ones die.
    Percentile,
}

impl DieType {
    pub const ALL: [DieType; 7] = [
        DieType::D4,
        DieType::D6,
        DieType::D8,
        DieType::D10,
        DieType::D12,
        DieType::D20,
        DieType::Percentile,
    ];

    pub fn sides(self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::Percentile => 100,
        }
    }

    fn key(self) -> &'static str {
        match self {
            DieType::D4 => "d4",
            DieType::D6 => "d6",
            DieType::D8 => "d8",
            DieType::D10 => "d10",
            DieType::D12 => "d12",
            DieType::D20 => "d20",
            DieType::Percentile => "percentile",
        }
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.key())
    }
}

impl FromStr for DieType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s == "d100" || s == "d%" {
            return Ok(DieType::Percentile);
        }
        DieType::ALL
            .into_iter()
            .find(|d| d.key() == s)
            .ok_or_else(|| format!("unknown die type: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceConfig {
    pub die: DieType,
    pub quantity: u32,
    #[serde(default = "default_die_color")]
    pub color: String,
    /// Added to every die of this type.
    #[serde(default)]
    pub modifier: i32,
    #[serde(default)]
    pub use_pips: bool,
}

fn default_die_color() -> String {
    "#FFFFFF".into()
}

impl DiceConfig {
    pub fn new(die: DieType, quantity: u32) -> Self {
        Self {
            die,
            quantity,
            color: default_die_color(),
            modifier: 0,
            use_pips: false,
        }
    }
}

/// Outcome of one roll of every configured die type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiceRoll {
    /// Face values per configured type, in configuration order.
    pub per_type: Vec<(DieType, Vec<u32>)>,
    /// Faces plus modifiers.
    pub sum: i64,
    /// One flag per d20 rolled, `true` on a natural 20.
    pub crit_flags: Vec<bool>,
}

impl DiceRoll {
    /// Sum of faces for one die type, without modifiers.
    pub fn total_for(&self, die: DieType) -> u64 {
        self.per_type
            .iter()
            .filter(|(d, _)| *d == die)
            .flat_map(|(_, faces)| faces.iter().map(|&f| u64::from(f)))
            .sum()
    }

    pub fn crit_count(&self) -> usize {
        self.crit_flags.iter().filter(|c| **c).count()
    }
}

fn roll_one(die: DieType, rng: &mut (impl RandomSource + ?Sized)) -> u32 {
    match die {
        DieType::Percentile => {
            let tens = rng.uniform(0, 9);
            let ones = rng.uniform(0, 9);
            match tens * 10 + ones {
                0 => 100,
                value => value,
            }
        }
        other => rng.uniform(1, other.sides()),
    }
}

/// Roll every configured die.
pub fn roll_dice(configs: &[DiceConfig], rng: &mut (impl RandomSource + ?Sized)) -> DiceRoll {
    let mut roll = DiceRoll::default();
    for config in configs {
        let faces: Vec<u32> = (0..config.quantity).map(|_| roll_one(config.die, rng)).collect();
        for &face in &faces {
            roll.sum += i64::from(face) + i64::from(config.modifier);
            if config.die == DieType::D20 {
                roll.crit_flags.push(face == DieType::D20.sides());
            }
        }
        roll.per_type.push((config.die, faces));
    }
    roll
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinType {
    Penny,
    Nickel,
    Dime,
    Quarter,
    HalfDollar,
    Dollar,
}

impl CoinType {
    pub fn key(self) -> &'static str {
        match self {
            CoinType::Penny => "penny",
            CoinType::Nickel => "nickel",
            CoinType::Dime => "dime",
            CoinType::Quarter => "quarter",
            CoinType::HalfDollar => "half_dollar",
            CoinType::Dollar => "dollar",
        }
    }
}

impl fmt::Display for CoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.key())
    }
}

impl FromStr for CoinType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(
            s.trim().to_ascii_lowercase().replace(['-', ' '], "_"),
        ))
        .map_err(|_| format!("unknown coin type: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinConfig {
    pub coin: CoinType,
    pub quantity: u32,
    #[serde(default = "default_coin_color")]
    pub color: String,
}

fn default_coin_color() -> String {
    "#DAA520".into()
}

impl CoinConfig {
    pub fn new(coin: CoinType, quantity: u32) -> Self {
        Self {
            coin,
            quantity,
            color: default_coin_color(),
        }
    }
}

/// Outcome of one flip; `true` is heads.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoinFlip {
    pub per_type: Vec<(CoinType, Vec<bool>)>,
}

impl CoinFlip {
    pub fn heads(&self) -> usize {
        self.per_type
            .iter()
            .flat_map(|(_, sides)| sides.iter())
            .filter(|h| **h)
            .count()
    }

    pub fn tails(&self) -> usize {
        self.per_type
            .iter()
            .map(|(_, sides)| sides.len())
            .sum::<usize>()
            - self.heads()
    }
}

/// Flip every configured coin.
pub fn flip_coins(configs: &[CoinConfig], rng: &mut (impl RandomSource + ?Sized)) -> CoinFlip {
    CoinFlip {
        per_type: configs
            .iter()
            .map(|c| (c.coin, (0..c.quantity).map(|_| rng.fair_bool()).collect()))
            .collect(),
    }
}
