use clap::Subcommand;
use purramid_core::state::{DiceMutation, DiceState};
use purramid_core::{DiceRoll, DieType, InstanceCoordinator};

use super::{open_coordinator, print_json, rng, CliResult};

#[derive(Subcommand)]
pub enum DiceAction {
    /// Roll every configured die
    Roll {
        id: u32,
        /// Seed for a reproducible roll
        #[arg(long)]
        seed: Option<u64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Configure one die type
    Set {
        id: u32,
        /// d4, d6, d8, d10, d12, d20 or d100
        die: DieType,
        #[arg(long)]
        quantity: Option<u32>,
        #[arg(long, allow_negative_numbers = true)]
        modifier: Option<i32>,
        /// Color as #RRGGBB
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        pips: Option<bool>,
    },
    /// Turn natural-20 highlighting on or off
    Crit {
        id: u32,
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Print the dice configuration and last roll as JSON
    Show { id: u32 },
}

pub async fn run(action: DiceAction) -> CliResult {
    let coord = open_coordinator()?;
    let result = execute(&coord, action);
    coord.shutdown().await;
    result
}

fn print_roll(roll: &DiceRoll) {
    for (die, faces) in &roll.per_type {
        if faces.is_empty() {
            continue;
        }
        let faces: Vec<String> = faces.iter().map(u32::to_string).collect();
        println!("{die:<10} {}", faces.join(" "));
    }
    println!("sum {}", roll.sum);
    if roll.crit_count() > 0 {
        println!("crits {}", roll.crit_count());
    }
}

fn execute(coord: &InstanceCoordinator, action: DiceAction) -> CliResult {
    match action {
        DiceAction::Roll { id, seed, json } => {
            let roll = coord.roll_dice(id, &mut rng(seed))?;
            if json {
                print_json(&roll)?;
            } else {
                print_roll(&roll);
            }
        }
        DiceAction::Set {
            id,
            die,
            quantity,
            modifier,
            color,
            pips,
        } => {
            let mut mutations = Vec::new();
            if let Some(quantity) = quantity {
                mutations.push(DiceMutation::SetQuantity { die, quantity });
            }
            if let Some(modifier) = modifier {
                mutations.push(DiceMutation::SetModifier { die, modifier });
            }
            if let Some(color) = color {
                mutations.push(DiceMutation::SetColor { die, color });
            }
            if let Some(use_pips) = pips {
                mutations.push(DiceMutation::SetUsePips { die, use_pips });
            }
            let mut state = None;
            for mutation in &mutations {
                state = Some(coord.apply::<DiceState>(id, mutation)?);
            }
            match state.and_then(|s| s.configs.into_iter().find(|c| c.die == die)) {
                Some(config) => print_json(&config)?,
                None => println!("nothing to change"),
            }
        }
        DiceAction::Crit { id, enabled } => {
            coord.apply::<DiceState>(id, &DiceMutation::SetCritEnabled(enabled))?;
            println!("crit highlighting {}", if enabled { "on" } else { "off" });
        }
        DiceAction::Show { id } => {
            let model = coord
                .model::<DiceState>(id)
                .ok_or_else(|| format!("no dice instance {id}"))?;
            print_json(&model.current())?;
        }
    }
    Ok(())
}
