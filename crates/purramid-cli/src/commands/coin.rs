use clap::Subcommand;
use purramid_core::state::{CoinMutation, CoinState};
use purramid_core::{CoinType, InstanceCoordinator};

use super::{open_coordinator, print_json, rng, CliResult};

#[derive(Subcommand)]
pub enum CoinAction {
    /// Flip every configured coin
    Flip {
        id: u32,
        /// Seed for a reproducible flip
        #[arg(long)]
        seed: Option<u64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Configure one coin type
    Set {
        id: u32,
        /// penny, nickel, dime, quarter, half_dollar or dollar
        coin: CoinType,
        #[arg(long)]
        quantity: Option<u32>,
        /// Color as #RRGGBB
        #[arg(long)]
        color: Option<String>,
    },
    /// Print the coin configuration and last flip as JSON
    Show { id: u32 },
}

pub async fn run(action: CoinAction) -> CliResult {
    let coord = open_coordinator()?;
    let result = execute(&coord, action);
    coord.shutdown().await;
    result
}

fn execute(coord: &InstanceCoordinator, action: CoinAction) -> CliResult {
    match action {
        CoinAction::Flip { id, seed, json } => {
            let flip = coord.flip_coins(id, &mut rng(seed))?;
            if json {
                print_json(&flip)?;
            } else {
                for (coin, sides) in &flip.per_type {
                    let sides: Vec<&str> = sides
                        .iter()
                        .map(|heads| if *heads { "H" } else { "T" })
                        .collect();
                    println!("{coin:<12} {}", sides.join(" "));
                }
                println!("heads {} tails {}", flip.heads(), flip.tails());
            }
        }
        CoinAction::Set {
            id,
            coin,
            quantity,
            color,
        } => {
            let mut mutations = Vec::new();
            if let Some(quantity) = quantity {
                mutations.push(CoinMutation::SetQuantity { coin, quantity });
            }
            if let Some(color) = color {
                mutations.push(CoinMutation::SetColor { coin, color });
            }
            let mut state = None;
            for mutation in &mutations {
                state = Some(coord.apply::<CoinState>(id, mutation)?);
            }
            match state.and_then(|s| s.configs.into_iter().find(|c| c.coin == coin)) {
                Some(config) => print_json(&config)?,
                None => println!("nothing to change"),
            }
        }
        CoinAction::Show { id } => {
            let model = coord
                .model::<CoinState>(id)
                .ok_or_else(|| format!("no coin instance {id}"))?;
            print_json(&model.current())?;
        }
    }
    Ok(())
}
