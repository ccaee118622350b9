use clap::Subcommand;
use purramid_core::{FeatureType, GeometryChange, InstanceCoordinator};

use super::{open_coordinator, print_json, CliResult};

#[derive(Subcommand)]
pub enum InstanceAction {
    /// Create an instance, or re-attach a known ID
    Spawn {
        /// Feature type (clock, timer, screen_mask, spotlight, traffic_light, dice, coin)
        feature: FeatureType,
        /// Request a specific instance ID
        #[arg(long)]
        id: Option<u32>,
    },
    /// Close an instance and delete its saved state
    Close { feature: FeatureType, id: u32 },
    /// List live instances
    List {
        /// Only this feature type
        feature: Option<FeatureType>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print an instance's state as JSON
    Show { feature: FeatureType, id: u32 },
    /// Move an instance window
    Move {
        feature: FeatureType,
        id: u32,
        #[arg(allow_negative_numbers = true)]
        x: i32,
        #[arg(allow_negative_numbers = true)]
        y: i32,
    },
    /// Resize an instance window
    Resize {
        feature: FeatureType,
        id: u32,
        width: u32,
        height: u32,
    },
    /// Lock an instance window in place
    Lock { feature: FeatureType, id: u32 },
    /// Unlock an instance window
    Unlock { feature: FeatureType, id: u32 },
}

pub async fn run(action: InstanceAction) -> CliResult {
    let coord = open_coordinator()?;
    let result = execute(&coord, action).await;
    coord.shutdown().await;
    result
}

async fn execute(coord: &InstanceCoordinator, action: InstanceAction) -> CliResult {
    let geometry = match action {
        InstanceAction::Spawn { feature, id } => {
            let outcome = coord.spawn(feature, id)?;
            let note = if outcome.already_live {
                " (already open)"
            } else if outcome.restored {
                " (restored)"
            } else {
                ""
            };
            println!("spawned {} {}{note}", feature.key(), outcome.instance_id);
            None
        }
        InstanceAction::Close { feature, id } => {
            if !coord.close(feature, id).await {
                return Err(format!("no {feature} instance {id}").into());
            }
            println!("closed {} {id}", feature.key());
            None
        }
        InstanceAction::List { feature, json } => {
            let features: Vec<FeatureType> = match feature {
                Some(f) => vec![f],
                None => FeatureType::ALL.to_vec(),
            };
            let listing: Vec<(FeatureType, Vec<u32>)> = features
                .into_iter()
                .map(|f| (f, coord.active(f)))
                .filter(|(_, ids)| !ids.is_empty())
                .collect();
            if json {
                let value: serde_json::Map<String, serde_json::Value> = listing
                    .iter()
                    .map(|(f, ids)| (f.key().to_string(), serde_json::json!(ids)))
                    .collect();
                print_json(&value)?;
            } else if listing.is_empty() {
                println!("no instances");
            } else {
                for (f, ids) in listing {
                    let ids: Vec<String> = ids.iter().map(u32::to_string).collect();
                    println!("{:<14} {}", f.key(), ids.join(" "));
                }
            }
            None
        }
        InstanceAction::Show { feature, id } => {
            let value = coord
                .snapshot(feature, id)
                .ok_or_else(|| format!("no {feature} instance {id}"))?;
            print_json(&value)?;
            None
        }
        InstanceAction::Move { feature, id, x, y } => {
            Some((feature, id, GeometryChange::Move { x, y }))
        }
        InstanceAction::Resize {
            feature,
            id,
            width,
            height,
        } => Some((feature, id, GeometryChange::Resize { width, height })),
        InstanceAction::Lock { feature, id } => Some((feature, id, GeometryChange::SetLocked(true))),
        InstanceAction::Unlock { feature, id } => {
            Some((feature, id, GeometryChange::SetLocked(false)))
        }
    };

    if let Some((feature, id, change)) = geometry {
        if coord.apply_geometry(feature, id, change)? {
            println!("updated {} {id}", feature.key());
        } else {
            println!("unchanged {} {id}", feature.key());
        }
    }
    Ok(())
}
