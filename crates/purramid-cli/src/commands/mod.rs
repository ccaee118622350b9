pub mod coin;
pub mod config;
pub mod dice;
pub mod instance;
pub mod timer;

use purramid_core::{Config, InstanceCoordinator};
use rand::SeedableRng;
use rand_pcg::Pcg64;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Open the configured store and re-attach every saved instance, the way a
/// host does at startup.
pub fn open_coordinator() -> Result<InstanceCoordinator, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let coord = InstanceCoordinator::open(&config)?;
    let restored = coord.restore_all();
    tracing::debug!(restored, "instances restored");
    Ok(coord)
}

/// Seeded generator when `seed` is given, OS entropy otherwise.
pub fn rng(seed: Option<u64>) -> Pcg64 {
    match seed {
        Some(seed) => Pcg64::seed_from_u64(seed),
        None => Pcg64::from_entropy(),
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
