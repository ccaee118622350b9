use std::time::Duration;

use clap::Subcommand;
use purramid_core::state::{TimerKind, TimerState};
use purramid_core::{InstanceCoordinator, InstanceEvent};

use super::{open_coordinator, print_json, CliResult};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start or resume a timer
    Start { id: u32 },
    /// Pause a running timer
    Pause { id: u32 },
    /// Reset to zero (stopwatch) or the full duration (countdown)
    Reset { id: u32 },
    /// Record a lap on a running stopwatch
    Lap { id: u32 },
    /// Switch between stopwatch and countdown
    Kind { id: u32, kind: TimerKind },
    /// Set the countdown duration
    Duration {
        id: u32,
        /// Duration in seconds
        secs: u64,
    },
    /// Print timer state as JSON
    Status { id: u32 },
    /// Keep the process alive and print the timer as it ticks
    Watch {
        id: u32,
        /// How long to watch, in seconds
        #[arg(long, default_value = "5")]
        secs: u64,
    },
}

fn format_millis(millis: u64) -> String {
    let total_secs = millis / 1000;
    format!(
        "{:02}:{:02}:{:02}.{:02}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60,
        (millis % 1000) / 10
    )
}

fn print_state(state: &TimerState) {
    let status = if state.running { "running" } else { "stopped" };
    println!(
        "timer {} {} {} {status}",
        state.instance_id,
        state.kind.key(),
        format_millis(state.current_millis)
    );
}

pub async fn run(action: TimerAction) -> CliResult {
    let coord = open_coordinator()?;
    let result = execute(&coord, action).await;
    coord.shutdown().await;
    result
}

async fn execute(coord: &InstanceCoordinator, action: TimerAction) -> CliResult {
    match action {
        TimerAction::Start { id } => print_state(&coord.start_timer(id)?),
        TimerAction::Pause { id } => print_state(&coord.pause_timer(id)?),
        TimerAction::Reset { id } => print_state(&coord.reset_timer(id)?),
        TimerAction::Lap { id } => {
            let state = coord.lap_timer(id)?;
            for (i, lap) in state.laps.iter().enumerate() {
                println!("lap {:>2}  {}", i + 1, format_millis(*lap));
            }
        }
        TimerAction::Kind { id, kind } => print_state(&coord.set_timer_kind(id, kind)?),
        TimerAction::Duration { id, secs } => {
            print_state(&coord.set_timer_duration(id, secs.saturating_mul(1000))?)
        }
        TimerAction::Status { id } => {
            let model = coord
                .model::<TimerState>(id)
                .ok_or_else(|| format!("no timer instance {id}"))?;
            print_json(&model.current())?;
        }
        TimerAction::Watch { id, secs } => watch(coord, id, secs).await?,
    }
    Ok(())
}

async fn watch(coord: &InstanceCoordinator, id: u32, secs: u64) -> CliResult {
    let model = coord
        .model::<TimerState>(id)
        .ok_or_else(|| format!("no timer instance {id}"))?;
    let mut events = coord.subscribe_events();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(secs);
    let mut every_second = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            _ = every_second.tick() => print_state(&model.current()),
            event = events.recv() => {
                if let Ok(InstanceEvent::TimerFinished { instance_id }) = event {
                    if instance_id == id {
                        print_state(&model.current());
                        println!("timer {id} finished");
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}
