//! Ball Table entry point
//!
//! Headless run: starts the simulation, counts position events for a while,
//! then stops and prints a summary.
//!
//! Usage: `ball-table [count] [width] [height] [seconds] [settings.json]`

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use ball_table::{SimError, SimResult, SimulationSettings, start_simulation_with, stop_simulation};

const DEFAULT_COUNT: i64 = 15;
const DEFAULT_TABLE_SIZE: f64 = 20.0;
const DEFAULT_SECONDS: f64 = 2.0;

fn main() -> ExitCode {
    env_logger::init();
    log::info!("Ball Table (headless) starting...");

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            eprintln!("ball-table: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> SimResult<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let count = arg(&args, 0, "count", DEFAULT_COUNT)?;
    let width = arg(&args, 1, "width", DEFAULT_TABLE_SIZE)?;
    let height = arg(&args, 2, "height", DEFAULT_TABLE_SIZE)?;
    let seconds: f64 = arg(&args, 3, "seconds", DEFAULT_SECONDS)?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(SimError::invalid(format!("seconds must be non-negative, got {seconds}")));
    }
    let settings = match args.get(4) {
        Some(path) => SimulationSettings::load(path)?,
        None => SimulationSettings::default(),
    };

    let mut arena = start_simulation_with(count, width, height, &settings)?;
    let energy_start = arena.kinetic_energy()?;

    let events = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&events);
    let subscriptions = arena.subscribe_all(move |event| {
        counter.fetch_add(1, Ordering::Relaxed);
        if log::log_enabled!(log::Level::Trace) {
            if let Ok(line) = serde_json::to_string(event) {
                log::trace!("{line}");
            }
        }
    })?;

    thread::sleep(Duration::from_secs_f64(seconds));

    let body_count = arena.bodies().len();
    let momentum = arena.total_momentum()?;
    let energy_end = arena.kinetic_energy()?;
    stop_simulation(&mut arena)?;
    drop(subscriptions);

    println!(
        "{body_count} bodies, {:.1}s: {} position events",
        seconds,
        events.load(Ordering::Relaxed)
    );
    println!("momentum ({:.4}, {:.4})", momentum.x, momentum.y);
    println!("kinetic energy {energy_start:.4} -> {energy_end:.4}");
    Ok(())
}

fn arg<T>(args: &[String], index: usize, name: &str, default: T) -> SimResult<T>
where
    T: std::str::FromStr,
{
    match args.get(index) {
        Some(raw) => raw
            .parse()
            .map_err(|_| SimError::invalid(format!("{name}: cannot parse {raw:?}"))),
        None => Ok(default),
    }
}
