//! Ball Table - concurrent bouncing-ball simulation
//!
//! Core modules:
//! - `sim`: bodies, mover threads, collision engine, arena lifecycle
//! - `settings`: layout ranges and mover timing (JSON)
//! - `error`: setup and teardown errors
//!
//! Rendering, input and position logging live outside this crate; they
//! subscribe to position changes and start or stop the simulation.

pub mod error;
pub mod settings;
pub mod sim;

pub use error::{SimError, SimResult};
pub use settings::SimulationSettings;
pub use sim::{Arena, Body, BodyId, PositionChanged, Subscription, Table, Vector2};

/// Simulation defaults
pub mod consts {
    /// Body radius range
    pub const DEFAULT_MIN_RADIUS: f64 = 0.5;
    pub const DEFAULT_MAX_RADIUS: f64 = 1.0;

    /// Initial speed range, table units per second
    pub const DEFAULT_MIN_SPEED: f64 = 2.0;
    pub const DEFAULT_MAX_SPEED: f64 = 4.0;

    /// Position draws per body when avoiding overlaps
    pub const DEFAULT_PLACEMENT_ATTEMPTS: u32 = 32;

    /// Mover sleep `1 / (speed * K + eps)`: K, eps and the floor in ms
    pub const DEFAULT_SLEEP_GAIN: f64 = 20.0;
    pub const DEFAULT_SLEEP_EPSILON: f64 = 10.0;
    pub const DEFAULT_MIN_INTERVAL_MS: f64 = 1.0;
}

/// Start `body_count` randomly placed bodies on a `table_width x table_height`
/// table with default settings.
pub fn start_simulation(
    body_count: i64,
    table_width: f64,
    table_height: f64,
) -> SimResult<Arena> {
    let settings = SimulationSettings::default();
    start_simulation_with(body_count, table_width, table_height, &settings)
}

/// [`start_simulation`] with explicit settings. Everything is validated
/// before the first mover starts.
pub fn start_simulation_with(
    body_count: i64,
    table_width: f64,
    table_height: f64,
    settings: &SimulationSettings,
) -> SimResult<Arena> {
    let count = usize::try_from(body_count).map_err(|_| {
        SimError::invalid(format!("body count must not be negative, got {body_count}"))
    })?;
    let table = Table::new(table_width, table_height)?;
    Arena::start(count, table, settings)
}

/// Register `handler` for the settled positions of one body.
///
/// Runs on that body's mover thread; a slow handler stalls the body.
pub fn subscribe_position_changes<F>(
    arena: &Arena,
    body: BodyId,
    handler: F,
) -> SimResult<Subscription>
where
    F: Fn(&PositionChanged) + Send + Sync + 'static,
{
    arena.subscribe(body, handler)
}

/// Stop all movers and release the arena's subscribers and bodies.
pub fn stop_simulation(arena: &mut Arena) -> SimResult<()> {
    arena.stop()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_bodies_is_fine() {
        let mut arena = start_simulation(0, 10.0, 10.0).unwrap();
        assert!(arena.bodies().is_empty());
        stop_simulation(&mut arena).unwrap();
    }

    #[test]
    fn test_negative_count_rejected() {
        assert!(matches!(
            start_simulation(-1, 10.0, 10.0),
            Err(SimError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_bad_dimensions_rejected() {
        assert!(matches!(
            start_simulation(3, 0.0, 10.0),
            Err(SimError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            start_simulation(3, 10.0, -5.0),
            Err(SimError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_bad_settings_rejected_before_start() {
        let settings = SimulationSettings {
            max_speed: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            start_simulation_with(3, 10.0, 10.0, &settings),
            Err(SimError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_subscribe_then_stop_twice() {
        let settings = SimulationSettings::default().with_seed(11);
        let mut arena = start_simulation_with(4, 20.0, 20.0, &settings).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        let _sub = subscribe_position_changes(&arena, BodyId(2), move |e| {
            let _ = tx.send(*e);
        })
        .unwrap();

        let event = rx
            .recv_timeout(std::time::Duration::from_secs(2))
            .expect("no position event");
        assert_eq!(event.body, BodyId(2));

        stop_simulation(&mut arena).unwrap();
        assert!(matches!(stop_simulation(&mut arena), Err(SimError::AlreadyStopped)));
    }
}
