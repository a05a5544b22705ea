//! The table, its closed set of bodies, and the running simulation handle
//!
//! [`Board`] is immutable once built and shared with every mover through an
//! `Arc`; only the guarded state inside each [`Body`] changes. [`Arena`] owns
//! the mover threads and is the only teardown path.

use std::f64::consts::TAU;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::body::{Body, BodyId};
use super::events::{PositionChanged, PositionHandler, Subscription};
use super::mover::Mover;
use super::vector::Vector2;
use crate::error::{SimError, SimResult};
use crate::settings::SimulationSettings;

/// Table dimensions; walls at x = 0, x = width, y = 0, y = height
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub width: f64,
    pub height: f64,
}

impl Table {
    pub fn new(width: f64, height: f64) -> SimResult<Self> {
        let table = Self { width, height };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> SimResult<()> {
        let finite = self.width.is_finite() && self.height.is_finite();
        if !finite || self.width <= 0.0 || self.height <= 0.0 {
            return Err(SimError::invalid(format!(
                "table dimensions must be finite and positive, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// True when a circle at `position` lies fully on the table
    pub fn contains(&self, position: Vector2, radius: f64) -> bool {
        position.x - radius >= 0.0
            && position.x + radius <= self.width
            && position.y - radius >= 0.0
            && position.y + radius <= self.height
    }
}

/// Initial state of one body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodySpec {
    pub radius: f64,
    pub position: Vector2,
    pub velocity: Vector2,
}

impl BodySpec {
    pub fn new(radius: f64, position: Vector2, velocity: Vector2) -> Self {
        Self {
            radius,
            position,
            velocity,
        }
    }

    fn overlaps(&self, position: Vector2, radius: f64) -> bool {
        self.position.distance(position) <= self.radius + radius
    }
}

/// Point-in-time copy of one body, for presentation or diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BodySnapshot {
    pub id: BodyId,
    pub radius: f64,
    pub mass: f64,
    pub position: Vector2,
    pub velocity: Vector2,
}

/// The fixed set of bodies plus the table they sit on
#[derive(Debug)]
pub struct Board {
    table: Table,
    /// Sorted by id; ids are 0..n in creation order
    bodies: Vec<Body>,
}

impl Board {
    /// Build a board from explicit initial states. Ids follow slice order.
    pub fn from_specs(table: Table, specs: Vec<BodySpec>) -> SimResult<Self> {
        table.validate()?;
        if u32::try_from(specs.len()).is_err() {
            return Err(SimError::invalid(format!("too many bodies: {}", specs.len())));
        }
        let bodies = specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| {
                Body::new(BodyId(index as u32), spec.radius, spec.position, spec.velocity)
            })
            .collect::<SimResult<Vec<_>>>()?;
        Ok(Self { table, bodies })
    }

    /// Random layout: radius, position and heading drawn from a seeded PCG.
    ///
    /// Positions are re-drawn up to `placement_attempts` times to avoid
    /// overlapping an already placed body. A crowded table may still end up
    /// with overlapping pairs; the sweep treats them like any other contact.
    pub fn generate(count: usize, table: Table, settings: &SimulationSettings) -> SimResult<Self> {
        table.validate()?;
        settings.validate()?;

        let seed = settings.seed.unwrap_or_else(|| rand::rng().random());
        log::debug!(
            "generating {count} bodies on a {}x{} table (seed {seed})",
            table.width,
            table.height
        );
        let mut rng = Pcg32::seed_from_u64(seed);

        let max_fit = table.width.min(table.height) / 2.0;
        let mut specs: Vec<BodySpec> = Vec::with_capacity(count);
        for index in 0..count {
            let radius = rng
                .random_range(settings.min_radius..=settings.max_radius)
                .min(max_fit);

            let mut position = random_position(&mut rng, &table, radius);
            let mut attempts = 1;
            while attempts < settings.placement_attempts
                && specs.iter().any(|s| s.overlaps(position, radius))
            {
                position = random_position(&mut rng, &table, radius);
                attempts += 1;
            }
            if specs.iter().any(|s| s.overlaps(position, radius)) {
                log::warn!(
                    "body #{index} overlaps a neighbour after {attempts} placement attempts"
                );
            }

            let heading = rng.random_range(0.0..TAU);
            let speed = rng.random_range(settings.min_speed..=settings.max_speed);
            let velocity = Vector2::new(heading.cos(), heading.sin()) * speed;
            specs.push(BodySpec::new(radius, position, velocity));
        }

        Self::from_specs(table, specs)
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id.0 as usize).filter(|b| b.id() == id)
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Per-body snapshots; each is atomic, the set as a whole is not.
    pub fn snapshot(&self) -> Vec<BodySnapshot> {
        self.bodies
            .iter()
            .map(|body| {
                let state = body.kinematics();
                BodySnapshot {
                    id: body.id(),
                    radius: body.radius(),
                    mass: body.mass(),
                    position: state.position,
                    velocity: state.velocity,
                }
            })
            .collect()
    }

    /// Σ m·v over all bodies
    pub fn total_momentum(&self) -> Vector2 {
        self.bodies
            .iter()
            .fold(Vector2::ZERO, |sum, b| sum + b.velocity() * b.mass())
    }

    /// Σ ½·m·|v|² over all bodies
    pub fn kinetic_energy(&self) -> f64 {
        self.bodies
            .iter()
            .map(|b| 0.5 * b.mass() * b.velocity().length_squared())
            .sum()
    }
}

fn random_position(rng: &mut Pcg32, table: &Table, radius: f64) -> Vector2 {
    Vector2::new(
        rng.random_range(radius..=table.width - radius),
        rng.random_range(radius..=table.height - radius),
    )
}

/// A running simulation: the board plus one mover thread per body
#[derive(Debug)]
pub struct Arena {
    table: Table,
    /// `None` once stopped
    board: Option<Arc<Board>>,
    movers: Vec<Mover>,
}

impl Arena {
    /// Generate `body_count` random bodies and start moving them.
    pub fn start(
        body_count: usize,
        table: Table,
        settings: &SimulationSettings,
    ) -> SimResult<Self> {
        let board = Board::generate(body_count, table, settings)?;
        Self::launch(board, settings)
    }

    /// Start one mover per body of an existing board.
    ///
    /// Pass an `Arc<Board>` to keep reading the bodies after [`Arena::stop`].
    pub fn launch(
        board: impl Into<Arc<Board>>,
        settings: &SimulationSettings,
    ) -> SimResult<Self> {
        settings.mover.validate()?;
        let board: Arc<Board> = board.into();

        let mut movers = Vec::with_capacity(board.len());
        for index in 0..board.len() {
            match Mover::spawn(Arc::clone(&board), index, settings.mover) {
                Ok(mover) => movers.push(mover),
                Err(err) => {
                    log::error!("failed to start mover {index}: {err}");
                    for mover in &movers {
                        mover.signal_stop();
                    }
                    for mover in movers {
                        mover.join();
                    }
                    return Err(err);
                }
            }
        }

        let table = *board.table();
        log::info!(
            "simulation started: {} bodies on a {}x{} table",
            board.len(),
            table.width,
            table.height
        );
        Ok(Self {
            table,
            board: Some(board),
            movers,
        })
    }

    /// The running board; `None` after stop
    pub fn board(&self) -> Option<&Board> {
        self.board.as_deref()
    }

    /// Empty after stop
    pub fn bodies(&self) -> &[Body] {
        self.board.as_deref().map(Board::bodies).unwrap_or_default()
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn is_running(&self) -> bool {
        self.board.is_some()
    }

    fn running_board(&self) -> SimResult<&Board> {
        self.board.as_deref().ok_or(SimError::AlreadyStopped)
    }

    /// Receive every settled position of body `id`.
    pub fn subscribe<F>(&self, id: BodyId, handler: F) -> SimResult<Subscription>
    where
        F: Fn(&PositionChanged) + Send + Sync + 'static,
    {
        let body = self.running_board()?.body(id).ok_or(SimError::UnknownBody(id))?;
        body.subscribe(handler)
    }

    /// Share one handler across all bodies; one subscription per body.
    pub fn subscribe_all<F>(&self, handler: F) -> SimResult<Vec<Subscription>>
    where
        F: Fn(&PositionChanged) + Send + Sync + 'static,
    {
        let board = self.running_board()?;
        let handler: Arc<PositionHandler> = Arc::new(handler);
        board
            .bodies()
            .iter()
            .map(|body| body.subscribe_shared(Arc::clone(&handler)))
            .collect()
    }

    pub fn snapshot(&self) -> SimResult<Vec<BodySnapshot>> {
        Ok(self.running_board()?.snapshot())
    }

    pub fn total_momentum(&self) -> SimResult<Vector2> {
        Ok(self.running_board()?.total_momentum())
    }

    pub fn kinetic_energy(&self) -> SimResult<f64> {
        Ok(self.running_board()?.kinetic_energy())
    }

    /// Stop every mover, wait for them, release all subscribers and the board.
    ///
    /// Fails with [`SimError::AlreadyStopped`] on every call after the first.
    pub fn stop(&mut self) -> SimResult<()> {
        self.running_board()?;
        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        let Some(board) = self.board.take() else {
            return;
        };
        // Signal everyone first so the joins overlap
        for mover in &self.movers {
            mover.signal_stop();
        }
        let total = self.movers.len();
        let panicked = self
            .movers
            .drain(..)
            .map(Mover::join)
            .filter(|clean| !clean)
            .count();
        for body in board.bodies() {
            body.close_subscriptions();
        }
        if panicked > 0 {
            log::warn!("{panicked} of {total} movers panicked before shutdown");
        }
        log::info!("simulation stopped: {total} movers joined");
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::vector;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn seeded(seed: u64) -> SimulationSettings {
        SimulationSettings {
            seed: Some(seed),
            ..Default::default()
        }
    }

    #[test]
    fn test_table_rejects_bad_dimensions() {
        for (w, h) in [(0.0, 10.0), (10.0, -1.0), (f64::NAN, 10.0), (10.0, f64::INFINITY)] {
            assert!(matches!(
                Table::new(w, h),
                Err(SimError::InvalidConfiguration(_))
            ));
        }
        assert!(Table::new(0.5, 0.5).is_ok());
    }

    #[test]
    fn test_generate_places_bodies_inside_without_overlap() {
        let table = Table::new(100.0, 60.0).unwrap();
        let settings = seeded(7);
        let board = Board::generate(40, table, &settings).unwrap();

        assert_eq!(board.len(), 40);
        for (index, body) in board.bodies().iter().enumerate() {
            assert_eq!(body.id(), BodyId(index as u32));
            assert!(table.contains(body.position(), body.radius()));
            assert!(body.radius() >= settings.min_radius && body.radius() <= settings.max_radius);
            let speed = body.velocity().length();
            assert!(speed >= settings.min_speed - 1e-9 && speed <= settings.max_speed + 1e-9);
        }
        let bodies = board.bodies();
        for i in 0..bodies.len() {
            for j in i + 1..bodies.len() {
                let gap = bodies[i].position().distance(bodies[j].position());
                assert!(gap > bodies[i].radius() + bodies[j].radius());
            }
        }
    }

    #[test]
    fn test_generate_is_reproducible_with_seed() {
        let table = Table::new(20.0, 20.0).unwrap();
        let a = Board::generate(10, table, &seeded(42)).unwrap().snapshot();
        let b = Board::generate(10, table, &seeded(42)).unwrap().snapshot();
        let c = Board::generate(10, table, &seeded(43)).unwrap().snapshot();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_generate_shrinks_radius_to_fit_table() {
        let table = Table::new(0.6, 5.0).unwrap();
        let board = Board::generate(3, table, &seeded(1)).unwrap();
        for body in board.bodies() {
            assert!(body.radius() <= 0.3);
            assert!(table.contains(body.position(), body.radius()));
        }
    }

    #[test]
    fn test_board_lookup_and_momentum() {
        let table = Table::new(10.0, 10.0).unwrap();
        let board = Board::from_specs(
            table,
            vec![
                BodySpec::new(1.0, Vector2::new(2.0, 2.0), Vector2::new(1.0, 0.0)),
                BodySpec::new(1.0, Vector2::new(6.0, 6.0), Vector2::new(-1.0, 2.0)),
            ],
        )
        .unwrap();
        assert_eq!(board.body(BodyId(1)).unwrap().position(), Vector2::new(6.0, 6.0));
        assert!(board.body(BodyId(2)).is_none());

        let m = std::f64::consts::PI;
        let p = board.total_momentum();
        assert!((p - Vector2::new(0.0, 2.0 * m)).length() < 1e-12);
        assert!((board.kinetic_energy() - 0.5 * m * (1.0 + 5.0)).abs() < 1e-12);
    }

    #[test]
    fn test_empty_arena_starts_and_stops() {
        let table = Table::new(10.0, 10.0).unwrap();
        let mut arena = Arena::start(0, table, &SimulationSettings::default()).unwrap();
        assert!(arena.bodies().is_empty());
        assert!(arena.is_running());
        arena.stop().unwrap();
        assert!(!arena.is_running());
    }

    #[test]
    fn test_stop_twice_fails() {
        let table = Table::new(20.0, 20.0).unwrap();
        let mut arena = Arena::start(5, table, &seeded(3)).unwrap();
        arena.stop().unwrap();
        assert!(matches!(arena.stop(), Err(SimError::AlreadyStopped)));
        assert!(matches!(arena.snapshot(), Err(SimError::AlreadyStopped)));
        assert!(matches!(
            arena.subscribe(BodyId(0), |_| {}),
            Err(SimError::AlreadyStopped)
        ));
    }

    #[test]
    fn test_subscribe_unknown_body() {
        let table = Table::new(20.0, 20.0).unwrap();
        let arena = Arena::start(2, table, &seeded(3)).unwrap();
        assert!(matches!(
            arena.subscribe(BodyId(9), |_| {}),
            Err(SimError::UnknownBody(BodyId(9)))
        ));
    }

    #[test]
    fn test_stop_releases_subscribers() {
        let table = Table::new(20.0, 20.0).unwrap();
        let mut arena = Arena::start(3, table, &seeded(5)).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let subs = arena
            .subscribe_all(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(subs.len(), 3);

        thread::sleep(Duration::from_millis(150));
        arena.stop().unwrap();
        assert!(count.load(Ordering::SeqCst) >= 3);
        // Only the test's clone of the counter is left once handlers are released
        assert_eq!(Arc::strong_count(&count), 1);
        drop(subs);
    }

    #[test]
    fn test_many_movers_no_deadlock_or_torn_state() {
        let table = Table::new(40.0, 40.0).unwrap();
        let settings = SimulationSettings {
            seed: Some(2024),
            min_speed: 5.0,
            max_speed: 15.0,
            ..Default::default()
        };
        let board = Arc::new(Board::generate(60, table, &settings).unwrap());
        let energy_before = board.kinetic_energy();

        let mut arena = Arena::launch(Arc::clone(&board), &settings).unwrap();
        let events = Arc::new(AtomicUsize::new(0));
        let bad = Arc::new(AtomicUsize::new(0));

        let (events_in, bad_in) = (Arc::clone(&events), Arc::clone(&bad));
        let max_speed = 1e3;
        let _subs = arena
            .subscribe_all(move |e| {
                events_in.fetch_add(1, Ordering::Relaxed);
                let finite = vector::is_finite(e.position) && vector::is_finite(e.velocity);
                if !finite || e.velocity.length() > max_speed {
                    bad_in.fetch_add(1, Ordering::Relaxed);
                }
            })
            .unwrap();

        thread::sleep(Duration::from_millis(500));
        let (done_tx, done_rx) = mpsc::channel();
        let stopper = thread::spawn(move || {
            let result = arena.stop();
            done_tx.send(result.is_ok()).unwrap();
            arena
        });
        let stopped = done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("arena did not stop: movers deadlocked");
        assert!(stopped);
        drop(stopper.join().unwrap());

        assert!(events.load(Ordering::Relaxed) > 60);
        assert_eq!(bad.load(Ordering::Relaxed), 0);
        // Movers and the arena have let go; only this handle is left
        assert_eq!(Arc::strong_count(&board), 1);

        // Wall flips and elastic impulses keep energy; a lost or torn
        // read-modify-write on any body would not
        let energy_after = board.kinetic_energy();
        assert!(
            (energy_after - energy_before).abs() <= 1e-9 * energy_before,
            "energy drifted: {energy_before} -> {energy_after}"
        );
        for body in board.bodies() {
            let state = body.kinematics();
            assert!(vector::is_finite(state.position) && vector::is_finite(state.velocity));
            assert!((body.mass() - std::f64::consts::PI * body.radius().powi(2)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_stop_releases_board() {
        let table = Table::new(20.0, 20.0).unwrap();
        let board = Arc::new(Board::generate(4, table, &seeded(8)).unwrap());
        let settings = SimulationSettings::default();
        let mut arena = Arena::launch(Arc::clone(&board), &settings).unwrap();
        assert_eq!(arena.bodies().len(), 4);
        assert!(Arc::strong_count(&board) > 1);

        arena.stop().unwrap();
        assert!(arena.bodies().is_empty());
        assert!(arena.board().is_none());
        assert_eq!(arena.table(), table);
        assert_eq!(Arc::strong_count(&board), 1);

        // Nothing moves the bodies any more
        let frozen = board.snapshot();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(board.snapshot(), frozen);
    }

    #[test]
    fn test_launch_from_specs_collides_head_on() {
        let table = Table::new(100.0, 100.0).unwrap();
        let board = Board::from_specs(
            table,
            vec![
                BodySpec::new(1.0, Vector2::new(40.0, 50.0), Vector2::new(20.0, 0.0)),
                BodySpec::new(1.0, Vector2::new(60.0, 50.0), Vector2::new(-20.0, 0.0)),
            ],
        )
        .unwrap();
        let mut arena = Arena::launch(board, &SimulationSettings::default()).unwrap();
        thread::sleep(Duration::from_millis(900));
        let momentum = arena.total_momentum().unwrap();
        let snapshot = arena.snapshot().unwrap();
        arena.stop().unwrap();

        // They meet after ~0.45 s and bounce back along x
        assert!(snapshot[0].velocity.x < 0.0);
        assert!(snapshot[1].velocity.x > 0.0);
        assert!(momentum.length() < 1e-9);
    }
}
