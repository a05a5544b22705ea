//! Per-body mover threads
//!
//! Each body gets one thread that advances it by `velocity · elapsed` and
//! then sleeps for an interval picked from its current speed. Movers never
//! wait on each other; all cross-body work happens inside the collision sweep
//! that each position update triggers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::arena::Board;
use super::body::BodyId;
use super::collision::CollisionEngine;
use crate::consts::{DEFAULT_MIN_INTERVAL_MS, DEFAULT_SLEEP_EPSILON, DEFAULT_SLEEP_GAIN};
use crate::error::{SimError, SimResult};

/// Adaptive sleep between ticks: `1 / (speed · gain + epsilon)` seconds.
///
/// Fast bodies are sampled often, slow ones approach the `1 / epsilon`
/// ceiling. The distance covered between two ticks stays below `1 / gain`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoverTiming {
    /// K: ticks per second gained per unit of speed
    pub gain: f64,
    /// ε: sets the longest sleep (`1 / epsilon` seconds)
    pub epsilon: f64,
    /// Floor on the sleep, bounds CPU use for very fast bodies
    pub min_interval_ms: f64,
}

impl Default for MoverTiming {
    fn default() -> Self {
        Self {
            gain: DEFAULT_SLEEP_GAIN,
            epsilon: DEFAULT_SLEEP_EPSILON,
            min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
        }
    }
}

impl MoverTiming {
    pub fn validate(&self) -> SimResult<()> {
        if !self.gain.is_finite() || self.gain <= 0.0 {
            return Err(SimError::invalid(format!(
                "mover gain must be finite and positive, got {}",
                self.gain
            )));
        }
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(SimError::invalid(format!(
                "mover epsilon must be finite and positive, got {}",
                self.epsilon
            )));
        }
        if !self.min_interval_ms.is_finite()
            || self.min_interval_ms < 0.0
            || self.min_interval_ms / 1000.0 > 1.0 / self.epsilon
        {
            return Err(SimError::invalid(format!(
                "mover min interval must lie in [0, {} ms], got {}",
                1000.0 / self.epsilon,
                self.min_interval_ms
            )));
        }
        Ok(())
    }

    /// Longest sleep, reached at zero speed
    pub fn max_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.epsilon)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(self.min_interval_ms / 1000.0)
    }

    /// Sleep after a tick for a body moving at `speed`
    pub fn interval(&self, speed: f64) -> Duration {
        let max = 1.0 / self.epsilon;
        let secs = 1.0 / (speed * self.gain + self.epsilon);
        if !speed.is_finite() || !secs.is_finite() || secs > max {
            return self.max_interval();
        }
        Duration::from_secs_f64(secs.max(self.min_interval_ms / 1000.0))
    }
}

/// Handle to one running mover thread
pub struct Mover {
    body: BodyId,
    stop: Arc<AtomicBool>,
    panicked: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Mover {
    /// Start moving `board.bodies()[index]` on a new thread.
    pub fn spawn(board: Arc<Board>, index: usize, timing: MoverTiming) -> SimResult<Self> {
        let body = board
            .bodies()
            .get(index)
            .map(|b| b.id())
            .ok_or_else(|| SimError::invalid(format!("no body at index {index}")))?;
        let stop = Arc::new(AtomicBool::new(false));
        let panicked = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let guard = PanicGuard {
            body,
            panicked: Arc::clone(&panicked),
        };

        let thread = thread::Builder::new()
            .name(format!("mover-{}", body.0))
            .spawn(move || {
                let _guard = guard;
                run(&board, index, timing, &flag);
            })?;

        Ok(Self {
            body,
            stop,
            panicked,
            thread: Some(thread),
        })
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    /// Ask the thread to exit after its current tick. Does not wait.
    pub fn signal_stop(&self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = &self.thread {
            thread.thread().unpark();
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// True once the thread has unwound, typically from a panicking subscriber
    pub fn has_panicked(&self) -> bool {
        self.panicked.load(Ordering::Acquire)
    }

    /// Stop and wait for the thread. Returns false if it panicked.
    pub fn join(mut self) -> bool {
        self.signal_stop();
        match self.thread.take() {
            Some(thread) => match thread.join() {
                Ok(()) => true,
                Err(_) => {
                    log::error!("mover for body {} panicked", self.body);
                    false
                }
            },
            None => true,
        }
    }
}

impl Drop for Mover {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.stop.store(true, Ordering::Release);
            thread.thread().unpark();
            if thread.join().is_err() {
                log::error!("mover for body {} panicked", self.body);
            }
        }
    }
}

impl std::fmt::Debug for Mover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mover")
            .field("body", &self.body)
            .field("stopping", &self.is_stopping())
            .field("panicked", &self.has_panicked())
            .finish()
    }
}

/// Reports an unwinding mover from its own thread, before anyone joins it
struct PanicGuard {
    body: BodyId,
    panicked: Arc<AtomicBool>,
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            self.panicked.store(true, Ordering::Release);
            log::error!("mover for body {} panicked; the body stops moving", self.body);
        }
    }
}

fn run(board: &Board, index: usize, timing: MoverTiming, stop: &AtomicBool) {
    let Some(body) = board.bodies().get(index) else {
        return;
    };
    let engine = CollisionEngine::new(board);
    log::debug!("mover for body {} started", body.id());

    let mut last_tick = Instant::now();
    while !stop.load(Ordering::Acquire) {
        let now = Instant::now();
        let elapsed = now.duration_since(last_tick).as_secs_f64();
        last_tick = now;

        let velocity = body.velocity();
        let settled = body.advance_position(velocity * elapsed, &engine);

        // Spurious wakeups only shorten one sleep; elapsed time covers it
        thread::park_timeout(timing.interval(settled.velocity.length()));
    }

    log::debug!("mover for body {} stopped", body.id());
}
