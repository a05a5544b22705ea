//! Body - the unit of concurrently mutated state
//!
//! A body's position and velocity live behind its own guard. Nothing reads
//! or writes them without holding it: single-body access goes through
//! [`Body::with_lock`], two-body access through [`Body::with_pair_lock`],
//! which always locks in ascending [`BodyId`] order.

use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::events::{PositionChanged, PositionHandler, Subscribers, Subscription};
use super::vector::{self, Vector2};
use crate::error::{SimError, SimResult};

/// Stable body identity; also the global lock order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BodyId(pub u32);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The guarded part of a body
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Kinematics {
    pub position: Vector2,
    pub velocity: Vector2,
}

/// Fixed geometric properties used by the collision kernels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyShape {
    pub radius: f64,
    pub mass: f64,
}

/// Something that reacts to a body's position change before subscribers see it.
///
/// Called with no guard held. The collision engine is the production reactor;
/// `()` does nothing.
pub trait PositionReactor {
    fn position_changed(&self, body: &Body);
}

impl PositionReactor for () {
    fn position_changed(&self, _body: &Body) {}
}

/// A circular body on the table
pub struct Body {
    id: BodyId,
    radius: f64,
    mass: f64,
    state: Mutex<Kinematics>,
    subscribers: Subscribers,
}

impl Body {
    /// Create a body. Mass is fixed at `π·radius²`.
    pub fn new(id: BodyId, radius: f64, position: Vector2, velocity: Vector2) -> SimResult<Self> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(SimError::invalid(format!(
                "body {id}: radius must be finite and positive, got {radius}"
            )));
        }
        if !vector::is_finite(position) || !vector::is_finite(velocity) {
            return Err(SimError::invalid(format!(
                "body {id}: position and velocity must be finite"
            )));
        }
        Ok(Self {
            id,
            radius,
            mass: PI * radius * radius,
            state: Mutex::new(Kinematics { position, velocity }),
            subscribers: Subscribers::new(),
        })
    }

    #[inline]
    pub fn id(&self) -> BodyId {
        self.id
    }

    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    #[inline]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    #[inline]
    pub fn shape(&self) -> BodyShape {
        BodyShape {
            radius: self.radius,
            mass: self.mass,
        }
    }

    pub fn position(&self) -> Vector2 {
        self.state.lock().position
    }

    pub fn velocity(&self) -> Vector2 {
        self.state.lock().velocity
    }

    /// Position and velocity from a single guard acquisition
    pub fn kinematics(&self) -> Kinematics {
        *self.state.lock()
    }

    /// Replace the velocity. Silent: no notification is emitted.
    pub fn set_velocity(&self, velocity: Vector2) {
        self.state.lock().velocity = velocity;
    }

    /// Run `f` with this body's guard held.
    pub fn with_lock<T>(&self, f: impl FnOnce(&mut Kinematics) -> T) -> T {
        let mut state = self.state.lock();
        f(&mut state)
    }

    /// Run `f` with both guards held, acquired in ascending id order.
    ///
    /// The closure always receives `(a, b)` in argument order. Returns `None`
    /// when both arguments are the same body.
    pub fn with_pair_lock<T>(
        a: &Body,
        b: &Body,
        f: impl FnOnce(&mut Kinematics, &mut Kinematics) -> T,
    ) -> Option<T> {
        if a.id == b.id {
            return None;
        }
        let (first, second) = if a.id < b.id { (a, b) } else { (b, a) };
        let mut first_state = first.state.lock();
        let mut second_state = second.state.lock();
        let result = if a.id < b.id {
            f(&mut first_state, &mut second_state)
        } else {
            f(&mut second_state, &mut first_state)
        };
        Some(result)
    }

    /// Move by `delta`, let `reactor` respond, then notify subscribers.
    ///
    /// Subscribers receive the state as it stands after the reactor ran.
    /// Returns the published event.
    pub fn advance_position<R>(&self, delta: Vector2, reactor: &R) -> PositionChanged
    where
        R: PositionReactor + ?Sized,
    {
        self.state.lock().position += delta;
        reactor.position_changed(self);

        let settled = self.kinematics();
        let event = PositionChanged {
            body: self.id,
            position: settled.position,
            velocity: settled.velocity,
        };
        self.subscribers.publish(&event);
        event
    }

    /// Register a position-changed handler for this body.
    pub fn subscribe<F>(&self, handler: F) -> SimResult<Subscription>
    where
        F: Fn(&PositionChanged) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(Arc::new(handler))
    }

    pub(crate) fn subscribe_shared(
        &self,
        handler: Arc<PositionHandler>,
    ) -> SimResult<Subscription> {
        self.subscribers.subscribe(handler)
    }

    /// Release all handlers; later subscriptions fail with `AlreadyStopped`.
    pub(crate) fn close_subscriptions(&self) {
        self.subscribers.close();
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("id", &self.id)
            .field("radius", &self.radius)
            .field("mass", &self.mass)
            .field("state", &self.kinematics())
            .finish()
    }
}
