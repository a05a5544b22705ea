//! Concurrent motion-and-collision engine
//!
//! - One mover thread per body, no central scheduler
//! - Each body's position/velocity behind its own guard
//! - Pair guards always taken in ascending body id order
//! - Collision sweeps run synchronously on the mover that moved

pub mod arena;
pub mod body;
pub mod collision;
pub mod events;
pub mod mover;
pub mod vector;

pub use arena::{Arena, Board, BodySnapshot, BodySpec, Table};
pub use body::{Body, BodyId, BodyShape, Kinematics, PositionReactor};
pub use collision::{
    CollisionEngine, Contact, SweepOutcome, WallContacts, reflect_walls, resolve_pair,
};
pub use events::{PositionChanged, PositionHandler, Subscribers, Subscription};
pub use mover::{Mover, MoverTiming};
pub use vector::Vector2;
