//! Collision detection and response
//!
//! Two kernels work on already-locked [`Kinematics`]: wall reflection for a
//! single body and elastic resolution for a pair. [`CollisionEngine`] wires
//! them to the body guards and runs one sweep per position change.

use super::arena::{Board, Table};
use super::body::{Body, BodyId, BodyShape, Kinematics, PositionReactor};
use super::vector::{self, BOTTOM, LEFT, RIGHT, TOP, Vector2};

/// Which walls reflected the body during one check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WallContacts {
    pub left: bool,
    pub right: bool,
    pub bottom: bool,
    pub top: bool,
}

impl WallContacts {
    pub fn any(&self) -> bool {
        self.left || self.right || self.bottom || self.top
    }
}

/// A resolved ball-ball contact
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Unit normal pointing from the second body towards the first
    pub normal: Vector2,
    /// `dot(vA - vB, normal)` before resolution; never positive
    pub closing_speed: f64,
}

/// Reflect off any wall the body has crossed while still heading out.
///
/// Each of the four walls is checked on its own, so a body in a corner can
/// bounce on both axes in one call. A body past a wall but already moving
/// back inside is left alone.
pub fn reflect_walls(state: &mut Kinematics, radius: f64, table: &Table) -> WallContacts {
    let pos = state.position;
    let vel = state.velocity;
    let mut contacts = WallContacts::default();

    if pos.x + radius > table.width && vel.dot(RIGHT) > 0.0 {
        contacts.right = true;
    }
    if pos.x - radius < 0.0 && vel.dot(LEFT) > 0.0 {
        contacts.left = true;
    }
    if pos.y + radius > table.height && vel.dot(TOP) > 0.0 {
        contacts.top = true;
    }
    if pos.y - radius < 0.0 && vel.dot(BOTTOM) > 0.0 {
        contacts.bottom = true;
    }

    if contacts.left || contacts.right {
        state.velocity.x = -vel.x;
    }
    if contacts.top || contacts.bottom {
        state.velocity.y = -vel.y;
    }
    contacts
}

/// Elastic impulse along the contact normal.
///
/// Skips pairs that are apart, exactly coincident, or already separating
/// (`dot(vA - vB, n) > 0`). The separating check is what keeps a pair that
/// stays in contact for several ticks from being resolved twice.
pub fn resolve_pair(
    a: &mut Kinematics,
    shape_a: BodyShape,
    b: &mut Kinematics,
    shape_b: BodyShape,
) -> Option<Contact> {
    let delta = a.position - b.position;
    let distance = delta.length();
    if distance == 0.0 || distance > shape_a.radius + shape_b.radius {
        return None;
    }

    let normal = vector::unit(delta).ok()?;
    let relative = a.velocity - b.velocity;
    let closing_speed = relative.dot(normal);
    if closing_speed > 0.0 {
        return None;
    }

    // impulse = 2·vn / (mA + mB), folded into per-body mass ratios
    let total = shape_a.mass + shape_b.mass;
    let ratio_a = 2.0 * shape_b.mass / total;
    let ratio_b = 2.0 * shape_a.mass / total;
    a.velocity -= normal * (closing_speed * ratio_a);
    b.velocity += normal * (closing_speed * ratio_b);

    Some(Contact {
        normal,
        closing_speed,
    })
}

/// Result of one sweep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepOutcome {
    pub walls: WallContacts,
    /// Bodies the moved body exchanged an impulse with, in sweep order
    pub collided: Vec<BodyId>,
}

/// Runs wall and pairwise checks for a body that just moved
#[derive(Debug, Clone, Copy)]
pub struct CollisionEngine<'a> {
    board: &'a Board,
}

impl<'a> CollisionEngine<'a> {
    pub fn new(board: &'a Board) -> Self {
        Self { board }
    }

    /// Check `moved` against the walls and then every other body.
    ///
    /// At most two guards are held at a time, and only for one
    /// read-check-write: the moved body's alone for the walls, then each pair
    /// locked in ascending id order.
    pub fn sweep(&self, moved: &Body) -> SweepOutcome {
        let table = self.board.table();
        let radius = moved.radius();
        let walls = moved.with_lock(|state| reflect_walls(state, radius, table));
        if walls.any() {
            log::trace!("{} bounced off walls {:?}", moved.id(), walls);
        }

        let shape = moved.shape();
        let mut collided = Vec::new();
        for other in self.board.bodies() {
            if other.id() == moved.id() {
                continue;
            }
            let other_shape = other.shape();
            let contact = Body::with_pair_lock(moved, other, |a, b| {
                resolve_pair(a, shape, b, other_shape)
            })
            .flatten();
            if let Some(contact) = contact {
                log::trace!(
                    "{} hit {} (closing speed {:.4})",
                    moved.id(),
                    other.id(),
                    -contact.closing_speed
                );
                collided.push(other.id());
            }
        }

        SweepOutcome { walls, collided }
    }
}

impl PositionReactor for CollisionEngine<'_> {
    fn position_changed(&self, body: &Body) {
        self.sweep(body);
    }
}
