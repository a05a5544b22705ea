//! 2D vector math
//!
//! `Vector2` is glam's `DVec2`: plain `Copy` value, freely shared across
//! threads. This module adds the wall normals and the fixed normalization
//! policy used by the collision code.

use glam::DVec2;

use crate::error::{SimError, SimResult};

pub type Vector2 = DVec2;

/// Outward normal of the left wall (x = 0)
pub const LEFT: Vector2 = DVec2::new(-1.0, 0.0);
/// Outward normal of the right wall (x = width)
pub const RIGHT: Vector2 = DVec2::new(1.0, 0.0);
/// Outward normal of the bottom wall (y = 0)
pub const BOTTOM: Vector2 = DVec2::new(0.0, -1.0);
/// Outward normal of the top wall (y = height)
pub const TOP: Vector2 = DVec2::new(0.0, 1.0);

/// Unit vector in the direction of `v`.
///
/// Zero-length and non-finite inputs fail with [`SimError::DegenerateVector`];
/// there is no silent zero-vector fallback.
pub fn unit(v: Vector2) -> SimResult<Vector2> {
    let length = v.length();
    if length == 0.0 || !length.is_finite() {
        return Err(SimError::DegenerateVector);
    }
    Ok(v / length)
}

/// True when both components are finite
#[inline]
pub fn is_finite(v: Vector2) -> bool {
    v.x.is_finite() && v.y.is_finite()
}
