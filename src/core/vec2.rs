//! Points and directions on the arena plane.
//!
//! Squared lengths are returned widened to `i64` (Q32.32) since the arena
//! is wider than the Q16.16 range allows for a squared distance.

use std::fmt;
use std::ops::{Add, Neg, Sub};
use serde::{Deserialize, Serialize};

use super::fixed::{fixed_cos, fixed_div, fixed_mul, fixed_sin, sqrt_wide, to_float, Fixed};

/// Position, velocity or direction in Q16.16.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FixedVec2 {
    /// Horizontal
    pub x: Fixed,
    /// Vertical
    pub y: Fixed,
}

impl FixedVec2 {
    /// Origin.
    pub const ZERO: Self = Self { x: 0, y: 0 };

    /// From components.
    #[inline]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Unit vector for a quantized angle (64 steps per turn).
    #[inline]
    pub fn from_angle(angle: u32) -> Self {
        Self {
            x: fixed_cos(angle),
            y: fixed_sin(angle),
        }
    }

    /// Componentwise product with `scalar`.
    #[inline]
    pub fn scale(self, scalar: Fixed) -> Self {
        Self {
            x: fixed_mul(self.x, scalar),
            y: fixed_mul(self.y, scalar),
        }
    }

    /// Squared length in Q32.32.
    #[inline]
    pub fn length_squared(self) -> i64 {
        let x = self.x as i64;
        let y = self.y as i64;
        x * x + y * y
    }

    /// Squared distance to another point in Q32.32.
    #[inline]
    pub fn distance_squared(self, other: Self) -> i64 {
        (other - self).length_squared()
    }

    /// Length in Q16.16.
    ///
    /// Saturates for vectors longer than the Q16.16 range can hold.
    pub fn length(self) -> Fixed {
        sqrt_wide(self.length_squared())
    }

    /// Normalize to unit length. The zero vector stays zero.
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == 0 {
            return Self::ZERO;
        }
        Self {
            x: fixed_div(self.x, len),
            y: fixed_div(self.y, len),
        }
    }

    /// Dot product in Q16.16.
    #[inline]
    pub fn dot(self, other: Self) -> Fixed {
        fixed_mul(self.x, other.x).wrapping_add(fixed_mul(self.y, other.y))
    }

    /// For logs and rendering.
    pub fn to_floats(self) -> (f32, f32) {
        (to_float(self.x), to_float(self.y))
    }
}

impl Add for FixedVec2 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x.wrapping_add(rhs.x), self.y.wrapping_add(rhs.y))
    }
}

impl Sub for FixedVec2 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x.wrapping_sub(rhs.x), self.y.wrapping_sub(rhs.y))
    }
}

impl Neg for FixedVec2 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(self.x.wrapping_neg(), self.y.wrapping_neg())
    }
}

impl fmt::Debug for FixedVec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x, y) = self.to_floats();
        write!(f, "Vec2({:.3}, {:.3})", x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::{from_int, FIXED_ONE};

    #[test]
    fn test_from_angle() {
        assert_eq!(FixedVec2::from_angle(0), FixedVec2::new(FIXED_ONE, 0));
        assert_eq!(FixedVec2::from_angle(16), FixedVec2::new(0, FIXED_ONE));
        assert_eq!(FixedVec2::from_angle(32), FixedVec2::new(-FIXED_ONE, 0));
    }

    #[test]
    fn test_distance_squared_wide() {
        let a = FixedVec2::new(from_int(-400), 0);
        let b = FixedVec2::new(from_int(400), 0);
        // 800^2 units does not fit Q16.16 but does fit Q32.32
        assert_eq!(a.distance_squared(b), (800i64 * 800) << 32);
    }

    #[test]
    fn test_normalize() {
        let v = FixedVec2::new(from_int(3), from_int(4));
        assert!((v.length() - from_int(5)).abs() < 64);
        let n = v.normalize();
        assert!((n.x - FIXED_ONE * 3 / 5).abs() < 64);
        assert!((n.y - FIXED_ONE * 4 / 5).abs() < 64);
        assert_eq!(FixedVec2::ZERO.normalize(), FixedVec2::ZERO);
    }

    #[test]
    fn test_ops() {
        let a = FixedVec2::new(from_int(1), from_int(2));
        let b = FixedVec2::new(from_int(3), from_int(5));
        assert_eq!(a + b, FixedVec2::new(from_int(4), from_int(7)));
        assert_eq!(b - a, FixedVec2::new(from_int(2), from_int(3)));
        assert_eq!(-a, FixedVec2::new(from_int(-1), from_int(-2)));
        assert_eq!(a.dot(b), from_int(13));
        assert_eq!(a.scale(from_int(2)), FixedVec2::new(from_int(2), from_int(4)));
    }
}
