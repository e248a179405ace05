//! Collision Detection
//!
//! Narrow-phase circle tests and push-out responses. Candidates come from
//! the spatial grid; everything here is exact integer math.

use crate::core::fixed::{fixed_div, Fixed};
use crate::core::vec2::FixedVec2;

/// Check if two circles overlap (touching does not count).
#[inline]
pub fn circles_overlap(pos_a: FixedVec2, radius_a: Fixed, pos_b: FixedVec2, radius_b: Fixed) -> bool {
    let reach = (radius_a + radius_b) as i64;
    pos_a.distance_squared(pos_b) < reach * reach
}

/// Displacement that moves circle A out of circle B.
///
/// Returns `None` when they do not overlap. Coincident centres push
/// along +X so the result never depends on anything but the inputs.
pub fn separation(pos_a: FixedVec2, radius_a: Fixed, pos_b: FixedVec2, radius_b: Fixed) -> Option<FixedVec2> {
    if !circles_overlap(pos_a, radius_a, pos_b, radius_b) {
        return None;
    }
    let reach = radius_a + radius_b;
    let d = pos_a - pos_b;
    let len = d.length();
    if len == 0 {
        return Some(FixedVec2::new(reach, 0));
    }
    let depth = reach - len;
    if depth <= 0 {
        return None;
    }
    let normal = FixedVec2::new(fixed_div(d.x, len), fixed_div(d.y, len));
    Some(normal.scale(depth))
}

/// Remove the part of `vel` pointing along `-push` (into the obstacle).
pub fn slide(vel: FixedVec2, push: FixedVec2) -> FixedVec2 {
    let normal = push.normalize();
    let into = vel.dot(normal);
    if into >= 0 {
        return vel;
    }
    vel - normal.scale(into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::{from_int, FIXED_ONE};

    #[test]
    fn test_circles_overlap() {
        let a = FixedVec2::new(from_int(0), 0);
        let b = FixedVec2::new(from_int(15), 0);
        assert!(circles_overlap(a, from_int(8), b, from_int(8)));
        assert!(!circles_overlap(a, from_int(7), b, from_int(8))); // touching
        assert!(!circles_overlap(a, from_int(4), b, from_int(4)));
    }

    #[test]
    fn test_separation_depth() {
        let a = FixedVec2::new(from_int(10), from_int(0));
        let b = FixedVec2::new(from_int(0), from_int(0));
        let push = separation(a, from_int(8), b, from_int(8)).unwrap();
        // 16 reach - 10 apart = 6 units along +x
        assert!((push.x - from_int(6)).abs() < 64);
        assert!(push.y.abs() < 64);

        assert!(separation(a, from_int(2), b, from_int(2)).is_none());
    }

    #[test]
    fn test_separation_coincident() {
        let a = FixedVec2::new(from_int(5), from_int(5));
        let push = separation(a, from_int(3), a, from_int(4)).unwrap();
        assert_eq!(push, FixedVec2::new(from_int(7), 0));
    }

    #[test]
    fn test_slide() {
        // Moving left into a wall pushing right
        let vel = FixedVec2::new(-FIXED_ONE, FIXED_ONE);
        let push = FixedVec2::new(from_int(2), 0);
        let out = slide(vel, push);
        assert!(out.x.abs() < 64);
        assert_eq!(out.y, FIXED_ONE);

        // Moving away is untouched
        let vel = FixedVec2::new(FIXED_ONE, 0);
        assert_eq!(slide(vel, push), vel);
    }
}
