//! Q16.16 Fixed Point
//!
//! Gameplay never touches floats. Values are `i32` with 16 fractional bits
//! (range about ±32768 units, step 1/65536), products widen through `i64`,
//! and trigonometry reads a quarter-wave table over 64 directions so every
//! peer produces the same bits whatever its FPU does.

/// Q16.16 value.
pub type Fixed = i32;

/// Fractional bits.
pub const FIXED_SCALE: i32 = 16;

/// 1.0
pub const FIXED_ONE: Fixed = 1 << FIXED_SCALE;

/// 0.5
pub const FIXED_HALF: Fixed = FIXED_ONE / 2;

/// Directions per full turn.
pub const ANGLE_STEPS: u32 = 64;

/// Wraps an angle index into `0..ANGLE_STEPS`.
pub const ANGLE_MASK: u32 = ANGLE_STEPS - 1;

// Velocities keep 1/256 unit of precision between ticks
const QUANTUM_MASK: Fixed = (1 << 8) - 1;

// sin(k * 2π / 64), k = 0..=16
const SIN_QUARTER: [Fixed; 17] = [
    0, 6424, 12785, 19024, 25080, 30893, 36410, 41576, 46341, 50660, 54491, 57798, 60547,
    62714, 64277, 65220, 65536,
];

/// Literal conversion for constants and config loading.
///
/// ```
/// use lockstep_arena::core::fixed::{to_fixed, FIXED_ONE};
/// const SPEED: i32 = to_fixed(2.5);
/// assert_eq!(SPEED, FIXED_ONE * 5 / 2);
/// ```
#[inline]
pub const fn to_fixed(f: f64) -> Fixed {
    (f * FIXED_ONE as f64) as Fixed
}

/// Whole units.
#[inline]
pub const fn from_int(i: i32) -> Fixed {
    i << FIXED_SCALE
}

/// Lossy conversion for rendering and logs only.
#[inline]
pub fn to_float(f: Fixed) -> f32 {
    f as f32 / FIXED_ONE as f32
}

/// Product, truncated toward negative infinity.
#[inline]
pub fn fixed_mul(a: Fixed, b: Fixed) -> Fixed {
    ((a as i64 * b as i64) >> FIXED_SCALE) as Fixed
}

/// Quotient. Division by zero yields `0`.
#[inline]
pub fn fixed_div(a: Fixed, b: Fixed) -> Fixed {
    match b {
        0 => 0,
        _ => (((a as i64) << FIXED_SCALE) / b as i64) as Fixed,
    }
}

/// Square root of a Q32.32 value as Q16.16, saturating at `Fixed::MAX`.
///
/// Exact floor of the integer root, bit by bit.
pub fn sqrt_wide(x: i64) -> Fixed {
    if x <= 0 {
        return 0;
    }
    let mut rem = x as u64;
    let mut root = 0u64;
    let mut bit = 1u64 << 62;
    while bit > rem {
        bit >>= 2;
    }
    while bit != 0 {
        if rem >= root + bit {
            rem -= root + bit;
            root = (root >> 1) + bit;
        } else {
            root >>= 1;
        }
        bit >>= 2;
    }
    root.min(Fixed::MAX as u64) as Fixed
}

/// Square root; non-positive inputs give `0`.
#[inline]
pub fn fixed_sqrt(x: Fixed) -> Fixed {
    sqrt_wide((x as i64) << FIXED_SCALE)
}

/// Clamp into `[lo, hi]`.
#[inline]
pub fn fixed_clamp(value: Fixed, lo: Fixed, hi: Fixed) -> Fixed {
    value.max(lo).min(hi)
}

/// Drop bits below 1/256, rounding toward zero.
#[inline]
pub fn truncate_quantum(v: Fixed) -> Fixed {
    v.signum().wrapping_mul(v.wrapping_abs() & !QUANTUM_MASK)
}

/// Sine of a direction index.
#[inline]
pub fn fixed_sin(angle: u32) -> Fixed {
    let a = angle & ANGLE_MASK;
    let r = (a & 15) as usize;
    let v = if a & 16 == 0 { SIN_QUARTER[r] } else { SIN_QUARTER[16 - r] };
    if a & 32 == 0 {
        v
    } else {
        -v
    }
}

/// Cosine of a direction index.
#[inline]
pub fn fixed_cos(angle: u32) -> Fixed {
    fixed_sin(angle.wrapping_add(ANGLE_STEPS / 4))
}
