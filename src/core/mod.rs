//! Bit-exact building blocks shared by the simulation and the codec.

pub mod fixed;
pub mod hash;
pub mod rng;
pub mod vec2;

pub use fixed::{Fixed, FIXED_HALF, FIXED_ONE, FIXED_SCALE};
pub use hash::{compute_state_hash, StateHash};
pub use rng::DeterministicRng;
pub use vec2::FixedVec2;
