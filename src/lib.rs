//! # Lockstep Arena
//!
//! Netcode core for a peer-to-peer arena game: every peer runs the same
//! deterministic simulation from the same inputs, exchanging only input.
//!
//! ## Layout
//!
//! ```text
//!   core/      fixed, vec2, rng, hash       bit-exact primitives
//!   game/      config, input, actor, state,  the simulation step
//!              map, grid, collision, events,
//!              tick
//!   network/   wire, rle, protocol           packet codec
//!              event_log, client, clock,     lockstep bookkeeping
//!              prediction, session
//!              transport                     datagram seam + loopback
//! ```
//!
//! `core` and `game` read no clock, use no floats in the step, iterate only
//! ordered collections and draw randomness solely from the seed carried in
//! [`game::StateData`]. `network` is where wall time and packet loss live;
//! it decides *when* ticks run, never *what* they compute.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::fixed::{Fixed, FIXED_HALF, FIXED_ONE, FIXED_SCALE};
pub use core::rng::DeterministicRng;
pub use core::vec2::FixedVec2;
pub use game::config::GameConfig;
pub use game::input::{ClientEvent, ClientId, ControlBits};
pub use game::state::StateData;
pub use network::session::{SessionConfig, SessionError, SimulationSession};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default simulation tick rate (Hz)
pub const DEFAULT_TICK_RATE: u32 = 60;
