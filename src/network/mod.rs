//! Network Layer
//!
//! Lockstep plumbing around the deterministic step: input scheduling,
//! packet codec, clock pacing and prediction. This layer is
//! **non-deterministic**; all game logic runs through `game/`.

pub mod wire;
pub mod rle;
pub mod protocol;
pub mod event_log;
pub mod client;
pub mod clock;
pub mod prediction;
pub mod transport;
pub mod session;

pub use client::Client;
pub use clock::ClockController;
pub use event_log::EventLog;
pub use prediction::PredictedState;
pub use protocol::{Bootstrap, DebugCompanion, Packet};
pub use session::{FrameReport, SessionConfig, SessionError, SimulationSession};
pub use transport::{LinkConditions, LoopbackNetwork, Transport};
pub use wire::DecodeError;
