//! Game Logic Module
//!
//! The replicated world and the step that advances it.
//!
//! ## Module Structure
//!
//! - `config`: Peer-identical tables (weapons, world, spawn rules)
//! - `input`: Control bitmask and tick-stamped client events
//! - `actor`: Tagged actor model
//! - `state`: Replicated snapshot
//! - `grid`: Broad-phase buckets
//! - `collision`: Narrow-phase tests and responses
//! - `map`: Static map generation
//! - `events`: Render/audio cues emitted by a tick
//! - `tick`: The simulation step

pub mod config;
pub mod input;
pub mod actor;
pub mod state;
pub mod grid;
pub mod collision;
pub mod map;
pub mod events;
pub mod tick;

// Re-export key types
pub use actor::{Actor, ActorKind};
pub use config::{ConfigError, GameConfig, WeaponDef};
pub use events::{GameEvent, GameEventData};
pub use input::{ClientEvent, ClientId, ControlBits, SpawnRequest};
pub use state::{Fingerprint, PlayerStat, StateData};
pub use tick::{simulate_tic, TickResult};
