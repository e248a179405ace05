//! Game Events
//!
//! Side effects emitted by a tick for the presentation layer (sound,
//! particles, kill feed). They never feed back into the simulation, so
//! a predicted tick may emit events that the authoritative tick later
//! does not.

use serde::{Deserialize, Serialize};

use crate::core::fixed::Fixed;
use crate::game::actor::ActorKind;
use crate::game::input::ClientId;

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEventData {
    /// A client's player entered the world
    PlayerSpawned {
        /// Owning client
        client: ClientId,
        /// New actor id
        actor: u32,
    },

    /// A weapon was fired
    ShotFired {
        /// Shooter actor id
        actor: u32,
        /// Weapon index
        weapon: u8,
    },

    /// A bullet hit something
    Hit {
        /// Victim actor id
        target: u32,
        /// Victim kind
        kind: ActorKind,
        /// Damage dealt
        damage: u8,
    },

    /// A player died
    PlayerKilled {
        /// Victim client
        victim: ClientId,
        /// Credited client, if any
        killer: Option<ClientId>,
    },

    /// A barrel broke
    BarrelBroken {
        /// Barrel actor id
        actor: u32,
    },

    /// A player picked up an item
    ItemPicked {
        /// Player actor id
        actor: u32,
        /// Item kind
        item: u8,
    },

    /// A reload finished
    Reloaded {
        /// Player actor id
        actor: u32,
    },
}

/// A game event with timing and location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick when the event occurred
    pub tic: u32,
    /// World position (Q16.16)
    pub x: Fixed,
    /// World position (Q16.16)
    pub y: Fixed,
    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(tic: u32, x: Fixed, y: Fixed, data: GameEventData) -> Self {
        Self { tic, x, y, data }
    }

    /// Check if this is a kill, for the kill feed.
    pub fn is_kill(&self) -> bool {
        matches!(self.data, GameEventData::PlayerKilled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_kill() {
        let kill = GameEvent::new(3, 0, 0, GameEventData::PlayerKilled { victim: 1, killer: Some(2) });
        assert!(kill.is_kill());
        let shot = GameEvent::new(3, 0, 0, GameEventData::ShotFired { actor: 1, weapon: 0 });
        assert!(!shot.is_kill());
    }
}
