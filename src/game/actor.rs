//! Actor Model
//!
//! Every simulated object is an [`Actor`] tagged with an [`ActorKind`].
//! The scalar fields are shared between kinds and reinterpreted per kind:
//!
//! | field      | Player            | Barrel | Bullet          | Item              | Tree |
//! |------------|-------------------|--------|-----------------|-------------------|------|
//! | `weapon`   | held weapon       |        | weapon fired    | item kind         |      |
//! | `weapon2`  | holstered weapon  |        |                 |                   |      |
//! | `clip`     | rounds loaded     |        | damage          | amount            |      |
//! | `lifetime` | holstered rounds  |        | ticks left      | ticks left        |      |

use serde::{Deserialize, Serialize};

use crate::core::fixed::Fixed;
use crate::core::vec2::FixedVec2;
use crate::game::input::{ClientId, ControlBits};

/// Empty weapon slot.
pub const NO_WEAPON: u8 = u8::MAX;

/// Item kind: restores hit points.
pub const ITEM_HEALTH: u8 = 0;
/// Item kind: spare magazine.
pub const ITEM_AMMO: u8 = 1;
/// Item kinds at or above this carry weapon `kind - ITEM_WEAPON_BASE`.
pub const ITEM_WEAPON_BASE: u8 = 2;

/// Actor kinds, in update order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActorKind {
    /// Controlled by a client
    Player = 0,
    /// Breakable, drops loot
    Barrel = 1,
    /// Short-lived projectile
    Bullet = 2,
    /// Pickup
    Item = 3,
    /// Static, indestructible obstacle
    Tree = 4,
}

impl ActorKind {
    /// Number of kinds.
    pub const COUNT: usize = 5;

    /// All kinds in list order.
    pub const ALL: [ActorKind; Self::COUNT] = [
        ActorKind::Player,
        ActorKind::Barrel,
        ActorKind::Bullet,
        ActorKind::Item,
        ActorKind::Tree,
    ];

    /// Index of this kind's list in `StateData::actors`.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Parse a wire tag.
    pub fn from_u8(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }
}

/// A simulated object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Stable id from `StateData::next_id`
    pub id: u32,
    /// Kind tag
    pub kind: ActorKind,
    /// Owning peer; 0 = none, negative = synthetic
    pub client: ClientId,
    /// Current control bits (players only)
    pub btn: ControlBits,
    /// Action flags newly pressed this tick
    pub trig: u32,

    /// Position (Q16.16)
    pub x: Fixed,
    /// Position (Q16.16)
    pub y: Fixed,
    /// Height above ground (Q16.16)
    pub z: Fixed,
    /// Velocity (Q16.16 per tick)
    pub u: Fixed,
    /// Velocity (Q16.16 per tick)
    pub v: Fixed,
    /// Vertical velocity (Q16.16 per tick)
    pub w: Fixed,

    /// See module table
    pub weapon: u8,
    /// See module table
    pub weapon2: u8,
    /// Hit points; the actor is removed at the end of a tick when zero
    pub hp: u8,
    /// See module table
    pub clip: u8,
    /// Spare magazines
    pub mags: u8,
    /// Ticks until the next shot
    pub fire_delay: u8,
    /// Ticks until the reload finishes; 0 when not reloading
    pub reload: u8,
    /// See module table
    pub lifetime: u8,
    /// Ticks left on the damage flash
    pub hit_flash: u8,
}

impl Actor {
    /// Blank actor at a position.
    pub fn new(id: u32, kind: ActorKind, x: Fixed, y: Fixed) -> Self {
        Self {
            id,
            kind,
            client: 0,
            btn: ControlBits::NONE,
            trig: 0,
            x,
            y,
            z: 0,
            u: 0,
            v: 0,
            w: 0,
            weapon: NO_WEAPON,
            weapon2: NO_WEAPON,
            hp: 1,
            clip: 0,
            mags: 0,
            fire_delay: 0,
            reload: 0,
            lifetime: 0,
            hit_flash: 0,
        }
    }

    /// Planar position.
    #[inline]
    pub fn pos(&self) -> FixedVec2 {
        FixedVec2::new(self.x, self.y)
    }

    /// Planar velocity.
    #[inline]
    pub fn vel(&self) -> FixedVec2 {
        FixedVec2::new(self.u, self.v)
    }

    /// Set planar velocity.
    #[inline]
    pub fn set_vel(&mut self, vel: FixedVec2) {
        self.u = vel.x;
        self.v = vel.y;
    }

    /// Still alive this tick.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    /// Apply damage, saturating at zero. Returns true if this killed it.
    pub fn damage(&mut self, amount: u8, flash: u8) -> bool {
        if self.hp == 0 {
            return false;
        }
        self.hp = self.hp.saturating_sub(amount);
        self.hit_flash = flash;
        self.hp == 0
    }

    /// Check if a newly pressed flag fired this tick.
    #[inline]
    pub fn triggered(&self, flag: u32) -> bool {
        self.trig & flag != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        for kind in ActorKind::ALL {
            assert_eq!(ActorKind::from_u8(kind as u8), Some(kind));
            assert_eq!(ActorKind::ALL[kind.index()], kind);
        }
        assert_eq!(ActorKind::from_u8(5), None);
    }

    #[test]
    fn test_damage() {
        let mut a = Actor::new(1, ActorKind::Barrel, 0, 0);
        a.hp = 10;
        assert!(!a.damage(4, 6));
        assert_eq!(a.hp, 6);
        assert_eq!(a.hit_flash, 6);
        assert!(a.damage(200, 6));
        assert_eq!(a.hp, 0);
        // Already dead: no second kill
        assert!(!a.damage(1, 6));
    }

    #[test]
    fn test_new_defaults() {
        let a = Actor::new(7, ActorKind::Player, 5, 6);
        assert_eq!(a.pos(), FixedVec2::new(5, 6));
        assert_eq!(a.weapon, NO_WEAPON);
        assert!(a.is_alive());
    }
}
