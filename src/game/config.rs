//! Static Game Tables
//!
//! Balance values consumed by the simulation step. Every peer must load
//! identical tables; [`GameConfig::fingerprint`] lets them confirm it.
//!
//! Distances and speeds are stored as raw Q16.16 values so the JSON form
//! maps bit-for-bit onto what the step uses.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::fixed::{from_int, to_fixed, Fixed, FIXED_ONE};
use crate::core::hash::{StateHash, StateHasher, CONFIG_DOMAIN};

/// Upper bound on grid cells per axis.
pub const MAX_GRID_DIM: i32 = 64;

/// Errors from loading or validating game tables.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// JSON did not match the table schema
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    /// Tables are internally inconsistent
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One weapon definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponDef {
    /// Display name
    pub name: String,
    /// Damage per pellet
    pub damage: u8,
    /// Pellets per shot
    pub pellets: u8,
    /// Random spread, in angle steps either side of the look angle
    pub spread: u8,
    /// Muzzle speed per tick (Q16.16)
    pub speed: Fixed,
    /// Bullet lifetime in ticks
    pub lifetime: u8,
    /// Ticks between shots
    pub fire_delay: u8,
    /// Rounds per magazine
    pub clip: u8,
    /// Spare magazines on pickup/spawn
    pub mags: u8,
    /// Ticks to reload
    pub reload: u8,
    /// Velocity pushed back onto the shooter (Q16.16)
    pub recoil: Fixed,
    /// Velocity pushed onto the target per pellet (Q16.16)
    pub knockback: Fixed,
}

/// Game configuration tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Square world edge length in whole units
    pub world_size: i32,
    /// log2 of a grid cell edge in raw Q16.16 units
    pub grid_cell_shift: u32,

    /// Player collision radius (Q16.16)
    pub player_radius: Fixed,
    /// Player hit points at spawn
    pub player_hp: u8,
    /// Walking top speed per tick (Q16.16)
    pub walk_speed: Fixed,
    /// Running top speed per tick (Q16.16)
    pub run_speed: Fixed,
    /// Fraction of the speed gap closed each tick (Q16.16, 0..1)
    pub steering: Fixed,
    /// Fraction of velocity kept each tick when idle (Q16.16, 0..1)
    pub friction: Fixed,
    /// Upward velocity on jump (Q16.16)
    pub jump_velocity: Fixed,
    /// Downward acceleration per tick (Q16.16)
    pub gravity: Fixed,
    /// Absolute speed clamp on every axis (Q16.16)
    pub max_speed: Fixed,

    /// Barrel radius (Q16.16)
    pub barrel_radius: Fixed,
    /// Barrel hit points
    pub barrel_hp: u8,
    /// Barrels placed by map generation
    pub barrel_count: u32,
    /// Shrapnel bullets released when a barrel breaks
    pub barrel_shrapnel: u8,
    /// Damage per shrapnel bullet
    pub shrapnel_damage: u8,
    /// Shrapnel speed per tick (Q16.16)
    pub shrapnel_speed: Fixed,
    /// Shrapnel lifetime in ticks
    pub shrapnel_lifetime: u8,

    /// Tree radius (Q16.16)
    pub tree_radius: Fixed,
    /// Trees placed by map generation
    pub tree_count: u32,

    /// Item pickup radius (Q16.16)
    pub item_radius: Fixed,
    /// Ticks before a dropped item despawns
    pub item_lifetime: u8,
    /// Hit points restored by a health pickup
    pub health_amount: u8,

    /// Bullet radius (Q16.16)
    pub bullet_radius: Fixed,

    /// Score for a kill
    pub score_per_kill: u32,
    /// Ticks the hit flash stays visible
    pub hit_flash_ticks: u8,
    /// Attempts at finding a free spawn position before giving up
    pub spawn_attempts: u32,

    /// Weapon table; spawn loadouts index into it
    pub weapons: Vec<WeaponDef>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            world_size: 512,
            grid_cell_shift: 22, // 64 units

            player_radius: from_int(8),
            player_hp: 100,
            walk_speed: to_fixed(1.5),
            run_speed: to_fixed(2.5),
            steering: to_fixed(0.25),
            friction: to_fixed(0.8),
            jump_velocity: to_fixed(3.0),
            gravity: to_fixed(0.25),
            max_speed: from_int(12),

            barrel_radius: from_int(8),
            barrel_hp: 30,
            barrel_count: 12,
            barrel_shrapnel: 6,
            shrapnel_damage: 10,
            shrapnel_speed: from_int(6),
            shrapnel_lifetime: 8,

            tree_radius: from_int(12),
            tree_count: 24,

            item_radius: from_int(6),
            item_lifetime: 240,
            health_amount: 40,

            bullet_radius: FIXED_ONE,

            score_per_kill: 100,
            hit_flash_ticks: 6,
            spawn_attempts: 16,

            weapons: vec![
                WeaponDef {
                    name: "pistol".into(),
                    damage: 12,
                    pellets: 1,
                    spread: 1,
                    speed: from_int(8),
                    lifetime: 40,
                    fire_delay: 12,
                    clip: 8,
                    mags: 3,
                    reload: 45,
                    recoil: to_fixed(0.25),
                    knockback: to_fixed(0.5),
                },
                WeaponDef {
                    name: "shotgun".into(),
                    damage: 8,
                    pellets: 5,
                    spread: 3,
                    speed: from_int(7),
                    lifetime: 20,
                    fire_delay: 40,
                    clip: 2,
                    mags: 4,
                    reload: 60,
                    recoil: to_fixed(1.5),
                    knockback: to_fixed(0.75),
                },
                WeaponDef {
                    name: "rifle".into(),
                    damage: 7,
                    pellets: 1,
                    spread: 2,
                    speed: from_int(10),
                    lifetime: 45,
                    fire_delay: 5,
                    clip: 30,
                    mags: 2,
                    reload: 90,
                    recoil: to_fixed(0.125),
                    knockback: to_fixed(0.25),
                },
            ],
        }
    }
}

impl GameConfig {
    /// Parse tables from a JSON string and validate them.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load tables from a JSON file and validate them.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// World edge in Q16.16.
    #[inline]
    pub fn world_extent(&self) -> Fixed {
        from_int(self.world_size)
    }

    /// Grid cell edge in Q16.16.
    #[inline]
    pub fn grid_cell_size(&self) -> i64 {
        1i64 << self.grid_cell_shift
    }

    /// Grid cells per axis.
    #[inline]
    pub fn grid_dim(&self) -> i32 {
        let dim = (self.world_extent() as i64 + self.grid_cell_size() - 1) >> self.grid_cell_shift;
        dim as i32
    }

    /// Largest broad-phase query reach: the widest pair of radii that
    /// is ever tested against each other.
    pub fn max_reach(&self) -> Fixed {
        let bullet = self.bullet_radius
            + self.player_radius.max(self.barrel_radius).max(self.tree_radius);
        let player = self.player_radius
            + self
                .tree_radius
                .max(self.barrel_radius)
                .max(self.player_radius)
                .max(self.item_radius);
        bullet.max(player)
    }

    /// Look up a weapon, if the index exists.
    #[inline]
    pub fn weapon(&self, index: u8) -> Option<&WeaponDef> {
        self.weapons.get(index as usize)
    }

    /// Check internal consistency.
    ///
    /// The broad phase only looks at a 2×2 block of cells, which is
    /// complete only when a cell is at least twice the widest reach.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world_size <= 0 || self.world_size > i16::MAX as i32 {
            return Err(ConfigError::Invalid(format!(
                "world_size {} outside 1..=32767",
                self.world_size
            )));
        }
        if self.grid_cell_shift < 16 || self.grid_cell_shift > 30 {
            return Err(ConfigError::Invalid(format!(
                "grid_cell_shift {} outside 16..=30",
                self.grid_cell_shift
            )));
        }
        if self.grid_cell_size() < 2 * self.max_reach() as i64 {
            return Err(ConfigError::Invalid(format!(
                "grid cell {} smaller than twice the max reach {}",
                self.grid_cell_size() >> 16,
                self.max_reach() >> 16
            )));
        }
        if self.grid_dim() > MAX_GRID_DIM {
            return Err(ConfigError::Invalid(format!(
                "grid dimension {} exceeds {}",
                self.grid_dim(),
                MAX_GRID_DIM
            )));
        }
        let radii = [
            self.player_radius,
            self.barrel_radius,
            self.tree_radius,
            self.item_radius,
            self.bullet_radius,
        ];
        if radii.iter().any(|&r| r <= 0) {
            return Err(ConfigError::Invalid("radii must be positive".into()));
        }
        if self.weapons.is_empty() || self.weapons.len() > 64 {
            return Err(ConfigError::Invalid("weapon table must hold 1..=64 entries".into()));
        }
        for w in &self.weapons {
            if w.pellets == 0 || w.clip == 0 || w.lifetime == 0 {
                return Err(ConfigError::Invalid(format!(
                    "weapon {:?} needs pellets, clip and lifetime above zero",
                    w.name
                )));
            }
        }
        if self.player_hp == 0 || self.barrel_hp == 0 {
            return Err(ConfigError::Invalid("hit points must be above zero".into()));
        }
        Ok(())
    }

    /// SHA-256 over the canonical JSON form.
    ///
    /// Every bootstrap carries it, and a joiner refuses snapshots built
    /// from other tables.
    pub fn fingerprint(&self) -> StateHash {
        let mut hasher = StateHasher::new(CONFIG_DOMAIN);
        // Struct serialization has a fixed field order, so this is canonical
        match serde_json::to_vec(self) {
            Ok(bytes) => hasher.put(bytes.as_slice()),
            Err(_) => hasher.put(b"unserializable"),
        };
        hasher.finalize()
    }
}
