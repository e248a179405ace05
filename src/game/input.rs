//! Control Input
//!
//! The only per-tick input to the simulation is a packed 32-bit button
//! mask per player. Input capture (keyboard, virtual pad) lives outside
//! this crate and produces a [`ControlBits`] once per frame.
//!
//! ## Bit layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ bits  0..6   movement angle (64 steps per turn)              │
//! │ bits  6..12  look angle     (64 steps per turn)              │
//! │ bit   12     MOVE    stick is deflected                      │
//! │ bit   13     RUN                                             │
//! │ bit   14     JUMP                                            │
//! │ bit   15     DROP    throw the held weapon                   │
//! │ bit   16     RELOAD                                          │
//! │ bit   17     FIRE                                            │
//! │ bit   18     SWAP    switch weapon slots                     │
//! │ bits  19..32 reserved, must be zero on the wire              │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::core::fixed::{ANGLE_MASK, ANGLE_STEPS};

/// Peer identifier. `0` means "no owner"; negative ids are synthetic.
pub type ClientId = i32;

/// Packed control bitmask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlBits(pub u32);

impl ControlBits {
    /// Movement angle field shift
    pub const MOVE_ANGLE_SHIFT: u32 = 0;
    /// Look angle field shift
    pub const LOOK_ANGLE_SHIFT: u32 = 6;

    /// Stick is deflected
    pub const MOVE: u32 = 1 << 12;
    /// Run modifier
    pub const RUN: u32 = 1 << 13;
    /// Jump
    pub const JUMP: u32 = 1 << 14;
    /// Drop held weapon
    pub const DROP: u32 = 1 << 15;
    /// Reload
    pub const RELOAD: u32 = 1 << 16;
    /// Fire
    pub const FIRE: u32 = 1 << 17;
    /// Swap weapon slots
    pub const SWAP: u32 = 1 << 18;

    /// Every bit the simulation understands.
    pub const VALID_MASK: u32 = (1 << 19) - 1;

    /// No buttons, both angles zero.
    pub const NONE: Self = Self(0);

    /// Raw bits.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Movement angle (0..64).
    #[inline]
    pub const fn move_angle(self) -> u32 {
        (self.0 >> Self::MOVE_ANGLE_SHIFT) & ANGLE_MASK
    }

    /// Look angle (0..64).
    #[inline]
    pub const fn look_angle(self) -> u32 {
        (self.0 >> Self::LOOK_ANGLE_SHIFT) & ANGLE_MASK
    }

    /// Check a flag bit.
    #[inline]
    pub const fn has(self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    /// Return a copy with the movement angle replaced.
    #[inline]
    pub const fn with_move_angle(self, angle: u32) -> Self {
        Self((self.0 & !(ANGLE_MASK << Self::MOVE_ANGLE_SHIFT)) | ((angle & ANGLE_MASK) << Self::MOVE_ANGLE_SHIFT))
    }

    /// Return a copy with the look angle replaced.
    #[inline]
    pub const fn with_look_angle(self, angle: u32) -> Self {
        Self((self.0 & !(ANGLE_MASK << Self::LOOK_ANGLE_SHIFT)) | ((angle & ANGLE_MASK) << Self::LOOK_ANGLE_SHIFT))
    }

    /// Return a copy with a flag set or cleared.
    #[inline]
    pub const fn with(self, flag: u32, on: bool) -> Self {
        if on {
            Self(self.0 | flag)
        } else {
            Self(self.0 & !flag)
        }
    }

    /// Flags that are set in `self` but were not set in `prev`.
    ///
    /// Only action flags produce edges; angle bits are excluded.
    #[inline]
    pub const fn pressed_since(self, prev: Self) -> u32 {
        let flags = self.0 & !((ANGLE_MASK << Self::MOVE_ANGLE_SHIFT) | (ANGLE_MASK << Self::LOOK_ANGLE_SHIFT));
        flags & !prev.0
    }
}

/// Quantize a stick/aim vector into a 64-step angle.
///
/// Runs in the input layer, before anything enters the simulation,
/// so float math is fine here. Returns `None` inside the dead zone.
pub fn quantize_angle(x: f32, y: f32, dead_zone: f32) -> Option<u32> {
    if x * x + y * y <= dead_zone * dead_zone {
        return None;
    }
    let turn = y.atan2(x) / std::f32::consts::TAU;
    let steps = (turn * ANGLE_STEPS as f32).round() as i32;
    Some((steps.rem_euclid(ANGLE_STEPS as i32)) as u32)
}

/// Ask the simulation to spawn a player for the event's client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnRequest {
    /// Index into the weapon table for the starting weapon.
    pub loadout: u8,
}

/// An input command for one future tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEvent {
    /// Tick this event applies to
    pub tic: u32,
    /// Issuing peer
    pub client: ClientId,
    /// New control bits, if they changed
    pub btn: Option<ControlBits>,
    /// Spawn request, if any
    pub spawn: Option<SpawnRequest>,
}

impl ClientEvent {
    /// Event carrying only a button change.
    pub fn buttons(tic: u32, client: ClientId, btn: ControlBits) -> Self {
        Self { tic, client, btn: Some(btn), spawn: None }
    }

    /// Event carrying only a spawn request.
    pub fn spawn(tic: u32, client: ClientId, loadout: u8) -> Self {
        Self { tic, client, btn: None, spawn: Some(SpawnRequest { loadout }) }
    }

    /// True when the event carries nothing.
    pub fn is_empty(&self) -> bool {
        self.btn.is_none() && self.spawn.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_fields() {
        let c = ControlBits::NONE.with_move_angle(17).with_look_angle(63);
        assert_eq!(c.move_angle(), 17);
        assert_eq!(c.look_angle(), 63);

        let c = c.with_move_angle(64 + 3);
        assert_eq!(c.move_angle(), 3);
        assert_eq!(c.look_angle(), 63);
    }

    #[test]
    fn test_flags() {
        let c = ControlBits::NONE.with(ControlBits::FIRE, true).with(ControlBits::RUN, true);
        assert!(c.has(ControlBits::FIRE));
        assert!(c.has(ControlBits::RUN));
        assert!(!c.has(ControlBits::JUMP));
        assert!(!c.with(ControlBits::FIRE, false).has(ControlBits::FIRE));
        assert_eq!(c.bits() & !ControlBits::VALID_MASK, 0);
    }

    #[test]
    fn test_pressed_since() {
        let prev = ControlBits::NONE.with(ControlBits::FIRE, true);
        let now = prev.with(ControlBits::JUMP, true).with_move_angle(5);
        assert_eq!(now.pressed_since(prev), ControlBits::JUMP);
        assert_eq!(prev.pressed_since(now), 0);
    }

    #[test]
    fn test_quantize_angle() {
        assert_eq!(quantize_angle(1.0, 0.0, 0.2), Some(0));
        assert_eq!(quantize_angle(0.0, 1.0, 0.2), Some(16));
        assert_eq!(quantize_angle(-1.0, 0.0, 0.2), Some(32));
        assert_eq!(quantize_angle(0.0, -1.0, 0.2), Some(48));
        assert_eq!(quantize_angle(0.05, 0.05, 0.2), None);
    }

    #[test]
    fn test_client_event_constructors() {
        let e = ClientEvent::spawn(100, 3, 1);
        assert_eq!(e.spawn, Some(SpawnRequest { loadout: 1 }));
        assert!(e.btn.is_none());
        assert!(!e.is_empty());

        let e = ClientEvent { tic: 1, client: 1, btn: None, spawn: None };
        assert!(e.is_empty());
    }
}
