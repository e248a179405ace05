//! Wire Protocol
//!
//! One packet type carries everything a peer sends: its header, the
//! not-yet-acknowledged slice of its input events, an optional bootstrap
//! snapshot for a peer that is not ready, and an optional debug companion.
//!
//! ## Layout (little-endian)
//!
//! ```text
//! frame   := codec:u8 (0 raw, 1 rle) body
//! body    := header run slot* init [debug]
//! header  := flags:u32 client:i32 received_on_sender:u32 tic:u32
//! run     := first_tic:u32 count:u32        ; one slot per tic
//! slot    := 0x00                           ; nothing this tic
//!          | record+                        ; last record has MORE clear
//! record  := flags:u8 [btn:u32] [loadout:u8] [client:i32]
//! init    := has_init:u8 [config:32 state]  ; config = GameConfig fingerprint
//! debug   := next_id:u32 tic:u32 seed:u32 has_shadow:u8 [len:u32 bincode]
//! ```
//!
//! A record's client is the packet sender unless `REC_CLIENT` is set,
//! which only happens when forwarding other peers' events to a
//! bootstrapping peer.

use std::collections::BTreeMap;

use tracing::warn;

use crate::core::hash::StateHash;
use crate::game::actor::{Actor, ActorKind};
use crate::game::input::{ClientEvent, ClientId, ControlBits, SpawnRequest};
use crate::game::state::{Fingerprint, PlayerStat, StateData};

use super::rle;
use super::wire::{ByteReader, ByteWriter, DecodeError};

/// Frame tag: body follows as-is.
pub const CODEC_RAW: u8 = 0;
/// Frame tag: body is run-length encoded.
pub const CODEC_RLE: u8 = 1;

/// Header flag: sender considers itself synchronized (ready).
pub const FLAG_SYNC: u32 = 1 << 0;
/// Header flag: a debug companion trails the packet.
pub const FLAG_DEBUG: u32 = 1 << 1;
const HEADER_FLAGS: u32 = FLAG_SYNC | FLAG_DEBUG;

/// Record flag: carries a button mask.
pub const REC_BTN: u8 = 1 << 0;
/// Record flag: carries a spawn request.
pub const REC_SPAWN: u8 = 1 << 1;
/// Record flag: carries an explicit client id.
pub const REC_CLIENT: u8 = 1 << 2;
/// Record flag: another record follows in the same slot.
pub const REC_MORE: u8 = 1 << 3;
const RECORD_FLAGS: u8 = REC_BTN | REC_SPAWN | REC_CLIENT | REC_MORE;

/// Longest event run a packet may carry (about a minute at 60 Hz).
pub const MAX_RUN_TICS: u32 = 4096;
/// Most records in one slot.
pub const MAX_EVENTS_PER_TIC: usize = 64;
/// Most actors of one kind in a snapshot.
pub const MAX_ACTORS_PER_KIND: u32 = 8192;
/// Most scoreboard rows in a snapshot.
pub const MAX_STATS: u32 = 1024;

/// Development-only divergence check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugCompanion {
    /// Sender's authoritative fingerprint
    pub fingerprint: Fingerprint,
    /// Sender's full authoritative state, for pinpointing a desync
    pub shadow: Option<StateData>,
}

/// Snapshot for a peer that has no authoritative state yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bootstrap {
    /// Fingerprint of the sender's game tables
    pub config: StateHash,
    /// Sender's authoritative state
    pub state: StateData,
}

/// One datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sender is ready (holds an authoritative state)
    pub sync: bool,
    /// Sender id
    pub client: ClientId,
    /// Highest tic the sender has received from the receiver
    pub received_on_sender: u32,
    /// Sender's last finalized input tic
    pub tic: u32,
    /// First tic covered by the event run
    pub first_tic: u32,
    /// Events, ascending by tic
    pub events: Vec<ClientEvent>,
    /// Bootstrap snapshot
    pub init: Option<Bootstrap>,
    /// Debug companion
    pub debug: Option<DebugCompanion>,
}

impl Packet {
    /// Packet with no payload.
    pub fn new(client: ClientId, tic: u32) -> Self {
        Self {
            sync: false,
            client,
            received_on_sender: 0,
            tic,
            first_tic: tic.wrapping_add(1),
            events: Vec::new(),
            init: None,
            debug: None,
        }
    }

    /// Frame the packet, run-length encoding the body when that helps.
    pub fn encode(&self, allow_rle: bool) -> Vec<u8> {
        let body = self.encode_body();
        if allow_rle {
            let packed = rle::encode(&body);
            if packed.len() < body.len() {
                let mut out = Vec::with_capacity(packed.len() + 1);
                out.push(CODEC_RLE);
                out.extend_from_slice(&packed);
                return out;
            }
        }
        let mut out = Vec::with_capacity(body.len() + 1);
        out.push(CODEC_RAW);
        out.extend_from_slice(&body);
        out
    }

    /// Parse a framed packet. Any malformation rejects the whole packet.
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        let (&codec, body) = frame
            .split_first()
            .ok_or(DecodeError::Truncated { offset: 0, needed: 1 })?;
        match codec {
            CODEC_RAW => Self::decode_body(body),
            CODEC_RLE => Self::decode_body(&rle::decode(body)?),
            other => Err(DecodeError::UnknownCodec(other)),
        }
    }

    fn encode_body(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(64);

        let mut flags = 0;
        if self.sync {
            flags |= FLAG_SYNC;
        }
        if self.debug.is_some() {
            flags |= FLAG_DEBUG;
        }
        w.write_u32(flags);
        w.write_i32(self.client);
        w.write_u32(self.received_on_sender);
        w.write_u32(self.tic);

        // The run spans first_tic through the later of tic and the last event
        let mut events: Vec<&ClientEvent> = self.events.iter().filter(|e| !e.is_empty()).collect();
        events.sort_by_key(|e| e.tic);
        let first = events.iter().map(|e| e.tic).min().map_or(self.first_tic, |t| t.min(self.first_tic));
        let last = events.iter().map(|e| e.tic).max().map_or(self.tic, |t| t.max(self.tic));
        let count = last.wrapping_add(1).saturating_sub(first);
        w.write_u32(first);
        w.write_u32(count);

        let mut cursor = 0;
        for tic in (0..count).map(|k| first.wrapping_add(k)) {
            let start = cursor;
            while cursor < events.len() && events[cursor].tic == tic {
                cursor += 1;
            }
            let slot = &events[start..cursor];
            if slot.is_empty() {
                w.write_u8(0);
                continue;
            }
            for (k, ev) in slot.iter().enumerate() {
                let mut rec = 0;
                if ev.btn.is_some() {
                    rec |= REC_BTN;
                }
                if ev.spawn.is_some() {
                    rec |= REC_SPAWN;
                }
                if ev.client != self.client {
                    rec |= REC_CLIENT;
                }
                if k + 1 < slot.len() {
                    rec |= REC_MORE;
                }
                w.write_u8(rec);
                if let Some(btn) = ev.btn {
                    w.write_u32(btn.bits());
                }
                if let Some(spawn) = ev.spawn {
                    w.write_u8(spawn.loadout);
                }
                if ev.client != self.client {
                    w.write_i32(ev.client);
                }
            }
        }

        match &self.init {
            Some(boot) => {
                w.write_u8(1);
                w.write_bytes(&boot.config);
                write_state(&mut w, &boot.state);
            }
            None => w.write_u8(0),
        }

        if let Some(debug) = &self.debug {
            w.write_u32(debug.fingerprint.next_id);
            w.write_u32(debug.fingerprint.tic);
            w.write_u32(debug.fingerprint.seed);
            let shadow = debug.shadow.as_ref().and_then(|s| match bincode::serialize(s) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("Dropping shadow state from debug companion: {}", e);
                    None
                }
            });
            match shadow {
                Some(bytes) => {
                    w.write_u8(1);
                    w.write_u32(bytes.len() as u32);
                    w.write_bytes(&bytes);
                }
                None => w.write_u8(0),
            }
        }

        w.into_inner()
    }

    fn decode_body(body: &[u8]) -> Result<Self, DecodeError> {
        let mut r = ByteReader::new(body);

        let flags = r.read_u32()?;
        if flags & !HEADER_FLAGS != 0 {
            return Err(DecodeError::UnknownFlags { field: "header", bits: flags & !HEADER_FLAGS });
        }
        let client = r.read_i32()?;
        let received_on_sender = r.read_u32()?;
        let tic = r.read_u32()?;

        let first_tic = r.read_u32()?;
        let count = r.read_count("event run", MAX_RUN_TICS)?;
        let mut events = Vec::new();
        for k in 0..count {
            let slot_tic = first_tic.wrapping_add(k);
            let mut in_slot = 0;
            loop {
                let rec = r.read_u8()?;
                if rec == 0 && in_slot == 0 {
                    break;
                }
                if rec & !RECORD_FLAGS != 0 {
                    return Err(DecodeError::UnknownFlags { field: "record", bits: (rec & !RECORD_FLAGS) as u32 });
                }
                if rec & (REC_BTN | REC_SPAWN) == 0 {
                    return Err(DecodeError::Invalid("empty event record"));
                }
                in_slot += 1;
                if in_slot > MAX_EVENTS_PER_TIC {
                    return Err(DecodeError::TooLarge {
                        field: "events per tic",
                        count: in_slot as u64,
                        limit: MAX_EVENTS_PER_TIC as u64,
                    });
                }

                let btn = if rec & REC_BTN != 0 {
                    let bits = r.read_u32()?;
                    if bits & !ControlBits::VALID_MASK != 0 {
                        return Err(DecodeError::UnknownFlags { field: "btn", bits: bits & !ControlBits::VALID_MASK });
                    }
                    Some(ControlBits(bits))
                } else {
                    None
                };
                let spawn = if rec & REC_SPAWN != 0 {
                    Some(SpawnRequest { loadout: r.read_u8()? })
                } else {
                    None
                };
                let ev_client = if rec & REC_CLIENT != 0 { r.read_i32()? } else { client };
                events.push(ClientEvent { tic: slot_tic, client: ev_client, btn, spawn });

                if rec & REC_MORE == 0 {
                    break;
                }
            }
        }

        let init = match r.read_u8()? {
            0 => None,
            1 => {
                let mut config = StateHash::default();
                let len = config.len();
                config.copy_from_slice(r.read_bytes(len)?);
                Some(Bootstrap { config, state: read_state(&mut r)? })
            }
            _ => return Err(DecodeError::Invalid("init marker")),
        };

        let debug = if flags & FLAG_DEBUG != 0 {
            let fingerprint = Fingerprint {
                next_id: r.read_u32()?,
                tic: r.read_u32()?,
                seed: r.read_u32()?,
            };
            let shadow = match r.read_u8()? {
                0 => None,
                1 => {
                    let len = r.read_count("shadow state", rle::MAX_DECODED_LEN as u32)?;
                    let bytes = r.read_bytes(len as usize)?;
                    let state: StateData =
                        bincode::deserialize(bytes).map_err(|_| DecodeError::Invalid("shadow state"))?;
                    Some(state)
                }
                _ => return Err(DecodeError::Invalid("shadow marker")),
            };
            Some(DebugCompanion { fingerprint, shadow })
        } else {
            None
        };

        r.finish()?;

        Ok(Self {
            sync: flags & FLAG_SYNC != 0,
            client,
            received_on_sender,
            tic,
            first_tic,
            events,
            init,
            debug,
        })
    }
}

// =============================================================================
// STATE SNAPSHOT CODEC
// =============================================================================

/// Serialize a snapshot with the packet codec.
pub fn write_state(w: &mut ByteWriter, state: &StateData) {
    w.write_u32(state.next_id);
    w.write_u32(state.tic);
    w.write_u32(state.seed);
    w.write_u32(state.map_seed);

    for list in &state.actors {
        w.write_u32(list.len() as u32);
        for a in list {
            write_actor(w, a);
        }
    }

    w.write_u32(state.stats.len() as u32);
    for (client, stat) in &state.stats {
        w.write_i32(*client);
        w.write_u32(stat.frags);
        w.write_u32(stat.score);
    }
}

/// Parse a snapshot, checking the ordering invariants it must satisfy.
pub fn read_state(r: &mut ByteReader) -> Result<StateData, DecodeError> {
    let mut state = StateData::empty(0);
    state.next_id = r.read_u32()?;
    state.tic = r.read_u32()?;
    state.seed = r.read_u32()?;
    state.map_seed = r.read_u32()?;

    for kind in ActorKind::ALL {
        let count = r.read_count("actors", MAX_ACTORS_PER_KIND)?;
        let list = state.list_mut(kind);
        list.reserve(count as usize);
        for _ in 0..count {
            let a = read_actor(r, kind)?;
            if list.last().map_or(false, |prev| prev.id >= a.id) {
                return Err(DecodeError::Invalid("actor order"));
            }
            list.push(a);
        }
    }

    let count = r.read_count("stats", MAX_STATS)?;
    let mut stats = BTreeMap::new();
    for _ in 0..count {
        let client = r.read_i32()?;
        let stat = PlayerStat { frags: r.read_u32()?, score: r.read_u32()? };
        if stats.insert(client, stat).is_some() {
            return Err(DecodeError::Invalid("duplicate stats row"));
        }
    }
    state.stats = stats;

    Ok(state)
}

fn write_actor(w: &mut ByteWriter, a: &Actor) {
    w.write_u32(a.id);
    w.write_i32(a.client);
    w.write_u32(a.btn.bits());
    w.write_u32(a.trig);
    for v in [a.x, a.y, a.z, a.u, a.v, a.w] {
        w.write_i32(v);
    }
    w.write_bytes(&[
        a.weapon,
        a.weapon2,
        a.hp,
        a.clip,
        a.mags,
        a.fire_delay,
        a.reload,
        a.lifetime,
        a.hit_flash,
    ]);
}

fn read_actor(r: &mut ByteReader, kind: ActorKind) -> Result<Actor, DecodeError> {
    let id = r.read_u32()?;
    let mut a = Actor::new(id, kind, 0, 0);
    a.client = r.read_i32()?;
    a.btn = ControlBits(r.read_u32()?);
    a.trig = r.read_u32()?;
    a.x = r.read_i32()?;
    a.y = r.read_i32()?;
    a.z = r.read_i32()?;
    a.u = r.read_i32()?;
    a.v = r.read_i32()?;
    a.w = r.read_i32()?;
    let b = r.read_bytes(9)?;
    a.weapon = b[0];
    a.weapon2 = b[1];
    a.hp = b[2];
    a.clip = b[3];
    a.mags = b[4];
    a.fire_delay = b[5];
    a.reload = b[6];
    a.lifetime = b[7];
    a.hit_flash = b[8];
    Ok(a)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::config::GameConfig;
    use crate::game::tick::simulate_tic;
    use proptest::prelude::*;

    fn sparse_packet() -> Packet {
        let mut p = Packet::new(3, 54);
        p.first_tic = 50;
        p.sync = true;
        p.received_on_sender = 40;
        p.events.push(ClientEvent::buttons(52, 3, ControlBits::NONE.with(ControlBits::FIRE, true)));
        p
    }

    #[test]
    fn test_sparse_run_is_small() {
        let p = sparse_packet();
        let raw = p.encode(false);
        // frame + header 16 + run 8 + 4 empty slots + record (1 + 4) + init marker
        assert_eq!(raw.len(), 1 + 16 + 8 + 4 + 5 + 1);

        let decoded = Packet::decode(&raw).unwrap();
        assert_eq!(decoded.events.len(), 1);
        assert_eq!(decoded.events[0].tic, 52);
        assert_eq!(decoded.events[0].client, 3);
        assert_eq!(decoded.first_tic, 50);
        assert_eq!(decoded, p);
    }

    #[test]
    fn test_rle_frame_used_when_smaller() {
        let mut p = Packet::new(1, 400);
        p.first_tic = 1;
        let framed = p.encode(true);
        assert_eq!(framed[0], CODEC_RLE);
        assert!(framed.len() < p.encode(false).len());
        assert_eq!(Packet::decode(&framed).unwrap(), p);
    }

    #[test]
    fn test_explicit_client_forwarding() {
        let mut p = Packet::new(1, 10);
        p.first_tic = 10;
        p.events.push(ClientEvent::buttons(10, 1, ControlBits(5)));
        p.events.push(ClientEvent::spawn(10, 2, 1));
        let decoded = Packet::decode(&p.encode(false)).unwrap();
        assert_eq!(decoded.events, p.events);
    }

    #[test]
    fn test_bootstrap_state_round_trip() {
        let config = GameConfig::default();
        let mut state = StateData::new(77, &config);
        simulate_tic(&mut state, &[ClientEvent::spawn(1, 4, 1)], &config);
        state.stats.insert(9, PlayerStat { frags: 2, score: 200 });

        let mut p = Packet::new(1, 30);
        p.init = Some(Bootstrap { config: config.fingerprint(), state: state.clone() });
        p.debug = Some(DebugCompanion { fingerprint: state.fingerprint(), shadow: Some(state.clone()) });
        let decoded = Packet::decode(&p.encode(true)).unwrap();
        let boot = decoded.init.unwrap();
        assert_eq!(boot.config, config.fingerprint());
        assert_eq!(boot.state, state);
        assert_eq!(decoded.debug.unwrap().shadow, Some(state));
    }

    #[test]
    fn test_rejects_malformed() {
        let good = sparse_packet().encode(false);

        assert_eq!(Packet::decode(&[]), Err(DecodeError::Truncated { offset: 0, needed: 1 }));
        assert_eq!(Packet::decode(&[9]), Err(DecodeError::UnknownCodec(9)));

        // Every strict prefix fails
        for cut in 1..good.len() {
            assert!(Packet::decode(&good[..cut]).is_err(), "prefix {} accepted", cut);
        }

        let mut trailing = good.clone();
        trailing.push(0);
        assert_eq!(Packet::decode(&trailing), Err(DecodeError::TrailingBytes(1)));

        let mut bad_flags = good.clone();
        bad_flags[1] |= 0x80;
        assert!(matches!(Packet::decode(&bad_flags), Err(DecodeError::UnknownFlags { field: "header", .. })));

        let mut huge = good;
        // run count lives after frame(1) + header(16) + first_tic(4)
        huge[21..25].copy_from_slice(&(MAX_RUN_TICS + 1).to_le_bytes());
        assert!(matches!(Packet::decode(&huge), Err(DecodeError::TooLarge { .. })));
    }

    #[test]
    fn test_rejects_unsorted_actors() {
        let mut state = StateData::empty(1);
        state.spawn(ActorKind::Item, 0, 0);
        state.spawn(ActorKind::Item, 0, 0);
        state.list_mut(ActorKind::Item).swap(0, 1);
        let mut w = ByteWriter::new();
        write_state(&mut w, &state);
        let buf = w.into_inner();
        assert_eq!(read_state(&mut ByteReader::new(&buf)), Err(DecodeError::Invalid("actor order")));
    }

    fn arb_event(first: u32, span: u32) -> impl Strategy<Value = ClientEvent> {
        (
            0..span,
            prop_oneof![Just(7i32), -3i32..20],
            proptest::option::of(0u32..=ControlBits::VALID_MASK),
            proptest::option::of(any::<u8>()),
        )
            .prop_filter("event must carry something", |(_, _, b, s)| b.is_some() || s.is_some())
            .prop_map(move |(dt, client, btn, spawn)| ClientEvent {
                tic: first + dt,
                client,
                btn: btn.map(ControlBits),
                spawn: spawn.map(|loadout| SpawnRequest { loadout }),
            })
    }

    proptest! {
        #[test]
        fn prop_packet_round_trip(
            first in 0u32..1_000_000,
            span in 1u32..200,
            mut events in proptest::collection::vec(arb_event(0, 200), 0..40),
            sync in any::<bool>(),
            ack in any::<u32>(),
            rle in any::<bool>(),
        ) {
            for e in &mut events {
                e.tic = first + e.tic % span;
            }
            events.sort_by_key(|e| e.tic);
            let mut per_tic = BTreeMap::new();
            events.retain(|e| {
                let n = per_tic.entry(e.tic).or_insert(0usize);
                *n += 1;
                *n <= MAX_EVENTS_PER_TIC
            });

            let mut p = Packet::new(7, first + span - 1);
            p.first_tic = first;
            p.sync = sync;
            p.received_on_sender = ack;
            p.events = events;

            let decoded = Packet::decode(&p.encode(rle)).unwrap();
            prop_assert_eq!(decoded, p);
        }

        #[test]
        fn prop_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = Packet::decode(&bytes);
        }
    }
}
