//! Replicated State Store
//!
//! [`StateData`] is the whole authoritative snapshot: it is what a
//! bootstrap packet carries and what prediction clones. Anything that
//! affects the outcome of a tick must live here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::hash::{compute_state_hash, StateHash, StateHasher};
use crate::game::actor::{Actor, ActorKind};
use crate::game::config::GameConfig;
use crate::game::input::ClientId;
use crate::game::map;

/// Per-client scoreboard row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStat {
    /// Kills
    pub frags: u32,
    /// Score
    pub score: u32,
}

/// The `{next_id, tic, seed}` triple peers compare to detect divergence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Next id to allocate
    pub next_id: u32,
    /// Last simulated tick
    pub tic: u32,
    /// RNG state
    pub seed: u32,
}

/// Authoritative snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateData {
    /// Next actor id to allocate
    pub next_id: u32,
    /// Last simulated tick
    pub tic: u32,
    /// RNG state at the top of the next tick
    pub seed: u32,
    /// Seed the static map was generated from
    pub map_seed: u32,
    /// One list per [`ActorKind`], each sorted by id
    pub actors: [Vec<Actor>; ActorKind::COUNT],
    /// Scoreboard
    pub stats: BTreeMap<ClientId, PlayerStat>,
}

impl StateData {
    /// Empty state with no map.
    pub fn empty(map_seed: u32) -> Self {
        Self {
            next_id: 1,
            tic: 0,
            seed: map_seed,
            map_seed,
            actors: Default::default(),
            stats: BTreeMap::new(),
        }
    }

    /// Fresh session state: generate the static map from `map_seed`.
    pub fn new(map_seed: u32, config: &GameConfig) -> Self {
        let mut state = Self::empty(map_seed);
        map::generate(&mut state, config);
        state
    }

    /// Actors of one kind.
    #[inline]
    pub fn list(&self, kind: ActorKind) -> &[Actor] {
        &self.actors[kind.index()]
    }

    /// Mutable actors of one kind.
    #[inline]
    pub fn list_mut(&mut self, kind: ActorKind) -> &mut Vec<Actor> {
        &mut self.actors[kind.index()]
    }

    /// Allocate a fresh actor id.
    #[inline]
    pub fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Spawn an actor; ids are monotonic so pushing keeps the list sorted.
    pub fn spawn(&mut self, kind: ActorKind, x: i32, y: i32) -> &mut Actor {
        let id = self.alloc_id();
        let list = self.list_mut(kind);
        list.push(Actor::new(id, kind, x, y));
        let last = list.len() - 1;
        &mut list[last]
    }

    /// The living player owned by `client`, if any.
    pub fn player_of(&self, client: ClientId) -> Option<&Actor> {
        self.list(ActorKind::Player)
            .iter()
            .find(|p| p.client == client && p.is_alive())
    }

    /// Total actors across all kinds.
    pub fn actor_count(&self) -> usize {
        self.actors.iter().map(Vec::len).sum()
    }

    /// Divergence fingerprint for this tick.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            next_id: self.next_id,
            tic: self.tic,
            seed: self.seed,
        }
    }

    /// Compute deterministic hash of the full state.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.tic, self.seed, |hasher| {
            hasher.put(&self.next_id).put(&self.map_seed);

            for list in &self.actors {
                hasher.put(&(list.len() as u32));
                for actor in list {
                    hash_actor(hasher, actor);
                }
            }

            // BTreeMap iterates in key order
            for (client, stat) in &self.stats {
                hasher.put(client).put(&stat.frags).put(&stat.score);
            }
        })
    }

    /// Name of the first actor list that differs from `other`, for
    /// desync reports.
    pub fn first_difference(&self, other: &StateData) -> Option<String> {
        if self.fingerprint() != other.fingerprint() {
            return Some(format!("{:?} vs {:?}", self.fingerprint(), other.fingerprint()));
        }
        for kind in ActorKind::ALL {
            let (a, b) = (self.list(kind), other.list(kind));
            if a.len() != b.len() {
                return Some(format!("{:?} count {} vs {}", kind, a.len(), b.len()));
            }
            if let Some((x, y)) = a.iter().zip(b).find(|(x, y)| x != y) {
                return Some(format!("{:?} #{}: {:?} vs {:?}", kind, x.id, x, y));
            }
        }
        if self.stats != other.stats {
            return Some("stats".to_string());
        }
        None
    }
}

fn hash_actor(hasher: &mut StateHasher, a: &Actor) {
    hasher
        .put(&a.id)
        .put(&(a.kind as u8))
        .put(&a.client)
        .put(&a.btn.bits())
        .put(&a.trig);
    for v in [a.x, a.y, a.z, a.u, a.v, a.w] {
        hasher.put(&v);
    }
    hasher.put(&[
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
