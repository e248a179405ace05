//! Map Generation
//!
//! Places the static trees and the initial barrels from `map_seed`.
//! Also owns free-spot search, which player spawning reuses.

use crate::core::fixed::Fixed;
use crate::core::rng::DeterministicRng;
use crate::core::vec2::FixedVec2;
use crate::game::actor::ActorKind;
use crate::game::config::GameConfig;
use crate::game::state::StateData;

/// Populate an empty state with trees and barrels.
///
/// Leaves `state.seed` at the RNG state after placement, so the first
/// simulated tick continues the same stream.
pub fn generate(state: &mut StateData, config: &GameConfig) {
    let mut rng = DeterministicRng::new(state.map_seed);

    for _ in 0..config.tree_count {
        if let Some(pos) = find_free_position(state, config, &mut rng, config.tree_radius) {
            let tree = state.spawn(ActorKind::Tree, pos.x, pos.y);
            tree.hp = u8::MAX;
        }
    }

    for _ in 0..config.barrel_count {
        if let Some(pos) = find_free_position(state, config, &mut rng, config.barrel_radius) {
            let barrel = state.spawn(ActorKind::Barrel, pos.x, pos.y);
            barrel.hp = config.barrel_hp;
        }
    }

    state.seed = rng.state();
}

/// Pick a random spot whose circle of `radius` clears every tree,
/// barrel and player.
///
/// Tries `config.spawn_attempts` times and returns `None` when the map
/// is too crowded. Each attempt consumes exactly two RNG draws, so the
/// stream stays aligned on every peer.
pub fn find_free_position(
    state: &StateData,
    config: &GameConfig,
    rng: &mut DeterministicRng,
    radius: Fixed,
) -> Option<FixedVec2> {
    let extent = config.world_extent();
    for _ in 0..config.spawn_attempts.max(1) {
        let x = rng.next_fixed_range(radius, extent - radius);
        let y = rng.next_fixed_range(radius, extent - radius);
        let pos = FixedVec2::new(x, y);
        if is_clear(state, config, pos, radius) {
            return Some(pos);
        }
    }
    None
}

fn is_clear(state: &StateData, config: &GameConfig, pos: FixedVec2, radius: Fixed) -> bool {
    let blockers = [
        (ActorKind::Tree, config.tree_radius),
        (ActorKind::Barrel, config.barrel_radius),
        (ActorKind::Player, config.player_radius),
    ];
    blockers.iter().all(|&(kind, other_radius)| {
        let reach = (radius + other_radius) as i64;
        state
            .list(kind)
            .iter()
            .all(|a| a.pos().distance_squared(pos) >= reach * reach)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::actor::Actor;

    #[test]
    fn test_generate_no_overlaps() {
        let config = GameConfig::default();
        let state = StateData::new(99, &config);
        let statics: Vec<(&Actor, Fixed)> = state
            .list(ActorKind::Tree)
            .iter()
            .map(|t| (t, config.tree_radius))
            .chain(state.list(ActorKind::Barrel).iter().map(|b| (b, config.barrel_radius)))
            .collect();

        for (i, (a, ra)) in statics.iter().enumerate() {
            for (b, rb) in &statics[i + 1..] {
                let reach = (*ra + *rb) as i64;
                assert!(a.pos().distance_squared(b.pos()) >= reach * reach);
            }
        }
    }

    #[test]
    fn test_generate_in_bounds() {
        let config = GameConfig::default();
        let state = StateData::new(5, &config);
        for tree in state.list(ActorKind::Tree) {
            assert!(tree.x >= config.tree_radius && tree.x < config.world_extent() - config.tree_radius);
            assert!(tree.y >= config.tree_radius && tree.y < config.world_extent() - config.tree_radius);
        }
    }

    #[test]
    fn test_generate_advances_seed() {
        let config = GameConfig::default();
        let state = StateData::new(5, &config);
        assert_ne!(state.seed, state.map_seed);
    }

    #[test]
    fn test_crowded_map_gives_up() {
        let config = GameConfig {
            world_size: 64,
            tree_count: 0,
            barrel_count: 0,
            ..GameConfig::default()
        };
        let mut state = StateData::empty(1);
        // Tree covering the whole world
        let t = state.spawn(ActorKind::Tree, 32 << 16, 32 << 16);
        t.hp = u8::MAX;
        let big = GameConfig { tree_radius: 200 << 16, ..config };
        let mut rng = DeterministicRng::new(3);
        let before = rng.state();
        assert!(find_free_position(&state, &big, &mut rng, big.player_radius).is_none());
        // Two draws per attempt
        let mut expected = DeterministicRng::new(before);
        for _ in 0..big.spawn_attempts * 2 {
            expected.next_u32();
        }
        assert_eq!(rng.state(), expected.state());
    }
}
