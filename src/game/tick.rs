//! Deterministic Simulation Step
//!
//! Every peer runs this on the same `(state, events, config)` and must
//! land on the same bits, so it uses integer math and sorted lists only.

use crate::core::fixed::{
    fixed_clamp, fixed_mul, from_int, truncate_quantum, Fixed, ANGLE_MASK, ANGLE_STEPS, FIXED_HALF,
    FIXED_ONE,
};
use crate::core::rng::DeterministicRng;
use crate::core::vec2::FixedVec2;
use crate::game::actor::{Actor, ActorKind, ITEM_AMMO, ITEM_HEALTH, ITEM_WEAPON_BASE, NO_WEAPON};
use crate::game::collision::{circles_overlap, separation, slide};
use crate::game::config::{GameConfig, WeaponDef};
use crate::game::events::{GameEvent, GameEventData};
use crate::game::grid::SpatialGrid;
use crate::game::input::{ClientEvent, ClientId, ControlBits};
use crate::game::map;
use crate::game::state::StateData;

/// Ticks an item must exist before it can be picked up.
pub const PICKUP_DELAY: u8 = 30;

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick
    pub events: Vec<GameEvent>,
}

/// Per-kind broad-phase buckets, rebuilt every tick.
struct Grids {
    players: SpatialGrid,
    barrels: SpatialGrid,
    items: SpatialGrid,
    trees: SpatialGrid,
}

impl Grids {
    fn new(config: &GameConfig) -> Self {
        let grid = SpatialGrid::new(config.grid_cell_shift, config.grid_dim());
        Self {
            players: grid.clone(),
            barrels: grid.clone(),
            items: grid.clone(),
            trees: grid,
        }
    }
}

/// Everything a tick needs besides the state itself.
struct TickContext<'a> {
    config: &'a GameConfig,
    tic: u32,
    rng: DeterministicRng,
    grids: Grids,
    scratch: Vec<usize>,
    events: Vec<GameEvent>,
}

impl TickContext<'_> {
    fn emit(&mut self, x: Fixed, y: Fixed, data: GameEventData) {
        self.events.push(GameEvent::new(self.tic, x, y, data));
    }
}

/// Run one simulation tick.
///
/// Advances `state` from `state.tic` to `state.tic + 1`. Only events
/// stamped with the new tic are applied; they are stable-sorted by
/// client id first so arrival order never matters.
///
/// # Phases
///
/// 1. Apply input (button changes, spawn requests)
/// 2. Update passes: players, barrels, items, bullets
/// 3. Collisions through the spatial grid
/// 4. Remove actors with zero hit points
/// 5. Decorative decay
/// 6. Advance the RNG, stamp `seed` and `tic`, normalize
pub fn simulate_tic(state: &mut StateData, events: &[ClientEvent], config: &GameConfig) -> TickResult {
    let tic = state.tic.wrapping_add(1);
    let mut ctx = TickContext {
        config,
        tic,
        rng: DeterministicRng::new(state.seed),
        grids: Grids::new(config),
        scratch: Vec::new(),
        events: Vec::new(),
    };

    // 1. Apply sorted input
    let mut due: Vec<&ClientEvent> = events.iter().filter(|e| e.tic == tic).collect();
    due.sort_by_key(|e| e.client);
    apply_inputs(state, &due, &mut ctx);

    // 2. Per-kind updates, each filling its grid
    for (i, tree) in state.list(ActorKind::Tree).iter().enumerate() {
        ctx.grids.trees.add(i, tree.x, tree.y);
    }
    update_players(state, &mut ctx);
    update_barrels(state, &mut ctx);
    update_items(state, &mut ctx);
    update_bullets(state, &ctx);

    // 3. Broad-phase collisions
    collide_bullets(state, &mut ctx);
    collide_players(state, &mut ctx);

    // 4. Filter the dead; trees are indestructible
    for kind in ActorKind::ALL {
        if kind != ActorKind::Tree {
            state.list_mut(kind).retain(Actor::is_alive);
        }
    }

    // 5. Decorative updates
    for list in state.actors.iter_mut() {
        for actor in list.iter_mut() {
            actor.hit_flash = actor.hit_flash.saturating_sub(1);
        }
    }

    // 6. Advance RNG and tick
    ctx.rng.next_u32();
    state.seed = ctx.rng.state();
    state.tic = tic;

    normalize_state(state, config);

    TickResult { events: ctx.events }
}

/// Run ticks until `state.tic == until_tic`, feeding events from `log`.
pub fn replay(state: &mut StateData, log: &[ClientEvent], until_tic: u32, config: &GameConfig) -> Vec<GameEvent> {
    let mut out = Vec::new();
    while state.tic < until_tic {
        out.extend(simulate_tic(state, log, config).events);
    }
    out
}

/// Clamp and quantize every actor, then restore id order.
///
/// Runs at the end of every tick so small arithmetic drift can never
/// accumulate into a visible difference.
pub fn normalize_state(state: &mut StateData, config: &GameConfig) {
    let extent = config.world_extent();
    let max = config.max_speed;
    for list in state.actors.iter_mut() {
        for a in list.iter_mut() {
            a.x = fixed_clamp(a.x, 0, extent - 1);
            a.y = fixed_clamp(a.y, 0, extent - 1);
            a.z = fixed_clamp(a.z, 0, extent);
            a.u = truncate_quantum(fixed_clamp(a.u, -max, max));
            a.v = truncate_quantum(fixed_clamp(a.v, -max, max));
            a.w = truncate_quantum(fixed_clamp(a.w, -max, max));
        }
        list.sort_by_key(|a| a.id);
    }
}

// =============================================================================
// PHASE 1: INPUT
// =============================================================================

fn apply_inputs(state: &mut StateData, due: &[&ClientEvent], ctx: &mut TickContext) {
    for p in state.list_mut(ActorKind::Player) {
        p.trig = 0;
    }

    for ev in due {
        if let Some(req) = ev.spawn {
            spawn_player(state, ev.client, req.loadout, ctx);
        }
        if let Some(btn) = ev.btn {
            let btn = ControlBits(btn.bits() & ControlBits::VALID_MASK);
            if let Some(p) = state
                .list_mut(ActorKind::Player)
                .iter_mut()
                .find(|p| p.client == ev.client && p.is_alive())
            {
                p.trig |= btn.pressed_since(p.btn);
                p.btn = btn;
            }
        }
    }
}

fn spawn_player(state: &mut StateData, client: ClientId, loadout: u8, ctx: &mut TickContext) {
    let config = ctx.config;
    if client == 0 || state.player_of(client).is_some() {
        return;
    }
    let Some(pos) = map::find_free_position(state, config, &mut ctx.rng, config.player_radius) else {
        return;
    };
    let weapon = if config.weapon(loadout).is_some() { loadout } else { 0 };
    let (clip, mags) = config.weapon(weapon).map_or((0, 0), |w| (w.clip, w.mags));

    let p = state.spawn(ActorKind::Player, pos.x, pos.y);
    p.client = client;
    p.hp = config.player_hp;
    p.weapon = weapon;
    p.clip = clip;
    p.mags = mags;
    let actor = p.id;

    state.stats.entry(client).or_default();
    ctx.emit(pos.x, pos.y, GameEventData::PlayerSpawned { client, actor });
}

// =============================================================================
// PHASE 2: UPDATES
// =============================================================================

fn update_players(state: &mut StateData, ctx: &mut TickContext) {
    let config = ctx.config;
    for i in 0..state.list(ActorKind::Player).len() {
        let mut p = state.list(ActorKind::Player)[i];

        steer(&mut p, config);
        integrate(&mut p, config);
        confine(&mut p, config.player_radius, config);
        handle_weapon(state, &mut p, ctx);

        state.list_mut(ActorKind::Player)[i] = p;
        ctx.grids.players.add(i, p.x, p.y);
    }
}

fn steer(p: &mut Actor, config: &GameConfig) {
    if p.btn.has(ControlBits::MOVE) {
        let speed = if p.btn.has(ControlBits::RUN) { config.run_speed } else { config.walk_speed };
        let target = FixedVec2::from_angle(p.btn.move_angle()).scale(speed);
        p.u = p.u.saturating_add(fixed_mul(target.x - p.u, config.steering));
        p.v = p.v.saturating_add(fixed_mul(target.y - p.v, config.steering));
    } else {
        p.u = fixed_mul(p.u, config.friction);
        p.v = fixed_mul(p.v, config.friction);
    }
    if p.triggered(ControlBits::JUMP) && p.z == 0 {
        p.w = config.jump_velocity;
    }
}

fn integrate(a: &mut Actor, config: &GameConfig) {
    a.x = a.x.saturating_add(a.u);
    a.y = a.y.saturating_add(a.v);
    a.z = a.z.saturating_add(a.w);
    if a.z <= 0 {
        a.z = 0;
        a.w = 0;
    } else {
        a.w -= config.gravity;
    }
}

fn confine(a: &mut Actor, radius: Fixed, config: &GameConfig) {
    let hi = config.world_extent() - radius;
    if a.x < radius {
        a.x = radius;
        a.u = a.u.max(0);
    } else if a.x > hi {
        a.x = hi;
        a.u = a.u.min(0);
    }
    if a.y < radius {
        a.y = radius;
        a.v = a.v.max(0);
    } else if a.y > hi {
        a.y = hi;
        a.v = a.v.min(0);
    }
}

fn handle_weapon(state: &mut StateData, p: &mut Actor, ctx: &mut TickContext) {
    let config = ctx.config;
    p.fire_delay = p.fire_delay.saturating_sub(1);

    if p.triggered(ControlBits::SWAP) && p.weapon2 != NO_WEAPON {
        std::mem::swap(&mut p.weapon, &mut p.weapon2);
        std::mem::swap(&mut p.clip, &mut p.lifetime);
        p.reload = 0;
    }

    if p.triggered(ControlBits::DROP) && p.weapon != NO_WEAPON {
        drop_weapon(state, p, config);
    }

    let Some(weapon) = config.weapon(p.weapon) else {
        return;
    };

    if p.reload > 0 {
        p.reload -= 1;
        if p.reload == 0 && p.mags > 0 {
            p.mags -= 1;
            p.clip = weapon.clip;
            ctx.emit(p.x, p.y, GameEventData::Reloaded { actor: p.id });
        }
        return;
    }

    if p.triggered(ControlBits::RELOAD) && p.mags > 0 && p.clip < weapon.clip {
        p.reload = weapon.reload.max(1);
        return;
    }

    if p.btn.has(ControlBits::FIRE) && p.fire_delay == 0 {
        if p.clip == 0 {
            if p.mags > 0 {
                p.reload = weapon.reload.max(1);
            }
            return;
        }
        fire(state, p, weapon, ctx);
    }
}

fn fire(state: &mut StateData, p: &mut Actor, weapon: &WeaponDef, ctx: &mut TickContext) {
    let config = ctx.config;
    p.clip -= 1;
    p.fire_delay = weapon.fire_delay;

    let look = p.btn.look_angle();
    let muzzle = config.player_radius + config.bullet_radius + FIXED_ONE;
    let spread = weapon.spread as i32;

    for _ in 0..weapon.pellets {
        let offset = ctx.rng.next_int_range(-spread, spread);
        let angle = (look as i32).wrapping_add(offset) as u32 & ANGLE_MASK;
        let dir = FixedVec2::from_angle(angle);
        let start = p.pos() + dir.scale(muzzle);

        let b = state.spawn(ActorKind::Bullet, start.x, start.y);
        b.client = p.client;
        b.weapon = p.weapon;
        b.clip = weapon.damage;
        b.lifetime = weapon.lifetime;
        b.z = p.z;
        b.set_vel(dir.scale(weapon.speed));
    }

    let kick = FixedVec2::from_angle(look).scale(weapon.recoil);
    p.set_vel(p.vel() - kick);

    ctx.emit(p.x, p.y, GameEventData::ShotFired { actor: p.id, weapon: p.weapon });
}

fn drop_weapon(state: &mut StateData, p: &mut Actor, config: &GameConfig) {
    let toss = FixedVec2::from_angle(p.btn.look_angle()).scale(from_int(2));
    spawn_item(state, config, p.pos(), ITEM_WEAPON_BASE.saturating_add(p.weapon), p.clip, toss);

    p.weapon = p.weapon2;
    p.clip = p.lifetime;
    p.weapon2 = NO_WEAPON;
    p.lifetime = 0;
    p.reload = 0;
}

fn spawn_item(state: &mut StateData, config: &GameConfig, pos: FixedVec2, item: u8, amount: u8, vel: FixedVec2) {
    let it = state.spawn(ActorKind::Item, pos.x, pos.y);
    it.weapon = item;
    it.clip = amount;
    it.lifetime = config.item_lifetime.max(1);
    it.set_vel(vel);
}

fn update_barrels(state: &mut StateData, ctx: &mut TickContext) {
    let config = ctx.config;
    for (i, b) in state.list_mut(ActorKind::Barrel).iter_mut().enumerate() {
        b.u = fixed_mul(b.u, config.friction);
        b.v = fixed_mul(b.v, config.friction);
        integrate(b, config);
        confine(b, config.barrel_radius, config);
        ctx.grids.barrels.add(i, b.x, b.y);
    }
}

fn update_items(state: &mut StateData, ctx: &mut TickContext) {
    let config = ctx.config;
    for (i, it) in state.list_mut(ActorKind::Item).iter_mut().enumerate() {
        it.u = fixed_mul(it.u, config.friction);
        it.v = fixed_mul(it.v, config.friction);
        integrate(it, config);
        confine(it, config.item_radius, config);

        it.lifetime = it.lifetime.saturating_sub(1);
        if it.lifetime == 0 {
            it.hp = 0;
        } else {
            ctx.grids.items.add(i, it.x, it.y);
        }
    }
}

fn update_bullets(state: &mut StateData, ctx: &TickContext) {
    let extent = ctx.config.world_extent();
    for b in state.list_mut(ActorKind::Bullet) {
        b.x = b.x.saturating_add(b.u);
        b.y = b.y.saturating_add(b.v);
        b.lifetime = b.lifetime.saturating_sub(1);
        if b.lifetime == 0 || b.x < 0 || b.y < 0 || b.x >= extent || b.y >= extent {
            b.hp = 0;
        }
    }
}

// =============================================================================
// PHASE 3: COLLISIONS
// =============================================================================

/// Grid candidates in ascending index order.
fn candidates(grid: &SpatialGrid, pos: FixedVec2, reach: Fixed, skip_resolved: bool, out: &mut Vec<usize>) {
    out.clear();
    grid.query(pos.x, pos.y, reach, skip_resolved, |i| out.push(i));
    out.sort_unstable();
}

fn first_overlap(
    state: &StateData,
    kind: ActorKind,
    cands: &[usize],
    pos: FixedVec2,
    radius: Fixed,
    other_radius: Fixed,
    skip_client: Option<ClientId>,
) -> Option<usize> {
    let list = state.list(kind);
    cands.iter().copied().find(|&j| {
        let t = &list[j];
        t.is_alive()
            && skip_client.map_or(true, |c| t.client != c)
            && circles_overlap(pos, radius, t.pos(), other_radius)
    })
}

fn collide_bullets(state: &mut StateData, ctx: &mut TickContext) {
    let config = ctx.config;
    let br = config.bullet_radius;
    // Shrapnel spawned below waits for the next tick
    let count = state.list(ActorKind::Bullet).len();

    for bi in 0..count {
        let bullet = state.list(ActorKind::Bullet)[bi];
        if !bullet.is_alive() {
            continue;
        }
        let pos = bullet.pos();

        candidates(&ctx.grids.players, pos, br + config.player_radius, false, &mut ctx.scratch);
        if let Some(j) = first_overlap(state, ActorKind::Player, &ctx.scratch, pos, br, config.player_radius, Some(bullet.client)) {
            state.list_mut(ActorKind::Bullet)[bi].hp = 0;
            let mut target = state.list(ActorKind::Player)[j];
            let killed = strike(&mut target, &bullet, ctx);
            state.list_mut(ActorKind::Player)[j] = target;
            if killed {
                on_player_killed(state, &target, bullet.client, ctx);
            }
            continue;
        }

        candidates(&ctx.grids.barrels, pos, br + config.barrel_radius, false, &mut ctx.scratch);
        if let Some(j) = first_overlap(state, ActorKind::Barrel, &ctx.scratch, pos, br, config.barrel_radius, None) {
            state.list_mut(ActorKind::Bullet)[bi].hp = 0;
            let mut target = state.list(ActorKind::Barrel)[j];
            let killed = strike(&mut target, &bullet, ctx);
            state.list_mut(ActorKind::Barrel)[j] = target;
            if killed {
                break_barrel(state, &target, ctx);
            }
            continue;
        }

        candidates(&ctx.grids.trees, pos, br + config.tree_radius, false, &mut ctx.scratch);
        if first_overlap(state, ActorKind::Tree, &ctx.scratch, pos, br, config.tree_radius, None).is_some() {
            state.list_mut(ActorKind::Bullet)[bi].hp = 0;
        }
    }
}

/// Apply a bullet to a target. Returns true on a kill.
fn strike(target: &mut Actor, bullet: &Actor, ctx: &mut TickContext) -> bool {
    let config = ctx.config;
    let knockback = config.weapon(bullet.weapon).map_or(0, |w| w.knockback);
    let push = bullet.vel().normalize().scale(knockback);
    target.set_vel(target.vel() + push);

    let killed = target.damage(bullet.clip, config.hit_flash_ticks);
    ctx.emit(
        target.x,
        target.y,
        GameEventData::Hit { target: target.id, kind: target.kind, damage: bullet.clip },
    );
    killed
}

fn on_player_killed(state: &mut StateData, victim: &Actor, shooter: ClientId, ctx: &mut TickContext) {
    let config = ctx.config;
    let killer = (shooter > 0 && shooter != victim.client).then_some(shooter);
    if let Some(k) = killer {
        let stat = state.stats.entry(k).or_default();
        stat.frags += 1;
        stat.score += config.score_per_kill;
    }
    if config.weapon(victim.weapon).is_some() {
        spawn_item(
            state,
            config,
            victim.pos(),
            ITEM_WEAPON_BASE + victim.weapon,
            victim.clip,
            FixedVec2::ZERO,
        );
    }
    ctx.emit(victim.x, victim.y, GameEventData::PlayerKilled { victim: victim.client, killer });
}

fn break_barrel(state: &mut StateData, barrel: &Actor, ctx: &mut TickContext) {
    let config = ctx.config;

    // Loot roll
    let (item, amount) = match ctx.rng.next_int(3) {
        0 => (ITEM_HEALTH, config.health_amount),
        1 => (ITEM_AMMO, 1),
        _ => {
            let w = ctx.rng.next_int(config.weapons.len() as u32) as u8;
            (ITEM_WEAPON_BASE + w, config.weapon(w).map_or(0, |d| d.clip))
        }
    };
    spawn_item(state, config, barrel.pos(), item, amount, FixedVec2::ZERO);

    // Shrapnel ring with jittered angles
    let n = config.barrel_shrapnel as u32;
    let offset = config.barrel_radius + config.bullet_radius + FIXED_ONE;
    for k in 0..n {
        let angle = (k * ANGLE_STEPS / n + ctx.rng.next_int(4)) & ANGLE_MASK;
        let dir = FixedVec2::from_angle(angle);
        let start = barrel.pos() + dir.scale(offset);
        let b = state.spawn(ActorKind::Bullet, start.x, start.y);
        b.client = -1;
        b.weapon = NO_WEAPON;
        b.clip = config.shrapnel_damage;
        b.lifetime = config.shrapnel_lifetime.max(1);
        b.set_vel(dir.scale(config.shrapnel_speed));
    }

    ctx.emit(barrel.x, barrel.y, GameEventData::BarrelBroken { actor: barrel.id });
}

fn collide_players(state: &mut StateData, ctx: &mut TickContext) {
    let config = ctx.config;
    let pr = config.player_radius;

    for i in 0..state.list(ActorKind::Player).len() {
        ctx.grids.players.mark_resolved(i);
        let mut p = state.list(ActorKind::Player)[i];
        if !p.is_alive() {
            continue;
        }

        // Trees are static: the player takes the whole push
        candidates(&ctx.grids.trees, p.pos(), pr + config.tree_radius, false, &mut ctx.scratch);
        for &j in &ctx.scratch {
            let t = &state.list(ActorKind::Tree)[j];
            if let Some(push) = separation(p.pos(), pr, t.pos(), config.tree_radius) {
                p.x += push.x;
                p.y += push.y;
                p.set_vel(slide(p.vel(), push));
            }
        }

        // Barrels share the push
        candidates(&ctx.grids.barrels, p.pos(), pr + config.barrel_radius, false, &mut ctx.scratch);
        for &j in &ctx.scratch {
            let mut b = state.list(ActorKind::Barrel)[j];
            if !b.is_alive() {
                continue;
            }
            if let Some(push) = separation(p.pos(), pr, b.pos(), config.barrel_radius) {
                let half = push.scale(FIXED_HALF);
                p.x += half.x;
                p.y += half.y;
                b.x -= half.x;
                b.y -= half.y;
                state.list_mut(ActorKind::Barrel)[j] = b;
            }
        }

        // Other players, each pair once
        candidates(&ctx.grids.players, p.pos(), pr + pr, true, &mut ctx.scratch);
        for &j in &ctx.scratch {
            let mut o = state.list(ActorKind::Player)[j];
            if !o.is_alive() {
                continue;
            }
            if let Some(push) = separation(p.pos(), pr, o.pos(), pr) {
                let half = push.scale(FIXED_HALF);
                p.x += half.x;
                p.y += half.y;
                o.x -= half.x;
                o.y -= half.y;
                state.list_mut(ActorKind::Player)[j] = o;
            }
        }

        // Pickups; a taken item is resolved so nobody else gets it
        candidates(&ctx.grids.items, p.pos(), pr + config.item_radius, true, &mut ctx.scratch);
        for k in 0..ctx.scratch.len() {
            let j = ctx.scratch[k];
            let mut item = state.list(ActorKind::Item)[j];
            if !item.is_alive() || !circles_overlap(p.pos(), pr, item.pos(), config.item_radius) {
                continue;
            }
            if config.item_lifetime.saturating_sub(item.lifetime) < PICKUP_DELAY {
                continue;
            }
            if try_pickup(&mut p, &item, config) {
                item.hp = 0;
                state.list_mut(ActorKind::Item)[j] = item;
                ctx.grids.items.mark_resolved(j);
                ctx.emit(item.x, item.y, GameEventData::ItemPicked { actor: p.id, item: item.weapon });
            }
        }

        state.list_mut(ActorKind::Player)[i] = p;
    }
}

fn try_pickup(p: &mut Actor, item: &Actor, config: &GameConfig) -> bool {
    match item.weapon {
        ITEM_HEALTH => {
            if p.hp >= config.player_hp {
                return false;
            }
            p.hp = p.hp.saturating_add(item.clip).min(config.player_hp);
            true
        }
        ITEM_AMMO => {
            if p.weapon == NO_WEAPON {
                return false;
            }
            p.mags = p.mags.saturating_add(item.clip.max(1));
            true
        }
        kind => {
            let weapon = kind - ITEM_WEAPON_BASE;
            if config.weapon(weapon).is_none() {
                false
            } else if p.weapon == weapon || p.weapon2 == weapon {
                p.mags = p.mags.saturating_add(1);
                true
            } else if p.weapon == NO_WEAPON {
                p.weapon = weapon;
                p.clip = item.clip;
                true
            } else if p.weapon2 == NO_WEAPON {
                p.weapon2 = weapon;
                p.lifetime = item.clip;
                true
            } else {
                false
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bot_events(tic: u32, clients: &[ClientId]) -> Vec<ClientEvent> {
        // Deterministic pseudo-input derived from the tic alone
        clients
            .iter()
            .map(|&c| {
                let phase = tic / 20 + c as u32 * 7;
                let btn = ControlBits::NONE
                    .with_move_angle(phase * 5)
                    .with_look_angle(phase * 11)
                    .with(ControlBits::MOVE, phase % 3 != 0)
                    .with(ControlBits::RUN, phase % 4 == 0)
                    .with(ControlBits::FIRE, phase % 2 == 0)
                    .with(ControlBits::JUMP, tic % 45 == 0);
                ClientEvent {
                    tic,
                    client: c,
                    btn: Some(btn),
                    spawn: (tic % 60 == 1).then_some(crate::game::input::SpawnRequest { loadout: c as u8 % 3 }),
                }
            })
            .collect()
    }

    fn run_bots(seed: u32, ticks: u32) -> StateData {
        let config = GameConfig::default();
        let mut state = StateData::new(seed, &config);
        for t in 1..=ticks {
            let events = bot_events(t, &[1, 2, 3, 4]);
            simulate_tic(&mut state, &events, &config);
        }
        state
    }

    fn duel_state(target_hp: u8) -> (StateData, GameConfig) {
        let config = GameConfig::default();
        let mut state = StateData::empty(1);
        let shooter = state.spawn(ActorKind::Player, from_int(100), from_int(100));
        shooter.client = 1;
        shooter.hp = 100;
        shooter.weapon = 0;
        shooter.clip = 8;
        let target = state.spawn(ActorKind::Player, from_int(130), from_int(100));
        target.client = 2;
        target.hp = target_hp;
        (state, config)
    }

    fn fire_east(tic: u32) -> ClientEvent {
        ClientEvent::buttons(tic, 1, ControlBits::NONE.with_look_angle(0).with(ControlBits::FIRE, true))
    }

    #[test]
    fn test_tic_advances_by_one() {
        let config = GameConfig::default();
        let mut state = StateData::new(9, &config);
        for expected in 1..=10 {
            simulate_tic(&mut state, &[], &config);
            assert_eq!(state.tic, expected);
        }
    }

    #[test]
    fn test_determinism() {
        let a = run_bots(1234, 600);
        let b = run_bots(1234, 600);
        assert_eq!(a, b);
        assert_eq!(a.compute_hash(), b.compute_hash());
        assert!(!a.list(ActorKind::Player).is_empty());

        let c = run_bots(4321, 600);
        assert_ne!(a.compute_hash(), c.compute_hash());
    }

    #[test]
    fn test_seed_advances_every_tick() {
        let config = GameConfig::default();
        let mut state = StateData::new(9, &config);
        let mut expected = DeterministicRng::new(state.seed);
        simulate_tic(&mut state, &[], &config);
        expected.next_u32();
        assert_eq!(state.seed, expected.state());
    }

    #[test]
    fn test_spawn_event() {
        let config = GameConfig::default();
        let mut state = StateData::new(5, &config);
        let result = simulate_tic(&mut state, &[ClientEvent::spawn(1, 7, 2)], &config);

        let p = state.player_of(7).unwrap();
        assert_eq!(p.weapon, 2);
        assert_eq!(p.hp, config.player_hp);
        assert_eq!(p.clip, config.weapons[2].clip);
        assert!(state.stats.contains_key(&7));
        assert!(result
            .events
            .iter()
            .any(|e| matches!(e.data, GameEventData::PlayerSpawned { client: 7, .. })));

        // Second request while alive is ignored
        let count = state.list(ActorKind::Player).len();
        simulate_tic(&mut state, &[ClientEvent::spawn(2, 7, 0)], &config);
        assert_eq!(state.list(ActorKind::Player).len(), count);
    }

    #[test]
    fn test_wrong_tic_events_ignored() {
        let config = GameConfig::default();
        let mut state = StateData::new(5, &config);
        let late = ClientEvent::spawn(0, 7, 0);
        let early = ClientEvent::spawn(5, 8, 0);
        simulate_tic(&mut state, &[late, early], &config);
        assert!(state.player_of(7).is_none());
        assert!(state.player_of(8).is_none());
    }

    #[test]
    fn test_event_order_does_not_matter() {
        let config = GameConfig::default();
        let events: Vec<ClientEvent> = (1..=6).map(|c| ClientEvent::spawn(1, c, 0)).collect();
        let mut reversed = events.clone();
        reversed.reverse();

        let mut a = StateData::new(11, &config);
        let mut b = a.clone();
        simulate_tic(&mut a, &events, &config);
        simulate_tic(&mut b, &reversed, &config);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fire_consumes_clip_and_spawns_bullet() {
        let (mut state, config) = duel_state(100);
        let result = simulate_tic(&mut state, &[fire_east(1)], &config);
        let shooter = state.player_of(1).unwrap();
        assert_eq!(shooter.clip, 7);
        assert_eq!(shooter.fire_delay, config.weapons[0].fire_delay);
        assert_eq!(state.list(ActorKind::Bullet).len(), 1);
        assert_eq!(state.list(ActorKind::Bullet)[0].client, 1);
        assert!(result.events.iter().any(|e| matches!(e.data, GameEventData::ShotFired { .. })));
    }

    #[test]
    fn test_bullet_kills_and_credits_frag() {
        let (mut state, config) = duel_state(5);
        simulate_tic(&mut state, &[fire_east(1)], &config);
        let result = simulate_tic(&mut state, &[], &config);

        assert!(state.player_of(2).is_none(), "target should be removed");
        assert_eq!(state.stats[&1].frags, 1);
        assert_eq!(state.stats[&1].score, config.score_per_kill);
        assert!(state.list(ActorKind::Bullet).is_empty());
        assert!(result.events.iter().any(GameEvent::is_kill));
    }

    #[test]
    fn test_barrel_breaks_into_loot_and_shrapnel() {
        let (mut state, config) = duel_state(100);
        // Replace the target with a fragile barrel
        state.list_mut(ActorKind::Player).retain(|p| p.client == 1);
        let barrel = state.spawn(ActorKind::Barrel, from_int(130), from_int(100));
        barrel.hp = 1;

        simulate_tic(&mut state, &[fire_east(1)], &config);
        let result = simulate_tic(&mut state, &[], &config);

        assert!(state.list(ActorKind::Barrel).is_empty());
        assert_eq!(state.list(ActorKind::Item).len(), 1);
        let shrapnel = state.list(ActorKind::Bullet).iter().filter(|b| b.client < 0).count();
        assert_eq!(shrapnel, config.barrel_shrapnel as usize);
        assert!(result.events.iter().any(|e| matches!(e.data, GameEventData::BarrelBroken { .. })));
    }

    #[test]
    fn test_health_pickup() {
        let config = GameConfig::default();
        let mut state = StateData::empty(1);
        let p = state.spawn(ActorKind::Player, from_int(200), from_int(200));
        p.client = 1;
        p.hp = 10;
        spawn_item(&mut state, &config, FixedVec2::new(from_int(204), from_int(200)), ITEM_HEALTH, 40, FixedVec2::ZERO);
        // Fresh items cannot be taken yet
        state.list_mut(ActorKind::Item)[0].lifetime = config.item_lifetime - PICKUP_DELAY;

        simulate_tic(&mut state, &[], &config);
        assert_eq!(state.player_of(1).unwrap().hp, 50);
        assert!(state.list(ActorKind::Item).is_empty());
    }

    #[test]
    fn test_players_pushed_apart() {
        let config = GameConfig::default();
        let mut state = StateData::empty(1);
        for (c, x) in [(1, 200), (2, 204)] {
            let p = state.spawn(ActorKind::Player, from_int(x), from_int(200));
            p.client = c;
            p.hp = 100;
        }
        simulate_tic(&mut state, &[], &config);
        let a = state.player_of(1).unwrap().pos();
        let b = state.player_of(2).unwrap().pos();
        let reach = (2 * config.player_radius) as i64;
        // Within rounding of exactly touching
        assert!(a.distance_squared(b) >= (reach - 256) * (reach - 256));
    }

    #[test]
    fn test_lists_sorted_and_velocity_quantized() {
        let state = run_bots(77, 300);
        for list in &state.actors {
            assert!(list.windows(2).all(|w| w[0].id < w[1].id));
            for a in list {
                assert_eq!(a.u & 0xff, 0);
                assert_eq!(a.v & 0xff, 0);
                assert!(a.hp > 0 || a.kind == ActorKind::Tree);
            }
        }
    }

    #[test]
    fn test_replay_matches_step_by_step() {
        let config = GameConfig::default();
        let log: Vec<ClientEvent> = (1..=120).flat_map(|t| bot_events(t, &[1, 2])).collect();

        let mut a = StateData::new(3, &config);
        replay(&mut a, &log, 120, &config);

        let mut b = StateData::new(3, &config);
        for t in 1..=120 {
            simulate_tic(&mut b, &bot_events(t, &[1, 2]), &config);
        }
        assert_eq!(a.compute_hash(), b.compute_hash());
    }
}
