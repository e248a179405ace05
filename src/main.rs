//! Lockstep Arena Demo
//!
//! Runs three peers in one process over a lossy in-memory network: one
//! hosts, two join through a bootstrap snapshot. Bots drive every peer.
//! At the end the peers' fingerprints are compared at a common tic.
//!
//! ```text
//! lockstep-arena [game-config.json] [seconds]
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lockstep_arena::{
    core::{hash::short_hex, rng::derive_map_seed},
    game::{events::GameEventData, GameConfig},
    network::{LinkConditions, LoopbackNetwork},
    ClientId, ControlBits, DeterministicRng, SessionConfig, SimulationSession, DEFAULT_TICK_RATE, VERSION,
};

const PEERS: [ClientId; 3] = [1, 2, 3];

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from);
    let seconds: u64 = match args.next() {
        Some(s) => s.parse().with_context(|| format!("invalid duration {:?}", s))?,
        None => 10,
    };

    let game = match &config_path {
        Some(path) => GameConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => GameConfig::default(),
    };

    info!("Lockstep Arena v{}", VERSION);
    info!("Tick Rate: {} Hz", DEFAULT_TICK_RATE);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("building runtime")?;
    runtime.block_on(demo_session(game, seconds))
}

/// Bot input for one frame.
fn bot_controls(rng: &mut DeterministicRng, prev: ControlBits, frame: u64) -> ControlBits {
    // Change intent a few times per second
    if frame % 20 != 0 {
        return prev;
    }
    ControlBits::NONE
        .with_move_angle(rng.next_int(64))
        .with_look_angle(rng.next_int(64))
        .with(ControlBits::MOVE, rng.next_int(4) != 0)
        .with(ControlBits::RUN, rng.next_int(3) == 0)
        .with(ControlBits::FIRE, rng.next_int(2) == 0)
        .with(ControlBits::SWAP, rng.next_int(16) == 0)
}

async fn demo_session(game: GameConfig, seconds: u64) -> Result<()> {
    info!("=== Starting Demo Session ===");

    let map_seed = derive_map_seed(b"demo-room");
    let config = SessionConfig { debug_checks: true, ..Default::default() };

    let mut sessions = Vec::new();
    for &id in &PEERS {
        let mut session = if id == PEERS[0] {
            SimulationSession::host(id, map_seed, game.clone(), config.clone(), 0.0)?
        } else {
            SimulationSession::join(id, game.clone(), config.clone(), 0.0)?
        };
        for &peer in PEERS.iter().filter(|&&p| p != id) {
            session.add_peer(peer, 0.0)?;
        }
        sessions.push(session);
    }

    let mut net = LoopbackNetwork::new(LinkConditions::lossy(), map_seed);
    let mut bots: Vec<(DeterministicRng, ControlBits)> = PEERS
        .iter()
        .map(|&id| (DeterministicRng::new(map_seed ^ id as u32), ControlBits::NONE))
        .collect();

    let frame_period = Duration::from_secs_f64(1.0 / DEFAULT_TICK_RATE as f64);
    let mut ticker = interval(frame_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let start = Instant::now();
    let total_frames = seconds * DEFAULT_TICK_RATE as u64;
    let mut kills = 0;

    for frame in 0..total_frames {
        ticker.tick().await;
        let ts = start.elapsed().as_secs_f64();

        for (session, (rng, btn)) in sessions.iter_mut().zip(bots.iter_mut()) {
            if session.is_ready() {
                *btn = bot_controls(rng, *btn, frame);
                session.set_local_controls(*btn);
                if frame % 60 == 30 && session.state().player_of(session.local_id()).is_none() {
                    session.request_spawn(rng.next_int(3) as u8)?;
                }
            }

            let mut endpoint = net.endpoint(session.local_id(), ts);
            session.update(ts, &mut endpoint);

            for effect in session.take_effects() {
                if let GameEventData::PlayerKilled { victim, killer } = effect.data {
                    if session.local_id() == PEERS[0] {
                        kills += 1;
                        info!("Tic {}: client {} killed by {:?}", effect.tic, victim, killer);
                    }
                }
            }
        }

        for delivery in net.poll(ts) {
            if let Some(session) = sessions.iter_mut().find(|s| s.local_id() == delivery.to) {
                if let Err(e) = session.on_receive(delivery.from, &delivery.bytes, ts) {
                    warn!("Client {}: {}", delivery.to, e);
                }
            }
        }

        // Report every 2 seconds
        if frame % (2 * DEFAULT_TICK_RATE as u64) == 0 {
            for s in &sessions {
                info!(
                    "Client {}: tic {} actors {} view +{} hash {}",
                    s.local_id(),
                    s.state().tic,
                    s.state().actor_count(),
                    s.view().tic.saturating_sub(s.state().tic),
                    short_hex(&s.state().compute_hash())
                );
            }
        }
    }

    // Print final results
    info!("=== Session Results ===");
    info!("Datagrams sent {}, dropped {}", net.sent(), net.dropped());
    info!("Kills: {}", kills);
    for (client, stat) in &sessions[0].state().stats {
        info!("Client {}: {} frags, score {}", client, stat.frags, stat.score);
    }

    info!("=== Verifying Lockstep ===");
    let Some(common) = sessions.iter().map(|s| s.state().tic).min() else {
        bail!("no sessions");
    };
    let reference = sessions[0].fingerprint_at(common);
    let mut agreed = reference.is_some();
    for s in &sessions {
        let fp = s.fingerprint_at(common);
        info!("Client {} at tic {}: {:?} (desyncs {})", s.local_id(), common, fp, s.desync_count());
        agreed &= fp == reference && s.desync_count() == 0;
    }

    if agreed {
        info!("LOCKSTEP VERIFIED: all peers agree at tic {}", common);
        Ok(())
    } else {
        bail!("LOCKSTEP FAILURE: peers disagree at tic {}", common)
    }
}
