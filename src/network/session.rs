//! Simulation Session
//!
//! Owns everything one peer needs to play: the authoritative state, the
//! event log, per-peer bookkeeping, the clock controller and the current
//! speculative branch. The embedding application calls, once per frame:
//!
//! 1. [`SimulationSession::set_local_controls`] (and optionally
//!    [`SimulationSession::request_spawn`])
//! 2. [`SimulationSession::update`] with the wall-clock time and a
//!    [`Transport`]
//! 3. [`SimulationSession::view`] to render
//!
//! and [`SimulationSession::on_receive`] for every datagram that arrives.
//!
//! ## Joining
//!
//! A joiner adopts a bootstrap snapshot, then announces empty input until
//! every playing peer has confirmed input from after the snapshot. Only
//! then is it admitted: from that point every peer counts it in the net
//! tic, so its first real event lands on a tic nobody has simulated yet.
//!
//! ## Lockstep flow
//!
//! ```text
//! input ──► scheduled at game tic + input_delay ──► local log ──► every peer
//!                                                                   │
//! net tic = min(tic of every ready, playing peer) ◄─────────────────┘
//!    │
//!    └──► clock decides how many ticks to run now ──► simulate_tic
//! ```

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, error, info, trace, warn};

use crate::core::hash::{short_hex, StateHash};
use crate::game::config::{ConfigError, GameConfig};
use crate::game::events::GameEvent;
use crate::game::input::{ClientEvent, ClientId, ControlBits, SpawnRequest};
use crate::game::state::{Fingerprint, StateData};
use crate::game::tick::simulate_tic;

use super::client::Client;
use super::clock::ClockController;
use super::event_log::EventLog;
use super::prediction::{predict, PredictedState};
use super::protocol::{Bootstrap, DebugCompanion, Packet, MAX_RUN_TICS};
use super::transport::Transport;
use super::wire::DecodeError;

/// Session-level failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A datagram failed to decode
    #[error("packet from peer {peer} rejected: {source}")]
    Decode {
        /// Sender
        peer: ClientId,
        /// Why
        #[source]
        source: DecodeError,
    },
    /// Datagram from a peer we never added
    #[error("unknown peer {0}")]
    UnknownPeer(ClientId),
    /// Packet header names someone other than the channel it came from
    #[error("packet from peer {peer} claims to be from {claimed}")]
    SenderMismatch {
        /// Channel it arrived on
        peer: ClientId,
        /// Client id in the header
        claimed: ClientId,
    },
    /// Peer id is ours or already registered
    #[error("peer {0} cannot be added")]
    DuplicatePeer(ClientId),
    /// Operation needs an authoritative state
    #[error("session is not ready")]
    NotReady,
    /// Rejected game tables
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Bootstrap built from different game tables
    #[error("peer {0} runs different game tables")]
    ConfigMismatch(ClientId),
}

/// Authoritative effects kept for an embedder that never drains them.
pub const MAX_PENDING_EFFECTS: usize = 4096;

/// Netcode tunables.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Ticks between capturing input and simulating it
    pub input_delay: u32,
    /// Most ticks rendered past the authoritative state
    pub prediction_max: u32,
    /// Seconds of silence before a peer stops counting
    pub disconnect_timeout: f64,
    /// Try the run-length pass on outgoing packets
    pub rle: bool,
    /// Attach and compare debug fingerprints
    pub debug_checks: bool,
    /// Also attach a full shadow state (large)
    pub debug_shadow: bool,
    /// Consecutive bad packets before a peer stops counting
    pub max_decode_errors: u32,
    /// Local fingerprints kept for comparison
    pub fingerprint_history: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_rate: crate::DEFAULT_TICK_RATE,
            input_delay: 8,
            prediction_max: 8,
            disconnect_timeout: 3.0,
            rle: true,
            debug_checks: false,
            debug_shadow: false,
            max_decode_errors: 16,
            fingerprint_history: 256,
        }
    }
}

/// What one [`SimulationSession::update`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Authoritative ticks simulated
    pub simulated: u32,
    /// Speculative ticks in the current view
    pub predicted: u32,
    /// Net tic the clock was given
    pub net_tic: Option<u32>,
}

/// One peer's lockstep session.
pub struct SimulationSession {
    local_id: ClientId,
    config: SessionConfig,
    game: GameConfig,
    game_fingerprint: StateHash,
    ready: bool,
    /// Every playing peer counts our input
    admitted: bool,
    /// Input tic peers must confirm before we are admitted
    join_mark: u32,
    state: StateData,
    clock: ClockController,
    log: EventLog,
    clients: BTreeMap<ClientId, Client>,
    /// Highest tic our input is final for
    last_input_tic: u32,
    local_btn: ControlBits,
    sent_btn: ControlBits,
    pending_spawn: Option<u8>,
    effects: Vec<GameEvent>,
    fingerprints: VecDeque<Fingerprint>,
    simulated_since_bootstrap: bool,
    prediction: Option<PredictedState>,
    desync_count: u32,
}

impl SimulationSession {
    /// Start a session that owns the first state, generated from `map_seed`.
    pub fn host(
        local_id: ClientId,
        map_seed: u32,
        game: GameConfig,
        config: SessionConfig,
        ts: f64,
    ) -> Result<Self, SessionError> {
        game.validate()?;
        let state = StateData::new(map_seed, &game);
        info!(
            "Hosting session as client {} (map seed {:#010x}, config {})",
            local_id,
            map_seed,
            short_hex(&game.fingerprint())
        );
        let mut session = Self::build(local_id, game, config, state, ts);
        session.ready = true;
        session.admitted = true;
        session.record_fingerprint();
        Ok(session)
    }

    /// Start a session that waits for a bootstrap snapshot from a peer.
    pub fn join(local_id: ClientId, game: GameConfig, config: SessionConfig, ts: f64) -> Result<Self, SessionError> {
        game.validate()?;
        info!("Joining as client {}, waiting for bootstrap", local_id);
        Ok(Self::build(local_id, game, config, StateData::empty(0), ts))
    }

    fn build(local_id: ClientId, game: GameConfig, config: SessionConfig, state: StateData, ts: f64) -> Self {
        Self {
            local_id,
            clock: ClockController::new(config.tick_rate, config.input_delay, ts),
            config,
            game_fingerprint: game.fingerprint(),
            game,
            ready: false,
            admitted: false,
            join_mark: 0,
            state,
            log: EventLog::new(),
            clients: BTreeMap::new(),
            last_input_tic: 0,
            local_btn: ControlBits::NONE,
            sent_btn: ControlBits::NONE,
            pending_spawn: None,
            effects: Vec::new(),
            fingerprints: VecDeque::new(),
            simulated_since_bootstrap: false,
            prediction: None,
            desync_count: 0,
        }
    }

    // =========================================================================
    // PEERS
    // =========================================================================

    /// Register a remote peer.
    pub fn add_peer(&mut self, peer: ClientId, ts: f64) -> Result<(), SessionError> {
        if peer == self.local_id || self.clients.contains_key(&peer) {
            return Err(SessionError::DuplicatePeer(peer));
        }
        debug!("Client {} added peer {}", self.local_id, peer);
        self.clients.insert(peer, Client::new(peer, ts));
        Ok(())
    }

    /// Forget a peer. Its actors stay in the world.
    pub fn remove_peer(&mut self, peer: ClientId) -> Option<Client> {
        self.clients.remove(&peer)
    }

    /// Bookkeeping for one peer.
    pub fn client(&self, peer: ClientId) -> Option<&Client> {
        self.clients.get(&peer)
    }

    /// All peers in id order.
    pub fn clients(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    // =========================================================================
    // INPUT
    // =========================================================================

    /// Latest local buttons; scheduled on the next update.
    pub fn set_local_controls(&mut self, btn: ControlBits) {
        self.local_btn = ControlBits(btn.bits() & ControlBits::VALID_MASK);
    }

    /// Ask for a player with the given starting weapon. Held until the
    /// session is admitted.
    pub fn request_spawn(&mut self, loadout: u8) -> Result<(), SessionError> {
        if !self.ready {
            return Err(SessionError::NotReady);
        }
        self.pending_spawn = Some(loadout);
        Ok(())
    }

    /// Turn pending input into events for every tic up to
    /// `state.tic + input_delay`.
    fn schedule_local_input(&mut self) {
        let target = self.state.tic.saturating_add(self.config.input_delay);
        let mut tic = self.last_input_tic.max(self.state.tic);
        if !self.admitted {
            // Announced but empty; peers may simulate these without us
            self.last_input_tic = tic.max(target);
            return;
        }
        while tic < target {
            tic += 1;
            let spawn = self.pending_spawn.take().map(|loadout| SpawnRequest { loadout });
            // A fresh player starts with no buttons, so a spawn always restates them
            let btn = (spawn.is_some() || self.local_btn != self.sent_btn).then_some(self.local_btn);
            if btn.is_some() || spawn.is_some() {
                self.log.push_local(ClientEvent { tic, client: self.local_id, btn, spawn });
                self.sent_btn = self.local_btn;
            }
        }
        self.last_input_tic = self.last_input_tic.max(tic);
    }

    /// Admit once every playing peer is ready and has confirmed input
    /// announced after our bootstrap. Input resumes past the furthest tic
    /// any of them announced, which bounds how far they ran without us.
    fn check_admission(&mut self) {
        if self.admitted {
            return;
        }
        let mut horizon = self.last_input_tic;
        for client in self.clients.values().filter(|c| c.is_playing) {
            if !client.ready || client.acknowledged_tic < self.join_mark {
                return;
            }
            horizon = horizon.max(client.remote_tic);
        }
        info!(
            "Client {} admitted at tic {}, input resumes after tic {}",
            self.local_id, self.state.tic, horizon
        );
        self.admitted = true;
        self.last_input_tic = horizon;
    }

    // =========================================================================
    // FRAME
    // =========================================================================

    /// Run one frame: schedule input, simulate what the swarm allows,
    /// prune, send, and refresh the speculative view.
    pub fn update(&mut self, ts: f64, transport: &mut impl Transport) -> FrameReport {
        self.check_connectivity(ts, &*transport);

        let mut report = FrameReport::default();
        if !self.ready {
            self.prediction = None;
            self.flush(transport);
            return report;
        }

        self.check_admission();
        self.schedule_local_input();

        report.net_tic = self.net_tic();
        let steps = self.clock.schedule(ts, self.state.tic.wrapping_add(1), report.net_tic);
        for _ in 0..steps {
            self.step();
        }
        report.simulated = steps;

        self.prune();
        self.check_pending_fingerprints();
        self.flush(transport);

        let recent = self.effects.partition_point(|e| e.tic < self.state.tic);
        self.prediction = predict(
            &self.state,
            &self.effects[recent..],
            &self.log,
            self.clock.owed(ts),
            self.config.prediction_max,
            &self.game,
        );
        report.predicted = self.prediction.as_ref().map_or(0, |p| p.ticks);

        trace!(
            "Client {} frame: tic {} net {:?} sim {} pred {}",
            self.local_id,
            self.state.tic,
            report.net_tic,
            report.simulated,
            report.predicted
        );
        report
    }

    /// Highest tic every ready, playing peer has supplied input for,
    /// or `None` when there is nobody to wait for.
    pub fn net_tic(&self) -> Option<u32> {
        self.clients
            .values()
            .filter(|c| c.is_eligible())
            .map(|c| c.tic)
            .min()
    }

    fn step(&mut self) {
        let tic = self.state.tic.wrapping_add(1);
        let events = self.log.events_for(tic);
        let result = simulate_tic(&mut self.state, &events, &self.game);
        self.buffer_effects(result.events);
        self.simulated_since_bootstrap = true;
        self.record_fingerprint();
    }

    fn buffer_effects(&mut self, events: Vec<GameEvent>) {
        self.effects.extend(events);
        if self.effects.len() > MAX_PENDING_EFFECTS {
            let excess = self.effects.len() - MAX_PENDING_EFFECTS;
            self.effects.drain(..excess);
            trace!("Client {} dropped {} undrained effects", self.local_id, excess);
        }
    }

    fn check_connectivity(&mut self, ts: f64, transport: &impl Transport) {
        let timeout = self.config.disconnect_timeout;
        for client in self.clients.values_mut() {
            if !transport.is_connected(client.id) {
                if client.is_playing {
                    warn!("Peer {} disconnected", client.id);
                    client.is_playing = false;
                }
            } else if client.check_timeout(ts, timeout) {
                warn!("Peer {} silent for {:.1}s, excluding", client.id, ts - client.last_packet_at);
            }
        }
    }

    fn prune(&mut self) {
        // A joining peer may become ready through someone else's snapshot
        // and then need our input from its ack onward
        let acked = self
            .clients
            .values()
            .filter(|c| c.is_playing)
            .map(|c| c.acknowledged_tic)
            .min()
            .unwrap_or(u32::MAX);
        self.log.prune_local(self.state.tic.min(acked));
        self.log.prune_received(self.state.tic);
    }

    // =========================================================================
    // SEND
    // =========================================================================

    fn flush(&mut self, transport: &mut impl Transport) {
        let peers: Vec<ClientId> = self.clients.keys().copied().collect();
        for peer in peers {
            if !transport.is_connected(peer) {
                continue;
            }
            let Some(client) = self.clients.get(&peer) else {
                continue;
            };
            let (packet, truncated) = self.build_packet(client);
            let bytes = packet.encode(self.config.rle);
            trace!(
                "Client {} -> {}: {} events, {} bytes{}",
                self.local_id,
                client.id,
                packet.events.len(),
                bytes.len(),
                if packet.init.is_some() { " (bootstrap)" } else { "" }
            );
            transport.send(client.id, bytes);

            if let Some(client) = self.clients.get_mut(&peer) {
                if truncated && !client.resend_truncated {
                    warn!(
                        "Peer {} acked tic {}, resending only the last {} tics",
                        peer, client.acknowledged_tic, MAX_RUN_TICS
                    );
                } else if !truncated && client.resend_truncated {
                    info!("Peer {} caught up with our input", peer);
                }
                client.resend_truncated = truncated;
            }
        }
    }

    /// Packet for `client`, and whether its run was cut to the window.
    fn build_packet(&self, client: &Client) -> (Packet, bool) {
        let mut packet = Packet::new(self.local_id, self.last_input_tic);
        packet.sync = self.ready;
        packet.received_on_sender = client.tic;

        let bootstrap = self.ready && !client.ready;
        let floor = if bootstrap {
            client.acknowledged_tic.max(self.state.tic)
        } else {
            client.acknowledged_tic
        };
        let window_start = self.last_input_tic.saturating_add(1).saturating_sub(MAX_RUN_TICS);
        packet.first_tic = floor.saturating_add(1).max(window_start);
        let truncated = packet.first_tic > floor.saturating_add(1);

        packet
            .events
            .extend_from_slice(self.log.local_between(packet.first_tic - 1, self.last_input_tic));

        if bootstrap {
            packet.init = Some(Bootstrap { config: self.game_fingerprint, state: self.state.clone() });
            // Other peers' pending input is not in the snapshot yet
            let limit = packet.first_tic.saturating_add(MAX_RUN_TICS);
            packet.events.extend(
                self.log
                    .received_after(self.state.tic, client.id)
                    .filter(|e| e.tic >= packet.first_tic && e.tic < limit),
            );
        }

        if self.config.debug_checks && self.ready {
            packet.debug = Some(DebugCompanion {
                fingerprint: self.state.fingerprint(),
                shadow: self.config.debug_shadow.then(|| self.state.clone()),
            });
        }
        (packet, truncated)
    }

    // =========================================================================
    // RECEIVE
    // =========================================================================

    /// Handle one datagram from `peer`. A packet that fails to decode is
    /// dropped whole and changes nothing but the peer's error count.
    pub fn on_receive(&mut self, peer: ClientId, bytes: &[u8], ts: f64) -> Result<(), SessionError> {
        let max_errors = self.config.max_decode_errors;
        let client = self.clients.get_mut(&peer).ok_or(SessionError::UnknownPeer(peer))?;

        let packet = match Packet::decode(bytes) {
            Ok(packet) => packet,
            Err(source) => {
                client.decode_errors += 1;
                warn!("Bad packet from peer {} ({} in a row): {}", peer, client.decode_errors, source);
                if client.decode_errors >= max_errors && client.is_playing {
                    warn!("Peer {} excluded after {} bad packets", peer, client.decode_errors);
                    client.is_playing = false;
                }
                return Err(SessionError::Decode { peer, source });
            }
        };
        if packet.client != peer {
            return Err(SessionError::SenderMismatch { peer, claimed: packet.client });
        }
        if let Some(boot) = &packet.init {
            if boot.config != self.game_fingerprint {
                error!(
                    "Peer {} runs game tables {}, ours are {}",
                    peer,
                    short_hex(&boot.config),
                    short_hex(&self.game_fingerprint)
                );
                return Err(SessionError::ConfigMismatch(peer));
            }
        }

        if !client.is_playing {
            info!("Peer {} is back", peer);
        }
        client.touch(ts);
        if client.ready != packet.sync {
            debug!("Peer {} ready: {}", peer, packet.sync);
        }
        client.ready = packet.sync;
        client.acknowledge(packet.received_on_sender);
        client.note_announced(packet.tic);
        // Events at or below our view of its tic may be missing otherwise
        let gap_free = packet.first_tic <= client.tic.saturating_add(1);

        // A refused snapshot covers nothing for us, so its run may still leave a gap
        let adopted = match packet.init {
            Some(boot) => self.offer_bootstrap(peer, boot.state, ts),
            None => false,
        };

        for event in packet.events {
            if event.client == self.local_id || (self.ready && event.tic <= self.state.tic) {
                continue;
            }
            self.log.insert_received(event);
        }

        if gap_free || adopted {
            if let Some(client) = self.clients.get_mut(&peer) {
                client.note_received(packet.tic);
            }
        }

        if let Some(companion) = packet.debug {
            if self.config.debug_checks {
                self.check_remote_fingerprint(peer, companion);
            }
        }
        Ok(())
    }

    /// Adopt a snapshot if we have none, or if it is newer than the one we
    /// adopted and nothing was simulated on top of that yet. Returns whether
    /// it was adopted.
    fn offer_bootstrap(&mut self, peer: ClientId, init: StateData, ts: f64) -> bool {
        let accept = !self.ready || (!self.simulated_since_bootstrap && init.tic > self.state.tic);
        if !accept {
            debug!("Ignoring bootstrap from peer {} at tic {} (local tic {})", peer, init.tic, self.state.tic);
            return false;
        }

        info!(
            "Adopted bootstrap from peer {} at tic {} (hash {})",
            peer,
            init.tic,
            short_hex(&init.compute_hash())
        );
        self.state = init;
        self.ready = true;
        self.simulated_since_bootstrap = false;
        self.clock.reset(ts);
        self.last_input_tic = self
            .last_input_tic
            .max(self.state.tic.saturating_add(self.config.input_delay));
        self.admitted = false;
        self.join_mark = self.last_input_tic.max(1);
        self.log.prune_local(self.state.tic);
        self.log.prune_received(self.state.tic);
        self.effects.clear();
        self.prediction = None;
        self.fingerprints.clear();
        self.record_fingerprint();

        let tic = self.state.tic;
        for client in self.clients.values_mut() {
            client.note_received(tic);
        }
        true
    }

    // =========================================================================
    // DESYNC DETECTION
    // =========================================================================

    fn record_fingerprint(&mut self) {
        self.fingerprints.push_back(self.state.fingerprint());
        while self.fingerprints.len() > self.config.fingerprint_history.max(1) {
            self.fingerprints.pop_front();
        }
    }

    /// Our fingerprint for `tic`, if still remembered.
    pub fn fingerprint_at(&self, tic: u32) -> Option<Fingerprint> {
        self.fingerprints.iter().rev().find(|fp| fp.tic == tic).copied()
    }

    fn check_remote_fingerprint(&mut self, peer: ClientId, companion: DebugCompanion) {
        let remote = companion.fingerprint;
        if let Some(client) = self.clients.get_mut(&peer) {
            client.record_fingerprint(remote);
        }
        if remote.tic > self.state.tic {
            // Compared once we get there
            return;
        }
        self.compare_fingerprint(peer, remote, companion.shadow.as_ref());
        if let Some(client) = self.clients.get_mut(&peer) {
            client.fingerprint_checked = true;
        }
    }

    fn check_pending_fingerprints(&mut self) {
        let due: Vec<(ClientId, Fingerprint)> = self
            .clients
            .values()
            .filter(|c| !c.fingerprint_checked)
            .filter_map(|c| c.last_fingerprint.map(|fp| (c.id, fp)))
            .filter(|(_, fp)| fp.tic <= self.state.tic)
            .collect();
        for (peer, remote) in due {
            self.compare_fingerprint(peer, remote, None);
            if let Some(client) = self.clients.get_mut(&peer) {
                client.fingerprint_checked = true;
            }
        }
    }

    fn compare_fingerprint(&mut self, peer: ClientId, remote: Fingerprint, shadow: Option<&StateData>) {
        let Some(local) = self.fingerprint_at(remote.tic) else {
            return;
        };
        if local == remote {
            return;
        }
        self.desync_count += 1;
        let detail = shadow
            .filter(|s| s.tic == self.state.tic)
            .and_then(|s| self.state.first_difference(s))
            .unwrap_or_default();
        error!(
            "Desync with peer {} at tic {}: local {:?} remote {:?} {}",
            peer, remote.tic, local, remote, detail
        );
    }

    /// Fingerprint mismatches seen so far.
    pub fn desync_count(&self) -> u32 {
        self.desync_count
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Our client id.
    pub fn local_id(&self) -> ClientId {
        self.local_id
    }

    /// Holds an authoritative state.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Every playing peer counts our input, so local input is scheduled.
    pub fn is_admitted(&self) -> bool {
        self.admitted
    }

    /// Authoritative state.
    pub fn state(&self) -> &StateData {
        &self.state
    }

    /// State to render: the speculative branch when there is one.
    pub fn view(&self) -> &StateData {
        self.prediction.as_ref().map_or(&self.state, |p| &p.state)
    }

    /// Current speculative branch.
    pub fn prediction(&self) -> Option<&PredictedState> {
        self.prediction.as_ref()
    }

    /// Authoritative effects since the last call.
    pub fn take_effects(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.effects)
    }

    /// Highest tic our input is final for.
    pub fn last_input_tic(&self) -> u32 {
        self.last_input_tic
    }

    /// Event queues.
    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    /// Game tables in use.
    pub fn game_config(&self) -> &GameConfig {
        &self.game
    }

    /// Netcode tunables in use.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
