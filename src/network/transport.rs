//! Transport
//!
//! The session only needs a byte-in/byte-out channel per peer plus a
//! "connected" bit. Real deployments wrap a data channel; tests and the
//! demo use [`LoopbackNetwork`], an in-memory switch that can delay,
//! jitter, drop and cut links. Its randomness comes from its own
//! [`DeterministicRng`], so a given seed always replays the same
//! delivery schedule.

use std::collections::BTreeSet;

use tracing::trace;

use crate::core::rng::DeterministicRng;
use crate::game::input::ClientId;

/// Outgoing side of a datagram channel.
pub trait Transport {
    /// Best-effort send. May silently drop.
    fn send(&mut self, peer: ClientId, bytes: Vec<u8>);

    /// Whether the link to `peer` is up.
    fn is_connected(&self, peer: ClientId) -> bool;
}

/// Link impairments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkConditions {
    /// One-way delay in seconds
    pub latency: f64,
    /// Extra uniform delay in `[0, jitter)` seconds
    pub jitter: f64,
    /// Drop probability in `[0, 1]`
    pub loss: f64,
}

impl Default for LinkConditions {
    fn default() -> Self {
        Self {
            latency: 0.0,
            jitter: 0.0,
            loss: 0.0,
        }
    }
}

impl LinkConditions {
    /// Typical home broadband.
    pub fn lossy() -> Self {
        Self {
            latency: 0.040,
            jitter: 0.030,
            loss: 0.05,
        }
    }
}

/// A datagram ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Sender
    pub from: ClientId,
    /// Recipient
    pub to: ClientId,
    /// Payload
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
struct InFlight {
    deliver_at: f64,
    seq: u64,
    delivery: Delivery,
}

/// In-memory datagram switch.
#[derive(Debug)]
pub struct LoopbackNetwork {
    conditions: LinkConditions,
    rng: DeterministicRng,
    now: f64,
    seq: u64,
    down: BTreeSet<(ClientId, ClientId)>,
    in_flight: Vec<InFlight>,
    sent: u64,
    dropped: u64,
}

impl LoopbackNetwork {
    /// Network where every link shares `conditions`.
    pub fn new(conditions: LinkConditions, seed: u32) -> Self {
        Self {
            conditions,
            rng: DeterministicRng::new(seed),
            now: 0.0,
            seq: 0,
            down: BTreeSet::new(),
            in_flight: Vec::new(),
            sent: 0,
            dropped: 0,
        }
    }

    /// Sending half for one peer, stamping sends at `ts`.
    pub fn endpoint(&mut self, local: ClientId, ts: f64) -> LoopbackEndpoint<'_> {
        self.now = ts;
        LoopbackEndpoint { net: self, local }
    }

    /// Cut or restore the link between two peers, in both directions.
    pub fn set_connected(&mut self, a: ClientId, b: ClientId, up: bool) {
        let key = (a.min(b), a.max(b));
        if up {
            self.down.remove(&key);
        } else {
            self.down.insert(key);
        }
    }

    /// Whether `a` and `b` can talk.
    pub fn link_up(&self, a: ClientId, b: ClientId) -> bool {
        !self.down.contains(&(a.min(b), a.max(b)))
    }

    /// Take every datagram due by `ts`, in delivery order.
    pub fn poll(&mut self, ts: f64) -> Vec<Delivery> {
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.in_flight.drain(..).partition(|f| f.deliver_at <= ts);
        self.in_flight = pending;
        due.sort_by(|a, b| a.deliver_at.total_cmp(&b.deliver_at).then(a.seq.cmp(&b.seq)));
        due.into_iter()
            .filter(|f| self.link_up(f.delivery.from, f.delivery.to))
            .map(|f| f.delivery)
            .collect()
    }

    /// Datagrams accepted for sending so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Datagrams lost to injected loss or a cut link.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Datagrams still in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn unit(&mut self) -> f64 {
        self.rng.next_u32() as f64 / (u32::MAX as f64 + 1.0)
    }

    fn enqueue(&mut self, from: ClientId, to: ClientId, bytes: Vec<u8>) {
        self.sent += 1;
        if !self.link_up(from, to) || (self.conditions.loss > 0.0 && self.unit() < self.conditions.loss) {
            self.dropped += 1;
            trace!("Dropped datagram {} -> {} ({} bytes)", from, to, bytes.len());
            return;
        }
        let jitter = if self.conditions.jitter > 0.0 {
            self.unit() * self.conditions.jitter
        } else {
            0.0
        };
        self.seq += 1;
        self.in_flight.push(InFlight {
            deliver_at: self.now + self.conditions.latency + jitter,
            seq: self.seq,
            delivery: Delivery { from, to, bytes },
        });
    }
}

/// One peer's view of a [`LoopbackNetwork`].
pub struct LoopbackEndpoint<'a> {
    net: &'a mut LoopbackNetwork,
    local: ClientId,
}

impl Transport for LoopbackEndpoint<'_> {
    fn send(&mut self, peer: ClientId, bytes: Vec<u8>) {
        self.net.enqueue(self.local, peer, bytes);
    }

    fn is_connected(&self, peer: ClientId) -> bool {
        self.net.link_up(self.local, peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_link_delivers_in_order() {
        let mut net = LoopbackNetwork::new(LinkConditions::default(), 1);
        {
            let mut ep = net.endpoint(1, 0.0);
            ep.send(2, vec![1]);
            ep.send(2, vec![2]);
        }
        let got = net.poll(0.0);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].bytes, vec![1]);
        assert_eq!(got[1], Delivery { from: 1, to: 2, bytes: vec![2] });
        assert!(net.poll(1.0).is_empty());
    }

    #[test]
    fn test_latency_holds_packets() {
        let conditions = LinkConditions { latency: 0.1, ..Default::default() };
        let mut net = LoopbackNetwork::new(conditions, 1);
        net.endpoint(1, 0.0).send(2, vec![7]);
        assert!(net.poll(0.05).is_empty());
        assert_eq!(net.in_flight(), 1);
        assert_eq!(net.poll(0.1).len(), 1);
    }

    #[test]
    fn test_loss_is_deterministic() {
        let conditions = LinkConditions { loss: 0.5, ..Default::default() };
        let run = |seed| {
            let mut net = LoopbackNetwork::new(conditions, seed);
            for i in 0..200u8 {
                net.endpoint(1, 0.0).send(2, vec![i]);
            }
            net.poll(0.0).into_iter().map(|d| d.bytes[0]).collect::<Vec<_>>()
        };
        let a = run(9);
        assert_eq!(a, run(9));
        assert!(a.len() > 50 && a.len() < 150);
    }

    #[test]
    fn test_cut_link() {
        let mut net = LoopbackNetwork::new(LinkConditions::default(), 1);
        net.set_connected(2, 1, false);
        assert!(!net.endpoint(1, 0.0).is_connected(2));
        net.endpoint(1, 0.0).send(2, vec![1]);
        assert_eq!(net.dropped(), 1);
        net.set_connected(1, 2, true);
        assert!(net.link_up(2, 1));
    }
}
