//! Per-peer bookkeeping.

use crate::game::input::ClientId;
use crate::game::state::Fingerprint;

/// What we know about one remote peer.
#[derive(Debug, Clone)]
pub struct Client {
    /// Peer id
    pub id: ClientId,
    /// Highest input tic fully received from this peer
    pub tic: u32,
    /// Highest input tic this peer has announced, gaps or not. Bounds
    /// how far its simulation could have run.
    pub remote_tic: u32,
    /// Highest tic of our input this peer has confirmed
    pub acknowledged_tic: u32,
    /// Peer reports an authoritative state
    pub ready: bool,
    /// Peer is connected and recently heard from
    pub is_playing: bool,
    /// Wall-clock time of the last good packet
    pub last_packet_at: f64,
    /// Consecutive undecodable packets
    pub decode_errors: u32,
    /// Most recent debug fingerprint from this peer
    pub last_fingerprint: Option<Fingerprint>,
    /// Whether `last_fingerprint` was compared yet
    pub fingerprint_checked: bool,
    /// Our resend to this peer is cut to the run window
    pub resend_truncated: bool,
}

impl Client {
    /// New peer, assumed playing until proven otherwise.
    pub fn new(id: ClientId, ts: f64) -> Self {
        Self {
            id,
            tic: 0,
            remote_tic: 0,
            acknowledged_tic: 0,
            ready: false,
            is_playing: true,
            last_packet_at: ts,
            decode_errors: 0,
            last_fingerprint: None,
            fingerprint_checked: true,
            resend_truncated: false,
        }
    }

    /// Counts toward the net tic.
    #[inline]
    pub fn is_eligible(&self) -> bool {
        self.ready && self.is_playing
    }

    /// Raise the ack. Never lowers it; returns whether it moved.
    pub fn acknowledge(&mut self, tic: u32) -> bool {
        if tic > self.acknowledged_tic {
            self.acknowledged_tic = tic;
            true
        } else {
            false
        }
    }

    /// Raise the received tic. Never lowers it.
    pub fn note_received(&mut self, tic: u32) {
        self.tic = self.tic.max(tic);
    }

    /// Raise the announced tic. Never lowers it.
    pub fn note_announced(&mut self, tic: u32) {
        self.remote_tic = self.remote_tic.max(tic);
    }

    /// A good packet arrived.
    pub fn touch(&mut self, ts: f64) {
        self.last_packet_at = ts;
        self.decode_errors = 0;
        self.is_playing = true;
    }

    /// Mark stale after `timeout` seconds of silence. Returns true on the
    /// transition.
    pub fn check_timeout(&mut self, ts: f64, timeout: f64) -> bool {
        if self.is_playing && ts - self.last_packet_at > timeout {
            self.is_playing = false;
            true
        } else {
            false
        }
    }

    /// Store a fingerprint for later comparison.
    pub fn record_fingerprint(&mut self, fp: Fingerprint) {
        self.last_fingerprint = Some(fp);
        self.fingerprint_checked = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_is_max_only() {
        let mut c = Client::new(2, 0.0);
        assert!(c.acknowledge(10));
        assert!(!c.acknowledge(7));
        assert!(!c.acknowledge(10));
        assert_eq!(c.acknowledged_tic, 10);

        c.note_received(5);
        c.note_received(3);
        assert_eq!(c.tic, 5);

        c.note_announced(40);
        c.note_announced(12);
        assert_eq!(c.remote_tic, 40);
        assert_eq!(c.tic, 5);
    }

    #[test]
    fn test_timeout_and_restore() {
        let mut c = Client::new(2, 1.0);
        c.ready = true;
        assert!(c.is_eligible());
        assert!(!c.check_timeout(3.0, 5.0));
        assert!(c.check_timeout(6.5, 5.0));
        assert!(!c.is_eligible());
        // Only reported once
        assert!(!c.check_timeout(9.0, 5.0));

        c.decode_errors = 3;
        c.touch(9.0);
        assert!(c.is_eligible());
        assert_eq!(c.decode_errors, 0);
    }
}
