//! Input Event Log
//!
//! Tick-indexed queues of [`ClientEvent`]s. Local events are what we
//! scheduled and must keep retransmitting until every peer confirms
//! them; received events are what peers told us and are only needed
//! until the authoritative tic passes them.

use crate::game::input::{ClientEvent, ClientId};

/// Local and received events, each ascending by tic.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    local: Vec<ClientEvent>,
    received: Vec<ClientEvent>,
}

impl EventLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a locally scheduled event.
    ///
    /// Scheduling only moves forward, so this is normally a push; an
    /// out-of-order tic is inserted after every event with a lower or
    /// equal tic.
    pub fn push_local(&mut self, event: ClientEvent) {
        let at = self.local.partition_point(|e| e.tic <= event.tic);
        self.local.insert(at, event);
    }

    /// Record an event from a peer. Returns `false` for a duplicate
    /// `(tic, client)`, which retransmission makes routine.
    pub fn insert_received(&mut self, event: ClientEvent) -> bool {
        let start = self.received.partition_point(|e| e.tic < event.tic);
        let end = self.received.partition_point(|e| e.tic <= event.tic);
        if self.received[start..end].iter().any(|e| e.client == event.client) {
            return false;
        }
        self.received.insert(end, event);
        true
    }

    /// Everything known for `tic`, local first.
    pub fn events_for(&self, tic: u32) -> Vec<ClientEvent> {
        let mut out = Vec::new();
        out.extend_from_slice(Self::slice_for(&self.local, tic));
        out.extend_from_slice(Self::slice_for(&self.received, tic));
        out
    }

    fn slice_for(list: &[ClientEvent], tic: u32) -> &[ClientEvent] {
        let start = list.partition_point(|e| e.tic < tic);
        let end = list.partition_point(|e| e.tic <= tic);
        &list[start..end]
    }

    /// Local events with `after < tic <= upto`.
    pub fn local_between(&self, after: u32, upto: u32) -> &[ClientEvent] {
        let start = self.local.partition_point(|e| e.tic <= after);
        let end = self.local.partition_point(|e| e.tic <= upto).max(start);
        &self.local[start..end]
    }

    /// Received events with `tic > after`, excluding `skip`'s own.
    pub fn received_after(&self, after: u32, skip: ClientId) -> impl Iterator<Item = &ClientEvent> + '_ {
        let start = self.received.partition_point(|e| e.tic <= after);
        self.received[start..].iter().filter(move |e| e.client != skip)
    }

    /// Drop local events with `tic <= upto`.
    pub fn prune_local(&mut self, upto: u32) -> usize {
        let n = self.local.partition_point(|e| e.tic <= upto);
        self.local.drain(..n);
        n
    }

    /// Drop received events with `tic <= upto`.
    pub fn prune_received(&mut self, upto: u32) -> usize {
        let n = self.received.partition_point(|e| e.tic <= upto);
        self.received.drain(..n);
        n
    }

    /// Local events still held.
    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    /// Received events still held.
    pub fn received_len(&self) -> usize {
        self.received.len()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.local.clear();
        self.received.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::input::ControlBits;

    fn btn(tic: u32, client: ClientId, bits: u32) -> ClientEvent {
        ClientEvent::buttons(tic, client, ControlBits(bits))
    }

    #[test]
    fn test_events_for_merges_lists() {
        let mut log = EventLog::new();
        log.push_local(btn(5, 1, 1));
        log.push_local(btn(6, 1, 2));
        log.insert_received(btn(5, 2, 3));
        log.insert_received(btn(7, 2, 4));

        let at5 = log.events_for(5);
        assert_eq!(at5.len(), 2);
        assert_eq!(at5[0].client, 1);
        assert_eq!(at5[1].client, 2);
        assert!(log.events_for(4).is_empty());
        assert_eq!(log.events_for(7), vec![btn(7, 2, 4)]);
    }

    #[test]
    fn test_received_dedup() {
        let mut log = EventLog::new();
        assert!(log.insert_received(btn(9, 2, 1)));
        assert!(!log.insert_received(btn(9, 2, 1)));
        assert!(log.insert_received(btn(9, 3, 1)));
        // Out of order arrival still lands sorted
        assert!(log.insert_received(btn(4, 2, 1)));
        assert_eq!(log.received_len(), 3);
        let tics: Vec<u32> = log.received_after(0, 0).map(|e| e.tic).collect();
        assert_eq!(tics, vec![4, 9, 9]);
    }

    #[test]
    fn test_local_window_and_prune() {
        let mut log = EventLog::new();
        for t in [3, 5, 8, 9] {
            log.push_local(btn(t, 1, t));
        }
        let window: Vec<u32> = log.local_between(3, 8).iter().map(|e| e.tic).collect();
        assert_eq!(window, vec![5, 8]);
        assert!(log.local_between(9, 3).is_empty());

        assert_eq!(log.prune_local(5), 2);
        assert_eq!(log.local_len(), 2);
        assert_eq!(log.prune_received(100), 0);
    }

    #[test]
    fn test_received_after_skips_client() {
        let mut log = EventLog::new();
        log.insert_received(btn(10, 2, 0));
        log.insert_received(btn(11, 3, 0));
        let out: Vec<ClientId> = log.received_after(9, 3).map(|e| e.client).collect();
        assert_eq!(out, vec![2]);
    }
}
