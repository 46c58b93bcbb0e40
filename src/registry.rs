use crate::node::Event;
use crate::peer::{self, Peer};
use ab_codec::{Codec, Message};
use ab_core::{Connection, ShutdownHandle};
use bytes::Bytes;
use std::collections::HashMap;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Reconnection attempts to a valid peer are spaced at least this far apart.
const RECONNECT_INTERVAL: u64 = 3_000_000_000;

/// The outbound surface the role state machine sees. Keeping it abstract
/// makes the state machine drivable without sockets.
pub trait Registry {
    fn send_to_index(&mut self, index: u64, message: &Message);
    fn send_to_id(&mut self, id: u64, message: &Message);
    fn broadcast(&mut self, message: &Message);
}

/// Owns every peer slot and their connection tasks. Lives on the loop thread;
/// all task I/O is funneled back through the node's event channel.
pub(crate) struct PeerRegistry {
    codec: Codec,
    peers: HashMap<u64, Peer>,
    /// Indices retired by identity dedup, routed to their canonical slot.
    aliases: HashMap<u64, u64>,
    next_token: u64,
    events: mpsc::UnboundedSender<Event>,
    shutdown: ShutdownHandle,
}

impl PeerRegistry {
    pub(crate) fn new(
        codec: Codec,
        events: mpsc::UnboundedSender<Event>,
        shutdown: ShutdownHandle,
    ) -> PeerRegistry {
        PeerRegistry {
            codec,
            peers: HashMap::new(),
            aliases: HashMap::new(),
            next_token: 0,
            events,
            shutdown,
        }
    }

    fn next_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn resolve(&self, index: u64) -> u64 {
        *self.aliases.get(&index).unwrap_or(&index)
    }

    pub(crate) fn register(&mut self, mut peer: Peer) -> u64 {
        let index = self.next_token();
        peer.index = index;
        self.peers.insert(index, peer);
        index
    }

    /// Registers an accepted inbound connection; it is active immediately.
    pub(crate) fn accept(&mut self, stream: TcpStream) -> u64 {
        let index = self.register(Peer::default());
        self.attach(index, stream);
        index
    }

    /// Registers an outbound peer and starts dialing it.
    pub(crate) fn connect(&mut self, address: String, now: u64) -> u64 {
        let index = self.register(Peer {
            address: Some(address.clone()),
            valid: true,
            connecting: true,
            last_reconnect: now,
            ..Peer::default()
        });
        self.spawn_connect(index, address);
        index
    }

    fn spawn_connect(&self, index: u64, address: String) {
        let events = self.events.clone();
        let shutdown = self.shutdown.guard();
        tokio::task::spawn_local(peer::connect_peer(index, address, events, shutdown));
    }

    /// Binds a live stream to a slot and spawns its connection task.
    fn attach(&mut self, index: u64, stream: TcpStream) {
        let conn = self.next_token();
        let connection = Connection::new(stream, self.codec.clone());
        let events = self.events.clone();
        let shutdown = self.shutdown.guard();
        let peer = match self.peers.get_mut(&index) {
            Some(peer) => peer,
            None => return,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        peer.outbound = Some(tx);
        peer.active = true;
        peer.connecting = false;
        peer.conn = conn;
        tokio::task::spawn_local(peer::run_peer(index, conn, connection, rx, events, shutdown));
    }

    /// Completes an outbound dial. Returns the canonical index the stream was
    /// attached to, or `None` if the slot was superseded in the meantime.
    pub(crate) fn finish_connect(&mut self, index: u64, stream: TcpStream) -> Option<u64> {
        let index = self.resolve(index);
        match self.peers.get_mut(&index) {
            Some(peer) if !peer.active => peer.connecting = false,
            _ => return None,
        }
        self.attach(index, stream);
        Some(index)
    }

    pub(crate) fn connect_failed(&mut self, index: u64) {
        let index = self.resolve(index);
        if let Some(peer) = self.peers.get_mut(&index) {
            peer.connecting = false;
        }
    }

    /// Deactivates a slot when its connection task ends. Ignored if `conn`
    /// doesn't match the slot's current generation (a stale report from a
    /// connection that dedup already replaced).
    pub(crate) fn close(&mut self, index: u64, conn: u64, now: u64) {
        let index = self.resolve(index);
        if let Some(peer) = self.peers.get_mut(&index) {
            if peer.conn != conn {
                return;
            }
            peer.active = false;
            peer.outbound = None;
            peer.last_reconnect = now;
            debug!(peer = index, "peer disconnected");
        }
    }

    /// Records a peer's identity once its `Ident` arrives. If an older slot
    /// already holds this id or address, that slot absorbs the new connection
    /// so references to the original index keep working, and the duplicate is
    /// reaped.
    pub(crate) fn set_identity(&mut self, index: u64, id: u64, address: String) {
        if id == 0 {
            return;
        }
        let index = self.resolve(index);
        match self.peers.get_mut(&index) {
            Some(peer) => {
                peer.id = id;
                peer.address = Some(address.clone());
                peer.valid = true;
            }
            None => return,
        }

        let canonical = self
            .peers
            .iter()
            .filter(|(i, p)| {
                **i < index && (p.id == id || p.address.as_deref() == Some(address.as_str()))
            })
            .map(|(i, _)| *i)
            .min();

        if let Some(older) = canonical {
            debug!(id, old = older, new = index, "duplicate peer, keeping original slot");
            let mut newer = match self.peers.remove(&index) {
                Some(peer) => peer,
                None => return,
            };
            if let Some(slot) = self.peers.get_mut(&older) {
                // Dropping the old outbound sender ends the superseded
                // connection's task.
                slot.id = id;
                slot.address = newer.address.take();
                slot.valid = true;
                slot.active = newer.active;
                slot.conn = newer.conn;
                slot.outbound = newer.outbound.take();
                self.aliases.insert(index, older);
                for target in self.aliases.values_mut() {
                    if *target == index {
                        *target = older;
                    }
                }
            }
        }
    }

    /// Reaps slots that are neither connected nor reconnectable.
    pub(crate) fn cleanup(&mut self) {
        self.peers.retain(|index, peer| {
            if peer.done() {
                debug!(peer = index, "reaping peer");
                false
            } else {
                true
            }
        });
        let peers = &self.peers;
        self.aliases.retain(|_, target| peers.contains_key(target));
    }

    /// Redials valid-but-inactive peers, at most once per 3 seconds each.
    pub(crate) fn reconnect_tick(&mut self, now: u64) {
        let mut attempts = Vec::new();
        for peer in self.peers.values_mut() {
            if peer.active || !peer.valid || peer.connecting {
                continue;
            }
            if now.saturating_sub(peer.last_reconnect) <= RECONNECT_INTERVAL {
                continue;
            }
            let address = match &peer.address {
                Some(address) => address.clone(),
                None => continue,
            };
            peer.last_reconnect = now;
            peer.connecting = true;
            attempts.push((peer.index, address));
        }
        for (index, address) in attempts {
            debug!(peer = index, address = %address, "attempting reconnect");
            self.spawn_connect(index, address);
        }
    }

    /// The smallest known peer id greater than or equal to `id`, or 0 if
    /// none: the next trust candidate in authority order. Nothing in the
    /// replication rules consumes it yet.
    #[allow(dead_code)]
    pub(crate) fn trusted_after(&self, id: u64) -> u64 {
        self.peers
            .values()
            .map(|peer| peer.id)
            .filter(|peer_id| *peer_id != 0 && *peer_id >= id)
            .min()
            .unwrap_or(0)
    }

    fn pack(&mut self, message: &Message) -> Option<Bytes> {
        match self.codec.encode(message) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(error = %e, "failed to encode message");
                None
            }
        }
    }
}

impl Registry for PeerRegistry {
    fn send_to_index(&mut self, index: u64, message: &Message) {
        let index = self.resolve(index);
        let frame = match self.pack(message) {
            Some(frame) => frame,
            None => return,
        };
        if let Some(peer) = self.peers.get_mut(&index) {
            peer.send(frame);
        }
    }

    fn send_to_id(&mut self, id: u64, message: &Message) {
        let frame = match self.pack(message) {
            Some(frame) => frame,
            None => return,
        };
        for peer in self.peers.values_mut() {
            if peer.id == id {
                peer.send(frame.clone());
            }
        }
    }

    fn broadcast(&mut self, message: &Message) {
        let frame = match self.pack(message) {
            Some(frame) => frame,
            None => return,
        };
        for peer in self.peers.values_mut() {
            peer.send(frame.clone());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ab_codec::Ident;
    use ab_core::ShutdownSignal;

    fn registry() -> (PeerRegistry, mpsc::UnboundedReceiver<Event>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let signal = ShutdownSignal::new();
        (
            PeerRegistry::new(Codec::new(), events, signal.handle()),
            event_rx,
        )
    }

    #[test]
    fn indices_are_monotonic() {
        let (mut registry, _rx) = registry();
        let first = registry.register(Peer::default());
        let second = registry.register(Peer::default());
        assert!(second > first);
    }

    #[test]
    fn identity_dedup_keeps_original_slot() {
        let (mut registry, _rx) = registry();
        let older = registry.register(Peer {
            active: true,
            ..Peer::default()
        });
        let newer = registry.register(Peer {
            active: true,
            ..Peer::default()
        });
        registry.set_identity(older, 9, "127.0.0.1:9000".into());
        registry.set_identity(newer, 9, "127.0.0.1:9000".into());

        assert!(registry.peers.contains_key(&older));
        assert!(!registry.peers.contains_key(&newer));
        assert_eq!(registry.resolve(newer), older);
        assert_eq!(registry.peers[&older].id, 9);

        // Traffic for the retired index reaches the canonical slot.
        registry.send_to_index(newer, &Message::IdentRequest(Ident::new(1, "")));
    }

    #[test]
    fn stale_close_does_not_deactivate_replacement() {
        let (mut registry, _rx) = registry();
        let older = registry.register(Peer {
            active: true,
            conn: 101,
            ..Peer::default()
        });
        let newer = registry.register(Peer {
            active: true,
            conn: 202,
            ..Peer::default()
        });
        registry.set_identity(older, 4, "127.0.0.1:9000".into());
        registry.set_identity(newer, 4, "127.0.0.1:9001".into());

        // The superseded connection (generation 101) reports closure.
        registry.close(older, 101, 5_000_000_000);
        assert!(registry.peers[&older].active);

        // The live connection's generation does deactivate the slot.
        registry.close(newer, 202, 6_000_000_000);
        assert!(!registry.peers[&older].active);
    }

    #[test]
    fn cleanup_reaps_done_slots() {
        let (mut registry, _rx) = registry();
        let dead = registry.register(Peer::default());
        let live = registry.register(Peer {
            valid: true,
            ..Peer::default()
        });
        registry.cleanup();
        assert!(!registry.peers.contains_key(&dead));
        assert!(registry.peers.contains_key(&live));
    }

    #[test]
    fn trusted_after_picks_smallest_id_at_or_above() {
        let (mut registry, _rx) = registry();
        for id in [5u64, 3, 8] {
            let index = registry.register(Peer {
                active: true,
                ..Peer::default()
            });
            registry.set_identity(index, id, format!("127.0.0.1:{}", 9000 + id));
        }
        assert_eq!(registry.trusted_after(1), 3);
        assert_eq!(registry.trusted_after(4), 5);
        assert_eq!(registry.trusted_after(6), 8);
        assert_eq!(registry.trusted_after(9), 0);
    }
}
