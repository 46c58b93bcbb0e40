mod follower;
mod leader;
mod potential_leader;


use crate::registry::Registry;
use crate::{AppendCallback, EventHandler, APPEND_BUSY, APPEND_FAILED};
use ab_codec::{LeaderActive, LeaderActiveAck, Message};
use bytes::Bytes;
use std::collections::HashMap;
use tracing::info;

/// Minimum interval between leader heartbeats when idle, in nanoseconds.
pub(crate) const HEARTBEAT_MIN: u64 = 50_000_000;

/// Window for collecting a majority of acks before the current step fails.
pub(crate) const ROUND_TIMEOUT: u64 = 300_000_000;

/// Leader silence after which a follower promotes itself.
pub(crate) const FOLLOWER_TIMEOUT: u64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    Follower,
    PotentialLeader,
    Leader,
}

/// A follower tracks its accepted leader and at most one unconfirmed
/// proposal.
#[derive(Debug)]
pub(crate) struct Follower {
    /// The accepted leader's id, or 0 if none is known.
    current_leader: u64,
    /// Timestamp of the last accepted leader heartbeat; 0 until first armed.
    last_leader_active: u64,
    /// A proposed round awaiting the host's durability confirmation; 0 if
    /// none.
    pending_round: u64,
}

/// A potential leader campaigns by broadcasting until a majority acks one of
/// its rounds.
#[derive(Debug)]
pub(crate) struct PotentialLeader {
    last_broadcast: u64,
    /// Responding node id to the round it reported as committed.
    acks: HashMap<u64, u64>,
}

impl PotentialLeader {
    fn new() -> PotentialLeader {
        PotentialLeader {
            // Forces a broadcast on the next tick.
            last_broadcast: 0,
            acks: HashMap::new(),
        }
    }
}

/// A leader heartbeats the cluster and carries at most one in-flight append.
pub(crate) struct Leader {
    last_broadcast: u64,
    acks: HashMap<u64, u64>,
    /// `round + 1` while an append is in flight, else 0.
    pending_round: u64,
    callback: Option<AppendCallback>,
}

pub(crate) enum State {
    Follower(Follower),
    PotentialLeader(PotentialLeader),
    Leader(Leader),
}

/// The replication state machine. Driven by periodic ticks and decoded
/// inbound messages; its only outputs are sends through the registry and
/// events surfaced to the host.
pub(crate) struct Role<R, E> {
    id: u64,
    cluster_size: usize,
    /// The last round accepted as committed. Never decreases.
    round: u64,
    /// Heartbeat sequence correlating acks with the broadcast that elicited
    /// them.
    seq: u64,
    registry: R,
    events: E,
    state: State,
}

impl<R: Registry, E: EventHandler> Role<R, E> {
    pub(crate) fn new(registry: R, events: E, id: u64, cluster_size: usize) -> Role<R, E> {
        Role {
            id,
            cluster_size,
            round: 0,
            seq: 0,
            registry,
            events,
            state: State::Follower(Follower {
                current_leader: 0,
                last_leader_active: 0,
                pending_round: 0,
            }),
        }
    }

    pub(crate) fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    pub(crate) fn state(&self) -> RoleKind {
        match self.state {
            State::Follower(_) => RoleKind::Follower,
            State::PotentialLeader(_) => RoleKind::PotentialLeader,
            State::Leader(_) => RoleKind::Leader,
        }
    }

    pub(crate) fn round(&self) -> u64 {
        self.round
    }

    /// The majority threshold over the *other* cluster members.
    pub fn quorum(&self) -> usize {
        self.cluster_size / 2
    }

    /// Recovery hook: restores the committed round before the node runs.
    pub(crate) fn set_committed(&mut self, round: u64) {
        self.round = round;
    }

    pub(crate) fn periodic(&mut self, ts: u64) {
        match self.state() {
            RoleKind::Follower => self.periodic_follower(ts),
            RoleKind::PotentialLeader => self.periodic_potential_leader(ts),
            RoleKind::Leader => self.periodic_leader(ts),
        }
    }

    pub(crate) fn handle_leader_active(&mut self, ts: u64, source: u64, msg: LeaderActive) {
        match self.state() {
            RoleKind::Follower => {}
            RoleKind::PotentialLeader => {
                if msg.id >= self.id {
                    self.advance_round(msg.round);
                    return;
                }
                info!(leader = msg.id, "more authoritative node active, dropping to follower");
                self.become_follower(ts, msg.id);
                self.events.on_leader_change(msg.id);
            }
            RoleKind::Leader => {
                if msg.id >= self.id {
                    self.advance_round(msg.round);
                    return;
                }
                info!(leader = msg.id, "more authoritative node active, lost leadership");
                if let State::Leader(leader) = &mut self.state {
                    if let Some(callback) = leader.callback.take() {
                        callback(APPEND_FAILED);
                    }
                }
                self.events.lost_leadership();
                self.become_follower(ts, msg.id);
                self.events.on_leader_change(msg.id);
            }
        }
        self.follower_leader_active(ts, source, msg);
    }

    /// Commits any forward movement of the round; it never decreases.
    fn advance_round(&mut self, round: u64) {
        if round > self.round {
            self.round = round;
            self.events.on_commit(round);
        }
    }

    pub(crate) fn handle_leader_active_ack(&mut self, _ts: u64, msg: LeaderActiveAck) {
        let acks = match &mut self.state {
            State::Follower(_) => return,
            State::PotentialLeader(potential) => &mut potential.acks,
            State::Leader(leader) => &mut leader.acks,
        };
        // Acks for any other sequence are stale; they must not count.
        if msg.seq == self.seq {
            acks.insert(msg.id, msg.round);
        }
    }

    /// Proposes `content` for the next round. Only a leader with no append in
    /// flight may accept; everything else fails fast.
    pub(crate) fn append(&mut self, ts: u64, content: Bytes, callback: AppendCallback) {
        let leader = match &mut self.state {
            State::Leader(leader) => leader,
            _ => {
                callback(APPEND_FAILED);
                return;
            }
        };
        if leader.callback.is_some() {
            callback(APPEND_BUSY);
            return;
        }
        leader.callback = Some(callback);
        leader.pending_round = self.round + 1;
        self.seq += 1;
        let msg = Message::LeaderActive(LeaderActive::proposal(
            self.id,
            self.seq,
            self.round,
            self.round + 1,
            content,
        ));
        self.registry.broadcast(&msg);
        leader.last_broadcast = ts;
        leader.acks.clear();
    }

    /// The host confirmed durability for `round`. Acks the leader and clears
    /// the pending proposal; confirming anything else is a no-op.
    pub(crate) fn confirm_append(&mut self, round: u64) {
        let leader_id = match &mut self.state {
            State::Follower(follower) if round != 0 && follower.pending_round == round => {
                follower.pending_round = 0;
                follower.current_leader
            }
            _ => return,
        };
        let ack = LeaderActiveAck {
            id: self.id,
            seq: self.seq,
            round,
        };
        self.registry.send_to_id(leader_id, &Message::LeaderActiveAck(ack));
    }

    /// Fails any uncommitted proposal before teardown.
    pub(crate) fn shutdown(&mut self) {
        if let State::Leader(leader) = &mut self.state {
            if let Some(callback) = leader.callback.take() {
                callback(APPEND_FAILED);
            }
        }
    }

    fn become_follower(&mut self, ts: u64, leader: u64) {
        self.state = State::Follower(Follower {
            current_leader: leader,
            last_leader_active: ts,
            pending_round: 0,
        });
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &R {
        &self.registry
    }

    #[cfg(test)]
    pub(crate) fn events(&self) -> &E {
        &self.events
    }
}
