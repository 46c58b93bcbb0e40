use super::{PotentialLeader, Role, State, HEARTBEAT_MIN, ROUND_TIMEOUT};
use crate::registry::Registry;
use crate::{EventHandler, APPEND_FAILED, APPEND_OK};
use ab_codec::{LeaderActive, Message};
use tracing::{debug, info};

impl<R: Registry, E: EventHandler> Role<R, E> {
    pub(super) fn periodic_leader(&mut self, ts: u64) {
        let quorum = self.quorum();
        let leader = match &mut self.state {
            State::Leader(leader) => leader,
            _ => return,
        };

        if leader.pending_round == 0 && ts - leader.last_broadcast < HEARTBEAT_MIN {
            return;
        }

        if leader.acks.len() >= quorum {
            let mut max_round = self.round;
            for round in leader.acks.values() {
                if *round > max_round {
                    max_round = *round;
                }
            }
            let votes = leader.acks.values().filter(|r| **r == max_round).count();

            if leader.pending_round > 0 {
                if self.cluster_size > 1 && (max_round != leader.pending_round || votes < quorum) {
                    // The proposed round did not gather a majority; step back
                    // and campaign again.
                    debug!(
                        pending = leader.pending_round,
                        max_round, "append did not reach quorum"
                    );
                    if let Some(callback) = leader.callback.take() {
                        callback(APPEND_FAILED);
                    }
                    self.state = State::PotentialLeader(PotentialLeader::new());
                    return;
                }
                if let Some(callback) = leader.callback.take() {
                    callback(APPEND_OK);
                }
                let committed = leader.pending_round;
                leader.pending_round = 0;
                if committed > self.round {
                    self.round = committed;
                    self.events.on_commit(committed);
                }
            } else if max_round > self.round {
                self.round = max_round;
                self.events.on_commit(max_round);
            }

            self.seq += 1;
            let round = if leader.pending_round > 0 {
                leader.pending_round
            } else {
                self.round
            };
            let msg = Message::LeaderActive(LeaderActive::heartbeat(self.id, self.seq, round));
            self.registry.broadcast(&msg);
            leader.last_broadcast = ts;
            leader.acks.clear();
            return;
        }

        if ts - leader.last_broadcast > ROUND_TIMEOUT {
            info!("lost leadership");
            if let Some(callback) = leader.callback.take() {
                callback(APPEND_FAILED);
            }
            self.events.lost_leadership();
            self.state = State::PotentialLeader(PotentialLeader::new());
        }
    }
}
