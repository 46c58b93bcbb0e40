use super::{PotentialLeader, Role, State, FOLLOWER_TIMEOUT};
use crate::registry::Registry;
use crate::EventHandler;
use ab_codec::{LeaderActive, LeaderActiveAck, Message};
use tracing::debug;

impl<R: Registry, E: EventHandler> Role<R, E> {
    pub(super) fn periodic_follower(&mut self, ts: u64) {
        let follower = match &mut self.state {
            State::Follower(follower) => follower,
            _ => return,
        };

        if follower.last_leader_active == 0 {
            follower.last_leader_active = ts;
            return;
        }

        if ts - follower.last_leader_active > FOLLOWER_TIMEOUT {
            debug!("leader timed out, promoting to potential leader");
            let had_leader = follower.current_leader != 0;
            self.state = State::PotentialLeader(PotentialLeader::new());
            if had_leader {
                self.events.on_leader_change(0);
            }
        }
    }

    pub(super) fn follower_leader_active(&mut self, ts: u64, source: u64, msg: LeaderActive) {
        let follower = match &mut self.state {
            State::Follower(follower) => follower,
            _ => return,
        };

        if msg.id > self.id {
            // A less authoritative node believes it leads. Catch up on its
            // round, but whatever it proposed earlier is abandoned.
            follower.pending_round = 0;
            if msg.round > self.round {
                self.round = msg.round;
                self.events.on_commit(msg.round);
            }
            return;
        }

        if follower.current_leader > msg.id || follower.current_leader == 0 {
            follower.current_leader = msg.id;
            follower.pending_round = 0;
            self.events.on_leader_change(msg.id);
        } else if follower.current_leader < msg.id {
            return;
        }

        if msg.round > self.round {
            self.round = msg.round;
            self.events.on_commit(msg.round);
        }

        if follower.pending_round != 0 {
            // A prior proposal still awaits the host's confirmation; nothing
            // can be acked until it resolves.
            return;
        }

        if msg.next != 0 {
            // An append proposal. The ack waits for confirm_append, carrying
            // this broadcast's sequence.
            self.seq = msg.seq;
            follower.pending_round = msg.next;
            self.events.on_append(msg.next, &msg.next_content);
            return;
        }

        let ack = LeaderActiveAck {
            id: self.id,
            seq: msg.seq,
            round: self.round,
        };
        self.registry
            .send_to_index(source, &Message::LeaderActiveAck(ack));
        follower.last_leader_active = ts;
    }
}
