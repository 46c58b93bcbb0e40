use super::{Leader, Role, State, ROUND_TIMEOUT};
use crate::registry::Registry;
use crate::EventHandler;
use ab_codec::{LeaderActive, Message};
use tracing::info;

impl<R: Registry, E: EventHandler> Role<R, E> {
    pub(super) fn periodic_potential_leader(&mut self, ts: u64) {
        let quorum = self.quorum();
        let potential = match &mut self.state {
            State::PotentialLeader(potential) => potential,
            _ => return,
        };

        if ts - potential.last_broadcast <= ROUND_TIMEOUT {
            return;
        }

        if potential.acks.len() >= quorum {
            let acks = std::mem::take(&mut potential.acks);
            let last_broadcast = potential.last_broadcast;
            self.state = State::Leader(Leader {
                last_broadcast,
                acks,
                pending_round: 0,
                callback: None,
            });
            info!(round = self.round + 1, "gained leadership");
            self.events.gained_leadership();
            // The new leader owns the next round.
            self.round += 1;
            return;
        }

        self.seq += 1;
        potential.acks.clear();
        let msg = Message::LeaderActive(LeaderActive::heartbeat(self.id, self.seq, self.round));
        self.registry.broadcast(&msg);
        potential.last_broadcast = ts;
    }
}
