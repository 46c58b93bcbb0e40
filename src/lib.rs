//! Embeddable leader-based atomic broadcast.
//!
//! A cluster of nodes elects at most one active leader (the lowest id wins),
//! through which hosts submit messages that become totally ordered and are
//! delivered to every live node. The library owns the network plumbing and
//! ordering rules only; durability stays with the host, which must confirm
//! each append before it can commit.
//!
//! ```no_run
//! use ab_rs::{EventHandler, Node};
//!
//! struct Host;
//!
//! impl EventHandler for Host {
//!     fn on_append(&mut self, round: u64, data: &[u8]) {
//!         // store (round, data) durably, then confirm_append(round)
//!     }
//!     fn on_commit(&mut self, round: u64) {
//!         // the round is committed cluster-wide
//!     }
//! }
//!
//! let mut node = Node::new(1, 3, Host)?;
//! node.listen("127.0.0.1:2020")?;
//! node.connect_to_peer("127.0.0.1:2021")?;
//! node.connect_to_peer("127.0.0.1:2022")?;
//! let handle = node.handle();
//! node.run()?; // blocks until handle.shutdown()
//! # Ok::<(), ab_rs::Error>(())
//! ```

mod error;
mod handle;
mod node;
mod peer;
mod registry;
mod role;

pub use error::{Error, Result};
pub use handle::Handle;
pub use node::Node;
pub use registry::Registry;
pub use role::RoleKind;

pub mod codec {
    pub use ab_codec::*;
}

/// The append was committed by a majority.
pub const APPEND_OK: i32 = 0;
/// Not the leader, or leadership was lost before the append committed.
pub const APPEND_FAILED: i32 = -1;
/// Another append is still in flight; only one is allowed at a time.
pub const APPEND_BUSY: i32 = -2;

/// Completion callback for [`Handle::append`], invoked on the loop thread
/// with one of the `APPEND_*` status codes.
pub type AppendCallback = Box<dyn FnOnce(i32) + Send + 'static>;

/// Node events, invoked on the loop thread. Implementations must return
/// promptly and must not call back into the node except through a [`Handle`].
pub trait EventHandler: Send {
    /// A leader proposed `data` for `round`. The host must store it durably
    /// and then call [`Handle::confirm_append`] with the same round.
    fn on_append(&mut self, round: u64, data: &[u8]);

    /// `round` is committed: a strict majority confirmed it durable.
    fn on_commit(&mut self, round: u64);

    fn gained_leadership(&mut self) {}

    fn lost_leadership(&mut self) {}

    /// A new leader id was accepted; `0` means no leader is known.
    fn on_leader_change(&mut self, leader_id: u64) {
        let _ = leader_id;
    }
}

impl<T: EventHandler + ?Sized> EventHandler for Box<T> {
    fn on_append(&mut self, round: u64, data: &[u8]) {
        (**self).on_append(round, data)
    }

    fn on_commit(&mut self, round: u64) {
        (**self).on_commit(round)
    }

    fn gained_leadership(&mut self) {
        (**self).gained_leadership()
    }

    fn lost_leadership(&mut self) {
        (**self).lost_leadership()
    }

    fn on_leader_change(&mut self, leader_id: u64) {
        (**self).on_leader_change(leader_id)
    }
}
