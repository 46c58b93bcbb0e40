//! Connection plumbing for an atomic broadcast node: authenticated framed
//! peer links over TCP, and the teardown signalling that lets a node wind
//! down every connection task before its loop returns.

mod connection;
mod shutdown;

pub use connection::{Connection, ConnectionError};
pub use shutdown::{Shutdown, ShutdownHandle, ShutdownSignal};
