use crate::node::Event;
use ab_core::{Connection, Shutdown};
use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

/// One registry slot: the bookkeeping for a single remote, whether or not a
/// connection is currently live. `conn` is a generation token identifying the
/// attached connection, so a close reported by a superseded connection cannot
/// deactivate its replacement.
#[derive(Debug, Default)]
pub(crate) struct Peer {
    pub(crate) index: u64,
    pub(crate) id: u64,
    pub(crate) address: Option<String>,
    pub(crate) active: bool,
    pub(crate) valid: bool,
    pub(crate) connecting: bool,
    pub(crate) conn: u64,
    pub(crate) last_reconnect: u64,
    pub(crate) outbound: Option<mpsc::UnboundedSender<Bytes>>,
}

impl Peer {
    /// Neither connected nor reconnectable; the registry may reap this slot.
    pub(crate) fn done(&self) -> bool {
        !self.active && !self.valid
    }

    /// Queues a packed frame for the connection task. A send on an inactive
    /// peer is a no-op.
    pub(crate) fn send(&mut self, frame: Bytes) {
        if !self.active {
            return;
        }
        if let Some(outbound) = &self.outbound {
            if outbound.send(frame).is_err() {
                self.active = false;
            }
        }
    }
}

/// Drives one established connection: decoded inbound messages are injected
/// into the node loop, queued outbound frames are written to the socket.
pub(crate) async fn run_peer(
    index: u64,
    conn: u64,
    mut connection: Connection,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    events: mpsc::UnboundedSender<Event>,
    mut shutdown: Shutdown,
) {
    loop {
        tokio::select! {
            res = connection.read_message() => match res {
                Ok(Some(message)) => {
                    if events.send(Event::Inbound { source: index, message }).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(peer = index, error = %e, "peer read failed");
                    break;
                }
            },
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = connection.write_frame(&frame).await {
                        debug!(peer = index, error = %e, "peer write failed");
                        break;
                    }
                }
                // The registry dropped our sender: this connection has been
                // superseded.
                None => break,
            },
            _ = shutdown.recv() => return,
        }
    }
    let _ = events.send(Event::Closed { index, conn });
}

/// Dials a remote and reports the outcome to the node loop.
pub(crate) async fn connect_peer(
    index: u64,
    address: String,
    events: mpsc::UnboundedSender<Event>,
    mut shutdown: Shutdown,
) {
    tokio::select! {
        res = TcpStream::connect(&address[..]) => {
            let event = match res {
                Ok(stream) => Event::Connected { index, stream },
                Err(e) => {
                    debug!(peer = index, address = %address, error = %e, "connect failed");
                    Event::ConnectFailed { index }
                }
            };
            let _ = events.send(event);
        }
        _ = shutdown.recv() => {}
    }
}
