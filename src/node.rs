use crate::error::{Error, Result};
use crate::handle::{Command, Handle};
use crate::registry::{PeerRegistry, Registry};
use crate::role::Role;
use crate::EventHandler;
use ab_codec::{Codec, Ident, Message, KEY_SIZE};
use ab_core::{Shutdown, ShutdownSignal};
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, error, info};

/// Cadence of the periodic tick driving registry cleanup, reconnects and the
/// role state machine.
const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Traffic and lifecycle reports funneled from every task onto the loop.
pub(crate) enum Event {
    Inbound { source: u64, message: Message },
    Accepted { stream: TcpStream },
    Connected { index: u64, stream: TcpStream },
    ConnectFailed { index: u64 },
    Closed { index: u64, conn: u64 },
}

type NodeRole = Role<PeerRegistry, Box<dyn EventHandler>>;

/// One cluster member. Configure with the builder-style setters, then call
/// [`run`](Node::run), which owns the calling thread until shutdown. All
/// interaction with a running node goes through its [`Handle`].
pub struct Node {
    id: u64,
    cluster_size: usize,
    round: u64,
    key: Option<[u8; KEY_SIZE]>,
    handler: Box<dyn EventHandler>,
    listener: Option<StdTcpListener>,
    listen_address: Option<String>,
    peer_addresses: Vec<String>,
    commands: mpsc::UnboundedSender<Command>,
    command_rx: mpsc::UnboundedReceiver<Command>,
}

impl Node {
    /// Creates a node. `id` must be nonzero and unique within the cluster;
    /// `cluster_size` counts every member including this one.
    pub fn new(id: u64, cluster_size: usize, handler: impl EventHandler + 'static) -> Result<Node> {
        if id == 0 {
            return Err(Error::InvalidId);
        }
        if cluster_size < 1 {
            return Err(Error::InvalidClusterSize);
        }
        let (commands, command_rx) = mpsc::unbounded_channel();
        Ok(Node {
            id,
            cluster_size,
            round: 0,
            key: None,
            handler: Box::new(handler),
            listener: None,
            listen_address: None,
            peer_addresses: Vec::new(),
            commands,
            command_rx,
        })
    }

    /// Restores the last committed round before the node runs. Recovery hook
    /// for hosts replaying their durable store.
    pub fn set_committed(&mut self, round: u64) {
        self.round = round;
    }

    /// Enables authenticated encryption with a shared 32-byte key. An empty
    /// key disables it.
    pub fn set_key(&mut self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            self.key = None;
            return Ok(());
        }
        if key.len() != KEY_SIZE {
            return Err(Error::InvalidKeyLength(key.len()));
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(key);
        self.key = Some(bytes);
        Ok(())
    }

    /// Binds the listener. `address` is IPv4 (`a.b.c.d:p`) or IPv6
    /// (`[addr]:p`); it is also the address announced to peers.
    pub fn listen(&mut self, address: &str) -> Result<()> {
        let parsed: SocketAddr = address
            .parse()
            .map_err(|_| Error::InvalidAddress(address.to_string()))?;
        let listener = StdTcpListener::bind(parsed)?;
        listener.set_nonblocking(true)?;
        self.listener = Some(listener);
        self.listen_address = Some(address.to_string());
        Ok(())
    }

    /// Queues an outbound connection to another cluster member, dialed once
    /// the node runs.
    pub fn connect_to_peer(&mut self, address: &str) -> Result<()> {
        let _: SocketAddr = address
            .parse()
            .map_err(|_| Error::InvalidAddress(address.to_string()))?;
        self.peer_addresses.push(address.to_string());
        Ok(())
    }

    pub fn handle(&self) -> Handle {
        Handle::new(self.commands.clone())
    }

    /// Drives the node until [`Handle::shutdown`]. Builds a single-threaded
    /// runtime: every peer, the registry and the role live on this thread,
    /// and all host callbacks fire on it.
    pub fn run(self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let local = tokio::task::LocalSet::new();
        local.block_on(&runtime, self.run_inner())
    }

    async fn run_inner(self) -> Result<()> {
        let Node {
            id,
            cluster_size,
            round,
            key,
            handler,
            listener,
            listen_address,
            peer_addresses,
            commands,
            mut command_rx,
        } = self;

        let std_listener = listener.ok_or(Error::MissingListenAddress)?;
        let listen_address = listen_address.unwrap_or_default();
        let codec = match &key {
            Some(key) => Codec::with_key(key).map_err(|_| Error::InvalidKeyLength(key.len()))?,
            None => Codec::new(),
        };
        let listener = TcpListener::from_std(std_listener)?;
        info!(id, cluster_size = cluster_size as u64, address = %listen_address, "node running");

        let clock = Instant::now();
        let (events, mut event_rx) = mpsc::unbounded_channel();
        let signal = ShutdownSignal::new();

        tokio::task::spawn_local(accept_loop(listener, events.clone(), signal.guard()));

        let registry = PeerRegistry::new(codec, events.clone(), signal.handle());
        let mut role: NodeRole = Role::new(registry, handler, id, cluster_size);
        role.set_committed(round);

        for address in peer_addresses {
            let ts = now_ns(&clock);
            role.registry_mut().connect(address, ts);
        }

        let ident = Message::Ident(Ident::new(id, listen_address));
        let mut tick = time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let ts = now_ns(&clock);
                    let registry = role.registry_mut();
                    registry.cleanup();
                    registry.reconnect_tick(ts);
                    role.periodic(ts);
                }
                Some(event) = event_rx.recv() => {
                    handle_event(&mut role, &ident, now_ns(&clock), event);
                }
                Some(command) = command_rx.recv() => {
                    match command {
                        Command::Append { content, callback } => {
                            role.append(now_ns(&clock), content, callback);
                        }
                        Command::ConfirmAppend(round) => role.confirm_append(round),
                        Command::Shutdown => break,
                    }
                }
            }
        }

        info!(state = ?role.state(), round = role.round(), "shutting down");
        role.shutdown();

        // The registry's shutdown handle and outbound queues go down with the
        // role; only then can the drain observe every task ending.
        drop(role);
        drop(events);
        drop(commands);
        drop(command_rx);
        signal.complete().await;
        Ok(())
    }
}

fn now_ns(clock: &Instant) -> u64 {
    clock.elapsed().as_nanos() as u64
}

fn handle_event(role: &mut NodeRole, ident: &Message, ts: u64, event: Event) {
    match event {
        Event::Accepted { stream } => {
            let index = role.registry_mut().accept(stream);
            role.registry_mut().send_to_index(index, ident);
        }
        Event::Connected { index, stream } => {
            if let Some(index) = role.registry_mut().finish_connect(index, stream) {
                role.registry_mut().send_to_index(index, ident);
            }
        }
        Event::ConnectFailed { index } => role.registry_mut().connect_failed(index),
        Event::Closed { index, conn } => role.registry_mut().close(index, conn, ts),
        Event::Inbound { source, message } => match message {
            Message::IdentRequest(_) => role.registry_mut().send_to_index(source, ident),
            Message::Ident(peer) => {
                role.registry_mut().set_identity(source, peer.id, peer.address)
            }
            Message::LeaderActive(msg) => role.handle_leader_active(ts, source, msg),
            Message::LeaderActiveAck(msg) => role.handle_leader_active_ack(ts, msg),
        },
    }
}

async fn accept_loop(
    listener: TcpListener,
    events: mpsc::UnboundedSender<Event>,
    mut shutdown: Shutdown,
) {
    loop {
        tokio::select! {
            res = listener.accept() => match res {
                Ok((stream, address)) => {
                    debug!(address = %address, "accepted connection");
                    if events.send(Event::Accepted { stream }).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    error!(error = %e, "failed to accept");
                    time::sleep(Duration::from_secs(1)).await;
                }
            },
            _ = shutdown.recv() => return,
        }
    }
}
