use tokio::sync::{broadcast, mpsc};

/// Owns a node's teardown sequence. The node loop creates one signal, hands
/// a [`ShutdownHandle`] to whatever spawns tasks after startup (the registry,
/// for reconnect dials), and gives every spawned task a [`Shutdown`] guard.
/// [`complete`](ShutdownSignal::complete) fires the signal and resolves once
/// every guard is gone, so the node returns only after each peer loop, dial
/// attempt and the accept loop has wound down.
#[derive(Debug)]
pub struct ShutdownSignal {
    notify: broadcast::Sender<()>,
    live: mpsc::UnboundedSender<()>,
    drained: mpsc::UnboundedReceiver<()>,
}

impl ShutdownSignal {
    pub fn new() -> ShutdownSignal {
        let (notify, _) = broadcast::channel(1);
        let (live, drained) = mpsc::unbounded_channel();
        ShutdownSignal {
            notify,
            live,
            drained,
        }
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            notify: self.notify.clone(),
            live: self.live.clone(),
        }
    }

    pub fn guard(&self) -> Shutdown {
        Shutdown {
            fired: false,
            notify: self.notify.subscribe(),
            _live: self.live.clone(),
        }
    }

    /// Fires the signal, then waits for every outstanding guard to drop.
    /// Callers must release their own [`ShutdownHandle`]s first or this
    /// never resolves.
    pub async fn complete(mut self) {
        let _ = self.notify.send(());
        drop(self.live);
        while self.drained.recv().await.is_some() {}
    }
}

impl Default for ShutdownSignal {
    fn default() -> ShutdownSignal {
        ShutdownSignal::new()
    }
}

/// Mints task guards; held by components that keep spawning connection
/// tasks while the node runs.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    notify: broadcast::Sender<()>,
    live: mpsc::UnboundedSender<()>,
}

impl ShutdownHandle {
    pub fn guard(&self) -> Shutdown {
        Shutdown {
            fired: false,
            notify: self.notify.subscribe(),
            _live: self.live.clone(),
        }
    }
}

/// Carried by one task and polled in its select loop; `recv` completes when
/// the node begins teardown. Dropping the guard — which the task does simply
/// by exiting — is what lets the node's drain finish.
#[derive(Debug)]
pub struct Shutdown {
    fired: bool,
    notify: broadcast::Receiver<()>,
    _live: mpsc::UnboundedSender<()>,
}

impl Shutdown {
    pub async fn recv(&mut self) {
        if self.fired {
            return;
        }
        let _ = self.notify.recv().await;
        self.fired = true;
    }
}
