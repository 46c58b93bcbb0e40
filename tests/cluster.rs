use ab_rs::{EventHandler, Handle, Node, APPEND_OK};
use std::collections::{HashMap, HashSet};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
enum ClusterEvent {
    Append { round: u64, data: Vec<u8> },
    Commit { round: u64 },
    GainedLeadership,
    LostLeadership,
    LeaderChange { leader: u64 },
}

/// Forwards every node event to the test thread, tagged with the node id.
struct Recorder {
    id: u64,
    events: mpsc::Sender<(u64, ClusterEvent)>,
}

impl EventHandler for Recorder {
    fn on_append(&mut self, round: u64, data: &[u8]) {
        let _ = self.events.send((
            self.id,
            ClusterEvent::Append {
                round,
                data: data.to_vec(),
            },
        ));
    }

    fn on_commit(&mut self, round: u64) {
        let _ = self.events.send((self.id, ClusterEvent::Commit { round }));
    }

    fn gained_leadership(&mut self) {
        let _ = self.events.send((self.id, ClusterEvent::GainedLeadership));
    }

    fn lost_leadership(&mut self) {
        let _ = self.events.send((self.id, ClusterEvent::LostLeadership));
    }

    fn on_leader_change(&mut self, leader: u64) {
        let _ = self
            .events
            .send((self.id, ClusterEvent::LeaderChange { leader }));
    }
}

fn free_addresses(count: usize) -> Vec<String> {
    (0..count)
        .map(|_| {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            format!("127.0.0.1:{}", listener.local_addr().unwrap().port())
        })
        .collect()
}

fn start_node(
    id: u64,
    cluster_size: usize,
    addresses: &[String],
    events: &mpsc::Sender<(u64, ClusterEvent)>,
) -> (Handle, thread::JoinHandle<()>) {
    let recorder = Recorder {
        id,
        events: events.clone(),
    };
    let mut node = Node::new(id, cluster_size, recorder).unwrap();
    let own = (id - 1) as usize;
    node.listen(&addresses[own]).unwrap();
    for (i, address) in addresses.iter().enumerate() {
        if i != own {
            node.connect_to_peer(address).unwrap();
        }
    }
    let handle = node.handle();
    let join = thread::spawn(move || node.run().unwrap());
    (handle, join)
}

/// Receives cluster events until `stop` returns true, auto-confirming every
/// append so followers can ack. Panics on timeout.
fn pump(
    events: &mpsc::Receiver<(u64, ClusterEvent)>,
    handles: &HashMap<u64, Handle>,
    timeout: Duration,
    mut stop: impl FnMut(u64, &ClusterEvent) -> bool,
) {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .expect("timed out waiting for cluster event");
        let (id, event) = events
            .recv_timeout(remaining)
            .expect("cluster event channel closed or timed out");
        if let ClusterEvent::Append { round, .. } = &event {
            handles[&id].confirm_append(*round);
        }
        if stop(id, &event) {
            return;
        }
    }
}

#[test]
fn three_nodes_elect_lowest_id_and_append() {
    let _ = tracing_subscriber::fmt::try_init();

    let addresses = free_addresses(3);
    let (events_tx, events) = mpsc::channel();
    let mut handles = HashMap::new();
    let mut joins = Vec::new();
    for id in 1..=3u64 {
        let (handle, join) = start_node(id, 3, &addresses, &events_tx);
        handles.insert(id, handle);
        joins.push(join);
    }

    // The lowest id must end up leading.
    pump(&events, &handles, Duration::from_secs(20), |id, event| {
        id == 1 && *event == ClusterEvent::GainedLeadership
    });

    let (status_tx, status_rx) = mpsc::channel();
    handles[&1].append(&b"hello"[..], move |status| {
        let _ = status_tx.send(status);
    });

    // Every follower sees the payload and, once confirmed, the commit for
    // that same round.
    let mut append_round = None;
    let mut committed = HashSet::new();
    pump(&events, &handles, Duration::from_secs(20), |id, event| {
        match event {
            ClusterEvent::Append { round, data } => {
                assert_eq!(data.as_slice(), b"hello");
                assert_ne!(id, 1, "only followers are handed the payload");
                append_round = Some(*round);
            }
            ClusterEvent::Commit { round } => {
                if append_round == Some(*round) {
                    committed.insert(id);
                }
            }
            _ => {}
        }
        committed.contains(&2) && committed.contains(&3)
    });

    let status = status_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("append callback never fired");
    assert_eq!(status, APPEND_OK);

    for handle in handles.values() {
        handle.shutdown();
    }
    for join in joins {
        join.join().unwrap();
    }
}

#[test]
fn single_node_leads_and_commits() {
    let _ = tracing_subscriber::fmt::try_init();

    let addresses = free_addresses(1);
    let (events_tx, events) = mpsc::channel();
    let (handle, join) = start_node(1, 1, &addresses, &events_tx);
    let mut handles = HashMap::new();
    handles.insert(1u64, handle.clone());

    pump(&events, &handles, Duration::from_secs(10), |id, event| {
        id == 1 && *event == ClusterEvent::GainedLeadership
    });

    let (status_tx, status_rx) = mpsc::channel();
    handle.append(&b"solo"[..], move |status| {
        let _ = status_tx.send(status);
    });
    let status = status_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("append callback never fired");
    assert_eq!(status, APPEND_OK);

    pump(&events, &handles, Duration::from_secs(10), |id, event| {
        id == 1 && matches!(event, ClusterEvent::Commit { .. })
    });

    handle.shutdown();
    join.join().unwrap();
}

#[test]
fn append_after_shutdown_fails_fast() {
    let _ = tracing_subscriber::fmt::try_init();

    let addresses = free_addresses(1);
    let (events_tx, events) = mpsc::channel();
    let (handle, join) = start_node(1, 1, &addresses, &events_tx);
    drop(events);

    handle.shutdown();
    join.join().unwrap();

    let (status_tx, status_rx) = mpsc::channel();
    handle.append(&b"late"[..], move |status| {
        let _ = status_tx.send(status);
    });
    let status = status_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("append callback never fired");
    assert_eq!(status, ab_rs::APPEND_FAILED);
}
