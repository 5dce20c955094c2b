//! Contains the gossip node runtime: connection bootstrap,
//! the sender loop over the outbound registry and the accept
//! loop feeding one receiver thread per inbound connection.

use std::{
    error::Error,
    io,
    net::{SocketAddr, TcpListener},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::gossip::{pool::MessagePool, request_handler, request_initiator, FanoutPolicy};

/// Pause between two forwarding cycles of the sender loop.
pub(crate) const CYCLE_INTERVAL: Duration = Duration::from_millis(100);

/// Idle-accept window of the connection listener. When no
/// connection arrives within the window, the condition is
/// reported and the window resets; the listener keeps
/// accepting for the whole lifetime of the node.
pub(crate) const ACCEPT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);
const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runtime parameters of a gossip node. The peer set is
/// fixed for the lifetime of the node.
pub(crate) struct NodeConfig {
    pub public_addr: SocketAddr,
    pub bind_port: u16,
    pub peers: Vec<SocketAddr>,
    pub propagation_rounds: i32,
    pub fanout: FanoutPolicy,
    pub cycle_interval: Duration,
    pub accept_idle_timeout: Duration,
}

/// A node that connects to its peers, disseminates the
/// records it was seeded with and merges the records it
/// receives, until every known message has been archived.
pub(crate) struct GossipNode {
    config: NodeConfig,
    pool: Arc<Mutex<MessagePool>>,
    shutdown: Arc<AtomicBool>,
}

impl GossipNode {
    /// Creates a node and seeds its pool with the given
    /// records, each under a fresh identifier with a full
    /// counter and the current node as origin.
    pub(crate) fn new(config: NodeConfig, records: Vec<String>) -> Self {
        let mut pool = MessagePool::new(config.propagation_rounds);

        for record in records {
            let identifier = pool.seed(config.public_addr, record);
            debug!("seeded message [{}]", identifier);
        }

        Self {
            config,
            pool: Arc::new(Mutex::new(pool)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs the node to completion: bootstrap, message
    /// exchange, termination and teardown.
    ///
    /// Returns the merged local database, sorted
    /// lexicographically.
    pub(crate) fn run(self) -> Result<Vec<String>, Box<dyn Error>> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.bind_port))
            .map_err(|err| format!("cannot establish a TCP local listener: {}", err))?;

        // Inbound acceptance is live from this point on, so
        // peers can complete their own bootstrap while this
        // node is still connecting outward.
        let accept_handle = {
            let pool = Arc::clone(&self.pool);
            let shutdown = Arc::clone(&self.shutdown);
            let idle_timeout = self.config.accept_idle_timeout;

            thread::spawn(move || accept_connections(listener, pool, shutdown, idle_timeout))
        };

        let peers = self.config.peers.clone();
        let connector = thread::spawn(move || request_initiator::connect_all(&peers));

        // Bootstrap barrier: no frame is sent before every
        // outbound connection is established.
        let mut registry = connector
            .join()
            .map_err(|_| "the peer connector thread panicked")?;

        info!("connected to all {} configured peers", registry.len());

        loop {
            let outgoing = {
                let mut pool_lock = self.pool.lock().unwrap();

                if pool_lock.is_settled() {
                    break;
                }

                pool_lock.advance_cycle()
            };

            for message in outgoing {
                let frame = message.to_frame();

                for index in request_initiator::select_fanout(self.config.fanout, registry.len()) {
                    let (peer, stream) = &mut registry[index];

                    match request_initiator::send_frame(stream, &frame) {
                        Ok(()) => {
                            debug!("sent message [{}] to [{}]", message.get_identifier(), peer);
                        }
                        Err(err) => {
                            // The counter was already decremented; the
                            // message stays in the pool and is retried
                            // on the next cycle.
                            warn!(
                                "could not send message [{}] to [{}]: {}",
                                message.get_identifier(),
                                peer,
                                err
                            );
                        }
                    }
                }
            }

            thread::sleep(self.config.cycle_interval);
        }

        info!("message pool settled, shutting down");

        self.shutdown.store(true, Ordering::Relaxed);

        accept_handle
            .join()
            .map_err(|_| "the listener thread panicked")?;

        let mut pool_lock = self.pool.lock().unwrap();

        Ok(pool_lock.take_sorted_payloads())
    }
}

/// Accept loop of the connection listener. Every accepted
/// connection gets a read timeout and a dedicated receiver
/// thread; receiver threads are joined when the loop exits.
///
/// An empty idle-accept window is reported and reset rather
/// than ending acceptance, so a slow peer can still connect
/// after a quiet spell.
fn accept_connections(
    listener: TcpListener,
    pool: Arc<Mutex<MessagePool>>,
    shutdown: Arc<AtomicBool>,
    idle_timeout: Duration,
) {
    if let Err(err) = listener.set_nonblocking(true) {
        warn!("cannot drive the local listener: {}", err);
        return;
    }

    info!("listening for inbound connections");

    let mut receivers: Vec<JoinHandle<()>> = Vec::new();
    let mut window_start = Instant::now();

    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                info!("received a connection from [{}]", peer_addr);

                if stream.set_nonblocking(false).is_err()
                    || stream
                        .set_read_timeout(Some(RECEIVE_POLL_INTERVAL))
                        .is_err()
                {
                    warn!("cannot configure the connection from [{}]", peer_addr);
                    continue;
                }

                let pool = Arc::clone(&pool);
                let shutdown = Arc::clone(&shutdown);

                receivers.push(thread::spawn(move || {
                    request_handler::handle_inbound_stream(stream, pool, shutdown)
                }));

                window_start = Instant::now();
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                if window_start.elapsed() >= idle_timeout {
                    warn!(
                        "no inbound connection within {:?}, resetting the accept window",
                        idle_timeout
                    );
                    window_start = Instant::now();
                }

                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) => {
                warn!("failed to accept an inbound connection: {}", err);
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }

    for receiver in receivers {
        let _ = receiver.join();
    }
}

#[cfg(test)]
mod gossip_node_convergence_test {
    use std::net::{SocketAddr, TcpListener};

    use super::*;

    /// Reserves distinct free loopback ports by binding
    /// throwaway listeners, released on return.
    fn reserve_loopback_addrs(count: usize) -> Vec<SocketAddr> {
        let listeners: Vec<TcpListener> = (0..count)
            .map(|_| TcpListener::bind("127.0.0.1:0").unwrap())
            .collect();

        listeners
            .iter()
            .map(|listener| listener.local_addr().unwrap())
            .collect()
    }

    /// Runs a fully-peered network of one node per record and
    /// returns each node's sorted database.
    fn run_network(records: &[&str], rounds: i32, fanout: FanoutPolicy) -> Vec<Vec<String>> {
        let addrs = reserve_loopback_addrs(records.len());

        let handles: Vec<_> = records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let peers: Vec<SocketAddr> = addrs
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, addr)| *addr)
                    .collect();

                let config = NodeConfig {
                    public_addr: addrs[i],
                    bind_port: addrs[i].port(),
                    peers,
                    propagation_rounds: rounds,
                    fanout,
                    cycle_interval: Duration::from_millis(20),
                    accept_idle_timeout: Duration::from_millis(250),
                };

                let record = record.to_string();

                thread::spawn(move || GossipNode::new(config, vec![record]).run().unwrap())
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    }

    #[test]
    fn fully_peered_network_converges_test() {
        // Three nodes, one record each, full broadcast: five
        // rounds are enough for every database to converge on
        // the union of all seeded records.
        for output in run_network(&["alpha", "beta", "gamma"], 5, FanoutPolicy::Broadcast) {
            assert_eq!(output, ["alpha", "beta", "gamma"]);
        }

        // Same network under randomized-subset forwarding; the
        // larger round count makes non-convergence vanishingly
        // unlikely.
        for output in run_network(&["alpha", "beta", "gamma"], 32, FanoutPolicy::RandomSubset) {
            assert_eq!(output, ["alpha", "beta", "gamma"]);
        }
    }
}
