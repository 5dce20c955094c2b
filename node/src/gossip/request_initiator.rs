//! Outbound side of the gossip exchange: bootstrap
//! connections to every configured peer and frame
//! transmission over the resulting registry.

use std::{
    io::{self, Write},
    net::{SocketAddr, TcpStream},
    thread,
    time::Duration,
};

use rand::Rng;
use tracing::{debug, warn};

use super::FanoutPolicy;

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Establishes an outbound connection to every peer in
/// `peers`, sweeping the list until each one is connected.
///
/// A failed attempt is logged and retried on the next sweep,
/// indefinitely and without backoff; the network is expected
/// to stabilize shortly after startup.
///
/// Returns the connection registry in peer-list order, so a
/// registry index identifies a peer for the whole lifetime
/// of the node.
pub(crate) fn connect_all(peers: &[SocketAddr]) -> Vec<(SocketAddr, TcpStream)> {
    let mut slots: Vec<Option<TcpStream>> = peers.iter().map(|_| None).collect();

    loop {
        let mut connected = 0;

        for (i, peer) in peers.iter().enumerate() {
            if slots[i].is_some() {
                connected += 1;
                continue;
            }

            match TcpStream::connect(peer) {
                Ok(stream) => {
                    debug!("connected to peer [{}]", peer);
                    slots[i] = Some(stream);
                    connected += 1;
                }
                Err(err) => {
                    warn!("cannot establish a connection to peer [{}]: {}", peer, err);
                }
            }
        }

        if connected == peers.len() {
            break;
        }

        thread::sleep(CONNECT_RETRY_INTERVAL);
    }

    peers
        .iter()
        .copied()
        .zip(slots.into_iter().map(|slot| slot.unwrap())) // Safe unwrap
        .collect()
}

/// Selects the registry indices a frame will be forwarded to
/// on the current cycle, according to `policy`.
///
/// `RandomSubset` draws a subset size uniformly between 1 and
/// `peer_count - 1` and samples that many distinct indices.
/// With fewer than two peers no non-empty proper subset
/// exists, so the selection degenerates to every peer.
pub(crate) fn select_fanout(policy: FanoutPolicy, peer_count: usize) -> Vec<usize> {
    match policy {
        FanoutPolicy::Broadcast => (0..peer_count).collect(),
        FanoutPolicy::RandomSubset => {
            if peer_count <= 1 {
                return (0..peer_count).collect();
            }

            let mut rng = rand::rng();
            let subset_size = rng.random_range(1..peer_count);

            rand::seq::index::sample(&mut rng, peer_count, subset_size).into_vec()
        }
    }
}

/// Writes one encoded frame to a peer connection.
pub(crate) fn send_frame(stream: &mut TcpStream, frame: &str) -> io::Result<()> {
    stream.write_all(frame.as_bytes())
}

#[cfg(test)]
mod fanout_selection_test {
    use super::super::FanoutPolicy;
    use super::select_fanout;

    #[test]
    fn random_subset_bounds_test() {
        for _ in 0..100 {
            let mut selection = select_fanout(FanoutPolicy::RandomSubset, 5);

            assert!(!selection.is_empty());
            assert!(selection.len() < 5);
            assert!(selection.iter().all(|index| *index < 5));

            let drawn = selection.len();
            selection.sort();
            selection.dedup();
            // Indices are distinct.
            assert_eq!(selection.len(), drawn);
        }
    }

    #[test]
    fn random_subset_single_peer_test() {
        assert_eq!(select_fanout(FanoutPolicy::RandomSubset, 1), [0]);
        assert!(select_fanout(FanoutPolicy::RandomSubset, 0).is_empty());
    }

    #[test]
    fn broadcast_selects_every_peer_test() {
        assert_eq!(select_fanout(FanoutPolicy::Broadcast, 3), [0, 1, 2]);
        assert!(select_fanout(FanoutPolicy::Broadcast, 0).is_empty());
    }
}
