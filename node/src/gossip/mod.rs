//! Contains utilities related
//! to the gossip dissemination protocol.

use std::net::{IpAddr, SocketAddr};

use rand::Rng;

pub(crate) mod pool;
pub(crate) mod protocol;
pub(crate) mod request_handler;
pub(crate) mod request_initiator;

/// Number of forwarding rounds assigned to a message
/// when it enters the pool, unless overridden
/// through the CLI.
pub(crate) const DEFAULT_PROPAGATION_ROUNDS: i32 = 300;

pub(crate) const IDENTIFIER_BYTE_LENGTH: usize = 4;

/// Represents a single record disseminated through
/// the network, immutable after creation.
///
/// The identifier is shared by every copy of the
/// record in the network; the origin is the public
/// socket address of the node that seeded it,
/// carried verbatim on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GossipMessage {
    identifier: String,
    origin: String,
    payload: String,
}

impl GossipMessage {
    /// Creates a new gossip message originating from the
    /// current node, with a freshly generated identifier.
    ///
    /// The payload must not contain the frame delimiter `|`
    /// or a newline (the wire codec performs no escaping).
    pub(crate) fn new(origin: SocketAddr, payload: String) -> Self {
        Self {
            identifier: Self::generate_identifier(origin, &payload),
            origin: origin.to_string(),
            payload,
        }
    }

    /// Creates a gossip message from already
    /// established fields.
    pub(crate) fn create_from(identifier: String, origin: String, payload: String) -> Self {
        Self {
            identifier,
            origin,
            payload,
        }
    }

    /// Returns the message identifier.
    pub(crate) fn get_identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns the public socket address of the
    /// originating node, in `host:port` text form.
    pub(crate) fn get_origin(&self) -> &str {
        &self.origin
    }

    /// Returns the disseminated line of text.
    pub(crate) fn get_payload(&self) -> &str {
        &self.payload
    }

    /// Generates an identifier for a gossip message by hashing
    /// the origin socket address, the payload and a random
    /// nonce with the MD5 hash function, truncated to
    /// `IDENTIFIER_BYTE_LENGTH` bytes in hexadecimal format.
    fn generate_identifier(origin: SocketAddr, payload: &str) -> String {
        let mut digest_input = Vec::new();

        match origin.ip() {
            IpAddr::V4(ip_v4) => digest_input.extend_from_slice(&ip_v4.octets()),
            IpAddr::V6(ip_v6) => digest_input.extend_from_slice(&ip_v6.octets()),
        }

        digest_input.extend_from_slice(&origin.port().to_be_bytes());
        digest_input.extend_from_slice(payload.as_bytes());
        digest_input.extend_from_slice(&rand::rng().random::<u64>().to_be_bytes());

        let digest = md5::compute(&digest_input);

        hex::encode(&digest.0[..IDENTIFIER_BYTE_LENGTH])
    }
}

/// Peer-selection policy applied by the sender
/// on every forwarding cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FanoutPolicy {
    /// Forward to a random non-empty proper subset
    /// of the peer set.
    RandomSubset,
    /// Forward to every peer.
    Broadcast,
}
