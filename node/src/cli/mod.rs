//! Utilities for the Command Line Interface (CLI)
//! that represents a gossip node.

use std::{env, error::Error, net::SocketAddr};

use crate::gossip::{FanoutPolicy, DEFAULT_PROPAGATION_ROUNDS};

/// Contains the different arguments,
/// required to run a gossip node.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Args {
    data_path: String,
    self_port: u16,
    public_addr: SocketAddr,
    peers: Vec<SocketAddr>,
    rounds: i32,
    fanout: FanoutPolicy,
}

impl Args {
    /// Parses all received arguments, performs types
    /// verification and builds an `Args` instance.
    ///
    /// Expected form:
    /// `data=<file> self-port=<port> public-addr=<host:port>
    /// peers=<host:port>,... [rounds=<n>] [fanout=subset|broadcast]`
    pub(crate) fn parse() -> Result<Self, Box<dyn Error>> {
        let mut args = env::args().skip(1);

        let data_arg = args.next().ok_or("data argument is missing")?;
        let data_path = data_arg
            .strip_prefix("data=")
            .filter(|path| !path.is_empty())
            .ok_or("data argument is missing or invalid")?
            .to_string();

        let self_port_arg = args.next().ok_or("self-port argument is missing")?;
        let self_port = self_port_arg
            .strip_prefix("self-port=")
            .ok_or("self-port argument is missing or invalid")?
            .parse::<u16>()
            .map_err(|_| "self-port argument is missing or invalid")?;

        let public_addr_arg = args.next().ok_or("public-addr argument is missing")?;
        let public_addr = public_addr_arg
            .strip_prefix("public-addr=")
            .ok_or("public-addr argument is missing or invalid")?
            .parse::<SocketAddr>()
            .map_err(|_| "public-addr argument is missing or invalid")?;

        let peers_arg = args.next().ok_or("peers argument is missing")?;
        let peers_value = peers_arg
            .strip_prefix("peers=")
            .ok_or("peers argument is missing or invalid")?;

        let mut peers = Vec::new();

        for peer in peers_value.split(',') {
            peers.push(
                peer.parse::<SocketAddr>()
                    .map_err(|_| "peers argument contains an invalid socket address")?,
            );
        }

        let mut rounds = DEFAULT_PROPAGATION_ROUNDS;
        let mut fanout = FanoutPolicy::RandomSubset;

        for extra_arg in args {
            if let Some(rounds_value) = extra_arg.strip_prefix("rounds=") {
                rounds = rounds_value
                    .parse::<i32>()
                    .map_err(|_| "rounds argument invalid")?;

                if rounds < 1 {
                    return Err(From::from("rounds argument invalid"));
                }
            } else if let Some(fanout_value) = extra_arg.strip_prefix("fanout=") {
                fanout = match fanout_value {
                    "subset" => FanoutPolicy::RandomSubset,
                    "broadcast" => FanoutPolicy::Broadcast,
                    _ => return Err(From::from("fanout argument invalid")),
                };
            } else {
                return Err(From::from("invalid argument(s)"));
            }
        }

        Ok(Self {
            data_path,
            self_port,
            public_addr,
            peers,
            rounds,
            fanout,
        })
    }

    /// Gets the value of the `data` argument.
    pub(crate) fn get_data_path(&self) -> &str {
        &self.data_path
    }

    /// Gets the value of the `self-port` argument.
    pub(crate) fn get_self_port(&self) -> u16 {
        self.self_port
    }

    /// Gets the value of the `public-addr` argument.
    pub(crate) fn get_public_addr(&self) -> SocketAddr {
        self.public_addr
    }

    /// Gets the value of the `peers` argument.
    pub(crate) fn get_peers(&self) -> &[SocketAddr] {
        &self.peers
    }

    /// Gets the value of the `rounds` argument,
    /// or its default.
    pub(crate) fn get_rounds(&self) -> i32 {
        self.rounds
    }

    /// Gets the value of the `fanout` argument,
    /// or its default.
    pub(crate) fn get_fanout(&self) -> FanoutPolicy {
        self.fanout
    }
}
