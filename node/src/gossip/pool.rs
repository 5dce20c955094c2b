//! Contains the message pool: the single piece of shared
//! mutable state of a gossip node.
//!
//! The pool maps message identifiers to pool entries and owns
//! the local database of archived payloads, so that a counter
//! transition and the matching database append always happen
//! inside the same critical section.

use std::collections::HashMap;
use std::net::SocketAddr;

use super::GossipMessage;

/// A pool entry counter tracks the remaining forwarding
/// rounds of a message: a positive value is the number of
/// cycles the message will still be forwarded, `0` marks it
/// ready to archive, `-1` marks it archived and inert.
///
/// A counter never moves upward once assigned; the only
/// assignment happens at first sighting of an identifier.
pub(crate) struct MessagePool {
    entries: HashMap<String, (GossipMessage, i32)>,
    database: Vec<String>,
    propagation_rounds: i32,
}

impl MessagePool {
    /// Creates an empty pool. `propagation_rounds` is the
    /// counter assigned to every message entering the pool.
    pub(crate) fn new(propagation_rounds: i32) -> Self {
        Self {
            entries: HashMap::new(),
            database: Vec::new(),
            propagation_rounds,
        }
    }

    /// Inserts a record seeded by the current node, with a
    /// fresh identifier and a full counter.
    ///
    /// Returns the generated identifier.
    pub(crate) fn seed(&mut self, origin: SocketAddr, payload: String) -> String {
        let message = GossipMessage::new(origin, payload);
        let identifier = message.get_identifier().to_string();

        self.entries
            .insert(identifier.clone(), (message, self.propagation_rounds));

        identifier
    }

    /// Admits a message received from a peer.
    ///
    /// A new identifier enters the pool with a full counter;
    /// an already known identifier leaves its entry untouched,
    /// so a duplicate can never restart propagation.
    ///
    /// Returns `true` if the message was new to the pool.
    pub(crate) fn admit(&mut self, message: GossipMessage) -> bool {
        if self.entries.contains_key(message.get_identifier()) {
            return false;
        }

        self.entries.insert(
            message.get_identifier().to_string(),
            (message, self.propagation_rounds),
        );

        true
    }

    /// Performs one forwarding cycle over every entry:
    /// an exhausted entry (`0`) is archived into the local
    /// database and marked inert, an active entry is
    /// decremented, an inert entry (`-1`) is skipped.
    ///
    /// Returns the messages still eligible for forwarding
    /// this cycle; an entry that reached `0` or `-1` is
    /// never part of the result.
    pub(crate) fn advance_cycle(&mut self) -> Vec<GossipMessage> {
        let mut outgoing = Vec::new();

        for (message, counter) in self.entries.values_mut() {
            match *counter {
                0 => {
                    self.database.push(message.get_payload().to_string());
                    *counter = -1;
                }
                count if count > 0 => {
                    *counter = count - 1;
                    outgoing.push(message.clone());
                }
                _ => {}
            }
        }

        outgoing
    }

    /// Termination predicate: `true` once every entry has been
    /// archived. An empty pool is settled, so a node seeded
    /// with no records terminates immediately.
    pub(crate) fn is_settled(&self) -> bool {
        self.entries.values().all(|(_, counter)| *counter == -1)
    }

    /// Drains the local database, sorted lexicographically.
    pub(crate) fn take_sorted_payloads(&mut self) -> Vec<String> {
        let mut payloads = std::mem::take(&mut self.database);
        payloads.sort();
        payloads
    }
}

#[cfg(test)]
impl MessagePool {
    pub(crate) fn counter_of(&self, identifier: &str) -> Option<i32> {
        self.entries
            .get(identifier)
            .map(|(_, counter)| *counter)
    }

    pub(crate) fn database(&self) -> &[String] {
        &self.database
    }
}
