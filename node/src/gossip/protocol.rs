//! Contains utilities for the wire protocol used
//! between gossip nodes.
//!
//! A frame is one newline-terminated line of text in the form
//! `<identifier>|<origin>|<payload>`, representing a single
//! gossip message.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use super::GossipMessage;

/// Error raised when a received frame does not conform
/// to the wire format: a frame must carry exactly three
/// `|`-separated fields and an identifier of at least
/// 4 characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("malformed gossip frame (protocol error)")]
pub(crate) struct MalformedFrame;

static FRAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^|\n]{4,})\|([^|\n]*)\|([^|\n]*)$").unwrap());

impl GossipMessage {
    /// Parses a wire frame into a `GossipMessage`
    /// according to the protocol specification.
    ///
    /// A trailing newline terminator, if still present,
    /// is stripped before matching.
    pub(crate) fn parse(frame: &str) -> Result<Self, MalformedFrame> {
        let frame = frame.strip_suffix('\n').unwrap_or(frame);

        let frame_datas = FRAME_REGEX.captures(frame).ok_or(MalformedFrame)?;

        Ok(Self::create_from(
            frame_datas[1].to_string(),
            frame_datas[2].to_string(),
            frame_datas[3].to_string(),
        ))
    }

    /// Converts the current `GossipMessage` into its
    /// newline-terminated text-based representation,
    /// according to the protocol specification.
    pub(crate) fn to_frame(&self) -> String {
        format!("{}|{}|{}\n", self.identifier, self.origin, self.payload)
    }
}

#[cfg(test)]
mod gossip_frame_protocol_test {
    use std::net::SocketAddr;

    use super::{GossipMessage, MalformedFrame};

    #[test]
    fn frame_parse_test() {
        let frame = "ABCD|1.2.3.4:9000|hello";

        let message = GossipMessage::parse(frame).unwrap();

        assert_eq!(message.get_identifier(), "ABCD");
        assert_eq!(message.get_origin(), "1.2.3.4:9000");
        assert_eq!(message.get_payload(), "hello");
    }

    #[test]
    fn newline_terminated_frame_parse_test() {
        let frame = "ABCD|1.2.3.4:9000|hello\n";

        let message = GossipMessage::parse(frame).unwrap();

        assert_eq!(message.get_identifier(), "ABCD");
        assert_eq!(message.get_payload(), "hello");
    }

    #[test]
    fn empty_payload_frame_parse_test() {
        let frame = "ABCD|1.2.3.4:9000|";

        let message = GossipMessage::parse(frame).unwrap();

        assert_eq!(message.get_payload(), "");
    }

    #[test]
    fn missing_field_frame_parse_test() {
        let frame = "ABCD|hello";

        assert_eq!(GossipMessage::parse(frame), Err(MalformedFrame));
    }

    #[test]
    fn extra_field_frame_parse_test() {
        let frame = "ABCD|1.2.3.4:9000|hello|world";

        assert_eq!(GossipMessage::parse(frame), Err(MalformedFrame));
    }

    #[test]
    fn short_identifier_frame_parse_test() {
        let frame = "AB|1.2.3.4:9000|hello";

        assert_eq!(GossipMessage::parse(frame), Err(MalformedFrame));
    }

    #[test]
    fn frame_round_trip_test() {
        let origin = "127.0.0.1:4550".parse::<SocketAddr>().unwrap();
        let message = GossipMessage::new(origin, "some record".to_string());

        let decoded = GossipMessage::parse(&message.to_frame()).unwrap();

        assert_eq!(decoded, message);
    }
}
