/// Probe payload a client broadcasts to locate a server
pub const DISCOVER_PAYLOAD: &[u8] = b"CUSTONTP_DISCOVER";

/// Reply payload a server sends back to a probe
pub const RESPONSE_PAYLOAD: &[u8] = b"CUSTONTP_RESPONSE";

/// A discovery datagram.
///
/// The protocol has exactly two valid payloads; anything else is carried as
/// `Unknown` so receivers can log and ignore it instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryMessage {
    /// Client looking for a server
    Discover,
    /// Server announcing itself
    Response,
    /// Any other payload
    Unknown(Vec<u8>),
}

impl DiscoveryMessage {
    /// Classifies a received payload, byte for byte
    pub fn from_bytes(data: &[u8]) -> Self {
        match data {
            DISCOVER_PAYLOAD => DiscoveryMessage::Discover,
            RESPONSE_PAYLOAD => DiscoveryMessage::Response,
            other => DiscoveryMessage::Unknown(other.to_vec()),
        }
    }

    /// Wire bytes for this message
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            DiscoveryMessage::Discover => DISCOVER_PAYLOAD,
            DiscoveryMessage::Response => RESPONSE_PAYLOAD,
            DiscoveryMessage::Unknown(data) => data,
        }
    }
}
