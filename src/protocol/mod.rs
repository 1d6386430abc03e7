//! Protocol implementation module
//!
//! This module defines the discovery datagrams, their codec, and the wire
//! time string exchanged over TCP.

pub mod codec;
pub mod message;
pub mod time_string;

pub use self::codec::DiscoveryCodec;
pub use self::message::{DiscoveryMessage, DISCOVER_PAYLOAD, RESPONSE_PAYLOAD};
pub use self::time_string::WireTime;
