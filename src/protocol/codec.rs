use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{Error, MAX_PACKET_SIZE};
use super::message::DiscoveryMessage;

/// Datagram codec for discovery messages.
///
/// Each datagram is one whole message; there is no length prefix.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscoveryCodec;

impl DiscoveryCodec {
    /// Creates a new discovery codec
    pub fn new() -> Self {
        DiscoveryCodec
    }
}

impl Decoder for DiscoveryCodec {
    type Item = DiscoveryMessage;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        // A datagram is consumed in full, whatever it contains
        let datagram = src.split_to(src.len());
        Ok(Some(DiscoveryMessage::from_bytes(&datagram)))
    }
}

impl Encoder<DiscoveryMessage> for DiscoveryCodec {
    type Error = Error;

    fn encode(&mut self, item: DiscoveryMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = item.as_bytes();
        if bytes.len() > MAX_PACKET_SIZE {
            return Err(Error::network(format!(
                "Discovery datagram too large: {} bytes",
                bytes.len()
            )));
        }

        dst.reserve(bytes.len());
        dst.put_slice(bytes);
        Ok(())
    }
}
