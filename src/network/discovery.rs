use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::udp::UdpFramed;
use tracing::debug;

use crate::core::{Error, LogSink, Result};
use crate::protocol::{DiscoveryCodec, DiscoveryMessage};
use super::bind_udp;

/// How long a client waits for a discovery reply by default
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Broadcasts a discovery probe on `port` and returns the first server that answers.
///
/// `Ok(None)` means nobody answered in time, or the reply was not a valid
/// response; that is an expected outcome, not an error.
pub async fn discover(port: u16, wait: Duration) -> Result<Option<IpAddr>> {
    discover_at(SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), port), wait).await
}

/// Sends one discovery probe to `target` and waits up to `wait` for one reply
pub async fn discover_at(target: SocketAddr, wait: Duration) -> Result<Option<IpAddr>> {
    let local = match target {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let mut framed = UdpFramed::new(bind_udp(local)?, DiscoveryCodec::new());

    framed
        .send((DiscoveryMessage::Discover, target))
        .await
        .map_err(|e| Error::network(format!("Failed to send discovery probe to {}: {}", target, e)))?;

    match timeout(wait, framed.next()).await {
        Err(_elapsed) => Ok(None),
        Ok(Some(Ok((DiscoveryMessage::Response, from)))) => Ok(Some(from.ip())),
        Ok(Some(Ok((other, from)))) => {
            debug!("ignoring discovery reply {:?} from {}", other, from);
            Ok(None)
        }
        Ok(Some(Err(e))) => Err(Error::network(format!("Failed to receive discovery reply: {}", e))),
        Ok(None) => Ok(None),
    }
}

/// Server side of discovery: answers every probe until cancelled.
///
/// Receives wait at most `poll_interval` so cancellation is noticed promptly.
/// A receive error ends the loop.
pub async fn respond_to_discovery(
    socket: UdpSocket,
    poll_interval: Duration,
    cancel: CancellationToken,
    log: Arc<dyn LogSink>,
) {
    let mut framed = UdpFramed::new(socket, DiscoveryCodec::new());

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = timeout(poll_interval, framed.next()) => received,
        };

        let (message, peer) = match received {
            Err(_elapsed) => continue,
            Ok(Some(Ok(datagram))) => datagram,
            Ok(Some(Err(e))) => {
                log.emit(&format!("[SERVER][UDP] Error: {}", e));
                break;
            }
            Ok(None) => break,
        };

        match message {
            DiscoveryMessage::Discover => {
                match framed.send((DiscoveryMessage::Response, peer)).await {
                    Ok(()) => log.emit(&format!(
                        "[SERVER] Discovery request from {}, response sent",
                        peer
                    )),
                    Err(e) => log.emit(&format!(
                        "[SERVER][UDP] Failed to answer {}: {}",
                        peer, e
                    )),
                }
            }
            other => debug!("ignoring datagram {:?} from {}", other, peer),
        }
    }

    debug!("discovery loop finished");
}
