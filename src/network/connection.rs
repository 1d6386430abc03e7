use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::{Error, LogSink, Result, TimeSample, TimestampStyle, MAX_PACKET_SIZE};

/// Opens a connection and measures how long the handshake took.
///
/// The elapsed time from the connection attempt to an established socket is
/// the RTT used for half-RTT correction.
pub async fn connect_timed(address: &str, port: u16) -> Result<(TcpStream, Duration)> {
    let started = Instant::now();
    let stream = TcpStream::connect((address, port))
        .await
        .map_err(|e| Error::network(format!("Failed to connect to {}:{}: {}", address, port, e)))?;
    let rtt = started.elapsed();

    debug!("connected to {}:{} in {:?}", address, port, rtt);
    Ok((stream, rtt))
}

/// Reads the time string the server sends on a fresh connection.
///
/// One read of at most [`MAX_PACKET_SIZE`] bytes is the whole response.
pub async fn receive_time(mut stream: TcpStream, rtt: Duration) -> Result<TimeSample> {
    let mut buf = [0u8; MAX_PACKET_SIZE];
    let n = stream
        .read(&mut buf)
        .await
        .map_err(|e| Error::network(format!("Failed to receive time: {}", e)))?;

    if n == 0 {
        return Err(Error::network("Server closed the connection without sending a time"));
    }

    let raw = std::str::from_utf8(&buf[..n])
        .map_err(|e| Error::network(format!("Time response is not valid UTF-8: {}", e)))?;

    Ok(TimeSample::new(raw, rtt))
}

/// Connects to a time server and fetches its current time
pub async fn fetch_time(address: &str, port: u16) -> Result<TimeSample> {
    let (stream, rtt) = connect_timed(address, port).await?;
    receive_time(stream, rtt).await
}

/// Accept loop of the time service.
///
/// Every accepted connection gets the current time and is closed right away;
/// nothing is read from the client. Accepts wait at most `poll_interval` so
/// cancellation is noticed even when no client shows up. An accept error
/// ends the loop.
pub async fn serve_time(
    listener: TcpListener,
    style: TimestampStyle,
    poll_interval: Duration,
    cancel: CancellationToken,
    log: Arc<dyn LogSink>,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = timeout(poll_interval, listener.accept()) => accepted,
        };

        let (mut stream, peer) = match accepted {
            Err(_elapsed) => continue,
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                log.emit(&format!("[SERVER] Error: {}", e));
                break;
            }
        };

        let now = style.now();
        match stream.write_all(now.as_bytes()).await {
            Ok(()) => log.emit(&format!("[SERVER] Connection from {}, sent time: {}", peer, now)),
            Err(e) => warn!("failed to send time to {}: {}", peer, e),
        }
        if let Err(e) = stream.shutdown().await {
            debug!("failed to close connection to {}: {}", peer, e);
        }
    }

    debug!("time service loop finished");
}
