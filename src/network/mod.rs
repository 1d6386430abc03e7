//! Network module
//!
//! This module handles server discovery over UDP broadcast, the TCP time
//! fetch, and the server that answers both.

mod connection;
mod discovery;
mod server;

pub use self::connection::{connect_timed, fetch_time, receive_time, serve_time};
pub use self::discovery::{discover, discover_at, respond_to_discovery, DEFAULT_DISCOVERY_TIMEOUT};
pub use self::server::{ServerState, TimeServer};

use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, UdpSocket};

use crate::core::{Error, Result};

/// Pending connection backlog for the time listener
const LISTEN_BACKLOG: i32 = 128;

/// Binds a TCP listener with address reuse enabled
pub(crate) fn bind_tcp_listener(addr: SocketAddr) -> Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket
        .bind(&addr.into())
        .map_err(|e| Error::network(format!("Failed to bind TCP {}: {}", addr, e)))?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(TcpListener::from_std(socket.into())?)
}

/// Binds a UDP socket with broadcast and address reuse enabled
pub(crate) fn bind_udp(addr: SocketAddr) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_broadcast(true)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket
        .bind(&addr.into())
        .map_err(|e| Error::network(format!("Failed to bind UDP {}: {}", addr, e)))?;

    Ok(UdpSocket::from_std(socket.into())?)
}
