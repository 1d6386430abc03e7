use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::{Error, LogSink, Result, ServerConfig};
use super::connection::serve_time;
use super::discovery::respond_to_discovery;
use super::{bind_tcp_listener, bind_udp};

/// Lifecycle of a [`TimeServer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Serves the local clock over TCP and answers discovery probes over UDP.
///
/// Both services share one port and run as separate tasks. Each task owns
/// its socket; the only thing shared with them is the cancellation token.
pub struct TimeServer {
    config: ServerConfig,
    log: Arc<dyn LogSink>,
    state: ServerState,
    local_addr: Option<SocketAddr>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl TimeServer {
    /// Creates a stopped server
    pub fn new(config: ServerConfig, log: Arc<dyn LogSink>) -> Self {
        TimeServer {
            config,
            log,
            state: ServerState::Stopped,
            local_addr: None,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Whether both services are up
    pub fn is_running(&self) -> bool {
        self.state == ServerState::Running
    }

    /// Address the listeners are bound to while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Binds both listeners and spawns their loops.
    ///
    /// With port 0 in the config, the TCP listener picks a port and the
    /// discovery socket binds the same one.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if self.state != ServerState::Stopped {
            return Err(Error::invalid_state(format!(
                "Cannot start server while {:?}",
                self.state
            )));
        }
        self.state = ServerState::Starting;

        let bound = bind_tcp_listener(self.config.bind_addr).and_then(|listener| {
            let addr = listener.local_addr()?;
            let udp = bind_udp(addr)?;
            Ok((listener, udp, addr))
        });
        let (listener, udp, addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                self.state = ServerState::Stopped;
                self.log.emit(&format!("[SERVER] Failed to start: {}", e));
                return Err(e);
            }
        };

        self.cancel = CancellationToken::new();
        self.tasks.push(tokio::spawn(serve_time(
            listener,
            self.config.style,
            self.config.poll_interval,
            self.cancel.clone(),
            Arc::clone(&self.log),
        )));
        self.tasks.push(tokio::spawn(respond_to_discovery(
            udp,
            self.config.poll_interval,
            self.cancel.clone(),
            Arc::clone(&self.log),
        )));

        self.local_addr = Some(addr);
        self.state = ServerState::Running;
        self.log.emit(&format!("[SERVER] Server started on port {}", addr.port()));
        Ok(addr)
    }

    /// Signals both loops and waits for them to release their sockets.
    ///
    /// Stopping a stopped server does nothing.
    pub async fn stop(&mut self) {
        if self.state == ServerState::Stopped {
            return;
        }
        self.state = ServerState::Stopping;
        self.cancel.cancel();

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("server task ended abnormally: {}", e);
            }
        }

        debug!("listeners on {:?} released", self.local_addr);
        self.local_addr = None;
        self.state = ServerState::Stopped;
        self.log.emit("[SERVER] Server stopped");
    }
}

impl Drop for TimeServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
