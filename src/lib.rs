//! custontp: LAN time synchronization
//!
//! A server publishes its clock over TCP and answers UDP discovery broadcasts.
//! A client finds the server, fetches its time while measuring the connection
//! handshake latency, waits out half of that latency, and sets the local
//! system clock. One best-effort correction per call; no drift model.
pub mod core;
pub mod network;
pub mod protocol;
pub mod sync;

// Re-export commonly used items
pub use crate::core::{Error, Result};
pub use crate::network::{discover, fetch_time, TimeServer};
pub use crate::sync::{apply_sync, SyncManager};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
