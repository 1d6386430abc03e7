//! Core types and traits for the time synchronization utility
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod log;
pub mod serde;
pub mod settings;
pub mod types;

pub use self::error::{Error, Result};
pub use self::log::{ChannelSink, LogSink, TracingSink};
pub use self::settings::ClientSettings;
pub use self::types::{ServerConfig, TimeSample, TimestampStyle};

/// Default port shared by the TCP time service and UDP discovery
pub const DEFAULT_PORT: u16 = 12345;

/// Maximum size of a single time response or discovery datagram
pub const MAX_PACKET_SIZE: usize = 1024;
