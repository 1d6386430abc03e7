use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, SystemTime};

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};

/// Wire format emitted by the server for its clock reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimestampStyle {
    /// UTC with milliseconds, `YYYY-MM-DD HH:MM:SS.mmm`
    #[default]
    Utc,
    /// Local time, whole seconds, `YYYY-MM-DD HH:MM:SS`
    LegacyLocal,
}

impl TimestampStyle {
    /// Renders the current clock reading in this style
    pub fn now(&self) -> String {
        match self {
            TimestampStyle::Utc => Utc::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            TimestampStyle::LegacyLocal => Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// One reading fetched from a time server.
///
/// Lives only for the duration of a single sync operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSample {
    /// Time string exactly as received
    pub raw: String,
    /// Local wall-clock instant the string arrived
    pub received_at: SystemTime,
    /// Connection handshake latency, used as a one-way delay proxy
    pub rtt: Duration,
}

impl TimeSample {
    /// Creates a sample stamped with the current local time
    pub fn new(raw: impl Into<String>, rtt: Duration) -> Self {
        TimeSample {
            raw: raw.into(),
            received_at: SystemTime::now(),
            rtt,
        }
    }

    /// Half of the measured round trip
    pub fn half_rtt(&self) -> Duration {
        self.rtt / 2
    }
}

/// Configuration for the time server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address both listeners bind to; port 0 picks an ephemeral port
    pub bind_addr: SocketAddr,
    /// How the served time is rendered
    #[serde(default)]
    pub style: TimestampStyle,
    /// Upper bound on a single accept/receive wait, i.e. stop latency
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub poll_interval: Duration,
}

impl ServerConfig {
    /// Config bound to all interfaces on `port`
    pub fn with_port(port: u16) -> Self {
        ServerConfig {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
            ..Default::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), super::DEFAULT_PORT),
            style: TimestampStyle::Utc,
            poll_interval: Duration::from_secs(1),
        }
    }
}
