use std::io;
use thiserror::Error;

/// Error types for the time synchronization core
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Clock set error: {message}")]
    ClockSet {
        message: String,
        /// The OS refused the change for lack of privilege
        permission_denied: bool,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new network error
    pub fn network(msg: impl Into<String>) -> Self {
        Error::Network(msg.into())
    }

    /// Creates a new wire format error
    pub fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    /// Creates a new clock set error
    pub fn clock_set(msg: impl Into<String>) -> Self {
        Error::ClockSet {
            message: msg.into(),
            permission_denied: false,
        }
    }

    /// Creates a clock set error caused by missing privileges
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Error::ClockSet {
            message: msg.into(),
            permission_denied: true,
        }
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Whether retrying with elevated privileges could help
    pub fn needs_elevation(&self) -> bool {
        matches!(
            self,
            Error::ClockSet {
                permission_denied: true,
                ..
            }
        )
    }
}
