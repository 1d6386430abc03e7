//! User-facing log output
//!
//! The sync core reports every step as one human-readable line. Front-ends
//! decide how to render it: the CLI sends lines to `tracing`, a UI hands them
//! to its own dispatch loop through [`ChannelSink`].

use tokio::sync::mpsc;

/// A destination for human-readable progress lines.
///
/// Implementations must tolerate calls from several tasks at once.
pub trait LogSink: Send + Sync {
    /// Records one line
    fn emit(&self, message: &str);
}

impl<F> LogSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn emit(&self, message: &str) {
        self(message)
    }
}

/// Forwards lines to the `tracing` subscriber at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, message: &str) {
        tracing::info!("{}", message);
    }
}

/// Queues lines on an unbounded channel for a consumer that owns the display
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    /// Creates a sink together with the receiving end of its queue
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSink { tx }, rx)
    }
}

impl LogSink for ChannelSink {
    fn emit(&self, message: &str) {
        // The consumer going away is not an error for the producer
        if self.tx.send(message.to_string()).is_err() {
            tracing::debug!("log receiver dropped: {}", message);
        }
    }
}
