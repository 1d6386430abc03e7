//! Synchronization module
//!
//! This module applies a fetched server time to the local clock: it waits out
//! half the measured RTT, then commits the time through two independent
//! clock setters.

pub mod clock;
pub mod sync_manager;

pub use self::clock::{ClockSetter, CommandClock, PlatformClock};
pub use self::sync_manager::{apply_sync, SyncManager, SyncOutcome, SyncPhase};
