use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::core::{LogSink, Result, TimeSample};
use crate::network::{connect_timed, receive_time};
use crate::protocol::WireTime;
use super::clock::{ClockSetter, CommandClock, PlatformClock};

/// Progress of one client synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Connecting,
    Receiving,
    Parsing,
    /// Sleeping out half of the measured RTT
    Waiting,
    SettingClock,
    Done,
    Failed,
}

/// What a completed sync did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Time that was applied to the clock
    pub applied: WireTime,
    /// Server time plus half the RTT; reported, never applied
    pub corrected: Option<NaiveDateTime>,
    /// Whether the platform API setter succeeded
    pub primary_ok: bool,
    /// Whether the command setter succeeded
    pub fallback_ok: bool,
}

impl SyncOutcome {
    /// Whether at least one setter changed the clock
    pub fn clock_changed(&self) -> bool {
        self.primary_ok || self.fallback_ok
    }
}

/// Applies one fetched sample to the system clock.
///
/// The parsed server time is applied after sleeping half the RTT. The
/// half-RTT corrected value is only logged. Both setters are always tried
/// and their failures are logged, not returned; only a malformed time string
/// aborts with an error.
pub async fn apply_sync(
    sample: &TimeSample,
    log: &dyn LogSink,
    primary: &dyn ClockSetter,
    fallback: &dyn ClockSetter,
) -> Result<SyncOutcome> {
    let mut phase = SyncPhase::Idle;
    run_sync(sample, log, primary, fallback, &mut phase).await
}

async fn run_sync(
    sample: &TimeSample,
    log: &dyn LogSink,
    primary: &dyn ClockSetter,
    fallback: &dyn ClockSetter,
    phase: &mut SyncPhase,
) -> Result<SyncOutcome> {
    enter(phase, SyncPhase::Parsing);
    let parsed = match WireTime::parse(&sample.raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            log.emit(&format!("[CLIENT] Could not parse server time {:?}: {}", sample.raw, e));
            enter(phase, SyncPhase::Failed);
            return Err(e);
        }
    };
    if parsed.has_millis {
        log.emit(&format!("[CLIENT] Received time with milliseconds: {}", parsed));
    }

    let half_rtt = sample.half_rtt();
    let corrected = parsed.to_datetime().ok().and_then(|dt| {
        chrono::Duration::from_std(half_rtt)
            .ok()
            .and_then(|delta| dt.checked_add_signed(delta))
    });
    match corrected {
        Some(dt) => log.emit(&format!(
            "[CLIENT] Time adjusted by half RTT: {}",
            WireTime::from_datetime(dt).format_with_millis()
        )),
        None => log.emit("[CLIENT] Time adjusted by half RTT: out of range"),
    }

    enter(phase, SyncPhase::Waiting);
    log.emit(&format!(
        "[CLIENT] Waiting {:.4} s (half RTT) before setting the clock...",
        half_rtt.as_secs_f64()
    ));
    tokio::time::sleep(half_rtt).await;

    enter(phase, SyncPhase::SettingClock);
    let primary_ok = match primary.set_system_clock(&parsed).await {
        Ok(()) => {
            log.emit(&format!(
                "[CLIENT] Clock set via {} (UTC): {}",
                primary.name(),
                parsed.format_with_millis()
            ));
            true
        }
        Err(e) => {
            log.emit(&format!("[CLIENT] Failed to set clock via {}: {}", primary.name(), e));
            if e.needs_elevation() {
                log.emit("[CLIENT] Setting the clock needs elevated privileges, run as administrator/root");
            }
            false
        }
    };

    let fallback_ok = match fallback.set_system_clock(&parsed).await {
        Ok(()) => {
            log.emit("[CLIENT] Time synchronized!");
            true
        }
        Err(e) => {
            log.emit(&format!(
                "[CLIENT] Could not change the time via {}. Run the program as administrator/root! Error: {}",
                fallback.name(),
                e
            ));
            false
        }
    };

    enter(phase, SyncPhase::Done);
    Ok(SyncOutcome {
        applied: parsed,
        corrected,
        primary_ok,
        fallback_ok,
    })
}

fn enter(phase: &mut SyncPhase, next: SyncPhase) {
    debug!("sync phase {:?} -> {:?}", phase, next);
    *phase = next;
}

/// Drives fetch and clock set for one server, one attempt per call
pub struct SyncManager {
    log: Arc<dyn LogSink>,
    primary: Box<dyn ClockSetter>,
    fallback: Box<dyn ClockSetter>,
    phase: SyncPhase,
}

impl SyncManager {
    /// Creates a manager using the platform API and the date command
    pub fn new(log: Arc<dyn LogSink>) -> Self {
        Self::with_setters(log, Box::new(PlatformClock), Box::new(CommandClock))
    }

    /// Creates a manager with explicit clock setters
    pub fn with_setters(
        log: Arc<dyn LogSink>,
        primary: Box<dyn ClockSetter>,
        fallback: Box<dyn ClockSetter>,
    ) -> Self {
        SyncManager {
            log,
            primary,
            fallback,
            phase: SyncPhase::Idle,
        }
    }

    /// Phase reached by the latest attempt
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Fetches the time from `address:port` and applies it.
    ///
    /// Every failure is logged before it is returned.
    pub async fn synchronize(&mut self, address: &str, port: u16) -> Result<SyncOutcome> {
        enter(&mut self.phase, SyncPhase::Connecting);
        let sample = match self.fetch(address, port).await {
            Ok(sample) => sample,
            Err(e) => {
                self.log.emit(&format!("[CLIENT] Error: {}", e));
                enter(&mut self.phase, SyncPhase::Failed);
                return Err(e);
            }
        };

        self.apply(&sample).await
    }

    /// Applies an already fetched sample
    pub async fn apply(&mut self, sample: &TimeSample) -> Result<SyncOutcome> {
        run_sync(
            sample,
            self.log.as_ref(),
            self.primary.as_ref(),
            self.fallback.as_ref(),
            &mut self.phase,
        )
        .await
    }

    async fn fetch(&mut self, address: &str, port: u16) -> Result<TimeSample> {
        let (stream, rtt) = connect_timed(address, port).await?;
        self.log.emit(&format!(
            "[CLIENT] Measured ping (RTT): {:.2} ms",
            rtt.as_secs_f64() * 1000.0
        ));

        enter(&mut self.phase, SyncPhase::Receiving);
        let sample = receive_time(stream, rtt).await?;
        self.log.emit(&format!("[CLIENT] Received time: {}", sample.raw));
        Ok(sample)
    }
}

impl std::fmt::Debug for SyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManager")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.name())
            .field("phase", &self.phase)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Records what it was asked to set and when
    #[derive(Default)]
    struct RecordingClock {
        fail: Option<fn() -> Error>,
        calls: Mutex<Vec<(WireTime, Instant)>>,
    }

    impl RecordingClock {
        fn failing(fail: fn() -> Error) -> Self {
            RecordingClock {
                fail: Some(fail),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<(WireTime, Instant)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ClockSetter for RecordingClock {
        fn name(&self) -> &str {
            "recording"
        }

        async fn set_system_clock(&self, time: &WireTime) -> Result<()> {
            self.calls.lock().unwrap().push((*time, Instant::now()));
            match self.fail {
                Some(fail) => Err(fail()),
                None => Ok(()),
            }
        }
    }

    fn collecting() -> (impl LogSink, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&lines);
        (
            move |msg: &str| captured.lock().unwrap().push(msg.to_string()),
            lines,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_half_rtt_before_setting() {
        let sample = TimeSample::new("2024-01-15 10:30:00.500", Duration::from_millis(200));
        let (log, _) = collecting();
        let primary = RecordingClock::default();
        let fallback = RecordingClock::default();

        let started = Instant::now();
        apply_sync(&sample, &log, &primary, &fallback).await.unwrap();

        let (_, at) = primary.calls()[0];
        let waited = at - started;
        assert!(waited >= Duration::from_millis(100));
        assert!(waited < Duration::from_millis(105));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_rtt_sets_immediately() {
        let sample = TimeSample::new("2024-01-15 10:30:00", Duration::ZERO);
        let (log, _) = collecting();
        let primary = RecordingClock::default();
        let fallback = RecordingClock::default();

        let started = Instant::now();
        apply_sync(&sample, &log, &primary, &fallback).await.unwrap();
        assert!(primary.calls()[0].1 - started < Duration::from_millis(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_applies_original_not_corrected_time() {
        let sample = TimeSample::new("2024-01-15 10:30:00.500", Duration::from_secs(2));
        let (log, lines) = collecting();
        let primary = RecordingClock::default();
        let fallback = RecordingClock::default();

        let outcome = apply_sync(&sample, &log, &primary, &fallback).await.unwrap();

        let expected = WireTime::parse("2024-01-15 10:30:00.500").unwrap();
        assert_eq!(primary.calls()[0].0, expected);
        assert_eq!(fallback.calls()[0].0, expected);
        assert_eq!(outcome.applied, expected);
        assert_eq!(
            outcome.corrected,
            Some(WireTime::parse("2024-01-15 10:30:01.500").unwrap().to_datetime().unwrap())
        );

        let lines = lines.lock().unwrap();
        assert!(lines.contains(&"[CLIENT] Time adjusted by half RTT: 2024-01-15 10:30:01.500".to_string()));
        assert!(lines.contains(&"[CLIENT] Clock set via recording (UTC): 2024-01-15 10:30:00.500".to_string()));
        assert_eq!(lines.last().map(String::as_str), Some("[CLIENT] Time synchronized!"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_failure_still_tries_fallback() {
        let sample = TimeSample::new("2024-01-15 10:30:00", Duration::from_millis(10));
        let (log, lines) = collecting();
        let primary = RecordingClock::failing(|| Error::permission_denied("EPERM"));
        let fallback = RecordingClock::default();

        let outcome = apply_sync(&sample, &log, &primary, &fallback).await.unwrap();
        assert!(!outcome.primary_ok);
        assert!(outcome.fallback_ok);
        assert!(outcome.clock_changed());
        assert_eq!(fallback.calls().len(), 1);

        let lines = lines.lock().unwrap();
        assert!(lines.iter().any(|l| l.contains("elevated privileges")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_setters_fail_without_error() {
        let sample = TimeSample::new("2024-01-15 10:30:00", Duration::from_millis(10));
        let (log, lines) = collecting();
        let primary = RecordingClock::failing(|| Error::clock_set("boom"));
        let fallback = RecordingClock::failing(|| Error::clock_set("boom"));

        let outcome = apply_sync(&sample, &log, &primary, &fallback).await.unwrap();
        assert!(!outcome.clock_changed());

        let lines = lines.lock().unwrap();
        assert!(lines.last().unwrap().contains("Run the program as administrator"));
    }

    #[tokio::test]
    async fn test_parse_failure_aborts() {
        let sample = TimeSample::new("not a time", Duration::from_millis(10));
        let (log, lines) = collecting();
        let primary = RecordingClock::default();
        let fallback = RecordingClock::default();

        let err = apply_sync(&sample, &log, &primary, &fallback).await.unwrap_err();
        assert!(matches!(err, Error::Format(_)));
        assert!(primary.calls().is_empty());
        assert!(fallback.calls().is_empty());
        assert_eq!(lines.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_apply_tracks_phase() {
        let (log, _) = collecting();
        let mut manager = SyncManager::with_setters(
            Arc::new(log),
            Box::new(RecordingClock::default()),
            Box::new(RecordingClock::default()),
        );
        assert_eq!(manager.phase(), SyncPhase::Idle);

        let sample = TimeSample::new("2024-01-15 10:30:00", Duration::from_millis(4));
        manager.apply(&sample).await.unwrap();
        assert_eq!(manager.phase(), SyncPhase::Done);

        let bad = TimeSample::new("2024-01-15", Duration::ZERO);
        assert!(manager.apply(&bad).await.is_err());
        assert_eq!(manager.phase(), SyncPhase::Failed);
    }

    #[tokio::test]
    async fn test_empty_response_fails_while_receiving() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            // Accept and hang up without writing
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let (log, lines) = collecting();
        let mut manager = SyncManager::with_setters(
            Arc::new(log),
            Box::new(RecordingClock::default()),
            Box::new(RecordingClock::default()),
        );

        let err = manager.synchronize("127.0.0.1", port).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert_eq!(manager.phase(), SyncPhase::Failed);

        let lines = lines.lock().unwrap();
        assert!(lines[0].starts_with("[CLIENT] Measured ping (RTT):"));
        assert!(lines.last().unwrap().starts_with("[CLIENT] Error:"));
    }
}
