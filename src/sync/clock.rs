//! System clock setters
//!
//! Two independent ways of committing a time to the OS clock:
//!
//! - [`PlatformClock`] calls the OS API directly with millisecond precision
//!   (`clock_settime` on Linux, `SetSystemTime` on Windows).
//! - [`CommandClock`] runs the OS date/time commands, whole seconds only.
//!
//! The sync algorithm always tries both.

use std::process::Command;

use async_trait::async_trait;

use crate::core::{Error, Result};
use crate::protocol::WireTime;

/// Something that can set the system clock to a wire time.
///
/// The time is applied as given; no timezone conversion happens here.
#[async_trait]
pub trait ClockSetter: Send + Sync {
    /// Short name used in log lines
    fn name(&self) -> &str;

    /// Sets the system clock
    async fn set_system_clock(&self, time: &WireTime) -> Result<()>;
}

/// Sets the clock through the platform API, treating the time as UTC
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformClock;

#[async_trait]
impl ClockSetter for PlatformClock {
    fn name(&self) -> &str {
        if cfg!(windows) {
            "WinAPI"
        } else {
            "clock_settime"
        }
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    async fn set_system_clock(&self, time: &WireTime) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::time::TimeSpec;
        use nix::time::{clock_settime, ClockId};

        let utc = time.to_datetime()?.and_utc();
        let spec = TimeSpec::new(utc.timestamp() as _, utc.timestamp_subsec_nanos() as _);

        clock_settime(ClockId::CLOCK_REALTIME, spec).map_err(|errno| match errno {
            Errno::EPERM | Errno::EACCES => {
                Error::permission_denied(format!("clock_settime: {}", errno.desc()))
            }
            other => Error::clock_set(format!("clock_settime: {}", other.desc())),
        })
    }

    #[cfg(windows)]
    async fn set_system_clock(&self, time: &WireTime) -> Result<()> {
        use windows_sys::Win32::Foundation::{
            GetLastError, ERROR_PRIVILEGE_NOT_HELD, SYSTEMTIME,
        };
        use windows_sys::Win32::System::SystemInformation::SetSystemTime;

        let st = SYSTEMTIME {
            wYear: time.year as u16,
            wMonth: time.month as u16,
            wDayOfWeek: 0,
            wDay: time.day as u16,
            wHour: time.hour as u16,
            wMinute: time.minute as u16,
            wSecond: time.second as u16,
            wMilliseconds: time.millis as u16,
        };

        // SAFETY: `st` is a fully initialised SYSTEMTIME that outlives the call
        if unsafe { SetSystemTime(&st) } != 0 {
            return Ok(());
        }

        // SAFETY: reads the calling thread's last-error value
        let code = unsafe { GetLastError() };
        if code == ERROR_PRIVILEGE_NOT_HELD {
            Err(Error::permission_denied(format!("SetSystemTime error code {}", code)))
        } else {
            Err(Error::clock_set(format!("SetSystemTime error code {}", code)))
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "android", windows)))]
    async fn set_system_clock(&self, _time: &WireTime) -> Result<()> {
        Err(Error::clock_set("no platform clock API on this target"))
    }
}

/// Sets the clock by running the OS date/time commands
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandClock;

impl CommandClock {
    /// Commands that would set `time`, in execution order
    pub fn commands(time: &WireTime) -> Vec<Command> {
        if cfg!(windows) {
            let mut date = Command::new("cmd");
            date.args(["/C", "date", &time.legacy_date()]);
            let mut clock = Command::new("cmd");
            clock.args(["/C", "time", &time.legacy_time()]);
            vec![date, clock]
        } else {
            let mut date = Command::new("date");
            date.args([
                "-u",
                "-s",
                &format!("{} {}", time.date_string(), time.legacy_time()),
            ]);
            vec![date]
        }
    }
}

#[async_trait]
impl ClockSetter for CommandClock {
    fn name(&self) -> &str {
        "date command"
    }

    async fn set_system_clock(&self, time: &WireTime) -> Result<()> {
        for command in Self::commands(time) {
            run(command).await?;
        }
        Ok(())
    }
}

/// Runs one command on the tokio process driver so the runtime keeps going
async fn run(command: Command) -> Result<()> {
    let shown = format!("{:?}", command);
    let output = tokio::process::Command::from(command)
        .output()
        .await
        .map_err(|e| Error::clock_set(format!("failed to run {}: {}", shown, e)))?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = format!("{} exited with {}: {}", shown, output.status, stderr.trim());
    let lowered = stderr.to_lowercase();
    if lowered.contains("not permitted")
        || lowered.contains("denied")
        || lowered.contains("privilege")
    {
        Err(Error::permission_denied(message))
    } else {
        Err(Error::clock_set(message))
    }
}
