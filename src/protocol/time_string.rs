//! Wire time string codec
//!
//! The server sends `YYYY-MM-DD HH:MM:SS`, optionally followed by `.mmm`.
//! No timezone marker is ever part of the string; whichever zone the server
//! used is applied verbatim by the client.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::core::{Error, Result};

/// A parsed wire time string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub millis: u32,
    /// Whether the source string carried a millisecond field
    pub has_millis: bool,
}

/// Parses a fixed-width, digits-only field
fn field<T: FromStr>(text: &str, width: usize, name: &str) -> Result<T> {
    if text.len() != width || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::format(format!(
            "{} must be {} digits, got {:?}",
            name, width, text
        )));
    }
    text.parse()
        .map_err(|_| Error::format(format!("{} is not a number: {:?}", name, text)))
}

impl WireTime {
    /// Parses `YYYY-MM-DD HH:MM:SS[.mmm]`
    pub fn parse(s: &str) -> Result<Self> {
        let mut halves = s.split(' ');
        let (date, time) = match (halves.next(), halves.next(), halves.next()) {
            (Some(date), Some(time), None) => (date, time),
            _ => {
                return Err(Error::format(format!(
                    "expected exactly one space between date and time: {:?}",
                    s
                )))
            }
        };

        let date_parts: Vec<&str> = date.split('-').collect();
        let &[y, mo, d] = date_parts.as_slice() else {
            return Err(Error::format(format!("malformed date: {:?}", date)));
        };

        let (clock, millis) = match time.split_once('.') {
            Some((clock, ms)) => (clock, Some(ms)),
            None => (time, None),
        };
        let clock_parts: Vec<&str> = clock.split(':').collect();
        let &[h, mi, sec] = clock_parts.as_slice() else {
            return Err(Error::format(format!("malformed time: {:?}", time)));
        };

        let parsed = WireTime {
            year: field(y, 4, "year")?,
            month: field(mo, 2, "month")?,
            day: field(d, 2, "day")?,
            hour: field(h, 2, "hour")?,
            minute: field(mi, 2, "minute")?,
            second: field(sec, 2, "second")?,
            millis: millis.map(|ms| field(ms, 3, "milliseconds")).transpose()?.unwrap_or(0),
            has_millis: millis.is_some(),
        };

        // Reject calendar impossibilities such as month 13 or Feb 30
        parsed.to_datetime()?;
        Ok(parsed)
    }

    /// Builds a wire time from a calendar value, always carrying milliseconds
    pub fn from_datetime(dt: NaiveDateTime) -> Self {
        WireTime {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
            millis: dt.nanosecond() / 1_000_000 % 1000,
            has_millis: true,
        }
    }

    /// The calendar value this string denotes
    pub fn to_datetime(&self) -> Result<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .and_then(|date| {
                date.and_hms_milli_opt(self.hour, self.minute, self.second, self.millis)
            })
            .ok_or_else(|| Error::format(format!("not a valid date and time: {}", self)))
    }

    /// Date part, `YYYY-MM-DD`
    pub fn date_string(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }

    /// Clock part to the whole second, `HH:MM:SS`
    pub fn legacy_time(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }

    /// Two-digit-year day-first date, `DD-MM-YY`, for legacy date commands
    pub fn legacy_date(&self) -> String {
        format!(
            "{:02}-{:02}-{:02}",
            self.day,
            self.month,
            self.year.rem_euclid(100)
        )
    }

    /// Formats in the same shape it was parsed from
    pub fn format(&self) -> String {
        if self.has_millis {
            self.format_with_millis()
        } else {
            format!("{} {}", self.date_string(), self.legacy_time())
        }
    }

    /// Formats with an explicit millisecond field
    pub fn format_with_millis(&self) -> String {
        format!(
            "{} {}.{:03}",
            self.date_string(),
            self.legacy_time(),
            self.millis
        )
    }
}

impl fmt::Display for WireTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl FromStr for WireTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        WireTime::parse(s)
    }
}
