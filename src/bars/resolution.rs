//! Bar resolution codes
//!
//! A code is an optional multiplier followed by an optional unit letter:
//! `"1"`, `"15"`, `"240"` are minutes, `"1D"`, `"W"`, `"3M"` are days, weeks
//! and months.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionUnit {
    Minutes,
    Days,
    Weeks,
    Months,
}

/// Width of one bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    multiplier: u32,
    unit: ResolutionUnit,
}

impl Resolution {
    pub fn new(multiplier: u32, unit: ResolutionUnit) -> Self {
        Self { multiplier, unit }
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    pub fn unit(&self) -> ResolutionUnit {
        self.unit
    }

    /// Open time of the bar after the one opened at `time_ms`.
    ///
    /// Months are calendar months, clamped to the end of shorter months.
    pub fn next_bar_time(&self, time_ms: i64) -> Result<i64> {
        let start = DateTime::<Utc>::from_timestamp_millis(time_ms)
            .ok_or_else(|| self.out_of_range(time_ms))?;
        let n = i64::from(self.multiplier);

        let next = match self.unit {
            ResolutionUnit::Minutes => start.checked_add_signed(Duration::minutes(n)),
            ResolutionUnit::Days => start.checked_add_signed(Duration::days(n)),
            ResolutionUnit::Weeks => start.checked_add_signed(Duration::weeks(n)),
            ResolutionUnit::Months => start.checked_add_months(Months::new(self.multiplier)),
        };

        next.map(|t| t.timestamp_millis())
            .ok_or_else(|| self.out_of_range(time_ms))
    }

    fn out_of_range(&self, time_ms: i64) -> ClientError {
        ClientError::InvalidResolution(format!("{} out of range at {}", self, time_ms))
    }
}

impl FromStr for Resolution {
    type Err = ClientError;

    fn from_str(code: &str) -> Result<Self> {
        let invalid = || ClientError::InvalidResolution(code.to_string());

        let (digits, unit) = match code.chars().last() {
            Some('D') => (&code[..code.len() - 1], ResolutionUnit::Days),
            Some('W') => (&code[..code.len() - 1], ResolutionUnit::Weeks),
            Some('M') => (&code[..code.len() - 1], ResolutionUnit::Months),
            Some(_) => (code, ResolutionUnit::Minutes),
            None => return Err(invalid()),
        };

        let multiplier = if digits.is_empty() {
            1
        } else if digits.bytes().all(|b| b.is_ascii_digit()) {
            digits.parse::<u32>().map_err(|_| invalid())?
        } else {
            return Err(invalid());
        };

        if multiplier == 0 {
            return Err(invalid());
        }
        Ok(Self { multiplier, unit })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            ResolutionUnit::Minutes => write!(f, "{}", self.multiplier),
            ResolutionUnit::Days => write!(f, "{}D", self.multiplier),
            ResolutionUnit::Weeks => write!(f, "{}W", self.multiplier),
            ResolutionUnit::Months => write!(f, "{}M", self.multiplier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ms(y: i32, m: u32, d: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap().timestamp_millis()
    }

    #[test]
    fn test_parse_codes() {
        let cases = [
            ("1", 1, ResolutionUnit::Minutes),
            ("15", 15, ResolutionUnit::Minutes),
            ("240", 240, ResolutionUnit::Minutes),
            ("1D", 1, ResolutionUnit::Days),
            ("D", 1, ResolutionUnit::Days),
            ("2W", 2, ResolutionUnit::Weeks),
            ("1M", 1, ResolutionUnit::Months),
        ];
        for (code, multiplier, unit) in cases {
            let resolution: Resolution = code.parse().unwrap();
            assert_eq!(resolution, Resolution::new(multiplier, unit), "{}", code);
        }
    }

    #[test]
    fn test_rejects_bad_codes() {
        for code in ["", "0", "0D", "X", "1H", "D1", "-5", "1.5"] {
            assert!(
                matches!(code.parse::<Resolution>(), Err(ClientError::InvalidResolution(_))),
                "{:?} should be rejected",
                code
            );
        }
    }

    #[test]
    fn test_display_round_trips_code() {
        assert_eq!(Resolution::new(15, ResolutionUnit::Minutes).to_string(), "15");
        assert_eq!("W".parse::<Resolution>().unwrap().to_string(), "1W");
    }

    #[test]
    fn test_next_bar_time() {
        let start = ms(2024, 1, 31);
        let next = |code: &str| code.parse::<Resolution>().unwrap().next_bar_time(start).unwrap();

        assert_eq!(next("1"), start + 60_000);
        assert_eq!(next("15"), start + 15 * 60_000);
        assert_eq!(next("1D"), ms(2024, 2, 1));
        assert_eq!(next("1W"), ms(2024, 2, 7));
        // Clamped to the last day of February
        assert_eq!(next("1M"), ms(2024, 2, 29));
        assert_eq!(next("12M"), ms(2025, 1, 31));
    }
}
