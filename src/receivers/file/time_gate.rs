// SPDX-License-Identifier: Apache-2.0

//! Daily read window.
//!
//! A window is written `H[:MM]-[H[:MM]]` on the 24-hour clock. The start is
//! inclusive and the end exclusive; an omitted end means midnight and an omitted
//! start means 00:00. A start later than the end wraps around midnight.

use chrono::{Local, NaiveTime, Timelike};
use std::str::FromStr;

use crate::receivers::file::error::Error;

const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeGate {
    /// Minutes after midnight, inclusive
    start: u32,
    /// Minutes after midnight, exclusive; 1440 is midnight at the end of the day
    end: u32,
}

impl TimeGate {
    /// A gate that is always open
    pub fn always() -> Self {
        Self {
            start: 0,
            end: MINUTES_PER_DAY,
        }
    }

    /// Parse an optional window, empty meaning always open.
    pub fn from_config(run_time: Option<&str>) -> Result<Self, Error> {
        match run_time.map(str::trim) {
            None | Some("") => Ok(Self::always()),
            Some(s) => s.parse(),
        }
    }

    pub fn is_always(&self) -> bool {
        self.start == 0 && self.end == MINUTES_PER_DAY
    }

    pub fn is_permitted(&self, now: NaiveTime) -> bool {
        let minute = now.hour() * 60 + now.minute();
        if self.start < self.end {
            minute >= self.start && minute < self.end
        } else {
            minute >= self.start || minute < self.end
        }
    }

    pub fn is_permitted_now(&self) -> bool {
        self.is_always() || self.is_permitted(Local::now().time())
    }
}

impl Default for TimeGate {
    fn default() -> Self {
        Self::always()
    }
}

fn parse_clock(s: &str, max_hour: u32, window: &str) -> Result<u32, Error> {
    let invalid = |reason: &str| Error::Config(format!("invalid run_time `{}`: {}", window, reason));

    let (hour, minute) = match s.split_once(':') {
        Some((h, m)) => (h, m),
        None => (s, "0"),
    };
    let hour: u32 = hour
        .trim()
        .parse()
        .map_err(|_| invalid("hour is not a number"))?;
    let minute: u32 = minute
        .trim()
        .parse()
        .map_err(|_| invalid("minute is not a number"))?;

    if minute >= 60 {
        return Err(invalid("minute out of range"));
    }
    if hour > max_hour {
        return Err(invalid("hour out of range"));
    }
    let total = hour * 60 + minute;
    if total > max_hour * 60 {
        return Err(invalid("hour out of range"));
    }
    Ok(total)
}

impl FromStr for TimeGate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let window = s.trim();
        let (start, end) = match window.split_once('-') {
            Some((start, end)) => (start.trim(), end.trim()),
            None => (window, ""),
        };

        let start = if start.is_empty() {
            0
        } else {
            parse_clock(start, 23, window)?
        };
        let end = if end.is_empty() {
            MINUTES_PER_DAY
        } else {
            parse_clock(end, 24, window)?
        };

        if start == end || (start == 0 && end == 0) {
            return Err(Error::Config(format!(
                "invalid run_time `{}`: window is empty",
                window
            )));
        }

        Ok(Self { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_open_ended_window() {
        let gate: TimeGate = "10-".parse().unwrap();
        assert!(!gate.is_permitted(at(9, 59)));
        assert!(gate.is_permitted(at(10, 0)));
        assert!(gate.is_permitted(at(23, 59)));
        assert!(!gate.is_permitted(at(0, 0)));

        assert_eq!("10".parse::<TimeGate>().unwrap(), gate);
    }

    #[test]
    fn test_window_from_midnight() {
        let gate: TimeGate = "-6".parse().unwrap();
        assert!(gate.is_permitted(at(0, 0)));
        assert!(gate.is_permitted(at(5, 59)));
        assert!(!gate.is_permitted(at(6, 0)));
    }

    #[test]
    fn test_window_wraps_midnight() {
        let gate: TimeGate = "22-6".parse().unwrap();
        assert!(gate.is_permitted(at(23, 0)));
        assert!(gate.is_permitted(at(2, 0)));
        assert!(!gate.is_permitted(at(12, 0)));
        assert!(!gate.is_permitted(at(6, 0)));
    }

    #[test]
    fn test_window_with_minutes() {
        let gate: TimeGate = "9:30-17:45".parse().unwrap();
        assert!(!gate.is_permitted(at(9, 29)));
        assert!(gate.is_permitted(at(9, 30)));
        assert!(gate.is_permitted(at(17, 44)));
        assert!(!gate.is_permitted(at(17, 45)));
    }

    #[test]
    fn test_empty_is_always() {
        let gate = TimeGate::from_config(Some("  ")).unwrap();
        assert!(gate.is_always());
        assert!(gate.is_permitted_now());
        assert!(TimeGate::from_config(None).unwrap().is_always());
        assert!("0-24".parse::<TimeGate>().unwrap().is_always());
    }

    #[test]
    fn test_malformed_windows() {
        for bad in [
            "abc", "25-", "10-25", "10:60-", "5-5", "-0", "1-2-3",
            "99999999-", "0-99999999:00",
        ] {
            assert!(
                matches!(bad.parse::<TimeGate>(), Err(Error::Config(_))),
                "{} should be rejected",
                bad
            );
        }
    }
}
