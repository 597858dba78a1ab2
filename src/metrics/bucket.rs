//! Calendar-aligned time buckets
//!
//! All truncation happens in UTC. Weeks start on Monday.

use crate::metrics::error::MetricsError;
use chrono::{DateTime, Datelike, Duration, Months, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Time-bucket unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Day,
    Week,
    Month,
}

impl TimeUnit {
    /// Start of the bucket containing `dt`
    pub fn truncate(&self, dt: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = |d: DateTime<Utc>| {
            d.with_hour(0)
                .and_then(|d| d.with_minute(0))
                .and_then(|d| d.with_second(0))
                .and_then(|d| d.with_nanosecond(0))
                .unwrap_or(d)
        };

        match self {
            Self::Day => midnight(dt),
            Self::Week => {
                let days_since_monday = dt.weekday().num_days_from_monday() as i64;
                midnight(dt - Duration::days(days_since_monday))
            }
            Self::Month => midnight(dt.with_day(1).unwrap_or(dt)),
        }
    }

    /// Bucket start `n` units before the aligned `start`
    fn back(&self, start: DateTime<Utc>, n: u32) -> Option<DateTime<Utc>> {
        match self {
            Self::Day => start.checked_sub_signed(Duration::days(n as i64)),
            Self::Week => start.checked_sub_signed(Duration::weeks(n as i64)),
            Self::Month => start.checked_sub_months(Months::new(n)),
        }
    }

    /// Label of a bucket starting at `dt`
    pub fn label(&self, dt: DateTime<Utc>) -> String {
        match self {
            Self::Day | Self::Week => dt.format("%Y-%m-%d").to_string(),
            Self::Month => dt.format("%Y-%m").to_string(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

impl FromStr for TimeUnit {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            other => Err(MetricsError::InvalidUnit(other.to_string())),
        }
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `n` ascending bucket starts, the last one containing `now`
pub fn boundaries(unit: TimeUnit, n: usize, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let current = unit.truncate(now);
    (0..n as u32)
        .rev()
        .filter_map(|k| unit.back(current, k))
        .collect()
}

/// Count timestamps (unix ms) per bucket; the last bucket is open-ended
///
/// Timestamps before the first boundary are dropped.
pub fn bucketize(bounds: &[DateTime<Utc>], timestamps_ms: impl IntoIterator<Item = i64>) -> Vec<u64> {
    let starts: Vec<i64> = bounds.iter().map(|b| b.timestamp_millis()).collect();
    let mut counts = vec![0u64; starts.len()];
    for ts in timestamps_ms {
        let idx = starts.partition_point(|&start| start <= ts);
        if idx > 0 {
            counts[idx - 1] += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 30, 0).unwrap()
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!("week".parse::<TimeUnit>().unwrap(), TimeUnit::Week);
        assert!(matches!(
            "year".parse::<TimeUnit>(),
            Err(MetricsError::InvalidUnit(u)) if u == "year"
        ));
        assert!("Day".parse::<TimeUnit>().is_err());
    }

    #[test]
    fn test_truncate_week_starts_monday() {
        // 2024-03-14 is a Thursday
        let monday = TimeUnit::Week.truncate(at(2024, 3, 14, 15));
        assert_eq!(monday, Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap());

        // A Sunday belongs to the week that started six days earlier
        let monday = TimeUnit::Week.truncate(at(2024, 3, 17, 23));
        assert_eq!(monday, Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_seven_day_boundaries() {
        let now = at(2024, 3, 2, 10);
        let bounds = boundaries(TimeUnit::Day, 7, now);
        let labels: Vec<String> = bounds.iter().map(|b| TimeUnit::Day.label(*b)).collect();
        assert_eq!(
            labels,
            vec![
                "2024-02-25",
                "2024-02-26",
                "2024-02-27",
                "2024-02-28",
                "2024-02-29",
                "2024-03-01",
                "2024-03-02"
            ]
        );
    }

    #[test]
    fn test_month_boundaries_cross_year() {
        let bounds = boundaries(TimeUnit::Month, 3, at(2024, 1, 31, 8));
        let labels: Vec<String> = bounds.iter().map(|b| TimeUnit::Month.label(*b)).collect();
        assert_eq!(labels, vec!["2023-11", "2023-12", "2024-01"]);
    }

    #[test]
    fn test_bucketize() {
        let bounds = boundaries(TimeUnit::Day, 3, at(2024, 3, 3, 12));
        let ms = |dt: DateTime<Utc>| dt.timestamp_millis();
        let counts = bucketize(
            &bounds,
            [
                ms(at(2024, 3, 1, 0)),
                ms(at(2024, 3, 1, 23)),
                ms(Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap()),
                ms(at(2024, 3, 3, 1)),
                ms(at(2024, 2, 29, 5)),
            ],
        );
        // boundary instants open their bucket; Feb 29 is before the window
        assert_eq!(counts, vec![2, 1, 1]);
    }
}
