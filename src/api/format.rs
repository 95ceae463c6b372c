//! Shared wire representation for timestamps.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::Serialize;

/// One instant rendered in the formats the clients display directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeResponse {
    pub value: DateTime<Utc>,
    pub date: String,
    pub time: String,
    pub kitchen: String,
    pub rfc1123: String,
    pub local: String,
    pub local_date: String,
    pub local_time: String,
    pub unix_ms: i64,
    pub now_rel_time: String,
    pub timezone: String,
}

/// Display offset plus the request's notion of "now".
#[derive(Debug, Clone, Copy)]
pub struct TimeContext {
    pub offset: FixedOffset,
    pub now: DateTime<Utc>,
}

impl TimeContext {
    pub fn new(offset_minutes: i32, now: DateTime<Utc>) -> Self {
        let offset = FixedOffset::east_opt(offset_minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix());
        Self { offset, now }
    }

    pub fn format(&self, t: DateTime<Utc>) -> TimeResponse {
        let local = t.with_timezone(&self.offset);
        TimeResponse {
            value: t,
            date: t.format("%Y-%m-%d").to_string(),
            time: t.format("%H:%M:%S").to_string(),
            kitchen: t.format("%-I:%M%p").to_string(),
            rfc1123: t.format("%a, %d %b %Y %H:%M:%S UTC").to_string(),
            local: local.to_rfc3339(),
            local_date: local.format("%Y-%m-%d").to_string(),
            local_time: local.format("%H:%M:%S").to_string(),
            unix_ms: t.timestamp_millis(),
            now_rel_time: relative_time(t, self.now),
            timezone: self.offset.to_string(),
        }
    }

    pub fn format_opt(&self, t: Option<DateTime<Utc>>) -> Option<TimeResponse> {
        t.map(|t| self.format(t))
    }
}

/// "3 hours ago", "in 2 days", "just now".
pub fn relative_time(t: DateTime<Utc>, now: DateTime<Utc>) -> String {
    const MINUTE: i64 = 60;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;

    let delta = (now - t).num_seconds();
    let secs = delta.abs();
    let phrase = match secs {
        s if s < 45 => return "just now".to_string(),
        s if s < 90 => "a minute".to_string(),
        s if s < 45 * MINUTE => format!("{} minutes", (s + 30) / MINUTE),
        s if s < 90 * MINUTE => "an hour".to_string(),
        s if s < 22 * HOUR => format!("{} hours", (s + HOUR / 2) / HOUR),
        s if s < 36 * HOUR => "a day".to_string(),
        s if s < 26 * DAY => format!("{} days", (s + DAY / 2) / DAY),
        s if s < 45 * DAY => "a month".to_string(),
        s if s < 320 * DAY => format!("{} months", s / (30 * DAY)),
        s if s < 548 * DAY => "a year".to_string(),
        s => format!("{} years", s / (365 * DAY)),
    };

    if delta < 0 {
        format!("in {}", phrase)
    } else {
        format!("{} ago", phrase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn renders_every_format() {
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 15, 4, 5).unwrap();
        let tc = TimeContext::new(60, t + Duration::hours(3));
        let rendered = tc.format(t);

        assert_eq!(rendered.date, "2024-03-05");
        assert_eq!(rendered.time, "15:04:05");
        assert_eq!(rendered.kitchen, "3:04PM");
        assert_eq!(rendered.rfc1123, "Tue, 05 Mar 2024 15:04:05 UTC");
        assert_eq!(rendered.local, "2024-03-05T16:04:05+01:00");
        assert_eq!(rendered.local_time, "16:04:05");
        assert_eq!(rendered.unix_ms, t.timestamp_millis());
        assert_eq!(rendered.now_rel_time, "3 hours ago");
        assert_eq!(rendered.timezone, "+01:00");
    }

    #[test]
    fn relative_time_handles_past_and_future() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
        assert_eq!(relative_time(now, now), "just now");
        assert_eq!(relative_time(now - Duration::minutes(10), now), "10 minutes ago");
        assert_eq!(relative_time(now + Duration::days(3), now), "in 3 days");
        assert_eq!(relative_time(now - Duration::days(800), now), "2 years ago");
    }

    #[test]
    fn missing_times_stay_missing() {
        let tc = TimeContext::new(0, Utc::now());
        assert_eq!(tc.format_opt(None), None);
    }
}
