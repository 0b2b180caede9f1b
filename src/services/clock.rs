use chrono::{DateTime, Utc};
use chrono_tz::Tz;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock().unwrap() += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Zone used when none is configured.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::London;

/// Renders instants as wall-clock time in the configured zone.
#[derive(Debug, Clone, Copy)]
pub struct TimeFormatter {
    tz: Tz,
}

impl TimeFormatter {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Message timestamp, second precision: `[2025-01-31 14:05:09]`.
    pub fn message_stamp(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.tz)
            .format("[%Y-%m-%d %H:%M:%S]")
            .to_string()
    }

    /// Table cell form used by the dashboard: `2025-01-31 14:05:09`.
    pub fn table_stamp(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.tz)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }

    /// Short date used in generated titles: `Jan 31, 2025`.
    pub fn title_date(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.tz).format("%b %d, %Y").to_string()
    }
}

impl Default for TimeFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEZONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_london_winter_is_utc() {
        let at = Utc.with_ymd_and_hms(2025, 1, 31, 23, 30, 5).unwrap();
        assert_eq!(TimeFormatter::default().message_stamp(at), "[2025-01-31 23:30:05]");
    }

    #[test]
    fn test_london_summer_is_one_hour_ahead() {
        let at = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
        let formatter = TimeFormatter::default();
        assert_eq!(formatter.message_stamp(at), "[2025-07-01 13:00:00]");
        assert_eq!(formatter.table_stamp(at), "2025-07-01 13:00:00");
    }

    #[test]
    fn test_date_rolls_over_in_local_zone() {
        let at = Utc.with_ymd_and_hms(2025, 7, 31, 23, 30, 0).unwrap();
        assert_eq!(TimeFormatter::default().title_date(at), "Aug 01, 2025");
        assert_eq!(
            TimeFormatter::new(chrono_tz::UTC).title_date(at),
            "Jul 31, 2025"
        );
    }

    #[test]
    fn test_title_date_format() {
        let at = Utc.with_ymd_and_hms(2025, 3, 7, 9, 0, 0).unwrap();
        assert_eq!(TimeFormatter::default().title_date(at), "Mar 07, 2025");
    }

    #[test]
    fn test_manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2025, 3, 7, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now(), start + Duration::seconds(90));
    }
}
