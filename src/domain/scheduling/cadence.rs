use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc, Weekday};

/// Base cadence for a time-scheduled job (§4.2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cadence {
    Every5m,
    Every10m,
    Every30m,
    Hourly,
    DailyAt { hour: u32, minute: u32 },
    WeeklyAt { weekday: Weekday, hour: u32, minute: u32 },
    MonthlyAt { day: u32, hour: u32, minute: u32 },
}

impl Cadence {
    /// Whether `now` crosses this cadence's next-fire boundary, given the
    /// last instant this job actually fired. `None` for `last_fired` means
    /// "never fired" and is treated as a boundary crossing so jobs run
    /// promptly after startup.
    pub fn crosses_boundary(&self, now: DateTime<Utc>, last_fired: Option<DateTime<Utc>>) -> bool {
        match last_fired {
            None => true,
            Some(last) => match self {
                Cadence::Every5m => now - last >= chrono::Duration::minutes(5),
                Cadence::Every10m => now - last >= chrono::Duration::minutes(10),
                Cadence::Every30m => now - last >= chrono::Duration::minutes(30),
                Cadence::Hourly => now - last >= chrono::Duration::hours(1),
                Cadence::DailyAt { hour, minute } => {
                    Self::crossed_time_of_day(now, last, *hour, *minute)
                }
                Cadence::WeeklyAt {
                    weekday,
                    hour,
                    minute,
                } => {
                    now.weekday() == *weekday
                        && Self::crossed_time_of_day(now, last, *hour, *minute)
                }
                Cadence::MonthlyAt { day, hour, minute } => {
                    now.day() == *day && Self::crossed_time_of_day(now, last, *hour, *minute)
                }
            },
        }
    }

    fn crossed_time_of_day(now: DateTime<Utc>, last: DateTime<Utc>, hour: u32, minute: u32) -> bool {
        let Some(target) = NaiveTime::from_hms_opt(hour, minute, 0) else {
            return false;
        };
        let now_t = now.time();
        let last_t = last.time();
        // Crossed if we're on/after the target today and the last fire was
        // either on a previous day, or earlier today before the target.
        let now_on_or_after = now_t >= target;
        let same_day = now.date_naive() == last.date_naive();
        now_on_or_after && (!same_day || last_t < target)
    }

    /// Approximate period in seconds, used for the enqueue-count invariant
    /// in §8 (`floor(T/C)-1 .. ceil(T/C)+1`).
    pub fn period_seconds(&self) -> i64 {
        match self {
            Cadence::Every5m => 300,
            Cadence::Every10m => 600,
            Cadence::Every30m => 1800,
            Cadence::Hourly => 3600,
            Cadence::DailyAt { .. } => 86_400,
            Cadence::WeeklyAt { .. } => 7 * 86_400,
            Cadence::MonthlyAt { .. } => 30 * 86_400,
        }
    }
}

/// Predicate describing when a scheduled job may enqueue (§4.2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarketGate {
    Always,
    MarketOpenDominant,
    MarketOpenAny,
    MarketClosed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn every_5m_crosses_after_interval() {
        let last = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 10, 5, 0).unwrap();
        assert!(Cadence::Every5m.crosses_boundary(now, Some(last)));
        let now_early = Utc.with_ymd_and_hms(2026, 1, 1, 10, 4, 0).unwrap();
        assert!(!Cadence::Every5m.crosses_boundary(now_early, Some(last)));
    }

    #[test]
    fn daily_at_crosses_once_per_day() {
        let cadence = Cadence::DailyAt { hour: 4, minute: 0 };
        let last = Utc.with_ymd_and_hms(2026, 1, 1, 4, 0, 1).unwrap();
        let later_same_day = Utc.with_ymd_and_hms(2026, 1, 1, 23, 0, 0).unwrap();
        assert!(!cadence.crosses_boundary(later_same_day, Some(last)));
        let next_day = Utc.with_ymd_and_hms(2026, 1, 2, 4, 0, 0).unwrap();
        assert!(cadence.crosses_boundary(next_day, Some(last)));
    }

    #[test]
    fn never_fired_always_crosses() {
        let now = Utc::now();
        assert!(Cadence::Hourly.crosses_boundary(now, None));
    }
}
