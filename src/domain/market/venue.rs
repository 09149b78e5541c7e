use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Classification used by the Time Scheduler to pick the sync cadence
/// (§4.2): dominant markets drive the 5-minute cadence, secondary markets
/// the 10-minute cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VenueClass {
    Dominant,
    Secondary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Venue {
    Nyse,
    Nasdaq,
    Xetra,
    Lse,
    Euronext,
    Hkex,
    Sse,
    Tsx,
    Asx,
}

impl Venue {
    /// Buys on these venues may execute at any time per §4.5 guard (e);
    /// sells always require the venue open regardless of this flag.
    pub fn flexible_buy_hours(&self) -> bool {
        matches!(
            self,
            Venue::Nyse | Venue::Nasdaq | Venue::Xetra | Venue::Lse | Venue::Euronext
        )
    }

    pub fn class(&self) -> VenueClass {
        match self {
            Venue::Nyse | Venue::Nasdaq => VenueClass::Dominant,
            _ => VenueClass::Secondary,
        }
    }

    /// Best-effort currency -> primary listing venue, used wherever a
    /// security needs a venue for a market-hours check but the `universe`
    /// schema carries only its settlement currency (§2). Picks one
    /// representative venue per currency; a security genuinely cross-listed
    /// on several venues is out of scope here.
    pub fn from_currency(currency: &str) -> Option<Venue> {
        match currency {
            "USD" => Some(Venue::Nyse),
            "EUR" => Some(Venue::Xetra),
            "GBP" => Some(Venue::Lse),
            "HKD" => Some(Venue::Hkex),
            "CNY" => Some(Venue::Sse),
            "CAD" => Some(Venue::Tsx),
            "AUD" => Some(Venue::Asx),
            _ => None,
        }
    }
}

/// Per-venue regular-session rules: local-time trading window, the IANA
/// timezone it is expressed in, and a per-year holiday calendar (§4.2).
/// Wall-clock computations always go through `timezone` -- never a fixed
/// floating UTC offset -- so the oracle survives DST transitions.
#[derive(Debug, Clone)]
pub struct VenueRules {
    pub venue: Venue,
    pub timezone: Tz,
    pub open: NaiveTime,
    pub close: NaiveTime,
    pub premarket_open: NaiveTime,
    pub holidays: Vec<NaiveDate>,
}

impl VenueRules {
    pub fn is_holiday(&self, now: DateTime<Utc>) -> bool {
        let local_date = now.with_timezone(&self.timezone).date_naive();
        self.holidays.contains(&local_date)
    }

    pub fn is_weekend(&self, now: DateTime<Utc>) -> bool {
        use chrono::Datelike;
        let local = now.with_timezone(&self.timezone);
        matches!(
            local.weekday(),
            chrono::Weekday::Sat | chrono::Weekday::Sun
        )
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        if self.is_weekend(now) || self.is_holiday(now) {
            return false;
        }
        let local_time = now.with_timezone(&self.timezone).time();
        local_time >= self.open && local_time < self.close
    }

    pub fn is_premarket(&self, now: DateTime<Utc>) -> bool {
        if self.is_weekend(now) || self.is_holiday(now) {
            return false;
        }
        let local_time = now.with_timezone(&self.timezone).time();
        local_time >= self.premarket_open && local_time < self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn nyse_rules() -> VenueRules {
        VenueRules {
            venue: Venue::Nyse,
            timezone: chrono_tz::America::New_York,
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            premarket_open: NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
            holidays: vec![NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()],
        }
    }

    #[test]
    fn closed_on_holiday() {
        let rules = nyse_rules();
        let noon_ny_on_holiday = Utc.with_ymd_and_hms(2026, 1, 1, 17, 0, 0).unwrap();
        assert!(!rules.is_open(noon_ny_on_holiday));
    }

    #[test]
    fn open_during_regular_session() {
        let rules = nyse_rules();
        // 2026-01-02 is a Friday; 15:00 UTC = 10:00 ET.
        let during_session = Utc.with_ymd_and_hms(2026, 1, 2, 15, 0, 0).unwrap();
        assert!(rules.is_open(during_session));
    }

    #[test]
    fn closed_on_weekend() {
        let rules = nyse_rules();
        // 2026-01-03 is a Saturday.
        let weekend = Utc.with_ymd_and_hms(2026, 1, 3, 15, 0, 0).unwrap();
        assert!(!rules.is_open(weekend));
    }
}
