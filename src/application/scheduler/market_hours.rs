use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::domain::market::{Venue, VenueClass, VenueRules};

/// Market-Hours Oracle (§4.2): holds per-venue rules and answers the
/// aggregate questions the time scheduler's market gates need. Venue data
/// types and their own `is_open`/`is_premarket` live in
/// `domain::market::venue`; this service only owns the cache of venues and
/// composes them.
pub struct MarketHoursOracle {
    venues: HashMap<Venue, VenueRules>,
}

impl MarketHoursOracle {
    pub fn new(venues: Vec<VenueRules>) -> Self {
        Self {
            venues: venues.into_iter().map(|rules| (rules.venue.clone(), rules)).collect(),
        }
    }

    pub fn is_open(&self, venue: &Venue, now: DateTime<Utc>) -> bool {
        self.venues.get(venue).map(|rules| rules.is_open(now)).unwrap_or(false)
    }

    pub fn is_premarket(&self, venue: &Venue, now: DateTime<Utc>) -> bool {
        self.venues
            .get(venue)
            .map(|rules| rules.is_premarket(now))
            .unwrap_or(false)
    }

    pub fn dominant_markets_open(&self, now: DateTime<Utc>) -> bool {
        self.venues
            .values()
            .filter(|rules| rules.venue.class() == VenueClass::Dominant)
            .any(|rules| rules.is_open(now) || rules.is_premarket(now))
    }

    pub fn any_market_open(&self, now: DateTime<Utc>) -> bool {
        self.venues.values().any(|rules| rules.is_open(now))
    }

    /// Sync cadence rule (§4.2): dominant open/premarket -> 5 min, else any
    /// secondary open -> 10 min, else paused (`None`).
    pub fn sync_cadence_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.dominant_markets_open(now) {
            Some(300)
        } else if self.any_market_open(now) {
            Some(600)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn nyse() -> VenueRules {
        VenueRules {
            venue: Venue::Nyse,
            timezone: chrono_tz::America::New_York,
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            premarket_open: NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
            holidays: vec![],
        }
    }

    fn hkex() -> VenueRules {
        VenueRules {
            venue: Venue::Hkex,
            timezone: chrono_tz::Asia::Hong_Kong,
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            premarket_open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            holidays: vec![],
        }
    }

    #[test]
    fn dominant_open_yields_5min_cadence() {
        let oracle = MarketHoursOracle::new(vec![nyse(), hkex()]);
        // 2026-01-02 Friday, 15:00 UTC = 10:00 ET (NYSE open).
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 15, 0, 0).unwrap();
        assert_eq!(oracle.sync_cadence_seconds(now), Some(300));
    }

    #[test]
    fn only_secondary_open_yields_10min_cadence() {
        let oracle = MarketHoursOracle::new(vec![nyse(), hkex()]);
        // 2026-01-02 02:00 UTC = 10:00 HKT (HKEX open), NYSE closed.
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 2, 0, 0).unwrap();
        assert_eq!(oracle.sync_cadence_seconds(now), Some(600));
    }

    #[test]
    fn all_closed_is_paused() {
        let oracle = MarketHoursOracle::new(vec![nyse(), hkex()]);
        // 2026-01-03 Saturday.
        let now = Utc.with_ymd_and_hms(2026, 1, 3, 12, 0, 0).unwrap();
        assert_eq!(oracle.sync_cadence_seconds(now), None);
    }
}
