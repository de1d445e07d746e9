use chrono::{Duration as ChronoDuration, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Wall-clock source. Everything date-shaped is derived from the local calendar, so the
/// daily boundary is local midnight rather than UTC.
pub(crate) trait Clock {
    /// Epoch milliseconds.
    fn now_ms(&self) -> i64;

    /// Local wall-clock time.
    fn local_now(&self) -> NaiveDateTime;

    fn today(&self) -> String {
        format_date(self.local_now().date())
    }

    fn date_offset(&self, days: i64) -> String {
        let d = self.local_now().date() + ChronoDuration::days(days);
        format_date(d)
    }

    fn hour(&self) -> u32 {
        self.local_now().hour()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn local_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

pub(crate) fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

/// Human-readable local timestamp, or `"invalid"` when `ms` is out of chrono's range.
pub(crate) fn format_ts(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format(STAMP_FORMAT).to_string(),
        None => "invalid".to_string(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::Cell;

    /// Hand-driven clock; epoch millis and local time move together.
    pub(crate) struct ManualClock {
        now_ms: Cell<i64>,
        local: Cell<NaiveDateTime>,
    }

    impl ManualClock {
        pub(crate) fn at(date: &str, hour: u32) -> Self {
            let local = NaiveDate::parse_from_str(date, DATE_FORMAT)
                .expect("test date")
                .and_hms_opt(hour, 0, 0)
                .expect("test hour");
            Self {
                now_ms: Cell::new(local.and_utc().timestamp_millis()),
                local: Cell::new(local),
            }
        }

        pub(crate) fn advance_ms(&self, ms: i64) {
            self.now_ms.set(self.now_ms.get() + ms);
            self.local
                .set(self.local.get() + ChronoDuration::milliseconds(ms));
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> i64 {
            self.now_ms.get()
        }

        fn local_now(&self) -> NaiveDateTime {
            self.local.get()
        }
    }
}
