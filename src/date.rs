//! Pre-rendered `Date`/`Expires` header values.
//!
//! Formatting an RFC 1123 date per response is wasted work in a tight
//! serving loop, so each I/O thread keeps one [`HttpDates`] and refreshes
//! it at most once per second; every response on that thread copies from
//! it. Both rendered values are always exactly 29 bytes.

use httpdate::fmt_http_date;
use std::time::{Duration, SystemTime};

/// Length of an IMF-fixdate string, e.g. `Thu, 01 Jan 1970 00:00:00 GMT`.
pub const HTTP_DATE_LEN: usize = 29;

#[derive(Debug, Clone)]
pub struct HttpDates {
    stamp: SystemTime,
    date: String,
    expires: String,
}

impl HttpDates {
    /// Renders both values for `time`, with `Expires` offset by `ttl`.
    pub fn at(time: SystemTime, ttl: Duration) -> HttpDates {
        let date = fmt_http_date(time);
        let expires = fmt_http_date(time + ttl);
        debug_assert_eq!(date.len(), HTTP_DATE_LEN);
        debug_assert_eq!(expires.len(), HTTP_DATE_LEN);
        HttpDates { stamp: time, date, expires }
    }

    pub fn now(ttl: Duration) -> HttpDates {
        Self::at(SystemTime::now(), ttl)
    }

    /// Re-renders when at least a second has passed since the last render.
    pub fn refresh(&mut self, now: SystemTime, ttl: Duration) {
        let stale = now
            .duration_since(self.stamp)
            .map_or(true, |age| age >= Duration::from_secs(1));
        if stale {
            *self = Self::at(now, ttl);
        }
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn expires(&self) -> &str {
        &self.expires
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_29_byte_stamps() {
        let dates = HttpDates::at(SystemTime::UNIX_EPOCH, Duration::from_secs(600));
        assert_eq!(dates.date(), "Thu, 01 Jan 1970 00:00:00 GMT");
        assert_eq!(dates.expires(), "Thu, 01 Jan 1970 00:10:00 GMT");
    }

    #[test]
    fn refresh_is_throttled() {
        let epoch = SystemTime::UNIX_EPOCH;
        let mut dates = HttpDates::at(epoch, Duration::ZERO);
        dates.refresh(epoch + Duration::from_millis(500), Duration::ZERO);
        assert_eq!(dates.date(), "Thu, 01 Jan 1970 00:00:00 GMT");
        dates.refresh(epoch + Duration::from_secs(2), Duration::ZERO);
        assert_eq!(dates.date(), "Thu, 01 Jan 1970 00:00:02 GMT");
    }
}
