use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tonus_core::error::{Result, TonusError};

/// Validate an IANA timezone name. Used when a timezone is written to a
/// profile, so that reads never have to deal with garbage.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| TonusError::Timezone(format!("unknown timezone: {name}")))
}

/// Resolve a stored timezone name, falling back to the configured default
/// when the stored value no longer parses (e.g. after a tzdb rename).
pub fn resolve_timezone(stored: &str, fallback: &str) -> Tz {
    match stored.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            log!(" [clock] invalid timezone {stored:?}, using {fallback}");
            fallback.parse::<Tz>().unwrap_or(chrono_tz::UTC)
        }
    }
}

/// Half-open UTC window [start, end) in unix seconds covering the local
/// calendar day `days_ago` days before `now` in `tz`. `days_ago = 0` is
/// today. The window length varies around DST transitions (23 or 25 hours).
pub fn day_window(tz: Tz, now: DateTime<Utc>, days_ago: i64) -> (i64, i64) {
    let local_date = now.with_timezone(&tz).date_naive() - Duration::days(days_ago);
    let start = local_midnight(tz, local_date);
    let end = local_midnight(tz, local_date + Duration::days(1));
    (start.timestamp(), end.timestamp())
}

/// The UTC instant of local midnight on `date`. When midnight does not
/// exist (DST gap), the first valid instant after it is used; when it is
/// ambiguous (DST fold), the earlier occurrence wins.
fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            match tz.from_local_datetime(&shifted) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                    dt.with_timezone(&Utc)
                }
                LocalResult::None => Utc.from_utc_datetime(&naive),
            }
        }
    }
}

/// Format a unix timestamp as local wall-clock "HH:MM".
pub fn local_hhmm(tz: Tz, ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.with_timezone(&tz).format("%H:%M").to_string())
        .unwrap_or_default()
}

/// Format a unix timestamp as local "DD.MM".
pub fn local_ddmm(tz: Tz, ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.with_timezone(&tz).format("%d.%m").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_timezone() {
        assert!(parse_timezone("Europe/Moscow").is_ok());
        assert!(parse_timezone("Mars/Olympus").is_err());
    }

    #[test]
    fn test_resolve_timezone_fallback() {
        let tz = resolve_timezone("Not/AZone", "Europe/Moscow");
        assert_eq!(tz, chrono_tz::Europe::Moscow);
    }

    #[test]
    fn test_day_window_fixed_offset() {
        // Moscow is UTC+3 year-round: local midnight is 21:00 UTC the day before.
        let tz: Tz = "Europe/Moscow".parse().unwrap();
        let now = utc("2026-01-15T10:00:00Z");
        let (start, end) = day_window(tz, now, 0);
        assert_eq!(start, utc("2026-01-14T21:00:00Z").timestamp());
        assert_eq!(end, utc("2026-01-15T21:00:00Z").timestamp());
        assert_eq!(end - start, 86400);
    }

    #[test]
    fn test_day_window_days_ago() {
        let tz: Tz = "Europe/Moscow".parse().unwrap();
        let now = utc("2026-01-15T10:00:00Z");
        let (start0, _) = day_window(tz, now, 0);
        let (start1, end1) = day_window(tz, now, 1);
        assert_eq!(end1, start0);
        assert_eq!(start0 - start1, 86400);
    }

    #[test]
    fn test_day_window_dst_spring_forward() {
        // US DST starts 2026-03-08; the local day loses an hour at 02:00.
        let tz: Tz = "America/New_York".parse().unwrap();
        let now = utc("2026-03-08T18:00:00Z");
        let (start, end) = day_window(tz, now, 0);
        assert_eq!(end - start, 23 * 3600);
    }

    #[test]
    fn test_day_window_midnight_dst_gap() {
        // Chile jumps from 00:00 straight to 01:00 when DST starts, so this
        // local day has no midnight at all.
        let tz: Tz = "America/Santiago".parse().unwrap();
        let now = utc("2026-09-06T15:00:00Z");
        let (start, end) = day_window(tz, now, 0);
        assert!(end > start);
        assert_eq!(end - start, 23 * 3600);
    }

    #[test]
    fn test_local_hhmm() {
        let tz: Tz = "Europe/Moscow".parse().unwrap();
        let ts = utc("2026-01-15T09:05:00Z").timestamp();
        assert_eq!(local_hhmm(tz, ts), "12:05");
    }
}
