use chrono::{DateTime, Duration, NaiveTime, TimeZone};

/// Formats elapsed time the way timers display it: `H:MM:SS`, or `M:SS` when there are no hours.
/// Negative values are shown as zero.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = total / 60 % 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Short form used in summaries, e.g. `2h 05m` or `45m`.
pub fn format_short(duration: Duration) -> String {
    let hours = duration.num_hours();
    let minutes = duration.num_minutes() % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else {
        format!("{minutes}m")
    }
}

/// Duration expressed in fractional hours, used for billing.
pub fn as_hours(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 3_600_000.
}

/// Returns start of the next day. When midnight doesn't exist in `Tz` the same time next day is
/// returned.
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Tz> {
    let next = date + Duration::days(1);
    next.with_time(NaiveTime::MIN).earliest().unwrap_or(next)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{as_hours, format_elapsed, format_short, next_day_start};

    #[test]
    fn omits_hours_when_zero() {
        assert_eq!(format_elapsed(Duration::seconds(240)), "4:00");
        assert_eq!(format_elapsed(Duration::seconds(59)), "0:59");
        assert_eq!(format_elapsed(Duration::seconds(3599)), "59:59");
    }

    #[test]
    fn includes_hours() {
        assert_eq!(format_elapsed(Duration::seconds(3600)), "1:00:00");
        assert_eq!(format_elapsed(Duration::seconds(3 * 3600 + 62)), "3:01:02");
    }

    #[test]
    fn negative_is_zero() {
        assert_eq!(format_elapsed(Duration::seconds(-30)), "0:00");
    }

    #[test]
    fn short_format() {
        assert_eq!(format_short(Duration::minutes(125)), "2h 05m");
        assert_eq!(format_short(Duration::minutes(45)), "45m");
    }

    #[test]
    fn hours_fraction() {
        assert!((as_hours(Duration::minutes(90)) - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn next_day_starts_at_midnight() {
        let evening = Utc.with_ymd_and_hms(2025, 11, 6, 21, 30, 0).unwrap();
        assert_eq!(
            next_day_start(evening),
            Utc.with_ymd_and_hms(2025, 11, 7, 0, 0, 0).unwrap()
        );
    }
}
