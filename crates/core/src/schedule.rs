//! Run schedules from plain-language expressions such as "every 6 hours",
//! "daily at 3pm" or "in 2 days".
//!
//! Recurring schedules are stored as five-field cron expressions. Their next
//! run is computed here, in UTC, for the shapes this parser produces.

use std::sync::LazyLock;

use chrono::{Datelike, Duration, DurationRound, NaiveTime, Timelike, Weekday};
use regex::Regex;

use crate::error::CoreError;
use crate::types::Timestamp;

/// Longest delay accepted for a one-time run.
pub const MAX_ONE_TIME_DELAY_DAYS: i64 = 30;

const INVALID_EXPRESSION: &str = "Invalid expression. Please provide a time expression like: \
                                  'every 6 hours', 'in 5 hours', 'daily at 3pm'";
const NOT_UNDERSTOOD: &str = "Could not understand time expression. Examples: \
                              'every 6 hours', 'in 5 hours', 'daily at 3pm', 'every monday at 9am'";

static EVERY_MINUTES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"every\s+(\d+)\s+minutes?").expect("valid regex"));

static EVERY_HOURS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"every\s+(\d+)\s+hours?").expect("valid regex"));

static EVERY_DAYS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"every\s+(\d+)\s+days?").expect("valid regex"));

static DAILY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"daily\s+at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?").expect("valid regex")
});

static WEEKLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"every\s+(sunday|monday|tuesday|wednesday|thursday|friday|saturday|sun|mon|tues|tue|wed|thurs|thur|thu|fri|sat)\s+at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?",
    )
    .expect("valid regex")
});

static ONE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:in|after)\s+(\d+)\s+(minute|hour|day)s?").expect("valid regex")
});

/// A repeating schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    EveryMinutes(u32),
    EveryHours(u32),
    EveryDays(u32),
    Daily(NaiveTime),
    Weekly(Weekday, NaiveTime),
}

impl Recurrence {
    pub fn cron(&self) -> String {
        match *self {
            Self::EveryMinutes(n) => format!("*/{n} * * * *"),
            Self::EveryHours(n) => format!("0 */{n} * * *"),
            Self::EveryDays(n) => format!("0 0 */{n} * *"),
            Self::Daily(at) => format!("{} {} * * *", at.minute(), at.hour()),
            Self::Weekly(day, at) => format!(
                "{} {} * * {}",
                at.minute(),
                at.hour(),
                day.num_days_from_sunday()
            ),
        }
    }

    /// First time strictly after `now` the cron expression fires.
    pub fn next_after(&self, now: Timestamp) -> Timestamp {
        match *self {
            Self::EveryMinutes(n) => {
                let n = n.max(1);
                let mut t = truncate(now, Duration::minutes(1)) + Duration::minutes(1);
                while t.minute() % n != 0 {
                    t += Duration::minutes(1);
                }
                t
            }
            Self::EveryHours(n) => {
                let n = n.max(1);
                let mut t = truncate(now, Duration::hours(1)) + Duration::hours(1);
                while t.hour() % n != 0 {
                    t += Duration::hours(1);
                }
                t
            }
            Self::EveryDays(n) => {
                let n = n.max(1);
                let mut t = truncate(now, Duration::days(1)) + Duration::days(1);
                while (t.day() - 1) % n != 0 {
                    t += Duration::days(1);
                }
                t
            }
            Self::Daily(at) => {
                let today = now.date_naive().and_time(at).and_utc();
                if today > now {
                    today
                } else {
                    today + Duration::days(1)
                }
            }
            Self::Weekly(day, at) => {
                let mut t = now.date_naive().and_time(at).and_utc();
                while t.weekday() != day || t <= now {
                    t += Duration::days(1);
                }
                t
            }
        }
    }
}

fn truncate(now: Timestamp, unit: Duration) -> Timestamp {
    now.duration_trunc(unit).unwrap_or(now)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleKind {
    Recurring(Recurrence),
    OneTime(Duration),
}

/// A parsed schedule with its first run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub kind: ScheduleKind,
    /// "Every 6 hours", "Daily at 3pm", "In 2 days".
    pub description: String,
    pub next_run: Timestamp,
}

impl Schedule {
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ScheduleKind::Recurring(_) => "recurring",
            ScheduleKind::OneTime(_) => "one_time",
        }
    }

    /// `None` for one-time runs.
    pub fn cron(&self) -> Option<String> {
        match &self.kind {
            ScheduleKind::Recurring(r) => Some(r.cron()),
            ScheduleKind::OneTime(_) => None,
        }
    }
}

/// Parse `expression` relative to `now`.
pub fn parse_time_expression(expression: &str, now: Timestamp) -> Result<Schedule, CoreError> {
    let normalized = expression.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(CoreError::Validation(INVALID_EXPRESSION.into()));
    }

    if let Some((recurrence, description)) = recurring(&normalized) {
        return Ok(Schedule {
            kind: ScheduleKind::Recurring(recurrence),
            description,
            next_run: recurrence.next_after(now),
        });
    }

    if let Some((delay, description)) = one_time(&normalized)? {
        return Ok(Schedule {
            kind: ScheduleKind::OneTime(delay),
            description,
            next_run: now + delay,
        });
    }

    Err(CoreError::Validation(NOT_UNDERSTOOD.into()))
}

fn plural(n: u64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Digit runs too long for a `u32` are out of every accepted range anyway.
fn number(text: &str) -> u32 {
    text.parse().unwrap_or(u32::MAX)
}

fn every(re: &Regex, text: &str, range: std::ops::RangeInclusive<u32>) -> Option<u32> {
    re.captures(text)
        .map(|caps| number(&caps[1]))
        .filter(|n| range.contains(n))
}

fn recurring(text: &str) -> Option<(Recurrence, String)> {
    if let Some(n) = every(&EVERY_MINUTES_RE, text, 1..=59) {
        return Some((
            Recurrence::EveryMinutes(n),
            format!("Every {n} minute{}", plural(n.into())),
        ));
    }
    if let Some(n) = every(&EVERY_HOURS_RE, text, 1..=23) {
        return Some((
            Recurrence::EveryHours(n),
            format!("Every {n} hour{}", plural(n.into())),
        ));
    }
    if let Some(n) = every(&EVERY_DAYS_RE, text, 1..=30) {
        return Some((
            Recurrence::EveryDays(n),
            format!("Every {n} day{}", plural(n.into())),
        ));
    }

    if let Some(caps) = DAILY_RE.captures(text) {
        if let Some((at, label)) = clock_time(&caps[1], caps.get(2), caps.get(3)) {
            return Some((Recurrence::Daily(at), format!("Daily at {label}")));
        }
    }

    if let Some(caps) = WEEKLY_RE.captures(text) {
        let day = weekday(&caps[1])?;
        if let Some((at, label)) = clock_time(&caps[2], caps.get(3), caps.get(4)) {
            return Some((
                Recurrence::Weekly(day, at),
                format!("Every {} at {label}", weekday_name(day)),
            ));
        }
    }
    None
}

/// A wall-clock time in 12- or 24-hour form, and how to show it back.
fn clock_time(
    hour: &str,
    minute: Option<regex::Match<'_>>,
    meridiem: Option<regex::Match<'_>>,
) -> Option<(NaiveTime, String)> {
    let raw_hour = number(hour);
    let minute_text = minute.map(|m| m.as_str());
    let min = minute_text.map(number).unwrap_or(0);
    let meridiem = meridiem.map(|m| m.as_str());
    let hour = match meridiem {
        Some("pm") if raw_hour != 12 => raw_hour.checked_add(12)?,
        Some("am") if raw_hour == 12 => 0,
        _ => raw_hour,
    };
    let at = NaiveTime::from_hms_opt(hour, min, 0)?;
    let label = match meridiem {
        Some(m) => match minute_text {
            Some(mm) => format!("{raw_hour}:{mm}{m}"),
            None => format!("{raw_hour}{m}"),
        },
        None => format!("{hour:02}:{min:02}"),
    };
    Some((at, label))
}

fn weekday(name: &str) -> Option<Weekday> {
    Some(match name {
        "sunday" | "sun" => Weekday::Sun,
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" | "tues" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" | "thur" | "thurs" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        _ => return None,
    })
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Sun => "Sunday",
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
    }
}

fn one_time(text: &str) -> Result<Option<(Duration, String)>, CoreError> {
    let Some(caps) = ONE_TIME_RE.captures(text) else {
        return Ok(None);
    };
    let amount: u64 = caps[1].parse().unwrap_or(u64::MAX);
    let unit = &caps[2];
    let minutes_per_unit: u64 = match unit {
        "minute" => 1,
        "hour" => 60,
        _ => 24 * 60,
    };

    if amount == 0 {
        return Err(CoreError::Validation(
            "Delay must be a positive number. Examples: 'in 5 hours', 'after 30 minutes', 'in 2 days'"
                .into(),
        ));
    }
    let max_minutes = (MAX_ONE_TIME_DELAY_DAYS * 24 * 60) as u64;
    let minutes = amount
        .checked_mul(minutes_per_unit)
        .filter(|m| *m <= max_minutes)
        .ok_or_else(|| {
            CoreError::Validation(format!(
                "Delay cannot exceed {MAX_ONE_TIME_DELAY_DAYS} days. Please use a shorter delay or set up a recurring schedule."
            ))
        })?;

    Ok(Some((
        Duration::minutes(minutes as i64),
        format!("In {amount} {unit}{}", plural(amount)),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    /// Wednesday 2026-03-04 10:17:30 UTC.
    fn now() -> Timestamp {
        chrono::Utc.with_ymd_and_hms(2026, 3, 4, 10, 17, 30).unwrap()
    }

    fn at(d: u32, h: u32, m: u32) -> Timestamp {
        chrono::Utc.with_ymd_and_hms(2026, 3, d, h, m, 0).unwrap()
    }

    #[test]
    fn intervals() {
        let s = parse_time_expression("Every 15 minutes", now()).unwrap();
        assert_eq!(s.cron().as_deref(), Some("*/15 * * * *"));
        assert_eq!(s.description, "Every 15 minutes");
        assert_eq!(s.next_run, at(4, 10, 30));

        let s = parse_time_expression("every 6 hours", now()).unwrap();
        assert_eq!(s.cron().as_deref(), Some("0 */6 * * *"));
        assert_eq!(s.next_run, at(4, 12, 0));

        let s = parse_time_expression("every 1 day", now()).unwrap();
        assert_eq!(s.description, "Every 1 day");
        assert_eq!(s.cron().as_deref(), Some("0 0 */1 * *"));
        assert_eq!(s.next_run, at(5, 0, 0));
    }

    #[test]
    fn day_intervals_follow_day_of_month() {
        // Days 1, 4, 7, ... of the month.
        let s = parse_time_expression("every 3 days", now()).unwrap();
        assert_eq!(s.next_run, at(7, 0, 0));
    }

    #[test]
    fn daily_times() {
        let s = parse_time_expression("daily at 3pm", now()).unwrap();
        assert_eq!(s.cron().as_deref(), Some("0 15 * * *"));
        assert_eq!(s.description, "Daily at 3pm");
        assert_eq!(s.next_run, at(4, 15, 0));

        // Already past today.
        let s = parse_time_expression("daily at 9:05", now()).unwrap();
        assert_eq!(s.description, "Daily at 09:05");
        assert_eq!(s.next_run, at(5, 9, 5));

        let s = parse_time_expression("daily at 12am", now()).unwrap();
        assert_eq!(s.cron().as_deref(), Some("0 0 * * *"));
    }

    #[test]
    fn weekly_times() {
        let s = parse_time_expression("every monday at 9am", now()).unwrap();
        assert_eq!(s.cron().as_deref(), Some("0 9 * * 1"));
        assert_eq!(s.description, "Every Monday at 9am");
        assert_eq!(s.next_run, at(9, 9, 0));

        // Later today counts.
        let s = parse_time_expression("every wed at 11:30pm", now()).unwrap();
        assert_eq!(s.cron().as_deref(), Some("30 23 * * 3"));
        assert_eq!(s.next_run, at(4, 23, 30));
    }

    #[test]
    fn one_time_delays() {
        let s = parse_time_expression("run it in 5 hours please", now()).unwrap();
        assert_eq!(s.kind, ScheduleKind::OneTime(Duration::hours(5)));
        assert_eq!(s.kind_name(), "one_time");
        assert_eq!(s.cron(), None);
        assert_eq!(s.description, "In 5 hours");
        assert_eq!(s.next_run, now() + Duration::hours(5));

        let s = parse_time_expression("after 1 minute", now()).unwrap();
        assert_eq!(s.description, "In 1 minute");
    }

    #[test]
    fn out_of_range_and_unknown() {
        assert_matches!(
            parse_time_expression("in 31 days", now()),
            Err(CoreError::Validation(msg)) if msg.contains("cannot exceed 30 days")
        );
        assert_matches!(
            parse_time_expression("in 99999999999999999999 minutes", now()),
            Err(CoreError::Validation(msg)) if msg.contains("cannot exceed")
        );
        assert_matches!(
            parse_time_expression("in 0 hours", now()),
            Err(CoreError::Validation(msg)) if msg.contains("positive")
        );
        assert_matches!(
            parse_time_expression("every 60 minutes", now()),
            Err(CoreError::Validation(msg)) if msg.starts_with("Could not understand")
        );
        assert_matches!(
            parse_time_expression("daily at 13pm", now()),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            parse_time_expression("   ", now()),
            Err(CoreError::Validation(msg)) if msg.starts_with("Invalid expression")
        );
    }
}
