//! `CronSchedule` — a five-field cron parser plus the well-known `@`
//! shortcuts (spec.md §4.4, §6). Implementations "SHOULD provide a proper
//! parser" per spec.md §6; this one handles `*`, `*/step`, lists (`1,2,3`),
//! and ranges (`1-5`) on every field, which covers the explicit allow-list
//! there plus any expression built from the same grammar.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// One parsed cron field: matches a fixed set of candidate values.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Any,
    Values(Vec<u32>),
}

impl Field {
    fn matches(&self, value: u32) -> bool {
        match self {
            Field::Any => true,
            Field::Values(values) => values.contains(&value),
        }
    }

    fn is_restricted(&self) -> bool {
        matches!(self, Field::Values(_))
    }

    fn parse(raw: &str, min: u32, max: u32) -> Result<Self, String> {
        if raw == "*" {
            return Ok(Field::Any);
        }

        let mut values = Vec::new();
        for part in raw.split(',') {
            values.extend(Self::parse_part(part, min, max)?);
        }
        values.sort_unstable();
        values.dedup();
        if values.iter().any(|v| *v < min || *v > max) {
            return Err(format!("value out of range {min}..={max} in '{raw}'"));
        }
        Ok(Field::Values(values))
    }

    fn parse_part(part: &str, min: u32, max: u32) -> Result<Vec<u32>, String> {
        let (range_part, step) = match part.split_once('/') {
            Some((r, s)) => (r, Some(s.parse::<u32>().map_err(|_| format!("bad step in '{part}'"))?)),
            None => (part, None),
        };

        let (lo, hi) = if range_part == "*" {
            (min, max)
        } else if let Some((lo, hi)) = range_part.split_once('-') {
            (
                lo.parse::<u32>().map_err(|_| format!("bad range start in '{part}'"))?,
                hi.parse::<u32>().map_err(|_| format!("bad range end in '{part}'"))?,
            )
        } else {
            let v = range_part.parse::<u32>().map_err(|_| format!("bad value '{part}'"))?;
            (v, v)
        };

        if lo > hi {
            return Err(format!("range start exceeds end in '{part}'"));
        }

        let step = step.unwrap_or(1).max(1);
        Ok((lo..=hi).step_by(step as usize).collect())
    }
}

/// A parsed five-field cron expression: `minute hour day-of-month month
/// day-of-weekday`. When both day-of-month and day-of-week are restricted
/// (non-`*`), a candidate matches if *either* is satisfied — standard cron
/// semantics.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
}

/// `@`-prefixed shortcuts, expanded to their canonical five-field form
/// before parsing (spec.md §4.4 "`@hourly`, `@daily`, etc.").
fn expand_shortcut(expression: &str) -> Option<&'static str> {
    match expression {
        "@yearly" | "@annually" => Some("0 0 1 1 *"),
        "@monthly" => Some("0 0 1 * *"),
        "@weekly" => Some("0 0 * * 0"),
        "@daily" | "@midnight" => Some("0 0 * * *"),
        "@hourly" => Some("0 * * * *"),
        _ => None,
    }
}

impl CronSchedule {
    /// Parses `expression`, expanding `@`-shortcuts first. Parsing errors
    /// invalidate the schedule at registration time (spec.md §4.4).
    pub fn parse(expression: &str) -> Result<Self, SchedulerError> {
        let canonical = expand_shortcut(expression).unwrap_or(expression);
        let fields: Vec<&str> = canonical.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(SchedulerError::InvalidCronExpression {
                expression: expression.to_owned(),
                reason: format!("expected 5 fields, got {}", fields.len()),
            });
        }

        let parse_field = |raw: &str, min: u32, max: u32, name: &str| {
            Field::parse(raw, min, max).map_err(|reason| SchedulerError::InvalidCronExpression {
                expression: expression.to_owned(),
                reason: format!("{name}: {reason}"),
            })
        };

        Ok(Self {
            expression: expression.to_owned(),
            minute: parse_field(fields[0], 0, 59, "minute")?,
            hour: parse_field(fields[1], 0, 23, "hour")?,
            day_of_month: parse_field(fields[2], 1, 31, "day_of_month")?,
            month: parse_field(fields[3], 1, 12, "month")?,
            day_of_week: parse_field(fields[4], 0, 6, "day_of_week")?,
        })
    }

    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn matches(&self, dt: &DateTime<Utc>) -> bool {
        if !self.minute.matches(dt.minute()) || !self.hour.matches(dt.hour()) || !self.month.matches(dt.month()) {
            return false;
        }
        let dom_restricted = self.day_of_month.is_restricted();
        let dow_restricted = self.day_of_week.is_restricted();
        let weekday = dt.weekday().num_days_from_sunday();
        match (dom_restricted, dow_restricted) {
            (false, false) => true,
            (true, false) => self.day_of_month.matches(dt.day()),
            (false, true) => self.day_of_week.matches(weekday),
            (true, true) => self.day_of_month.matches(dt.day()) || self.day_of_week.matches(weekday),
        }
    }

    /// The next firing strictly after `from`, truncated to whole minutes
    /// (cron has minute resolution). Searches up to four years ahead; a
    /// schedule with no solution in that window (e.g. Feb 30th) returns
    /// `None` rather than looping forever.
    #[must_use]
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = (from + chrono::Duration::minutes(1))
            .with_second(0)
            .and_then(|d| d.with_nanosecond(0))?;

        let limit = from + chrono::Duration::days(366 * 4);
        let mut candidate = start;
        while candidate <= limit {
            if self.matches(&candidate) {
                return Some(candidate);
            }
            candidate += chrono::Duration::minutes(1);
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Cron,
    Interval,
    Once,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn every_minute_fires_next_minute() {
        let schedule = CronSchedule::parse("* * * * *").unwrap();
        let next = schedule.next_after(at(2026, 1, 1, 12, 0)).unwrap();
        assert_eq!(next, at(2026, 1, 1, 12, 1));
    }

    #[test]
    fn step_field_every_five_minutes() {
        let schedule = CronSchedule::parse("*/5 * * * *").unwrap();
        let next = schedule.next_after(at(2026, 1, 1, 12, 2)).unwrap();
        assert_eq!(next, at(2026, 1, 1, 12, 5));
    }

    #[test]
    fn daily_nine_am_fires_exactly_once_and_advances_a_day() {
        // spec.md §8 boundary behavior: "0 9 * * *" at 09:00:00 fires exactly
        // once; next_execution advances by one day.
        let schedule = CronSchedule::parse("0 9 * * *").unwrap();
        let fired_at = at(2026, 3, 10, 9, 0);
        let next = schedule.next_after(fired_at).unwrap();
        assert_eq!(next, at(2026, 3, 11, 9, 0));
    }

    #[test]
    fn weekday_range_restricts_to_mon_fri() {
        let schedule = CronSchedule::parse("0 9 * * 1-5").unwrap();
        // 2026-01-03 is a Saturday; next weekday 09:00 run is Monday 2026-01-05.
        let next = schedule.next_after(at(2026, 1, 3, 0, 0)).unwrap();
        assert_eq!(next, at(2026, 1, 5, 9, 0));
    }

    #[test]
    fn shortcut_hourly_matches_canonical_form() {
        let shortcut = CronSchedule::parse("@hourly").unwrap();
        let canonical = CronSchedule::parse("0 * * * *").unwrap();
        let from = at(2026, 1, 1, 12, 30);
        assert_eq!(shortcut.next_after(from), canonical.next_after(from));
    }

    #[test]
    fn malformed_expression_is_rejected() {
        assert!(CronSchedule::parse("not a cron").is_err());
        assert!(CronSchedule::parse("60 * * * *").is_err());
    }

    #[test]
    fn spec_allow_list_all_parse() {
        for expr in [
            "* * * * *", "*/5 * * * *", "*/15 * * * *", "*/30 * * * *",
            "0 * * * *", "0 0 * * *", "0 9 * * *", "0 0 * * 1", "0 9 * * 1-5",
        ] {
            assert!(CronSchedule::parse(expr).is_ok(), "failed to parse '{expr}'");
        }
    }
}
