//! Recurring check cadence.
//!
//! Accepts classic five-field cron expressions (`*/1 * * * *`) as well as
//! the six/seven-field form with a leading seconds column and the named
//! `@hourly`-style shortcuts understood by the `cron` crate.

use chrono::{DateTime, Local};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{RetrierError, Result};

#[derive(Debug, Clone)]
pub struct Cadence {
    expression: String,
    schedule: cron::Schedule,
}

impl Cadence {
    /// Parse and validate a cron expression.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchedule` for empty or malformed expressions.
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();

        if expression.is_empty() {
            return Err(RetrierError::InvalidSchedule {
                expression: expression.to_string(),
                reason: "cron expression cannot be empty".to_string(),
            });
        }

        let normalized = normalize(expression);
        let schedule =
            cron::Schedule::from_str(&normalized).map_err(|e| RetrierError::InvalidSchedule {
                expression: expression.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    /// The expression as configured, before normalization.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First tick strictly after `after`.
    pub fn next_after(&self, after: DateTime<Local>) -> Option<DateTime<Local>> {
        self.schedule.after(&after).next()
    }

    /// Time to wait from `now` until `tick`, zero if it already passed.
    pub fn delay_until(now: DateTime<Local>, tick: DateTime<Local>) -> Duration {
        (tick - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// The `cron` crate always wants a seconds column; five-field expressions
/// get one pinned to zero. Five-field day-of-week values also follow the
/// classic numbering (0 or 7 = Sunday) and are translated to the crate's
/// 1 = Sunday.
fn normalize(expression: &str) -> String {
    if expression.starts_with('@') {
        return expression.to_string();
    }

    let mut fields: Vec<String> = expression.split_whitespace().map(str::to_string).collect();
    if fields.len() == 5 {
        fields[4] = translate_weekdays(&fields[4]);
        fields.insert(0, "0".to_string());
    }
    fields.join(" ")
}

/// Rewrite numeric day-of-week items as explicit 1-7 day lists.
///
/// `*`, `?`, `*/n` and named days mean the same thing under both
/// numberings and pass through. Items that do not parse are left alone so
/// the `cron` crate reports them.
fn translate_weekdays(field: &str) -> String {
    field
        .split(',')
        .map(|item| match classic_weekdays(item) {
            Some(days) => days
                .iter()
                .map(|day| (day + 1).to_string())
                .collect::<Vec<_>>()
                .join(","),
            None => item.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Expand one classic item (`a`, `a-b`, `a-b/n`, `a/n`) into sorted
/// days with Sunday as 0.
fn classic_weekdays(item: &str) -> Option<Vec<u32>> {
    if item.starts_with('*') || item == "?" || item.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step.parse::<usize>().ok().filter(|n| *n > 0)?)),
        None => (item, None),
    };

    let (start, end) = match range.split_once('-') {
        Some((start, end)) => (start.parse::<u32>().ok()?, end.parse::<u32>().ok()?),
        None => {
            let start = range.parse::<u32>().ok()?;
            (start, if step.is_some() { 6 } else { start })
        }
    };

    if start > end || end > 7 {
        return None;
    }

    let mut days: Vec<u32> = (start..=end)
        .step_by(step.unwrap_or(1))
        .map(|day| day % 7)
        .collect();
    days.sort_unstable();
    days.dedup();
    Some(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Weekday};

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 1, 15, hour, minute, second)
            .single()
            .unwrap()
    }

    #[test]
    fn test_default_every_minute() {
        let cadence = Cadence::parse("*/1 * * * *").unwrap();
        assert_eq!(cadence.expression(), "*/1 * * * *");

        let next = cadence.next_after(at(9, 0, 30)).unwrap();
        assert_eq!((next.hour(), next.minute(), next.second()), (9, 1, 0));
    }

    #[test]
    fn test_five_field_expression_fires_on_the_minute() {
        let cadence = Cadence::parse("*/5 * * * *").unwrap();

        let next = cadence.next_after(at(9, 2, 0)).unwrap();
        assert_eq!((next.minute(), next.second()), (5, 0));

        let after_that = cadence.next_after(next).unwrap();
        assert_eq!(after_that.minute(), 10);
    }

    #[test]
    fn test_six_field_expression_with_seconds() {
        let cadence = Cadence::parse("*/30 * * * * *").unwrap();
        let next = cadence.next_after(at(9, 0, 10)).unwrap();
        assert_eq!((next.minute(), next.second()), (0, 30));
    }

    #[test]
    fn test_named_schedule() {
        let cadence = Cadence::parse("@hourly").unwrap();
        let next = cadence.next_after(at(9, 15, 0)).unwrap();
        assert_eq!((next.hour(), next.minute()), (10, 0));
    }

    #[test]
    fn test_invalid_expressions() {
        for expression in ["", "   ", "not a cron", "61 * * * *", "* * *"] {
            let err = Cadence::parse(expression).unwrap_err();
            assert!(
                matches!(err, RetrierError::InvalidSchedule { .. }),
                "{expression:?} should be rejected"
            );
        }
    }

    fn weekdays(expression: &str, count: usize) -> Vec<Weekday> {
        let cadence = Cadence::parse(expression).unwrap();
        // Sunday 2024-01-14, after the 09:00 slot
        let mut tick = Local.with_ymd_and_hms(2024, 1, 14, 10, 0, 0).single().unwrap();
        (0..count)
            .map(|_| {
                tick = cadence.next_after(tick).unwrap();
                tick.weekday()
            })
            .collect()
    }

    #[test]
    fn test_five_field_weekdays_use_classic_numbering() {
        assert_eq!(
            weekdays("0 9 * * 1-5", 6),
            vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Mon
            ]
        );
        assert_eq!(weekdays("0 9 * * 0", 2), vec![Weekday::Sun, Weekday::Sun]);
        assert_eq!(weekdays("0 9 * * 7", 1), vec![Weekday::Sun]);
        assert_eq!(weekdays("0 9 * * 1", 1), vec![Weekday::Mon]);
        assert_eq!(
            weekdays("0 9 * * 5-7", 3),
            vec![Weekday::Fri, Weekday::Sat, Weekday::Sun]
        );
        assert_eq!(
            weekdays("0 9 * * 1,3", 3),
            vec![Weekday::Mon, Weekday::Wed, Weekday::Mon]
        );
    }

    #[test]
    fn test_normalize_weekday_field() {
        assert_eq!(normalize("0 9 * * 1-5"), "0 0 9 * * 2,3,4,5,6");
        assert_eq!(normalize("0 9 * * 0,6"), "0 0 9 * * 1,7");
        assert_eq!(normalize("0 9 * * 0-6/2"), "0 0 9 * * 1,3,5,7");
        assert_eq!(normalize("0 9 * * 1/3"), "0 0 9 * * 2,5");
        assert_eq!(normalize("*/1 * * * *"), "0 */1 * * * *");
        assert_eq!(normalize("0 9 * * */2"), "0 0 9 * * */2");
        assert_eq!(normalize("0 9 * * MON-FRI"), "0 0 9 * * MON-FRI");
        // Six-field expressions already use the crate's numbering
        assert_eq!(normalize("0 0 9 * * 2"), "0 0 9 * * 2");
    }

    #[test]
    fn test_delay_until() {
        assert_eq!(
            Cadence::delay_until(at(9, 0, 0), at(9, 0, 45)),
            Duration::from_secs(45)
        );
        assert_eq!(Cadence::delay_until(at(9, 1, 0), at(9, 0, 0)), Duration::ZERO);
    }
}
