//! Minimal daily cron expressions: "MIN HOUR * * *".
//! Minute and hour fields take `*`, `*/N`, `N` or `N,M,...`; the date fields must be `*`.

use crate::types::CallTime;

use chrono::{DateTime, Days, TimeZone};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CronSpec {
    expression: String,
    minutes: Vec<u32>,
    hours: Vec<u32>,
}

impl CronSpec {
    pub fn parse(expression: &str) -> Result<Self, String> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(format!(
                "invalid cron expression '{expression}' (need 5 fields: MIN HOUR DOM MON DOW)"
            ));
        }
        if parts[2..].iter().any(|p| *p != "*") {
            return Err(format!(
                "cron expression '{expression}' must fire daily (DOM MON DOW = * * *)"
            ));
        }
        let minutes = parse_field(parts[0], 0, 59)
            .ok_or_else(|| format!("bad minute field in '{expression}'"))?;
        let hours = parse_field(parts[1], 0, 23)
            .ok_or_else(|| format!("bad hour field in '{expression}'"))?;
        Ok(Self {
            expression: expression.to_string(),
            minutes,
            hours,
        })
    }

    /// Once a day at `at`.
    pub fn daily(at: CallTime) -> Self {
        Self {
            expression: format!("{} {} * * *", at.minute, at.hour),
            minutes: vec![at.minute],
            hours: vec![at.hour],
        }
    }

    /// First firing strictly after `after`, in `after`'s timezone.  Local times skipped by a DST
    /// jump never fire.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let today = after.naive_local().date();
        (0..=2)
            .filter_map(|d| today.checked_add_days(Days::new(d)))
            .flat_map(|date| {
                self.hours.iter().flat_map(move |h| {
                    self.minutes
                        .iter()
                        .filter_map(move |m| date.and_hms_opt(*h, *m, 0))
                })
            })
            .filter_map(|naive| tz.from_local_datetime(&naive).earliest())
            .filter(|t| t > after)
            .min()
    }
}

impl fmt::Display for CronSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Parse a cron field into a sorted list of matching values.
fn parse_field(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    if field == "*" {
        return Some((min..=max).collect());
    }

    if let Some(step) = field.strip_prefix("*/") {
        let n: u32 = step.parse().ok()?;
        if n == 0 {
            return None;
        }
        return Some((min..=max).step_by(n as usize).collect());
    }

    let mut vals = field
        .split(',')
        .map(|s| s.trim().parse::<u32>().ok().filter(|v| (min..=max).contains(v)))
        .collect::<Option<Vec<u32>>>()?;
    vals.sort_unstable();
    vals.dedup();
    Some(vals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Timelike, Utc};

    #[test]
    fn fires_later_today() {
        let spec = CronSpec::parse("0 7 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 10, 16, 6, 59, 30).unwrap();
        let next = spec.next_after(&after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 16, 7, 0, 0).unwrap());
    }

    #[test]
    fn rolls_to_tomorrow_once_past() {
        let spec = CronSpec::parse("0 7 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 10, 16, 7, 0, 0).unwrap();
        let next = spec.next_after(&after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 17, 7, 0, 0).unwrap());
    }

    #[test]
    fn respects_the_given_offset() {
        let spec = CronSpec::daily(CallTime { hour: 9, minute: 30 });
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let after = tz.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let next = spec.next_after(&after).unwrap();
        assert_eq!(next.hour(), 9);
        assert_eq!(next.minute(), 30);
        assert_eq!(next.date_naive(), after.date_naive().succ_opt().unwrap());
        assert_eq!(spec.to_string(), "30 9 * * *");
    }

    #[test]
    fn lists_and_steps() {
        let spec = CronSpec::parse("*/15 8,20 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 10, 16, 8, 20, 0).unwrap();
        let next = spec.next_after(&after).unwrap();
        assert_eq!((next.hour(), next.minute()), (8, 30));
    }

    #[test]
    fn rejects_bad_expressions() {
        assert!(CronSpec::parse("bad").is_err());
        assert!(CronSpec::parse("0 25 * * *").is_err());
        assert!(CronSpec::parse("0 7 1 * *").is_err());
        assert!(CronSpec::parse("*/0 7 * * *").is_err());
    }
}
