// src/trigger/schedule.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::errors::{EtlError, Result};

/// Cron schedule for a DAG.
///
/// Accepts the classic 5-field form (`min hour dom month dow`, seconds
/// implied 0, Sunday is 0 or 7), the 6/7-field form of the `cron` crate
/// (Sunday is 1), and shorthands such as `@hourly`.
#[derive(Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
}

/// Most recent due tick plus how many older due ticks were dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueTick {
    pub tick: DateTime<Utc>,
    pub skipped: u64,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        let normalized = if !trimmed.starts_with('@') && fields.len() == 5 {
            let dow = classic_day_of_week(fields[4]).map_err(|e| {
                EtlError::Config(format!("invalid schedule '{expression}': {e}"))
            })?;
            format!("0 {} {dow}", fields[..4].join(" "))
        } else {
            trimmed.to_string()
        };

        let schedule = cron::Schedule::from_str(&normalized).map_err(|e| {
            EtlError::Config(format!("invalid schedule '{expression}': {e}"))
        })?;

        Ok(Self {
            expression: trimmed.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First tick strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// No-catchup selection: of all ticks in `(after, now]`, only the latest
    /// is eligible. Returns `None` when nothing is due.
    pub fn latest_due(&self, after: DateTime<Utc>, now: DateTime<Utc>) -> Option<DueTick> {
        let mut latest = None;
        let mut due = 0u64;

        for tick in self.schedule.after(&after) {
            if tick > now {
                break;
            }
            latest = Some(tick);
            due += 1;
        }

        latest.map(|tick| DueTick {
            tick,
            skipped: due - 1,
        })
    }
}

/// Translate a classic day-of-week field (0-7, Sunday is 0 and 7) into the
/// `cron` crate's numbering (1-7, Sunday is 1).
///
/// Numeric items (values, ranges, steps) are expanded into an explicit list;
/// named days pass through untouched.
fn classic_day_of_week(field: &str) -> std::result::Result<String, String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }

    let mut days = [false; 7];
    let mut named = Vec::new();

    for item in field.split(',') {
        if item.chars().any(|c| c.is_ascii_alphabetic()) {
            named.push(item.to_string());
            continue;
        }

        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid day-of-week step in '{item}'"))?;
                if step == 0 {
                    return Err(format!("day-of-week step must be positive in '{item}'"));
                }
                (range, step)
            }
            None => (item, 1),
        };

        let (start, end) = match range {
            "*" => (0, 6),
            _ => match range.split_once('-') {
                Some((a, b)) => (day_number(a)?, day_number(b)?),
                None if step > 1 => (day_number(range)?, 6),
                None => {
                    let day = day_number(range)?;
                    (day, day)
                }
            },
        };
        if start > end {
            return Err(format!("day-of-week range '{range}' is descending"));
        }

        for day in (start..=end).step_by(step as usize) {
            days[(day % 7) as usize] = true;
        }
    }

    let mut items: Vec<String> = days
        .iter()
        .enumerate()
        .filter(|(_, set)| **set)
        .map(|(day, _)| (day + 1).to_string())
        .collect();
    items.extend(named);
    Ok(items.join(","))
}

fn day_number(raw: &str) -> std::result::Result<u32, String> {
    match raw.parse::<u32>() {
        Ok(day) if day <= 7 => Ok(day),
        _ => Err(format!("day of week '{raw}' must be between 0 and 7")),
    }
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.expression).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    #[test]
    fn five_field_expression_gets_implied_seconds() {
        let hourly = CronSchedule::parse("0 * * * *").unwrap();
        assert_eq!(hourly.next_after(at(10, 15)), Some(at(11, 0)));
        assert_eq!(hourly.expression(), "0 * * * *");
    }

    fn weekdays_after(schedule: &CronSchedule, from: DateTime<Utc>, n: usize) -> Vec<String> {
        let mut out = Vec::new();
        let mut cursor = from;
        for _ in 0..n {
            cursor = schedule.next_after(cursor).unwrap();
            out.push(cursor.format("%a").to_string());
        }
        out
    }

    #[test]
    fn classic_weekday_range_means_monday_to_friday() {
        let weekdays = CronSchedule::parse("0 9 * * 1-5").unwrap();
        // 2024-05-04 is a Saturday.
        let saturday = Utc.with_ymd_and_hms(2024, 5, 4, 12, 0, 0).unwrap();
        assert_eq!(
            weekdays_after(&weekdays, saturday, 5),
            vec!["Mon", "Tue", "Wed", "Thu", "Fri"]
        );
        let first = weekdays.next_after(saturday).unwrap();
        assert_eq!(first, Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap());
    }

    #[test]
    fn zero_and_seven_are_sunday() {
        let saturday = Utc.with_ymd_and_hms(2024, 5, 4, 12, 0, 0).unwrap();
        for expr in ["0 0 * * 0", "0 0 * * 7"] {
            let sunday = CronSchedule::parse(expr).unwrap();
            assert_eq!(weekdays_after(&sunday, saturday, 2), vec!["Sun", "Sun"]);
        }
    }

    #[test]
    fn day_of_week_lists_steps_and_names_are_translated() {
        assert_eq!(classic_day_of_week("*").unwrap(), "*");
        assert_eq!(classic_day_of_week("0,6").unwrap(), "1,7");
        assert_eq!(classic_day_of_week("5-7").unwrap(), "1,6,7");
        assert_eq!(classic_day_of_week("*/2").unwrap(), "1,3,5,7");
        assert_eq!(classic_day_of_week("MON-FRI").unwrap(), "MON-FRI");
        assert!(classic_day_of_week("8").is_err());
        assert!(classic_day_of_week("5-1").is_err());
    }

    #[test]
    fn shorthand_is_accepted() {
        let hourly = CronSchedule::parse("@hourly").unwrap();
        assert_eq!(hourly.next_after(at(10, 0)), Some(at(11, 0)));
    }

    #[test]
    fn garbage_is_a_config_error() {
        let err = CronSchedule::parse("every tuesday").unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }

    #[test]
    fn only_latest_backlog_tick_is_due() {
        let hourly = CronSchedule::parse("0 * * * *").unwrap();
        let due = hourly.latest_due(at(7, 30), at(10, 5)).unwrap();
        assert_eq!(due.tick, at(10, 0));
        assert_eq!(due.skipped, 2);

        assert!(hourly.latest_due(at(10, 0), at(10, 59)).is_none());
        let exact = hourly.latest_due(at(10, 30), at(11, 0)).unwrap();
        assert_eq!(exact, DueTick { tick: at(11, 0), skipped: 0 });
    }
}
