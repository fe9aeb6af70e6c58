//! Cron schedules evaluated at minute granularity.
//!
//! Expressions use the standard 5-field layout
//! (`minute hour day-of-month month day-of-week`). The `cron` crate wants a
//! leading seconds field and numbers weekdays 1-7 starting at Sunday, so
//! expressions are rewritten before parsing: seconds are pinned to `0` and
//! numeric weekdays are replaced by their names.

use std::str::FromStr;

use chrono::{DateTime, Duration, TimeZone, Timelike};
use color_eyre::eyre::{bail, eyre, WrapErr};
use color_eyre::Result;
use cron::Schedule;

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// A validated cron expression.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: Schedule,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            bail!(
                "cron expression '{expression}' must have 5 fields, found {}",
                fields.len()
            );
        }

        let day_of_week = translate_day_of_week(fields[4])
            .wrap_err_with(|| format!("invalid day-of-week in cron expression '{expression}'"))?;
        let normalized = format!(
            "0 {} {} {} {} {}",
            fields[0], fields[1], fields[2], fields[3], day_of_week
        );
        let schedule = Schedule::from_str(&normalized)
            .map_err(|e| eyre!("invalid cron expression '{expression}': {e}"))?;

        Ok(Self {
            expression: fields.join(" "),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whether the wall-clock minute containing `at` is selected by this schedule.
    pub fn matches<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        let minute = start_of_minute(at);
        let just_before = minute.clone() - Duration::seconds(1);
        self.schedule
            .after(&just_before)
            .next()
            .is_some_and(|next| next == minute)
    }
}

pub fn start_of_minute<Tz: TimeZone>(at: &DateTime<Tz>) -> DateTime<Tz> {
    at.clone()
        - Duration::seconds(i64::from(at.second()))
        - Duration::nanoseconds(i64::from(at.nanosecond()))
}

/// The first whole minute strictly after `tick`.
pub fn next_tick<Tz: TimeZone>(tick: &DateTime<Tz>) -> DateTime<Tz> {
    start_of_minute(tick) + Duration::minutes(1)
}

/// Rewrites numeric weekdays (0-7, Sunday being 0 or 7) as day names.
///
/// Wildcards and items already written with names are passed through, since
/// `*/n` selects the same days under both numberings.
fn translate_day_of_week(field: &str) -> Result<String> {
    let mut days: Vec<String> = Vec::new();

    for item in field.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => (base, Some(step)),
            None => (item, None),
        };

        let step = match step {
            Some(step) => match step.parse::<u32>() {
                Ok(step) if step > 0 => Some(step),
                _ => bail!("invalid day-of-week step '{step}'"),
            },
            None => None,
        };

        if base == "*" || base == "?" || base.chars().any(|c| c.is_ascii_alphabetic()) {
            days.push(item.to_string());
            continue;
        }

        let (start, end) = match base.split_once('-') {
            Some((start, end)) => (parse_day(start)?, parse_day(end)?),
            None => {
                let day = parse_day(base)?;
                // `5/2` means "from Friday to the end of the week, every other day"
                (day, if step.is_some() { 7 } else { day })
            }
        };
        if start > end {
            bail!("day-of-week range '{base}' runs backwards");
        }

        for day in (start..=end).step_by(step.unwrap_or(1) as usize) {
            let name = DAY_NAMES[(day % 7) as usize].to_string();
            if !days.contains(&name) {
                days.push(name);
            }
        }
    }

    Ok(days.join(","))
}

fn parse_day(value: &str) -> Result<u32> {
    match value.parse::<u32>() {
        Ok(day) if day <= 7 => Ok(day),
        _ => bail!("'{value}' is not a day of the week (0-7)"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(CronSchedule::parse("* * * *").is_err());
        assert!(CronSchedule::parse("0 * * * * *").is_err());
        assert!(CronSchedule::parse("").is_err());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(CronSchedule::parse("61 * * * *").is_err());
        assert!(CronSchedule::parse("* 25 * * *").is_err());
        assert!(CronSchedule::parse("* * * * 8").is_err());
        assert!(CronSchedule::parse("* * * * */0").is_err());
        assert!(CronSchedule::parse("* * * * 5-1").is_err());
    }

    #[test]
    fn keeps_expression_for_display() {
        let schedule = CronSchedule::parse("  */5  * * * * ").unwrap();
        assert_eq!(schedule.expression(), "*/5 * * * *");
    }

    #[test]
    fn every_minute_matches_any_second() {
        let schedule = CronSchedule::parse("* * * * *").unwrap();
        assert!(schedule.matches(&at(2024, 3, 10, 12, 0, 0)));
        assert!(schedule.matches(&at(2024, 3, 10, 12, 0, 59)));
    }

    #[test]
    fn step_minutes_match_only_selected_minutes() {
        let schedule = CronSchedule::parse("*/5 * * * *").unwrap();
        assert!(schedule.matches(&at(2024, 3, 10, 12, 5, 30)));
        assert!(schedule.matches(&at(2024, 3, 10, 12, 0, 3)));
        assert!(!schedule.matches(&at(2024, 3, 10, 12, 6, 10)));
        assert!(!schedule.matches(&at(2024, 3, 10, 12, 4, 59)));
    }

    #[test]
    fn hour_and_minute_fields() {
        let schedule = CronSchedule::parse("30 9 * * *").unwrap();
        assert!(schedule.matches(&at(2024, 3, 10, 9, 30, 12)));
        assert!(!schedule.matches(&at(2024, 3, 10, 10, 30, 12)));
        assert!(!schedule.matches(&at(2024, 3, 10, 9, 31, 0)));
    }

    #[test]
    fn weekdays_use_standard_numbering() {
        // 2024-01-01 is a Monday, 2023-12-31 a Sunday.
        let weekdays = CronSchedule::parse("0 9 * * 1-5").unwrap();
        assert!(weekdays.matches(&at(2024, 1, 1, 9, 0, 45)));
        assert!(!weekdays.matches(&at(2023, 12, 31, 9, 0, 45)));

        let sunday = CronSchedule::parse("0 9 * * 0").unwrap();
        assert!(sunday.matches(&at(2023, 12, 31, 9, 0, 0)));
        assert!(!sunday.matches(&at(2024, 1, 1, 9, 0, 0)));

        let also_sunday = CronSchedule::parse("0 9 * * 7").unwrap();
        assert!(also_sunday.matches(&at(2023, 12, 31, 9, 0, 0)));
    }

    #[test]
    fn translates_numeric_days_to_names() {
        assert_eq!(translate_day_of_week("1-5").unwrap(), "Mon,Tue,Wed,Thu,Fri");
        assert_eq!(translate_day_of_week("0,7").unwrap(), "Sun");
        assert_eq!(translate_day_of_week("1-5/2").unwrap(), "Mon,Wed,Fri");
        assert_eq!(translate_day_of_week("5/1").unwrap(), "Fri,Sat,Sun");
        assert_eq!(translate_day_of_week("*/2").unwrap(), "*/2");
        assert_eq!(translate_day_of_week("Mon-Fri").unwrap(), "Mon-Fri");
        assert_eq!(translate_day_of_week("*").unwrap(), "*");
    }

    #[test]
    fn next_tick_aligns_to_minute_boundary() {
        assert_eq!(next_tick(&at(2024, 3, 10, 12, 0, 3)), at(2024, 3, 10, 12, 1, 0));
        assert_eq!(next_tick(&at(2024, 3, 10, 12, 0, 0)), at(2024, 3, 10, 12, 1, 0));
        assert_eq!(next_tick(&at(2024, 3, 10, 23, 59, 59)), at(2024, 3, 11, 0, 0, 0));

        let with_nanos = at(2024, 3, 10, 12, 0, 59) + Duration::milliseconds(999);
        assert_eq!(next_tick(&with_nanos), at(2024, 3, 10, 12, 1, 0));
    }
}
