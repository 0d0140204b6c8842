//! Cron expression parsing and next-fire evaluation.
//!
//! Accepts standard 5-field crontab lines (`min hour dom month dow`), the
//! 6-field form with a leading seconds column, the `@hourly`-style
//! shorthands (plus `@midnight`), and `@every <duration>` intervals such as
//! `@every 1h30m`. Numeric days of the week follow crontab conventions
//! (0 or 7 = Sunday) and are rewritten to names before they reach the
//! underlying parser, which numbers Sunday as 1.
//!
//! When both day-of-month and day-of-week are restricted, a day matching
//! either one fires, as in crontab.

use std::str::FromStr;

use chrono::{DateTime, Duration, SubsecRound, Utc};

use crate::error::{HeraldError, Result};

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

#[derive(Debug, Clone)]
enum Cadence {
    /// Fires whenever any of the schedules does.
    Calendar(Vec<cron::Schedule>),
    /// Fires a fixed number of whole seconds after the previous fire.
    Every(Duration),
}

/// Parsed cron expression.
#[derive(Debug, Clone)]
pub struct CronExpression {
    cadence: Cadence,
    expression: String,
}

impl CronExpression {
    /// Parse a 5- or 6-field expression, a shorthand such as `@daily`, or an
    /// `@every` interval.
    pub fn parse(expression: &str) -> Result<Self> {
        let cadence = compile(expression).map_err(|reason| invalid(expression, reason))?;
        Ok(Self {
            cadence,
            expression: expression.to_string(),
        })
    }

    /// The first fire time strictly after `previous`.
    pub fn next_after(&self, previous: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match &self.cadence {
            Cadence::Calendar(schedules) => schedules
                .iter()
                .filter_map(|schedule| schedule.after(&previous).next())
                .min(),
            Cadence::Every(interval) => previous.trunc_subsecs(0).checked_add_signed(*interval),
        }
    }

    /// Up to `count` consecutive fire times strictly after `from`.
    pub fn upcoming(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let mut times = Vec::with_capacity(count);
        let mut cursor = from;
        while times.len() < count {
            match self.next_after(cursor) {
                Some(next) => {
                    times.push(next);
                    cursor = next;
                }
                None => break,
            }
        }
        times
    }

    /// The expression as originally written.
    pub fn expression(&self) -> &str {
        &self.expression
    }
}

/// Compute the fire time that follows `previous` for `expression`.
///
/// Pure: the same inputs always give the same output, and the result is always
/// strictly later than `previous`.
pub fn next_fire_time(expression: &str, previous: DateTime<Utc>) -> Result<DateTime<Utc>> {
    CronExpression::parse(expression)?
        .next_after(previous)
        .ok_or_else(|| invalid(expression, format!("no fire time after {}", previous.to_rfc3339())))
}

fn invalid(expression: &str, reason: String) -> HeraldError {
    HeraldError::InvalidExpression {
        expression: expression.to_string(),
        reason,
    }
}

fn compile(expression: &str) -> std::result::Result<Cadence, String> {
    let trimmed = expression.trim();
    if let Some(descriptor) = trimmed.strip_prefix('@') {
        let descriptor = descriptor.to_ascii_lowercase();
        if let Some(interval) = descriptor.strip_prefix("every") {
            return parse_interval(interval.trim()).map(Cadence::Every);
        }
        let shorthand = match descriptor.as_str() {
            "midnight" => "@daily".to_string(),
            other => format!("@{other}"),
        };
        return Ok(Cadence::Calendar(vec![schedule(&shorthand)?]));
    }

    let mut fields: Vec<String> = trimmed.split_whitespace().map(String::from).collect();
    match fields.len() {
        5 => fields.insert(0, "0".to_string()),
        6 => {}
        n => return Err(format!("expected 5 or 6 fields, found {n}")),
    }
    fields[5] = translate_day_of_week(&fields[5])?;

    // The parser ANDs the two day fields; split them so either may match.
    if restricts_days(&fields[3]) && restricts_days(&fields[5]) {
        let mut by_month_day = fields.clone();
        by_month_day[5] = "*".to_string();
        let mut by_week_day = fields;
        by_week_day[3] = "*".to_string();
        return Ok(Cadence::Calendar(vec![
            schedule(&by_month_day.join(" "))?,
            schedule(&by_week_day.join(" "))?,
        ]));
    }
    Ok(Cadence::Calendar(vec![schedule(&fields.join(" "))?]))
}

fn schedule(expression: &str) -> std::result::Result<cron::Schedule, String> {
    cron::Schedule::from_str(expression).map_err(|e| e.to_string())
}

fn restricts_days(field: &str) -> bool {
    !matches!(field, "*" | "?" | "*/1" | "?/1")
}

/// Map numeric weekday lists/ranges/steps onto day names.
///
/// `*` and `?` (with or without a step) are left alone: a step over the
/// parser's 1-7 range selects the same days as over crontab's 0-6 range.
fn translate_day_of_week(field: &str) -> std::result::Result<String, String> {
    let mut days: Vec<String> = Vec::new();
    let mut push = |day: String| {
        if !days.contains(&day) {
            days.push(day);
        }
    };

    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (part, None),
        };

        if range == "*" || range == "?" || !range.chars().any(|c| c.is_ascii_digit()) {
            push(part.to_string());
            continue;
        }

        let (start, end) = match range.split_once('-') {
            Some((a, b)) => (parse_day(a)?, parse_day(b)?),
            // "n/step" runs from n to the end of the week
            None => {
                let day = parse_day(range)?;
                (day, if step.is_some() { 6 } else { day })
            }
        };
        let step = match step {
            Some(s) => s
                .parse::<usize>()
                .map_err(|_| format!("invalid day-of-week step '{s}'"))?,
            None => 1,
        };
        if step == 0 || start > end {
            return Err(format!("invalid day-of-week range '{part}'"));
        }

        for day in (start..=end).step_by(step) {
            push(DAY_NAMES[(day % 7) as usize].to_string());
        }
    }

    Ok(days.join(","))
}

fn parse_day(s: &str) -> std::result::Result<u32, String> {
    match s.parse::<u32>() {
        Ok(day) if day <= 7 => Ok(day),
        _ => Err(format!("invalid day of week '{s}'")),
    }
}

/// Parse an `@every` interval written as a duration (`90s`, `1h30m`, `1.5h`).
///
/// Rounded down to whole seconds with a floor of one second; zero and
/// negative intervals are rejected.
fn parse_interval(text: &str) -> std::result::Result<Duration, String> {
    let nanos = parse_duration_nanos(text)?;
    if nanos <= 0.0 {
        return Err(format!("interval '{text}' must be positive"));
    }
    let secs = ((nanos / 1e9).floor() as i64).max(1);
    Duration::try_seconds(secs).ok_or_else(|| format!("interval '{text}' is too large"))
}

fn parse_duration_nanos(text: &str) -> std::result::Result<f64, String> {
    let (negative, mut rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if rest.is_empty() {
        return Err("missing interval duration".to_string());
    }
    if rest == "0" {
        return Ok(0.0);
    }

    let mut total = 0.0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("invalid duration '{text}'"))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("missing unit in duration '{text}'")),
            other => return Err(format!("unknown unit '{other}' in duration '{text}'")),
        };
        total += value * unit;
        rest = &rest[unit_len..];
    }
    Ok(if negative { -total } else { total })
}
