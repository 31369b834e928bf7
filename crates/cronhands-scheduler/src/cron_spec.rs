//! Five-field cron expressions.
//!
//! `minute hour day-of-month month day-of-week`, evaluated in UTC. Weekdays
//! are `0`-`7` (both `0` and `7` are Sunday) or names. The `@hourly`,
//! `@daily`, `@weekly`, `@monthly` and `@yearly` shorthands are accepted.
//!
//! Expressions are translated to the seconds-first form of the `cron`
//! crate, whose weekdays run `1`-`7` from Sunday. When both day fields are
//! restricted a job fires when either matches, as in classic cron.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];
const WEEKDAY_FULL_NAMES: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

/// A parsed schedule.
#[derive(Debug, Clone)]
pub struct CronSpec {
    expr: String,
    schedules: Vec<Schedule>,
}

impl CronSpec {
    /// Parse a five-field expression (or an `@` shorthand).
    pub fn parse(expr: &str) -> Result<Self, String> {
        let expanded = expand_shorthand(expr.trim())?;
        let fields: Vec<&str> = expanded.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields[..] else {
            return Err(format!("expected 5 fields, found {}", fields.len()));
        };

        let weekdays = normalize_weekdays(dow)?;
        let sources = if !dom.starts_with('*') && !dow.starts_with('*') {
            vec![
                format!("0 {minute} {hour} {dom} {month} *"),
                format!("0 {minute} {hour} * {month} {weekdays}"),
            ]
        } else {
            vec![format!("0 {minute} {hour} {dom} {month} {weekdays}")]
        };

        let schedules = sources
            .iter()
            .map(|s| Schedule::from_str(s).map_err(|e| e.to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            expr: expr.trim().to_string(),
            schedules,
        })
    }

    /// The expression as written.
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// First firing strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedules
            .iter()
            .filter_map(|s| s.after(&after).next())
            .min()
    }

    /// Last firing strictly before `before`.
    pub fn prev_before(&self, before: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedules
            .iter()
            .filter_map(|s| s.after(&before).next_back())
            .max()
    }

    /// The next `count` firings strictly after `after`.
    pub fn upcoming(&self, after: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let mut out = Vec::with_capacity(count);
        let mut cursor = after;
        while out.len() < count {
            match self.next_after(cursor) {
                Some(next) => {
                    out.push(next);
                    cursor = next;
                }
                None => break,
            }
        }
        out
    }
}

impl FromStr for CronSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn expand_shorthand(expr: &str) -> Result<String, String> {
    if !expr.starts_with('@') {
        return Ok(expr.to_string());
    }
    let fields = match expr.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => "0 0 1 1 *",
        "@monthly" => "0 0 1 * *",
        "@weekly" => "0 0 * * 0",
        "@daily" | "@midnight" => "0 0 * * *",
        "@hourly" => "0 * * * *",
        other => return Err(format!("unsupported shorthand '{}'", other)),
    };
    Ok(fields.to_string())
}

/// Weekday (`0` = Sunday) from a number `0`-`7` or a name.
fn weekday(token: &str) -> Result<u32, String> {
    if let Ok(n) = token.parse::<u32>() {
        return if n <= 7 {
            Ok(n)
        } else {
            Err(format!("weekday {} out of range 0-7", n))
        };
    }
    let lower = token.to_ascii_lowercase();
    WEEKDAY_NAMES
        .iter()
        .position(|name| *name == lower)
        .or_else(|| WEEKDAY_FULL_NAMES.iter().position(|name| *name == lower))
        .map(|i| i as u32)
        .ok_or_else(|| format!("unknown weekday '{}'", token))
}

/// Rewrite a classic day-of-week field as an explicit list in the `cron`
/// crate's numbering.
fn normalize_weekdays(field: &str) -> Result<String, String> {
    if field == "*" || field == "?" {
        return Ok("*".to_string());
    }

    let mut days = BTreeSet::new();
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: usize = step
                    .parse()
                    .map_err(|_| format!("invalid step '{}'", step))?;
                if step == 0 {
                    return Err("step cannot be 0".to_string());
                }
                (range, step)
            }
            None => (item, 1),
        };

        let (lo, hi) = if range == "*" {
            (0, 6)
        } else if let Some((a, b)) = range.split_once('-') {
            (weekday(a)?, weekday(b)?)
        } else {
            let day = weekday(range)?;
            if step > 1 { (day, 6) } else { (day, day) }
        };
        if lo > hi {
            return Err(format!("invalid weekday range '{}'", range));
        }

        for day in (lo..=hi).step_by(step) {
            days.insert(day % 7);
        }
    }

    Ok(days
        .iter()
        .map(|d| (d + 1).to_string())
        .collect::<Vec<_>>()
        .join(","))
}

#[cfg(test)]
#[path = "cron_spec_tests.rs"]
mod tests;
