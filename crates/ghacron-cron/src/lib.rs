//! ghacron-cron: the cron expression grammar accepted in annotations.
//!
//! Standard 5-field form (minute hour day-of-month month day-of-week),
//! optionally prefixed with `CRON_TZ=<IANA>` or `TZ=<IANA>`. The prefix
//! zone, when present, is the zone the expression is evaluated in;
//! otherwise the caller supplies a default.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use thiserror::Error;

/// Errors produced while parsing an annotation expression.
#[derive(Debug, Error)]
pub enum CronParseError {
    #[error("unknown time zone {0}")]
    UnknownTimeZone(String),
    #[error("expected 5 fields (minute hour day-of-month month day-of-week), found {0}")]
    FieldCount(usize),
    #[error("day of week out of range: {0}")]
    DayOfWeekRange(String),
    #[error("invalid cron expression: {0}")]
    Invalid(#[from] cron::error::Error),
}

/// A validated cron expression with its optional zone prefix.
#[derive(Debug, Clone)]
pub struct CronSpec {
    schedule: Schedule,
    tz: Option<Tz>,
}

/// Day names indexed by standard cron ordinals (0 = Sunday).
const DOW_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

impl CronSpec {
    /// Parse and validate an annotation expression.
    ///
    /// Seconds-field expressions are rejected: exactly five fields must
    /// remain after stripping the optional zone prefix.
    pub fn parse(expr: &str) -> Result<Self, CronParseError> {
        let (tz, rest) = split_tz_prefix(expr.trim())?;

        let fields: Vec<&str> = rest.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronParseError::FieldCount(fields.len()));
        }

        // The cron crate wants a seconds field and numbers days of week
        // 1-7 from Sunday; normalize to its form while keeping standard
        // 0-6 numbering in the accepted grammar.
        let dow = normalize_dow(fields[4])?;
        let normalized = format!(
            "0 {} {} {} {} {}",
            fields[0], fields[1], fields[2], fields[3], dow
        );
        let schedule = Schedule::from_str(&normalized)?;

        Ok(Self { schedule, tz })
    }

    /// The zone from a `CRON_TZ=`/`TZ=` prefix, if one was present.
    pub fn timezone(&self) -> Option<Tz> {
        self.tz
    }

    /// Next matching instant strictly after `after`, evaluated in the
    /// effective location: the prefix zone if present, else `default_tz`.
    pub fn next_after(&self, after: DateTime<Utc>, default_tz: Tz) -> Option<DateTime<Utc>> {
        let tz = self.tz.unwrap_or(default_tz);
        let local = after.with_timezone(&tz);
        self.schedule
            .after(&local)
            .next()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Next matching instant from now.
    pub fn upcoming(&self, default_tz: Tz) -> Option<DateTime<Utc>> {
        self.next_after(Utc::now(), default_tz)
    }
}

/// Strip a leading `CRON_TZ=`/`TZ=` token and resolve its zone.
fn split_tz_prefix(expr: &str) -> Result<(Option<Tz>, &str), CronParseError> {
    for prefix in ["CRON_TZ=", "TZ="] {
        if let Some(rest) = expr.strip_prefix(prefix) {
            let (name, tail) = match rest.split_once(|c: char| c.is_whitespace()) {
                Some((name, tail)) => (name, tail),
                None => (rest, ""),
            };
            let tz = name
                .parse::<Tz>()
                .map_err(|_| CronParseError::UnknownTimeZone(name.to_string()))?;
            return Ok((Some(tz), tail));
        }
    }
    Ok((None, expr))
}

/// Rewrite numeric day-of-week ordinals (0-6, Sunday first) to names.
fn normalize_dow(field: &str) -> Result<String, CronParseError> {
    let parts: Result<Vec<String>, CronParseError> = field
        .split(',')
        .map(|part| {
            // Keep any step suffix untouched.
            let (base, step) = match part.split_once('/') {
                Some((base, step)) => (base, Some(step)),
                None => (part, None),
            };
            let mapped = match base.split_once('-') {
                Some((lo, hi)) => format!("{}-{}", map_dow_token(lo)?, map_dow_token(hi)?),
                None => map_dow_token(base)?,
            };
            Ok(match step {
                Some(step) => format!("{mapped}/{step}"),
                None => mapped,
            })
        })
        .collect();
    Ok(parts?.join(","))
}

fn map_dow_token(token: &str) -> Result<String, CronParseError> {
    if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
        let n: usize = token
            .parse()
            .map_err(|_| CronParseError::DayOfWeekRange(token.to_string()))?;
        if n > 6 {
            return Err(CronParseError::DayOfWeekRange(token.to_string()));
        }
        return Ok(DOW_NAMES[n].to_string());
    }
    Ok(token.to_string())
}
