//! Time-duration slot
//!
//! The platform hands durations over as `{"amount": 2, "unit": "h"}`.
//! Traffic statistics are only available for windows between two hours and
//! one month, both inclusive.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Shortest window traffic statistics cover, in seconds
pub const MIN_WINDOW_SECS: u64 = 2 * 60 * 60;

/// Longest window traffic statistics cover, in seconds
pub const MAX_WINDOW_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    #[serde(rename = "s")]
    Second,
    #[serde(rename = "m")]
    Minute,
    #[serde(rename = "h")]
    Hour,
    #[serde(rename = "day")]
    Day,
    #[serde(rename = "wk")]
    Week,
    #[serde(rename = "mo")]
    Month,
    #[serde(rename = "yr")]
    Year,
}

impl TimeUnit {
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "s" => Some(TimeUnit::Second),
            "m" => Some(TimeUnit::Minute),
            "h" => Some(TimeUnit::Hour),
            "day" => Some(TimeUnit::Day),
            "wk" => Some(TimeUnit::Week),
            "mo" => Some(TimeUnit::Month),
            "yr" => Some(TimeUnit::Year),
            _ => None,
        }
    }

    /// Months are 30 days and years are 12 such months
    pub fn seconds(&self) -> u64 {
        match self {
            TimeUnit::Second => 1,
            TimeUnit::Minute => 60,
            TimeUnit::Hour => 60 * 60,
            TimeUnit::Day => 24 * 60 * 60,
            TimeUnit::Week => 7 * 24 * 60 * 60,
            TimeUnit::Month => 30 * 24 * 60 * 60,
            TimeUnit::Year => 12 * 30 * 24 * 60 * 60,
        }
    }

    pub fn singular(&self) -> &'static str {
        match self {
            TimeUnit::Second => "second",
            TimeUnit::Minute => "minute",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
            TimeUnit::Year => "year",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            TimeUnit::Second => "seconds",
            TimeUnit::Minute => "minutes",
            TimeUnit::Hour => "hours",
            TimeUnit::Day => "days",
            TimeUnit::Week => "weeks",
            TimeUnit::Month => "months",
            TimeUnit::Year => "years",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DurationError {
    #[error("no time duration given")]
    Missing,

    #[error("unknown time unit {0:?}")]
    UnknownUnit(String),

    #[error("time duration must be a positive amount")]
    NonPositive,

    #[error("time duration of {0}s is outside the allowed window")]
    OutOfRange(u64),
}

/// Duration exactly as the platform sent it, not yet checked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDuration {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl RawDuration {
    /// Read a platform parameter value. Empty strings and nulls are absent.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(_) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Check unit and amount, without the window bounds
    pub fn parse(&self) -> Result<TimeDuration, DurationError> {
        let unit_code = self.unit.as_deref().ok_or(DurationError::Missing)?;
        let unit = TimeUnit::parse(unit_code)
            .ok_or_else(|| DurationError::UnknownUnit(unit_code.to_string()))?;
        let amount = self.amount.ok_or(DurationError::Missing)?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(DurationError::NonPositive);
        }
        Ok(TimeDuration { amount, unit })
    }

    /// Parse and check against the allowed traffic window
    pub fn validate(&self) -> Result<TimeDuration, DurationError> {
        let duration = self.parse()?;
        let secs = duration.total_seconds();
        if !(MIN_WINDOW_SECS..=MAX_WINDOW_SECS).contains(&secs) {
            return Err(DurationError::OutOfRange(secs));
        }
        Ok(duration)
    }
}

/// A checked duration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeDuration {
    pub amount: f64,
    pub unit: TimeUnit,
}

impl TimeDuration {
    pub fn new(amount: f64, unit: TimeUnit) -> Self {
        Self { amount, unit }
    }

    pub fn total_seconds(&self) -> u64 {
        (self.amount * self.unit.seconds() as f64).round() as u64
    }

    pub fn to_raw(&self) -> RawDuration {
        let unit = serde_json::to_value(self.unit)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string));
        RawDuration {
            amount: Some(self.amount),
            unit,
        }
    }
}

impl fmt::Display for TimeDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.amount == 1.0 {
            self.unit.singular()
        } else {
            self.unit.plural()
        };
        if self.amount.fract() == 0.0 {
            write!(f, "{} {}", self.amount as u64, noun)
        } else {
            write!(f, "{} {}", self.amount, noun)
        }
    }
}

/// Prompt for a duration. `subject` names what the user is asking about.
pub fn duration_prompt(after_invalid: bool, subject: &str) -> String {
    if after_invalid {
        format!(
            "Sorry, but you can only get {subject} between 2 hours and 1 month. What time duration?"
        )
    } else {
        "What time duration? You can choose between a range of 2 hours and 1 month.".to_string()
    }
}

/// Terminal wording for an out-of-window duration
pub fn out_of_range_message(subject: &str) -> String {
    format!("Sorry, but you can only get {subject} between 2 hours and 1 month.")
}
