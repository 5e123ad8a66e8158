//! Contextual conditions attached to permissions.
//!
//! A condition narrows a grant; it never creates one. The evaluator runs only for
//! candidates that already passed role and boundary checks.

use crate::error::{ConditionFailure, Error, Result};
use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Daily time-of-day window. `start > end` describes an overnight window.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Create a window from hour/minute pairs.
    pub fn from_hm(start: (u32, u32), end: (u32, u32)) -> Result<Self> {
        let start = NaiveTime::from_hms_opt(start.0, start.1, 0)
            .ok_or_else(|| Error::InvalidCondition(format!("invalid start time {start:?}")))?;
        let end = NaiveTime::from_hms_opt(end.0, end.1, 0)
            .ok_or_else(|| Error::InvalidCondition(format!("invalid end time {end:?}")))?;
        Ok(Self::new(start, end))
    }

    /// Business hours, 09:00 to 17:00.
    pub fn business_hours() -> Self {
        Self {
            start: NaiveTime::MIN + chrono::Duration::hours(9),
            end: NaiveTime::MIN + chrono::Duration::hours(17),
        }
    }

    pub fn contains(&self, time_of_day: NaiveTime) -> bool {
        if self.start <= self.end {
            time_of_day >= self.start && time_of_day <= self.end
        } else {
            // Overnight window (e.g., 22:00 - 06:00)
            time_of_day >= self.start || time_of_day <= self.end
        }
    }
}

/// An allowed network origin: a single address or a CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub enum OriginRule {
    Address(IpAddr),
    Network { base: IpAddr, prefix: u8 },
}

impl OriginRule {
    pub fn allows(&self, origin: IpAddr) -> bool {
        match *self {
            OriginRule::Address(addr) => addr == origin,
            OriginRule::Network { base, prefix } => match (base, origin) {
                (IpAddr::V4(base), IpAddr::V4(origin)) => {
                    let mask = prefix_mask::<u32>(prefix, 32);
                    (u32::from(base) & mask) == (u32::from(origin) & mask)
                }
                (IpAddr::V6(base), IpAddr::V6(origin)) => {
                    let mask = prefix_mask::<u128>(prefix, 128);
                    (u128::from(base) & mask) == (u128::from(origin) & mask)
                }
                _ => false,
            },
        }
    }
}

fn prefix_mask<T>(prefix: u8, bits: u32) -> T
where
    T: From<u8> + std::ops::Not<Output = T> + std::ops::Shl<u32, Output = T> + Copy,
{
    let zero = T::from(0u8);
    if prefix == 0 {
        zero
    } else {
        !zero << (bits - u32::from(prefix))
    }
}

impl FromStr for OriginRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once('/') {
            None => s
                .parse()
                .map(OriginRule::Address)
                .map_err(|_| Error::InvalidCondition(format!("invalid address '{s}'"))),
            Some((base, prefix)) => {
                let base: IpAddr = base
                    .parse()
                    .map_err(|_| Error::InvalidCondition(format!("invalid network '{s}'")))?;
                let max = if base.is_ipv4() { 32 } else { 128 };
                let prefix: u8 = prefix
                    .parse()
                    .ok()
                    .filter(|p| *p <= max)
                    .ok_or_else(|| Error::InvalidCondition(format!("invalid prefix in '{s}'")))?;
                Ok(OriginRule::Network { base, prefix })
            }
        }
    }
}

impl fmt::Display for OriginRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginRule::Address(addr) => write!(f, "{addr}"),
            OriginRule::Network { base, prefix } => write!(f, "{base}/{prefix}"),
        }
    }
}

/// Structured conditions on a permission. Absent fields are unrestricted.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct PermissionConditions {
    time_window: Option<TimeWindow>,
    allowed_days: Option<Vec<Weekday>>,
    allowed_origins: Option<Vec<OriginRule>>,
    /// IANA timezone the window and weekdays are interpreted in. Defaults to UTC.
    timezone: Option<String>,
}

impl PermissionConditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    pub fn with_allowed_days(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.allowed_days = Some(days.into_iter().collect());
        self
    }

    /// Weekdays only, Monday through Friday.
    pub fn weekdays_only(self) -> Self {
        use Weekday::*;
        self.with_allowed_days([Mon, Tue, Wed, Thu, Fri])
    }

    /// Restrict to the given origins, each an address or CIDR block.
    pub fn with_allowed_origins<I, S>(mut self, origins: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = origins
            .into_iter()
            .map(|o| o.as_ref().parse())
            .collect::<Result<Vec<OriginRule>>>()?;
        self.allowed_origins = Some(rules);
        Ok(self)
    }

    /// Interpret time conditions in the given IANA timezone.
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Result<Self> {
        let timezone = timezone.into();
        timezone
            .parse::<Tz>()
            .map_err(|_| Error::InvalidCondition(format!("unknown timezone '{timezone}'")))?;
        self.timezone = Some(timezone);
        Ok(self)
    }

    pub fn time_window(&self) -> Option<&TimeWindow> {
        self.time_window.as_ref()
    }

    pub fn allowed_days(&self) -> Option<&[Weekday]> {
        self.allowed_days.as_deref()
    }

    pub fn allowed_origins(&self) -> Option<&[OriginRule]> {
        self.allowed_origins.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.time_window.is_none() && self.allowed_days.is_none() && self.allowed_origins.is_none()
    }

    /// Whether the outcome depends on when the request is made.
    pub fn is_time_dependent(&self) -> bool {
        self.time_window.is_some() || self.allowed_days.is_some()
    }
}

/// Evaluates [`PermissionConditions`] against a request's time and origin.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// Every present condition must hold; the first failing one is reported.
    pub fn evaluate(
        &self,
        conditions: &PermissionConditions,
        at: DateTime<Utc>,
        origin: Option<IpAddr>,
    ) -> std::result::Result<(), ConditionFailure> {
        if conditions.is_time_dependent() {
            let tz: Tz = match conditions.timezone.as_deref() {
                None => chrono_tz::UTC,
                // Unparseable zones were rejected at construction; a deserialized one fails closed.
                Some(name) => name.parse().map_err(|_| ConditionFailure::TimeWindow)?,
            };
            let local = at.with_timezone(&tz);

            if let Some(window) = &conditions.time_window
                && !window.contains(local.time())
            {
                return Err(ConditionFailure::TimeWindow);
            }

            if let Some(days) = &conditions.allowed_days
                && !days.contains(&local.weekday())
            {
                return Err(ConditionFailure::DayOfWeek);
            }
        }

        if let Some(rules) = &conditions.allowed_origins {
            let origin = origin.ok_or(ConditionFailure::MissingOrigin)?;
            if !rules.iter().any(|rule| rule.allows(origin)) {
                return Err(ConditionFailure::NetworkOrigin);
            }
        }

        Ok(())
    }
}
