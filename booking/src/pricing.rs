//! Special-price resolution.
//!
//! Precedence is fixed: a rule for the exact date beats a recurring weekday
//! rule, which beats a time-of-day rule, which beats the venue's base rate.
//! Within a tier the first active rule in list order wins.

use crate::types::{Money, clock_time};
use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// When a special price applies
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PriceRule {
    /// One calendar date
    Date {
        /// The date
        #[serde(deserialize_with = "calendar_date")]
        special_date: NaiveDate,
    },
    /// Every listed weekday (lower-case English names)
    Recurring {
        /// e.g. `["saturday", "sunday"]`
        recurring_days: Vec<String>,
    },
    /// Slots starting within `[start_time, end_time)`
    TimeBased {
        /// Window start
        #[serde(with = "clock_time")]
        start_time: NaiveTime,
        /// Window end; at or before the start means the window crosses midnight
        #[serde(with = "clock_time")]
        end_time: NaiveTime,
    },
}

/// Category of the rule that set a price
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Date-specific
    Date,
    /// Recurring weekday
    Recurring,
    /// Time of day
    TimeBased,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Date => "date",
            Self::Recurring => "recurring",
            Self::TimeBased => "time-based",
        })
    }
}

/// A venue's special price rule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialPrice {
    /// Backend identifier
    #[serde(default)]
    pub id: Option<u64>,
    /// Applicability
    #[serde(flatten)]
    pub rule: PriceRule,
    /// Hourly rate while the rule applies
    pub special_price: Money,
    /// Text shown to the guest
    #[serde(default)]
    pub message: Option<String>,
    /// Disabled rules are ignored
    #[serde(default = "default_active")]
    pub is_active: bool,
}

const fn default_active() -> bool {
    true
}

impl SpecialPrice {
    /// Rule kind
    #[must_use]
    pub const fn kind(&self) -> RuleKind {
        match self.rule {
            PriceRule::Date { .. } => RuleKind::Date,
            PriceRule::Recurring { .. } => RuleKind::Recurring,
            PriceRule::TimeBased { .. } => RuleKind::TimeBased,
        }
    }

    fn matches_date(&self, date: NaiveDate) -> bool {
        matches!(self.rule, PriceRule::Date { special_date } if special_date == date)
    }

    fn matches_weekday(&self, date: NaiveDate) -> bool {
        let PriceRule::Recurring { recurring_days } = &self.rule else {
            return false;
        };
        let weekday = weekday_name(date);
        recurring_days
            .iter()
            .any(|day| day.trim().eq_ignore_ascii_case(weekday))
    }

    fn matches_time(&self, start: NaiveTime) -> bool {
        let PriceRule::TimeBased {
            start_time,
            end_time,
        } = self.rule
        else {
            return false;
        };
        if start_time < end_time {
            start_time <= start && start < end_time
        } else {
            start >= start_time || start < end_time
        }
    }

    fn applied(&self) -> AppliedRule {
        AppliedRule {
            kind: self.kind(),
            price: self.special_price,
            message: self.message.clone(),
        }
    }
}

/// Lower-case English weekday name
#[must_use]
pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        chrono::Weekday::Mon => "monday",
        chrono::Weekday::Tue => "tuesday",
        chrono::Weekday::Wed => "wednesday",
        chrono::Weekday::Thu => "thursday",
        chrono::Weekday::Fri => "friday",
        chrono::Weekday::Sat => "saturday",
        chrono::Weekday::Sun => "sunday",
    }
}

/// The rule that set a quote's effective price
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRule {
    /// Category
    pub kind: RuleKind,
    /// Rate set by the rule
    pub price: Money,
    /// Guest-facing text
    pub message: Option<String>,
}

/// Base and effective hourly rates for a date (and slot)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Venue base rate
    pub normal_price: Money,
    /// Rate actually charged
    pub effective_price: Money,
    /// Rule responsible for the difference, if any
    pub applied_rule: Option<AppliedRule>,
}

impl PriceQuote {
    /// Quote at the base rate
    #[must_use]
    pub const fn base(rate: Money) -> Self {
        Self {
            normal_price: rate,
            effective_price: rate,
            applied_rule: None,
        }
    }

    /// A special rule set the price
    #[must_use]
    pub const fn is_special(&self) -> bool {
        self.applied_rule.is_some()
    }

    /// Advisory text for a special price
    #[must_use]
    pub fn notice(&self) -> Option<String> {
        let rule = self.applied_rule.as_ref()?;
        Some(match rule.message.as_deref().map(str::trim) {
            Some(message) if !message.is_empty() => {
                format!("{message} ({} per hour)", self.effective_price)
            },
            _ => format!(
                "A {} special price of {} per hour applies (normally {})",
                rule.kind, self.effective_price, self.normal_price
            ),
        })
    }
}

/// Resolve the hourly rate for `date` and an optional slot start.
#[must_use]
pub fn resolve(
    base: Money,
    date: NaiveDate,
    start_time: Option<NaiveTime>,
    rules: &[SpecialPrice],
) -> PriceQuote {
    let active = || rules.iter().filter(|rule| rule.is_active);
    let winner = active()
        .find(|rule| rule.matches_date(date))
        .or_else(|| active().find(|rule| rule.matches_weekday(date)))
        .or_else(|| start_time.and_then(|start| active().find(|rule| rule.matches_time(start))));

    winner.map_or_else(
        || PriceQuote::base(base),
        |rule| PriceQuote {
            normal_price: base,
            effective_price: rule.special_price,
            applied_rule: Some(rule.applied()),
        },
    )
}

/// Rate to show on a booking summary.
///
/// Only date and recurring rules are re-derived; otherwise the rate stored on
/// the booking stands.
#[must_use]
pub fn resolve_for_display(stored_rate: Money, date: NaiveDate, rules: &[SpecialPrice]) -> PriceQuote {
    resolve(stored_rate, date, None, rules)
}

/// Price calculation as answered by the backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerQuote {
    /// Base rate
    pub normal_price: Money,
    /// Rate charged
    pub effective_price: Money,
    /// Date or recurring rule that applied
    #[serde(default)]
    pub special_price: Option<ServerRule>,
    /// Time-based rule that applied
    #[serde(default)]
    pub time_based_price: Option<ServerRule>,
}

/// Rule details inside a [`ServerQuote`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRule {
    /// Rule category, when reported
    #[serde(rename = "type", default)]
    pub kind: Option<RuleKind>,
    /// Rule rate
    #[serde(alias = "special_price")]
    pub price: Money,
    /// Guest-facing text
    #[serde(default)]
    pub message: Option<String>,
}

impl From<ServerQuote> for PriceQuote {
    fn from(quote: ServerQuote) -> Self {
        let applied_rule = quote
            .special_price
            .map(|rule| (rule.kind.unwrap_or(RuleKind::Date), rule))
            .or_else(|| quote.time_based_price.map(|rule| (RuleKind::TimeBased, rule)))
            .map(|(kind, rule)| AppliedRule {
                kind,
                price: rule.price,
                message: rule.message,
            });
        Self {
            normal_price: quote.normal_price,
            effective_price: quote.effective_price,
            applied_rule,
        }
    }
}

/// Accept `YYYY-MM-DD` with or without a trailing time part
fn calendar_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
    let text = String::deserialize(deserializer)?;
    let day = text.get(..10).unwrap_or(&text);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|_| serde::de::Error::custom(format!("invalid date: {text}")))
}
