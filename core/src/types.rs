//! Shared primitive types used across the entire analysis.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A linear month number: `year * 12 + month` (month in 1..=12).
/// Consecutive calendar months always differ by exactly one.
pub type MonthIndex = i32;

/// An opaque customer key supplied by ingestion.
pub type CustomerId = String;

/// Identifier of one analysis session.
pub type SessionId = String;

/// Number of lifecycle states.
pub const STATE_COUNT: usize = 3;

/// Number of transient (non-absorbing) states.
pub const TRANSIENT_COUNT: usize = 2;

/// A per-month lifecycle classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum State {
    #[serde(alias = "A")]
    Active,
    #[serde(alias = "R")]
    AtRisk,
    #[serde(alias = "C")]
    Churned,
}

impl State {
    /// Matrix order: A, R, C.
    pub const ALL: [State; STATE_COUNT] = [State::Active, State::AtRisk, State::Churned];

    /// The transient states, in the row order of Q.
    pub const TRANSIENT: [State; TRANSIENT_COUNT] = [State::Active, State::AtRisk];

    pub fn index(self) -> usize {
        match self {
            Self::Active  => 0,
            Self::AtRisk  => 1,
            Self::Churned => 2,
        }
    }

    pub fn from_index(i: usize) -> Option<Self> {
        Self::ALL.get(i).copied()
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Active  => "A",
            Self::AtRisk  => "R",
            Self::Churned => "C",
        }
    }

    /// Parse a supplied label. Accepts the one-letter codes and the
    /// spelled-out names, case-insensitive and trimmed.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "A" | "ACTIVE"                        => Some(Self::Active),
            "R" | "AT_RISK" | "ATRISK" | "AT-RISK" => Some(Self::AtRisk),
            "C" | "CHURNED" | "CHURN"             => Some(Self::Churned),
            _ => None,
        }
    }

    pub fn is_absorbing(self) -> bool {
        self == Self::Churned
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Map a calendar date to its month index.
pub fn month_index(date: NaiveDate) -> MonthIndex {
    date.year() * 12 + date.month() as i32
}

/// First day of the month a month index denotes.
pub fn month_start(index: MonthIndex) -> Option<NaiveDate> {
    // index = year*12 + month, month in 1..=12
    let year = (index - 1).div_euclid(12);
    let month = (index - 1).rem_euclid(12) + 1;
    NaiveDate::from_ymd_opt(year, month as u32, 1)
}

/// An inclusive range of months.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonthWindow {
    pub start: MonthIndex,
    pub end:   MonthIndex,
}

impl MonthWindow {
    pub fn new(start: MonthIndex, end: MonthIndex) -> Self {
        Self { start, end }
    }

    pub fn single(month: MonthIndex) -> Self {
        Self { start: month, end: month }
    }

    pub fn contains(&self, month: MonthIndex) -> bool {
        month >= self.start && month <= self.end
    }

    /// True when a transition from `month` to `month + 1` lies inside the window.
    pub fn contains_transition(&self, month: MonthIndex) -> bool {
        month >= self.start && month < self.end
    }

    pub fn len(&self) -> usize {
        if self.end < self.start { 0 } else { (self.end - self.start + 1) as usize }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
