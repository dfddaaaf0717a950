//! Rate revision domain model

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account id used for global (list price) rates that apply to every account
pub const GLOBAL_ACCOUNT_ID: u64 = 0;

/// Effective date of a rate revision
///
/// Accepted as `YYYYMMDD` or `YYYY-MM-DD`. The canonical form is the compact
/// 8-digit string; [`EffectiveDate::hyphenated`] renders the form the API expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectiveDate(NaiveDate);

impl EffectiveDate {
    /// Parse a user-supplied date: hyphens are stripped and exactly
    /// eight digits forming a real calendar date must remain.
    pub fn parse(raw: &str) -> Option<Self> {
        let digits: String = raw.trim().chars().filter(|c| *c != '-').collect();
        if digits.len() != 8 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        NaiveDate::parse_from_str(&digits, "%Y%m%d").ok().map(Self)
    }

    /// Parse a date as returned by the API, which may omit the day (`YYYY-MM`)
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let digits: String = raw.trim().chars().filter(|c| *c != '-').collect();
        match digits.len() {
            6 => Self::parse(&format!("{}01", digits)),
            _ => Self::parse(&digits),
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Canonical `YYYYMMDD` form
    pub fn compact(&self) -> String {
        self.0.format("%Y%m%d").to_string()
    }

    /// `YYYY-MM-DD` form used on the wire and in reports
    pub fn hyphenated(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for EffectiveDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.compact())
    }
}

/// The triple that must be unique among submitted rate revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey {
    pub account_id: u64,
    pub service_id: u64,
    pub effective_date: EffectiveDate,
}

/// A fully validated rate revision ready for submission
///
/// Only produced by the row validator once every field parsed and the
/// service identifier resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRate {
    /// `0` means no account (global/list rate)
    pub account_id: u64,
    pub service_id: u64,
    /// Symbolic service key as given in the input, kept for reporting
    pub service_key: Option<String>,
    pub rate: Decimal,
    pub cogs: Decimal,
    pub effective_date: EffectiveDate,
    pub source_row_number: usize,
}

impl ResolvedRate {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            account_id: self.account_id,
            service_id: self.service_id,
            effective_date: self.effective_date,
        }
    }

    pub fn is_global(&self) -> bool {
        self.account_id == GLOBAL_ACCOUNT_ID
    }

    /// Human-readable service label, preferring the symbolic key
    pub fn service_label(&self) -> String {
        match &self.service_key {
            Some(key) => key.clone(),
            None => self.service_id.to_string(),
        }
    }
}

/// A create request for one rate revision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRate {
    /// `None` for a global/list rate
    pub account_id: Option<u64>,
    pub service_id: u64,
    pub rate: Decimal,
    pub cogs: Decimal,
    pub effective_date: EffectiveDate,
}

impl From<&ResolvedRate> for NewRate {
    fn from(rate: &ResolvedRate) -> Self {
        Self {
            account_id: if rate.is_global() {
                None
            } else {
                Some(rate.account_id)
            },
            service_id: rate.service_id,
            rate: rate.rate,
            cogs: rate.cogs,
            effective_date: rate.effective_date,
        }
    }
}

/// A rate revision that already exists on the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub id: String,
    pub account_id: Option<u64>,
    pub account_name: Option<String>,
    pub service_id: u64,
    pub rate: Option<Decimal>,
    pub cogs: Option<Decimal>,
    /// Date as returned by the API (`YYYY-MM-DD`, sometimes `YYYY-MM`)
    pub effective_date: String,
}

impl RateRecord {
    pub fn is_global(&self) -> bool {
        self.account_id.is_none()
    }

    pub fn parsed_date(&self) -> Option<EffectiveDate> {
        EffectiveDate::parse_lenient(&self.effective_date)
    }
}
