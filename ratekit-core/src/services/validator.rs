//! Row validation
//!
//! Every row is checked before anything is sent to the API, and every error
//! of every row is collected so the whole file can be fixed in one pass.

use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{EffectiveDate, RawRow, ResolvedRate};
use crate::services::catalog::ServiceCatalog;

/// Number of invalid rows shown before the remainder is summarized
pub const PREVIEW_LIMIT: usize = 10;

/// All problems found on one row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub row_number: usize,
    pub messages: Vec<String>,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.row_number, self.messages.join("; "))
    }
}

/// The batch has at least one invalid row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub errors: Vec<RowError>,
}

impl ValidationFailure {
    pub fn invalid_rows(&self) -> usize {
        self.errors.len()
    }

    /// First rows to show, and how many more were left out
    pub fn preview(&self) -> (&[RowError], usize) {
        let shown = self.errors.len().min(PREVIEW_LIMIT);
        (&self.errors[..shown], self.errors.len() - shown)
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} invalid row(s):", self.invalid_rows())?;
        let (shown, remaining) = self.preview();
        for error in shown {
            writeln!(f, "  {}", error)?;
        }
        if remaining > 0 {
            writeln!(f, "  ... and {} more", remaining)?;
        }
        Ok(())
    }
}

/// Validate one row into a [`ResolvedRate`], or every message explaining why not
pub fn validate_row(row: &RawRow, catalog: &ServiceCatalog) -> Result<ResolvedRate, Vec<String>> {
    let mut errors = Vec::new();

    let account_id = match row.non_blank("account_id") {
        None => {
            errors.push("Missing account_id".to_string());
            None
        }
        Some(raw) => match parse_account_id(raw) {
            Some(id) => Some(id),
            None => {
                errors.push(format!("Invalid account_id '{}'", raw));
                None
            }
        },
    };

    let service_id = match catalog.resolve(row.get("service_id"), row.get("service_key")) {
        Ok(id) => Some(id),
        Err(e) => {
            errors.push(e.to_string());
            None
        }
    };

    let rate = match row.non_blank("rate") {
        None => {
            errors.push("Missing rate".to_string());
            None
        }
        Some(raw) => match parse_decimal(raw) {
            Some(rate) => Some(rate),
            None => {
                errors.push(format!("Invalid rate '{}'", raw));
                None
            }
        },
    };

    let cogs = match row.non_blank("cogs") {
        None => Some(Decimal::ZERO),
        Some(raw) => match parse_decimal(raw) {
            Some(cogs) => Some(cogs),
            None => {
                errors.push(format!("Invalid cogs '{}'", raw));
                None
            }
        },
    };

    let effective_date = match row.non_blank("revision_start_date") {
        None => {
            errors.push("Missing revision_start_date".to_string());
            None
        }
        Some(raw) => match EffectiveDate::parse(raw) {
            Some(date) => Some(date),
            None => {
                errors.push(format!("Invalid revision_start_date '{}'", raw));
                None
            }
        },
    };

    match (account_id, service_id, rate, cogs, effective_date) {
        (Some(account_id), Some(service_id), Some(rate), Some(cogs), Some(effective_date))
            if errors.is_empty() =>
        {
            Ok(ResolvedRate {
                account_id,
                service_id,
                service_key: row.non_blank("service_key").map(str::to_string),
                rate,
                cogs,
                effective_date,
                source_row_number: row.row_number,
            })
        }
        _ => Err(errors),
    }
}

/// Validate every row; succeeds only if all rows are valid
pub fn validate_all(
    rows: &[RawRow],
    catalog: &ServiceCatalog,
) -> Result<Vec<ResolvedRate>, ValidationFailure> {
    let mut rates = Vec::with_capacity(rows.len());
    let mut errors = Vec::new();

    for row in rows {
        match validate_row(row, catalog) {
            Ok(rate) => rates.push(rate),
            Err(messages) => errors.push(RowError {
                row_number: row.row_number,
                messages,
            }),
        }
    }

    if errors.is_empty() {
        Ok(rates)
    } else {
        Err(ValidationFailure { errors })
    }
}

/// Integer with optional sign; negative ids are not valid accounts
fn parse_account_id(raw: &str) -> Option<u64> {
    let value: i64 = raw.parse().ok()?;
    u64::try_from(value).ok()
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    raw.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(raw).ok())
}
