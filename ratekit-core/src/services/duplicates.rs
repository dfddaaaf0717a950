//! Natural-key duplicate detection
//!
//! Two rows with the same (account, service, effective date) in one file are
//! an authoring error; the import is rejected before anything is submitted.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::domain::{NaturalKey, ResolvedRate};

/// Rows sharing one natural key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub account_id: u64,
    pub service_id: u64,
    /// Symbolic key when the input gave one, otherwise the numeric id
    pub service_label: String,
    /// Compact `YYYYMMDD`
    pub effective_date: String,
    pub row_numbers: Vec<usize>,
}

impl fmt::Display for DuplicateGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: Vec<String> = self.row_numbers.iter().map(|n| n.to_string()).collect();
        write!(
            f,
            "account={}, service={}, date={} on rows {}",
            self.account_id,
            self.service_label,
            self.effective_date,
            rows.join(", ")
        )
    }
}

/// Group rates by natural key, returning only groups with more than one row
///
/// Groups are ordered by the first row they contain.
pub fn find_duplicates(rates: &[ResolvedRate]) -> Vec<DuplicateGroup> {
    let mut order: Vec<NaturalKey> = Vec::new();
    let mut groups: HashMap<NaturalKey, Vec<&ResolvedRate>> = HashMap::new();

    for rate in rates {
        let key = rate.natural_key();
        let members = groups.entry(key).or_default();
        if members.is_empty() {
            order.push(key);
        }
        members.push(rate);
    }

    order
        .into_iter()
        .filter_map(|key| {
            let members = groups.remove(&key)?;
            if members.len() < 2 {
                return None;
            }
            let service_label = members
                .iter()
                .find_map(|r| r.service_key.clone())
                .unwrap_or_else(|| key.service_id.to_string());
            Some(DuplicateGroup {
                account_id: key.account_id,
                service_id: key.service_id,
                service_label,
                effective_date: key.effective_date.compact(),
                row_numbers: members.iter().map(|r| r.source_row_number).collect(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EffectiveDate;
    use rust_decimal::Decimal;

    fn rate(row: usize, account_id: u64, service_id: u64, key: Option<&str>, date: &str) -> ResolvedRate {
        ResolvedRate {
            account_id,
            service_id,
            service_key: key.map(str::to_string),
            rate: Decimal::ONE,
            cogs: Decimal::ZERO,
            effective_date: EffectiveDate::parse(date).unwrap(),
            source_row_number: row,
        }
    }

    #[test]
    fn test_no_duplicates() {
        let rates = vec![
            rate(2, 10, 20, None, "20250101"),
            rate(3, 10, 20, None, "20250201"),
            rate(4, 11, 20, None, "20250101"),
        ];
        assert!(find_duplicates(&rates).is_empty());
    }

    #[test]
    fn test_duplicate_pair_reports_both_rows() {
        let rates = vec![
            rate(2, 10, 20, None, "20250101"),
            rate(3, 10, 20, None, "2025-01-01"),
        ];
        let groups = find_duplicates(&rates);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].row_numbers, vec![2, 3]);
        assert_eq!(groups[0].service_label, "20");
        assert_eq!(
            groups[0].to_string(),
            "account=10, service=20, date=20250101 on rows 2, 3"
        );
    }

    #[test]
    fn test_groups_ordered_by_first_row_and_prefer_key() {
        let rates = vec![
            rate(2, 1, 5, None, "20240101"),
            rate(3, 0, 99, None, "20240101"),
            rate(4, 1, 5, None, "20240101"),
            rate(5, 0, 99, Some("X"), "20240101"),
            rate(6, 1, 5, None, "20240101"),
        ];
        let groups = find_duplicates(&rates);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].row_numbers, vec![2, 4, 6]);
        assert_eq!(groups[1].row_numbers, vec![3, 5]);
        assert_eq!(groups[1].service_label, "X");
    }
}
