//! Server pre-check - compare a validated batch with what the platform holds
//!
//! Run during preview, before anything is submitted. Rows whose natural key
//! already exists will be skipped on import; rows naming an account or
//! service the platform does not know will fail.

use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::domain::{NaturalKey, ResolvedRate, GLOBAL_ACCOUNT_ID};
use crate::ports::{fetch_all, RateApi};
use crate::services::catalog::ServiceCatalog;
use crate::services::report::{format_rate, MAX_EXAMPLES};

/// Rows sharing one pre-check finding
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckFinding {
    pub count: usize,
    pub examples: Vec<String>,
}

impl CheckFinding {
    fn record(&mut self, rate: &ResolvedRate) {
        self.count += 1;
        if self.examples.len() < MAX_EXAMPLES {
            self.examples.push(format_rate(rate));
        }
    }
}

/// What the platform would make of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerCheck {
    pub accounts_on_server: usize,
    pub services_on_server: usize,
    pub rates_on_server: usize,
    /// Rows expected to be created
    pub new_rates: usize,
    /// Natural key already exists; skipped on import
    pub existing: CheckFinding,
    pub unknown_accounts: CheckFinding,
    /// Only filled when the service catalog is loaded
    pub unknown_services: CheckFinding,
}

impl ServerCheck {
    /// True when no row is expected to fail
    pub fn is_clean(&self) -> bool {
        self.unknown_accounts.count == 0 && self.unknown_services.count == 0
    }
}

/// Check rates against the accounts and rate revisions on the server
///
/// A row is attributed to the first finding that applies: unknown account,
/// then unknown service, then existing natural key.
pub fn check_against_server(
    api: &dyn RateApi,
    catalog: &ServiceCatalog,
    rates: &[ResolvedRate],
    page_size: usize,
) -> Result<ServerCheck> {
    let accounts: HashSet<u64> = fetch_all(page_size, |page| api.list_accounts(page))
        .context("Failed to fetch accounts")?
        .into_iter()
        .map(|a| a.id)
        .collect();

    let records = fetch_all(page_size, |page| api.list_rates(page)).context("Failed to fetch rates")?;
    let existing: HashSet<NaturalKey> = records
        .iter()
        .filter_map(|r| {
            Some(NaturalKey {
                account_id: r.account_id.unwrap_or(GLOBAL_ACCOUNT_ID),
                service_id: r.service_id,
                effective_date: r.parsed_date()?,
            })
        })
        .collect();

    let mut check = ServerCheck {
        accounts_on_server: accounts.len(),
        services_on_server: catalog.len(),
        rates_on_server: records.len(),
        ..Default::default()
    };

    for rate in rates {
        if !rate.is_global() && !accounts.contains(&rate.account_id) {
            check.unknown_accounts.record(rate);
        } else if catalog.is_ready() && !catalog.contains(rate.service_id) {
            check.unknown_services.record(rate);
        } else if existing.contains(&rate.natural_key()) {
            check.existing.record(rate);
        } else {
            check.new_rates += 1;
        }
    }

    Ok(check)
}
