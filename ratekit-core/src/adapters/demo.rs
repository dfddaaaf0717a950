//! Demo billing backend
//!
//! An in-memory stand-in for the billing API with a small service catalog,
//! a handful of accounts and seeded rate history. Used in demo mode and in
//! tests. It answers creates the way the real platform does: an existing
//! natural key is rejected as an overlapping date, and unknown services or
//! accounts come back as "not found".

use std::collections::BTreeMap;
use std::sync::Mutex;

use rust_decimal::Decimal;

use crate::domain::result::{Error as DomainError, Result};
use crate::domain::{AccountItem, ApiError, NewRate, RateRecord, ServiceItem};
use crate::ports::{Page, PageRequest, RateApi};

/// Generate the demo service catalog
pub fn generate_demo_services() -> Vec<ServiceItem> {
    vec![
        ServiceItem::new(1, "cpu.core").with_description("Compute - vCPU core hour"),
        ServiceItem::new(2, "ram.gb").with_description("Compute - memory GB hour"),
        ServiceItem::new(3, "storage.gb").with_description("Block storage GB month"),
        ServiceItem::new(4, "vm.small").with_description("Virtual machine - small"),
        ServiceItem::new(5, "vm.large").with_description("Virtual machine - large"),
        ServiceItem::new(6, "backup.gb").with_description("Backup storage GB month"),
        ServiceItem {
            id: 7,
            key: None,
            description: Some("Legacy support contract".to_string()),
        },
    ]
}

/// Generate demo accounts (id, name)
pub fn generate_demo_accounts() -> BTreeMap<u64, String> {
    [
        (1, "Acme Corp"),
        (2, "Globex"),
        (3, "Initech"),
        (1234, "Umbrella Holdings"),
    ]
    .into_iter()
    .map(|(id, name)| (id, name.to_string()))
    .collect()
}

/// Generate seeded rate history: list prices plus a few account overrides
pub fn generate_demo_rates() -> Vec<RateRecord> {
    // (account, service, rate in cents, cogs in cents, date)
    let seeds: [(Option<u64>, u64, i64, i64, &str); 10] = [
        (None, 1, 450, 300, "2023-01-01"),
        (None, 1, 480, 310, "2023-07-01"),
        (None, 2, 120, 80, "2023-01-01"),
        (None, 3, 10, 6, "2023-01-01"),
        (None, 4, 2500, 1800, "2023-01-01"),
        (None, 5, 9000, 6500, "2023-01-01"),
        (Some(1), 1, 400, 300, "2023-03-01"),
        (Some(1), 4, 2200, 1800, "2023-03-01"),
        (Some(2), 2, 100, 80, "2023-02-01"),
        (Some(2), 2, 95, 80, "2023-09-01"),
    ];

    let accounts = generate_demo_accounts();
    seeds
        .iter()
        .enumerate()
        .map(|(idx, (account_id, service_id, rate, cogs, date))| RateRecord {
            id: (idx + 1).to_string(),
            account_id: *account_id,
            account_name: account_id.and_then(|id| accounts.get(&id).cloned()),
            service_id: *service_id,
            rate: Some(Decimal::new(*rate, 2)),
            cogs: Some(Decimal::new(*cogs, 2)),
            effective_date: (*date).to_string(),
        })
        .collect()
}

#[derive(Debug)]
struct DemoState {
    services: Vec<ServiceItem>,
    accounts: BTreeMap<u64, String>,
    rates: Vec<RateRecord>,
    created: Vec<NewRate>,
}

/// Demo rate API
#[derive(Debug)]
pub struct DemoRateApi {
    state: Mutex<DemoState>,
    catalog_failure: Option<String>,
}

impl DemoRateApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DemoState {
                services: generate_demo_services(),
                accounts: generate_demo_accounts(),
                rates: generate_demo_rates(),
                created: Vec::new(),
            }),
            catalog_failure: None,
        }
    }

    /// Make every catalog listing fail with `reason`
    pub fn failing_catalog(mut self, reason: impl Into<String>) -> Self {
        self.catalog_failure = Some(reason.into());
        self
    }

    /// Rates created through this instance
    pub fn created(&self) -> Vec<NewRate> {
        self.state
            .lock()
            .map(|s| s.created.clone())
            .unwrap_or_default()
    }

    pub fn created_count(&self) -> usize {
        self.state.lock().map(|s| s.created.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, DemoState>> {
        self.state
            .lock()
            .map_err(|e| DomainError::Other(format!("demo state poisoned: {}", e)))
    }
}

impl Default for DemoRateApi {
    fn default() -> Self {
        Self::new()
    }
}

fn page_of<T: Clone>(items: &[T], page: PageRequest) -> Page<T> {
    let slice: Vec<T> = items.iter().skip(page.offset).take(page.limit).cloned().collect();
    Page::from_items(slice, page)
}

impl RateApi for DemoRateApi {
    fn name(&self) -> &str {
        "demo"
    }

    fn list_services(&self, page: PageRequest) -> Result<Page<ServiceItem>> {
        if let Some(reason) = &self.catalog_failure {
            return Err(DomainError::Api(reason.clone()));
        }
        let state = self.lock()?;
        Ok(page_of(&state.services, page))
    }

    fn list_accounts(&self, page: PageRequest) -> Result<Page<AccountItem>> {
        let state = self.lock()?;
        let accounts: Vec<AccountItem> = state
            .accounts
            .iter()
            .map(|(id, name)| AccountItem {
                id: *id,
                name: name.clone(),
            })
            .collect();
        Ok(page_of(&accounts, page))
    }

    fn list_rates(&self, page: PageRequest) -> Result<Page<RateRecord>> {
        let state = self.lock()?;
        Ok(page_of(&state.rates, page))
    }

    fn create_rate(&self, rate: &NewRate) -> std::result::Result<(), ApiError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| ApiError::transport(format!("demo state poisoned: {}", e)))?;

        if !state.services.iter().any(|s| s.id == rate.service_id) {
            return Err(ApiError::new(format!(
                "The selected service {} was not found",
                rate.service_id
            ))
            .with_status(422));
        }

        let account_name = match rate.account_id {
            Some(id) => match state.accounts.get(&id) {
                Some(name) => Some(name.clone()),
                None => {
                    return Err(ApiError::new(format!(
                        "The selected account {} was not found",
                        id
                    ))
                    .with_status(422));
                }
            },
            None => None,
        };

        let overlaps = state.rates.iter().any(|r| {
            r.account_id == rate.account_id
                && r.service_id == rate.service_id
                && r.parsed_date() == Some(rate.effective_date)
        });
        if overlaps {
            return Err(ApiError::new(
                "The rate has an overlapping date with an existing revision",
            )
            .with_status(422));
        }

        let id = (state.rates.len() + 1).to_string();
        state.rates.push(RateRecord {
            id,
            account_id: rate.account_id,
            account_name,
            service_id: rate.service_id,
            rate: Some(rate.rate),
            cogs: Some(rate.cogs),
            effective_date: rate.effective_date.hyphenated(),
        });
        state.created.push(rate.clone());
        Ok(())
    }
}
