//! Exists command - check for a rate revision by natural key

use anyhow::{anyhow, Result};
use colored::Colorize;

use super::get_context;
use ratekit_core::EffectiveDate;

pub fn run(account_id: u64, service: &str, date: &str, json: bool) -> Result<()> {
    let effective_date = EffectiveDate::parse(date)
        .ok_or_else(|| anyhow!("Invalid date '{}'. Use YYYYMMDD or YYYY-MM-DD", date))?;

    let ctx = get_context(json)?;

    // A numeric argument is taken as the service id, anything else as a key
    let resolved = if service.trim().chars().all(|c| c.is_ascii_digit()) {
        ctx.catalog().resolve(Some(service), None)
    } else {
        ctx.catalog().resolve(None, Some(service))
    };
    let service_id = resolved.map_err(|e| anyhow!("{}", e))?;

    let exists = ctx
        .export_service
        .rate_exists(account_id, service_id, effective_date)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "account_id": account_id,
                "service_id": service_id,
                "revision_start_date": effective_date.hyphenated(),
                "exists": exists,
            })
        );
    } else if exists {
        println!(
            "Rate exists for account={}, service={}, date={}: {}",
            account_id,
            service,
            effective_date.hyphenated(),
            "yes".green()
        );
    } else {
        println!(
            "Rate exists for account={}, service={}, date={}: {}",
            account_id,
            service,
            effective_date.hyphenated(),
            "no".yellow()
        );
    }

    Ok(())
}
