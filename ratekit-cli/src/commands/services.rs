//! Services command - list the service catalog

use anyhow::{bail, Result};
use colored::Colorize;

use super::get_context;
use crate::output;
use ratekit_core::services::CatalogState;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context(true)?;
    let catalog = ctx.catalog();

    if let CatalogState::Degraded(reason) = catalog.state() {
        bail!("Service catalog unavailable: {}", reason);
    }

    let services = catalog.services();

    if json {
        println!("{}", serde_json::to_string_pretty(&services)?);
        return Ok(());
    }

    if services.is_empty() {
        println!("No services found.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["ID", "Key", "Description"]);
    for service in &services {
        table.add_row(vec![
            service.id.to_string(),
            service.key.clone().unwrap_or_else(|| "-".dimmed().to_string()),
            service.description.clone().unwrap_or_default(),
        ]);
    }
    println!("{}", table);
    println!("{} service(s) on {}", services.len(), ctx.backend_name());

    Ok(())
}
