//! Export command - write existing rate revisions to CSV

use std::path::Path;

use anyhow::Result;

use super::{get_context, get_logger, log_event};
use crate::output;
use ratekit_core::{ExportMode, LogEvent};

pub fn run(mode: &str, output_path: Option<&Path>, json: bool) -> Result<()> {
    let mode: ExportMode = mode.parse()?;
    let logger = get_logger();
    let ctx = get_context(json)?;
    let backend = ctx.backend_name().to_string();

    let result = match output_path {
        Some(path) => ctx
            .export_service
            .export_to_file(mode, ctx.catalog(), path)
            .map(|summary| {
                if json {
                    println!("{}", serde_json::to_string_pretty(&summary).unwrap_or_default());
                } else {
                    output::success(&format!(
                        "Exported {} rate revision(s) ({}) to {}",
                        summary.rows,
                        summary.mode,
                        path.display()
                    ));
                }
                summary.rows
            }),
        None => ctx.export_service.export_rows(mode, ctx.catalog()).map(|rows| {
            if json {
                println!("{}", serde_json::to_string_pretty(&rows).unwrap_or_default());
            } else if rows.is_empty() {
                println!("No rate revisions found.");
            } else {
                let mut table = output::create_table();
                table.set_header(vec!["Account", "Service", "Name", "Date", "Rate", "COGS"]);
                for row in &rows {
                    let account = if row.account_name.is_empty() {
                        row.account_id.to_string()
                    } else {
                        format!("{} ({})", row.account_name, row.account_id)
                    };
                    table.add_row(vec![
                        account,
                        row.service_key.clone(),
                        row.service_name.clone(),
                        row.revision_start_date.clone(),
                        row.rate.clone(),
                        row.cogs.clone(),
                    ]);
                }
                println!("{}", table);
            }
            rows.len()
        }),
    };

    match result {
        Ok(count) => {
            log_event(
                &logger,
                LogEvent::new("export_completed")
                    .with_command(format!("export --mode {}", mode))
                    .with_backend(&backend)
                    .with_counts(count, 0, 0, 0),
            );
            Ok(())
        }
        Err(e) => {
            log_event(
                &logger,
                LogEvent::new("export_failed")
                    .with_command(format!("export --mode {}", mode))
                    .with_backend(&backend)
                    .with_error(format!("{:#}", e)),
            );
            Err(e)
        }
    }
}
