//! Import command - submit rate revisions from a CSV file

use std::path::Path;

use anyhow::{bail, Result};
use colored::Colorize;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

use super::{get_context, get_logger, log_event};
use crate::output;
use ratekit_core::services::{CategoryBreakdown, CheckFinding, ImportPreview, Rejection, ServerCheck};
use ratekit_core::{CancelToken, ChunkProgress, ErrorCategory, ImportOptions, ImportOutcome, ImportReport, LogEvent};

pub fn run(
    file: &Path,
    chunk_size: Option<usize>,
    preview: bool,
    yes: bool,
    check_server: bool,
    json: bool,
) -> Result<()> {
    let logger = get_logger();
    let ctx = get_context(json)?;
    let backend = ctx.backend_name().to_string();

    let chunk_size = chunk_size.or(Some(ctx.config.import.chunk_size));
    let cancel = CancelToken::new();

    // Dry run first: nothing is submitted, the server is only read
    let planned = ImportOptions {
        chunk_size,
        preview: true,
        check_server,
        ..Default::default()
    };
    let plan = match ctx.import_service.import_file(file, &planned, |_| {}, &cancel) {
        Ok(outcome) => outcome,
        Err(e) => {
            log_event(
                &logger,
                LogEvent::new("import_failed")
                    .with_command("import")
                    .with_backend(&backend)
                    .with_error(e.to_string()),
            );
            return Err(e.into());
        }
    };

    let plan = match plan {
        ImportOutcome::Preview(plan) => plan,
        ImportOutcome::Rejected(rejection) => {
            let message = rejection_summary(&rejection);
            log_event(
                &logger,
                LogEvent::new("import_rejected")
                    .with_command("import")
                    .with_backend(&backend)
                    .with_error(&message),
            );
            if json {
                println!("{}", serde_json::to_string_pretty(&ImportOutcome::Rejected(rejection))?);
            } else {
                print_rejection(&rejection);
            }
            bail!("Import rejected: {}", message);
        }
        ImportOutcome::Completed(_) => bail!("Unexpected submission during preview"),
    };

    if preview {
        if json {
            println!("{}", serde_json::to_string_pretty(&ImportOutcome::Preview(plan))?);
        } else {
            print_preview(&plan);
        }
        return Ok(());
    }

    if !json {
        print_plan_summary(&plan, &backend);
    }

    if !yes && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!("Submit {} rate revision(s)?", plan.total_rows))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let bar = if !json && atty::is(atty::Stream::Stdout) {
        Some(progress_bar())
    } else {
        None
    };

    install_interrupt_handler(&cancel, bar.clone());

    let submit = ImportOptions {
        chunk_size,
        preview: false,
        ..Default::default()
    };
    let mut last_chunk: Option<ChunkProgress> = None;
    let outcome = ctx.import_service.import_file(
        file,
        &submit,
        |progress: &ChunkProgress| {
            if let Some(bar) = &bar {
                bar.set_position(progress.percent as u64);
                bar.set_message(progress_message(progress, cancel.is_cancelled()));
            }
            last_chunk = Some(progress.clone());
        },
        &cancel,
    );

    if let Some(bar) = &bar {
        if cancel.is_cancelled() {
            bar.abandon_with_message(cancelled_message(last_chunk.as_ref()));
        } else {
            bar.finish_and_clear();
        }
    }

    let report = match outcome {
        Ok(ImportOutcome::Completed(report)) => report,
        // The file changed between the plan and the submission
        Ok(ImportOutcome::Rejected(rejection)) => {
            print_rejection(&rejection);
            bail!("Import rejected: {}", rejection_summary(&rejection));
        }
        Ok(ImportOutcome::Preview(_)) => bail!("Nothing was submitted"),
        Err(e) => {
            log_event(
                &logger,
                LogEvent::new("import_failed")
                    .with_command("import")
                    .with_backend(&backend)
                    .with_error(e.to_string()),
            );
            return Err(e.into());
        }
    };

    let mut event = LogEvent::new("import_completed")
        .with_command("import")
        .with_backend(&backend)
        .with_report(&report);
    if !report.is_success() {
        event = event.with_error(format!("{} row(s) failed", report.failed));
    }
    log_event(&logger, event);

    if json {
        println!("{}", serde_json::to_string_pretty(&ImportOutcome::Completed(report.clone()))?);
    } else {
        print_report(&report);
    }

    if report.cancelled {
        bail!("Import cancelled; {} row(s) were not submitted", report.not_submitted);
    }
    if report.failed > 0 {
        bail!("{} of {} row(s) failed", report.failed, report.total_rows);
    }
    Ok(())
}

/// Ctrl-C stops the import after the chunk in flight; a second Ctrl-C exits
fn install_interrupt_handler(cancel: &CancelToken, bar: Option<ProgressBar>) {
    let token = cancel.clone();
    let installed = ctrlc::set_handler(move || {
        if token.is_cancelled() {
            std::process::exit(130);
        }
        token.cancel();
        match &bar {
            Some(bar) => bar.set_message("cancelling after the current chunk..."),
            None => eprintln!("Cancelling after the current chunk..."),
        }
    });
    if let Err(e) = installed {
        output::warning(&format!("Warning: Ctrl-C will not cancel cleanly: {}", e));
    }
}

fn progress_message(progress: &ChunkProgress, cancelled: bool) -> String {
    let message = format!(
        "chunk {}/{} (rows {}-{} of {})",
        progress.chunk_index,
        progress.chunk_count,
        progress.first_row,
        progress.last_row,
        progress.total_rows
    );
    if cancelled && progress.chunk_index < progress.chunk_count {
        format!("{} - cancelling", message)
    } else {
        message
    }
}

fn cancelled_message(last_chunk: Option<&ChunkProgress>) -> String {
    match last_chunk {
        Some(p) => format!(
            "cancelled after chunk {}/{} ({} of {} rows submitted)",
            p.chunk_index, p.chunk_count, p.last_row, p.total_rows
        ),
        None => "cancelled before the first chunk".to_string(),
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}") {
        bar.set_style(style);
    }
    bar
}

fn rejection_summary(rejection: &Rejection) -> String {
    match rejection {
        Rejection::InvalidRows { failure } => format!("{} invalid row(s)", failure.invalid_rows()),
        Rejection::DuplicateKeys { groups } => {
            format!("{} duplicate natural key(s) in file", groups.len())
        }
    }
}

fn print_rejection(rejection: &Rejection) {
    match rejection {
        Rejection::InvalidRows { failure } => {
            output::error(&format!("Validation failed: {} invalid row(s)", failure.invalid_rows()));
            let (shown, remaining) = failure.preview();
            for row in shown {
                eprintln!("  Row {}: {}", row.row_number, row.messages.join("; "));
            }
            if remaining > 0 {
                eprintln!("  ... and {} more", remaining);
            }
        }
        Rejection::DuplicateKeys { groups } => {
            output::error("Duplicate rate revisions in file (account, service, date):");
            for group in groups {
                eprintln!("  {}", group);
            }
        }
    }
    eprintln!("Nothing was submitted. Fix the file and run the import again.");
}

fn print_plan_summary(plan: &ImportPreview, backend: &str) {
    output::info(&format!(
        "{} rate revision(s) validated ({} global), {} chunk(s) of up to {} against {}",
        plan.total_rows, plan.global_rates, plan.chunk_count, plan.chunk_size, backend
    ));
    print_server_check(plan);
}

fn print_server_check(plan: &ImportPreview) {
    if let Some(error) = &plan.server_check_error {
        output::warning(&format!("Warning: server check unavailable: {}", error));
    }
    let Some(check) = &plan.server_check else {
        return;
    };
    for line in server_check_lines(check) {
        println!("{}", line);
    }
    if !check.is_clean() {
        output::warning("Some rows reference accounts or services the server does not know; they will fail.");
    }
}

fn server_check_lines(check: &ServerCheck) -> Vec<String> {
    let mut lines = vec![format!(
        "  Server: {} account(s), {} service(s), {} rate revision(s)",
        check.accounts_on_server, check.services_on_server, check.rates_on_server
    )];
    lines.push(format!("  New: {}", check.new_rates));
    finding_lines(&mut lines, "Will be skipped (already exist)", &check.existing);
    finding_lines(&mut lines, "Unknown account", &check.unknown_accounts);
    finding_lines(&mut lines, "Unknown service", &check.unknown_services);
    lines
}

fn finding_lines(lines: &mut Vec<String>, title: &str, finding: &CheckFinding) {
    if finding.count == 0 {
        return;
    }
    lines.push(format!("  {}: {}", title, finding.count));
    for example in &finding.examples {
        lines.push(format!("    {}", example));
    }
    if finding.count > finding.examples.len() {
        lines.push(format!("    ... and {} more", finding.count - finding.examples.len()));
    }
}

fn print_preview(plan: &ImportPreview) {
    println!("{}", "Import Preview".bold());
    if let Some(encoding) = &plan.encoding {
        println!("  Encoding: {}", encoding);
    }
    println!("  Rows: {} ({} global)", plan.total_rows, plan.global_rates);
    println!("  Chunks: {} of up to {}", plan.chunk_count, plan.chunk_size);
    print_server_check(plan);
    println!();

    let mut table = output::create_table();
    table.set_header(vec!["Row", "Account", "Service", "Date", "Rate", "COGS"]);
    for rate in &plan.rates {
        let account = if rate.is_global() {
            "global".to_string()
        } else {
            rate.account_id.to_string()
        };
        table.add_row(vec![
            rate.source_row_number.to_string(),
            account,
            rate.service_label(),
            rate.effective_date.hyphenated(),
            rate.rate.to_string(),
            rate.cogs.to_string(),
        ]);
    }
    println!("{}", table);
    println!();
    println!("Run without --preview to submit.");
}

fn print_report(report: &ImportReport) {
    println!("{}", "Import Summary".bold());
    if let Some(encoding) = &report.encoding {
        println!("  Encoding: {}", encoding);
    }
    println!("  Rows: {}", report.total_rows);
    println!("  Processed: {}", report.processed);
    println!("  Created: {}", report.created.to_string().green());
    println!("  Skipped (already exist): {}", report.skipped_existing.to_string().yellow());
    let failed = report.failed.to_string();
    if report.failed > 0 {
        println!("  Failed: {}", failed.red());
    } else {
        println!("  Failed: {}", failed);
    }
    if report.not_submitted > 0 {
        println!("  Not submitted: {}", report.not_submitted);
    }
    println!("  Time: {}", output::format_elapsed(report.elapsed_ms));

    print_categories("Skipped", &report.skipped);
    print_categories("Failures", &report.failures);

    println!();
    if report.cancelled {
        output::warning("Import cancelled before all chunks were submitted.");
    } else if report.is_success() {
        output::success(&format!("Import finished (run {}).", report.run_id));
    }
}

fn print_categories(
    title: &str,
    categories: &std::collections::BTreeMap<ErrorCategory, CategoryBreakdown>,
) {
    if categories.is_empty() {
        return;
    }
    println!();
    println!("{}", format!("{}:", title).bold());
    for (category, breakdown) in categories {
        println!("  {} ({})", category, breakdown.count);
        for example in &breakdown.examples {
            println!("    {}", example.dimmed());
        }
        if breakdown.count > breakdown.examples.len() {
            println!("    ... and {} more", breakdown.count - breakdown.examples.len());
        }
        if let Some(message) = &breakdown.first_error {
            println!("    first error: {}", message);
        }
    }
}
