//! Import summary
//!
//! Aggregates per-row submission outcomes into the report shown at the end
//! of a run. Each skip/failure category keeps a count and the first few rows
//! as examples, in submission order.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::{ErrorCategory, ResolvedRate, SubmissionOutcome};
use crate::services::submitter::{RowSubmission, SubmissionRun};

/// Examples kept per category
pub const MAX_EXAMPLES: usize = 5;

/// Count and sample rows for one category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryBreakdown {
    pub count: usize,
    pub examples: Vec<String>,
    /// First API message seen for this category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_error: Option<String>,
}

impl CategoryBreakdown {
    fn record(&mut self, row: &RowSubmission) {
        self.count += 1;
        if self.examples.len() < MAX_EXAMPLES {
            self.examples.push(format_example(row));
        }
        if self.first_error.is_none() {
            self.first_error = row.error.clone();
        }
    }
}

/// `row N -> account=…, service=…, date=YYYY-MM-DD`
pub fn format_example(row: &RowSubmission) -> String {
    format!(
        "row {} -> account={}, service={}, date={}",
        row.row_number,
        row.account_id,
        row.service_label,
        row.effective_date.hyphenated()
    )
}

/// Same format for a rate that has not been submitted
pub fn format_rate(rate: &ResolvedRate) -> String {
    format!(
        "row {} -> account={}, service={}, date={}",
        rate.source_row_number,
        rate.account_id,
        rate.service_label(),
        rate.effective_date.hyphenated()
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub run_id: Uuid,
    /// Encoding the input was decoded with, when read from a file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    pub total_rows: usize,
    pub processed: usize,
    pub created: usize,
    pub skipped_existing: usize,
    pub failed: usize,
    pub not_submitted: usize,
    pub cancelled: bool,
    pub skipped: BTreeMap<ErrorCategory, CategoryBreakdown>,
    pub failures: BTreeMap<ErrorCategory, CategoryBreakdown>,
    pub elapsed_ms: u64,
}

impl ImportReport {
    pub fn new(total_rows: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            encoding: None,
            total_rows,
            processed: 0,
            created: 0,
            skipped_existing: 0,
            failed: 0,
            not_submitted: 0,
            cancelled: false,
            skipped: BTreeMap::new(),
            failures: BTreeMap::new(),
            elapsed_ms: 0,
        }
    }

    /// Build the report for a finished submission run
    pub fn from_run(total_rows: usize, run: &SubmissionRun, elapsed_ms: u64) -> Self {
        let mut report = Self::new(total_rows);
        for row in &run.results {
            report.record(row);
        }
        report.not_submitted = run.not_submitted;
        report.cancelled = run.cancelled;
        report.elapsed_ms = elapsed_ms;
        report
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn record(&mut self, row: &RowSubmission) {
        self.processed += 1;
        match row.outcome {
            SubmissionOutcome::Created => self.created += 1,
            SubmissionOutcome::SkippedExisting => {
                self.skipped_existing += 1;
                self.skipped
                    .entry(ErrorCategory::OverlappingDate)
                    .or_default()
                    .record(row);
            }
            SubmissionOutcome::Failed(category) => {
                self.failed += 1;
                self.failures.entry(category).or_default().record(row);
            }
        }
    }

    /// True when every submitted row was created or already existed
    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }
}
