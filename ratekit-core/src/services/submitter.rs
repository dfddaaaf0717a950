//! Batch submission of validated rates
//!
//! Rates are sent in input order, one create request per row, grouped into
//! fixed-size chunks for progress reporting. A chunk is not a transaction:
//! every row stands alone and a failed row never stops the batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Serialize;

use crate::config::DEFAULT_CHUNK_SIZE;
use crate::domain::{ApiError, EffectiveDate, ErrorCategory, NewRate, ResolvedRate, SubmissionOutcome};
use crate::ports::RateApi;

/// Cooperative cancellation, checked between chunks only
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Emitted after each chunk completes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkProgress {
    /// 1-based
    pub chunk_index: usize,
    pub chunk_count: usize,
    /// 1-based positions within the submitted rates, inclusive
    pub first_row: usize,
    pub last_row: usize,
    pub total_rows: usize,
    pub percent: u8,
}

/// Outcome of one submitted row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowSubmission {
    pub row_number: usize,
    pub account_id: u64,
    pub service_label: String,
    pub effective_date: EffectiveDate,
    pub outcome: SubmissionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything the submitter did in one run
#[derive(Debug, Clone, Default)]
pub struct SubmissionRun {
    pub results: Vec<RowSubmission>,
    /// Rows left unsent because the run was cancelled
    pub not_submitted: usize,
    pub cancelled: bool,
}

/// Chunk size actually used; zero is coerced to one
pub fn effective_chunk_size(requested: Option<usize>) -> usize {
    requested.unwrap_or(DEFAULT_CHUNK_SIZE).max(1)
}

/// Split rates into ordered, contiguous chunks
pub fn chunk_rates(rates: &[ResolvedRate], chunk_size: usize) -> Vec<&[ResolvedRate]> {
    rates.chunks(chunk_size.max(1)).collect()
}

fn text_markers() -> &'static [(Regex, ErrorCategory)] {
    static MARKERS: OnceLock<Vec<(Regex, ErrorCategory)>> = OnceLock::new();
    MARKERS.get_or_init(|| {
        [
            (r"(?i)overlapping\s+date", ErrorCategory::OverlappingDate),
            (r"(?i)service.*not\s+found", ErrorCategory::ServiceNotFound),
            (r"(?i)account.*not\s+found", ErrorCategory::AccountNotFound),
            (r"(?i)validation", ErrorCategory::ValidationError),
        ]
        .into_iter()
        .filter_map(|(pattern, category)| Regex::new(pattern).ok().map(|re| (re, category)))
        .collect()
    })
}

/// Classify a create failure
///
/// A specific structured code (overlap, unknown service or account) wins.
/// Otherwise the message is matched against known markers in priority
/// order, then a generic validation code applies, and an unmatched HTTP 422
/// is a validation error.
pub fn classify_error(error: &ApiError) -> ErrorCategory {
    let coded = error.code.as_deref().and_then(ErrorCategory::from_code);
    if let Some(category) = coded.filter(|c| *c != ErrorCategory::ValidationError) {
        return category;
    }

    if let Some((_, category)) = text_markers()
        .iter()
        .find(|(re, _)| re.is_match(&error.message))
    {
        return *category;
    }

    if let Some(category) = coded {
        return category;
    }

    match error.status {
        Some(422) => ErrorCategory::ValidationError,
        _ => ErrorCategory::Other,
    }
}

/// Submit one rate and classify the result
pub fn submit_one(api: &dyn RateApi, rate: &ResolvedRate) -> RowSubmission {
    let (outcome, error) = match api.create_rate(&NewRate::from(rate)) {
        Ok(()) => (SubmissionOutcome::Created, None),
        Err(e) => (
            SubmissionOutcome::from_category(classify_error(&e)),
            Some(e.to_string()),
        ),
    };

    RowSubmission {
        row_number: rate.source_row_number,
        account_id: rate.account_id,
        service_label: rate.service_label(),
        effective_date: rate.effective_date,
        outcome,
        error,
    }
}

/// Submit every rate chunk by chunk
pub fn submit_rates<P>(
    api: &dyn RateApi,
    rates: &[ResolvedRate],
    chunk_size: usize,
    mut progress: P,
    cancel: &CancelToken,
) -> SubmissionRun
where
    P: FnMut(&ChunkProgress),
{
    let chunks = chunk_rates(rates, chunk_size);
    let chunk_count = chunks.len();
    let total_rows = rates.len();

    let mut run = SubmissionRun {
        results: Vec::with_capacity(total_rows),
        ..Default::default()
    };

    let mut done = 0;
    for (idx, chunk) in chunks.into_iter().enumerate() {
        if cancel.is_cancelled() {
            run.cancelled = true;
            run.not_submitted = total_rows - done;
            break;
        }

        for rate in chunk {
            run.results.push(submit_one(api, rate));
        }

        let first_row = done + 1;
        done += chunk.len();
        progress(&ChunkProgress {
            chunk_index: idx + 1,
            chunk_count,
            first_row,
            last_row: done,
            total_rows,
            percent: ((done * 100) / total_rows.max(1)) as u8,
        });
    }

    run
}
