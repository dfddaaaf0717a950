//! Import service - rate file import
//!
//! [`import_batch`] is the whole pipeline over already-parsed rows:
//! validate (resolving services) → reject duplicates → submit → report.
//! Nothing is sent to the API unless every row is valid and every natural
//! key is unique. [`ImportService`] adds file reading on top.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::config::DEFAULT_PAGE_SIZE;
use crate::domain::{RawRow, ResolvedRate};
use crate::ports::RateApi;
use crate::services::catalog::ServiceCatalog;
use crate::services::duplicates::{find_duplicates, DuplicateGroup};
use crate::services::parser::{self, ParsedTable};
use crate::services::precheck::{check_against_server, ServerCheck};
use crate::services::report::ImportReport;
use crate::services::submitter::{effective_chunk_size, submit_rates, CancelToken, ChunkProgress};
use crate::services::validator::{validate_all, ValidationFailure};

pub use crate::services::parser::ImportError;

/// Import options
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Rows per chunk; `None` uses the default, zero is coerced to one
    pub chunk_size: Option<usize>,
    /// Validate and plan only; nothing is submitted
    pub preview: bool,
    /// In preview, compare rows with the accounts and rates on the server
    pub check_server: bool,
    /// Page size for the server check listings
    pub page_size: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            chunk_size: None,
            preview: false,
            check_server: false,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Why a batch was refused before submission
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    InvalidRows { failure: ValidationFailure },
    DuplicateKeys { groups: Vec<DuplicateGroup> },
}

/// What a validated batch would do
#[derive(Debug, Clone, Serialize)]
pub struct ImportPreview {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    pub total_rows: usize,
    pub chunk_size: usize,
    pub chunk_count: usize,
    pub global_rates: usize,
    pub rates: Vec<ResolvedRate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_check: Option<ServerCheck>,
    /// Set when the server check was requested but could not run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_check_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum ImportOutcome {
    Rejected(Rejection),
    Preview(ImportPreview),
    Completed(ImportReport),
}

impl ImportOutcome {
    fn with_encoding(self, encoding: &str) -> Self {
        match self {
            ImportOutcome::Preview(mut preview) => {
                preview.encoding = Some(encoding.to_string());
                ImportOutcome::Preview(preview)
            }
            ImportOutcome::Completed(report) => {
                ImportOutcome::Completed(report.with_encoding(encoding))
            }
            rejected => rejected,
        }
    }
}

/// Run the import pipeline over parsed rows
pub fn import_batch<P>(
    api: &dyn RateApi,
    catalog: &ServiceCatalog,
    rows: &[RawRow],
    options: &ImportOptions,
    progress: P,
    cancel: &CancelToken,
) -> ImportOutcome
where
    P: FnMut(&ChunkProgress),
{
    let started = Instant::now();

    let rates = match validate_all(rows, catalog) {
        Ok(rates) => rates,
        Err(failure) => return ImportOutcome::Rejected(Rejection::InvalidRows { failure }),
    };

    let groups = find_duplicates(&rates);
    if !groups.is_empty() {
        return ImportOutcome::Rejected(Rejection::DuplicateKeys { groups });
    }

    let chunk_size = effective_chunk_size(options.chunk_size);

    if options.preview {
        let (server_check, server_check_error) = if options.check_server {
            match check_against_server(api, catalog, &rates, options.page_size) {
                Ok(check) => (Some(check), None),
                Err(e) => (None, Some(format!("{:#}", e))),
            }
        } else {
            (None, None)
        };

        return ImportOutcome::Preview(ImportPreview {
            encoding: None,
            total_rows: rates.len(),
            chunk_size,
            chunk_count: rates.len().div_ceil(chunk_size),
            global_rates: rates.iter().filter(|r| r.is_global()).count(),
            rates,
            server_check,
            server_check_error,
        });
    }

    let run = submit_rates(api, &rates, chunk_size, progress, cancel);
    let elapsed_ms = started.elapsed().as_millis() as u64;
    ImportOutcome::Completed(ImportReport::from_run(rates.len(), &run, elapsed_ms))
}

/// Import service for rate files
///
/// Owns the service catalog for the session. Reloading needs `&mut self`,
/// so it cannot happen while an import holds `&self`.
pub struct ImportService {
    api: Arc<dyn RateApi>,
    catalog: ServiceCatalog,
    page_size: usize,
}

impl ImportService {
    /// Create the service and load the catalog
    ///
    /// A catalog load failure is returned as a warning, not an error.
    pub fn connect(api: Arc<dyn RateApi>, page_size: usize) -> (Self, Option<String>) {
        let mut catalog = ServiceCatalog::new();
        let warning = catalog.load(api.as_ref(), page_size);
        (
            Self {
                api,
                catalog,
                page_size,
            },
            warning,
        )
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    pub fn reload_catalog(&mut self) -> Option<String> {
        self.catalog.reload(self.api.as_ref(), self.page_size)
    }

    /// Parse a file without importing it
    pub fn read_file(&self, path: &Path) -> Result<ParsedTable, ImportError> {
        parser::parse_file(path)
    }

    /// Import a rate file
    pub fn import_file<P>(
        &self,
        path: &Path,
        options: &ImportOptions,
        progress: P,
        cancel: &CancelToken,
    ) -> Result<ImportOutcome, ImportError>
    where
        P: FnMut(&ChunkProgress),
    {
        let table = self.read_file(path)?;
        let options = ImportOptions {
            page_size: self.page_size,
            ..options.clone()
        };
        let outcome = import_batch(
            self.api.as_ref(),
            &self.catalog,
            &table.rows,
            &options,
            progress,
            cancel,
        );
        Ok(outcome.with_encoding(table.encoding))
    }
}
