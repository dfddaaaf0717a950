//! Service layer - business logic orchestration
//!
//! The import pipeline is split by stage: parser, catalog (key resolution),
//! validator, duplicates, submitter, report. `import` wires them together;
//! `precheck` compares a previewed batch with the server.

pub mod catalog;
pub mod duplicates;
pub mod export;
pub mod import;
pub mod logging;
pub mod parser;
pub mod precheck;
pub mod report;
pub mod submitter;
pub mod validator;

pub use catalog::{CatalogState, ResolveError, ServiceCatalog};
pub use duplicates::{find_duplicates, DuplicateGroup};
pub use export::{ExportMode, ExportRow, ExportService, ExportSummary};
pub use import::{
    import_batch, ImportError, ImportOptions, ImportOutcome, ImportPreview, ImportService,
    Rejection,
};
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use parser::{ParsedTable, CANDIDATE_ENCODINGS};
pub use precheck::{check_against_server, CheckFinding, ServerCheck};
pub use report::{CategoryBreakdown, ImportReport, MAX_EXAMPLES};
pub use submitter::{classify_error, CancelToken, ChunkProgress, RowSubmission};
pub use validator::{RowError, ValidationFailure};
