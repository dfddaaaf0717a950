//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod outcome;
pub mod rate;
mod row;
mod service;
pub mod result;

pub use outcome::{ApiError, ErrorCategory, SubmissionOutcome};
pub use rate::{EffectiveDate, NaturalKey, NewRate, RateRecord, ResolvedRate, GLOBAL_ACCOUNT_ID};
pub use row::RawRow;
pub use service::{AccountItem, ServiceItem};
