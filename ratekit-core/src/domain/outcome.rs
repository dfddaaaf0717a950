//! Per-row submission outcomes

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a rejected create request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// A revision with the same natural key already exists
    OverlappingDate,
    ServiceNotFound,
    AccountNotFound,
    ValidationError,
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::OverlappingDate => "overlapping_date",
            ErrorCategory::ServiceNotFound => "service_not_found",
            ErrorCategory::AccountNotFound => "account_not_found",
            ErrorCategory::ValidationError => "validation_error",
            ErrorCategory::Other => "other",
        }
    }

    /// Match a structured error code returned by the API
    pub fn from_code(code: &str) -> Option<Self> {
        let normalized = code.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "overlapping_date" | "rate_overlap" | "duplicate" => Some(ErrorCategory::OverlappingDate),
            "service_not_found" => Some(ErrorCategory::ServiceNotFound),
            "account_not_found" => Some(ErrorCategory::AccountNotFound),
            "validation_error" | "validation_failed" | "invalid" => {
                Some(ErrorCategory::ValidationError)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of submitting one rate revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "category", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Created,
    /// The natural key already exists server-side; not a failure
    SkippedExisting,
    Failed(ErrorCategory),
}

impl SubmissionOutcome {
    /// Turn a classified error into an outcome. Overlaps are skips.
    pub fn from_category(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::OverlappingDate => SubmissionOutcome::SkippedExisting,
            other => SubmissionOutcome::Failed(other),
        }
    }
}

/// Error returned by the API for a single create request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status, `None` for transport failures
    pub status: Option<u16>,
    /// Structured error code, when the API supplies one
    pub code: Option<String>,
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// A failure that happened before any response was received
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ApiError {}
