//! Billable services (catalog items) and accounts

use serde::{Deserialize, Serialize};

/// A billable service from the platform catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceItem {
    pub id: u64,
    /// Human-readable alternate identifier
    pub key: Option<String>,
    pub description: Option<String>,
}

impl ServiceItem {
    pub fn new(id: u64, key: impl Into<String>) -> Self {
        Self {
            id,
            key: Some(key.into()),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A billing account, as listed by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountItem {
    pub id: u64,
    pub name: String,
}
