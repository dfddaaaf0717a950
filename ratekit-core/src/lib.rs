//! Ratekit Core - rate revision import and export for a billing platform
//!
//! This crate follows hexagonal architecture:
//!
//! - **domain**: Core entities (rates, services, outcomes)
//! - **ports**: The billing API trait ([`RateApi`])
//! - **services**: Import pipeline stages, export, event logging
//! - **adapters**: Exivity HTTP client and the in-memory demo backend

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use adapters::demo::DemoRateApi;
use adapters::exivity::ExivityClient;
use config::Config;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::Error;
pub use domain::{
    AccountItem, ApiError, EffectiveDate, ErrorCategory, NewRate, RateRecord, RawRow, ResolvedRate,
    ServiceItem, SubmissionOutcome,
};
pub use ports::RateApi;
pub use services::{
    CancelToken, ChunkProgress, EntryPoint, ExportMode, ImportOptions, ImportOutcome,
    ImportReport, LogEvent, LoggingService, ServiceCatalog,
};

/// Main context for ratekit operations
///
/// Holds the configuration, the billing API backend and the services built
/// on it. The service catalog is loaded once, when the context is created.
pub struct RatekitContext {
    pub config: Config,
    pub api: Arc<dyn RateApi>,
    pub import_service: ImportService,
    pub export_service: ExportService,
    /// Set when the service catalog could not be loaded
    pub catalog_warning: Option<String>,
}

impl RatekitContext {
    /// Create a context from the settings in `ratekit_dir`
    ///
    /// Demo mode uses the in-memory backend; otherwise the Exivity client is
    /// built from the connection settings (logging in if needed).
    pub fn new(ratekit_dir: &Path) -> Result<Self> {
        let config = Config::load(ratekit_dir)?;

        let api: Arc<dyn RateApi> = if config.demo_mode {
            Arc::new(DemoRateApi::new())
        } else {
            Arc::new(ExivityClient::from_settings(&config.connection)?)
        };

        Ok(Self::with_api(config, api))
    }

    /// Create a context over an existing backend
    pub fn with_api(config: Config, api: Arc<dyn RateApi>) -> Self {
        let page_size = config.import.page_size;
        let (import_service, catalog_warning) = ImportService::connect(Arc::clone(&api), page_size);
        let export_service = ExportService::new(Arc::clone(&api), page_size);

        Self {
            config,
            api,
            import_service,
            export_service,
            catalog_warning,
        }
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        self.import_service.catalog()
    }

    pub fn backend_name(&self) -> &str {
        self.api.name()
    }
}
