//! Service catalog - resolves symbolic service keys to numeric ids
//!
//! The catalog is loaded once per session from the billing API and is
//! read-only while an import runs. A failed load degrades the catalog
//! instead of failing the session: explicit service ids still resolve.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::domain::ServiceItem;
use crate::ports::{fetch_all, RateApi};

/// Lifecycle of the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogState {
    /// Never loaded
    Empty,
    /// Loaded; holds the number of services
    Ready(usize),
    /// Load failed; holds the reason
    Degraded(String),
}

/// Why a row's service could not be resolved
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No service_id or service_key provided")]
    NoIdentifierProvided,

    #[error("Invalid service_id '{0}'")]
    InvalidId(String),

    #[error("Unknown service_key '{0}'")]
    UnresolvedKey(String),

    #[error("Cannot resolve service_key '{0}': service catalog unavailable")]
    CatalogUnavailable(String),
}

#[derive(Debug)]
pub struct ServiceCatalog {
    state: CatalogState,
    /// Every loaded service id, with or without key and description
    ids: BTreeSet<u64>,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    id_to_description: HashMap<u64, String>,
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceCatalog {
    pub fn new() -> Self {
        Self {
            state: CatalogState::Empty,
            ids: BTreeSet::new(),
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            id_to_description: HashMap::new(),
        }
    }

    /// Build a ready catalog from known services
    pub fn from_services(services: impl IntoIterator<Item = ServiceItem>) -> Self {
        let mut catalog = Self::new();
        catalog.fill(services);
        catalog
    }

    /// Load every service page from the API
    ///
    /// Returns a warning when the load fails; the catalog is then degraded.
    pub fn load(&mut self, api: &dyn RateApi, page_size: usize) -> Option<String> {
        self.clear();
        match fetch_all(page_size, |page| api.list_services(page)) {
            Ok(services) => {
                self.fill(services);
                None
            }
            Err(e) => {
                let reason = e.to_string();
                self.state = CatalogState::Degraded(reason.clone());
                Some(format!(
                    "Service catalog unavailable ({}). Rows must use service_id",
                    reason
                ))
            }
        }
    }

    /// Drop the cached maps and load again
    pub fn reload(&mut self, api: &dyn RateApi, page_size: usize) -> Option<String> {
        self.load(api, page_size)
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.key_to_id.clear();
        self.id_to_key.clear();
        self.id_to_description.clear();
        self.state = CatalogState::Empty;
    }

    fn fill(&mut self, services: impl IntoIterator<Item = ServiceItem>) {
        for service in services {
            self.ids.insert(service.id);
            if let Some(key) = service.key.filter(|k| !k.trim().is_empty()) {
                self.key_to_id.insert(key.clone(), service.id);
                self.id_to_key.insert(service.id, key);
            }
            if let Some(description) = service.description {
                self.id_to_description.insert(service.id, description);
            }
        }
        self.state = CatalogState::Ready(self.len());
    }

    pub fn state(&self) -> &CatalogState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, CatalogState::Ready(_))
    }

    /// Number of loaded services
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a row's service
    ///
    /// A non-blank explicit id wins and is not checked against the catalog.
    pub fn resolve(&self, explicit_id: Option<&str>, key: Option<&str>) -> Result<u64, ResolveError> {
        let explicit_id = explicit_id.map(str::trim).filter(|v| !v.is_empty());
        let key = key.map(str::trim).filter(|v| !v.is_empty());

        if let Some(raw) = explicit_id {
            return raw
                .trim_start_matches('+')
                .parse::<u64>()
                .map_err(|_| ResolveError::InvalidId(raw.to_string()));
        }

        let Some(key) = key else {
            return Err(ResolveError::NoIdentifierProvided);
        };

        match self.key_to_id.get(key) {
            Some(id) => Ok(*id),
            None if self.is_ready() => Err(ResolveError::UnresolvedKey(key.to_string())),
            None => Err(ResolveError::CatalogUnavailable(key.to_string())),
        }
    }

    /// Whether the service id was loaded
    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    pub fn key_for(&self, id: u64) -> Option<&str> {
        self.id_to_key.get(&id).map(String::as_str)
    }

    pub fn description_for(&self, id: u64) -> Option<&str> {
        self.id_to_description.get(&id).map(String::as_str)
    }

    /// All known services ordered by id
    pub fn services(&self) -> Vec<ServiceItem> {
        self.ids
            .iter()
            .map(|&id| ServiceItem {
                id,
                key: self.key_for(id).map(str::to_string),
                description: self.description_for(id).map(str::to_string),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::demo::DemoRateApi;

    fn catalog() -> ServiceCatalog {
        ServiceCatalog::from_services(vec![
            ServiceItem::new(99, "X").with_description("Service X"),
            ServiceItem::new(12, "vm.small"),
        ])
    }

    #[test]
    fn test_explicit_id_wins() {
        let catalog = catalog();
        // id 500 is unknown to the catalog but still used verbatim
        assert_eq!(catalog.resolve(Some("500"), Some("X")), Ok(500));
        assert_eq!(catalog.resolve(Some(" 56 "), None), Ok(56));
    }

    #[test]
    fn test_key_lookup() {
        let catalog = catalog();
        assert_eq!(catalog.resolve(Some(""), Some("X")), Ok(99));
        assert_eq!(catalog.resolve(None, Some("vm.small")), Ok(12));
        assert_eq!(
            catalog.resolve(None, Some("nope")),
            Err(ResolveError::UnresolvedKey("nope".to_string()))
        );
    }

    #[test]
    fn test_no_identifier_and_invalid_id() {
        let catalog = catalog();
        assert_eq!(catalog.resolve(None, None), Err(ResolveError::NoIdentifierProvided));
        assert_eq!(
            catalog.resolve(Some("  "), Some(" ")),
            Err(ResolveError::NoIdentifierProvided)
        );
        assert_eq!(
            catalog.resolve(Some("abc"), None),
            Err(ResolveError::InvalidId("abc".to_string()))
        );
        assert_eq!(
            catalog.resolve(Some("-3"), None),
            Err(ResolveError::InvalidId("-3".to_string()))
        );
    }

    #[test]
    fn test_lookups() {
        let catalog = catalog();
        assert_eq!(catalog.key_for(99), Some("X"));
        assert_eq!(catalog.description_for(99), Some("Service X"));
        assert_eq!(catalog.description_for(12), None);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.services()[0].id, 12);
    }

    #[test]
    fn test_services_without_key_or_description_are_kept() {
        let catalog = ServiceCatalog::from_services(vec![
            ServiceItem::new(2, "vm.small"),
            ServiceItem {
                id: 8,
                key: None,
                description: None,
            },
        ]);
        assert_eq!(catalog.state(), &CatalogState::Ready(2));
        assert_eq!(catalog.len(), 2);
        let ids: Vec<u64> = catalog.services().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 8]);
        assert_eq!(catalog.services()[1].key, None);
    }

    #[test]
    fn test_load_from_api() {
        let api = DemoRateApi::new();
        let mut catalog = ServiceCatalog::new();
        assert_eq!(catalog.state(), &CatalogState::Empty);

        assert!(catalog.load(&api, 2).is_none());
        assert!(catalog.is_ready());
        assert!(catalog.resolve(None, Some("cpu.core")).is_ok());
    }

    #[test]
    fn test_failed_load_degrades() {
        let api = DemoRateApi::new().failing_catalog("connection refused");
        let mut catalog = ServiceCatalog::new();

        let warning = catalog.load(&api, 500).unwrap();
        assert!(warning.contains("connection refused"));
        assert!(matches!(catalog.state(), CatalogState::Degraded(_)));

        assert_eq!(catalog.resolve(Some("7"), None), Ok(7));
        assert_eq!(
            catalog.resolve(None, Some("X")),
            Err(ResolveError::CatalogUnavailable("X".to_string()))
        );
    }

    #[test]
    fn test_reload_replaces_contents() {
        let mut catalog = catalog();
        let api = DemoRateApi::new();
        catalog.reload(&api, 500);
        assert_eq!(catalog.resolve(None, Some("X")).ok(), None);
    }
}
