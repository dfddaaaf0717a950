//! Export service - existing rates back out as CSV
//!
//! The written file uses the import column names, so an export can be
//! edited and imported again.

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::domain::{EffectiveDate, RateRecord, GLOBAL_ACCOUNT_ID};
use crate::ports::{fetch_all, RateApi};
use crate::services::catalog::ServiceCatalog;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Which revisions to export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportMode {
    /// Every revision
    All,
    /// Latest revision per (account, service)
    Latest,
    /// Latest global revision per service
    ListPrices,
}

impl ExportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportMode::All => "all",
            ExportMode::Latest => "latest",
            ExportMode::ListPrices => "list-prices",
        }
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "all" => Ok(ExportMode::All),
            "latest" => Ok(ExportMode::Latest),
            "list-prices" | "list" => Ok(ExportMode::ListPrices),
            other => anyhow::bail!("Unknown export mode '{}'. Use all, latest or list-prices", other),
        }
    }
}

/// One exported line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    /// `0` for global rates
    pub account_id: u64,
    pub account_name: String,
    pub service_id: u64,
    pub service_key: String,
    pub service_name: String,
    pub revision_start_date: String,
    pub rate: String,
    pub cogs: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub mode: ExportMode,
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Export service for rate revisions
pub struct ExportService {
    api: Arc<dyn RateApi>,
    page_size: usize,
}

impl ExportService {
    pub fn new(api: Arc<dyn RateApi>, page_size: usize) -> Self {
        Self { api, page_size }
    }

    /// Fetch every rate revision
    pub fn fetch_rates(&self) -> Result<Vec<RateRecord>> {
        fetch_all(self.page_size, |page| self.api.list_rates(page))
            .context("Failed to fetch rates")
    }

    /// Materialize export rows for a mode, sorted by account, service, date
    pub fn export_rows(&self, mode: ExportMode, catalog: &ServiceCatalog) -> Result<Vec<ExportRow>> {
        let records = self.fetch_rates()?;
        Ok(build_rows(select(records, mode), catalog))
    }

    /// Write the export to a file (UTF-8 with BOM)
    pub fn export_to_file(
        &self,
        mode: ExportMode,
        catalog: &ServiceCatalog,
        path: &Path,
    ) -> Result<ExportSummary> {
        let rows = self.export_rows(mode, catalog)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        write_csv(&rows, file)?;

        Ok(ExportSummary {
            mode,
            rows: rows.len(),
            path: Some(path.display().to_string()),
        })
    }

    /// Whether a revision with this natural key exists on the server
    pub fn rate_exists(&self, account_id: u64, service_id: u64, date: EffectiveDate) -> Result<bool> {
        let account = (account_id != GLOBAL_ACCOUNT_ID).then_some(account_id);
        Ok(self.fetch_rates()?.iter().any(|r| {
            r.account_id == account && r.service_id == service_id && r.parsed_date() == Some(date)
        }))
    }
}

/// Keep the records a mode asks for
pub fn select(records: Vec<RateRecord>, mode: ExportMode) -> Vec<RateRecord> {
    match mode {
        ExportMode::All => records,
        ExportMode::Latest => latest_by(records, |_| true),
        ExportMode::ListPrices => latest_by(records, RateRecord::is_global),
    }
}

fn latest_by<F>(records: Vec<RateRecord>, keep: F) -> Vec<RateRecord>
where
    F: Fn(&RateRecord) -> bool,
{
    let mut latest: std::collections::HashMap<(Option<u64>, u64), (EffectiveDate, RateRecord)> =
        std::collections::HashMap::new();

    for record in records.into_iter().filter(|r| keep(r)) {
        let Some(date) = record.parsed_date() else {
            continue;
        };
        let key = (record.account_id, record.service_id);
        match latest.get(&key) {
            Some((current, _)) if *current >= date => {}
            _ => {
                latest.insert(key, (date, record));
            }
        }
    }

    latest.into_values().map(|(_, record)| record).collect()
}

/// Convert records to rows, resolving service keys and names from the catalog
pub fn build_rows(records: Vec<RateRecord>, catalog: &ServiceCatalog) -> Vec<ExportRow> {
    let mut rows: Vec<(Option<EffectiveDate>, ExportRow)> = records
        .into_iter()
        .map(|record| {
            let date = record.parsed_date();
            let row = ExportRow {
                account_id: record.account_id.unwrap_or(GLOBAL_ACCOUNT_ID),
                account_name: record.account_name.clone().unwrap_or_default(),
                service_id: record.service_id,
                service_key: catalog.key_for(record.service_id).unwrap_or_default().to_string(),
                service_name: catalog
                    .description_for(record.service_id)
                    .unwrap_or_default()
                    .to_string(),
                revision_start_date: date
                    .map(|d| d.hyphenated())
                    .unwrap_or_else(|| record.effective_date.clone()),
                rate: record.rate.map(|r| r.normalize().to_string()).unwrap_or_default(),
                cogs: record.cogs.map(|c| c.normalize().to_string()).unwrap_or_default(),
            };
            (date, row)
        })
        .collect();

    rows.sort_by(|(a_date, a), (b_date, b)| {
        (a.account_id, a.service_id, a_date).cmp(&(b.account_id, b.service_id, b_date))
    });
    rows.into_iter().map(|(_, row)| row).collect()
}

/// Write rows as CSV with a UTF-8 byte-order mark
pub fn write_csv<W: Write>(rows: &[ExportRow], mut writer: W) -> Result<()> {
    writer.write_all(UTF8_BOM)?;
    let mut csv_writer = csv::Writer::from_writer(writer);
    if rows.is_empty() {
        csv_writer.write_record([
            "account_id",
            "account_name",
            "service_id",
            "service_key",
            "service_name",
            "revision_start_date",
            "rate",
            "cogs",
        ])?;
    }
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::demo::{generate_demo_services, DemoRateApi};
    use crate::services::parser::parse_bytes;
    use rust_decimal::Decimal;

    fn service() -> (ExportService, ServiceCatalog) {
        (
            ExportService::new(Arc::new(DemoRateApi::new()), 4),
            ServiceCatalog::from_services(generate_demo_services()),
        )
    }

    fn record(id: &str, account: Option<u64>, service: u64, date: &str) -> RateRecord {
        RateRecord {
            id: id.to_string(),
            account_id: account,
            account_name: None,
            service_id: service,
            rate: Some(Decimal::ONE),
            cogs: None,
            effective_date: date.to_string(),
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("list_prices".parse::<ExportMode>().unwrap(), ExportMode::ListPrices);
        assert_eq!("LATEST".parse::<ExportMode>().unwrap(), ExportMode::Latest);
        assert!("everything".parse::<ExportMode>().is_err());
    }

    #[test]
    fn test_all_rows_sorted() {
        let (export, catalog) = service();
        let rows = export.export_rows(ExportMode::All, &catalog).unwrap();
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0].account_id, 0);
        assert_eq!(rows[0].service_key, "cpu.core");
        assert_eq!(rows[0].revision_start_date, "2023-01-01");
        assert_eq!(rows[1].revision_start_date, "2023-07-01");
        assert_eq!(rows.last().unwrap().account_id, 2);
        assert_eq!(rows.last().unwrap().account_name, "Globex");
    }

    #[test]
    fn test_latest_and_list_prices() {
        let records = vec![
            record("1", None, 1, "2023-01-01"),
            record("2", None, 1, "2023-07-01"),
            record("3", Some(5), 1, "2024-01-01"),
            record("4", Some(5), 1, "2022-01-01"),
            record("5", None, 2, "bad"),
        ];

        let latest = select(records.clone(), ExportMode::Latest);
        let mut ids: Vec<&str> = latest.iter().map(|r| r.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["2", "3"]);

        let list = select(records, ExportMode::ListPrices);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "2");
    }

    #[test]
    fn test_written_csv_reimports() {
        let (export, catalog) = service();
        let rows = export.export_rows(ExportMode::ListPrices, &catalog).unwrap();
        let mut buffer = Vec::new();
        write_csv(&rows, &mut buffer).unwrap();

        assert!(buffer.starts_with(UTF8_BOM));
        let table = parse_bytes(&buffer).unwrap();
        assert_eq!(table.rows.len(), rows.len());
        assert_eq!(table.rows[0].get("account_id"), Some("0"));
        assert_eq!(table.rows[0].get("rate"), Some("4.8"));
    }

    #[test]
    fn test_rate_exists() {
        let (export, _) = service();
        let date = EffectiveDate::parse("2023-03-01").unwrap();
        assert!(export.rate_exists(1, 1, date).unwrap());
        assert!(!export.rate_exists(0, 1, date).unwrap());
        assert!(export
            .rate_exists(0, 1, EffectiveDate::parse("20230101").unwrap())
            .unwrap());
    }

    #[test]
    fn test_export_to_file() {
        let (export, catalog) = service();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let summary = export.export_to_file(ExportMode::Latest, &catalog, &path).unwrap();
        assert_eq!(summary.rows, 8);
        assert!(path.exists());
    }
}
