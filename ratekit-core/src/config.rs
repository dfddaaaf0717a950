//! Configuration management
//!
//! Settings live in `settings.json` inside the ratekit directory:
//! ```json
//! {
//!   "app": { "demoMode": false },
//!   "connection": { "baseUrl": "https://billing.example.com", "token": "...", "verifySsl": true },
//!   "import": { "chunkSize": 50, "pageSize": 500 }
//! }
//! ```
//! Fields the CLI doesn't manage are preserved when saving.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Default number of rows per submission chunk
pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// Default page size for catalog and rate listings
pub const DEFAULT_PAGE_SIZE: usize = 500;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
    #[serde(default)]
    connection: ConnectionSettings,
    #[serde(default)]
    import: ImportSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default)]
    demo_mode: bool,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Connection settings for the billing API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSettings {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Pre-issued bearer token; takes precedence over username/password
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            username: None,
            password: None,
            token: None,
            verify_ssl: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Import tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSettings {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// Keys accepted by [`Config::set_value`]
pub const SETTABLE_KEYS: &[&str] = &[
    "app.demoMode",
    "connection.baseUrl",
    "connection.username",
    "connection.password",
    "connection.token",
    "connection.verifySsl",
    "connection.timeoutSecs",
    "import.chunkSize",
    "import.pageSize",
];

/// Ratekit configuration (simplified view of settings)
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub demo_mode: bool,
    pub connection: ConnectionSettings,
    pub import: ImportSettings,
    // Keep the raw settings for preservation when saving
    _raw_settings: SettingsFile,
}

impl Config {
    /// Load config from the ratekit directory
    ///
    /// Environment variables override the file so CI and scripts can run
    /// without touching settings.json:
    /// `RATEKIT_BASE_URL`, `RATEKIT_USERNAME`, `RATEKIT_PASSWORD`,
    /// `RATEKIT_TOKEN`, `RATEKIT_VERIFY_SSL`, `RATEKIT_DEMO_MODE`.
    pub fn load(ratekit_dir: &Path) -> Result<Self> {
        let mut config = Self::load_file(ratekit_dir)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load config from settings.json only, ignoring the environment
    pub fn load_file(ratekit_dir: &Path) -> Result<Self> {
        let settings_path = ratekit_dir.join("settings.json");

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content).unwrap_or_default()
        } else {
            SettingsFile::default()
        };

        Ok(Self {
            demo_mode: raw.app.demo_mode,
            connection: raw.connection.clone(),
            import: raw.import.clone(),
            _raw_settings: raw,
        })
    }

    fn apply_env_overrides(&mut self) {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(url) = env("RATEKIT_BASE_URL") {
            self.connection.base_url = Some(url);
        }
        if let Some(username) = env("RATEKIT_USERNAME") {
            self.connection.username = Some(username);
        }
        if let Some(password) = env("RATEKIT_PASSWORD") {
            self.connection.password = Some(password);
        }
        if let Some(token) = env("RATEKIT_TOKEN") {
            self.connection.token = Some(token);
        }
        if let Some(flag) = env("RATEKIT_VERIFY_SSL").and_then(|v| parse_flag(&v)) {
            self.connection.verify_ssl = flag;
        }
        if let Some(flag) = env("RATEKIT_DEMO_MODE").and_then(|v| parse_flag(&v)) {
            self.demo_mode = flag;
        }
    }

    /// Save config to the ratekit directory
    /// Preserves other settings that the CLI doesn't manage
    pub fn save(&self, ratekit_dir: &Path) -> Result<()> {
        let settings_path = ratekit_dir.join("settings.json");

        let mut settings = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str::<SettingsFile>(&content).unwrap_or_default()
        } else {
            self._raw_settings.clone()
        };

        settings.app.demo_mode = self.demo_mode;
        settings.connection = self.connection.clone();
        settings.import = self.import.clone();

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }

    pub fn enable_demo_mode(&mut self) {
        self.demo_mode = true;
    }

    pub fn disable_demo_mode(&mut self) {
        self.demo_mode = false;
    }

    /// Set a value by its dotted settings key (see [`SETTABLE_KEYS`])
    ///
    /// An empty value clears optional string settings.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let optional = |v: &str| {
            let v = v.trim();
            if v.is_empty() {
                None
            } else {
                Some(v.to_string())
            }
        };
        let flag = |v: &str| match parse_flag(v) {
            Some(b) => Ok(b),
            None => bail!("Expected true/false for {}, got '{}'", key, v),
        };
        let number = |v: &str| -> Result<usize> {
            match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => Ok(n),
                _ => bail!("Expected a positive integer for {}, got '{}'", key, v),
            }
        };

        match key {
            "app.demoMode" => self.demo_mode = flag(value)?,
            "connection.baseUrl" => self.connection.base_url = optional(value),
            "connection.username" => self.connection.username = optional(value),
            "connection.password" => self.connection.password = optional(value),
            "connection.token" => self.connection.token = optional(value),
            "connection.verifySsl" => self.connection.verify_ssl = flag(value)?,
            "connection.timeoutSecs" => self.connection.timeout_secs = number(value)? as u64,
            "import.chunkSize" => self.import.chunk_size = number(value)?,
            "import.pageSize" => self.import.page_size = number(value)?,
            other => bail!(
                "Unknown setting '{}'. Known settings: {}",
                other,
                SETTABLE_KEYS.join(", ")
            ),
        }
        Ok(())
    }
}

/// Parse the boolean spellings accepted in env vars and `config set`
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim() {
        "true" | "1" | "yes" | "TRUE" | "YES" | "on" => Some(true),
        "false" | "0" | "no" | "FALSE" | "NO" | "off" => Some(false),
        _ => None,
    }
}
