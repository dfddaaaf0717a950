//! Config command - show and change settings.json values

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use super::{get_logger, get_ratekit_dir, log_event};
use crate::output;
use ratekit_core::config::Config;
use ratekit_core::LogEvent;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show effective settings (secrets are masked)
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set a value, e.g. `ratekit config set connection.baseUrl https://billing.example.com`
    Set {
        /// Dotted setting key
        key: String,
        /// New value (empty clears optional values)
        value: String,
    },
}

fn masked(value: &Option<String>) -> String {
    value.as_deref().map(output::mask_secret).unwrap_or_default()
}

fn plain(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

/// (key, display value) pairs in `SETTABLE_KEYS` order
fn settings_rows(config: &Config) -> Vec<(&'static str, String)> {
    let c = &config.connection;
    vec![
        ("app.demoMode", config.demo_mode.to_string()),
        ("connection.baseUrl", plain(&c.base_url)),
        ("connection.username", plain(&c.username)),
        ("connection.password", masked(&c.password)),
        ("connection.token", masked(&c.token)),
        ("connection.verifySsl", c.verify_ssl.to_string()),
        ("connection.timeoutSecs", c.timeout_secs.to_string()),
        ("import.chunkSize", config.import.chunk_size.to_string()),
        ("import.pageSize", config.import.page_size.to_string()),
    ]
}

pub fn run(command: Option<ConfigCommands>) -> Result<()> {
    let ratekit_dir = get_ratekit_dir()?;

    match command {
        Some(ConfigCommands::Show { json }) => show(&Config::load(&ratekit_dir)?, json),
        None => show(&Config::load(&ratekit_dir)?, false),
        Some(ConfigCommands::Set { key, value }) => {
            std::fs::create_dir_all(&ratekit_dir)?;
            // Write file values only; env overrides must not leak into settings.json
            let mut config = Config::load_file(&ratekit_dir)?;
            config.set_value(&key, &value)?;
            config.save(&ratekit_dir)?;
            log_event(
                &get_logger(),
                LogEvent::new("config_updated").with_command(format!("config set {}", key)),
            );
            output::success(&format!("Updated {}", key));
            Ok(())
        }
    }
}

fn show(config: &Config, json: bool) -> Result<()> {
    let rows = settings_rows(config);

    if json {
        let map: serde_json::Map<String, serde_json::Value> = rows
            .into_iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v)))
            .collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Setting", "Value"]);
    for (key, value) in rows {
        let value = if value.is_empty() {
            "(not set)".dimmed().to_string()
        } else {
            value
        };
        table.add_row(vec![key.to_string(), value]);
    }
    println!("{}", table);

    if !config.connection.verify_ssl {
        output::warning("TLS certificate verification is disabled");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratekit_core::config::SETTABLE_KEYS;

    #[test]
    fn test_settings_rows_follow_settable_keys() {
        let config = Config::default();
        let keys: Vec<&str> = settings_rows(&config).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, SETTABLE_KEYS);
    }

    #[test]
    fn test_secrets_masked() {
        let mut config = Config::default();
        config.connection.password = Some("hunter2hunter2".to_string());
        config.connection.token = Some("tok".to_string());
        let rows = settings_rows(&config);
        let value = |key: &str| rows.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone());
        assert_eq!(value("connection.password").as_deref(), Some("****ter2"));
        assert_eq!(value("connection.token").as_deref(), Some("****"));
    }
}
