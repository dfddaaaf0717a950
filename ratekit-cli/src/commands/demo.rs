//! Demo command - manage demo mode

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use super::{get_logger, get_ratekit_dir, log_event};
use ratekit_core::config::Config;
use ratekit_core::LogEvent;

#[derive(Subcommand)]
pub enum DemoCommands {
    /// Enable demo mode
    #[command(name = "on")]
    On,
    /// Disable demo mode
    #[command(name = "off")]
    Off,
    /// Show demo mode status
    Status,
}

pub fn run(command: Option<DemoCommands>) -> Result<()> {
    let ratekit_dir = get_ratekit_dir()?;
    std::fs::create_dir_all(&ratekit_dir)?;
    let mut config = Config::load_file(&ratekit_dir)?;

    match command {
        Some(DemoCommands::On) => {
            config.enable_demo_mode();
            config.save(&ratekit_dir)?;
            log_event(&get_logger(), LogEvent::new("demo_enabled").with_command("demo on"));
            println!("{}", "Demo mode enabled".green());
            println!("Imports now run against an in-memory catalog. Run 'ratekit services' to see it.");
            Ok(())
        }
        Some(DemoCommands::Off) => {
            config.disable_demo_mode();
            config.save(&ratekit_dir)?;
            log_event(&get_logger(), LogEvent::new("demo_disabled").with_command("demo off"));
            println!("{}", "Demo mode disabled".yellow());
            Ok(())
        }
        Some(DemoCommands::Status) | None => {
            // RATEKIT_DEMO_MODE can force demo mode without touching settings.json
            let effective = Config::load(&ratekit_dir)?.demo_mode;
            if effective {
                println!("Demo mode is {}", "ON".green());
            } else {
                println!("Demo mode is {}", "OFF".yellow());
            }
            if effective != config.demo_mode {
                println!("(overridden by RATEKIT_DEMO_MODE)");
            }
            Ok(())
        }
    }
}
