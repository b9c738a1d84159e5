use crate::output::print_json;
use clap::Subcommand;
use rct_core::config::{Config, WarnLevel};

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Check the schedule, alert credentials and control settings
    Validate,
}

pub fn run(config: &Config, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Validate => validate(config, json),
    }
}

fn validate(config: &Config, json: bool) -> anyhow::Result<()> {
    let warnings = config.validate();
    let schedule = &config.schedule;

    if json {
        print_json(&serde_json::json!({
            "root": config.root,
            "start": schedule.start.format("%H:%M").to_string(),
            "stop": schedule.stop.format("%H:%M").to_string(),
            "timezone": schedule.timezone.name(),
            "reservation_buffer_minutes": schedule.reservation_buffer_minutes,
            "control": format!("{}:{}", config.control.host, config.control.port),
            "warnings": warnings,
        }))?;
    } else {
        println!(
            "Broadcast {}-{} {} via {}:{}",
            schedule.start.format("%H:%M"),
            schedule.stop.format("%H:%M"),
            schedule.timezone.name(),
            config.control.host,
            config.control.port,
        );
        println!(
            "Reservation buffer: {} min",
            schedule.reservation_buffer_minutes
        );
        if warnings.is_empty() {
            println!("Config is valid. No warnings.");
        }
        for w in &warnings {
            let tag = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{tag}] {}", w.message);
        }
    }

    let errors = warnings.iter().filter(|w| w.level == WarnLevel::Error).count();
    if errors > 0 {
        anyhow::bail!("config validation found errors ({errors})");
    }
    Ok(())
}
