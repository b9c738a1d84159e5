use crate::output::{print_json, print_table};
use anyhow::Context;
use chrono::Duration;
use clap::Subcommand;
use rct_core::clock::{Clock, SystemClock};
use rct_core::config::Config;
use rct_core::remote::{BroadcastPlatform, LifecycleManager};

#[derive(Subcommand)]
pub enum BroadcastsSubcommand {
    /// List upcoming broadcasts on the remote platform
    List,

    /// Re-time today's and tomorrow's upcoming broadcasts to the configured start time
    Fix,
}

pub fn run(config: &Config, subcmd: BroadcastsSubcommand, json: bool) -> anyhow::Result<()> {
    let clock = SystemClock;
    let notifier = super::notifier(config);
    let platform =
        super::youtube(config, &clock, &notifier).context("failed to connect to YouTube")?;

    match subcmd {
        BroadcastsSubcommand::List => list(config, &platform, json),
        BroadcastsSubcommand::Fix => fix(config, &clock, platform, json),
    }
}

fn list(config: &Config, platform: &impl BroadcastPlatform, json: bool) -> anyhow::Result<()> {
    let upcoming = platform.list_upcoming()?;
    if json {
        return print_json(&upcoming);
    }
    if upcoming.is_empty() {
        println!("No upcoming broadcasts.");
        return Ok(());
    }
    let tz = config.schedule.timezone;
    print_table(
        &["ID", "START", "PRIVACY", "STATE", "TITLE"],
        upcoming
            .iter()
            .map(|b| {
                vec![
                    b.id.clone(),
                    b.scheduled_start
                        .map(|at| at.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    b.privacy.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
                    format!("{:?}", b.state).to_lowercase(),
                    b.title.clone(),
                ]
            })
            .collect(),
    );
    Ok(())
}

fn fix(
    config: &Config,
    clock: &dyn Clock,
    platform: impl BroadcastPlatform,
    json: bool,
) -> anyhow::Result<()> {
    let today = clock.now().with_timezone(&config.schedule.timezone).date_naive();
    let dates = [today, today + Duration::days(1)];
    let manager = LifecycleManager::new(
        platform,
        &config.broadcast,
        config.schedule.start,
        config.schedule.timezone,
    );
    let updated = manager.fix_schedule(&dates)?;

    if json {
        print_json(&serde_json::json!({ "updated": updated }))?;
    } else if updated.is_empty() {
        println!("No broadcasts needed fixing.");
    } else {
        for id in &updated {
            println!("Updated {id} to {}", config.schedule.start.format("%H:%M"));
        }
    }
    Ok(())
}
