use crate::output::{print_json, yes_no};
use rct_core::clock::SystemClock;
use rct_core::config::Config;
use rct_core::health::HealthMonitor;
use rct_core::host::SystemHost;
use rct_core::scheduler::Launchctl;

pub fn run(config: &Config, json: bool) -> anyhow::Result<()> {
    let notifier = super::notifier(config);
    let report =
        HealthMonitor::new(config, &Launchctl, &SystemHost, &SystemClock, &notifier).run_check();

    if json {
        print_json(&report)?;
    } else {
        println!("Triggers missing: {}", report.missing.len());
        for label in &report.fixed {
            println!("  re-registered {label}");
        }
        for label in &report.still_failed {
            println!("  still missing {label}");
        }
        println!("{} alive: {}", config.runtime_app, yes_no(report.runtime_alive));
        println!("Log failures: {}", report.log_failures.len());
        for failure in &report.log_failures {
            println!("  {failure}");
        }
    }

    if !report.healthy() {
        anyhow::bail!("health check found {} issue(s)", report.issues.len());
    }
    Ok(())
}
