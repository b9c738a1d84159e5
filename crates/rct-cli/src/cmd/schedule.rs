use crate::output::{print_json, print_table};
use anyhow::Context;
use rct_core::config::Config;
use rct_core::scheduler::{derive_triggers, install, job_search_path, write_descriptors, Launchctl};
use serde::Serialize;

#[derive(Serialize)]
struct ScheduledEntry {
    task: String,
    label: String,
    time: String,
    descriptor: String,
    loaded: bool,
}

pub fn run(config: &Config, register: bool, json: bool) -> anyhow::Result<()> {
    let triggers = derive_triggers(config.schedule.start, config.schedule.stop);
    let program = std::env::current_exe().context("cannot locate the rct executable")?;
    let search_path = job_search_path(std::env::var("PATH").ok().as_deref());
    let written = write_descriptors(
        &config.root,
        &config.task_label_prefix,
        &config.log_dir(),
        &program,
        &search_path,
        &triggers,
    )
    .context("failed to write trigger descriptors")?;

    let mut entries = Vec::with_capacity(triggers.len());
    for (trigger, path) in triggers.iter().zip(&written) {
        let label = trigger.task.label(&config.task_label_prefix);
        if register {
            install(&Launchctl, &label, path)
                .with_context(|| format!("failed to register {}", path.display()))?;
        }
        entries.push(ScheduledEntry {
            task: trigger.task.to_string(),
            label,
            time: format!("{:02}:{:02}", trigger.hour, trigger.minute),
            descriptor: path.display().to_string(),
            loaded: register,
        });
    }

    if json {
        return print_json(&entries);
    }
    print_table(
        &["TASK", "TIME", "LABEL", "DESCRIPTOR"],
        entries
            .iter()
            .map(|e| {
                vec![
                    e.task.clone(),
                    e.time.clone(),
                    e.label.clone(),
                    e.descriptor.clone(),
                ]
            })
            .collect(),
    );
    if register {
        println!("\nRegistered {} tasks with launchd.", entries.len());
    }
    Ok(())
}
