//! Daily self-check: trigger registration, runtime liveness and yesterday's
//! log forensics, with one aggregated alert when anything is still wrong.

use crate::alert::{AlertMessage, Notifier};
use crate::clock::Clock;
use crate::config::Config;
use crate::host::Host;
use crate::paths;
use crate::scheduler::{TaskName, TaskScheduler, TriggerDescriptor};
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Substrings that mark a failed run in a log file.
pub const FAILURE_PATTERNS: &[&str] = &[
    "Timed out waiting for Docker",
    "Connection refused",
    "Failed to connect",
    "Error:",
    "ERROR:",
    " ERROR ",
    "Exception",
    "Traceback",
];

pub const HEALTH_SUBJECT: &str = "health check warning";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub missing: Vec<String>,
    pub fixed: Vec<String>,
    pub still_failed: Vec<String>,
    pub runtime_alive: bool,
    pub log_failures: Vec<String>,
    pub issues: Vec<String>,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

pub struct HealthMonitor<'a> {
    config: &'a Config,
    scheduler: &'a dyn TaskScheduler,
    host: &'a dyn Host,
    clock: &'a dyn Clock,
    notifier: &'a dyn Notifier,
}

impl<'a> HealthMonitor<'a> {
    pub fn new(
        config: &'a Config,
        scheduler: &'a dyn TaskScheduler,
        host: &'a dyn Host,
        clock: &'a dyn Clock,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            config,
            scheduler,
            host,
            clock,
            notifier,
        }
    }

    pub fn required_labels(&self) -> Vec<String> {
        TaskName::REQUIRED
            .iter()
            .map(|t| t.label(&self.config.task_label_prefix))
            .collect()
    }

    /// Labels of required tasks not currently registered. A failing `list`
    /// counts every required task as missing.
    pub fn check_triggers(&self) -> Vec<String> {
        let loaded = match self.scheduler.list() {
            Ok(loaded) => loaded,
            Err(e) => {
                error!("failed to list scheduled tasks: {e}");
                return self.required_labels();
            }
        };
        self.required_labels()
            .into_iter()
            .filter(|label| {
                let present = loaded.contains(label);
                if !present {
                    warn!(%label, "scheduled task not loaded");
                }
                !present
            })
            .collect()
    }

    /// Re-register each missing task from its descriptor on disk. Returns
    /// `(fixed, still_failed)`.
    pub fn remediate(&self, missing: &[String]) -> (Vec<String>, Vec<String>) {
        let mut fixed = Vec::new();
        let mut still_failed = Vec::new();
        for label in missing {
            let path = paths::descriptor_path(&self.config.root, label);
            let outcome = TriggerDescriptor::read(&path)
                .and_then(|_| self.scheduler.load(&path));
            match outcome {
                Ok(()) => {
                    info!(%label, "re-registered scheduled task");
                    fixed.push(label.clone());
                }
                Err(e) => {
                    error!(%label, "could not re-register scheduled task: {e}");
                    still_failed.push(label.clone());
                }
            }
        }
        (fixed, still_failed)
    }

    pub fn check_runtime(&self) -> bool {
        let alive = self.host.runtime_alive();
        if !alive {
            warn!("{} is not responding", self.config.runtime_app);
        }
        alive
    }

    pub fn yesterday(&self) -> NaiveDate {
        self.config.schedule.local_date(self.clock.now()) - Duration::days(1)
    }

    pub fn run_check(&self) -> HealthReport {
        info!("--- starting health check ---");
        let mut report = HealthReport {
            missing: self.check_triggers(),
            ..HealthReport::default()
        };

        if !report.missing.is_empty() {
            let (fixed, still_failed) = self.remediate(&report.missing);
            report.fixed = fixed;
            report.still_failed = still_failed;
        }
        if !report.still_failed.is_empty() {
            report.issues.push(format!(
                "scheduled tasks not loaded: {}",
                report.still_failed.join(", ")
            ));
        }

        report.runtime_alive = self.check_runtime();
        if !report.runtime_alive {
            report
                .issues
                .push(format!("{} is not running", self.config.runtime_app));
        }

        report.log_failures = scan_logs(&self.config.log_dir(), self.yesterday());
        if !report.log_failures.is_empty() {
            report.issues.push(format!(
                "failure patterns in yesterday's logs:\n  - {}",
                report.log_failures.join("\n  - ")
            ));
        }

        if report.healthy() {
            info!("health check passed: all systems operational");
        } else {
            warn!(issues = ?report.issues, "health check found issues");
            self.notifier.send(&AlertMessage::new(
                HEALTH_SUBJECT,
                format!(
                    "The health check detected problems.\n\nIssues:\n{}\n\nTime: {}",
                    report
                        .issues
                        .iter()
                        .map(|i| format!("- {i}"))
                        .collect::<Vec<_>>()
                        .join("\n"),
                    self.clock.now().format("%Y-%m-%d %H:%M:%S UTC")
                ),
            ));
        }
        report
    }
}

// ---------------------------------------------------------------------------
// Log forensics
// ---------------------------------------------------------------------------

/// Log files relevant to `date`: every `*{date}*.log` in `dir` plus the fixed
/// per-task stdout logs.
pub fn log_files_for(dir: &Path, date: NaiveDate) -> Vec<PathBuf> {
    let stamp = date.format("%Y-%m-%d").to_string();
    let mut files: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.contains(&stamp) && n.ends_with(".log"))
            })
            .collect(),
        Err(e) => {
            warn!(dir = %dir.display(), "log directory not readable: {e}");
            return Vec::new();
        }
    };
    files.sort();
    files.extend(
        paths::STREAM_LOGS
            .iter()
            .map(|name| dir.join(name))
            .filter(|p| p.is_file()),
    );
    files
}

/// One entry per (file, pattern) hit: the first line carrying both the
/// pattern and the date, or `"{file}: {pattern} found"` when no line is
/// dated. Unreadable files are skipped.
pub fn scan_logs(dir: &Path, date: NaiveDate) -> Vec<String> {
    let stamp = date.format("%Y-%m-%d").to_string();
    let mut failures = Vec::new();
    for file in log_files_for(dir, date) {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content = match std::fs::read(&file) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!(file = %file.display(), "could not read log file: {e}");
                continue;
            }
        };
        for pattern in FAILURE_PATTERNS {
            if !content.contains(pattern) {
                continue;
            }
            let dated = content
                .lines()
                .find(|line| line.contains(pattern) && line.contains(&stamp));
            failures.push(match dated {
                Some(line) => format!("{name}: {}", line.trim()),
                None => format!("{name}: {pattern} found"),
            });
        }
    }
    failures
}
