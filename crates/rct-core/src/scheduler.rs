//! OS-scheduler triggers and their launchd descriptors.
//!
//! A descriptor is treated as a small record (label, hour, minute, program
//! arguments, log path) with explicit [`TriggerDescriptor::to_plist`] and
//! [`TriggerDescriptor::parse`]; files are regenerated whole, never patched.

use crate::error::{RctError, Result};
use crate::io;
use crate::paths;
use chrono::{NaiveTime, Timelike};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// TaskName / ScheduledTrigger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskName {
    Prepare,
    Start,
    Stop,
    Health,
}

impl TaskName {
    /// The triggers the health monitor insists on.
    pub const REQUIRED: [TaskName; 3] = [TaskName::Prepare, TaskName::Start, TaskName::Stop];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskName::Prepare => "prepare",
            TaskName::Start => "start",
            TaskName::Stop => "stop",
            TaskName::Health => "health",
        }
    }

    /// Reverse-DNS label, e.g. `jp.radio-calisthenics-together.start`.
    pub fn label(&self, prefix: &str) -> String {
        format!("{prefix}.{}", self.as_str())
    }

    pub fn stdout_log(&self) -> String {
        format!("{}_stdout.log", self.as_str())
    }
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTrigger {
    pub task: TaskName,
    pub hour: u32,
    pub minute: u32,
}

const PREPARE_LEAD_MINUTES: i64 = 10;
const START_LEAD_MINUTES: i64 = 1;
const HEALTH_LEAD_MINUTES: i64 = 15;
const MINUTES_PER_DAY: i64 = 24 * 60;

/// Derive every trigger from the configured start/stop times using the fixed
/// lead offsets. Wraps around midnight.
pub fn derive_triggers(start: NaiveTime, stop: NaiveTime) -> Vec<ScheduledTrigger> {
    let start_minutes = i64::from(start.hour() * 60 + start.minute());
    let stop_minutes = i64::from(stop.hour() * 60 + stop.minute());
    vec![
        at(TaskName::Health, start_minutes - HEALTH_LEAD_MINUTES),
        at(TaskName::Prepare, start_minutes - PREPARE_LEAD_MINUTES),
        at(TaskName::Start, start_minutes - START_LEAD_MINUTES),
        at(TaskName::Stop, stop_minutes),
    ]
}

fn at(task: TaskName, minutes: i64) -> ScheduledTrigger {
    let m = minutes.rem_euclid(MINUTES_PER_DAY);
    ScheduledTrigger {
        task,
        hour: (m / 60) as u32,
        minute: (m % 60) as u32,
    }
}

// ---------------------------------------------------------------------------
// TriggerDescriptor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerDescriptor {
    pub label: String,
    pub hour: u32,
    pub minute: u32,
    pub program_arguments: Vec<String>,
    pub log_path: Option<PathBuf>,
    /// `PATH` handed to the job; launchd agents otherwise get only the
    /// system directories.
    pub search_path: Option<String>,
}

impl TriggerDescriptor {
    pub fn to_plist(&self) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str("<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n");
        out.push_str("<plist version=\"1.0\">\n<dict>\n");
        out.push_str(&format!(
            "    <key>Label</key>\n    <string>{}</string>\n",
            escape(&self.label)
        ));
        out.push_str("    <key>ProgramArguments</key>\n    <array>\n");
        for arg in &self.program_arguments {
            out.push_str(&format!("        <string>{}</string>\n", escape(arg)));
        }
        out.push_str("    </array>\n");
        out.push_str(&format!(
            "    <key>StartCalendarInterval</key>\n    <dict>\n        <key>Hour</key>\n        <integer>{}</integer>\n        <key>Minute</key>\n        <integer>{}</integer>\n    </dict>\n",
            self.hour, self.minute
        ));
        if let Some(search_path) = &self.search_path {
            out.push_str(&format!(
                "    <key>EnvironmentVariables</key>\n    <dict>\n        <key>PATH</key>\n        <string>{}</string>\n    </dict>\n",
                escape(search_path)
            ));
        }
        if let Some(log) = &self.log_path {
            let log = escape(&log.to_string_lossy());
            out.push_str(&format!(
                "    <key>StandardOutPath</key>\n    <string>{log}</string>\n    <key>StandardErrorPath</key>\n    <string>{log}</string>\n"
            ));
        }
        out.push_str("</dict>\n</plist>\n");
        out
    }

    /// Parse a descriptor. `origin` is only used in error messages.
    pub fn parse(origin: &str, text: &str) -> Result<Self> {
        let invalid = |reason: &str| RctError::InvalidDescriptor {
            path: origin.to_string(),
            reason: reason.to_string(),
        };

        let label = string_value(text, "Label").ok_or_else(|| invalid("missing Label"))?;
        let hour = integer_value(text, "Hour").ok_or_else(|| invalid("missing Hour"))?;
        let minute = integer_value(text, "Minute").ok_or_else(|| invalid("missing Minute"))?;
        if hour > 23 {
            return Err(invalid("Hour must be 0-23"));
        }
        if minute > 59 {
            return Err(invalid("Minute must be 0-59"));
        }

        let program_arguments = program_arguments_re()
            .captures(text)
            .map(|caps| {
                string_re()
                    .captures_iter(&caps[1])
                    .map(|c| unescape(&c[1]))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            label,
            hour,
            minute,
            program_arguments,
            log_path: string_value(text, "StandardOutPath").map(PathBuf::from),
            search_path: string_value(text, "PATH"),
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RctError::MissingFile(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::parse(&path.display().to_string(), &text)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        io::atomic_write(path, self.to_plist().as_bytes())
    }
}

/// Directories launchd jobs always search, after the operator's own `PATH`.
/// Covers Docker Desktop and Homebrew installs.
pub const JOB_PATH_DIRS: &[&str] = &[
    "/usr/local/bin",
    "/opt/homebrew/bin",
    "/Applications/Docker.app/Contents/Resources/bin",
    "/usr/bin",
    "/bin",
    "/usr/sbin",
    "/sbin",
];

/// Build the `PATH` for scheduled jobs: the operator's entries first, then
/// [`JOB_PATH_DIRS`], without duplicates.
pub fn job_search_path(operator_path: Option<&str>) -> String {
    let mut dirs: Vec<&str> = Vec::new();
    let operator = operator_path.unwrap_or_default().split(':');
    for dir in operator.chain(JOB_PATH_DIRS.iter().copied()) {
        if !dir.is_empty() && !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs.join(":")
}

/// Write one descriptor per derived trigger into `config/launchd/`.
/// Each trigger runs `<program> --root <root> <task>` with `search_path`
/// as its `PATH`.
pub fn write_descriptors(
    root: &Path,
    label_prefix: &str,
    log_dir: &Path,
    program: &Path,
    search_path: &str,
    triggers: &[ScheduledTrigger],
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(triggers.len());
    for trigger in triggers {
        let label = trigger.task.label(label_prefix);
        let descriptor = TriggerDescriptor {
            label: label.clone(),
            hour: trigger.hour,
            minute: trigger.minute,
            program_arguments: vec![
                program.to_string_lossy().into_owned(),
                "--root".to_string(),
                root.to_string_lossy().into_owned(),
                trigger.task.as_str().to_string(),
            ],
            log_path: Some(log_dir.join(trigger.task.stdout_log())),
            search_path: Some(search_path.to_string()),
        };
        let path = paths::descriptor_path(root, &label);
        descriptor.write(&path)?;
        info!(label = %label, hour = trigger.hour, minute = trigger.minute, "wrote trigger descriptor");
        written.push(path);
    }
    Ok(written)
}

fn string_value(text: &str, key: &str) -> Option<String> {
    let re = Regex::new(&format!(
        r"<key>{}</key>\s*<string>([^<]*)</string>",
        regex::escape(key)
    ))
    .ok()?;
    re.captures(text).map(|c| unescape(&c[1]))
}

fn integer_value(text: &str, key: &str) -> Option<u32> {
    let re = Regex::new(&format!(
        r"<key>{}</key>\s*<integer>(\d+)</integer>",
        regex::escape(key)
    ))
    .ok()?;
    re.captures(text).and_then(|c| c[1].parse().ok())
}

fn program_arguments_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<key>ProgramArguments</key>\s*<array>(.*?)</array>")
            .expect("valid regex")
    })
}

fn string_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<string>([^<]*)</string>").expect("valid regex"))
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

// ---------------------------------------------------------------------------
// TaskScheduler
// ---------------------------------------------------------------------------

pub trait TaskScheduler {
    /// Labels of every currently registered task.
    fn list(&self) -> Result<Vec<String>>;
    /// Register the task described by the descriptor at `path`.
    fn load(&self, path: &Path) -> Result<()>;
    /// Deregister a loaded task so its descriptor can be loaded again.
    fn unload(&self, path: &Path) -> Result<()>;
}

/// Register a freshly written descriptor, replacing any loaded copy of
/// `label` so changed trigger times take effect.
pub fn install(scheduler: &dyn TaskScheduler, label: &str, path: &Path) -> Result<()> {
    if scheduler.list()?.iter().any(|l| l == label) {
        info!(label, "replacing loaded trigger");
        scheduler.unload(path)?;
    }
    scheduler.load(path)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Launchctl;

impl TaskScheduler for Launchctl {
    fn list(&self) -> Result<Vec<String>> {
        let output = Command::new("launchctl")
            .arg("list")
            .output()
            .map_err(|e| RctError::Scheduler(format!("launchctl list: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RctError::Scheduler(format!(
                "launchctl list: {}",
                stderr.trim()
            )));
        }
        Ok(parse_launchctl_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn load(&self, path: &Path) -> Result<()> {
        debug!(path = %path.display(), "launchctl load");
        let output = Command::new("launchctl")
            .arg("load")
            .arg("-w")
            .arg(path)
            .output()
            .map_err(|e| RctError::Scheduler(format!("launchctl load: {e}")))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        // launchctl load reports some failures on stderr with exit status 0.
        if !output.status.success() || stderr.contains("Load failed") {
            return Err(RctError::Scheduler(format!(
                "launchctl load {}: {}",
                path.display(),
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn unload(&self, path: &Path) -> Result<()> {
        debug!(path = %path.display(), "launchctl unload");
        let output = Command::new("launchctl")
            .arg("unload")
            .arg(path)
            .output()
            .map_err(|e| RctError::Scheduler(format!("launchctl unload: {e}")))?;
        if !output.status.success() {
            return Err(RctError::Scheduler(format!(
                "launchctl unload {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// `launchctl list` prints `PID<TAB>Status<TAB>Label` with a header row.
pub fn parse_launchctl_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.split('\t').nth(2))
        .map(str::trim)
        .filter(|label| !label.is_empty() && *label != "Label")
        .map(str::to_string)
        .collect()
}
