use crate::error::{RctError, Result};
use crate::paths;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// PrivacyStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    Public,
    Unlisted,
    Private,
}

impl PrivacyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyStatus::Public => "public",
            PrivacyStatus::Unlisted => "unlisted",
            PrivacyStatus::Private => "private",
        }
    }
}

impl std::fmt::Display for PrivacyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PrivacyStatus {
    type Err = RctError;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "public" => Ok(PrivacyStatus::Public),
            "unlisted" => Ok(PrivacyStatus::Unlisted),
            "private" => Ok(PrivacyStatus::Private),
            other => Err(RctError::InvalidConfig(format!(
                "YOUTUBE_PRIVACY_STATUS must be public, unlisted or private (got '{other}')"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Connection and scene settings for the local control plane.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub scene: String,
    pub media_source: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub start: NaiveTime,
    pub stop: NaiveTime,
    pub timezone: Tz,
    pub reservation_buffer_minutes: u32,
}

#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub title: String,
    pub description: String,
    pub privacy: PrivacyStatus,
}

#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub sender: Option<String>,
    pub password: Option<String>,
    pub receiver: Option<String>,
    pub smtp_host: String,
}

impl ScheduleConfig {
    /// Calendar date of `now` in the broadcast timezone. Log files and the
    /// health check's "yesterday" both use it.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }
}

impl AlertConfig {
    pub fn has_credentials(&self) -> bool {
        self.sender.is_some() && self.password.is_some() && self.receiver.is_some()
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

/// Immutable process configuration, built once at entry and passed by
/// reference to every component.
#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub control: ControlConfig,
    pub schedule: ScheduleConfig,
    pub broadcast: BroadcastConfig,
    pub alert: AlertConfig,
    pub log_dir: PathBuf,
    pub task_label_prefix: String,
    pub runtime_app: String,
    pub capture_app: String,
}

impl Config {
    /// Read `<root>/.env` (absent is fine) and overlay the process
    /// environment. Call once, from the binary entry point.
    pub fn load(root: &Path) -> Result<Self> {
        let mut vars = read_env_file(&paths::env_path(root))?;
        for (key, value) in std::env::vars() {
            if KNOWN_KEYS.contains(&key.as_str()) {
                vars.insert(key, value);
            }
        }
        Self::from_vars(root, &vars)
    }

    /// Build a config from an explicit key/value map.
    pub fn from_vars(root: &Path, vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let port = get_or("OBS_WS_PORT", "4455").parse::<u16>().map_err(|_| {
            RctError::InvalidConfig("OBS_WS_PORT must be a port number".to_string())
        })?;
        let timezone = get_or("STREAM_TIMEZONE", "Asia/Tokyo")
            .parse::<Tz>()
            .map_err(|e| RctError::InvalidConfig(format!("STREAM_TIMEZONE: {e}")))?;
        let buffer = get_or("YOUTUBE_RESERVATION_BUFFER_MINUTES", "2")
            .parse::<u32>()
            .map_err(|_| {
                RctError::InvalidConfig(
                    "YOUTUBE_RESERVATION_BUFFER_MINUTES must be a whole number".to_string(),
                )
            })?;

        Ok(Self {
            root: root.to_path_buf(),
            control: ControlConfig {
                host: get_or("OBS_WS_HOST", "127.0.0.1"),
                port,
                password: get("OBS_WS_PASSWORD").unwrap_or_default(),
                scene: get_or("OBS_SCENE_NAME", "RADIO_TAISO_LOOP"),
                media_source: get("OBS_MEDIA_SOURCE_NAME"),
                timeout: Duration::from_secs(10),
            },
            schedule: ScheduleConfig {
                start: parse_hhmm("STREAM_START_TIME", &get_or("STREAM_START_TIME", "07:00"))?,
                stop: parse_hhmm("STREAM_STOP_TIME", &get_or("STREAM_STOP_TIME", "07:05"))?,
                timezone,
                reservation_buffer_minutes: buffer,
            },
            broadcast: BroadcastConfig {
                title: get_or("BROADCAST_TITLE", "Radio Calisthenics Together"),
                description: get_or(
                    "BROADCAST_DESCRIPTION",
                    "Daily automated radio calisthenics broadcast.",
                ),
                privacy: get_or("YOUTUBE_PRIVACY_STATUS", "public").parse()?,
            },
            alert: AlertConfig {
                sender: get("ALERT_EMAIL_SENDER"),
                password: get("ALERT_EMAIL_PASSWORD"),
                receiver: get("ALERT_EMAIL_RECEIVER"),
                smtp_host: get_or("ALERT_SMTP_HOST", "smtp.gmail.com"),
            },
            log_dir: PathBuf::from(get_or("LOG_DIR", "logs")),
            task_label_prefix: get_or("TASK_LABEL_PREFIX", "jp.radio-calisthenics-together"),
            runtime_app: get_or("RUNTIME_APP", "Docker"),
            capture_app: get_or("CAPTURE_APP", "OBS"),
        })
    }

    /// Log directory resolved against the project root.
    pub fn log_dir(&self) -> PathBuf {
        paths::log_dir(&self.root, &self.log_dir)
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.schedule.start >= self.schedule.stop {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "STREAM_START_TIME ({}) must be before STREAM_STOP_TIME ({})",
                    self.schedule.start.format("%H:%M"),
                    self.schedule.stop.format("%H:%M")
                ),
            });
        }

        if !self.alert.has_credentials() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "alert email credentials are incomplete; alerts will only be logged"
                    .to_string(),
            });
        }

        if self.control.media_source.is_none() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "OBS_MEDIA_SOURCE_NAME is not set; media refresh will be skipped"
                    .to_string(),
            });
        }

        warnings
    }
}

const KNOWN_KEYS: &[&str] = &[
    "OBS_WS_HOST",
    "OBS_WS_PORT",
    "OBS_WS_PASSWORD",
    "OBS_SCENE_NAME",
    "OBS_MEDIA_SOURCE_NAME",
    "STREAM_START_TIME",
    "STREAM_STOP_TIME",
    "STREAM_TIMEZONE",
    "YOUTUBE_PRIVACY_STATUS",
    "YOUTUBE_RESERVATION_BUFFER_MINUTES",
    "BROADCAST_TITLE",
    "BROADCAST_DESCRIPTION",
    "LOG_DIR",
    "ALERT_EMAIL_SENDER",
    "ALERT_EMAIL_PASSWORD",
    "ALERT_EMAIL_RECEIVER",
    "ALERT_SMTP_HOST",
    "TASK_LABEL_PREFIX",
    "RUNTIME_APP",
    "CAPTURE_APP",
];

fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let iter = dotenvy::from_path_iter(path)
        .map_err(|e| RctError::InvalidConfig(format!("{}: {e}", path.display())))?;
    let mut map = HashMap::new();
    for entry in iter {
        let (key, value) =
            entry.map_err(|e| RctError::InvalidConfig(format!("{}: {e}", path.display())))?;
        map.insert(key, value);
    }
    Ok(map)
}

fn parse_hhmm(key: &str, value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| RctError::InvalidConfig(format!("{key} must be HH:MM (got '{value}')")))
}
