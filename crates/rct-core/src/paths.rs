use chrono::NaiveDate;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Layout constants
// ---------------------------------------------------------------------------

pub const ENV_FILE: &str = ".env";
pub const LAUNCHD_DIR: &str = "config/launchd";
pub const CLIENT_SECRETS_FILE: &str = "config/youtube/client_secrets.json";
pub const TOKEN_FILE: &str = "config/youtube/token.json";

/// Fixed-name stdout logs that launchd writes for each trigger.
pub const STREAM_LOGS: [&str; 3] = ["prepare_stdout.log", "start_stdout.log", "stop_stdout.log"];

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn env_path(root: &Path) -> PathBuf {
    root.join(ENV_FILE)
}

pub fn launchd_dir(root: &Path) -> PathBuf {
    root.join(LAUNCHD_DIR)
}

pub fn descriptor_path(root: &Path, label: &str) -> PathBuf {
    launchd_dir(root).join(format!("{label}.plist"))
}

pub fn client_secrets_path(root: &Path) -> PathBuf {
    root.join(CLIENT_SECRETS_FILE)
}

pub fn token_path(root: &Path) -> PathBuf {
    root.join(TOKEN_FILE)
}

/// Resolve the log directory: absolute values are used as-is, relative ones
/// are anchored at the project root.
pub fn log_dir(root: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        root.join(configured)
    }
}

/// Per-run log file for a local calendar date: `rct.YYYY-MM-DD.log`.
pub fn run_log_name(date: NaiveDate) -> String {
    format!("rct.{}.log", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_path_uses_label() {
        let p = descriptor_path(Path::new("/proj"), "jp.example.start");
        assert_eq!(p, PathBuf::from("/proj/config/launchd/jp.example.start.plist"));
    }

    #[test]
    fn run_log_name_is_dated() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        assert_eq!(run_log_name(date), "rct.2025-06-02.log");
    }

    #[test]
    fn log_dir_anchors_relative_paths() {
        assert_eq!(
            log_dir(Path::new("/proj"), Path::new("logs")),
            PathBuf::from("/proj/logs")
        );
        assert_eq!(
            log_dir(Path::new("/proj"), Path::new("/var/log/rct")),
            PathBuf::from("/var/log/rct")
        );
    }
}
