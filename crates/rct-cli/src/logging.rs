use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use rct_core::paths;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

/// Stamps lines with wall-clock time in the broadcast timezone, so the dates
/// in a line match the date in its file name.
#[derive(Debug, Clone, Copy)]
struct ZonedTimer(Tz);

impl FormatTime for ZonedTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Utc::now().with_timezone(&self.0).format(TIMESTAMP))
    }
}

/// Install stderr logging and, when `log_dir` is given, append to
/// `<log_dir>/rct.YYYY-MM-DD.log` dated in `tz`. Every run is a short
/// process, so the file is chosen once at startup. Keep the returned guard
/// alive until exit so buffered file lines are flushed.
pub fn init(log_dir: Option<&Path>, tz: Tz, default_level: tracing::Level) -> Option<WorkerGuard> {
    let filter = || EnvFilter::from_default_env().add_directive(default_level.into());

    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_timer(ZonedTimer(tz))
        .with_filter(filter());

    let today = Utc::now().with_timezone(&tz).date_naive();
    let (file, guard) = match log_dir.map(|dir| file_appender(dir, today)) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(ZonedTimer(tz))
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        Some(Err(e)) => {
            eprintln!("warning: file logging disabled: {e}");
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(stderr).with(file).init();
    guard
}

fn file_appender(dir: &Path, date: NaiveDate) -> anyhow::Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)?;
    Ok(RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(paths::run_log_name(date))
        .build(dir)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rct_core::health::scan_logs;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn start_run_is_found_by_next_mornings_scan() {
        let tz = chrono_tz::Asia::Tokyo;
        // 07:00 JST on 2025-06-02 is still 2025-06-01 in UTC.
        let start_run = Utc.with_ymd_and_hms(2025, 6, 1, 22, 0, 2).unwrap();
        let run_date = start_run.with_timezone(&tz).date_naive();

        let dir = TempDir::new().unwrap();
        let mut appender = file_appender(dir.path(), run_date).unwrap();
        let stamp = start_run.with_timezone(&tz).format(TIMESTAMP);
        writeln!(appender, "{stamp} ERROR go-live failed: Connection refused").unwrap();
        appender.flush().unwrap();

        let files: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files, vec!["rct.2025-06-02.log"]);

        // The health check on 2025-06-03 scans its local yesterday.
        let yesterday = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let failures = scan_logs(dir.path(), yesterday);
        assert!(!failures.is_empty());
        assert!(failures[0].starts_with("rct.2025-06-02.log: 2025-06-02 07:00:02"));
    }

    #[test]
    fn repeated_runs_append_to_the_same_day_file() {
        let dir = TempDir::new().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        for line in ["prepare ok", "start ok"] {
            let mut appender = file_appender(dir.path(), date).unwrap();
            writeln!(appender, "{line}").unwrap();
            appender.flush().unwrap();
        }
        let text = std::fs::read_to_string(dir.path().join("rct.2025-06-02.log")).unwrap();
        assert_eq!(text, "prepare ok\nstart ok\n");
    }
}
