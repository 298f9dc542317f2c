//! Per-run log file.
//!
//! Lifecycle lines of a run go to the global `tracing` subscriber and to a
//! run-scoped `fmt` subscriber that writes the file attached to the run
//! document once the run is done.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{dispatcher, warn, Dispatch, Level};
use uuid::Uuid;

/// `tracing::event!` needs its level at compile time.
macro_rules! event_at {
    ($level:expr, $($fields:tt)+) => {
        match $level {
            Level::TRACE => tracing::event!(Level::TRACE, $($fields)+),
            Level::DEBUG => tracing::event!(Level::DEBUG, $($fields)+),
            Level::INFO => tracing::event!(Level::INFO, $($fields)+),
            Level::WARN => tracing::event!(Level::WARN, $($fields)+),
            _ => tracing::event!(Level::ERROR, $($fields)+),
        }
    };
}

#[derive(Debug)]
pub struct RunLog {
    run_id: Uuid,
    path: PathBuf,
    file: Option<Arc<File>>,
    /// Subscriber writing to `file`
    dispatch: Option<Dispatch>,
}

impl RunLog {
    /// Open the log file for a run under `log_dir`.
    ///
    /// The file receives INFO and above, or everything down to TRACE when
    /// `debug` is set. A log file that cannot be created leaves the run log
    /// writing to the global subscriber only.
    pub fn create(log_dir: &Path, run_id: Uuid, started_at: DateTime<Utc>, debug: bool) -> Self {
        let path = log_dir.join(Self::file_name(run_id, started_at));

        let file = std::fs::create_dir_all(log_dir)
            .and_then(|_| OpenOptions::new().create(true).append(true).open(&path));
        let file = match file {
            Ok(file) => Some(Arc::new(file)),
            Err(e) => {
                warn!(
                    run_id = %run_id,
                    path = %path.display(),
                    error = %e,
                    "Failed to create run log file"
                );
                None
            }
        };

        let max_level = if debug { Level::TRACE } else { Level::INFO };
        let dispatch = file.clone().map(|file| {
            let subscriber = tracing_subscriber::fmt()
                .with_writer(file)
                .with_ansi(false)
                .with_target(false)
                .with_max_level(max_level)
                .finish();
            Dispatch::new(subscriber)
        });

        Self {
            run_id,
            path,
            file,
            dispatch,
        }
    }

    /// `sdp_pipe_run.<YYYYMMDD-HHMM>.<run id>.log`
    pub fn file_name(run_id: Uuid, started_at: DateTime<Utc>) -> String {
        format!(
            "sdp_pipe_run.{}.{}.log",
            started_at.format("%Y%m%d-%H%M"),
            run_id
        )
    }

    pub fn log_path(&self) -> &Path {
        &self.path
    }

    pub fn log(&self, level: Level, message: &str) {
        event_at!(level, run_id = %self.run_id, "{}", message);
        if let Some(dispatch) = &self.dispatch {
            dispatcher::with_default(dispatch, || event_at!(level, "{}", message));
        }
    }

    pub fn trace(&self, message: &str) {
        self.log(Level::TRACE, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::DEBUG, message);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::INFO, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::WARN, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::ERROR, message);
    }

    /// Flush written lines to disk.
    pub fn flush(&self) {
        if let Some(mut file) = self.file.as_deref() {
            if let Err(e) = file.flush() {
                warn!(run_id = %self.run_id, error = %e, "Failed to flush run log");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_name() {
        let run_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let started = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();

        assert_eq!(
            RunLog::file_name(run_id, started),
            "sdp_pipe_run.20240309-1405.550e8400-e29b-41d4-a716-446655440000.log"
        );
    }

    fn lines(log: &RunLog) -> Vec<String> {
        log.flush();
        std::fs::read_to_string(log.log_path())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_writes_at_info_level() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::create(dir.path(), Uuid::new_v4(), Utc::now(), false);

        log.debug("hidden");
        log.info("Pipe run started");
        log.error("boom");

        let lines = lines(&log);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO") && lines[0].ends_with("Pipe run started"));
        assert!(lines[1].contains("ERROR") && lines[1].ends_with("boom"));
    }

    #[test]
    fn test_debug_flag_lowers_level() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::create(dir.path(), Uuid::new_v4(), Utc::now(), true);

        log.trace("step detail");

        let lines = lines(&log);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("TRACE") && lines[0].ends_with("step detail"));
    }

    #[test]
    fn test_runs_write_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = RunLog::create(dir.path(), Uuid::new_v4(), Utc::now(), false);
        let second = RunLog::create(dir.path(), Uuid::new_v4(), Utc::now(), false);

        first.info("first run");
        second.info("second run");

        assert!(lines(&first).iter().all(|l| !l.contains("second run")));
        assert!(lines(&second).iter().all(|l| !l.contains("first run")));
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs").join("runs");
        let log = RunLog::create(&nested, Uuid::new_v4(), Utc::now(), false);

        log.info("hello");
        assert!(log.log_path().exists());
    }
}
