use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that enables verbose run logs.
pub const DEBUG_ENV: &str = "DATA_PIPES_DEBUG";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory run log files are written to
    pub log_dir: PathBuf,
    /// Upper bound on how long `done` waits for outstanding saves before
    /// attaching the run log
    pub attach_wait_timeout: Duration,
    /// Write trace level lines to run logs
    pub debug: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            attach_wait_timeout: Duration::from_secs(600),
            debug: debug_from_env(),
        }
    }
}

impl EngineConfig {
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    pub fn with_attach_wait_timeout(mut self, timeout: Duration) -> Self {
        self.attach_wait_timeout = timeout;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Whether `DATA_PIPES_DEBUG` is set to a truthy value.
pub fn debug_from_env() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_wait_matches_bounded_window() {
        let config = EngineConfig::default();
        assert_eq!(config.attach_wait_timeout, Duration::from_secs(600));
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_truthy_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy(" yes "));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
    }
}
