use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application configuration loaded from `PoreDispatch.yaml`
///
/// Every section falls back to its defaults when missing from the file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub dispatch: DispatchSettings,

    #[serde(default)]
    pub worker: WorkerSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Pacing of the poll-and-deliver loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Interval between supervisor ticks, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on non-blocking receives attempted in a single tick
    #[serde(default = "default_max_receives_per_tick")]
    pub max_receives_per_tick: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_receives_per_tick: default_max_receives_per_tick(),
        }
    }
}

impl DispatchSettings {
    /// Tick interval, never shorter than one millisecond
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    /// Settings with a custom tick interval, rounded down to whole milliseconds
    /// and clamped to at least one
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.poll_interval_ms = millis.max(MIN_POLL_INTERVAL_MS);
        self
    }
}

const MIN_POLL_INTERVAL_MS: u64 = 1;

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_receives_per_tick() -> usize {
    4096
}

/// External worker executable used for out-of-process analysis
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Program to launch; `None` means no process worker is configured
    #[serde(default)]
    pub program: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,

    #[serde(default)]
    pub debug_mode: bool,

    #[serde(default = "default_console_output")]
    pub console_output: bool,

    /// Write the log file as JSON lines instead of plain text
    #[serde(default)]
    pub json_file: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            debug_mode: false,
            console_output: default_console_output(),
            json_file: false,
        }
    }
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_log_prefix() -> String {
    "poredispatch".to_string()
}

fn default_console_output() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_settings_defaults() {
        let settings = DispatchSettings::default();
        assert_eq!(settings.poll_interval_ms, 500);
        assert_eq!(settings.poll_interval(), Duration::from_millis(500));
        assert_eq!(settings.max_receives_per_tick, 4096);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: AppConfig = serde_yaml_ng::from_str("dispatch:\n  poll_interval_ms: 50\n").unwrap();
        assert_eq!(config.dispatch.poll_interval_ms, 50);
        assert_eq!(config.dispatch.max_receives_per_tick, 4096);
        assert_eq!(config.logging.log_prefix, "poredispatch");
        assert!(config.worker.program.is_none());
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let settings = DispatchSettings::default().with_poll_interval(Duration::ZERO);
        assert_eq!(settings.poll_interval_ms, 1);
        assert_eq!(settings.poll_interval(), Duration::from_millis(1));

        let settings = DispatchSettings {
            poll_interval_ms: 0,
            ..DispatchSettings::default()
        };
        assert_eq!(settings.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_with_poll_interval() {
        let settings = DispatchSettings::default().with_poll_interval(Duration::from_millis(20));
        assert_eq!(settings.poll_interval_ms, 20);
    }
}
