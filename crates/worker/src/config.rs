// Worker configuration
//
// Decision: Plain environment variables with defaults, read once at startup

use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

/// Default log filter when RUST_LOG is unset
pub const DEFAULT_LOG_FILTER: &str = "cadence_worker=debug,cadence_durable=info";

/// Configuration for the cadence worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identifies this process in recorded activity attempts
    pub worker_id: String,

    /// Directory of the file event store; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,

    /// How long shutdown waits for running workflows to stop
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::now_v7()),
            data_dir: None,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Read configuration from the environment
    ///
    /// - `CADENCE_WORKER_ID`: worker id (default: `worker-{uuid}`)
    /// - `CADENCE_DATA_DIR`: event store directory (default: in-memory)
    /// - `CADENCE_SHUTDOWN_TIMEOUT_SECS`: shutdown timeout (default: 30)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let worker_id = lookup("CADENCE_WORKER_ID")
            .filter(|id| !id.trim().is_empty())
            .unwrap_or(defaults.worker_id);

        let data_dir = lookup("CADENCE_DATA_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);

        let shutdown_timeout = lookup("CADENCE_SHUTDOWN_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.shutdown_timeout);

        Self {
            worker_id,
            data_dir,
            shutdown_timeout,
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> WorkerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);

        assert!(config.worker_id.starts_with("worker-"));
        assert!(config.data_dir.is_none());
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("CADENCE_WORKER_ID", "worker-a"),
            ("CADENCE_DATA_DIR", "/var/lib/cadence"),
            ("CADENCE_SHUTDOWN_TIMEOUT_SECS", "5"),
        ]);

        assert_eq!(config.worker_id, "worker-a");
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/cadence")));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config(&[
            ("CADENCE_DATA_DIR", "  "),
            ("CADENCE_SHUTDOWN_TIMEOUT_SECS", "soon"),
        ]);

        assert!(config.data_dir.is_none());
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
    }
}
