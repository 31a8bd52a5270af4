use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the directory that holds the ledger file.
pub const DATA_DIR_ENV: &str = "SPLITWISE_DATA_DIR";

/// Used when `SPLITWISE_DATA_DIR` is unset.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Fixed name of the ledger file inside the data directory.
pub const DATA_FILE_NAME: &str = "splitwise_data.json";

/// Runtime settings for the ledger store and service.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub data_dir: PathBuf,
    /// Longest a commit waits for the cross-process lease
    pub lock_timeout: Duration,
    /// Lifetime of a lease before other replicas may reclaim it
    pub lease_ttl: Duration,
    pub lock_poll_interval: Duration,
    /// Commit attempts per command before reporting overload
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

impl LedgerConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            lock_timeout: Duration::from_secs(5),
            lease_ttl: Duration::from_secs(15),
            lock_poll_interval: Duration::from_millis(25),
            max_attempts: 5,
            base_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max.max(base);
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Full path of the ledger file.
    pub fn data_path(&self) -> PathBuf {
        self.data_dir.join(DATA_FILE_NAME)
    }
}
