//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote authority.
    pub base_url: String,
    /// Delay between automatic synchronization passes.
    pub sync_interval: Duration,
    /// Delay before retrying undelivered pending updates.
    pub retry_interval: Duration,
    /// How long read content is kept after its last access.
    pub retention_window: Duration,
    /// Initial state of the bulk pre-fetch toggle.
    pub prefetch_enabled: bool,
    /// Initial state of the source-content pre-fetch toggle.
    pub source_prefetch_enabled: bool,
}

impl SyncConfig {
    /// Creates a configuration with the standard delays: five-minute
    /// sync interval, thirty-second update retry, three-day content
    /// retention, pre-fetch toggles off.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            sync_interval: Duration::from_secs(5 * 60),
            retry_interval: Duration::from_secs(30),
            retention_window: Duration::from_secs(3 * 24 * 60 * 60),
            prefetch_enabled: false,
            source_prefetch_enabled: false,
        }
    }

    /// Sets the automatic synchronization interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the pending-update retry interval.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Sets the content retention window.
    pub fn with_retention_window(mut self, window: Duration) -> Self {
        self.retention_window = window;
        self
    }

    /// Enables or disables bulk pre-fetch.
    pub fn with_prefetch(mut self, enabled: bool) -> Self {
        self.prefetch_enabled = enabled;
        self
    }

    /// Enables or disables source-content pre-fetch.
    pub fn with_source_prefetch(mut self, enabled: bool) -> Self {
        self.source_prefetch_enabled = enabled;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delays() {
        let config = SyncConfig::new("https://shelf.example.com");
        assert_eq!(config.sync_interval, Duration::from_secs(300));
        assert_eq!(config.retry_interval, Duration::from_secs(30));
        assert_eq!(config.retention_window, Duration::from_secs(259_200));
        assert!(!config.prefetch_enabled);
        assert!(!config.source_prefetch_enabled);
    }

    #[test]
    fn builder() {
        let config = SyncConfig::new("https://shelf.example.com")
            .with_sync_interval(Duration::from_secs(60))
            .with_retry_interval(Duration::from_secs(5))
            .with_retention_window(Duration::from_secs(3600))
            .with_prefetch(true)
            .with_source_prefetch(true);

        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert_eq!(config.retry_interval, Duration::from_secs(5));
        assert_eq!(config.retention_window, Duration::from_secs(3600));
        assert!(config.prefetch_enabled);
        assert!(config.source_prefetch_enabled);
    }
}
