//! Configuration for the connection manager

use std::time::Duration;

/// Reconnection and connect-timeout settings for a [`Manager`](crate::Manager).
///
/// All settings are meant to be chosen before the first `open()`; the manager
/// also exposes accessors/mutators for each of them.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Whether to automatically reconnect after an unexpected transport close
    pub reconnection: bool,

    /// Maximum number of reconnection attempts per backoff cycle
    pub reconnection_attempts: u32,

    /// Base delay before the first reconnection attempt; attempt N waits
    /// `min(N * delay, delay_max)`
    pub reconnection_delay: Duration,

    /// Cap on the delay between reconnection attempts
    pub reconnection_delay_max: Duration,

    /// How long a connection attempt may stay pending before it is forcibly
    /// failed; `None` disables the timer
    pub connect_timeout: Option<Duration>,
}

impl ManagerConfig {
    /// Create a configuration with the default settings
    pub fn new() -> Self {
        Self {
            reconnection: true,
            reconnection_attempts: u32::MAX,
            reconnection_delay: Duration::from_millis(1000),
            reconnection_delay_max: Duration::from_millis(5000),
            connect_timeout: Some(Duration::from_millis(10_000)),
        }
    }

    /// Disable automatic reconnection
    pub fn no_reconnection(mut self) -> Self {
        self.reconnection = false;
        self
    }

    /// Set the maximum number of reconnection attempts
    pub fn reconnection_attempts(mut self, attempts: u32) -> Self {
        self.reconnection_attempts = attempts;
        self
    }

    /// Set the reconnection delay range
    pub fn reconnection_delay(mut self, base: Duration, max: Duration) -> Self {
        self.reconnection_delay = base;
        self.reconnection_delay_max = max;
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Disable the connect timeout entirely
    pub fn no_connect_timeout(mut self) -> Self {
        self.connect_timeout = None;
        self
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ManagerConfig::new();

        assert!(config.reconnection);
        assert_eq!(config.reconnection_attempts, u32::MAX);
        assert_eq!(config.reconnection_delay, Duration::from_millis(1000));
        assert_eq!(config.reconnection_delay_max, Duration::from_millis(5000));
        assert_eq!(config.connect_timeout, Some(Duration::from_millis(10_000)));
    }

    #[test]
    fn test_config_no_reconnection() {
        let config = ManagerConfig::new().no_reconnection();
        assert!(!config.reconnection);
    }

    #[test]
    fn test_config_reconnection_delay() {
        let config = ManagerConfig::new()
            .reconnection_delay(Duration::from_millis(500), Duration::from_secs(60));

        assert_eq!(config.reconnection_delay, Duration::from_millis(500));
        assert_eq!(config.reconnection_delay_max, Duration::from_secs(60));
    }

    #[test]
    fn test_config_connect_timeout() {
        let config = ManagerConfig::new().connect_timeout(Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(5)));

        let config = config.no_connect_timeout();
        assert_eq!(config.connect_timeout, None);
    }

    #[test]
    fn test_config_builder_chain() {
        let config = ManagerConfig::new()
            .no_reconnection()
            .reconnection_attempts(3)
            .reconnection_delay(Duration::from_millis(100), Duration::from_millis(400))
            .connect_timeout(Duration::from_secs(2));

        assert!(!config.reconnection);
        assert_eq!(config.reconnection_attempts, 3);
        assert_eq!(config.reconnection_delay, Duration::from_millis(100));
        assert_eq!(config.reconnection_delay_max, Duration::from_millis(400));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_config_default_trait() {
        let config = ManagerConfig::default();
        assert!(config.reconnection);
    }
}
