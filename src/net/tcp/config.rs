use std::time::Duration;

use rand::Rng;

/// Configuration for a [`ConnPool`](super::ConnPool).
///
/// Use `ConnPoolConfig::builder()` for ergonomic construction.
///
/// ## Retry policy
///
/// An active connection whose connect attempt fails waits
/// `retry_delay + U[0, retry_jitter * retry_delay]` before trying again, so
/// many links dropped together do not reconnect in lockstep. Attempts are
/// unlimited unless `max_connect_attempts` is set.
///
/// ## Resource limits
///
/// - `conn_server_timeout`: how long an accepted socket may take to finish setup
/// - `seg_buff_size`: upper bound of a single socket read
/// - `max_connections`: hard cap on live connections (None for unlimited)
#[derive(Debug, Clone)]
pub struct ConnPoolConfig {
    /// Backlog passed to `listen(2)`
    pub max_listen_backlog: u32,
    /// Base delay between connect attempts
    pub retry_delay: Duration,
    /// Fraction of `retry_delay` added on top as random jitter
    pub retry_jitter: f64,
    /// Upper bound of a single connect attempt
    pub connect_timeout: Duration,
    /// Setup window of an accepted connection
    pub conn_server_timeout: Duration,
    /// Size of a single read segment
    pub seg_buff_size: usize,
    /// Give up after this many failed connect attempts
    pub max_connect_attempts: Option<u32>,
    /// Maximum number of live connections
    pub max_connections: Option<usize>,
    /// Enable TCP_NODELAY
    pub no_delay: bool,
}

impl ConnPoolConfig {
    /// Create a new builder for ConnPoolConfig
    pub fn builder() -> ConnPoolConfigBuilder {
        ConnPoolConfigBuilder::new()
    }

    /// Draws the delay before the next connect attempt.
    pub fn gen_retry_delay(&self) -> Duration {
        let jitter = self.retry_jitter.max(0.0);
        if jitter == 0.0 {
            return self.retry_delay;
        }
        let factor = rand::thread_rng().gen_range(0.0..=jitter);
        self.retry_delay + self.retry_delay.mul_f64(factor)
    }
}

impl Default for ConnPoolConfig {
    fn default() -> Self {
        Self {
            max_listen_backlog: 10,
            retry_delay: Duration::from_secs(2),
            retry_jitter: 0.5,
            connect_timeout: Duration::from_secs(2),
            conn_server_timeout: Duration::from_secs(2),
            seg_buff_size: 4096,
            max_connect_attempts: None,
            max_connections: None,
            no_delay: true,
        }
    }
}

/// Builder for ConnPoolConfig.
///
/// All fields are optional and fall back to `ConnPoolConfig::default()`.
#[derive(Default)]
pub struct ConnPoolConfigBuilder {
    max_listen_backlog: Option<u32>,
    retry_delay: Option<Duration>,
    retry_jitter: Option<f64>,
    connect_timeout: Option<Duration>,
    conn_server_timeout: Option<Duration>,
    seg_buff_size: Option<usize>,
    max_connect_attempts: Option<u32>,
    max_connections: Option<usize>,
    no_delay: Option<bool>,
}

impl ConnPoolConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_listen_backlog(mut self, backlog: u32) -> Self {
        self.max_listen_backlog = Some(backlog);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Set the jitter fraction; 0.0 disables jitter
    pub fn retry_jitter(mut self, jitter: f64) -> Self {
        self.retry_jitter = Some(jitter);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn conn_server_timeout(mut self, timeout: Duration) -> Self {
        self.conn_server_timeout = Some(timeout);
        self
    }

    pub fn seg_buff_size(mut self, size: usize) -> Self {
        self.seg_buff_size = Some(size);
        self
    }

    pub fn max_connect_attempts(mut self, attempts: u32) -> Self {
        self.max_connect_attempts = Some(attempts);
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.no_delay = Some(enabled);
        self
    }

    pub fn build(self) -> ConnPoolConfig {
        let default = ConnPoolConfig::default();
        ConnPoolConfig {
            max_listen_backlog: self
                .max_listen_backlog
                .unwrap_or(default.max_listen_backlog),
            retry_delay: self.retry_delay.unwrap_or(default.retry_delay),
            retry_jitter: self.retry_jitter.unwrap_or(default.retry_jitter),
            connect_timeout: self.connect_timeout.unwrap_or(default.connect_timeout),
            conn_server_timeout: self
                .conn_server_timeout
                .unwrap_or(default.conn_server_timeout),
            seg_buff_size: self.seg_buff_size.unwrap_or(default.seg_buff_size).max(1),
            max_connect_attempts: self.max_connect_attempts.or(default.max_connect_attempts),
            max_connections: self.max_connections.or(default.max_connections),
            no_delay: self.no_delay.unwrap_or(default.no_delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ConnPoolConfig::builder().build();
        assert_eq!(config.max_listen_backlog, 10);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        assert_eq!(config.conn_server_timeout, Duration::from_secs(2));
        assert_eq!(config.seg_buff_size, 4096);
        assert_eq!(config.max_connect_attempts, None);
        assert!(config.no_delay);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ConnPoolConfig::builder()
            .max_listen_backlog(128)
            .retry_delay(Duration::from_millis(50))
            .seg_buff_size(0)
            .max_connect_attempts(3)
            .max_connections(16)
            .build();
        assert_eq!(config.max_listen_backlog, 128);
        assert_eq!(config.retry_delay, Duration::from_millis(50));
        assert_eq!(config.seg_buff_size, 1);
        assert_eq!(config.max_connect_attempts, Some(3));
        assert_eq!(config.max_connections, Some(16));
    }

    #[test]
    fn test_retry_delay_within_jitter_window() {
        let config = ConnPoolConfig::builder()
            .retry_delay(Duration::from_millis(100))
            .retry_jitter(0.5)
            .build();
        for _ in 0..200 {
            let delay = config.gen_retry_delay();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_retry_delay_without_jitter() {
        let config = ConnPoolConfig::builder()
            .retry_delay(Duration::from_millis(30))
            .retry_jitter(0.0)
            .build();
        assert_eq!(config.gen_retry_delay(), Duration::from_millis(30));
    }
}
