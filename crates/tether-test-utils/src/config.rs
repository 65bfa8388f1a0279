//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use tether_config::{AppConfig, HierarchyConfig, LimitPolicy, StatsFailurePolicy};

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .reference_limit(2)
///     .on_limit(LimitPolicy::Reject)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn reference_limit(mut self, limit: usize) -> Self {
        self.config.tags.reference_limit = limit;
        self
    }

    pub fn on_limit(mut self, policy: LimitPolicy) -> Self {
        self.config.tags.on_limit = policy;
        self
    }

    pub fn stats_on_failure(mut self, policy: StatsFailurePolicy) -> Self {
        self.config.stats.on_failure = policy;
        self
    }

    /// Replace the hierarchy table.
    pub fn hierarchy(mut self, entries: Vec<HierarchyConfig>) -> Self {
        self.config.hierarchy = entries;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
