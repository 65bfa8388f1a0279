#![deny(unsafe_code)]

//! Configuration loading and validation for Tether.
//!
//! Loads TOML configuration files and validates them. [`AppConfig`] is the
//! central configuration structure: it declares the association hierarchy
//! table, the tag-limit policy applied when a child claims a parent, and how
//! relationship statistics behave when they cannot be computed.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Association tag limits.
    #[serde(default)]
    pub tags: TagsConfig,

    /// Relationship statistics behaviour.
    #[serde(default)]
    pub stats: StatsConfig,

    /// Per-type association hierarchy declarations.
    #[serde(default = "default_hierarchy")]
    pub hierarchy: Vec<HierarchyConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            tags: TagsConfig::default(),
            stats: StatsConfig::default(),
            hierarchy: default_hierarchy(),
        }
    }
}

/// One entry of the association hierarchy table.
///
/// ## TOML Example
///
/// ```toml
/// [[hierarchy]]
/// type = "initiative"
/// children = ["project"]
///
/// [[hierarchy]]
/// type = "project"
/// parents = ["initiative"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// The entity type this entry declares.
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Types this entity may be a parent of.
    #[serde(default)]
    pub children: Vec<String>,

    /// Types this entity may be a child of.
    #[serde(default)]
    pub parents: Vec<String>,
}

impl HierarchyConfig {
    /// Create an entry with no associations.
    pub fn new(entity_type: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            children: Vec::new(),
            parents: Vec::new(),
        }
    }

    /// Builder: declare a child type.
    pub fn with_child(mut self, child: &str) -> Self {
        self.children.push(child.to_string());
        self
    }

    /// Builder: declare a parent type.
    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parents.push(parent.to_string());
        self
    }
}

fn default_hierarchy() -> Vec<HierarchyConfig> {
    vec![
        HierarchyConfig::new("initiative").with_child("project"),
        HierarchyConfig::new("project").with_parent("initiative"),
    ]
}

/// What happens when a child would exceed the reference-tag soft limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitPolicy {
    /// Log a warning and add the tag anyway.
    #[default]
    Warn,
    /// Refuse to add the tag.
    Reject,
}

/// Association tag limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagsConfig {
    /// Soft limit on reference tags of one association type per record.
    #[serde(default = "default_reference_limit")]
    pub reference_limit: usize,

    /// Hard cap on the total number of tags the platform stores per record.
    #[serde(default = "default_platform_cap")]
    pub platform_cap: usize,

    /// Policy applied when the soft limit would be exceeded.
    #[serde(default)]
    pub on_limit: LimitPolicy,
}

impl Default for TagsConfig {
    fn default() -> Self {
        Self {
            reference_limit: default_reference_limit(),
            platform_cap: default_platform_cap(),
            on_limit: LimitPolicy::default(),
        }
    }
}

fn default_reference_limit() -> usize {
    50
}

fn default_platform_cap() -> usize {
    128
}

/// How statistics behave when the relationship queries cannot be built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsFailurePolicy {
    /// Return all-zero counts and flag them as degraded.
    #[default]
    Zero,
    /// Surface the failure to the caller.
    Error,
}

/// Relationship statistics configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Behaviour when query construction fails.
    #[serde(default)]
    pub on_failure: StatsFailurePolicy,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tags.reference_limit == 0 {
            return Err(ConfigError::Validation(
                "tags.reference_limit must be at least 1".to_string(),
            ));
        }
        if self.tags.reference_limit >= self.tags.platform_cap {
            return Err(ConfigError::Validation(format!(
                "tags.reference_limit ({}) must be below tags.platform_cap ({})",
                self.tags.reference_limit, self.tags.platform_cap
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for (i, entry) in self.hierarchy.iter().enumerate() {
            if entry.entity_type.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "hierarchy[{i}].type must not be empty"
                )));
            }
            if !seen.insert(entry.entity_type.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "hierarchy[{i}] declares {:?} more than once",
                    entry.entity_type
                )));
            }
            let related = entry.children.iter().chain(entry.parents.iter());
            for other in related {
                if other.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "hierarchy[{i}] ({:?}) lists an empty type name",
                        entry.entity_type
                    )));
                }
                if *other == entry.entity_type {
                    return Err(ConfigError::Validation(format!(
                        "hierarchy[{i}] ({:?}) cannot associate with itself",
                        entry.entity_type
                    )));
                }
            }
        }

        Ok(())
    }
}
