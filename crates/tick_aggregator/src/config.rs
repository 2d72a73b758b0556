//! # Aggregator Configuration
//!
//! Loaded once at world start, either built in code or read from TOML:
//!
//! ```toml
//! supported_worlds = ["Game", "Pie"]
//! duplicate_registration = "Guard"
//! reclaim_empty_groups = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::host::WorldKind;

/// What `register_entity` does with an entity that is already registered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    /// Check membership first; a repeat registration is a no-op.
    #[default]
    Guard,
    /// Skip the check. A repeat lands in the group twice and ticks twice per
    /// pass until unregistered.
    Permit,
}

/// Configuration for a [`crate::TickAggregator`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// World kinds the aggregator attaches to.
    pub supported_worlds: Vec<WorldKind>,
    /// Handling of repeat registrations.
    pub duplicate_registration: DuplicatePolicy,
    /// Drop a group as soon as its last member leaves.
    pub reclaim_empty_groups: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            supported_worlds: vec![WorldKind::Game, WorldKind::Pie],
            duplicate_registration: DuplicatePolicy::Guard,
            reclaim_empty_groups: false,
        }
    }
}

impl AggregatorConfig {
    /// Parses a config from TOML text. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML and
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`Self::from_toml_str`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks the config is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if no world kind is supported.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.supported_worlds.is_empty() {
            return Err(ConfigError::Invalid(
                "supported_worlds must name at least one world kind".into(),
            ));
        }
        Ok(())
    }

    /// Whether the aggregator attaches to worlds of `kind`.
    #[must_use]
    pub fn supports(&self, kind: WorldKind) -> bool {
        self.supported_worlds.contains(&kind)
    }

    /// Set the world kinds the aggregator attaches to.
    #[must_use]
    pub fn with_supported_worlds(mut self, worlds: Vec<WorldKind>) -> Self {
        self.supported_worlds = worlds;
        self
    }

    /// Set the repeat-registration policy.
    #[must_use]
    pub fn with_duplicate_registration(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_registration = policy;
        self
    }

    /// Set whether empty groups are dropped.
    #[must_use]
    pub fn with_reclaim_empty_groups(mut self, reclaim: bool) -> Self {
        self.reclaim_empty_groups = reclaim;
        self
    }
}
