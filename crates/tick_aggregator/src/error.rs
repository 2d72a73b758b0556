//! # Tick Aggregator Error Types
//!
//! Failures that abort an operation, plus the informational rejection reasons
//! returned by registration.

use thiserror::Error;

use crate::host::WorldKind;
use crate::phase::Phase;

/// A phase adapter could not bind to the host scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// The owning world was dropped before binding.
    #[error("world unavailable while binding {0}")]
    WorldUnavailable(Phase),

    /// The world has no active level to register the callback against.
    #[error("no active level to bind {0} against")]
    NoActiveLevel(Phase),

    /// The host scheduler refused the binding.
    #[error("scheduler rejected {phase} binding: {reason}")]
    Rejected {
        /// Phase being bound.
        phase: Phase,
        /// Host-supplied reason.
        reason: String,
    },
}

/// The aggregator could not attach to a world. The world stays un-aggregated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttachError {
    /// The world reference is dead.
    #[error("world unavailable")]
    WorldUnavailable,

    /// The world has no active level.
    #[error("world has no active level")]
    NoActiveLevel,

    /// The world kind is not in the configured allow-list.
    #[error("world kind {0:?} is not supported")]
    UnsupportedWorld(WorldKind),

    /// `attach` was called on an aggregator that is already attached.
    #[error("aggregator already attached")]
    AlreadyAttached,

    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// One of the four phase bindings failed; none were kept.
    #[error("phase binding failed: {0}")]
    Bind(#[from] BindError),
}

/// Configuration could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML did not parse into a config.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config parsed but is not usable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Why a registration request was skipped. Informational, not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// The entity opted out of ticking (`can_ever_tick` or
    /// `start_with_tick_enabled` is false).
    TickingDisabled,
    /// The host no longer owns the entity.
    EntityGone,
    /// The entity is locked, e.g. it asked to register itself mid-tick.
    EntityBusy,
    /// The aggregator is not attached to a world.
    NotAttached,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::TickingDisabled => "entity ticking disabled",
            Self::EntityGone => "entity no longer alive",
            Self::EntityBusy => "entity locked",
            Self::NotAttached => "aggregator not attached",
        };
        f.write_str(text)
    }
}

/// Result type for attaching.
pub type AttachResult<T> = Result<T, AttachError>;

/// Result type for binding a phase adapter.
pub type BindResult<T> = Result<T, BindError>;

/// Result type for loading configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;
