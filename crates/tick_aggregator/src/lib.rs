//! # Tick Aggregator
//!
//! Batched per-frame update engine. Instead of every entity registering its
//! own tick with the host scheduler, entities are grouped by
//! `(concrete type, phase)` and each phase runs one batched pass:
//!
//! ```text
//! Host scheduler                 TickAggregator
//! ┌───────────────┐   dt    ┌──────────────────────────────────────┐
//! │ PrePhysics    │────────>│ GroupTable[PrePhysics]               │
//! │ DuringPhysics │────────>│   Group(TurretA) [e0, e3, e7]        │
//! │ PostPhysics   │────────>│   Group(Drone)   [e1, e2]            │
//! │ PostUpdateWork│────────>│ compact() -> [e0,e3,e7,e1,e2] -> tick│
//! └───────────────┘         └──────────────────────────────────────┘
//! ```
//!
//! ## Architecture Rules
//!
//! 1. **Host owns entities** - the aggregator only keeps `Weak` handles
//! 2. **One context per world** - no global state, worlds stay isolated
//! 3. **Snapshot passes** - a pass ticks what was registered when it began
//!
//! ## Example
//!
//! ```rust,ignore
//! use tick_aggregator::{AggregatorConfig, TickAggregator};
//!
//! // `world: Weak<dyn HostWorld>` is handed out by the host.
//! let aggregator = TickAggregator::new(AggregatorConfig::default());
//! aggregator.attach(&world)?;
//! // The host now calls into the aggregator once per phase per frame.
//! aggregator.detach();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod adapter;
pub mod aggregator;
pub mod bridge;
pub mod capability;
pub mod config;
pub mod entity;
pub mod error;
pub mod group_table;
pub mod host;
pub mod phase;

pub use adapter::PhaseTickAdapter;
pub use aggregator::{PhaseStats, RegisterOutcome, TickAggregator};
pub use bridge::LifecycleBridge;
pub use capability::{probe, CapabilitySource, TickAggregated};
pub use config::{AggregatorConfig, DuplicatePolicy};
pub use entity::{
    EntityComponent, EntityHandle, EntityId, GroupKey, SharedEntity, TickEntity, TickFlags,
    TypeKey,
};
pub use error::{
    AttachError, AttachResult, BindError, BindResult, ConfigError, ConfigResult, Rejection,
};
pub use group_table::{Group, GroupTable};
pub use host::{
    BindingId, EndOfLifeCallback, EndOfLifeReason, FrameScheduler, HostWorld,
    InitializedCallback, LevelId, PhaseCallback, SubscriptionId, WorldId, WorldKind,
};
pub use phase::Phase;
