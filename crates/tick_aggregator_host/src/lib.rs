//! # Tick Aggregator Host
//!
//! A small in-process host for [`tick_aggregator`]: a [`LocalWorld`] that owns
//! entities and raises lifecycle events, and the [`LocalScheduler`] that calls
//! each bound phase once per frame.
//!
//! ```text
//! LocalWorld ──owns──> entities (Arc)
//!     │                    ^
//!     │                    └── Weak ── TickAggregator
//!     └── LocalScheduler ──dt per phase──> TickAggregator::run_phase
//! ```
//!
//! Used by the integration tests, the benchmarks and the `frame_soak` binary.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod scheduler;
pub mod world;

pub use scheduler::LocalScheduler;
pub use world::LocalWorld;
