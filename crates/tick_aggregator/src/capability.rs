//! # Aggregation Capability
//!
//! An entity opts into batched ticking by exposing the [`TickAggregated`]
//! marker, either itself or through one of its sub-components. Both routes are
//! answered by the single [`probe`] query.

use crate::entity::TickEntity;

/// Marker for types that want their ticks batched.
///
/// Implement it on the entity or on a component type, then return `Some(self)`
/// from the matching `tick_aggregated` accessor.
pub trait TickAggregated {}

/// Where the aggregation marker was found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapabilitySource {
    /// The entity exposes the marker itself.
    Direct,
    /// The sub-component at this index exposes it.
    Component(usize),
}

/// Probes an entity for the aggregation marker.
///
/// The entity itself is checked first, then its components in order.
#[must_use]
pub fn probe(entity: &dyn TickEntity) -> Option<CapabilitySource> {
    if entity.tick_aggregated().is_some() {
        return Some(CapabilitySource::Direct);
    }
    entity
        .components()
        .iter()
        .position(|component| component.tick_aggregated().is_some())
        .map(CapabilitySource::Component)
}
