//! # Lifecycle Bridge
//!
//! Hooks the aggregator into the world's lifecycle so entities join batches
//! without any per-entity wiring.
//!
//! ```text
//! world: "all entities initialized"
//!   └─> for each live entity
//!         probe(entity)  ── Direct / Component(i) ──> register_entity
//!                        └─ None ──────────────────> skip
//! ```
//!
//! End-of-life subscriptions are made per entity by
//! [`TickAggregator::register_entity`].

use std::sync::Arc;

use crate::aggregator::TickAggregator;
use crate::capability::probe;
use crate::host::{HostWorld, SubscriptionId, WorldId};

/// The aggregator's subscription to bulk initialization.
#[derive(Debug)]
pub struct LifecycleBridge {
    world_id: WorldId,
    subscription: Option<SubscriptionId>,
}

impl LifecycleBridge {
    /// Subscribes `aggregator` to the world's initialization event.
    pub fn install(world: &dyn HostWorld, aggregator: &Arc<TickAggregator>) -> Self {
        let target = Arc::downgrade(aggregator);
        let callback = move |notifying: &dyn HostWorld| {
            if let Some(aggregator) = target.upgrade() {
                Self::on_entities_initialized(&aggregator, notifying);
            }
        };
        let subscription = world.on_entities_initialized(Box::new(callback));

        Self {
            world_id: world.id(),
            subscription: Some(subscription),
        }
    }

    /// Cancels the subscription. Idempotent.
    pub fn uninstall(&mut self, world: &dyn HostWorld) -> bool {
        match self.subscription.take() {
            Some(subscription) => world.unsubscribe(subscription),
            None => false,
        }
    }

    /// The world this bridge listens to.
    #[inline]
    #[must_use]
    pub const fn world_id(&self) -> WorldId {
        self.world_id
    }

    /// Whether the subscription is still held.
    #[inline]
    #[must_use]
    pub const fn is_installed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Scans `world` and registers every live entity that opted in, directly
    /// or through a component. Returns the number registered.
    ///
    /// Notifications from a world other than the attached one are ignored.
    pub fn on_entities_initialized(
        aggregator: &Arc<TickAggregator>,
        world: &dyn HostWorld,
    ) -> usize {
        if aggregator.world_id() != Some(world.id()) {
            tracing::warn!(
                "Ignoring initialization of world {:?}; aggregator serves {:?}",
                world.id(),
                aggregator.world_id()
            );
            return 0;
        }

        let live = world.live_entities();
        let mut registered = 0usize;

        for handle in &live {
            let Some(entity) = handle.upgrade() else {
                continue;
            };
            let source = match entity.try_lock() {
                Some(guard) => probe(&*guard),
                None => None,
            };
            let Some(source) = source else {
                continue;
            };

            tracing::debug!("Entity {} opted in ({:?})", handle.id(), source);
            if aggregator.register_entity(handle).is_registered() {
                registered += 1;
            }
        }

        tracing::info!(
            "Registered {} of {} live entities for batched ticking",
            registered,
            live.len()
        );
        registered
    }
}
