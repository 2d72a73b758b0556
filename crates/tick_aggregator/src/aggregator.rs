//! # Tick Aggregator
//!
//! The per-world context object. Owns one [`GroupTable`] and one
//! [`PhaseTickAdapter`] per phase and replaces per-entity scheduling with
//! one batched pass per phase:
//!
//! ```text
//! attach(world)
//!   ├─ bind 4 adapters (all or nothing)
//!   └─ install LifecycleBridge ── entities initialized ──> register_entity
//!
//! each frame, for phase in PrePhysics..PostUpdateWork:
//!   host ──dt──> adapter ──> run_phase(phase, dt)
//!                              ├─ pass = table[phase].compact()   (snapshot)
//!                              └─ for e in pass: e.tick(dt)
//!
//! end of life ──> unregister_entity
//! detach() ──> unbind adapters, cancel subscriptions, clear tables
//! ```
//!
//! ## Per-entity state
//!
//! `Unregistered -> Registered` (self-tick switched off for good)
//! `-> Unregistered` (explicit or end of life). Nothing switches self-tick
//! back on.
//!
//! ## Threading
//!
//! Everything runs on the host's update thread. Internal locks are never held
//! while entity code or host callbacks run, so an entity may end its own life
//! (and thereby unregister) from inside its tick.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::adapter::PhaseTickAdapter;
use crate::bridge::LifecycleBridge;
use crate::config::{AggregatorConfig, DuplicatePolicy};
use crate::entity::{EntityHandle, EntityId, TickFlags};
use crate::error::{AttachError, AttachResult, BindResult, Rejection};
use crate::group_table::GroupTable;
use crate::host::{EndOfLifeReason, HostWorld, SubscriptionId, WorldId};
use crate::phase::Phase;

/// Result of a registration request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The entity now ticks in its phase's batch.
    Registered,
    /// The entity was already a member; nothing changed.
    AlreadyRegistered,
    /// The entity was skipped.
    Rejected(Rejection),
}

impl RegisterOutcome {
    /// Whether this call added the entity to a group.
    #[inline]
    #[must_use]
    pub const fn is_registered(self) -> bool {
        matches!(self, Self::Registered)
    }
}

/// Counters for one phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhaseStats {
    /// Batched passes run.
    pub passes: u64,
    /// Entity ticks dispatched across all passes.
    pub ticks_dispatched: u64,
    /// Size of the most recent pass.
    pub last_pass_len: usize,
    /// Handles skipped because the host had already dropped the entity.
    pub stale_skipped: u64,
}

/// Mutable engine state, guarded by one lock.
struct State {
    tables: [GroupTable; Phase::COUNT],
    stats: [PhaseStats; Phase::COUNT],
    /// Phase each registered entity was batched under.
    phases: HashMap<EntityId, Phase>,
    /// Pending end-of-life subscriptions of registered entities.
    end_of_life: HashMap<EntityId, SubscriptionId>,
}

impl State {
    fn new(reclaim_empty_groups: bool) -> Self {
        Self {
            tables: Phase::ALL.map(|phase| GroupTable::with_reclaim(phase, reclaim_empty_groups)),
            stats: [PhaseStats::default(); Phase::COUNT],
            phases: HashMap::new(),
            end_of_life: HashMap::new(),
        }
    }

    fn table(&self, phase: Phase) -> &GroupTable {
        &self.tables[phase.index()]
    }

    fn table_mut(&mut self, phase: Phase) -> &mut GroupTable {
        &mut self.tables[phase.index()]
    }

    fn clear(&mut self) {
        for table in &mut self.tables {
            table.clear();
        }
        self.phases.clear();
    }
}

/// Everything that only exists between `attach` and `detach`.
struct Attachment {
    world: Weak<dyn HostWorld>,
    world_id: WorldId,
    adapters: Vec<PhaseTickAdapter>,
    bridge: Option<LifecycleBridge>,
}

/// Batched tick engine for one world.
///
/// Create one per world with [`TickAggregator::new`], then [`attach`].
/// Dropping the aggregator detaches it.
///
/// [`attach`]: TickAggregator::attach
pub struct TickAggregator {
    config: AggregatorConfig,
    state: Mutex<State>,
    attachment: Mutex<Option<Attachment>>,
}

impl TickAggregator {
    /// Creates a detached aggregator.
    #[must_use]
    pub fn new(config: AggregatorConfig) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::new(config.reclaim_empty_groups)),
            attachment: Mutex::new(None),
            config,
        })
    }

    /// The configuration this aggregator was built with.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Attaches to a live world: binds all four phases and subscribes to bulk
    /// initialization. On success every table is empty.
    ///
    /// # Errors
    ///
    /// - [`AttachError::AlreadyAttached`] if attached
    /// - [`AttachError::InvalidConfig`] if the config does not validate
    /// - [`AttachError::WorldUnavailable`] if `world` is dead
    /// - [`AttachError::UnsupportedWorld`] for world kinds outside the config
    /// - [`AttachError::NoActiveLevel`] if the world has no active level
    /// - [`AttachError::Bind`] if any phase fails to bind; bindings already
    ///   made are rolled back
    pub fn attach(self: &Arc<Self>, world: &Weak<dyn HostWorld>) -> AttachResult<()> {
        let result = self.try_attach(world);
        if let Err(err) = &result {
            tracing::error!("Tick aggregator failed to attach: {}", err);
        }
        result
    }

    fn try_attach(self: &Arc<Self>, world: &Weak<dyn HostWorld>) -> AttachResult<()> {
        if self.is_attached() {
            return Err(AttachError::AlreadyAttached);
        }
        self.config
            .validate()
            .map_err(|err| AttachError::InvalidConfig(err.to_string()))?;

        let host = world.upgrade().ok_or(AttachError::WorldUnavailable)?;
        let kind = host.kind();
        if !self.config.supports(kind) {
            return Err(AttachError::UnsupportedWorld(kind));
        }
        if host.active_level().is_none() {
            return Err(AttachError::NoActiveLevel);
        }

        let adapters = self.bind_adapters(world, host.as_ref())?;

        self.state.lock().clear();

        // Published before the bridge subscribes, so a host that fires the
        // initialization event synchronously already sees us attached.
        *self.attachment.lock() = Some(Attachment {
            world: world.clone(),
            world_id: host.id(),
            adapters,
            bridge: None,
        });

        let bridge = LifecycleBridge::install(host.as_ref(), self);
        if let Some(attachment) = self.attachment.lock().as_mut() {
            attachment.bridge = Some(bridge);
        }

        tracing::info!("Tick aggregator attached to world {:?} ({:?})", host.id(), kind);
        Ok(())
    }

    /// Binds one adapter per phase. Partial coverage is never kept.
    fn bind_adapters(
        self: &Arc<Self>,
        world: &Weak<dyn HostWorld>,
        host: &dyn HostWorld,
    ) -> BindResult<Vec<PhaseTickAdapter>> {
        let mut adapters = Vec::with_capacity(Phase::COUNT);

        for phase in Phase::ALL {
            let target = Arc::downgrade(self);
            let callback = Box::new(move |delta_seconds: f32| {
                if let Some(aggregator) = target.upgrade() {
                    aggregator.run_phase(phase, delta_seconds);
                }
            });

            match PhaseTickAdapter::bind(phase, world, callback) {
                Ok(adapter) => adapters.push(adapter),
                Err(err) => {
                    tracing::warn!(
                        "Rolling back {} phase bindings after {} failed",
                        adapters.len(),
                        phase
                    );
                    for adapter in &mut adapters {
                        adapter.unbind(host.scheduler());
                    }
                    return Err(err);
                }
            }
        }

        Ok(adapters)
    }

    /// Unbinds all adapters, cancels lifecycle subscriptions and clears every
    /// table. Idempotent.
    pub fn detach(&self) {
        let Some(mut attachment) = self.attachment.lock().take() else {
            return;
        };

        let subscriptions: Vec<SubscriptionId> = {
            let mut state = self.state.lock();
            state.clear();
            state.end_of_life.drain().map(|(_, sub)| sub).collect()
        };

        match attachment.world.upgrade() {
            Some(host) => {
                for adapter in &mut attachment.adapters {
                    adapter.unbind(host.scheduler());
                }
                if let Some(bridge) = attachment.bridge.as_mut() {
                    bridge.uninstall(host.as_ref());
                }
                for subscription in subscriptions {
                    host.unsubscribe(subscription);
                }
            }
            // The scheduler went down with the world; nothing left to unbind.
            None => {
                for adapter in &mut attachment.adapters {
                    adapter.forget();
                }
            }
        }

        tracing::info!("Tick aggregator detached from world {:?}", attachment.world_id);
    }

    /// Whether the aggregator is attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attachment.lock().is_some()
    }

    /// Identity of the attached world.
    #[must_use]
    pub fn world_id(&self) -> Option<WorldId> {
        self.attachment.lock().as_ref().map(|a| a.world_id)
    }

    /// Number of phases the host scheduler still holds a binding for.
    ///
    /// Bindings the host dropped on its own, for example with the level they
    /// were made against, no longer count.
    #[must_use]
    pub fn bound_phase_count(&self) -> usize {
        let attachment = self.attachment.lock();
        let Some(attachment) = attachment.as_ref() else {
            return 0;
        };
        let Some(host) = attachment.world.upgrade() else {
            return 0;
        };
        let scheduler = host.scheduler();
        attachment
            .adapters
            .iter()
            .filter_map(PhaseTickAdapter::binding)
            .filter(|&binding| scheduler.is_bound(binding))
            .count()
    }

    fn attached_world(&self) -> Option<Arc<dyn HostWorld>> {
        self.attachment.lock().as_ref()?.world.upgrade()
    }

    // ========================================================================
    // REGISTRATION
    // ========================================================================

    /// Moves an entity's ticking into its phase's batch.
    ///
    /// Entities that opted out of ticking are skipped and left untouched.
    /// Otherwise all self-tick switches are cleared, the entity joins the
    /// group for its type under the phase it declares right now, and its end
    /// of life will unregister it.
    pub fn register_entity(self: &Arc<Self>, handle: &EntityHandle) -> RegisterOutcome {
        let Some(world) = self.attached_world() else {
            return RegisterOutcome::Rejected(Rejection::NotAttached);
        };

        if self.config.duplicate_registration == DuplicatePolicy::Guard
            && self.is_registered(handle)
        {
            tracing::debug!("Entity {} already registered, skipping", handle.id());
            return RegisterOutcome::AlreadyRegistered;
        }

        let phase = match Self::take_over_ticking(handle) {
            Ok(phase) => phase,
            Err(rejection) => {
                tracing::debug!("Entity {} not registered: {}", handle.id(), rejection);
                return RegisterOutcome::Rejected(rejection);
            }
        };

        let (duplicate, moved_from) = {
            let mut state = self.state.lock();
            let previous = state.phases.insert(handle.id(), phase);
            let moved_from = previous.filter(|&previous| previous != phase);
            if let Some(previous) = moved_from {
                state.table_mut(previous).remove(handle);
            }
            let table = state.table_mut(phase);
            let duplicate = table.contains(handle);
            table.insert(handle.with_phase(phase));
            (duplicate, moved_from)
        };
        if let Some(previous) = moved_from {
            tracing::debug!("Entity {} moved from {} to {}", handle.id(), previous, phase);
        }
        if duplicate {
            tracing::warn!(
                "Entity {} registered twice; it ticks twice per pass until unregistered",
                handle.id()
            );
        }

        self.watch_end_of_life(world.as_ref(), handle);

        tracing::debug!(
            "Registered entity {} ({}) in {}",
            handle.id(),
            handle.type_key().name(),
            phase
        );
        RegisterOutcome::Registered
    }

    /// Checks eligibility, switches the entity's own ticking off and returns
    /// the phase it declares.
    fn take_over_ticking(handle: &EntityHandle) -> Result<Phase, Rejection> {
        let entity = handle.upgrade().ok_or(Rejection::EntityGone)?;
        let mut entity = entity.try_lock().ok_or(Rejection::EntityBusy)?;

        if !entity.tick_flags().is_eligible() {
            return Err(Rejection::TickingDisabled);
        }
        entity.set_tick_flags(TickFlags::DISABLED);
        Ok(entity.phase())
    }

    fn watch_end_of_life(self: &Arc<Self>, world: &dyn HostWorld, handle: &EntityHandle) {
        let target = Arc::downgrade(self);
        let member = handle.clone();
        let subscription = world.on_end_of_life(
            handle.id(),
            Box::new(move |_entity: EntityId, _reason: EndOfLifeReason| {
                if let Some(aggregator) = target.upgrade() {
                    aggregator.unregister_entity(&member);
                }
            }),
        );

        let Some(subscription) = subscription else {
            tracing::debug!(
                "Entity {} has no end-of-life event; unregister it explicitly",
                handle.id()
            );
            return;
        };

        let previous = self
            .state
            .lock()
            .end_of_life
            .insert(handle.id(), subscription);
        if let Some(previous) = previous {
            world.unsubscribe(previous);
        }
    }

    /// Removes an entity from its phase's batch.
    ///
    /// Safe for entities that were never registered. Returns `true` if the
    /// entity was a member.
    pub fn unregister_entity(&self, handle: &EntityHandle) -> bool {
        let (phase, removed, subscription) = {
            let mut state = self.state.lock();
            let Some(phase) = state.phases.remove(&handle.id()) else {
                return false;
            };
            let removed = state.table_mut(phase).remove(handle);
            (phase, removed, state.end_of_life.remove(&handle.id()))
        };

        if let Some(subscription) = subscription {
            if let Some(world) = self.attached_world() {
                world.unsubscribe(subscription);
            }
        }

        if removed > 0 {
            tracing::debug!("Unregistered entity {} from {}", handle.id(), phase);
        }
        removed > 0
    }

    /// Whether the entity is in a batch. Only the group for the entity's type
    /// under the phase it was registered in is searched.
    #[must_use]
    pub fn is_registered(&self, handle: &EntityHandle) -> bool {
        let state = self.state.lock();
        state
            .phases
            .get(&handle.id())
            .is_some_and(|&phase| state.table(phase).contains(handle))
    }

    /// The phase `handle` is batched under, if registered.
    #[must_use]
    pub fn registered_phase(&self, handle: &EntityHandle) -> Option<Phase> {
        self.state.lock().phases.get(&handle.id()).copied()
    }

    // ========================================================================
    // BATCHED DISPATCH
    // ========================================================================

    /// Runs one batched pass for `phase`.
    ///
    /// The pass ticks the members present when it began. Registrations and
    /// removals made during the pass take effect from the next pass.
    pub fn run_phase(&self, phase: Phase, delta_seconds: f32) {
        let _span = tracing::trace_span!("run_phase", phase = phase.as_str()).entered();

        let pass = self.state.lock().table(phase).compact();

        let mut dispatched = 0u64;
        let mut stale = Vec::new();
        for handle in &pass {
            let Some(entity) = handle.upgrade() else {
                tracing::trace!("Skipping dropped entity {}", handle.id());
                stale.push(handle);
                continue;
            };
            entity.lock().tick(delta_seconds);
            dispatched += 1;
        }

        let orphaned: Vec<SubscriptionId> = {
            let mut state = self.state.lock();
            let mut orphaned = Vec::new();
            for handle in &stale {
                state.table_mut(phase).remove(handle);
                state.phases.remove(&handle.id());
                orphaned.extend(state.end_of_life.remove(&handle.id()));
            }

            let stats = &mut state.stats[phase.index()];
            stats.passes += 1;
            stats.ticks_dispatched += dispatched;
            stats.last_pass_len = pass.len();
            stats.stale_skipped += stale.len() as u64;
            orphaned
        };

        if orphaned.is_empty() {
            return;
        }
        if let Some(world) = self.attached_world() {
            for subscription in orphaned {
                world.unsubscribe(subscription);
            }
        }
    }

    /// Runs all four phases in order. For hosts that drive frames directly.
    pub fn run_frame(&self, delta_seconds: f32) {
        for phase in Phase::ALL {
            self.run_phase(phase, delta_seconds);
        }
    }

    // ========================================================================
    // INSPECTION
    // ========================================================================

    /// Number of entries registered under `phase`.
    #[must_use]
    pub fn registered_count(&self, phase: Phase) -> usize {
        self.state.lock().table(phase).len()
    }

    /// Number of allocated groups under `phase`.
    #[must_use]
    pub fn group_count(&self, phase: Phase) -> usize {
        self.state.lock().table(phase).group_count()
    }

    /// The pass order `run_phase` would use right now.
    #[must_use]
    pub fn snapshot(&self, phase: Phase) -> Vec<EntityHandle> {
        self.state.lock().table(phase).compact()
    }

    /// Counters for `phase`.
    #[must_use]
    pub fn phase_stats(&self, phase: Phase) -> PhaseStats {
        self.state.lock().stats[phase.index()]
    }
}

impl Drop for TickAggregator {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for TickAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        let counts: Vec<usize> = state.tables.iter().map(GroupTable::len).collect();
        f.debug_struct("TickAggregator")
            .field("attached", &self.attachment.lock().is_some())
            .field("registered", &counts)
            .finish_non_exhaustive()
    }
}
