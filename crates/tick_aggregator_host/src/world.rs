//! # Local World
//!
//! In-process [`HostWorld`]. Owns the entities (the aggregator only ever sees
//! `Weak` handles), raises lifecycle events and drives frames through its
//! [`LocalScheduler`].
//!
//! ```text
//! spawn() ──> entities ── initialize_all() ──> "entities initialized"
//!                │
//!                ├── despawn()          ──> end of life, immediately
//!                ├── despawn_deferred() ──> queue ── step() ──> end of life
//!                └── forget()           ──> dropped, no event (stale handles)
//! ```
//!
//! Events are fired with no world lock held, so subscribers may call back into
//! the world.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tick_aggregator::{
    EndOfLifeCallback, EndOfLifeReason, EntityHandle, EntityId, FrameScheduler, HostWorld,
    InitializedCallback, LevelId, SharedEntity, SubscriptionId, TickEntity, WorldId, WorldKind,
};

use crate::scheduler::LocalScheduler;

struct Live {
    handle: EntityHandle,
    owner: SharedEntity,
}

/// A world with one level, one scheduler and a flat entity store.
pub struct LocalWorld {
    id: WorldId,
    kind: WorldKind,
    level: Mutex<Option<LevelId>>,
    scheduler: LocalScheduler,
    entities: Mutex<BTreeMap<EntityId, Live>>,
    next_index: AtomicU32,
    initialized: Mutex<BTreeMap<SubscriptionId, Arc<Mutex<InitializedCallback>>>>,
    end_of_life: Mutex<HashMap<SubscriptionId, (EntityId, EndOfLifeCallback)>>,
    next_subscription: AtomicU64,
    pending_tx: Sender<(EntityId, EndOfLifeReason)>,
    pending_rx: Receiver<(EntityId, EndOfLifeReason)>,
}

impl LocalWorld {
    /// Creates a world with level 0 active.
    #[must_use]
    pub fn new(id: u64, kind: WorldKind) -> Arc<Self> {
        let (pending_tx, pending_rx) = crossbeam_channel::unbounded();
        Arc::new(Self {
            id: WorldId(id),
            kind,
            level: Mutex::new(Some(LevelId(0))),
            scheduler: LocalScheduler::new(),
            entities: Mutex::new(BTreeMap::new()),
            next_index: AtomicU32::new(0),
            initialized: Mutex::new(BTreeMap::new()),
            end_of_life: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
            pending_tx,
            pending_rx,
        })
    }

    /// Shorthand for a [`WorldKind::Game`] world.
    #[must_use]
    pub fn game(id: u64) -> Arc<Self> {
        Self::new(id, WorldKind::Game)
    }

    /// The reference the aggregator attaches with.
    #[must_use]
    pub fn downgrade(self: &Arc<Self>) -> Weak<dyn HostWorld> {
        let weak: Weak<Self> = Arc::downgrade(self);
        weak
    }

    /// The concrete scheduler.
    #[must_use]
    pub const fn local_scheduler(&self) -> &LocalScheduler {
        &self.scheduler
    }

    // ========================================================================
    // LEVELS
    // ========================================================================

    /// Makes `level` the active level.
    pub fn load_level(&self, level: LevelId) {
        *self.level.lock() = Some(level);
    }

    /// Unloads the active level and drops every binding made against it.
    pub fn unload_level(&self) {
        if let Some(level) = self.level.lock().take() {
            let dropped = self.scheduler.drop_level(level);
            tracing::debug!("Unloaded {:?}, dropped {} bindings", level, dropped);
        }
    }

    // ========================================================================
    // ENTITIES
    // ========================================================================

    /// Takes ownership of `entity` and returns its handle.
    pub fn spawn<E: TickEntity + 'static>(&self, entity: E) -> EntityHandle {
        self.spawn_shared(&Arc::new(Mutex::new(entity)))
    }

    /// Adds an entity the caller keeps a reference to.
    pub fn spawn_shared<E: TickEntity + 'static>(
        &self,
        entity: &Arc<Mutex<E>>,
    ) -> EntityHandle {
        self.insert(self.allocate_id(), entity)
    }

    /// Spawns an entity that needs to know its own id.
    pub fn spawn_with<E, F>(&self, build: F) -> EntityHandle
    where
        E: TickEntity + 'static,
        F: FnOnce(EntityId) -> E,
    {
        let id = self.allocate_id();
        self.insert(id, &Arc::new(Mutex::new(build(id))))
    }

    fn allocate_id(&self) -> EntityId {
        EntityId::new(self.next_index.fetch_add(1, Ordering::Relaxed), 0)
    }

    fn insert<E: TickEntity + 'static>(
        &self,
        id: EntityId,
        entity: &Arc<Mutex<E>>,
    ) -> EntityHandle {
        let handle = EntityHandle::new(id, entity);
        let owner: SharedEntity = entity.clone();

        self.entities.lock().insert(
            id,
            Live {
                handle: handle.clone(),
                owner,
            },
        );
        tracing::debug!("Spawned {} ({})", id, handle.type_key().name());
        handle
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.lock().len()
    }

    /// Whether `id` is live.
    #[must_use]
    pub fn is_live(&self, id: EntityId) -> bool {
        self.entities.lock().contains_key(&id)
    }

    /// Ends an entity's life now: end-of-life subscribers run, then the world
    /// releases the entity. Returns `false` if it was not live.
    pub fn despawn(&self, id: EntityId, reason: EndOfLifeReason) -> bool {
        let Some(live) = self.entities.lock().remove(&id) else {
            return false;
        };

        let due: Vec<EndOfLifeCallback> = {
            let mut subscriptions = self.end_of_life.lock();
            let ids: Vec<SubscriptionId> = subscriptions
                .iter()
                .filter(|(_, (entity, _))| *entity == id)
                .map(|(sub, _)| *sub)
                .collect();
            ids.into_iter()
                .filter_map(|sub| subscriptions.remove(&sub))
                .map(|(_, callback)| callback)
                .collect()
        };

        for callback in due {
            callback(id, reason);
        }

        tracing::debug!("Despawned {} ({:?})", id, reason);
        drop(live);
        true
    }

    /// Queues an end of life for the next [`Self::flush_pending_despawns`].
    /// Safe to call from inside an entity's tick.
    pub fn despawn_deferred(&self, id: EntityId, reason: EndOfLifeReason) {
        // The receiver lives as long as the world.
        let _ = self.pending_tx.send((id, reason));
    }

    /// Processes queued despawns. Returns the number that ended a life.
    pub fn flush_pending_despawns(&self) -> usize {
        let queued: Vec<(EntityId, EndOfLifeReason)> = self.pending_rx.try_iter().collect();
        queued
            .into_iter()
            .filter(|&(id, reason)| self.despawn(id, reason))
            .count()
    }

    /// Drops an entity without raising its end of life. Handles to it go stale.
    ///
    /// End-of-life subscriptions made for it stay until their owner cancels
    /// them.
    pub fn forget(&self, id: EntityId) -> bool {
        self.entities.lock().remove(&id).is_some()
    }

    /// Shared reference to a live entity.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<SharedEntity> {
        self.entities.lock().get(&id).map(|live| Arc::clone(&live.owner))
    }

    // ========================================================================
    // FRAMES & EVENTS
    // ========================================================================

    /// Raises "all entities initialized". Returns the number of subscribers.
    pub fn initialize_all(&self) -> usize {
        let subscribers: Vec<Arc<Mutex<InitializedCallback>>> =
            self.initialized.lock().values().cloned().collect();

        let world: &dyn HostWorld = self;
        for callback in &subscribers {
            let mut callback = callback.lock();
            (*callback)(world);
        }
        subscribers.len()
    }

    /// Runs one frame, then processes despawns queued during it.
    /// Returns the number of phase callbacks invoked.
    pub fn step(&self, delta_seconds: f32) -> usize {
        let invoked = self.scheduler.run_frame(delta_seconds);
        self.flush_pending_despawns();
        invoked
    }

    /// Number of pending lifecycle subscriptions of either kind.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.initialized.lock().len() + self.end_of_life.lock().len()
    }

    fn next_subscription(&self) -> SubscriptionId {
        SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed))
    }
}

impl HostWorld for LocalWorld {
    fn id(&self) -> WorldId {
        self.id
    }

    fn kind(&self) -> WorldKind {
        self.kind
    }

    fn active_level(&self) -> Option<LevelId> {
        *self.level.lock()
    }

    fn scheduler(&self) -> &dyn FrameScheduler {
        &self.scheduler
    }

    fn live_entities(&self) -> Vec<EntityHandle> {
        self.entities
            .lock()
            .values()
            .map(|live| live.handle.clone())
            .collect()
    }

    fn on_entities_initialized(&self, callback: InitializedCallback) -> SubscriptionId {
        let id = self.next_subscription();
        self.initialized
            .lock()
            .insert(id, Arc::new(Mutex::new(callback)));
        id
    }

    fn on_end_of_life(
        &self,
        entity: EntityId,
        callback: EndOfLifeCallback,
    ) -> Option<SubscriptionId> {
        if !self.is_live(entity) {
            return None;
        }
        let id = self.next_subscription();
        self.end_of_life.lock().insert(id, (entity, callback));
        Some(id)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        self.initialized.lock().remove(&subscription).is_some()
            || self.end_of_life.lock().remove(&subscription).is_some()
    }
}

impl std::fmt::Debug for LocalWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWorld")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("entities", &self.entity_count())
            .finish_non_exhaustive()
    }
}
