//! # Entity Contract
//!
//! Entities are owned by the host. The aggregator never constructs or
//! destroys one; it only holds [`EntityHandle`]s, which are:
//! - A stable [`EntityId`] used for equality
//! - The [`GroupKey`] computed once when the handle is made
//! - A `Weak` reference to the host-owned entity

use std::any::TypeId;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::capability::TickAggregated;
use crate::phase::Phase;

/// Unique identifier for an entity.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Slot index in the host's entity storage
/// - Upper 32 bits: Generation counter for detecting stale references
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Null/invalid entity ID.
    pub const NULL: Self = Self(u64::MAX);

    /// Creates a new entity ID from index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the index portion of the entity ID.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Checks if this entity ID is null/invalid.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

/// Identifier of an entity's concrete type - the batching key.
///
/// Equality and hashing use the [`TypeId`] only; the name is carried for
/// diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Returns the key for type `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The underlying [`TypeId`].
    #[inline]
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// The `(type, phase)` pair a group is keyed by. Immutable once created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupKey {
    /// Concrete entity type.
    pub type_key: TypeKey,
    /// Declared execution phase.
    pub phase: Phase,
}

impl GroupKey {
    /// Creates a group key.
    #[inline]
    #[must_use]
    pub const fn new(type_key: TypeKey, phase: Phase) -> Self {
        Self { type_key, phase }
    }
}

/// An entity's own per-entity ticking switches.
///
/// Registration reads these and then clears all three; nothing in this crate
/// sets them back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickFlags {
    /// The entity may tick at all.
    pub can_ever_tick: bool,
    /// The entity's own tick starts enabled.
    pub start_with_tick_enabled: bool,
    /// The entity's own tick is currently enabled with the host scheduler.
    pub tick_enabled: bool,
}

impl TickFlags {
    /// Self-ticking fully on.
    pub const ENABLED: Self = Self {
        can_ever_tick: true,
        start_with_tick_enabled: true,
        tick_enabled: true,
    };

    /// Self-ticking fully off.
    pub const DISABLED: Self = Self {
        can_ever_tick: false,
        start_with_tick_enabled: false,
        tick_enabled: false,
    };

    /// Whether an entity with these flags is a candidate for aggregation.
    #[inline]
    #[must_use]
    pub const fn is_eligible(self) -> bool {
        self.can_ever_tick && self.start_with_tick_enabled
    }
}

impl Default for TickFlags {
    fn default() -> Self {
        Self::ENABLED
    }
}

/// A sub-component owned by an entity.
///
/// Only used to probe for the aggregation capability.
pub trait EntityComponent: Send {
    /// Returns the aggregation marker if this component opts its owner in.
    fn tick_aggregated(&self) -> Option<&dyn TickAggregated> {
        None
    }
}

/// A live, host-owned simulation object that receives per-frame updates.
pub trait TickEntity: Send {
    /// The phase this entity declares for its updates.
    ///
    /// Read once when an [`EntityHandle`] is made for the entity.
    fn phase(&self) -> Phase;

    /// Current self-tick switches.
    fn tick_flags(&self) -> TickFlags;

    /// Overwrites the self-tick switches.
    fn set_tick_flags(&mut self, flags: TickFlags);

    /// The entity's own update.
    fn tick(&mut self, delta_seconds: f32);

    /// Returns the aggregation marker if the entity itself opts in.
    fn tick_aggregated(&self) -> Option<&dyn TickAggregated> {
        None
    }

    /// Sub-components of this entity.
    fn components(&self) -> &[Box<dyn EntityComponent>] {
        &[]
    }
}

/// How the host shares an entity with the aggregator.
pub type SharedEntity = Arc<Mutex<dyn TickEntity>>;

/// Non-owning reference to a host entity.
///
/// Two handles are equal when their [`EntityId`]s are equal.
#[derive(Clone)]
pub struct EntityHandle {
    id: EntityId,
    key: GroupKey,
    entity: Weak<Mutex<dyn TickEntity>>,
}

impl EntityHandle {
    /// Makes a handle for a host entity of concrete type `E`.
    ///
    /// Locks the entity once to read its declared phase.
    #[must_use]
    pub fn new<E: TickEntity + 'static>(id: EntityId, entity: &Arc<Mutex<E>>) -> Self {
        let phase = entity.lock().phase();
        let shared: SharedEntity = entity.clone();
        Self {
            id,
            key: GroupKey::new(TypeKey::of::<E>(), phase),
            entity: Arc::downgrade(&shared),
        }
    }

    /// The entity's ID.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// The `(type, phase)` key of the group this entity batches into.
    #[inline]
    #[must_use]
    pub const fn key(&self) -> GroupKey {
        self.key
    }

    /// The entity's concrete type.
    #[inline]
    #[must_use]
    pub const fn type_key(&self) -> TypeKey {
        self.key.type_key
    }

    /// The phase the entity declared when this handle was made.
    #[inline]
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.key.phase
    }

    /// The same handle keyed under `phase`.
    #[inline]
    #[must_use]
    pub fn with_phase(&self, phase: Phase) -> Self {
        Self {
            key: GroupKey::new(self.key.type_key, phase),
            ..self.clone()
        }
    }

    /// Upgrades to a strong reference if the host still owns the entity.
    #[must_use]
    pub fn upgrade(&self) -> Option<SharedEntity> {
        self.entity.upgrade()
    }

    /// Whether the host still owns the entity.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.entity.strong_count() > 0
    }
}

impl PartialEq for EntityHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EntityHandle {}

impl Hash for EntityHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityHandle")
            .field("id", &self.id)
            .field("type", &self.key.type_key.name())
            .field("phase", &self.key.phase)
            .field("alive", &self.is_alive())
            .finish()
    }
}
