//! # Host Interfaces
//!
//! Traits the host engine implements so the aggregator can plug into it
//! without owning any of it.
//!
//! ```text
//! Host implements:            Aggregator calls:
//! ┌──────────────────┐        ┌────────────────────────────────────┐
//! │ FrameScheduler   │ <───── │ bind / unbind one callback / phase │
//! │ HostWorld        │ <───── │ level, entity scan, lifecycle subs │
//! └──────────────────┘        └────────────────────────────────────┘
//! ```
//!
//! All callbacks are invoked on the host's update thread. A host must not hold
//! its own locks while invoking them: callbacks re-enter the aggregator, which
//! may call back into the host.

use serde::{Deserialize, Serialize};

use crate::entity::{EntityHandle, EntityId};
use crate::error::BindResult;
use crate::phase::Phase;

/// Identifies a host world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorldId(pub u64);

/// Identifies the level a phase callback is registered against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LevelId(pub u32);

/// Token for an active scheduler binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingId(pub u64);

/// Token for an active lifecycle subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

/// What a world is being used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorldKind {
    /// A shipping game world.
    Game,
    /// Play-in-editor world.
    Pie,
    /// The editor's own world.
    Editor,
    /// Editor preview viewport.
    EditorPreview,
    /// Game preview viewport.
    GamePreview,
    /// Loaded but not running.
    Inactive,
}

/// Why an entity's life ended. The aggregator ignores it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndOfLifeReason {
    /// Explicitly destroyed.
    Destroyed,
    /// Its level was unloaded.
    LevelTransition,
    /// Play-in-editor session ended.
    EndPlayInEditor,
    /// Removed from the world without being destroyed.
    RemovedFromWorld,
    /// The application is quitting.
    Quit,
}

/// Per-phase frame callback. Receives the frame's delta time in seconds.
pub type PhaseCallback = Box<dyn FnMut(f32) + Send>;

/// Fired once all entities of a world have finished initializing.
pub type InitializedCallback = Box<dyn FnMut(&dyn HostWorld) + Send>;

/// Fired at most once when an entity's life ends.
pub type EndOfLifeCallback = Box<dyn FnOnce(EntityId, EndOfLifeReason) + Send>;

/// The host's frame scheduler.
///
/// The host invokes every bound callback once per frame, on the update thread,
/// in [`Phase::ALL`] order, until the binding is removed.
pub trait FrameScheduler: Send + Sync {
    /// Binds `callback` to run at `phase` for `level`.
    ///
    /// `diagnostic` names the binding in host tooling.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BindError::Rejected`] if the host refuses the binding.
    fn bind(
        &self,
        level: LevelId,
        phase: Phase,
        diagnostic: String,
        callback: PhaseCallback,
    ) -> BindResult<BindingId>;

    /// Removes a binding and drops its callback. Returns `false` if unknown.
    fn unbind(&self, binding: BindingId) -> bool;

    /// Whether `binding` is still live. Bindings end on `unbind` or when the
    /// host tears down the level they were made for.
    fn is_bound(&self, binding: BindingId) -> bool;
}

/// A host world: its scheduler, entities and lifecycle events.
pub trait HostWorld: Send + Sync {
    /// Stable identity of this world.
    fn id(&self) -> WorldId;

    /// What the world is used for.
    fn kind(&self) -> WorldKind;

    /// The level callbacks are registered against, if one is loaded.
    fn active_level(&self) -> Option<LevelId>;

    /// The world's frame scheduler.
    fn scheduler(&self) -> &dyn FrameScheduler;

    /// Handles to every live entity.
    fn live_entities(&self) -> Vec<EntityHandle>;

    /// Subscribes to the world-scoped "all entities initialized" event.
    fn on_entities_initialized(&self, callback: InitializedCallback) -> SubscriptionId;

    /// Subscribes to one entity's end-of-life event.
    ///
    /// Returns `None` if the entity is not live in this world.
    fn on_end_of_life(&self, entity: EntityId, callback: EndOfLifeCallback)
        -> Option<SubscriptionId>;

    /// Cancels a subscription. Returns `false` if it already fired or is unknown.
    fn unsubscribe(&self, subscription: SubscriptionId) -> bool;
}
