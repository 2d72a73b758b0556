//! # Phase Tick Adapter
//!
//! Binds one phase of one aggregator to the host scheduler.
//!
//! The adapter never owns the aggregator. The callback handed to the host
//! holds a `Weak` reference, and the aggregator unbinds its adapters in
//! `detach`, so the host never calls into a torn-down aggregator.

use std::sync::Weak;

use crate::error::{BindError, BindResult};
use crate::host::{BindingId, FrameScheduler, HostWorld, PhaseCallback};
use crate::phase::Phase;

/// Diagnostic context reported to the host for every adapter.
pub const DIAGNOSTIC_CONTEXT: &str = "TickAggregator";

/// Handle to one phase's scheduler binding.
#[derive(Debug)]
pub struct PhaseTickAdapter {
    phase: Phase,
    binding: Option<BindingId>,
}

impl PhaseTickAdapter {
    /// Binds `callback` to `phase` on the world's active level.
    ///
    /// # Errors
    ///
    /// - [`BindError::WorldUnavailable`] if the world is gone
    /// - [`BindError::NoActiveLevel`] if no level is loaded
    /// - [`BindError::Rejected`] if the scheduler refuses the binding
    pub fn bind(
        phase: Phase,
        world: &Weak<dyn HostWorld>,
        callback: PhaseCallback,
    ) -> BindResult<Self> {
        let world = world.upgrade().ok_or(BindError::WorldUnavailable(phase))?;
        let level = world
            .active_level()
            .ok_or(BindError::NoActiveLevel(phase))?;

        let binding = world
            .scheduler()
            .bind(level, phase, Self::message_for(phase), callback)?;

        tracing::debug!("Bound {} adapter ({:?})", phase, binding);
        Ok(Self {
            phase,
            binding: Some(binding),
        })
    }

    /// Removes the binding from the host scheduler. Idempotent.
    ///
    /// Returns `true` if a live binding was removed.
    pub fn unbind(&mut self, scheduler: &dyn FrameScheduler) -> bool {
        let Some(binding) = self.binding.take() else {
            return false;
        };
        scheduler.unbind(binding)
    }

    /// Forgets the binding without contacting the host.
    ///
    /// Used when the world, and its scheduler, are already gone.
    pub fn forget(&mut self) {
        self.binding = None;
    }

    /// The bound phase.
    #[inline]
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the adapter still holds a binding.
    #[inline]
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// The host binding token, if bound.
    #[inline]
    #[must_use]
    pub const fn binding(&self) -> Option<BindingId> {
        self.binding
    }

    /// Human-readable binding name, e.g. `TickAggregator[PostPhysics]`.
    #[must_use]
    pub fn diagnostic_message(&self) -> String {
        Self::message_for(self.phase)
    }

    /// Diagnostic grouping shared by all adapters.
    #[must_use]
    pub const fn diagnostic_context(&self) -> &'static str {
        DIAGNOSTIC_CONTEXT
    }

    fn message_for(phase: Phase) -> String {
        format!("{DIAGNOSTIC_CONTEXT}[{phase}]")
    }
}
