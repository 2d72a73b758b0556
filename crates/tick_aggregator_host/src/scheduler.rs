//! # Local Frame Scheduler
//!
//! In-process [`FrameScheduler`]: phase callbacks in a table keyed by binding
//! id, invoked once per phase per frame in bind order.
//!
//! Callbacks run with no scheduler lock held, so a callback may bind or unbind
//! (including itself) while the frame is running. A binding removed mid-phase
//! is not invoked again, even later in the same phase.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tick_aggregator::{
    BindError, BindResult, BindingId, FrameScheduler, LevelId, Phase, PhaseCallback,
};

struct Binding {
    level: LevelId,
    phase: Phase,
    diagnostic: String,
    callback: Arc<Mutex<PhaseCallback>>,
}

/// Frame scheduler for a [`crate::LocalWorld`].
pub struct LocalScheduler {
    bindings: Mutex<BTreeMap<BindingId, Binding>>,
    refused: Mutex<Vec<Phase>>,
    next_binding: AtomicU64,
    frames: AtomicU64,
}

impl LocalScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: Mutex::new(BTreeMap::new()),
            refused: Mutex::new(Vec::new()),
            next_binding: AtomicU64::new(1),
            frames: AtomicU64::new(0),
        }
    }

    /// Makes every later `bind` for `phase` fail.
    pub fn refuse_phase(&self, phase: Phase) {
        self.refused.lock().push(phase);
    }

    /// Accepts all phases again.
    pub fn accept_all(&self) {
        self.refused.lock().clear();
    }

    /// Invokes every callback bound to `phase`. Returns the number invoked.
    pub fn run_phase(&self, phase: Phase, delta_seconds: f32) -> usize {
        let due: Vec<(BindingId, Arc<Mutex<PhaseCallback>>)> = self
            .bindings
            .lock()
            .iter()
            .filter(|(_, binding)| binding.phase == phase)
            .map(|(id, binding)| (*id, Arc::clone(&binding.callback)))
            .collect();

        let mut invoked = 0;
        for (id, callback) in due {
            if !self.bindings.lock().contains_key(&id) {
                continue;
            }
            let mut callback = callback.lock();
            (*callback)(delta_seconds);
            invoked += 1;
        }
        invoked
    }

    /// Runs all phases in order. Returns the number of callbacks invoked.
    pub fn run_frame(&self, delta_seconds: f32) -> usize {
        let invoked = Phase::ALL
            .into_iter()
            .map(|phase| self.run_phase(phase, delta_seconds))
            .sum();
        self.frames.fetch_add(1, Ordering::Relaxed);
        invoked
    }

    /// Removes every binding registered against `level`.
    pub fn drop_level(&self, level: LevelId) -> usize {
        let mut bindings = self.bindings.lock();
        let before = bindings.len();
        bindings.retain(|_, binding| binding.level != level);
        before - bindings.len()
    }

    /// Number of live bindings.
    #[must_use]
    pub fn bound_count(&self) -> usize {
        self.bindings.lock().len()
    }

    /// Phases of the live bindings, in bind order.
    #[must_use]
    pub fn bound_phases(&self) -> Vec<Phase> {
        self.bindings.lock().values().map(|b| b.phase).collect()
    }

    /// Diagnostic names of the live bindings, in bind order.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<String> {
        self.bindings
            .lock()
            .values()
            .map(|b| b.diagnostic.clone())
            .collect()
    }

    /// Frames run so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl Default for LocalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler for LocalScheduler {
    fn bind(
        &self,
        level: LevelId,
        phase: Phase,
        diagnostic: String,
        callback: PhaseCallback,
    ) -> BindResult<BindingId> {
        if self.refused.lock().contains(&phase) {
            return Err(BindError::Rejected {
                phase,
                reason: format!("{phase} is closed on this scheduler"),
            });
        }

        let id = BindingId(self.next_binding.fetch_add(1, Ordering::Relaxed));
        tracing::trace!("Binding {:?} '{}' to {} on {:?}", id, diagnostic, phase, level);
        self.bindings.lock().insert(
            id,
            Binding {
                level,
                phase,
                diagnostic,
                callback: Arc::new(Mutex::new(callback)),
            },
        );
        Ok(id)
    }

    fn unbind(&self, binding: BindingId) -> bool {
        self.bindings.lock().remove(&binding).is_some()
    }

    fn is_bound(&self, binding: BindingId) -> bool {
        self.bindings.lock().contains_key(&binding)
    }
}

impl std::fmt::Debug for LocalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalScheduler")
            .field("bound", &self.bound_count())
            .field("frames", &self.frames())
            .finish_non_exhaustive()
    }
}
