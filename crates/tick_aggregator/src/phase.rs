//! # Execution Phases
//!
//! The four fixed points of a frame at which batched updates run.

use serde::{Deserialize, Serialize};

/// A fixed point in the frame's update sequence.
///
/// Phases execute in declaration order every frame:
///
/// ```text
/// PrePhysics -> DuringPhysics -> PostPhysics -> PostUpdateWork
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Before the physics simulation steps.
    PrePhysics,
    /// Concurrently with the physics simulation.
    DuringPhysics,
    /// After physics results are available.
    PostPhysics,
    /// After all other update work of the frame.
    PostUpdateWork,
}

impl Phase {
    /// Number of phases.
    pub const COUNT: usize = 4;

    /// All phases in execution order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::PrePhysics,
        Self::DuringPhysics,
        Self::PostPhysics,
        Self::PostUpdateWork,
    ];

    /// Dense index of this phase (0..4), usable for per-phase arrays.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::PrePhysics => 0,
            Self::DuringPhysics => 1,
            Self::PostPhysics => 2,
            Self::PostUpdateWork => 3,
        }
    }

    /// Returns the phase name as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PrePhysics => "PrePhysics",
            Self::DuringPhysics => "DuringPhysics",
            Self::PostPhysics => "PostPhysics",
            Self::PostUpdateWork => "PostUpdateWork",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
