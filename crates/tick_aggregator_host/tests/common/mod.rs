//! Shared fixtures for the integration tests.
//!
//! Every test entity records its ticks into a shared [`TickLog`], so tests can
//! assert on exactly who ticked, in which phase and in what order.

#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tick_aggregator::{
    AggregatorConfig, EntityComponent, EntityHandle, EntityId, Phase, TickAggregated,
    TickAggregator, TickEntity, TickFlags,
};
use tick_aggregator_host::LocalWorld;

/// One recorded tick.
#[derive(Clone, Debug, PartialEq)]
pub struct TickRecord {
    pub label: &'static str,
    pub phase: Phase,
    pub delta: f32,
}

pub type TickLog = Arc<Mutex<Vec<TickRecord>>>;

/// Runs inside an entity's tick, after the tick is recorded.
pub type TickHook = Box<dyn FnMut() + Send>;

/// State shared by all test entity types.
pub struct Body {
    pub label: &'static str,
    pub phase: Phase,
    pub flags: TickFlags,
    log: TickLog,
    hook: Option<TickHook>,
}

impl Body {
    pub fn new(label: &'static str, phase: Phase, log: &TickLog) -> Self {
        Self {
            label,
            phase,
            flags: TickFlags::ENABLED,
            log: Arc::clone(log),
            hook: None,
        }
    }

    pub fn with_flags(mut self, flags: TickFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_hook(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    fn tick(&mut self, delta: f32) {
        self.log.lock().push(TickRecord {
            label: self.label,
            phase: self.phase,
            delta,
        });
        if let Some(hook) = self.hook.as_mut() {
            hook();
        }
    }
}

macro_rules! test_entity {
    ($name:ident, direct) => {
        test_entity!(@base $name);
        impl TickAggregated for $name {}
        impl TickEntity for $name {
            test_entity!(@common);
            fn tick_aggregated(&self) -> Option<&dyn TickAggregated> {
                Some(self)
            }
        }
    };
    ($name:ident, plain) => {
        test_entity!(@base $name);
        impl TickEntity for $name {
            test_entity!(@common);
        }
    };
    (@base $name:ident) => {
        pub struct $name(pub Body);
    };
    (@common) => {
        fn phase(&self) -> Phase {
            self.0.phase
        }
        fn tick_flags(&self) -> TickFlags {
            self.0.flags
        }
        fn set_tick_flags(&mut self, flags: TickFlags) {
            self.0.flags = flags;
        }
        fn tick(&mut self, delta_seconds: f32) {
            self.0.tick(delta_seconds);
        }
    };
}

test_entity!(Turret, direct);
test_entity!(Drone, direct);
test_entity!(Prop, plain);

/// Component that carries the batched-tick capability.
pub struct Aggregated;

impl TickAggregated for Aggregated {}

impl EntityComponent for Aggregated {
    fn tick_aggregated(&self) -> Option<&dyn TickAggregated> {
        Some(self)
    }
}

/// Component without the capability.
pub struct Inert;

impl EntityComponent for Inert {}

/// Opts in through its second component only.
pub struct Sentry {
    pub body: Body,
    components: Vec<Box<dyn EntityComponent>>,
}

impl Sentry {
    pub fn new(body: Body) -> Self {
        Self {
            body,
            components: vec![Box::new(Inert), Box::new(Aggregated)],
        }
    }
}

impl TickEntity for Sentry {
    fn phase(&self) -> Phase {
        self.body.phase
    }
    fn tick_flags(&self) -> TickFlags {
        self.body.flags
    }
    fn set_tick_flags(&mut self, flags: TickFlags) {
        self.body.flags = flags;
    }
    fn tick(&mut self, delta_seconds: f32) {
        self.body.tick(delta_seconds);
    }
    fn components(&self) -> &[Box<dyn EntityComponent>] {
        &self.components
    }
}

/// A world with an aggregator attached to it.
pub struct Harness {
    pub world: Arc<LocalWorld>,
    pub aggregator: Arc<TickAggregator>,
    pub log: TickLog,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(AggregatorConfig::default())
    }

    pub fn with_config(config: AggregatorConfig) -> Self {
        let world = LocalWorld::game(1);
        let aggregator = TickAggregator::new(config);
        aggregator
            .attach(&world.downgrade())
            .expect("attach to a game world");
        Self {
            world,
            aggregator,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn body(&self, label: &'static str, phase: Phase) -> Body {
        Body::new(label, phase, &self.log)
    }

    pub fn spawn<E: TickEntity + 'static>(&self, entity: E) -> EntityHandle {
        self.world.spawn(entity)
    }

    /// Spawns and registers.
    pub fn add<E: TickEntity + 'static>(&self, entity: E) -> EntityHandle {
        let handle = self.spawn(entity);
        assert!(self.aggregator.register_entity(&handle).is_registered());
        handle
    }

    pub fn frame(&self) {
        self.world.step(FRAME_DT);
    }

    /// Labels ticked since the last call, in order.
    pub fn take_labels(&self) -> Vec<&'static str> {
        self.log.lock().drain(..).map(|r| r.label).collect()
    }

    pub fn take_records(&self) -> Vec<TickRecord> {
        std::mem::take(&mut *self.log.lock())
    }

    pub fn flags_of(&self, id: EntityId) -> TickFlags {
        self.world
            .entity(id)
            .expect("entity is live")
            .lock()
            .tick_flags()
    }
}

pub const FRAME_DT: f32 = 1.0 / 60.0;

/// Lets a hook refer to the handle of the entity it is installed on.
pub type HandleSlot = Arc<OnceLock<EntityHandle>>;

pub fn handle_slot() -> HandleSlot {
    Arc::new(OnceLock::new())
}
