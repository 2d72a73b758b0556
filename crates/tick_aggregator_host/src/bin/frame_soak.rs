//! # Frame Soak
//!
//! Drives a populated world through many frames with the tick aggregator
//! attached and reports per-phase throughput:
//! - 6 entity types spread over all four phases
//! - every entity ends its life within 100 frames, from inside its own tick
//! - replacements spawn and register mid-run
//!
//! Usage: `frame_soak [entities] [frames]`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use tick_aggregator::{
    AggregatorConfig, EndOfLifeReason, EntityHandle, EntityId, Phase, TickAggregated,
    TickAggregator, TickEntity, TickFlags,
};
use tick_aggregator_host::LocalWorld;

const DEFAULT_ENTITIES: usize = 20_000;
const DEFAULT_FRAMES: u64 = 600;
const FRAME_DT: f32 = 1.0 / 60.0;

/// Ticks dispatched across every entity.
static TICKS: AtomicU64 = AtomicU64::new(0);

struct Mortal {
    phase: Phase,
    flags: TickFlags,
    lifetime: f32,
    world: Weak<LocalWorld>,
    id: EntityId,
}

impl TickAggregated for Mortal {}

impl TickEntity for Mortal {
    fn phase(&self) -> Phase {
        self.phase
    }
    fn tick_flags(&self) -> TickFlags {
        self.flags
    }
    fn set_tick_flags(&mut self, flags: TickFlags) {
        self.flags = flags;
    }
    fn tick(&mut self, delta_seconds: f32) {
        TICKS.fetch_add(1, Ordering::Relaxed);
        self.lifetime -= delta_seconds;
        if self.lifetime <= 0.0 {
            if let Some(world) = self.world.upgrade() {
                world.despawn_deferred(self.id, EndOfLifeReason::Destroyed);
            }
            self.lifetime = f32::MAX;
        }
    }
    fn tick_aggregated(&self) -> Option<&dyn TickAggregated> {
        Some(self)
    }
}

macro_rules! soak_type {
    ($name:ident) => {
        struct $name(Mortal);

        impl TickEntity for $name {
            fn phase(&self) -> Phase {
                self.0.phase()
            }
            fn tick_flags(&self) -> TickFlags {
                self.0.tick_flags()
            }
            fn set_tick_flags(&mut self, flags: TickFlags) {
                self.0.set_tick_flags(flags);
            }
            fn tick(&mut self, delta_seconds: f32) {
                self.0.tick(delta_seconds);
            }
            fn tick_aggregated(&self) -> Option<&dyn TickAggregated> {
                Some(&self.0)
            }
        }
    };
}

soak_type!(Turret);
soak_type!(Drone);
soak_type!(Door);
soak_type!(Beacon);
soak_type!(Light);
soak_type!(Spawner);

/// Spawns entity number `n` with a lifetime spread over ~100 frames.
fn spawn_one(world: &Arc<LocalWorld>, n: usize) -> EntityHandle {
    let phase = Phase::ALL[n % Phase::COUNT];
    #[allow(clippy::cast_precision_loss)]
    let lifetime = FRAME_DT * (1 + n % 100) as f32;
    let owner = Arc::downgrade(world);
    let mortal = move |id| Mortal {
        phase,
        flags: TickFlags::ENABLED,
        lifetime,
        world: owner,
        id,
    };

    match n % 6 {
        0 => world.spawn_with(|id| Turret(mortal(id))),
        1 => world.spawn_with(|id| Drone(mortal(id))),
        2 => world.spawn_with(|id| Door(mortal(id))),
        3 => world.spawn_with(|id| Beacon(mortal(id))),
        4 => world.spawn_with(|id| Light(mortal(id))),
        _ => world.spawn_with(|id| Spawner(mortal(id))),
    }
}

fn main() {
    let mut args = std::env::args().skip(1);
    let entity_count: usize = args
        .next()
        .and_then(|a| a.parse().ok())
        .unwrap_or(DEFAULT_ENTITIES);
    let frames: u64 = args
        .next()
        .and_then(|a| a.parse().ok())
        .unwrap_or(DEFAULT_FRAMES);

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║              TICK AGGREGATOR - FRAME SOAK                        ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();
    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!("│ Entities:           {entity_count}");
    println!("│ Frames:             {frames}");
    println!("│ Frame dt:           {FRAME_DT:.4} s");
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let world = LocalWorld::game(1);
    let mut spawned = 0usize;
    for _ in 0..entity_count {
        spawn_one(&world, spawned);
        spawned += 1;
    }

    let aggregator = TickAggregator::new(AggregatorConfig::default());
    if let Err(err) = aggregator.attach(&world.downgrade()) {
        eprintln!("attach failed: {err}");
        std::process::exit(1);
    }
    world.initialize_all();

    let start = Instant::now();
    let mut slowest_us = 0u128;
    for _ in 0..frames {
        let frame_start = Instant::now();
        world.step(FRAME_DT);

        // Keep the population steady: replace what died this frame.
        while world.entity_count() < entity_count {
            let handle = spawn_one(&world, spawned);
            spawned += 1;
            aggregator.register_entity(&handle);
        }
        slowest_us = slowest_us.max(frame_start.elapsed().as_micros());
    }
    let elapsed = start.elapsed();

    println!("┌─ PHASES ────────────────────────────────────────────────────────┐");
    for phase in Phase::ALL {
        let stats = aggregator.phase_stats(phase);
        println!(
            "│ {:<16} passes {:>6}  ticks {:>10}  groups {:>2}  stale {}",
            phase.as_str(),
            stats.passes,
            stats.ticks_dispatched,
            aggregator.group_count(phase),
            stats.stale_skipped
        );
    }
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let ticks = TICKS.load(Ordering::Relaxed);
    #[allow(clippy::cast_precision_loss)]
    let avg_frame_us = elapsed.as_micros() as f64 / frames.max(1) as f64;
    println!("┌─ TIMING ────────────────────────────────────────────────────────┐");
    println!("│ Real Time:          {:.3} s", elapsed.as_secs_f64());
    println!("│ Avg Frame:          {avg_frame_us:.1} μs");
    println!("│ Slowest Frame:      {slowest_us} μs");
    println!("│ Entity Ticks:       {ticks}");
    println!("│ Replacements:       {}", spawned - entity_count);
    println!("└──────────────────────────────────────────────────────────────────┘");

    aggregator.detach();
    if world.local_scheduler().bound_count() == 0 {
        println!("✓ Detached cleanly");
    } else {
        println!("✗ {} bindings left behind", world.local_scheduler().bound_count());
        std::process::exit(1);
    }
}
