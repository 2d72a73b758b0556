//! Integration tests for batched dispatch: grouping, phase isolation and the
//! snapshot semantics of a pass.

mod common;

use std::sync::Arc;

use common::{handle_slot, Drone, Harness, Turret, FRAME_DT};
use parking_lot::Mutex;
use tick_aggregator::{AggregatorConfig, EndOfLifeReason, Phase, TickFlags};

#[test]
fn test_groups_are_contiguous_in_first_seen_order() {
    let h = Harness::new();
    h.add(Turret(h.body("a0", Phase::PrePhysics)));
    h.add(Drone(h.body("b0", Phase::PrePhysics)));
    h.add(Turret(h.body("a1", Phase::PrePhysics)));
    h.add(Drone(h.body("b1", Phase::PrePhysics)));
    h.add(Turret(h.body("a2", Phase::PrePhysics)));

    assert_eq!(h.aggregator.group_count(Phase::PrePhysics), 2);
    let order: Vec<_> = h
        .aggregator
        .snapshot(Phase::PrePhysics)
        .iter()
        .map(|handle| handle.id().index())
        .collect();
    assert_eq!(order, vec![0, 2, 4, 1, 3]);

    h.frame();
    assert_eq!(h.take_labels(), vec!["a0", "a1", "a2", "b0", "b1"]);
}

#[test]
fn test_every_member_ticks_once_per_frame_with_frame_delta() {
    let h = Harness::new();
    for _ in 0..3 {
        h.add(Turret(h.body("turret", Phase::DuringPhysics)));
    }

    for _ in 0..5 {
        h.frame();
        let records = h.take_records();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| (r.delta - FRAME_DT).abs() < f32::EPSILON));
    }
}

#[test]
fn test_phase_isolation() {
    let h = Harness::new();
    h.add(Turret(h.body("post", Phase::PostPhysics)));
    let scheduler = h.world.local_scheduler();

    for phase in [Phase::PrePhysics, Phase::DuringPhysics, Phase::PostUpdateWork] {
        scheduler.run_phase(phase, FRAME_DT);
        assert!(h.take_labels().is_empty(), "ticked during {phase}");
    }

    scheduler.run_phase(Phase::PostPhysics, FRAME_DT);
    let records = h.take_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].phase, Phase::PostPhysics);
}

#[test]
fn test_phases_run_in_frame_order() {
    let h = Harness::new();
    h.add(Turret(h.body("late", Phase::PostUpdateWork)));
    h.add(Turret(h.body("post", Phase::PostPhysics)));
    h.add(Turret(h.body("during", Phase::DuringPhysics)));
    h.add(Turret(h.body("pre", Phase::PrePhysics)));

    h.frame();
    let phases: Vec<Phase> = h.take_records().iter().map(|r| r.phase).collect();
    assert_eq!(phases, Phase::ALL.to_vec());
}

#[test]
fn test_registration_switches_self_tick_off() {
    let h = Harness::new();
    let handle = h.add(Turret(h.body("t", Phase::PrePhysics)));
    assert_eq!(h.flags_of(handle.id()), TickFlags::DISABLED);
}

#[test]
fn test_unregistered_entity_is_not_ticked_next_frame() {
    let h = Harness::new();
    let keep = h.add(Turret(h.body("keep", Phase::PrePhysics)));
    let gone = h.add(Turret(h.body("gone", Phase::PrePhysics)));

    assert!(h.aggregator.unregister_entity(&gone));
    h.frame();
    assert_eq!(h.take_labels(), vec!["keep"]);
    assert!(h.aggregator.is_registered(&keep));
    assert!(!h.aggregator.is_registered(&gone));
}

#[test]
fn test_unregister_unknown_entity_is_noop() {
    let h = Harness::new();
    h.add(Turret(h.body("t", Phase::PrePhysics)));
    let stranger = h.spawn(Drone(h.body("d", Phase::PrePhysics)));

    assert!(!h.aggregator.unregister_entity(&stranger));
    assert_eq!(h.aggregator.registered_count(Phase::PrePhysics), 1);
}

#[test]
fn test_unregister_twice_leaves_state_unchanged() {
    let h = Harness::new();
    h.add(Turret(h.body("keep", Phase::PrePhysics)));
    let gone = h.add(Turret(h.body("gone", Phase::PrePhysics)));

    assert!(h.aggregator.unregister_entity(&gone));
    let after_first = (
        h.aggregator.registered_count(Phase::PrePhysics),
        h.aggregator.group_count(Phase::PrePhysics),
        h.world.subscription_count(),
    );
    assert_eq!(after_first, (1, 1, 2));

    assert!(!h.aggregator.unregister_entity(&gone));
    assert_eq!(
        (
            h.aggregator.registered_count(Phase::PrePhysics),
            h.aggregator.group_count(Phase::PrePhysics),
            h.world.subscription_count(),
        ),
        after_first
    );

    h.frame();
    assert_eq!(h.take_labels(), vec!["keep"]);
}

#[test]
fn test_phase_is_read_when_registering() {
    let h = Harness::new();
    let turret = Arc::new(Mutex::new(Turret(h.body("t", Phase::PrePhysics))));
    let handle = h.world.spawn_shared(&turret);
    assert_eq!(handle.phase(), Phase::PrePhysics);

    turret.lock().0.phase = Phase::PostUpdateWork;
    assert!(h.aggregator.register_entity(&handle).is_registered());
    assert_eq!(
        h.aggregator.registered_phase(&handle),
        Some(Phase::PostUpdateWork)
    );
    assert!(h.aggregator.is_registered(&handle));
    assert_eq!(h.aggregator.registered_count(Phase::PrePhysics), 0);
    assert_eq!(h.aggregator.registered_count(Phase::PostUpdateWork), 1);

    h.aggregator.run_phase(Phase::PrePhysics, FRAME_DT);
    assert!(h.take_labels().is_empty());
    h.aggregator.run_phase(Phase::PostUpdateWork, FRAME_DT);
    assert_eq!(h.take_labels(), vec!["t"]);

    assert!(h.aggregator.unregister_entity(&handle));
    assert_eq!(h.aggregator.registered_count(Phase::PostUpdateWork), 0);
    assert_eq!(h.aggregator.registered_phase(&handle), None);
    assert_eq!(h.world.subscription_count(), 1);
    h.frame();
    assert!(h.take_labels().is_empty());
}

#[test]
fn test_registration_during_pass_takes_effect_next_frame() {
    let h = Harness::new();
    let late = h.spawn(Drone(h.body("late", Phase::PrePhysics)));

    let aggregator = Arc::downgrade(&h.aggregator);
    let mut pending = Some(late);
    h.add(Turret(h.body("host", Phase::PrePhysics).with_hook(move || {
        if let (Some(aggregator), Some(late)) = (aggregator.upgrade(), pending.take()) {
            aggregator.register_entity(&late);
        }
    })));

    h.frame();
    assert_eq!(h.take_labels(), vec!["host"]);
    h.frame();
    assert_eq!(h.take_labels(), vec!["host", "late"]);
}

#[test]
fn test_self_unregister_during_pass() {
    let h = Harness::new();
    let slot = handle_slot();
    let aggregator = Arc::downgrade(&h.aggregator);
    let own = Arc::clone(&slot);

    let handle = h.add(Turret(h.body("quitter", Phase::PrePhysics).with_hook(move || {
        if let (Some(aggregator), Some(me)) = (aggregator.upgrade(), own.get()) {
            aggregator.unregister_entity(me);
        }
    })));
    slot.set(handle).expect("slot empty");
    h.add(Turret(h.body("peer", Phase::PrePhysics)));

    h.frame();
    assert_eq!(h.take_labels(), vec!["quitter", "peer"]);
    h.frame();
    assert_eq!(h.take_labels(), vec!["peer"]);
}

#[test]
fn test_entity_destroyed_inside_its_tick() {
    let h = Harness::new();
    let slot = handle_slot();
    let world = Arc::downgrade(&h.world);
    let own = Arc::clone(&slot);

    let handle = h.add(Turret(h.body("doomed", Phase::PrePhysics).with_hook(move || {
        if let (Some(world), Some(me)) = (world.upgrade(), own.get()) {
            world.despawn(me.id(), EndOfLifeReason::Destroyed);
        }
    })));
    slot.set(handle.clone()).expect("slot empty");
    h.add(Turret(h.body("peer", Phase::PrePhysics)));

    h.frame();
    assert_eq!(h.take_labels(), vec!["doomed", "peer"]);
    assert!(!h.aggregator.is_registered(&handle));
    assert!(!h.world.is_live(handle.id()));

    h.frame();
    assert_eq!(h.take_labels(), vec!["peer"]);
}

#[test]
fn test_peer_removed_mid_pass_still_ticks_this_frame() {
    let h = Harness::new();
    let victim = h.spawn(Drone(h.body("victim", Phase::PrePhysics)));

    let aggregator = Arc::downgrade(&h.aggregator);
    let target = victim.clone();
    h.add(Turret(h.body("killer", Phase::PrePhysics).with_hook(move || {
        if let Some(aggregator) = aggregator.upgrade() {
            aggregator.unregister_entity(&target);
        }
    })));
    assert!(h.aggregator.register_entity(&victim).is_registered());

    h.frame();
    assert_eq!(h.take_labels(), vec!["killer", "victim"]);
    h.frame();
    assert_eq!(h.take_labels(), vec!["killer"]);
}

#[test]
fn test_deferred_despawn_unregisters_at_end_of_frame() {
    let h = Harness::new();
    let handle = h.add(Turret(h.body("t", Phase::PostPhysics)));

    h.world.despawn_deferred(handle.id(), EndOfLifeReason::LevelTransition);
    assert!(h.aggregator.is_registered(&handle));

    h.frame();
    assert_eq!(h.take_labels(), vec!["t"]);
    assert!(!h.aggregator.is_registered(&handle));

    h.frame();
    assert!(h.take_labels().is_empty());
}

#[test]
fn test_stale_handle_is_skipped_and_pruned() {
    let h = Harness::new();
    let dropped = h.add(Turret(h.body("dropped", Phase::PrePhysics)));
    h.add(Turret(h.body("live", Phase::PrePhysics)));

    // Dropped without an end-of-life event.
    assert!(h.world.forget(dropped.id()));
    assert!(!dropped.is_alive());
    assert_eq!(h.world.subscription_count(), 3);

    h.frame();
    assert_eq!(h.take_labels(), vec!["live"]);

    let stats = h.aggregator.phase_stats(Phase::PrePhysics);
    assert_eq!(stats.stale_skipped, 1);
    assert_eq!(stats.last_pass_len, 2);
    assert_eq!(h.aggregator.registered_count(Phase::PrePhysics), 1);
    assert!(!h.aggregator.is_registered(&dropped));
}

#[test]
fn test_pruning_stale_handle_cancels_its_end_of_life_subscription() {
    let h = Harness::new();
    let dropped = h.add(Drone(h.body("dropped", Phase::PostPhysics)));
    h.add(Drone(h.body("live", Phase::PostPhysics)));
    assert_eq!(h.world.subscription_count(), 3);

    h.world.forget(dropped.id());
    h.frame();
    assert_eq!(h.world.subscription_count(), 2);

    // Later frames find nothing left to prune.
    h.frame();
    assert_eq!(h.world.subscription_count(), 2);
    assert_eq!(h.aggregator.phase_stats(Phase::PostPhysics).stale_skipped, 1);
    assert_eq!(h.take_labels(), vec!["live", "live"]);
}

#[test]
fn test_phase_stats_accumulate() {
    let h = Harness::new();
    h.add(Turret(h.body("a", Phase::DuringPhysics)));
    h.add(Drone(h.body("b", Phase::DuringPhysics)));

    for _ in 0..3 {
        h.frame();
    }

    let stats = h.aggregator.phase_stats(Phase::DuringPhysics);
    assert_eq!(stats.passes, 3);
    assert_eq!(stats.ticks_dispatched, 6);
    assert_eq!(stats.last_pass_len, 2);
    assert_eq!(stats.stale_skipped, 0);

    // Empty phases still run a pass each frame.
    assert_eq!(h.aggregator.phase_stats(Phase::PrePhysics).passes, 3);
    assert_eq!(h.aggregator.phase_stats(Phase::PrePhysics).ticks_dispatched, 0);
}

#[test]
fn test_empty_group_kept_by_default() {
    let h = Harness::new();
    let only = h.add(Turret(h.body("t", Phase::PrePhysics)));

    h.aggregator.unregister_entity(&only);
    assert_eq!(h.aggregator.registered_count(Phase::PrePhysics), 0);
    assert_eq!(h.aggregator.group_count(Phase::PrePhysics), 1);

    h.frame();
    assert!(h.take_labels().is_empty());
}

#[test]
fn test_empty_group_reclaimed_when_configured() {
    let h = Harness::with_config(AggregatorConfig::default().with_reclaim_empty_groups(true));
    let turret = h.add(Turret(h.body("t", Phase::PrePhysics)));
    h.add(Drone(h.body("d", Phase::PrePhysics)));

    h.aggregator.unregister_entity(&turret);
    assert_eq!(h.aggregator.group_count(Phase::PrePhysics), 1);

    h.frame();
    assert_eq!(h.take_labels(), vec!["d"]);
}
