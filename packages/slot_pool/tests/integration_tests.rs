//! Integration tests exercising the public API of `slot_pool` across pools and the registry.
#![allow(
    missing_docs,
    reason = "No need for API documentation in test code"
)]
#![allow(
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]

use std::collections::HashSet;
use std::env;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use slot_pool::{
    Error, ExhaustionPolicy, GrowablePool, PoolBehavior, PoolRegistry, RawFixedPool,
    SlotCoordinates, map_field_to_index, map_index_to_field,
};

/// Set in the environment of a child test process that is expected to abort.
const ABORTING_CHILD: &str = "SLOT_POOL_ABORTING_CHILD";

#[test]
fn fixed_pool_of_four_rejects_fifth_add() {
    let registry = PoolRegistry::<u64>::new();

    let behavior = registry
        .create_behavior(PoolBehavior::builder("words").capacity(4).build())
        .unwrap();
    assert_eq!(registry.behavior(behavior).unwrap().element_size(), 8);

    let pool = registry
        .fixed_pool(registry.create_fixed_pool("words", behavior).unwrap())
        .unwrap();

    let pointers = (0..4)
        .map(|_| {
            let index = pool.add().unwrap();
            pool.get_ptr(index).unwrap()
        })
        .collect::<HashSet<_>>();

    assert_eq!(pointers.len(), 4);

    let error = pool.add().unwrap_err();
    assert!(matches!(error, Error::Full { capacity: 4, .. }));
    assert!(error.is_exhaustion());
}

#[test]
fn growable_pool_fills_tail_vacancy_before_reusing_freed_head_slot() {
    let pool = GrowablePool::<u64>::builder("pairs")
        .node_capacity(2)
        .build()
        .unwrap();

    let added = (0..5).map(|_| pool.add().unwrap()).collect::<Vec<_>>();
    assert_eq!(pool.node_count(), 3);
    assert_eq!(pool.len(), 5);

    let head_first = SlotCoordinates::new(0, 0);
    assert!(added.contains(&head_first));
    pool.remove(head_first).unwrap();

    // Allocation tries the tail node first, so the freed head slot is not reused by the very
    // next add as a head-first scan would do. It is reused by the add after that, once the
    // tail is full, and still before a fourth node is considered.
    let tail_fill = pool.add().unwrap();
    assert_eq!(tail_fill.node_index(), 2);

    let reused = pool.add().unwrap();
    assert_eq!(reused, head_first);
    assert_eq!(pool.node_count(), 3);
    assert_eq!(pool.len(), 6);
}

#[test]
fn fixed_population_tracks_live_count() {
    let behavior = Arc::new(PoolBehavior::<u32>::builder("churn").capacity(100).build());
    let mut pool = RawFixedPool::new("churn", behavior).unwrap();

    let mut live = Vec::new();

    for step in 0_usize..1000 {
        if step % 5 < 3 {
            if let Ok(index) = pool.add() {
                assert!(index < 100);
                live.push(index);
            }
        } else if !live.is_empty() {
            let index = live.swap_remove(step % live.len());
            pool.remove_index(index).unwrap();
        }

        assert_eq!(pool.len(), live.len());

        let mut visited = 0;
        pool.iterate(|_, _| visited += 1);
        assert_eq!(visited, live.len());
    }
}

#[test]
fn growable_pointers_resolve_to_one_node() {
    let mut pool = GrowablePool::<u64>::builder("resolved")
        .node_capacity(8)
        .build_raw()
        .unwrap();

    let added = (0..40).map(|_| pool.add().unwrap()).collect::<Vec<_>>();

    for coordinates in added {
        let ptr = pool.get_ptr(coordinates).unwrap();
        let resolved = pool.coordinates_of(ptr).unwrap();

        assert_eq!(resolved, coordinates);

        let (word, bit) = map_index_to_field(resolved.index_in_node());
        assert_eq!(map_field_to_index(word, bit), resolved.index_in_node());
    }
}

#[test]
fn growable_clear_retains_nodes_for_reuse() {
    let pool = GrowablePool::<u64>::builder("retained")
        .node_capacity(4)
        .build()
        .unwrap();

    for _ in 0..10 {
        pool.add().unwrap();
    }
    let nodes_before = pool.node_count();
    let capacity_before = pool.capacity();

    pool.clear().unwrap();

    assert_eq!(pool.len(), 0);
    assert_eq!(pool.node_count(), nodes_before);

    for _ in 0..capacity_before {
        pool.add().unwrap();
    }
    assert_eq!(pool.node_count(), nodes_before);

    pool.add().unwrap();
    assert_eq!(pool.node_count(), nodes_before + 1);
}

#[test]
fn behavior_callbacks_apply_to_every_pool() {
    let registry = PoolRegistry::<usize>::new();
    let initialized = Arc::new(AtomicUsize::new(0));
    let destroyed = Arc::new(Mutex::new(Vec::new()));

    let behavior = registry
        .create_behavior(
            PoolBehavior::builder("tracked")
                .capacity(3)
                .on_init({
                    let initialized = Arc::clone(&initialized);
                    move |index, value| {
                        initialized.fetch_add(1, Ordering::Relaxed);
                        *value = index + 1;
                    }
                })
                .on_destroy({
                    let destroyed = Arc::clone(&destroyed);
                    move |_, value| destroyed.lock().unwrap().push(*value)
                })
                .build(),
        )
        .unwrap();

    let handles = (0..2)
        .map(|index| {
            registry
                .create_fixed_pool(format!("tracked-{index}"), behavior)
                .unwrap()
        })
        .collect::<Vec<_>>();

    for handle in &handles {
        let pool = registry.fixed_pool(*handle).unwrap();
        pool.add().unwrap();
        pool.add().unwrap();
    }

    assert_eq!(initialized.load(Ordering::Relaxed), 4);

    for handle in handles {
        assert!(registry.destroy_fixed_pool(handle));
    }

    let mut destroyed = destroyed.lock().unwrap().clone();
    destroyed.sort_unstable();

    // Every destroyed value is an init-assigned `index + 1`, never a reset default.
    assert_eq!(destroyed.len(), 4);
    assert!(destroyed.iter().all(|value| *value >= 1));
}

#[test]
fn registry_survives_concurrent_pool_churn() {
    let registry = Arc::new(PoolRegistry::<u64>::builder().max_pools(8).build());
    let behavior = registry
        .create_behavior(PoolBehavior::builder("churn").capacity(16).build())
        .unwrap();

    let threads = (0..4)
        .map(|thread_index| {
            let registry = Arc::clone(&registry);

            thread::spawn(move || {
                for round in 0..25 {
                    let handle = registry
                        .create_fixed_pool(format!("churn-{thread_index}-{round}"), behavior)
                        .unwrap();

                    let pool = registry.fixed_pool(handle).unwrap();
                    for _ in 0..16 {
                        pool.add().unwrap();
                    }

                    assert!(registry.destroy_fixed_pool(handle));
                    assert!(registry.fixed_pool(handle).is_none());
                }
            })
        })
        .collect::<Vec<_>>();

    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(registry.fixed_pool_count(), 0);
}

#[test]
fn abort_policy_terminates_process_on_full_pool() {
    if env::var_os(ABORTING_CHILD).is_some() {
        let registry = PoolRegistry::<u64>::builder()
            .exhaustion_policy(ExhaustionPolicy::Abort)
            .build();

        let behavior = registry
            .create_behavior(PoolBehavior::builder("strict").capacity(1).build())
            .unwrap();
        let pool = registry
            .fixed_pool(registry.create_fixed_pool("strict", behavior).unwrap())
            .unwrap();

        pool.add().unwrap();

        // Reaching the line after this add means the policy did not terminate the process.
        drop(pool.add());
        return;
    }

    let status = Command::new(env::current_exe().unwrap())
        .args([
            "--exact",
            "abort_policy_terminates_process_on_full_pool",
            "--test-threads=1",
        ])
        .env(ABORTING_CHILD, "1")
        .status()
        .unwrap();

    assert!(!status.success());
}
