//! Races between starts, consumers and overlapping sweeps.
//!
//! All tests drive the in-memory backend from scoped threads; the storage
//! contracts (atomic insert, atomic decrement, claim-by-delete) must hold
//! no matter how the threads interleave.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use hearthtile_logic::availability::try_consume;
use hearthtile_logic::catalog::{Catalog, ItemQty, ResourceDef, ResourceKind};
use hearthtile_logic::config::EngineConfig;
use hearthtile_logic::events::NullBus;
use hearthtile_logic::inventory::{self, InventoryStore};
use hearthtile_logic::ledger::{start_action, ActionLedger};
use hearthtile_logic::memory::MemoryStore;
use hearthtile_logic::quest::NoQuests;
use hearthtile_logic::resolution::Sweeper;

const WORLD_CATALOG: &str = include_str!("../../../data/catalog.json");

// ── Helpers ────────────────────────────────────────────────────────────

fn vein(amount: u32) -> ResourceDef {
    ResourceDef {
        id: "resource_vein".into(),
        name: "Vein".into(),
        kind: ResourceKind::Resource,
        verb: "mine".into(),
        collection_time: 1.0,
        reward_items: vec![ItemQty {
            item_id: "item_ore".into(),
            qty: 1,
        }],
        required_items: vec![],
        limitless: false,
        amount,
        respawn_time: None,
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[test]
fn concurrent_starts_leave_one_record() {
    let catalog = Catalog::from_json(WORLD_CATALOG).unwrap();
    let store = MemoryStore::with_placements(&catalog);
    store.place_player(1, 0, 0).unwrap();
    let started = AtomicUsize::new(0);

    thread::scope(|s| {
        for t in 0..8u64 {
            let (store, catalog, started) = (&store, &catalog, &started);
            s.spawn(move || {
                let outcome = start_action(store, catalog, 1, "resource_wood", t).unwrap();
                if outcome.started() {
                    started.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(store.action_count(), 1);
}

#[test]
fn concurrent_consumers_never_overdraw() {
    let store = MemoryStore::new();
    let def = vein(5);
    let successes = AtomicUsize::new(0);

    thread::scope(|s| {
        for t in 0..16u64 {
            let (store, def, successes) = (&store, &def, &successes);
            s.spawn(move || {
                if try_consume(store, 2, 2, def, t).unwrap() {
                    successes.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(successes.load(Ordering::SeqCst), 5);
    assert!(!try_consume(&store, 2, 2, &def, 100).unwrap());
}

#[test]
fn overlapping_sweeps_grant_each_reward_once() {
    let catalog = Catalog::from_json(WORLD_CATALOG).unwrap();
    let store = MemoryStore::with_placements(&catalog);
    let config = EngineConfig::default();
    let players: Vec<u64> = (1..=40).collect();
    for &p in &players {
        store.place_player(p, (p % 2) as i32, 0).unwrap();
        assert!(start_action(&store, &catalog, p, "resource_wood", 0).unwrap().started());
    }

    let successes = AtomicUsize::new(0);
    thread::scope(|s| {
        for _ in 0..4 {
            let (store, catalog, config, successes) = (&store, &catalog, &config, &successes);
            s.spawn(move || {
                let report = Sweeper::new(store, &NullBus, &NoQuests, catalog, config)
                    .sweep(5_000)
                    .unwrap();
                successes.fetch_add(report.successes(), Ordering::SeqCst);
            });
        }
    });

    assert_eq!(successes.load(Ordering::SeqCst), players.len());
    assert_eq!(store.action_count(), 0);
    for &p in &players {
        assert_eq!(inventory::count(&store.stacks(p).unwrap(), "item_wood"), 2);
        assert!(store.in_progress(p).unwrap().is_none());
    }
}

#[test]
fn concurrent_grants_to_one_player_are_serialized() {
    let catalog = Catalog::from_json(WORLD_CATALOG).unwrap();
    let store = MemoryStore::new();
    let config = EngineConfig::default();

    thread::scope(|s| {
        for _ in 0..10 {
            let (store, catalog, config) = (&store, &catalog, &config);
            s.spawn(move || {
                for _ in 0..10 {
                    inventory::add(store, catalog, config, 7, "item_stone", 1).unwrap();
                }
            });
        }
    });

    let stacks = store.stacks(7).unwrap();
    assert_eq!(inventory::count(&stacks, "item_stone"), 100);
    // max_stack 50: two full stacks, no stray partials.
    assert_eq!(stacks.len(), 2);
}
