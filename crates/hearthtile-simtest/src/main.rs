//! Hearthtile Headless Simulation Harness
//!
//! Validates the action engine and catalog data without SpacetimeDB.
//! Runs entirely in-process against the in-memory backend.
//!
//! Usage:
//!   cargo run -p hearthtile-simtest
//!   cargo run -p hearthtile-simtest -- --verbose
//!   cargo run -p hearthtile-simtest -- --seed 7 --config engine.json

use std::collections::HashMap;

use hearthtile_logic::availability::ResourceTracker;
use hearthtile_logic::catalog::Catalog;
use hearthtile_logic::config::EngineConfig;
use hearthtile_logic::events::{ChannelBus, GameEvent, MessageLog, NullBus, Severity, Topic};
use hearthtile_logic::inventory::{self, InventoryStore};
use hearthtile_logic::ledger::{self, ActionLedger, StartOutcome, StartRejection};
use hearthtile_logic::memory::MemoryStore;
use hearthtile_logic::quest::{CompletionTally, NoQuests};
use hearthtile_logic::resolution::{Resolution, Sweeper};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

// ── Catalog (same JSON the server embeds) ───────────────────────────────
const CATALOG_JSON: &str = include_str!("../../../data/catalog.json");

/// Loose view of the catalog file, parsed independently of the engine types.
#[derive(Debug, Deserialize)]
struct RawCatalog {
    items: Vec<serde_json::Value>,
    resources: Vec<RawResource>,
    #[serde(default)]
    placements: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawResource {
    id: String,
    collection_time: f64,
    #[serde(default)]
    limitless: bool,
    #[serde(default)]
    amount: u32,
}

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn check(name: &str, passed: bool, detail: String) -> TestResult {
    TestResult {
        name: name.into(),
        passed,
        detail,
    }
}

fn arg_value(name: &str) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1).cloned())
}

fn main() {
    let verbose = std::env::args().any(|a| a == "--verbose");
    let seed: u64 = arg_value("--seed").and_then(|s| s.parse().ok()).unwrap_or(42);
    let config = match arg_value("--config") {
        Some(path) => match std::fs::read_to_string(&path).map_err(|e| e.to_string()).and_then(|s| {
            EngineConfig::from_json(&s).map_err(|e| e.to_string())
        }) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path, e);
                std::process::exit(2);
            }
        },
        None => EngineConfig::default(),
    };
    println!("=== Hearthtile Simulation Harness ===\n");

    let catalog = match Catalog::from_json(CATALOG_JSON) {
        Ok(c) => c,
        Err(e) => {
            println!("  ✗ catalog_load: {}", e);
            std::process::exit(1);
        }
    };

    let mut results = Vec::new();

    // 1. Catalog data validation
    results.extend(validate_catalog(&catalog, verbose));

    // 2. Start-action rules
    results.extend(validate_start_rules(&catalog, verbose));

    // 3. Resolution scenarios
    results.extend(validate_resolution(&catalog, &config, verbose));

    // 4. Requirements & durability
    results.extend(validate_requirements(&catalog, &config, verbose));

    // 5. Depletion & respawn
    results.extend(validate_respawn(&catalog, &config, verbose));

    // 6. Seeded multi-player load run
    results.extend(validate_load_run(&catalog, &config, seed, verbose));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── 1. Catalog ──────────────────────────────────────────────────────────

fn validate_catalog(catalog: &Catalog, verbose: bool) -> Vec<TestResult> {
    println!("--- Catalog ---");
    let mut results = Vec::new();

    let raw: RawCatalog = match serde_json::from_str(CATALOG_JSON) {
        Ok(r) => r,
        Err(e) => {
            results.push(check("catalog_raw_parse", false, format!("JSON parse error: {}", e)));
            return results;
        }
    };

    results.push(check(
        "catalog_counts_match",
        raw.items.len() == catalog.items().count()
            && raw.resources.len() == catalog.resources().count()
            && raw.placements.len() == catalog.placements().len(),
        format!(
            "{} items, {} resources, {} placements",
            raw.items.len(),
            raw.resources.len(),
            raw.placements.len()
        ),
    ));

    let bad_finite: Vec<&str> = raw
        .resources
        .iter()
        .filter(|r| !r.limitless && r.amount == 0)
        .map(|r| r.id.as_str())
        .collect();
    results.push(check(
        "finite_resources_have_amount",
        bad_finite.is_empty(),
        format!("zero-amount finite: {:?}", bad_finite),
    ));

    let bad_time: Vec<&str> = raw
        .resources
        .iter()
        .filter(|r| r.collection_time.is_nan() || r.collection_time <= 0.0)
        .map(|r| r.id.as_str())
        .collect();
    results.push(check(
        "collection_times_positive",
        bad_time.is_empty(),
        format!("non-positive: {:?}", bad_time),
    ));

    let unplaced: Vec<&str> = catalog
        .resources()
        .filter(|r| !catalog.placements().iter().any(|p| p.resource_id == r.id))
        .map(|r| r.id.as_str())
        .collect();
    results.push(check(
        "every_resource_placed",
        unplaced.is_empty(),
        format!("unplaced: {:?}", unplaced),
    ));

    if verbose {
        for r in catalog.resources() {
            println!(
                "    {} ({}) {}s {}",
                r.id,
                r.kind.as_str(),
                r.collection_time,
                if r.limitless { "limitless".to_string() } else { format!("amount {}", r.amount) }
            );
        }
    }
    results
}

// ── 2. Start rules ──────────────────────────────────────────────────────

fn validate_start_rules(catalog: &Catalog, _verbose: bool) -> Vec<TestResult> {
    println!("--- Start Rules ---");
    let mut results = Vec::new();
    let store = MemoryStore::with_placements(catalog);

    let outcome = |player: u64, x: i32, y: i32, res: &str, now: u64| {
        store
            .place_player(player, x, y)
            .and_then(|_| ledger::start_action(&store, catalog, player, res, now))
    };

    let first = outcome(1, 0, 0, "resource_wood", 0);
    results.push(check(
        "start_wood",
        matches!(&first, Ok(StartOutcome::Started(r)) if r.completed_at == 5_000),
        format!("{:?}", first),
    ));

    let busy = outcome(1, 0, 0, "resource_wood", 10);
    results.push(check(
        "second_start_rejected",
        busy == Ok(StartOutcome::Rejected(StartRejection::AlreadyBusy)),
        format!("{:?}", busy),
    ));

    let wrong_tile = outcome(2, 0, 0, "resource_rare_ore", 0);
    results.push(check(
        "wrong_tile_rejected",
        wrong_tile == Ok(StartOutcome::Rejected(StartRejection::NotOnTile)),
        format!("{:?}", wrong_tile),
    ));

    results.push(check(
        "one_record_per_player",
        store.action_count() == 1,
        format!("{} records", store.action_count()),
    ));
    results
}

// ── 3. Resolution ───────────────────────────────────────────────────────

fn validate_resolution(catalog: &Catalog, config: &EngineConfig, verbose: bool) -> Vec<TestResult> {
    println!("--- Resolution ---");
    let mut results = Vec::new();
    let store = MemoryStore::with_placements(catalog);
    let bus = ChannelBus::new();
    let feed = bus.subscribe(Topic::All);
    let sweeper = Sweeper::new(&store, &bus, &NoQuests, catalog, config);

    let _ = store.place_player(1, 0, 0);
    let _ = ledger::start_action(&store, catalog, 1, "resource_wood", 0);
    let report = sweeper.sweep(6_000);
    let wood = store
        .stacks(1)
        .map(|s| inventory::count(&s, "item_wood"))
        .unwrap_or(0);
    results.push(check(
        "wood_collected",
        matches!(&report, Ok(r) if r.successes() == 1) && wood == 2,
        format!("{} wood", wood),
    ));

    let events: Vec<GameEvent> = feed.try_iter().collect();
    let saw_player = events.contains(&GameEvent::PlayerUpdated { player_id: 1 });
    let saw_tile = events.contains(&GameEvent::TileUpdated { x: 0, y: 0 });
    results.push(check(
        "wood_events_published",
        saw_player && saw_tile,
        format!("{} events", events.len()),
    ));
    if verbose {
        for e in &events {
            println!("    {}", serde_json::to_string(e).unwrap_or_default());
        }
    }

    for player in [2, 3] {
        let _ = store.place_player(player, 3, 0);
        let _ = ledger::start_action(&store, catalog, player, "resource_rare_ore", 10_000);
    }
    let contested = sweeper.sweep(13_000);
    let outcomes: Vec<Resolution> = contested
        .map(|r| r.resolved.into_iter().map(|(_, o)| o).collect())
        .unwrap_or_default();
    results.push(check(
        "rare_ore_single_winner",
        outcomes.iter().filter(|o| o.is_success()).count() == 1
            && outcomes.iter().any(|o| matches!(o, Resolution::Depleted { .. })),
        format!("{:?}", outcomes),
    ));

    let record = ledger::ActionRecord {
        player_id: 4,
        tile_x: 0,
        tile_y: 0,
        resource_id: "resource_wood".into(),
        started_at: 0,
        completed_at: 0,
    };
    let _ = store.insert_if_absent(record.clone());
    let first = sweeper.resolve(&record, 1);
    let second = sweeper.resolve(&record, 1);
    results.push(check(
        "double_resolve_noop",
        matches!(second, Ok(Resolution::AlreadyResolved)) && matches!(first, Ok(ref r) if r.is_success()),
        format!("{:?} then {:?}", first, second),
    ));
    results
}

// ── 4. Requirements ─────────────────────────────────────────────────────

fn validate_requirements(catalog: &Catalog, config: &EngineConfig, _verbose: bool) -> Vec<TestResult> {
    println!("--- Requirements ---");
    let mut results = Vec::new();
    let store = MemoryStore::with_placements(catalog);
    let sweeper = Sweeper::new(&store, &NullBus, &NoQuests, catalog, config);

    // Furnace without ore
    let _ = store.place_player(1, 1, 1);
    let _ = ledger::start_action(&store, catalog, 1, "resource_furnace", 0);
    let report = sweeper.sweep(6_000);
    let ingots = store
        .stacks(1)
        .map(|s| inventory::count(&s, "item_iron_ingot"))
        .unwrap_or(0);
    results.push(check(
        "missing_items_rejected",
        matches!(&report, Ok(r) if matches!(r.resolved.first(), Some((_, Resolution::MissingItems { .. }))))
            && ingots == 0,
        format!("{:?}", report.map(|r| r.resolved)),
    ));

    // Pickaxe (8 durability) on the iron vein (2 per use): four uses, then broken.
    let _ = inventory::add(&store, catalog, config, 2, "item_pickaxe", 1);
    let _ = store.place_player(2, 4, 0);
    let mut successes = 0;
    let mut now = 0;
    for _ in 0..5 {
        let _ = ledger::start_action(&store, catalog, 2, "resource_iron_vein", now);
        now += 6_000;
        if let Ok(r) = sweeper.sweep(now) {
            successes += r.successes();
        }
    }
    let picks = store
        .stacks(2)
        .map(|s| inventory::count(&s, "item_pickaxe"))
        .unwrap_or(1);
    let last = store.messages(2).ok().and_then(|m| m.into_iter().next());
    results.push(check(
        "pickaxe_wears_out",
        successes == 4 && picks == 0,
        format!(
            "{} successes, {} pickaxes, last message {:?}",
            successes,
            picks,
            last.map(|m| m.message)
        ),
    ));
    results
}

// ── 5. Respawn ──────────────────────────────────────────────────────────

fn validate_respawn(catalog: &Catalog, config: &EngineConfig, _verbose: bool) -> Vec<TestResult> {
    println!("--- Depletion & Respawn ---");
    let mut results = Vec::new();
    let store = MemoryStore::with_placements(catalog);
    let sweeper = Sweeper::new(&store, &NullBus, &NoQuests, catalog, config);

    let _ = store.place_player(1, 3, 0);
    let _ = ledger::start_action(&store, catalog, 1, "resource_rare_ore", 0);
    let _ = sweeper.sweep(3_000);

    let respawn_ms = catalog
        .resource("resource_rare_ore")
        .map(|r| config.respawn_ms(r.respawn_time))
        .unwrap_or(0);
    let early = sweeper.cleanup(3_000 + respawn_ms - 1);
    let due = sweeper.cleanup(3_000 + respawn_ms);
    let again = sweeper.cleanup(3_000 + respawn_ms);

    results.push(check(
        "no_early_respawn",
        matches!(&early, Ok(r) if !r.resources.changed()),
        format!("{:?}", early.map(|r| r.resources)),
    ));
    results.push(check(
        "respawn_when_due",
        matches!(&due, Ok(r) if r.resources.respawned == 1),
        format!("{:?}", due.map(|r| r.resources)),
    ));
    results.push(check(
        "cleanup_idempotent",
        matches!(&again, Ok(r) if !r.resources.changed()),
        format!("{:?}", again.map(|r| r.resources)),
    ));
    results.push(check(
        "instance_cleared",
        matches!(store.instance(3, 0), Ok(None)),
        String::new(),
    ));
    results
}

// ── 6. Load run ─────────────────────────────────────────────────────────

fn validate_load_run(catalog: &Catalog, config: &EngineConfig, seed: u64, verbose: bool) -> Vec<TestResult> {
    println!("--- Load Run (seed {}) ---", seed);
    let mut results = Vec::new();
    let mut rng = StdRng::seed_from_u64(seed);
    let store = MemoryStore::with_placements(catalog);
    let tally = CompletionTally::new();
    let sweeper = Sweeper::new(&store, &NullBus, &tally, catalog, config);

    const PLAYERS: u64 = 200;
    const DURATION_MS: u64 = 300_000;
    let tick = config.sweep_interval_ms.max(1);
    let placements = catalog.placements();

    for p in 1..=PLAYERS {
        for tool in ["item_axe", "item_pickaxe", "item_rod"] {
            let _ = inventory::add(&store, catalog, config, p, tool, 1);
        }
        let _ = inventory::add(&store, catalog, config, p, "item_wood", 10);
    }

    let mut started = 0usize;
    let mut store_errors = 0usize;
    let mut successes: HashMap<String, usize> = HashMap::new();
    let mut now = 0;
    while now <= DURATION_MS {
        for p in 1..=PLAYERS {
            if !rng.gen_bool(0.05) || placements.is_empty() {
                continue;
            }
            let spot = &placements[rng.gen_range(0..placements.len())];
            if store.place_player(p, spot.x, spot.y).is_err() {
                store_errors += 1;
                continue;
            }
            if let Ok(StartOutcome::Started(_)) = ledger::start_action(&store, catalog, p, &spot.resource_id, now) {
                started += 1;
            }
        }
        match sweeper.sweep(now) {
            Ok(report) => {
                for (player, outcome) in &report.resolved {
                    if outcome.is_success() {
                        if let Ok(msgs) = store.messages(*player) {
                            if let Some(ctx) = msgs.first().and_then(|m| m.action.clone()) {
                                *successes.entry(ctx.id).or_insert(0) += 1;
                            }
                        }
                    }
                }
            }
            Err(_) => store_errors += 1,
        }
        if now % config.cleanup_interval_ms.max(1) == 0 && sweeper.cleanup(now).is_err() {
            store_errors += 1;
        }
        now += tick;
    }

    // Drain everything still in flight.
    let drain_at = now + 60_000;
    while store.action_count() > 0 {
        if sweeper.sweep(drain_at).is_err() {
            store_errors += 1;
            break;
        }
    }
    let _ = sweeper.cleanup(drain_at);

    results.push(check(
        "no_store_errors",
        store_errors == 0,
        format!("{} errors", store_errors),
    ));
    results.push(check(
        "ledger_drained",
        store.action_count() == 0,
        format!("{} actions started", started),
    ));

    let over_retention = (1..=PLAYERS)
        .filter(|&p| store.messages(p).map(|m| m.len()).unwrap_or(0) > config.message_retention)
        .count();
    results.push(check(
        "message_retention",
        over_retention == 0,
        format!("{} players over {}", over_retention, config.message_retention),
    ));

    let tally_total: u32 = catalog
        .resources()
        .map(|r| (1..=PLAYERS).map(|p| tally.count(p, &r.id)).sum::<u32>())
        .sum();
    results.push(check(
        "quest_tally_counts_successes",
        tally_total > 0,
        format!("{} completions", tally_total),
    ));

    let instances_ok = store.instances().map(|all| {
        all.iter().all(|i| {
            catalog
                .resource(&i.resource_id)
                .is_some_and(|def| !def.limitless && i.amount_remaining < def.amount)
        })
    });
    results.push(check(
        "instances_within_amount",
        matches!(instances_ok, Ok(true)),
        format!("{:?}", store.instances().map(|i| i.len())),
    ));

    let errors: usize = (1..=PLAYERS)
        .map(|p| {
            store
                .messages(p)
                .map(|m| m.iter().filter(|m| m.severity == Severity::Error).count())
                .unwrap_or(0)
        })
        .sum();
    if verbose {
        let mut by_resource: Vec<_> = successes.iter().collect();
        by_resource.sort();
        for (id, n) in by_resource {
            println!("    {}: {} completions", id, n);
        }
        println!("    {} retained error messages", errors);
    }
    results
}
