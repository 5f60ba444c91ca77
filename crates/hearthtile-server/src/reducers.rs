//! Client-facing reducers and the two scheduled sweeps.

use std::sync::OnceLock;
use std::time::Duration;

use hearthtile_logic::catalog::Catalog;
use hearthtile_logic::config::EngineConfig;
use hearthtile_logic::events::{notify, EventBus, GameEvent, Severity};
use hearthtile_logic::ledger::{self, StartOutcome, StartRejection};
use hearthtile_logic::resolution::Sweeper;
use spacetimedb::{reducer, ReducerContext, ScheduleAt, Table, TimeDuration};

use crate::store::{self, DbStore, TableBus, TallyQuests};
use crate::tables::*;

const CATALOG_JSON: &str = include_str!("../../../data/catalog.json");

static CATALOG: OnceLock<Result<Catalog, String>> = OnceLock::new();

fn catalog() -> Result<&'static Catalog, String> {
    CATALOG
        .get_or_init(|| Catalog::from_json(CATALOG_JSON).map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|e| format!("catalog failed to load: {}", e))
}

fn config() -> EngineConfig {
    EngineConfig::default()
}

fn player_for_sender(ctx: &ReducerContext) -> Result<Player, String> {
    ctx.db
        .player()
        .identity()
        .find(ctx.sender)
        .ok_or_else(|| "Join the world first".to_string())
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[reducer(init)]
pub fn init(ctx: &ReducerContext) -> Result<(), String> {
    let catalog = catalog()?;
    let config = config();

    if ctx.db.tile_resource().iter().count() == 0 {
        for p in catalog.placements() {
            ctx.db.tile_resource().insert(TileResourceRow {
                tile_key: store::tile_key(p.x, p.y),
                x: p.x,
                y: p.y,
                resource_id: p.resource_id.clone(),
            });
        }
        log::info!("Seeded {} tile placements", catalog.placements().len());
    }

    if ctx.db.action_sweep_schedule().iter().count() == 0 {
        log::info!("Starting action sweep (every {}ms)", config.sweep_interval_ms);
        ctx.db.action_sweep_schedule().insert(ActionSweepSchedule {
            id: 0,
            scheduled_at: ScheduleAt::Interval(TimeDuration::from(Duration::from_millis(
                config.sweep_interval_ms,
            ))),
        });
    }
    if ctx.db.resource_cleanup_schedule().iter().count() == 0 {
        log::info!("Starting resource cleanup (every {}ms)", config.cleanup_interval_ms);
        ctx.db.resource_cleanup_schedule().insert(ResourceCleanupSchedule {
            id: 0,
            scheduled_at: ScheduleAt::Interval(TimeDuration::from(Duration::from_millis(
                config.cleanup_interval_ms,
            ))),
        });
    }
    Ok(())
}

#[reducer(client_connected)]
pub fn client_connected(ctx: &ReducerContext) {
    log::info!("Client connected: {:?}", ctx.sender);
}

// ============================================================================
// PLAYER REDUCERS
// ============================================================================

/// Create a character at the origin tile
#[reducer]
pub fn player_join(ctx: &ReducerContext, name: String) -> Result<(), String> {
    if ctx.db.player().identity().find(ctx.sender).is_some() {
        log::warn!("Player already has a character!");
        return Err("Already joined".to_string());
    }
    let player = ctx.db.player().insert(Player {
        id: 0,
        identity: ctx.sender,
        name,
        x: 0,
        y: 0,
        joined_at: ctx.timestamp,
    });
    log::info!("Player {} joined as {}", player.id, player.name);
    Ok(())
}

/// Step at most one tile in each axis. Moving does not cancel an action;
/// it resolves against the tile where it started.
#[reducer]
pub fn player_move(ctx: &ReducerContext, dx: i32, dy: i32) -> Result<(), String> {
    let mut player = player_for_sender(ctx)?;
    player.x = player.x.saturating_add(dx.clamp(-1, 1));
    player.y = player.y.saturating_add(dy.clamp(-1, 1));
    ctx.db.player().id().update(player.clone());
    TableBus::new(ctx).publish(GameEvent::PlayerUpdated {
        player_id: player.id,
    });
    Ok(())
}

/// Begin collecting the resource on the player's current tile.
#[reducer]
pub fn start_action(ctx: &ReducerContext, resource_id: String) -> Result<(), String> {
    let catalog = catalog()?;
    let player = player_for_sender(ctx)?;
    let now = store::now_ms(ctx);
    let db = DbStore::new(ctx);
    let bus = TableBus::new(ctx);

    let outcome = ledger::start_action(&db, catalog, player.id, &resource_id, now)
        .map_err(|e| e.to_string())?;
    match outcome {
        StartOutcome::Started(_) => {
            bus.publish(GameEvent::PlayerUpdated {
                player_id: player.id,
            });
        }
        StartOutcome::Rejected(reason) => {
            log::warn!("Player {} start of {} rejected: {:?}", player.id, resource_id, reason);
            let text = match reason {
                StartRejection::AlreadyBusy => "You are already busy with another action.",
                StartRejection::UnknownResource => "There is nothing like that to collect.",
                StartRejection::UnknownPlayer => "You are not in the world.",
                StartRejection::NotOnTile => "That resource is not on your tile.",
            };
            notify(&db, &bus, player.id, Severity::Warning, text.to_string(), None, now)
                .map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

/// Put a resource on a tile (or clear it). Any depleted state left on the
/// tile is replaced lazily the next time the new node is consumed.
#[reducer]
pub fn place_resource(ctx: &ReducerContext, x: i32, y: i32, resource_id: Option<String>) -> Result<(), String> {
    let key = store::tile_key(x, y);
    let tiles = ctx.db.tile_resource();
    match resource_id {
        Some(id) => {
            if catalog()?.resource(&id).is_none() {
                return Err(format!("Unknown resource {}", id));
            }
            let row = TileResourceRow {
                tile_key: key,
                x,
                y,
                resource_id: id,
            };
            if tiles.tile_key().find(key).is_some() {
                tiles.tile_key().update(row);
            } else {
                tiles.insert(row);
            }
        }
        None => {
            tiles.tile_key().delete(key);
        }
    }
    TableBus::new(ctx).publish(GameEvent::TileUpdated { x, y });
    Ok(())
}

// ============================================================================
// SCHEDULED SWEEPS
// ============================================================================

/// Resolve due actions. A storage error rolls back the whole tick and the
/// same records are retried on the next one.
#[reducer]
pub fn process_due_actions(ctx: &ReducerContext, _schedule: ActionSweepSchedule) -> Result<(), String> {
    if ctx.sender != ctx.identity() {
        return Err("process_due_actions may only be called by the scheduler.".to_string());
    }
    let catalog = catalog()?;
    let config = config();
    let (db, bus, quests) = (DbStore::new(ctx), TableBus::new(ctx), TallyQuests::new(ctx));

    Sweeper::new(&db, &bus, &quests, catalog, &config)
        .sweep(store::now_ms(ctx))
        .map(|_| ())
        .map_err(|e| {
            log::error!("Action sweep failed: {}", e);
            e.to_string()
        })
}

/// Respawn depleted nodes, trim messages and drop old feed rows.
#[reducer]
pub fn process_resource_cleanup(ctx: &ReducerContext, _schedule: ResourceCleanupSchedule) -> Result<(), String> {
    if ctx.sender != ctx.identity() {
        return Err("process_resource_cleanup may only be called by the scheduler.".to_string());
    }
    let catalog = catalog()?;
    let config = config();
    let now = store::now_ms(ctx);
    let (db, bus, quests) = (DbStore::new(ctx), TableBus::new(ctx), TallyQuests::new(ctx));

    let report = Sweeper::new(&db, &bus, &quests, catalog, &config)
        .cleanup(now)
        .map_err(|e| {
            log::error!("Resource cleanup failed: {}", e);
            e.to_string()
        })?;
    let events = store::prune_world_events(ctx, now, config.event_retention_secs as u64 * 1000);
    if report.messages_pruned > 0 || events > 0 {
        log::debug!(
            "Cleanup pruned {} messages and {} events",
            report.messages_pruned,
            events
        );
    }
    Ok(())
}
