//! Table-backed implementations of the hearthtile-logic storage seams.
//!
//! A reducer runs as one transaction, so every trait method here is atomic
//! with respect to other reducers: `insert_if_absent`, `consume_finite` and
//! `update_inventory` need no extra locking.

use hearthtile_logic::availability::{self, ResourceInstance, ResourceTracker};
use hearthtile_logic::catalog::ResourceDef;
use hearthtile_logic::error::{QuestError, StoreError};
use hearthtile_logic::events::{ActionContext, EventBus, GameEvent, MessageLog, Severity, SystemMessage};
use hearthtile_logic::inventory::{self, InventoryStore, ItemStack, StackMetadata, UNASSIGNED_STACK_ID};
use hearthtile_logic::ledger::{self, ActionLedger, ActionRecord, PlayerLocator, TileResource};
use hearthtile_logic::quest::QuestHook;
use spacetimedb::{ReducerContext, Table};

use crate::tables::*;

/// Pack tile coordinates into a single primary key.
pub fn tile_key(x: i32, y: i32) -> i64 {
    ((x as i64) << 32) | (y as u32 as i64)
}

/// Reducer timestamp in milliseconds since the Unix epoch.
pub fn now_ms(ctx: &ReducerContext) -> u64 {
    (ctx.timestamp.to_micros_since_unix_epoch() / 1000).max(0) as u64
}

// ============================================================================
// ROW CONVERSIONS
// ============================================================================

fn record_from_row(row: ActionInProgress) -> ActionRecord {
    ActionRecord {
        player_id: row.player_id,
        tile_x: row.tile_x,
        tile_y: row.tile_y,
        resource_id: row.resource_id,
        started_at: row.started_at_ms,
        completed_at: row.completed_at_ms,
    }
}

fn stack_from_row(row: InventoryItem) -> ItemStack {
    ItemStack {
        id: row.id,
        item_id: row.item_id,
        qty: row.qty,
        metadata: row.current_durability.map(|d| StackMetadata {
            current_durability: Some(d),
        }),
    }
}

fn row_from_stack(player_id: u64, stack: &ItemStack) -> InventoryItem {
    InventoryItem {
        id: stack.id,
        player_id,
        item_id: stack.item_id.clone(),
        qty: stack.qty,
        current_durability: stack.durability(),
    }
}

fn instance_from_row(row: ResourceInstanceRow) -> ResourceInstance {
    ResourceInstance {
        x: row.x,
        y: row.y,
        resource_id: row.resource_id,
        amount_remaining: row.amount_remaining,
        depleted_at: row.depleted_at_ms,
    }
}

fn row_from_instance(inst: &ResourceInstance) -> ResourceInstanceRow {
    ResourceInstanceRow {
        tile_key: tile_key(inst.x, inst.y),
        x: inst.x,
        y: inst.y,
        resource_id: inst.resource_id.clone(),
        amount_remaining: inst.amount_remaining,
        depleted_at_ms: inst.depleted_at,
    }
}

fn message_from_row(row: SystemMessageRow) -> SystemMessage {
    let action = row
        .action_json
        .as_deref()
        .and_then(|json| serde_json::from_str::<ActionContext>(json).ok());
    SystemMessage {
        id: row.id,
        player_id: row.player_id,
        message: row.message,
        severity: Severity::from_u8(row.severity),
        sent_at: row.sent_at_ms,
        action,
    }
}

// ============================================================================
// DB STORE
// ============================================================================

/// All storage seams over the current reducer's transaction.
pub struct DbStore<'a> {
    ctx: &'a ReducerContext,
}

impl<'a> DbStore<'a> {
    pub fn new(ctx: &'a ReducerContext) -> Self {
        Self { ctx }
    }
}

impl ActionLedger for DbStore<'_> {
    fn insert_if_absent(&self, record: ActionRecord) -> Result<bool, StoreError> {
        let ledger = self.ctx.db.action_in_progress();
        if ledger.player_id().find(record.player_id).is_some() {
            return Ok(false);
        }
        ledger.insert(ActionInProgress {
            player_id: record.player_id,
            tile_x: record.tile_x,
            tile_y: record.tile_y,
            resource_id: record.resource_id,
            started_at_ms: record.started_at,
            completed_at_ms: record.completed_at,
        });
        Ok(true)
    }

    fn in_progress(&self, player_id: u64) -> Result<Option<ActionRecord>, StoreError> {
        Ok(self
            .ctx
            .db
            .action_in_progress()
            .player_id()
            .find(player_id)
            .map(record_from_row))
    }

    fn complete(&self, player_id: u64, x: i32, y: i32) -> Result<bool, StoreError> {
        let ledger = self.ctx.db.action_in_progress();
        match ledger.player_id().find(player_id) {
            Some(row) if row.tile_x == x && row.tile_y == y => Ok(ledger.player_id().delete(player_id)),
            _ => Ok(false),
        }
    }

    fn batch(&self, limit: usize) -> Result<Vec<ActionRecord>, StoreError> {
        let mut records: Vec<ActionRecord> = self
            .ctx
            .db
            .action_in_progress()
            .iter()
            .map(record_from_row)
            .collect();
        ledger::sort_for_sweep(&mut records);
        records.truncate(limit);
        Ok(records)
    }
}

impl PlayerLocator for DbStore<'_> {
    fn tile_of(&self, player_id: u64) -> Result<Option<(i32, i32)>, StoreError> {
        Ok(self.ctx.db.player().id().find(player_id).map(|p| (p.x, p.y)))
    }

    fn resource_on_tile(&self, x: i32, y: i32) -> Result<TileResource, StoreError> {
        Ok(match self.ctx.db.tile_resource().tile_key().find(tile_key(x, y)) {
            Some(row) => TileResource::Placed(row.resource_id),
            None => TileResource::Empty,
        })
    }
}

impl InventoryStore for DbStore<'_> {
    fn stacks(&self, player_id: u64) -> Result<Vec<ItemStack>, StoreError> {
        let mut stacks: Vec<ItemStack> = self
            .ctx
            .db
            .inventory_item()
            .player_id()
            .filter(player_id)
            .map(stack_from_row)
            .collect();
        stacks.sort_by_key(|s| s.id);
        Ok(stacks)
    }

    fn update_inventory<R>(
        &self,
        player_id: u64,
        f: impl FnOnce(&mut Vec<ItemStack>) -> R,
    ) -> Result<R, StoreError> {
        let before = self.stacks(player_id)?;
        let mut after = before.clone();
        let out = f(&mut after);
        inventory::prune(&mut after);

        if let Some(stray) = after
            .iter()
            .find(|s| s.id != UNASSIGNED_STACK_ID && !before.iter().any(|b| b.id == s.id))
        {
            return Err(StoreError::NotFound {
                table: "inventory_item",
                key: stray.id.to_string(),
            });
        }

        let items = self.ctx.db.inventory_item();
        for old in &before {
            match after.iter().find(|s| s.id == old.id) {
                None => {
                    items.id().delete(old.id);
                }
                Some(new) if new != old => {
                    items.id().update(row_from_stack(player_id, new));
                }
                Some(_) => {}
            }
        }
        for new in after.iter().filter(|s| s.id == UNASSIGNED_STACK_ID) {
            items.insert(row_from_stack(player_id, new));
        }
        Ok(out)
    }
}

impl ResourceTracker for DbStore<'_> {
    fn instance(&self, x: i32, y: i32) -> Result<Option<ResourceInstance>, StoreError> {
        Ok(self
            .ctx
            .db
            .resource_instance()
            .tile_key()
            .find(tile_key(x, y))
            .map(instance_from_row))
    }

    fn instances(&self) -> Result<Vec<ResourceInstance>, StoreError> {
        Ok(self
            .ctx
            .db
            .resource_instance()
            .iter()
            .map(instance_from_row)
            .collect())
    }

    fn consume_finite(
        &self,
        x: i32,
        y: i32,
        def: &ResourceDef,
        now: u64,
    ) -> Result<bool, StoreError> {
        let table = self.ctx.db.resource_instance();
        let existing = table.tile_key().find(tile_key(x, y));
        let had_row = existing.is_some();
        let mut inst = availability::instance_for(existing.map(instance_from_row), x, y, def);
        let ok = availability::consume_from(&mut inst, now);
        if had_row {
            table.tile_key().update(row_from_instance(&inst));
        } else {
            table.insert(row_from_instance(&inst));
        }
        Ok(ok)
    }

    fn remove_instance_if(&self, expected: &ResourceInstance) -> Result<bool, StoreError> {
        let table = self.ctx.db.resource_instance();
        let key = tile_key(expected.x, expected.y);
        match table.tile_key().find(key) {
            Some(row) if instance_from_row(row.clone()) == *expected => Ok(table.tile_key().delete(key)),
            _ => Ok(false),
        }
    }
}

impl MessageLog for DbStore<'_> {
    fn append(
        &self,
        player_id: u64,
        severity: Severity,
        message: String,
        action: Option<ActionContext>,
        now: u64,
    ) -> Result<SystemMessage, StoreError> {
        let action_json = action.as_ref().and_then(|a| serde_json::to_string(a).ok());
        let row = self.ctx.db.system_message().insert(SystemMessageRow {
            id: 0,
            player_id,
            message,
            severity: severity.to_u8(),
            sent_at_ms: now,
            action_json,
        });
        Ok(message_from_row(row))
    }

    fn messages(&self, player_id: u64) -> Result<Vec<SystemMessage>, StoreError> {
        let mut mine: Vec<SystemMessage> = self
            .ctx
            .db
            .system_message()
            .player_id()
            .filter(player_id)
            .map(message_from_row)
            .collect();
        mine.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then(b.id.cmp(&a.id)));
        Ok(mine)
    }

    fn prune(&self, keep: usize) -> Result<usize, StoreError> {
        let table = self.ctx.db.system_message();
        let mut players: Vec<u64> = table.iter().map(|m| m.player_id).collect();
        players.sort_unstable();
        players.dedup();

        let mut removed = 0;
        for player_id in players {
            for msg in self.messages(player_id)?.into_iter().skip(keep) {
                if table.id().delete(msg.id) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

// ============================================================================
// EVENT FEED & QUESTS
// ============================================================================

/// Publishes engine events as `world_event` rows.
pub struct TableBus<'a> {
    ctx: &'a ReducerContext,
}

impl<'a> TableBus<'a> {
    pub fn new(ctx: &'a ReducerContext) -> Self {
        Self { ctx }
    }
}

impl EventBus for TableBus<'_> {
    fn publish(&self, event: GameEvent) {
        let payload = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                log::error!("Dropping unserializable event {:?}: {}", event, e);
                return;
            }
        };
        let kind = match &event {
            GameEvent::PlayerUpdated { .. } => "player_updated",
            GameEvent::TileUpdated { .. } => "tile_updated",
            GameEvent::SystemMessage(_) => "system_message",
        };
        let tile = event.tile();
        self.ctx.db.world_event().insert(WorldEvent {
            id: 0,
            kind: kind.to_string(),
            player_id: event.player(),
            tile_x: tile.map(|t| t.0),
            tile_y: tile.map(|t| t.1),
            payload,
            emitted_at_ms: now_ms(self.ctx),
        });
    }
}

/// Drop feed rows older than `retention_ms`.
pub fn prune_world_events(ctx: &ReducerContext, now: u64, retention_ms: u64) -> usize {
    let cutoff = now.saturating_sub(retention_ms);
    let stale: Vec<u64> = ctx
        .db
        .world_event()
        .iter()
        .filter(|e| e.emitted_at_ms < cutoff)
        .map(|e| e.id)
        .collect();
    for id in &stale {
        ctx.db.world_event().id().delete(*id);
    }
    stale.len()
}

/// Quest hook that bumps `quest_progress` counters.
pub struct TallyQuests<'a> {
    ctx: &'a ReducerContext,
}

impl<'a> TallyQuests<'a> {
    pub fn new(ctx: &'a ReducerContext) -> Self {
        Self { ctx }
    }
}

impl QuestHook for TallyQuests<'_> {
    fn on_resource_completed(&self, player_id: u64, resource_id: &str) -> Result<(), QuestError> {
        let table = self.ctx.db.quest_progress();
        let existing = table
            .player_id()
            .filter(player_id)
            .find(|q| q.resource_id == resource_id);
        match existing {
            Some(mut row) => {
                row.completions += 1;
                table.id().update(row);
            }
            None => {
                table.insert(QuestProgress {
                    id: 0,
                    player_id,
                    resource_id: resource_id.to_string(),
                    completions: 1,
                });
            }
        }
        Ok(())
    }
}
