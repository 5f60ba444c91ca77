//! SpacetimeDB table definitions for the Hearthtile world.
//!
//! Each table backs one storage seam from hearthtile-logic. Clients
//! subscribe to the public ones (filtered by player or tile) to render
//! progress, inventories and notifications.

use spacetimedb::{table, Identity, ScheduleAt, Timestamp};

use crate::reducers::{process_due_actions, process_resource_cleanup};

// ============================================================================
// PLAYERS & MAP
// ============================================================================

/// A joined player and the tile they stand on.
#[table(name = player, public)]
#[derive(Clone)]
pub struct Player {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[unique]
    pub identity: Identity,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub joined_at: Timestamp,
}

/// Which resource node sits on a tile. Seeded from the catalog placements.
#[table(name = tile_resource, public)]
#[derive(Clone)]
pub struct TileResourceRow {
    #[primary_key]
    pub tile_key: i64,
    pub x: i32,
    pub y: i32,
    pub resource_id: String,
}

// ============================================================================
// ACTIONS & RESOURCES
// ============================================================================

/// At most one in-flight action per player.
#[table(name = action_in_progress, public)]
#[derive(Clone)]
pub struct ActionInProgress {
    #[primary_key]
    pub player_id: u64,
    pub tile_x: i32,
    pub tile_y: i32,
    pub resource_id: String,
    pub started_at_ms: u64,
    pub completed_at_ms: u64,
}

/// Remaining capacity of a finite node. Absent until first consumed.
#[table(name = resource_instance, public)]
#[derive(Clone)]
pub struct ResourceInstanceRow {
    #[primary_key]
    pub tile_key: i64,
    pub x: i32,
    pub y: i32,
    pub resource_id: String,
    pub amount_remaining: u32,
    pub depleted_at_ms: Option<u64>,
}

// ============================================================================
// INVENTORY
// ============================================================================

/// One stack in a player's inventory
#[table(name = inventory_item, public)]
#[derive(Clone)]
pub struct InventoryItem {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[index(btree)]
    pub player_id: u64,
    pub item_id: String,
    pub qty: u32,
    pub current_durability: Option<u32>,
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

#[table(name = system_message, public)]
#[derive(Clone)]
pub struct SystemMessageRow {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[index(btree)]
    pub player_id: u64,
    pub message: String,
    /// 0=info 1=error 2=success 3=warning
    pub severity: u8,
    pub sent_at_ms: u64,
    /// JSON-encoded action context, if the message is about a tile node.
    pub action_json: Option<String>,
}

/// Change feed for clients. Rows are short-lived; the cleanup sweep drops
/// them once they are older than the retention window.
#[table(name = world_event, public)]
#[derive(Clone)]
pub struct WorldEvent {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub kind: String,
    pub player_id: Option<u64>,
    pub tile_x: Option<i32>,
    pub tile_y: Option<i32>,
    pub payload: String,
    pub emitted_at_ms: u64,
}

// ============================================================================
// QUESTS
// ============================================================================

/// Completion counts per player and resource.
#[table(name = quest_progress, public)]
#[derive(Clone)]
pub struct QuestProgress {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[index(btree)]
    pub player_id: u64,
    pub resource_id: String,
    pub completions: u32,
}

// ============================================================================
// SCHEDULES
// ============================================================================

#[table(name = action_sweep_schedule, scheduled(process_due_actions))]
#[derive(Clone)]
pub struct ActionSweepSchedule {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub scheduled_at: ScheduleAt,
}

#[table(name = resource_cleanup_schedule, scheduled(process_resource_cleanup))]
#[derive(Clone)]
pub struct ResourceCleanupSchedule {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub scheduled_at: ScheduleAt,
}
