//! In-process storage backend.
//!
//! Implements every storage seam with plain maps behind mutexes. Each
//! player's inventory sits behind its own lock so concurrent grants to
//! different players don't contend. Used by the integration tests and the
//! headless harness; the server crate has its own table-backed store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::availability::{self, ResourceInstance, ResourceTracker};
use crate::catalog::{Catalog, ResourceDef};
use crate::error::StoreError;
use crate::events::{ActionContext, MessageLog, Severity, SystemMessage};
use crate::inventory::{self, InventoryStore, ItemStack, UNASSIGNED_STACK_ID};
use crate::ledger::{self, ActionLedger, ActionRecord, PlayerLocator, TileResource};

fn lock<'a, T>(m: &'a Mutex<T>, table: &'static str) -> Result<MutexGuard<'a, T>, StoreError> {
    m.lock()
        .map_err(|_| StoreError::Unavailable(format!("{} lock poisoned", table)))
}

type SharedStacks = Arc<Mutex<Vec<ItemStack>>>;

#[derive(Default)]
pub struct MemoryStore {
    ledger: Mutex<BTreeMap<u64, ActionRecord>>,
    inventories: Mutex<HashMap<u64, SharedStacks>>,
    next_stack_id: AtomicU64,
    instances: Mutex<HashMap<(i32, i32), ResourceInstance>>,
    messages: Mutex<Vec<SystemMessage>>,
    next_message_id: AtomicU64,
    positions: Mutex<HashMap<u64, (i32, i32)>>,
    placements: Mutex<HashMap<(i32, i32), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the catalog's initial placements registered, so starts
    /// are validated against what is actually on the tile.
    pub fn with_placements(catalog: &Catalog) -> Self {
        let store = Self::new();
        if let Ok(mut placed) = store.placements.lock() {
            for p in catalog.placements() {
                placed.insert((p.x, p.y), p.resource_id.clone());
            }
        }
        store
    }

    pub fn place_player(&self, player_id: u64, x: i32, y: i32) -> Result<(), StoreError> {
        lock(&self.positions, "player")?.insert(player_id, (x, y));
        Ok(())
    }

    /// Put `resource_id` on a tile, or clear it with `None`.
    pub fn place_resource(&self, x: i32, y: i32, resource_id: Option<&str>) -> Result<(), StoreError> {
        let mut placed = lock(&self.placements, "tile_resource")?;
        match resource_id {
            Some(id) => placed.insert((x, y), id.to_string()),
            None => placed.remove(&(x, y)),
        };
        Ok(())
    }

    pub fn action_count(&self) -> usize {
        self.ledger.lock().map(|l| l.len()).unwrap_or(0)
    }

    fn inventory_of(&self, player_id: u64) -> Result<SharedStacks, StoreError> {
        let mut all = lock(&self.inventories, "inventory_item")?;
        Ok(Arc::clone(all.entry(player_id).or_default()))
    }
}

impl ActionLedger for MemoryStore {
    fn insert_if_absent(&self, record: ActionRecord) -> Result<bool, StoreError> {
        let mut ledger = lock(&self.ledger, "action_in_progress")?;
        if ledger.contains_key(&record.player_id) {
            return Ok(false);
        }
        ledger.insert(record.player_id, record);
        Ok(true)
    }

    fn in_progress(&self, player_id: u64) -> Result<Option<ActionRecord>, StoreError> {
        Ok(lock(&self.ledger, "action_in_progress")?.get(&player_id).cloned())
    }

    fn complete(&self, player_id: u64, x: i32, y: i32) -> Result<bool, StoreError> {
        let mut ledger = lock(&self.ledger, "action_in_progress")?;
        match ledger.get(&player_id) {
            Some(r) if r.tile_x == x && r.tile_y == y => {
                ledger.remove(&player_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn batch(&self, limit: usize) -> Result<Vec<ActionRecord>, StoreError> {
        let mut records: Vec<ActionRecord> = lock(&self.ledger, "action_in_progress")?
            .values()
            .cloned()
            .collect();
        ledger::sort_for_sweep(&mut records);
        records.truncate(limit);
        Ok(records)
    }
}

impl PlayerLocator for MemoryStore {
    fn tile_of(&self, player_id: u64) -> Result<Option<(i32, i32)>, StoreError> {
        Ok(lock(&self.positions, "player")?.get(&player_id).copied())
    }

    fn resource_on_tile(&self, x: i32, y: i32) -> Result<TileResource, StoreError> {
        let placed = lock(&self.placements, "tile_resource")?;
        if placed.is_empty() {
            return Ok(TileResource::Unmapped);
        }
        Ok(match placed.get(&(x, y)) {
            Some(id) => TileResource::Placed(id.clone()),
            None => TileResource::Empty,
        })
    }
}

impl InventoryStore for MemoryStore {
    fn stacks(&self, player_id: u64) -> Result<Vec<ItemStack>, StoreError> {
        let shared = self.inventory_of(player_id)?;
        let stacks = lock(&*shared, "inventory_item")?;
        Ok(stacks.clone())
    }

    fn update_inventory<R>(
        &self,
        player_id: u64,
        f: impl FnOnce(&mut Vec<ItemStack>) -> R,
    ) -> Result<R, StoreError> {
        let shared = self.inventory_of(player_id)?;
        let mut stacks = lock(&*shared, "inventory_item")?;
        let out = f(&mut stacks);
        inventory::prune(&mut stacks);
        for stack in stacks.iter_mut() {
            if stack.id == UNASSIGNED_STACK_ID {
                stack.id = self.next_stack_id.fetch_add(1, Ordering::Relaxed) + 1;
            }
        }
        Ok(out)
    }
}

impl ResourceTracker for MemoryStore {
    fn instance(&self, x: i32, y: i32) -> Result<Option<ResourceInstance>, StoreError> {
        Ok(lock(&self.instances, "resource_instance")?.get(&(x, y)).cloned())
    }

    fn instances(&self) -> Result<Vec<ResourceInstance>, StoreError> {
        let mut all: Vec<ResourceInstance> = lock(&self.instances, "resource_instance")?
            .values()
            .cloned()
            .collect();
        all.sort_by_key(|i| (i.x, i.y));
        Ok(all)
    }

    fn consume_finite(
        &self,
        x: i32,
        y: i32,
        def: &ResourceDef,
        now: u64,
    ) -> Result<bool, StoreError> {
        let mut instances = lock(&self.instances, "resource_instance")?;
        let mut inst = availability::instance_for(instances.remove(&(x, y)), x, y, def);
        let ok = availability::consume_from(&mut inst, now);
        instances.insert((x, y), inst);
        Ok(ok)
    }

    fn remove_instance_if(&self, expected: &ResourceInstance) -> Result<bool, StoreError> {
        let mut instances = lock(&self.instances, "resource_instance")?;
        let key = (expected.x, expected.y);
        if instances.get(&key) == Some(expected) {
            instances.remove(&key);
            return Ok(true);
        }
        Ok(false)
    }
}

impl MessageLog for MemoryStore {
    fn append(
        &self,
        player_id: u64,
        severity: Severity,
        message: String,
        action: Option<ActionContext>,
        now: u64,
    ) -> Result<SystemMessage, StoreError> {
        let msg = SystemMessage {
            id: self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1,
            player_id,
            message,
            severity,
            sent_at: now,
            action,
        };
        lock(&self.messages, "system_message")?.push(msg.clone());
        Ok(msg)
    }

    fn messages(&self, player_id: u64) -> Result<Vec<SystemMessage>, StoreError> {
        let mut mine: Vec<SystemMessage> = lock(&self.messages, "system_message")?
            .iter()
            .filter(|m| m.player_id == player_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then(b.id.cmp(&a.id)));
        Ok(mine)
    }

    fn prune(&self, keep: usize) -> Result<usize, StoreError> {
        let mut all = lock(&self.messages, "system_message")?;
        let mut per_player: HashMap<u64, Vec<(u64, u64)>> = HashMap::new();
        for m in all.iter() {
            per_player
                .entry(m.player_id)
                .or_default()
                .push((m.sent_at, m.id));
        }
        let mut doomed = Vec::new();
        for (_, mut keys) in per_player {
            keys.sort_by(|a, b| b.cmp(a));
            doomed.extend(keys.into_iter().skip(keep).map(|(_, id)| id));
        }
        let before = all.len();
        all.retain(|m| !doomed.contains(&m.id));
        Ok(before - all.len())
    }
}
