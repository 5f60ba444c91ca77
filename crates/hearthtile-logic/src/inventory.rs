//! Per-player stackable inventory: stacking, capacity and removal rules.
//!
//! Inventories are plain `Vec<ItemStack>` values; the pure functions here
//! mutate them in place and the [`InventoryStore`] backend persists the
//! result. Several stacks of one item may coexist (durable items never
//! stack), so every query aggregates across stacks.

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, ItemDef, ItemQty};
use crate::config::EngineConfig;
use crate::error::StoreError;

/// Stack id for rows the backend has not persisted yet.
pub const UNASSIGNED_STACK_ID: u64 = 0;

/// Optional per-stack state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_durability: Option<u32>,
}

/// One inventory record: a quantity of a single item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub id: u64,
    pub item_id: String,
    pub qty: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<StackMetadata>,
}

impl ItemStack {
    /// A new, not-yet-persisted stack.
    pub fn new(item_id: impl Into<String>, qty: u32) -> Self {
        Self {
            id: UNASSIGNED_STACK_ID,
            item_id: item_id.into(),
            qty,
            metadata: None,
        }
    }

    /// A new stack carrying durability state.
    pub fn with_durability(item_id: impl Into<String>, qty: u32, durability: u32) -> Self {
        Self {
            metadata: Some(StackMetadata {
                current_durability: Some(durability),
            }),
            ..Self::new(item_id, qty)
        }
    }

    pub fn durability(&self) -> Option<u32> {
        self.metadata.as_ref().and_then(|m| m.current_durability)
    }

    pub fn set_durability(&mut self, value: u32) {
        self.metadata
            .get_or_insert_with(StackMetadata::default)
            .current_durability = Some(value);
    }

    /// Ordering key: persisted stacks oldest-first, unpersisted ones last.
    pub(crate) fn age_key(&self) -> (bool, u64) {
        (self.id == UNASSIGNED_STACK_ID, self.id)
    }
}

/// Total quantity of `item_id` across all stacks.
pub fn count(stacks: &[ItemStack], item_id: &str) -> u64 {
    stacks
        .iter()
        .filter(|s| s.item_id == item_id)
        .map(|s| s.qty as u64)
        .sum()
}

/// Total durability of `item_id` across all live stacks.
///
/// Stacks without durability metadata contribute nothing.
pub fn total_durability(stacks: &[ItemStack], item_id: &str) -> u64 {
    stacks
        .iter()
        .filter(|s| s.item_id == item_id && s.qty > 0)
        .map(|s| s.durability().unwrap_or(0) as u64)
        .sum()
}

/// Number of slots in use.
pub fn used_slots(stacks: &[ItemStack]) -> usize {
    stacks.iter().filter(|s| s.qty > 0).count()
}

/// Drop zero-quantity stacks.
pub fn prune(stacks: &mut Vec<ItemStack>) {
    stacks.retain(|s| s.qty > 0);
}

/// Put snapshotted stacks back as they were. Stacks that have since been
/// deleted come back under a fresh id.
pub fn restore(stacks: &mut Vec<ItemStack>, snapshot: &[ItemStack]) {
    for snap in snapshot {
        match stacks.iter_mut().find(|s| s.id == snap.id) {
            Some(current) => *current = snap.clone(),
            None => stacks.push(ItemStack {
                id: UNASSIGNED_STACK_ID,
                ..snap.clone()
            }),
        }
    }
}

/// How many more units of `item` fit, counting partial stacks and free slots.
pub fn room_for(stacks: &[ItemStack], item: &ItemDef, max_slots: usize) -> u64 {
    let max = item.effective_max_stack();
    let partial_room: u64 = if item.max_durability.is_none() {
        stacks
            .iter()
            .filter(|s| s.item_id == item.id && s.qty > 0 && s.qty < max)
            .map(|s| (max - s.qty) as u64)
            .sum()
    } else {
        0
    };
    let free_slots = max_slots.saturating_sub(used_slots(stacks)) as u64;
    partial_room + free_slots * max as u64
}

/// Add `qty` units of `item`. All-or-nothing: returns `false` and leaves the
/// stacks untouched when the full quantity does not fit.
///
/// Existing partial stacks are topped up (oldest first) before new stacks
/// are opened. Durable items get one fresh stack per unit at full durability.
pub fn add_item(stacks: &mut Vec<ItemStack>, item: &ItemDef, qty: u32, max_slots: usize) -> bool {
    if qty == 0 {
        return true;
    }
    if room_for(stacks, item, max_slots) < qty as u64 {
        return false;
    }

    let max = item.effective_max_stack();
    let mut remaining = qty;

    if item.max_durability.is_none() {
        let mut partials: Vec<&mut ItemStack> = stacks
            .iter_mut()
            .filter(|s| s.item_id == item.id && s.qty > 0 && s.qty < max)
            .collect();
        partials.sort_by_key(|s| s.age_key());
        for stack in partials {
            let take = (max - stack.qty).min(remaining);
            stack.qty += take;
            remaining -= take;
            if remaining == 0 {
                break;
            }
        }
    }

    while remaining > 0 {
        let take = max.min(remaining);
        let stack = match item.max_durability {
            Some(d) => ItemStack::with_durability(&item.id, take, d),
            None => ItemStack::new(&item.id, take),
        };
        stacks.push(stack);
        remaining -= take;
    }
    true
}

/// Remove `qty` units of `item_id`, oldest stacks first. All-or-nothing.
pub fn remove_item(stacks: &mut Vec<ItemStack>, item_id: &str, qty: u32) -> bool {
    if count(stacks, item_id) < qty as u64 {
        return false;
    }
    let mut order: Vec<usize> = (0..stacks.len())
        .filter(|&i| stacks[i].item_id == item_id && stacks[i].qty > 0)
        .collect();
    order.sort_by_key(|&i| stacks[i].age_key());

    let mut remaining = qty;
    for i in order {
        if remaining == 0 {
            break;
        }
        let take = stacks[i].qty.min(remaining);
        stacks[i].qty -= take;
        remaining -= take;
    }
    prune(stacks);
    true
}

/// Result of granting a reward list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardGrant {
    pub granted: Vec<ItemQty>,
    /// Rewards that didn't fit (or aren't in the catalog) and were dropped.
    pub discarded: Vec<ItemQty>,
}

/// Add each reward independently; one that doesn't fit is discarded
/// without affecting the others.
pub fn grant_rewards(
    stacks: &mut Vec<ItemStack>,
    rewards: &[ItemQty],
    catalog: &Catalog,
    max_slots: usize,
) -> RewardGrant {
    let mut grant = RewardGrant::default();
    for reward in rewards {
        let added = catalog
            .item(&reward.item_id)
            .is_some_and(|item| add_item(stacks, item, reward.qty, max_slots));
        if added {
            grant.granted.push(reward.clone());
        } else {
            grant.discarded.push(reward.clone());
        }
    }
    grant
}

/// Storage seam for player inventories.
///
/// `update_inventory` must serialize mutations per player: the closure sees
/// the current stacks and its result is persisted before any other update
/// for that player can start. Zero-quantity stacks left by the closure are
/// deleted and unassigned ids receive fresh ones.
pub trait InventoryStore {
    fn stacks(&self, player_id: u64) -> Result<Vec<ItemStack>, StoreError>;

    fn update_inventory<R>(
        &self,
        player_id: u64,
        f: impl FnOnce(&mut Vec<ItemStack>) -> R,
    ) -> Result<R, StoreError>;

    /// Overwrite a player's inventory wholesale.
    fn replace_all(&self, player_id: u64, replacement: Vec<ItemStack>) -> Result<(), StoreError> {
        self.update_inventory(player_id, |stacks| *stacks = replacement)
    }
}

/// Grant `qty` of an item to a player. `false` if the item is unknown or
/// the inventory has no room for all of it.
pub fn add<S: InventoryStore + ?Sized>(
    store: &S,
    catalog: &Catalog,
    config: &EngineConfig,
    player_id: u64,
    item_id: &str,
    qty: u32,
) -> Result<bool, StoreError> {
    let Some(item) = catalog.item(item_id) else {
        log::warn!("Refusing to add unknown item {} to player {}", item_id, player_id);
        return Ok(false);
    };
    store.update_inventory(player_id, |stacks| {
        add_item(stacks, item, qty, config.inventory_slots)
    })
}

/// Take `qty` of an item from a player. `false` if they hold fewer.
pub fn remove<S: InventoryStore + ?Sized>(
    store: &S,
    player_id: u64,
    item_id: &str,
    qty: u32,
) -> Result<bool, StoreError> {
    store.update_inventory(player_id, |stacks| remove_item(stacks, item_id, qty))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wood() -> ItemDef {
        ItemDef {
            id: "item_wood".into(),
            name: "Wood".into(),
            max_stack: 10,
            max_durability: None,
        }
    }

    fn axe() -> ItemDef {
        ItemDef {
            id: "item_axe".into(),
            name: "Axe".into(),
            max_stack: 5,
            max_durability: Some(8),
        }
    }

    fn persisted(id: u64, item_id: &str, qty: u32) -> ItemStack {
        ItemStack {
            id,
            ..ItemStack::new(item_id, qty)
        }
    }

    #[test]
    fn test_add_fills_partial_before_new_stack() {
        let mut stacks = vec![persisted(1, "item_wood", 7)];
        assert!(add_item(&mut stacks, &wood(), 5, 4));
        assert_eq!(stacks.len(), 2);
        assert_eq!(stacks[0].qty, 10);
        assert_eq!(stacks[1].qty, 2);
        assert_eq!(stacks[1].id, UNASSIGNED_STACK_ID);
    }

    #[test]
    fn test_add_spills_into_multiple_stacks() {
        let mut stacks = Vec::new();
        assert!(add_item(&mut stacks, &wood(), 25, 4));
        let qtys: Vec<u32> = stacks.iter().map(|s| s.qty).collect();
        assert_eq!(qtys, vec![10, 10, 5]);
    }

    #[test]
    fn test_add_rejects_when_full_without_mutation() {
        let mut stacks = vec![persisted(1, "item_wood", 9), persisted(2, "item_stone", 3)];
        let before = stacks.clone();
        // One unit of room in the partial stack, no free slots.
        assert!(!add_item(&mut stacks, &wood(), 2, 2));
        assert_eq!(stacks, before);
        assert!(add_item(&mut stacks, &wood(), 1, 2));
        assert_eq!(stacks[0].qty, 10);
    }

    #[test]
    fn test_durable_items_never_stack() {
        let mut stacks = Vec::new();
        assert!(add_item(&mut stacks, &axe(), 2, 10));
        assert_eq!(stacks.len(), 2);
        assert!(stacks.iter().all(|s| s.qty == 1 && s.durability() == Some(8)));
    }

    #[test]
    fn test_remove_oldest_first() {
        let mut stacks = vec![
            persisted(5, "item_wood", 3),
            persisted(2, "item_wood", 4),
            persisted(9, "item_stone", 1),
        ];
        assert!(remove_item(&mut stacks, "item_wood", 5));
        // Stack 2 (older) drained and pruned, stack 5 keeps 2.
        assert_eq!(stacks.len(), 2);
        assert_eq!(stacks[0].id, 5);
        assert_eq!(stacks[0].qty, 2);
    }

    #[test]
    fn test_remove_insufficient_is_noop() {
        let mut stacks = vec![persisted(1, "item_wood", 3)];
        assert!(!remove_item(&mut stacks, "item_wood", 4));
        assert_eq!(stacks[0].qty, 3);
    }

    #[test]
    fn test_grant_discards_only_what_does_not_fit() {
        let catalog = Catalog::new(vec![wood(), axe()], vec![], vec![]).unwrap();
        let mut stacks = vec![persisted(1, "item_wood", 8)];
        let rewards = [
            ItemQty {
                item_id: "item_axe".into(),
                qty: 1,
            },
            ItemQty {
                item_id: "item_wood".into(),
                qty: 2,
            },
        ];
        // Single slot already used by wood: the axe needs a new slot, the
        // wood tops up the existing stack.
        let grant = grant_rewards(&mut stacks, &rewards, &catalog, 1);
        assert_eq!(grant.discarded.len(), 1);
        assert_eq!(grant.discarded[0].item_id, "item_axe");
        assert_eq!(grant.granted[0].item_id, "item_wood");
        assert_eq!(stacks[0].qty, 10);
    }

    #[test]
    fn test_aggregates() {
        let mut a = persisted(1, "item_axe", 1);
        a.set_durability(3);
        let mut b = persisted(2, "item_axe", 1);
        b.set_durability(4);
        let stacks = vec![a, b, persisted(3, "item_axe", 1)];
        assert_eq!(count(&stacks, "item_axe"), 3);
        assert_eq!(total_durability(&stacks, "item_axe"), 7);
    }

    #[test]
    fn test_restore_snapshot() {
        let snapshot = vec![persisted(1, "item_coal", 2), persisted(2, "item_coal", 3)];
        let mut stacks = vec![persisted(2, "item_coal", 1), persisted(5, "item_wood", 4)];
        restore(&mut stacks, &snapshot);
        assert_eq!(count(&stacks, "item_coal"), 5);
        assert_eq!(count(&stacks, "item_wood"), 4);
        assert_eq!(stacks.iter().find(|s| s.id == 2).map(|s| s.qty), Some(3));
        assert_eq!(stacks[2].id, UNASSIGNED_STACK_ID);
    }
}
