//! Required-item evaluation: aggregate checks, then consumption and wear.
//!
//! The check runs against the full inventory before anything is touched, so
//! a failed check never mutates stacks. Consumption order is deterministic:
//! - consumed quantities come out of the oldest stacks first;
//! - durability drains from the most worn stack first (lowest durability,
//!   ties broken by age), and a stack whose durability hits zero is gone;
//! - a row that both wears and consumes applies its wear first, then takes
//!   its quantity from whatever stacks survived.

use crate::catalog::{ItemQty, RequiredItem};
use crate::inventory::{self, ItemStack};

/// Why a player can't perform an action with their current inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequirementFailure {
    MissingItems { item_id: String, have: u64, need: u64 },
    InsufficientDurability { item_id: String, have: u64, need: u64 },
}

/// What a successful consumption took out of the inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumptionReport {
    pub consumed: Vec<ItemQty>,
    pub durability_used: Vec<(String, u32)>,
    /// Item ids of stacks destroyed by wear.
    pub broken: Vec<String>,
}

/// Per-item totals when the same item appears in several requirement rows.
fn merged_needs(required: &[RequiredItem]) -> Vec<(&str, u64, u64)> {
    let mut needs: Vec<(&str, u64, u64)> = Vec::new();
    for req in required {
        let wear = req.durability_reduction.unwrap_or(0) as u64;
        match needs.iter_mut().find(|(id, _, _)| *id == req.item_id) {
            Some(entry) => {
                entry.1 += req.qty as u64;
                entry.2 += wear;
            }
            None => needs.push((req.item_id.as_str(), req.qty as u64, wear)),
        }
    }
    needs
}

/// Verify quantity and durability requirements without mutating anything.
///
/// Quantity shortfalls are reported before durability shortfalls.
pub fn check_requirements(
    stacks: &[ItemStack],
    required: &[RequiredItem],
) -> Result<(), RequirementFailure> {
    let needs = merged_needs(required);

    for &(item_id, need, _) in &needs {
        let have = inventory::count(stacks, item_id);
        if have < need {
            return Err(RequirementFailure::MissingItems {
                item_id: item_id.to_string(),
                have,
                need,
            });
        }
    }

    for &(item_id, _, wear) in &needs {
        if wear == 0 {
            continue;
        }
        let have = inventory::total_durability(stacks, item_id);
        if have < wear {
            return Err(RequirementFailure::InsufficientDurability {
                item_id: item_id.to_string(),
                have,
                need: wear,
            });
        }
    }
    Ok(())
}

/// Check, then consume and wear required items in place. Zero-quantity
/// stacks are pruned before returning.
pub fn consume_requirements(
    stacks: &mut Vec<ItemStack>,
    required: &[RequiredItem],
) -> Result<ConsumptionReport, RequirementFailure> {
    check_requirements(stacks, required)?;

    let mut report = ConsumptionReport::default();
    for req in required {
        if let Some(wear) = req.durability_reduction.filter(|w| *w > 0) {
            let used = drain_durability(stacks, &req.item_id, wear, &mut report.broken);
            report.durability_used.push((req.item_id.clone(), used));
        }
        if req.consumed {
            let taken = take_oldest(stacks, &req.item_id, req.qty);
            report.consumed.push(ItemQty {
                item_id: req.item_id.clone(),
                qty: taken,
            });
        }
    }
    inventory::prune(stacks);
    Ok(report)
}

/// Returns how many units were actually taken.
fn take_oldest(stacks: &mut [ItemStack], item_id: &str, qty: u32) -> u32 {
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
    qty - remaining
}

/// Returns the durability actually drained (less than `wear` only when an
/// earlier row already consumed some of the stacks).
fn drain_durability(
    stacks: &mut [ItemStack],
    item_id: &str,
    wear: u32,
    broken: &mut Vec<String>,
) -> u32 {
    let mut order: Vec<usize> = (0..stacks.len())
        .filter(|&i| {
            stacks[i].item_id == item_id
                && stacks[i].qty > 0
                && stacks[i].durability().unwrap_or(0) > 0
        })
        .collect();
    order.sort_by_key(|&i| (stacks[i].durability().unwrap_or(0), stacks[i].age_key()));

    let mut remaining = wear;
    for i in order {
        if remaining == 0 {
            break;
        }
        let current = stacks[i].durability().unwrap_or(0);
        let take = current.min(remaining);
        stacks[i].set_durability(current - take);
        remaining -= take;
        if current == take {
            stacks[i].qty = 0;
            broken.push(item_id.to_string());
        }
    }
    wear - remaining
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(item_id: &str, qty: u32, consumed: bool, wear: Option<u32>) -> RequiredItem {
        RequiredItem {
            item_id: item_id.into(),
            qty,
            consumed,
            durability_reduction: wear,
        }
    }

    fn stack(id: u64, item_id: &str, qty: u32) -> ItemStack {
        ItemStack {
            id,
            ..ItemStack::new(item_id, qty)
        }
    }

    fn tool(id: u64, durability: u32) -> ItemStack {
        ItemStack {
            id,
            ..ItemStack::with_durability("item_pick", 1, durability)
        }
    }

    #[test]
    fn test_missing_item() {
        let stacks = vec![stack(1, "item_coal", 1)];
        let err = check_requirements(&stacks, &[req("item_ore", 1, true, None)]).unwrap_err();
        assert_eq!(
            err,
            RequirementFailure::MissingItems {
                item_id: "item_ore".into(),
                have: 0,
                need: 1
            }
        );
    }

    #[test]
    fn test_quantity_aggregates_across_stacks() {
        let mut stacks = vec![stack(1, "item_ore", 2), stack(2, "item_ore", 2)];
        let report = consume_requirements(&mut stacks, &[req("item_ore", 3, true, None)]).unwrap();
        assert_eq!(report.consumed[0].qty, 3);
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].id, 2);
        assert_eq!(stacks[0].qty, 1);
    }

    #[test]
    fn test_unconsumed_requirement_keeps_items() {
        let mut stacks = vec![stack(1, "item_hammer", 1)];
        consume_requirements(&mut stacks, &[req("item_hammer", 1, false, None)]).unwrap();
        assert_eq!(stacks[0].qty, 1);
    }

    #[test]
    fn test_durability_then_rejection() {
        let mut stacks = vec![tool(1, 5)];
        let wear = [req("item_pick", 1, false, Some(3))];

        consume_requirements(&mut stacks, &wear).unwrap();
        assert_eq!(stacks[0].durability(), Some(2));
        assert_eq!(stacks[0].qty, 1);

        let err = consume_requirements(&mut stacks, &wear).unwrap_err();
        assert!(matches!(
            err,
            RequirementFailure::InsufficientDurability { have: 2, need: 3, .. }
        ));
        assert_eq!(stacks[0].durability(), Some(2));
        assert_eq!(stacks[0].qty, 1);
    }

    #[test]
    fn test_durability_exhaustion_removes_stack() {
        let mut stacks = vec![tool(1, 3)];
        let report =
            consume_requirements(&mut stacks, &[req("item_pick", 1, false, Some(3))]).unwrap();
        assert!(stacks.is_empty());
        assert_eq!(report.broken, vec!["item_pick".to_string()]);
    }

    #[test]
    fn test_durability_drains_most_worn_first() {
        let mut stacks = vec![tool(1, 6), tool(2, 2)];
        consume_requirements(&mut stacks, &[req("item_pick", 1, false, Some(3))]).unwrap();
        // Stack 2 is exhausted, stack 1 absorbs the remaining point.
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].id, 1);
        assert_eq!(stacks[0].durability(), Some(5));
    }

    #[test]
    fn test_consumed_and_worn_row_wears_first() {
        let mut stacks = vec![tool(1, 5), tool(2, 1)];
        let report =
            consume_requirements(&mut stacks, &[req("item_pick", 1, true, Some(3))]).unwrap();
        // Pick 2 breaks, pick 1 drops to 3, then the surviving pick is consumed.
        assert_eq!(report.durability_used, vec![("item_pick".to_string(), 3)]);
        assert_eq!(report.broken, vec!["item_pick".to_string()]);
        assert_eq!(report.consumed[0].qty, 1);
        assert!(stacks.is_empty());
    }

    #[test]
    fn test_wear_breaking_stacks_limits_consumption() {
        let mut stacks = vec![tool(1, 5), tool(2, 1)];
        let report =
            consume_requirements(&mut stacks, &[req("item_pick", 2, true, Some(1))]).unwrap();
        assert_eq!(report.durability_used, vec![("item_pick".to_string(), 1)]);
        assert_eq!(report.consumed[0].qty, 1);
        assert!(stacks.is_empty());
    }

    #[test]
    fn test_quantity_checked_before_durability() {
        let stacks = vec![tool(1, 1)];
        let err =
            check_requirements(&stacks, &[req("item_pick", 2, false, Some(5))]).unwrap_err();
        assert!(matches!(err, RequirementFailure::MissingItems { .. }));
    }

    #[test]
    fn test_duplicate_rows_are_merged() {
        let stacks = vec![stack(1, "item_ore", 3)];
        let rows = [req("item_ore", 2, true, None), req("item_ore", 2, true, None)];
        assert!(matches!(
            check_requirements(&stacks, &rows),
            Err(RequirementFailure::MissingItems { need: 4, .. })
        ));
    }
}
