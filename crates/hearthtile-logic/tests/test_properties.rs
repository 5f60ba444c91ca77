//! Property tests for inventory capacity, depletion and requirement checks.

use proptest::prelude::*;

use hearthtile_logic::availability::{consume_from, ResourceInstance};
use hearthtile_logic::catalog::{ItemDef, RequiredItem};
use hearthtile_logic::inventory::{self, ItemStack};
use hearthtile_logic::requirements::consume_requirements;

fn ore_def(max_stack: u32) -> ItemDef {
    ItemDef {
        id: "item_ore".into(),
        name: "Ore".into(),
        max_stack,
        max_durability: None,
    }
}

fn tools(durabilities: &[u32]) -> Vec<ItemStack> {
    durabilities
        .iter()
        .enumerate()
        .map(|(i, &d)| ItemStack {
            id: i as u64 + 1,
            ..ItemStack::with_durability("item_pick", 1, d)
        })
        .collect()
}

proptest! {
    #[test]
    fn adds_respect_stack_and_slot_limits(
        max_stack in 1u32..20,
        slots in 1usize..6,
        adds in prop::collection::vec(1u32..30, 0..12),
    ) {
        let def = ore_def(max_stack);
        let mut stacks = Vec::new();
        let mut expected = 0u64;
        for qty in adds {
            let before = stacks.clone();
            if inventory::add_item(&mut stacks, &def, qty, slots) {
                expected += qty as u64;
            } else {
                prop_assert_eq!(&stacks, &before);
            }
        }
        prop_assert_eq!(inventory::count(&stacks, "item_ore"), expected);
        prop_assert!(inventory::used_slots(&stacks) <= slots);
        prop_assert!(stacks.iter().all(|s| s.qty <= max_stack));
    }

    #[test]
    fn finite_node_yields_exactly_its_amount(amount in 0u32..20, attempts in 0usize..40) {
        let mut inst = ResourceInstance {
            x: 0,
            y: 0,
            resource_id: "resource_vein".into(),
            amount_remaining: amount,
            depleted_at: None,
        };
        let successes = (0..attempts).filter(|&t| consume_from(&mut inst, t as u64)).count();
        prop_assert_eq!(successes, attempts.min(amount as usize));
    }

    #[test]
    fn failed_requirements_leave_inventory_untouched(
        durabilities in prop::collection::vec(1u32..10, 0..5),
        wear in 1u32..30,
    ) {
        let mut stacks = tools(&durabilities);
        let before = stacks.clone();
        let total: u64 = durabilities.iter().map(|&d| d as u64).sum();
        let required = [RequiredItem {
            item_id: "item_pick".into(),
            qty: 1,
            consumed: false,
            durability_reduction: Some(wear),
        }];
        let result = consume_requirements(&mut stacks, &required);
        if durabilities.is_empty() || total < wear as u64 {
            prop_assert!(result.is_err());
            prop_assert_eq!(stacks, before);
        } else {
            prop_assert!(result.is_ok());
            let left: u64 = stacks.iter().map(|s| s.durability().unwrap_or(0) as u64).sum();
            prop_assert_eq!(left, total - wear as u64);
        }
    }
}
