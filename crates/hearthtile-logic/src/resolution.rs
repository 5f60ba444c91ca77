//! Action resolution sweep and the periodic cleanup pass.
//!
//! Each tick the sweep takes a bounded batch from the ledger. Records not
//! yet due only get a `PlayerUpdated` nudge so clients can animate the
//! countdown. Due records go through the resolution steps in strict order:
//!
//! 1. claim the record (atomic removal; a second resolver sees nothing)
//! 2. look up the resource definition
//! 3. check and consume required items
//! 4. consume one unit of the tile's resource
//! 5. grant rewards, discarding what doesn't fit
//! 6. notify the quest collaborator
//! 7. publish the success message and player/tile updates
//!
//! Every failure after the claim is a notified no-op for that action only.
//! Items consumed in step 3 are not refunded if step 4 finds the resource
//! depleted. Storage errors are different: if one hits before step 4
//! succeeds, taken items are restored and the record goes back in the
//! ledger for the next tick.

use crate::availability::{self, CleanupReport, ResourceTracker};
use crate::catalog::{Catalog, ItemQty, ResourceDef};
use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::events::{notify, ActionContext, EventBus, GameEvent, MessageLog, Severity};
use crate::inventory::{self, InventoryStore, ItemStack};
use crate::ledger::{ActionLedger, ActionRecord};
use crate::quest::QuestHook;
use crate::requirements::{self, RequirementFailure};

/// Everything the sweeps need from the storage layer.
pub trait Storage: ActionLedger + InventoryStore + ResourceTracker + MessageLog {}

impl<T> Storage for T where T: ActionLedger + InventoryStore + ResourceTracker + MessageLog + ?Sized {}

/// How one due record was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Completed {
        rewards: Vec<ItemQty>,
        discarded: Vec<ItemQty>,
    },
    /// The resource was removed from the catalog after the action started.
    ResourceMissing,
    MissingItems {
        item_id: String,
        have: u64,
        need: u64,
    },
    InsufficientDurability {
        item_id: String,
        have: u64,
        need: u64,
    },
    /// Another player emptied the node first. `consumed` lists required
    /// items that were used up anyway.
    Depleted { consumed: Vec<ItemQty> },
    /// The record was already gone (resolved by another sweep).
    AlreadyResolved,
}

impl Resolution {
    pub fn is_success(&self) -> bool {
        matches!(self, Resolution::Completed { .. })
    }
}

impl From<RequirementFailure> for Resolution {
    fn from(f: RequirementFailure) -> Self {
        match f {
            RequirementFailure::MissingItems {
                item_id,
                have,
                need,
            } => Resolution::MissingItems {
                item_id,
                have,
                need,
            },
            RequirementFailure::InsufficientDurability {
                item_id,
                have,
                need,
            } => Resolution::InsufficientDurability {
                item_id,
                have,
                need,
            },
        }
    }
}

/// Summary of one sweep tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    /// Records not yet due that got a progress nudge.
    pub pending: usize,
    pub resolved: Vec<(u64, Resolution)>,
}

impl SweepReport {
    pub fn successes(&self) -> usize {
        self.resolved.iter().filter(|(_, r)| r.is_success()).count()
    }
}

/// Summary of one cleanup tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub resources: CleanupReport,
    pub messages_pruned: usize,
}

/// How far a claimed record got before a storage error.
enum Stage {
    Claimed,
    /// Required items were taken; holds their stacks as they were before.
    InputsTaken(Vec<ItemStack>),
    /// The node was decremented, so the action cannot simply be retried.
    NodeTaken,
}

/// Drives both periodic sweeps over a storage backend.
pub struct Sweeper<'a, S: ?Sized, B: ?Sized, Q: ?Sized> {
    store: &'a S,
    bus: &'a B,
    quests: &'a Q,
    catalog: &'a Catalog,
    config: &'a EngineConfig,
}

impl<'a, S, B, Q> Sweeper<'a, S, B, Q>
where
    S: Storage + ?Sized,
    B: EventBus + ?Sized,
    Q: QuestHook + ?Sized,
{
    pub fn new(
        store: &'a S,
        bus: &'a B,
        quests: &'a Q,
        catalog: &'a Catalog,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            store,
            bus,
            quests,
            catalog,
            config,
        }
    }

    /// One resolution tick. A storage failure stops the batch and is
    /// returned; unprocessed records stay in the ledger for the next tick.
    pub fn sweep(&self, now: u64) -> Result<SweepReport, StoreError> {
        let batch = self.store.batch(self.config.sweep_batch_size)?;
        let mut report = SweepReport {
            examined: batch.len(),
            ..SweepReport::default()
        };

        for record in &batch {
            if !record.is_due(now) {
                report.pending += 1;
                self.bus.publish(GameEvent::PlayerUpdated {
                    player_id: record.player_id,
                });
                continue;
            }
            let outcome = self.resolve(record, now)?;
            report.resolved.push((record.player_id, outcome));
        }

        if !report.resolved.is_empty() {
            log::info!(
                "Sweep resolved {} action(s), {} succeeded, {} pending",
                report.resolved.len(),
                report.successes(),
                report.pending
            );
        }
        Ok(report)
    }

    /// Resolve a single record. Safe to call twice: the second call finds
    /// the record already claimed and does nothing.
    ///
    /// On a storage error before the node is consumed, taken inputs are put
    /// back and the record is requeued for the next tick. Past that point
    /// the player is told the action failed.
    pub fn resolve(&self, record: &ActionRecord, now: u64) -> Result<Resolution, StoreError> {
        if !self
            .store
            .complete(record.player_id, record.tile_x, record.tile_y)?
        {
            return Ok(Resolution::AlreadyResolved);
        }

        let mut stage = Stage::Claimed;
        let result = self.resolve_claimed(record, now, &mut stage);
        if let Err(err) = &result {
            log::error!(
                "Resolving action for player {} failed: {}",
                record.player_id,
                err
            );
            self.recover(record, now, stage);
        }
        result
    }

    fn recover(&self, record: &ActionRecord, now: u64, stage: Stage) {
        let player_id = record.player_id;
        let retry = match stage {
            Stage::Claimed => true,
            Stage::InputsTaken(snapshot) => match self
                .store
                .update_inventory(player_id, |stacks| inventory::restore(stacks, &snapshot))
            {
                Ok(()) => true,
                Err(err) => {
                    log::error!("Could not refund inputs for player {}: {}", player_id, err);
                    false
                }
            },
            Stage::NodeTaken => false,
        };

        if retry {
            match self.store.insert_if_absent(record.clone()) {
                Ok(_) => return,
                Err(err) => {
                    log::error!("Could not requeue action for player {}: {}", player_id, err)
                }
            }
        }
        if let Err(err) = self.message(
            record,
            now,
            Severity::Error,
            "Something went wrong and your action could not be completed.".into(),
        ) {
            log::error!("Could not notify player {} of the failure: {}", player_id, err);
        }
    }

    fn resolve_claimed(
        &self,
        record: &ActionRecord,
        now: u64,
        stage: &mut Stage,
    ) -> Result<Resolution, StoreError> {
        let player_id = record.player_id;
        let (x, y) = (record.tile_x, record.tile_y);

        let Some(def) = self.catalog.resource(&record.resource_id) else {
            log::warn!(
                "Player {} was collecting {} which no longer exists",
                player_id,
                record.resource_id
            );
            self.message(
                record,
                now,
                Severity::Warning,
                "That resource is no longer available.".into(),
            )?;
            self.publish_player(player_id);
            return Ok(Resolution::ResourceMissing);
        };

        let consumed = if def.required_items.is_empty() {
            Vec::new()
        } else {
            let checked = self.store.update_inventory(player_id, |stacks| {
                let snapshot: Vec<ItemStack> = stacks
                    .iter()
                    .filter(|s| def.required_items.iter().any(|r| r.item_id == s.item_id))
                    .cloned()
                    .collect();
                requirements::consume_requirements(stacks, &def.required_items)
                    .map(|report| (report, snapshot))
            })?;
            match checked {
                Ok((report, snapshot)) => {
                    *stage = Stage::InputsTaken(snapshot);
                    report.consumed
                }
                Err(failure) => {
                    log::debug!("Player {} failed requirements: {:?}", player_id, failure);
                    let text = self.requirement_text(def, &failure);
                    self.message(record, now, Severity::Error, text)?;
                    self.publish_player(player_id);
                    return Ok(failure.into());
                }
            }
        };

        if !availability::try_consume(self.store, x, y, def, now)? {
            self.message(
                record,
                now,
                Severity::Error,
                format!("Resource depleted: the {} has nothing left.", def.name),
            )?;
            self.publish_player(player_id);
            self.bus.publish(GameEvent::TileUpdated { x, y });
            return Ok(Resolution::Depleted { consumed });
        }
        *stage = Stage::NodeTaken;

        let grant = if def.reward_items.is_empty() {
            inventory::RewardGrant::default()
        } else {
            let slots = self.config.inventory_slots;
            self.store.update_inventory(player_id, |stacks| {
                inventory::grant_rewards(stacks, &def.reward_items, self.catalog, slots)
            })?
        };

        if let Err(err) = self.quests.on_resource_completed(player_id, &def.id) {
            log::warn!(
                "Quest hook failed for player {} on {}: {}",
                player_id,
                def.id,
                err
            );
        }

        if !grant.discarded.is_empty() {
            self.message(
                record,
                now,
                Severity::Warning,
                format!(
                    "Your inventory is full. Discarded: {}.",
                    self.describe(&grant.discarded)
                ),
            )?;
        }
        self.message(record, now, Severity::Success, self.success_text(def, &grant.granted))?;
        self.publish_player(player_id);
        self.bus.publish(GameEvent::TileUpdated { x, y });

        Ok(Resolution::Completed {
            rewards: grant.granted,
            discarded: grant.discarded,
        })
    }

    /// One cleanup tick: respawn/drop resource instances and trim messages.
    pub fn cleanup(&self, now: u64) -> Result<MaintenanceReport, StoreError> {
        let resources = availability::cleanup(self.store, self.catalog, self.config, now)?;
        for &(x, y) in &resources.tiles {
            self.bus.publish(GameEvent::TileUpdated { x, y });
        }
        let messages_pruned = self.store.prune(self.config.message_retention)?;
        Ok(MaintenanceReport {
            resources,
            messages_pruned,
        })
    }

    fn message(
        &self,
        record: &ActionRecord,
        now: u64,
        severity: Severity,
        text: String,
    ) -> Result<(), StoreError> {
        let context = ActionContext::resource(&record.resource_id, record.tile_x, record.tile_y);
        notify(
            self.store,
            self.bus,
            record.player_id,
            severity,
            text,
            Some(context),
            now,
        )
        .map(|_| ())
    }

    fn publish_player(&self, player_id: u64) {
        self.bus.publish(GameEvent::PlayerUpdated { player_id });
    }

    fn describe(&self, items: &[ItemQty]) -> String {
        items
            .iter()
            .map(|i| format!("{}x {}", i.qty, self.catalog.item_name(&i.item_id)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn success_text(&self, def: &ResourceDef, granted: &[ItemQty]) -> String {
        if granted.is_empty() {
            format!("You {} the {}.", def.verb, def.name)
        } else {
            format!(
                "You {} the {} and receive {}.",
                def.verb,
                def.name,
                self.describe(granted)
            )
        }
    }

    fn requirement_text(&self, def: &ResourceDef, failure: &RequirementFailure) -> String {
        match failure {
            RequirementFailure::MissingItems { item_id, need, .. } => format!(
                "You are missing required items: you need {}x {} to {} the {}.",
                need,
                self.catalog.item_name(item_id),
                def.verb,
                def.name
            ),
            RequirementFailure::InsufficientDurability { item_id, .. } => format!(
                "Insufficient durability: your {} is too worn to {} the {}.",
                self.catalog.item_name(item_id),
                def.verb,
                def.name
            ),
        }
    }
}
