//! Quest-progress collaborator invoked after a successful collection.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::QuestError;

/// Consumed interface: advance objectives when a player finishes collecting
/// a resource. Best-effort; the engine logs failures and moves on.
pub trait QuestHook {
    fn on_resource_completed(&self, player_id: u64, resource_id: &str) -> Result<(), QuestError>;
}

/// Hook for deployments without quests.
pub struct NoQuests;

impl QuestHook for NoQuests {
    fn on_resource_completed(&self, _player_id: u64, _resource_id: &str) -> Result<(), QuestError> {
        Ok(())
    }
}

/// Counts completions per `(player, resource)`; enough for "collect N"
/// objectives.
#[derive(Default)]
pub struct CompletionTally {
    counts: Mutex<BTreeMap<(u64, String), u32>>,
}

impl CompletionTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, player_id: u64, resource_id: &str) -> u32 {
        self.counts
            .lock()
            .ok()
            .and_then(|c| c.get(&(player_id, resource_id.to_string())).copied())
            .unwrap_or(0)
    }
}

impl QuestHook for CompletionTally {
    fn on_resource_completed(&self, player_id: u64, resource_id: &str) -> Result<(), QuestError> {
        let mut counts = self
            .counts
            .lock()
            .map_err(|_| QuestError("tally lock poisoned".into()))?;
        *counts.entry((player_id, resource_id.to_string())).or_insert(0) += 1;
        Ok(())
    }
}
