//! Action ledger. At most one in-flight timed action per player.
//!
//! The ledger is the single source of truth for "what is in progress". A
//! record is created by [`start_action`] and destroyed when the sweep
//! resolves it; nothing else mutates it.

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::StoreError;

/// One in-flight action, keyed by `player_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub player_id: u64,
    pub tile_x: i32,
    pub tile_y: i32,
    pub resource_id: String,
    pub started_at: u64,
    pub completed_at: u64,
}

/// Live countdown for a record that isn't due yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionProgress {
    pub remaining_ms: u64,
    /// Elapsed share of the action, clamped to `[0, 1]`.
    pub fraction: f32,
}

impl ActionRecord {
    pub fn is_due(&self, now: u64) -> bool {
        self.completed_at <= now
    }

    pub fn progress(&self, now: u64) -> ActionProgress {
        let total = self.completed_at.saturating_sub(self.started_at);
        let elapsed = now.saturating_sub(self.started_at).min(total);
        let fraction = if total == 0 {
            1.0
        } else {
            elapsed as f32 / total as f32
        };
        ActionProgress {
            remaining_ms: self.completed_at.saturating_sub(now),
            fraction,
        }
    }
}

/// `started_at + collection_time` in milliseconds, rounded to the nearest ms.
/// Negative or NaN durations count as zero so `completed_at >= started_at`.
pub fn completion_time(started_at: u64, collection_time_secs: f64) -> u64 {
    let ms = (collection_time_secs * 1000.0).round();
    let ms = if ms.is_finite() && ms > 0.0 { ms as u64 } else { 0 };
    started_at.saturating_add(ms)
}

/// Sweep order: earliest completion first, then player id.
pub fn sort_for_sweep(records: &mut [ActionRecord]) {
    records.sort_by(|a, b| {
        a.completed_at
            .cmp(&b.completed_at)
            .then(a.player_id.cmp(&b.player_id))
    });
}

/// What occupies a tile, as far as the backend knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileResource {
    /// The backend doesn't track placements; anything goes.
    Unmapped,
    Empty,
    Placed(String),
}

/// Where players stand and what is placed on tiles.
pub trait PlayerLocator {
    fn tile_of(&self, player_id: u64) -> Result<Option<(i32, i32)>, StoreError>;

    fn resource_on_tile(&self, _x: i32, _y: i32) -> Result<TileResource, StoreError> {
        Ok(TileResource::Unmapped)
    }
}

/// Storage seam for the ledger.
///
/// `insert_if_absent` must be a single atomic check-and-insert on
/// `player_id` (unique key), and `complete` must report `true` to exactly
/// one caller when several race to remove the same record.
pub trait ActionLedger {
    fn insert_if_absent(&self, record: ActionRecord) -> Result<bool, StoreError>;

    fn in_progress(&self, player_id: u64) -> Result<Option<ActionRecord>, StoreError>;

    /// Remove the player's record at `(x, y)`. `false` if there was none.
    fn complete(&self, player_id: u64, x: i32, y: i32) -> Result<bool, StoreError>;

    /// Up to `limit` records in [`sort_for_sweep`] order, due or not.
    fn batch(&self, limit: usize) -> Result<Vec<ActionRecord>, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRejection {
    AlreadyBusy,
    UnknownResource,
    UnknownPlayer,
    NotOnTile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started(ActionRecord),
    Rejected(StartRejection),
}

impl StartOutcome {
    pub fn started(&self) -> bool {
        matches!(self, StartOutcome::Started(_))
    }
}

/// Begin collecting `resource_id` on the player's current tile.
///
/// Rejected without mutation when the player already has an action in
/// flight. The pre-check is only a fast path; the atomic
/// `insert_if_absent` decides races between concurrent starts.
pub fn start_action<S>(
    store: &S,
    catalog: &Catalog,
    player_id: u64,
    resource_id: &str,
    now: u64,
) -> Result<StartOutcome, StoreError>
where
    S: ActionLedger + PlayerLocator + ?Sized,
{
    if store.in_progress(player_id)?.is_some() {
        return Ok(StartOutcome::Rejected(StartRejection::AlreadyBusy));
    }
    let Some(def) = catalog.resource(resource_id) else {
        log::warn!("Player {} tried to start unknown resource {}", player_id, resource_id);
        return Ok(StartOutcome::Rejected(StartRejection::UnknownResource));
    };
    let Some((x, y)) = store.tile_of(player_id)? else {
        return Ok(StartOutcome::Rejected(StartRejection::UnknownPlayer));
    };
    match store.resource_on_tile(x, y)? {
        TileResource::Unmapped => {}
        TileResource::Placed(id) if id == def.id => {}
        _ => return Ok(StartOutcome::Rejected(StartRejection::NotOnTile)),
    }

    let record = ActionRecord {
        player_id,
        tile_x: x,
        tile_y: y,
        resource_id: def.id.clone(),
        started_at: now,
        completed_at: completion_time(now, def.collection_time),
    };
    if !store.insert_if_absent(record.clone())? {
        return Ok(StartOutcome::Rejected(StartRejection::AlreadyBusy));
    }
    log::debug!(
        "Player {} started {} at ({}, {}), due {}",
        player_id,
        def.id,
        x,
        y,
        record.completed_at
    );
    Ok(StartOutcome::Started(record))
}

/// Delete the player's record at `(x, y)`; tolerant of double completion.
pub fn complete_action<S: ActionLedger + ?Sized>(
    store: &S,
    player_id: u64,
    x: i32,
    y: i32,
) -> Result<(), StoreError> {
    store.complete(player_id, x, y).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(player_id: u64, completed_at: u64) -> ActionRecord {
        ActionRecord {
            player_id,
            tile_x: 0,
            tile_y: 0,
            resource_id: "resource_wood".into(),
            started_at: 0,
            completed_at,
        }
    }

    #[test]
    fn test_completion_time_rounds() {
        assert_eq!(completion_time(1_000, 5.0), 6_000);
        assert_eq!(completion_time(0, 1.2346), 1_235);
        assert_eq!(completion_time(0, 0.0004), 0);
        assert_eq!(completion_time(7, -3.0), 7);
        assert_eq!(completion_time(7, f64::NAN), 7);
    }

    #[test]
    fn test_progress() {
        let r = record(1, 4_000);
        let p = r.progress(1_000);
        assert_eq!(p.remaining_ms, 3_000);
        assert!((p.fraction - 0.25).abs() < 1e-6);
        let done = r.progress(9_000);
        assert_eq!(done.remaining_ms, 0);
        assert_eq!(done.fraction, 1.0);
        assert!(r.is_due(4_000));
        assert!(!r.is_due(3_999));
    }

    #[test]
    fn test_instant_action_progress() {
        let r = record(1, 0);
        assert_eq!(r.progress(0).fraction, 1.0);
    }

    #[test]
    fn test_sweep_order() {
        let mut rs = vec![record(3, 50), record(2, 10), record(1, 50)];
        sort_for_sweep(&mut rs);
        let order: Vec<u64> = rs.iter().map(|r| r.player_id).collect();
        assert_eq!(order, vec![2, 1, 3]);
    }
}
