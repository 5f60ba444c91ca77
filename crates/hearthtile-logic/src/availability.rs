//! Per-tile depletion and respawn of finite resources.
//!
//! Instances are created lazily at full amount the first time a finite node
//! is consumed, decremented atomically on each completion, and stamped with
//! `depleted_at` when they hit zero. The cleanup sweep deletes depleted
//! instances once their respawn delay has passed; the next consume then
//! recreates the node at full amount. Limitless resources never get an
//! instance.

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, ResourceDef};
use crate::config::EngineConfig;
use crate::error::StoreError;

/// Runtime state of a finite resource node on one tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInstance {
    pub x: i32,
    pub y: i32,
    pub resource_id: String,
    pub amount_remaining: u32,
    /// Millisecond timestamp at which the node reached zero.
    pub depleted_at: Option<u64>,
}

impl ResourceInstance {
    /// A node at full amount.
    pub fn fresh(x: i32, y: i32, def: &ResourceDef) -> Self {
        Self {
            x,
            y,
            resource_id: def.id.clone(),
            amount_remaining: def.amount,
            depleted_at: None,
        }
    }

    pub fn is_depleted(&self) -> bool {
        self.amount_remaining == 0
    }
}

/// The instance a consume should act on: the stored one when it still
/// tracks `def`, otherwise a fresh node (first use, or the tile now hosts a
/// different resource).
pub fn instance_for(
    existing: Option<ResourceInstance>,
    x: i32,
    y: i32,
    def: &ResourceDef,
) -> ResourceInstance {
    match existing {
        Some(inst) if inst.resource_id == def.id => inst,
        _ => ResourceInstance::fresh(x, y, def),
    }
}

/// Decrement-if-positive. Returns `false` when the node is already
/// depleted; an empty node missing its `depleted_at` stamp gets one so
/// cleanup can respawn it.
pub fn consume_from(instance: &mut ResourceInstance, now: u64) -> bool {
    if instance.amount_remaining == 0 {
        instance.depleted_at.get_or_insert(now);
        return false;
    }
    instance.amount_remaining -= 1;
    if instance.amount_remaining == 0 {
        instance.depleted_at = Some(now);
    }
    true
}

/// What the cleanup sweep should do with an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupVerdict {
    Keep,
    /// Depleted and past its respawn delay.
    Respawn,
    /// Its resource vanished from the catalog or became limitless.
    Stale,
}

pub fn cleanup_verdict(
    instance: &ResourceInstance,
    catalog: &Catalog,
    config: &EngineConfig,
    now: u64,
) -> CleanupVerdict {
    let Some(def) = catalog.resource(&instance.resource_id) else {
        return CleanupVerdict::Stale;
    };
    if def.limitless {
        return CleanupVerdict::Stale;
    }
    match instance.depleted_at {
        Some(at) if instance.is_depleted() => {
            if at.saturating_add(config.respawn_ms(def.respawn_time)) <= now {
                CleanupVerdict::Respawn
            } else {
                CleanupVerdict::Keep
            }
        }
        _ => CleanupVerdict::Keep,
    }
}

/// Outcome of one cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub respawned: usize,
    pub stale_removed: usize,
    /// Tiles whose node changed and should be re-rendered.
    pub tiles: Vec<(i32, i32)>,
}

impl CleanupReport {
    pub fn changed(&self) -> bool {
        self.respawned + self.stale_removed > 0
    }
}

/// Storage seam for tile-level resource state.
///
/// Implementations must make `consume_finite` a single atomic
/// decrement-if-positive (no lost updates between concurrent consumers) and
/// `remove_instance_if` a compare-and-delete.
pub trait ResourceTracker {
    fn instance(&self, x: i32, y: i32) -> Result<Option<ResourceInstance>, StoreError>;

    fn instances(&self) -> Result<Vec<ResourceInstance>, StoreError>;

    fn consume_finite(
        &self,
        x: i32,
        y: i32,
        def: &ResourceDef,
        now: u64,
    ) -> Result<bool, StoreError>;

    /// Delete the instance at its tile only if it still equals `expected`.
    fn remove_instance_if(&self, expected: &ResourceInstance) -> Result<bool, StoreError>;
}

/// Take one unit of a resource at `(x, y)`. Limitless resources always
/// succeed; finite ones fail once depleted.
pub fn try_consume<S: ResourceTracker + ?Sized>(
    store: &S,
    x: i32,
    y: i32,
    def: &ResourceDef,
    now: u64,
) -> Result<bool, StoreError> {
    if def.limitless {
        return Ok(true);
    }
    let ok = store.consume_finite(x, y, def, now)?;
    if !ok {
        log::debug!("{} at ({}, {}) is depleted", def.id, x, y);
    }
    Ok(ok)
}

/// Respawn depleted instances whose delay has elapsed and drop stale ones.
/// Running it twice with no time elapsed changes nothing the second time.
pub fn cleanup<S: ResourceTracker + ?Sized>(
    store: &S,
    catalog: &Catalog,
    config: &EngineConfig,
    now: u64,
) -> Result<CleanupReport, StoreError> {
    let mut report = CleanupReport::default();
    for inst in store.instances()? {
        match cleanup_verdict(&inst, catalog, config, now) {
            CleanupVerdict::Keep => {}
            CleanupVerdict::Respawn => {
                if store.remove_instance_if(&inst)? {
                    report.respawned += 1;
                    report.tiles.push((inst.x, inst.y));
                }
            }
            CleanupVerdict::Stale => {
                if store.remove_instance_if(&inst)? {
                    report.stale_removed += 1;
                    report.tiles.push((inst.x, inst.y));
                }
            }
        }
    }
    if report.changed() {
        log::info!(
            "Resource cleanup: {} respawned, {} stale removed",
            report.respawned,
            report.stale_removed
        );
    }
    Ok(report)
}
