//! Engine tuning knobs for sweep cadence, batch bounds, retention and capacity.
//!
//! Loaded once at startup. Any field missing from the JSON falls back to
//! its production default, so a config file only needs the overrides.

use serde::{Deserialize, Serialize};

/// Runtime configuration shared by the sweeps and the start-action path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cadence of the action resolution sweep.
    pub sweep_interval_ms: u64,
    /// Cadence of the resource cleanup / message retention sweep.
    pub cleanup_interval_ms: u64,
    /// Upper bound on ledger records examined per sweep.
    pub sweep_batch_size: usize,
    /// System messages kept per player after pruning.
    pub message_retention: usize,
    /// Inventory slots per player (one stack per slot).
    pub inventory_slots: usize,
    /// Respawn delay for finite resources that don't declare their own.
    pub default_respawn_secs: u32,
    /// Age after which notification rows are dropped (server backend only).
    pub event_retention_secs: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 100,
            cleanup_interval_ms: 1000,
            sweep_batch_size: 500,
            message_retention: 20,
            inventory_slots: 30,
            default_respawn_secs: 60,
            event_retention_secs: 30,
        }
    }
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON override document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Respawn delay in milliseconds for a resource, honoring its own override.
    pub fn respawn_ms(&self, resource_respawn_secs: Option<u32>) -> u64 {
        resource_respawn_secs.unwrap_or(self.default_respawn_secs) as u64 * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_production_cadence() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.sweep_interval_ms, 100);
        assert_eq!(cfg.sweep_batch_size, 500);
        assert_eq!(cfg.message_retention, 20);
    }

    #[test]
    fn test_partial_override() {
        let cfg = EngineConfig::from_json(r#"{ "sweep_batch_size": 50 }"#).unwrap();
        assert_eq!(cfg.sweep_batch_size, 50);
        assert_eq!(cfg.inventory_slots, 30);
    }

    #[test]
    fn test_respawn_ms() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.respawn_ms(None), 60_000);
        assert_eq!(cfg.respawn_ms(Some(5)), 5_000);
    }
}
