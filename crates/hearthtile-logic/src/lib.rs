//! Action and resource progression engine for Hearthtile.
//!
//! Players start timed actions on map tiles (chop a tree, mine a vein,
//! smelt at a furnace). Records sit in a ledger until a periodic sweep
//! resolves them: required items are checked and worn, the tile's node is
//! consumed, rewards land in the inventory, and notifications go out.
//!
//! Everything here is independent of any database. Storage is reached
//! through small traits so the SpacetimeDB module and the in-memory
//! backend share the same rules.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`availability`] | Per-tile finite resource instances, depletion, respawn |
//! | [`catalog`] | Item and resource definitions loaded from JSON |
//! | [`config`] | Sweep cadence, batch bounds, retention, inventory size |
//! | [`error`] | Storage, catalog and collaborator error types |
//! | [`events`] | Change events, system messages, pub/sub bus |
//! | [`inventory`] | Stacking, capacity, add/remove, reward grants |
//! | [`ledger`] | One in-flight action per player; start/complete |
//! | [`memory`] | In-process backend for tests and the harness |
//! | [`quest`] | Quest-progress hook invoked on completion |
//! | [`requirements`] | Required-item checks, consumption, durability wear |
//! | [`resolution`] | The resolution sweep and the cleanup sweep |

pub mod availability;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod inventory;
pub mod ledger;
pub mod memory;
pub mod quest;
pub mod requirements;
pub mod resolution;
