//! Hearthtile Server - SpacetimeDB Module
//!
//! Persistent tile world where players start timed collection actions.
//! Rules live in hearthtile-logic; this module stores state in tables and
//! drives the resolution and cleanup sweeps from scheduled reducers.

mod reducers;
mod store;
mod tables;

pub use reducers::*;
pub use tables::*;
