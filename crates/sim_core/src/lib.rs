//! # Sim Core
//!
//! Deterministic game-simulation engine for a lockstep multiplayer RTS.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! Every peer in a session runs the same simulation from the same inputs;
//! the engine guarantees bit-identical state on every tick. Desyncs are
//! detected by hashing state samples and repaired by the sync protocol
//! in [`sync`].
//!
//! ## Crate Structure
//!
//! - [`map`] - terrain cell grid, heights, occupancy
//! - [`item`] - items (units and shots) and their work categories
//! - [`registry`] - item ownership, ID minting, deferred deletion
//! - [`scheduler`] - work-class advance lists and cadence
//! - [`visibility`] - fog-of-war and radar/jammer signals
//! - [`combat`] - explosions, damage mitigation, destruction
//! - [`ballistics`] - projectile flight models
//! - [`events`] - declared named events with delayed delivery
//! - [`simulation`] - the tick driver
//! - [`sync`] - network desync detection and repair protocol
//! - [`math`] - fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ballistics;
pub mod combat;
pub mod config;
pub mod error;
pub mod events;
pub mod item;
pub mod map;
pub mod math;
pub mod pathfinding;
pub mod player;
pub mod registry;
pub mod scheduler;
pub mod simulation;
pub mod sync;
pub mod visibility;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ballistics::{Shot, ShotKind};
    pub use crate::config::{RuleSet, SchedulerConfig, UnitType, UnitTypeId, WeaponDef};
    pub use crate::error::{GameError, Result};
    pub use crate::events::{Event, EventListener, EventQueue};
    pub use crate::item::{
        Body, Item, ItemId, PlayerId, Work, WorkClass, INVALID_ITEM, NEUTRAL_PLAYER,
    };
    pub use crate::map::GameMap;
    pub use crate::math::{Fixed, Vec2Fixed, Vec3Fixed};
    pub use crate::player::Player;
    pub use crate::simulation::Simulation;
}
