//! Pathfinder service seam.
//!
//! The simulation calls into the pathfinder once per tick and asks it for
//! movement steps; the algorithm behind the seam is deliberately simple
//! here (straight-line walk with passability checks) and can be swapped
//! without touching the tick driver.

use serde::{Deserialize, Serialize};

use crate::map::GameMap;
use crate::math::{Fixed, Vec2Fixed};

/// The pathfinding service for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pathfinder {
    /// Advance calls served, for diagnostics.
    advance_calls: u64,
}

impl Pathfinder {
    /// Create the service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-tick housekeeping hook, called by the tick driver.
    pub fn advance(&mut self) {
        self.advance_calls += 1;
    }

    /// One movement step of at most `speed` cells from `from` toward `to`.
    ///
    /// Returns `None` when the destination is reached within one step or
    /// the next cell is impassable for this mover.
    #[must_use]
    pub fn next_step(
        &self,
        map: &GameMap,
        from: Vec2Fixed,
        to: Vec2Fixed,
        speed: Fixed,
        is_flying: bool,
    ) -> Option<Vec2Fixed> {
        if speed <= Fixed::ZERO {
            return None;
        }
        let diff = to - from;
        let dist_sq = diff.dot(diff);
        if dist_sq <= speed * speed {
            return None;
        }

        let step = diff.normalize().scaled(speed);
        let next = from + step;
        let (nx, ny) = (next.x.to_num::<i32>(), next.y.to_num::<i32>());
        if !map.can_go(is_flying, nx, ny) {
            return None;
        }
        Some(step)
    }
}
