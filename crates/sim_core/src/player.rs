//! Per-player simulation state: unit accounting, ammunition, power,
//! minimap capability and combat statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::item::PlayerId;
use crate::math::Fixed;
use crate::visibility::PlayerVisibility;

/// The shared ammunition pool every weapon draws from by default.
pub const GENERIC_AMMO: &str = "Generic";

/// Ammunition regenerated per regeneration step.
pub const AMMO_REGEN_AMOUNT: u32 = 100;

/// Cap on the generic ammunition pool.
pub const AMMO_REGEN_CAP: u32 = 1000;

/// Combat statistics tracked per player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStatistics {
    /// Enemy mobile units this player destroyed.
    pub destroyed_mobiles: u32,
    /// Enemy facilities this player destroyed.
    pub destroyed_facilities: u32,
    /// Own mobile units lost.
    pub lost_mobiles: u32,
    /// Own facilities lost.
    pub lost_facilities: u32,
}

/// One player's simulation-side state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    /// Stable player identifier.
    pub id: PlayerId,
    /// Active players fight and receive loss/victory events; the neutral
    /// player does not.
    pub is_active: bool,
    /// Fog-of-war and explored state.
    pub visibility: PlayerVisibility,
    /// Named ammunition pools.
    ammunition: BTreeMap<String, u32>,
    /// Live mobile units.
    pub mobiles: u32,
    /// Live facilities.
    pub facilities: u32,
    /// Power capability factor for the current tick, `[0, 1]`.
    #[serde(with = "crate::math::fixed_serde")]
    pub power_charge: Fixed,
    /// Minimap capability at the start of the current tick; diffed at the
    /// end of the tick to emit gained/lost events.
    pub had_minimap: bool,
    /// Combat statistics.
    pub statistics: PlayerStatistics,
}

impl Player {
    /// Create a player with cleared visibility for a `width` x `height` map.
    #[must_use]
    pub fn new(id: PlayerId, is_active: bool, width: u32, height: u32) -> Self {
        Self {
            id,
            is_active,
            visibility: PlayerVisibility::new(id, width, height),
            ammunition: BTreeMap::new(),
            mobiles: 0,
            facilities: 0,
            power_charge: Fixed::from_num(1),
            had_minimap: false,
            statistics: PlayerStatistics::default(),
        }
    }

    /// Rounds available in a named pool.
    #[must_use]
    pub fn ammunition(&self, pool: &str) -> u32 {
        self.ammunition.get(pool).copied().unwrap_or(0)
    }

    /// Add rounds to a named pool.
    pub fn add_ammunition(&mut self, pool: &str, amount: u32) {
        *self.ammunition.entry(pool.to_string()).or_insert(0) += amount;
    }

    /// Take up to `requested` rounds from a pool; returns what was taken.
    pub fn take_ammunition(&mut self, pool: &str, requested: u32) -> u32 {
        let available = self.ammunition.entry(pool.to_string()).or_insert(0);
        let taken = requested.min(*available);
        *available -= taken;
        taken
    }

    /// Regenerate the generic pool by the standard step, up to the cap.
    pub fn regenerate_ammunition(&mut self) {
        let pool = self.ammunition.entry(GENERIC_AMMO.to_string()).or_insert(0);
        if *pool < AMMO_REGEN_CAP {
            *pool = (*pool + AMMO_REGEN_AMOUNT).min(AMMO_REGEN_CAP);
        }
    }

    /// Recompute the power capability factor from this tick's generated and
    /// consumed totals.
    ///
    /// A fully supplied grid gives factor 1. A starved grid scales
    /// quadratically with supply ratio and collapses to zero below 8%.
    pub fn update_power_charge(&mut self, generated: u32, consumed: u32) {
        if consumed <= generated {
            self.power_charge = Fixed::from_num(1);
            return;
        }
        if consumed == 0 {
            self.power_charge = Fixed::from_num(1);
            return;
        }
        let ratio = Fixed::from_num(generated) / Fixed::from_num(consumed);
        let factor = ratio * ratio;
        let cutoff = Fixed::from_num(8) / Fixed::from_num(100);
        self.power_charge = if factor < cutoff { Fixed::ZERO } else { factor };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> Player {
        Player::new(1, true, 8, 8)
    }

    #[test]
    fn test_ammunition_pools() {
        let mut p = player();
        assert_eq!(p.ammunition(GENERIC_AMMO), 0);
        p.add_ammunition(GENERIC_AMMO, 30);
        assert_eq!(p.take_ammunition(GENERIC_AMMO, 10), 10);
        // Taking more than available drains the pool and reports the shortfall.
        assert_eq!(p.take_ammunition(GENERIC_AMMO, 50), 20);
        assert_eq!(p.ammunition(GENERIC_AMMO), 0);
    }

    #[test]
    fn test_ammunition_regeneration_caps() {
        let mut p = player();
        for _ in 0..20 {
            p.regenerate_ammunition();
        }
        assert_eq!(p.ammunition(GENERIC_AMMO), AMMO_REGEN_CAP);
    }

    #[test]
    fn test_power_charge_quadratic() {
        let mut p = player();
        p.update_power_charge(10, 10);
        assert_eq!(p.power_charge, Fixed::from_num(1));

        // Half supply: factor (1/2)² = 1/4.
        p.update_power_charge(5, 10);
        assert_eq!(p.power_charge, Fixed::from_num(0.25));

        // Deep deficit collapses to zero.
        p.update_power_charge(1, 10);
        assert_eq!(p.power_charge, Fixed::ZERO);

        // No consumers at all is a fully supplied grid.
        p.update_power_charge(0, 0);
        assert_eq!(p.power_charge, Fixed::from_num(1));
    }
}
