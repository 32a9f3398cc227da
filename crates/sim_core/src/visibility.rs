//! Fog-of-war bookkeeping and radar/jammer signal propagation.
//!
//! Fog is reference-counted per cell and per player: a cell is visible while
//! at least one friendly sight source covers it. The explored bitset is
//! monotonic — once a player has seen a cell it stays explored for the rest
//! of the session.
//!
//! Radar detection uses a simplified radar equation. Incremental updates are
//! an optimization; the periodic bulk recompute in
//! [`SightManager::update_all`] is authoritative.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::item::{Body, ItemId, PlayerId};
use crate::math::{fixed_sqrt, Fixed};
use crate::registry::ItemRegistry;

/// Fog-of-war and explored state for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerVisibility {
    player: PlayerId,
    width: u32,
    height: u32,
    /// Explored bitset, one bit per cell. Monotonic.
    explored: Vec<u64>,
    /// Per-cell count of friendly sight sources covering the cell.
    fog_ref: Vec<u16>,
}

impl PlayerVisibility {
    /// Fully fogged, fully unexplored state for a `width` x `height` map.
    #[must_use]
    pub fn new(player: PlayerId, width: u32, height: u32) -> Self {
        let cells = (width as usize) * (height as usize);
        Self {
            player,
            width,
            height,
            explored: vec![0; cells.div_ceil(64)],
            fog_ref: vec![0; cells],
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height {
            Some((y as usize) * (self.width as usize) + (x as usize))
        } else {
            None
        }
    }

    /// Whether the player has ever seen this cell.
    #[must_use]
    pub fn is_explored(&self, x: i32, y: i32) -> bool {
        match self.index(x, y) {
            Some(i) => self.explored[i / 64] & (1 << (i % 64)) != 0,
            None => false,
        }
    }

    /// Mark a cell explored. There is deliberately no inverse operation.
    pub fn explore(&mut self, x: i32, y: i32) {
        if let Some(i) = self.index(x, y) {
            self.explored[i / 64] |= 1 << (i % 64);
        }
    }

    /// Number of explored cells.
    #[must_use]
    pub fn explored_count(&self) -> u32 {
        self.explored.iter().map(|word| word.count_ones()).sum()
    }

    /// Whether the cell is currently under fog (no friendly sight source).
    #[must_use]
    pub fn is_fogged(&self, x: i32, y: i32) -> bool {
        match self.index(x, y) {
            Some(i) => self.fog_ref[i] == 0,
            None => true,
        }
    }

    /// Current sight-source count for a cell.
    #[must_use]
    pub fn fog_ref(&self, x: i32, y: i32) -> u16 {
        self.index(x, y).map_or(0, |i| self.fog_ref[i])
    }

    /// Add one sight reference to a cell. A 0 to 1 transition unfogs the
    /// cell and marks it explored.
    pub fn add_fog_ref(&mut self, x: i32, y: i32) {
        let Some(i) = self.index(x, y) else { return };
        self.fog_ref[i] = self.fog_ref[i].saturating_add(1);
        if self.fog_ref[i] == 1 {
            self.explored[i / 64] |= 1 << (i % 64);
        }
    }

    /// Drop one sight reference from a cell.
    ///
    /// Decrementing past zero means a broken add/remove pairing; the
    /// operation is aborted with a logged error and, in debug builds, an
    /// assertion failure.
    pub fn remove_fog_ref(&mut self, x: i32, y: i32) {
        let Some(i) = self.index(x, y) else { return };
        if self.fog_ref[i] == 0 {
            tracing::error!(
                player = self.player,
                x,
                y,
                "fog reference count would go negative; sight pairing bug"
            );
            debug_assert!(false, "fog reference underflow at ({x}, {y})");
            return;
        }
        self.fog_ref[i] -= 1;
    }

    /// Apply a unit's sight footprint around cell `(cx, cy)`.
    ///
    /// Covers every cell within `range` cells Euclidean; tested with squared
    /// distances, no sqrt.
    pub fn apply_sight(&mut self, cx: i32, cy: i32, range: u32) {
        let r = range as i32;
        let r_sq = i64::from(range) * i64::from(range);
        for y in cy - r..=cy + r {
            for x in cx - r..=cx + r {
                if cell_dist_sq(x, y, cx, cy) <= r_sq {
                    self.add_fog_ref(x, y);
                }
            }
        }
    }

    /// Remove a unit's sight footprint, the exact inverse of
    /// [`apply_sight`](Self::apply_sight) at the same coordinates.
    pub fn remove_sight(&mut self, cx: i32, cy: i32, range: u32) {
        let r = range as i32;
        let r_sq = i64::from(range) * i64::from(range);
        for y in cy - r..=cy + r {
            for x in cx - r..=cx + r {
                if cell_dist_sq(x, y, cx, cy) <= r_sq {
                    self.remove_fog_ref(x, y);
                }
            }
        }
    }

    /// Incremental sight move from `(old_cx, old_cy)` to `(cx, cy)`.
    ///
    /// Short moves (up to 5 cells on either axis) walk a single merged
    /// bounding box and evaluate each cell once against both footprints.
    /// Long moves fall back to remove-then-apply; the merged box would be
    /// mostly dead cells when the footprints barely overlap.
    pub fn update_sight(&mut self, old_cx: i32, old_cy: i32, cx: i32, cy: i32, range: u32) {
        let dx = (cx - old_cx).abs();
        let dy = (cy - old_cy).abs();
        if dx > 5 || dy > 5 {
            self.remove_sight(old_cx, old_cy, range);
            self.apply_sight(cx, cy, range);
            return;
        }

        let r = range as i32;
        let r_sq = i64::from(range) * i64::from(range);
        let left = (cx - r).min(old_cx - r);
        let right = (cx + r).max(old_cx + r);
        let top = (cy - r).min(old_cy - r);
        let bottom = (cy + r).max(old_cy + r);

        for y in top..=bottom {
            for x in left..=right {
                let in_old = cell_dist_sq(x, y, old_cx, old_cy) <= r_sq;
                let in_new = cell_dist_sq(x, y, cx, cy) <= r_sq;
                if in_new && !in_old {
                    self.add_fog_ref(x, y);
                } else if in_old && !in_new {
                    self.remove_fog_ref(x, y);
                }
            }
        }
    }
}

fn cell_dist_sq(x: i32, y: i32, cx: i32, cy: i32) -> i64 {
    let dx = i64::from(x - cx);
    let dy = i64::from(y - cy);
    dx * dx + dy * dy
}

/// Ceiling on a single radar's contribution to one unit's signal.
const MAX_RADAR_SIGNAL: i64 = 200;

/// Ceiling on a single jammer's contribution against one unit.
const MAX_JAMMER_SIGNAL: i64 = 500;

/// Radar/jammer signal bookkeeping for the whole session.
///
/// Signal strengths are stored per (emitting unit, observing player) pair
/// as raw fixed-point bits so the maps serialize exactly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SightManager {
    /// Radar-carrying units per player.
    radars: BTreeMap<PlayerId, BTreeSet<ItemId>>,
    /// Jammer-carrying units per player.
    jammers: BTreeMap<PlayerId, BTreeSet<ItemId>>,
    /// Net signal strength per (unit, observing player), fixed-point bits.
    signals: BTreeMap<(ItemId, PlayerId), i64>,
}

impl SightManager {
    /// Empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a radar-carrying unit.
    pub fn add_radar(&mut self, owner: PlayerId, id: ItemId) {
        self.radars.entry(owner).or_default().insert(id);
    }

    /// Register a jammer-carrying unit.
    pub fn add_jammer(&mut self, owner: PlayerId, id: ItemId) {
        self.jammers.entry(owner).or_default().insert(id);
    }

    /// Drop a unit from the radar and jammer registries and forget its
    /// signals. Used on destruction and removal.
    pub fn forget_unit(&mut self, owner: PlayerId, id: ItemId) {
        if let Some(set) = self.radars.get_mut(&owner) {
            set.remove(&id);
        }
        if let Some(set) = self.jammers.get_mut(&owner) {
            set.remove(&id);
        }
        self.signals.retain(|(unit, _), _| *unit != id);
    }

    /// Net signal strength with which `player`'s radar network receives
    /// `unit`.
    #[must_use]
    pub fn signal_strength(&self, unit: ItemId, player: PlayerId) -> Fixed {
        self.signals
            .get(&(unit, player))
            .map_or(Fixed::ZERO, |bits| Fixed::from_bits(*bits))
    }

    /// Whether `player` currently detects `unit` by radar.
    #[must_use]
    pub fn is_detected(&self, unit: ItemId, player: PlayerId) -> bool {
        self.signal_strength(unit, player) >= Fixed::from_num(1)
    }

    /// Authoritative bulk recompute of every (unit, player) signal.
    ///
    /// Runs periodically from the tick driver; incremental recomputes
    /// between runs are an optimization on top of this.
    pub fn update_all(&mut self, items: &ItemRegistry, player_ids: &[PlayerId]) {
        self.signals.clear();
        for id in items.sorted_ids() {
            let Some(item) = items.get(id) else { continue };
            let Body::Unit(_) = &item.body else { continue };
            for &player in player_ids {
                if player == item.owner {
                    continue;
                }
                self.recompute_unit(items, id, player);
            }
        }
    }

    /// Recompute the net signal for one (unit, observing player) pair.
    pub fn recompute_unit(&mut self, items: &ItemRegistry, unit_id: ItemId, player: PlayerId) {
        let Some(target) = items.get(unit_id) else {
            self.signals.retain(|(unit, _), _| *unit != unit_id);
            return;
        };
        let Some(target_unit) = target.as_unit() else {
            return;
        };

        // Emitting units are easier to spot: an active radar effectively
        // quarters the squared distance, a jammer halves it.
        let dist_divisor = if target_unit.radar.is_some() {
            Fixed::from_num(4)
        } else if target_unit.jammer.is_some() {
            Fixed::from_num(2)
        } else {
            Fixed::from_num(1)
        };
        let size = target_unit.footprint * Fixed::from_num(2) + Fixed::from_num(1);

        let mut received = Fixed::ZERO;
        if let Some(radar_ids) = self.radars.get(&player) {
            for &radar_id in radar_ids {
                let Some(radar_item) = items.get(radar_id) else { continue };
                let Some(radar_unit) = radar_item.as_unit() else { continue };
                let Some(radar) = &radar_unit.radar else { continue };

                let domain_ok = if target_unit.is_flying {
                    radar.detects_air
                } else {
                    radar.detects_land
                };
                if !domain_ok {
                    continue;
                }

                let dist_sq = radar_item.pos.distance_squared(target.pos) / dist_divisor;
                if dist_sq > radar.range * radar.range {
                    continue;
                }
                let dist = fixed_sqrt(dist_sq).max(Fixed::from_num(1));
                let power = radar.transmitted_power * size / (dist * dist * dist);
                let strength = power / radar.min_received_power;
                // Each dish's contribution clamps separately; the sum
                // is unbounded.
                if strength >= Fixed::from_num(1) {
                    received += strength.min(Fixed::from_num(MAX_RADAR_SIGNAL));
                }
            }
        }

        // Every jammer in range degrades the received signal, friendly
        // ones included: jamming is indiscriminate.
        let mut jammed = Fixed::ZERO;
        for jammer_ids in self.jammers.values() {
            for &jammer_id in jammer_ids {
                let Some(jammer_item) = items.get(jammer_id) else { continue };
                let Some(jammer_unit) = jammer_item.as_unit() else { continue };
                let Some(jammer) = &jammer_unit.jammer else { continue };

                let dist_sq = jammer_item.pos.distance_squared(target.pos);
                if dist_sq > jammer.range * jammer.range {
                    continue;
                }
                let dist = fixed_sqrt(dist_sq).max(Fixed::from_num(1));
                let strength = jammer.transmitted_power / (dist * dist);
                if strength >= Fixed::from_num(1) / Fixed::from_num(2) {
                    jammed += strength.min(Fixed::from_num(MAX_JAMMER_SIGNAL));
                }
            }
        }

        let net = (received - jammed).max(Fixed::ZERO);
        if net > Fixed::ZERO {
            self.signals.insert((unit_id, player), net.to_bits());
        } else {
            self.signals.remove(&(unit_id, player));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JammerParams, RadarParams, UnitType, UnitTypeId};
    use proptest::prelude::*;

    #[test]
    fn test_explored_is_monotonic() {
        let mut vis = PlayerVisibility::new(1, 8, 8);
        assert!(!vis.is_explored(3, 3));
        vis.apply_sight(3, 3, 2);
        assert!(vis.is_explored(3, 3));

        // Losing sight fogs the cell but never un-explores it.
        vis.remove_sight(3, 3, 2);
        assert!(vis.is_fogged(3, 3));
        assert!(vis.is_explored(3, 3));
    }

    #[test]
    fn test_add_remove_pairing_restores_counts() {
        let mut vis = PlayerVisibility::new(1, 16, 16);
        vis.apply_sight(8, 8, 4);
        let before: Vec<u16> = (0..16)
            .flat_map(|y| (0..16).map(move |x| (x, y)))
            .map(|(x, y)| vis.fog_ref(x, y))
            .collect();

        vis.apply_sight(5, 5, 3);
        vis.remove_sight(5, 5, 3);

        let after: Vec<u16> = (0..16)
            .flat_map(|y| (0..16).map(move |x| (x, y)))
            .map(|(x, y)| vis.fog_ref(x, y))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_underflow_is_logged_not_fatal() {
        let mut vis = PlayerVisibility::new(1, 4, 4);
        vis.remove_fog_ref(2, 2);
        assert_eq!(vis.fog_ref(2, 2), 0);
    }

    #[test]
    fn test_incremental_update_matches_remove_then_apply() {
        // Short move takes the merged-box path; must agree with the naive
        // two-pass version cell for cell.
        let mut incremental = PlayerVisibility::new(1, 32, 32);
        let mut naive = PlayerVisibility::new(1, 32, 32);

        incremental.apply_sight(10, 10, 6);
        naive.apply_sight(10, 10, 6);

        incremental.update_sight(10, 10, 13, 12, 6);
        naive.remove_sight(10, 10, 6);
        naive.apply_sight(13, 12, 6);

        for y in 0..32 {
            for x in 0..32 {
                assert_eq!(
                    incremental.fog_ref(x, y),
                    naive.fog_ref(x, y),
                    "mismatch at ({x}, {y})"
                );
            }
        }
    }

    #[test]
    fn test_long_move_takes_two_pass_path() {
        let mut vis = PlayerVisibility::new(1, 64, 64);
        vis.apply_sight(5, 5, 4);
        vis.update_sight(5, 5, 40, 40, 4);

        assert!(vis.is_fogged(5, 5));
        assert!(!vis.is_fogged(40, 40));
        assert!(vis.is_explored(5, 5));
    }

    #[test]
    fn test_sight_ring_is_euclidean() {
        let mut vis = PlayerVisibility::new(1, 16, 16);
        vis.apply_sight(8, 8, 3);
        // Corner of the bounding box is outside the ring.
        assert!(vis.is_fogged(11, 11));
        assert!(!vis.is_fogged(11, 8));
        assert!(!vis.is_fogged(10, 10)); // dist² = 8 <= 9
    }

    fn emitter_type(radar: Option<RadarParams>, jammer: Option<JammerParams>) -> UnitType {
        UnitType {
            id: UnitTypeId::new(1),
            name: "emitter".to_string(),
            max_health: 100,
            armor: 0,
            max_shields: 0,
            sight_range: 0,
            speed: Fixed::ZERO,
            is_facility: true,
            is_flying: false,
            footprint: Fixed::ZERO,
            exploding_damage: 0,
            exploding_damage_range: Fixed::ZERO,
            fragment_count: 0,
            fragment_damage: 0,
            fragment_damage_range: Fixed::ZERO,
            remove_wreckage_immediately: false,
            supports_minimap: false,
            power_generated: 0,
            power_consumed: 0,
            construction_steps: 0,
            radar,
            jammer,
            weapon: None,
        }
    }

    fn place_unit(
        items: &mut ItemRegistry,
        owner: PlayerId,
        unit_type: &UnitType,
        x: i32,
        y: i32,
    ) -> ItemId {
        items.insert(crate::item::Item {
            id: 0,
            owner,
            pos: crate::math::Vec3Fixed::new(Fixed::from_num(x), Fixed::from_num(y), Fixed::ZERO),
            velocity: crate::math::Vec3Fixed::ZERO,
            rotation: Fixed::ZERO,
            body: crate::item::Body::Unit(crate::item::Unit::from_type(unit_type)),
        })
    }

    fn dish() -> RadarParams {
        // strength = 1000 / d^3 against a size-1 target: detection edge
        // sits exactly at distance 10.
        RadarParams {
            transmitted_power: Fixed::from_num(1000),
            min_received_power: Fixed::from_num(1),
            range: Fixed::from_num(100),
            detects_land: true,
            detects_air: false,
        }
    }

    #[test]
    fn test_radar_detection_threshold_at_unit_strength() {
        let mut items = ItemRegistry::new();
        let radar_type = emitter_type(Some(dish()), None);
        let plain = emitter_type(None, None);

        let radar_id = place_unit(&mut items, 1, &radar_type, 0, 0);
        let on_edge = place_unit(&mut items, 2, &plain, 10, 0);
        let beyond = place_unit(&mut items, 2, &plain, 11, 0);

        let mut sight = SightManager::new();
        sight.add_radar(1, radar_id);
        sight.update_all(&items, &[1, 2]);

        assert!(sight.is_detected(on_edge, 1));
        assert!(sight.signal_strength(on_edge, 1) >= Fixed::from_num(1));
        // Strength 1000/1331 < 1 never accumulates.
        assert!(!sight.is_detected(beyond, 1));
        assert_eq!(sight.signal_strength(beyond, 1), Fixed::ZERO);
        // A radar never reports its owner's own units.
        assert!(!sight.is_detected(radar_id, 1));
    }

    #[test]
    fn test_hostile_jammer_suppresses_detection() {
        let mut items = ItemRegistry::new();
        let radar_type = emitter_type(Some(dish()), None);
        let jammer_type = emitter_type(
            None,
            Some(JammerParams {
                transmitted_power: Fixed::from_num(2000),
                range: Fixed::from_num(50),
            }),
        );
        let plain = emitter_type(None, None);

        let radar_id = place_unit(&mut items, 1, &radar_type, 0, 0);
        let target = place_unit(&mut items, 2, &plain, 5, 0);
        let jammer_id = place_unit(&mut items, 2, &jammer_type, 6, 0);

        let mut sight = SightManager::new();
        sight.add_radar(1, radar_id);
        sight.add_jammer(2, jammer_id);
        sight.update_all(&items, &[1, 2]);
        // 1000/125 = 8 received, 2000/1 = 2000 jammed (clamped to 500):
        // nothing gets through.
        assert!(!sight.is_detected(target, 1));

        // With the jammer gone the same target is plainly visible.
        sight.forget_unit(2, jammer_id);
        items.remove(jammer_id);
        items.flush_removals();
        sight.update_all(&items, &[1, 2]);
        assert!(sight.is_detected(target, 1));
    }

    #[test]
    fn test_own_jammer_blinds_own_radar() {
        // Jamming is indiscriminate: a player's own jammer degrades
        // their own radar picture too.
        let mut items = ItemRegistry::new();
        let radar_type = emitter_type(Some(dish()), None);
        let jammer_type = emitter_type(
            None,
            Some(JammerParams {
                transmitted_power: Fixed::from_num(2000),
                range: Fixed::from_num(50),
            }),
        );
        let plain = emitter_type(None, None);

        let radar_id = place_unit(&mut items, 1, &radar_type, 0, 0);
        let target = place_unit(&mut items, 2, &plain, 5, 0);
        let jammer_id = place_unit(&mut items, 1, &jammer_type, 6, 0);

        let mut sight = SightManager::new();
        sight.add_radar(1, radar_id);
        sight.add_jammer(1, jammer_id);
        sight.update_all(&items, &[1, 2]);
        assert!(!sight.is_detected(target, 1));
    }

    #[test]
    fn test_radar_contributions_clamp_per_dish() {
        // Two saturated dishes each contribute the per-dish ceiling; the
        // sum runs past it.
        let mut items = ItemRegistry::new();
        let hot_dish = RadarParams {
            transmitted_power: Fixed::from_num(30000),
            min_received_power: Fixed::from_num(1),
            range: Fixed::from_num(100),
            detects_land: true,
            detects_air: false,
        };
        let radar_type = emitter_type(Some(hot_dish), None);
        let plain = emitter_type(None, None);

        let target = place_unit(&mut items, 2, &plain, 0, 0);
        let dish_a = place_unit(&mut items, 1, &radar_type, 5, 0);
        let dish_b = place_unit(&mut items, 1, &radar_type, 0, 5);

        let mut sight = SightManager::new();
        sight.add_radar(1, dish_a);
        sight.add_radar(1, dish_b);
        sight.update_all(&items, &[1, 2]);

        // 30000 / 125 = 240 per dish, clamped to 200 each.
        assert_eq!(sight.signal_strength(target, 1), Fixed::from_num(400));
    }

    proptest! {
        #[test]
        fn prop_sight_pairing_never_underflows(
            cx in 0i32..20,
            cy in 0i32..20,
            range in 0u32..8,
            other_cx in 0i32..20,
            other_cy in 0i32..20,
        ) {
            let mut vis = PlayerVisibility::new(1, 20, 20);
            vis.apply_sight(cx, cy, range);
            vis.apply_sight(other_cx, other_cy, range);
            vis.remove_sight(cx, cy, range);
            vis.remove_sight(other_cx, other_cy, range);
            for y in 0..20 {
                for x in 0..20 {
                    prop_assert_eq!(vis.fog_ref(x, y), 0);
                }
            }
        }
    }
}
