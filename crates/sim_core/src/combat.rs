//! Damage resolution: explosion falloff, shield and armor mitigation, and
//! the unit destruction pipeline.

use crate::item::{ItemId, PlayerId, Unit, Work, WorkClass, NEUTRAL_PLAYER};
use crate::math::{Fixed, Vec3Fixed};

use crate::ballistics::{Parabola, Shot, ShotKind};
use crate::events::Event;
use crate::item::{Body, Item, WorkSlots};
use crate::simulation::Simulation;

/// Damage received at `dist` from an explosion's center.
///
/// Full damage inside `full_range`, linear falloff to zero at `range`.
/// `range == full_range` means full damage everywhere inside `range`; the
/// falloff denominator is zero there and must not be divided.
#[must_use]
pub fn explosion_damage_at(damage: i32, range: Fixed, full_range: Fixed, dist: Fixed) -> i32 {
    if dist > range {
        return 0;
    }
    if dist <= full_range || range == full_range {
        return damage;
    }
    let factor = (range - dist) / (range - full_range);
    (Fixed::from_num(damage) * factor).to_num::<i32>()
}

/// Apply raw damage to a unit's shields and health.
///
/// Shields absorb first. The remaining damage passes an armor curve keyed
/// on the health fraction *before* this hit: at or below 10% health armor
/// is ineffective, at or below 40% half the armor applies, otherwise the
/// full armor value is subtracted. Negative damage heals directly and
/// bypasses shields and armor. Health never leaves `[0, max_health]`.
pub fn apply_damage(unit: &mut Unit, damage: i32) {
    if damage < 0 {
        let heal = damage.unsigned_abs();
        unit.health = (unit.health + heal).min(unit.max_health);
        return;
    }
    let mut damage = damage as u32;

    if unit.shields > 0 {
        if unit.shields >= damage {
            unit.shields -= damage;
            return;
        }
        damage -= unit.shields;
        unit.shields = 0;
    }

    // Health fraction thresholds: health/max <= 1/10 and <= 4/10, kept in
    // integer math.
    let armor = if unit.health * 10 <= unit.max_health {
        0
    } else if unit.health * 10 <= unit.max_health * 4 {
        unit.armor / 2
    } else {
        unit.armor
    };
    let effective = damage.saturating_sub(armor);
    unit.health = unit.health.saturating_sub(effective);
}

impl Simulation {
    /// Area damage around `center`.
    ///
    /// Every live unit whose surface distance (center distance minus the
    /// unit's footprint) lies within `range` is damaged per
    /// [`explosion_damage_at`]; units dropping to zero health go through
    /// [`destroy_unit`](Self::destroy_unit) with `instigator` credited.
    pub fn explosion(
        &mut self,
        center: Vec3Fixed,
        damage: i32,
        range: Fixed,
        full_range: Fixed,
        instigator: PlayerId,
    ) {
        // Cell-granular candidate set, padded so a large-footprint unit
        // whose center sits past the blast radius is still considered.
        let candidates = self
            .map
            .units_in_circle(center.xy(), range + self.rules.max_footprint());

        let mut hits: Vec<(ItemId, i32)> = Vec::new();
        for id in candidates {
            let Some(item) = self.items.get(id) else { continue };
            let Some(unit) = item.as_unit() else { continue };
            if self.items.is_destroyed(id) {
                continue;
            }
            let dist = (item.pos.distance(center) - unit.footprint).max(Fixed::ZERO);
            if dist > range {
                continue;
            }
            hits.push((id, explosion_damage_at(damage, range, full_range, dist)));
        }

        for (id, dmg) in hits {
            self.unit_damaged(id, dmg, instigator);
        }
    }

    /// Damage one unit, destroying it if its health reaches zero.
    pub fn unit_damaged(&mut self, id: ItemId, damage: i32, instigator: PlayerId) {
        let Some(item) = self.items.get_mut(id) else {
            tracing::error!(id, "unit_damaged on a vanished item");
            return;
        };
        let Some(unit) = item.as_unit_mut() else { return };
        apply_damage(unit, damage);
        let dead = unit.health == 0;
        if dead {
            self.destroy_unit(id, instigator);
        }
    }

    /// Move a unit into the destroyed/wreckage set.
    ///
    /// Idempotent; a unit already destroyed is not processed again. The
    /// wreck stops everything it was doing, loses its sight and emitter
    /// contributions, optionally detonates and throws fragments, and the
    /// bookkeeping events fire.
    pub fn destroy_unit(&mut self, id: ItemId, instigator: PlayerId) {
        if self.items.is_destroyed(id) {
            return;
        }
        let phase = self.phase;
        let Some(item) = self.items.get_mut(id) else {
            tracing::error!(id, "destroy_unit on a vanished item");
            return;
        };
        if item.as_unit().is_none() {
            return;
        }

        let owner = item.owner;
        let pos = item.pos;
        let (cx, cy) = item.cell();
        item.velocity = Vec3Fixed::ZERO;

        let Some(unit) = item.as_unit_mut() else { return };

        // Stop everything; a wreck has no orders and no motion.
        unit.target = None;
        unit.move_destination = None;
        unit.speed = Fixed::ZERO;
        unit.health = 0;
        unit.work = WorkSlots::new(Work::Destroyed);
        unit.deletion_timer = 0;

        let type_id = unit.type_id.0;
        let is_facility = unit.is_facility;
        let sight_range = unit.sight_range;
        let sight_origin = unit.pending_sight_update.take().unwrap_or((cx, cy));
        let sight_applied = std::mem::take(&mut unit.sight_applied);
        let exploding_damage = unit.exploding_damage;
        let exploding_range = unit.exploding_damage_range;
        let fragment_count = unit.fragment_count;
        let fragment_damage = unit.fragment_damage;
        let fragment_range = unit.fragment_damage_range;
        let remove_immediately = unit.remove_wreckage_immediately;

        self.items.mark_destroyed(id);
        self.destroyed_this_tick.push(id);
        self.scheduler.remove_from_all(id);
        self.scheduler.add(id, WorkClass::Unit(Work::Destroyed));
        self.sight.forget_unit(owner, id);

        if sight_applied {
            if let Some(player) = self.player_mut(owner) {
                player
                    .visibility
                    .remove_sight(sight_origin.0, sight_origin.1, sight_range);
            }
        }

        // Owner accounting and loss statistics.
        let mut all_mobiles_gone = false;
        let mut all_facilities_gone = false;
        let mut owner_is_active = false;
        if let Some(player) = self.player_mut(owner) {
            owner_is_active = player.is_active;
            if is_facility {
                player.facilities = player.facilities.saturating_sub(1);
                player.statistics.lost_facilities += 1;
                all_facilities_gone = player.facilities == 0;
            } else {
                player.mobiles = player.mobiles.saturating_sub(1);
                player.statistics.lost_mobiles += 1;
                all_mobiles_gone = player.mobiles == 0;
            }
        }
        if instigator != owner && instigator != NEUTRAL_PLAYER {
            if let Some(player) = self.player_mut(instigator) {
                if is_facility {
                    player.statistics.destroyed_facilities += 1;
                } else {
                    player.statistics.destroyed_mobiles += 1;
                }
            }
        }

        // Death explosion and fragments belong to the neutral player.
        if exploding_damage != 0 {
            let shot = Shot::new(
                ShotKind::Explosion { remaining: 1 },
                exploding_damage,
                exploding_range,
                exploding_range,
            );
            self.spawn_shot(NEUTRAL_PLAYER, pos, shot);
        }
        for i in 0..fragment_count {
            let dir = FRAGMENT_DIRECTIONS[(i as usize) % FRAGMENT_DIRECTIONS.len()];
            let target = Vec3Fixed::new(
                pos.x + Fixed::from_num(dir.0) * Fixed::from_num(2),
                pos.y + Fixed::from_num(dir.1) * Fixed::from_num(2),
                Fixed::ZERO,
            );
            let mut shot = Shot::new(
                ShotKind::Fragment(Parabola::new(pos, target, Fixed::from_num(0.25))),
                fragment_damage,
                fragment_range,
                Fixed::ZERO,
            );
            shot.speed = Fixed::from_num(0.5);
            self.spawn_shot(NEUTRAL_PLAYER, pos, shot);
        }

        let destroyed_event = Event::new("UnitWithTypeDestroyed")
            .with_unit(id)
            .with_player(owner)
            .with_location(cx, cy)
            .with_data1(&type_id.to_string());
        let _ = self.events.enqueue(destroyed_event);

        if owner_is_active {
            if all_mobiles_gone {
                let _ = self
                    .events
                    .enqueue(Event::new("AllMobileUnitsDestroyed").with_player(owner));
            }
            if all_facilities_gone {
                let _ = self
                    .events
                    .enqueue(Event::new("AllFacilitiesDestroyed").with_player(owner));
            }
            if all_mobiles_gone || all_facilities_gone {
                let none_left = self
                    .player(owner)
                    .is_some_and(|p| p.mobiles == 0 && p.facilities == 0);
                if none_left {
                    let _ = self
                        .events
                        .enqueue(Event::new("AllUnitsDestroyed").with_player(owner));
                }
            }
        }

        if remove_immediately {
            self.remove_item(id);
        }

        // Keep the commit discipline intact for the wreck's slots.
        if let Some(item) = self.items.get_mut(id) {
            if let Body::Unit(unit) = &mut item.body {
                unit.work.commit(phase);
            }
        }
    }

    pub(crate) fn spawn_shot(&mut self, owner: PlayerId, pos: Vec3Fixed, shot: Shot) -> ItemId {
        let item = Item {
            id: crate::item::INVALID_ITEM,
            owner,
            pos,
            velocity: Vec3Fixed::ZERO,
            rotation: Fixed::ZERO,
            body: Body::Shot(shot),
        };
        let (cx, cy) = item.cell();
        let id = self.items.insert(item);
        self.map.occupy(id, cx, cy);
        self.scheduler.add_to_default(id);
        id
    }
}

/// Eight evenly spread unit directions for fragment spreads.
const FRAGMENT_DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn unit_with(health: u32, max: u32, armor: u32, shields: u32) -> Unit {
        let unit_type = crate::config::UnitType {
            id: crate::config::UnitTypeId::new(1),
            name: "target".to_string(),
            max_health: max,
            armor,
            max_shields: shields,
            sight_range: 0,
            speed: Fixed::ZERO,
            is_facility: false,
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
            radar: None,
            jammer: None,
            weapon: None,
        };
        let mut unit = Unit::from_type(&unit_type);
        unit.health = health;
        unit.shields = shields;
        unit
    }

    #[test]
    fn test_shields_absorb_first() {
        // shields=30, damage=20: shields 10, health untouched.
        let mut unit = unit_with(100, 100, 0, 30);
        apply_damage(&mut unit, 20);
        assert_eq!(unit.shields, 10);
        assert_eq!(unit.health, 100);
    }

    #[test]
    fn test_shield_spillover_hits_health() {
        let mut unit = unit_with(100, 100, 0, 5);
        apply_damage(&mut unit, 20);
        assert_eq!(unit.shields, 0);
        assert_eq!(unit.health, 85);
    }

    #[test]
    fn test_armor_curve_thresholds() {
        // Above 40% health: full armor.
        let mut unit = unit_with(100, 100, 10, 0);
        apply_damage(&mut unit, 30);
        assert_eq!(unit.health, 80);

        // At 40%: half armor.
        let mut unit = unit_with(40, 100, 10, 0);
        apply_damage(&mut unit, 30);
        assert_eq!(unit.health, 15);

        // At 10%: armor ineffective.
        let mut unit = unit_with(10, 100, 10, 0);
        apply_damage(&mut unit, 5);
        assert_eq!(unit.health, 5);
    }

    #[test]
    fn test_negative_damage_heals_bypassing_mitigation() {
        let mut unit = unit_with(50, 100, 10, 20);
        apply_damage(&mut unit, -30);
        assert_eq!(unit.health, 80);
        assert_eq!(unit.shields, 20);

        // Healing clamps at the type maximum.
        apply_damage(&mut unit, -1000);
        assert_eq!(unit.health, 100);
    }

    #[test]
    fn test_explosion_kill_scenario() {
        // health=50/100, armor=10, damage=80 at distance zero: 50% health
        // means full armor, 80-10=70 -> health 0.
        let mut unit = unit_with(50, 100, 10, 0);
        let dmg = explosion_damage_at(80, Fixed::from_num(4), Fixed::from_num(1), Fixed::ZERO);
        assert_eq!(dmg, 80);
        apply_damage(&mut unit, dmg);
        assert_eq!(unit.health, 0);
    }

    #[test]
    fn test_falloff_boundaries() {
        let range = Fixed::from_num(4);
        let full = Fixed::from_num(1);
        // Inclusive at the full-damage boundary.
        assert_eq!(explosion_damage_at(60, range, full, full), 60);
        // Zero at the outer edge.
        assert_eq!(explosion_damage_at(60, range, full, range), 0);
        // Midway: (4 - 2.5) / 3 of 60 = 30.
        assert_eq!(
            explosion_damage_at(60, range, full, Fixed::from_num(2.5)),
            30
        );
        // Outside: unaffected.
        assert_eq!(explosion_damage_at(60, range, full, Fixed::from_num(5)), 0);
    }

    #[test]
    fn test_equal_radii_means_full_damage_no_division() {
        let r = Fixed::from_num(3);
        assert_eq!(explosion_damage_at(45, r, r, Fixed::from_num(2)), 45);
        assert_eq!(explosion_damage_at(45, r, r, r), 45);
        assert_eq!(explosion_damage_at(45, r, r, Fixed::from_num(3.5)), 0);
    }

    proptest! {
        #[test]
        fn prop_health_stays_in_bounds(
            health in 0u32..=200,
            armor in 0u32..50,
            shields in 0u32..80,
            damage in -300i32..300,
        ) {
            let max = 200;
            let mut unit = unit_with(health, max, armor, shields);
            apply_damage(&mut unit, damage);
            prop_assert!(unit.health <= max);
            prop_assert!(unit.shields <= shields.max(unit.max_shields));
        }

        #[test]
        fn prop_falloff_is_monotonic_in_distance(
            damage in 1i32..500,
            near in 0u32..40,
            far in 0u32..40,
        ) {
            let range = Fixed::from_num(50);
            let full = Fixed::from_num(5);
            let (near, far) = (near.min(far), near.max(far));
            let near_dmg = explosion_damage_at(damage, range, full, Fixed::from_num(near));
            let far_dmg = explosion_damage_at(damage, range, full, Fixed::from_num(far));
            prop_assert!(near_dmg >= far_dmg);
        }
    }
}
