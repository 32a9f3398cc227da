//! Projectile flight models shared by all shot kinds.
//!
//! A shot is {flying} until it detonates exactly once, after which it is
//! inactive and waits for the periodic sweep to reclaim it. Flight math
//! never touches the rest of the simulation; the tick driver feeds
//! detonations into the damage resolver.

use serde::{Deserialize, Serialize};

use crate::config::{WeaponDef, WeaponShotKind};
use crate::math::{fixed_serde, Fixed, Vec3Fixed};

/// Parabolic flight state for rockets and fragments.
///
/// The vertical offset follows `max_height * (1 - (2p - 1)²)` for progress
/// `p` in `[0, 1]`: zero at launch and impact, peak at the temporal
/// midpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parabola {
    /// Launch point.
    pub start: Vec3Fixed,
    /// Impact point.
    pub target: Vec3Fixed,
    /// Total horizontal distance of the flight.
    #[serde(with = "fixed_serde")]
    pub total: Fixed,
    /// Horizontal distance covered so far.
    #[serde(with = "fixed_serde")]
    pub passed: Fixed,
    /// Peak height above the straight start-target line.
    #[serde(with = "fixed_serde")]
    pub max_height: Fixed,
}

impl Parabola {
    /// Set up a flight from `start` to `target` with the weapon's height
    /// factor.
    #[must_use]
    pub fn new(start: Vec3Fixed, target: Vec3Fixed, height_factor: Fixed) -> Self {
        let total = start.xy().distance(target.xy());
        Self {
            start,
            target,
            total,
            passed: Fixed::ZERO,
            max_height: height_factor * total,
        }
    }

    /// Advance the flight by `speed` cells. Returns the new position, or
    /// `None` once the remaining distance drops within one tick's travel
    /// (time to detonate).
    #[must_use]
    pub fn advance(&mut self, speed: Fixed) -> Option<Vec3Fixed> {
        let remaining = self.total - self.passed;
        if remaining <= speed || self.total <= Fixed::ZERO {
            return None;
        }
        self.passed += speed;

        let progress = self.passed / self.total;
        let one = Fixed::from_num(1);
        let centered = Fixed::from_num(2) * progress - one;
        let arc = one - centered * centered;

        let x = self.start.x + (self.target.x - self.start.x) * progress;
        let y = self.start.y + (self.target.y - self.start.y) * progress;
        let base_z = self.start.z + (self.target.z - self.start.z) * progress;
        Some(Vec3Fixed::new(x, y, base_z + self.max_height * arc))
    }
}

/// Flight model of one shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShotKind {
    /// Resolves against its target in the tick it was fired.
    Bullet,
    /// Parabolic missile flight.
    Rocket(Parabola),
    /// Fragment hurled from a destroyed unit, same arc as a rocket.
    Fragment(Parabola),
    /// Inert until something walks into its cell.
    Mine,
    /// Timed burst, detonates when the countdown runs out.
    Explosion {
        /// Ticks until detonation.
        remaining: u32,
    },
}

/// Outcome of advancing a shot one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightOutcome {
    /// Still flying; move to the new position.
    InFlight(Vec3Fixed),
    /// Detonate at the current/impact position this tick.
    Detonate(Vec3Fixed),
    /// Nothing to do (stationary kinds, spent shots).
    Idle,
}

/// A shot in flight or spent on the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shot {
    /// Flight model and its state.
    pub kind: ShotKind,
    /// Cleared exactly once, at detonation.
    pub active: bool,
    /// Damage delivered by the detonation. Negative heals.
    pub damage: i32,
    /// Outer damage radius.
    #[serde(with = "fixed_serde")]
    pub damage_range: Fixed,
    /// Full-damage radius.
    #[serde(with = "fixed_serde")]
    pub full_damage_range: Fixed,
    /// Flight speed, cells per tick.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
}

impl Shot {
    /// Create a shot with zero flight speed (stationary kinds).
    #[must_use]
    pub fn new(kind: ShotKind, damage: i32, damage_range: Fixed, full_damage_range: Fixed) -> Self {
        Self {
            kind,
            active: true,
            damage,
            damage_range,
            full_damage_range,
            speed: Fixed::ZERO,
        }
    }

    /// Build the shot a weapon fires from `start` at `target`.
    ///
    /// A finite-speed kind configured with zero speed is a configuration
    /// mistake; it is logged and downgraded to the instant variant.
    #[must_use]
    pub fn fired(weapon: &WeaponDef, start: Vec3Fixed, target: Vec3Fixed) -> Self {
        let kind = match weapon.shot_kind {
            WeaponShotKind::Bullet => ShotKind::Bullet,
            WeaponShotKind::Mine => ShotKind::Mine,
            WeaponShotKind::Rocket => {
                if weapon.speed <= Fixed::ZERO {
                    tracing::warn!(
                        weapon = %weapon.name,
                        "rocket weapon has zero flight speed; downgrading to instant shot"
                    );
                    ShotKind::Bullet
                } else {
                    ShotKind::Rocket(Parabola::new(start, target, weapon.height_factor))
                }
            }
        };
        let mut shot = Self::new(
            kind,
            weapon.damage,
            weapon.damage_range,
            weapon.full_damage_range,
        );
        shot.speed = weapon.speed;
        shot
    }

    /// Advance the flight by one tick.
    pub fn advance_flight(&mut self, pos: Vec3Fixed) -> FlightOutcome {
        if !self.active {
            return FlightOutcome::Idle;
        }
        match &mut self.kind {
            ShotKind::Bullet => FlightOutcome::Detonate(pos),
            ShotKind::Rocket(parabola) | ShotKind::Fragment(parabola) => {
                let speed = self.speed;
                let target = parabola.target;
                match parabola.advance(speed) {
                    Some(new_pos) => FlightOutcome::InFlight(new_pos),
                    None => FlightOutcome::Detonate(target),
                }
            }
            ShotKind::Mine => FlightOutcome::Idle,
            ShotKind::Explosion { remaining } => {
                if *remaining == 0 {
                    FlightOutcome::Detonate(pos)
                } else {
                    *remaining -= 1;
                    FlightOutcome::Idle
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec2Fixed;

    fn rocket_weapon(speed: i32) -> WeaponDef {
        WeaponDef {
            name: "test-rocket".to_string(),
            shot_kind: WeaponShotKind::Rocket,
            damage: 25,
            damage_range: Fixed::from_num(2),
            full_damage_range: Fixed::from_num(1),
            range: Fixed::from_num(12),
            speed: Fixed::from_num(speed),
            height_factor: Fixed::from_num(0.25),
            reload_ticks: 10,
            ammunition: "Generic".to_string(),
        }
    }

    #[test]
    fn test_parabola_peaks_at_midpoint() {
        let start = Vec3Fixed::ZERO;
        let target = Vec3Fixed::new(Fixed::from_num(10), Fixed::ZERO, Fixed::ZERO);
        let mut parabola = Parabola::new(start, target, Fixed::from_num(0.5));
        // max height = 0.5 * 10 = 5
        assert_eq!(parabola.max_height, Fixed::from_num(5));

        let mid = {
            let mut p = None;
            for _ in 0..5 {
                p = parabola.advance(Fixed::from_num(1));
            }
            p.unwrap()
        };
        // progress = 0.5 -> arc = 1 -> z = 5
        assert_eq!(mid.z, Fixed::from_num(5));
        assert_eq!(mid.x, Fixed::from_num(5));
    }

    #[test]
    fn test_parabola_height_zero_at_ends() {
        let start = Vec3Fixed::ZERO;
        let target = Vec3Fixed::new(Fixed::from_num(8), Fixed::ZERO, Fixed::ZERO);
        let mut parabola = Parabola::new(start, target, Fixed::from_num(1));

        let first = parabola.advance(Fixed::from_num(1)).unwrap();
        assert!(first.z > Fixed::ZERO);
        // Arc term at p=1/8: 1 - (2/8 - 1)² = 1 - 9/16 = 7/16; height 8 * 7/16
        assert_eq!(first.z, Fixed::from_num(8) * Fixed::from_num(7) / Fixed::from_num(16));
    }

    #[test]
    fn test_rocket_detonates_within_one_ticks_travel() {
        let weapon = rocket_weapon(3);
        let start = Vec3Fixed::ZERO;
        let target = Vec3Fixed::new(Fixed::from_num(7), Fixed::ZERO, Fixed::ZERO);
        let mut shot = Shot::fired(&weapon, start, target);

        let mut pos = start;
        let mut flew = 0;
        loop {
            match shot.advance_flight(pos) {
                FlightOutcome::InFlight(p) => {
                    pos = p;
                    flew += 1;
                    assert!(flew < 10, "rocket never detonated");
                }
                FlightOutcome::Detonate(at) => {
                    assert_eq!(at.xy(), Vec2Fixed::new(Fixed::from_num(7), Fixed::ZERO));
                    break;
                }
                FlightOutcome::Idle => panic!("rocket went idle mid-flight"),
            }
        }
        // 7 cells at 3/tick: two in-flight steps, detonation on the third.
        assert_eq!(flew, 2);
    }

    #[test]
    fn test_zero_speed_rocket_downgrades_to_bullet() {
        let weapon = rocket_weapon(0);
        let shot = Shot::fired(
            &weapon,
            Vec3Fixed::ZERO,
            Vec3Fixed::new(Fixed::from_num(5), Fixed::ZERO, Fixed::ZERO),
        );
        assert_eq!(shot.kind, ShotKind::Bullet);
    }

    #[test]
    fn test_explosion_burst_counts_down() {
        let mut shot = Shot::new(
            ShotKind::Explosion { remaining: 2 },
            10,
            Fixed::from_num(1),
            Fixed::from_num(1),
        );
        assert_eq!(shot.advance_flight(Vec3Fixed::ZERO), FlightOutcome::Idle);
        assert_eq!(shot.advance_flight(Vec3Fixed::ZERO), FlightOutcome::Idle);
        assert!(matches!(
            shot.advance_flight(Vec3Fixed::ZERO),
            FlightOutcome::Detonate(_)
        ));
    }

    #[test]
    fn test_mine_is_inert_without_trigger() {
        let mut shot = Shot::new(ShotKind::Mine, 40, Fixed::from_num(2), Fixed::from_num(1));
        for _ in 0..100 {
            assert_eq!(shot.advance_flight(Vec3Fixed::ZERO), FlightOutcome::Idle);
        }
        assert!(shot.active);
    }
}
