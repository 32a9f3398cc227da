//! Simulation items: the closed sum over units and shots.
//!
//! The original dynamic-dispatch item hierarchy is modeled as one `Item`
//! struct with a [`Body`] variant. The scheduler key is a pure function of
//! the variant and its current work value, never a runtime type check.

use serde::{Deserialize, Serialize};

use crate::ballistics::Shot;
use crate::config::{JammerParams, RadarParams, UnitType, UnitTypeId, WeaponDef};
use crate::math::{Fixed, Vec3Fixed};

/// Unique item identifier. Monotonic per session, never reused.
pub type ItemId = u32;

/// Never assigned to a live item; used as the "unassigned" sentinel.
pub const INVALID_ITEM: ItemId = 0;

/// Player identifier.
pub type PlayerId = u32;

/// The neutral player owns wreckage effects and other ownerless items.
/// It never wins, loses, or fires.
pub const NEUTRAL_PLAYER: PlayerId = 0;

/// Behavior category a unit currently belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Work {
    /// No behavior at all; the scheduler rarely visits these.
    None,
    /// Standing by, scanning for targets.
    #[default]
    Idle,
    /// Moving toward a destination.
    Move,
    /// Attacking a target.
    Attack,
    /// Under construction.
    Constructed,
    /// Following another unit.
    Follow,
    /// Operating a capability plugin.
    Plugin,
    /// Turning in place.
    Turn,
    /// Destroyed; a wreck awaiting removal.
    Destroyed,
}

/// Scheduler list key. Non-unit items always advance from the default list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WorkClass {
    /// The distinguished list for shots and other non-unit items.
    Default,
    /// Units, keyed by their current work value.
    Unit(Work),
}

/// Which of the two behavior slots a tick executes.
///
/// The flag flips every tick. A work value scheduled while phase A executes
/// lands in the B slot, so a behavior can never be both set and run within
/// one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvancePhase {
    /// First slot.
    A,
    /// Second slot.
    B,
}

impl AdvancePhase {
    /// The other phase.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

/// Two-phase work slots.
///
/// `active(phase)` is what this tick executes; `schedule` writes the slot
/// the current phase is *not* executing; `commit` is the per-tick sync step
/// that copies the scheduled slot over the executed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSlots {
    slots: [Work; 2],
}

impl WorkSlots {
    /// Both slots start out with the same work value.
    #[must_use]
    pub const fn new(work: Work) -> Self {
        Self {
            slots: [work, work],
        }
    }

    /// The work value executed during `phase`.
    #[must_use]
    pub const fn active(&self, phase: AdvancePhase) -> Work {
        self.slots[phase.index()]
    }

    /// The most recently scheduled work value; this is the unit's "current
    /// work" for partition bookkeeping.
    #[must_use]
    pub const fn current(&self, phase: AdvancePhase) -> Work {
        self.slots[phase.other().index()]
    }

    /// Schedule `work` to take effect from the next phase onward.
    pub fn schedule(&mut self, phase: AdvancePhase, work: Work) {
        self.slots[phase.other().index()] = work;
    }

    /// Sync step: commit the scheduled slot so both slots agree.
    pub fn commit(&mut self, phase: AdvancePhase) {
        self.slots[phase.index()] = self.slots[phase.other().index()];
    }
}

/// Unit state beyond the shared item core.
///
/// Static per-type values are copied from the [`UnitType`] at creation so
/// per-tick code never needs the rule set in hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Type this unit was created from.
    pub type_id: UnitTypeId,
    /// Current health, `0..=max_health`.
    pub health: u32,
    /// Maximum health.
    pub max_health: u32,
    /// Current shields.
    pub shields: u32,
    /// Maximum shields.
    pub max_shields: u32,
    /// Armor value fed into the mitigation curve.
    pub armor: u32,
    /// Sight range in cells.
    pub sight_range: u32,
    /// Movement speed, cells per tick.
    #[serde(with = "crate::math::fixed_serde")]
    pub speed: Fixed,
    /// Facility rather than mobile unit.
    pub is_facility: bool,
    /// Flying unit (radar domain).
    pub is_flying: bool,
    /// Footprint radius for explosion surface distance.
    #[serde(with = "crate::math::fixed_serde")]
    pub footprint: Fixed,
    /// Death explosion damage.
    pub exploding_damage: i32,
    /// Death explosion radius.
    #[serde(with = "crate::math::fixed_serde")]
    pub exploding_damage_range: Fixed,
    /// Fragments spawned on destruction.
    pub fragment_count: u32,
    /// Damage per fragment.
    pub fragment_damage: i32,
    /// Damage radius per fragment.
    #[serde(with = "crate::math::fixed_serde")]
    pub fragment_damage_range: Fixed,
    /// Skip the wreckage phase entirely.
    pub remove_wreckage_immediately: bool,
    /// Counts toward the owner's minimap capability.
    pub supports_minimap: bool,
    /// Power generated while alive and constructed.
    pub power_generated: u32,
    /// Power consumed while alive and constructed.
    pub power_consumed: u32,
    /// Radar emitter parameters.
    pub radar: Option<RadarParams>,
    /// Jammer parameters.
    pub jammer: Option<JammerParams>,
    /// Weapon, if armed.
    pub weapon: Option<WeaponDef>,

    /// Two-phase work slots.
    pub work: WorkSlots,
    /// Ticks remaining until the weapon may fire again.
    pub reload: u32,
    /// Attack/follow target.
    pub target: Option<ItemId>,
    /// Movement destination, if any.
    pub move_destination: Option<Vec3Fixed>,
    /// Construction progress, counts up to the type's construction steps.
    pub construction_progress: u32,
    /// Construction steps required before the unit is operational.
    pub construction_steps: u32,
    /// Maintenance intervals survived as a wreck.
    pub deletion_timer: u32,
    /// Sight currently applied to the owner's fog counters.
    pub sight_applied: bool,
    /// Pre-move cell coordinates of a pending sight update.
    pub pending_sight_update: Option<(i32, i32)>,
    /// A radar/jammer signal recompute is pending for this unit.
    pub pending_radar_update: bool,
}

impl Unit {
    /// Build a unit from its type definition.
    #[must_use]
    pub fn from_type(unit_type: &UnitType) -> Self {
        let work = if unit_type.construction_steps > 0 {
            Work::Constructed
        } else {
            Work::Idle
        };
        Self {
            type_id: unit_type.id,
            health: unit_type.max_health,
            max_health: unit_type.max_health,
            shields: unit_type.max_shields,
            max_shields: unit_type.max_shields,
            armor: unit_type.armor,
            sight_range: unit_type.sight_range,
            speed: unit_type.speed,
            is_facility: unit_type.is_facility,
            is_flying: unit_type.is_flying,
            footprint: unit_type.footprint,
            exploding_damage: unit_type.exploding_damage,
            exploding_damage_range: unit_type.exploding_damage_range,
            fragment_count: unit_type.fragment_count,
            fragment_damage: unit_type.fragment_damage,
            fragment_damage_range: unit_type.fragment_damage_range,
            remove_wreckage_immediately: unit_type.remove_wreckage_immediately,
            supports_minimap: unit_type.supports_minimap,
            power_generated: unit_type.power_generated,
            power_consumed: unit_type.power_consumed,
            radar: unit_type.radar,
            jammer: unit_type.jammer,
            weapon: unit_type.weapon.clone(),
            work: WorkSlots::new(work),
            reload: 0,
            target: None,
            move_destination: None,
            construction_progress: 0,
            construction_steps: unit_type.construction_steps,
            deletion_timer: 0,
            sight_applied: false,
            pending_sight_update: None,
            pending_radar_update: false,
        }
    }

    /// Whether construction has finished.
    #[must_use]
    pub fn is_constructed(&self) -> bool {
        self.construction_progress >= self.construction_steps
    }

    /// Whether this unit has been destroyed.
    #[must_use]
    pub fn is_destroyed(&self, phase: AdvancePhase) -> bool {
        self.work.current(phase) == Work::Destroyed
    }
}

/// Variant payload of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Body {
    /// A unit (mobile or facility).
    Unit(Unit),
    /// A shot in flight (or spent and awaiting the sweep).
    Shot(Shot),
}

/// Anything the simulation tracks: shared core plus the variant payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier, assigned by the registry. Never 0 for live items.
    pub id: ItemId,
    /// Owning player. [`NEUTRAL_PLAYER`] for ownerless effects.
    pub owner: PlayerId,
    /// World position.
    pub pos: Vec3Fixed,
    /// Velocity applied after the item's behavior each scheduled tick.
    pub velocity: Vec3Fixed,
    /// Facing, degrees as fixed-point.
    #[serde(with = "crate::math::fixed_serde")]
    pub rotation: Fixed,
    /// Variant payload.
    pub body: Body,
}

impl Item {
    /// The scheduler list this item belongs to, derived purely from its
    /// current state.
    #[must_use]
    pub fn work_class(&self, phase: AdvancePhase) -> WorkClass {
        match &self.body {
            Body::Unit(unit) => WorkClass::Unit(unit.work.current(phase)),
            Body::Shot(_) => WorkClass::Default,
        }
    }

    /// Borrow the unit payload, if this item is a unit.
    #[must_use]
    pub fn as_unit(&self) -> Option<&Unit> {
        match &self.body {
            Body::Unit(unit) => Some(unit),
            Body::Shot(_) => None,
        }
    }

    /// Mutably borrow the unit payload.
    pub fn as_unit_mut(&mut self) -> Option<&mut Unit> {
        match &mut self.body {
            Body::Unit(unit) => Some(unit),
            Body::Shot(_) => None,
        }
    }

    /// Borrow the shot payload, if this item is a shot.
    #[must_use]
    pub fn as_shot(&self) -> Option<&Shot> {
        match &self.body {
            Body::Unit(_) => None,
            Body::Shot(shot) => Some(shot),
        }
    }

    /// Mutably borrow the shot payload.
    pub fn as_shot_mut(&mut self) -> Option<&mut Shot> {
        match &mut self.body {
            Body::Unit(_) => None,
            Body::Shot(shot) => Some(shot),
        }
    }

    /// Cell coordinates of the item's center.
    #[must_use]
    pub fn cell(&self) -> (i32, i32) {
        (
            self.pos.x.to_num::<i32>(),
            self.pos.y.to_num::<i32>(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_defer_until_next_phase() {
        let mut slots = WorkSlots::new(Work::Idle);
        // Phase A executes Idle; scheduling Move must not change that.
        slots.schedule(AdvancePhase::A, Work::Move);
        assert_eq!(slots.active(AdvancePhase::A), Work::Idle);
        assert_eq!(slots.current(AdvancePhase::A), Work::Move);

        // After the sync step the new behavior runs in either phase.
        slots.commit(AdvancePhase::A);
        assert_eq!(slots.active(AdvancePhase::A), Work::Move);
        assert_eq!(slots.active(AdvancePhase::B), Work::Move);
    }

    #[test]
    fn test_work_class_is_pure_function_of_state() {
        use crate::ballistics::{Shot, ShotKind};

        let shot = Item {
            id: 5,
            owner: NEUTRAL_PLAYER,
            pos: Vec3Fixed::ZERO,
            velocity: Vec3Fixed::ZERO,
            rotation: Fixed::ZERO,
            body: Body::Shot(Shot::new(ShotKind::Explosion { remaining: 2 }, 10, Fixed::ZERO, Fixed::ZERO)),
        };
        assert_eq!(shot.work_class(AdvancePhase::A), WorkClass::Default);
    }

    #[test]
    fn test_cell_floor() {
        let item = Item {
            id: 1,
            owner: NEUTRAL_PLAYER,
            pos: Vec3Fixed::new(Fixed::from_num(3.7), Fixed::from_num(0.2), Fixed::ZERO),
            velocity: Vec3Fixed::ZERO,
            rotation: Fixed::ZERO,
            body: Body::Shot(crate::ballistics::Shot::new(
                crate::ballistics::ShotKind::Explosion { remaining: 1 },
                0,
                Fixed::ZERO,
                Fixed::ZERO,
            )),
        };
        assert_eq!(item.cell(), (3, 0));
    }
}
