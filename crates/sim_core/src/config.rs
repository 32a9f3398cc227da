//! Static rule data: unit types, weapons, scheduler cadence.
//!
//! Rule data is loaded once at session start and never mutated during play.
//! Definitions are data-driven (RON) so scenarios and tests can ship their
//! own rule sets. Malformed definitions are rejected at load time with a
//! logged error; the simulation continues without the offending type.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::item::{Work, WorkClass};
use crate::math::{fixed_serde, Fixed};

/// Unique identifier for unit types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitTypeId(pub u32);

impl UnitTypeId {
    /// Create a new unit type ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

/// Flight model a weapon's shots use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeaponShotKind {
    /// Resolves against the target in the tick it is fired.
    Bullet,
    /// Parabolic flight toward the target point.
    Rocket,
    /// Dropped in place, detonates on contact.
    Mine,
}

/// Weapon definition attached to a unit type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponDef {
    /// Display name.
    pub name: String,
    /// Flight model for shots fired by this weapon.
    pub shot_kind: WeaponShotKind,
    /// Raw damage per shot. Negative values heal.
    pub damage: i32,
    /// Outer damage radius of the shot's explosion (cell units).
    #[serde(with = "fixed_serde")]
    pub damage_range: Fixed,
    /// Radius inside which targets take full damage.
    #[serde(with = "fixed_serde")]
    pub full_damage_range: Fixed,
    /// Maximum firing range (cell units).
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Shot flight speed in cells per tick. Ignored for bullets.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Peak height of a parabolic shot as a fraction of travel distance.
    #[serde(with = "fixed_serde")]
    pub height_factor: Fixed,
    /// Ticks between shots.
    pub reload_ticks: u32,
    /// Ammunition pool this weapon draws from, one round per shot.
    pub ammunition: String,
}

/// Radar emitter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadarParams {
    /// Transmitted power of the dish.
    #[serde(with = "fixed_serde")]
    pub transmitted_power: Fixed,
    /// Weakest received power that still registers.
    #[serde(with = "fixed_serde")]
    pub min_received_power: Fixed,
    /// Maximum detection range (cell units); signals beyond it are zero.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Whether land units are detected.
    pub detects_land: bool,
    /// Whether flying units are detected.
    pub detects_air: bool,
}

/// Radar jammer parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JammerParams {
    /// Transmitted jamming power.
    #[serde(with = "fixed_serde")]
    pub transmitted_power: Fixed,
    /// Maximum jamming range (cell units).
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
}

/// Static definition of a unit type.
///
/// Covers everything the simulation needs per type: combat stats, movement,
/// sight, emitters, power hookup and wreckage behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitType {
    /// Unique identifier for this type.
    pub id: UnitTypeId,
    /// Display name.
    pub name: String,
    /// Maximum health.
    pub max_health: u32,
    /// Armor value subtracted from incoming damage (mitigation curve applies).
    pub armor: u32,
    /// Maximum shields. Zero means unshielded.
    pub max_shields: u32,
    /// Sight range in cells.
    pub sight_range: u32,
    /// Movement speed in cells per tick. Zero for immobile types.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Facility (fixed installation) rather than mobile unit.
    pub is_facility: bool,
    /// Flying unit; affects radar domain matching.
    pub is_flying: bool,
    /// Footprint radius used for explosion surface-distance compensation.
    #[serde(with = "fixed_serde")]
    pub footprint: Fixed,
    /// Damage dealt by the death explosion. Zero disables it.
    pub exploding_damage: i32,
    /// Radius of the death explosion.
    #[serde(with = "fixed_serde")]
    pub exploding_damage_range: Fixed,
    /// Number of fragment shots spawned on destruction.
    pub fragment_count: u32,
    /// Damage per fragment detonation.
    pub fragment_damage: i32,
    /// Damage radius per fragment detonation.
    #[serde(with = "fixed_serde")]
    pub fragment_damage_range: Fixed,
    /// Remove the wreck immediately instead of leaving it on the field.
    pub remove_wreckage_immediately: bool,
    /// Grants the owning player minimap capability while powered.
    pub supports_minimap: bool,
    /// Power fed into the owner's grid while constructed and alive.
    pub power_generated: u32,
    /// Power drawn from the owner's grid.
    pub power_consumed: u32,
    /// Ticks of construction work before the unit becomes operational.
    pub construction_steps: u32,
    /// Radar emitter, if the type carries one.
    pub radar: Option<RadarParams>,
    /// Radar jammer, if the type carries one.
    pub jammer: Option<JammerParams>,
    /// Weapon, if the type is armed.
    pub weapon: Option<WeaponDef>,
}

impl UnitType {
    /// Validate a definition at load time.
    ///
    /// Zero-dimension and nonsense configurations are configuration errors:
    /// the type is rejected and the load continues without it.
    fn validate(&self) -> std::result::Result<(), String> {
        if self.max_health == 0 {
            return Err(format!("unit type '{}' has zero max health", self.name));
        }
        if let Some(weapon) = &self.weapon {
            if weapon.damage_range < weapon.full_damage_range {
                return Err(format!(
                    "weapon '{}' has full damage range beyond its damage range",
                    weapon.name
                ));
            }
        }
        if let Some(radar) = &self.radar {
            if radar.min_received_power <= Fixed::ZERO {
                return Err(format!(
                    "unit type '{}' radar needs a positive minimum received power",
                    self.name
                ));
            }
        }
        Ok(())
    }
}

/// Per-category advance cadence.
///
/// The moduli are tuned configuration, not correctness constants, but every
/// peer in a session must run the same table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Tick interval per work category; a category runs when
    /// `tick % interval == 0`. Categories absent from the table run
    /// every tick.
    pub intervals: Vec<(WorkClass, u32)>,
}

impl SchedulerConfig {
    /// Whether `class` runs on `tick`.
    #[must_use]
    pub fn runs_on(&self, class: WorkClass, tick: u64) -> bool {
        for (c, interval) in &self.intervals {
            if *c == class {
                return *interval != 0 && tick % u64::from(*interval) == 0;
            }
        }
        true
    }
}

impl Default for SchedulerConfig {
    /// Idle behaviors are rate-limited; motion and combat never are.
    fn default() -> Self {
        Self {
            intervals: vec![
                (WorkClass::Unit(Work::None), 10),
                (WorkClass::Unit(Work::Idle), 10),
                (WorkClass::Unit(Work::Attack), 5),
                (WorkClass::Unit(Work::Follow), 5),
                (WorkClass::Unit(Work::Constructed), 20),
            ],
        }
    }
}

/// The complete static rule set for a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    unit_types: HashMap<u32, UnitType>,
    /// Scheduler cadence table.
    pub scheduler: SchedulerConfig,
}

impl RuleSet {
    /// Create an empty rule set with the default cadence table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit type.
    ///
    /// Invalid definitions are logged and skipped; the rule set stays usable.
    pub fn register(&mut self, unit_type: UnitType) {
        if let Err(message) = unit_type.validate() {
            tracing::error!(type_id = unit_type.id.0, %message, "Rejected unit type definition");
            return;
        }
        self.unit_types.insert(unit_type.id.0, unit_type);
    }

    /// Look up a unit type.
    #[must_use]
    pub fn unit_type(&self, id: UnitTypeId) -> Option<&UnitType> {
        self.unit_types.get(&id.0)
    }

    /// Number of registered unit types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.unit_types.len()
    }

    /// Whether no unit types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unit_types.is_empty()
    }

    /// Largest footprint among registered types. Spatial queries that
    /// filter on surface distance pad their radius by this much.
    #[must_use]
    pub fn max_footprint(&self) -> Fixed {
        self.unit_types
            .values()
            .map(|t| t.footprint)
            .max()
            .unwrap_or(Fixed::ZERO)
    }

    /// Parse a rule set from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] when the text is malformed.
    pub fn from_ron_str(path: &str, text: &str) -> Result<Self> {
        let types: Vec<UnitType> = ron::from_str(text).map_err(|e| GameError::DataParseError {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        let mut rules = Self::new();
        for t in types {
            rules.register(t);
        }
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_type(id: u32) -> UnitType {
        UnitType {
            id: UnitTypeId::new(id),
            name: format!("type-{id}"),
            max_health: 100,
            armor: 0,
            max_shields: 0,
            sight_range: 4,
            speed: Fixed::from_num(1),
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
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut rules = RuleSet::new();
        rules.register(plain_type(1));
        assert!(rules.unit_type(UnitTypeId::new(1)).is_some());
        assert!(rules.unit_type(UnitTypeId::new(2)).is_none());
    }

    #[test]
    fn test_zero_health_type_rejected() {
        let mut rules = RuleSet::new();
        let mut bad = plain_type(7);
        bad.max_health = 0;
        rules.register(bad);
        assert!(rules.unit_type(UnitTypeId::new(7)).is_none());
    }

    #[test]
    fn test_default_cadence_table() {
        let config = SchedulerConfig::default();
        // Attack runs on multiples of 5 only
        assert!(config.runs_on(WorkClass::Unit(Work::Attack), 10));
        assert!(!config.runs_on(WorkClass::Unit(Work::Attack), 7));
        // Move runs every tick
        assert!(config.runs_on(WorkClass::Unit(Work::Move), 7));
        // Default (non-unit) items run every tick
        assert!(config.runs_on(WorkClass::Default, 3));
        // Constructed runs every 20th
        assert!(config.runs_on(WorkClass::Unit(Work::Constructed), 40));
        assert!(!config.runs_on(WorkClass::Unit(Work::Constructed), 30));
    }

    #[test]
    fn test_ron_round_trip() {
        let mut rules = RuleSet::new();
        rules.register(plain_type(3));
        let text = ron::to_string(&vec![rules.unit_type(UnitTypeId::new(3)).unwrap().clone()])
            .expect("serialize");
        let parsed = RuleSet::from_ron_str("inline", &text).expect("parse");
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_malformed_ron_rejected() {
        let err = RuleSet::from_ron_str("broken.ron", "[(nope").unwrap_err();
        assert!(matches!(err, GameError::DataParseError { .. }));
    }
}
