//! Test fixtures and helpers.
//!
//! Pre-built rule sets, unit types and scenarios for consistent testing.

use fixed::types::I32F32;
use sim_core::config::{RadarParams, RuleSet, UnitType, UnitTypeId, WeaponDef, WeaponShotKind};
use sim_core::item::PlayerId;
use sim_core::map::GameMap;
use sim_core::math::Vec2Fixed;
use sim_core::simulation::Simulation;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Type ID of the unarmed scout fixture.
pub const SCOUT: UnitTypeId = UnitTypeId::new(1);
/// Type ID of the armed tank fixture.
pub const TANK: UnitTypeId = UnitTypeId::new(2);
/// Type ID of the radar tower fixture.
pub const RADAR_TOWER: UnitTypeId = UnitTypeId::new(3);
/// Type ID of the power plant fixture.
pub const POWER_PLANT: UnitTypeId = UnitTypeId::new(4);

fn base_type(id: UnitTypeId, name: &str) -> UnitType {
    UnitType {
        id,
        name: name.to_string(),
        max_health: 100,
        armor: 0,
        max_shields: 0,
        sight_range: 5,
        speed: fixed(1),
        is_facility: false,
        is_flying: false,
        footprint: I32F32::ZERO,
        exploding_damage: 0,
        exploding_damage_range: I32F32::ZERO,
        fragment_count: 0,
        fragment_damage: 0,
        fragment_damage_range: I32F32::ZERO,
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

/// An unarmed, fast scout.
#[must_use]
pub fn scout_type() -> UnitType {
    UnitType {
        max_health: 50,
        sight_range: 8,
        speed: fixed(2),
        ..base_type(SCOUT, "scout")
    }
}

/// An armored tank with a rocket weapon.
#[must_use]
pub fn tank_type() -> UnitType {
    UnitType {
        max_health: 200,
        armor: 20,
        footprint: fixed_f(0.5),
        exploding_damage: 30,
        exploding_damage_range: fixed(2),
        weapon: Some(WeaponDef {
            name: "cannon".to_string(),
            shot_kind: WeaponShotKind::Rocket,
            damage: 40,
            damage_range: fixed(2),
            full_damage_range: fixed(1),
            range: fixed(6),
            speed: fixed(2),
            height_factor: fixed_f(0.25),
            reload_ticks: 10,
            ammunition: "Generic".to_string(),
        }),
        ..base_type(TANK, "tank")
    }
}

/// A stationary radar tower; consumes grid power.
#[must_use]
pub fn radar_tower_type() -> UnitType {
    UnitType {
        max_health: 150,
        is_facility: true,
        speed: I32F32::ZERO,
        supports_minimap: true,
        power_consumed: 10,
        construction_steps: 5,
        radar: Some(RadarParams {
            transmitted_power: fixed(8000),
            min_received_power: fixed_f(0.05),
            range: fixed(30),
            detects_land: true,
            detects_air: true,
        }),
        ..base_type(RADAR_TOWER, "radar tower")
    }
}

/// A stationary generator feeding the owner's grid.
#[must_use]
pub fn power_plant_type() -> UnitType {
    UnitType {
        max_health: 300,
        is_facility: true,
        speed: I32F32::ZERO,
        power_generated: 50,
        construction_steps: 5,
        ..base_type(POWER_PLANT, "power plant")
    }
}

/// A rule set containing all fixture types.
#[must_use]
pub fn standard_rules() -> RuleSet {
    let mut rules = RuleSet::new();
    rules.register(scout_type());
    rules.register(tank_type());
    rules.register(radar_tower_type());
    rules.register(power_plant_type());
    rules
}

/// An empty 64x64 simulation under [`standard_rules`] with two active
/// players. Returns the simulation and both player IDs.
#[must_use]
pub fn two_player_sim() -> (Simulation, PlayerId, PlayerId) {
    let mut sim = Simulation::new(GameMap::new(64, 64), standard_rules());
    let a = sim.add_player();
    let b = sim.add_player();
    (sim, a, b)
}

/// A small skirmish: two tanks per side facing each other across the map.
///
/// # Panics
///
/// Panics if the fixture types fail to spawn (a bug in the fixtures).
#[must_use]
pub fn skirmish_sim() -> Simulation {
    let (mut sim, a, b) = two_player_sim();
    for i in 0..2i32 {
        let y = fixed(20 + i * 8);
        sim.create_unit(a, TANK, Vec2Fixed::new(fixed(10), y))
            .expect("fixture tank spawns");
        sim.create_unit(b, TANK, Vec2Fixed::new(fixed(50), y))
            .expect("fixture tank spawns");
    }
    sim
}
