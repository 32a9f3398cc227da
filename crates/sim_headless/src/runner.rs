//! Drives a simulation to completion and produces machine-readable reports.

use serde::Serialize;

use sim_core::config::{RadarParams, RuleSet, UnitType, UnitTypeId, WeaponDef, WeaponShotKind};
use sim_core::math::Fixed;
use sim_core::simulation::Simulation;

use crate::scenario::Scenario;
use crate::Result;

/// The rule set used when no `--rules` file is given: a scout, an armed
/// tank and a radar tower.
#[must_use]
pub fn default_rules() -> RuleSet {
    let base = |id: u32, name: &str| UnitType {
        id: UnitTypeId::new(id),
        name: name.to_string(),
        max_health: 100,
        armor: 0,
        max_shields: 0,
        sight_range: 5,
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
    };

    let mut rules = RuleSet::new();
    rules.register(UnitType {
        max_health: 50,
        sight_range: 8,
        speed: Fixed::from_num(2),
        ..base(1, "scout")
    });
    rules.register(UnitType {
        max_health: 200,
        armor: 20,
        weapon: Some(WeaponDef {
            name: "cannon".to_string(),
            shot_kind: WeaponShotKind::Rocket,
            damage: 40,
            damage_range: Fixed::from_num(2),
            full_damage_range: Fixed::from_num(1),
            range: Fixed::from_num(6),
            speed: Fixed::from_num(2),
            height_factor: Fixed::from_num(1) / 4,
            reload_ticks: 10,
            ammunition: "Generic".to_string(),
        }),
        ..base(2, "tank")
    });
    rules.register(UnitType {
        max_health: 150,
        is_facility: true,
        speed: Fixed::ZERO,
        supports_minimap: true,
        radar: Some(RadarParams {
            transmitted_power: Fixed::from_num(8000),
            min_received_power: Fixed::from_num(1) / 20,
            range: Fixed::from_num(30),
            detects_land: true,
            detects_air: true,
        }),
        ..base(3, "radar tower")
    });
    rules
}

/// Report emitted by a single run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// Scenario name.
    pub scenario: String,
    /// Ticks executed.
    pub ticks: u64,
    /// Final state hash, for cross-machine comparison.
    pub final_hash: u64,
    /// Units destroyed over the whole run.
    pub units_destroyed: usize,
    /// Items still live at the end.
    pub items_remaining: usize,
    /// Periodic (tick, hash) samples along the run.
    pub hash_samples: Vec<(u64, u64)>,
}

/// Run `scenario` for `ticks` ticks, sampling the state hash every
/// `hash_interval` ticks.
pub fn run_scenario(
    scenario: &Scenario,
    rules: RuleSet,
    ticks: u64,
    hash_interval: u64,
) -> Result<RunReport> {
    let mut sim = scenario.build(rules)?;
    let mut destroyed = 0;
    let mut hash_samples = Vec::new();
    for _ in 0..ticks {
        let summary = sim.advance();
        destroyed += summary.destroyed.len();
        if hash_interval > 0 && sim.get_tick() % hash_interval == 0 {
            hash_samples.push((sim.get_tick(), sim.state_hash()));
        }
    }
    Ok(RunReport {
        scenario: scenario.name.clone(),
        ticks,
        final_hash: sim.state_hash(),
        units_destroyed: destroyed,
        items_remaining: sim.items().sorted_ids().len(),
        hash_samples,
    })
}

/// Report emitted by a determinism verification.
#[derive(Debug, Serialize)]
pub struct VerifyReport {
    /// Scenario name.
    pub scenario: String,
    /// Ticks per run.
    pub ticks: u64,
    /// Number of runs compared.
    pub runs: u32,
    /// Final hash of every run.
    pub hashes: Vec<u64>,
    /// Whether every run agreed.
    pub deterministic: bool,
}

/// Run the scenario `runs` times and compare final hashes.
pub fn verify_scenario(
    scenario: &Scenario,
    rules: &RuleSet,
    ticks: u64,
    runs: u32,
) -> Result<VerifyReport> {
    let mut hashes = Vec::with_capacity(runs as usize);
    for _ in 0..runs {
        let mut sim = scenario.build(rules.clone())?;
        for _ in 0..ticks {
            sim.advance();
        }
        hashes.push(sim.state_hash());
    }
    let deterministic = hashes.windows(2).all(|w| w[0] == w[1]);
    if !deterministic {
        tracing::error!(?hashes, "Scenario diverged across identical runs");
    }
    Ok(VerifyReport {
        scenario: scenario.name.clone(),
        ticks,
        runs,
        hashes,
        deterministic,
    })
}

/// Ticks-per-second measurement for the benchmark subcommand.
#[derive(Debug, Serialize)]
pub struct BenchmarkReport {
    /// Ticks executed.
    pub ticks: u64,
    /// Wall-clock milliseconds for the whole run.
    pub elapsed_ms: u128,
    /// Ticks per wall-clock second.
    pub ticks_per_second: u64,
}

/// Run the built-in skirmish for `ticks` ticks and time it.
pub fn benchmark(ticks: u64) -> Result<BenchmarkReport> {
    let mut sim = Scenario::skirmish().build(default_rules())?;
    let start = std::time::Instant::now();
    for _ in 0..ticks {
        sim.advance();
    }
    let elapsed = start.elapsed();
    let ticks_per_second = if elapsed.as_millis() == 0 {
        ticks * 1000
    } else {
        (ticks as u128 * 1000 / elapsed.as_millis()) as u64
    };
    Ok(BenchmarkReport {
        ticks,
        elapsed_ms: elapsed.as_millis(),
        ticks_per_second,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_report_counts_destruction() {
        let report = run_scenario(&Scenario::skirmish(), default_rules(), 400, 100).unwrap();
        assert_eq!(report.ticks, 400);
        assert_eq!(report.hash_samples.len(), 4);
        // Armed tanks in range eventually trade fire.
        assert!(report.units_destroyed > 0 || report.items_remaining >= 6);
    }

    #[test]
    fn test_verify_reports_deterministic() {
        let report =
            verify_scenario(&Scenario::skirmish(), &default_rules(), 120, 3).unwrap();
        assert!(report.deterministic, "hashes: {:?}", report.hashes);
        assert_eq!(report.hashes.len(), 3);
    }

    #[test]
    fn test_reports_serialize_to_json() {
        let report = run_scenario(&Scenario::skirmish(), default_rules(), 10, 0).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"scenario\":\"skirmish\""));
    }
}
