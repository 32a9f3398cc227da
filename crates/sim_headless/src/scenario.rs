//! Scenario definitions: map size, player rosters, unit placements.
//!
//! Scenarios are RON files so battle setups can be edited without a
//! recompile. A built-in skirmish covers the no-arguments case.

use serde::{Deserialize, Serialize};

use sim_core::config::{RuleSet, UnitTypeId};
use sim_core::map::GameMap;
use sim_core::math::{Fixed, Vec2Fixed};
use sim_core::simulation::Simulation;

use crate::{HeadlessError, Result};

/// One unit to place at game start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitPlacement {
    /// Unit type to spawn, resolved against the rule set.
    pub type_id: u32,
    /// Cell X coordinate.
    pub x: i32,
    /// Cell Y coordinate.
    pub y: i32,
}

/// One player's starting roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSetup {
    /// Units placed for this player at tick zero.
    pub units: Vec<UnitPlacement>,
}

/// A complete battle setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Name used in reports.
    pub name: String,
    /// Map width in cells.
    pub map_width: u32,
    /// Map height in cells.
    pub map_height: u32,
    /// One entry per active player, in join order.
    pub players: Vec<PlayerSetup>,
}

impl Scenario {
    /// Parse a scenario from RON text. `path` is used in diagnostics only.
    pub fn from_ron_str(path: &str, text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| HeadlessError::ScenarioParse {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    /// Load a scenario from a RON file.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&path.display().to_string(), &text)
    }

    /// The built-in two-player tank skirmish.
    #[must_use]
    pub fn skirmish() -> Self {
        let side = |x: i32| PlayerSetup {
            units: vec![
                UnitPlacement { type_id: 2, x, y: 20 },
                UnitPlacement { type_id: 2, x, y: 28 },
                UnitPlacement { type_id: 1, x, y: 24 },
            ],
        };
        Self {
            name: "skirmish".to_string(),
            map_width: 64,
            map_height: 64,
            players: vec![side(10), side(50)],
        }
    }

    /// Instantiate the scenario under `rules`.
    ///
    /// # Errors
    ///
    /// Fails on unknown unit types or off-map placements.
    pub fn build(&self, rules: RuleSet) -> Result<Simulation> {
        let map = GameMap::new(self.map_width, self.map_height);
        let mut sim = Simulation::new(map, rules);
        for setup in &self.players {
            let player = sim.add_player();
            for placement in &setup.units {
                sim.create_unit(
                    player,
                    UnitTypeId::new(placement.type_id),
                    Vec2Fixed::new(
                        Fixed::from_num(placement.x),
                        Fixed::from_num(placement.y),
                    ),
                )?;
            }
        }
        tracing::info!(
            scenario = %self.name,
            players = self.players.len(),
            units = sim.items().sorted_ids().len(),
            "Scenario instantiated"
        );
        Ok(sim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::default_rules;

    #[test]
    fn test_skirmish_builds() {
        let sim = Scenario::skirmish().build(default_rules()).unwrap();
        assert_eq!(sim.items().sorted_ids().len(), 6);
    }

    #[test]
    fn test_ron_round_trip() {
        let scenario = Scenario::skirmish();
        let text = ron::to_string(&scenario).unwrap();
        let parsed = Scenario::from_ron_str("inline", &text).unwrap();
        assert_eq!(parsed.players.len(), 2);
        assert_eq!(parsed.map_width, 64);
    }

    #[test]
    fn test_malformed_scenario_reports_path() {
        let err = Scenario::from_ron_str("bad.ron", "(nope").unwrap_err();
        match err {
            HeadlessError::ScenarioParse { path, .. } => assert_eq!(path, "bad.ron"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_off_map_placement_rejected() {
        let mut scenario = Scenario::skirmish();
        scenario.players[0].units[0].x = 500;
        assert!(scenario.build(default_rules()).is_err());
    }
}
