//! Tick-advance benchmarks for sim_core.
//!
//! Run with: `cargo bench -p sim_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sim_core::prelude::*;

fn populated_simulation(units_per_player: u32) -> Simulation {
    let mut rules = RuleSet::new();
    rules.register(UnitType {
        id: UnitTypeId::new(1),
        name: "rover".to_string(),
        max_health: 100,
        armor: 5,
        max_shields: 0,
        sight_range: 6,
        speed: Fixed::from_num(1) / 2,
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
    });

    let mut sim = Simulation::new(GameMap::new(128, 128), rules);
    let a = sim.add_player();
    let b = sim.add_player();
    for i in 0..units_per_player {
        let x = Fixed::from_num(2 + (i % 16) * 4);
        let y = Fixed::from_num(2 + (i / 16) * 4);
        let ua = sim
            .create_unit(a, UnitTypeId::new(1), Vec2Fixed::new(x, y))
            .unwrap();
        let far = Fixed::from_num(120);
        sim.create_unit(b, UnitTypeId::new(1), Vec2Fixed::new(far - x, far - y))
            .unwrap();
        sim.order_move(ua, Vec2Fixed::new(far - x, far - y)).unwrap();
    }
    sim
}

/// One full tick over a mid-sized battlefield, moving units included.
pub fn advance_benchmark(c: &mut Criterion) {
    c.bench_function("advance_64_moving_units", |b| {
        let mut sim = populated_simulation(32);
        b.iter(|| black_box(sim.advance()));
    });

    c.bench_function("state_hash_64_units", |b| {
        let sim = populated_simulation(32);
        b.iter(|| black_box(sim.state_hash()));
    });
}

criterion_group!(benches, advance_benchmark);
criterion_main!(benches);
