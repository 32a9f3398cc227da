//! End-to-end checks for the headless runner's report pipeline.

use sim_headless::runner::{default_rules, run_scenario, verify_scenario};
use sim_headless::scenario::Scenario;
use sim_test_utils::determinism::verify_determinism;

#[test]
fn built_in_skirmish_is_deterministic_through_the_runner() {
    let report = verify_scenario(&Scenario::skirmish(), &default_rules(), 300, 4).unwrap();
    assert!(report.deterministic, "hashes: {:?}", report.hashes);
}

#[test]
fn scenario_build_matches_harness_verdict() {
    // The runner's verdict and the shared harness must agree.
    let harness = verify_determinism(
        2,
        150,
        || Scenario::skirmish().build(default_rules()).unwrap(),
        |sim| {
            sim.advance();
        },
        sim_core::simulation::Simulation::state_hash,
    );
    harness.assert_deterministic();

    let report = verify_scenario(&Scenario::skirmish(), &default_rules(), 150, 2).unwrap();
    assert_eq!(report.hashes[0], harness.hashes[0]);
}

#[test]
fn run_report_samples_hashes_on_interval() {
    let report = run_scenario(&Scenario::skirmish(), default_rules(), 250, 50).unwrap();
    assert_eq!(report.hash_samples.len(), 5);
    assert_eq!(report.hash_samples[0].0, 50);
    assert_eq!(report.hash_samples[4].0, 250);
}
