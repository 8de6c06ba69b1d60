//! Tests of vehicles entering and leaving the network.

mod common;

use assert_approx_eq::assert_approx_eq;
use cellular_traffic::{ArrivalPolicy, BuildError, Endpoint, LaneRef, Simulation};
use common::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Test that a segment which isn't a whole number of cells ends in a shorter cell,
/// which vehicles traverse like any other.
#[test]
fn last_cell_is_truncated() {
    init_logging();
    let mut net = cellular_traffic::RoadNetwork::new();
    let seg = straight(&mut net, (0.0, 0.0), (105.0, 0.0), 1);
    net.mark_boundary(seg, Endpoint::Start);
    net.mark_boundary(seg, Endpoint::End);

    let mut config = config(0.0, ArrivalPolicy::Disabled);
    config.cell_length = 20.0;
    let mut sim = Simulation::new(&net, config).unwrap();

    let grid = sim.grid();
    assert_eq!(grid.lane_len(LaneRef::forward(seg, 0)), Some(6));
    assert_approx_eq!(grid.cell(cell(&sim, seg, 0)).length(), 20.0);
    assert_approx_eq!(grid.cell(cell(&sim, seg, 5)).length(), 5.0);
    assert_approx_eq!(grid.cell(cell(&sim, seg, 5)).span().max, 105.0);

    // 37.5 m/s is less than 2 cells of 20 m per second
    let veh = sim.inject(LaneRef::forward(seg, 0)).unwrap();
    for offset in 1..5 {
        let summary = sim.step();
        assert_eq!(summary.removed, 0);
        assert_eq!(sim.vehicle_view(veh).unwrap().offset, offset);
    }
    assert_eq!(sim.step().removed, 1);
    assert_eq!(sim.vehicle_count(), 0);
}

/// Test that an endpoint which is neither bound nor a boundary is rejected.
#[test]
fn unbound_endpoint_is_fatal() {
    init_logging();
    let mut net = cellular_traffic::RoadNetwork::new();
    let seg = straight(&mut net, (0.0, 0.0), (100.0, 0.0), 1);
    net.mark_boundary(seg, Endpoint::Start);

    match Simulation::new(&net, config(0.0, ArrivalPolicy::Disabled)) {
        Err(BuildError::UnboundEndpoint { segment, endpoint }) => {
            assert_eq!(segment, seg);
            assert_eq!(endpoint, Endpoint::End);
        }
        other => panic!("unexpected result {:?}", other.map(|_| ())),
    }
}

/// Test that vehicles injected at the maximum rate onto a 5-lane road never collide.
#[test]
fn five_lanes_at_max_rate_never_collide() {
    init_logging();
    let (net, _) = open_road(40, 5);
    let mut sim = Simulation::new(&net, config(0.3, ArrivalPolicy::FixedRate { period: 1 })).unwrap();
    assert_eq!(sim.grid().entry_cells().len(), 5);

    let mut injected = 0;
    let mut removed = 0;
    for _ in 0..500 {
        let summary = sim.step();
        assert_eq!(summary.violations, 0);
        injected += summary.injected;
        removed += summary.removed;
        assert_consistent(&sim);
    }
    assert!(sim.diagnostics().is_empty());
    assert!(removed > 0);
    assert_eq!(sim.vehicle_count(), injected - removed);
}

/// Test that the vehicle count only changes through injection and removal,
/// under random boundary arrivals and random manual changes.
#[test]
fn vehicles_are_conserved() {
    init_logging();
    let (net, seg) = open_road(30, 3);
    let mut sim = Simulation::new(
        &net,
        config(0.25, ArrivalPolicy::Bernoulli { probability: 0.5 }),
    )
    .unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(5);

    for _ in 0..400 {
        if rng.gen_bool(0.3) {
            let before = sim.vehicle_count();
            let lane = LaneRef::forward(seg, rng.gen_range(0..3));
            let added = sim.inject(lane).is_some() as usize;
            assert_eq!(sim.vehicle_count(), before + added);
        }
        if rng.gen_bool(0.2) && sim.vehicle_count() > 0 {
            let before = sim.vehicle_count();
            let nth = rng.gen_range(0..before);
            let id = sim.iter_vehicles().nth(nth).unwrap().id();
            assert!(sim.remove_vehicle(id));
            assert_eq!(sim.vehicle_count(), before - 1);
        }

        let before = sim.vehicle_count();
        let summary = sim.step();
        assert_eq!(
            sim.vehicle_count(),
            before + summary.injected - summary.removed
        );
        assert_consistent(&sim);
    }
}

/// Test that Poisson arrivals are spread over every entry, and dropped
/// rather than queued when an entry is occupied.
#[test]
fn poisson_arrivals() {
    init_logging();
    let (net, _) = open_road(20, 2);
    let mut sim = Simulation::new(&net, config(0.0, ArrivalPolicy::Poisson { rate: 0.2 })).unwrap();

    let mut arrivals = 0;
    let mut injected = 0;
    for _ in 0..2000 {
        let summary = sim.step();
        arrivals += summary.injected + summary.injections_blocked;
        injected += summary.injected;
    }
    // Two entries at 0.2 arrivals per step each
    assert!((600..=1000).contains(&arrivals), "arrivals = {}", arrivals);
    assert!(injected > 0 && injected <= arrivals);
    assert!(sim.diagnostics().is_empty());
}
