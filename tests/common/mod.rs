//! Networks and parameters shared by the integration tests.
#![allow(dead_code)]

use cellular_traffic::{
    math::Point2d, ArrivalPolicy, CellId, ControlType, Endpoint, InjectionParams,
    IntersectionId, InvariantPolicy, LaneBinding, LaneRef, PriorityParams, RoadNetwork,
    RoundaboutParams, SegmentAttributes, SegmentId, SegmentKind, SignalTiming, Simulation,
    SimulationConfig, VehicleId,
};
use std::collections::HashSet;

/// The cell length used by every test network, in m.
pub const CELL: f64 = 7.5;

/// A speed limit of exactly 5 cells per step.
pub const SPEED_LIMIT: f64 = 37.5;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn config(p_slow: f64, arrival: ArrivalPolicy) -> SimulationConfig {
    SimulationConfig {
        cell_length: CELL,
        time_step: 1.0,
        max_speed: 5,
        p_slow,
        seed: 17,
        signal: SignalTiming { phase_ticks: 10 },
        roundabout: RoundaboutParams {
            circulating_lookback: 5,
        },
        priority: PriorityParams { yield_distance: 5 },
        injection: InjectionParams {
            arrival,
            vehicle_max_speed: 5,
        },
        invariant_policy: InvariantPolicy::Recover,
    }
}

/// Adds a straight one-way segment.
pub fn straight(net: &mut RoadNetwork, from: (f64, f64), to: (f64, f64), lanes: u8) -> SegmentId {
    net.add_segment(&SegmentAttributes {
        geometry: &[Point2d::new(from.0, from.1), Point2d::new(to.0, to.1)],
        lanes,
        speed_limit: SPEED_LIMIT,
        one_way: true,
        kind: SegmentKind::Normal,
    })
}

/// A one-way road of `cells` cells and `lanes` lanes, open at both ends.
pub fn open_road(cells: u32, lanes: u8) -> (RoadNetwork, SegmentId) {
    let mut net = RoadNetwork::new();
    let seg = straight(&mut net, (0.0, 0.0), (cells as f64 * CELL, 0.0), lanes);
    net.mark_boundary(seg, Endpoint::Start);
    net.mark_boundary(seg, Endpoint::End);
    (net, seg)
}

/// A closed single-lane loop of `cells` cells, joined to itself by one intersection.
pub fn ring_road(cells: u32) -> (RoadNetwork, SegmentId) {
    let side = cells as f64 * CELL / 4.0;
    let mut net = RoadNetwork::new();
    let seg = net.add_segment(&SegmentAttributes {
        geometry: &[
            Point2d::new(0.0, 0.0),
            Point2d::new(side, 0.0),
            Point2d::new(side, side),
            Point2d::new(0.0, side),
            Point2d::new(0.0, 0.0),
        ],
        lanes: 1,
        speed_limit: SPEED_LIMIT,
        one_way: true,
        kind: SegmentKind::RoundaboutArc,
    });
    net.add_intersection(
        Point2d::new(0.0, 0.0),
        ControlType::Priority { ranking: vec![] },
        vec![LaneBinding::new(
            LaneRef::forward(seg, 0),
            LaneRef::forward(seg, 0),
        )],
    );
    (net, seg)
}

/// Two 10-cell roads merging into a third.
/// Binding 0 joins `major` to `out`, binding 1 joins `minor` to `out`.
pub struct Merge {
    pub net: RoadNetwork,
    pub major: SegmentId,
    pub minor: SegmentId,
    pub out: SegmentId,
    pub intersection: IntersectionId,
}

pub fn merge(control: ControlType) -> Merge {
    let mut net = RoadNetwork::new();
    let major = straight(&mut net, (0.0, 0.0), (75.0, 0.0), 1);
    let minor = straight(&mut net, (75.0, -75.0), (75.0, 0.0), 1);
    let out = straight(&mut net, (75.0, 0.0), (150.0, 0.0), 1);
    let intersection = net.add_intersection(
        Point2d::new(75.0, 0.0),
        control,
        vec![
            LaneBinding::new(LaneRef::forward(major, 0), LaneRef::forward(out, 0)),
            LaneBinding::new(LaneRef::forward(minor, 0), LaneRef::forward(out, 0)),
        ],
    );
    net.mark_boundary(major, Endpoint::Start);
    net.mark_boundary(minor, Endpoint::Start);
    net.mark_boundary(out, Endpoint::End);
    Merge {
        net,
        major,
        minor,
        out,
        intersection,
    }
}

/// Two 10-cell roads crossing at a signal with phases `[[0], [1]]`.
/// Binding 0 joins `ew_in` to `ew_out`, binding 1 joins `ns_in` to `ns_out`.
pub struct Crossing {
    pub net: RoadNetwork,
    pub ew_in: SegmentId,
    pub ew_out: SegmentId,
    pub ns_in: SegmentId,
    pub ns_out: SegmentId,
    pub intersection: IntersectionId,
}

pub fn crossing() -> Crossing {
    let mut net = RoadNetwork::new();
    let ew_in = straight(&mut net, (0.0, 0.0), (75.0, 0.0), 1);
    let ew_out = straight(&mut net, (75.0, 0.0), (150.0, 0.0), 1);
    let ns_in = straight(&mut net, (75.0, -75.0), (75.0, 0.0), 1);
    let ns_out = straight(&mut net, (75.0, 0.0), (75.0, 75.0), 1);
    let intersection = net.add_intersection(
        Point2d::new(75.0, 0.0),
        ControlType::Signal {
            phases: vec![vec![0], vec![1]],
        },
        vec![
            LaneBinding::new(LaneRef::forward(ew_in, 0), LaneRef::forward(ew_out, 0)),
            LaneBinding::new(LaneRef::forward(ns_in, 0), LaneRef::forward(ns_out, 0)),
        ],
    );
    for seg in [ew_in, ns_in] {
        net.mark_boundary(seg, Endpoint::Start);
    }
    for seg in [ew_out, ns_out] {
        net.mark_boundary(seg, Endpoint::End);
    }
    Crossing {
        net,
        ew_in,
        ew_out,
        ns_in,
        ns_out,
        intersection,
    }
}

/// Gets the cell at an offset of the first forward lane of a segment.
pub fn cell(sim: &Simulation, segment: SegmentId, offset: u32) -> CellId {
    sim.grid()
        .cell_at(LaneRef::forward(segment, 0), offset)
        .unwrap()
}

/// The occupied cells and their speeds, in cell order.
pub fn traffic(sim: &Simulation) -> Vec<(CellId, u8)> {
    let mut traffic = sim
        .snapshot()
        .vehicles
        .iter()
        .map(|v| (v.cell, v.speed))
        .collect::<Vec<_>>();
    traffic.sort();
    traffic
}

/// Checks that the vehicles and the cell occupancy agree, and no two vehicles share a cell.
pub fn assert_consistent(sim: &Simulation) {
    let mut cells = HashSet::new();
    for vehicle in sim.iter_vehicles() {
        assert!(
            cells.insert(vehicle.cell()),
            "two vehicles in cell {:?}",
            vehicle.cell()
        );
        assert_eq!(sim.occupant(vehicle.cell()), Some(vehicle.id()));
    }
    let occupied = sim
        .state()
        .occupancy()
        .iter()
        .filter(|cell| cell.is_some())
        .count();
    assert_eq!(occupied, sim.vehicle_count());
}

/// The most each vehicle may move on the next step: the least of the global and
/// vehicle maximum speeds, the lane's speed limit and the gap ahead.
pub fn speed_bounds(sim: &Simulation) -> Vec<(VehicleId, u8)> {
    sim.snapshot()
        .vehicles
        .iter()
        .map(|v| {
            let bound = [
                sim.config().max_speed,
                v.max_speed,
                sim.lane_limit(v.lane).unwrap(),
                sim.gap_ahead(v.id).unwrap(),
            ]
            .into_iter()
            .min()
            .unwrap();
            (v.id, bound)
        })
        .collect()
}

/// Checks that no vehicle moved faster than its bound from before the step,
/// and that every vehicle is within the speed limit of the lane it is now in.
pub fn assert_speeds_within(sim: &Simulation, bounds: &[(VehicleId, u8)]) {
    for &(id, bound) in bounds {
        if let Some(view) = sim.vehicle_view(id) {
            assert!(view.speed <= bound, "vehicle {:?}: speed {} > {}", id, view.speed, bound);
        }
    }
    for view in sim.snapshot().vehicles {
        let limit = sim.lane_limit(view.lane).unwrap();
        assert!(view.speed <= limit, "vehicle {:?}: speed {} > lane limit {}", view.id, view.speed, limit);
    }
}
