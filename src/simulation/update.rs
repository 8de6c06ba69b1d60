//! The Nagel-Schreckenberg update rule.
//!
//! Planning only reads the current cell buffer and the frozen gates,
//! so every vehicle sees the state as it was at the start of the step.
//! Movement then writes exclusively into the next-state buffer.

use crate::control::{Gate, GateTable};
use crate::diagnostics::Diagnostics;
use crate::error::InvariantViolation;
use crate::grid::{BindingId, CellGrid, CellId, Successor};
use crate::state::CellBuffer;
use crate::{VehicleId, VehicleSet};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// A vehicle's move during one step.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Move {
    pub vehicle: VehicleId,
    pub from: CellId,
    /// The new speed, which is also the number of cells to advance.
    pub speed: u8,
}

/// The free road ahead of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Gap {
    /// The number of passable cells ahead, up to the lookahead.
    pub cells: u8,
    /// A binding on the way which had no frozen gate.
    pub missing_gate: Option<BindingId>,
}

/// Everything the planning phase reads.
pub(crate) struct PlanInput<'a> {
    pub grid: &'a CellGrid,
    pub cells: &'a CellBuffer,
    pub vehicles: &'a VehicleSet,
    pub gates: &'a GateTable,
    /// Speed cap of each grid lane in cells per step.
    pub lane_limits: &'a [u8],
    pub p_slow: f64,
}

/// Counts the empty cells ahead of `from`, up to `lookahead`, stopping at an
/// occupied cell, a closed or missing gate, or the network boundary.
///
/// Crossing a binding lowers the lookahead to the speed limit of the lane entered,
/// so a vehicle never lands in a lane faster than that lane allows.
pub(crate) fn gap_ahead(
    grid: &CellGrid,
    occupancy: &[Option<VehicleId>],
    gates: &GateTable,
    lane_limits: &[u8],
    from: CellId,
    mut lookahead: u8,
) -> Gap {
    let mut gap = Gap {
        cells: 0,
        missing_gate: None,
    };
    let mut cell = from;
    while gap.cells < lookahead {
        let next = match grid.successor(cell) {
            Successor::Next(next) => next,
            Successor::Gated { binding, cell } => match gates.get(binding) {
                Some(Gate::Open) => {
                    lookahead = u8::min(lookahead, lane_limits[grid.cell(cell).lane_idx()]);
                    if gap.cells >= lookahead {
                        break;
                    }
                    cell
                }
                Some(Gate::Closed) => break,
                None => {
                    gap.missing_gate = Some(binding);
                    break;
                }
            },
            Successor::Exit => break,
        };
        if occupancy[next.index()].is_some() {
            break;
        }
        gap.cells += 1;
        cell = next;
    }
    gap
}

/// Follows the successor chain `steps` cells from `from`.
/// Gates are not consulted: the path was already checked by [gap_ahead].
fn advance(grid: &CellGrid, from: CellId, steps: u8) -> CellId {
    let mut cell = from;
    for _ in 0..steps {
        cell = match grid.successor(cell) {
            Successor::Next(next) => next,
            Successor::Gated { cell, .. } => cell,
            Successor::Exit => break,
        };
    }
    cell
}

/// Computes the new speed of every vehicle, in ascending cell order.
///
/// Returns the moves and the bindings found without a frozen gate.
pub(crate) fn plan_moves(
    input: &PlanInput,
    rng: &mut ChaCha8Rng,
) -> (Vec<Move>, Vec<BindingId>) {
    let mut moves = Vec::with_capacity(input.vehicles.len());
    let mut missing = vec![];

    for (idx, occupant) in input.cells.occupancy.iter().enumerate() {
        let Some(vehicle_id) = *occupant else {
            continue;
        };
        let from = CellId(idx as u32);
        let lane_limit = input.lane_limits[input.grid.cell(from).lane_idx()];
        let limit = input
            .vehicles
            .get(vehicle_id)
            .map(|v| u8::min(v.max_speed, lane_limit))
            .unwrap_or(lane_limit);

        // Acceleration
        let mut speed = u8::min(input.cells.speed[idx].saturating_add(1), limit);

        // Deceleration
        let gap = gap_ahead(
            input.grid,
            &input.cells.occupancy,
            input.gates,
            input.lane_limits,
            from,
            limit,
        );
        missing.extend(gap.missing_gate);
        speed = u8::min(speed, gap.cells);

        // Randomisation
        if rng.gen_bool(input.p_slow) {
            speed = speed.saturating_sub(1);
        }

        moves.push(Move {
            vehicle: vehicle_id,
            from,
            speed,
        });
    }

    missing.sort();
    missing.dedup();
    (moves, missing)
}

/// Writes every move into the empty `next` buffer and updates the vehicles' cells.
///
/// Two vehicles arriving in one cell is an invariant violation: the vehicle with
/// the lowest ID keeps the cell and the other is returned to its origin cell,
/// which no other vehicle can have entered, with zero speed.
///
/// Returns the number of vehicles which advanced.
pub(crate) fn apply_moves(
    grid: &CellGrid,
    moves: &[Move],
    next: &mut CellBuffer,
    vehicles: &mut VehicleSet,
    diagnostics: &mut Diagnostics,
    step: u64,
) -> usize {
    let mut moved = 0;

    for mv in moves {
        let dest = advance(grid, mv.from, mv.speed);
        let (cell, speed) = match next.occupant(dest) {
            None => (dest, mv.speed),
            Some(other) => {
                let (winner, loser) = if mv.vehicle < other {
                    (mv.vehicle, other)
                } else {
                    (other, mv.vehicle)
                };
                diagnostics.record(InvariantViolation::MovementCollisionDetected {
                    step,
                    cell: dest,
                    winner,
                    loser,
                });
                if winner == mv.vehicle {
                    // Send the other vehicle back where it came from
                    if let Some(evicted) = moves.iter().find(|m| m.vehicle == other) {
                        next.place(evicted.from, other, 0);
                        if let Some(vehicle) = vehicles.get_mut(other) {
                            vehicle.cell = evicted.from;
                            vehicle.travelled -= evicted.speed as u64;
                        }
                        if evicted.speed > 0 {
                            moved -= 1;
                        }
                    }
                    (dest, mv.speed)
                } else {
                    (mv.from, 0)
                }
            }
        };

        next.place(cell, mv.vehicle, speed);
        if let Some(vehicle) = vehicles.get_mut(mv.vehicle) {
            vehicle.cell = cell;
            vehicle.travelled += speed as u64;
        }
        if speed > 0 {
            moved += 1;
        }
    }

    moved
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::Point2d;
    use crate::network::*;
    use crate::state::Vehicle;
    use crate::SegmentId;

    fn attribs(geometry: &[Point2d]) -> SegmentAttributes<'_> {
        SegmentAttributes {
            geometry,
            lanes: 1,
            speed_limit: 30.0,
            one_way: true,
            kind: SegmentKind::Normal,
        }
    }

    /// A one-way 200 m lane feeding a 100 m lane through a single binding, in 20 m cells.
    fn two_segment_grid() -> (CellGrid, SegmentId, SegmentId) {
        let mut net = RoadNetwork::new();
        let a = net.add_segment(&attribs(&[Point2d::new(0.0, 0.0), Point2d::new(200.0, 0.0)]));
        let b = net.add_segment(&attribs(&[Point2d::new(200.0, 0.0), Point2d::new(300.0, 0.0)]));
        net.add_intersection(
            Point2d::new(200.0, 0.0),
            ControlType::Priority { ranking: vec![] },
            vec![LaneBinding::new(LaneRef::forward(a, 0), LaneRef::forward(b, 0))],
        );
        net.mark_boundary(a, Endpoint::Start);
        net.mark_boundary(b, Endpoint::End);
        (CellGrid::build(&net, 20.0).unwrap(), a, b)
    }

    fn cell(grid: &CellGrid, segment: SegmentId, offset: u32) -> CellId {
        grid.cell_at(LaneRef::forward(segment, 0), offset).unwrap()
    }

    fn limits(grid: &CellGrid, limit: u8) -> Vec<u8> {
        vec![limit; grid.lanes().len()]
    }

    #[test]
    fn gap_stops_at_vehicles_gates_and_exits() {
        let (grid, a, b) = two_segment_grid();
        let mut occupancy = vec![None; grid.len()];
        let mut gates = GateTable::default();
        gates.reset(grid.num_bindings());
        gates.set(BindingId(0), Gate::Open);
        let limits = limits(&grid, 5);

        // Empty road, limited by lookahead
        assert_eq!(gap_ahead(&grid, &occupancy, &gates, &limits, cell(&grid, a, 0), 5).cells, 5);

        // Across the open binding
        assert_eq!(gap_ahead(&grid, &occupancy, &gates, &limits, cell(&grid, a, 8), 5).cells, 5);

        // Up to the exit cell, inclusive
        assert_eq!(gap_ahead(&grid, &occupancy, &gates, &limits, cell(&grid, b, 2), 5).cells, 2);

        // A closed gate
        gates.set(BindingId(0), Gate::Closed);
        assert_eq!(gap_ahead(&grid, &occupancy, &gates, &limits, cell(&grid, a, 7), 5).cells, 2);

        // A vehicle ahead
        occupancy[cell(&grid, a, 3).index()] = Some(VehicleId::default());
        assert_eq!(gap_ahead(&grid, &occupancy, &gates, &limits, cell(&grid, a, 0), 5).cells, 2);
    }

    #[test]
    fn gap_reports_missing_gate() {
        let (grid, a, _) = two_segment_grid();
        let occupancy = vec![None; grid.len()];
        let mut gates = GateTable::default();
        gates.reset(grid.num_bindings());
        let limits = limits(&grid, 5);

        let gap = gap_ahead(&grid, &occupancy, &gates, &limits, cell(&grid, a, 8), 5);
        assert_eq!(gap.cells, 1);
        assert_eq!(gap.missing_gate, Some(BindingId(0)));
    }

    #[test]
    fn gap_is_capped_by_slower_lane_ahead() {
        let (grid, a, b) = two_segment_grid();
        let occupancy = vec![None; grid.len()];
        let mut gates = GateTable::default();
        gates.reset(grid.num_bindings());
        gates.set(BindingId(0), Gate::Open);
        let mut limits = limits(&grid, 5);
        limits[grid.cell(cell(&grid, b, 0)).lane_idx()] = 2;

        // Two cells left in the fast lane, so the slow lane can't be entered
        let gap = gap_ahead(&grid, &occupancy, &gates, &limits, cell(&grid, a, 7), 5);
        assert_eq!(gap.cells, 2);

        // One cell left, then one more in the slow lane
        let gap = gap_ahead(&grid, &occupancy, &gates, &limits, cell(&grid, a, 8), 5);
        assert_eq!(gap.cells, 2);

        // Right at the binding
        let gap = gap_ahead(&grid, &occupancy, &gates, &limits, cell(&grid, a, 9), 5);
        assert_eq!(gap.cells, 2);
        assert_eq!(gap.missing_gate, None);
    }

    #[test]
    fn collision_keeps_lowest_id() {
        let (grid, a, _) = two_segment_grid();
        let mut vehicles = VehicleSet::default();
        let mut ids = vec![];
        for offset in [0, 2] {
            let from = cell(&grid, a, offset);
            ids.push(vehicles.insert_with_key(|id| Vehicle {
                id,
                max_speed: 5,
                cell: from,
                entered: 0,
                travelled: 0,
            }));
        }

        // Both vehicles are (incorrectly) planned to end up in cell 4
        let moves = [
            Move {
                vehicle: ids[1],
                from: cell(&grid, a, 2),
                speed: 2,
            },
            Move {
                vehicle: ids[0],
                from: cell(&grid, a, 0),
                speed: 4,
            },
        ];
        let mut next = CellBuffer::new(grid.len());
        let mut diagnostics = Diagnostics::default();
        let moved = apply_moves(&grid, &moves, &mut next, &mut vehicles, &mut diagnostics, 1);

        assert_eq!(moved, 1);
        assert_eq!(next.occupant(cell(&grid, a, 4)), Some(ids[0]));
        assert_eq!(next.occupant(cell(&grid, a, 2)), Some(ids[1]));
        assert_eq!(vehicles[ids[1]].cell, cell(&grid, a, 2));
        assert_eq!(vehicles[ids[1]].travelled, 0);
        assert_eq!(
            diagnostics.iter().collect::<Vec<_>>(),
            vec![&InvariantViolation::MovementCollisionDetected {
                step: 1,
                cell: cell(&grid, a, 4),
                winner: ids[0],
                loser: ids[1],
            }]
        );
    }
}
