use crate::control::Gate;
use crate::grid::{BindingId, CellId};
use crate::math::{Point2d, Vector2d};
use crate::network::LaneRef;
use crate::{IntersectionId, VehicleId};

/// What happened during one step of simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StepSummary {
    /// The index of the step, starting from 1.
    pub step: u64,
    /// The number of vehicles which advanced at least one cell.
    pub moved: usize,
    /// The number of vehicles injected at the boundary.
    pub injected: usize,
    /// The number of arrivals which found their entry cell occupied and were dropped.
    pub injections_blocked: usize,
    /// The number of vehicles which left the network.
    pub removed: usize,
    /// The number of intersection controllers which changed phase.
    pub phase_changes: usize,
    /// The number of invariant violations recorded in the diagnostics channel.
    pub violations: usize,
}

/// A read-only, point-in-time view of a simulation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    /// The number of completed steps.
    pub step: u64,
    /// Every vehicle in the network, in ascending ID order.
    pub vehicles: Vec<VehicleView>,
    /// The gate of every binding, as it will be frozen for the next step.
    pub gates: Vec<GateView>,
}

/// The location and speed of a vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VehicleView {
    pub id: VehicleId,
    pub cell: CellId,
    pub lane: LaneRef,
    /// The number of cells before the vehicle's cell in its lane.
    pub offset: u32,
    /// Speed in cells per step.
    pub speed: u8,
    pub max_speed: u8,
    /// World space coordinates of the middle of the vehicle's cell.
    pub position: Point2d,
    /// Unit vector in the direction of travel.
    pub heading: Vector2d,
}

/// The gate state of an intersection binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GateView {
    pub intersection: IntersectionId,
    pub binding: BindingId,
    /// Index of the binding within its intersection.
    pub index: usize,
    pub from: LaneRef,
    pub to: LaneRef,
    /// `None` if the controller did not report a gate for this binding.
    pub gate: Option<Gate>,
    /// The controller's signal phase, if it is a signal.
    pub phase: Option<usize>,
}

impl StepSummary {
    /// Adds the counts of another summary to this one, keeping the later step index.
    pub fn accumulate(&mut self, other: &StepSummary) {
        self.step = u64::max(self.step, other.step);
        self.moved += other.moved;
        self.injected += other.injected;
        self.injections_blocked += other.injections_blocked;
        self.removed += other.removed;
        self.phase_changes += other.phase_changes;
        self.violations += other.violations;
    }
}

impl Snapshot {
    /// Finds a vehicle by ID.
    pub fn vehicle(&self, id: VehicleId) -> Option<&VehicleView> {
        self.vehicles
            .binary_search_by(|v| v.id.cmp(&id))
            .ok()
            .map(|idx| &self.vehicles[idx])
    }

    /// The gates of one intersection.
    pub fn gates_of(&self, intersection: IntersectionId) -> impl Iterator<Item = &GateView> {
        self.gates
            .iter()
            .filter(move |gate| gate.intersection == intersection)
    }
}
