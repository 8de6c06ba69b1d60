//! Intersection controllers, which decide each step which bindings may be crossed.

use self::priority::PriorityController;
use self::roundabout::RoundaboutController;
use self::signal::SignalController;
use crate::config::SimulationConfig;
use crate::grid::{BindingId, CellGrid, CellId, GridIntersection};
use crate::network::ControlType;
use crate::{IntersectionId, VehicleId};

mod priority;
mod roundabout;
mod signal;

/// Whether vehicles may cross an intersection binding during a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum Gate {
    Open,
    Closed,
}

/// What a controller may look at when deciding its gates:
/// the occupancy at the start of the step.
#[derive(Clone, Copy)]
pub(crate) struct GateContext<'a> {
    pub(crate) occupancy: &'a [Option<VehicleId>],
}

/// The controller of one intersection.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IntersectionController {
    Signal(SignalController),
    Roundabout(RoundaboutController),
    Priority(PriorityController),
}

/// The gates of every binding, frozen for the duration of one step.
#[derive(Clone, Debug, Default)]
pub(crate) struct GateTable {
    gates: Vec<Option<Gate>>,
}

impl<'a> GateContext<'a> {
    /// Whether any of the given cells is occupied.
    pub(crate) fn any_occupied(&self, cells: &[CellId]) -> bool {
        cells
            .iter()
            .any(|cell| self.occupancy[cell.index()].is_some())
    }
}

impl IntersectionController {
    /// Creates the controller for an intersection of the grid.
    pub(crate) fn new(int: &GridIntersection, grid: &CellGrid, config: &SimulationConfig) -> Self {
        match &int.control {
            ControlType::Signal { phases } => Self::Signal(SignalController::new(
                int,
                phases,
                grid,
                config.signal.phase_ticks,
            )),
            ControlType::Roundabout { circulating } => Self::Roundabout(RoundaboutController::new(
                int,
                circulating,
                grid,
                config.roundabout.circulating_lookback,
            )),
            ControlType::Priority { ranking } => Self::Priority(PriorityController::new(
                int,
                ranking,
                grid,
                config.priority.yield_distance,
            )),
        }
    }

    /// The ID of the controlled intersection.
    pub fn intersection(&self) -> IntersectionId {
        match self {
            Self::Signal(c) => c.intersection(),
            Self::Roundabout(c) => c.intersection(),
            Self::Priority(c) => c.intersection(),
        }
    }

    /// The bindings governed by this controller.
    pub fn bindings(&self) -> &[BindingId] {
        match self {
            Self::Signal(c) => c.bindings(),
            Self::Roundabout(c) => c.bindings(),
            Self::Priority(c) => c.bindings(),
        }
    }

    /// The current signal phase, for signal-controlled intersections.
    pub fn phase(&self) -> Option<usize> {
        match self {
            Self::Signal(c) => Some(c.phase()),
            _ => None,
        }
    }

    /// Decides the gate of a binding for the current step.
    /// Returns `None` if the binding is not governed by this controller.
    pub(crate) fn gate(&self, binding: BindingId, ctx: &GateContext) -> Option<Gate> {
        match self {
            Self::Signal(c) => c.gate(binding),
            Self::Roundabout(c) => c.gate(binding, ctx),
            Self::Priority(c) => c.gate(binding, ctx),
        }
    }

    /// Writes the gates of all governed bindings into the table.
    pub(crate) fn freeze(&self, ctx: &GateContext, table: &mut GateTable) {
        for binding in self.bindings() {
            if let Some(gate) = self.gate(*binding, ctx) {
                table.set(*binding, gate);
            }
        }
    }

    /// Advances the controller's clock by one step.
    /// Returns `true` iff the controller changed phase.
    pub(crate) fn tick(&mut self) -> bool {
        match self {
            Self::Signal(c) => c.tick(),
            Self::Roundabout(_) | Self::Priority(_) => false,
        }
    }
}

impl GateTable {
    /// Forgets all gates and resizes the table for `num_bindings` bindings.
    pub fn reset(&mut self, num_bindings: usize) {
        self.gates.clear();
        self.gates.resize(num_bindings, None);
    }

    pub fn set(&mut self, binding: BindingId, gate: Gate) {
        self.gates[binding.index()] = Some(gate);
    }

    /// Gets the frozen gate of a binding, if one was set.
    pub fn get(&self, binding: BindingId) -> Option<Gate> {
        self.gates.get(binding.index()).copied().flatten()
    }
}

/// Finds the position of a grid binding within a controller's list of bindings.
fn local_index(bindings: &[BindingId], binding: BindingId) -> Option<usize> {
    bindings.iter().position(|b| *b == binding)
}
