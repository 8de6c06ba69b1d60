use self::update::{apply_moves, gap_ahead, plan_moves, PlanInput};
use crate::config::{InvariantPolicy, SimulationConfig};
use crate::control::{GateContext, GateTable};
use crate::diagnostics::Diagnostics;
use crate::error::{BuildError, InvariantViolation, Result};
use crate::grid::{BindingId, CellGrid, CellId};
use crate::network::{LaneRef, RoadNetwork};
use crate::snapshot::{GateView, Snapshot, StepSummary, VehicleView};
use crate::state::{CellBuffer, SimulationState, Vehicle};
use crate::VehicleId;
use std::sync::atomic::{AtomicBool, Ordering};

mod injection;
mod update;

/// A cellular automaton traffic simulation.
#[derive(Clone, Debug)]
pub struct Simulation {
    /// The discretised road network.
    grid: CellGrid,
    /// The simulation parameters.
    config: SimulationConfig,
    /// The speed limit of each grid lane in cells per step, capped by the global maximum.
    lane_limits: Vec<u8>,
    /// The current state.
    state: SimulationState,
    /// The next-state buffer written during a step.
    next: CellBuffer,
    /// The gates frozen for the current step.
    gates: GateTable,
    /// Runtime invariant violations.
    diagnostics: Diagnostics,
}

/// The result of a batch of steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchOutcome {
    /// The sum of the summaries of every completed step.
    pub totals: StepSummary,
    /// The number of steps completed.
    pub completed: u64,
    /// Why the batch ended.
    pub reason: StopReason,
}

/// Why a batch of steps ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// All the requested steps were run.
    Completed,
    /// The stop flag was raised.
    Cancelled,
    /// A step recorded an invariant violation under [InvariantPolicy::Halt].
    InvariantViolation,
}

impl Simulation {
    /// Creates a simulation of an empty road network.
    pub fn new(network: &RoadNetwork, config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let grid = CellGrid::build(network, config.cell_length)?;
        Self::from_grid(grid, config)
    }

    /// Creates a simulation over an already built cell grid.
    pub fn from_grid(grid: CellGrid, config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let state = SimulationState::new(&grid, &config);
        Self::from_state(grid, config, state)
    }

    /// Resumes a simulation from a saved state.
    ///
    /// The grid and configuration must be the ones the state was produced with.
    pub fn from_state(
        grid: CellGrid,
        config: SimulationConfig,
        state: SimulationState,
    ) -> Result<Self> {
        config.validate()?;
        if grid.cell_length() != config.cell_length {
            return Err(BuildError::IncompatibleState(format!(
                "grid cell length {} differs from configured {}",
                grid.cell_length(),
                config.cell_length
            )));
        }
        state.fits(&grid).map_err(BuildError::IncompatibleState)?;

        let lane_limits = grid
            .lanes()
            .iter()
            .map(|lane| u8::min(config.cells_per_step(lane.speed_limit), config.max_speed))
            .collect();
        let next = CellBuffer::new(grid.len());

        Ok(Self {
            grid,
            config,
            lane_limits,
            state,
            next,
            gates: GateTable::default(),
            diagnostics: Diagnostics::default(),
        })
    }

    /// Advances the simulation by one step.
    pub fn step(&mut self) -> StepSummary {
        let step = self.state.step + 1;
        let violations = self.diagnostics.len();

        // Gates only see the occupancy at the start of the step
        Self::freeze_gates(&self.grid, &self.state, &mut self.gates);

        let (moves, missing) = plan_moves(
            &PlanInput {
                grid: &self.grid,
                cells: &self.state.cells,
                vehicles: &self.state.vehicles,
                gates: &self.gates,
                lane_limits: &self.lane_limits,
                p_slow: self.config.p_slow,
            },
            &mut self.state.rng,
        );
        for binding in missing {
            self.diagnostics
                .record(InvariantViolation::GateStateMissingForStep { step, binding });
        }

        self.next.clear();
        let moved = apply_moves(
            &self.grid,
            &moves,
            &mut self.next,
            &mut self.state.vehicles,
            &mut self.diagnostics,
            step,
        );
        let removed = self.remove_exited();
        let (injected, injections_blocked) = self.inject_arrivals(step);

        std::mem::swap(&mut self.state.cells, &mut self.next);

        let phase_changes = self
            .state
            .controllers
            .iter_mut()
            .map(|controller| controller.tick())
            .filter(|changed| *changed)
            .count();
        self.state.step = step;

        let summary = StepSummary {
            step,
            moved,
            injected,
            injections_blocked,
            removed,
            phase_changes,
            violations: self.diagnostics.len() - violations,
        };
        log::trace!("{:?}", summary);
        summary
    }

    /// Advances the simulation by one step, failing with the first invariant
    /// violation the step recorded. The step is completed either way.
    pub fn step_checked(&mut self) -> std::result::Result<StepSummary, InvariantViolation> {
        let from = self.diagnostics.len();
        let summary = self.step();
        match self.diagnostics.since(from).first() {
            Some(violation) => Err(violation.clone()),
            None => Ok(summary),
        }
    }

    /// Runs up to `steps` steps, checking `stop` before each one.
    pub fn run(&mut self, steps: u64, stop: &AtomicBool) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            totals: StepSummary::default(),
            completed: 0,
            reason: StopReason::Completed,
        };
        for _ in 0..steps {
            if stop.load(Ordering::Relaxed) {
                outcome.reason = StopReason::Cancelled;
                break;
            }
            let summary = self.step();
            outcome.totals.accumulate(&summary);
            outcome.completed += 1;
            if summary.violations > 0 && self.config.invariant_policy == InvariantPolicy::Halt {
                outcome.reason = StopReason::InvariantViolation;
                break;
            }
        }
        log::debug!(
            "ran {} of {} steps ({:?}), now at step {}",
            outcome.completed,
            steps,
            outcome.reason,
            self.state.step
        );
        outcome
    }

    /// Adds a vehicle at the start of a lane, at rest.
    /// Returns `None` if the lane does not exist or its first cell is occupied.
    pub fn inject(&mut self, lane: LaneRef) -> Option<VehicleId> {
        let cell = self.grid.cell_at(lane, 0)?;
        self.place_vehicle(cell, 0)
    }

    /// Adds a vehicle to a cell with the given speed, which is capped by the
    /// vehicle's maximum speed and the lane's speed limit. Returns `None` if the cell is occupied or does not exist.
    pub fn place_vehicle(&mut self, cell: CellId, speed: u8) -> Option<VehicleId> {
        if cell.index() >= self.grid.len() || self.state.cells.occupant(cell).is_some() {
            return None;
        }
        let max_speed = self.vehicle_max_speed();
        let lane_limit = self.lane_limits[self.grid.cell(cell).lane_idx()];
        let entered = self.state.step;
        let id = self.state.vehicles.insert_with_key(|id| Vehicle {
            id,
            max_speed,
            cell,
            entered,
            travelled: 0,
        });
        self.state.cells.place(cell, id, speed.min(max_speed).min(lane_limit));
        Some(id)
    }

    /// Removes a vehicle from the simulation. Returns `false` if it did not exist.
    pub fn remove_vehicle(&mut self, id: VehicleId) -> bool {
        match self.state.vehicles.remove(id) {
            Some(vehicle) => {
                self.state.cells.vacate(vehicle.cell);
                true
            }
            None => false,
        }
    }

    /// Takes a point-in-time snapshot of every vehicle and gate.
    pub fn snapshot(&self) -> Snapshot {
        let mut ids = self.state.vehicles.keys().collect::<Vec<_>>();
        ids.sort();
        let gates = self.current_gates();

        Snapshot {
            step: self.state.step,
            vehicles: ids
                .into_iter()
                .filter_map(|id| self.vehicle_view(id))
                .collect(),
            gates: self
                .grid
                .grid_bindings()
                .iter()
                .enumerate()
                .map(|(idx, binding)| {
                    let id = BindingId(idx as u32);
                    GateView {
                        intersection: binding.intersection,
                        binding: id,
                        index: binding.index,
                        from: binding.binding.from,
                        to: binding.binding.to,
                        gate: gates.get(id),
                        phase: self
                            .state
                            .controllers
                            .iter()
                            .find(|c| c.intersection() == binding.intersection)
                            .and_then(|c| c.phase()),
                    }
                })
                .collect(),
        }
    }

    /// Gets the location and speed of a vehicle.
    pub fn vehicle_view(&self, id: VehicleId) -> Option<VehicleView> {
        let vehicle = self.state.vehicles.get(id)?;
        let cell = self.grid.cell(vehicle.cell);
        let (position, heading) = self.grid.position(vehicle.cell);
        Some(VehicleView {
            id,
            cell: vehicle.cell,
            lane: cell.lane(),
            offset: cell.offset(),
            speed: self.state.speed(vehicle.cell),
            max_speed: vehicle.max_speed,
            position,
            heading,
        })
    }

    /// Gets a reference to the vehicle with the given ID.
    pub fn vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.state.vehicle(id)
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.state.iter_vehicles()
    }

    /// The vehicle occupying a cell, if any.
    pub fn occupant(&self, cell: CellId) -> Option<VehicleId> {
        self.state.cells.occupancy.get(cell.index()).copied().flatten()
    }

    /// The speed limit of a lane in cells per step, never above the global maximum.
    pub fn lane_limit(&self, lane: LaneRef) -> Option<u8> {
        let first = self.grid.cell_at(lane, 0)?;
        Some(self.lane_limits[self.grid.cell(first).lane_idx()])
    }

    /// The number of empty cells a vehicle could advance into on the next step,
    /// before random slowdown, given the gates the next step will freeze.
    pub fn gap_ahead(&self, id: VehicleId) -> Option<u8> {
        let vehicle = self.state.vehicles.get(id)?;
        let lane_limit = self.lane_limits[self.grid.cell(vehicle.cell).lane_idx()];
        let gap = gap_ahead(
            &self.grid,
            &self.state.cells.occupancy,
            &self.current_gates(),
            &self.lane_limits,
            vehicle.cell,
            u8::min(vehicle.max_speed, lane_limit),
        );
        Some(gap.cells)
    }

    /// The number of vehicles in the simulation.
    pub fn vehicle_count(&self) -> usize {
        self.state.vehicle_count()
    }

    /// The number of completed steps.
    pub fn step_index(&self) -> u64 {
        self.state.step
    }

    /// The invariant violations recorded so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Removes and returns the invariant violations recorded so far.
    pub fn take_diagnostics(&mut self) -> Vec<InvariantViolation> {
        self.diagnostics.take()
    }

    /// Gets the cell grid.
    pub fn grid(&self) -> &CellGrid {
        &self.grid
    }

    /// Gets the simulation parameters.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Gets the current state, which can be saved and passed to [Simulation::from_state].
    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Consumes the simulation, returning its state.
    pub fn into_state(self) -> SimulationState {
        self.state
    }

    fn vehicle_max_speed(&self) -> u8 {
        u8::min(self.config.injection.vehicle_max_speed, self.config.max_speed)
    }

    /// Asks every controller for the gates of its bindings, given the current occupancy.
    fn freeze_gates(grid: &CellGrid, state: &SimulationState, table: &mut GateTable) {
        table.reset(grid.num_bindings());
        let ctx = GateContext {
            occupancy: &state.cells.occupancy,
        };
        for controller in &state.controllers {
            controller.freeze(&ctx, table);
        }
    }

    /// The gates the next step would freeze.
    fn current_gates(&self) -> GateTable {
        let mut table = GateTable::default();
        Self::freeze_gates(&self.grid, &self.state, &mut table);
        table
    }

    /// Removes the vehicles which reached an exit cell during this step.
    fn remove_exited(&mut self) -> usize {
        let exited = self
            .state
            .vehicles
            .values()
            .filter(|vehicle| self.grid.is_exit(vehicle.cell))
            .map(|vehicle| vehicle.id)
            .collect::<Vec<_>>();
        for id in &exited {
            if let Some(vehicle) = self.state.vehicles.remove(*id) {
                self.next.vacate(vehicle.cell);
            }
        }
        exited.len()
    }

    /// Injects arriving vehicles at the entry cells of the next-state buffer.
    /// Returns the number of vehicles injected, and the number of arrivals dropped.
    fn inject_arrivals(&mut self, step: u64) -> (usize, usize) {
        let policy = self.config.injection.arrival;
        let max_speed = self.vehicle_max_speed();
        let mut injected = 0;
        let mut blocked = 0;

        for (idx, &cell) in self.grid.entry_cells().iter().enumerate() {
            let count = injection::arrivals(
                policy,
                step,
                &mut self.state.rng,
                &mut self.state.arrivals[idx],
            ) as usize;
            if count == 0 {
                continue;
            }
            if self.next.occupant(cell).is_some() {
                blocked += count;
                continue;
            }
            let id = self.state.vehicles.insert_with_key(|id| Vehicle {
                id,
                max_speed,
                cell,
                entered: step,
                travelled: 0,
            });
            self.next.place(cell, id, 0);
            injected += 1;
            blocked += count - 1;
        }

        (injected, blocked)
    }
}
