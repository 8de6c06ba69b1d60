use crate::config::{ArrivalPolicy, SimulationConfig};
use crate::control::IntersectionController;
use crate::grid::{CellGrid, CellId};
use crate::{VehicleId, VehicleSet};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp};

/// A simulated vehicle.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vehicle {
    /// The vehicle's ID.
    pub(crate) id: VehicleId,
    /// The vehicle's own maximum speed in cells per step.
    pub(crate) max_speed: u8,
    /// The cell the vehicle occupies.
    pub(crate) cell: CellId,
    /// The step during which the vehicle entered the network.
    pub(crate) entered: u64,
    /// The number of cells travelled so far.
    pub(crate) travelled: u64,
}

/// Per-cell occupancy and speed. The simulation keeps two of these:
/// the current state, and the next state written during a step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub(crate) struct CellBuffer {
    pub occupancy: Vec<Option<VehicleId>>,
    pub speed: Vec<u8>,
}

/// All the mutable state of a simulation run.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationState {
    /// The number of completed steps.
    pub(crate) step: u64,
    /// Occupancy and speed of every cell.
    pub(crate) cells: CellBuffer,
    /// The vehicles in the network.
    pub(crate) vehicles: VehicleSet,
    /// One controller per intersection, in grid order.
    pub(crate) controllers: Vec<IntersectionController>,
    /// The pseudo-random source used for slowdowns and arrivals.
    pub(crate) rng: ChaCha8Rng,
    /// For Poisson arrivals, the time (in steps) of the next arrival at each entry cell.
    pub(crate) arrivals: Vec<Option<f64>>,
}

impl Vehicle {
    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The vehicle's own maximum speed in cells per step.
    pub fn max_speed(&self) -> u8 {
        self.max_speed
    }

    /// The cell the vehicle occupies.
    pub fn cell(&self) -> CellId {
        self.cell
    }

    /// The step during which the vehicle entered the network.
    pub fn entered(&self) -> u64 {
        self.entered
    }

    /// The number of cells travelled so far.
    pub fn travelled(&self) -> u64 {
        self.travelled
    }
}

impl CellBuffer {
    /// Creates an empty buffer for `len` cells.
    pub fn new(len: usize) -> Self {
        Self {
            occupancy: vec![None; len],
            speed: vec![0; len],
        }
    }

    /// Empties every cell.
    pub fn clear(&mut self) {
        self.occupancy.fill(None);
        self.speed.fill(0);
    }

    pub fn occupant(&self, cell: CellId) -> Option<VehicleId> {
        self.occupancy[cell.index()]
    }

    pub fn place(&mut self, cell: CellId, vehicle: VehicleId, speed: u8) {
        self.occupancy[cell.index()] = Some(vehicle);
        self.speed[cell.index()] = speed;
    }

    pub fn vacate(&mut self, cell: CellId) {
        self.occupancy[cell.index()] = None;
        self.speed[cell.index()] = 0;
    }
}

impl SimulationState {
    /// Creates the initial state of a simulation: an empty network,
    /// with every controller in its first phase.
    pub(crate) fn new(grid: &CellGrid, config: &SimulationConfig) -> Self {
        let controllers = grid
            .grid_intersections()
            .iter()
            .map(|int| IntersectionController::new(int, grid, config))
            .collect();

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let arrivals = match config.injection.arrival {
            ArrivalPolicy::Poisson { rate } => match Exp::new(rate) {
                Ok(exp) => grid
                    .entry_cells()
                    .iter()
                    .map(|_| Some(exp.sample(&mut rng)))
                    .collect(),
                Err(_) => vec![None; grid.entry_cells().len()],
            },
            _ => vec![None; grid.entry_cells().len()],
        };

        Self {
            step: 0,
            cells: CellBuffer::new(grid.len()),
            vehicles: Default::default(),
            controllers,
            rng,
            arrivals,
        }
    }

    /// The number of completed steps.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Returns an iterator over all the vehicles.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Gets a reference to the vehicle with the given ID.
    pub fn vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(id)
    }

    /// The number of vehicles in the network.
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// The vehicle occupying a cell, if any.
    pub fn occupant(&self, cell: CellId) -> Option<VehicleId> {
        self.cells.occupant(cell)
    }

    /// The speed of the vehicle in a cell, in cells per step. Zero for empty cells.
    pub fn speed(&self, cell: CellId) -> u8 {
        self.cells.speed[cell.index()]
    }

    /// The occupancy of every cell, indexed by [CellId::index].
    pub fn occupancy(&self) -> &[Option<VehicleId>] {
        &self.cells.occupancy
    }

    /// The intersection controllers.
    pub fn controllers(&self) -> &[IntersectionController] {
        &self.controllers
    }

    /// Checks that the state fits the given grid.
    pub(crate) fn fits(&self, grid: &CellGrid) -> Result<(), String> {
        if self.cells.occupancy.len() != grid.len() || self.cells.speed.len() != grid.len() {
            return Err(format!(
                "state has {} cells, grid has {}",
                self.cells.occupancy.len(),
                grid.len()
            ));
        }
        if self.controllers.len() != grid.grid_intersections().len() {
            return Err(format!(
                "state has {} controllers, grid has {} intersections",
                self.controllers.len(),
                grid.grid_intersections().len()
            ));
        }
        if self.arrivals.len() != grid.entry_cells().len() {
            return Err(format!(
                "state has {} arrival clocks, grid has {} entries",
                self.arrivals.len(),
                grid.entry_cells().len()
            ));
        }
        for vehicle in self.vehicles.values() {
            if self.cells.occupancy.get(vehicle.cell.index()) != Some(&Some(vehicle.id)) {
                return Err(format!(
                    "vehicle {:?} is not in its cell {:?}",
                    vehicle.id, vehicle.cell
                ));
            }
        }
        Ok(())
    }
}
