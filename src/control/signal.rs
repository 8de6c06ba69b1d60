use super::{local_index, Gate};
use crate::grid::{BindingId, CellGrid, GridIntersection};
use crate::IntersectionId;
use itertools::Itertools;
use smallvec::SmallVec;

/// A fixed-time signal cycling through its phases.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SignalController {
    /// The controlled intersection.
    intersection: IntersectionId,
    /// The controlled bindings.
    bindings: Vec<BindingId>,
    /// For each phase, whether each binding (in `bindings` order) is green.
    phases: Vec<SmallVec<[bool; 8]>>,
    /// The active phase.
    phase: usize,
    /// The number of steps the active phase has been shown for.
    since: u32,
    /// The number of steps each phase is shown for.
    phase_ticks: u32,
}

impl SignalController {
    pub(crate) fn new(
        int: &GridIntersection,
        phases: &[Vec<usize>],
        grid: &CellGrid,
        phase_ticks: u32,
    ) -> Self {
        let phases = phases
            .iter()
            .map(|phase| {
                (0..int.bindings.len())
                    .map(|idx| phase.contains(&idx))
                    .collect::<SmallVec<_>>()
            })
            .collect::<Vec<_>>();

        if phases.is_empty() {
            log::warn!(
                "signal at intersection {:?} has no phases; all approaches stay red",
                int.id
            );
        }
        for (num, phase) in phases.iter().enumerate() {
            let targets = int
                .bindings
                .iter()
                .zip(phase)
                .filter(|(_, green)| **green)
                .map(|(id, _)| grid.grid_bindings()[id.index()].to_cell);
            if targets.sorted().tuple_windows().any(|(a, b)| a == b) {
                log::warn!(
                    "phase {} of signal at intersection {:?} opens merging approaches together",
                    num,
                    int.id
                );
            }
        }

        Self {
            intersection: int.id,
            bindings: int.bindings.clone(),
            phases,
            phase: 0,
            since: 0,
            phase_ticks,
        }
    }

    pub fn intersection(&self) -> IntersectionId {
        self.intersection
    }

    pub fn bindings(&self) -> &[BindingId] {
        &self.bindings
    }

    /// The active phase.
    pub fn phase(&self) -> usize {
        self.phase
    }

    /// The gate of a binding in the active phase.
    pub fn gate(&self, binding: BindingId) -> Option<Gate> {
        let idx = local_index(&self.bindings, binding)?;
        let green = self
            .phases
            .get(self.phase)
            .map(|phase| phase[idx])
            .unwrap_or(false);
        Some(if green { Gate::Open } else { Gate::Closed })
    }

    /// Advances the signal timing by one step.
    pub fn tick(&mut self) -> bool {
        if self.phases.len() < 2 {
            return false;
        }
        self.since += 1;
        if self.since >= self.phase_ticks {
            self.since = 0;
            self.phase = (self.phase + 1) % self.phases.len();
            true
        } else {
            false
        }
    }
}
