use super::{local_index, Gate, GateContext};
use crate::grid::{BindingId, CellGrid, CellId, GridIntersection};
use crate::IntersectionId;

/// A priority/yield intersection. An approach yields while any approach
/// ranked above it has a vehicle within the yield distance.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PriorityController {
    /// The controlled intersection.
    intersection: IntersectionId,
    /// The controlled bindings, in intersection order.
    bindings: Vec<BindingId>,
    /// The rank of each binding (in `bindings` order), 0 being the highest priority.
    rank: Vec<usize>,
    /// For each binding (in `bindings` order), the approach cells within the yield distance.
    approach: Vec<Vec<CellId>>,
}

impl PriorityController {
    pub(crate) fn new(
        int: &GridIntersection,
        ranking: &[usize],
        grid: &CellGrid,
        yield_distance: u32,
    ) -> Self {
        let order = ranking
            .iter()
            .copied()
            .chain((0..int.bindings.len()).filter(|idx| !ranking.contains(idx)));
        let mut rank = vec![0; int.bindings.len()];
        for (r, idx) in order.enumerate() {
            rank[idx] = r;
        }

        let approach = int
            .bindings
            .iter()
            .map(|id| grid.upstream(grid.grid_bindings()[id.index()].from_cell, yield_distance))
            .collect();

        Self {
            intersection: int.id,
            bindings: int.bindings.clone(),
            rank,
            approach,
        }
    }

    pub fn intersection(&self) -> IntersectionId {
        self.intersection
    }

    pub fn bindings(&self) -> &[BindingId] {
        &self.bindings
    }

    /// Opens a binding unless a higher-ranked approach has a vehicle within the yield distance.
    pub(crate) fn gate(&self, binding: BindingId, ctx: &GateContext) -> Option<Gate> {
        let idx = local_index(&self.bindings, binding)?;
        let must_yield = self
            .rank
            .iter()
            .zip(&self.approach)
            .filter(|(rank, _)| **rank < self.rank[idx])
            .any(|(_, cells)| ctx.any_occupied(cells));
        Some(if must_yield { Gate::Closed } else { Gate::Open })
    }
}
