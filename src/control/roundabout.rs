use super::{local_index, Gate, GateContext};
use crate::grid::{BindingId, CellGrid, CellId, GridIntersection};
use crate::IntersectionId;

/// A roundabout merge point, giving circulating traffic priority over entering traffic.
///
/// An entry is closed while a vehicle which could reach the merge cell this step
/// approaches it on a circulating binding, or on an entry listed before it.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoundaboutController {
    /// The controlled intersection.
    intersection: IntersectionId,
    /// The controlled bindings, in intersection order.
    bindings: Vec<BindingId>,
    /// Whether each binding carries circulating traffic.
    circulating: Vec<bool>,
    /// The merge cell each binding leads into.
    targets: Vec<CellId>,
    /// For each binding, the cells within the circulating lookback of the intersection.
    approach: Vec<Vec<CellId>>,
}

impl RoundaboutController {
    pub(crate) fn new(
        int: &GridIntersection,
        circulating: &[usize],
        grid: &CellGrid,
        lookback: u32,
    ) -> Self {
        let bindings = int
            .bindings
            .iter()
            .map(|id| &grid.grid_bindings()[id.index()]);

        Self {
            intersection: int.id,
            bindings: int.bindings.clone(),
            circulating: (0..int.bindings.len())
                .map(|idx| circulating.contains(&idx))
                .collect(),
            targets: bindings.clone().map(|b| b.to_cell).collect(),
            approach: bindings
                .map(|b| grid.upstream(b.from_cell, lookback))
                .collect(),
        }
    }

    pub fn intersection(&self) -> IntersectionId {
        self.intersection
    }

    pub fn bindings(&self) -> &[BindingId] {
        &self.bindings
    }

    pub(crate) fn gate(&self, binding: BindingId, ctx: &GateContext) -> Option<Gate> {
        let idx = local_index(&self.bindings, binding)?;
        if self.circulating[idx] {
            return Some(Gate::Open);
        }
        let blocked = (0..self.bindings.len())
            .filter(|other| *other != idx && self.targets[*other] == self.targets[idx])
            .filter(|other| self.circulating[*other] || *other < idx)
            .any(|other| ctx.any_occupied(&self.approach[other]));
        Some(if blocked { Gate::Closed } else { Gate::Open })
    }
}
