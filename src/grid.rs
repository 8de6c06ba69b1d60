use crate::config::positive;
use crate::error::{BuildError, Result, TopologyError};
use crate::math::{sample_polyline, Point2d, Vector2d};
use crate::network::{ControlType, Direction, LaneBinding, LaneRef, RoadNetwork};
use crate::util::Interval;
use crate::{IntersectionId, SegmentId};
use slotmap::SecondaryMap;
use smallvec::SmallVec;
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Cell lengths within this tolerance of a whole number of cells are not split
/// into an extra sliver cell.
const LENGTH_EPSILON: f64 = 1e-9;

/// Index of a [Cell] within a [CellGrid].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct CellId(pub(crate) u32);

/// Index of an intersection binding within a [CellGrid].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct BindingId(pub(crate) u32);

/// Where a vehicle goes after leaving a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Successor {
    /// The next cell of the same lane.
    Next(CellId),
    /// The entry cell of a downstream lane, reached by crossing an intersection binding.
    Gated { binding: BindingId, cell: CellId },
    /// The cell is the last cell before the network boundary.
    Exit,
}

/// The atomic unit of a lane.
#[derive(Clone, Debug)]
pub struct Cell {
    /// The lane the cell belongs to.
    lane: LaneRef,
    /// Index of the lane within the grid.
    lane_idx: u32,
    /// The number of cells before this one in the lane.
    offset: u32,
    /// The extent of the cell along the lane's direction of travel, in m.
    span: Interval<f64>,
    /// The cell that follows this one.
    successor: Successor,
}

/// A lane discretised into a contiguous run of cells.
#[derive(Clone, Debug)]
pub(crate) struct GridLane {
    pub lane: LaneRef,
    pub first: CellId,
    pub len: u32,
    /// Speed limit in m/s.
    pub speed_limit: f64,
    /// Whether vehicles are injected at the lane's first cell.
    pub is_entry: bool,
}

/// A lane binding resolved to cells.
#[derive(Clone, Debug)]
pub(crate) struct GridBinding {
    pub intersection: IntersectionId,
    /// Index of the binding within its intersection.
    pub index: usize,
    pub binding: LaneBinding,
    /// The last cell of the incoming lane.
    pub from_cell: CellId,
    /// The first cell of the outgoing lane.
    pub to_cell: CellId,
}

/// An intersection with its bindings resolved to grid bindings.
#[derive(Clone, Debug)]
pub(crate) struct GridIntersection {
    pub id: IntersectionId,
    pub control: ControlType,
    /// Grid binding IDs, in intersection order.
    pub bindings: Vec<BindingId>,
}

/// The cells of every lane of a road network, with their successor links.
#[derive(Clone, Debug)]
pub struct CellGrid {
    /// The nominal cell length in m.
    cell_length: f64,
    /// All the cells, lane by lane.
    cells: Vec<Cell>,
    /// The cells that lead into each cell.
    predecessors: Vec<SmallVec<[CellId; 2]>>,
    lanes: Vec<GridLane>,
    lane_index: HashMap<LaneRef, u32>,
    bindings: Vec<GridBinding>,
    intersections: Vec<GridIntersection>,
    /// Cells where vehicles are injected, in ascending order.
    entries: Vec<CellId>,
    /// Segment centre lines, for world space positions.
    geometry: SecondaryMap<SegmentId, (Vec<Point2d>, f64)>,
}

impl CellId {
    /// The position of the cell in the grid's cell array.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl BindingId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Cell {
    /// The lane the cell belongs to.
    pub fn lane(&self) -> LaneRef {
        self.lane
    }

    /// The number of cells before this one in its lane.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// The extent of the cell along its lane, in m from the lane's start.
    pub fn span(&self) -> Interval<f64> {
        self.span
    }

    /// The physical length of the cell in m.
    /// Only the last cell of a lane may be shorter than the nominal cell length.
    pub fn length(&self) -> f64 {
        self.span.length()
    }

    pub fn successor(&self) -> Successor {
        self.successor
    }

    pub(crate) fn lane_idx(&self) -> usize {
        self.lane_idx as usize
    }
}

impl CellGrid {
    /// Discretises every lane of the network into cells of `cell_length` metres.
    ///
    /// A lane of length `L` gets `ceil(L / cell_length)` cells. The last cell is
    /// truncated rather than padded, so it may be shorter than `cell_length`.
    pub fn build(network: &RoadNetwork, cell_length: f64) -> Result<Self> {
        positive("cell_length", cell_length)?;
        check_topology(network.validate())?;

        let mut grid = Self {
            cell_length,
            cells: vec![],
            predecessors: vec![],
            lanes: vec![],
            lane_index: HashMap::new(),
            bindings: vec![],
            intersections: vec![],
            entries: vec![],
            geometry: SecondaryMap::new(),
        };

        for segment in network.iter_segments() {
            let length = segment.length();
            let num_cells = f64::max((length / cell_length - LENGTH_EPSILON).ceil(), 1.0) as u32;
            grid.geometry
                .insert(segment.id(), (segment.geometry().to_vec(), length));

            for lane in segment.lane_refs() {
                let lane_idx = grid.lanes.len() as u32;
                let first = CellId(grid.cells.len() as u32);
                let is_entry = network.is_boundary(lane.segment, lane.direction.entry());

                grid.cells.extend((0..num_cells).map(|offset| {
                    let min = offset as f64 * cell_length;
                    let max = f64::min(min + cell_length, length);
                    Cell {
                        lane,
                        lane_idx,
                        offset,
                        span: Interval::new(min, max),
                        successor: if offset + 1 < num_cells {
                            Successor::Next(CellId(first.0 + offset + 1))
                        } else {
                            Successor::Exit
                        },
                    }
                }));

                grid.lane_index.insert(lane, lane_idx);
                grid.lanes.push(GridLane {
                    lane,
                    first,
                    len: num_cells,
                    speed_limit: segment.speed_limit(),
                    is_entry,
                });
                if is_entry {
                    grid.entries.push(first);
                }
            }
        }

        for int in network.iter_intersections() {
            let mut ids = Vec::with_capacity(int.bindings().len());
            for (index, binding) in int.bindings().iter().enumerate() {
                let id = BindingId(grid.bindings.len() as u32);
                let from_cell = grid.lane_last_cell(binding.from);
                let to_cell = grid.lane_first_cell(binding.to);
                grid.cells[from_cell.index()].successor = Successor::Gated {
                    binding: id,
                    cell: to_cell,
                };
                grid.bindings.push(GridBinding {
                    intersection: int.id(),
                    index,
                    binding: *binding,
                    from_cell,
                    to_cell,
                });
                ids.push(id);
            }
            grid.intersections.push(GridIntersection {
                id: int.id(),
                control: int.control().clone(),
                bindings: ids,
            });
        }

        grid.predecessors = vec![SmallVec::new(); grid.cells.len()];
        for (idx, cell) in grid.cells.iter().enumerate() {
            let target = match cell.successor {
                Successor::Next(cell) => cell,
                Successor::Gated { cell, .. } => cell,
                Successor::Exit => continue,
            };
            grid.predecessors[target.index()].push(CellId(idx as u32));
        }

        for entry in network.stranded_entries() {
            log::warn!("no exit is reachable from entry lane {:?}", entry);
        }
        log::debug!(
            "built cell grid: {} cells, {} lanes, {} bindings, {} entries",
            grid.cells.len(),
            grid.lanes.len(),
            grid.bindings.len(),
            grid.entries.len()
        );

        Ok(grid)
    }

    /// The nominal cell length in m.
    pub fn cell_length(&self) -> f64 {
        self.cell_length
    }

    /// The number of cells in the grid.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Gets a reference to the cell with the given ID.
    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id.index()]
    }

    /// Returns an iterator over all the cells and their IDs, in ascending ID order.
    pub fn iter_cells(&self) -> impl Iterator<Item = (CellId, &Cell)> {
        self.cells
            .iter()
            .enumerate()
            .map(|(idx, cell)| (CellId(idx as u32), cell))
    }

    pub fn successor(&self, id: CellId) -> Successor {
        self.cells[id.index()].successor
    }

    /// The cells whose successor is the given cell.
    pub fn predecessors(&self, id: CellId) -> &[CellId] {
        &self.predecessors[id.index()]
    }

    /// Looks up a cell by lane and offset.
    pub fn cell_at(&self, lane: LaneRef, offset: u32) -> Option<CellId> {
        let lane = &self.lanes[*self.lane_index.get(&lane)? as usize];
        (offset < lane.len).then(|| CellId(lane.first.0 + offset))
    }

    /// The number of cells in a lane.
    pub fn lane_len(&self, lane: LaneRef) -> Option<u32> {
        let idx = *self.lane_index.get(&lane)?;
        Some(self.lanes[idx as usize].len)
    }

    /// The cells where boundary injection takes place, in ascending order.
    pub fn entry_cells(&self) -> &[CellId] {
        &self.entries
    }

    /// Whether vehicles standing in this cell leave the network.
    pub fn is_exit(&self, id: CellId) -> bool {
        self.cells[id.index()].successor == Successor::Exit
    }

    /// The number of intersection bindings.
    pub fn num_bindings(&self) -> usize {
        self.bindings.len()
    }

    /// The lane binding with the given ID, and the intersection it belongs to.
    pub fn binding(&self, id: BindingId) -> (IntersectionId, LaneBinding) {
        let binding = &self.bindings[id.index()];
        (binding.intersection, binding.binding)
    }

    /// The world space position and heading of the middle of a cell.
    pub fn position(&self, id: CellId) -> (Point2d, Vector2d) {
        let cell = &self.cells[id.index()];
        let Some((points, length)) = self.geometry.get(cell.lane.segment) else {
            return (Point2d::new(0.0, 0.0), Vector2d::new(0.0, 0.0));
        };
        let mid = cell.span.midpoint();
        let (dist, sign) = match cell.lane.direction {
            Direction::Forward => (mid, 1.0),
            Direction::Backward => (length - mid, -1.0),
        };
        sample_polyline(points, dist)
            .map(|(pos, tan)| (pos, tan * sign))
            .unwrap_or((points[0], Vector2d::new(0.0, 0.0)))
    }

    /// Collects up to `count` cells ending at `cell`, walking backwards through
    /// predecessors in breadth-first order. The given cell is included.
    pub fn upstream(&self, cell: CellId, count: u32) -> Vec<CellId> {
        let mut seen = BTreeSet::new();
        let mut out = vec![];
        let mut queue = VecDeque::from([(cell, 1)]);
        while let Some((id, depth)) = queue.pop_front() {
            if depth > count || !seen.insert(id) {
                continue;
            }
            out.push(id);
            queue.extend(self.predecessors(id).iter().map(|p| (*p, depth + 1)));
        }
        out
    }

    pub(crate) fn lanes(&self) -> &[GridLane] {
        &self.lanes
    }

    pub(crate) fn grid_bindings(&self) -> &[GridBinding] {
        &self.bindings
    }

    pub(crate) fn grid_intersections(&self) -> &[GridIntersection] {
        &self.intersections
    }

    fn lane_first_cell(&self, lane: LaneRef) -> CellId {
        self.lanes[self.lane_index[&lane] as usize].first
    }

    fn lane_last_cell(&self, lane: LaneRef) -> CellId {
        let lane = &self.lanes[self.lane_index[&lane] as usize];
        CellId(lane.first.0 + lane.len - 1)
    }
}

/// Turns validation errors into the most specific build error.
fn check_topology(errors: Vec<TopologyError>) -> Result<()> {
    if let Some((segment, endpoint)) = errors.iter().find_map(|err| match err {
        TopologyError::UnboundEndpoint { segment, endpoint } => Some((*segment, *endpoint)),
        _ => None,
    }) {
        return Err(BuildError::UnboundEndpoint { segment, endpoint });
    }
    if let Some(err) = errors.iter().find_map(|err| match err {
        TopologyError::LaneMismatch {
            intersection,
            binding,
            detail,
        } => Some(BuildError::LaneMismatchAtBinding {
            intersection: *intersection,
            binding: *binding,
            detail: detail.clone(),
        }),
        _ => None,
    }) {
        return Err(err);
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(BuildError::InvalidTopology(errors))
    }
}
