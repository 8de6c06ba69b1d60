//! Reachability between the network's entry and exit lanes.

use super::{LaneRef, RoadNetwork};
use pathfinding::directed::bfs::bfs;
use std::collections::HashMap;

impl RoadNetwork {
    /// Lanes where vehicles are injected into the network.
    pub fn entry_lanes(&self) -> Vec<LaneRef> {
        self.iter_segments()
            .flat_map(|segment| segment.lane_refs())
            .filter(|lane| self.is_boundary(lane.segment, lane.direction.entry()))
            .collect()
    }

    /// Lanes where vehicles leave the network.
    pub fn exit_lanes(&self) -> Vec<LaneRef> {
        self.iter_segments()
            .flat_map(|segment| segment.lane_refs())
            .filter(|lane| self.is_boundary(lane.segment, lane.direction.exit()))
            .collect()
    }

    /// Finds the entry lanes from which no exit lane can be reached.
    ///
    /// Vehicles injected on such lanes stay in the network forever,
    /// which is legitimate for closed loops but usually an input mistake.
    pub fn stranded_entries(&self) -> Vec<LaneRef> {
        let successors = self
            .iter_intersections()
            .flat_map(|int| int.bindings().iter())
            .map(|binding| (binding.from, binding.to))
            .collect::<HashMap<_, _>>();

        self.entry_lanes()
            .into_iter()
            .filter(|entry| {
                let path = bfs(
                    entry,
                    |lane| successors.get(lane).copied(),
                    |lane| self.is_boundary(lane.segment, lane.direction.exit()),
                );
                path.is_none()
            })
            .collect()
    }
}
