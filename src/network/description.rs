use super::{
    ControlType, Direction, Endpoint, LaneBinding, LaneRef, RoadNetwork, SegmentAttributes,
    SegmentKind,
};
use crate::error::{BuildError, Result};
use crate::math::Point2d;
use crate::SegmentId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A road network in which segments are referenced by name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkDescription {
    pub segments: Vec<SegmentRecord>,
    pub intersections: Vec<IntersectionRecord>,
    /// Segment endpoints where vehicles enter or leave the network.
    pub boundaries: Vec<BoundaryRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SegmentRecord {
    /// A name unique within the description.
    pub name: String,
    /// The centre line, as `[x, y]` pairs in m.
    pub geometry: Vec<[f64; 2]>,
    /// The number of lanes in each direction of travel.
    pub lanes: u8,
    /// Speed limit in m/s.
    pub speed_limit: f64,
    pub one_way: bool,
    pub kind: SegmentKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntersectionRecord {
    pub position: [f64; 2],
    pub control: ControlType,
    pub bindings: Vec<BindingRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingRecord {
    pub from: LaneRecord,
    pub to: LaneRecord,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaneRecord {
    /// The name of the segment.
    pub segment: String,
    pub direction: Direction,
    pub lane: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoundaryRecord {
    /// The name of the segment.
    pub segment: String,
    pub endpoint: Endpoint,
}

impl NetworkDescription {
    /// Parses a description from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the description as a JSON document.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Builds the road network, returning it along with the ID assigned to each named segment.
    ///
    /// Fails with [BuildError::UnknownReference] if a record names a segment which
    /// does not exist, or if two segments share a name. The network is not validated.
    pub fn into_network(self) -> Result<(RoadNetwork, HashMap<String, SegmentId>)> {
        let mut network = RoadNetwork::new();
        let mut names = HashMap::new();

        for record in &self.segments {
            let geometry = record
                .geometry
                .iter()
                .map(|[x, y]| Point2d::new(*x, *y))
                .collect::<Vec<_>>();
            let id = network.add_segment(&SegmentAttributes {
                geometry: &geometry,
                lanes: record.lanes,
                speed_limit: record.speed_limit,
                one_way: record.one_way,
                kind: record.kind,
            });
            if names.insert(record.name.clone(), id).is_some() {
                return Err(BuildError::UnknownReference(format!(
                    "{} (defined more than once)",
                    record.name
                )));
            }
        }

        let segment = |name: &str| {
            names
                .get(name)
                .copied()
                .ok_or_else(|| BuildError::UnknownReference(name.to_string()))
        };
        let lane = |record: &LaneRecord| -> Result<LaneRef> {
            Ok(LaneRef {
                segment: segment(record.segment.as_str())?,
                direction: record.direction,
                lane: record.lane,
            })
        };

        for record in &self.intersections {
            let bindings = record
                .bindings
                .iter()
                .map(|b| Ok(LaneBinding::new(lane(&b.from)?, lane(&b.to)?)))
                .collect::<Result<Vec<_>>>()?;
            let [x, y] = record.position;
            network.add_intersection(Point2d::new(x, y), record.control.clone(), bindings);
        }

        for record in &self.boundaries {
            network.mark_boundary(segment(record.segment.as_str())?, record.endpoint);
        }

        log::debug!(
            "loaded network with {} segment(s), {} intersection(s) and {} boundary endpoint(s)",
            self.segments.len(),
            self.intersections.len(),
            self.boundaries.len()
        );
        Ok((network, names))
    }
}
