use crate::error::{BuildError, Result, TopologyError};
use crate::math::{polyline_length, Point2d};
use crate::{IntersectionId, IntersectionSet, SegmentId, SegmentSet};
use std::collections::{BTreeMap, BTreeSet, HashMap};

mod connectivity;
#[cfg(feature = "serde")]
pub(crate) mod description;

/// A road segment: a polyline carrying one or more lanes of traffic.
#[derive(Clone, Debug)]
pub struct RoadSegment {
    /// The segment ID.
    id: SegmentId,
    /// The centre line of the segment.
    geometry: Vec<Point2d>,
    /// The length of the centre line in m.
    length: f64,
    /// The number of lanes in each direction of travel.
    lanes: u8,
    /// Speed limit in m/s.
    speed_limit: f64,
    /// Whether traffic only travels from the first to the last point.
    one_way: bool,
    /// The kind of road this segment belongs to.
    kind: SegmentKind,
}

/// The attributes of a road segment.
pub struct SegmentAttributes<'a> {
    /// The centre line, from the start to the end of the segment.
    pub geometry: &'a [Point2d],
    /// The number of lanes in each direction of travel.
    pub lanes: u8,
    /// The speed limit in m/s.
    pub speed_limit: f64,
    /// Whether traffic only travels in the forward direction.
    pub one_way: bool,
    /// The kind of road.
    pub kind: SegmentKind,
}

/// The kind of road a segment belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum SegmentKind {
    Normal,
    Slip,
    RoundaboutArc,
}

/// The direction of travel along a segment's geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum Direction {
    /// From the first point of the geometry to the last.
    Forward,
    /// From the last point of the geometry to the first.
    Backward,
}

/// One of the two ends of a segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum Endpoint {
    Start,
    End,
}

/// Identifies a single lane of a segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LaneRef {
    pub segment: SegmentId,
    pub direction: Direction,
    /// The lane index within its direction of travel, counted from 0.
    pub lane: u8,
}

/// Connects the end of one lane to the start of another through an intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LaneBinding {
    /// The lane entering the intersection.
    pub from: LaneRef,
    /// The lane leaving the intersection.
    pub to: LaneRef,
}

/// How an intersection decides which of its bindings may be crossed.
/// Binding indices refer to the intersection's list of bindings.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "type", rename_all = "snake_case")
)]
pub enum ControlType {
    /// A cyclic set of signal phases, each opening a subset of the bindings.
    Signal { phases: Vec<Vec<usize>> },
    /// Circulating bindings always have priority over the other (entry) bindings.
    Roundabout { circulating: Vec<usize> },
    /// A static ranking, from highest priority to lowest.
    /// Bindings absent from the ranking come last, in index order.
    Priority { ranking: Vec<usize> },
}

/// A node joining segment ends.
#[derive(Clone, Debug)]
pub struct Intersection {
    /// The intersection ID.
    id: IntersectionId,
    /// The location of the intersection.
    position: Point2d,
    /// The control type.
    control: ControlType,
    /// The lane bindings, in the order referenced by `control`.
    bindings: Vec<LaneBinding>,
}

/// What a segment endpoint is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Attachment {
    Intersection(IntersectionId),
    Boundary,
}

/// A declarative description of a road network.
#[derive(Clone, Debug, Default)]
pub struct RoadNetwork {
    /// The segments in the network.
    segments: SegmentSet,
    /// The intersections in the network.
    intersections: IntersectionSet,
    /// Segment endpoints where vehicles enter or leave the network.
    boundaries: BTreeSet<(SegmentId, Endpoint)>,
}

impl Direction {
    /// The endpoint at which vehicles travelling in this direction enter a segment.
    pub fn entry(self) -> Endpoint {
        match self {
            Direction::Forward => Endpoint::Start,
            Direction::Backward => Endpoint::End,
        }
    }

    /// The endpoint at which vehicles travelling in this direction leave a segment.
    pub fn exit(self) -> Endpoint {
        match self {
            Direction::Forward => Endpoint::End,
            Direction::Backward => Endpoint::Start,
        }
    }
}

impl LaneRef {
    /// A lane travelling in the forward direction.
    pub fn forward(segment: SegmentId, lane: u8) -> Self {
        Self {
            segment,
            direction: Direction::Forward,
            lane,
        }
    }

    /// A lane travelling in the backward direction.
    pub fn backward(segment: SegmentId, lane: u8) -> Self {
        Self {
            segment,
            direction: Direction::Backward,
            lane,
        }
    }
}

impl LaneBinding {
    /// Creates a new binding.
    pub fn new(from: LaneRef, to: LaneRef) -> Self {
        Self { from, to }
    }
}

impl RoadSegment {
    /// Gets the segment's ID.
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// The centre line of the segment.
    pub fn geometry(&self) -> &[Point2d] {
        &self.geometry
    }

    /// The length of the segment in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The number of lanes in each direction of travel.
    pub fn lanes(&self) -> u8 {
        self.lanes
    }

    /// The speed limit in m/s.
    pub fn speed_limit(&self) -> f64 {
        self.speed_limit
    }

    pub fn one_way(&self) -> bool {
        self.one_way
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    /// The directions in which traffic travels along this segment.
    pub fn directions(&self) -> &'static [Direction] {
        if self.one_way {
            &[Direction::Forward]
        } else {
            &[Direction::Forward, Direction::Backward]
        }
    }

    /// Whether the segment has a lane with the given direction and index.
    pub fn has_lane(&self, direction: Direction, lane: u8) -> bool {
        lane < self.lanes && self.directions().contains(&direction)
    }

    /// Iterates over the segment's lanes, forward lanes first.
    pub fn lane_refs(&self) -> impl Iterator<Item = LaneRef> + '_ {
        self.directions().iter().flat_map(move |dir| {
            (0..self.lanes).map(move |lane| LaneRef {
                segment: self.id,
                direction: *dir,
                lane,
            })
        })
    }

    /// Iterates over the lanes whose traffic leaves the segment at the given endpoint.
    fn lanes_exiting_at(&self, endpoint: Endpoint) -> impl Iterator<Item = LaneRef> + '_ {
        self.lane_refs()
            .filter(move |lane| lane.direction.exit() == endpoint)
    }
}

impl Intersection {
    /// Gets the intersection's ID.
    pub fn id(&self) -> IntersectionId {
        self.id
    }

    /// The location of the intersection.
    pub fn position(&self) -> Point2d {
        self.position
    }

    /// The control type.
    pub fn control(&self) -> &ControlType {
        &self.control
    }

    /// The lane bindings.
    pub fn bindings(&self) -> &[LaneBinding] {
        &self.bindings
    }
}

impl RoadNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a segment to the network.
    pub fn add_segment(&mut self, attributes: &SegmentAttributes) -> SegmentId {
        self.segments.insert_with_key(|id| RoadSegment {
            id,
            geometry: attributes.geometry.to_vec(),
            length: polyline_length(attributes.geometry),
            lanes: attributes.lanes,
            speed_limit: attributes.speed_limit,
            one_way: attributes.one_way,
            kind: attributes.kind,
        })
    }

    /// Adds an intersection joining the segment ends referenced by `bindings`.
    pub fn add_intersection(
        &mut self,
        position: Point2d,
        control: ControlType,
        bindings: Vec<LaneBinding>,
    ) -> IntersectionId {
        self.intersections.insert_with_key(|id| Intersection {
            id,
            position,
            control,
            bindings,
        })
    }

    /// Marks a segment endpoint as a network boundary. Lanes entering the segment
    /// there receive injected vehicles, and lanes leaving it there remove vehicles.
    pub fn mark_boundary(&mut self, segment: SegmentId, endpoint: Endpoint) {
        self.boundaries.insert((segment, endpoint));
    }

    /// Whether the given segment endpoint is a network boundary.
    pub fn is_boundary(&self, segment: SegmentId, endpoint: Endpoint) -> bool {
        self.boundaries.contains(&(segment, endpoint))
    }

    /// Gets a reference to the segment with the given ID.
    pub fn segment(&self, id: SegmentId) -> Option<&RoadSegment> {
        self.segments.get(id)
    }

    /// Gets a reference to the intersection with the given ID.
    pub fn intersection(&self, id: IntersectionId) -> Option<&Intersection> {
        self.intersections.get(id)
    }

    /// Returns an iterator over all the segments in the network.
    pub fn iter_segments(&self) -> impl Iterator<Item = &RoadSegment> {
        self.segments.values()
    }

    /// Returns an iterator over all the intersections in the network.
    pub fn iter_intersections(&self) -> impl Iterator<Item = &Intersection> {
        self.intersections.values()
    }

    /// Checks the network for topology errors, returning all of them.
    pub fn validate(&self) -> Vec<TopologyError> {
        let mut errors = vec![];
        let mut attachments = BTreeMap::<(SegmentId, Endpoint), BTreeSet<Attachment>>::new();
        let mut sources = HashMap::<LaneRef, usize>::new();

        for segment in self.segments.values() {
            if segment.geometry.len() < 2 || segment.length <= 0.0 {
                errors.push(TopologyError::DegenerateGeometry {
                    segment: segment.id,
                });
            }
            if segment.lanes == 0 {
                errors.push(TopologyError::NoLanes {
                    segment: segment.id,
                });
            }
            if !segment.speed_limit.is_finite() || segment.speed_limit <= 0.0 {
                errors.push(TopologyError::InvalidSpeedLimit {
                    segment: segment.id,
                    speed_limit: segment.speed_limit,
                });
            }
        }

        for &(segment, endpoint) in &self.boundaries {
            attachments
                .entry((segment, endpoint))
                .or_default()
                .insert(Attachment::Boundary);
        }

        for int in self.intersections.values() {
            for (idx, binding) in int.bindings.iter().enumerate() {
                for lane in [binding.from, binding.to] {
                    if let Some(detail) = self.lane_problem(lane) {
                        errors.push(TopologyError::LaneMismatch {
                            intersection: int.id,
                            binding: idx,
                            detail,
                        });
                    }
                }
                *sources.entry(binding.from).or_default() += 1;
                for key in [
                    (binding.from.segment, binding.from.direction.exit()),
                    (binding.to.segment, binding.to.direction.entry()),
                ] {
                    attachments
                        .entry(key)
                        .or_default()
                        .insert(Attachment::Intersection(int.id));
                }
            }
            errors.extend(int.control_problems());
        }

        let mut duplicates = sources
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(lane, _)| lane)
            .collect::<Vec<_>>();
        duplicates.sort();
        errors.extend(
            duplicates
                .into_iter()
                .map(|lane| TopologyError::DuplicateSource { lane }),
        );

        for segment in self.segments.values() {
            for endpoint in [Endpoint::Start, Endpoint::End] {
                match attachments.get(&(segment.id, endpoint)) {
                    None => errors.push(TopologyError::UnboundEndpoint {
                        segment: segment.id,
                        endpoint,
                    }),
                    Some(set) if set.len() > 1 => errors.push(TopologyError::EndpointConflict {
                        segment: segment.id,
                        endpoint,
                    }),
                    Some(set) => {
                        if let Some(Attachment::Intersection(int_id)) = set.iter().next() {
                            errors.extend(self.unbound_lanes(segment, endpoint, *int_id));
                        }
                    }
                }
            }
        }

        errors
    }

    /// Validates the network, failing with [BuildError::InvalidTopology] if there are any errors.
    pub fn finalize(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BuildError::InvalidTopology(errors))
        }
    }

    /// Describes why a lane reference is invalid, if it is.
    fn lane_problem(&self, lane: LaneRef) -> Option<String> {
        match self.segments.get(lane.segment) {
            None => Some(format!("segment {:?} does not exist", lane.segment)),
            Some(segment) if !segment.has_lane(lane.direction, lane.lane) => Some(format!(
                "segment {:?} has no {:?} lane {} ({} lane(s), one way: {})",
                lane.segment, lane.direction, lane.lane, segment.lanes, segment.one_way
            )),
            Some(_) => None,
        }
    }

    /// Finds lanes which leave a segment into an intersection without being bound to anything.
    fn unbound_lanes(
        &self,
        segment: &RoadSegment,
        endpoint: Endpoint,
        int_id: IntersectionId,
    ) -> Vec<TopologyError> {
        let int = &self.intersections[int_id];
        let first_binding = int
            .bindings
            .iter()
            .position(|b| b.from.segment == segment.id || b.to.segment == segment.id)
            .unwrap_or(0);
        segment
            .lanes_exiting_at(endpoint)
            .filter(|lane| !int.bindings.iter().any(|b| b.from == *lane))
            .map(|lane| TopologyError::LaneMismatch {
                intersection: int_id,
                binding: first_binding,
                detail: format!(
                    "{:?} lane {} of segment {:?} enters the intersection but is not bound",
                    lane.direction, lane.lane, lane.segment
                ),
            })
            .collect()
    }
}

impl Intersection {
    /// Checks that the control type only refers to existing bindings, each at most once.
    fn control_problems(&self) -> Vec<TopologyError> {
        let num = self.bindings.len();
        let mut errors = vec![];
        let mut check = |indices: &[usize]| {
            let mut seen = BTreeSet::new();
            for &idx in indices {
                if idx >= num || !seen.insert(idx) {
                    errors.push(TopologyError::ControlReference {
                        intersection: self.id,
                        binding: idx,
                    });
                }
            }
        };
        match &self.control {
            ControlType::Signal { phases } => {
                for phase in phases {
                    check(phase.as_slice());
                }
            }
            ControlType::Roundabout { circulating } => check(circulating.as_slice()),
            ControlType::Priority { ranking } => check(ranking.as_slice()),
        }
        errors
    }
}
