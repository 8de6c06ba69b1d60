//! Error types.

use crate::grid::{BindingId, CellId};
use crate::network::{Endpoint, LaneRef};
use crate::{IntersectionId, SegmentId, VehicleId};
use thiserror::Error;

/// Result type alias for network and grid construction.
pub type Result<T> = std::result::Result<T, BuildError>;

/// A fatal error raised while constructing a network, grid or simulation.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("invalid topology ({} error(s)), first: {}", .0.len(), first_error(.0))]
    InvalidTopology(Vec<TopologyError>),

    #[error("{endpoint:?} endpoint of segment {segment:?} is neither bound to an intersection nor a boundary")]
    UnboundEndpoint {
        segment: SegmentId,
        endpoint: Endpoint,
    },

    #[error("lane mismatch at binding {binding} of intersection {intersection:?}: {detail}")]
    LaneMismatchAtBinding {
        intersection: IntersectionId,
        binding: usize,
        detail: String,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("unknown reference: {0:?}")]
    UnknownReference(String),

    #[error("saved state does not fit the grid: {0}")]
    IncompatibleState(String),

    #[cfg(feature = "serde")]
    #[error("malformed document: {0}")]
    Parse(#[from] serde_json::Error),
}

fn first_error(errors: &[TopologyError]) -> String {
    errors
        .first()
        .map(ToString::to_string)
        .unwrap_or_default()
}

/// A single problem found by [RoadNetwork::validate](crate::RoadNetwork::validate).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyError {
    #[error("{endpoint:?} endpoint of segment {segment:?} is not bound")]
    UnboundEndpoint {
        segment: SegmentId,
        endpoint: Endpoint,
    },

    #[error("binding {binding} of intersection {intersection:?}: {detail}")]
    LaneMismatch {
        intersection: IntersectionId,
        binding: usize,
        detail: String,
    },

    #[error("{endpoint:?} endpoint of segment {segment:?} is attached more than once")]
    EndpointConflict {
        segment: SegmentId,
        endpoint: Endpoint,
    },

    #[error("lane {lane:?} is the source of more than one binding")]
    DuplicateSource { lane: LaneRef },

    #[error("control of intersection {intersection:?} refers to missing binding {binding}")]
    ControlReference {
        intersection: IntersectionId,
        binding: usize,
    },

    #[error("segment {segment:?} has degenerate geometry")]
    DegenerateGeometry { segment: SegmentId },

    #[error("segment {segment:?} has no lanes")]
    NoLanes { segment: SegmentId },

    #[error("segment {segment:?} has invalid speed limit {speed_limit}")]
    InvalidSpeedLimit { segment: SegmentId, speed_limit: f64 },
}

/// A configuration value outside its permitted range.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("`{field}` must be {requirement}, got {value}")]
pub struct ConfigError {
    pub field: &'static str,
    pub requirement: &'static str,
    pub value: f64,
}

/// A broken runtime invariant, indicating a bug in the engine
/// or a misconfigured intersection controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InvariantViolation {
    #[error("step {step}: vehicles {winner:?} and {loser:?} both moved into cell {cell:?}")]
    MovementCollisionDetected {
        step: u64,
        cell: CellId,
        winner: VehicleId,
        loser: VehicleId,
    },

    #[error("step {step}: no gate state was frozen for binding {binding:?}")]
    GateStateMissingForStep { step: u64, binding: BindingId },
}
