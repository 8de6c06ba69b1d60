//! A deterministic, lane-based cellular automaton traffic simulator.
//!
//! A [RoadNetwork] of segments and intersections is discretised into a [CellGrid],
//! over which a [Simulation] advances vehicles one step at a time using a
//! Nagel-Schreckenberg style update rule. Intersection controllers gate every
//! transition from one segment to the next.

pub use cgmath;
pub use config::{
    ArrivalPolicy, InjectionParams, InvariantPolicy, PriorityParams, RoundaboutParams,
    SignalTiming, SimulationConfig,
};
pub use control::{Gate, IntersectionController};
pub use diagnostics::Diagnostics;
pub use error::{BuildError, ConfigError, InvariantViolation, TopologyError};
pub use grid::{BindingId, Cell, CellGrid, CellId, Successor};
pub use network::{
    ControlType, Direction, Endpoint, Intersection, LaneBinding, LaneRef, RoadNetwork,
    RoadSegment, SegmentAttributes, SegmentKind,
};
pub use simulation::{BatchOutcome, Simulation, StopReason};
pub use slotmap::{Key, KeyData};
pub use snapshot::{GateView, Snapshot, StepSummary, VehicleView};
pub use state::{SimulationState, Vehicle};
pub use util::Interval;

mod config;
mod control;
mod diagnostics;
mod error;
mod grid;
pub mod math;
mod network;
mod simulation;
mod snapshot;
mod state;
mod util;

#[cfg(feature = "serde")]
pub mod description {
    //! Structured records for loading road networks from key-value documents.
    pub use crate::network::description::*;
}

slotmap::new_key_type! {
    /// Unique ID of a [RoadSegment].
    pub struct SegmentId;
    /// Unique ID of an [Intersection].
    pub struct IntersectionId;
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type SegmentSet = slotmap::SlotMap<SegmentId, RoadSegment>;
type IntersectionSet = slotmap::SlotMap<IntersectionId, Intersection>;
type VehicleSet = slotmap::SlotMap<VehicleId, Vehicle>;
