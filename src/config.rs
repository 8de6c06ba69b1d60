//! Simulation parameters.
//!
//! Every parameter is an explicit, named field without a default value.

use crate::error::ConfigError;

/// The parameters of a simulation run.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(deny_unknown_fields)
)]
pub struct SimulationConfig {
    /// The physical length of a cell in m.
    pub cell_length: f64,
    /// The simulated duration of one step in s.
    pub time_step: f64,
    /// The global maximum vehicle speed in cells per step.
    pub max_speed: u8,
    /// The probability that a vehicle randomly slows down in a step.
    pub p_slow: f64,
    /// Seed of the pseudo-random source.
    pub seed: u64,
    /// Timing of signal-controlled intersections.
    pub signal: SignalTiming,
    /// Parameters of roundabout-controlled intersections.
    pub roundabout: RoundaboutParams,
    /// Parameters of priority/yield-controlled intersections.
    pub priority: PriorityParams,
    /// Vehicle injection at network boundaries.
    pub injection: InjectionParams,
    /// What a batch run does when a runtime invariant is violated.
    pub invariant_policy: InvariantPolicy,
}

/// Signal timing parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(deny_unknown_fields)
)]
pub struct SignalTiming {
    /// The number of steps each phase stays active.
    pub phase_ticks: u32,
}

/// Roundabout parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(deny_unknown_fields)
)]
pub struct RoundaboutParams {
    /// How many cells upstream of a merge are checked for circulating traffic
    /// before an entry is allowed to proceed.
    pub circulating_lookback: u32,
}

/// Priority/yield parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(deny_unknown_fields)
)]
pub struct PriorityParams {
    /// A lower-priority approach yields while a higher-priority approach
    /// has a vehicle within this many cells of the intersection.
    pub yield_distance: u32,
}

/// Boundary injection parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(deny_unknown_fields)
)]
pub struct InjectionParams {
    /// The arrival process at every entry cell.
    pub arrival: ArrivalPolicy,
    /// The maximum speed of injected vehicles in cells per step.
    pub vehicle_max_speed: u8,
}

/// The arrival process of vehicles at an entry cell.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "type", rename_all = "snake_case")
)]
pub enum ArrivalPolicy {
    /// No automatic injection.
    Disabled,
    /// One arrival every `period` steps.
    FixedRate { period: u32 },
    /// One arrival per step with the given probability.
    Bernoulli { probability: f64 },
    /// A Poisson process with `rate` expected arrivals per step.
    Poisson { rate: f64 },
}

/// How runtime invariant violations affect batch runs.
///
/// Violations are always resolved deterministically (the lowest vehicle ID
/// keeps a contested cell), logged, and recorded in the
/// [Diagnostics](crate::Diagnostics) channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum InvariantPolicy {
    /// Stop a batch run after the step that produced a violation.
    Halt,
    /// Keep running after the deterministic recovery.
    Recover,
}

impl SimulationConfig {
    /// Checks that every parameter is within its permitted range,
    /// and logs a warning for legal values which permit collisions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("cell_length", self.cell_length)?;
        positive("time_step", self.time_step)?;
        at_least_one("max_speed", self.max_speed as f64)?;
        probability("p_slow", self.p_slow)?;
        at_least_one("signal.phase_ticks", self.signal.phase_ticks as f64)?;
        at_least_one(
            "injection.vehicle_max_speed",
            self.injection.vehicle_max_speed as f64,
        )?;
        match self.injection.arrival {
            ArrivalPolicy::Disabled => {}
            ArrivalPolicy::FixedRate { period } => {
                at_least_one("injection.arrival.period", period as f64)?
            }
            ArrivalPolicy::Bernoulli { probability: p } => {
                probability("injection.arrival.probability", p)?
            }
            ArrivalPolicy::Poisson { rate } => positive("injection.arrival.rate", rate)?,
        }

        let max_speed = self.max_speed as u32;
        if self.priority.yield_distance < max_speed {
            log::warn!(
                "yield distance {} is shorter than max speed {}; yielding approaches may collide",
                self.priority.yield_distance,
                max_speed
            );
        }
        if self.roundabout.circulating_lookback < max_speed {
            log::warn!(
                "circulating lookback {} is shorter than max speed {}; roundabout entries may collide",
                self.roundabout.circulating_lookback,
                max_speed
            );
        }
        Ok(())
    }

    /// The speed of a vehicle, in cells per step, travelling at the given speed in m/s.
    /// Never less than one cell per step, so every lane is passable.
    pub(crate) fn cells_per_step(&self, speed: f64) -> u8 {
        let cells = (speed * self.time_step / self.cell_length).floor();
        cells.clamp(1.0, u8::MAX as f64) as u8
    }
}

pub(crate) fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError {
            field,
            requirement: "finite and positive",
            value,
        })
    }
}

fn at_least_one(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value >= 1.0 {
        Ok(())
    } else {
        Err(ConfigError {
            field,
            requirement: "at least 1",
            value,
        })
    }
}

fn probability(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError {
            field,
            requirement: "within [0, 1]",
            value,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config() -> SimulationConfig {
        SimulationConfig {
            cell_length: 7.5,
            time_step: 1.0,
            max_speed: 5,
            p_slow: 0.2,
            seed: 1,
            signal: SignalTiming { phase_ticks: 10 },
            roundabout: RoundaboutParams {
                circulating_lookback: 5,
            },
            priority: PriorityParams { yield_distance: 5 },
            injection: InjectionParams {
                arrival: ArrivalPolicy::Disabled,
                vehicle_max_speed: 5,
            },
            invariant_policy: InvariantPolicy::Halt,
        }
    }

    #[test]
    fn accepts_valid_config() {
        assert_eq!(config().validate(), Ok(()));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = config();
        cfg.p_slow = 1.5;
        assert_eq!(cfg.validate().unwrap_err().field, "p_slow");

        let mut cfg = config();
        cfg.cell_length = 0.0;
        assert_eq!(cfg.validate().unwrap_err().field, "cell_length");

        let mut cfg = config();
        cfg.injection.arrival = ArrivalPolicy::FixedRate { period: 0 };
        assert_eq!(cfg.validate().unwrap_err().field, "injection.arrival.period");
    }

    #[test]
    fn converts_speed_limits_to_cells() {
        let cfg = config();
        // 13.9 m/s (50 km/h) over 7.5 m cells
        assert_eq!(cfg.cells_per_step(13.9), 1);
        assert_eq!(cfg.cells_per_step(33.3), 4);
        // Slow roads remain passable
        assert_eq!(cfg.cells_per_step(2.0), 1);
    }
}
