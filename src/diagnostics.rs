use crate::error::InvariantViolation;

/// Runtime invariant violations recorded by a simulation.
///
/// This channel is separate from the return value of
/// [Simulation::step](crate::Simulation::step), which always succeeds.
/// A harness may inspect it to halt, log or retry a batch of steps.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    violations: Vec<InvariantViolation>,
}

impl Diagnostics {
    /// Records a violation, logging it as an error.
    pub(crate) fn record(&mut self, violation: InvariantViolation) {
        log::error!("{}", violation);
        self.violations.push(violation);
    }

    /// The number of violations recorded.
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// The violations recorded since the first `from` violations.
    pub fn since(&self, from: usize) -> &[InvariantViolation] {
        self.violations.get(from..).unwrap_or_default()
    }

    /// Returns an iterator over all recorded violations, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &InvariantViolation> {
        self.violations.iter()
    }

    /// Removes and returns all recorded violations.
    pub fn take(&mut self) -> Vec<InvariantViolation> {
        std::mem::take(&mut self.violations)
    }
}
