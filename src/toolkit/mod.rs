//! Backends which carry out the steps of a [`crate::Plan`].

pub mod casa;
pub mod error;
pub mod script;

pub use casa::CasaRunner;
pub use error::ToolkitError;
pub use script::CasaScript;

use crate::plan::Step;

/// How many solutions a solve flagged for low SNR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolveReport {
    /// Solutions flagged
    pub flagged: usize,
    /// Solutions attempted
    pub total: usize,
}

impl SolveReport {
    /// Fraction of solutions flagged, zero when nothing was attempted.
    ///
    /// ```
    /// use meercal::toolkit::SolveReport;
    ///
    /// assert_eq!(SolveReport { flagged: 3, total: 12 }.flagged_fraction(), 0.25);
    /// assert_eq!(SolveReport::default().flagged_fraction(), 0.0);
    /// ```
    pub fn flagged_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.flagged as f64 / self.total as f64
        }
    }
}

impl std::ops::AddAssign for SolveReport {
    fn add_assign(&mut self, rhs: Self) {
        self.flagged += rhs.flagged;
        self.total += rhs.total;
    }
}

/// What the toolkit reported back about a step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOutcome {
    /// Solution statistics, for solves which reported them
    pub solve: Option<SolveReport>,
    /// Log lines produced by the task
    pub log: Vec<String>,
}

/// Something which can carry out [`Step`]s.
pub trait Toolkit {
    /// A human readable name for logging
    fn name(&self) -> String;

    /// Carry out `step`.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolkitError`] if the step could not be carried out.
    fn execute(&mut self, step: &Step) -> Result<TaskOutcome, ToolkitError>;

    /// Called once after the last step.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolkitError`] if pending work could not be completed.
    fn finish(&mut self) -> Result<(), ToolkitError> {
        Ok(())
    }
}
