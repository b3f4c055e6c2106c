#![warn(missing_docs)]
#![warn(clippy::missing_safety_doc)]
#![warn(clippy::missing_errors_doc)]

//! Meercal drives the calibration and imaging of MeerKAT L-band visibilities
//! through CASA.
//!
//! A [`PipelineConfig`] is turned into a [`Plan`]: the ordered toolkit calls
//! which flag the raw data, set the flux scale of the bandpass calibrator,
//! solve for delays, gains and bandpasses in four rounds, correct and split
//! the target, then image it. A [`Pipeline`] checks each step's inputs as it
//! hands the plan to a [`Toolkit`], either a [`CasaScript`] writer or a
//! [`CasaRunner`] which invokes CASA directly.
//!
//! # Examples
//!
//! Write the default reduction out as a CASA script.
//!
//! ```rust
//! use meercal::{CasaScript, Pipeline, PipelineConfigBuilder, Plan, SolvePolicy};
//! use tempfile::tempdir;
//!
//! let config = PipelineConfigBuilder::default()
//!     .ms("obs.ms")
//!     .target_ms("obs_target.ms")
//!     .build()
//!     .unwrap();
//! let plan = Plan::build(&config).unwrap();
//! assert!(plan.table_names().contains(&"obs.ms_tt.B1".to_string()));
//!
//! let tmp_dir = tempdir().unwrap();
//! let mut script = CasaScript::new(tmp_dir.path().join("reduce.py"));
//! Pipeline::new(plan, SolvePolicy::default())
//!     .run(&mut script)
//!     .unwrap();
//! assert!(tmp_dir.path().join("reduce.py").exists());
//! ```

pub mod calibration;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod flags;
pub mod flux;
pub mod imaging;
pub mod pipeline;
pub mod plan;
pub mod task;
pub mod toolkit;

cfg_if::cfg_if! {
    if #[cfg(feature = "cli")] {
        pub mod cli;
        pub use cli::MeercalContext;
    }
}

pub use config::{PipelineConfig, PipelineConfigBuilder, SolvePolicy};
pub use context::{Artifact, PipelineContext};
pub use error::MeercalError;
pub use pipeline::Pipeline;
pub use plan::{Plan, Stage, Step};
pub use task::TaskCall;
pub use toolkit::{CasaRunner, CasaScript, Toolkit};

/// Evaluate `$body`, adding the time it took to `$durations[$name]`.
///
/// ```
/// use std::{collections::HashMap, time::Duration};
///
/// let mut durations = HashMap::<String, Duration>::new();
/// let answer = meercal::with_increment_duration!(durations, "think", 6 * 7);
/// assert_eq!(answer, 42);
/// assert!(durations.contains_key("think"));
/// ```
#[macro_export]
macro_rules! with_increment_duration {
    ($durations:expr, $name:expr, $body:expr) => {{
        let _now = std::time::Instant::now();
        let _res = $body;
        *$durations
            .entry($name.into())
            .or_insert(std::time::Duration::default()) += _now.elapsed();
        _res
    }};
}

#[cfg(test)]
pub(crate) mod test_common;
