//! Execute a [`Plan`] through a [`Toolkit`].

use std::{collections::HashMap, time::Duration};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, trace, warn};

use crate::{
    config::SolvePolicy,
    error::MeercalError,
    plan::{Plan, Step},
    toolkit::{SolveReport, Toolkit},
    with_increment_duration,
};

/// A plan together with the rules for judging its solves.
#[derive(Debug, Clone)]
pub struct Pipeline {
    plan: Plan,
    policy: SolvePolicy,
    draw_progress: bool,
}

impl Pipeline {
    /// A pipeline which will run `plan`, with the progress bar hidden.
    pub fn new(plan: Plan, policy: SolvePolicy) -> Self {
        Self {
            plan,
            policy,
            draw_progress: false,
        }
    }

    /// Draw a progress bar over the steps on stderr.
    #[must_use]
    pub fn with_progress(mut self, draw_progress: bool) -> Self {
        self.draw_progress = draw_progress;
        self
    }

    /// The plan being run.
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Judge a solve outcome against the policy.
    ///
    /// # Errors
    ///
    /// Returns [`MeercalError::SolveRejected`] if more than the allowed
    /// fraction of solutions were flagged and the policy is to abort. If the
    /// policy is not to abort, the rejection is logged instead.
    pub fn check_solve(&self, step: &Step, report: &SolveReport) -> Result<(), MeercalError> {
        let Some(max_fraction) = self.policy.max_flagged_fraction else {
            return Ok(());
        };
        let fraction = report.flagged_fraction();
        if fraction <= max_fraction {
            debug!(
                "{}: {} of {} solutions flagged",
                step.label, report.flagged, report.total
            );
            return Ok(());
        }
        let rejection = MeercalError::SolveRejected {
            step: step.label.clone(),
            table: step.solved_table().unwrap_or_default().to_string(),
            flagged: report.flagged,
            total: report.total,
            max_fraction,
        };
        if self.policy.abort_on_failure {
            Err(rejection)
        } else {
            warn!("{}", rejection);
            Ok(())
        }
    }

    /// Carry out every step in order, returning the time spent in each stage.
    ///
    /// Each step's inputs are checked against what earlier steps have
    /// produced before it is handed to `toolkit`.
    ///
    /// # Errors
    ///
    /// - [`MeercalError::MissingArtifact`] if a step's input doesn't exist
    /// - [`MeercalError::Toolkit`] if the toolkit fails a step
    /// - [`MeercalError::SolveRejected`] if a solve is rejected
    pub fn run(&self, toolkit: &mut dyn Toolkit) -> Result<HashMap<String, Duration>, MeercalError> {
        self.plan.validate()?;

        // used to time each stage
        let mut durations = HashMap::<String, Duration>::new();
        let mut context = self.plan.seed_context();

        let draw_target = if self.draw_progress {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let progress = ProgressBar::with_draw_target(Some(self.plan.steps.len() as _), draw_target)
            .with_style(
                ProgressStyle::default_bar()
                    .template(
                        "{msg:16}: [{elapsed_precise}] [{wide_bar:.cyan/blue}] {percent:3}% ({eta:5})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            )
            .with_position(0);

        info!(
            "running {} steps with {}",
            self.plan.steps.len(),
            toolkit.name()
        );
        for step in &self.plan.steps {
            progress.set_message(step.stage.name());
            for input in &step.inputs {
                context.require(&step.label, input)?;
            }
            trace!("{}: {}", step.label, step.call);
            let outcome =
                with_increment_duration!(durations, step.stage.name(), toolkit.execute(step))?;
            if let Some(report) = outcome.solve {
                self.check_solve(step, &report)?;
            }
            for output in &step.outputs {
                context.produce(&step.label, output.clone(), &step.inputs);
            }
            progress.inc(1);
        }
        with_increment_duration!(durations, "finish", toolkit.finish())?;
        progress.finish();
        info!("produced {} artifacts", context.produced().count());

        Ok(durations)
    }
}
