use std::collections::HashMap;

use crate::{
    plan::Step,
    toolkit::{SolveReport, TaskOutcome, Toolkit, ToolkitError},
};

/// A toolkit which only remembers what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingToolkit {
    /// Labels of the executed steps
    pub executed: Vec<String>,
    /// Solve reports to hand back, by table name
    pub reports: HashMap<String, SolveReport>,
    /// Fail the step with this label
    pub fail_on: Option<String>,
    /// Whether finish was called
    pub finished: bool,
}

impl RecordingToolkit {
    pub fn with_report(mut self, table: &str, flagged: usize, total: usize) -> Self {
        self.reports
            .insert(table.to_string(), SolveReport { flagged, total });
        self
    }

    pub fn failing_on(mut self, label: &str) -> Self {
        self.fail_on = Some(label.to_string());
        self
    }
}

impl Toolkit for RecordingToolkit {
    fn name(&self) -> String {
        "recording".into()
    }

    fn execute(&mut self, step: &Step) -> Result<TaskOutcome, ToolkitError> {
        if self.fail_on.as_deref() == Some(step.label.as_str()) {
            return Err(ToolkitError::TaskFailed {
                task: step.call.task.clone(),
                status: "exit status: 1".into(),
            });
        }
        self.executed.push(step.label.clone());
        Ok(TaskOutcome {
            solve: step
                .solved_table()
                .and_then(|table| self.reports.get(table).copied()),
            log: vec![],
        })
    }

    fn finish(&mut self) -> Result<(), ToolkitError> {
        self.finished = true;
        Ok(())
    }
}
