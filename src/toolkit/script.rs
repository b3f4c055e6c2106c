//! Write the plan out as a CASA python script instead of running it.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use log::info;

use super::{TaskOutcome, Toolkit, ToolkitError};
use crate::plan::{Plan, Stage, Step};

/// Accumulates steps into a script for `casa -c`, written on
/// [`Toolkit::finish`].
#[derive(Debug, Clone)]
pub struct CasaScript {
    path: PathBuf,
    lines: Vec<String>,
    stage: Option<Stage>,
}

impl CasaScript {
    /// A script which will be written to `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lines: vec![],
            stage: None,
        }
    }

    /// Where the script is written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn header() -> String {
        format!(
            "# written by {} {}\nimport shutil\n",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )
    }

    fn push(&mut self, step: &Step) {
        if self.stage != Some(step.stage) {
            self.lines.push(String::new());
            self.lines.push(format!("# --- {} ---", step.stage));
            self.stage = Some(step.stage);
        }
        self.lines.push(format!("# {}", step.label));
        self.lines.push(step.call.render_python());
    }

    /// The script as accumulated so far.
    pub fn render(&self) -> String {
        let mut out = Self::header();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Render a whole plan without writing anything.
    pub fn render_plan(plan: &Plan) -> String {
        let mut script = Self::new("");
        for step in &plan.steps {
            script.push(step);
        }
        script.render()
    }
}

impl Toolkit for CasaScript {
    fn name(&self) -> String {
        format!("casa script {}", self.path.display())
    }

    fn execute(&mut self, step: &Step) -> Result<TaskOutcome, ToolkitError> {
        self.push(step);
        Ok(TaskOutcome::default())
    }

    fn finish(&mut self) -> Result<(), ToolkitError> {
        let mut writer = BufWriter::new(File::create(&self.path)?);
        writer.write_all(self.render().as_bytes())?;
        writer.flush()?;
        info!("wrote {} lines to {}", self.lines.len(), self.path.display());
        Ok(())
    }
}
