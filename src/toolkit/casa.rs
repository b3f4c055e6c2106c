//! Run each step through a CASA executable.

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    process::Command,
};

use cfg_if::cfg_if;
use lazy_static::lazy_static;
use log::{debug, trace};
use regex::Regex;

use super::{SolveReport, TaskOutcome, Toolkit, ToolkitError};
use crate::{context::Artifact, plan::Step};

lazy_static! {
    static ref SNR_FLAGGED_RE: Regex =
        Regex::new(r"(\d+) of (\d+) solutions flagged due to SNR < ").unwrap();
}

/// Arguments given to CASA ahead of the script.
pub const CASA_ARGS: [&str; 4] = ["--nogui", "--nologger", "--log2term", "-c"];

/// Sum every "N of M solutions flagged due to SNR" line in `log`.
///
/// Returns `None` when there are no such lines.
///
/// ```
/// use meercal::toolkit::{casa::parse_solve_report, SolveReport};
///
/// let log = "\
///     2 of 58 solutions flagged due to SNR < 3 in spw=0 at 2019/06/01/10:00:00\n\
///     1 of 58 solutions flagged due to SNR < 3 in spw=0 at 2019/06/01/10:02:00\n";
/// assert_eq!(
///     parse_solve_report(log),
///     Some(SolveReport { flagged: 3, total: 116 })
/// );
/// assert_eq!(parse_solve_report("nothing to see"), None);
/// ```
pub fn parse_solve_report(log: &str) -> Option<SolveReport> {
    let mut report: Option<SolveReport> = None;
    for caps in SNR_FLAGGED_RE.captures_iter(log) {
        let (Ok(flagged), Ok(total)) = (caps[1].parse::<usize>(), caps[2].parse::<usize>()) else {
            continue;
        };
        *report.get_or_insert_with(SolveReport::default) += SolveReport { flagged, total };
    }
    report
}

fn quote_command(args: &[String]) -> String {
    cfg_if! {
        if #[cfg(feature = "shlex")] {
            shlex::try_join(args.iter().map(String::as_str)).unwrap_or_else(|_| args.join(" "))
        } else {
            args.join(" ")
        }
    }
}

/// The path on disk an output artifact should exist at, if it is checked.
fn output_path(artifact: &Artifact) -> Option<&str> {
    match artifact {
        Artifact::Dataset(path) | Artifact::CalTable(path) | Artifact::Fits(path) => {
            Some(path.as_str())
        }
        _ => None,
    }
}

/// Runs each step as its own `casa -c` invocation.
///
/// Paths in the calls are relative to the working directory of the process,
/// the one-call scripts are written into `work_dir`.
#[derive(Debug, Clone)]
pub struct CasaRunner {
    casa: PathBuf,
    work_dir: PathBuf,
    num_scripts: usize,
}

impl CasaRunner {
    /// A runner using the `casa` executable, with scripts in `work_dir`.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(casa: P, work_dir: Q) -> Self {
        Self {
            casa: casa.as_ref().to_path_buf(),
            work_dir: work_dir.as_ref().to_path_buf(),
            num_scripts: 0,
        }
    }

    /// Write the one-call script for `step`.
    fn write_script(&mut self, step: &Step) -> Result<PathBuf, ToolkitError> {
        fs::create_dir_all(&self.work_dir)?;
        let path = self
            .work_dir
            .join(format!("step_{:03}_{}.py", self.num_scripts, step.call.task));
        self.num_scripts += 1;
        let mut file = File::create(&path)?;
        writeln!(file, "# {}", step.label)?;
        writeln!(file, "import shutil")?;
        writeln!(file, "{}", step.call.render_python())?;
        Ok(path)
    }

    /// The full command line for `script`.
    pub fn command_line(&self, script: &Path) -> Vec<String> {
        std::iter::once(self.casa.display().to_string())
            .chain(CASA_ARGS.iter().map(|arg| arg.to_string()))
            .chain(std::iter::once(script.display().to_string()))
            .collect()
    }
}

impl Toolkit for CasaRunner {
    fn name(&self) -> String {
        format!("casa {}", self.casa.display())
    }

    fn execute(&mut self, step: &Step) -> Result<TaskOutcome, ToolkitError> {
        let script = self.write_script(step)?;
        debug!("running {}", quote_command(&self.command_line(&script)));
        let output = Command::new(&self.casa)
            .args(CASA_ARGS)
            .arg(&script)
            .output()
            .map_err(|source| ToolkitError::Spawn {
                program: self.casa.display().to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let log: Vec<String> = stdout
            .lines()
            .chain(stderr.lines())
            .map(|line| line.to_string())
            .collect();
        for line in &log {
            trace!("{}", line);
        }

        if !output.status.success() {
            return Err(ToolkitError::TaskFailed {
                task: step.call.task.clone(),
                status: output.status.to_string(),
            });
        }

        if let Some(path) = step
            .outputs
            .iter()
            .filter_map(output_path)
            .find(|path| !Path::new(path).exists())
        {
            return Err(ToolkitError::MissingOutput {
                task: step.call.task.clone(),
                path: path.to_string(),
            });
        }

        let solve = if step.solved_table().is_some() {
            parse_solve_report(&log.join("\n"))
        } else {
            None
        };
        Ok(TaskOutcome { solve, log })
    }
}
