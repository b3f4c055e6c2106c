//! Command Line Interface helpers for meercal

use std::{
    collections::HashMap,
    ffi::OsString,
    fmt::{Debug, Display},
    fs::File,
    io::Write,
    path::PathBuf,
    time::Duration,
};

use clap::{arg, command, ErrorKind::ArgumentNotFound, ValueHint::FilePath};
use itertools::Itertools;
use log::{debug, info, trace};
use prettytable::{format as prettyformat, row, table};

use crate::{
    config::{PipelineConfig, TimeSlices, UnknownCalibratorPolicy},
    error::{
        CLIError::{InvalidCommandLineArgument, NoBackend},
        MeercalError::{self, DryRun},
    },
    pipeline::Pipeline,
    plan::Plan,
    toolkit::{CasaRunner, CasaScript, Toolkit},
};

/// Where the plan is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Write a CASA script to this path
    Script(PathBuf),
    /// Run each step through CASA
    Casa {
        /// The CASA executable
        executable: PathBuf,
        /// Where the one-step scripts are written
        work_dir: PathBuf,
    },
}

impl Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Script(path) => write!(f, "write CASA script to {}", path.display()),
            Backend::Casa {
                executable,
                work_dir,
            } => write!(
                f,
                "run {} with scripts in {}",
                executable.display(),
                work_dir.display()
            ),
        }
    }
}

/// Everything needed for a pipeline run, parsed from the command line.
pub struct MeercalContext {
    /// Pipeline parameters
    pub config: PipelineConfig,
    /// The steps to run
    pub plan: Plan,
    /// Where the plan is sent, `None` only for a dry run
    pub backend: Option<Backend>,
    /// Draw a progress bar
    pub draw_progress: bool,
}

// Add build-time information from the "built" crate.
include!(concat!(env!("OUT_DIR"), "/built.rs"));

/// Write many info-level log lines of how this executable was compiled.
///
/// # Errors
///
/// propagates writeln! fails
pub fn fmt_build_info(f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match (GIT_HEAD_REF, GIT_COMMIT_HASH) {
        (Some(hr), Some(hash)) => {
            let dirty = GIT_DIRTY.unwrap_or(false);
            writeln!(
                f,
                "Compiled on git commit hash: {}{}",
                hash,
                if dirty { " (dirty)" } else { "" }
            )?;
            writeln!(f, "            git head ref: {}", hr)?;
        }
        _ => writeln!(f, "Compiled on git commit hash: <no git info>")?,
    }
    writeln!(f, "            {}", BUILT_TIME_UTC)?;
    writeln!(f, "         with compiler {}", RUSTC_VERSION)?;
    writeln!(f)?;
    Ok(())
}

impl Display for MeercalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} version {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        )?;

        fmt_build_info(f)?;

        let config = &self.config;
        writeln!(f, "Dataset:              {}", config.ms)?;
        writeln!(f, "Target dataset:       {}", config.target_ms)?;
        writeln!(f, "Bandpass calibrator:  {}", config.bpcal)?;
        writeln!(f, "Secondary calibrator: {}", config.pcal)?;
        writeln!(f, "Target:               {}", config.target)?;
        writeln!(f, "Reference antenna:    {}", config.refant)?;
        writeln!(f, "Solve uv range:       {}", config.uvrange)?;
        match config.bpcal_flux_model() {
            Some(model) => writeln!(f, "Flux model:           {:?}", model)?,
            None => writeln!(f, "Will not set a flux scale")?,
        }
        let slices = &config.time_slices;
        if slices.enabled {
            writeln!(
                f,
                "Will image time slices before=[{}] on=[{}] after=[{}]",
                slices.before, slices.on, slices.after
            )?;
        } else {
            writeln!(f, "Will not image time slices")?;
        }
        let selfcal = &config.selfcal;
        if selfcal.enabled {
            writeln!(
                f,
                "Will self-calibrate {} round(s), solint {}",
                selfcal.rounds, selfcal.solint
            )?;
        } else {
            writeln!(f, "Will not self-calibrate")?;
        }
        if let Some(max_fraction) = config.solve_policy.max_flagged_fraction {
            writeln!(
                f,
                "Will {} when more than {:.1}% of solutions are flagged",
                if config.solve_policy.abort_on_failure {
                    "abort"
                } else {
                    "warn"
                },
                max_fraction * 100.0
            )?;
        }
        match &self.backend {
            Some(backend) => writeln!(f, "Will {}", backend)?,
            None => writeln!(f, "No backend selected")?,
        }

        let mut step_table = table!([
            "#",
            "stage",
            "step",
            "task",
            "outputs"
        ]);
        step_table.set_format(*prettyformat::consts::FORMAT_CLEAN);
        for (idx, step) in self.plan.steps.iter().enumerate() {
            step_table.add_row(row![r =>
                idx,
                step.stage,
                step.label,
                step.call.task,
                step.outputs.iter().join(", ")
            ]);
        }
        writeln!(
            f,
            "Steps (total={}, {}):\n{}",
            self.plan.steps.len(),
            self.plan.summary(),
            step_table
        )?;

        Ok(())
    }
}

impl MeercalContext {
    fn get_matches<I, T>(args: I) -> Result<clap::ArgMatches, MeercalError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        let mut app = command!()
            .arg_required_else_help(true)
            .next_line_help(false)
            .about("Calibrate and image MeerKAT L-band visibilities with CASA.")
            .args(&[
                // input options
                arg!(-c --config <PATH> "Config file (toml or json), defaults are used otherwise")
                    .help_heading("INPUT")
                    .value_hint(FilePath)
                    .required(false),
                arg!(--ms <PATH> "Measurement set with calibrators and target")
                    .help_heading("INPUT")
                    .value_hint(FilePath)
                    .required(false),
                arg!(--"target-ms" <PATH> "Measurement set the target is split into")
                    .help_heading("INPUT")
                    .value_hint(FilePath)
                    .required(false),

                // field options
                arg!(--bpcal <FIELD> "Bandpass and flux calibrator field")
                    .help_heading("FIELDS")
                    .required(false),
                arg!(--pcal <FIELD> "Secondary calibrator field")
                    .help_heading("FIELDS")
                    .required(false),
                arg!(--target <FIELD> "Target field")
                    .help_heading("FIELDS")
                    .required(false),
                arg!(--"skip-unknown-flux-cal" "Continue without a flux scale when the bandpass calibrator has no known model")
                    .help_heading("FIELDS"),

                // calibration options
                arg!(--refant <ANTENNA> "Reference antenna")
                    .help_heading("CALIBRATION")
                    .required(false),
                arg!(--uvrange <RANGE> "Baselines used for gain and bandpass solves, e.g. >150m")
                    .help_heading("CALIBRATION")
                    .required(false),
                arg!(--"max-flagged-fraction" <FRAC> "Reject solves which flag more than <FRAC> of solutions")
                    .help_heading("CALIBRATION")
                    .required(false),
                arg!(--"no-abort-on-solve-failure" "Warn instead of aborting when a solve is rejected")
                    .help_heading("CALIBRATION"),

                // imaging options
                arg!(--"time-slices" "Time ranges to image before, during and after the event")
                    .help_heading("IMAGING")
                    .value_names(&["BEFORE", "ON", "AFTER"])
                    .required(false),
                arg!(--"no-time-slices" "Do not image time slices")
                    .help_heading("IMAGING")
                    .conflicts_with("time-slices"),
                arg!(--"no-selfcal" "Do not self-calibrate the target")
                    .help_heading("IMAGING"),

                // output options
                arg!(-S --"script-out" <PATH> "Write a CASA script to <PATH> instead of running CASA")
                    .help_heading("OUTPUT")
                    .value_hint(FilePath)
                    .required(false),
                arg!(--casa <EXE> "Run each step with this CASA executable")
                    .help_heading("OUTPUT")
                    .value_hint(FilePath)
                    .required(false)
                    .conflicts_with("script-out"),
                arg!(--"work-dir" <DIR> "Where to write the per-step scripts for --casa")
                    .help_heading("OUTPUT")
                    .required(false),
                arg!(--"save-config" <PATH> "Save the configuration of this run as toml")
                    .help_heading("OUTPUT")
                    .value_hint(FilePath)
                    .required(false),
                arg!(--"dry-run" "Just print the summary and exit"),
                arg!(--"no-draw-progress" "do not show progress bars"),
            ]);
        let matches = app.try_get_matches_from_mut(args)?;
        Ok(matches)
    }

    fn parse_config_matches(matches: &clap::ArgMatches) -> Result<PipelineConfig, MeercalError> {
        let mut config = match matches.value_of("config") {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };

        for (option, field) in [
            ("ms", &mut config.ms),
            ("target-ms", &mut config.target_ms),
            ("bpcal", &mut config.bpcal),
            ("pcal", &mut config.pcal),
            ("target", &mut config.target),
            ("refant", &mut config.refant),
            ("uvrange", &mut config.uvrange),
        ] {
            if let Some(value) = matches.value_of(option) {
                *field = value.into();
            }
        }

        if matches.is_present("skip-unknown-flux-cal") {
            config.unknown_flux_calibrator = UnknownCalibratorPolicy::Skip;
        }

        match matches.values_of("time-slices") {
            Some(values) => {
                let values: Vec<&str> = values.collect();
                let (before, on, after) = match values.as_slice() {
                    [before, on, after] => (before, on, after),
                    _ => unreachable!("--time-slices takes 3 values, enforced by clap"),
                };
                config.time_slices = TimeSlices {
                    enabled: true,
                    before: before.to_string(),
                    on: on.to_string(),
                    after: after.to_string(),
                    spw: config.time_slices.spw,
                };
            }
            None if matches.is_present("no-time-slices") => config.time_slices.enabled = false,
            None => {}
        }
        if matches.is_present("no-selfcal") {
            config.selfcal.enabled = false;
        }

        match matches.value_of_t::<f64>("max-flagged-fraction") {
            Err(err) if err.kind() != ArgumentNotFound => return Err(err.into()),
            Ok(fraction) => {
                if !(0.0..=1.0).contains(&fraction) {
                    return Err(MeercalError::CLIError(InvalidCommandLineArgument {
                        option: "--max-flagged-fraction <FRAC>".into(),
                        expected: "a fraction between 0 and 1".into(),
                        received: format!("{}", fraction),
                    }));
                }
                config.solve_policy.max_flagged_fraction = Some(fraction);
            }
            Err(_) => {}
        }
        if matches.is_present("no-abort-on-solve-failure") {
            config.solve_policy.abort_on_failure = false;
        }

        Ok(config)
    }

    fn parse_backend_matches(matches: &clap::ArgMatches) -> Result<Option<Backend>, MeercalError> {
        let work_dir = matches.value_of("work-dir");
        let casa = matches.value_of("casa");
        if let (Some(dir), None) = (work_dir, casa) {
            return Err(MeercalError::CLIError(InvalidCommandLineArgument {
                option: "--work-dir <DIR>".into(),
                expected: "--casa <EXE> to be given too".into(),
                received: dir.into(),
            }));
        }
        match (matches.value_of("script-out"), casa) {
            (Some(_), Some(_)) => {
                unreachable!("--casa conflicts with --script-out, enforced by clap")
            }
            (Some(path), None) => Ok(Some(Backend::Script(path.into()))),
            (None, Some(executable)) => Ok(Some(Backend::Casa {
                executable: executable.into(),
                work_dir: work_dir.map_or_else(|| std::env::temp_dir().join("meercal"), Into::into),
            })),
            (None, None) => Ok(None),
        }
    }

    /// Parse an iterator of arguments, `args` into a `MeercalContext`.
    ///
    /// # Errors
    ///
    /// Can raise:
    /// - `clap::Error` if clap cannot parse `args`
    /// - [`MeercalError::Config`] if the config file can't be read or a value is invalid
    /// - [`MeercalError::CLIError`] if the arguments are invalid, or no backend is selected
    /// - [`MeercalError::UnknownFluxCalibrator`] if the plan can't be built
    /// - [`MeercalError::DryRun`] if `--dry-run` was given
    pub fn from_args<I, T>(args: I) -> Result<Self, MeercalError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        debug!("args:\n{:?}", &args);

        let matches = Self::get_matches(args)?;
        trace!("arg matches:\n{:?}", &matches);

        let config = Self::parse_config_matches(&matches)?;
        let plan = Plan::build(&config)?;
        let backend = Self::parse_backend_matches(&matches)?;

        if let Some(path) = matches.value_of("save-config") {
            let mut file = File::create(path)?;
            file.write_all(config.to_toml()?.as_bytes())?;
            info!("saved config to {}", path);
        }

        let result = Self {
            config,
            plan,
            backend,
            draw_progress: !matches.is_present("no-draw-progress"),
        };

        info!("{}", &result);

        if matches.is_present("dry-run") {
            return Err(DryRun {});
        }
        if result.backend.is_none() {
            return Err(MeercalError::CLIError(NoBackend {
                options: "--script-out <PATH>, --casa <EXE>".into(),
            }));
        }

        Ok(result)
    }

    /// Send the plan to the selected backend.
    ///
    /// # Errors
    ///
    /// can raise:
    /// - [`MeercalError::CLIError`] if there is no backend
    /// - any error of [`Pipeline::run`]
    pub fn run(self) -> Result<HashMap<String, Duration>, MeercalError> {
        let MeercalContext {
            config,
            plan,
            backend,
            draw_progress,
        } = self;

        let mut toolkit: Box<dyn Toolkit> = match backend {
            Some(Backend::Script(path)) => Box::new(CasaScript::new(path)),
            Some(Backend::Casa {
                executable,
                work_dir,
            }) => Box::new(CasaRunner::new(executable, work_dir)),
            None => {
                return Err(MeercalError::CLIError(NoBackend {
                    options: "--script-out <PATH>, --casa <EXE>".into(),
                }))
            }
        };

        Pipeline::new(plan, config.solve_policy)
            .with_progress(draw_progress)
            .run(toolkit.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use tempfile::tempdir;

    use super::*;
    use crate::Stage;

    #[test]
    fn test_meercal_context_display_doesnt_crash() {
        let tmp_dir = tempdir().unwrap();
        let script_path = tmp_dir.path().join("reduce.py");

        #[rustfmt::skip]
        let args = vec![
            "meercal",
            "--bpcal", "J1939-6342",
            "--max-flagged-fraction", "0.25",
            "-S", script_path.to_str().unwrap(),
        ];

        let meercal_ctx = MeercalContext::from_args(&args).unwrap();
        assert_eq!(meercal_ctx.config.bpcal, "J1939-6342");
        assert_eq!(
            meercal_ctx.backend,
            Some(Backend::Script(script_path.clone()))
        );

        let display = format!("{}", &meercal_ctx);
        assert!(display.contains("meercal version"));
        assert!(display.contains("Stevens-Reynolds 2016"));
        assert!(display.contains("Will abort when more than 25.0% of solutions are flagged"));
        assert!(display.contains("J1337-28_full.fits"));
        assert!(display.contains("Will write CASA script to"));
    }

    #[test]
    fn test_run_writes_script() {
        let tmp_dir = tempdir().unwrap();
        let script_path = tmp_dir.path().join("reduce.py");

        #[rustfmt::skip]
        let args = vec![
            "meercal",
            "--no-draw-progress",
            "--script-out", script_path.to_str().unwrap(),
        ];

        let durations = MeercalContext::from_args(&args).unwrap().run().unwrap();
        assert!(durations.contains_key("imaging"));
        let script = read_to_string(&script_path).unwrap();
        assert!(script.contains("setjy(vis='FRB19_cut.ms',field='J0408-6545',standard='manual'"));
    }

    #[test]
    fn test_save_config_with_dry_run() {
        let tmp_dir = tempdir().unwrap();
        let config_path = tmp_dir.path().join("run.toml");

        #[rustfmt::skip]
        let args = vec![
            "meercal",
            "--target", "J0000-00",
            "--no-selfcal",
            "--no-time-slices",
            "--save-config", config_path.to_str().unwrap(),
            "--dry-run",
        ];

        assert!(matches!(MeercalContext::from_args(&args), Err(DryRun {})));
        let saved = PipelineConfig::from_file(&config_path).unwrap();
        assert_eq!(saved.target, "J0000-00");
        assert!(!saved.selfcal.enabled);
        assert!(!saved.time_slices.enabled);

        #[rustfmt::skip]
        let args = vec![
            "meercal",
            "-c", config_path.to_str().unwrap(),
            "-S", "reduce.py",
        ];
        let meercal_ctx = MeercalContext::from_args(&args).unwrap();
        assert_eq!(meercal_ctx.config, saved);
        assert_eq!(meercal_ctx.plan.steps_in(Stage::SelfCal).count(), 0);
        assert_eq!(meercal_ctx.plan.count_task("immath"), 0);
    }

    #[test]
    fn test_casa_backend() {
        #[rustfmt::skip]
        let args = vec![
            "meercal",
            "--casa", "/opt/casa/bin/casa",
            "--work-dir", "/tmp/meercal-steps",
        ];
        let meercal_ctx = MeercalContext::from_args(&args).unwrap();
        assert_eq!(
            meercal_ctx.backend,
            Some(Backend::Casa {
                executable: "/opt/casa/bin/casa".into(),
                work_dir: "/tmp/meercal-steps".into(),
            })
        );
    }

    #[test]
    fn test_time_slice_overrides() {
        #[rustfmt::skip]
        let args = vec![
            "meercal",
            "--time-slices", "10:00:00~10:00:08", "10:00:08~10:00:16", "10:00:16~10:00:24",
            "-S", "reduce.py",
        ];
        let meercal_ctx = MeercalContext::from_args(&args).unwrap();
        let slices = meercal_ctx.config.time_slices;
        assert!(slices.enabled);
        assert_eq!(slices.on, "10:00:08~10:00:16");
        assert_eq!(slices.spw, "");

        #[rustfmt::skip]
        let args = vec![
            "meercal",
            "--no-time-slices",
            "--no-selfcal",
            "-S", "reduce.py",
        ];
        let meercal_ctx = MeercalContext::from_args(&args).unwrap();
        assert!(!meercal_ctx.config.time_slices.enabled);
        assert_eq!(meercal_ctx.plan.stages().last(), Some(&Stage::Imaging));
    }
}
