//! The ordered list of toolkit calls which make up a pipeline run.
//!
//! [`Plan::build`] turns a [`PipelineConfig`] into [`Step`]s. Each step
//! declares the [`Artifact`]s it reads and writes, so [`Plan::validate`] can
//! check that nothing is used before it exists.

use std::fmt::Display;

use itertools::Itertools;
use log::{debug, warn};

use crate::{
    calibration::{ApplySpec, CalKind, CalMode, CalTable, Interp, PriorTable, SolveSpec},
    config::{PipelineConfig, UnknownCalibratorPolicy},
    constants::{FLAGS_BASIC, FLAGS_BPCAL_RESIDUAL, FLAGS_PCAL_RESIDUAL, FLAGS_REFCAL_FULL},
    context::{Artifact, PipelineContext},
    error::MeercalError,
    flags::{
        clip_minmax, clip_zeros, flag_autocorr, flag_field_sequence, flag_frequencies,
        flag_statistical, save_flag_version, FlagColumn, FlagMode,
    },
    imaging::{difference, export_tt0, exportfits, fits_name, split_field, tclean},
    task::{TaskCall, TaskValue},
};

/// A group of steps with one purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Static flagging of the raw data
    Flagging,
    /// Setting the flux scale of the bandpass calibrator
    FluxModel,
    /// Statistical flagging of the calibrator fields
    CalibratorFlagging,
    /// Initial delay, gain and bandpass solves
    Solve0,
    /// Delay, gain and bandpass solves after residual flagging
    Solve1,
    /// Secondary calibrator solves
    Solve2,
    /// Final secondary calibrator solves
    Solve3,
    /// Correcting the target field
    ApplyTarget,
    /// Splitting the target into its own dataset
    Split,
    /// Statistical flagging of the target
    TargetFlagging,
    /// Deconvolution of the target
    Imaging,
    /// Time slice difference images
    Difference,
    /// Self-calibration of the target
    SelfCal,
}

impl Stage {
    /// A short human readable name
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Flagging => "flagging",
            Stage::FluxModel => "flux model",
            Stage::CalibratorFlagging => "calibrator flagging",
            Stage::Solve0 => "solve 0",
            Stage::Solve1 => "solve 1",
            Stage::Solve2 => "solve 2",
            Stage::Solve3 => "solve 3",
            Stage::ApplyTarget => "apply target",
            Stage::Split => "split",
            Stage::TargetFlagging => "target flagging",
            Stage::Imaging => "imaging",
            Stage::Difference => "difference",
            Stage::SelfCal => "self-cal",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One toolkit call, and the artifacts it reads and writes.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// The stage this step belongs to
    pub stage: Stage,
    /// Human readable description, unique within a plan
    pub label: String,
    /// The call to make
    pub call: TaskCall,
    /// Artifacts which must exist before the call
    pub inputs: Vec<Artifact>,
    /// Artifacts which exist after the call
    pub outputs: Vec<Artifact>,
}

impl Step {
    fn new(stage: Stage, label: impl Into<String>, call: TaskCall) -> Self {
        Self {
            stage,
            label: label.into(),
            call,
            inputs: vec![],
            outputs: vec![],
        }
    }

    fn reads<I: IntoIterator<Item = Artifact>>(mut self, artifacts: I) -> Self {
        for artifact in artifacts {
            if !self.inputs.contains(&artifact) {
                self.inputs.push(artifact);
            }
        }
        self
    }

    fn writes<I: IntoIterator<Item = Artifact>>(mut self, artifacts: I) -> Self {
        self.outputs.extend(artifacts);
        self
    }

    /// The calibration table this step solves for, if it is a solve.
    pub fn solved_table(&self) -> Option<&str> {
        match self.call.task.as_str() {
            "gaincal" | "bandpass" => self.call.get_str("caltable"),
            _ => None,
        }
    }

    /// Whether the step appends to an existing table.
    pub fn appends(&self) -> bool {
        self.call.get("append").and_then(TaskValue::as_bool) == Some(true)
    }
}

/// The artifact for corrected visibilities of `field` in `vis`.
pub fn corrected(vis: &str, field: &str) -> Artifact {
    Artifact::Corrected(format!("{vis}:{field}"))
}

fn table_artifact(table: &CalTable) -> Artifact {
    Artifact::CalTable(table.name.clone())
}

fn prior_artifacts(priors: &[PriorTable]) -> Vec<Artifact> {
    priors
        .iter()
        .map(|prior| Artifact::CalTable(prior.table.clone()))
        .collect()
}

/// The stage calibration tables of a run.
struct Tables {
    k: [CalTable; 4],
    g: [CalTable; 4],
    b: [CalTable; 2],
}

impl Tables {
    fn new(ms: &str, tag: &str) -> Self {
        let table = |kind, stage| CalTable::stage(ms, tag, kind, stage);
        Self {
            k: [0, 1, 2, 3].map(|n| table(CalKind::Delay, n)),
            g: [0, 1, 2, 3].map(|n| table(CalKind::Gain, n)),
            b: [0, 1].map(|n| table(CalKind::Bandpass, n)),
        }
    }
}

struct PlanBuilder<'a> {
    config: &'a PipelineConfig,
    tables: Tables,
    steps: Vec<Step>,
    flux_scale: Option<Artifact>,
    /// The image whose model was last saved into the target dataset
    model: Option<Artifact>,
}

impl<'a> PlanBuilder<'a> {
    fn new(config: &'a PipelineConfig) -> Self {
        Self {
            tables: Tables::new(&config.ms, &config.table_tag),
            config,
            steps: vec![],
            flux_scale: None,
            model: None,
        }
    }

    fn ms(&self) -> Artifact {
        Artifact::Dataset(self.config.ms.clone())
    }

    fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// A solve on the calibrator dataset, reading the dataset, the flux scale
    /// and all priors, plus its own table when appending.
    fn solve(&mut self, stage: Stage, spec: SolveSpec) {
        let mut inputs = vec![self.ms()];
        inputs.extend(self.flux_scale.clone());
        inputs.extend(prior_artifacts(&spec.priors));
        if spec.append {
            inputs.push(table_artifact(&spec.table));
        }
        let label = format!(
            "solve {} on {}{}",
            spec.table.name,
            spec.field,
            if spec.append { " (append)" } else { "" }
        );
        let step = Step::new(stage, label, spec.to_call())
            .reads(inputs)
            .writes([table_artifact(&spec.table)]);
        self.push(step);
    }

    fn apply(&mut self, stage: Stage, spec: ApplySpec) {
        let label = format!(
            "apply {} to {}",
            spec.tables.iter().map(|prior| &prior.table).join(", "),
            spec.field
        );
        let mut inputs = vec![Artifact::Dataset(spec.vis.clone())];
        inputs.extend(prior_artifacts(&spec.tables));
        let output = corrected(&spec.vis, &spec.field);
        self.push(
            Step::new(stage, label, spec.to_call())
                .reads(inputs)
                .writes([output]),
        );
    }

    fn save_flags(&mut self, stage: Stage, version: &str, after: Option<Artifact>) {
        let step = Step::new(
            stage,
            format!("save flags {version}"),
            save_flag_version(&self.config.ms, version),
        )
        .reads([self.ms()])
        .reads(after)
        .writes([Artifact::FlagVersion(version.to_string())]);
        self.push(step);
    }

    /// rflag and tfcrop on the residual of an already corrected field.
    fn flag_residual(&mut self, stage: Stage, field: &str) {
        let source = corrected(&self.config.ms, field);
        for mode in [FlagMode::Rflag, FlagMode::Tfcrop] {
            let call = flag_statistical(&self.config.ms, mode, FlagColumn::Residual, Some(field));
            self.push(
                Step::new(stage, format!("{} residual of {}", mode.as_str(), field), call)
                    .reads([source.clone()]),
            );
        }
    }

    /// tfcrop and rflag on the solutions of a bandpass table.
    fn flag_table(&mut self, stage: Stage, table: &CalTable) {
        for mode in [FlagMode::Tfcrop, FlagMode::Rflag] {
            let call = flag_statistical(&table.name, mode, FlagColumn::Cparam, None);
            self.push(
                Step::new(stage, format!("{} {}", mode.as_str(), table.name), call)
                    .reads([table_artifact(table)]),
            );
        }
    }

    fn flag_field(&mut self, stage: Stage, vis: &str, field: &str) {
        let dataset = Artifact::Dataset(vis.to_string());
        for call in flag_field_sequence(vis, field, self.config.grow_time, self.config.grow_freq) {
            let label = format!(
                "{} {}",
                call.get_str("mode").unwrap_or(&call.task),
                field
            );
            self.push(Step::new(stage, label, call).reads([dataset.clone()]));
        }
    }

    fn flagging(&mut self) {
        let stage = Stage::Flagging;
        let config = self.config;
        let ms = &config.ms;
        let calls = [
            ("flag band edges", flag_frequencies(ms, &config.band_edges, None)),
            (
                "flag RFI on short baselines",
                flag_frequencies(ms, &config.rfi_ranges, Some(config.rfi_uvrange.as_str())),
            ),
            ("flag autocorrelations", flag_autocorr(ms)),
            ("clip zeros", clip_zeros(ms)),
            (
                "clip amplitudes",
                clip_minmax(ms, config.clip_range[0], config.clip_range[1]),
            ),
        ];
        for (label, call) in calls {
            self.push(Step::new(stage, label, call).reads([self.ms()]));
        }
        self.save_flags(stage, FLAGS_BASIC, None);
    }

    fn flux_model(&mut self) -> Result<(), MeercalError> {
        let config = self.config;
        match config.bpcal_flux_model() {
            Some(model) => {
                let scale = Artifact::FluxScale(config.bpcal.clone());
                let step = Step::new(
                    Stage::FluxModel,
                    format!("set flux scale of {}", config.bpcal),
                    model.setjy(&config.ms, &config.bpcal),
                )
                .reads([self.ms()])
                .writes([scale.clone()]);
                self.push(step);
                self.flux_scale = Some(scale);
            }
            None => match config.unknown_flux_calibrator {
                UnknownCalibratorPolicy::Abort => {
                    return Err(MeercalError::UnknownFluxCalibrator {
                        field: config.bpcal.clone(),
                    })
                }
                UnknownCalibratorPolicy::Skip => {
                    warn!(
                        "No flux model is known for {}, its flux scale will not be set",
                        config.bpcal
                    );
                }
            },
        }
        Ok(())
    }

    fn calibrator_flagging(&mut self) {
        let config = self.config;
        for field in [&config.bpcal, &config.pcal] {
            self.flag_field(Stage::CalibratorFlagging, &config.ms, field);
        }
    }

    /// A solve on the bandpass calibrator with the settings shared by every
    /// calibrator solve.
    fn calibrator_spec(&self, field: &str, table: &CalTable, priors: Vec<PriorTable>) -> SolveSpec {
        SolveSpec {
            vis: self.config.ms.clone(),
            field: field.to_string(),
            table: table.clone(),
            refant: self.config.refant.clone(),
            priors,
            ..SolveSpec::default()
        }
    }

    fn delay_spec(&self, field: &str, table: &CalTable, priors: Vec<PriorTable>) -> SolveSpec {
        self.calibrator_spec(field, table, priors)
    }

    fn phase_spec(&self, table: &CalTable, priors: Vec<PriorTable>) -> SolveSpec {
        SolveSpec {
            uvrange: Some(self.config.uvrange.clone()),
            calmode: Some(CalMode::Phase),
            minsnr: Some(5.0),
            ..self.calibrator_spec(&self.config.bpcal, table, priors)
        }
    }

    fn bandpass_spec(&self, table: &CalTable, priors: Vec<PriorTable>) -> SolveSpec {
        SolveSpec {
            uvrange: Some(self.config.uvrange.clone()),
            combine: Some(String::new()),
            solnorm: Some(false),
            minblperant: Some(4),
            minsnr: Some(3.0),
            fillgaps: Some(self.config.gapfill),
            ..self.calibrator_spec(&self.config.bpcal, table, priors)
        }
    }

    fn amp_phase_spec(&self, field: &str, table: &CalTable, priors: Vec<PriorTable>, append: bool) -> SolveSpec {
        SolveSpec {
            uvrange: Some(self.config.uvrange.clone()),
            solnorm: Some(false),
            combine: Some(String::new()),
            minsnr: Some(3.0),
            calmode: Some(CalMode::AmpPhase),
            append,
            ..self.calibrator_spec(field, table, priors)
        }
    }

    fn apply_bpcal(&mut self, stage: Stage, tables: [&CalTable; 3]) {
        let bpcal = &self.config.bpcal;
        let spec = ApplySpec {
            vis: self.config.ms.clone(),
            field: bpcal.clone(),
            tables: tables
                .iter()
                .map(|table| table.prior(bpcal, Interp::Nearest))
                .collect(),
            ..ApplySpec::default()
        };
        self.apply(stage, spec);
    }

    /// Delay, phase and bandpass solves on the bandpass calibrator, then
    /// flagging of the bandpass solutions and a correction of the calibrator.
    fn bandpass_stage(&mut self, stage: Stage, n: usize) {
        let bpcal = self.config.bpcal.clone();
        let near = |table: &CalTable| table.prior(&bpcal, Interp::Nearest);
        let k = self.tables.k[n].clone();
        let g = self.tables.g[n].clone();
        let b = self.tables.b[n].clone();

        let (k_priors, g_priors) = if n == 0 {
            (vec![], vec![near(&k)])
        } else {
            let b_prev = &self.tables.b[n - 1];
            let g_prev = &self.tables.g[n - 1];
            (vec![near(b_prev), near(g_prev)], vec![near(&k), near(b_prev)])
        };
        let k_spec = self.delay_spec(&bpcal, &k, k_priors);
        self.solve(stage, k_spec);
        let g_spec = self.phase_spec(&g, g_priors);
        self.solve(stage, g_spec);
        let b_spec = self.bandpass_spec(&b, vec![near(&k), near(&g)]);
        self.solve(stage, b_spec);
        self.flag_table(stage, &b);
        self.apply_bpcal(stage, [&k, &g, &b]);
    }

    fn solve0(&mut self) {
        let stage = Stage::Solve0;
        self.bandpass_stage(stage, 0);
        let bpcal = self.config.bpcal.clone();
        self.flag_residual(stage, &bpcal);
        self.save_flags(stage, FLAGS_BPCAL_RESIDUAL, None);
    }

    fn solve1(&mut self) {
        self.bandpass_stage(Stage::Solve1, 1);
    }

    /// Amplitude and phase gains on both calibrators, then delays on the
    /// secondary appended to a copy of the stage 1 delays, and a correction
    /// of the secondary.
    ///
    /// `k_prior` is the delay table pre-applied to the gain solves.
    fn secondary_stage(&mut self, stage: Stage, n: usize, k_prior: &CalTable) {
        let config = self.config;
        let (bpcal, pcal) = (config.bpcal.as_str(), config.pcal.as_str());
        let k1 = self.tables.k[1].clone();
        let g1 = self.tables.g[1].clone();
        let b1 = self.tables.b[1].clone();
        let k = self.tables.k[n].clone();
        let g = self.tables.g[n].clone();

        let primary = self.amp_phase_spec(
            bpcal,
            &g,
            vec![
                k_prior.prior(bpcal, Interp::Nearest),
                g1.prior(bpcal, Interp::Nearest),
                b1.prior(bpcal, Interp::Nearest),
            ],
            false,
        );
        self.solve(stage, primary);

        let copy = Step::new(
            stage,
            format!("copy {} to {}", k1.name, k.name),
            TaskCall::copytree(&k1.name, &k.name),
        )
        .reads([table_artifact(&k1)])
        .writes([table_artifact(&k)]);
        self.push(copy);

        let secondary = SolveSpec {
            minblperant: Some(4),
            ..self.amp_phase_spec(
                pcal,
                &g,
                vec![
                    k_prior.prior(bpcal, Interp::Nearest),
                    g1.prior(bpcal, Interp::Linear),
                    b1.prior(bpcal, Interp::Linear),
                ],
                true,
            )
        };
        self.solve(stage, secondary);

        let delay_interp = if n == 2 { Interp::Nearest } else { Interp::Linear };
        let delays = SolveSpec {
            append: true,
            ..self.delay_spec(
                pcal,
                &k,
                vec![
                    g1.prior(bpcal, delay_interp),
                    b1.prior(bpcal, Interp::Linear),
                    g.prior(pcal, Interp::Linear),
                ],
            )
        };
        self.solve(stage, delays);

        let apply = ApplySpec {
            vis: config.ms.clone(),
            field: pcal.to_string(),
            tables: vec![
                k.prior("", Interp::Nearest),
                g1.prior("", Interp::Linear),
                b1.prior(bpcal, Interp::Linear),
                g.prior(pcal, Interp::Linear),
            ],
            ..ApplySpec::default()
        };
        self.apply(stage, apply);
    }

    fn solve2(&mut self) {
        let stage = Stage::Solve2;
        let k1 = self.tables.k[1].clone();
        self.secondary_stage(stage, 2, &k1);
        let pcal = self.config.pcal.clone();
        self.flag_residual(stage, &pcal);
        self.save_flags(stage, FLAGS_PCAL_RESIDUAL, None);
    }

    fn solve3(&mut self) {
        let k2 = self.tables.k[2].clone();
        self.secondary_stage(Stage::Solve3, 3, &k2);
    }

    fn apply_target(&mut self) {
        let stage = Stage::ApplyTarget;
        let config = self.config;
        let (bpcal, pcal) = (config.bpcal.as_str(), config.pcal.as_str());
        let spec = ApplySpec {
            vis: config.ms.clone(),
            field: config.target.clone(),
            tables: vec![
                self.tables.k[3].prior("", Interp::Nearest),
                self.tables.g[1].prior(bpcal, Interp::Linear),
                self.tables.b[1].prior(bpcal, Interp::Linear),
                self.tables.g[3].prior(pcal, Interp::Linear),
            ],
            ..ApplySpec::default()
        };
        self.apply(stage, spec);
        let target = corrected(&config.ms, &config.target);
        self.save_flags(stage, FLAGS_REFCAL_FULL, Some(target));
    }

    fn split(&mut self) {
        let config = self.config;
        let step = Step::new(
            Stage::Split,
            format!("split {} to {}", config.target, config.target_ms),
            split_field(&config.ms, &config.target_ms, &config.target),
        )
        .reads([corrected(&config.ms, &config.target)])
        .writes([Artifact::Dataset(config.target_ms.clone())]);
        self.push(step);
        self.flag_field(Stage::TargetFlagging, &config.target_ms, &config.target);
    }

    /// Deconvolve `name` from the target dataset, then export it.
    fn image(&mut self, stage: Stage, name: &str, spw: &str, timerange: &str, source: Vec<Artifact>) {
        let config = self.config;
        let image = Artifact::Image(name.to_string());
        self.push(
            Step::new(
                stage,
                format!("image {name}"),
                tclean(&config.target_ms, name, spw, timerange, &config.imaging),
            )
            .reads([Artifact::Dataset(config.target_ms.clone())])
            .reads(source)
            .writes([image.clone()]),
        );
        if config.imaging.savemodel != "none" {
            self.model = Some(image.clone());
        }
        self.push(
            Step::new(stage, format!("export {name}"), export_tt0(name))
                .reads([image])
                .writes([Artifact::Fits(fits_name(name))]),
        );
    }

    fn imaging(&mut self) {
        let config = self.config;
        let target = &config.target;
        self.image(Stage::Imaging, &format!("{target}_full"), "", "", vec![]);

        let slices = &config.time_slices;
        if !slices.enabled {
            return;
        }
        for (suffix, timerange) in [
            ("before", &slices.before),
            ("on", &slices.on),
            ("after", &slices.after),
        ] {
            let name = format!("{target}_{suffix}");
            self.image(Stage::Imaging, &name, &slices.spw, timerange, vec![]);
        }

        let on = fits_name(&format!("{target}_on"));
        for other in ["before", "after"] {
            let other_fits = fits_name(&format!("{target}_{other}"));
            let outfile = format!("on-{other}");
            self.push(
                Step::new(
                    Stage::Difference,
                    format!("subtract {other_fits} from {on}"),
                    difference(&on, &other_fits, &outfile),
                )
                .reads([Artifact::Fits(on.clone()), Artifact::Fits(other_fits)])
                .writes([Artifact::Image(outfile.clone())]),
            );
            self.push(
                Step::new(
                    Stage::Difference,
                    format!("export {outfile}"),
                    exportfits(&outfile, &fits_name(&outfile)),
                )
                .reads([Artifact::Image(outfile.clone())])
                .writes([Artifact::Fits(fits_name(&outfile))]),
            );
        }
    }

    /// Each round solves phases against the model saved by the last image,
    /// applies them and re-images.
    fn selfcal(&mut self) {
        let config = self.config;
        let selfcal = &config.selfcal;
        if !selfcal.enabled {
            return;
        }
        let stage = Stage::SelfCal;
        let target_ms = &config.target_ms;
        for round in 0..selfcal.rounds {
            let table = CalTable::selfcal(target_ms, round);
            let spec = SolveSpec {
                vis: target_ms.clone(),
                field: selfcal.field.clone(),
                table: table.clone(),
                refant: config.refant.clone(),
                uvrange: Some(config.uvrange.clone()),
                solint: selfcal.solint.clone(),
                calmode: Some(CalMode::Phase),
                minsnr: Some(selfcal.minsnr),
                solnorm: Some(false),
                combine: Some(String::new()),
                ..SolveSpec::default()
            };
            self.push(
                Step::new(stage, format!("solve {}", table.name), spec.to_call())
                    .reads([Artifact::Dataset(target_ms.clone())])
                    .reads(self.model.clone())
                    .writes([table_artifact(&table)]),
            );
            self.apply(
                stage,
                ApplySpec {
                    vis: target_ms.clone(),
                    field: selfcal.field.clone(),
                    tables: vec![table.prior(&selfcal.field, Interp::Nearest)],
                    calwt: Some(false),
                    applymode: Some("calonly".into()),
                },
            );
            let name = format!("{}selfcal{}_full", config.target, round);
            self.image(
                stage,
                &name,
                "",
                "",
                vec![corrected(target_ms, &selfcal.field)],
            );
        }
    }

    fn build(mut self) -> Result<Vec<Step>, MeercalError> {
        self.flagging();
        self.flux_model()?;
        self.calibrator_flagging();
        self.solve0();
        self.solve1();
        self.solve2();
        self.solve3();
        self.apply_target();
        self.split();
        self.imaging();
        self.selfcal();
        Ok(self.steps)
    }
}

/// A validated, ordered list of steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// The raw dataset the plan starts from
    pub dataset: String,
    /// Steps in execution order
    pub steps: Vec<Step>,
}

impl Plan {
    /// Build and validate the plan for `config`.
    ///
    /// # Errors
    ///
    /// - [`MeercalError::Config`] if the config is invalid
    /// - [`MeercalError::UnknownFluxCalibrator`] if the bandpass calibrator
    ///   has no flux model and the policy is to abort
    /// - [`MeercalError::MissingArtifact`] if a step reads something no
    ///   earlier step writes
    pub fn build(config: &PipelineConfig) -> Result<Self, MeercalError> {
        config.validate()?;
        let plan = Self {
            dataset: config.ms.clone(),
            steps: PlanBuilder::new(config).build()?,
        };
        plan.validate()?;
        debug!(
            "planned {} steps over {} stages",
            plan.steps.len(),
            plan.stages().len()
        );
        Ok(plan)
    }

    /// A context holding only the raw dataset.
    pub fn seed_context(&self) -> PipelineContext {
        let mut context = PipelineContext::new();
        context.seed(Artifact::Dataset(self.dataset.clone()));
        context
    }

    /// Replay the steps, checking every input was written by an earlier step.
    ///
    /// # Errors
    ///
    /// Returns [`MeercalError::MissingArtifact`] for the first input which
    /// is read before it is written.
    pub fn validate(&self) -> Result<PipelineContext, MeercalError> {
        let mut context = self.seed_context();
        for step in &self.steps {
            for input in &step.inputs {
                context.require(&step.label, input)?;
            }
            for output in &step.outputs {
                context.produce(&step.label, output.clone(), &step.inputs);
            }
        }
        Ok(context)
    }

    /// The stages of the plan, in order.
    pub fn stages(&self) -> Vec<Stage> {
        self.steps.iter().map(|step| step.stage).dedup().collect()
    }

    /// Every artifact written, in the order first written.
    pub fn outputs(&self) -> Vec<Artifact> {
        self.steps
            .iter()
            .flat_map(|step| step.outputs.iter().cloned())
            .unique()
            .collect()
    }

    /// Names of every calibration table written.
    pub fn table_names(&self) -> Vec<String> {
        self.outputs()
            .into_iter()
            .filter_map(|artifact| match artifact {
                Artifact::CalTable(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Names of every flag version saved.
    pub fn flag_versions(&self) -> Vec<String> {
        self.outputs()
            .into_iter()
            .filter_map(|artifact| match artifact {
                Artifact::FlagVersion(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Paths of every FITS file exported.
    pub fn fits_outputs(&self) -> Vec<String> {
        self.outputs()
            .into_iter()
            .filter_map(|artifact| match artifact {
                Artifact::Fits(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    /// Steps that belong to `stage`.
    pub fn steps_in(&self, stage: Stage) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(move |step| step.stage == stage)
    }

    /// Number of steps calling `task`.
    pub fn count_task(&self, task: &str) -> usize {
        self.steps.iter().filter(|step| step.call.task == task).count()
    }

    /// One line per stage with its step count, for logging.
    pub fn summary(&self) -> String {
        self.stages()
            .into_iter()
            .map(|stage| format!("{}: {}", stage, self.steps_in(stage).count()))
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{SelfCalConfig, TimeSlices},
        flux::FluxModel,
    };

    fn default_plan() -> Plan {
        Plan::build(&PipelineConfig::default()).unwrap()
    }

    fn find<'a>(plan: &'a Plan, label: &str) -> &'a Step {
        plan.steps
            .iter()
            .find(|step| step.label == label)
            .unwrap_or_else(|| panic!("no step labelled {label}"))
    }

    #[test]
    fn test_default_plan_is_valid() {
        let plan = default_plan();
        let context = plan.validate().unwrap();
        assert!(context.is_produced(&Artifact::Fits("J1337-28selfcal0_full.fits".into())));
        assert_eq!(
            plan.stages(),
            vec![
                Stage::Flagging,
                Stage::FluxModel,
                Stage::CalibratorFlagging,
                Stage::Solve0,
                Stage::Solve1,
                Stage::Solve2,
                Stage::Solve3,
                Stage::ApplyTarget,
                Stage::Split,
                Stage::TargetFlagging,
                Stage::Imaging,
                Stage::Difference,
                Stage::SelfCal,
            ]
        );
    }

    #[test]
    fn test_labels_are_unique() {
        let plan = default_plan();
        assert_eq!(
            plan.steps.iter().map(|step| &step.label).unique().count(),
            plan.steps.len()
        );
    }

    #[test]
    fn test_table_names() {
        assert_eq!(
            default_plan().table_names(),
            vec![
                "FRB19_cut.ms_tt.K0",
                "FRB19_cut.ms_tt.G0",
                "FRB19_cut.ms_tt.B0",
                "FRB19_cut.ms_tt.K1",
                "FRB19_cut.ms_tt.G1",
                "FRB19_cut.ms_tt.B1",
                "FRB19_cut.ms_tt.G2",
                "FRB19_cut.ms_tt.K2",
                "FRB19_cut.ms_tt.G3",
                "FRB19_cut.ms_tt.K3",
                "FRB19_calib.ms.GP0",
            ]
        );
    }

    #[test]
    fn test_flag_versions() {
        assert_eq!(
            default_plan().flag_versions(),
            vec!["basic", "bpcal_residual_flags", "pcal_residual_flags", "refcal-full"]
        );
    }

    #[test]
    fn test_fits_outputs() {
        assert_eq!(
            default_plan().fits_outputs(),
            vec![
                "J1337-28_full.fits",
                "J1337-28_before.fits",
                "J1337-28_on.fits",
                "J1337-28_after.fits",
                "on-before.fits",
                "on-after.fits",
                "J1337-28selfcal0_full.fits",
            ]
        );
    }

    #[test]
    fn test_optional_stages() {
        let config = PipelineConfig {
            time_slices: TimeSlices {
                enabled: false,
                ..TimeSlices::default()
            },
            selfcal: SelfCalConfig {
                enabled: false,
                ..SelfCalConfig::default()
            },
            ..PipelineConfig::default()
        };
        let plan = Plan::build(&config).unwrap();
        assert_eq!(plan.fits_outputs(), vec!["J1337-28_full.fits"]);
        assert_eq!(plan.count_task("immath"), 0);
        assert_eq!(plan.steps_in(Stage::SelfCal).count(), 0);
        assert_eq!(plan.steps.last().unwrap().stage, Stage::Imaging);
    }

    #[test]
    fn test_selfcal_rounds() {
        let config = PipelineConfig {
            time_slices: TimeSlices {
                enabled: false,
                ..TimeSlices::default()
            },
            selfcal: SelfCalConfig {
                rounds: 2,
                ..SelfCalConfig::default()
            },
            ..PipelineConfig::default()
        };
        let plan = Plan::build(&config).unwrap();
        assert_eq!(
            plan.fits_outputs(),
            vec![
                "J1337-28_full.fits",
                "J1337-28selfcal0_full.fits",
                "J1337-28selfcal1_full.fits",
            ]
        );
        let solve = find(&plan, "solve FRB19_calib.ms.GP0");
        assert!(solve
            .inputs
            .contains(&Artifact::Image("J1337-28_full".into())));
        let solve = find(&plan, "solve FRB19_calib.ms.GP1");
        assert!(solve
            .inputs
            .contains(&Artifact::Image("J1337-28selfcal0_full".into())));
    }

    #[test]
    fn test_selfcal_reads_last_saved_model() {
        let plan = default_plan();
        let solve = find(&plan, "solve FRB19_calib.ms.GP0");
        let models: Vec<&Artifact> = solve
            .inputs
            .iter()
            .filter(|input| matches!(input, Artifact::Image(_)))
            .collect();
        assert_eq!(models, vec![&Artifact::Image("J1337-28_after".into())]);

        let mut config = PipelineConfig::default();
        config.imaging.savemodel = "none".into();
        let plan = Plan::build(&config).unwrap();
        let solve = find(&plan, "solve FRB19_calib.ms.GP0");
        assert!(!solve
            .inputs
            .iter()
            .any(|input| matches!(input, Artifact::Image(_))));
    }

    #[test]
    fn test_flux_model_branches() {
        let plan = default_plan();
        assert_eq!(plan.count_task("setjy"), 1);
        let setjy = &plan.steps_in(Stage::FluxModel).next().unwrap().call;
        assert_eq!(setjy.get_str("standard"), Some("manual"));

        let config = PipelineConfig {
            bpcal: "J1939-6342".into(),
            ..PipelineConfig::default()
        };
        let plan = Plan::build(&config).unwrap();
        assert_eq!(plan.count_task("setjy"), 1);
        let setjy = &plan.steps_in(Stage::FluxModel).next().unwrap().call;
        assert_eq!(setjy.get_str("standard"), Some("Stevens-Reynolds 2016"));
    }

    #[test]
    fn test_unknown_flux_calibrator() {
        let config = PipelineConfig {
            bpcal: "J1331+3030".into(),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            Plan::build(&config),
            Err(MeercalError::UnknownFluxCalibrator { field }) if field == "J1331+3030"
        ));

        let config = PipelineConfig {
            unknown_flux_calibrator: UnknownCalibratorPolicy::Skip,
            ..config
        };
        let plan = Plan::build(&config).unwrap();
        assert_eq!(plan.count_task("setjy"), 0);
        assert!(!find(&plan, "solve FRB19_cut.ms_tt.K0 on J1331+3030")
            .inputs
            .iter()
            .any(|input| matches!(input, Artifact::FluxScale(_))));

        let config = PipelineConfig {
            flux_model: Some(FluxModel::Standard {
                standard: "Perley-Butler 2017".into(),
            }),
            ..config
        };
        assert_eq!(Plan::build(&config).unwrap().count_task("setjy"), 1);
    }

    #[test]
    fn test_priors_are_parallel_and_produced_earlier() {
        let plan = default_plan();
        let mut seen = vec![];
        for step in &plan.steps {
            let tables = step.call.get("gaintable").and_then(TaskValue::as_str_list);
            if let Some(tables) = tables {
                let fields = step.call.get("gainfield").and_then(TaskValue::as_str_list).unwrap();
                let interps = step.call.get("interp").and_then(TaskValue::as_str_list).unwrap();
                assert_eq!(tables.len(), fields.len(), "{}", step.label);
                assert_eq!(tables.len(), interps.len(), "{}", step.label);
                for table in tables {
                    assert!(seen.contains(table), "{} reads {table} early", step.label);
                }
            }
            for output in &step.outputs {
                if let Artifact::CalTable(name) = output {
                    seen.push(name.clone());
                }
            }
        }
    }

    #[test]
    fn test_every_solve_has_refant() {
        let plan = default_plan();
        for step in plan.steps.iter().filter(|step| step.solved_table().is_some()) {
            assert_eq!(step.call.get_str("refant"), Some("m001"), "{}", step.label);
        }
    }

    #[test]
    fn test_secondary_delays_append_to_copy() {
        let plan = default_plan();
        let copy = find(&plan, "copy FRB19_cut.ms_tt.K1 to FRB19_cut.ms_tt.K2");
        assert_eq!(copy.call.task, "copytree");
        let delays = find(&plan, "solve FRB19_cut.ms_tt.K2 on J1311-2216 (append)");
        assert!(delays.appends());
        assert_eq!(delays.solved_table(), Some("FRB19_cut.ms_tt.K2"));
        assert_eq!(delays.call.get_str("gaintype"), Some("K"));
        assert_eq!(
            delays.call.get("gainfield").and_then(TaskValue::as_str_list),
            Some(&["J0408-6545".to_string(), "J0408-6545".into(), "J1311-2216".into()][..])
        );
        let copy_idx = plan.steps.iter().position(|s| s == copy).unwrap();
        let delays_idx = plan.steps.iter().position(|s| s == delays).unwrap();
        assert!(copy_idx < delays_idx);

        let copy = find(&plan, "copy FRB19_cut.ms_tt.K1 to FRB19_cut.ms_tt.K3");
        assert!(copy.inputs.contains(&Artifact::CalTable("FRB19_cut.ms_tt.K1".into())));
    }

    #[test]
    fn test_target_apply() {
        let plan = default_plan();
        let apply = plan.steps_in(Stage::ApplyTarget).next().unwrap();
        assert_eq!(apply.call.task, "applycal");
        assert_eq!(apply.outputs, vec![corrected("FRB19_cut.ms", "J1337-28")]);
        assert_eq!(
            apply.call.get("gaintable").and_then(TaskValue::as_str_list),
            Some(
                &[
                    "FRB19_cut.ms_tt.K3".to_string(),
                    "FRB19_cut.ms_tt.G1".into(),
                    "FRB19_cut.ms_tt.B1".into(),
                    "FRB19_cut.ms_tt.G3".into(),
                ][..]
            )
        );
        assert_eq!(
            apply.call.get("gainfield").and_then(TaskValue::as_str_list),
            Some(&["".to_string(), "J0408-6545".into(), "J0408-6545".into(), "J1311-2216".into()][..])
        );
    }

    #[test]
    fn test_time_slices() {
        let config = PipelineConfig {
            time_slices: TimeSlices {
                enabled: true,
                before: "10:00:00~10:00:08".into(),
                on: "10:00:08~10:00:16".into(),
                after: "10:00:16~10:00:24".into(),
                spw: "*:900~1600MHz".into(),
            },
            ..PipelineConfig::default()
        };
        let plan = Plan::build(&config).unwrap();
        let on = find(&plan, "image J1337-28_on");
        assert_eq!(on.call.get_str("timerange"), Some("10:00:08~10:00:16"));
        assert_eq!(on.call.get_str("spw"), Some("*:900~1600MHz"));
        let full = find(&plan, "image J1337-28_full");
        assert_eq!(full.call.get_str("spw"), Some(""));
        let diff = find(&plan, "subtract J1337-28_after.fits from J1337-28_on.fits");
        assert_eq!(diff.call.get_str("outfile"), Some("on-after"));
    }

    #[test]
    fn test_plans_are_deterministic() {
        assert_eq!(default_plan(), default_plan());
    }

    #[test]
    fn test_validate_rejects_forward_reference() {
        let mut plan = default_plan();
        let split = plan
            .steps
            .iter()
            .position(|step| step.stage == Stage::Split)
            .unwrap();
        let step = plan.steps.remove(split);
        plan.steps.insert(0, step);
        assert!(matches!(
            plan.validate(),
            Err(MeercalError::MissingArtifact { artifact: Artifact::Corrected(_), .. })
        ));
    }

    #[test]
    fn test_invalid_config() {
        let config = PipelineConfig {
            ms: String::new(),
            ..PipelineConfig::default()
        };
        assert!(matches!(Plan::build(&config), Err(MeercalError::Config(_))));
    }
}
