//! Every tunable of a pipeline run, in one place.
//!
//! The defaults reproduce the FRB19 MeerKAT L-band reduction. A config can be
//! read from a toml or json file, and written back out as toml.

use std::{fs::File, io::Read, path::Path};

use derive_builder::Builder;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{BAND_EDGES, DEFAULT_TABLE_TAG, RFI_RANGES, RFI_UVRANGE},
    error::ConfigError,
    flux::FluxModel,
};

lazy_static! {
    static ref FREQ_RANGE_RE: Regex = Regex::new(
        r"^\d+(\.\d+)?(([kMG]Hz)(~\d+(\.\d+)?[kMG]Hz)?|~\d+(\.\d+)?[kMG]Hz)$"
    )
    .unwrap();
}

/// The config file formats that can be read.
pub const CONFIG_FILE_TYPES: [&str; 2] = ["toml", "json"];

/// What to do when the bandpass calibrator has no known flux model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownCalibratorPolicy {
    /// Refuse to build the pipeline
    Abort,
    /// Leave the flux scale unset, with a warning
    Skip,
}

/// Deconvolution and image geometry parameters shared by every image.
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[builder(setter(into), default)]
#[serde(default, deny_unknown_fields)]
pub struct ImagingConfig {
    /// Image size in pixels
    pub imsize: [u32; 2],
    /// Pixel size
    pub cell: String,
    /// Stokes parameters to image
    pub stokes: String,
    /// Sky projection
    pub projection: String,
    /// Spectral mode
    pub specmode: String,
    /// Gridding algorithm
    pub gridder: String,
    /// Deconvolution algorithm
    pub deconvolver: String,
    /// Multiscale scales in pixels
    pub scales: Vec<i64>,
    /// Number of taylor terms
    pub nterms: u32,
    /// Weighting scheme
    pub weighting: String,
    /// Briggs robustness
    pub robust: f64,
    /// Maximum number of minor cycle iterations
    pub niter: u32,
    /// Loop gain
    pub gain: f64,
    /// Stopping threshold
    pub threshold: String,
    /// Masking scheme
    pub usemask: String,
    /// auto-multithresh sidelobe threshold
    pub sidelobethreshold: f64,
    /// auto-multithresh noise threshold
    pub noisethreshold: f64,
    /// auto-multithresh low noise threshold
    pub lownoisethreshold: f64,
    /// auto-multithresh negative threshold
    pub negativethreshold: f64,
    /// auto-multithresh smoothing
    pub smoothfactor: f64,
    /// auto-multithresh minimum beam fraction
    pub minbeamfrac: f64,
    /// auto-multithresh cut threshold
    pub cutthreshold: f64,
    /// auto-multithresh grow iterations
    pub growiterations: u32,
    /// Where the model is written
    pub savemodel: String,
}

impl Default for ImagingConfig {
    fn default() -> Self {
        Self {
            imsize: [5000, 5000],
            cell: "3.0arcsec".into(),
            stokes: "I".into(),
            projection: "SIN".into(),
            specmode: "mfs".into(),
            gridder: "widefield".into(),
            deconvolver: "mtmfs".into(),
            scales: vec![0, 5, 15],
            nterms: 2,
            weighting: "briggs".into(),
            robust: 0.0,
            niter: 25000,
            gain: 0.1,
            threshold: "0.05mJy".into(),
            usemask: "auto-multithresh".into(),
            sidelobethreshold: 2.5,
            noisethreshold: 5.0,
            lownoisethreshold: 1.5,
            negativethreshold: 0.0,
            smoothfactor: 1.0,
            minbeamfrac: 0.3,
            cutthreshold: 0.01,
            growiterations: 75,
            savemodel: "modelcolumn".into(),
        }
    }
}

/// Time ranges of the three slices imaged around a transient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeSlices {
    /// Image the slices and their differences
    pub enabled: bool,
    /// Time range before the event
    pub before: String,
    /// Time range containing the event
    pub on: String,
    /// Time range after the event
    pub after: String,
    /// Spectral window selection for the slices
    pub spw: String,
}

impl Default for TimeSlices {
    fn default() -> Self {
        Self {
            enabled: true,
            before: String::new(),
            on: String::new(),
            after: String::new(),
            spw: String::new(),
        }
    }
}

/// Phase-only self-calibration of the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelfCalConfig {
    /// Self-calibrate the target
    pub enabled: bool,
    /// Number of solve, apply, re-image rounds
    pub rounds: u8,
    /// Solution interval
    pub solint: String,
    /// Field of the split dataset to solve on
    pub field: String,
    /// Minimum SNR of a solution
    pub minsnr: f64,
}

impl Default for SelfCalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rounds: 1,
            solint: "64s".into(),
            field: "0".into(),
            minsnr: 3.0,
        }
    }
}

/// How solve outcomes are judged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolvePolicy {
    /// The largest acceptable fraction of solutions flagged for low SNR.
    /// `None` accepts any solve that completes.
    pub max_flagged_fraction: Option<f64>,
    /// Abort the run when a solve is rejected. Otherwise a warning is logged.
    pub abort_on_failure: bool,
}

impl Default for SolvePolicy {
    fn default() -> Self {
        Self {
            max_flagged_fraction: None,
            abort_on_failure: true,
        }
    }
}

/// All parameters of a pipeline run.
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[builder(setter(into), default)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Measurement set holding calibrators and target
    pub ms: String,
    /// Measurement set the calibrated target is split into
    pub target_ms: String,
    /// Bandpass and flux calibrator field
    pub bpcal: String,
    /// Secondary (phase) calibrator field
    pub pcal: String,
    /// Target field
    pub target: String,
    /// Reference antenna
    pub refant: String,
    /// Bandpass gaps up to this many channels are interpolated over
    pub gapfill: u32,
    /// Baselines used for gain and bandpass solves
    pub uvrange: String,
    /// Tag in calibration table names, `<ms>_<tag>.K0`
    pub table_tag: String,
    /// Frequency ranges flagged on all baselines
    pub band_edges: Vec<String>,
    /// Frequency ranges flagged on short baselines
    pub rfi_ranges: Vec<String>,
    /// Baselines on which `rfi_ranges` are flagged
    pub rfi_uvrange: String,
    /// Amplitudes outside this range are clipped
    pub clip_range: [f64; 2],
    /// Flag growth in time [%]
    pub grow_time: f64,
    /// Flag growth in frequency [%]
    pub grow_freq: f64,
    /// What to do when `bpcal` has no known flux model
    pub unknown_flux_calibrator: UnknownCalibratorPolicy,
    /// Explicit flux model for `bpcal`, overriding the lookup
    pub flux_model: Option<FluxModel>,
    /// Image parameters
    pub imaging: ImagingConfig,
    /// Time slice imaging
    pub time_slices: TimeSlices,
    /// Self-calibration of the target
    pub selfcal: SelfCalConfig,
    /// Solve outcome checks
    pub solve_policy: SolvePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ms: "FRB19_cut.ms".into(),
            target_ms: "FRB19_calib.ms".into(),
            bpcal: "J0408-6545".into(),
            pcal: "J1311-2216".into(),
            target: "J1337-28".into(),
            refant: "m001".into(),
            gapfill: 24,
            uvrange: ">150m".into(),
            table_tag: DEFAULT_TABLE_TAG.into(),
            band_edges: BAND_EDGES.iter().map(|s| s.to_string()).collect(),
            rfi_ranges: RFI_RANGES.iter().map(|s| s.to_string()).collect(),
            rfi_uvrange: RFI_UVRANGE.into(),
            clip_range: [0.0, 100.0],
            grow_time: 90.0,
            grow_freq: 90.0,
            unknown_flux_calibrator: UnknownCalibratorPolicy::Abort,
            flux_model: None,
            imaging: ImagingConfig::default(),
            time_slices: TimeSlices::default(),
            selfcal: SelfCalConfig::default(),
            solve_policy: SolvePolicy::default(),
        }
    }
}

fn invalid<T: std::fmt::Debug>(field: &str, expected: &str, received: T) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        expected: expected.into(),
        received: format!("{received:?}"),
    }
}

impl PipelineConfig {
    /// Read a config from a toml or json file, chosen by the file extension.
    ///
    /// # Errors
    ///
    /// Can raise [`ConfigError`] if the file can't be read, has an unknown
    /// extension or can't be decoded.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        debug!("Attempting to parse config file {}", path_str);

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        let mut contents = String::new();
        match ext.as_deref() {
            Some("toml") => {
                File::open(path)?.read_to_string(&mut contents)?;
                toml::from_str(&contents).map_err(|source| ConfigError::Toml {
                    path: path_str,
                    source,
                })
            }
            Some("json") => {
                File::open(path)?.read_to_string(&mut contents)?;
                serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
                    path: path_str,
                    source,
                })
            }
            _ => Err(ConfigError::UnknownFileType {
                path: path_str,
                valid: CONFIG_FILE_TYPES.join(", "),
            }),
        }
    }

    /// Serialise as toml, e.g. to save the parameters of a run.
    ///
    /// # Errors
    ///
    /// Can raise [`ConfigError::TomlSer`].
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check that every value can be used.
    ///
    /// # Errors
    ///
    /// Raises [`ConfigError::InvalidValue`] for the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("ms", &self.ms),
            ("target_ms", &self.target_ms),
            ("bpcal", &self.bpcal),
            ("pcal", &self.pcal),
            ("target", &self.target),
            ("refant", &self.refant),
            ("table_tag", &self.table_tag),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(field, "a non-empty string", value));
            }
        }
        if self.ms == self.target_ms {
            return Err(invalid(
                "target_ms",
                "a different path to ms",
                &self.target_ms,
            ));
        }
        for (field, ranges) in [("band_edges", &self.band_edges), ("rfi_ranges", &self.rfi_ranges)] {
            if let Some(bad) = ranges.iter().find(|r| !FREQ_RANGE_RE.is_match(r)) {
                return Err(invalid(
                    field,
                    "frequency ranges like 850~900MHz or 1600MHz",
                    bad,
                ));
            }
        }
        let [clip_min, clip_max] = self.clip_range;
        if !(clip_min < clip_max) {
            return Err(invalid("clip_range", "min < max", self.clip_range));
        }
        if self.imaging.imsize.iter().any(|&n| n == 0) {
            return Err(invalid("imaging.imsize", "non-zero pixels", self.imaging.imsize));
        }
        if self.imaging.nterms == 0 {
            return Err(invalid("imaging.nterms", "at least 1", self.imaging.nterms));
        }
        if self.selfcal.enabled && self.selfcal.rounds == 0 {
            return Err(invalid("selfcal.rounds", "at least 1", self.selfcal.rounds));
        }
        if let Some(frac) = self.solve_policy.max_flagged_fraction {
            if !(0.0..=1.0).contains(&frac) {
                return Err(invalid(
                    "solve_policy.max_flagged_fraction",
                    "a fraction between 0 and 1",
                    frac,
                ));
            }
        }
        Ok(())
    }

    /// The flux model for the bandpass calibrator, from the config if given,
    /// otherwise from the known calibrators.
    pub fn bpcal_flux_model(&self) -> Option<FluxModel> {
        self.flux_model
            .clone()
            .or_else(|| FluxModel::for_calibrator(&self.bpcal))
    }
}
