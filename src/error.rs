//! Errors that can occur in meercal

use thiserror::Error;

use crate::{context::Artifact, toolkit::error::ToolkitError};

#[derive(Error, Debug)]
/// Errors raised while parsing command line arguments
pub enum CLIError {
    /// When a bad CLI argument is provided
    #[error("Invalid Command Line Argument {option}, expected {expected}, received {received}")]
    InvalidCommandLineArgument {
        /// The argument name within the clap parser
        option: String,
        /// Description of what was expected
        expected: String,
        /// The value that was received
        received: String,
    },
    /// When neither an output script nor a CASA executable is given
    #[error("No backend selected. Provide one of {options}, or use --dry-run")]
    NoBackend {
        /// The options which select a backend
        options: String,
    },
}

#[derive(Error, Debug)]
/// Errors raised while reading or validating a [`crate::PipelineConfig`]
pub enum ConfigError {
    /// The config file extension was not recognised
    #[error("Config file '{path}' doesn't have a recognised file extension! Valid extensions are: {valid}")]
    UnknownFileType {
        /// The path of the config file
        path: String,
        /// Comma separated list of the supported extensions
        valid: String,
    },

    /// Couldn't decode toml
    #[error("Couldn't decode toml structure from {path}:\n{source}")]
    Toml {
        /// The path of the config file
        path: String,
        /// The toml error
        source: toml::de::Error,
    },

    /// Couldn't encode toml
    #[error("Couldn't encode config as toml: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Couldn't decode json
    #[error("Couldn't decode json structure from {path}:\n{source}")]
    Json {
        /// The path of the config file
        path: String,
        /// The json error
        source: serde_json::Error,
    },

    /// A field in the config has a value that can't be used
    #[error("Invalid config value {field}, expected {expected}, received {received}")]
    InvalidValue {
        /// The name of the config field
        field: String,
        /// Description of what was expected
        expected: String,
        /// The value that was received
        received: String,
    },

    /// Couldn't read the config file
    #[error("{0}")]
    IO(#[from] std::io::Error),
}

#[derive(Error, Debug)]
/// All the errors that can occur in meercal
pub enum MeercalError {
    #[cfg(feature = "cli")]
    /// Error derived from [`clap::Error`]
    #[error("{0}")]
    ClapError(#[from] clap::Error),

    /// Error to describe some kind of invalid CLI argument
    #[error("{0}")]
    CLIError(#[from] CLIError),

    /// Error derived from [`ConfigError`]
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A step needs an artifact that nothing before it produces
    #[error("Step '{step}' requires {artifact}, which has not been produced by an earlier step")]
    MissingArtifact {
        /// The label of the step
        step: String,
        /// The missing artifact
        artifact: Artifact,
    },

    /// The bandpass calibrator has no known flux model
    #[error("No flux model is known for bandpass calibrator {field}. Provide flux_model in the config, or skip the flux model stage")]
    UnknownFluxCalibrator {
        /// The field name of the bandpass calibrator
        field: String,
    },

    /// A calibration solve came back with too many flagged solutions
    #[error("Step '{step}' flagged {flagged} of {total} solutions in {table}, more than the allowed fraction {max_fraction}")]
    SolveRejected {
        /// The label of the step
        step: String,
        /// The calibration table that was solved for
        table: String,
        /// Number of flagged solutions
        flagged: usize,
        /// Total number of solutions
        total: usize,
        /// The largest acceptable flagged fraction
        max_fraction: f64,
    },

    /// Error derived from [`ToolkitError`]
    #[error("{0}")]
    Toolkit(#[from] ToolkitError),

    /// Error derived from [`std::io::Error`]
    #[error("{0}")]
    IO(#[from] std::io::Error),

    /// Not actually an error, signals that the run should end without
    /// invoking any tasks.
    #[error("Dry run")]
    DryRun {},
}
