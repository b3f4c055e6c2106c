//! Registry of the artifacts produced while a pipeline runs.

use std::{collections::HashMap, fmt::Display};

use log::trace;

use crate::error::MeercalError;

/// The label recorded as the producer of seeded artifacts.
pub const SEED_LABEL: &str = "input";

/// Something a step reads or writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Artifact {
    /// A measurement set on disk
    Dataset(String),
    /// A calibration table on disk
    CalTable(String),
    /// A saved flag version of the calibrator dataset
    FlagVersion(String),
    /// A deconvolved image product, by image name
    Image(String),
    /// An exported FITS file
    Fits(String),
    /// The flux scale of a field's model column
    FluxScale(String),
    /// Corrected visibilities of a field
    Corrected(String),
}

impl Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Artifact::Dataset(path) => write!(f, "dataset {path}"),
            Artifact::CalTable(name) => write!(f, "calibration table {name}"),
            Artifact::FlagVersion(name) => write!(f, "flag version {name}"),
            Artifact::Image(name) => write!(f, "image {name}"),
            Artifact::Fits(path) => write!(f, "fits file {path}"),
            Artifact::FluxScale(field) => write!(f, "flux scale of {field}"),
            Artifact::Corrected(field) => write!(f, "corrected data of {field}"),
        }
    }
}

#[derive(Debug, Clone)]
struct Record {
    artifact: Artifact,
    producer: String,
    dependencies: Vec<Artifact>,
}

/// Ordered record of which step produced each artifact, and from what.
///
/// An artifact produced twice (e.g. a table appended to) keeps its first
/// position and accumulates dependencies.
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    records: Vec<Record>,
    index: HashMap<Artifact, usize>,
}

impl PipelineContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an artifact which exists before any step runs.
    pub fn seed(&mut self, artifact: Artifact) {
        self.produce(SEED_LABEL, artifact, &[]);
    }

    /// Check that `artifact`, needed by `step`, has already been produced.
    ///
    /// # Errors
    ///
    /// Returns [`MeercalError::MissingArtifact`] otherwise.
    pub fn require(&self, step: &str, artifact: &Artifact) -> Result<(), MeercalError> {
        if self.is_produced(artifact) {
            Ok(())
        } else {
            Err(MeercalError::MissingArtifact {
                step: step.to_string(),
                artifact: artifact.clone(),
            })
        }
    }

    /// Record that `step` produced `artifact` from `deps`.
    pub fn produce(&mut self, step: &str, artifact: Artifact, deps: &[Artifact]) {
        trace!("{} produced {}", step, artifact);
        match self.index.get(&artifact) {
            Some(&idx) => {
                let record = &mut self.records[idx];
                for dep in deps {
                    if *dep != artifact && !record.dependencies.contains(dep) {
                        record.dependencies.push(dep.clone());
                    }
                }
            }
            None => {
                self.index.insert(artifact.clone(), self.records.len());
                self.records.push(Record {
                    dependencies: deps.iter().filter(|&d| *d != artifact).cloned().collect(),
                    artifact,
                    producer: step.to_string(),
                });
            }
        }
    }

    /// Whether `artifact` has been produced or seeded.
    pub fn is_produced(&self, artifact: &Artifact) -> bool {
        self.index.contains_key(artifact)
    }

    /// The artifacts `artifact` was produced from, if it has been produced.
    pub fn dependencies(&self, artifact: &Artifact) -> Option<&[Artifact]> {
        self.index
            .get(artifact)
            .map(|&idx| self.records[idx].dependencies.as_slice())
    }

    /// The label of the step which first produced `artifact`.
    pub fn producer(&self, artifact: &Artifact) -> Option<&str> {
        self.index
            .get(artifact)
            .map(|&idx| self.records[idx].producer.as_str())
    }

    /// All artifacts, in the order they were first produced.
    pub fn produced(&self) -> impl Iterator<Item = &Artifact> {
        self.records.iter().map(|record| &record.artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_before_produce() {
        let mut context = PipelineContext::new();
        let k0 = Artifact::CalTable("a.ms_tt.K0".into());
        assert!(matches!(
            context.require("solve G0", &k0),
            Err(MeercalError::MissingArtifact { step, artifact }) if step == "solve G0" && artifact == k0
        ));
        context.produce("solve K0", k0.clone(), &[Artifact::Dataset("a.ms".into())]);
        assert!(context.require("solve G0", &k0).is_ok());
        assert_eq!(context.producer(&k0), Some("solve K0"));
    }

    #[test]
    fn test_reproduce_keeps_order_and_merges_deps() {
        let mut context = PipelineContext::new();
        let ms = Artifact::Dataset("a.ms".into());
        let k2 = Artifact::CalTable("a.ms_tt.K2".into());
        let g2 = Artifact::CalTable("a.ms_tt.G2".into());
        context.seed(ms.clone());
        context.produce("copy K2", k2.clone(), &[ms.clone()]);
        context.produce("solve G2", g2.clone(), &[ms.clone()]);
        context.produce("append K2", k2.clone(), &[ms.clone(), g2.clone(), k2.clone()]);

        assert_eq!(
            context.produced().cloned().collect::<Vec<_>>(),
            vec![ms.clone(), k2.clone(), g2.clone()]
        );
        assert_eq!(context.dependencies(&k2), Some(&[ms.clone(), g2][..]));
        assert_eq!(context.producer(&ms), Some(SEED_LABEL));
        assert_eq!(context.dependencies(&Artifact::Fits("x.fits".into())), None);
    }

    #[test]
    fn test_artifact_display() {
        assert_eq!(
            Artifact::CalTable("a.ms_tt.B0".into()).to_string(),
            "calibration table a.ms_tt.B0"
        );
        assert_eq!(
            Artifact::Corrected("J1337-28".into()).to_string(),
            "corrected data of J1337-28"
        );
    }
}
