//! Calibration tables and the toolkit calls which solve for and apply them.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::task::TaskCall;

/// The kind of per-antenna correction held in a calibration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalKind {
    /// Delay (`K`)
    Delay,
    /// Complex gain (`G`)
    Gain,
    /// Bandpass (`B`)
    Bandpass,
}

impl CalKind {
    /// The letter the toolkit uses for this kind of table.
    pub fn letter(&self) -> &'static str {
        match self {
            CalKind::Delay => "K",
            CalKind::Gain => "G",
            CalKind::Bandpass => "B",
        }
    }
}

/// How solutions from a prior table are interpolated onto the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interp {
    /// Nearest solution
    Nearest,
    /// Linear interpolation between solutions
    Linear,
}

impl Interp {
    /// The toolkit's name for this rule.
    pub fn as_str(&self) -> &'static str {
        match self {
            Interp::Nearest => "nearest",
            Interp::Linear => "linear",
        }
    }
}

/// Which parts of the gain are solved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalMode {
    /// Phase only (`p`)
    #[serde(rename = "p")]
    Phase,
    /// Amplitude and phase (`ap`)
    #[serde(rename = "ap")]
    AmpPhase,
}

impl CalMode {
    /// The toolkit's name for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            CalMode::Phase => "p",
            CalMode::AmpPhase => "ap",
        }
    }
}

/// A named calibration table on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CalTable {
    /// Path of the table, also its identity
    pub name: String,
    /// What the table holds
    pub kind: CalKind,
}

impl CalTable {
    /// The table of `kind` solved in calibration stage `stage`, named
    /// `<ms>_<tag>.<letter><stage>`.
    ///
    /// ```
    /// use meercal::calibration::{CalKind, CalTable};
    ///
    /// let table = CalTable::stage("obs.ms", "tt", CalKind::Bandpass, 1);
    /// assert_eq!(table.name, "obs.ms_tt.B1");
    /// ```
    pub fn stage(ms: &str, tag: &str, kind: CalKind, stage: u8) -> Self {
        Self {
            name: format!("{}_{}.{}{}", ms, tag, kind.letter(), stage),
            kind,
        }
    }

    /// The phase-only self-calibration table for `iteration`, named
    /// `<target_ms>.GP<iteration>`.
    pub fn selfcal(target_ms: &str, iteration: u8) -> Self {
        Self {
            name: format!("{}.GP{}", target_ms, iteration),
            kind: CalKind::Gain,
        }
    }

    /// Pre-apply this table with solutions from `field`.
    pub fn prior(&self, field: &str, interp: Interp) -> PriorTable {
        PriorTable {
            table: self.name.clone(),
            field: field.to_string(),
            interp,
        }
    }
}

impl Display for CalTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A table pre-applied during a solve or an apply. An empty `field` uses
/// solutions from all fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorTable {
    /// Name of the table
    pub table: String,
    /// Field whose solutions are used
    pub field: String,
    /// Interpolation rule
    pub interp: Interp,
}

/// The parallel `gaintable`, `gainfield` and `interp` lists for `priors`.
/// All three always have the same length.
pub fn prior_lists(priors: &[PriorTable]) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut tables = Vec::with_capacity(priors.len());
    let mut fields = Vec::with_capacity(priors.len());
    let mut interps = Vec::with_capacity(priors.len());
    for prior in priors {
        tables.push(prior.table.clone());
        fields.push(prior.field.clone());
        interps.push(prior.interp.as_str().to_string());
    }
    (tables, fields, interps)
}

fn with_priors(call: TaskCall, priors: &[PriorTable]) -> TaskCall {
    let (tables, fields, interps) = prior_lists(priors);
    call.arg("gaintable", tables)
        .arg("gainfield", fields)
        .arg("interp", interps)
}

/// Parameters of a single calibration solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveSpec {
    /// Dataset to solve on
    pub vis: String,
    /// Field to solve on
    pub field: String,
    /// Table to write
    pub table: CalTable,
    /// Reference antenna
    pub refant: String,
    /// Restrict baselines, e.g. `>150m`
    pub uvrange: Option<String>,
    /// Solution interval
    pub solint: String,
    /// Gain mode, for gain tables only
    pub calmode: Option<CalMode>,
    /// Minimum SNR of a solution
    pub minsnr: Option<f64>,
    /// Minimum number of baselines per antenna
    pub minblperant: Option<u32>,
    /// Normalise solutions
    pub solnorm: Option<bool>,
    /// Axes to combine over
    pub combine: Option<String>,
    /// Fill flagged channel gaps up to this many channels, bandpass only
    pub fillgaps: Option<u32>,
    /// Append to an existing table
    pub append: bool,
    /// Tables to pre-apply
    pub priors: Vec<PriorTable>,
}

impl Default for SolveSpec {
    fn default() -> Self {
        Self {
            vis: String::new(),
            field: String::new(),
            table: CalTable {
                name: String::new(),
                kind: CalKind::Gain,
            },
            refant: String::new(),
            uvrange: None,
            solint: "inf".into(),
            calmode: None,
            minsnr: None,
            minblperant: None,
            solnorm: None,
            combine: None,
            fillgaps: None,
            append: false,
            priors: vec![],
        }
    }
}

impl SolveSpec {
    /// The toolkit call for this solve: `bandpass` for bandpass tables,
    /// otherwise `gaincal` with the matching `gaintype`.
    pub fn to_call(&self) -> TaskCall {
        let task = match self.table.kind {
            CalKind::Bandpass => "bandpass",
            _ => "gaincal",
        };
        let mut call = TaskCall::new(task)
            .arg("vis", &self.vis)
            .arg("field", &self.field)
            .arg_opt("uvrange", self.uvrange.as_deref())
            .arg("caltable", &self.table.name)
            .arg("refant", &self.refant)
            .arg("solint", &self.solint)
            .arg_opt("combine", self.combine.as_deref())
            .arg_opt("solnorm", self.solnorm)
            .arg_opt("minblperant", self.minblperant)
            .arg_opt("minsnr", self.minsnr);
        call = match self.table.kind {
            CalKind::Bandpass => call
                .arg("bandtype", "B")
                .arg_opt("fillgaps", self.fillgaps),
            kind => call
                .arg("gaintype", kind.letter())
                .arg_opt("calmode", self.calmode.map(|m| m.as_str())),
        };
        call = call.arg("parang", false);
        call = with_priors(call, &self.priors);
        call.arg("append", self.append)
    }
}

/// Parameters of a calibration apply.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApplySpec {
    /// Dataset to correct
    pub vis: String,
    /// Field to correct
    pub field: String,
    /// Tables to apply, in order
    pub tables: Vec<PriorTable>,
    /// Calibrate the weights too
    pub calwt: Option<bool>,
    /// e.g. `calonly` to leave flags alone
    pub applymode: Option<String>,
}

impl ApplySpec {
    /// The `applycal` call.
    pub fn to_call(&self) -> TaskCall {
        let call = TaskCall::new("applycal")
            .arg("vis", &self.vis)
            .arg("field", &self.field)
            .arg_opt("calwt", self.calwt)
            .arg("parang", false)
            .arg_opt("applymode", self.applymode.as_deref());
        with_priors(call, &self.tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskValue;

    #[test]
    fn test_stage_table_names() {
        assert_eq!(
            CalTable::stage("FRB19_cut.ms", "tt", CalKind::Delay, 0).name,
            "FRB19_cut.ms_tt.K0"
        );
        assert_eq!(
            CalTable::stage("FRB19_cut.ms", "tt", CalKind::Gain, 3).name,
            "FRB19_cut.ms_tt.G3"
        );
        assert_eq!(CalTable::selfcal("t.ms", 0).name, "t.ms.GP0");
    }

    #[test]
    fn test_prior_lists_are_parallel() {
        let k = CalTable::stage("a.ms", "tt", CalKind::Delay, 2);
        let g = CalTable::stage("a.ms", "tt", CalKind::Gain, 1);
        let priors = vec![k.prior("", Interp::Nearest), g.prior("bp", Interp::Linear)];
        let (tables, fields, interps) = prior_lists(&priors);
        assert_eq!(tables, vec!["a.ms_tt.K2", "a.ms_tt.G1"]);
        assert_eq!(fields, vec!["", "bp"]);
        assert_eq!(interps, vec!["nearest", "linear"]);
    }

    #[test]
    fn test_bandpass_solve_call() {
        let spec = SolveSpec {
            vis: "a.ms".into(),
            field: "bp".into(),
            table: CalTable::stage("a.ms", "tt", CalKind::Bandpass, 0),
            refant: "m001".into(),
            fillgaps: Some(24),
            minblperant: Some(4),
            minsnr: Some(3.0),
            ..SolveSpec::default()
        };
        let call = spec.to_call();
        assert_eq!(call.task, "bandpass");
        assert_eq!(call.get_str("bandtype"), Some("B"));
        assert_eq!(call.get("fillgaps"), Some(&TaskValue::Int(24)));
        assert!(call.get("gaintype").is_none());
        assert_eq!(call.get("append"), Some(&TaskValue::Bool(false)));
    }

    #[test]
    fn test_gain_solve_call() {
        let spec = SolveSpec {
            table: CalTable::stage("a.ms", "tt", CalKind::Gain, 0),
            calmode: Some(CalMode::Phase),
            ..SolveSpec::default()
        };
        let call = spec.to_call();
        assert_eq!(call.task, "gaincal");
        assert_eq!(call.get_str("gaintype"), Some("G"));
        assert_eq!(call.get_str("calmode"), Some("p"));
        assert_eq!(call.get_str("solint"), Some("inf"));
    }

    #[test]
    fn test_apply_call() {
        let g = CalTable::selfcal("t.ms", 0);
        let spec = ApplySpec {
            vis: "t.ms".into(),
            field: "0".into(),
            tables: vec![g.prior("0", Interp::Nearest)],
            calwt: Some(false),
            applymode: Some("calonly".into()),
        };
        let rendered = spec.to_call().render_python();
        assert_eq!(
            rendered,
            "applycal(vis='t.ms',field='0',calwt=False,parang=False,applymode='calonly',\
             gaintable=['t.ms.GP0'],gainfield=['0'],interp=['nearest'])"
        );
    }
}
