//! Builders for the flagging calls: static frequency exclusion, clipping,
//! statistical outlier rejection and flag version checkpoints.

use itertools::Itertools;

use crate::task::TaskCall;

/// A `flagdata` mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagMode {
    /// Flag an explicit selection
    Manual,
    /// Flag values outside a range, zeros, or non-finite values
    Clip,
    /// Statistical flagging with sliding window rms
    Rflag,
    /// Time-frequency crop
    Tfcrop,
    /// Grow existing flags
    Extend,
}

impl FlagMode {
    /// The toolkit's name for this mode
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagMode::Manual => "manual",
            FlagMode::Clip => "clip",
            FlagMode::Rflag => "rflag",
            FlagMode::Tfcrop => "tfcrop",
            FlagMode::Extend => "extend",
        }
    }
}

/// The column a statistical flagger looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagColumn {
    /// Uncalibrated visibilities
    Data,
    /// Corrected minus model
    Residual,
    /// Solutions of a calibration table
    Cparam,
}

impl FlagColumn {
    /// The toolkit's name for this column
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagColumn::Data => "data",
            FlagColumn::Residual => "residual",
            FlagColumn::Cparam => "CPARAM",
        }
    }
}

/// Build a spectral window selection which excludes each of `ranges` in every
/// spectral window.
///
/// There is one comma separated entry per range, and no trailing comma.
///
/// ```
/// use meercal::flags::spw_exclusion;
///
/// assert_eq!(
///     spw_exclusion(&["850~900MHz", "1419.8~1421.3MHz"]),
///     "*:850~900MHz,*:1419.8~1421.3MHz"
/// );
/// assert_eq!(spw_exclusion::<&str>(&[]), "");
/// ```
pub fn spw_exclusion<S: AsRef<str>>(ranges: &[S]) -> String {
    ranges
        .iter()
        .map(|range| format!("*:{}", range.as_ref()))
        .join(",")
}

/// Flag `ranges` on all baselines, or only those in `uvrange` if given.
pub fn flag_frequencies<S: AsRef<str>>(vis: &str, ranges: &[S], uvrange: Option<&str>) -> TaskCall {
    TaskCall::new("flagdata")
        .arg("vis", vis)
        .arg("mode", FlagMode::Manual.as_str())
        .arg("spw", spw_exclusion(ranges))
        .arg_opt("uvrange", uvrange)
}

/// Flag autocorrelations.
pub fn flag_autocorr(vis: &str) -> TaskCall {
    TaskCall::new("flagdata")
        .arg("vis", vis)
        .arg("mode", FlagMode::Manual.as_str())
        .arg("autocorr", true)
}

/// Flag exact zeros. Clipping also always flags NaN and Inf.
pub fn clip_zeros(vis: &str) -> TaskCall {
    TaskCall::new("flagdata")
        .arg("vis", vis)
        .arg("mode", FlagMode::Clip.as_str())
        .arg("clipzeros", true)
}

/// Flag amplitudes outside `[min, max]`.
pub fn clip_minmax(vis: &str, min: f64, max: f64) -> TaskCall {
    TaskCall::new("flagdata")
        .arg("vis", vis)
        .arg("mode", FlagMode::Clip.as_str())
        .arg("clipminmax", vec![min, max])
}

/// Statistical flagging (`rflag` or `tfcrop`) of `column`, restricted to
/// `field` when one is given.
pub fn flag_statistical(vis: &str, mode: FlagMode, column: FlagColumn, field: Option<&str>) -> TaskCall {
    TaskCall::new("flagdata")
        .arg("vis", vis)
        .arg("mode", mode.as_str())
        .arg("datacolumn", column.as_str())
        .arg_opt("field", field)
}

/// Grow flags in time and frequency by the given percentages.
pub fn flag_extend(vis: &str, field: &str, grow_time: f64, grow_freq: f64) -> TaskCall {
    TaskCall::new("flagdata")
        .arg("vis", vis)
        .arg("mode", FlagMode::Extend.as_str())
        .arg("growtime", grow_time)
        .arg("growfreq", grow_freq)
        .arg("growaround", true)
        .arg("flagneartime", true)
        .arg("flagnearfreq", true)
        .arg("field", field)
}

/// The `rflag`, `tfcrop`, `extend` sequence applied to a field's raw data.
pub fn flag_field_sequence(vis: &str, field: &str, grow_time: f64, grow_freq: f64) -> [TaskCall; 3] {
    [
        flag_statistical(vis, FlagMode::Rflag, FlagColumn::Data, Some(field)),
        flag_statistical(vis, FlagMode::Tfcrop, FlagColumn::Data, Some(field)),
        flag_extend(vis, field, grow_time, grow_freq),
    ]
}

/// Save the current flags of `vis` as `version`.
pub fn save_flag_version(vis: &str, version: &str) -> TaskCall {
    TaskCall::new("flagmanager")
        .arg("vis", vis)
        .arg("mode", "save")
        .arg("versionname", version)
}
