// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Useful constants.
//!
//! Frequency ranges to flag are for MeerKAT L-band. The RFI list comes from the
//! [MeerKAT Cookbook](https://github.com/ska-sa/MeerKAT-Cookbook/blob/master/casa/L-band%20RFI%20frequency%20flagging.ipynb)

/// Frequency ranges flagged over all baselines.
pub const BAND_EDGES: [&str; 3] = [
    // Lower band edge
    "850~900MHz",
    // Upper bandpass edge
    "1658~1800MHz",
    // Galactic HI
    "1419.8~1421.3MHz",
];

/// Frequency ranges flagged over short baselines only (see [`RFI_UVRANGE`]).
pub const RFI_RANGES: [&str; 15] = [
    // GSM and aviation
    "900MHz~915MHz",
    "925MHz~960MHz",
    "1080MHz~1095MHz",
    // GPS
    "1565MHz~1585MHz",
    "1217MHz~1237MHz",
    "1375MHz~1387MHz",
    "1166MHz~1186MHz",
    // GLONASS
    "1592MHz~1610MHz",
    "1242MHz~1249MHz",
    // Galileo
    "1191MHz~1217MHz",
    "1260MHz~1300MHz",
    // Afristar
    "1453MHz~1490MHz",
    // Iridium
    "1616MHz~1626MHz",
    // Inmarsat
    "1526MHz~1554MHz",
    // Alkantpan
    "1600MHz",
];

/// Baselines over which [`RFI_RANGES`] are flagged.
pub const RFI_UVRANGE: &str = "<600";

/// The PKS B1934-638 calibrator, which has a standard flux model.
pub const PKS_1934: &str = "J1939-6342";
/// The standard used for [`PKS_1934`]
pub const PKS_1934_STANDARD: &str = "Stevens-Reynolds 2016";

/// The PKS B0407-658 calibrator, which needs a manual flux model.
pub const PKS_0408: &str = "J0408-6545";
/// Stokes I, Q, U, V flux densities of [`PKS_0408`] at [`PKS_0408_REFFREQ`] [Jy]
pub const PKS_0408_FLUX_DENSITY: [f64; 4] = [17.066, 0.0, 0.0, 0.0];
/// Spectral index of [`PKS_0408`]
pub const PKS_0408_SPIX: f64 = -1.179;
/// Reference frequency of the [`PKS_0408`] model
pub const PKS_0408_REFFREQ: &str = "1284MHz";

/// Tag inserted in calibration table names, `<ms>_<tag>.K0`
pub const DEFAULT_TABLE_TAG: &str = "tt";

/// Name of the flag version saved after static flagging.
pub const FLAGS_BASIC: &str = "basic";
/// Name of the flag version saved after residual flagging of the bandpass calibrator.
pub const FLAGS_BPCAL_RESIDUAL: &str = "bpcal_residual_flags";
/// Name of the flag version saved after residual flagging of the secondary calibrator.
pub const FLAGS_PCAL_RESIDUAL: &str = "pcal_residual_flags";
/// Name of the flag version saved once the target has been corrected.
pub const FLAGS_REFCAL_FULL: &str = "refcal-full";

/// Suffix of the taylor term 0 image produced by mtmfs deconvolution
pub const IMAGE_TT0_SUFFIX: &str = ".image.tt0";

/// Image arithmetic used for difference images
pub const DIFFERENCE_EXPR: &str = "(IM0-IM1)";
