//! Builders for the calls which split, image, export and difference data.

use crate::{
    config::ImagingConfig,
    constants::{DIFFERENCE_EXPR, IMAGE_TT0_SUFFIX},
    task::{TaskCall, TaskValue},
};

fn empty_list() -> TaskValue {
    TaskValue::StrList(vec![])
}

/// Copy the corrected data of `field` into a new dataset `outputvis`.
pub fn split_field(vis: &str, outputvis: &str, field: &str) -> TaskCall {
    TaskCall::new("mstransform")
        .arg("vis", vis)
        .arg("outputvis", outputvis)
        .arg("field", field)
        .arg("usewtspectrum", true)
        .arg("realmodelcol", true)
        .arg("datacolumn", "corrected")
}

/// Deconvolve the corrected data of `vis` into `imagename`, restricted to
/// `spw` and `timerange` (empty strings select everything).
///
/// Parameters not in [`ImagingConfig`] are fixed to a wide-field mfs setup
/// which saves the model into the model column.
pub fn tclean(
    vis: &str,
    imagename: &str,
    spw: &str,
    timerange: &str,
    imaging: &ImagingConfig,
) -> TaskCall {
    let [nx, ny] = imaging.imsize;
    TaskCall::new("tclean")
        // selection
        .arg("vis", vis)
        .arg("selectdata", true)
        .arg("field", "")
        .arg("spw", spw)
        .arg("timerange", timerange)
        .arg("uvrange", "")
        .arg("antenna", "")
        .arg("scan", "")
        .arg("observation", "")
        .arg("intent", "")
        .arg("datacolumn", "corrected")
        // image definition
        .arg("imagename", imagename)
        .arg("imsize", vec![i64::from(nx), i64::from(ny)])
        .arg("cell", vec![imaging.cell.clone()])
        .arg("phasecenter", "")
        .arg("stokes", &imaging.stokes)
        .arg("projection", &imaging.projection)
        .arg("startmodel", "")
        .arg("specmode", &imaging.specmode)
        .arg("reffreq", "")
        .arg("nchan", -1_i64)
        .arg("start", "")
        .arg("width", "")
        .arg("outframe", "LSRK")
        .arg("veltype", "radio")
        .arg("restfreq", empty_list())
        .arg("interpolation", "linear")
        .arg("perchanweightdensity", true)
        // gridding
        .arg("gridder", &imaging.gridder)
        .arg("facets", 1_i64)
        .arg("psfphasecenter", "")
        .arg("chanchunks", 1_i64)
        .arg("wprojplanes", -1_i64)
        .arg("vptable", "")
        .arg("mosweight", true)
        .arg("aterm", true)
        .arg("psterm", false)
        .arg("wbawp", false)
        .arg("conjbeams", false)
        .arg("cfcache", "")
        .arg("usepointing", false)
        .arg("computepastep", 360.0)
        .arg("rotatepastep", 360.0)
        .arg("pointingoffsetsigdev", empty_list())
        .arg("pblimit", -1_i64)
        .arg("normtype", "flatnoise")
        // deconvolution
        .arg("deconvolver", &imaging.deconvolver)
        .arg("scales", imaging.scales.clone())
        .arg("nterms", imaging.nterms)
        .arg("smallscalebias", 0.6)
        .arg("restoration", true)
        .arg("restoringbeam", empty_list())
        .arg("pbcor", false)
        .arg("outlierfile", "")
        // weighting
        .arg("weighting", &imaging.weighting)
        .arg("robust", imaging.robust)
        .arg("noise", "1.0Jy")
        .arg("npixels", 0_i64)
        .arg("uvtaper", empty_list())
        // iteration control
        .arg("niter", imaging.niter)
        .arg("gain", imaging.gain)
        .arg("threshold", &imaging.threshold)
        .arg("nsigma", 0.0)
        .arg("cycleniter", -1_i64)
        .arg("cyclefactor", 0.5)
        .arg("minpsffraction", 0.05)
        .arg("maxpsffraction", 0.8)
        .arg("interactive", false)
        // masking
        .arg("usemask", &imaging.usemask)
        .arg("mask", "")
        .arg("pbmask", 0.0)
        .arg("sidelobethreshold", imaging.sidelobethreshold)
        .arg("noisethreshold", imaging.noisethreshold)
        .arg("lownoisethreshold", imaging.lownoisethreshold)
        .arg("negativethreshold", imaging.negativethreshold)
        .arg("smoothfactor", imaging.smoothfactor)
        .arg("minbeamfrac", imaging.minbeamfrac)
        .arg("cutthreshold", imaging.cutthreshold)
        .arg("growiterations", imaging.growiterations)
        .arg("dogrowprune", true)
        .arg("minpercentchange", -1.0)
        .arg("verbose", false)
        .arg("fastnoise", true)
        .arg("restart", true)
        .arg("savemodel", &imaging.savemodel)
        .arg("calcres", true)
        .arg("calcpsf", true)
        .arg("parallel", false)
}

/// The FITS file exported for image `name`.
pub fn fits_name(name: &str) -> String {
    format!("{name}.fits")
}

/// Export `image` to the FITS file `fitsimage`.
pub fn exportfits(image: &str, fitsimage: &str) -> TaskCall {
    TaskCall::new("exportfits")
        .arg("imagename", image)
        .arg("fitsimage", fitsimage)
}

/// Export the taylor term 0 image of a deconvolution named `name` to
/// `<name>.fits`.
pub fn export_tt0(name: &str) -> TaskCall {
    exportfits(&format!("{name}{IMAGE_TT0_SUFFIX}"), &fits_name(name))
}

/// Subtract FITS image `b` from FITS image `a` into the image `outfile`.
pub fn difference(a: &str, b: &str, outfile: &str) -> TaskCall {
    TaskCall::new("immath")
        .arg("imagename", vec![a.to_string(), b.to_string()])
        .arg("mode", "evalexpr")
        .arg("outfile", outfile)
        .arg("expr", DIFFERENCE_EXPR)
        .arg("varnames", "")
        .arg("sigma", "0.0mJy/beam")
        .arg("polithresh", "")
        .arg("mask", "")
        .arg("region", "")
        .arg("box", "")
        .arg("chans", "")
        .arg("stokes", "")
        .arg("stretch", false)
        .arg("imagemd", "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tclean_uses_config() {
        let imaging = ImagingConfig {
            niter: 100,
            imsize: [512, 256],
            ..ImagingConfig::default()
        };
        let call = tclean("t.ms", "T_on", "0:900~1600MHz", "10:00:00~10:00:08", &imaging);
        assert_eq!(call.get("niter"), Some(&TaskValue::Int(100)));
        assert_eq!(call.get("imsize"), Some(&TaskValue::IntList(vec![512, 256])));
        assert_eq!(call.get_str("spw"), Some("0:900~1600MHz"));
        assert_eq!(call.get_str("timerange"), Some("10:00:00~10:00:08"));
        assert_eq!(call.get_str("datacolumn"), Some("corrected"));
        assert_eq!(call.get_str("savemodel"), Some("modelcolumn"));
        assert_eq!(
            call.get("cell"),
            Some(&TaskValue::StrList(vec!["3.0arcsec".into()]))
        );
    }

    #[test]
    fn test_tclean_renders_defaults() {
        let rendered = tclean("t.ms", "T_full", "", "", &ImagingConfig::default()).render_python();
        assert!(rendered.starts_with("tclean(vis='t.ms',selectdata=True,field='',spw='',timerange=''"));
        assert!(rendered.contains("imsize=[5000, 5000],cell=['3.0arcsec']"));
        assert!(rendered.contains("scales=[0, 5, 15],nterms=2"));
        assert!(rendered.contains("threshold='0.05mJy'"));
        assert!(rendered.contains("restfreq=[]"));
        assert!(rendered.ends_with("calcres=True,calcpsf=True,parallel=False)"));
    }

    #[test]
    fn test_export_and_difference() {
        assert_eq!(
            export_tt0("T_full").render_python(),
            "exportfits(imagename='T_full.image.tt0',fitsimage='T_full.fits')"
        );
        let call = difference("T_on.fits", "T_before.fits", "on-before");
        assert_eq!(
            call.get("imagename").and_then(TaskValue::as_str_list),
            Some(&["T_on.fits".to_string(), "T_before.fits".to_string()][..])
        );
        assert_eq!(call.get_str("expr"), Some("(IM0-IM1)"));
    }

    #[test]
    fn test_split_field() {
        assert_eq!(
            split_field("a.ms", "t.ms", "T").render_python(),
            "mstransform(vis='a.ms',outputvis='t.ms',field='T',usewtspectrum=True,\
             realmodelcol=True,datacolumn='corrected')"
        );
    }
}
