//! Frame Preprocessor — colorspace conversion, contrast normalization, denoise.
//!
//! Deterministic and stateless. Rejects empty frames by returning an empty
//! `Mat` rather than failing.

use anyhow::Result;
use opencv::{
    core::{Mat, Size, Vector, CV_8U},
    imgproc,
    prelude::*,
};

use crate::config::{BlurKind, ColorMode, PreprocessConfig};

/// Run the full preprocessing chain. Always returns a single-channel 8-bit
/// image (same dimensions as `frame`), or an empty `Mat` if `frame` is empty.
pub fn preprocess(frame: &Mat, cfg: &PreprocessConfig) -> Result<Mat> {
    if frame.empty() {
        return Ok(Mat::default());
    }

    let mut working = match cfg.color_mode {
        ColorMode::Grayscale => to_grayscale(frame)?,
        ColorMode::PassThroughColor => frame.clone(),
    };

    if cfg.contrast_enhancement {
        working = enhance_contrast(&working, cfg.clahe_clip_limit, cfg.clahe_tile_size)?;
    }

    working = apply_blur(&working, &cfg.blur)?;

    if cfg.color_mode == ColorMode::PassThroughColor {
        working = to_grayscale(&working)?;
    }

    Ok(working)
}

fn to_grayscale(mat: &Mat) -> Result<Mat> {
    if mat.channels() == 1 {
        return Ok(mat.clone());
    }
    let mut gray = Mat::default();
    imgproc::cvt_color(mat, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
    Ok(gray)
}

/// Local histogram equalization (CLAHE) with a configurable clip limit and
/// tile grid. For a single-channel image CLAHE is applied directly; for a
/// color image it is applied to the L channel of a Lab conversion so color
/// is preserved.
pub fn enhance_contrast(mat: &Mat, clip_limit: f64, tile_size: i32) -> Result<Mat> {
    let grid = Size::new(tile_size, tile_size);
    let mut clahe = imgproc::create_clahe(clip_limit, grid)?;

    if mat.channels() == 1 {
        let mut out = Mat::default();
        clahe.apply(mat, &mut out)?;
        return Ok(out);
    }

    let mut lab = Mat::default();
    imgproc::cvt_color(mat, &mut lab, imgproc::COLOR_BGR2Lab, 0)?;

    let mut channels: Vector<Mat> = Vector::new();
    opencv::core::split(&lab, &mut channels)?;

    let mut l_eq = Mat::default();
    clahe.apply(&channels.get(0)?, &mut l_eq)?;
    channels.set(0, l_eq)?;

    let mut lab_eq = Mat::default();
    opencv::core::merge(&channels, &mut lab_eq)?;

    let mut bgr = Mat::default();
    imgproc::cvt_color(&lab_eq, &mut bgr, imgproc::COLOR_Lab2BGR, 0)?;
    Ok(bgr)
}

/// Apply the configured blur. Bilateral filtering requires 8-bit input; the
/// source is coerced to `CV_8U` before filtering if it isn't already.
pub fn apply_blur(mat: &Mat, kind: &BlurKind) -> Result<Mat> {
    match *kind {
        BlurKind::None => Ok(mat.clone()),
        BlurKind::Gaussian { size } => {
            let k = odd(size);
            let mut out = Mat::default();
            imgproc::gaussian_blur(
                mat,
                &mut out,
                Size::new(k, k),
                0.0,
                0.0,
                opencv::core::BORDER_DEFAULT,
            )?;
            Ok(out)
        }
        BlurKind::Median { size } => {
            let k = odd(size);
            let mut out = Mat::default();
            imgproc::median_blur(mat, &mut out, k)?;
            Ok(out)
        }
        BlurKind::Bilateral { diameter, sigma_color, sigma_space } => {
            let src8 = coerce_8bit(mat)?;
            let mut out = Mat::default();
            imgproc::bilateral_filter(
                &src8,
                &mut out,
                diameter,
                sigma_color,
                sigma_space,
                opencv::core::BORDER_DEFAULT,
            )?;
            Ok(out)
        }
    }
}

fn coerce_8bit(mat: &Mat) -> Result<Mat> {
    if mat.depth() == CV_8U {
        return Ok(mat.clone());
    }
    let mut out = Mat::default();
    mat.convert_to(&mut out, CV_8U, 1.0, 0.0)?;
    Ok(out)
}

/// OpenCV kernel sizes must be odd; round any configured even size up by one.
fn odd(size: i32) -> i32 {
    if size % 2 == 0 {
        size + 1
    } else {
        size
    }
}
