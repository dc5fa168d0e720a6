//! Mask Cleaner — morphological open/close/dilate/erode with an elliptical
//! structuring element.

use anyhow::Result;
use opencv::{
    core::{Mat, Point, Size},
    imgproc::{self, MORPH_CLOSE, MORPH_ELLIPSE, MORPH_OPEN},
    prelude::*,
};

use crate::config::MaskCleanerConfig;

/// Clean a binary mask: close → open → dilate → erode, each step gated by
/// its own flag in `cfg`. When `cfg.enabled` is false, the mask passes
/// through unchanged. Every step preserves the input's shape.
pub fn clean(mask: &Mat, cfg: &MaskCleanerConfig) -> Result<Mat> {
    if !cfg.enabled || mask.empty() {
        return Ok(mask.clone());
    }

    let kernel = imgproc::get_structuring_element(
        MORPH_ELLIPSE,
        Size::new(cfg.kernel_size, cfg.kernel_size),
        Point::new(-1, -1),
    )?;

    let mut current = mask.clone();

    if cfg.close {
        let mut out = Mat::default();
        imgproc::morphology_ex(
            &current,
            &mut out,
            MORPH_CLOSE,
            &kernel,
            Point::new(-1, -1),
            1,
            opencv::core::BORDER_CONSTANT,
            imgproc::morphology_default_border_value()?,
        )?;
        current = out;
    }

    if cfg.open {
        let mut out = Mat::default();
        imgproc::morphology_ex(
            &current,
            &mut out,
            MORPH_OPEN,
            &kernel,
            Point::new(-1, -1),
            1,
            opencv::core::BORDER_CONSTANT,
            imgproc::morphology_default_border_value()?,
        )?;
        current = out;
    }

    if cfg.dilate {
        let mut out = Mat::default();
        imgproc::dilate(
            &current,
            &mut out,
            &kernel,
            Point::new(-1, -1),
            1,
            opencv::core::BORDER_CONSTANT,
            imgproc::morphology_default_border_value()?,
        )?;
        current = out;
    }

    if cfg.erode {
        let mut out = Mat::default();
        imgproc::erode(
            &current,
            &mut out,
            &kernel,
            Point::new(-1, -1),
            1,
            opencv::core::BORDER_CONSTANT,
            imgproc::morphology_default_border_value()?,
        )?;
        current = out;
    }

    Ok(current)
}
