//! Motion Mask Builder — frame differencing ± learned background
//! subtraction, combined and thresholded with Otsu's automatic method.

use anyhow::Result;
use opencv::{
    core::{Mat, Ptr, CV_8U},
    imgproc,
    prelude::*,
    video::{self, BackgroundSubtractor, BackgroundSubtractorMOG2},
};
use tracing::warn;

use crate::config::MotionMaskConfig;
use crate::types::Diagnostics;

/// The diff image and the binary mask produced from it for one frame.
pub struct MotionMaskResult {
    pub diff: Mat,
    pub mask: Mat,
}

/// Owns the lazily-constructed learned background model. One instance per
/// pipeline; never shared across pipeline instances.
pub struct MotionMaskBuilder {
    cfg: MotionMaskConfig,
    background: Option<Ptr<dyn BackgroundSubtractorMOG2>>,
}

impl MotionMaskBuilder {
    pub fn new(cfg: MotionMaskConfig) -> Self {
        Self { cfg, background: None }
    }

    pub fn reset(&mut self) {
        self.background = None;
    }

    /// Build the combined motion mask for `current` given `previous` (may be
    /// empty on the first call after construction or a reset).
    pub fn build(
        &mut self,
        current: &Mat,
        previous: Option<&Mat>,
        diagnostics: &mut Diagnostics,
    ) -> Result<MotionMaskResult> {
        if current.empty() {
            return Ok(MotionMaskResult { diff: Mat::default(), mask: Mat::default() });
        }

        let mut combined = match previous {
            Some(prev) if !prev.empty() => {
                let mut diff = Mat::default();
                opencv::core::absdiff(current, prev, &mut diff)?;
                diff
            }
            _ => Mat::new_rows_cols_with_default(
                current.rows(),
                current.cols(),
                current.typ(),
                opencv::core::Scalar::all(0.0),
            )?,
        };
        let diff = combined.clone();

        if self.cfg.background_subtraction {
            match self.apply_background_model(current) {
                Ok(fg) => {
                    let mut ored = Mat::default();
                    opencv::core::bitwise_or(&combined, &fg, &mut ored, &opencv::core::no_array())?;
                    combined = ored;
                }
                Err(e) => {
                    warn!("background model application failed, degrading to frame-differencing only: {e}");
                    diagnostics.degraded_background_frames += 1;
                }
            }
        }

        let mut mask = Mat::default();
        imgproc::threshold(
            &combined,
            &mut mask,
            0.0,
            self.cfg.max_threshold,
            imgproc::THRESH_BINARY + imgproc::THRESH_OTSU,
        )?;

        Ok(MotionMaskResult { diff, mask })
    }

    fn apply_background_model(&mut self, current: &Mat) -> Result<Mat> {
        if current.depth() != CV_8U {
            anyhow::bail!("background model requires an 8-bit frame");
        }
        let subtractor = match &mut self.background {
            Some(s) => s,
            None => {
                let s = video::create_background_subtractor_mog2(
                    self.cfg.bg_history,
                    self.cfg.bg_var_threshold,
                    false,
                )?;
                self.background = Some(s);
                self.background.as_mut().unwrap()
            }
        };
        let mut fg = Mat::default();
        BackgroundSubtractor::apply(subtractor.as_mut(), current, &mut fg, -1.0)?;
        // Strict binary foreground — shadow detection is disabled above, but
        // guard against any stray mid-range values defensively.
        let mut binary = Mat::default();
        imgproc::threshold(&fg, &mut binary, 200.0, self.cfg.max_threshold, imgproc::THRESH_BINARY)?;
        Ok(binary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC1};

    fn blank(w: i32, h: i32, value: f64) -> Mat {
        Mat::new_rows_cols_with_default(h, w, CV_8UC1, Scalar::all(value)).unwrap()
    }

    #[test]
    fn first_call_with_no_previous_yields_zero_mask() {
        let mut builder = MotionMaskBuilder::new(MotionMaskConfig::default());
        let mut diag = Diagnostics::default();
        let frame = blank(32, 32, 10.0);
        let result = builder.build(&frame, None, &mut diag).unwrap();
        let nonzero = opencv::core::count_non_zero(&result.mask).unwrap();
        assert_eq!(nonzero, 0);
    }

    #[test]
    fn identical_frames_yield_zero_mask() {
        let mut builder = MotionMaskBuilder::new(MotionMaskConfig::default());
        let mut diag = Diagnostics::default();
        let frame = blank(32, 32, 50.0);
        let result = builder.build(&frame, Some(&frame), &mut diag).unwrap();
        let nonzero = opencv::core::count_non_zero(&result.mask).unwrap();
        assert_eq!(nonzero, 0);
    }

    #[test]
    fn mask_shape_matches_frame() {
        let mut builder = MotionMaskBuilder::new(MotionMaskConfig::default());
        let mut diag = Diagnostics::default();
        let current = blank(64, 48, 200.0);
        let previous = blank(64, 48, 10.0);
        let result = builder.build(&current, Some(&previous), &mut diag).unwrap();
        assert_eq!(result.mask.cols(), 64);
        assert_eq!(result.mask.rows(), 48);
        assert_eq!(result.diff.cols(), 64);
        assert_eq!(result.diff.rows(), 48);
    }

    #[test]
    fn reset_drops_background_model() {
        let mut cfg = MotionMaskConfig::default();
        cfg.background_subtraction = true;
        let mut builder = MotionMaskBuilder::new(cfg);
        let mut diag = Diagnostics::default();
        let frame = blank(32, 32, 128.0);
        let _ = builder.build(&frame, None, &mut diag);
        assert!(builder.background.is_some());
        builder.reset();
        assert!(builder.background.is_none());
    }
}
