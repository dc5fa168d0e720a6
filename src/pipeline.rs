//! Pipeline Orchestrator — wires preprocessing, motion masking, mask
//! cleanup, contour extraction, and region consolidation into one
//! synchronous, single-threaded `&mut self` call per frame.
//!
//! Per-frame processing never raises: an internal stage failure is logged
//! and degrades to an empty/passthrough result for that stage rather than
//! aborting the frame. Only construction can fail, and only because of
//! misconfiguration (`ConfigError`).

use opencv::core::Mat;
use opencv::prelude::*;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::adaptive_threshold::AdaptiveThresholdEstimator;
use crate::config::PipelineConfig;
use crate::consolidator::RegionConsolidator;
use crate::contours;
use crate::error::ConfigError;
use crate::mask_cleaner;
use crate::motion_mask::{MotionMaskBuilder, MotionMaskResult};
use crate::preprocess;
use crate::types::{ConsolidatedRegion, Diagnostics, TrackedRect};

/// Everything one call to `Pipeline::process_frame` produces.
pub struct FrameOutcome {
    pub processed: Mat,
    pub diff: Mat,
    pub motion_mask: Mat,
    pub cleaned_mask: Mat,
    pub rectangles: Vec<TrackedRect>,
    pub regions: Vec<ConsolidatedRegion>,
    pub has_motion: bool,
}

pub struct Pipeline {
    config: PipelineConfig,
    previous_frame: Option<Mat>,
    motion_mask_builder: MotionMaskBuilder,
    estimator: AdaptiveThresholdEstimator,
    consolidator: RegionConsolidator,
    frame_index: u64,
    diagnostics: Diagnostics,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let estimator = AdaptiveThresholdEstimator::new(&config.contour);
        let motion_mask_builder = MotionMaskBuilder::new(config.motion_mask.clone());
        let consolidator = RegionConsolidator::new(config.consolidation.clone());
        info!("pipeline constructed");
        Ok(Self {
            config,
            previous_frame: None,
            motion_mask_builder,
            estimator,
            consolidator,
            frame_index: 0,
            diagnostics: Diagnostics::default(),
        })
    }

    /// Drop all carried-forward state: previous frame, background model,
    /// adaptive threshold cache, and consolidated regions. Configuration is
    /// untouched.
    pub fn reset(&mut self) {
        self.previous_frame = None;
        self.motion_mask_builder.reset();
        self.estimator.reset(&self.config.contour);
        self.consolidator.reset();
        self.frame_index = 0;
        info!("pipeline state reset");
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one frame through every stage. Ids on the returned
    /// `TrackedRect`s are freshly minted (scoped to this single call); the
    /// `identifier` is a UUID, also freshly minted — the consolidated
    /// regions are the only state that persists across frames.
    pub fn process_frame(&mut self, frame: &Mat) -> FrameOutcome {
        self.frame_index += 1;

        let processed = match preprocess::preprocess(frame, &self.config.preprocess) {
            Ok(m) => m,
            Err(e) => {
                error!("preprocess stage failed, degrading to empty frame: {e}");
                Mat::default()
            }
        };
        debug!(frame_index = self.frame_index, rows = processed.rows(), cols = processed.cols(), "preprocess stage complete");

        if let Some(prev) = &self.previous_frame {
            if !prev.empty()
                && !processed.empty()
                && (prev.rows() != processed.rows() || prev.cols() != processed.cols())
            {
                warn!(
                    previous_rows = prev.rows(),
                    previous_cols = prev.cols(),
                    current_rows = processed.rows(),
                    current_cols = processed.cols(),
                    "frame shape changed since the previous frame, resetting pipeline state"
                );
                self.reset();
                self.frame_index = 1;
            }
        }

        let motion = match self.motion_mask_builder.build(
            &processed,
            self.previous_frame.as_ref(),
            &mut self.diagnostics,
        ) {
            Ok(r) => r,
            Err(e) => {
                error!("motion mask stage failed, degrading to empty mask: {e}");
                MotionMaskResult { diff: Mat::default(), mask: Mat::default() }
            }
        };
        debug!(frame_index = self.frame_index, "motion mask stage complete");

        let cleaned = match mask_cleaner::clean(&motion.mask, &self.config.mask_cleaner) {
            Ok(m) => m,
            Err(e) => {
                error!("mask cleaner stage failed, passing raw mask through: {e}");
                motion.mask.clone()
            }
        };
        debug!(frame_index = self.frame_index, "mask cleaner stage complete");

        let rectangles = match contours::extract(
            &cleaned,
            &mut self.estimator,
            &self.config.contour,
            self.frame_index,
            &mut self.diagnostics,
        ) {
            Ok(r) => r,
            Err(e) => {
                error!("contour extraction failed, yielding no rectangles: {e}");
                Vec::new()
            }
        };
        debug!(frame_index = self.frame_index, rectangles = rectangles.len(), "contour extraction stage complete");

        let tracked: Vec<TrackedRect> = rectangles
            .into_iter()
            .enumerate()
            .map(|(i, rect)| TrackedRect { id: i as u64, identifier: Uuid::new_v4().to_string(), rect })
            .collect();

        let has_motion = !tracked.is_empty();
        let regions = self.consolidator.consolidate(&tracked, &mut self.diagnostics);
        debug!(frame_index = self.frame_index, regions = regions.len(), "consolidation stage complete");

        self.previous_frame = Some(processed.clone());

        FrameOutcome {
            processed,
            diff: motion.diff,
            motion_mask: motion.mask,
            cleaned_mask: cleaned,
            rectangles: tracked,
            regions,
            has_motion,
        }
    }
}
