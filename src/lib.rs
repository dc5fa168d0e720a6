//! Two-stage, CPU-bound motion analysis: per-frame rectangle detection
//! followed by density-based consolidation of those rectangles into
//! persistent tracked regions.
//!
//! The crate is a library only: it neither reads configuration from disk
//! nor owns a video source. See `bin/motion_demo.rs` for a runnable
//! driver built on top of it.

pub mod adaptive_threshold;
pub mod config;
pub mod consolidator;
pub mod contours;
pub mod error;
pub mod mask_cleaner;
pub mod motion_mask;
pub mod pipeline;
pub mod preprocess;
pub mod types;

pub use config::PipelineConfig;
pub use error::ConfigError;
pub use pipeline::{FrameOutcome, Pipeline};
pub use types::{ConsolidatedRegion, Diagnostics, Rectangle, TrackedRect};
