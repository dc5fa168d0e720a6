//! Construction-time configuration errors.
//!
//! Per-frame processing never raises — see `pipeline::FrameOutcome`. Only
//! `Pipeline::new` can fail, and only because of misconfiguration.

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("overlap_weight + edge_weight must equal 1.0, got {0} + {1} = {2}")]
    InvalidWeights(f64, f64, f64),

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("percentile bounds for {field} are impossible: low={low} > high={high}")]
    ImpossiblePercentileBounds {
        field: &'static str,
        low: f64,
        high: f64,
    },

    #[error("frame size must be positive, got {width}x{height}")]
    InvalidFrameSize { width: u32, height: u32 },
}
