//! Demo driver: reads a video file frame-by-frame and prints per-frame
//! detection and consolidation counts. Not part of the library's public
//! surface — a thin illustration of how a caller wires `Pipeline` up to a
//! real video source.

use clap::Parser;
use motion_pipeline::{Pipeline, PipelineConfig};
use opencv::{prelude::*, videoio};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "motion-demo", about = "Run the motion pipeline over a video file")]
struct Args {
    /// Path to a video file readable by OpenCV's VideoCapture.
    video: String,

    /// Stop after this many frames (0 means run to end of stream).
    #[arg(long, default_value_t = 0)]
    max_frames: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut capture = videoio::VideoCapture::from_file(&args.video, videoio::CAP_ANY)?;
    if !videoio::VideoCapture::is_opened(&capture)? {
        anyhow::bail!("could not open video source: {}", args.video);
    }

    let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
    let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;

    let mut config = PipelineConfig::default();
    if width > 0 && height > 0 {
        config.consolidation.frame_width = width;
        config.consolidation.frame_height = height;
    }

    let mut pipeline = Pipeline::new(config)?;

    let mut frame = Mat::default();
    let mut frame_index = 0u64;

    loop {
        if args.max_frames != 0 && frame_index >= args.max_frames {
            break;
        }
        if !capture.read(&mut frame)? || frame.empty() {
            break;
        }

        let outcome = pipeline.process_frame(&frame);
        frame_index += 1;

        info!(
            frame = frame_index,
            rectangles = outcome.rectangles.len(),
            regions = outcome.regions.len(),
            motion = outcome.has_motion,
            "frame processed"
        );
    }

    let diagnostics = pipeline.diagnostics();
    if diagnostics.degraded_background_frames > 0 {
        warn!(count = diagnostics.degraded_background_frames, "frames degraded to frame-differencing only");
    }
    info!(?diagnostics, frames = frame_index, "run complete");

    Ok(())
}
