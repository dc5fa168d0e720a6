//! End-to-end scenarios driving `Pipeline` directly, mirroring the
//! synthetic-scene checks used at the unit level but through the full
//! preprocess → motion mask → mask cleaner → contours → consolidator chain.

use motion_pipeline::{Pipeline, PipelineConfig};
use opencv::{
    core::{Mat, Scalar, CV_8UC1},
    imgproc,
    prelude::*,
};

fn blank(w: i32, h: i32, value: f64) -> Mat {
    Mat::new_rows_cols_with_default(h, w, CV_8UC1, Scalar::all(value)).unwrap()
}

fn with_square(w: i32, h: i32, x: i32, y: i32, side: i32, value: f64) -> Mat {
    let mut mat = blank(w, h, 0.0);
    let rect = opencv::core::Rect::new(x, y, side, side);
    imgproc::rectangle(&mut mat, rect, Scalar::all(value), -1, imgproc::LINE_8, 0).unwrap();
    mat
}

fn default_config() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.consolidation.frame_width = 640;
    cfg.consolidation.frame_height = 480;
    cfg
}

#[test]
fn static_scene_yields_no_regions_over_many_frames() {
    let mut pipeline = Pipeline::new(default_config()).unwrap();
    let frame = blank(640, 480, 120.0);
    for _ in 0..8 {
        let outcome = pipeline.process_frame(&frame);
        assert!(!outcome.has_motion);
        assert!(outcome.regions.is_empty());
    }
}

#[test]
fn single_moving_blob_yields_exactly_one_region() {
    let mut pipeline = Pipeline::new(default_config()).unwrap();
    let empty = blank(640, 480, 0.0);
    let scene = with_square(640, 480, 250, 180, 80, 255.0);

    pipeline.process_frame(&empty);
    let outcome = pipeline.process_frame(&scene);

    assert!(outcome.has_motion);
    assert_eq!(outcome.regions.len(), 1);
    let region = &outcome.regions[0];
    for r in &outcome.rectangles {
        assert!(region.bounds.x <= r.rect.x && region.bounds.y <= r.rect.y);
        assert!(region.bounds.right() >= r.rect.right() && region.bounds.bottom() >= r.rect.bottom());
    }
}

#[test]
fn single_blob_region_persists_across_a_gap_then_is_evicted() {
    let mut cfg = default_config();
    cfg.consolidation.max_frames_without_update = 3;
    let mut pipeline = Pipeline::new(cfg).unwrap();

    let empty = blank(640, 480, 0.0);
    let scene = with_square(640, 480, 250, 180, 80, 255.0);

    pipeline.process_frame(&empty);
    let created = pipeline.process_frame(&scene);
    assert_eq!(created.regions.len(), 1);

    let mut still_alive = false;
    for _ in 0..3 {
        let outcome = pipeline.process_frame(&scene);
        if !outcome.regions.is_empty() {
            still_alive = true;
        }
    }
    assert!(still_alive, "a single blob's region should survive a short gap in detection");

    let mut evicted = false;
    for _ in 0..5 {
        let outcome = pipeline.process_frame(&scene);
        if outcome.regions.is_empty() {
            evicted = true;
            break;
        }
    }
    assert!(evicted, "a single blob's region should eventually be evicted past max_frames_without_update");
}

#[test]
fn two_nearby_blobs_consolidate_into_one_region() {
    let mut pipeline = Pipeline::new(default_config()).unwrap();
    let empty = blank(640, 480, 0.0);
    let mut scene = with_square(640, 480, 200, 200, 60, 255.0);
    imgproc::rectangle(
        &mut scene,
        opencv::core::Rect::new(270, 200, 60, 60),
        Scalar::all(255.0),
        -1,
        imgproc::LINE_8,
        0,
    )
    .unwrap();

    pipeline.process_frame(&empty);
    let outcome = pipeline.process_frame(&scene);

    assert!(outcome.has_motion);
    assert_eq!(outcome.regions.len(), 1);
    for r in &outcome.rectangles {
        assert!(r.rect.width > 0 && r.rect.height > 0);
    }
}

#[test]
fn two_distant_blob_pairs_stay_in_separate_regions() {
    let mut pipeline = Pipeline::new(default_config()).unwrap();
    let empty = blank(640, 480, 0.0);

    let mut scene = with_square(640, 480, 50, 50, 40, 255.0);
    for (x, y) in [(100, 50), (450, 380), (500, 380)] {
        imgproc::rectangle(&mut scene, opencv::core::Rect::new(x, y, 40, 40), Scalar::all(255.0), -1, imgproc::LINE_8, 0)
            .unwrap();
    }

    pipeline.process_frame(&empty);
    let outcome = pipeline.process_frame(&scene);

    assert_eq!(outcome.regions.len(), 2);
    for region in &outcome.regions {
        assert!(region.bounds.x >= 0 && region.bounds.y >= 0);
        assert!(region.bounds.right() <= 640 && region.bounds.bottom() <= 480);
    }
}

#[test]
fn two_nearby_blobs_region_survives_a_gap_then_gets_evicted() {
    let mut cfg = default_config();
    cfg.consolidation.max_frames_without_update = 3;
    let mut pipeline = Pipeline::new(cfg).unwrap();

    let empty = blank(640, 480, 0.0);
    let mut scene = with_square(640, 480, 300, 220, 50, 255.0);
    imgproc::rectangle(&mut scene, opencv::core::Rect::new(365, 220, 50, 50), Scalar::all(255.0), -1, imgproc::LINE_8, 0)
        .unwrap();

    pipeline.process_frame(&empty);
    let created = pipeline.process_frame(&scene);
    assert_eq!(created.regions.len(), 1);

    // The object stops moving: subsequent frames are identical, so the
    // motion mask goes quiet, but the region should tolerate a short gap.
    let mut still_alive = false;
    for _ in 0..3 {
        let outcome = pipeline.process_frame(&scene);
        if !outcome.regions.is_empty() {
            still_alive = true;
            assert!(outcome.regions[0].frames_since_update >= 1);
        }
    }
    assert!(still_alive, "region should survive at least one gap frame within the staleness bound");

    // Past the configured bound, the now-idle region is evicted.
    let mut evicted = false;
    for _ in 0..5 {
        let outcome = pipeline.process_frame(&scene);
        if outcome.regions.is_empty() {
            evicted = true;
            break;
        }
    }
    assert!(evicted, "region should eventually be evicted once it exceeds max_frames_without_update");
}

#[test]
fn adaptive_mode_recalibrates_periodically() {
    let mut cfg = default_config();
    cfg.contour.adaptive_update_interval = 5;
    let mut pipeline = Pipeline::new(cfg).unwrap();

    let a = blank(640, 480, 0.0);
    let b = with_square(640, 480, 100, 100, 60, 200.0);

    for i in 0..20 {
        let frame = if i % 2 == 0 { &a } else { &b };
        pipeline.process_frame(frame);
    }

    assert!(pipeline.diagnostics().adaptive_refresh_events >= 2);
}

#[test]
fn reset_drops_previous_detections_and_regions() {
    let mut pipeline = Pipeline::new(default_config()).unwrap();
    let empty = blank(640, 480, 0.0);
    let scene = with_square(640, 480, 150, 150, 60, 255.0);

    pipeline.process_frame(&empty);
    let before = pipeline.process_frame(&scene);
    assert_eq!(before.regions.len(), 1);

    pipeline.reset();

    let after_reset = pipeline.process_frame(&scene);
    // With history dropped, the first frame after reset has no previous
    // frame to diff against, so no motion is detected yet.
    assert!(!after_reset.has_motion);
}
