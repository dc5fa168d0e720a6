//! Contour Extractor — external contours → approximated polygons →
//! rectangles, filtered by adaptive area/solidity/aspect thresholds.

use anyhow::Result;
use opencv::{
    core::{Point, Vector},
    imgproc::{self, CHAIN_APPROX_SIMPLE, RETR_EXTERNAL},
    prelude::*,
};

use crate::adaptive_threshold::{AdaptiveThresholdEstimator, ContourStats};
use crate::config::ContourConfig;
use crate::types::{Diagnostics, Rectangle};

type Contour = Vector<Point>;

/// Extract the ordered list of filtered rectangles from a cleaned mask,
/// consulting (and refreshing) the adaptive threshold estimator along the
/// way. Order is contour discovery order; no additional sort.
pub fn extract(
    mask: &opencv::core::Mat,
    estimator: &mut AdaptiveThresholdEstimator,
    cfg: &ContourConfig,
    frame_index: u64,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Rectangle>> {
    if mask.empty() {
        return Ok(Vec::new());
    }

    let mut source = mask.clone();
    let mut contours: Vector<Contour> = Vector::new();
    imgproc::find_contours(
        &mut source,
        &mut contours,
        RETR_EXTERNAL,
        CHAIN_APPROX_SIMPLE,
        Point::new(0, 0),
    )?;

    // Pass 1: raw geometry for every contour, independent of filtering
    // config — the estimator needs fresh percentiles whether or not
    // filtering itself is currently enabled.
    let mut candidates: Vec<(Contour, f64)> = Vec::with_capacity(contours.len());
    let mut stats: Vec<ContourStats> = Vec::with_capacity(contours.len());

    for cnt in contours.iter() {
        let area = imgproc::contour_area(&cnt, false)?;
        if area <= 0.0 {
            diagnostics.degenerate_contours += 1;
            continue;
        }

        let mut hull: Contour = Vector::new();
        imgproc::convex_hull(&cnt, &mut hull, true, true)?;
        let hull_area = imgproc::contour_area(&hull, false)?;
        if hull_area <= 0.0 {
            diagnostics.degenerate_contours += 1;
            continue;
        }
        let solidity = (area / hull_area).min(1.0);

        let bbox = imgproc::bounding_rect(&cnt)?;
        if bbox.width <= 0 || bbox.height <= 0 {
            diagnostics.degenerate_contours += 1;
            continue;
        }
        let aspect_ratio = bbox.width as f64 / bbox.height as f64;

        stats.push(ContourStats { area, solidity, aspect_ratio });
        candidates.push((cnt, area));
    }

    estimator.maybe_update(frame_index, &stats, cfg, diagnostics);
    let thresholds = estimator.active_thresholds(cfg);

    let mut rectangles = Vec::new();

    for (contour, area) in candidates {
        if area < thresholds.min_area {
            diagnostics.rejected_by_area += 1;
            continue;
        }

        let working: Contour = if cfg.polygon_approximation {
            let perimeter = imgproc::arc_length(&contour, true)?;
            let epsilon = cfg.epsilon_factor * perimeter;
            let mut approx: Contour = Vector::new();
            imgproc::approx_poly_dp(&contour, &mut approx, epsilon, true)?;
            if approx.len() >= 3 {
                approx
            } else {
                contour
            }
        } else {
            contour
        };

        let rect = if cfg.hull_analysis {
            let mut hull: Contour = Vector::new();
            imgproc::convex_hull(&working, &mut hull, true, true)?;
            let hull_area = imgproc::contour_area(&hull, false)?;
            if hull_area <= 0.0 {
                diagnostics.degenerate_contours += 1;
                continue;
            }
            let solidity = (area / hull_area).min(1.0);
            if cfg.filtering && solidity < thresholds.min_solidity {
                diagnostics.rejected_by_solidity += 1;
                continue;
            }
            imgproc::bounding_rect(&hull)?
        } else {
            imgproc::bounding_rect(&working)?
        };

        if rect.width <= 0 || rect.height <= 0 {
            diagnostics.degenerate_contours += 1;
            continue;
        }

        let aspect_ratio = rect.width as f64 / rect.height as f64;
        if cfg.filtering && aspect_ratio > thresholds.max_aspect_ratio {
            diagnostics.rejected_by_aspect += 1;
            continue;
        }

        rectangles.push(Rectangle::new(rect.x, rect.y, rect.width, rect.height));
    }

    Ok(rectangles)
}
