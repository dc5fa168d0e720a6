//! Adaptive Threshold Estimator — periodically recomputes filter cutoffs
//! from percentile statistics over recent contours.

use crate::config::{ContourConfig, ContourMode};
use crate::types::Diagnostics;

/// Geometry measured for one raw contour, before any accept/reject
/// decision — fed to the estimator regardless of whether that contour is
/// ultimately kept.
#[derive(Debug, Clone, Copy)]
pub struct ContourStats {
    pub area: f64,
    pub solidity: f64,
    pub aspect_ratio: f64,
}

/// The thresholds a single frame's contour filtering pass should use,
/// resolved from the estimator's cache or from config, depending on mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveThresholds {
    pub min_area: f64,
    pub min_solidity: f64,
    pub max_aspect_ratio: f64,
}

const MIN_AREA_BOUNDS: (f64, f64) = (50.0, 1000.0);
const MIN_SOLIDITY_BOUNDS: (f64, f64) = (0.2, 0.8);
const MAX_ASPECT_BOUNDS: (f64, f64) = (2.0, 15.0);

/// Pipeline-scoped cache of adaptively-derived thresholds. Not global —
/// owned by one `Pipeline` instance.
pub struct AdaptiveThresholdEstimator {
    cache: ActiveThresholds,
    last_updated_frame: i64,
}

impl AdaptiveThresholdEstimator {
    pub fn new(cfg: &ContourConfig) -> Self {
        Self {
            cache: ActiveThresholds {
                min_area: cfg.permissive_min_area.clamp(MIN_AREA_BOUNDS.0, MIN_AREA_BOUNDS.1),
                min_solidity: cfg.permissive_min_solidity.clamp(MIN_SOLIDITY_BOUNDS.0, MIN_SOLIDITY_BOUNDS.1),
                max_aspect_ratio: cfg.permissive_max_aspect_ratio.clamp(MAX_ASPECT_BOUNDS.0, MAX_ASPECT_BOUNDS.1),
            },
            // Forces a refresh on the very first call regardless of interval.
            last_updated_frame: -(i64::MAX / 2),
        }
    }

    pub fn reset(&mut self, cfg: &ContourConfig) {
        *self = Self::new(cfg);
    }

    pub fn cached(&self) -> ActiveThresholds {
        self.cache
    }

    /// Recompute the cache from `stats` if `(current_frame - last_updated) >=
    /// updateInterval`; otherwise leave it untouched.
    pub fn maybe_update(
        &mut self,
        current_frame: u64,
        stats: &[ContourStats],
        cfg: &ContourConfig,
        diagnostics: &mut Diagnostics,
    ) {
        let elapsed = current_frame as i64 - self.last_updated_frame;
        if elapsed < cfg.adaptive_update_interval as i64 {
            return;
        }

        let areas: Vec<f64> = stats.iter().map(|s| s.area).filter(|a| *a > 0.0).collect();
        let min_area = if areas.is_empty() {
            cfg.permissive_min_area
        } else {
            percentile(&areas, 10.0)
        }
        .clamp(MIN_AREA_BOUNDS.0, MIN_AREA_BOUNDS.1);

        let solidities: Vec<f64> = stats
            .iter()
            .filter(|s| s.area >= 100.0)
            .map(|s| s.solidity)
            .collect();
        let min_solidity = if solidities.is_empty() {
            self.cache.min_solidity
        } else {
            percentile(&solidities, 25.0)
        }
        .clamp(MIN_SOLIDITY_BOUNDS.0, MIN_SOLIDITY_BOUNDS.1);

        let aspects: Vec<f64> = stats
            .iter()
            .filter(|s| s.area >= 100.0)
            .map(|s| s.aspect_ratio)
            .collect();
        let max_aspect_ratio = if aspects.is_empty() {
            self.cache.max_aspect_ratio
        } else {
            percentile(&aspects, 90.0)
        }
        .clamp(MAX_ASPECT_BOUNDS.0, MAX_ASPECT_BOUNDS.1);

        self.cache = ActiveThresholds { min_area, min_solidity, max_aspect_ratio };
        self.last_updated_frame = current_frame as i64;
        diagnostics.adaptive_refresh_events += 1;
    }

    /// Resolve this frame's active thresholds per the configured mode.
    pub fn active_thresholds(&self, cfg: &ContourConfig) -> ActiveThresholds {
        match cfg.mode {
            ContourMode::Adaptive => self.cache,
            ContourMode::Permissive => ActiveThresholds {
                min_area: cfg.permissive_min_area,
                min_solidity: cfg.permissive_min_solidity,
                max_aspect_ratio: cfg.permissive_max_aspect_ratio,
            },
            ContourMode::Fixed => ActiveThresholds {
                min_area: cfg.fixed_min_area,
                min_solidity: cfg.fixed_min_solidity,
                max_aspect_ratio: cfg.fixed_max_aspect_ratio,
            },
        }
    }
}

/// Linear-interpolation percentile, matching the common "numpy default"
/// convention for determinism across runs.
fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(areas: &[f64]) -> Vec<ContourStats> {
        areas
            .iter()
            .map(|&a| ContourStats { area: a, solidity: 0.5, aspect_ratio: 3.0 })
            .collect()
    }

    #[test]
    fn percentile_bounds_after_refresh() {
        let cfg = ContourConfig::default();
        let mut est = AdaptiveThresholdEstimator::new(&cfg);
        let mut diag = Diagnostics::default();
        let data = stats(&[100.0, 150.0, 200.0, 250.0, 300.0, 180.0]);
        est.maybe_update(0, &data, &cfg, &mut diag);
        let t = est.cached();
        assert!(t.min_area >= 50.0 && t.min_area <= 1000.0);
        assert!(t.min_solidity >= 0.2 && t.min_solidity <= 0.8);
        assert!(t.max_aspect_ratio >= 2.0 && t.max_aspect_ratio <= 15.0);
    }

    #[test]
    fn fallback_used_when_no_valid_contours() {
        let cfg = ContourConfig::default();
        let mut est = AdaptiveThresholdEstimator::new(&cfg);
        let mut diag = Diagnostics::default();
        est.maybe_update(0, &[], &cfg, &mut diag);
        let t = est.cached();
        assert_eq!(t.min_area, cfg.permissive_min_area.clamp(50.0, 1000.0));
    }

    #[test]
    fn does_not_refresh_before_interval() {
        let cfg = ContourConfig::default();
        let mut est = AdaptiveThresholdEstimator::new(&cfg);
        let mut diag = Diagnostics::default();
        est.maybe_update(0, &stats(&[200.0, 210.0]), &cfg, &mut diag);
        let after_first = est.cached();
        est.maybe_update(1, &stats(&[999999.0]), &cfg, &mut diag);
        assert_eq!(est.cached().min_area, after_first.min_area);
        assert_eq!(diag.adaptive_refresh_events, 1);
    }

    #[test]
    fn permissive_mode_ignores_cache() {
        let mut cfg = ContourConfig::default();
        cfg.mode = ContourMode::Permissive;
        let est = AdaptiveThresholdEstimator::new(&cfg);
        let t = est.active_thresholds(&cfg);
        assert_eq!(t.min_area, cfg.permissive_min_area);
    }

    #[test]
    fn fixed_mode_uses_config_exactly() {
        let mut cfg = ContourConfig::default();
        cfg.mode = ContourMode::Fixed;
        cfg.fixed_min_area = 321.0;
        let est = AdaptiveThresholdEstimator::new(&cfg);
        let t = est.active_thresholds(&cfg);
        assert_eq!(t.min_area, 321.0);
    }
}
