//! Typed, validated-at-construction pipeline configuration.
//!
//! The pipeline never reads a file or environment variable itself — that's
//! the out-of-scope "Configuration source" collaborator's job. Callers build
//! a `PipelineConfig` however they like (TOML, env, hardcoded) and hand it to
//! `Pipeline::new`, which validates it once.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Whether the preprocessor converts to grayscale immediately, or filters in
/// color space first and converts at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    Grayscale,
    PassThroughColor,
}

impl Default for ColorMode {
    fn default() -> Self {
        ColorMode::Grayscale
    }
}

/// Closed set of blur strategies — a tagged variant per component design
/// guidance, rather than a string-keyed conditional chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BlurKind {
    Gaussian { size: i32 },
    Median { size: i32 },
    Bilateral { diameter: i32, sigma_color: f64, sigma_space: f64 },
    None,
}

impl Default for BlurKind {
    fn default() -> Self {
        BlurKind::Gaussian { size: 5 }
    }
}

/// Contour filtering strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContourMode {
    Adaptive,
    Permissive,
    Fixed,
}

impl Default for ContourMode {
    fn default() -> Self {
        ContourMode::Adaptive
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    #[serde(default)]
    pub color_mode: ColorMode,
    #[serde(default)]
    pub contrast_enhancement: bool,
    #[serde(default = "default_clahe_clip_limit")]
    pub clahe_clip_limit: f64,
    #[serde(default = "default_clahe_tile_size")]
    pub clahe_tile_size: i32,
    #[serde(default)]
    pub blur: BlurKind,
}

fn default_clahe_clip_limit() -> f64 {
    2.0
}
fn default_clahe_tile_size() -> i32 {
    8
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            color_mode: ColorMode::default(),
            contrast_enhancement: false,
            clahe_clip_limit: default_clahe_clip_limit(),
            clahe_tile_size: default_clahe_tile_size(),
            blur: BlurKind::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionMaskConfig {
    #[serde(default)]
    pub background_subtraction: bool,
    #[serde(default = "default_max_threshold")]
    pub max_threshold: f64,
    /// History length (frames) for the learned background estimator.
    #[serde(default = "default_bg_history")]
    pub bg_history: i32,
    /// MOG2 variance threshold — controls how far a pixel must deviate
    /// from the learned background distribution to count as foreground.
    #[serde(default = "default_bg_var_threshold")]
    pub bg_var_threshold: f64,
}

fn default_max_threshold() -> f64 {
    255.0
}
fn default_bg_history() -> i32 {
    500
}
fn default_bg_var_threshold() -> f64 {
    50.0
}

impl Default for MotionMaskConfig {
    fn default() -> Self {
        Self {
            background_subtraction: false,
            max_threshold: default_max_threshold(),
            bg_history: default_bg_history(),
            bg_var_threshold: default_bg_var_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskCleanerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_morph_kernel_size")]
    pub kernel_size: i32,
    #[serde(default = "default_true")]
    pub close: bool,
    #[serde(default = "default_true")]
    pub open: bool,
    #[serde(default = "default_true")]
    pub dilate: bool,
    #[serde(default)]
    pub erode: bool,
}

fn default_true() -> bool {
    true
}
fn default_morph_kernel_size() -> i32 {
    5
}

impl Default for MaskCleanerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kernel_size: default_morph_kernel_size(),
            close: true,
            open: true,
            dilate: true,
            erode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContourConfig {
    #[serde(default = "default_true")]
    pub filtering: bool,
    #[serde(default = "default_true")]
    pub hull_analysis: bool,
    #[serde(default = "default_true")]
    pub polygon_approximation: bool,
    #[serde(default = "default_epsilon_factor")]
    pub epsilon_factor: f64,
    #[serde(default)]
    pub mode: ContourMode,
    #[serde(default = "default_permissive_min_area")]
    pub permissive_min_area: f64,
    #[serde(default = "default_permissive_min_solidity")]
    pub permissive_min_solidity: f64,
    #[serde(default = "default_permissive_max_aspect_ratio")]
    pub permissive_max_aspect_ratio: f64,
    #[serde(default = "default_fixed_min_area")]
    pub fixed_min_area: f64,
    #[serde(default = "default_fixed_min_solidity")]
    pub fixed_min_solidity: f64,
    #[serde(default = "default_fixed_max_aspect_ratio")]
    pub fixed_max_aspect_ratio: f64,
    #[serde(default = "default_adaptive_update_interval")]
    pub adaptive_update_interval: u64,
}

fn default_epsilon_factor() -> f64 {
    0.03
}
fn default_permissive_min_area() -> f64 {
    50.0
}
fn default_permissive_min_solidity() -> f64 {
    0.1
}
fn default_permissive_max_aspect_ratio() -> f64 {
    10.0
}
fn default_fixed_min_area() -> f64 {
    100.0
}
fn default_fixed_min_solidity() -> f64 {
    0.3
}
fn default_fixed_max_aspect_ratio() -> f64 {
    6.0
}
fn default_adaptive_update_interval() -> u64 {
    150
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            filtering: true,
            hull_analysis: true,
            polygon_approximation: true,
            epsilon_factor: default_epsilon_factor(),
            mode: ContourMode::default(),
            permissive_min_area: default_permissive_min_area(),
            permissive_min_solidity: default_permissive_min_solidity(),
            permissive_max_aspect_ratio: default_permissive_max_aspect_ratio(),
            fixed_min_area: default_fixed_min_area(),
            fixed_min_solidity: default_fixed_min_solidity(),
            fixed_max_aspect_ratio: default_fixed_max_aspect_ratio(),
            adaptive_update_interval: default_adaptive_update_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    #[serde(default = "default_eps")]
    pub eps: f64,
    #[serde(default = "default_min_points")]
    pub min_points: usize,
    #[serde(default = "default_overlap_weight")]
    pub overlap_weight: f64,
    #[serde(default = "default_edge_weight")]
    pub edge_weight: f64,
    #[serde(default = "default_max_edge_distance")]
    pub max_edge_distance: f64,
    #[serde(default = "default_expansion_factor")]
    pub expansion_factor: f64,
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,
    #[serde(default = "default_max_frames_without_update")]
    pub max_frames_without_update: u32,
    #[serde(default = "default_merge_overlap_ratio")]
    pub merge_overlap_ratio: f64,
}

fn default_eps() -> f64 {
    50.0
}
fn default_min_points() -> usize {
    2
}
fn default_overlap_weight() -> f64 {
    0.7
}
fn default_edge_weight() -> f64 {
    0.3
}
fn default_max_edge_distance() -> f64 {
    100.0
}
fn default_expansion_factor() -> f64 {
    1.1
}
fn default_frame_width() -> u32 {
    1920
}
fn default_frame_height() -> u32 {
    1080
}
fn default_max_frames_without_update() -> u32 {
    10
}
fn default_merge_overlap_ratio() -> f64 {
    0.3
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            eps: default_eps(),
            min_points: default_min_points(),
            overlap_weight: default_overlap_weight(),
            edge_weight: default_edge_weight(),
            max_edge_distance: default_max_edge_distance(),
            expansion_factor: default_expansion_factor(),
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
            max_frames_without_update: default_max_frames_without_update(),
            merge_overlap_ratio: default_merge_overlap_ratio(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    #[serde(default)]
    pub motion_mask: MotionMaskConfig,
    #[serde(default)]
    pub mask_cleaner: MaskCleanerConfig,
    #[serde(default)]
    pub contour: ContourConfig,
    #[serde(default)]
    pub consolidation: ConsolidationConfig,
}

impl PipelineConfig {
    /// Validate this configuration, surfacing misconfiguration at
    /// construction time rather than silently repairing it. The single most
    /// error-prone knob — `overlap_weight + edge_weight == 1` — is checked
    /// first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sum = self.consolidation.overlap_weight + self.consolidation.edge_weight;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::InvalidWeights(
                self.consolidation.overlap_weight,
                self.consolidation.edge_weight,
                sum,
            ));
        }

        if self.consolidation.eps <= 0.0 {
            return Err(ConfigError::NonPositive { field: "consolidation.eps", value: self.consolidation.eps });
        }
        if self.consolidation.max_edge_distance <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "consolidation.max_edge_distance",
                value: self.consolidation.max_edge_distance,
            });
        }
        if self.consolidation.expansion_factor <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "consolidation.expansion_factor",
                value: self.consolidation.expansion_factor,
            });
        }
        if self.consolidation.frame_width == 0 || self.consolidation.frame_height == 0 {
            return Err(ConfigError::InvalidFrameSize {
                width: self.consolidation.frame_width,
                height: self.consolidation.frame_height,
            });
        }
        if self.consolidation.min_points == 0 {
            return Err(ConfigError::NonPositive { field: "consolidation.min_points", value: 0.0 });
        }

        if self.mask_cleaner.enabled && self.mask_cleaner.kernel_size <= 0 {
            return Err(ConfigError::NonPositive {
                field: "mask_cleaner.kernel_size",
                value: self.mask_cleaner.kernel_size as f64,
            });
        }

        if self.preprocess.contrast_enhancement {
            if self.preprocess.clahe_clip_limit <= 0.0 {
                return Err(ConfigError::NonPositive {
                    field: "preprocess.clahe_clip_limit",
                    value: self.preprocess.clahe_clip_limit,
                });
            }
            if self.preprocess.clahe_tile_size <= 0 {
                return Err(ConfigError::NonPositive {
                    field: "preprocess.clahe_tile_size",
                    value: self.preprocess.clahe_tile_size as f64,
                });
            }
        }

        match self.preprocess.blur {
            BlurKind::Gaussian { size } if size <= 0 => {
                return Err(ConfigError::NonPositive { field: "preprocess.blur.size", value: size as f64 })
            }
            BlurKind::Median { size } if size <= 0 => {
                return Err(ConfigError::NonPositive { field: "preprocess.blur.size", value: size as f64 })
            }
            BlurKind::Bilateral { diameter, .. } if diameter <= 0 => {
                return Err(ConfigError::NonPositive {
                    field: "preprocess.blur.diameter",
                    value: diameter as f64,
                })
            }
            _ => {}
        }

        if self.contour.permissive_min_area <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "contour.permissive_min_area",
                value: self.contour.permissive_min_area,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn unequal_weights_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.consolidation.overlap_weight = 0.5;
        cfg.consolidation.edge_weight = 0.2;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidWeights(..))));
    }

    #[test]
    fn zero_eps_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.consolidation.eps = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_frame_size_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.consolidation.frame_width = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidFrameSize { .. })));
    }
}
