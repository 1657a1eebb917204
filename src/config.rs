//! Runtime configuration, grouped exactly as in the specification: each
//! sub-struct is named after, and owned by, the subsystem that consumes it.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::point::pattern::ResidualPattern;
use crate::Float;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AffineLightSettings {
    pub optimize_affine_light: bool,
    pub min_affine_light_a: Float,
    pub max_affine_light_a: Float,
    pub min_affine_light_b: Float,
    pub max_affine_light_b: Float,
}

impl Default for AffineLightSettings {
    fn default() -> Self {
        AffineLightSettings {
            optimize_affine_light: true,
            min_affine_light_a: -2.0,
            max_affine_light_a: 2.0,
            min_affine_light_b: -128.0,
            max_affine_light_b: 128.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DepthSettings {
    pub min: Float,
    pub max: Float,
}

impl Default for DepthSettings {
    fn default() -> Self {
        DepthSettings {
            min: 1e-3,
            max: 1e3,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct IntencitySettings {
    /// Huber threshold, and the outlier classification threshold after BA.
    pub outlier_diff: Float,
}

impl Default for IntencitySettings {
    fn default() -> Self {
        IntencitySettings { outlier_diff: 12.0 }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct GradWeightingSettings {
    pub c: Float,
}

impl Default for GradWeightingSettings {
    fn default() -> Self {
        GradWeightingSettings { c: 50.0 }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ThreadingSettings {
    pub num_threads: usize,
}

impl Default for ThreadingSettings {
    fn default() -> Self {
        ThreadingSettings { num_threads: 4 }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct BundleAdjusterSettings {
    pub fixed_rotation_on_second_kf: bool,
    pub fixed_motion_on_first_adjustent: bool,
    pub max_num_iterations: usize,
}

impl Default for BundleAdjusterSettings {
    fn default() -> Self {
        BundleAdjusterSettings {
            fixed_rotation_on_second_kf: false,
            fixed_motion_on_first_adjustent: false,
            max_num_iterations: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct KeyframePolicySettings {
    /// Promote to a keyframe once the tracked translation since the last
    /// keyframe exceeds this (in the base keyframe's unit of depth).
    pub translation_threshold: Float,
    /// Promote once the tracked rotation angle (radians) since the last
    /// keyframe exceeds this.
    pub rotation_threshold: Float,
    /// Promote once the fraction of base-keyframe points still on-image in
    /// the tracked frame drops below this.
    pub min_inlier_fraction: Float,
    /// Minimum activation quality (second-best/best energy ratio) for an
    /// immature point to be promoted to `OptimizedPoint` on keyframe creation.
    pub min_activation_quality: Float,
}

impl Default for KeyframePolicySettings {
    fn default() -> Self {
        KeyframePolicySettings {
            translation_threshold: 0.12,
            rotation_threshold: 0.08,
            min_inlier_fraction: 0.6,
            min_activation_quality: 1.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub affine_light: AffineLightSettings,
    pub residual_pattern: ResidualPattern,
    pub depth: DepthSettings,
    pub intencity: IntencitySettings,
    pub grad_weighting: GradWeightingSettings,
    pub threading: ThreadingSettings,
    pub bundle_adjuster: BundleAdjusterSettings,
    pub keyframe_policy: KeyframePolicySettings,

    pub pyr_levels: usize,
    pub first_frames_skip: usize,
    pub interest_points_used: usize,
    pub epipolar_on_image_test_count: usize,
    pub epipolar_outlier_intencity_diff: Float,
    pub min_second_best_distance: Float,

    pub track_from_last_kf: bool,
    pub use_orb_initialization: bool,
    pub output_directory: String,

    /// Bound on the sliding window size (insertion-ordered keyframe map).
    pub window_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            affine_light: AffineLightSettings::default(),
            residual_pattern: ResidualPattern::default(),
            depth: DepthSettings::default(),
            intencity: IntencitySettings::default(),
            grad_weighting: GradWeightingSettings::default(),
            threading: ThreadingSettings::default(),
            bundle_adjuster: BundleAdjusterSettings::default(),
            keyframe_policy: KeyframePolicySettings::default(),
            pyr_levels: 6,
            first_frames_skip: 1,
            interest_points_used: 2000,
            epipolar_on_image_test_count: 11,
            epipolar_outlier_intencity_diff: 12.0,
            min_second_best_distance: 3.0,
            track_from_last_kf: true,
            use_orb_initialization: true,
            output_directory: "output".to_string(),
            window_size: 7,
        }
    }
}

impl Settings {
    /// Validate cross-field invariants. Violations are fatal at construction,
    /// per the specification's `ConfigurationError` policy: reject the whole run.
    pub fn validate(&self) -> Result<()> {
        if self.depth.min <= 0.0 || self.depth.max <= self.depth.min {
            return Err(Error::Configuration(format!(
                "invalid depth bounds: min={} max={}",
                self.depth.min, self.depth.max
            )));
        }
        if self.affine_light.min_affine_light_a > self.affine_light.max_affine_light_a
            || self.affine_light.min_affine_light_b > self.affine_light.max_affine_light_b
        {
            return Err(Error::Configuration(
                "affine light bounds crossed".to_string(),
            ));
        }
        if self.residual_pattern.offsets.is_empty() {
            return Err(Error::Configuration(
                "residual pattern must have at least one offset".to_string(),
            ));
        }
        if self.pyr_levels == 0 {
            return Err(Error::Configuration(
                "pyr_levels must be at least 1".to_string(),
            ));
        }
        if self.window_size < 2 {
            return Err(Error::Configuration(
                "window_size must allow at least 2 keyframes (gauge fixation needs a second keyframe)".to_string(),
            ));
        }
        if !self.use_orb_initialization {
            // The original's "dummy" initializer path activates immature points
            // without ever assigning a depth, leaving `OptimizedPoint::log_inv_depth`
            // uninitialized (spec.md §9, Open Questions). There is no depth
            // source for that path in this crate, so it is rejected outright.
            return Err(Error::Configuration(
                "use_orb_initialization = false has no supported depth source".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn crossed_depth_bounds_rejected() {
        let mut s = Settings::default();
        s.depth.min = 10.0;
        s.depth.max = 1.0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn dummy_initializer_path_rejected() {
        let mut s = Settings::default();
        s.use_orb_initialization = false;
        assert!(s.validate().is_err());
    }
}
