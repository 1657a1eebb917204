//! `DsoInitializer`: bootstraps the map from two frames of unknown relative
//! pose via the external stereo matcher and a spherical-terrain depth
//! interpolation (spec.md §4.2).
//!
//! Ported from mdso's `source/system/DsoInitializer.cpp` (the `source/`
//! variant, per the spec.md §9 open-question decision): the matcher's
//! sparse depths seed a `SphericalTerrain`, dense candidates are then
//! ray-looked-up against it, and a small number of reselection passes trade
//! candidate density for in-hull yield.

use nalgebra::{DMatrix, Vector2};

use crate::config::Settings;
use crate::core::affine_light::AffineLightTransform;
use crate::core::camera::CameraModel;
use crate::core::se3::SE3;
use crate::frame::keyframe::KeyFrame;
use crate::frame::pre_keyframe::PreKeyFrame;
use crate::matcher::StereoMatcher;
use crate::point::optimized::{OptimizedPoint, OptimizedStatus};
use crate::point::select::select_points_denser;
use crate::terrain::spherical::{DepthedRay, SphericalTerrain};
use crate::Float;

pub struct DsoInitializer<M: StereoMatcher> {
    matcher: M,
}

/// Outcome of a bootstrap attempt against a single frame pair.
pub struct InitResult {
    pub kf0: KeyFrame,
    pub kf1: KeyFrame,
}

impl<M: StereoMatcher> DsoInitializer<M> {
    pub fn new(matcher: M) -> Self {
        DsoInitializer { matcher }
    }

    pub fn try_init(
        &self,
        frame0_id: u64,
        frame0_image: DMatrix<u8>,
        frame1_id: u64,
        frame1_image: DMatrix<u8>,
        cam: &impl CameraModel,
        settings: &Settings,
    ) -> Option<InitResult> {
        let stereo_match = self.matcher.match_frames(frame0_id, frame1_id)?;

        let rays: Vec<DepthedRay> = stereo_match
            .frame0
            .keypoints
            .iter()
            .zip(stereo_match.frame0.depths.iter())
            .filter(|(_, &d)| d > 0.0)
            .map(|(&kp, &depth)| DepthedRay {
                direction: cam.unmap(kp).normalize(),
                depth,
            })
            .collect();
        if rays.len() < 3 {
            return None;
        }
        let terrain = SphericalTerrain::new(&rays);

        let pre0 = PreKeyFrame::new(
            frame0_image,
            settings.pyr_levels,
            SE3::identity(),
            AffineLightTransform::default(),
            frame0_id,
        );
        let pre1 = PreKeyFrame::new(
            frame1_image,
            settings.pyr_levels,
            stereo_match.motion,
            AffineLightTransform::default(),
            frame1_id,
        );

        let border = 8usize;
        let accepted = self.select_with_reselection(&pre0.grad_norm_sq, cam, &terrain, settings, border);

        let mut kf0 = KeyFrame::new(pre0);
        for (p, depth) in accepted {
            kf0.optimized_points.push(OptimizedPoint {
                p,
                log_inv_depth: -depth.ln(),
                status: OptimizedStatus::Active,
            });
        }

        let kf1 = KeyFrame::new(pre1);
        Some(InitResult { kf0, kf1 })
    }

    fn select_with_reselection(
        &self,
        grad_norm_sq: &DMatrix<u16>,
        cam: &impl CameraModel,
        terrain: &SphericalTerrain,
        settings: &Settings,
        border: usize,
    ) -> Vec<(Vector2<Float>, Float)> {
        const EXTRA_PASSES: usize = 1;
        let mut target = settings.interest_points_used;
        let mut min_cell_distance: u32 = 3;
        let mut accepted = Vec::new();

        for pass in 0..=EXTRA_PASSES {
            let candidates =
                select_points_denser(grad_norm_sq, &[], 1, min_cell_distance, target, border);
            accepted = candidates
                .iter()
                .filter_map(|&p| {
                    let (depth, ok) = terrain.eval(cam.unmap(p));
                    (ok && depth > 0.0).then_some((p, depth))
                })
                .collect();

            if pass == EXTRA_PASSES || candidates.is_empty() {
                break;
            }
            let ratio = accepted.len() as Float / candidates.len() as Float;
            if ratio >= 0.999 {
                break;
            }
            target = ((settings.interest_points_used as Float) * ratio)
                .round()
                .max(1.0) as usize;
            min_cell_distance = min_cell_distance.saturating_sub(1).max(1);
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::camera::EquidistantFisheye;
    use crate::matcher::DummyStereoMatcher;

    fn cam() -> EquidistantFisheye {
        EquidistantFisheye::new(
            100,
            100,
            80.0,
            Vector2::new(50.0, 50.0),
            std::f64::consts::FRAC_PI_2 * 0.9,
        )
    }

    #[test]
    fn try_init_produces_two_keyframes_with_depths() {
        let c = cam();
        let mut keypoints = Vec::new();
        let mut depths = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                keypoints.push(Vector2::new(20.0 + i as Float * 12.0, 20.0 + j as Float * 12.0));
                depths.push(3.0);
            }
        }
        let matcher = DummyStereoMatcher {
            keypoints,
            depths,
            motion: SE3::from_parts(
                nalgebra::Vector3::new(0.0, 0.0, 0.1),
                nalgebra::UnitQuaternion::identity(),
            ),
        };
        let init = DsoInitializer::new(matcher);
        let settings = Settings::default();
        let img0 = DMatrix::from_element(100, 100, 10u8);
        let img1 = DMatrix::from_element(100, 100, 10u8);
        let result = init.try_init(0, img0, 1, img1, &c, &settings);
        assert!(result.is_some());
        let result = result.unwrap();
        assert!(!result.kf0.optimized_points.is_empty());
        assert!(result.kf1.optimized_points.is_empty());
    }
}
