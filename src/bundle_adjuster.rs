//! `BundleAdjuster`: windowed photometric joint optimization of keyframe
//! poses, affine light transforms, and point inverse depths, with gauge
//! fixation for the monocular scale ambiguity (spec.md §4.5).
//!
//! Ported from mdso's `system/BundleAdjuster.cpp` for the residual formula,
//! the `SphericalPlus` gauge, and the
//! `fixedRotationOnSecondKF`/`fixedMotionOnFirstAdjustent` flags; cast onto
//! `levenberg_marquardt::LeastSquaresProblem` the same way as
//! [`crate::tracker`], again differentiating numerically.

use levenberg_marquardt::{differentiate_numerically, LevenbergMarquardt};
use nalgebra::{DMatrix, DVector, Dyn, Matrix, Owned, Point3, Vector2, Vector3};

use crate::core::affine_light::AffineLightTransform;
use crate::core::camera::CameraModel;
use crate::core::geometry::SphericalPlus;
use crate::core::interpolation::BiCubicInterpolator;
use crate::core::se3::SE3;
use crate::core::so3;
use crate::point::optimized::OptimizedStatus;
use crate::Float;

/// A read-only view of one window keyframe, assembled by the caller from
/// its `KeyFrame`/`PreKeyFrame` state. `points` are this keyframe's own
/// `OptimizedPoint`s (the ones for which this keyframe is the base frame).
#[derive(Clone)]
pub struct KeyframeView<'a, C: CameraModel> {
    pub id: u64,
    pub world_to_this: SE3,
    pub light: AffineLightTransform,
    pub cam: &'a C,
    pub interp: BiCubicInterpolator<'a>,
    pub grad_norm_sq: &'a DMatrix<u16>,
    pub points: Vec<PointRef>,
}

/// One point owned by a `KeyframeView`, by value so the problem can mutate
/// its depth through the solve without borrowing the originating keyframe.
#[derive(Clone, Copy)]
pub struct PointRef {
    pub p: Vector2<Float>,
    pub log_inv_depth: Float,
}

/// Per-keyframe gauge policy, decided once per bundle-adjustment call.
#[derive(Clone, Copy)]
pub enum FrameGauge {
    /// Pose and light fixed entirely; contributes no parameters.
    Fixed,
    /// Translation constrained to a sphere via `SphericalPlus` (2 DoF);
    /// rotation optionally also fixed.
    Spherical { sphere: SphericalPlus, fix_rotation: bool },
    /// Ordinary 6-DoF pose plus 2-DoF light.
    Free,
}

struct FrameLayout {
    gauge: FrameGauge,
    /// Offset into the frame-parameter segment of the parameter vector;
    /// `None` for `Fixed` frames.
    offset: Option<usize>,
    width: usize,
}

fn frame_width(gauge: &FrameGauge) -> usize {
    match gauge {
        FrameGauge::Fixed => 0,
        FrameGauge::Spherical { fix_rotation, .. } => {
            2 + 2 + if *fix_rotation { 0 } else { 3 }
        }
        FrameGauge::Free => 8,
    }
}

pub struct BundleAdjusterSettings {
    pub outlier_diff: Float,
    pub grad_weighting_c: Float,
    pub depth_min: Float,
    pub depth_max: Float,
    pub max_num_iterations: u32,
}

struct Problem<'a, C: CameraModel> {
    frames: Vec<KeyframeView<'a, C>>,
    layouts: Vec<FrameLayout>,
    /// `(frame_idx, point_idx)` for every point parameter, in the order it
    /// appears at the front of the parameter vector (group 0).
    point_index: Vec<(usize, usize)>,
    settings: BundleAdjusterSettings,
    params: DVector<Float>,
    num_point_params: usize,
}

impl<'a, C: CameraModel> Clone for Problem<'a, C> {
    fn clone(&self) -> Self {
        Problem {
            frames: self.frames.clone(),
            layouts: self
                .layouts
                .iter()
                .map(|l| FrameLayout {
                    gauge: l.gauge,
                    offset: l.offset,
                    width: l.width,
                })
                .collect(),
            point_index: self.point_index.clone(),
            settings: BundleAdjusterSettings {
                outlier_diff: self.settings.outlier_diff,
                grad_weighting_c: self.settings.grad_weighting_c,
                depth_min: self.settings.depth_min,
                depth_max: self.settings.depth_max,
                max_num_iterations: self.settings.max_num_iterations,
            },
            params: self.params.clone(),
            num_point_params: self.num_point_params,
        }
    }
}

impl<'a, C: CameraModel> Problem<'a, C> {
    fn resolved_frame(&self, idx: usize) -> (SE3, AffineLightTransform) {
        let layout = &self.layouts[idx];
        let view = &self.frames[idx];
        match (layout.gauge, layout.offset) {
            (FrameGauge::Fixed, _) => (view.world_to_this, view.light),
            (FrameGauge::Free, Some(off)) => {
                let omega = Vector3::new(self.params[off], self.params[off + 1], self.params[off + 2]);
                let t = Vector3::new(self.params[off + 3], self.params[off + 4], self.params[off + 5]);
                let a = self.params[off + 6];
                let b = self.params[off + 7];
                (SE3::from_parts(t, so3::exp(omega).0), AffineLightTransform::new(a, b))
            }
            (FrameGauge::Spherical { sphere, fix_rotation }, Some(off)) => {
                let mut cursor = off;
                let rotation = if fix_rotation {
                    view.world_to_this.rotation()
                } else {
                    let omega = Vector3::new(self.params[cursor], self.params[cursor + 1], self.params[cursor + 2]);
                    cursor += 3;
                    so3::exp(omega).0
                };
                let delta = Vector2::new(self.params[cursor], self.params[cursor + 1]);
                cursor += 2;
                let t = sphere.plus(view.world_to_this.translation(), delta);
                let a = self.params[cursor];
                let b = self.params[cursor + 1];
                (SE3::from_parts(t, rotation), AffineLightTransform::new(a, b))
            }
            (FrameGauge::Free, None) | (FrameGauge::Spherical { .. }, None) => {
                unreachable!("non-fixed gauge must have an offset")
            }
        }
    }

    fn log_inv_depth(&self, i: usize) -> Float {
        let raw = self.params[i];
        let min_lid = -self.settings.depth_max.ln();
        let max_lid = -self.settings.depth_min.ln();
        raw.clamp(min_lid, max_lid)
    }

    /// Raw (un-huberized, unweighted) photometric diffs per point, grouped
    /// by global point-parameter index, plus whether each point was on-image
    /// in at least one `(base, ref)` pair. Used only for the post-solve
    /// outlier/OOB classification, not by the solver itself.
    fn raw_diffs_by_point(&self) -> (Vec<Vec<Float>>, Vec<bool>) {
        let poses: Vec<(SE3, AffineLightTransform)> =
            (0..self.frames.len()).map(|i| self.resolved_frame(i)).collect();

        let mut diffs = vec![Vec::new(); self.num_point_params];
        let mut seen = vec![false; self.num_point_params];

        for (base_idx, base) in self.frames.iter().enumerate() {
            let (base_pose, base_light) = poses[base_idx];
            for (ref_idx, ref_view) in self.frames.iter().enumerate() {
                if ref_idx == base_idx {
                    continue;
                }
                let (ref_pose, ref_light) = poses[ref_idx];
                let base_to_ref = ref_pose.compose(&base_pose.inverse());

                let mut base_light_n = base_light;
                let mut ref_light_n = ref_light;
                AffineLightTransform::normalize_multiplier(&mut base_light_n, &mut ref_light_n);

                for (local_point_idx, point) in base.points.iter().enumerate() {
                    let global_idx = self
                        .point_index
                        .iter()
                        .position(|&(f, p)| f == base_idx && p == local_point_idx)
                        .expect("every point must have a parameter slot");
                    let depth = (-self.log_inv_depth(global_idx)).exp();
                    let dir_base = base.cam.unmap(point.p).normalize();
                    let x_ref = base_to_ref.act_point(Point3::from(dir_base * depth));
                    let pixel = ref_view.cam.map(x_ref.coords);
                    if !ref_view.cam.is_on_image(pixel, 2.0) {
                        continue;
                    }
                    let (Some(ri), Some(bi)) =
                        (ref_view.interp.eval(pixel.x, pixel.y), base.interp.eval(point.p.x, point.p.y))
                    else {
                        continue;
                    };
                    seen[global_idx] = true;
                    diffs[global_idx].push(ref_light_n.apply(ri) - base_light_n.apply(bi));
                }
            }
        }
        (diffs, seen)
    }

    /// Classify every point as `Active` (median photometric diff within
    /// `outlier_diff`), `Outlier` (exceeds it), or `OutOfBounds` (never
    /// landed on-image in any pair).
    fn classify_points(&self) -> Vec<OptimizedStatus> {
        let (diffs, seen) = self.raw_diffs_by_point();
        diffs
            .iter()
            .zip(seen.iter())
            .map(|(d, &was_seen)| {
                if !was_seen || d.is_empty() {
                    OptimizedStatus::OutOfBounds
                } else {
                    let mut sorted: Vec<Float> = d.iter().map(|v| v.abs()).collect();
                    sorted.sort_by(|a, b| a.total_cmp(b));
                    let median = sorted[sorted.len() / 2];
                    if median > self.settings.outlier_diff {
                        OptimizedStatus::Outlier
                    } else {
                        OptimizedStatus::Active
                    }
                }
            })
            .collect()
    }
}

impl<'a, C: CameraModel> levenberg_marquardt::LeastSquaresProblem<Float, Dyn, Dyn> for Problem<'a, C> {
    type ParameterStorage = Owned<Float, Dyn>;
    type ResidualStorage = Owned<Float, Dyn>;
    type JacobianStorage = Owned<Float, Dyn, Dyn>;

    fn set_params(&mut self, x: &DVector<Float>) {
        self.params = x.clone();
    }

    fn params(&self) -> DVector<Float> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<Float>> {
        let poses: Vec<(SE3, AffineLightTransform)> =
            (0..self.frames.len()).map(|i| self.resolved_frame(i)).collect();

        let mut out = Vec::new();
        for (base_idx, base) in self.frames.iter().enumerate() {
            let (base_pose, base_light) = poses[base_idx];
            for (ref_idx, ref_view) in self.frames.iter().enumerate() {
                if ref_idx == base_idx {
                    continue;
                }
                let (ref_pose, ref_light) = poses[ref_idx];
                let base_to_ref = ref_pose.compose(&base_pose.inverse());

                let mut base_light_n = base_light;
                let mut ref_light_n = ref_light;
                AffineLightTransform::normalize_multiplier(&mut base_light_n, &mut ref_light_n);

                for (local_point_idx, point) in base.points.iter().enumerate() {
                    let global_idx = self
                        .point_index
                        .iter()
                        .position(|&(f, p)| f == base_idx && p == local_point_idx)
                        .expect("every point must have a parameter slot");
                    let log_inv_depth = self.log_inv_depth(global_idx);
                    let depth = (-log_inv_depth).exp();
                    let dir_base = base.cam.unmap(point.p).normalize();

                    let grad = grad_norm_at(base.grad_norm_sq, point.p);
                    let weight = (self.settings.grad_weighting_c
                        / self.settings.grad_weighting_c.hypot(grad))
                    .sqrt();

                    let x_base = dir_base * depth;
                    let x_ref = base_to_ref.act_point(Point3::from(x_base));
                    let pixel = ref_view.cam.map(x_ref.coords);
                    let on_image = ref_view.cam.is_on_image(pixel, 2.0);
                    let ref_val = if on_image {
                        ref_view.interp.eval(pixel.x, pixel.y)
                    } else {
                        None
                    };
                    let base_val = base.interp.eval(point.p.x, point.p.y);

                    let residual = match (ref_val, base_val) {
                        (Some(ri), Some(bi)) => {
                            let diff = ref_light_n.apply(ri) - base_light_n.apply(bi);
                            weight * huber_sqrt(diff, self.settings.outlier_diff)
                        }
                        _ => 0.0,
                    };
                    out.push(residual);
                }
            }
        }
        Some(DVector::from_vec(out))
    }

    fn jacobian(&self) -> Option<Matrix<Float, Dyn, Dyn, Self::JacobianStorage>> {
        let mut clone = self.clone();
        differentiate_numerically(&mut clone)
    }
}

fn huber_sqrt(diff: Float, threshold: Float) -> Float {
    let a = diff.abs();
    if a <= threshold {
        diff
    } else {
        let huber = threshold * (2.0 * a - threshold);
        diff.signum() * huber.max(0.0).sqrt()
    }
}

/// `p` is a level-0 pixel coordinate; `grad_norm_sq` is one `halve` coarser
/// than level 0 (`core::multires::gradients_squared_norm`), so the lookup
/// divides by the grid's downsample factor first.
fn grad_norm_at(grad_norm_sq: &DMatrix<u16>, p: Vector2<Float>) -> Float {
    let (rows, cols) = grad_norm_sq.shape();
    let r = ((p.y / 2.0).round() as isize).clamp(0, rows as isize - 1) as usize;
    let c = ((p.x / 2.0).round() as isize).clamp(0, cols as isize - 1) as usize;
    (grad_norm_sq[(r, c)] as Float).sqrt()
}

/// Solve result: refined `(pose, light)` per window keyframe (in input
/// order) and refined `log_inv_depth` per point (grouped by keyframe, in
/// each keyframe's point order).
pub struct SolveResult {
    pub frame_poses: Vec<(SE3, AffineLightTransform)>,
    pub point_depths: Vec<Vec<Float>>,
    /// Post-solve classification, grouped the same way as `point_depths`.
    pub point_status: Vec<Vec<OptimizedStatus>>,
    pub converged: bool,
}

pub struct BundleAdjuster {
    pub settings: BundleAdjusterSettings,
}

impl BundleAdjuster {
    pub fn new(settings: BundleAdjusterSettings) -> Self {
        BundleAdjuster { settings }
    }

    /// Run one bundle-adjustment solve over `frames` (already in window
    /// order, index 0 the oldest/first keyframe).
    ///
    /// `fixed_rotation_on_second_kf` / `fixed_motion_on_first_adjustent`
    /// mirror the configuration flags of the same name.
    pub fn solve<'a, C: CameraModel>(
        &self,
        frames: Vec<KeyframeView<'a, C>>,
        second_kf_sphere: Option<SphericalPlus>,
        fixed_rotation_on_second_kf: bool,
        fixed_motion_on_first_adjustent: bool,
    ) -> SolveResult {
        assert!(frames.len() >= 2, "bundle adjustment needs at least 2 keyframes");

        let second_kf_fixed = fixed_motion_on_first_adjustent && frames.len() == 2;

        let mut layouts = Vec::with_capacity(frames.len());
        let mut cursor = 0usize;
        for (idx, view) in frames.iter().enumerate() {
            let gauge = if idx == 0 {
                FrameGauge::Fixed
            } else if idx == 1 {
                if second_kf_fixed {
                    FrameGauge::Fixed
                } else if let Some(sphere) = second_kf_sphere {
                    FrameGauge::Spherical {
                        sphere,
                        fix_rotation: fixed_rotation_on_second_kf,
                    }
                } else {
                    FrameGauge::Free
                }
            } else {
                FrameGauge::Free
            };
            let width = frame_width(&gauge);
            let offset = if width == 0 {
                None
            } else {
                let off = cursor;
                cursor += width;
                Some(off)
            };
            layouts.push(FrameLayout { gauge, offset, width });
            let _ = view.id;
        }

        let mut point_index = Vec::new();
        let mut point_params = Vec::new();
        for (fi, f) in frames.iter().enumerate() {
            for (pi, p) in f.points.iter().enumerate() {
                point_index.push((fi, pi));
                point_params.push(p.log_inv_depth);
            }
        }
        let num_point_params = point_params.len();

        // Re-offset frame params after the point-parameter block (group 0
        // is depths, group 1 is frames, per the parameter-ordering hint).
        for layout in layouts.iter_mut() {
            if let Some(off) = layout.offset.as_mut() {
                *off += num_point_params;
            }
        }

        let total_frame_params: usize = layouts.iter().map(|l| l.width).sum();
        let mut frame_params = vec![0.0; total_frame_params];
        for (idx, view) in frames.iter().enumerate() {
            let layout = &layouts[idx];
            let Some(off) = layout.offset else { continue };
            let local = off - num_point_params;
            match layout.gauge {
                FrameGauge::Free => {
                    let (omega, _) = view.world_to_this.log_rotation();
                    frame_params[local] = omega.x;
                    frame_params[local + 1] = omega.y;
                    frame_params[local + 2] = omega.z;
                    frame_params[local + 3] = view.world_to_this.translation().x;
                    frame_params[local + 4] = view.world_to_this.translation().y;
                    frame_params[local + 5] = view.world_to_this.translation().z;
                    frame_params[local + 6] = view.light.a;
                    frame_params[local + 7] = view.light.b;
                }
                FrameGauge::Spherical { fix_rotation, .. } => {
                    let mut c = local;
                    if !fix_rotation {
                        let (omega, _) = view.world_to_this.log_rotation();
                        frame_params[c] = omega.x;
                        frame_params[c + 1] = omega.y;
                        frame_params[c + 2] = omega.z;
                        c += 3;
                    }
                    // Start the spherical delta at the origin of the
                    // tangent plane (i.e. at the keyframe's own translation).
                    frame_params[c] = 0.0;
                    frame_params[c + 1] = 0.0;
                    c += 2;
                    frame_params[c] = view.light.a;
                    frame_params[c + 1] = view.light.b;
                }
                FrameGauge::Fixed => {}
            }
        }

        let mut params = point_params;
        params.extend(frame_params);
        let params = DVector::from_vec(params);

        let problem = Problem {
            frames,
            layouts,
            point_index,
            settings: BundleAdjusterSettings {
                outlier_diff: self.settings.outlier_diff,
                grad_weighting_c: self.settings.grad_weighting_c,
                depth_min: self.settings.depth_min,
                depth_max: self.settings.depth_max,
                max_num_iterations: self.settings.max_num_iterations,
            },
            params,
            num_point_params,
        };

        let (result, report) = LevenbergMarquardt::new()
            .with_patience(self.settings.max_num_iterations as usize)
            .minimize(problem.clone());

        let solved = if report.termination.was_successful() {
            result
        } else {
            problem
        };

        let frame_poses = (0..solved.frames.len())
            .map(|i| solved.resolved_frame(i))
            .collect();
        let mut point_depths: Vec<Vec<Float>> = solved.frames.iter().map(|f| vec![0.0; f.points.len()]).collect();
        for (global_idx, &(fi, pi)) in solved.point_index.iter().enumerate() {
            point_depths[fi][pi] = (-solved.log_inv_depth(global_idx)).exp();
        }

        let classification = solved.classify_points();
        let mut point_status: Vec<Vec<OptimizedStatus>> = solved
            .frames
            .iter()
            .map(|f| vec![OptimizedStatus::OutOfBounds; f.points.len()])
            .collect();
        for (global_idx, &(fi, pi)) in solved.point_index.iter().enumerate() {
            point_status[fi][pi] = classification[global_idx];
        }

        SolveResult {
            frame_poses,
            point_depths,
            point_status,
            converged: report.termination.was_successful(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::camera::EquidistantFisheye;

    fn cam() -> EquidistantFisheye {
        EquidistantFisheye::new(
            64,
            64,
            60.0,
            Vector2::new(32.0, 32.0),
            std::f64::consts::FRAC_PI_2 * 0.9,
        )
    }

    #[test]
    fn solve_runs_on_two_keyframe_window() {
        let c = cam();
        let img = DMatrix::from_fn(64, 64, |r, col| ((r + col) % 256) as u8);
        let grad = DMatrix::<u16>::from_element(32, 32, 10);
        let interp0 = BiCubicInterpolator::new(&img);
        let interp1 = BiCubicInterpolator::new(&img);

        let points = vec![
            PointRef { p: Vector2::new(20.0, 20.0), log_inv_depth: -(3.0f64).ln() },
            PointRef { p: Vector2::new(40.0, 25.0), log_inv_depth: -(4.0f64).ln() },
        ];

        let kf0 = KeyframeView {
            id: 0,
            world_to_this: SE3::identity(),
            light: AffineLightTransform::default(),
            cam: &c,
            interp: interp0,
            grad_norm_sq: &grad,
            points,
        };
        let kf1 = KeyframeView {
            id: 1,
            world_to_this: SE3::from_parts(Vector3::new(0.1, 0.0, 0.0), nalgebra::UnitQuaternion::identity()),
            light: AffineLightTransform::default(),
            cam: &c,
            interp: interp1,
            grad_norm_sq: &grad,
            points: vec![],
        };

        let sphere = SphericalPlus::new(Vector3::zeros(), 0.1);
        let ba = BundleAdjuster::new(BundleAdjusterSettings {
            outlier_diff: 12.0,
            grad_weighting_c: 50.0,
            depth_min: 1e-3,
            depth_max: 1e3,
            max_num_iterations: 10,
        });
        let result = ba.solve(vec![kf0, kf1], Some(sphere), false, false);
        assert_eq!(result.frame_poses.len(), 2);
        assert_eq!(result.point_depths[0].len(), 2);
        assert_eq!(result.point_status[0].len(), 2);
        // Gauge: first keyframe must stay exactly at its input pose.
        approx::assert_relative_eq!(
            result.frame_poses[0].0.translation(),
            Vector3::zeros(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn points_never_on_image_in_any_pair_are_classified_out_of_bounds() {
        let c = cam();
        let img = DMatrix::from_fn(64, 64, |r, col| ((r + col) % 256) as u8);
        let grad = DMatrix::<u16>::from_element(32, 32, 10);
        let interp0 = BiCubicInterpolator::new(&img);
        let interp1 = BiCubicInterpolator::new(&img);

        // This point's base pixel is near the image edge; with a depth
        // small enough, its reprojection under kf1's translation falls
        // off-image in every (base, ref) pair.
        let points = vec![PointRef { p: Vector2::new(2.0, 2.0), log_inv_depth: -(0.01f64).ln() }];

        let kf0 = KeyframeView {
            id: 0,
            world_to_this: SE3::identity(),
            light: AffineLightTransform::default(),
            cam: &c,
            interp: interp0,
            grad_norm_sq: &grad,
            points,
        };
        let kf1 = KeyframeView {
            id: 1,
            world_to_this: SE3::from_parts(Vector3::new(0.1, 0.0, 0.0), nalgebra::UnitQuaternion::identity()),
            light: AffineLightTransform::default(),
            cam: &c,
            interp: interp1,
            grad_norm_sq: &grad,
            points: vec![],
        };

        let sphere = SphericalPlus::new(Vector3::zeros(), 0.1);
        let ba = BundleAdjuster::new(BundleAdjusterSettings {
            outlier_diff: 12.0,
            grad_weighting_c: 50.0,
            depth_min: 1e-3,
            depth_max: 1e3,
            max_num_iterations: 10,
        });
        let result = ba.solve(vec![kf0, kf1], Some(sphere), false, false);
        assert_eq!(result.point_status[0][0], OptimizedStatus::OutOfBounds);
    }

    #[test]
    fn two_frame_window_with_fixed_motion_keeps_both_poses_fixed() {
        let c = cam();
        let img = DMatrix::from_fn(64, 64, |r, col| ((r + col) % 256) as u8);
        let grad = DMatrix::<u16>::from_element(32, 32, 10);
        let interp0 = BiCubicInterpolator::new(&img);
        let interp1 = BiCubicInterpolator::new(&img);

        let points = vec![PointRef { p: Vector2::new(20.0, 20.0), log_inv_depth: -(3.0f64).ln() }];
        let kf0_pose = SE3::identity();
        let kf1_pose = SE3::from_parts(Vector3::new(0.1, 0.0, 0.0), nalgebra::UnitQuaternion::identity());

        let kf0 = KeyframeView {
            id: 0,
            world_to_this: kf0_pose,
            light: AffineLightTransform::default(),
            cam: &c,
            interp: interp0,
            grad_norm_sq: &grad,
            points,
        };
        let kf1 = KeyframeView {
            id: 1,
            world_to_this: kf1_pose,
            light: AffineLightTransform::default(),
            cam: &c,
            interp: interp1,
            grad_norm_sq: &grad,
            points: vec![],
        };

        let ba = BundleAdjuster::new(BundleAdjusterSettings {
            outlier_diff: 12.0,
            grad_weighting_c: 50.0,
            depth_min: 1e-3,
            depth_max: 1e3,
            max_num_iterations: 10,
        });
        // `fixed_motion_on_first_adjustent=true` with exactly two keyframes:
        // both poses stay bit-identical to the input, only depths move.
        let result = ba.solve(vec![kf0, kf1], None, false, true);
        approx::assert_relative_eq!(result.frame_poses[0].0.translation(), kf0_pose.translation(), epsilon = 1e-12);
        approx::assert_relative_eq!(result.frame_poses[1].0.translation(), kf1_pose.translation(), epsilon = 1e-12);
    }

    #[test]
    fn injected_outlier_point_is_classified_outlier() {
        // Exercises `Problem::classify_points` directly (both frames fixed,
        // no solve) so the injected photometric corruption can't be
        // optimized away by the depth/pose search — isolates the
        // classification logic from solver convergence.
        let c = cam();
        let img0 = DMatrix::from_fn(64, 64, |_, _| 100u8);
        let mut img1 = DMatrix::from_fn(64, 64, |_, _| 100u8);
        for r in 15..30 {
            for col in 15..30 {
                img1[(r, col)] = 250;
            }
        }
        let grad = DMatrix::<u16>::from_element(32, 32, 10);
        let interp0 = BiCubicInterpolator::new(&img0);
        let interp1 = BiCubicInterpolator::new(&img1);

        let points = vec![PointRef { p: Vector2::new(20.0, 20.0), log_inv_depth: -(3.0f64).ln() }];

        let kf0 = KeyframeView {
            id: 0,
            world_to_this: SE3::identity(),
            light: AffineLightTransform::default(),
            cam: &c,
            interp: interp0,
            grad_norm_sq: &grad,
            points,
        };
        let kf1 = KeyframeView {
            id: 1,
            world_to_this: SE3::from_parts(Vector3::new(0.01, 0.0, 0.0), nalgebra::UnitQuaternion::identity()),
            light: AffineLightTransform::default(),
            cam: &c,
            interp: interp1,
            grad_norm_sq: &grad,
            points: vec![],
        };

        let log_inv_depth = kf0.points[0].log_inv_depth;
        let problem = Problem {
            frames: vec![kf0, kf1],
            layouts: vec![
                FrameLayout { gauge: FrameGauge::Fixed, offset: None, width: 0 },
                FrameLayout { gauge: FrameGauge::Fixed, offset: None, width: 0 },
            ],
            point_index: vec![(0, 0)],
            settings: BundleAdjusterSettings {
                outlier_diff: 12.0,
                grad_weighting_c: 50.0,
                depth_min: 1e-3,
                depth_max: 1e3,
                max_num_iterations: 10,
            },
            params: DVector::from_vec(vec![log_inv_depth]),
            num_point_params: 1,
        };
        let classification = problem.classify_points();
        assert_eq!(classification[0], OptimizedStatus::Outlier);
    }
}
