//! Two-view triangulation, spherical-cap clipping of an epipolar search
//! segment, and the `SphericalPlus` manifold used to fix monocular scale.
//!
//! Ported from mdso's `system/ImmaturePoint.cpp` (triangulate call sites,
//! `intersectOnSphere` precondition/contract) and `system/BundleAdjuster.cpp`
//! (`SphericalPlus` construction from the first-to-second keyframe baseline).

use nalgebra::{Vector2, Vector3};

use super::se3::SE3;
use crate::Float;

/// Two-view mid-point triangulation from unit ray directions.
///
/// `base_to_ref` maps points expressed in the base frame to the reference
/// frame. Returns signed depths `(depth_base, depth_ref)`; a valid
/// correspondence has both positive.
pub fn triangulate(base_to_ref: &SE3, dir_base: Vector3<Float>, dir_ref: Vector3<Float>) -> (Float, Float) {
    let r_dir_base = base_to_ref.rotation() * dir_base;
    let t = base_to_ref.translation();

    // Solve least-squares for [depth_base, depth_ref] in
    // r_dir_base * depth_base - dir_ref * depth_ref = -t
    let a11 = r_dir_base.dot(&r_dir_base);
    let a12 = -r_dir_base.dot(&dir_ref);
    let a22 = dir_ref.dot(&dir_ref);
    let b1 = r_dir_base.dot(&(-t));
    let b2 = (-dir_ref).dot(&(-t));

    let det = a11 * a22 - a12 * a12;
    if det.abs() < 1e-12 {
        return (Float::NAN, Float::NAN);
    }
    let depth_base = (b1 * a22 - a12 * b2) / det;
    let depth_ref = (a11 * b2 - a12 * b1) / det;
    (depth_base, depth_ref)
}

fn slerp(a: Vector3<Float>, b: Vector3<Float>, t: Float) -> Vector3<Float> {
    let cos_theta = a.dot(&b).clamp(-1.0, 1.0);
    let theta = cos_theta.acos();
    if theta < 1e-9 {
        return a;
    }
    let sin_theta = theta.sin();
    let wa = ((1.0 - t) * theta).sin() / sin_theta;
    let wb = (t * theta).sin() / sin_theta;
    (wa * a + wb * b).normalize()
}

fn bisect_boundary(
    a: Vector3<Float>,
    b: Vector3<Float>,
    cos_max_angle: Float,
    mut t_in: Float,
    mut t_out: Float,
) -> Float {
    for _ in 0..30 {
        let mid = 0.5 * (t_in + t_out);
        if slerp(a, b, mid).z >= cos_max_angle {
            t_in = mid;
        } else {
            t_out = mid;
        }
    }
    t_in
}

/// Clip the great-circle segment between `dir_min` and `dir_max` (both unit
/// vectors) to the spherical cap `z >= cos(max_angle)`, mutating the
/// endpoints in place. Returns `false` if the intersection is empty.
pub fn intersect_on_sphere(
    max_angle: Float,
    dir_min: &mut Vector3<Float>,
    dir_max: &mut Vector3<Float>,
) -> bool {
    let cos_max = max_angle.cos();
    let a = *dir_min; // t = 0
    let b = *dir_max; // t = 1
    let in_a = a.z >= cos_max;
    let in_b = b.z >= cos_max;

    match (in_a, in_b) {
        (true, true) => true,
        (true, false) => {
            let t = bisect_boundary(a, b, cos_max, 0.0, 1.0);
            *dir_max = slerp(a, b, t);
            true
        }
        (false, true) => {
            let t = bisect_boundary(a, b, cos_max, 1.0, 0.0);
            *dir_min = slerp(a, b, t);
            true
        }
        (false, false) => {
            let mut found = None;
            for i in 1..16 {
                let t = i as Float / 16.0;
                if slerp(a, b, t).z >= cos_max {
                    found = Some(t);
                    break;
                }
            }
            match found {
                None => false,
                Some(t0) => {
                    let t_lo = bisect_boundary(a, b, cos_max, t0, 0.0);
                    let t_hi = bisect_boundary(a, b, cos_max, t0, 1.0);
                    *dir_min = slerp(a, b, t_lo);
                    *dir_max = slerp(a, b, t_hi);
                    true
                }
            }
        }
    }
}

/// A 2-DOF local parameterization for a 3-vector constrained to lie on a
/// sphere of given `center`/`radius`, used to fix the scale of the
/// first-to-second keyframe baseline during bundle adjustment.
#[derive(Debug, Clone, Copy)]
pub struct SphericalPlus {
    pub center: Vector3<Float>,
    pub radius: Float,
}

impl SphericalPlus {
    pub fn new(center: Vector3<Float>, radius: Float) -> Self {
        SphericalPlus { center, radius }
    }

    /// `plus(base, delta)`: move `base` (assumed on the sphere) by a 2-vector
    /// tangent perturbation, re-projecting back onto the sphere.
    pub fn plus(&self, base: Vector3<Float>, delta: Vector2<Float>) -> Vector3<Float> {
        let radial = (base - self.center).normalize();
        // Any vector not parallel to `radial` gives a valid tangent basis.
        let seed = if radial.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        let t1 = radial.cross(&seed).normalize();
        let t2 = radial.cross(&t1).normalize();
        let perturbed = radial + delta.x * t1 + delta.y * t2;
        self.center + self.radius * perturbed.normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{UnitQuaternion, Vector3};

    #[test]
    fn triangulate_recovers_known_depth() {
        let t = SE3::from_parts(
            Vector3::new(0.3, -0.1, 0.05),
            UnitQuaternion::from_euler_angles(0.02, -0.01, 0.03),
        );
        let dir_base = Vector3::new(0.1, 0.2, 1.0).normalize();
        let d = 3.0;
        let x = dir_base * d;
        let x_ref = t.act_point(nalgebra::Point3::from(x));
        let dir_ref = x_ref.coords.normalize();

        let (depth_base, depth_ref) = triangulate(&t, dir_base, dir_ref);
        approx::assert_relative_eq!(depth_base, d, epsilon = 1e-7);
        assert!(depth_ref > 0.0);
    }

    #[test]
    fn intersect_on_sphere_trivial_subset() {
        let mut dir_min = Vector3::new(0.0, 0.0, 1.0);
        let mut dir_max = Vector3::new(0.1, 0.0, 0.995).normalize();
        let ok = intersect_on_sphere(1.0, &mut dir_min, &mut dir_max);
        assert!(ok);
        assert!(dir_min.z >= (1.0f64).cos() - 1e-9);
        assert!(dir_max.z >= (1.0f64).cos() - 1e-9);
    }

    #[test]
    fn intersect_on_sphere_empty_when_both_outside_opposite_cap() {
        let mut dir_min = Vector3::new(1.0, 0.0, 0.0);
        let mut dir_max = Vector3::new(0.0, 1.0, 0.0);
        // max_angle so small that the equator band never qualifies.
        let ok = intersect_on_sphere(0.05, &mut dir_min, &mut dir_max);
        assert!(!ok);
    }

    #[test]
    fn spherical_plus_stays_on_sphere() {
        let sp = SphericalPlus::new(Vector3::new(1.0, 2.0, 3.0), 2.0);
        let base = Vector3::new(1.0, 2.0, 5.0); // center + radius*z
        for delta in [
            Vector2::new(0.0, 0.0),
            Vector2::new(0.3, -0.1),
            Vector2::new(-0.5, 0.4),
        ] {
            let p = sp.plus(base, delta);
            approx::assert_relative_eq!((p - sp.center).norm(), sp.radius, epsilon = 1e-9);
        }
    }
}
