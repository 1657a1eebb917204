//! Rigid-body motion `SE3`, built on [`super::so3`] and `nalgebra::Isometry3`.
//!
//! The teacher crate never names this type explicitly (its dataset module
//! reads ground-truth poses straight into `na::Isometry3`), but the
//! specification's vocabulary (`worldToThis: SE3`, `kfToCur ∘ worldToLastKf`)
//! calls for a named wrapper with the composition/inverse/action operators
//! spelled out, mirroring the algebra in the original `DsoSystem.cpp`.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

use super::so3;
use crate::Float;

/// A rigid-body transform, `worldToThis`-style: applying it to a point
/// expressed in frame A yields the same point expressed in frame B.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SE3 {
    inner: Isometry3<Float>,
}

impl SE3 {
    pub fn identity() -> Self {
        SE3 {
            inner: Isometry3::identity(),
        }
    }

    pub fn from_parts(translation: Vector3<Float>, rotation: UnitQuaternion<Float>) -> Self {
        SE3 {
            inner: Isometry3::from_parts(Translation3::from(translation), rotation),
        }
    }

    pub fn translation(&self) -> Vector3<Float> {
        self.inner.translation.vector
    }

    pub fn rotation(&self) -> UnitQuaternion<Float> {
        self.inner.rotation
    }

    /// `so3()` — the rotation component, named as in the specification.
    pub fn so3(&self) -> UnitQuaternion<Float> {
        self.inner.rotation
    }

    pub fn inverse(&self) -> Self {
        SE3 {
            inner: self.inner.inverse(),
        }
    }

    /// `self ∘ other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &SE3) -> Self {
        SE3 {
            inner: self.inner * other.inner,
        }
    }

    pub fn act_point(&self, p: nalgebra::Point3<Float>) -> nalgebra::Point3<Float> {
        self.inner * p
    }

    /// Action on a direction: rotation only, no translation.
    pub fn act_direction(&self, dir: Vector3<Float>) -> Vector3<Float> {
        self.inner.rotation * dir
    }

    /// 6-vector tangent via independent so3 log and translation (used only for
    /// diagnostics/interpolation, not as a true Lie-group log of SE3).
    pub fn log_rotation(&self) -> (Vector3<Float>, Float) {
        so3::log(self.inner.rotation)
    }
}

impl std::ops::Mul for SE3 {
    type Output = SE3;
    fn mul(self, rhs: SE3) -> SE3 {
        self.compose(&rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Vector3};

    #[test]
    fn inverse_composes_to_identity() {
        let t = SE3::from_parts(
            Vector3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3),
        );
        let id = t.compose(&t.inverse());
        approx::assert_relative_eq!(id.translation(), Vector3::zeros(), epsilon = 1e-9);
        approx::assert_relative_eq!(
            id.rotation().into_inner().coords,
            UnitQuaternion::identity().into_inner().coords,
            epsilon = 1e-9
        );
    }

    #[test]
    fn compose_matches_pointwise_action() {
        let a = SE3::from_parts(
            Vector3::new(1.0, 0.0, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, 0.3),
        );
        let b = SE3::from_parts(
            Vector3::new(0.0, 1.0, 0.0),
            UnitQuaternion::from_euler_angles(0.1, 0.0, 0.0),
        );
        let p = Point3::new(0.4, -0.2, 0.7);
        let direct = a.act_point(b.act_point(p));
        let composed = a.compose(&b).act_point(p);
        approx::assert_relative_eq!(direct.coords, composed.coords, epsilon = 1e-9);
    }
}
