//! `CameraModel`: the projection-model external contract (spec.md §3/§4.1),
//! plus one concrete fisheye adapter so the crate is runnable end to end
//! (see SPEC_FULL.md §8 — this is scaffolding, not part of "the core").
//!
//! Grounded on the pinhole `Camera`/`Intrinsics`/`Extrinsics` triple
//! (`back_project`, principal point + focal length + scaling), generalized
//! from a linear projection to an angular (equidistant fisheye) one so that
//! `max_angle` is meaningful.

use nalgebra::{Vector2, Vector3};

use crate::Float;

/// Projects 3D unit rays to pixels and back. Implementations are expected to
/// be cheap to clone (e.g. holding only a handful of scalar parameters) since
/// [`CameraModel::cam_pyr`] produces one instance per pyramid level.
pub trait CameraModel: Clone + Send + Sync {
    /// Back-project a pixel to a unit ray in the camera frame. Not
    /// normalized to guarantee unit length by every implementation; callers
    /// that need a unit ray call `.normalize()`.
    fn unmap(&self, pixel: Vector2<Float>) -> Vector3<Float>;

    /// Project a 3D direction (not necessarily a unit ray) to a pixel.
    fn map(&self, dir: Vector3<Float>) -> Vector2<Float>;

    /// Width/height of the image this instance projects onto.
    fn size(&self) -> (usize, usize);

    /// Whether `p` lies at least `border` pixels inside the image.
    fn is_on_image(&self, p: Vector2<Float>, border: Float) -> bool {
        let (w, h) = self.size();
        p.x >= border
            && p.y >= border
            && p.x <= w as Float - 1.0 - border
            && p.y <= h as Float - 1.0 - border
    }

    /// Maximum angle off the principal axis for which `map` remains valid.
    fn max_angle(&self) -> Float;

    /// Camera instances pre-scaled for each of `levels` pyramid levels
    /// (level 0 is this camera; level `levels-1` is the coarsest).
    fn cam_pyr(&self, levels: usize) -> Vec<Self>
    where
        Self: Sized;
}

/// An equidistant fisheye model: `r = f * theta`, `theta` the angle off the
/// optical axis. Analytic, auto-diff-free `map`/`unmap` since this crate
/// differentiates its cost functions numerically (see `tracker`/`bundle_adjuster`).
#[derive(Debug, Clone, Copy)]
pub struct EquidistantFisheye {
    pub width: usize,
    pub height: usize,
    pub focal_length: Float,
    pub principal_point: Vector2<Float>,
    pub max_angle: Float,
}

impl EquidistantFisheye {
    pub fn new(
        width: usize,
        height: usize,
        focal_length: Float,
        principal_point: Vector2<Float>,
        max_angle: Float,
    ) -> Self {
        EquidistantFisheye {
            width,
            height,
            focal_length,
            principal_point,
            max_angle,
        }
    }
}

impl CameraModel for EquidistantFisheye {
    fn unmap(&self, pixel: Vector2<Float>) -> Vector3<Float> {
        let d = pixel - self.principal_point;
        let r = d.norm();
        if r < 1e-9 {
            return Vector3::new(0.0, 0.0, 1.0);
        }
        let theta = r / self.focal_length;
        let sin_t = theta.sin();
        let cos_t = theta.cos();
        Vector3::new(sin_t * d.x / r, sin_t * d.y / r, cos_t)
    }

    fn map(&self, dir: Vector3<Float>) -> Vector2<Float> {
        let xy = Vector2::new(dir.x, dir.y);
        let xy_norm = xy.norm();
        let theta = xy_norm.atan2(dir.z);
        if xy_norm < 1e-9 {
            return self.principal_point;
        }
        let r = self.focal_length * theta;
        self.principal_point + (r / xy_norm) * xy
    }

    fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn max_angle(&self) -> Float {
        self.max_angle
    }

    fn cam_pyr(&self, levels: usize) -> Vec<Self> {
        (0..levels)
            .map(|lvl| {
                let scale = 1.0 / (1 << lvl) as Float;
                EquidistantFisheye {
                    width: (self.width as Float * scale).round() as usize,
                    height: (self.height as Float * scale).round() as usize,
                    focal_length: self.focal_length * scale,
                    principal_point: self.principal_point * scale,
                    max_angle: self.max_angle,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cam() -> EquidistantFisheye {
        EquidistantFisheye::new(
            640,
            480,
            300.0,
            Vector2::new(320.0, 240.0),
            std::f64::consts::FRAC_PI_2 * 0.95,
        )
    }

    #[test]
    fn map_unmap_round_trip() {
        let c = cam();
        for (x, y) in [(320.0, 240.0), (400.0, 300.0), (100.0, 450.0)] {
            let pixel = Vector2::new(x, y);
            let dir = c.unmap(pixel).normalize();
            let back = c.map(dir);
            approx::assert_relative_eq!(back.x, pixel.x, epsilon = 1e-6);
            approx::assert_relative_eq!(back.y, pixel.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn pyramid_halves_focal_length() {
        let c = cam();
        let pyr = c.cam_pyr(3);
        assert_eq!(pyr.len(), 3);
        approx::assert_relative_eq!(pyr[1].focal_length, c.focal_length / 2.0);
        approx::assert_relative_eq!(pyr[2].focal_length, c.focal_length / 4.0);
    }

    #[test]
    fn is_on_image_respects_border() {
        let c = cam();
        assert!(c.is_on_image(Vector2::new(320.0, 240.0), 5.0));
        assert!(!c.is_on_image(Vector2::new(2.0, 240.0), 5.0));
    }
}
