//! `SphericalTerrain`: a Delaunay triangulation of direction/radius samples
//! on the unit sphere, evaluated by ray lookup (spec.md §4.2, §6).
//!
//! Ported from mdso's `system/DsoInitializer.cpp`'s use of a gnomonic-plane
//! triangulation to interpolate bootstrap depths; built with the
//! `delaunator` crate over a gnomonic projection of the input rays, since
//! `delaunator` itself only triangulates a plane.

use delaunator::{triangulate, Point as DPoint, Triangulation};
use nalgebra::Vector3;

use crate::Float;

/// One sampled direction/radius pair used to seed the triangulation.
#[derive(Debug, Clone, Copy)]
pub struct DepthedRay {
    pub direction: Vector3<Float>,
    pub depth: Float,
}

pub struct SphericalTerrain {
    reference: Vector3<Float>,
    e1: Vector3<Float>,
    e2: Vector3<Float>,
    plane_points: Vec<(Float, Float)>,
    depths: Vec<Float>,
    triangulation: Triangulation,
}

impl SphericalTerrain {
    /// Build the terrain from a set of depthed rays. `reference` should be
    /// near the centroid direction of `rays` so the gnomonic projection
    /// stays well-conditioned.
    pub fn new(rays: &[DepthedRay]) -> Self {
        let reference = mean_direction(rays);
        let (e1, e2) = tangent_basis(reference);

        let mut plane_points = Vec::with_capacity(rays.len());
        let mut depths = Vec::with_capacity(rays.len());
        for r in rays {
            if let Some(xy) = gnomonic_project(r.direction, reference, e1, e2) {
                plane_points.push(xy);
                depths.push(r.depth);
            }
        }

        let dpoints: Vec<DPoint> = plane_points
            .iter()
            .map(|&(x, y)| DPoint { x, y })
            .collect();
        let triangulation = triangulate(&dpoints);

        SphericalTerrain {
            reference,
            e1,
            e2,
            plane_points,
            depths,
            triangulation,
        }
    }

    /// Evaluate the terrain at `ray` (need not be unit length): returns
    /// `(depth, true)` if `ray`'s gnomonic projection falls inside the
    /// triangulated hull, `(0.0, false)` otherwise.
    pub fn eval(&self, ray: Vector3<Float>) -> (Float, bool) {
        let Some(q) = gnomonic_project(ray.normalize(), self.reference, self.e1, self.e2) else {
            return (0.0, false);
        };

        let tris = &self.triangulation.triangles;
        for tri in tris.chunks(3) {
            let [i0, i1, i2] = [tri[0], tri[1], tri[2]];
            let p0 = self.plane_points[i0];
            let p1 = self.plane_points[i1];
            let p2 = self.plane_points[i2];
            if let Some((w0, w1, w2)) = barycentric(q, p0, p1, p2) {
                let depth = w0 * self.depths[i0] + w1 * self.depths[i1] + w2 * self.depths[i2];
                return (depth, true);
            }
        }
        (0.0, false)
    }
}

fn mean_direction(rays: &[DepthedRay]) -> Vector3<Float> {
    if rays.is_empty() {
        return Vector3::new(0.0, 0.0, 1.0);
    }
    let sum: Vector3<Float> = rays.iter().map(|r| r.direction.normalize()).sum();
    if sum.norm() < 1e-12 {
        Vector3::new(0.0, 0.0, 1.0)
    } else {
        sum.normalize()
    }
}

fn tangent_basis(reference: Vector3<Float>) -> (Vector3<Float>, Vector3<Float>) {
    let seed = if reference.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let e1 = reference.cross(&seed).normalize();
    let e2 = reference.cross(&e1).normalize();
    (e1, e2)
}

/// Gnomonic projection of a unit direction onto the tangent plane at
/// `reference`. Undefined (returns `None`) at or beyond the equator of that
/// reference (`dir . reference <= 0`).
fn gnomonic_project(
    dir: Vector3<Float>,
    reference: Vector3<Float>,
    e1: Vector3<Float>,
    e2: Vector3<Float>,
) -> Option<(Float, Float)> {
    let cos_angle = dir.dot(&reference);
    if cos_angle <= 1e-6 {
        return None;
    }
    Some((dir.dot(&e1) / cos_angle, dir.dot(&e2) / cos_angle))
}

/// Barycentric coordinates of `q` in triangle `(p0,p1,p2)`, `None` if `q`
/// lies outside the triangle.
fn barycentric(
    q: (Float, Float),
    p0: (Float, Float),
    p1: (Float, Float),
    p2: (Float, Float),
) -> Option<(Float, Float, Float)> {
    let (x, y) = q;
    let (x0, y0) = p0;
    let (x1, y1) = p1;
    let (x2, y2) = p2;
    let denom = (y1 - y2) * (x0 - x2) + (x2 - x1) * (y0 - y2);
    if denom.abs() < 1e-12 {
        return None;
    }
    let w0 = ((y1 - y2) * (x - x2) + (x2 - x1) * (y - y2)) / denom;
    let w1 = ((y2 - y0) * (x - x2) + (x0 - x2) * (y - y2)) / denom;
    let w2 = 1.0 - w0 - w1;
    let eps = -1e-9;
    if w0 >= eps && w1 >= eps && w2 >= eps {
        Some((w0, w1, w2))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_interpolates_inside_hull() {
        let rays = vec![
            DepthedRay { direction: Vector3::new(0.0, 0.0, 1.0), depth: 1.0 },
            DepthedRay { direction: Vector3::new(0.3, 0.0, 1.0).normalize(), depth: 2.0 },
            DepthedRay { direction: Vector3::new(0.0, 0.3, 1.0).normalize(), depth: 2.0 },
            DepthedRay { direction: Vector3::new(-0.3, -0.3, 1.0).normalize(), depth: 2.0 },
        ];
        let terrain = SphericalTerrain::new(&rays);
        let (depth, ok) = terrain.eval(Vector3::new(0.0, 0.0, 1.0));
        assert!(ok);
        approx::assert_relative_eq!(depth, 1.0, epsilon = 0.5);
    }

    #[test]
    fn eval_reports_oob_outside_hull() {
        let rays = vec![
            DepthedRay { direction: Vector3::new(0.0, 0.0, 1.0), depth: 1.0 },
            DepthedRay { direction: Vector3::new(0.05, 0.0, 1.0).normalize(), depth: 1.0 },
            DepthedRay { direction: Vector3::new(0.0, 0.05, 1.0).normalize(), depth: 1.0 },
        ];
        let terrain = SphericalTerrain::new(&rays);
        let (_, ok) = terrain.eval(Vector3::new(0.9, 0.9, 0.1));
        assert!(!ok);
    }
}
