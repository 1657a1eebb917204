//! `OptimizedPoint`: an activated map point with a scalar inverse-depth
//! parameter that participates in bundle adjustment (spec.md §3, §4.6).
//!
//! Follows the redesign note in spec.md §9: terminal classification is a
//! tagged variant so `ACTIVE → {OOB, OUTLIER}` transitions are the only
//! ones representable, never back.

use nalgebra::Vector2;

use crate::point::immature::ImmaturePoint;
use crate::Float;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizedStatus {
    Active,
    OutOfBounds,
    Outlier,
}

#[derive(Debug, Clone)]
pub struct OptimizedPoint {
    pub p: Vector2<Float>,
    pub log_inv_depth: Float,
    pub status: OptimizedStatus,
}

impl OptimizedPoint {
    pub fn depth(&self) -> Float {
        (-self.log_inv_depth).exp()
    }

    /// Activate from an `ImmaturePoint` with a known-good depth. Panics if
    /// `immature.depth` is `None` — callers must check
    /// [`ImmaturePoint::is_activatable`] first.
    pub fn activate(immature: &ImmaturePoint) -> Self {
        let depth = immature
            .depth
            .expect("activate called on an immature point without a depth");
        OptimizedPoint {
            p: immature.p,
            log_inv_depth: -depth.ln(),
            status: OptimizedStatus::Active,
        }
    }

    /// Move from `Active` toward a terminal state. No-op (and documents the
    /// monotonicity invariant) once already terminal.
    pub fn mark_out_of_bounds(&mut self) {
        if self.status == OptimizedStatus::Active {
            self.status = OptimizedStatus::OutOfBounds;
        }
    }

    pub fn mark_outlier(&mut self) {
        if self.status == OptimizedStatus::Active {
            self.status = OptimizedStatus::Outlier;
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == OptimizedStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::immature::ImmatureStatus;

    fn activatable_immature(depth: Float) -> ImmaturePoint {
        ImmaturePoint {
            p: Vector2::new(10.0, 10.0),
            min_depth: depth - 0.1,
            max_depth: depth + 0.1,
            depth: Some(depth),
            quality: Some(2.0),
            dir_base: nalgebra::Vector3::new(0.0, 0.0, 1.0),
            base_directions: vec![],
            base_intensities: vec![],
            num_traced: 1,
            status: ImmatureStatus::Searching,
        }
    }

    #[test]
    fn activate_computes_log_inv_depth() {
        let imm = activatable_immature(2.0);
        let op = OptimizedPoint::activate(&imm);
        approx::assert_relative_eq!(op.depth(), 2.0, epsilon = 1e-9);
        assert!(op.is_active());
    }

    #[test]
    fn status_transitions_are_monotone() {
        let mut op = OptimizedPoint::activate(&activatable_immature(1.0));
        op.mark_outlier();
        assert_eq!(op.status, OptimizedStatus::Outlier);
        // Already terminal: marking OOB afterward must not override it.
        op.mark_out_of_bounds();
        assert_eq!(op.status, OptimizedStatus::Outlier);
    }
}
