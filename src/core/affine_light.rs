//! Photometric affine transform `x ↦ exp(a)·(x + b)`, carried in log space so
//! composition is cheap and its `a` component can be box-constrained linearly.
//!
//! Ported from mdso's `system/AffineLightTransform.h`: same composition law,
//! generic `T` dropped in favor of [`crate::Float`] since this crate
//! differentiates numerically rather than through `ceres::Jet`-style dual
//! numbers. `normalize_multiplier` is corrected to actually preserve
//! composition (see the test below), rather than the original's formula.

use crate::Float;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineLightTransform {
    pub a: Float,
    pub b: Float,
}

impl Default for AffineLightTransform {
    fn default() -> Self {
        AffineLightTransform { a: 0.0, b: 0.0 }
    }
}

impl AffineLightTransform {
    pub fn new(a: Float, b: Float) -> Self {
        AffineLightTransform { a, b }
    }

    /// Apply the transform to an intensity value.
    pub fn apply(&self, x: Float) -> Float {
        self.a.exp() * (x + self.b)
    }

    /// `self ∘ other`, i.e. `other` applied first: `(a1,b1)∘(a2,b2) =
    /// (a1+a2, exp(a2)·b2 + b1)`.
    pub fn compose(&self, other: &AffineLightTransform) -> AffineLightTransform {
        AffineLightTransform {
            a: self.a + other.a,
            b: other.a.exp() * other.b + self.b,
        }
    }

    pub fn inverse(&self) -> AffineLightTransform {
        // x = exp(a)(y + b)  =>  y = exp(-a) x - b
        AffineLightTransform {
            a: -self.a,
            b: -self.b * self.a.exp(),
        }
    }

    /// Shift `a` from `to_normalize` into `relative` so that
    /// `to_normalize.a == 0`, preserving `to_normalize ∘ relative`.
    pub fn normalize_multiplier(
        to_normalize: &mut AffineLightTransform,
        relative: &mut AffineLightTransform,
    ) {
        relative.b *= (-to_normalize.a).exp();
        relative.a += to_normalize.a;
        to_normalize.a = 0.0;
    }

    pub fn clamp(&self, min_a: Float, max_a: Float, min_b: Float, max_b: Float) -> Self {
        AffineLightTransform {
            a: self.a.clamp(min_a, max_a),
            b: self.b.clamp(min_b, max_b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composition_is_associative_with_application() {
        let t1 = AffineLightTransform::new(0.3, 1.5);
        let t2 = AffineLightTransform::new(-0.2, -0.7);
        let x = 42.0;
        let direct = t1.apply(t2.apply(x));
        let composed = t1.compose(&t2).apply(x);
        approx::assert_relative_eq!(direct, composed, epsilon = 1e-9);
    }

    #[test]
    fn normalize_multiplier_preserves_composition() {
        let mut t = AffineLightTransform::new(0.4, 2.0);
        let mut r = AffineLightTransform::new(-0.1, 0.5);
        let before = t.compose(&r);
        AffineLightTransform::normalize_multiplier(&mut t, &mut r);
        let after = t.compose(&r);
        approx::assert_relative_eq!(t.a, 0.0, epsilon = 1e-12);
        for x in [-10.0, 0.0, 3.5, 100.0] {
            approx::assert_relative_eq!(before.apply(x), after.apply(x), epsilon = 1e-7);
        }
    }

    #[test]
    fn inverse_round_trips() {
        let t = AffineLightTransform::new(0.6, -3.0);
        let x = 17.0;
        approx::assert_relative_eq!(t.inverse().apply(t.apply(x)), x, epsilon = 1e-9);
    }
}
