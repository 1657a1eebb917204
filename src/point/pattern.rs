//! The residual sampling pattern: a small fixed set of pixel offsets around
//! an interest point that all contribute photometric residuals, rather than
//! a single-pixel comparison (spec.md §3 "ResidualPattern").
//!
//! Ported from mdso's `ImmaturePoint.cpp` (the 8-offset SSE-friendly pattern
//! used by both the epipolar search and the tracker/bundle-adjuster
//! residual blocks).

use serde::Deserialize;

/// A fixed offset pattern, shared by every point that uses it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResidualPattern {
    /// `(col, row)` pixel offsets relative to the point's projected position.
    pub offsets: Vec<(i32, i32)>,
}

impl Default for ResidualPattern {
    fn default() -> Self {
        // The canonical 8-point pattern from mdso's residual pattern table
        // (pattern index 0, ImmaturePoint.cpp).
        ResidualPattern {
            offsets: vec![
                (0, -2),
                (-1, -1),
                (1, -1),
                (-2, 0),
                (0, 0),
                (2, 0),
                (-1, 1),
                (0, 2),
            ],
        }
    }
}

impl ResidualPattern {
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pattern_is_nonempty_and_centered() {
        let p = ResidualPattern::default();
        assert!(!p.is_empty());
        assert!(p.offsets.contains(&(0, 0)));
    }
}
