//! Dense candidate reselection, biased by gradient magnitude and filtered
//! through a [`DistanceMap`] (spec.md §4.6 `selectPointsDenser`).
//!
//! Ported from mdso's pixel-selection pass (gradient-biased candidate
//! generation, filtered through the distance-grid rejection of
//! `util/DistanceMap.h`).

use nalgebra::{DMatrix, Vector2};

use crate::point::distance_map::DistanceMap;
use crate::Float;

/// `grad_norm_sq` (`core::multires::gradients_squared_norm`) is one `halve`
/// coarser than level 0, i.e. each cell covers a 2x2 block of level-0
/// pixels.
const GRAD_GRID_DOWNSAMPLE: usize = 2;

/// Resample up to `n` pixel positions (in level-0 pixel coordinates) from
/// `grad_norm_sq` (squared gradient magnitude, one grid level coarser than
/// level 0), biased toward high-gradient pixels, rejecting any candidate
/// within `min_cell_distance` downsampled cells of an already-selected
/// point. `existing_points` must already be level-0 pixel coordinates.
pub fn select_points_denser(
    grad_norm_sq: &DMatrix<u16>,
    existing_points: &[Vector2<Float>],
    pyr_down: u32,
    min_cell_distance: u32,
    n: usize,
    border: usize,
) -> Vec<Vector2<Float>> {
    let (grad_rows, grad_cols) = grad_norm_sq.shape();
    let mut ranked: Vec<(u16, usize, usize)> = Vec::new();
    for r in border..grad_rows.saturating_sub(border) {
        for c in border..grad_cols.saturating_sub(border) {
            let g = grad_norm_sq[(r, c)];
            if g > 0 {
                ranked.push((g, r, c));
            }
        }
    }
    // Highest gradient first: a cheap stand-in for the original's bucketed
    // random sampling, biased the same direction (favor texture).
    ranked.sort_unstable_by(|a, b| b.0.cmp(&a.0));

    // Lift grid cells back to level-0 pixel coordinates before comparing
    // against `existing_points`, which are already level-0 pixels.
    let img_width = grad_cols * GRAD_GRID_DOWNSAMPLE;
    let img_height = grad_rows * GRAD_GRID_DOWNSAMPLE;
    let map = DistanceMap::new(img_width, img_height, pyr_down, existing_points);
    let candidates: Vec<Vector2<Float>> = ranked
        .iter()
        .map(|&(_, r, c)| {
            Vector2::new(
                (c * GRAD_GRID_DOWNSAMPLE) as Float,
                (r * GRAD_GRID_DOWNSAMPLE) as Float,
            )
        })
        .collect();
    let mask = map.choose(&candidates, min_cell_distance, n);

    candidates
        .into_iter()
        .zip(mask)
        .filter_map(|(p, keep)| keep.then_some(p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_points_denser_respects_cap_and_avoids_existing() {
        let mut grad = DMatrix::<u16>::zeros(40, 40);
        for r in 5..35 {
            for c in 5..35 {
                grad[(r, c)] = 100;
            }
        }
        let existing = vec![Vector2::new(20.0, 20.0)];
        let picked = select_points_denser(&grad, &existing, 1, 3, 10, 2);
        assert!(picked.len() <= 10);
        for p in &picked {
            assert!((p - existing[0]).norm() > 1.0);
        }
    }

    #[test]
    fn select_points_denser_returns_level0_pixel_coordinates() {
        // A 40x40 grad grid is one `halve` coarser than an 80x80 level-0
        // image; a textured bottom-right corner of the grid must map to
        // level-0 coordinates past the grid's own extent, not stay confined
        // to a [0, 40) x [0, 40) quadrant.
        let mut grad = DMatrix::<u16>::zeros(40, 40);
        for r in 32..38 {
            for c in 32..38 {
                grad[(r, c)] = 100;
            }
        }
        let picked = select_points_denser(&grad, &[], 1, 1, 20, 2);
        assert!(!picked.is_empty());
        assert!(picked.iter().any(|p| p.x >= 40.0 && p.y >= 40.0));
    }
}
