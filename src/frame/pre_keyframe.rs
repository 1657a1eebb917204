//! `PreKeyFrame`: raw per-frame state shared by every ingested frame,
//! whether or not it is ever promoted to a keyframe (spec.md §3).
//!
//! The `frame_pyr`/`grad_norm_sq` pyramid construction follows the crate's
//! own `core::multires` helpers; the interpolator is built on demand rather
//! than stored, since `BiCubicInterpolator` borrows the pyramid level it
//! reads from.

use nalgebra::DMatrix;

use crate::core::affine_light::AffineLightTransform;
use crate::core::interpolation::BiCubicInterpolator;
use crate::core::multires;
use crate::core::se3::SE3;
use crate::Float;

pub struct PreKeyFrame {
    pub world_to_this: SE3,
    pub light_world_to_this: AffineLightTransform,
    /// Level 0 is the original resolution; later levels are built by
    /// `core::multires::halve`.
    pub frame_pyr: Vec<DMatrix<u8>>,
    /// Squared-gradient-norm map, one `halve` coarser than level 0 (each
    /// cell covers a 2x2 block of level-0 pixels).
    pub grad_norm_sq: DMatrix<u16>,
    pub global_frame_num: u64,
}

impl PreKeyFrame {
    pub fn new(
        image: DMatrix<u8>,
        levels: usize,
        world_to_this: SE3,
        light_world_to_this: AffineLightTransform,
        global_frame_num: u64,
    ) -> Self {
        let frame_pyr = multires::mean_pyramid(levels, image);
        let grad_norm_sq = multires::gradients_squared_norm(&frame_pyr)
            .into_iter()
            .next()
            .unwrap_or_else(|| {
                let (r, c) = frame_pyr[0].shape();
                DMatrix::zeros(r / 2, c / 2)
            });

        PreKeyFrame {
            world_to_this,
            light_world_to_this,
            frame_pyr,
            grad_norm_sq,
            global_frame_num,
        }
    }

    pub fn levels(&self) -> usize {
        self.frame_pyr.len()
    }

    pub fn interpolator(&self, level: usize) -> BiCubicInterpolator<'_> {
        BiCubicInterpolator::new(&self.frame_pyr[level])
    }

    pub fn interpolator_pyr(&self) -> Vec<BiCubicInterpolator<'_>> {
        self.frame_pyr.iter().map(BiCubicInterpolator::new).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pyramid_has_requested_levels_and_halves_size() {
        let img = DMatrix::from_fn(64, 64, |r, c| ((r + c) % 256) as u8);
        let pkf = PreKeyFrame::new(img, 4, SE3::identity(), AffineLightTransform::default(), 0);
        assert_eq!(pkf.levels(), 4);
        assert_eq!(pkf.frame_pyr[0].shape(), (64, 64));
        assert_eq!(pkf.frame_pyr[1].shape(), (32, 32));
        assert_eq!(pkf.frame_pyr[3].shape(), (8, 8));
    }

    #[test]
    fn interpolator_reads_back_through_pyramid() {
        let img = DMatrix::from_element(16, 16, 42u8);
        let pkf = PreKeyFrame::new(img, 2, SE3::identity(), AffineLightTransform::default(), 0);
        let interp = pkf.interpolator(0);
        approx::assert_relative_eq!(interp.eval(3.0, 3.0).unwrap(), 42.0);
    }
}
