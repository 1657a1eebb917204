//! `StereoMatcher`: the external bootstrap-matching collaborator
//! (spec.md §6) — out of scope for "the core", so this module is just the
//! trait contract plus a deterministic test/demo adapter.
//!
//! Ported from mdso's `DsoInitializer::createKeyFramesFromStereo`, where
//! `stereoMatcher.match(frames, keyPoints, depths)` returns the same
//! paired-keypoint, paired-depth, relative-motion triple.

use nalgebra::Vector2;

use crate::core::se3::SE3;
use crate::Float;

/// One frame's half of a stereo match result: pixel positions and the
/// matcher's own depth estimate for each.
#[derive(Debug, Clone)]
pub struct MatchedFrame {
    pub keypoints: Vec<Vector2<Float>>,
    pub depths: Vec<Float>,
}

/// The bootstrap matcher contract: given a pair of frames (opaque to this
/// crate — only the matcher inspects pixel data), produce paired keypoints
/// with depths in each frame plus the relative motion `frame0 -> frame1`.
pub trait StereoMatcher {
    fn match_frames(&self, frame0_id: u64, frame1_id: u64) -> Option<StereoMatch>;
}

#[derive(Debug, Clone)]
pub struct StereoMatch {
    pub frame0: MatchedFrame,
    pub frame1: MatchedFrame,
    pub motion: SE3,
}

/// A deterministic matcher used by tests and demos: projects a synthetic
/// plane through two supplied cameras poses rather than running real
/// feature matching. Not part of "the core" per spec.md §1.
pub struct DummyStereoMatcher {
    pub keypoints: Vec<Vector2<Float>>,
    pub depths: Vec<Float>,
    pub motion: SE3,
}

impl StereoMatcher for DummyStereoMatcher {
    fn match_frames(&self, _frame0_id: u64, _frame1_id: u64) -> Option<StereoMatch> {
        Some(StereoMatch {
            frame0: MatchedFrame {
                keypoints: self.keypoints.clone(),
                depths: self.depths.clone(),
            },
            frame1: MatchedFrame {
                keypoints: self.keypoints.clone(),
                depths: self.depths.clone(),
            },
            motion: self.motion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_matcher_always_succeeds() {
        let m = DummyStereoMatcher {
            keypoints: vec![Vector2::new(1.0, 1.0)],
            depths: vec![2.0],
            motion: SE3::identity(),
        };
        assert!(m.match_frames(0, 1).is_some());
    }
}
