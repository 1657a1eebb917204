//! `KeyFrame`: a `PreKeyFrame` plus its immature/optimized point sets
//! (spec.md §3).
//!
//! Ported from mdso's `DsoSystem.h` (`keyFrames: std::map<int, KeyFrame>`,
//! `lastKeyFrame`/`lboKeyFrame` access), with a point living in exactly one
//! of the two containers, matching the redesign note in spec.md §9 that a
//! point is either immature or optimized, never both.

use crate::frame::pre_keyframe::PreKeyFrame;
use crate::point::immature::ImmaturePoint;
use crate::point::optimized::OptimizedPoint;

pub struct KeyFrame {
    pub pre: PreKeyFrame,
    pub immature_points: Vec<ImmaturePoint>,
    pub optimized_points: Vec<OptimizedPoint>,
}

impl KeyFrame {
    pub fn new(pre: PreKeyFrame) -> Self {
        KeyFrame {
            pre,
            immature_points: Vec::new(),
            optimized_points: Vec::new(),
        }
    }

    pub fn global_frame_num(&self) -> u64 {
        self.pre.global_frame_num
    }

    /// Activate every immature point whose bracket/quality clears
    /// `min_quality`, moving it into `optimized_points`. Points left behind
    /// remain immature for further tracing.
    pub fn activate_ready_points(&mut self, min_quality: f64) {
        let mut still_immature = Vec::with_capacity(self.immature_points.len());
        for imm in self.immature_points.drain(..) {
            if imm.is_activatable(min_quality) {
                self.optimized_points.push(OptimizedPoint::activate(&imm));
            } else {
                still_immature.push(imm);
            }
        }
        self.immature_points = still_immature;
    }

    /// Drop optimized points that have reached a terminal state, as would
    /// happen right before marginalization (terminal points have already
    /// been emitted to the cloud sink by that point).
    pub fn retain_active_points(&mut self) {
        self.optimized_points.retain(|p| p.is_active());
    }
}

/// An insertion-ordered sliding window of keyframes keyed by
/// `globalFrameNum`, with O(1) access to the last and last-but-one entries
/// (spec.md §9 redesign note).
pub struct KeyFrameWindow {
    order: Vec<u64>,
    frames: std::collections::HashMap<u64, KeyFrame>,
    capacity: usize,
}

impl KeyFrameWindow {
    pub fn new(capacity: usize) -> Self {
        KeyFrameWindow {
            order: Vec::new(),
            frames: std::collections::HashMap::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Insert a keyframe, returning the marginalized (evicted) keyframe if
    /// inserting this one exceeded `capacity`.
    pub fn insert(&mut self, kf: KeyFrame) -> Option<KeyFrame> {
        let id = kf.global_frame_num();
        self.order.push(id);
        self.frames.insert(id, kf);
        if self.order.len() > self.capacity {
            let evicted_id = self.order.remove(0);
            self.frames.remove(&evicted_id)
        } else {
            None
        }
    }

    pub fn get(&self, id: u64) -> Option<&KeyFrame> {
        self.frames.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut KeyFrame> {
        self.frames.get_mut(&id)
    }

    pub fn last(&self) -> Option<&KeyFrame> {
        self.order.last().and_then(|id| self.frames.get(id))
    }

    pub fn last_but_one(&self) -> Option<&KeyFrame> {
        if self.order.len() < 2 {
            return None;
        }
        let id = self.order[self.order.len() - 2];
        self.frames.get(&id)
    }

    pub fn ids(&self) -> &[u64] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyFrame> {
        self.order.iter().filter_map(move |id| self.frames.get(id))
    }

    /// Unordered mutable iteration: every keyframe in the window, order not
    /// guaranteed. Fine for per-keyframe work with no cross-keyframe
    /// dependency (e.g. tracing each one's immature points independently).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut KeyFrame> {
        self.frames.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::affine_light::AffineLightTransform;
    use crate::core::se3::SE3;
    use nalgebra::DMatrix;

    fn kf(id: u64) -> KeyFrame {
        let img = DMatrix::from_element(16, 16, 10u8);
        let pre = PreKeyFrame::new(img, 2, SE3::identity(), AffineLightTransform::default(), id);
        KeyFrame::new(pre)
    }

    #[test]
    fn window_evicts_oldest_past_capacity() {
        let mut w = KeyFrameWindow::new(2);
        assert!(w.insert(kf(0)).is_none());
        assert!(w.insert(kf(1)).is_none());
        let evicted = w.insert(kf(2));
        assert_eq!(evicted.unwrap().global_frame_num(), 0);
        assert_eq!(w.len(), 2);
        assert_eq!(w.last().unwrap().global_frame_num(), 2);
        assert_eq!(w.last_but_one().unwrap().global_frame_num(), 1);
    }
}
