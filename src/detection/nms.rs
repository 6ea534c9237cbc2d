//! Non-Maximum Suppression and Averaging.
//!
//! SSD networks produce many overlapping detections for a single palm. Non-Maximum Suppression
//! (NMS) filters these duplicates out, leaving one detection per object.
//!
//! Two variants are provided, selected with [`SuppressionMode`]: classic suppression removes any
//! overlapping detection with lower confidence ([`SuppressionMode::Remove`]), while Non-Maximum
//! Averaging ([`SuppressionMode::Average`]) replaces a cluster of overlapping detections with
//! their confidence-weighted average. Averaging reduces jitter between frames and is the default.

use crate::{image::Rect, image::Vec2f, iter::zip_exact, num::TotalF32};

use super::Detection;

/// A non-maximum suppression algorithm.
#[derive(Debug)]
pub struct NonMaxSuppression {
    iou_thresh: f32,
    mode: SuppressionMode,
}

impl NonMaxSuppression {
    /// The default intersection-over-union threshold used to determine if two detections overlap.
    pub const DEFAULT_IOU_THRESH: f32 = 0.3;

    /// Creates a new non-maximum suppressor using [`SuppressionMode::Average`] and
    /// [`Self::DEFAULT_IOU_THRESH`].
    pub fn new() -> Self {
        Self {
            iou_thresh: Self::DEFAULT_IOU_THRESH,
            mode: SuppressionMode::Average,
        }
    }

    /// Sets the intersection-over-union threshold to consider two detections as overlapping.
    pub fn set_iou_thresh(&mut self, iou_thresh: f32) {
        self.iou_thresh = iou_thresh;
    }

    /// Sets the suppression mode.
    pub fn set_mode(&mut self, mode: SuppressionMode) {
        self.mode = mode;
    }

    /// Performs non-maximum suppression on `detections`.
    ///
    /// `detections` is drained in the process. The surviving detections are returned ordered by
    /// descending confidence.
    pub fn process(&self, detections: &mut Vec<Detection>) -> Vec<Detection> {
        let mut out = Vec::new();

        // Sort by ascending confidence, process highest confidence first by starting at the back.
        detections.sort_unstable_by_key(|det| TotalF32(det.confidence()));

        while let Some(seed) = detections.pop() {
            let overlaps = |other: &Detection| {
                seed.bounding_rect().iou(&other.bounding_rect()) >= self.iou_thresh
            };

            match self.mode {
                SuppressionMode::Remove => {
                    detections.retain(|other| !overlaps(other));
                    out.push(seed);
                }
                SuppressionMode::Average => {
                    let (cluster, rest): (Vec<_>, Vec<_>) =
                        detections.drain(..).partition(|other| overlaps(other));
                    *detections = rest;

                    out.push(average(&seed, &cluster));
                }
            }
        }

        out
    }
}

impl Default for NonMaxSuppression {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the confidence-weighted average of `seed` and `cluster`.
///
/// The result keeps the confidence of `seed`.
fn average(seed: &Detection, cluster: &[Detection]) -> Detection {
    let mut center = Vec2f::zeros();
    let mut size = Vec2f::zeros();
    let mut angle = 0.0;
    let mut keypoints = vec![Vec2f::zeros(); seed.keypoints().len()];
    let mut divisor = 0.0;

    for det in std::iter::once(seed).chain(cluster) {
        let factor = det.confidence();
        divisor += factor;

        for (acc, kp) in zip_exact(&mut keypoints, det.keypoints()) {
            *acc += kp * factor;
        }
        center += det.bounding_rect().center() * factor;
        size += det.bounding_rect().size() * factor;
        angle += det.angle() * factor;
    }

    if divisor <= 0.0 {
        return seed.clone();
    }

    for kp in &mut keypoints {
        *kp /= divisor;
    }
    center /= divisor;
    size /= divisor;

    let mut acc = Detection::with_keypoints(
        seed.confidence(),
        Rect::from_center(center.x, center.y, size.x, size.y),
        keypoints,
    );
    acc.set_angle(angle / divisor);
    acc
}

/// Describes how [`NonMaxSuppression`] should deal with overlapping detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SuppressionMode {
    /// Remove overlapping detections, only retain the detection with highest confidence score.
    Remove,

    /// Compute a confidence-weighted average of overlapping detections.
    Average,
}
