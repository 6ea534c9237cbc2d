//! Common functionality for object detection.
//!
//! The palm detector decodes raw network outputs into [`Detection`]s and then merges duplicates
//! with [`nms`].

pub mod nms;

use crate::image::{Rect, Vec2f};

/// A detected object.
///
/// A [`Detection`] consists of a [`Rect`] enclosing the detected object, a confidence value, a
/// rotation angle of the object, and a possibly empty set of located keypoints.
///
/// Per convention, the confidence value lies between 0.0 and 1.0, which can be achieved by passing
/// the raw network output through [`crate::num::sigmoid`]. The confidence value is used as the
/// weight when performing non-maximum averaging, so it has to have the expected range there.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    confidence: f32,
    angle: f32,
    rect: Rect,
    keypoints: Vec<Vec2f>,
}

impl Detection {
    pub fn new(confidence: f32, rect: Rect) -> Self {
        Self::with_keypoints(confidence, rect, Vec::new())
    }

    pub fn with_keypoints(confidence: f32, rect: Rect, keypoints: Vec<Vec2f>) -> Self {
        Self {
            confidence,
            angle: 0.0,
            rect,
            keypoints,
        }
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Returns the angle of the detected object, in radians, clockwise.
    ///
    /// Detections whose angle was never set report 0.0.
    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Sets the angle of the detected object, in radians, clockwise.
    pub fn set_angle(&mut self, angle: f32) {
        self.angle = angle;
    }

    /// Returns the axis-aligned bounding rectangle containing the detected object.
    pub fn bounding_rect(&self) -> Rect {
        self.rect
    }

    pub fn keypoints(&self) -> &[Vec2f] {
        &self.keypoints
    }

    /// Scales all coordinates by `scale`, then moves them by `offset`.
    ///
    /// Used to map detections from a network's input space back into the source image.
    pub fn map_coords(&mut self, scale: f32, offset: Vec2f) {
        let center = self.rect.center() * scale + offset;
        let size = self.rect.size() * scale;
        self.rect = Rect::from_center(center.x, center.y, size.x, size.y);
        for kp in &mut self.keypoints {
            *kp = *kp * scale + offset;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_coords() {
        let mut det = Detection::with_keypoints(
            0.9,
            Rect::from_center(10.0, 20.0, 4.0, 2.0),
            vec![Vec2f::new(10.0, 20.0), Vec2f::new(0.0, 0.0)],
        );
        det.map_coords(2.0, Vec2f::new(-5.0, 5.0));

        assert_eq!(det.bounding_rect(), Rect::from_center(15.0, 45.0, 8.0, 4.0));
        assert_eq!(det.keypoints(), &[Vec2f::new(15.0, 45.0), Vec2f::new(-5.0, 5.0)]);
        assert_eq!(det.confidence(), 0.9);
    }
}
