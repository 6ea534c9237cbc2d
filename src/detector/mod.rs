//! Hand detector backends.
//!
//! The [`HandAnnotator`][crate::annotator::HandAnnotator] does not know how hands are found. It
//! talks to a [`HandDetector`], which is handed a [`Frame`] and a [`DetectorConfig`] and answers
//! with a [`DetectionResult`].
//!
//! Two backends are provided: [`fixed::FixedDetector`] always reports the same hands and is meant
//! for tests and demos, [`onnx::OnnxHandDetector`] runs the MediaPipe palm detection and hand
//! landmark networks.

pub mod fixed;
pub mod onnx;

use crate::{frame::ColorEncoding, hand::DetectionResult, timer::Timer, Frame};

/// Whether consecutive frames are related.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingMode {
    /// Every frame is an unrelated image. Detection runs from scratch each time.
    StaticImage,
    /// Frames come from a video stream. Detectors may reuse information from the previous frame.
    #[default]
    Video,
}

/// Which variant of a detector's networks to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelComplexity {
    /// Faster, less accurate networks.
    Lite,
    #[default]
    Full,
}

/// Per-call detector configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub tracking_mode: TrackingMode,
    /// Maximum number of hands to report.
    pub max_hands: usize,
    /// Minimum confidence for a new hand to be detected.
    pub detection_confidence: f32,
    /// Minimum confidence for a hand's landmarks to be reported.
    pub tracking_confidence: f32,
    pub model_complexity: ModelComplexity,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            tracking_mode: TrackingMode::default(),
            max_hands: 2,
            detection_confidence: 0.5,
            tracking_confidence: 0.5,
            model_complexity: ModelComplexity::default(),
        }
    }
}

/// Trait for hand landmark detectors.
pub trait HandDetector {
    /// Returns the [`ColorEncoding`] that frames passed to [`HandDetector::detect`] must use.
    fn input_encoding(&self) -> ColorEncoding {
        ColorEncoding::Rgb
    }

    /// Detects hands in `frame`.
    ///
    /// `frame` is guaranteed to use the encoding returned by [`HandDetector::input_encoding`].
    /// Finding no hands is not an error. The result must not contain more than
    /// [`DetectorConfig::max_hands`] hands.
    fn detect(&mut self, frame: &Frame, config: &DetectorConfig)
        -> anyhow::Result<DetectionResult>;

    /// Returns profiling timers to be logged alongside the frame rate.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

impl<D: HandDetector + ?Sized> HandDetector for &mut D {
    fn input_encoding(&self) -> ColorEncoding {
        (**self).input_encoding()
    }

    fn detect(
        &mut self,
        frame: &Frame,
        config: &DetectorConfig,
    ) -> anyhow::Result<DetectionResult> {
        (**self).detect(frame, config)
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}

impl<D: HandDetector + ?Sized> HandDetector for Box<D> {
    fn input_encoding(&self) -> ColorEncoding {
        (**self).input_encoding()
    }

    fn detect(
        &mut self,
        frame: &Frame,
        config: &DetectorConfig,
    ) -> anyhow::Result<DetectionResult> {
        (**self).detect(frame, config)
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}

#[cfg(test)]
mod tests {
    use crate::{hand::Hand, image::Image};

    use super::{fixed::FixedDetector, *};

    fn detect_via<D: HandDetector>(mut detector: D) -> usize {
        let frame = Frame::new(Image::new(4, 4), ColorEncoding::Rgb);
        detector
            .detect(&frame, &DetectorConfig::default())
            .unwrap()
            .len()
    }

    #[test]
    fn forwarding_impls() {
        let result = DetectionResult::new(vec![Hand::new(Vec::new())]);
        let mut fixed = FixedDetector::new(result.clone());
        assert_eq!(detect_via(&mut fixed), 1);

        let boxed: Box<dyn HandDetector> =
            Box::new(FixedDetector::new(result).with_encoding(ColorEncoding::Bgr));
        assert_eq!(boxed.input_encoding(), ColorEncoding::Bgr);
        assert_eq!(detect_via(boxed), 1);
    }

    #[test]
    fn default_config() {
        let config = DetectorConfig::default();
        assert_eq!(config.tracking_mode, TrackingMode::Video);
        assert_eq!(config.max_hands, 2);
        assert_eq!(config.model_complexity, ModelComplexity::Full);
    }
}
