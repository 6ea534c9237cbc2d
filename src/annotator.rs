//! Hand detection and annotation of frames.
//!
//! [`HandAnnotator`] passes frames to a [`HandDetector`], draws the hand skeletons it reports,
//! and converts landmarks to pixel coordinates:
//!
//! ```
//! use handmark::annotator::{AnnotatorOptions, ExtractOptions, HandAnnotator};
//! use handmark::detector::fixed::FixedDetector;
//! use handmark::image::Image;
//! use handmark::{ColorEncoding, Frame};
//!
//! let mut annotator = HandAnnotator::new(FixedDetector::empty(), AnnotatorOptions::new())?;
//! let frame = Frame::new(Image::new(640, 480), ColorEncoding::Bgr);
//!
//! let mut annotated = annotator.detect(frame, true);
//! let points = annotator.extract_points(
//!     &mut annotated.frame,
//!     &annotated.result,
//!     &ExtractOptions::default(),
//! )?;
//! assert!(points.is_empty());
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```

use std::borrow::Cow;

use crate::{
    detector::{DetectorConfig, HandDetector, ModelComplexity, TrackingMode},
    error::{ConfigError, IndexError},
    hand::{DetectionResult, Hand, Landmark, CONNECTIONS},
    image::{draw, Color},
    timer::Timer,
    Frame,
};

/// Color and size of drawn landmarks or connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawSpec {
    color: Color,
    thickness: u32,
    circle_radius: u32,
}

impl DrawSpec {
    pub const DEFAULT_THICKNESS: u32 = 2;
    pub const DEFAULT_CIRCLE_RADIUS: u32 = 2;

    pub fn new(color: Color) -> Self {
        Self {
            color,
            thickness: Self::DEFAULT_THICKNESS,
            circle_radius: Self::DEFAULT_CIRCLE_RADIUS,
        }
    }

    #[must_use]
    pub fn with_thickness(mut self, thickness: u32) -> Self {
        self.thickness = thickness;
        self
    }

    #[must_use]
    pub fn with_circle_radius(mut self, radius: u32) -> Self {
        self.circle_radius = radius;
        self
    }

    pub fn color(&self) -> Color {
        self.color
    }

    /// Line width used for connections.
    pub fn thickness(&self) -> u32 {
        self.thickness
    }

    /// Radius of the dot drawn at each landmark.
    pub fn circle_radius(&self) -> u32 {
        self.circle_radius
    }
}

/// Construction parameters of a [`HandAnnotator`].
#[derive(Debug, Clone)]
pub struct AnnotatorOptions {
    static_image_mode: bool,
    max_hands: usize,
    model_complexity: ModelComplexity,
    detection_confidence: f32,
    tracking_confidence: f32,
    point_color: Color,
    connection_color: Color,
}

impl AnnotatorOptions {
    pub fn new() -> Self {
        Self {
            static_image_mode: false,
            max_hands: 2,
            model_complexity: ModelComplexity::Full,
            detection_confidence: 0.5,
            tracking_confidence: 0.5,
            point_color: Color::RED,
            connection_color: Color::WHITE,
        }
    }

    /// Treats every frame as an unrelated image instead of a video stream.
    #[must_use]
    pub fn static_image_mode(mut self, static_image_mode: bool) -> Self {
        self.static_image_mode = static_image_mode;
        self
    }

    /// Sets the maximum number of hands to report. Must be at least 1.
    #[must_use]
    pub fn max_hands(mut self, max_hands: usize) -> Self {
        self.max_hands = max_hands;
        self
    }

    #[must_use]
    pub fn model_complexity(mut self, model_complexity: ModelComplexity) -> Self {
        self.model_complexity = model_complexity;
        self
    }

    /// Sets the minimum confidence for detecting a hand, from 0.0 to 1.0.
    #[must_use]
    pub fn detection_confidence(mut self, confidence: f32) -> Self {
        self.detection_confidence = confidence;
        self
    }

    /// Sets the minimum confidence for keeping a tracked hand, from 0.0 to 1.0.
    #[must_use]
    pub fn tracking_confidence(mut self, confidence: f32) -> Self {
        self.tracking_confidence = confidence;
        self
    }

    /// Sets the color of the landmark dots.
    #[must_use]
    pub fn point_color(mut self, color: Color) -> Self {
        self.point_color = color;
        self
    }

    /// Sets the color of the lines connecting landmarks.
    #[must_use]
    pub fn connection_color(mut self, color: Color) -> Self {
        self.connection_color = color;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_hands == 0 {
            return Err(ConfigError::NoHands);
        }
        for (name, value) in [
            ("detection_confidence", self.detection_confidence),
            ("tracking_confidence", self.tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        Ok(())
    }

    fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            tracking_mode: if self.static_image_mode {
                TrackingMode::StaticImage
            } else {
                TrackingMode::Video
            },
            max_hands: self.max_hands,
            detection_confidence: self.detection_confidence,
            tracking_confidence: self.tracking_confidence,
            model_complexity: self.model_complexity,
        }
    }
}

impl Default for AnnotatorOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for [`HandAnnotator::extract_points`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    /// Which detected hand to extract.
    pub hand_index: usize,
    /// Whether to mark the `target_landmark`.
    pub draw: bool,
    pub color: Color,
    pub radius: u32,
    /// Index of the landmark to mark. Indices that don't exist mark nothing.
    pub target_landmark: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            hand_index: 0,
            draw: true,
            color: Color::RED,
            radius: 7,
            target_landmark: 8,
        }
    }
}

/// A landmark in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LandmarkPoint {
    pub index: usize,
    pub x: u32,
    pub y: u32,
}

/// A frame together with the hands detected in it.
#[derive(Debug, Clone)]
pub struct Annotated {
    pub frame: Frame,
    pub result: DetectionResult,
}

/// Detects hands with a [`HandDetector`] and draws them onto frames.
///
/// The annotator keeps no state between frames. Whatever the detector returns is passed back to
/// the caller in [`Annotated`].
pub struct HandAnnotator<D> {
    detector: D,
    config: DetectorConfig,
    landmark_spec: DrawSpec,
    connection_spec: DrawSpec,
    t_convert: Timer,
    t_draw: Timer,
}

impl<D: HandDetector> HandAnnotator<D> {
    /// Creates an annotator, validating `options`.
    pub fn new(detector: D, options: AnnotatorOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            detector,
            config: options.detector_config(),
            landmark_spec: DrawSpec::new(options.point_color),
            connection_spec: DrawSpec::new(options.connection_color),
            t_convert: Timer::new("convert"),
            t_draw: Timer::new("draw"),
        })
    }

    /// Returns the configuration passed to the detector on every call.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn landmark_spec(&self) -> &DrawSpec {
        &self.landmark_spec
    }

    pub fn connection_spec(&self) -> &DrawSpec {
        &self.connection_spec
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    /// Returns profiling timers of the annotator and its detector.
    pub fn timers(&self) -> Vec<&Timer> {
        let mut timers = vec![&self.t_convert];
        timers.extend(self.detector.timers());
        timers.push(&self.t_draw);
        timers
    }

    /// Detects hands in `frame` and, if `draw` is `true`, draws their skeletons onto it.
    ///
    /// This never fails. If the detector returns an error, it is logged and no hands are
    /// reported.
    pub fn detect(&mut self, mut frame: Frame, draw: bool) -> Annotated {
        let encoding = self.detector.input_encoding();
        let input = if frame.encoding() == encoding {
            Cow::Borrowed(&frame)
        } else {
            Cow::Owned(self.t_convert.time(|| frame.to_encoding(encoding)))
        };

        let mut result = match self.detector.detect(&input, &self.config) {
            Ok(result) => result,
            Err(e) => {
                log::error!("hand detection failed: {e:#}");
                DetectionResult::default()
            }
        };
        drop(input);
        result.truncate(self.config.max_hands);

        if draw && !result.is_empty() {
            self.t_draw.time(|| {
                for hand in result.hands() {
                    self.draw_hand(&mut frame, hand);
                }
            });
        }

        Annotated { frame, result }
    }

    /// Converts the landmarks of one hand in `result` to pixel coordinates of `frame`.
    ///
    /// Coordinates are rounded to the nearest pixel and clamped to the frame. If `options.draw` is
    /// `true`, a filled circle is drawn at the landmark with index `options.target_landmark`.
    ///
    /// An empty `result` yields an empty list. Asking for a hand that doesn't exist while other
    /// hands were detected is an [`IndexError`].
    pub fn extract_points(
        &self,
        frame: &mut Frame,
        result: &DetectionResult,
        options: &ExtractOptions,
    ) -> Result<Vec<LandmarkPoint>, IndexError> {
        if result.is_empty() {
            return Ok(Vec::new());
        }
        let hand = result
            .hand(options.hand_index)
            .ok_or(IndexError::HandOutOfRange {
                index: options.hand_index,
                hands: result.len(),
            })?;

        let (width, height) = (frame.width(), frame.height());
        let points = hand
            .landmarks()
            .iter()
            .enumerate()
            .map(|(index, lm)| {
                let (x, y) = to_pixel(lm, width, height);
                LandmarkPoint { index, x, y }
            })
            .collect::<Vec<_>>();

        if options.draw {
            if let Some(p) = points.iter().find(|p| p.index == options.target_landmark) {
                let color = frame.native_color(options.color);
                draw::circle(frame, p.x as i32, p.y as i32, options.radius)
                    .color(color)
                    .filled(true);
            }
        }

        Ok(points)
    }

    fn draw_hand(&self, frame: &mut Frame, hand: &Hand) {
        let (width, height) = (frame.width(), frame.height());
        let positions = hand
            .landmarks()
            .iter()
            .map(|lm| lm.is_in_frame().then(|| to_pixel(lm, width, height)))
            .collect::<Vec<_>>();
        let position = |idx: usize| positions.get(idx).copied().flatten();

        let color = frame.native_color(self.connection_spec.color());
        for (a, b) in CONNECTIONS {
            if let (Some(a), Some(b)) = (position(a.index()), position(b.index())) {
                draw::line(frame, a.0 as i32, a.1 as i32, b.0 as i32, b.1 as i32)
                    .color(color)
                    .stroke_width(self.connection_spec.thickness());
            }
        }

        let color = frame.native_color(self.landmark_spec.color());
        for (x, y) in positions.iter().flatten() {
            draw::circle(
                frame,
                *x as i32,
                *y as i32,
                self.landmark_spec.circle_radius(),
            )
            .color(color)
            .filled(true);
        }
    }
}

/// Converts a normalized landmark to the nearest pixel of a `width`×`height` frame.
fn to_pixel(lm: &Landmark, width: u32, height: u32) -> (u32, u32) {
    let x = (lm.x * width as f32)
        .round()
        .clamp(0.0, width.saturating_sub(1) as f32);
    let y = (lm.y * height as f32)
        .round()
        .clamp(0.0, height.saturating_sub(1) as f32);
    (x as u32, y as u32)
}
