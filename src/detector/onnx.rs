//! Hand detection with the MediaPipe palm detection and hand landmark networks.
//!
//! Running the palm detector on every frame is expensive, so in [`TrackingMode::Video`] the
//! detector keeps a region of interest around each hand it found and runs only the landmark
//! network on it in the next frame. Palm detection runs again when fewer than
//! [`DetectorConfig::max_hands`] hands are being tracked.

use std::{
    env, mem,
    path::{Path, PathBuf},
};

use anyhow::Context;
use once_cell::sync::Lazy;

use crate::{
    hand::{
        landmark::{LandmarkEstimate, LandmarkNetwork},
        palm::{palm_roi, PalmDetector},
        DetectionResult, Hand,
    },
    image::{AspectRatio, Rect, RotatedRect},
    timer::Timer,
    Frame,
};

use super::{DetectorConfig, HandDetector, ModelComplexity, TrackingMode};

const DEFAULT_MODEL_DIR: &str = "3rdparty/onnx";

/// Minimum Intersection-over-Union at which two regions are considered to contain the same hand.
const SAME_HAND_IOU: f32 = 0.3;

/// Relative padding added around the landmarks of a tracked hand.
const TRACKING_PADDING: f32 = 0.3;

static MODEL_DIR: Lazy<PathBuf> = Lazy::new(|| match env::var_os("HANDMARK_MODEL_DIR") {
    Some(dir) => {
        let dir = PathBuf::from(dir);
        log::debug!("loading networks from {} (HANDMARK_MODEL_DIR)", dir.display());
        dir
    }
    None => PathBuf::from(DEFAULT_MODEL_DIR),
});

/// A [`HandDetector`] running ONNX networks through `tract`.
pub struct OnnxHandDetector {
    model_dir: PathBuf,
    complexity: ModelComplexity,
    palm: PalmDetector,
    landmarks: LandmarkNetwork,
    rois: Vec<RotatedRect>,
}

impl OnnxHandDetector {
    /// Loads the networks from the directory given by `HANDMARK_MODEL_DIR` (or `3rdparty/onnx`).
    pub fn new(complexity: ModelComplexity) -> anyhow::Result<Self> {
        Self::from_dir(&*MODEL_DIR, complexity)
    }

    /// Loads the networks from `dir`.
    ///
    /// The directory has to contain `palm_detection_{lite,full}.onnx` and
    /// `hand_landmark_{lite,full}.onnx`.
    pub fn from_dir<P: AsRef<Path>>(dir: P, complexity: ModelComplexity) -> anyhow::Result<Self> {
        let model_dir = dir.as_ref().to_path_buf();
        let (palm, landmarks) = load_networks(&model_dir, complexity)?;
        Ok(Self {
            model_dir,
            complexity,
            palm,
            landmarks,
            rois: Vec::new(),
        })
    }

    pub fn model_complexity(&self) -> ModelComplexity {
        self.complexity
    }

    /// Returns the regions of interest that will be used for the next frame.
    pub fn tracked_regions(&self) -> &[RotatedRect] {
        &self.rois
    }

    fn set_complexity(&mut self, complexity: ModelComplexity) -> anyhow::Result<()> {
        if complexity != self.complexity {
            log::info!("switching to {:?} hand networks", complexity);
            let (palm, landmarks) = load_networks(&self.model_dir, complexity)?;
            self.palm = palm;
            self.landmarks = landmarks;
            self.complexity = complexity;
            self.rois.clear();
        }
        Ok(())
    }

    fn detect_impl(
        &mut self,
        frame: &Frame,
        config: &DetectorConfig,
    ) -> anyhow::Result<DetectionResult> {
        self.set_complexity(config.model_complexity)?;

        let (palm, landmarks) = (&mut self.palm, &mut self.landmarks);
        let hands = track_hands(
            &mut self.rois,
            config,
            (frame.width(), frame.height()),
            || {
                palm.set_threshold(config.detection_confidence);
                Ok(palm.detect(frame)?.iter().map(palm_roi).collect())
            },
            |roi| landmarks.estimate(frame, roi),
        )?;

        Ok(DetectionResult::new(hands))
    }
}

impl HandDetector for OnnxHandDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        config: &DetectorConfig,
    ) -> anyhow::Result<DetectionResult> {
        self.detect_impl(frame, config)
    }

    fn timers(&self) -> Vec<&Timer> {
        self.palm.timers().chain(self.landmarks.timers()).collect()
    }
}

fn load_networks(
    dir: &Path,
    complexity: ModelComplexity,
) -> anyhow::Result<(PalmDetector, LandmarkNetwork)> {
    let suffix = match complexity {
        ModelComplexity::Lite => "lite",
        ModelComplexity::Full => "full",
    };
    let load = || -> anyhow::Result<_> {
        let palm = PalmDetector::load(dir.join(format!("palm_detection_{suffix}.onnx")))?;
        let landmarks = LandmarkNetwork::load(dir.join(format!("hand_landmark_{suffix}.onnx")))?;
        Ok((palm, landmarks))
    };
    load().with_context(|| {
        format!(
            "failed to load MediaPipe hand networks from '{}' (set HANDMARK_MODEL_DIR to the \
             directory holding the ONNX conversions)",
            dir.display()
        )
    })
}

/// Runs one detection step.
///
/// `tracked` holds the regions found in the previous frame and is replaced by the regions to search
/// in the next one. `detect_palms` is only called when fewer than `max_hands` regions are tracked,
/// and `estimate_landmarks` runs the landmark network on a single region.
fn track_hands(
    tracked: &mut Vec<RotatedRect>,
    config: &DetectorConfig,
    (width, height): (u32, u32),
    detect_palms: impl FnOnce() -> anyhow::Result<Vec<RotatedRect>>,
    mut estimate_landmarks: impl FnMut(RotatedRect) -> anyhow::Result<LandmarkEstimate>,
) -> anyhow::Result<Vec<Hand>> {
    let mut rois = match config.tracking_mode {
        TrackingMode::Video => mem::take(tracked),
        TrackingMode::StaticImage => {
            tracked.clear();
            Vec::new()
        }
    };
    rois.truncate(config.max_hands);

    if rois.len() < config.max_hands {
        let palms = detect_palms()?;
        log::trace!("{} palms, {} tracked regions", palms.len(), rois.len());
        add_new_regions(&mut rois, palms, config.max_hands);
    }

    let mut hands = Vec::new();
    for roi in rois {
        let estimate = estimate_landmarks(roi)?;
        if estimate.presence() < config.tracking_confidence {
            log::trace!(
                "dropping hand with presence {:.2} < {:.2}",
                estimate.presence(),
                config.tracking_confidence,
            );
            continue;
        }

        let hand = estimate.to_hand(width, height);
        if config.tracking_mode == TrackingMode::Video {
            if let Some(next) = tracking_roi(&hand, width, height) {
                // Two regions converged onto the same hand.
                if tracked.iter().any(|kept| overlaps(kept, &next)) {
                    continue;
                }
                tracked.push(next);
            }
        }
        hands.push(hand);
    }

    Ok(hands)
}

/// Adds regions from `candidates` to `rois` that don't overlap an existing region, until `rois`
/// holds `max` regions.
fn add_new_regions(
    rois: &mut Vec<RotatedRect>,
    candidates: impl IntoIterator<Item = RotatedRect>,
    max: usize,
) {
    for candidate in candidates {
        if rois.len() >= max {
            break;
        }
        if rois.iter().any(|roi| overlaps(roi, &candidate)) {
            continue;
        }
        rois.push(candidate);
    }
}

/// Computes the region to search for `hand` in the next frame.
fn tracking_roi(hand: &Hand, width: u32, height: u32) -> Option<RotatedRect> {
    let bounds = hand.rotated_bounds(width as f32, height as f32)?;
    Some(bounds.map(|rect| {
        rect.grow_rel(TRACKING_PADDING)
            .grow_to_fit_aspect(AspectRatio::SQUARE)
    }))
}

fn overlaps(a: &RotatedRect, b: &RotatedRect) -> bool {
    let a = Rect::bounding(a.rotated_corners());
    let b = Rect::bounding(b.rotated_corners());
    match (a, b) {
        (Some(a), Some(b)) => a.iou(&b) >= SAME_HAND_IOU,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        hand::{Landmark, NUM_LANDMARKS},
        image::Vec2f,
    };

    use super::*;

    const RES: (u32, u32) = (640, 480);

    fn square(x: f32, y: f32, size: f32) -> RotatedRect {
        Rect::from_center(x, y, size, size).into()
    }

    /// A hand spread over roughly 80x64 pixels around `center`.
    fn estimate_at(center: Vec2f, presence: f32) -> LandmarkEstimate {
        let positions = (0..NUM_LANDMARKS)
            .map(|i| {
                [
                    center.x - 40.0 + (i % 5) as f32 * 20.0,
                    center.y - 32.0 + (i / 5) as f32 * 16.0,
                    0.0,
                ]
            })
            .collect();
        LandmarkEstimate::new(positions, presence, 0.9)
    }

    fn config(tracking_mode: TrackingMode, max_hands: usize) -> DetectorConfig {
        DetectorConfig {
            tracking_mode,
            max_hands,
            ..DetectorConfig::default()
        }
    }

    #[test]
    fn tracked_hands_skip_palm_detection() {
        let mut tracked = vec![square(150.0, 240.0, 100.0), square(450.0, 240.0, 100.0)];
        let mut searched = Vec::new();
        let hands = track_hands(
            &mut tracked,
            &config(TrackingMode::Video, 2),
            RES,
            || panic!("palm detection ran although all hands are tracked"),
            |roi| {
                searched.push(roi.center());
                Ok(estimate_at(roi.center(), 0.9))
            },
        )
        .unwrap();

        assert_eq!(
            searched,
            [Vec2f::new(150.0, 240.0), Vec2f::new(450.0, 240.0)]
        );
        assert_eq!(hands.len(), 2);
        assert_eq!(tracked.len(), 2);
        assert!(tracked[0].contains_point(Vec2f::new(150.0, 240.0)));
        assert!(tracked[1].contains_point(Vec2f::new(450.0, 240.0)));
    }

    #[test]
    fn palm_detection_fills_free_slots() {
        let mut tracked = vec![square(150.0, 240.0, 100.0)];
        let mut palm_calls = 0;
        let mut searched = Vec::new();
        let hands = track_hands(
            &mut tracked,
            &config(TrackingMode::Video, 2),
            RES,
            || {
                palm_calls += 1;
                // The first palm is the hand that is already tracked.
                Ok(vec![
                    square(155.0, 240.0, 100.0),
                    square(450.0, 240.0, 100.0),
                    square(300.0, 100.0, 100.0),
                ])
            },
            |roi| {
                searched.push(roi.center());
                Ok(estimate_at(roi.center(), 0.9))
            },
        )
        .unwrap();

        assert_eq!(palm_calls, 1);
        assert_eq!(
            searched,
            [Vec2f::new(150.0, 240.0), Vec2f::new(450.0, 240.0)]
        );
        assert_eq!(hands.len(), 2);
        assert_eq!(tracked.len(), 2);
    }

    #[test]
    fn unlikely_hands_are_dropped() {
        let mut tracked = vec![square(150.0, 240.0, 100.0), square(450.0, 240.0, 100.0)];
        let hands = track_hands(
            &mut tracked,
            &config(TrackingMode::Video, 2),
            RES,
            || Ok(Vec::new()),
            |roi| {
                let presence = if roi.center().x > 300.0 { 0.2 } else { 0.9 };
                Ok(estimate_at(roi.center(), presence))
            },
        )
        .unwrap();

        assert_eq!(hands.len(), 1);
        assert!(hands[0].landmarks()[0].x < 0.5);
        assert_eq!(tracked.len(), 1);
        assert!(tracked[0].contains_point(Vec2f::new(150.0, 240.0)));
    }

    #[test]
    fn static_images_track_nothing() {
        let mut tracked = vec![square(150.0, 240.0, 100.0)];
        let mut searched = Vec::new();
        let hands = track_hands(
            &mut tracked,
            &config(TrackingMode::StaticImage, 2),
            RES,
            || Ok(vec![square(450.0, 240.0, 100.0)]),
            |roi| {
                searched.push(roi.center());
                Ok(estimate_at(roi.center(), 0.9))
            },
        )
        .unwrap();

        assert_eq!(searched, [Vec2f::new(450.0, 240.0)]);
        assert_eq!(hands.len(), 1);
        assert!(tracked.is_empty());
    }

    #[test]
    fn converged_regions_report_one_hand() {
        let mut tracked = vec![square(150.0, 240.0, 100.0), square(450.0, 240.0, 100.0)];
        let hands = track_hands(
            &mut tracked,
            &config(TrackingMode::Video, 2),
            RES,
            || Ok(Vec::new()),
            // Both regions found the hand in the middle.
            |_| Ok(estimate_at(Vec2f::new(300.0, 240.0), 0.9)),
        )
        .unwrap();

        assert_eq!(hands.len(), 1);
        assert_eq!(tracked.len(), 1);
        assert!(tracked[0].contains_point(Vec2f::new(300.0, 240.0)));
    }

    #[test]
    fn new_regions_skip_tracked_hands() {
        let mut rois = vec![square(100.0, 100.0, 50.0)];
        let candidates = [
            square(105.0, 100.0, 50.0),
            square(300.0, 100.0, 50.0),
            square(500.0, 100.0, 50.0),
        ];
        add_new_regions(&mut rois, candidates, 2);

        assert_eq!(rois, [square(100.0, 100.0, 50.0), square(300.0, 100.0, 50.0)]);
    }

    #[test]
    fn tracking_region_covers_hand() {
        let landmarks = (0..NUM_LANDMARKS)
            .map(|i| Landmark::new(0.4 + (i % 5) as f32 * 0.05, 0.3 + (i / 5) as f32 * 0.05, 0.0))
            .collect();
        let hand = Hand::new(landmarks);

        let roi = tracking_roi(&hand, 640, 480).unwrap();
        let size = roi.rect().size();
        assert!((size.x - size.y).abs() < 1e-3, "{roi:?} is not square");
        for lm in hand.landmarks() {
            let p = Vec2f::new(lm.x * 640.0, lm.y * 480.0);
            assert!(roi.contains_point(p), "{roi:?} does not contain {p}");
        }

        assert!(tracking_roi(&Hand::new(Vec::new()), 640, 480).is_none());
    }

    #[test]
    fn missing_models_are_reported() {
        let err = OnnxHandDetector::from_dir("/nonexistent", ModelComplexity::Lite)
            .err()
            .unwrap();
        let msg = format!("{err:#}");
        assert!(msg.contains("HANDMARK_MODEL_DIR"), "{msg}");
        assert!(msg.contains("'/nonexistent'"), "{msg}");
        assert!(msg.contains("palm_detection_lite.onnx"), "{msg}");
    }
}
