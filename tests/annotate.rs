use std::collections::HashSet;

use handmark::annotator::{AnnotatorOptions, ExtractOptions, HandAnnotator};
use handmark::detector::fixed::FixedDetector;
use handmark::hand::{DetectionResult, Hand, Handedness, Landmark, NUM_LANDMARKS};
use handmark::image::{Color, Image};
use handmark::pipeline::{self, FrameSink, LoopOptions};
use handmark::video::StillImage;
use handmark::{ColorEncoding, Frame};

fn spread_hand(seed: u64) -> Hand {
    let mut rng = fastrand::Rng::with_seed(seed);
    let landmarks = (0..NUM_LANDMARKS)
        .map(|_| Landmark::new(rng.f32(), rng.f32(), rng.f32() * 0.1 - 0.05))
        .collect();
    Hand::new(landmarks).with_handedness(Handedness::Right)
}

fn gray_frame(encoding: ColorEncoding) -> Frame {
    let mut image = Image::new(640, 480);
    image.clear(Color::from_rgb8(90, 90, 90));
    Frame::new(image, encoding)
}

#[test]
fn fixed_landmarks_map_to_rounded_pixels() {
    let hand = spread_hand(7);
    let result = DetectionResult::new(vec![hand.clone()]);
    let mut annotator =
        HandAnnotator::new(FixedDetector::new(result), AnnotatorOptions::new()).unwrap();

    let mut annotated = annotator.detect(gray_frame(ColorEncoding::Bgr), false);
    let options = ExtractOptions {
        draw: false,
        ..ExtractOptions::default()
    };
    let points = annotator
        .extract_points(&mut annotated.frame, &annotated.result, &options)
        .unwrap();

    assert_eq!(points.len(), NUM_LANDMARKS);
    let indices = points.iter().map(|p| p.index).collect::<HashSet<_>>();
    assert_eq!(indices, (0..NUM_LANDMARKS).collect());

    for (point, lm) in points.iter().zip(hand.landmarks()) {
        let x = (lm.x * 640.0).round().min(639.0) as u32;
        let y = (lm.y * 480.0).round().min(479.0) as u32;
        assert_eq!((point.x, point.y), (x, y), "landmark {}", point.index);
    }

    // Nothing was drawn.
    assert_eq!(
        annotated.frame.image().data(),
        gray_frame(ColorEncoding::Bgr).image().data()
    );
}

#[test]
fn only_requested_number_of_hands() {
    let result = DetectionResult::new(vec![spread_hand(1), spread_hand(2), spread_hand(3)]);
    let mut annotator = HandAnnotator::new(
        FixedDetector::new(result),
        AnnotatorOptions::new().max_hands(1),
    )
    .unwrap();

    let mut annotated = annotator.detect(gray_frame(ColorEncoding::Rgb), true);
    assert_eq!(annotated.result.len(), 1);

    let err = annotator
        .extract_points(
            &mut annotated.frame,
            &annotated.result,
            &ExtractOptions {
                hand_index: 1,
                ..ExtractOptions::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.to_string(), "hand index 1 is out of range (1 hands detected)");
}

#[derive(Default)]
struct Recorder(Vec<Frame>);

impl FrameSink for Recorder {
    fn show(&mut self, frame: &Frame) -> anyhow::Result<()> {
        self.0.push(frame.clone());
        Ok(())
    }
}

#[test]
fn still_image_through_capture_loop() {
    let mut image = Image::new(640, 480);
    image.clear(Color::BLACK);
    let source = StillImage::new(image);

    let mut hand_landmarks = vec![Landmark::new(0.5, 0.5, 0.0); NUM_LANDMARKS];
    hand_landmarks[8] = Landmark::new(0.25, 0.25, 0.0);
    let result = DetectionResult::new(vec![Hand::new(hand_landmarks)]);
    let mut annotator =
        HandAnnotator::new(FixedDetector::new(result), AnnotatorOptions::new()).unwrap();

    let mut sink = Recorder::default();
    let stats = pipeline::run(
        source,
        &mut annotator,
        &mut sink,
        &LoopOptions::new().max_frames(3),
    )
    .unwrap();

    assert_eq!(stats.frames, 3);
    assert_eq!(stats.skipped, 0);
    assert_eq!(annotator.detector().calls(), 3);
    for frame in &sink.0 {
        assert_eq!(frame.image().get(160, 120), Color::RED);
        // Far away from every landmark and connection.
        assert_eq!(frame.image().get(600, 40), Color::BLACK);
    }
}
