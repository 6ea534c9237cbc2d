//! Palm detection.
//!
//! Palms are much easier to detect than full hands: they are rigid, roughly square, and don't
//! change shape when the fingers move. The palm detector finds them in the full frame, and
//! [`palm_roi`] then derives the region that the landmark network is run on.

use std::{iter, path::Path};

use nalgebra::Rotation2;
use once_cell::sync::Lazy;

use crate::{
    detection::{nms::NonMaxSuppression, Detection},
    image::{AsImageView, AspectRatio, ImageView, Rect, Resolution, RotatedRect, Vec2f},
    nn::{Cnn, ColorMapper, NeuralNetwork, Outputs},
    num::sigmoid,
    timer::Timer,
};

use super::rotation_radians;

/// A keypoint of a palm [`Detection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keypoint {
    Wrist = 0,
    IndexFingerMcp = 1,
    MiddleFingerMcp = 2,
    RingFingerMcp = 3,
    PinkyMcp = 4,
    ThumbCmc = 5,
    ThumbMcp = 6,
}

/// Number of values the network outputs per anchor: a box and 7 keypoints.
const BOX_PARAMS: usize = 4 + 7 * 2;

/// Distance to shift the palm box towards the fingers, relative to its height.
const ROI_SHIFT: f32 = 0.5;
/// Factor to enlarge the squared palm box by, so that it covers the whole hand.
const ROI_SCALE: f32 = 2.6;

/// Output feature maps of the network, as (cells per side, anchors per cell).
const ANCHOR_LAYERS: [(u32, usize); 2] = [(24, 2), (12, 6)];

/// Anchor centers in network output order, normalized to the input size.
///
/// Every anchor of a cell sits at the cell's center. The network regresses box sizes directly,
/// so anchors carry no size.
static ANCHORS: Lazy<Vec<Vec2f>> = Lazy::new(|| {
    ANCHOR_LAYERS
        .iter()
        .flat_map(|&(cells, per_cell)| {
            let cell_size = 1.0 / cells as f32;
            (0..cells).flat_map(move |y| {
                (0..cells).flat_map(move |x| {
                    let center = Vec2f::new(x as f32 + 0.5, y as f32 + 0.5) * cell_size;
                    iter::repeat(center).take(per_cell)
                })
            })
        })
        .collect()
});

/// Runs the palm detection network and decodes its output.
pub struct PalmDetector {
    cnn: Cnn,
    thresh: f32,
    nms: NonMaxSuppression,
    detections: Vec<Detection>,
    t_infer: Timer,
    t_extract: Timer,
    t_nms: Timer,
}

impl PalmDetector {
    pub const DEFAULT_THRESHOLD: f32 = 0.5;

    pub fn new(cnn: Cnn) -> Self {
        Self {
            cnn,
            thresh: Self::DEFAULT_THRESHOLD,
            nms: NonMaxSuppression::new(),
            detections: Vec::new(),
            t_infer: Timer::new("palm infer"),
            t_extract: Timer::new("palm extract"),
            t_nms: Timer::new("palm nms"),
        }
    }

    /// Loads a palm detection network from an ONNX file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let nn = NeuralNetwork::from_path(path)?.load()?;
        Ok(Self::new(Cnn::new(nn, ColorMapper::linear(0.0..=1.0))?))
    }

    pub fn input_resolution(&self) -> Resolution {
        self.cnn.input_resolution()
    }

    /// Sets the minimum confidence a palm needs to be reported.
    #[inline]
    pub fn set_threshold(&mut self, thresh: f32) {
        self.thresh = thresh;
    }

    /// Detects palms in `image`.
    ///
    /// Returned detections use `image` coordinates and are ordered by descending confidence.
    pub fn detect<V: AsImageView>(&mut self, image: &V) -> anyhow::Result<Vec<Detection>> {
        self.detect_impl(image.as_view())
    }

    fn detect_impl(&mut self, image: ImageView<'_>) -> anyhow::Result<Vec<Detection>> {
        self.detections.clear();
        let input_res = self.cnn.input_resolution();

        // Pad the image with black bars to the network's aspect ratio, instead of stretching it.
        let aspect = input_res.aspect_ratio().unwrap_or(AspectRatio::SQUARE);
        let rect = image.rect().grow_to_fit_aspect(aspect);
        let view = image.view(rect);
        let outputs = self.t_infer.time(|| self.cnn.estimate(&view))?;
        log::trace!("palm inference result: {:?}", outputs);

        self.t_extract.time(|| {
            extract_outputs(input_res, &outputs, self.thresh, &mut self.detections)
        })?;

        let mut detections = self.t_nms.time(|| self.nms.process(&mut self.detections));

        // Map from network input coordinates back to `image`, removing the padding.
        let scale = rect.width() / input_res.width() as f32;
        for det in &mut detections {
            det.map_coords(scale, rect.top_left());
        }

        Ok(detections)
    }

    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_infer, &self.t_extract, &self.t_nms].into_iter()
    }
}

fn extract_outputs(
    input_res: Resolution,
    outputs: &Outputs,
    thresh: f32,
    detections: &mut Vec<Detection>,
) -> anyhow::Result<()> {
    let num_anchors = ANCHORS.len();
    let boxes = outputs.get(0)?;
    let confidences = outputs.get(1)?;

    if boxes.shape() != [1, num_anchors, BOX_PARAMS] {
        anyhow::bail!("unexpected palm box tensor shape {:?}", boxes.shape());
    }
    if confidences.shape() != [1, num_anchors, 1] {
        anyhow::bail!(
            "unexpected palm score tensor shape {:?}",
            confidences.shape()
        );
    }

    for (index, (&raw, box_params)) in confidences
        .as_slice()
        .iter()
        .zip(boxes.as_slice().chunks_exact(BOX_PARAMS))
        .enumerate()
    {
        let conf = sigmoid(raw);
        if conf < thresh {
            continue;
        }

        detections.push(extract_detection(ANCHORS[index], input_res, box_params, conf));
    }

    Ok(())
}

fn extract_detection(
    anchor: Vec2f,
    input_res: Resolution,
    box_params: &[f32],
    confidence: f32,
) -> Detection {
    let input_w = input_res.width() as f32;
    let input_h = input_res.height() as f32;
    let offset = Vec2f::new(anchor.x * input_w, anchor.y * input_h);

    let xc = box_params[0] + offset.x;
    let yc = box_params[1] + offset.y;
    let w = box_params[2];
    let h = box_params[3];
    let keypoints = box_params[4..]
        .chunks_exact(2)
        .map(|xy| Vec2f::new(xy[0], xy[1]) + offset)
        .collect::<Vec<_>>();

    let finger = keypoints[Keypoint::MiddleFingerMcp as usize];
    let wrist = keypoints[Keypoint::Wrist as usize];

    let mut det = Detection::with_keypoints(confidence, Rect::from_center(xc, yc, w, h), keypoints);
    det.set_angle(rotation_radians(wrist, finger));
    det
}

/// Computes the region of interest for the landmark network from a palm detection.
///
/// The palm box is rotated to point the fingers up, moved towards the fingers, squared, and
/// enlarged so that the whole hand fits inside.
pub fn palm_roi(palm: &Detection) -> RotatedRect {
    let radians = palm.angle();
    let rect = palm.bounding_rect();

    let up = Rotation2::new(radians) * Vec2f::new(0.0, -1.0);
    let rect = rect
        .move_by(up * rect.height() * ROI_SHIFT)
        .grow_to_fit_aspect(AspectRatio::SQUARE)
        .scale(ROI_SCALE);

    RotatedRect::new(rect, radians)
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use approx::assert_relative_eq;

    use crate::nn::tensor::Tensor;

    use super::*;

    const INPUT_RES: Resolution = Resolution::new(192, 192);

    /// Network outputs with a single confident palm at anchor `index`.
    fn outputs_with_palm(index: usize, params: [f32; BOX_PARAMS]) -> Outputs {
        let n = ANCHORS.len();
        let mut boxes = vec![0.0; n * BOX_PARAMS];
        boxes[index * BOX_PARAMS..][..BOX_PARAMS].copy_from_slice(&params);
        let mut scores = vec![-10.0; n];
        scores[index] = 10.0;

        Outputs::from_iter([
            Tensor::from_iter(&[1, n, BOX_PARAMS], boxes),
            Tensor::from_iter(&[1, n, 1], scores),
        ])
    }

    #[test]
    fn anchor_layout() {
        assert_eq!(ANCHORS.len(), 2016);

        // Two anchors per cell of the 24x24 map, row by row.
        assert_eq!(ANCHORS[0], ANCHORS[1]);
        assert_relative_eq!(ANCHORS[0], Vec2f::new(0.5 / 24.0, 0.5 / 24.0));
        assert_relative_eq!(ANCHORS[2], Vec2f::new(1.5 / 24.0, 0.5 / 24.0));
        assert_relative_eq!(ANCHORS[48], Vec2f::new(0.5 / 24.0, 1.5 / 24.0));

        // Then six per cell of the 12x12 map.
        let second = &ANCHORS[24 * 24 * 2..];
        assert_eq!(second.len(), 12 * 12 * 6);
        assert!(second[..6].iter().all(|&a| a == second[0]));
        assert_relative_eq!(second[0], Vec2f::new(0.5 / 12.0, 0.5 / 12.0));
        assert_relative_eq!(second[second.len() - 1], Vec2f::new(11.5 / 12.0, 11.5 / 12.0));
    }

    #[test]
    fn decodes_single_palm() {
        let mut params = [0.0; BOX_PARAMS];
        params[..4].copy_from_slice(&[1.0, 2.0, 30.0, 40.0]);
        // Wrist below the anchor, middle finger MCP above it.
        params[4..6].copy_from_slice(&[0.0, 10.0]);
        params[8..10].copy_from_slice(&[0.0, -10.0]);

        let mut detections = Vec::new();
        extract_outputs(INPUT_RES, &outputs_with_palm(0, params), 0.5, &mut detections).unwrap();
        assert_eq!(detections.len(), 1);

        // Anchor 0 is centered on the first 8x8 cell.
        let det = &detections[0];
        assert!(det.confidence() > 0.99);
        assert_relative_eq!(det.bounding_rect().center(), Vec2f::new(5.0, 6.0), epsilon = 1e-4);
        assert_eq!(det.bounding_rect().size(), Vec2f::new(30.0, 40.0));
        assert_eq!(det.keypoints().len(), 7);
        assert_relative_eq!(
            det.keypoints()[Keypoint::Wrist as usize],
            Vec2f::new(4.0, 14.0),
            epsilon = 1e-4
        );
        assert_relative_eq!(det.angle(), 0.0);
    }

    #[test]
    fn threshold_filters_palms() {
        let outputs = outputs_with_palm(100, [0.0; BOX_PARAMS]);

        let mut detections = Vec::new();
        extract_outputs(INPUT_RES, &outputs, 0.5, &mut detections).unwrap();
        assert_eq!(detections.len(), 1);

        detections.clear();
        extract_outputs(INPUT_RES, &outputs, 1.0, &mut detections).unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn rejects_unexpected_shapes() {
        let outputs = Outputs::from_iter([
            Tensor::from_iter(&[1, 4, BOX_PARAMS], vec![0.0; 4 * BOX_PARAMS]),
            Tensor::from_iter(&[1, 4, 1], vec![0.0; 4]),
        ]);
        let err = extract_outputs(INPUT_RES, &outputs, 0.5, &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("palm box"), "{err}");

        let outputs = Outputs::from_iter([Tensor::from_iter(&[1], [0.0])]);
        assert!(extract_outputs(INPUT_RES, &outputs, 0.5, &mut Vec::new()).is_err());
    }

    #[test]
    fn roi_of_upright_palm() {
        let palm = Detection::new(0.9, Rect::from_center(100.0, 100.0, 20.0, 10.0));
        let roi = palm_roi(&palm);

        assert_eq!(roi.rotation_radians(), 0.0);
        assert_relative_eq!(roi.center(), Vec2f::new(100.0, 95.0));
        assert_relative_eq!(roi.rect().width(), 52.0, epsilon = 1e-4);
        assert_relative_eq!(roi.rect().height(), 52.0, epsilon = 1e-4);
    }

    #[test]
    fn roi_follows_rotation() {
        // Fingers pointing right.
        let mut palm = Detection::new(0.9, Rect::from_center(100.0, 100.0, 20.0, 20.0));
        palm.set_angle(FRAC_PI_2);
        let roi = palm_roi(&palm);

        assert_eq!(roi.rotation_radians(), FRAC_PI_2);
        assert_relative_eq!(roi.center(), Vec2f::new(110.0, 100.0), epsilon = 1e-4);
        assert_relative_eq!(roi.rect().width(), 52.0, epsilon = 1e-4);
    }
}
