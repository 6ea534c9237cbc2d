//! Hand landmark estimation.

use std::path::Path;

use crate::{
    image::{AsImageView, AspectRatio, ImageView, RotatedRect, Vec2f},
    iter::zip_exact,
    nn::{Cnn, ColorMapper, NeuralNetwork, Outputs},
    timer::Timer,
};

use super::{Hand, Handedness, Landmark, NUM_LANDMARKS};

/// Landmarks estimated by a [`LandmarkNetwork`], in pixel coordinates of the full image.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkEstimate {
    positions: Vec<[f32; 3]>,
    presence: f32,
    raw_handedness: f32,
}

impl LandmarkEstimate {
    #[cfg(test)]
    pub(crate) fn new(positions: Vec<[f32; 3]>, presence: f32, raw_handedness: f32) -> Self {
        Self {
            positions,
            presence,
            raw_handedness,
        }
    }

    /// Returns the 3D landmark positions.
    ///
    /// X and Y are pixel coordinates. Z uses the same scale as X, relative to the wrist.
    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    /// Returns the confidence that the region contained a hand.
    ///
    /// The value is between 0.0 and 1.0, with higher values indicating higher confidence that a
    /// hand was present.
    pub fn presence(&self) -> f32 {
        self.presence
    }

    /// Returns the estimated handedness of the hand.
    ///
    /// This assumes that the camera image is passed in as-is, and the returned value should only be
    /// relied on when `presence` is over some threshold.
    pub fn handedness(&self) -> Handedness {
        if self.raw_handedness > 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        }
    }

    /// Converts the estimate to a [`Hand`] with landmarks normalized to a `width`×`height` image.
    pub fn to_hand(&self, width: u32, height: u32) -> Hand {
        let (w, h) = (width as f32, height as f32);
        let landmarks = self
            .positions
            .iter()
            .map(|&[x, y, z]| Landmark::new(x / w, y / h, z / w))
            .collect();

        Hand::new(landmarks)
            .with_handedness(self.handedness())
            .with_presence(self.presence)
    }

    /// Maps positions from the network's `input_size`×`input_size` input into the parent image of
    /// `view_rect`.
    fn map_out(&mut self, view_rect: RotatedRect, input_size: f32) {
        let scale = view_rect.rect().width() / input_size;
        for pos in &mut self.positions {
            let [x, y, z] = pos.map(|t| t * scale);
            let p = view_rect.transform_out(Vec2f::new(x, y));
            *pos = [p.x, p.y, z];
        }
    }
}

/// Wraps a hand landmark network.
///
/// The network expects a square, upright crop containing a single hand.
pub struct LandmarkNetwork {
    cnn: Cnn,
    t_infer: Timer,
    t_extract: Timer,
}

impl LandmarkNetwork {
    pub fn new(cnn: Cnn) -> Self {
        Self {
            cnn,
            t_infer: Timer::new("landmark infer"),
            t_extract: Timer::new("landmark extract"),
        }
    }

    /// Loads a hand landmark network from an ONNX file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let nn = NeuralNetwork::from_path(path)?.load()?;
        Ok(Self::new(Cnn::new(nn, ColorMapper::linear(0.0..=1.0))?))
    }

    /// Estimates landmarks of the hand inside `roi`.
    ///
    /// `roi` is a rotated rectangle in `image` coordinates whose "up" direction points towards the
    /// fingers. It is enlarged to the network's aspect ratio if necessary. The returned positions
    /// are in `image` coordinates.
    pub fn estimate<V: AsImageView>(
        &mut self,
        image: &V,
        roi: RotatedRect,
    ) -> anyhow::Result<LandmarkEstimate> {
        self.estimate_impl(image.as_view(), roi)
    }

    fn estimate_impl(
        &mut self,
        image: ImageView<'_>,
        roi: RotatedRect,
    ) -> anyhow::Result<LandmarkEstimate> {
        let input_res = self.cnn.input_resolution();
        let aspect = input_res.aspect_ratio().unwrap_or(AspectRatio::SQUARE);
        let view_rect = roi.map(|rect| rect.grow_to_fit_aspect(aspect));
        let view = image.view(view_rect);

        let outputs = self.t_infer.time(|| self.cnn.estimate(&view))?;
        log::trace!("landmark inference result: {:?}", outputs);

        let mut estimate = self.t_extract.time(|| extract(&outputs))?;
        estimate.map_out(view_rect, input_res.width() as f32);
        Ok(estimate)
    }

    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_infer, &self.t_extract].into_iter()
    }
}

fn extract(outputs: &Outputs) -> anyhow::Result<LandmarkEstimate> {
    let screen_landmarks = outputs.get(0)?;
    let presence_flag = outputs.get(1)?;
    let handedness = outputs.get(2)?;

    if screen_landmarks.shape() != [1, NUM_LANDMARKS * 3] {
        anyhow::bail!(
            "unexpected hand landmark tensor shape {:?}",
            screen_landmarks.shape()
        );
    }

    let mut positions = vec![[0.0; 3]; NUM_LANDMARKS];
    for (coords, out) in zip_exact(screen_landmarks.as_slice().chunks_exact(3), &mut positions) {
        *out = [coords[0], coords[1], coords[2]];
    }

    Ok(LandmarkEstimate {
        positions,
        presence: presence_flag.as_singular()?,
        raw_handedness: handedness.as_singular()?,
    })
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use approx::assert_relative_eq;

    use crate::{image::Rect, nn::tensor::Tensor};

    use super::*;

    fn outputs(presence: f32, handedness: f32) -> Outputs {
        let landmarks = (0..NUM_LANDMARKS * 3).map(|i| i as f32);
        Outputs::from_iter([
            Tensor::from_iter(&[1, 63], landmarks),
            Tensor::from_iter(&[1, 1], [presence]),
            Tensor::from_iter(&[1, 1], [handedness]),
            Tensor::from_iter(&[1, 63], [0.0; 63]),
        ])
    }

    #[test]
    fn extracts_landmarks() {
        let estimate = extract(&outputs(0.9, 0.8)).unwrap();
        assert_eq!(estimate.positions().len(), NUM_LANDMARKS);
        assert_eq!(estimate.positions()[0], [0.0, 1.0, 2.0]);
        assert_eq!(estimate.positions()[20], [60.0, 61.0, 62.0]);
        assert_eq!(estimate.presence(), 0.9);
        assert_eq!(estimate.handedness(), Handedness::Right);

        let estimate = extract(&outputs(0.9, 0.2)).unwrap();
        assert_eq!(estimate.handedness(), Handedness::Left);
    }

    #[test]
    fn rejects_malformed_outputs() {
        let outputs = Outputs::from_iter([
            Tensor::from_iter(&[1, 42], [0.0; 42]),
            Tensor::from_iter(&[1, 1], [1.0]),
            Tensor::from_iter(&[1, 1], [1.0]),
        ]);
        assert!(extract(&outputs).is_err());

        let outputs = Outputs::from_iter([Tensor::from_iter(&[1, 63], [0.0; 63])]);
        assert!(extract(&outputs).is_err());
    }

    #[test]
    fn maps_into_parent_image() {
        let mut estimate = extract(&outputs(1.0, 0.0)).unwrap();
        estimate.positions[0] = [0.0, 0.0, 4.0];
        estimate.positions[1] = [224.0, 224.0, 0.0];

        // A 448x448 region at (100, 50), seen by a 224x224 network.
        let rect = Rect::from_top_left(100.0, 50.0, 448.0, 448.0);
        let mut upright = estimate.clone();
        upright.map_out(RotatedRect::new(rect, 0.0), 224.0);
        assert_eq!(upright.positions()[0], [100.0, 50.0, 8.0]);
        assert_eq!(upright.positions()[1], [548.0, 498.0, 0.0]);

        // Upside down, the network's top left corner is the region's bottom right.
        let mut flipped = estimate;
        flipped.map_out(RotatedRect::new(rect, PI), 224.0);
        let [x, y, z] = flipped.positions()[0];
        assert_relative_eq!(x, 548.0, epsilon = 1e-3);
        assert_relative_eq!(y, 498.0, epsilon = 1e-3);
        assert_eq!(z, 8.0);
    }

    #[test]
    fn normalizes_to_hand() {
        let mut estimate = extract(&outputs(0.75, 0.9)).unwrap();
        estimate.positions[0] = [320.0, 240.0, 64.0];

        let hand = estimate.to_hand(640, 480);
        assert_eq!(hand.landmarks().len(), NUM_LANDMARKS);
        assert_eq!(hand.landmarks()[0], Landmark::new(0.5, 0.5, 0.1));
        assert_eq!(hand.presence(), 0.75);
        assert_eq!(hand.handedness(), Handedness::Right);
    }
}
