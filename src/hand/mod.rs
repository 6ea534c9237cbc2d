//! Hand landmarks and detection results.
//!
//! A detected [`Hand`] consists of 21 [`Landmark`]s, indexed by [`LandmarkIdx`]. The submodules
//! contain the neural networks used by the ONNX detector backend.

pub mod landmark;
pub mod palm;

use crate::image::{RotatedRect, Vec2f};

/// The number of landmarks reported per hand.
pub const NUM_LANDMARKS: usize = 21;

/// Names for the hand pose landmarks.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

impl LandmarkIdx {
    /// All landmarks, in network output order.
    pub const ALL: [LandmarkIdx; NUM_LANDMARKS] = {
        use LandmarkIdx::*;
        [
            Wrist,
            ThumbCmc,
            ThumbMcp,
            ThumbIp,
            ThumbTip,
            IndexFingerMcp,
            IndexFingerPip,
            IndexFingerDip,
            IndexFingerTip,
            MiddleFingerMcp,
            MiddleFingerPip,
            MiddleFingerDip,
            MiddleFingerTip,
            RingFingerMcp,
            RingFingerPip,
            RingFingerDip,
            RingFingerTip,
            PinkyMcp,
            PinkyPip,
            PinkyDip,
            PinkyTip,
        ]
    };

    /// Returns the landmark at position `index` of a hand's landmark list.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Pairs of landmarks that are connected by a bone, forming the hand skeleton.
pub const CONNECTIONS: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        // Surround the palm:
        (Wrist, ThumbCmc),
        (ThumbCmc, IndexFingerMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (PinkyMcp, Wrist),
        // Thumb:
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index:
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle:
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring:
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky:
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

/// A normalized hand landmark.
///
/// `x` and `y` range from 0.0 to 1.0 across the frame's width and height when the landmark is
/// inside the frame; landmarks of partially visible hands may lie outside that range. `z` is the
/// depth relative to the wrist, smaller values being closer to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Returns whether the landmark's position lies within the frame.
    pub fn is_in_frame(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

/// Whether a hand is a left or right hand.
///
/// This assumes the camera image is passed in as-is (not mirrored).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Handedness {
    #[default]
    Left,
    Right,
}

/// A single detected hand.
#[derive(Debug, Clone, PartialEq)]
pub struct Hand {
    landmarks: Vec<Landmark>,
    handedness: Handedness,
    presence: f32,
}

impl Hand {
    /// Creates a hand from its landmarks, in [`LandmarkIdx`] order.
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self {
            landmarks,
            handedness: Handedness::default(),
            presence: 1.0,
        }
    }

    #[must_use]
    pub fn with_handedness(mut self, handedness: Handedness) -> Self {
        self.handedness = handedness;
        self
    }

    #[must_use]
    pub fn with_presence(mut self, presence: f32) -> Self {
        self.presence = presence;
        self
    }

    /// Returns the hand's landmarks. A landmark's index is its position in this slice.
    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn landmark(&self, idx: LandmarkIdx) -> Option<&Landmark> {
        self.landmarks.get(idx.index())
    }

    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    /// Returns the confidence that the landmarks describe an actual hand, from 0.0 to 1.0.
    pub fn presence(&self) -> f32 {
        self.presence
    }

    /// Returns the landmark positions in pixel coordinates of a `width`×`height` image.
    fn pixel_positions(&self, width: f32, height: f32) -> impl Iterator<Item = Vec2f> + '_ {
        self.landmarks
            .iter()
            .map(move |lm| Vec2f::new(lm.x * width, lm.y * height))
    }

    /// Computes a rotated rectangle around the hand, in pixel coordinates of a `width`×`height`
    /// image.
    ///
    /// The rectangle is aligned with the wrist → middle finger axis, so that its "up" direction
    /// points towards the fingers. Returns [`None`] if the hand lacks the needed landmarks.
    pub fn rotated_bounds(&self, width: f32, height: f32) -> Option<RotatedRect> {
        let wrist = self.landmark(LandmarkIdx::Wrist)?;
        let middle = self.landmark(LandmarkIdx::MiddleFingerMcp)?;
        let wrist = Vec2f::new(wrist.x * width, wrist.y * height);
        let middle = Vec2f::new(middle.x * width, middle.y * height);
        let radians = rotation_radians(wrist, middle);

        RotatedRect::bounding(radians, self.pixel_positions(width, height))
    }
}

/// Computes the clockwise rotation that makes the `wrist` → `finger` axis point up.
///
/// A rotation of 0° means that the finger is straight above the wrist (in image coordinates, with
/// the Y axis pointing down).
pub(crate) fn rotation_radians(wrist: Vec2f, finger: Vec2f) -> f32 {
    let rel = wrist - finger;
    nalgebra::Rotation2::rotation_between(&Vec2f::y(), &rel).angle()
}

/// All hands found in one frame.
///
/// The default value contains no hands and stands for "nothing detected yet".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectionResult {
    hands: Vec<Hand>,
}

impl DetectionResult {
    pub fn new(hands: Vec<Hand>) -> Self {
        Self { hands }
    }

    pub fn hands(&self) -> &[Hand] {
        &self.hands
    }

    pub fn hand(&self, index: usize) -> Option<&Hand> {
        self.hands.get(index)
    }

    pub fn len(&self) -> usize {
        self.hands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hands.is_empty()
    }

    /// Drops all hands past the first `max_hands`.
    pub fn truncate(&mut self, max_hands: usize) {
        self.hands.truncate(max_hands);
    }
}

impl FromIterator<Hand> for DetectionResult {
    fn from_iter<T: IntoIterator<Item = Hand>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
