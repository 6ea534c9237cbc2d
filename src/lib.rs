//! Webcam hand landmark detection and annotation.
//!
//! The centerpiece is the [`HandAnnotator`][annotator::HandAnnotator], which hands a [`Frame`]
//! to a [`HandDetector`][detector::HandDetector], draws the detected hand skeletons, and converts
//! landmarks to pixel coordinates. Frames come from a [`FrameSource`][video::FrameSource] such as
//! a [`Webcam`][video::webcam::Webcam], and the [`pipeline`] module ties everything together into
//! a capture loop.
//!
//! # Coordinates
//!
//! Landmarks reported by detectors are *normalized*: X and Y range from 0.0 to 1.0 across the
//! frame's width and height, with Y pointing down. Z is a relative depth whose scale roughly
//! matches X.
//!
//! # Environment Variables
//!
//! * `HANDMARK_WEBCAM_NAME`: Forces the device to use for [`Webcam`]s created without an explicit
//!   device name or index.
//! * `HANDMARK_MODEL_DIR`: Directory containing the ONNX networks loaded by
//!   [`OnnxHandDetector`]. Defaults to `3rdparty/onnx`.
//! * `HANDMARK_JPEG_BACKEND`: Selects the JPEG decoder used for webcam frames. Allowed values are
//!   `jpeg-decoder` (the default, uses the [jpeg-decoder] crate directly) and `image` (goes
//!   through the [image] crate).
//!
//! # Models
//!
//! [`OnnxHandDetector`] runs the palm detection and hand landmark networks of Google's
//! [MediaPipe Hands] solution. They are not shipped with this crate. MediaPipe publishes them as
//! TensorFlow Lite files, which have to be converted to ONNX (for example with `tf2onnx`, or taken
//! from a model zoo that already provides ONNX exports). The model directory must contain:
//!
//! * `palm_detection_lite.onnx` and `hand_landmark_lite.onnx` for [`ModelComplexity::Lite`]
//! * `palm_detection_full.onnx` and `hand_landmark_full.onnx` for [`ModelComplexity::Full`]
//!
//! The converted networks must keep MediaPipe's tensor layout: a 192×192 RGB input and 2016
//! anchors for the palm detector, and a 224×224 RGB input with 63 landmark coordinates, a presence
//! score and a handedness score for the landmark network.
//!
//! [MediaPipe Hands]: https://github.com/google/mediapipe
//! [`ModelComplexity::Lite`]: detector::ModelComplexity::Lite
//! [`ModelComplexity::Full`]: detector::ModelComplexity::Full
//! [jpeg-decoder]: https://github.com/image-rs/jpeg-decoder/
//! [image]: https://github.com/image-rs/image
//! [`Webcam`]: video::webcam::Webcam
//! [`OnnxHandDetector`]: detector::onnx::OnnxHandDetector

use log::LevelFilter;

pub mod annotator;
pub mod detection;
pub mod detector;
pub mod error;
pub mod frame;
pub mod gui;
pub mod hand;
pub mod image;
pub mod iter;
pub mod nn;
pub mod num;
pub mod pipeline;
pub mod termination;
pub mod timer;
pub mod video;

pub use frame::{ColorEncoding, Frame};

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and `handmark` will log at *debug* level, `wgpu` at *warn* level. `RUST_LOG`
/// is applied on top of that.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
