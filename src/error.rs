//! Error types returned by the public API.
//!
//! Plumbing that can fail for many unrelated reasons (model loading, inference, windowing) uses
//! [`anyhow::Error`]. The errors here are the ones callers are expected to match on.

use std::io;

use thiserror::Error;

/// Failure to produce a frame from a [`FrameSource`][crate::video::FrameSource].
#[derive(Error, Debug)]
pub enum CaptureError {
    /// A frame was received but could not be decoded.
    ///
    /// Webcams occasionally deliver corrupted MJPEG frames. This only affects a single frame, so
    /// the caller can skip it and read the next one.
    #[error("failed to decode frame: {0}")]
    Decode(#[source] anyhow::Error),
    /// The device went away or the stream ended. No further frames will be produced.
    #[error("video source disconnected")]
    Disconnected,
    /// Any other I/O error reported by the device.
    #[error("video device error: {0}")]
    Io(#[from] io::Error),
}

impl CaptureError {
    /// Returns whether reading another frame after this error can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CaptureError::Decode(_))
    }
}

/// Landmark extraction was asked for a hand that was not detected.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexError {
    #[error("hand index {index} is out of range ({hands} hands detected)")]
    HandOutOfRange { index: usize, hands: usize },
}

/// Invalid [`AnnotatorOptions`][crate::annotator::AnnotatorOptions].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("`max_hands` must be at least 1")]
    NoHands,
    #[error("{name} must be in range 0.0 to 1.0, got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverability() {
        assert!(CaptureError::Decode(anyhow::anyhow!("bad huffman code")).is_recoverable());
        assert!(!CaptureError::Disconnected.is_recoverable());
        assert!(!CaptureError::Io(io::Error::from(io::ErrorKind::Other)).is_recoverable());
    }

    #[test]
    fn messages() {
        let err = IndexError::HandOutOfRange { index: 2, hands: 1 };
        assert_eq!(
            err.to_string(),
            "hand index 2 is out of range (1 hands detected)"
        );

        let err = ConfigError::ThresholdOutOfRange {
            name: "detection_confidence",
            value: 1.5,
        };
        assert_eq!(
            err.to_string(),
            "detection_confidence must be in range 0.0 to 1.0, got 1.5"
        );
    }
}
