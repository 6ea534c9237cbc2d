//! A detector that always reports the same hands.

use crate::{frame::ColorEncoding, hand::DetectionResult, Frame};

use super::{DetectorConfig, HandDetector};

/// A deterministic [`HandDetector`] returning a fixed [`DetectionResult`].
///
/// The result is truncated to [`DetectorConfig::max_hands`] on every call. The frame contents are
/// ignored.
#[derive(Debug, Clone)]
pub struct FixedDetector {
    result: DetectionResult,
    encoding: ColorEncoding,
    calls: usize,
}

impl FixedDetector {
    pub fn new(result: DetectionResult) -> Self {
        Self {
            result,
            encoding: ColorEncoding::Rgb,
            calls: 0,
        }
    }

    /// Creates a detector that never finds any hands.
    pub fn empty() -> Self {
        Self::new(DetectionResult::default())
    }

    /// Sets the encoding reported by [`HandDetector::input_encoding`].
    #[must_use]
    pub fn with_encoding(mut self, encoding: ColorEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Returns how many times [`HandDetector::detect`] was called.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl HandDetector for FixedDetector {
    fn input_encoding(&self) -> ColorEncoding {
        self.encoding
    }

    fn detect(
        &mut self,
        _frame: &Frame,
        config: &DetectorConfig,
    ) -> anyhow::Result<DetectionResult> {
        self.calls += 1;

        let mut result = self.result.clone();
        result.truncate(config.max_hands);
        Ok(result)
    }
}
