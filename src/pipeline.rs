//! The capture loop.
//!
//! [`run`] reads frames from a [`FrameSource`], lets a [`HandAnnotator`] detect and draw hands,
//! extracts landmark pixel positions and hands the annotated frame to a [`FrameSink`]:
//!
//! ```text
//! source.read() -> annotator.detect() -> annotator.extract_points() -> sink.show() -> sleep
//! ```
//!
//! A frame that fails to decode is skipped. The loop ends when the source disconnects, the sink is
//! closed, or [`LoopOptions::max_frames`] frames have been shown.

use std::{thread, time::Duration};

use crate::{
    annotator::{Annotated, ExtractOptions, HandAnnotator},
    detector::HandDetector,
    error::CaptureError,
    timer::FpsCounter,
    video::FrameSource,
    Frame,
};

/// Receives annotated frames.
pub trait FrameSink {
    /// Displays or stores `frame`.
    fn show(&mut self, frame: &Frame) -> anyhow::Result<()>;

    /// Returns whether the sink still accepts frames.
    ///
    /// The capture loop stops once this returns `false`.
    fn is_open(&self) -> bool {
        true
    }
}

impl<K: FrameSink + ?Sized> FrameSink for &mut K {
    fn show(&mut self, frame: &Frame) -> anyhow::Result<()> {
        (**self).show(frame)
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

/// Options for [`run`].
#[derive(Debug, Clone)]
pub struct LoopOptions {
    delay: Duration,
    max_frames: Option<usize>,
    extract: ExtractOptions,
}

impl LoopOptions {
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(1);

    pub fn new() -> Self {
        Self {
            delay: Self::DEFAULT_DELAY,
            max_frames: None,
            extract: ExtractOptions::default(),
        }
    }

    /// Sets the time to sleep after each shown frame.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Stops the loop after `max_frames` frames have been shown.
    pub fn max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    /// Sets the options used to extract landmark positions from each frame.
    pub fn extract(mut self, extract: ExtractOptions) -> Self {
        self.extract = extract;
        self
    }
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame counts of a finished [`run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunStats {
    /// Number of frames passed to the sink.
    pub frames: usize,
    /// Number of frames dropped because they could not be decoded.
    pub skipped: usize,
}

/// Runs the capture loop until the source disconnects, the sink closes, or the frame limit is
/// reached.
///
/// Capture errors other than [`CaptureError::Decode`] and [`CaptureError::Disconnected`] are
/// returned, as are errors from the sink.
pub fn run<S, D, K>(
    mut source: S,
    annotator: &mut HandAnnotator<D>,
    mut sink: K,
    options: &LoopOptions,
) -> anyhow::Result<RunStats>
where
    S: FrameSource,
    D: HandDetector,
    K: FrameSink,
{
    let mut fps = FpsCounter::new("handmark");
    let mut stats = RunStats::default();

    loop {
        if options.max_frames.map_or(false, |max| stats.frames >= max) {
            log::debug!("frame limit reached");
            break;
        }
        if !sink.is_open() {
            log::info!("output closed, stopping");
            break;
        }

        let frame = match source.read() {
            Ok(frame) => frame,
            Err(e) if e.is_recoverable() => {
                log::warn!("skipping frame: {e}");
                stats.skipped += 1;
                continue;
            }
            Err(CaptureError::Disconnected) => {
                log::info!("video source disconnected, stopping");
                break;
            }
            Err(e) => return Err(e.into()),
        };

        let Annotated { mut frame, result } = annotator.detect(frame, true);
        match annotator.extract_points(&mut frame, &result, &options.extract) {
            Ok(points) => {
                if let Some(p) = points
                    .iter()
                    .find(|p| p.index == options.extract.target_landmark)
                {
                    log::trace!("landmark {} at ({}, {})", p.index, p.x, p.y);
                }
            }
            Err(e) => log::warn!("{e}"),
        }

        sink.show(&frame)?;
        stats.frames += 1;
        fps.tick_with(annotator.timers());

        if !options.delay.is_zero() {
            thread::sleep(options.delay);
        }
    }

    log::debug!(
        "capture loop finished: {} frames, {} skipped",
        stats.frames,
        stats.skipped
    );
    Ok(stats)
}
