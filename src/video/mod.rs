//! Frame sources.
//!
//! Everything that produces [`Frame`]s for the capture loop implements [`FrameSource`]. The
//! [`webcam::Webcam`] reads from a V4L2 device, [`StillImage`] repeats a single image and is
//! mostly useful for testing the rest of the pipeline without a camera.

pub mod webcam;

use std::path::Path;

use crate::{error::CaptureError, image::Image, ColorEncoding, Frame};

/// A source of video frames.
pub trait FrameSource {
    /// Reads the next frame, blocking until one is available.
    ///
    /// A [`CaptureError::Decode`] only affects the current frame. After any other error the
    /// source should be considered dead.
    fn read(&mut self) -> Result<Frame, CaptureError>;
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        (**self).read()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        (**self).read()
    }
}

/// A [`FrameSource`] that yields the same image forever.
#[derive(Debug, Clone)]
pub struct StillImage {
    image: Image,
}

impl StillImage {
    pub fn new(image: Image) -> Self {
        Self { image }
    }

    /// Loads the image at `path` (see [`Image::load`]).
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let image = Image::load(path)?;
        log::debug!("loaded {} ({})", path.display(), image.resolution());
        Ok(Self::new(image))
    }

    pub fn image(&self) -> &Image {
        &self.image
    }
}

impl FrameSource for StillImage {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        Ok(Frame::new(self.image.clone(), ColorEncoding::Rgb))
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use crate::image::Color;

    use super::*;

    #[test]
    fn still_image_repeats() {
        let mut image = Image::new(8, 4);
        image.set(1, 2, Color::GREEN);
        let mut source = StillImage::new(image);

        for _ in 0..3 {
            let frame = source.read().unwrap();
            assert_eq!(frame.encoding(), ColorEncoding::Rgb);
            assert_eq!(frame.width(), 8);
            assert_eq!(frame.height(), 4);
            assert_eq!(frame.image().get(1, 2), Color::GREEN);
        }
    }

    #[test]
    fn still_image_from_file() {
        let path = env::temp_dir().join(format!("handmark-still-{}.png", std::process::id()));
        let mut image = Image::new(5, 3);
        image.clear(Color::BLUE);
        image.save(&path).unwrap();

        let result = StillImage::load(&path);
        std::fs::remove_file(&path).ok();

        let mut source = result.unwrap();
        let frame = source.read().unwrap();
        assert_eq!(frame.resolution(), image.resolution());
        assert_eq!(frame.image().get(4, 2), Color::BLUE);

        assert!(StillImage::load("does-not-exist.png").is_err());
        assert!(StillImage::load("unsupported.gif").is_err());
    }

    #[test]
    fn boxed_source() {
        let mut source: Box<dyn FrameSource> = Box::new(StillImage::new(Image::new(2, 2)));
        assert!(source.read().is_ok());
    }
}
