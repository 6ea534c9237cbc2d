//! Video frames tagged with their channel order.

use std::fmt;

use crate::image::{AsImageView, AsImageViewMut, Color, Image, ImageView, ImageViewMut, Resolution};

/// Order of the color channels of a [`Frame`].
///
/// Pixels are always stored as 4 bytes. The encoding describes what the first 3 of them mean; the
/// 4th is always alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorEncoding {
    /// Red, green, blue.
    #[default]
    Rgb,
    /// Blue, green, red. This is what most capture libraries hand out.
    Bgr,
}

/// A single image from a video source, in a known [`ColorEncoding`].
#[derive(Clone)]
pub struct Frame {
    image: Image,
    encoding: ColorEncoding,
}

impl Frame {
    /// Wraps an [`Image`] whose channels are in `encoding` order.
    pub fn new(image: Image, encoding: ColorEncoding) -> Self {
        Self { image, encoding }
    }

    /// Creates a [`ColorEncoding::Bgr`] frame from tightly packed 3-byte BGR pixels.
    pub fn from_bgr8(res: Resolution, data: &[u8]) -> anyhow::Result<Self> {
        Self::from_packed3(res, data, ColorEncoding::Bgr)
    }

    /// Creates a [`ColorEncoding::Rgb`] frame from tightly packed 3-byte RGB pixels.
    pub fn from_rgb8(res: Resolution, data: &[u8]) -> anyhow::Result<Self> {
        Self::from_packed3(res, data, ColorEncoding::Rgb)
    }

    fn from_packed3(res: Resolution, data: &[u8], encoding: ColorEncoding) -> anyhow::Result<Self> {
        let expected = res.num_pixels() as usize * 3;
        if data.len() != expected {
            anyhow::bail!(
                "incorrect buffer size {} for {} frame (expected {} bytes)",
                data.len(),
                res,
                expected,
            );
        }

        let rgba = data
            .chunks_exact(3)
            .flat_map(|px| [px[0], px[1], px[2], 255])
            .collect::<Vec<_>>();
        Ok(Self::new(Image::from_rgba8(res, &rgba)?, encoding))
    }

    #[inline]
    pub fn encoding(&self) -> ColorEncoding {
        self.encoding
    }

    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }

    #[inline]
    pub fn image_mut(&mut self) -> &mut Image {
        &mut self.image
    }

    pub fn into_image(self) -> Image {
        self.image
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.image.resolution()
    }

    /// Returns a copy of this frame converted to `encoding`.
    ///
    /// Converting between [`ColorEncoding::Rgb`] and [`ColorEncoding::Bgr`] swaps the red and blue
    /// channels. Converting to the frame's own encoding is a plain copy.
    pub fn to_encoding(&self, encoding: ColorEncoding) -> Frame {
        self.clone().into_encoding(encoding)
    }

    /// Converts this frame to `encoding` in place.
    pub fn into_encoding(mut self, encoding: ColorEncoding) -> Frame {
        if self.encoding != encoding {
            self.image.map_pixels(Color::swap_red_blue);
            self.encoding = encoding;
        }
        self
    }

    /// Maps an RGB [`Color`] into the channel order of this frame, for drawing.
    pub fn native_color(&self, color: Color) -> Color {
        match self.encoding {
            ColorEncoding::Rgb => color,
            ColorEncoding::Bgr => color.swap_red_blue(),
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} {:?} Frame",
            self.width(),
            self.height(),
            self.encoding
        )
    }
}

impl AsImageView for Frame {
    fn as_view(&self) -> ImageView<'_> {
        self.image.as_view()
    }
}

impl AsImageViewMut for Frame {
    fn as_view_mut(&mut self) -> ImageViewMut<'_> {
        self.image.as_view_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_buffer() {
        let frame = Frame::from_bgr8(Resolution::new(2, 1), &[0, 0, 255, 255, 0, 0]).unwrap();
        assert_eq!(frame.encoding(), ColorEncoding::Bgr);

        let rgb = frame.to_encoding(ColorEncoding::Rgb);
        assert_eq!(rgb.image().get(0, 0), Color::RED);
        assert_eq!(rgb.image().get(1, 0), Color::BLUE);
    }

    #[test]
    fn wrong_buffer_size() {
        assert!(Frame::from_rgb8(Resolution::new(2, 2), &[0; 11]).is_err());
    }

    #[test]
    fn encoding_round_trip() {
        let mut rng = fastrand::Rng::with_seed(7);
        let data = (0..4 * 3 * 3).map(|_| rng.u8(..)).collect::<Vec<_>>();
        let frame = Frame::from_rgb8(Resolution::new(4, 3), &data).unwrap();

        let there = frame.to_encoding(ColorEncoding::Bgr);
        assert_ne!(there.image().data(), frame.image().data());
        let back = there.to_encoding(ColorEncoding::Rgb);
        assert_eq!(back.image().data(), frame.image().data());

        let same = frame.to_encoding(ColorEncoding::Rgb);
        assert_eq!(same.image().data(), frame.image().data());
    }

    #[test]
    fn native_color() {
        let bgr = Frame::new(Image::new(1, 1), ColorEncoding::Bgr);
        assert_eq!(bgr.native_color(Color::RED), Color::BLUE);
        let rgb = Frame::new(Image::new(1, 1), ColorEncoding::Rgb);
        assert_eq!(rgb.native_color(Color::RED), Color::RED);
    }
}
