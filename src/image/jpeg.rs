use std::{
    env::{self, VarError},
    process,
};

use anyhow::{anyhow, bail};
use image::ImageBuffer;
use jpeg_decoder::PixelFormat;
use once_cell::sync::Lazy;

use super::Image;

/// The JPEG decoders webcam frames can be decoded with.
#[derive(Debug, PartialEq, Eq)]
enum JpegBackend {
    /// Uses the `jpeg-decoder` crate directly and expands its output to RGBA in one pass.
    JpegDecoder,
    /// Goes through the `image` crate's format-agnostic decoding path. Slower, since the image is
    /// converted to RGBA in a second step.
    Image,
}

const DEFAULT_BACKEND: JpegBackend = JpegBackend::JpegDecoder;

static JPEG_BACKEND: Lazy<JpegBackend> = Lazy::new(|| {
    let backend = match env::var("HANDMARK_JPEG_BACKEND") {
        Ok(v) => match parse_backend(&v) {
            Some(backend) => backend,
            None => {
                eprintln!("invalid value set for `HANDMARK_JPEG_BACKEND` variable: '{v}'; exiting");
                process::exit(1);
            }
        },
        Err(VarError::NotPresent) => DEFAULT_BACKEND,
        Err(VarError::NotUnicode(s)) => {
            eprintln!(
                "invalid value set for `HANDMARK_JPEG_BACKEND` variable: {}; exiting",
                s.to_string_lossy()
            );
            process::exit(1);
        }
    };
    log::debug!("using JPEG decode backend: {:?}", backend);
    backend
});

fn parse_backend(s: &str) -> Option<JpegBackend> {
    match s {
        "jpeg-decoder" => Some(JpegBackend::JpegDecoder),
        "image" => Some(JpegBackend::Image),
        _ => None,
    }
}

pub(super) fn decode_jpeg(data: &[u8]) -> anyhow::Result<Image> {
    let buf = match *JPEG_BACKEND {
        JpegBackend::JpegDecoder => {
            let mut decoder = jpeg_decoder::Decoder::new(data);
            let pixels = decoder.decode()?;
            let info = decoder
                .info()
                .ok_or_else(|| anyhow!("JPEG decoder returned no image metadata"))?;

            let rgba = match info.pixel_format {
                PixelFormat::RGB24 => pixels
                    .chunks_exact(3)
                    .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], 255])
                    .collect::<Vec<_>>(),
                PixelFormat::L8 => pixels.iter().flat_map(|&l| [l, l, l, 255]).collect(),
                format => bail!("unsupported JPEG pixel format {format:?}"),
            };

            ImageBuffer::from_raw(info.width.into(), info.height.into(), rgba)
                .ok_or_else(|| anyhow!("decoded JPEG data does not match its dimensions"))?
        }
        JpegBackend::Image => {
            image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?.to_rgba8()
        }
    };

    Ok(Image { buf })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names() {
        assert_eq!(parse_backend("jpeg-decoder"), Some(JpegBackend::JpegDecoder));
        assert_eq!(parse_backend("image"), Some(JpegBackend::Image));
        assert_eq!(parse_backend("mozjpeg"), None);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_jpeg(&[0xff, 0xd8, 0x00, 0x01]).is_err());
        assert!(decode_jpeg(&[]).is_err());
    }
}
