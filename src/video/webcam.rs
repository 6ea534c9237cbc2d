//! V4L2 webcam access.
//!
//! Currently, only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are
//! supported.

use std::{
    cmp::Reverse,
    env, io,
    path::{Path, PathBuf},
};

use anyhow::bail;
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, PixelFormat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};
use once_cell::sync::Lazy;

use crate::{
    error::CaptureError,
    image::{Image, Resolution},
    timer::Timer,
    ColorEncoding, Frame,
};

use super::FrameSource;

const ENV_VAR_WEBCAM_NAME: &str = "HANDMARK_WEBCAM_NAME";

static WEBCAM_NAME: Lazy<Option<String>> = Lazy::new(|| {
    let name = env::var(ENV_VAR_WEBCAM_NAME).ok()?;
    log::debug!(
        "webcam override: `{}` is set to '{}'",
        ENV_VAR_WEBCAM_NAME,
        name,
    );
    Some(name)
});

/// Indicates whether to prefer a higher resolution or frame rate.
///
/// By default, [`ParamPreference::Resolution`] is used, selecting the maximum resolution at the
/// desired frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ParamPreference {
    /// Prefer increased resolution over higher frame rates.
    #[default]
    Resolution,
    /// Prefer higher frame rate over higher image resolution.
    Framerate,
}

#[derive(Debug, Default, Clone, Copy)]
struct FramePrefs {
    resolution: Option<Resolution>,
    fps: Option<u32>,
    pref: ParamPreference,
}

/// Device selection and format negotiation options.
///
/// Without an explicit [`name`][Self::name] or [`index`][Self::index], the device named by the
/// `HANDMARK_WEBCAM_NAME` environment variable is used, or the first capture device otherwise.
#[derive(Debug, Default, Clone)]
pub struct WebcamOptions {
    name: Option<String>,
    index: Option<usize>,
    frame: FramePrefs,
}

impl WebcamOptions {
    /// Selects the `index`-th video capture device (0 is the default camera).
    ///
    /// Devices that cannot capture video are not counted.
    #[inline]
    pub fn index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Sets the name of the webcam device to open.
    ///
    /// If no webcam with the given name can be found, opening the webcam will result in an error.
    #[inline]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the desired image resolution.
    ///
    /// A lower resolution might be selected if the webcam cannot deliver the desired resolution.
    #[inline]
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.frame.resolution = Some(resolution);
        self
    }

    /// Sets the desired frame rate.
    ///
    /// A lower frame rate might be selected if the webcam cannot deliver the desired frame rate.
    #[inline]
    pub fn fps(mut self, fps: u32) -> Self {
        self.frame.fps = Some(fps);
        self
    }

    /// Selects whether to prefer a higher resolution or frame rate.
    ///
    /// When the camera cannot deliver the desired frame rate or resolution, this parameter controls
    /// which one will be maintained.
    #[inline]
    pub fn prefer(mut self, pref: ParamPreference) -> Self {
        self.frame.pref = pref;
        self
    }

    fn device_name(&self) -> Option<&str> {
        match (&self.name, self.index) {
            (Some(name), _) => Some(name),
            (None, Some(_)) => None,
            (None, None) => WEBCAM_NAME.as_deref(),
        }
    }
}

#[derive(Clone, Copy)]
struct FrameFormat {
    resolution: Resolution,
    frame_interval: Fract,
}

fn negotiate_format(device: &Device, mut prefs: FramePrefs) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if format.pixel_format() == PixelFormat::JPEG || format.pixel_format() == PixelFormat::MJPG {
            pixel_format = Some(format.pixel_format());
            break;
        }
    }

    let Some(pixel_format) = pixel_format else {
        bail!("device offers no JPEG or Motion JPEG format");
    };

    let mut formats = Vec::new();
    match device.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => {
            for size in sizes {
                let intervals =
                    match device.frame_intervals(pixel_format, size.width(), size.height())? {
                        FrameIntervals::Discrete(intervals) => intervals,
                        FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                            bail!("stepwise or continuous frame rates are not supported")
                        }
                    };
                for rate in intervals {
                    formats.push(FrameFormat {
                        resolution: Resolution::new(size.width(), size.height()),
                        frame_interval: *rate.fract(),
                    });
                }
            }
        }
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported");
        }
    }

    let fmt = negotiate_with_fallback(&formats, &mut prefs)?;
    Ok((
        PixFormat::new(
            fmt.resolution.width(),
            fmt.resolution.height(),
            pixel_format,
        ),
        fmt.frame_interval,
    ))
}

/// Picks a format from `formats`, relaxing `prefs` until one matches.
///
/// The parameter that is *not* preferred is dropped first.
fn negotiate_with_fallback(
    formats: &[FrameFormat],
    prefs: &mut FramePrefs,
) -> anyhow::Result<FrameFormat> {
    loop {
        if let Some(fmt) = negotiate_format_step(formats, *prefs) {
            return Ok(fmt);
        }

        log::debug!("failed to negotiate format with prefs {:?}", prefs);
        let relaxed = match prefs.pref {
            ParamPreference::Resolution => {
                prefs.fps.take().is_some() || prefs.resolution.take().is_some()
            }
            ParamPreference::Framerate => {
                prefs.resolution.take().is_some() || prefs.fps.take().is_some()
            }
        };
        if !relaxed {
            bail!("failed to negotiate a webcam format");
        }
        log::debug!("retrying with new prefs {:?}", prefs);
    }
}

fn negotiate_format_step(formats: &[FrameFormat], prefs: FramePrefs) -> Option<FrameFormat> {
    let mut formats = formats
        .iter()
        .filter(|fmt| {
            prefs.resolution.map_or(true, |res| {
                fmt.resolution.width() >= res.width() && fmt.resolution.height() >= res.height()
            }) && prefs.fps.map_or(true, |fps| {
                (1.0 / fmt.frame_interval.as_f32()).round() >= fps as f32
            })
        })
        .copied()
        .collect::<Vec<_>>();
    match prefs.pref {
        ParamPreference::Resolution => {
            formats.sort_by_key(|fmt| (fmt.resolution.num_pixels(), Reverse(fmt.frame_interval)))
        }
        ParamPreference::Framerate => {
            formats.sort_by_key(|fmt| (Reverse(fmt.frame_interval), fmt.resolution.num_pixels()))
        }
    }
    formats.last().copied()
}

/// A webcam yielding a stream of [`Frame`]s.
///
/// The device is released when the [`Webcam`] is dropped.
pub struct Webcam {
    stream: ReadStream,
    path: PathBuf,
    resolution: Resolution,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens a webcam according to `options`.
    ///
    /// This function can block for a significant amount of time while the webcam initializes (on
    /// the order of hundreds of milliseconds).
    pub fn open(options: WebcamOptions) -> anyhow::Result<Self> {
        let name = options.device_name();
        let index = options.index.unwrap_or(0);

        let mut candidates = 0;
        for res in linuxvideo::list()? {
            let dev = match res {
                Ok(dev) => dev,
                Err(e) => {
                    log::warn!("{}", e);
                    continue;
                }
            };
            match is_candidate(&dev, name) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    log::debug!("{}", e);
                    continue;
                }
            }

            if candidates < index {
                candidates += 1;
                continue;
            }
            return Self::open_device(dev, &options);
        }

        match name {
            Some(name) => bail!("no video capture device named '{name}' found"),
            None => bail!(
                "no video capture device with index {index} found ({candidates} devices available)"
            ),
        }
    }

    fn open_device(dev: Device, options: &WebcamOptions) -> anyhow::Result<Self> {
        let card = dev.capabilities()?.card().to_string();
        let path = dev.path()?;

        let (pixfmt, fract) = negotiate_format(&dev, options.frame)?;
        let capture = dev.video_capture(pixfmt)?;

        let format = capture.format();
        let resolution = Resolution::new(format.width(), format.height());
        match format.pixel_format() {
            PixelFormat::JPEG | PixelFormat::MJPG => {}
            e => bail!("unsupported pixel format {}", e),
        }

        let actual = capture.set_frame_interval(fract)?;

        log::info!(
            "opened {} ({}), {} @ {:.1}Hz",
            card,
            path.display(),
            resolution,
            1.0 / actual.as_f32(),
        );

        let stream = capture.into_stream()?;

        Ok(Self {
            stream,
            path,
            resolution,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        })
    }

    /// Returns the negotiated frame resolution.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Reads the next frame from the camera.
    ///
    /// If no frame is available, this method will block until one is. Webcams occasionally
    /// produce corrupted MJPEG frames; those are reported as [`CaptureError::Decode`] and reading
    /// can continue.
    pub fn read(&mut self) -> Result<Frame, CaptureError> {
        let dequeue_guard = self.t_dequeue.start();
        let t_decode = &self.t_decode;
        let decoded = self.stream.dequeue(|buf| {
            drop(dequeue_guard);
            Ok(t_decode.time(|| Image::decode_jpeg(&buf)))
        });

        match decoded {
            Ok(Ok(image)) => Ok(Frame::new(image, ColorEncoding::Rgb)),
            Ok(Err(e)) => Err(CaptureError::Decode(e)),
            Err(e) => Err(classify_io_error(e, &self.path)),
        }
    }

    /// Returns profiling timers for webcam access and decoding.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_dequeue, &self.t_decode].into_iter()
    }
}

impl FrameSource for Webcam {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        Webcam::read(self)
    }
}

fn is_candidate(dev: &Device, name: Option<&str>) -> anyhow::Result<bool> {
    let caps = dev.capabilities()?;
    if let Some(name) = name {
        if caps.card() != name {
            return Ok(false);
        }
    }

    let cap_flags = caps.device_capabilities();
    log::debug!(
        "device {} ({}) capabilities: {:?}",
        caps.card(),
        dev.path()?.display(),
        cap_flags,
    );
    Ok(cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE))
}

/// Maps a failed read from the device at `path` to a [`CaptureError`].
///
/// The device node is removed when the camera is unplugged.
fn classify_io_error(e: io::Error, path: &Path) -> CaptureError {
    if e.kind() == io::ErrorKind::UnexpectedEof || !path.exists() {
        CaptureError::Disconnected
    } else {
        CaptureError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(width: u32, height: u32, fps: u32) -> FrameFormat {
        FrameFormat {
            resolution: Resolution::new(width, height),
            frame_interval: Fract::new(1, fps),
        }
    }

    fn formats() -> Vec<FrameFormat> {
        vec![
            fmt(640, 480, 30),
            fmt(640, 480, 60),
            fmt(1280, 720, 30),
            fmt(1920, 1080, 5),
        ]
    }

    /// Width, height and rounded frame rate of a negotiated format.
    fn summary(fmt: FrameFormat) -> (u32, u32, u32) {
        let fps = (1.0 / fmt.frame_interval.as_f32()).round() as u32;
        (fmt.resolution.width(), fmt.resolution.height(), fps)
    }

    #[test]
    fn prefers_resolution_by_default() {
        let prefs = FramePrefs::default();
        let chosen = negotiate_format_step(&formats(), prefs).map(summary);
        assert_eq!(chosen, Some((1920, 1080, 5)));

        let prefs = FramePrefs {
            fps: Some(30),
            ..prefs
        };
        let chosen = negotiate_format_step(&formats(), prefs).map(summary);
        assert_eq!(chosen, Some((1280, 720, 30)));
    }

    #[test]
    fn prefers_framerate() {
        let prefs = FramePrefs {
            pref: ParamPreference::Framerate,
            ..FramePrefs::default()
        };
        let chosen = negotiate_format_step(&formats(), prefs).map(summary);
        assert_eq!(chosen, Some((640, 480, 60)));
    }

    #[test]
    fn relaxes_unsatisfiable_prefs() {
        // No format does 1080p at 30 FPS. Keep the resolution, drop the frame rate.
        let mut prefs = FramePrefs {
            resolution: Some(Resolution::RES_1080P),
            fps: Some(30),
            pref: ParamPreference::Resolution,
        };
        let chosen = negotiate_with_fallback(&formats(), &mut prefs).unwrap();
        assert_eq!(summary(chosen), (1920, 1080, 5));
        assert_eq!(prefs.fps, None);

        let mut prefs = FramePrefs {
            resolution: Some(Resolution::RES_1080P),
            fps: Some(30),
            pref: ParamPreference::Framerate,
        };
        let chosen = negotiate_with_fallback(&formats(), &mut prefs).unwrap();
        assert_eq!(summary(chosen), (640, 480, 60));
        assert_eq!(prefs.resolution, None);

        let mut prefs = FramePrefs::default();
        assert!(negotiate_with_fallback(&[], &mut prefs).is_err());
    }

    #[test]
    fn explicit_selection_overrides_environment() {
        let options = WebcamOptions::default().index(1);
        assert_eq!(options.device_name(), None);

        let options = WebcamOptions::default().index(1).name("USB Camera");
        assert_eq!(options.device_name(), Some("USB Camera"));
    }

    #[test]
    fn unplugged_device_disconnects() {
        let gone = Path::new("/dev/handmark-unplugged-video0");
        let err = classify_io_error(io::Error::from(io::ErrorKind::Other), gone);
        assert!(matches!(err, CaptureError::Disconnected));

        let present = env::temp_dir();
        let err = classify_io_error(io::Error::from(io::ErrorKind::UnexpectedEof), &present);
        assert!(matches!(err, CaptureError::Disconnected));

        let err = classify_io_error(io::Error::from(io::ErrorKind::PermissionDenied), &present);
        assert!(matches!(err, CaptureError::Io(_)));
    }
}
