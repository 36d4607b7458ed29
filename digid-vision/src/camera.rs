use anyhow::{Context, Result};
use image::{ImageBuffer, RgbImage};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

/// What the caller asks of the video input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub audio: bool,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 640,
            ideal_height: 480,
            audio: false,
        }
    }
}

/// An open, exclusively owned video stream.
pub trait MediaStream {
    /// Grab the current frame.
    fn frame(&mut self) -> Result<RgbImage>;

    /// Stop every track and release the device. Calling it twice is a no-op.
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}

/// Something that can hand out a [`MediaStream`].
pub trait Camera {
    type Stream: MediaStream;

    /// Ask for exclusive access to a video input.
    fn request(&mut self, constraints: &StreamConstraints) -> Result<Self::Stream>;
}

/// V4L2 video device such as `/dev/video0`.
#[derive(Debug, Clone)]
pub struct V4lCamera {
    device: String,
}

impl V4lCamera {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl Camera for V4lCamera {
    type Stream = V4lStream;

    fn request(&mut self, constraints: &StreamConstraints) -> Result<V4lStream> {
        if constraints.audio {
            anyhow::bail!("audio capture is not supported on {}", self.device);
        }
        V4lStream::open(&self.device, constraints)
    }
}

pub struct V4lStream {
    stream: Option<Stream<'static>>,
    width: u32,
    height: u32,
    fourcc: FourCC,
}

impl V4lStream {
    pub fn open(device: &str, constraints: &StreamConstraints) -> Result<Self> {
        let dev = Device::with_path(device)
            .with_context(|| format!("open camera {}", device))?;
        let mut fmt = dev.format().context("get format")?;
        // Prefer RGB at the ideal size, fall back to YUYV, else keep what the device reports
        let desired = Format::new(
            constraints.ideal_width,
            constraints.ideal_height,
            FourCC::new(b"RGB3"),
        );
        fmt = dev.set_format(&desired).unwrap_or(fmt);
        if fmt.fourcc != FourCC::new(b"RGB3") {
            let yuyv = Format::new(fmt.width, fmt.height, FourCC::new(b"YUYV"));
            fmt = dev.set_format(&yuyv).unwrap_or(fmt);
        }
        let stream = Stream::with_buffers(&dev, Type::VideoCapture, 4).context("stream")?;
        log::info!(
            "camera {} streaming {}x{} {:?}",
            device,
            fmt.width,
            fmt.height,
            fmt.fourcc
        );
        Ok(Self {
            stream: Some(stream),
            width: fmt.width,
            height: fmt.height,
            fourcc: fmt.fourcc,
        })
    }
}

impl MediaStream for V4lStream {
    fn frame(&mut self) -> Result<RgbImage> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("camera stream already stopped"))?;
        let (data, meta) = stream.next().context("capture frame")?;
        log::debug!(
            "captured frame: width={} height={} fourcc={:?} seq={:?} len={}",
            self.width,
            self.height,
            self.fourcc,
            meta.sequence,
            data.len()
        );
        let buf = match self.fourcc {
            f if f == FourCC::new(b"RGB3") => data.to_vec(),
            f if f == FourCC::new(b"YUYV") => yuyv_to_rgb(self.width, self.height, data)?,
            f if f == FourCC::new(b"GREY") => grey_to_rgb(self.width, self.height, data)?,
            other => anyhow::bail!("unsupported pixel format {:?}", other),
        };
        let expected = (self.width * self.height * 3) as usize;
        if buf.len() < expected {
            anyhow::bail!("buffer too small: got {}, expected {}", buf.len(), expected);
        }
        let mut buf = buf;
        buf.truncate(expected);
        ImageBuffer::from_raw(self.width, self.height, buf)
            .ok_or_else(|| anyhow::anyhow!("failed to build image buffer"))
    }

    fn stop(&mut self) {
        // dropping the mmap stream turns streaming off and unmaps the buffers
        if self.stream.take().is_some() {
            log::debug!("camera stream stopped");
        }
    }

    fn is_live(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for V4lStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn yuyv_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        anyhow::bail!("short YUYV buffer");
    }
    let mut out = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;
        for &y in &[y0, y1] {
            out.push(clamp(y + 1.402 * v));
            out.push(clamp(y - 0.344136 * u - 0.714136 * v));
            out.push(clamp(y + 1.772 * u));
        }
    }
    Ok(out)
}

fn clamp(v: f32) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

fn grey_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height) as usize;
    if data.len() < expected {
        anyhow::bail!("short GREY buffer");
    }
    Ok(data[..expected].iter().flat_map(|&y| [y, y, y]).collect())
}
