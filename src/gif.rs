//! Animated GIF decomposition and reassembly.
//!
//! [`decode_frames`] composites every GIF frame onto the logical screen
//! (honouring frame offsets and disposal methods) and writes each full
//! canvas to a numbered PNG, returning the paths with their delays.
//! [`encode_frames`] reads a sequence of frame images back and writes an
//! animated GIF with one delay per frame.

use std::fs::File;
use std::path::{Path, PathBuf};

use gif::{ColorOutput, DecodeOptions, DisposalMethod, Encoder, Frame, Repeat};
use image::{RgbaImage, imageops::FilterType};

use crate::error::BatchScaleError;

/// Settings for [`encode_frames`].
#[derive(Debug, Clone)]
pub struct GifOptions {
    /// Keep fully transparent pixels transparent. When `false` every pixel
    /// is written opaque.
    pub transparent: bool,
    /// How many times the GIF repeats. `None` loops forever.
    pub repeat: Option<u16>,
    /// NeuQuant sampling speed, 1 (best) to 30 (fastest).
    pub quantizer_speed: i32,
}

impl Default for GifOptions {
    fn default() -> Self {
        Self {
            transparent: false,
            repeat: None,
            quantizer_speed: 10,
        }
    }
}

impl GifOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preserve transparency.
    pub fn with_transparency(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    /// Set the repeat count. `None` loops forever.
    pub fn with_repeat(mut self, repeat: Option<u16>) -> Self {
        self.repeat = repeat;
        self
    }
}

/// Decode `source` into full-canvas PNG frames inside `directory`.
///
/// Returns `(frame_path, delay)` pairs in presentation order; delays are in
/// hundredths of a second.
pub fn decode_frames(
    source: &Path,
    directory: &Path,
) -> Result<Vec<(PathBuf, u16)>, BatchScaleError> {
    log::debug!("Decoding GIF {} into {}", source.display(), directory.display());

    let file = File::open(source).map_err(|error| BatchScaleError::FileOpen {
        path: source.to_path_buf(),
        reason: error.to_string(),
    })?;

    let mut options = DecodeOptions::new();
    options.set_color_output(ColorOutput::RGBA);
    let mut decoder = options
        .read_info(file)
        .map_err(|error| BatchScaleError::GifDecodeError(error.to_string()))?;

    let width = u32::from(decoder.width());
    let height = u32::from(decoder.height());
    let mut canvas = RgbaImage::new(width, height);
    let mut frames = Vec::new();

    while let Some(frame) = decoder
        .read_next_frame()
        .map_err(|error| BatchScaleError::GifDecodeError(error.to_string()))?
    {
        let previous = (frame.dispose == DisposalMethod::Previous).then(|| canvas.clone());

        let left = u32::from(frame.left);
        let top = u32::from(frame.top);
        let frame_width = u32::from(frame.width);
        for (offset, pixel) in frame.buffer.chunks_exact(4).enumerate() {
            if pixel[3] == 0 {
                continue;
            }
            let x = left + offset as u32 % frame_width;
            let y = top + offset as u32 / frame_width;
            if x < width && y < height {
                canvas.put_pixel(x, y, image::Rgba([pixel[0], pixel[1], pixel[2], pixel[3]]));
            }
        }

        let path = directory.join(format!("frame{:08}.png", frames.len()));
        canvas.save(&path)?;
        frames.push((path, frame.delay));

        match frame.dispose {
            DisposalMethod::Background => {
                let frame_height = u32::from(frame.height);
                for y in top..(top + frame_height).min(height) {
                    for x in left..(left + frame_width).min(width) {
                        canvas.put_pixel(x, y, image::Rgba([0, 0, 0, 0]));
                    }
                }
            }
            DisposalMethod::Previous => {
                if let Some(previous) = previous {
                    canvas = previous;
                }
            }
            _ => {}
        }
    }

    log::debug!("Decoded {} GIF frames ({}x{})", frames.len(), width, height);
    Ok(frames)
}

/// Encode `frames` (any format the `image` crate reads) into an animated GIF.
///
/// `delays` must be index-aligned with `frames`. Frames whose size differs
/// from the first are resized to match it.
pub fn encode_frames(
    frames: &[PathBuf],
    delays: &[u16],
    destination: &Path,
    options: &GifOptions,
) -> Result<(), BatchScaleError> {
    log::debug!(
        "Encoding {} frames to GIF {} (transparent={})",
        frames.len(),
        destination.display(),
        options.transparent
    );
    if frames.len() != delays.len() {
        return Err(BatchScaleError::GifEncodeError(format!(
            "{} frames but {} delays",
            frames.len(),
            delays.len()
        )));
    }
    let Some(first) = frames.first() else {
        return Err(BatchScaleError::GifEncodeError("no frames to encode".to_string()));
    };

    let first = image::open(first)?.to_rgba8();
    let (width, height) = first.dimensions();
    let (gif_width, gif_height) = match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => {
            return Err(BatchScaleError::GifEncodeError(format!(
                "{width}x{height} exceeds the GIF size limit"
            )));
        }
    };

    let file = File::create(destination)
        .map_err(|e| BatchScaleError::GifEncodeError(format!("Failed to create GIF file: {e}")))?;
    let mut encoder = Encoder::new(file, gif_width, gif_height, &[])
        .map_err(|e| BatchScaleError::GifEncodeError(format!("Failed to create GIF encoder: {e}")))?;

    let repeat = match options.repeat {
        None => Repeat::Infinite,
        Some(n) => Repeat::Finite(n),
    };
    encoder
        .set_repeat(repeat)
        .map_err(|e| BatchScaleError::GifEncodeError(format!("Failed to set GIF repeat: {e}")))?;

    for (position, (path, &delay)) in frames.iter().zip(delays).enumerate() {
        let mut rgba = if position == 0 {
            first.clone()
        } else {
            image::open(path)?.to_rgba8()
        };
        if rgba.dimensions() != (width, height) {
            rgba = image::imageops::resize(&rgba, width, height, FilterType::Triangle);
        }
        if !options.transparent {
            for pixel in rgba.pixels_mut() {
                pixel[3] = 255;
            }
        }

        let mut pixels = rgba.into_raw();
        let mut gif_frame =
            Frame::from_rgba_speed(gif_width, gif_height, &mut pixels, options.quantizer_speed);
        gif_frame.delay = delay;
        if options.transparent {
            gif_frame.dispose = DisposalMethod::Background;
        }

        encoder.write_frame(&gif_frame).map_err(|e| {
            BatchScaleError::GifEncodeError(format!("Failed to write GIF frame: {e}"))
        })?;
    }

    Ok(())
}
