//! Packing rendered images into the panel's 1-bit frame layout
//!
//! A frame is `width / 8 * height` bytes, row-major, eight horizontal pixels per
//! byte with the leftmost pixel in the most significant bit. A set bit is a light
//! pixel, a cleared bit is ink.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ops::Deref;

use image::{DynamicImage, GrayImage, Luma, Rgba};

use crate::epd::error::Error;
use crate::epd::flag::Flag;
use crate::epd::{HEIGHT, WIDTH};

/// Luminance cut-point of the threshold ditherer
pub const DITHER_THRESHOLD: u8 = 127;

/// Native pixel layout of a panel frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    width: u32,
    height: u32,
}

impl Geometry {
    /// Width must be a non-zero multiple of 8 since pixels are packed along it.
    pub fn new(width: u32, height: u32) -> Result<Self, Error> {
        if width == 0 || height == 0 || width % 8 != 0 {
            return Err(Error::dimensions(format!(
                "device geometry {}x{} is not packable",
                width, height
            )));
        }
        Ok(Geometry { width, height })
    }

    /// The 2.13" panel, 104x212
    pub const fn panel() -> Self {
        Geometry {
            width: WIDTH,
            height: HEIGHT,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Native bounds, narrow and tall.
    pub fn bounds(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Bounds of the panel rotated by 90°, wide and short.
    pub fn bounds_horizontal(&self) -> (u32, u32) {
        (self.height, self.width)
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        (self.width / 8) as usize
    }

    /// Byte length of one packed frame
    pub fn buffer_len(&self) -> usize {
        self.stride() * self.height as usize
    }
}

/// One packed plane, sized to a [`Geometry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer(Vec<u8>);

impl FrameBuffer {
    /// A frame with every byte set to `byte`.
    pub fn filled(geometry: Geometry, byte: u8) -> Self {
        FrameBuffer(vec![byte; geometry.buffer_len()])
    }

    /// All-light frame, the same content [`Epd2in13bc::clear`] sends.
    ///
    /// [`Epd2in13bc::clear`]: crate::epd::driver::Epd2in13bc::clear
    pub fn blank(geometry: Geometry) -> Self {
        Self::filled(geometry, Flag::BLANK)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for FrameBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for FrameBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Threshold every pixel independently, no error diffusion.
fn threshold(gray: &mut GrayImage) {
    for Luma([y]) in gray.pixels_mut() {
        *y = if *y > DITHER_THRESHOLD { u8::MAX } else { 0 };
    }
}

/// Pack `image` into a frame for `geometry`.
///
/// The image is converted to Rec.601 luminance first. With `dither` it is then
/// thresholded at [`DITHER_THRESHOLD`]. Any pixel with luminance above zero
/// becomes a light bit; only exact black stays ink.
///
/// Two layouts are accepted:
/// - native: image bounds equal the geometry, packed as is,
/// - horizontal: image bounds are the geometry swapped. Source `(x, y)` lands on
///   device column `y`, device row `height - x - 1`.
///
/// Anything else is a [`Error::Dimensions`].
pub fn encode(
    image: &DynamicImage,
    geometry: Geometry,
    dither: bool,
) -> Result<FrameBuffer, Error> {
    let (img_w, img_h) = (image.width(), image.height());

    let horizontal = if (img_w, img_h) == geometry.bounds() {
        false
    } else if (img_w, img_h) == geometry.bounds_horizontal() {
        true
    } else {
        return Err(Error::dimensions(format!(
            "image {}x{} does not fit device {}x{}",
            img_w,
            img_h,
            geometry.width(),
            geometry.height()
        )));
    };

    let mut gray = grayscale(image);
    if dither {
        threshold(&mut gray);
    }

    let stride = geometry.stride();
    let mut buffer = vec![0x00u8; geometry.buffer_len()];

    if horizontal {
        log::debug!("packing frame in horizontal mode");
    } else {
        log::debug!("packing frame in vertical mode");
    }

    for (x, y, Luma([luma])) in gray.enumerate_pixels() {
        if *luma == 0 {
            continue;
        }
        let (col, row) = if horizontal {
            (y, geometry.height() - x - 1)
        } else {
            (x, y)
        };
        let pos = row as usize * stride + (col / 8) as usize;
        buffer[pos] |= 0x80 >> (col % 8);
    }

    Ok(FrameBuffer(buffer))
}

/// Rec.601 luma with 16-bit integer weights, alpha premultiplied.
fn grayscale(image: &DynamicImage) -> GrayImage {
    let rgba = image.to_rgba8();
    GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let alpha = u32::from(a) * 0x101;
        let [r, g, b] = [r, g, b].map(|c| u32::from(c) * 0x101 * alpha / 0xffff);
        let y = (19595 * r + 38470 * g + 7471 * b + (1 << 15)) >> 24;
        Luma([y as u8])
    })
}

/// Caller-owned cache of all-light frames, one per geometry.
///
/// Purely an allocation saver: `encode` on a white image returns the same bytes.
#[derive(Debug, Default)]
pub struct BlankFrames {
    frames: HashMap<Geometry, FrameBuffer>,
}

impl BlankFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blank frame for `geometry`, computed on first use.
    pub fn get(&mut self, geometry: Geometry) -> Result<&FrameBuffer, Error> {
        match self.frames.entry(geometry) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let (w, h) = geometry.bounds();
                let white = DynamicImage::ImageLuma8(GrayImage::from_pixel(w, h, Luma([u8::MAX])));
                let frame = encode(&white, geometry, false)?;
                Ok(entry.insert(frame))
            }
        }
    }

    /// Drop the cached frame for `geometry`.
    pub fn invalidate(&mut self, geometry: Geometry) {
        self.frames.remove(&geometry);
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
