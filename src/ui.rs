//! Two-plane layout of the weather screen
//!
//! The screen is split into two panes: the first module on the left, the station
//! itself on the right. Current temperatures and their ranges go on the red
//! plane, everything else on the black one.

use std::convert::Infallible;

use anyhow::bail;
use chrono::Local;
use embedded_graphics::mono_font::iso_8859_15::{FONT_10X20, FONT_4X6, FONT_5X8, FONT_7X13};
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};
use image::{imageops, GrayImage, Luma};

use crate::weather::{Measurement, Reading};

const MAIN_FONT: &MonoFont<'static> = &FONT_10X20;
const SECONDARY_FONT: &MonoFont<'static> = &FONT_7X13;
const TERTIARY_FONT: &MonoFont<'static> = &FONT_5X8;
const STATUS_FONT: &MonoFont<'static> = &FONT_4X6;

const INK: Luma<u8> = Luma([0]);
const PAPER: Luma<u8> = Luma([u8::MAX]);

/// A white grayscale image that `embedded-graphics` draws black onto.
struct Canvas {
    image: GrayImage,
}

impl Canvas {
    fn new((width, height): (u32, u32)) -> Self {
        Canvas {
            image: GrayImage::from_pixel(width, height, PAPER),
        }
    }

    fn text(&mut self, text: &str, x: i32, y: i32, font: &MonoFont) {
        let style = MonoTextStyle::new(font, BinaryColor::On);
        let _ = Text::with_baseline(text, Point::new(x, y), style, Baseline::Top).draw(self);
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }
}

impl DrawTarget for Canvas {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = self.image.dimensions();
        for Pixel(Point { x, y }, color) in pixels {
            if x < 0 || y < 0 || x as u32 >= width || y as u32 >= height {
                continue;
            }
            let luma = if color.is_on() { INK } else { PAPER };
            self.image.put_pixel(x as u32, y as u32, luma);
        }
        Ok(())
    }
}

fn celsius(value: Option<f64>) -> String {
    match value {
        Some(t) => format!("{:.1}°C", t),
        None => "--".to_string(),
    }
}

fn percent(value: Option<u8>) -> String {
    match value {
        Some(h) => format!("{}%", h),
        None => "--".to_string(),
    }
}

/// Left edge and width of a pane
#[derive(Clone, Copy)]
struct Pane {
    x: i32,
    width: i32,
}

fn draw_pane(black: &mut Canvas, red: &mut Canvas, pane: Pane, reading: &Reading) {
    let half = pane.x + pane.width / 2;

    black.text(&reading.name, pane.x, 1, TERTIARY_FONT);
    black.text("Min:", pane.x, 45, STATUS_FONT);
    black.text("Max:", half, 45, STATUS_FONT);
    black.text("H:", pane.x, 72, TERTIARY_FONT);
    black.text(&percent(reading.humidity), pane.x + 15, 70, SECONDARY_FONT);

    red.text(&celsius(reading.temperature), pane.x, 15, MAIN_FONT);
    red.text(&celsius(reading.min_temp), pane.x, 55, TERTIARY_FONT);
    red.text(&celsius(reading.max_temp), half, 55, TERTIARY_FONT);
}

/// Render the black and the red plane for `bounds` (width, height).
///
/// Exactly one measurement carrying at least one module reading is expected.
pub fn build_gui(
    bounds: (u32, u32),
    measurements: &[Measurement],
) -> anyhow::Result<(GrayImage, GrayImage)> {
    let [measurement] = measurements else {
        bail!("measurements incomplete: expected one station, got {}", measurements.len());
    };
    let Some(module) = measurement.modules.first() else {
        bail!(
            "measurements incomplete: station {} has no module readings",
            measurement.station.name
        );
    };

    let (width, height) = bounds;
    if width < 4 || height < 4 {
        bail!("canvas {}x{} is too small", width, height);
    }
    let half = width as i32 / 2;
    let left = Pane {
        x: 1,
        width: half - 2,
    };
    let right = Pane {
        x: half + 1,
        width: width as i32 - half - 2,
    };

    let mut black = Canvas::new(bounds);
    let mut red = Canvas::new(bounds);

    draw_pane(&mut black, &mut red, left, module);
    draw_pane(&mut black, &mut red, right, &measurement.station);

    let stamp = measurement
        .station
        .timestamp
        .with_timezone(&Local)
        .format("%a %b %e %H:%M:%S %Y");
    black.text(&format!("Ts: {}", stamp), left.x, 90, STATUS_FONT);

    log::debug!("rendered {}x{} screen for {}", width, height, measurement.station.name);
    Ok((black.image, red.image))
}

/// Turn a plane upside down, for panels mounted the other way round.
pub fn rotate_180(image: &GrayImage) -> GrayImage {
    imageops::rotate180(image)
}
