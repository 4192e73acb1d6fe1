//! 2.13" tri-color (black/white/red) e-paper panel driver
//!
//! Used with the Waveshare 2.13" B/C HAT on a Raspberry Pi. The panel is natively
//! 104 pixels wide and 212 pixels tall, and is usually addressed rotated by 90° as a
//! 212x104 landscape canvas.
//!
//! ### Usage
//! The driver does not hide that the panel has two independent planes. To display
//! something you:
//!
//! 1. render a black image and a red image, either with native bounds or with the
//!    horizontal (rotated) bounds,
//! 1. pack each of them into a [`buffer::FrameBuffer`] with [`buffer::encode`],
//! 1. then send both frames with [`driver::Epd2in13bc::display`].
//!
//! Both planes use the same polarity: a set bit is a light (blank) pixel, a cleared
//! bit is ink. For the red plane ink is the accent color.

pub mod buffer;
pub mod driver;
pub mod error;
#[cfg(target_os = "linux")]
pub mod host;
pub mod interface;
pub mod pins;

mod cmd;
mod flag;

#[cfg(test)]
pub(crate) mod mock;

pub use buffer::{encode, BlankFrames, FrameBuffer, Geometry};
pub use driver::{Board, BusyWait, Epd2in13bc, Lines, State};
pub use error::Error;

/// Display width, pixels horizontally in the native orientation
pub const WIDTH: u32 = 104;

/// Display height, pixels vertically in the native orientation
pub const HEIGHT: u32 = 212;
