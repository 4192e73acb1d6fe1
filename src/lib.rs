//! Weather station monitor for a Raspberry Pi with a 2.13" tri-color e-paper HAT
//!
//! [`epd`] drives the panel and packs images into its frame layout. The other
//! modules turn station readings into the two images the panel shows.

pub mod app;
pub mod config;
pub mod epd;
pub mod ui;
pub mod weather;
