//! One refresh of the screen, from station data to the panel or to PNG files.

use std::path::Path;

use anyhow::{anyhow, Context};
use chrono::{DateTime, TimeDelta, Utc};
use image::{DynamicImage, GrayImage};

use crate::config::AppConfig;
use crate::epd::{encode, Board, Epd2in13bc, Geometry};
use crate::ui::{build_gui, rotate_180};
use crate::weather::{collect_measurements, Snapshot};

pub const TEST_BLACK_FILE: &str = "out_test_b.png";
pub const TEST_RED_FILE: &str = "out_test_r.png";

/// Lay out the configured readings of `snapshot` as a black and a red plane
/// with the panel's horizontal bounds.
pub fn render(
    config: &AppConfig,
    snapshot: &Snapshot,
    now: DateTime<Utc>,
) -> anyhow::Result<(GrayImage, GrayImage)> {
    let window = TimeDelta::from_std(config.time_window()).context("time window is out of range")?;
    let since = now
        .checked_sub_signed(window)
        .ok_or_else(|| anyhow!("time window reaches before the epoch"))?;

    let measurements = collect_measurements(snapshot, &config.sources, since, now)
        .context("could not fetch data")?;
    let (black, red) = build_gui(Geometry::panel().bounds_horizontal(), &measurements)
        .context("could not generate UI")?;

    if config.rotate_180 {
        return Ok((rotate_180(&black), rotate_180(&red)));
    }
    Ok((black, red))
}

/// Save both planes as PNG files in `dir`. Failures are only logged.
pub fn write_test_images(dir: &Path, black: &GrayImage, red: &GrayImage) {
    for (name, image) in [(TEST_BLACK_FILE, black), (TEST_RED_FILE, red)] {
        let path = dir.join(name);
        match image.save(&path) {
            Ok(()) => log::info!("wrote {}", path.display()),
            Err(e) => log::error!("could not write {}: {}", path.display(), e),
        }
    }
}

/// Put both planes on the panel, then release it whatever happened.
pub fn show<B: Board>(
    epd: &mut Epd2in13bc<B>,
    black: &GrayImage,
    red: &GrayImage,
) -> anyhow::Result<()> {
    let res = refresh(epd, black, red);
    if let Err(e) = epd.close() {
        log::error!("could not close device: {}", e);
    }
    res
}

fn refresh<B: Board>(
    epd: &mut Epd2in13bc<B>,
    black: &GrayImage,
    red: &GrayImage,
) -> anyhow::Result<()> {
    epd.init().context("error while initializing device")?;
    epd.clear().context("error while clearing the device screen")?;

    let geometry = epd.geometry();
    let black = encode(&DynamicImage::ImageLuma8(black.clone()), geometry, false)
        .context("could not generate buffer for the black GUI image")?;
    let red = encode(&DynamicImage::ImageLuma8(red.clone()), geometry, false)
        .context("could not generate buffer for the red GUI image")?;

    log::info!("displaying GUI");
    epd.display(&black, &red).context("could not display GUI")?;
    Ok(())
}
