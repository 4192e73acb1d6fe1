use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use simplelog::{Config, SimpleLogger};

use weather_epd::app;
use weather_epd::config::AppConfig;
use weather_epd::weather::Snapshot;

fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(std::env::args_os().nth(1).map(PathBuf::from))?;
    SimpleLogger::init(config.level_filter(), Config::default())
        .context("could not set up logging")?;

    let snapshot = Snapshot::from_file(&config.snapshot)?;
    let (black, red) = app::render(&config, &snapshot, Utc::now())?;

    if config.test_mode {
        log::info!("test mode, writing images instead of driving the display");
        app::write_test_images(&std::env::current_dir()?, &black, &red);
        return Ok(());
    }

    show(&config, &black, &red)
}

#[cfg(target_os = "linux")]
fn show(
    config: &AppConfig,
    black: &image::GrayImage,
    red: &image::GrayImage,
) -> anyhow::Result<()> {
    use weather_epd::epd::host::RaspberryPi;
    use weather_epd::epd::Epd2in13bc;

    let mut epd = Epd2in13bc::new(RaspberryPi::new(config.panel.clone()))
        .with_busy_wait(config.panel.busy_wait());
    app::show(&mut epd, black, red)
}

#[cfg(not(target_os = "linux"))]
fn show(_: &AppConfig, _: &image::GrayImage, _: &image::GrayImage) -> anyhow::Result<()> {
    anyhow::bail!(
        "driving the display needs Linux spidev and GPIO; set test_mode to render PNG files"
    )
}
