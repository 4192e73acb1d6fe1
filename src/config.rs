//! Application and panel configuration, read from a TOML file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::epd::interface::BusyWait;
use crate::epd::pins::Pins;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "WEATHER_EPD_CONFIG";
/// File looked up in `$HOME` when nothing else is given
pub const DEFAULT_FILE_NAME: &str = ".weather-epd.toml";

/// A station and the modules of it to show.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Source {
    pub station_name: String,
    #[serde(default)]
    pub module_names: Vec<String>,
}

/// Host wiring of the panel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub gpio_chip: String,
    pub spi_device: String,
    pub reset_pin: u32,
    pub data_command_pin: u32,
    pub busy_pin: u32,
    /// GPIO line driven as chip-select.
    ///
    /// Unset by default, so only RESET, DC and BUSY are requested: spidev owns
    /// CE0 (GPIO8) and asserts it around every transfer. Setting it drives CS
    /// by hand and opens spidev with `SPI_NO_CS`.
    pub chip_select_pin: Option<u32>,
    pub clock_hz: u32,
    pub transfer_mode: u8,
    pub bits_per_word: u8,
    pub busy_poll_ms: u64,
    pub busy_timeout_ms: Option<u64>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        PanelConfig {
            gpio_chip: Pins::GPIO_CHIP.to_string(),
            spi_device: Pins::SPI_DEVICE.to_string(),
            reset_pin: Pins::RST,
            data_command_pin: Pins::DC,
            busy_pin: Pins::BSY,
            chip_select_pin: None,
            clock_hz: Pins::CLOCK_HZ,
            transfer_mode: Pins::SPI_MODE,
            bits_per_word: Pins::BITS_PER_WORD,
            busy_poll_ms: 100,
            busy_timeout_ms: None,
        }
    }
}

impl PanelConfig {
    pub fn busy_wait(&self) -> BusyWait {
        BusyWait {
            poll_interval: Duration::from_millis(self.busy_poll_ms),
            timeout: self.busy_timeout_ms.map(Duration::from_millis),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    /// Write PNG files instead of driving the panel
    pub test_mode: bool,
    pub rotate_180: bool,
    /// How far back min/max temperatures reach
    pub time_window_secs: u64,
    /// Station data written by the fetcher
    pub snapshot: PathBuf,
    pub sources: Vec<Source>,
    pub panel: PanelConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            log_level: "info".to_string(),
            test_mode: false,
            rotate_180: false,
            time_window_secs: 2 * 60 * 60,
            snapshot: PathBuf::from("weather.toml"),
            sources: Vec::new(),
            panel: PanelConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn time_window(&self) -> Duration {
        Duration::from_secs(self.time_window_secs)
    }

    /// Level for the logger, `info` when the configured one is not recognized.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level
            .trim()
            .parse()
            .unwrap_or(log::LevelFilter::Info)
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).context("could not parse configuration")
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("in config file {}", path.display()))
    }

    /// Load from an explicit path, `$WEATHER_EPD_CONFIG`, or the default file
    /// in the home directory. Only a missing default file falls back to defaults.
    pub fn load(arg: Option<PathBuf>) -> anyhow::Result<Self> {
        let explicit = arg.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        if let Some(path) = explicit {
            return Self::from_file(&path);
        }

        match default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }
}

fn default_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(DEFAULT_FILE_NAME))
}
