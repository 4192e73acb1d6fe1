//! Raspberry Pi wiring: spidev bus and GPIO character device lines

use embedded_hal::digital::{self, OutputPin};
use embedded_hal::spi::{self, SpiBus};
use linux_embedded_hal::gpio_cdev::{Chip, LineRequestFlags};
use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
use linux_embedded_hal::{CdevPin, Delay, SpidevBus};

use crate::config::PanelConfig;
use crate::epd::driver::{Board, Lines};
use crate::epd::error::{BoxError, Error};
use crate::epd::interface::SpiPort;

/// Kernel limit on a single spidev transfer
const SPIDEV_BUFSIZ: &str = "/sys/module/spidev/parameters/bufsiz";
/// spidev's compiled-in default
const DEFAULT_BUFSIZ: usize = 4096;

const CONSUMER: &str = "weather-epd";

/// spidev bus with the kernel's transfer limit attached
pub struct HostSpi {
    bus: SpidevBus,
    max_transfer: usize,
}

impl spi::ErrorType for HostSpi {
    type Error = <SpidevBus as spi::ErrorType>::Error;
}

impl SpiBus<u8> for HostSpi {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        SpiBus::read(&mut self.bus, words)
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        SpiBus::write(&mut self.bus, words)
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        SpiBus::transfer(&mut self.bus, read, write)
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        SpiBus::transfer_in_place(&mut self.bus, words)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        SpiBus::flush(&mut self.bus)
    }
}

impl SpiPort for HostSpi {
    fn max_transfer_size(&self) -> usize {
        self.max_transfer
    }

    fn close(mut self) -> Result<(), BoxError> {
        // the device file is closed on drop
        SpiBus::flush(&mut self.bus).map_err(BoxError::from)
    }
}

/// Chip-select driven from a GPIO line, or left to the kernel per transfer.
pub enum ChipSelect {
    Gpio(CdevPin),
    Kernel,
}

impl digital::ErrorType for ChipSelect {
    type Error = <CdevPin as digital::ErrorType>::Error;
}

impl OutputPin for ChipSelect {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        match self {
            ChipSelect::Gpio(pin) => pin.set_low(),
            ChipSelect::Kernel => Ok(()),
        }
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        match self {
            ChipSelect::Gpio(pin) => pin.set_high(),
            ChipSelect::Kernel => Ok(()),
        }
    }
}

/// The panel HAT on a Raspberry Pi header.
pub struct RaspberryPi {
    config: PanelConfig,
}

impl RaspberryPi {
    pub fn new(config: PanelConfig) -> Self {
        RaspberryPi { config }
    }
}

fn request(
    chip: &mut Chip,
    offset: u32,
    flags: LineRequestFlags,
    default: u8,
    stage: &'static str,
) -> Result<CdevPin, Error> {
    let handle = chip
        .get_line(offset)
        .and_then(|line| line.request(flags, default, CONSUMER))
        .map_err(|e| Error::acquire(stage, e))?;
    CdevPin::new(handle).map_err(|e| Error::acquire(stage, e))
}

fn spi_mode(mode: u8) -> Result<SpiModeFlags, Error> {
    match mode {
        0 => Ok(SpiModeFlags::SPI_MODE_0),
        1 => Ok(SpiModeFlags::SPI_MODE_1),
        2 => Ok(SpiModeFlags::SPI_MODE_2),
        3 => Ok(SpiModeFlags::SPI_MODE_3),
        other => Err(Error::acquire(
            "invalid SPI transfer mode",
            format!("mode {} is not one of 0-3", other),
        )),
    }
}

fn parse_bufsiz(raw: &str) -> Option<usize> {
    raw.trim().parse().ok().filter(|n| *n > 0)
}

/// Largest transfer spidev accepts, as reported by the kernel module.
fn spidev_bufsiz() -> usize {
    match std::fs::read_to_string(SPIDEV_BUFSIZ) {
        Ok(raw) => parse_bufsiz(&raw).unwrap_or(DEFAULT_BUFSIZ),
        Err(e) => {
            log::warn!(
                "could not read {} ({}), assuming {} bytes",
                SPIDEV_BUFSIZ,
                e,
                DEFAULT_BUFSIZ
            );
            DEFAULT_BUFSIZ
        }
    }
}

impl Board for RaspberryPi {
    type Spi = HostSpi;
    type Busy = CdevPin;
    type Output = CdevPin;
    type ChipSelect = ChipSelect;
    type Delay = Delay;

    fn acquire(&mut self) -> Result<Lines<HostSpi, CdevPin, CdevPin, ChipSelect, Delay>, Error> {
        let cfg = &self.config;

        log::info!("opening GPIO chip {}", cfg.gpio_chip);
        let mut chip =
            Chip::new(&cfg.gpio_chip).map_err(|e| Error::acquire("could not open GPIO chip", e))?;

        let rst = request(
            &mut chip,
            cfg.reset_pin,
            LineRequestFlags::OUTPUT,
            1,
            "could not request RESET line",
        )?;
        let dc = request(
            &mut chip,
            cfg.data_command_pin,
            LineRequestFlags::OUTPUT,
            0,
            "could not request DC line",
        )?;
        let busy = request(
            &mut chip,
            cfg.busy_pin,
            LineRequestFlags::INPUT,
            0,
            "could not request BUSY line",
        )?;

        let mut mode = spi_mode(cfg.transfer_mode)?;
        let cs = match cfg.chip_select_pin {
            Some(pin) => {
                mode |= SpiModeFlags::SPI_NO_CS;
                ChipSelect::Gpio(request(
                    &mut chip,
                    pin,
                    LineRequestFlags::OUTPUT,
                    1,
                    "could not request CS line",
                )?)
            }
            None => ChipSelect::Kernel,
        };

        log::info!("opening SPI device {}", cfg.spi_device);
        let mut bus =
            SpidevBus::open(&cfg.spi_device).map_err(|e| Error::acquire("could not open SPI", e))?;
        let options = SpidevOptions::new()
            .bits_per_word(cfg.bits_per_word)
            .max_speed_hz(cfg.clock_hz)
            .mode(mode)
            .build();
        bus.configure(&options)
            .map_err(|e| Error::acquire("could not connect to SPI", e))?;

        let max_transfer = spidev_bufsiz();
        log::debug!(
            "SPI at {} Hz, mode {}, {} bits per word, {} bytes per transfer",
            cfg.clock_hz,
            cfg.transfer_mode,
            cfg.bits_per_word,
            max_transfer
        );

        Ok(Lines {
            spi: HostSpi { bus, max_transfer },
            busy,
            dc,
            rst,
            cs,
            delay: Delay,
        })
    }
}
