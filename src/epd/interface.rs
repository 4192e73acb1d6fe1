//! Display interface using SPI
use std::time::Duration;

use display_interface::DisplayError;
use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
    spi::SpiBus,
};

use crate::epd::cmd::Cmd;
use crate::epd::error::{BoxError, Error, Stage};

const RESET_DELAY_MS: u32 = 200;
const RESET_PULSE_MS: u32 = 1;
/// Shortest sleep between two status polls
const MIN_POLL_MS: u32 = 1;

/// A SPI bus that knows how large a single transaction may be.
pub trait SpiPort: SpiBus<u8> {
    /// Largest payload, in bytes, accepted by one bus transaction.
    fn max_transfer_size(&self) -> usize;

    /// Release the underlying bus handle.
    fn close(self) -> Result<(), BoxError>
    where
        Self: Sized;
}

/// How to wait for the BUSY line to report idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyWait {
    /// Sleep between two status polls, at least one millisecond
    pub poll_interval: Duration,
    /// Give up after sleeping this long in total. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for BusyWait {
    fn default() -> Self {
        BusyWait {
            poll_interval: Duration::from_millis(100),
            timeout: None,
        }
    }
}

/// The connection interface of the panel: SPI plus four control lines.
pub struct DisplayInterface<SPI, BSY, DC, RST, CS, DELAY> {
    /// SPI bus, chip-select is driven by hand
    spi: SPI,
    /// Low while the panel is busy refreshing, high when idle
    busy: BSY,
    /// Data/Command Control Pin (High for data, Low for command)
    dc: DC,
    /// Pin for Reseting
    rst: RST,
    /// Chip select, active low
    cs: CS,
    delay: DELAY,
}

impl<SPI, BSY, DC, RST, CS, DELAY> DisplayInterface<SPI, BSY, DC, RST, CS, DELAY> {
    pub fn new(spi: SPI, busy: BSY, dc: DC, rst: RST, cs: CS, delay: DELAY) -> Self {
        DisplayInterface {
            spi,
            busy,
            dc,
            rst,
            cs,
            delay,
        }
    }
}

impl<SPI, BSY, DC, RST, CS, DELAY> DisplayInterface<SPI, BSY, DC, RST, CS, DELAY>
where
    SPI: SpiPort,
    BSY: InputPin,
    DC: OutputPin,
    RST: OutputPin,
    CS: OutputPin,
    DELAY: DelayNs,
{
    /// Basic function for sending commands
    pub(crate) fn cmd(&mut self, command: u8) -> Result<(), DisplayError> {
        log::debug!("sending command: 0x{:02X}", command);
        // low for commands
        self.dc.set_low().map_err(|_| DisplayError::DCError)?;
        self.cs.set_low().map_err(|_| DisplayError::CSError)?;

        if let Err(e) = self.spi.write(&[command]).and_then(|_| self.spi.flush()) {
            log::error!("SPI write error for command 0x{:02X}: {:?}", command, e);
            return Err(DisplayError::BusWriteError);
        }

        self.cs.set_high().map_err(|_| DisplayError::CSError)
    }

    /// Send data, split into transactions no larger than the bus allows
    pub(crate) fn data(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        // high for data
        self.dc.set_high().map_err(|_| DisplayError::DCError)?;
        self.cs.set_low().map_err(|_| DisplayError::CSError)?;

        let limit = self.spi.max_transfer_size().max(1);
        for chunk in data.chunks(limit) {
            self.spi
                .write(chunk)
                .and_then(|_| self.spi.flush())
                .map_err(|_| DisplayError::BusWriteError)?;
        }

        self.cs.set_high().map_err(|_| DisplayError::CSError)
    }

    /// Basic function for sending a command and the data belonging to it.
    pub(crate) fn cmd_with_data(&mut self, command: u8, data: &[u8]) -> Result<(), DisplayError> {
        self.cmd(command)?;
        self.data(data)
    }

    /// Hardware reset pulse
    pub(crate) fn reset(&mut self) -> Result<(), DisplayError> {
        self.rst.set_high().map_err(|_| DisplayError::RSError)?;
        self.delay.delay_ms(RESET_DELAY_MS);
        self.rst.set_low().map_err(|_| DisplayError::RSError)?;
        self.delay.delay_ms(RESET_PULSE_MS);
        self.rst.set_high().map_err(|_| DisplayError::RSError)?;
        self.delay.delay_ms(RESET_DELAY_MS);
        Ok(())
    }

    pub(crate) fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    /// Poll the status command until the BUSY line reads high.
    ///
    /// Every poll re-sends the status command, so `n` busy readings cost `n + 1`
    /// commands. Without a timeout this never returns on a stuck panel.
    pub(crate) fn wait_until_idle(&mut self, wait: &BusyWait) -> Result<(), Error> {
        log::debug!("busy");
        self.cmd(Cmd::GET_STATUS).stage("could not send command 0x71")?;

        let poll_ms = u32::try_from(wait.poll_interval.as_millis())
            .unwrap_or(u32::MAX)
            .max(MIN_POLL_MS);
        let mut waited = Duration::ZERO;
        loop {
            // DisplayError has no variant for input lines
            let idle = self
                .busy
                .is_high()
                .map_err(|_| DisplayError::DCError)
                .stage("could not read BUSY pin")?;
            if idle {
                break;
            }
            if let Some(timeout) = wait.timeout {
                if waited >= timeout {
                    return Err(Error::BusyTimeout {
                        stage: "could not wait for the device",
                        waited,
                    });
                }
            }
            self.delay.delay_ms(poll_ms);
            waited += Duration::from_millis(u64::from(poll_ms));

            self.cmd(Cmd::GET_STATUS).stage("could not send command 0x71")?;
        }
        log::debug!("busy release after {:?}", waited);

        Ok(())
    }

    /// Give the bus back. Lines are released when dropped.
    pub(crate) fn release(self) -> Result<(), BoxError> {
        self.spi.close()
    }
}
