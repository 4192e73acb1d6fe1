//! Default line assignments for the panel HAT on a Raspberry Pi
//!
//! Offsets are on `/dev/gpiochip0`. All of them can be overridden in the panel
//! configuration.

/// Pin configuration constants for the e-paper HAT
pub struct Pins;

impl Pins {
    /// GPIO character device carrying the header lines
    pub const GPIO_CHIP: &'static str = "/dev/gpiochip0";
    /// spidev node of SPI0, chip-select 0
    pub const SPI_DEVICE: &'static str = "/dev/spidev0.0";

    /// Reset pin for display
    pub const RST: u32 = 17;
    /// Data/Command control pin (High for data, Low for command)
    pub const DC: u32 = 25;
    /// Busy status pin (Low while the panel is refreshing)
    pub const BSY: u32 = 24;
    /// Chip Select pin (CE0)
    pub const CS: u32 = 8;

    /// SPI clock
    pub const CLOCK_HZ: u32 = 4_000_000;
    /// SPI mode 0
    pub const SPI_MODE: u8 = 0;
    /// Bits per SPI word
    pub const BITS_PER_WORD: u8 = 8;
}
