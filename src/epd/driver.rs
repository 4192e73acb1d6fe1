//! Driver for the 2.13" B/C tri-color panel
//!
//! ## Lifecycle
//!
//! `Uninitialized -> Initializing -> Ready -> (Displaying | Clearing) -> Ready -> Closed`
//!
//! - [`Epd2in13bc::init`] acquires the bus and control lines from the [`Board`] and
//!   runs the power-on sequence.
//! - [`Epd2in13bc::display`] and [`Epd2in13bc::clear`] only run in `Ready`.
//! - [`Epd2in13bc::close`] releases the bus. It is a no-op when nothing is open.
//!
//! ## Failures
//!
//! Every step reports the stage that failed. Nothing is retried. A failure in the
//! middle of a transfer leaves the panel half written; the session goes back to
//! `Ready` so the caller can retry a full `display` or `clear`.
//!
//! ## Polarity
//!
//! A set bit is a light pixel on both planes, so a blank frame is all `0xFF`.
//!
//! One session owns the bus. Callers sharing it across threads must serialize
//! access themselves.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::epd::buffer::{FrameBuffer, Geometry};
use crate::epd::cmd::Cmd;
use crate::epd::error::{Error, Stage};
use crate::epd::flag::Flag;
use crate::epd::interface::{DisplayInterface, SpiPort};

pub use crate::epd::interface::BusyWait;

/// Settle time between the reset pulse and the first command
const POST_RESET_DELAY_MS: u32 = 10;
/// Pause between triggering a refresh and polling for idle
const REFRESH_DELAY_MS: u32 = 100;

/// The bus, lines and delay handed out by a [`Board`].
pub struct Lines<SPI, BSY, OUT, CS, DELAY> {
    pub spi: SPI,
    /// BUSY input
    pub busy: BSY,
    /// Data/Command select output
    pub dc: OUT,
    /// Reset output
    pub rst: OUT,
    /// Chip-select output
    pub cs: CS,
    pub delay: DELAY,
}

/// Something that can hand out the panel's bus and control lines.
pub trait Board {
    type Spi: SpiPort;
    type Busy: InputPin;
    type Output: OutputPin;
    type ChipSelect: OutputPin;
    type Delay: DelayNs;

    /// Claim the SPI bus and the four control lines.
    #[allow(clippy::type_complexity)]
    fn acquire(
        &mut self,
    ) -> Result<Lines<Self::Spi, Self::Busy, Self::Output, Self::ChipSelect, Self::Delay>, Error>;
}

type BoardInterface<B> = DisplayInterface<
    <B as Board>::Spi,
    <B as Board>::Busy,
    <B as Board>::Output,
    <B as Board>::Output,
    <B as Board>::ChipSelect,
    <B as Board>::Delay,
>;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    Initializing,
    Ready,
    Displaying,
    Clearing,
    Closed,
}

/// 2.13" black/white/red e-paper display
pub struct Epd2in13bc<B: Board> {
    board: B,
    geometry: Geometry,
    busy_wait: BusyWait,
    state: State,
    interface: Option<BoardInterface<B>>,
}

impl<B: Board> Epd2in13bc<B> {
    /// Uninitialized session for the 104x212 panel.
    pub fn new(board: B) -> Self {
        Self::with_geometry(board, Geometry::panel())
    }

    pub fn with_geometry(board: B, geometry: Geometry) -> Self {
        Epd2in13bc {
            board,
            geometry,
            busy_wait: BusyWait::default(),
            state: State::Uninitialized,
            interface: None,
        }
    }

    /// Poll interval and optional deadline for every busy wait.
    pub fn with_busy_wait(mut self, busy_wait: BusyWait) -> Self {
        self.busy_wait = busy_wait;
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn width(&self) -> u32 {
        self.geometry.width()
    }

    pub fn height(&self) -> u32 {
        self.geometry.height()
    }

    /// Native bounds, 104x212
    pub fn bounds(&self) -> (u32, u32) {
        self.geometry.bounds()
    }

    /// Rotated bounds, 212x104
    pub fn bounds_horizontal(&self) -> (u32, u32) {
        self.geometry.bounds_horizontal()
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    /// Acquire the bus and lines, then power the panel on.
    ///
    /// On failure the session is left `Uninitialized`; lines acquired so far stay
    /// open until [`close`](Self::close).
    pub fn init(&mut self) -> Result<(), Error> {
        let resolution = self.resolution()?;
        self.state = State::Initializing;

        if self.interface.is_none() {
            log::info!("opening SPI device and control lines");
            let lines = match self.board.acquire() {
                Ok(lines) => lines,
                Err(e) => {
                    self.state = State::Uninitialized;
                    return Err(e);
                }
            };
            self.interface = Some(DisplayInterface::new(
                lines.spi, lines.busy, lines.dc, lines.rst, lines.cs, lines.delay,
            ));
        }

        match self.power_on(resolution) {
            Ok(()) => {
                log::info!("display initialized");
                self.state = State::Ready;
                Ok(())
            }
            Err(e) => {
                self.state = State::Uninitialized;
                Err(e)
            }
        }
    }

    fn power_on(&mut self, resolution: [u8; 3]) -> Result<(), Error> {
        let busy_wait = self.busy_wait;
        let iface = self.interface.as_mut().ok_or(Error::NotReady)?;

        iface.reset().stage("could not reset the device")?;
        iface.delay_ms(POST_RESET_DELAY_MS);

        iface.cmd(Cmd::POWER_ON).stage("could not send command 0x04")?;
        iface.wait_until_idle(&busy_wait).stage("could not wait for power on")?;

        iface.cmd(Cmd::PANEL_SETTING).stage("could not set panel setting")?;
        iface.data(&[Flag::PANEL_SETTING_LUT]).stage("could not set LUT")?;
        iface.data(&[Flag::PANEL_SETTING_TIMING]).stage("could not set timing settings")?;

        iface
            .cmd_with_data(Cmd::RESOLUTION_SETTING, &resolution)
            .stage("could not set resolution")?;

        iface
            .cmd_with_data(Cmd::VCOM_AND_DATA_INTERVAL, &[Flag::VCOM_WB_MODE])
            .stage("could not set VCOM and data interval settings")?;

        Ok(())
    }

    /// Width as one byte, height as two (big endian).
    fn resolution(&self) -> Result<[u8; 3], Error> {
        let (width, height) = self.geometry.bounds();
        match (u8::try_from(width), u16::try_from(height)) {
            (Ok(w), Ok(h)) => {
                let [hi, lo] = h.to_be_bytes();
                Ok([w, hi, lo])
            }
            _ => Err(Error::dimensions(format!(
                "resolution {}x{} does not fit the resolution setting",
                width, height
            ))),
        }
    }

    /// Send both planes and refresh the panel.
    ///
    /// Both buffers must be exactly `width / 8 * height` bytes.
    pub fn display(&mut self, black: &[u8], red: &[u8]) -> Result<(), Error> {
        self.refresh(black, red, State::Displaying)
    }

    /// Blank both planes.
    pub fn clear(&mut self) -> Result<(), Error> {
        let blank = FrameBuffer::blank(self.geometry);
        log::info!("clearing display");
        self.refresh(&blank, &blank, State::Clearing)
    }

    fn refresh(&mut self, black: &[u8], red: &[u8], during: State) -> Result<(), Error> {
        if self.state != State::Ready {
            return Err(Error::NotReady);
        }
        let expected = self.geometry.buffer_len();
        for (plane, buffer) in [("black", black), ("red", red)] {
            if buffer.len() != expected {
                return Err(Error::dimensions(format!(
                    "{} buffer is {} bytes, display needs {}",
                    plane,
                    buffer.len(),
                    expected
                )));
            }
        }

        self.state = during;
        let res = self.transmit(black, red);
        self.state = State::Ready;
        res
    }

    fn transmit(&mut self, black: &[u8], red: &[u8]) -> Result<(), Error> {
        let busy_wait = self.busy_wait;
        let iface = self.interface.as_mut().ok_or(Error::NotReady)?;

        iface.cmd(Cmd::DATA_START_TRANSMISSION_1).stage("could not send command 0x10 to device")?;
        iface.data(black).stage("could not send black pixels data to device")?;

        iface.cmd(Cmd::DATA_START_TRANSMISSION_2).stage("could not send command 0x13 to device")?;
        iface.data(red).stage("could not send red pixel data to device")?;

        iface.cmd(Cmd::DISPLAY_REFRESH).stage("could not send command 0x12 to device")?;

        iface.delay_ms(REFRESH_DELAY_MS);
        iface.wait_until_idle(&busy_wait).stage("could not wait for the device")?;

        Ok(())
    }

    /// Release the bus. Safe to call at any time, any number of times.
    pub fn close(&mut self) -> Result<(), Error> {
        let Some(iface) = self.interface.take() else {
            return Ok(());
        };
        log::info!("closing display");
        self.state = State::Closed;
        iface.release().map_err(|source| Error::Release { source })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::epd::mock::{Event, MockBoard};

    const FRAME: usize = 13 * 212;

    fn ready(board: MockBoard) -> Epd2in13bc<MockBoard> {
        let recorder = board.recorder();
        let mut epd = Epd2in13bc::new(board);
        epd.init().unwrap();
        recorder.reset();
        epd
    }

    #[test]
    fn init_sequence() {
        let board = MockBoard::new().with_busy_reads(2);
        let recorder = board.recorder();
        let mut epd = Epd2in13bc::new(board);
        assert_eq!(epd.state(), State::Uninitialized);

        epd.init().unwrap();
        assert_eq!(epd.state(), State::Ready);

        assert_eq!(
            recorder.transcript(),
            vec![
                (0x04, vec![]),
                (0x71, vec![]),
                (0x71, vec![]),
                (0x71, vec![]),
                (0x00, vec![0x0F, 0x89]),
                (0x61, vec![0x68, 0x00, 0xD4]),
                (0x50, vec![0x77]),
            ]
        );

        // reset pulse comes first, then the settle delay
        let events = recorder.events();
        assert_eq!(
            &events[..7],
            &[
                Event::Rst(true),
                Event::Sleep(Duration::from_millis(200)),
                Event::Rst(false),
                Event::Sleep(Duration::from_millis(1)),
                Event::Rst(true),
                Event::Sleep(Duration::from_millis(200)),
                Event::Sleep(Duration::from_millis(10)),
            ]
        );
    }

    #[test]
    fn display_sends_both_planes_then_refreshes() {
        let board = MockBoard::new().with_max_transfer(1024);
        let recorder = board.recorder();
        let mut epd = ready(board);

        let black: Vec<u8> = (0..FRAME).map(|i| i as u8).collect();
        let red: Vec<u8> = (0..FRAME).map(|i| (i * 7) as u8).collect();
        epd.display(&black, &red).unwrap();
        assert_eq!(epd.state(), State::Ready);

        let transcript = recorder.transcript();
        let commands: Vec<u8> = transcript.iter().map(|(c, _)| *c).collect();
        assert_eq!(commands, vec![0x10, 0x13, 0x12, 0x71]);
        assert_eq!(transcript[0].1, black);
        assert_eq!(transcript[1].1, red);

        // 2756 bytes in chunks of at most 1024
        let lens: Vec<usize> = recorder.data_transactions().iter().map(Vec::len).collect();
        assert_eq!(lens, vec![1024, 1024, 708, 1024, 1024, 708]);

        // sleep after the refresh command, before polling
        let events = recorder.events();
        let refresh = events
            .iter()
            .position(|e| *e == Event::Write(vec![0x12]))
            .unwrap();
        assert!(events[refresh..].contains(&Event::Sleep(Duration::from_millis(100))));
    }

    #[test]
    fn clear_sends_two_blank_frames() {
        let board = MockBoard::new().with_max_transfer(500);
        let recorder = board.recorder();
        let mut epd = ready(board);

        epd.clear().unwrap();

        let transcript = recorder.transcript();
        assert_eq!(transcript.len(), 4);
        for (cmd, data) in &transcript[..2] {
            assert!(*cmd == 0x10 || *cmd == 0x13);
            assert_eq!(data.len(), 104 * 212 / 8);
            assert!(data.iter().all(|&b| b == 0xFF));
        }
        assert_eq!(transcript[2].0, 0x12);
        assert_eq!(epd.state(), State::Ready);
    }

    #[test]
    fn display_before_init_is_rejected_without_io() {
        let board = MockBoard::new();
        let recorder = board.recorder();
        let mut epd = Epd2in13bc::new(board);
        let frame = vec![0xFF; FRAME];

        assert!(matches!(epd.display(&frame, &frame), Err(Error::NotReady)));
        assert!(matches!(epd.clear(), Err(Error::NotReady)));
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn wrong_buffer_length_is_rejected_without_io() {
        let board = MockBoard::new();
        let recorder = board.recorder();
        let mut epd = ready(board);

        let good = vec![0xFF; FRAME];
        let short = vec![0xFF; FRAME - 1];
        assert!(matches!(epd.display(&good, &short), Err(Error::Dimensions(_))));
        assert!(matches!(epd.display(&short, &good), Err(Error::Dimensions(_))));
        assert!(recorder.events().is_empty());
        assert_eq!(epd.state(), State::Ready);
    }

    #[test]
    fn failing_transfer_names_the_stage() {
        // writes during init: 0x04, 0x71, 0x00, 0x0F, 0x89, 0x61, res, 0x50, 0x77
        // display: 0x10 is write 9, black data is write 10
        let board = MockBoard::new().fail_write(10);
        let mut epd = Epd2in13bc::new(board);
        epd.init().unwrap();

        let frame = vec![0xFF; FRAME];
        let err = epd.display(&frame, &frame).unwrap_err();
        assert_eq!(err.stage(), Some("could not send black pixels data to device"));
        assert_eq!(epd.state(), State::Ready);
    }

    #[test]
    fn failing_init_step_names_the_stage() {
        // 0x04 succeeds, the first status poll fails
        let board = MockBoard::new().fail_write(1);
        let mut epd = Epd2in13bc::new(board);
        let err = epd.init().unwrap_err();
        assert_eq!(err.stage(), Some("could not wait for power on"));
        assert_eq!(epd.state(), State::Uninitialized);
    }

    #[test]
    fn acquire_failure_aborts_init() {
        let mut epd = Epd2in13bc::new(MockBoard::new().fail_acquire());
        let err = epd.init().unwrap_err();
        assert!(matches!(err, Error::Acquire { .. }));
        assert_eq!(epd.state(), State::Uninitialized);
        assert!(epd.close().is_ok());
    }

    #[test]
    fn stuck_panel_times_out_when_bounded() {
        let wait = BusyWait {
            poll_interval: Duration::from_millis(100),
            timeout: Some(Duration::from_millis(500)),
        };
        let mut epd = Epd2in13bc::new(MockBoard::new().never_idle()).with_busy_wait(wait);
        match epd.init() {
            Err(Error::BusyTimeout { stage, waited }) => {
                assert_eq!(stage, "could not wait for power on");
                assert_eq!(waited, Duration::from_millis(500));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn close_is_idempotent_and_safe_uninitialized() {
        let board = MockBoard::new();
        let recorder = board.recorder();
        let mut epd = Epd2in13bc::new(board);
        assert!(epd.close().is_ok());
        assert_eq!(epd.state(), State::Uninitialized);

        epd.init().unwrap();
        assert!(epd.close().is_ok());
        assert!(epd.close().is_ok());
        assert_eq!(epd.state(), State::Closed);
        assert_eq!(
            recorder.events().iter().filter(|e| **e == Event::Close).count(),
            1
        );

        let frame = vec![0xFF; FRAME];
        assert!(matches!(epd.display(&frame, &frame), Err(Error::NotReady)));
    }

    #[test]
    fn close_failure_is_reported() {
        let mut epd = Epd2in13bc::new(MockBoard::new().fail_close());
        epd.init().unwrap();
        let err = epd.close().unwrap_err();
        assert!(matches!(err, Error::Release { .. }));
        assert_eq!(epd.state(), State::Closed);

        let source = std::error::Error::source(&err).unwrap();
        let io = source.downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(io.kind(), std::io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn oversized_geometry_is_rejected_before_acquire() {
        let board = MockBoard::new();
        let recorder = board.recorder();
        let mut epd = Epd2in13bc::with_geometry(board, Geometry::new(264, 176).unwrap());

        assert!(matches!(epd.init(), Err(Error::Dimensions(_))));
        assert_eq!(epd.state(), State::Uninitialized);
        assert_eq!(epd.board().acquired(), 0);
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn reinit_after_close_acquires_again() {
        let mut epd = Epd2in13bc::new(MockBoard::new());
        epd.init().unwrap();
        epd.close().unwrap();
        epd.init().unwrap();
        assert_eq!(epd.state(), State::Ready);
        assert_eq!(epd.board().acquired(), 2);
    }

    #[test]
    fn bounds() {
        let epd = Epd2in13bc::new(MockBoard::new());
        assert_eq!(epd.bounds(), (104, 212));
        assert_eq!(epd.bounds_horizontal(), (212, 104));
    }
}
